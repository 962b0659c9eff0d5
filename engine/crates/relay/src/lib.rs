//! Live player relay.
//!
//! Producers (game servers) push position batches, the relay task folds them
//! into a [`PlayerRegistry`] and fans the consolidated snapshot out to every
//! consumer. [`CommandChannel`] is the reverse path for teleport commands.

pub mod command;
pub mod error;
pub mod gateway;
pub mod registry;

pub use command::CommandChannel;
pub use error::RelayError;
pub use gateway::{run_relay, RelayGateway};
pub use registry::{PlayerRecord, PlayerRegistry};
