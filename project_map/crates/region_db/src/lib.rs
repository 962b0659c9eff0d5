pub mod db;
pub mod error;
pub mod region;
mod schema;
mod store;
pub mod user;

pub use db::RegionDb;
pub use error::RegionDbError;
pub use region::RegionRepo;
pub use user::UserRepo;
