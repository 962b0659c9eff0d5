//! Batch reconciliation of derived region fields.
//!
//! Each pass walks the full region set through the [`RegionStore`] port, asks
//! an external service for a derived value, and writes it back one field at a
//! time. Building counts and display names run in the background behind a
//! single-flight [`ProgressGuard`]; the search index rebuild runs inline.

pub mod error;
pub mod ports;
pub mod progress;
pub mod reconciler;
pub mod services;

pub use error::{ReconcileError, SearchError, ServiceError, StoreError};
pub use ports::{
    BuildingCounter, GeoPoint, RegionSnapshot, RegionStore, ReverseGeocoder, SearchDocument,
    SearchIndex,
};
pub use progress::{PassTicket, ProgressGuard, ProgressState};
pub use reconciler::{GeoReconciler, PassStart, Ports};
