pub mod client;
pub mod delivery;
pub mod error;
pub mod reporter;
pub mod scheduler;

pub use client::{HttpReadLogClient, ReadLogClient};
pub use delivery::{BeaconDelivery, DurableDelivery};
pub use error::SyncError;
pub use reporter::{ProgressReporter, ReportKind};
pub use scheduler::{FlightGuard, SkipReason, SyncScheduler, SyncTrigger};
