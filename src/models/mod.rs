pub mod engagement;
pub mod sync_log;

pub use engagement::{EngagementState, ProgressSnapshot, ReadStatus};
pub use sync_log::{ReadLogResponse, SyncLogEntry};
