pub mod controller;
pub mod state;
pub mod termination;

pub use controller::{TrackerInstance, TrackerServices, ViewContext};
pub use state::TrackerState;
pub use termination::{FinalFlush, TerminationGuard};
