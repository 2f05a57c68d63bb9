pub mod active_time;
pub mod controller;
pub mod loop_worker;
pub mod scroll;

pub use active_time::ActiveTimeAccumulator;
pub use controller::SensingController;
pub use loop_worker::SensingContext;
pub use scroll::{ScrollDepthSampler, ScrollMetrics, ScrollSample};
