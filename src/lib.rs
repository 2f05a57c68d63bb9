mod db;
mod host;
mod models;
mod recovery;
mod sensing;
mod settings;
mod sim;
mod sync;
mod tracker;
mod utils;

#[cfg(test)]
mod testing;

pub use db::Database;
pub use host::{AlwaysVisible, HostBindings, VisibilitySignal};
pub use models::{EngagementState, ProgressSnapshot, ReadLogResponse, ReadStatus, SyncLogEntry};
pub use recovery::{KeyValueStore, MemoryKeyValueStore, RecoveryAction, SessionRecoveryStore};
pub use sensing::ScrollMetrics;
pub use settings::TrackerConfig;
pub use sync::{
    BeaconDelivery, DurableDelivery, HttpReadLogClient, ReadLogClient, SyncError, SyncTrigger,
};
pub use tracker::{TrackerInstance, TrackerServices, ViewContext};

pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = match sim::SimArgs::parse(&args) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    log::info!("readtrack-sim starting up...");
    if let Err(err) = runtime.block_on(sim::simulate(args)) {
        log::error!("Simulation failed: {err:#}");
        std::process::exit(1);
    }
}
