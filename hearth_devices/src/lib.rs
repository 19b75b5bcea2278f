//! # Hearth devices - reference device store
//!
//! An in-memory `DeviceStore` for the hearth language: a device tree loaded
//! from TOML, a time-of-day scheduler for `at` triggers, edge-triggered
//! `when` subscriptions, and a worker pool that runs firings with a timeout.

pub mod dispatcher;
pub mod scheduler;
pub mod store;
pub mod tree;

// Convenience re-exports
pub use dispatcher::{DispatchStats, Dispatcher};
pub use scheduler::{delay_until, Clock, ManualClock, Scheduler, SystemClock};
pub use store::MemoryStore;
pub use tree::{DeviceFileError, DeviceTree};

pub mod prelude {
    pub use crate::{DeviceTree, ManualClock, MemoryStore};
    pub use hearth_dsl::evaluation::{
        DeviceAddress, DeviceStore, EvalResult, Evaluator, RuntimeError, Value,
    };
    pub use hearth_dsl::pipeline::{run_source, PipelineError};
}
