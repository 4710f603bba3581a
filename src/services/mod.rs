//! Background worker services.
//!
//! Each worker runs as a single task that talks to the controller only
//! through channels: `WorkerCommand`s in, typed events out. Network
//! calls are never concurrent within one worker.

pub mod monitor;
pub mod scheduler;

pub use monitor::{FollowerMonitor, MonitorConfig, MonitorEvent};
pub use scheduler::{FollowScheduler, SchedulerEvent};
