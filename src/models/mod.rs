//! Core data types shared across services and the CLI.

mod pacing;
mod stats;
mod target;

pub use pacing::PacingState;
pub use stats::FollowStats;
pub use target::{parse_target_list, FollowTarget};

/// Lifecycle of a scheduler worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, not yet started.
    Idle,
    /// Actively draining the queue.
    Running,
    /// Suspended by operator; queue retained.
    Paused,
    /// Stop requested while an attempt is in flight.
    Draining,
    /// Finished or stopped; terminal.
    Stopped,
}

/// Control messages sent from the controller to a worker.
///
/// Pause and resume are idempotent and order-independent; stop takes
/// effect at the next loop boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    Pause,
    Resume,
    Stop,
}
