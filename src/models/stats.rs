//! Run statistics reported by the scheduler.

use serde::{Deserialize, Serialize};

/// Summary of a follow run, derived from scheduler events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowStats {
    /// Targets in the initial queue.
    pub total: usize,
    /// Follows that succeeded (including already-following duplicates).
    pub successful: usize,
    /// Rate-limit hits, local denials and remote rejections combined.
    pub rate_limited: usize,
    /// Attempts dispatched to the remote service.
    pub processed: usize,
}

impl FollowStats {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Success percentage over processed attempts, 0 when nothing ran.
    pub fn success_rate(&self) -> u32 {
        if self.processed == 0 {
            return 0;
        }
        ((self.successful as f64 / self.processed as f64) * 100.0).round() as u32
    }
}
