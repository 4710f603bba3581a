//! Follow targets and target list parsing.

/// A single account queued for a follow attempt.
///
/// Created when enqueued, consumed when an attempt is dispatched,
/// re-enqueued at the queue head on quota denial, and discarded after a
/// terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowTarget {
    /// Human-readable handle on the remote service.
    pub handle: String,
    /// Stable identifier, filled in once the profile has been resolved.
    pub did: Option<String>,
}

impl FollowTarget {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            did: None,
        }
    }

    /// Target with a known stable id (e.g. discovered by the monitor).
    pub fn resolved(handle: impl Into<String>, did: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            did: Some(did.into()),
        }
    }
}

/// Parse a newline-delimited target list: trim entries, drop blanks.
pub fn parse_target_list(raw: &str) -> Vec<FollowTarget> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(FollowTarget::new)
        .collect()
}
