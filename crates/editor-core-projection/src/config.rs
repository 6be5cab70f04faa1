//! Projection document configuration.

/// Iteration bound for [`add_master_range`](crate::ProjectionDocument::add_master_range).
///
/// Listeners may add or remove ranges while a range is being added, so the add loop
/// re-plans until nothing is left to project. The loop gives up after
/// `max(per_fragment * fragment_count, minimum)` rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyLimit {
    /// Rounds allowed per fragment present when the call starts.
    pub per_fragment: usize,
    /// Lower bound on the number of rounds.
    pub minimum: usize,
}

impl Default for SafetyLimit {
    fn default() -> Self {
        Self {
            per_fragment: 2,
            minimum: 20,
        }
    }
}

impl SafetyLimit {
    /// Effective bound for a projection currently holding `fragment_count` fragments.
    pub fn for_fragments(&self, fragment_count: usize) -> usize {
        self.per_fragment
            .saturating_mul(fragment_count)
            .max(self.minimum)
    }
}

/// Options that control a projection document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectionConfig {
    /// Bound for the add-range loop.
    pub safety_limit: SafetyLimit,
    /// If `true`, every external master edit that removes text first expands the projection
    /// over the removed range, so the edit becomes visible even inside hidden text.
    pub auto_expand: bool,
}

impl ProjectionConfig {
    /// Set the auto-expansion mode.
    pub fn with_auto_expand(mut self, auto_expand: bool) -> Self {
        self.auto_expand = auto_expand;
        self
    }

    /// Set the add-range safety limit.
    pub fn with_safety_limit(mut self, safety_limit: SafetyLimit) -> Self {
        self.safety_limit = safety_limit;
        self
    }
}
