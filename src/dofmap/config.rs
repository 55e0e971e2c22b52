//! Tunables of a dof-table build.

use crate::algs::communicator::{COLLECTIVE_TAG, CommTag, DofCommTags};
use crate::dof_error::DofMapError;

/// Default absolute tolerance when matching dof points across ranks.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DofTableConfig {
    /// Per-coordinate absolute tolerance for dof point matching.
    pub tolerance: f64,
    /// Cap on ghost-resolution rounds; `None` uses `comm.size() + 1`.
    pub max_rounds: Option<usize>,
    pub tags: DofCommTags,
    /// Validate the frozen table before returning it.
    pub check_invariants: bool,
}

impl Default for DofTableConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_rounds: None,
            tags: DofCommTags::default(),
            check_invariants: cfg!(any(debug_assertions, feature = "strict-invariants")),
        }
    }
}

impl DofTableConfig {
    pub fn with_tag_base(mut self, base: u16) -> Self {
        self.tags = DofCommTags::from_base(CommTag::new(base));
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Reject a negative or non-finite tolerance and tags that collide with
    /// each other or with [`COLLECTIVE_TAG`].
    pub fn validate(&self) -> Result<(), DofMapError> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(DofMapError::InvalidConfig(format!(
                "tolerance {} is not a finite non-negative number",
                self.tolerance
            )));
        }
        let t = self.tags;
        if t.contains(COLLECTIVE_TAG) {
            return Err(DofMapError::InvalidConfig(format!(
                "tag {COLLECTIVE_TAG} is reserved for collectives"
            )));
        }
        if t.counts == t.requests || t.requests == t.responses || t.counts == t.responses {
            return Err(DofMapError::InvalidConfig(format!("tags {t:?} are not distinct")));
        }
        Ok(())
    }

    /// Round cap for a world of `n_ranks`.
    ///
    /// Every redirect moves a query to a strictly lower rank, and the first
    /// hop of an element-addressed query may go up once, so `n_ranks + 1`
    /// rounds always suffice on a consistent partition.
    pub fn round_cap(&self, n_ranks: usize) -> usize {
        self.max_rounds.unwrap_or(n_ranks + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = DofTableConfig::default();
        assert_eq!(cfg.tolerance, 1e-9);
        assert_eq!(cfg.round_cap(4), 5);
        assert_eq!(cfg.with_max_rounds(2).round_cap(4), 2);
    }

    #[test]
    fn reserved_or_repeated_tags_are_rejected() {
        assert!(DofTableConfig::default().validate().is_ok());
        assert!(DofTableConfig::default().with_tag_base(u16::MAX).validate().is_ok());

        let mut cfg = DofTableConfig::default();
        cfg.tags.requests = CommTag::new(COLLECTIVE_TAG);
        assert!(matches!(cfg.validate(), Err(DofMapError::InvalidConfig(_))));

        let mut cfg = DofTableConfig::default();
        cfg.tags.responses = cfg.tags.counts;
        assert!(matches!(cfg.validate(), Err(DofMapError::InvalidConfig(_))));

        assert!(DofTableConfig::default().with_tolerance(f64::NAN).validate().is_err());
        assert!(DofTableConfig::default().with_tolerance(-1.0).validate().is_err());
    }

    #[test]
    fn config_roundtrips_through_json() {
        let cfg = DofTableConfig::default().with_tag_base(100).with_tolerance(1e-6);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: DofTableConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
        assert_eq!(back.tags.responses, CommTag::new(102));
    }
}
