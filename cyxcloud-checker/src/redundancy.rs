//! Redundancy policy & override map
//!
//! Canonicalizes a segment's (k, r, o, n) redundancy scheme after
//! applying threshold/target overrides keyed by k.

use std::collections::HashMap;

use crate::error::{CheckerError, Result};

/// A segment's erasure-coding redundancy scheme.
///
/// Invariant: `1 <= k <= r <= o <= n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RedundancyScheme {
    /// Required pieces to reconstruct.
    pub k: u16,
    /// Repair threshold: enqueue when healthy count drops to or below this.
    pub r: u16,
    /// Optimal/success target.
    pub o: u16,
    /// Total pieces produced.
    pub n: u16,
}

impl RedundancyScheme {
    pub fn new(k: u16, r: u16, o: u16, n: u16) -> Result<Self> {
        let scheme = Self { k, r, o, n };
        scheme.validate()?;
        Ok(scheme)
    }

    fn validate(&self) -> Result<()> {
        if !(1 <= self.k && self.k <= self.r && self.r <= self.o && self.o <= self.n) {
            return Err(CheckerError::InvalidOverride(format!(
                "redundancy scheme must satisfy 1 <= k <= r <= o <= n, got k={} r={} o={} n={}",
                self.k, self.r, self.o, self.n
            )));
        }
        Ok(())
    }

    /// Validates an overridden scheme. `r` and `o` are independent
    /// repair-decision knobs past this point (the repair threshold and
    /// the success target), so unlike a freshly-recorded scheme they
    /// are not required to stay ordered relative to each other —
    /// operators may push `r` above `o` to repair more eagerly without
    /// also raising the piece count a repair job aims to restore.
    fn validate_overridden(&self) -> Result<()> {
        if self.k < 1 || self.k > self.n {
            return Err(CheckerError::InvalidOverride(format!(
                "overridden scheme must satisfy 1 <= k <= n, got k={} n={}",
                self.k, self.n
            )));
        }
        if self.r < self.k || self.r > self.n {
            return Err(CheckerError::InvalidOverride(format!(
                "overridden repair threshold must satisfy k <= r <= n, got k={} r={} n={}",
                self.k, self.r, self.n
            )));
        }
        if self.o < self.k || self.o > self.n {
            return Err(CheckerError::InvalidOverride(format!(
                "overridden repair target must satisfy k <= o <= n, got k={} o={} n={}",
                self.k, self.o, self.n
            )));
        }
        Ok(())
    }

    /// The effective (k, r, o, n) key used for stats bucketing.
    pub fn key(&self) -> RedundancyKey {
        RedundancyKey {
            k: self.k,
            r: self.r,
            o: self.o,
            n: self.n,
        }
    }
}

/// The effective redundancy key after overrides, used to bucket stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RedundancyKey {
    pub k: u16,
    pub r: u16,
    pub o: u16,
    pub n: u16,
}

impl std::fmt::Display for RedundancyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}/{}", self.k, self.r, self.o, self.n)
    }
}

/// Threshold/target override maps, keyed by `k`.
///
/// `RepairThresholdOverrides` substitutes r with r', `RepairTargetOverrides`
/// substitutes o with o'. Both are parsed from `k-value` comma-separated
/// strings (e.g. `"2-5,4-8"`).
#[derive(Debug, Clone, Default)]
pub struct OverrideMap {
    threshold: HashMap<u16, u16>,
    target: HashMap<u16, u16>,
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `k-value` comma-separated override string into the
    /// threshold-override map (`RepairThresholdOverrides`).
    pub fn with_threshold_overrides(mut self, spec: &str) -> Result<Self> {
        self.threshold = parse_kv_map(spec)?;
        Ok(self)
    }

    /// Parse a `k-value` comma-separated override string into the
    /// target-override map (`RepairTargetOverrides`).
    pub fn with_target_overrides(mut self, spec: &str) -> Result<Self> {
        self.target = parse_kv_map(spec)?;
        Ok(self)
    }

    /// Apply overrides to a raw scheme, producing the effective scheme
    /// used for the repair decision. Pure function: looks up both
    /// maps by `k`, substitutes present entries, validates the result.
    ///
    /// Note the effective `r` and `o` are allowed to cross (an operator
    /// raising the repair threshold past the success target is valid
    /// and simply makes repair more eager; see the threshold-override
    /// scenario in the module tests).
    pub fn apply(&self, scheme: RedundancyScheme) -> Result<RedundancyScheme> {
        let r = self.threshold.get(&scheme.k).copied().unwrap_or(scheme.r);
        let o = self.target.get(&scheme.k).copied().unwrap_or(scheme.o);

        let effective = RedundancyScheme {
            k: scheme.k,
            r,
            o,
            n: scheme.n,
        };
        effective.validate_overridden()?;
        Ok(effective)
    }
}

fn parse_kv_map(spec: &str) -> Result<HashMap<u16, u16>> {
    let mut map = HashMap::new();
    if spec.trim().is_empty() {
        return Ok(map);
    }

    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (k_str, v_str) = entry.split_once('-').ok_or_else(|| {
            CheckerError::InvalidOverride(format!("malformed override entry: {entry}"))
        })?;

        let k: u16 = k_str
            .trim()
            .parse()
            .map_err(|_| CheckerError::InvalidOverride(format!("invalid k in: {entry}")))?;
        let v: u16 = v_str
            .trim()
            .parse()
            .map_err(|_| CheckerError::InvalidOverride(format!("invalid value in: {entry}")))?;

        if map.insert(k, v).is_some() {
            return Err(CheckerError::InvalidOverride(format!(
                "duplicate override key: {k}"
            )));
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_validation() {
        assert!(RedundancyScheme::new(2, 3, 4, 5).is_ok());
        assert!(RedundancyScheme::new(4, 3, 4, 5).is_err()); // k > r
        assert!(RedundancyScheme::new(2, 5, 4, 5).is_err()); // r > o
        assert!(RedundancyScheme::new(2, 3, 6, 5).is_err()); // o > n
        assert!(RedundancyScheme::new(0, 3, 4, 5).is_err()); // k < 1
    }

    #[test]
    fn test_no_overrides_passthrough() {
        let overrides = OverrideMap::new();
        let scheme = RedundancyScheme::new(2, 3, 4, 5).unwrap();
        let applied = overrides.apply(scheme).unwrap();
        assert_eq!(applied.r, 3);
        assert_eq!(applied.o, 4);
    }

    #[test]
    fn test_threshold_override_applied() {
        // Scheme (k=2,r=3,o=4,n=5) with threshold-override 2->5:
        // decisions use r'=5, so 4 healthy pieces now trigger enqueue
        // where they previously would not. r' is allowed to exceed o.
        let overrides = OverrideMap::new()
            .with_threshold_overrides("2-5")
            .unwrap();
        let scheme = RedundancyScheme::new(2, 3, 4, 5).unwrap();

        let applied = overrides.apply(scheme).unwrap();
        assert_eq!(applied.r, 5);
        assert_eq!(applied.o, 4);
    }

    #[test]
    fn test_overridden_r_beyond_n_rejected() {
        let overrides = OverrideMap::new()
            .with_threshold_overrides("2-9")
            .unwrap();
        let scheme = RedundancyScheme::new(2, 3, 4, 5).unwrap();
        assert!(overrides.apply(scheme).is_err());
    }

    #[test]
    fn test_threshold_and_target_override_applied() {
        let overrides = OverrideMap::new()
            .with_threshold_overrides("2-4")
            .unwrap()
            .with_target_overrides("2-5")
            .unwrap();
        let scheme = RedundancyScheme::new(2, 3, 4, 5).unwrap();
        let applied = overrides.apply(scheme).unwrap();
        assert_eq!(applied.r, 4);
        assert_eq!(applied.o, 5);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let result = OverrideMap::new().with_threshold_overrides("2-3,2-4");
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_entry_rejected() {
        let result = OverrideMap::new().with_threshold_overrides("notanentry");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_spec_is_noop() {
        let overrides = OverrideMap::new().with_threshold_overrides("").unwrap();
        let scheme = RedundancyScheme::new(2, 3, 4, 5).unwrap();
        let applied = overrides.apply(scheme).unwrap();
        assert_eq!(applied.r, 3);
    }

    #[test]
    fn test_redundancy_key_display() {
        let key = RedundancyKey { k: 2, r: 3, o: 4, n: 5 };
        assert_eq!(key.to_string(), "2/3/4/5");
    }
}
