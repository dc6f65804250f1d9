//! Tier configuration and the built-in subscription tiers.
//!
//! A tier maps each rate-limited operation to the constraint the service
//! enforces on it. Custom tiers can be loaded from YAML:
//!
//! ```yaml
//! list_replays:
//!   burst_per_second: 2
//!   max_quota: 500
//!   max_window_seconds: 3600
//! get_replay:
//!   burst_per_second: 16
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::operation::Operation;
use crate::error::{Result, ThrottleError};

/// Rolling window length used by every windowed built-in limit.
const HOUR_SECS: f64 = 3600.0;

/// Largest window budget a constraint may carry; the window history holds
/// one timestamp per unit of quota.
pub const MAX_QUOTA: u32 = 1_000_000;

/// The rate constraint for one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Maximum instantaneous call rate
    pub burst_per_second: f64,
    /// Maximum calls within the rolling window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quota: Option<u32>,
    /// Length of the rolling window in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_window_seconds: Option<f64>,
}

/// The validated window part of a [`Constraint`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub quota: u32,
    pub seconds: f64,
}

impl Constraint {
    /// A constraint that only limits burst spacing.
    pub fn burst(burst_per_second: f64) -> Self {
        Self {
            burst_per_second,
            max_quota: None,
            max_window_seconds: None,
        }
    }

    /// A constraint with both a burst rate and a rolling window budget.
    pub fn windowed(burst_per_second: f64, max_quota: u32, max_window_seconds: f64) -> Self {
        Self {
            burst_per_second,
            max_quota: Some(max_quota),
            max_window_seconds: Some(max_window_seconds),
        }
    }

    /// Check the constraint invariants.
    pub fn validate(&self) -> Result<()> {
        if !(self.burst_per_second.is_finite() && self.burst_per_second > 0.0) {
            return Err(ThrottleError::InvalidConfiguration(format!(
                "burst_per_second must be a positive number, got {}",
                self.burst_per_second
            )));
        }
        if Duration::try_from_secs_f64(1.0 / self.burst_per_second).is_err() {
            return Err(ThrottleError::InvalidConfiguration(format!(
                "burst_per_second {} gives a burst interval too long to wait for",
                self.burst_per_second
            )));
        }

        match (self.max_quota, self.max_window_seconds) {
            (None, None) => Ok(()),
            (Some(0), Some(_)) => Err(ThrottleError::InvalidConfiguration(
                "max_quota must be greater than zero".to_string(),
            )),
            (Some(quota), Some(_)) if quota > MAX_QUOTA => {
                Err(ThrottleError::InvalidConfiguration(format!(
                    "max_quota must be at most {}, got {}",
                    MAX_QUOTA, quota
                )))
            }
            (Some(_), Some(secs)) if !(secs.is_finite() && secs > 0.0) => {
                Err(ThrottleError::InvalidConfiguration(format!(
                    "max_window_seconds must be a positive number, got {}",
                    secs
                )))
            }
            (Some(_), Some(secs)) if Duration::try_from_secs_f64(secs).is_err() => {
                Err(ThrottleError::InvalidConfiguration(format!(
                    "max_window_seconds {} is too long to wait for",
                    secs
                )))
            }
            (Some(_), Some(_)) => Ok(()),
            (Some(_), None) => Err(ThrottleError::InvalidConfiguration(
                "max_quota requires max_window_seconds".to_string(),
            )),
            (None, Some(_)) => Err(ThrottleError::InvalidConfiguration(
                "max_window_seconds requires max_quota".to_string(),
            )),
        }
    }

    /// Minimum spacing between two consecutive calls.
    pub fn burst_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.burst_per_second).unwrap_or(Duration::MAX)
    }

    /// The window budget, if this constraint has one.
    pub fn window(&self) -> Option<Window> {
        match (self.max_quota, self.max_window_seconds) {
            (Some(quota), Some(seconds)) => Some(Window { quota, seconds }),
            _ => None,
        }
    }
}

/// An immutable mapping from operation kind to its constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierConfig {
    limits: BTreeMap<Operation, Constraint>,
}

impl TierConfig {
    /// Create an empty tier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the constraint for an operation.
    pub fn with_limit(mut self, operation: Operation, constraint: Constraint) -> Self {
        self.limits.insert(operation, constraint);
        self
    }

    /// Load a tier from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading tier configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a tier from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let tier: TierConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse tier config: {}", e)))?;
        tier.validate()?;
        Ok(tier)
    }

    /// Check every constraint in the tier.
    pub fn validate(&self) -> Result<()> {
        for (operation, constraint) in &self.limits {
            constraint.validate().map_err(|e| match e {
                ThrottleError::InvalidConfiguration(msg) => {
                    ThrottleError::InvalidConfiguration(format!("{}: {}", operation, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Get the constraint for an operation.
    pub fn get(&self, operation: Operation) -> Option<&Constraint> {
        self.limits.get(&operation)
    }

    /// Iterate over the configured operations in order.
    pub fn iter(&self) -> impl Iterator<Item = (Operation, &Constraint)> {
        self.limits.iter().map(|(op, c)| (*op, c))
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

/// Built-in subscription tiers, most generous first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    GrandChampion,
    Champion,
    Diamond,
    Gold,
    /// Accounts without a subscription.
    #[default]
    #[serde(alias = "none")]
    Regular,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::GrandChampion,
        Tier::Champion,
        Tier::Diamond,
        Tier::Gold,
        Tier::Regular,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::GrandChampion => "grand_champion",
            Tier::Champion => "champion",
            Tier::Diamond => "diamond",
            Tier::Gold => "gold",
            Tier::Regular => "regular",
        }
    }

    /// Build the operation limits for this tier.
    pub fn config(&self) -> TierConfig {
        // (burst, quota for replay/group reads and writes, quota for listings, download)
        let (burst, quota, list_quota, download) = match self {
            Tier::GrandChampion => {
                return uniform(Constraint::burst(16.0), Constraint::burst(2.0));
            }
            Tier::Champion => {
                return uniform(
                    Constraint::burst(8.0),
                    Constraint::windowed(2.0, 2000, HOUR_SECS),
                );
            }
            Tier::Diamond => (4.0, 5000, 2000, Constraint::windowed(2.0, 1000, HOUR_SECS)),
            Tier::Gold => (2.0, 2000, 1000, Constraint::windowed(2.0, 400, HOUR_SECS)),
            Tier::Regular => (2.0, 1000, 500, Constraint::windowed(1.0, 200, HOUR_SECS)),
        };

        let mut tier = TierConfig::new();
        for op in Operation::LIMITED {
            let constraint = match op {
                Operation::DownloadReplay => download,
                Operation::ListReplays | Operation::ListGroups => {
                    Constraint::windowed(burst, list_quota, HOUR_SECS)
                }
                _ => Constraint::windowed(burst, quota, HOUR_SECS),
            };
            tier = tier.with_limit(op, constraint);
        }
        tier
    }
}

/// One constraint for every limited operation except downloads.
fn uniform(common: Constraint, download: Constraint) -> TierConfig {
    Operation::LIMITED.iter().fold(TierConfig::new(), |tier, &op| {
        let constraint = if op == Operation::DownloadReplay {
            download
        } else {
            common
        };
        tier.with_limit(op, constraint)
    })
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ThrottleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "grand_champion" => Ok(Tier::GrandChampion),
            "champion" => Ok(Tier::Champion),
            "diamond" => Ok(Tier::Diamond),
            "gold" => Ok(Tier::Gold),
            "regular" | "none" => Ok(Tier::Regular),
            other => Err(ThrottleError::InvalidConfiguration(format!(
                "unknown tier: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_burst_only() {
        assert!(Constraint::burst(0.5).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_quota_without_window() {
        let constraint = Constraint {
            burst_per_second: 2.0,
            max_quota: Some(5),
            max_window_seconds: None,
        };
        assert!(matches!(
            constraint.validate(),
            Err(ThrottleError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_window_without_quota() {
        let constraint = Constraint {
            burst_per_second: 2.0,
            max_quota: None,
            max_window_seconds: Some(60.0),
        };
        assert!(constraint.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_values() {
        assert!(Constraint::burst(0.0).validate().is_err());
        assert!(Constraint::burst(-1.0).validate().is_err());
        assert!(Constraint::burst(f64::NAN).validate().is_err());
        assert!(Constraint::windowed(2.0, 0, 60.0).validate().is_err());
        assert!(Constraint::windowed(2.0, 5, 0.0).validate().is_err());
        assert!(Constraint::windowed(2.0, 5, f64::INFINITY).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_waits_too_long_for_duration() {
        let err = Constraint::windowed(2.0, 1, 1e20).validate().unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidConfiguration(msg) if msg.contains("max_window_seconds")));

        let err = Constraint::burst(1e-20).validate().unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidConfiguration(msg) if msg.contains("burst_per_second")));

        assert!(Constraint::windowed(2.0, 1, 1e9).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_quota() {
        assert!(Constraint::windowed(2.0, MAX_QUOTA, 3600.0).validate().is_ok());
        assert!(matches!(
            Constraint::windowed(2.0, 4_000_000_000, 3600.0).validate(),
            Err(ThrottleError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_parse_tier_yaml_rejects_huge_window() {
        let yaml = r#"
get_replay:
  burst_per_second: 2
  max_quota: 10
  max_window_seconds: 1e20
"#;
        assert!(matches!(
            TierConfig::from_yaml(yaml),
            Err(ThrottleError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_burst_interval() {
        assert_eq!(Constraint::burst(2.0).burst_interval(), Duration::from_millis(500));
        assert_eq!(Constraint::burst(16.0).burst_interval(), Duration::from_micros(62_500));
    }

    #[test]
    fn test_builtin_tiers_are_valid() {
        for tier in Tier::ALL {
            let config = tier.config();
            assert!(config.validate().is_ok(), "{} should be valid", tier);
            assert_eq!(config.len(), Operation::LIMITED.len());
        }
    }

    #[test]
    fn test_regular_tier_values() {
        let config = Tier::Regular.config();
        assert_eq!(
            config.get(Operation::ListReplays),
            Some(&Constraint::windowed(2.0, 500, 3600.0))
        );
        assert_eq!(
            config.get(Operation::PatchGroup),
            Some(&Constraint::windowed(2.0, 1000, 3600.0))
        );
        assert_eq!(
            config.get(Operation::DownloadReplay),
            Some(&Constraint::windowed(1.0, 200, 3600.0))
        );
        assert_eq!(config.get(Operation::Ping), None);
    }

    #[test]
    fn test_champion_tier_values() {
        let config = Tier::Champion.config();
        assert_eq!(config.get(Operation::GetReplay), Some(&Constraint::burst(8.0)));
        assert_eq!(
            config.get(Operation::DownloadReplay),
            Some(&Constraint::windowed(2.0, 2000, 3600.0))
        );
    }

    #[test]
    fn test_grand_champion_is_burst_only() {
        let config = Tier::GrandChampion.config();
        assert!(config.iter().all(|(_, c)| c.window().is_none()));
        assert_eq!(config.get(Operation::DownloadReplay), Some(&Constraint::burst(2.0)));
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("gold".parse::<Tier>().unwrap(), Tier::Gold);
        assert_eq!("none".parse::<Tier>().unwrap(), Tier::Regular);
        assert_eq!(Tier::default(), Tier::Regular);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_parse_tier_yaml() {
        let yaml = r#"
list_replays:
  burst_per_second: 2
  max_quota: 500
  max_window_seconds: 3600
get_replay:
  burst_per_second: 16
"#;
        let tier = TierConfig::from_yaml(yaml).unwrap();
        assert_eq!(tier.len(), 2);
        assert_eq!(
            tier.get(Operation::ListReplays),
            Some(&Constraint::windowed(2.0, 500, 3600.0))
        );
        assert_eq!(tier.get(Operation::GetReplay), Some(&Constraint::burst(16.0)));
    }

    #[test]
    fn test_parse_tier_yaml_rejects_invalid_constraint() {
        let yaml = r#"
list_replays:
  burst_per_second: 2
  max_quota: 5
"#;
        let err = TierConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ThrottleError::InvalidConfiguration(msg) if msg.starts_with("list_replays")));
    }

    #[test]
    fn test_parse_tier_yaml_rejects_unknown_operation() {
        let yaml = r#"
nonexistent_op:
  burst_per_second: 2
"#;
        assert!(matches!(
            TierConfig::from_yaml(yaml),
            Err(ThrottleError::Config(_))
        ));
    }
}
