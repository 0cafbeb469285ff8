use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, bail};

use crate::merge::MergePolicy;

pub const DEFAULT_RECENT_WINDOW_DAYS: u32 = 90;

/// What to do when the on-disk store cannot be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Refuse to start; `RecordStore::open` returns the error.
    Abort,
    /// Log, then serve reads from an empty in-memory store and refuse commits.
    Degrade,
}

impl LoadPolicy {
    #[must_use]
    pub fn for_profile(profile: DeploymentProfile) -> Self {
        match profile {
            DeploymentProfile::Development => Self::Abort,
            DeploymentProfile::Production => Self::Degrade,
        }
    }
}

impl FromStr for LoadPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "degrade" => Ok(Self::Degrade),
            _ => bail!("Invalid load policy '{s}'. Use 'abort' or 'degrade'"),
        }
    }
}

impl fmt::Display for LoadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::Degrade => f.write_str("degrade"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentProfile {
    Development,
    Production,
}

impl FromStr for DeploymentProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" | "debug" => Ok(Self::Development),
            "prod" | "production" | "release" => Ok(Self::Production),
            _ => bail!("Invalid deployment profile '{s}'. Use 'development' or 'production'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    OnDisk(PathBuf),
    /// Ephemeral store, discarded when the last context is dropped.
    InMemory,
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnDisk(path) => write!(f, "{}", path.display()),
            Self::InMemory => f.write_str(":memory:"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub location: StoreLocation,
    pub load_policy: LoadPolicy,
    pub merge_policy: MergePolicy,
    pub recent_window_days: u32,
}

impl StoreConfig {
    #[must_use]
    pub fn on_disk(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::OnDisk(path.into()),
            ..Self::in_memory()
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::InMemory,
            load_policy: LoadPolicy::Abort,
            merge_policy: MergePolicy::default(),
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
        }
    }

    #[must_use]
    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    #[must_use]
    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_policy_parse() {
        assert_eq!("abort".parse::<LoadPolicy>().unwrap(), LoadPolicy::Abort);
        assert_eq!(" Degrade ".parse::<LoadPolicy>().unwrap(), LoadPolicy::Degrade);
        assert!("crash".parse::<LoadPolicy>().is_err());
    }

    #[test]
    fn test_load_policy_follows_profile() {
        let dev: DeploymentProfile = "development".parse().unwrap();
        let prod: DeploymentProfile = "release".parse().unwrap();
        assert_eq!(LoadPolicy::for_profile(dev), LoadPolicy::Abort);
        assert_eq!(LoadPolicy::for_profile(prod), LoadPolicy::Degrade);
    }

    #[test]
    fn test_on_disk_config_defaults() {
        let config = StoreConfig::on_disk("/tmp/fitzy.db");
        assert_eq!(
            config.location,
            StoreLocation::OnDisk(PathBuf::from("/tmp/fitzy.db"))
        );
        assert_eq!(config.recent_window_days, 90);
        assert_eq!(config.merge_policy, MergePolicy::PropertyTrump);
    }
}
