use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

use fitzy_core::assets::PHOTOS_DIR_NAME;
use fitzy_core::{DeploymentProfile, LoadPolicy, StoreConfig};

pub struct Config {
    pub db_path: PathBuf,
    pub photos_dir: PathBuf,
    pub load_policy: LoadPolicy,
}

impl Config {
    pub fn load(load_policy: Option<LoadPolicy>) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "fitzy").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let load_policy = match load_policy {
            Some(policy) => policy,
            None => policy_from_env(
                std::env::var("FITZY_LOAD_POLICY").ok().as_deref(),
                std::env::var("FITZY_PROFILE").ok().as_deref(),
            )?,
        };

        Ok(Config {
            db_path: data_dir.join("fitzy.db"),
            photos_dir: data_dir.join(PHOTOS_DIR_NAME),
            load_policy,
        })
    }

    pub fn store_config(&self, in_memory: bool) -> StoreConfig {
        let config = if in_memory {
            StoreConfig::in_memory()
        } else {
            StoreConfig::on_disk(&self.db_path)
        };
        config.with_load_policy(self.load_policy)
    }
}

/// An explicit policy beats the deployment profile. Release builds default to
/// production.
fn policy_from_env(policy: Option<&str>, profile: Option<&str>) -> Result<LoadPolicy> {
    if let Some(p) = policy {
        return p.parse().context("Invalid FITZY_LOAD_POLICY");
    }
    let profile = match profile {
        Some(p) => p.parse().context("Invalid FITZY_PROFILE")?,
        None if cfg!(debug_assertions) => DeploymentProfile::Development,
        None => DeploymentProfile::Production,
    };
    Ok(LoadPolicy::for_profile(profile))
}
