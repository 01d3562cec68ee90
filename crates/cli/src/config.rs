// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Profile selection and YAML loading.
//!
//! The config file maps profile names to option sets:
//!
//! ```yaml
//! development:
//!   region: Development
//!   registry:
//!     backend: memory
//! production:
//!   region: us-east
//!   registry:
//!     backend: zk
//!     servers: ["zk1:2181", "zk2:2181"]
//! ```

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::{info, warn};

use skynet_core::Config;

use crate::env;

/// Load the profile selected by `SKYNET_ENV` from the file selected by
/// `SKYNET_CONFIG`. No file or no profile means defaults.
pub fn load() -> Result<Config> {
    let profile = env::environment();
    let Some(path) = env::config_path() else {
        info!(profile, "no configuration file; using defaults");
        return Ok(Config::default());
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("reading configuration file {}", path.display()))?;
    let profiles: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing configuration file {}", path.display()))?;

    match profiles.get(&profile) {
        Some(value) => {
            let config: Config = serde_yaml::from_value(value.clone())
                .with_context(|| format!("profile {:?} in {}", profile, path.display()))?;
            info!(profile, file = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => {
            warn!(profile, file = %path.display(), "profile not found; using defaults");
            Ok(Config::default())
        }
    }
}
