// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the launcher.

use std::path::PathBuf;

/// Configuration profile name: `SKYNET_ENV`, defaulting to development.
pub fn environment() -> String {
    std::env::var("SKYNET_ENV").unwrap_or_else(|_| "development".to_string())
}

/// Configuration file: `SKYNET_CONFIG`, falling back to the conventional
/// location when that exists.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SKYNET_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let conventional = PathBuf::from("config/skynet.yml");
    conventional.exists().then_some(conventional)
}
