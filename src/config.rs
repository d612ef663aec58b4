// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistent configuration stored in `~/.photogallery/config.json`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fetch::flickr::DEFAULT_ENDPOINT;
use crate::fetch::{HttpTimeouts, CONNECT_TIMEOUT_SECS, REQUEST_TIMEOUT_SECS};

/// Number of recycled slots the thumbnail demo simulates by default.
pub const DEFAULT_SLOTS: usize = 12;

const CONFIG_DIR_NAME: &str = ".photogallery";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    pub flickr_api_key: Option<String>,
    /// Flickr REST endpoint (default: the public API).
    pub endpoint: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    /// Downscale decoded thumbnails so neither side exceeds this.
    pub thumbnail_max_edge: Option<u32>,
    /// Recycled slots in the thumbnail demo.
    pub slots: Option<usize>,
}

impl Config {
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT)
    }

    pub fn slots(&self) -> usize {
        self.slots.filter(|&n| n > 0).unwrap_or(DEFAULT_SLOTS)
    }

    pub fn timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: Duration::from_secs(self.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS)),
            request: Duration::from_secs(self.request_timeout_secs.unwrap_or(REQUEST_TIMEOUT_SECS)),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(CONFIG_DIR_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the user config, falling back to defaults when no file exists.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(config, &config_path()?)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
