// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use std::{path::Path, str::FromStr};

use log::{debug, warn};
use serde::Deserialize;

use crate::{errors::ParseError, filter::DEFAULT_EXCLUDE_PATTERN};

pub const CFGPATH_IMAGECREDS_CONFIG: &str = "/etc/imagecreds/imagecreds.toml";

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

impl Config {
    /// Reads the config at `path`, falling back to defaults if it is missing
    /// or does not parse.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(c) => c.parse().unwrap_or_else(|e| {
                warn!(
                    "Unable to parse config file {}, using defaults: {e}",
                    path.display()
                );
                Config::default()
            }),
            Err(e) => {
                debug!(
                    "Unable to read config file {}, using defaults: {e}",
                    path.display()
                );
                Config::default()
            }
        }
    }
}

impl FromStr for Config {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(ParseError::ConfigParseError)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Glob patterns of images to leave out of credential resolution.
    #[serde(default = "default_exclude_images")]
    pub exclude_images: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            exclude_images: default_exclude_images(),
        }
    }
}

fn default_exclude_images() -> Vec<String> {
    vec![DEFAULT_EXCLUDE_PATTERN.to_string()]
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Number of workloads whose secrets are fetched at the same time.
    #[serde(default = "default_max_concurrent_workloads")]
    pub max_concurrent_workloads: usize,
    #[serde(default)]
    pub precedence: SecretPrecedence,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workloads: default_max_concurrent_workloads(),
            precedence: SecretPrecedence::default(),
        }
    }
}

fn default_max_concurrent_workloads() -> usize {
    8
}

/// Which level of pull secrets wins when both hold credentials for the same
/// host of the same image.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SecretPrecedence {
    /// Workload secrets are merged first, then the service account's.
    #[default]
    ServiceAccountLast,
    /// Service account secrets are merged first, then the workload's.
    WorkloadLast,
}
