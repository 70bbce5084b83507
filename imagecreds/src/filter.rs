// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use log::debug;
use regex::Regex;

use crate::errors::ParseError;

/// Images matched by this pattern are excluded unless the configuration says
/// otherwise.
pub const DEFAULT_EXCLUDE_PATTERN: &str = "k8s.gcr.io/*";

/// Decides which images take part in credential resolution.
///
/// Patterns are globs where `*` stands for any run of characters, `/`
/// included. Everything else is literal and case-sensitive, and a pattern has
/// to cover the whole canonical name.
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    patterns: Vec<(String, Regex)>,
}

impl ImageFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ParseError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let pattern = p.as_ref();
                compile_glob(pattern).map(|re| (pattern.to_string(), re))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|(p, _)| p.as_str())
    }

    /// Returns true if any pattern matches `image_name`.
    pub fn is_excluded(&self, image_name: &str) -> bool {
        match self.patterns.iter().find(|(_, re)| re.is_match(image_name)) {
            Some((pattern, _)) => {
                debug!("Excluding image {image_name}, matched pattern {pattern}");
                true
            }
            None => false,
        }
    }

    pub fn includes(&self, image_name: &str) -> bool {
        !self.is_excluded(image_name)
    }
}

fn compile_glob(pattern: &str) -> Result<Regex, ParseError> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{body}$")).map_err(|source| ParseError::InvalidExcludePattern {
        pattern: pattern.to_string(),
        source,
    })
}
