// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use std::{fmt, str::FromStr};

use oci_client::Reference;

use crate::errors::ParseError;

/// The registry host and repository of an image, without tag or digest.
///
/// Two references that only differ by tag share the same `ImageName`, which
/// is what credentials are keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageName {
    registry: String,
    repository: String,
}

impl ImageName {
    pub fn new(registry: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
        }
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)
    }
}

/// A parsed container image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    name: ImageName,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(image: &str) -> Result<Self, ParseError> {
        // Reference applies the docker naming defaults: no host means
        // docker.io and single component names live under library/.
        let reference: Reference =
            image
                .parse()
                .map_err(|source| ParseError::InvalidImageReference {
                    image: image.to_string(),
                    source,
                })?;

        // Reference reports "latest" for an untagged name, keep only a tag
        // that was written out.
        let name_part = image.split('@').next().unwrap_or(image);
        let tagged = name_part
            .rsplit('/')
            .next()
            .is_some_and(|last| last.contains(':'));

        Ok(Self {
            name: ImageName::new(reference.registry(), reference.repository()),
            tag: reference.tag().filter(|_| tagged).map(str::to_string),
            digest: reference.digest().map(str::to_string),
        })
    }

    pub fn name(&self) -> &ImageName {
        &self.name
    }

    pub fn registry(&self) -> &str {
        self.name.registry()
    }

    pub fn repository(&self) -> &str {
        self.name.repository()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Canonical `host/repository` form used for exclusion matching.
    pub fn canonical_name(&self) -> String {
        self.name.to_string()
    }
}

impl FromStr for ImageRef {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
