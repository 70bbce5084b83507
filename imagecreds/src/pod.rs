// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use std::fmt;

use k8s_openapi::api::core::v1::{self as corev1, PodSpec, PodTemplateSpec};

/// Service account used by pods that do not name one.
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRole {
    Init,
    Regular,
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerRole::Init => write!(f, "init container"),
            ContainerRole::Regular => write!(f, "container"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub image: String,
}

impl Container {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
        }
    }
}

/// What credential resolution needs to know about a workload's pod template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodTemplate {
    /// Empty means [`DEFAULT_SERVICE_ACCOUNT`].
    pub service_account_name: String,
    pub image_pull_secrets: Vec<String>,
    pub init_containers: Vec<Container>,
    pub containers: Vec<Container>,
}

impl PodTemplate {
    pub fn service_account(&self) -> &str {
        if self.service_account_name.is_empty() {
            DEFAULT_SERVICE_ACCOUNT
        } else {
            &self.service_account_name
        }
    }

    /// All containers, init containers first, each in declaration order.
    pub fn all_containers(&self) -> impl Iterator<Item = (ContainerRole, &Container)> {
        self.init_containers
            .iter()
            .map(|c| (ContainerRole::Init, c))
            .chain(self.containers.iter().map(|c| (ContainerRole::Regular, c)))
    }
}

/// A workload and the pod template its pods are created from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workload {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub template: PodTemplate,
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

fn containers(list: &[corev1::Container]) -> Vec<Container> {
    // Containers without an image are left for the API server to reject.
    list.iter()
        .filter_map(|c| c.image.as_ref().map(|image| Container::new(&c.name, image)))
        .collect()
}

impl From<&PodSpec> for PodTemplate {
    fn from(spec: &PodSpec) -> Self {
        Self {
            service_account_name: spec.service_account_name.clone().unwrap_or_default(),
            image_pull_secrets: spec
                .image_pull_secrets
                .iter()
                .flatten()
                .map(|r| r.name.clone())
                .filter(|name| !name.is_empty())
                .collect(),
            init_containers: containers(spec.init_containers.as_deref().unwrap_or_default()),
            containers: containers(&spec.containers),
        }
    }
}

impl From<&PodTemplateSpec> for PodTemplate {
    fn from(template: &PodTemplateSpec) -> Self {
        template.spec.as_ref().map(Self::from).unwrap_or_default()
    }
}
