// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

//! Resolve the registry credentials for the container images that workloads
//! run in a Kubernetes cluster.
//!
//! For each workload the [`Resolver`] collects the images of its pod
//! template, drops those matched by the exclusion globs, then reads the image
//! pull secrets of the workload and of its service account through a
//! [`SecretAccessor`]. The decoded credentials end up in two places of a
//! [`Scan`]: per image, where later secrets win, and in the cluster wide
//! defaults, where the first secret seen for a host wins.
//!
//! A secret, service account or image that cannot be read is logged and
//! skipped; it never stops the rest of the scan.

pub mod accessor;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod filter;
pub mod image;
pub mod merge;
pub mod pod;

pub use accessor::{KubeAccessor, RegistrySecret, SecretAccessor, SecretRef};
pub use config::Config;
pub use credentials::{Auth, Credentials, DefaultCredentials, ImageCreds, SecretEncoding};
pub use filter::ImageFilter;
pub use image::{ImageName, ImageRef};
pub use merge::{Resolution, Resolver, Scan, SharedScan};
pub use pod::{Container, PodTemplate, Workload};
