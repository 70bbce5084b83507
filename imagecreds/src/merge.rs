// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use std::sync::Arc;

use futures::{StreamExt, stream};
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::{
    accessor::{SecretAccessor, SecretRef},
    config::{Config, SecretPrecedence},
    credentials::{Credentials, DefaultCredentials, ImageCreds},
    errors::ParseError,
    filter::ImageFilter,
    image::{ImageName, ImageRef},
    pod::{ContainerRole, PodTemplate, Workload},
};

/// A container whose image could not be parsed.
#[derive(Debug)]
pub struct InvalidImage {
    pub role: ContainerRole,
    pub container: String,
    pub error: ParseError,
}

/// The outcome of resolving one workload, before it is merged into a
/// [`Scan`].
#[derive(Debug, Default)]
pub struct Resolution {
    /// Images that passed the exclusion filter, first occurrence order.
    pub images: Vec<ImageName>,
    /// Decoded pull secrets, lowest precedence first.
    pub secrets: Vec<(SecretRef, Credentials)>,
    pub invalid_images: Vec<InvalidImage>,
}

impl Resolution {
    /// The credentials of all secrets combined, later secrets winning.
    pub fn credentials(&self) -> Credentials {
        let mut creds = Credentials::new();
        for (_, c) in &self.secrets {
            creds.merge(c);
        }
        creds
    }
}

/// The state built up while scanning a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub image_creds: ImageCreds,
    pub defaults: DefaultCredentials,
}

impl Scan {
    pub fn new(defaults: DefaultCredentials) -> Self {
        Self {
            image_creds: ImageCreds::new(),
            defaults,
        }
    }

    /// Merges a workload's resolution.
    ///
    /// Each secret is offered to the defaults in order, so the first secret
    /// seen for a host stays the default for it. Per image, a later secret
    /// replaces an earlier one for the same host, and entries left by other
    /// workloads are merged into rather than replaced.
    pub fn apply(&mut self, resolution: &Resolution) {
        for (secret_ref, creds) in &resolution.secrets {
            let added = self.defaults.absorb(creds);
            if added > 0 {
                debug!("{secret_ref} added {added} default registry credential(s)");
            }
        }

        let creds = resolution.credentials();
        for image in &resolution.images {
            self.image_creds
                .entry(image.clone())
                .or_default()
                .merge(&creds);
        }
    }
}

/// A [`Scan`] shared by tasks resolving workloads concurrently.
///
/// Resolve outside the lock, then [`SharedScan::apply`].
#[derive(Debug, Clone, Default)]
pub struct SharedScan(Arc<Mutex<Scan>>);

impl SharedScan {
    pub fn new(scan: Scan) -> Self {
        Self(Arc::new(Mutex::new(scan)))
    }

    pub async fn apply(&self, resolution: &Resolution) {
        self.0.lock().await.apply(resolution);
    }

    pub async fn snapshot(&self) -> Scan {
        self.0.lock().await.clone()
    }
}

/// Works out the images of workloads and the registry credentials that apply
/// to them.
pub struct Resolver<A> {
    accessor: A,
    filter: ImageFilter,
    precedence: SecretPrecedence,
    max_concurrent_workloads: usize,
}

impl<A: SecretAccessor> Resolver<A> {
    pub fn new(accessor: A, filter: ImageFilter) -> Self {
        Self {
            accessor,
            filter,
            precedence: SecretPrecedence::default(),
            max_concurrent_workloads: 1,
        }
    }

    pub fn from_config(accessor: A, config: &Config) -> Result<Self, ParseError> {
        let filter = ImageFilter::new(config.registry.exclude_images.as_slice())?;
        Ok(Self::new(accessor, filter)
            .with_precedence(config.scan.precedence)
            .with_max_concurrent_workloads(config.scan.max_concurrent_workloads))
    }

    #[must_use]
    pub fn with_precedence(mut self, precedence: SecretPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_workloads(mut self, max: usize) -> Self {
        self.max_concurrent_workloads = max.max(1);
        self
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    pub fn filter(&self) -> &ImageFilter {
        &self.filter
    }

    /// Resolves one workload and merges the result into `image_creds` and
    /// `defaults`.
    pub async fn merge_credentials(
        &self,
        namespace: &str,
        template: &PodTemplate,
        image_creds: &mut ImageCreds,
        defaults: &mut DefaultCredentials,
    ) -> Resolution {
        let resolution = self.resolve(namespace, template).await;
        let mut scan = Scan {
            image_creds: std::mem::take(image_creds),
            defaults: std::mem::take(defaults),
        };
        scan.apply(&resolution);
        *image_creds = scan.image_creds;
        *defaults = scan.defaults;
        resolution
    }

    /// Resolves many workloads, fetching for up to
    /// `max_concurrent_workloads` of them at once.
    ///
    /// Results are applied in the order of `workloads` whatever order the
    /// fetches complete in, which keeps the defaults deterministic.
    pub async fn scan(&self, workloads: &[Workload], scan: &mut Scan) {
        let mut resolutions = stream::iter(workloads)
            .map(|w| async move { (w, self.resolve(&w.namespace, &w.template).await) })
            .buffered(self.max_concurrent_workloads);

        while let Some((workload, resolution)) = resolutions.next().await {
            debug!(
                "{workload}: {} image(s), {} pull secret(s)",
                resolution.images.len(),
                resolution.secrets.len()
            );
            scan.apply(&resolution);
        }
        info!(
            "Scanned {} workload(s), {} image(s), {} default registry host(s)",
            workloads.len(),
            scan.image_creds.len(),
            scan.defaults.len()
        );
    }

    /// Finds the images of `template` that are not excluded, then fetches
    /// and decodes the pull secrets that apply to them.
    ///
    /// Nothing is fetched when every image is excluded. Failures to fetch or
    /// decode a secret, or to fetch the service account, are logged and
    /// skip only that object.
    pub async fn resolve(&self, namespace: &str, template: &PodTemplate) -> Resolution {
        let mut resolution = Resolution::default();

        for (role, container) in template.all_containers() {
            let image = match ImageRef::parse(&container.image) {
                Ok(image) => image,
                Err(error) => {
                    warn!(
                        "Skipping {role} {} in namespace {namespace}: {error}",
                        container.name
                    );
                    resolution.invalid_images.push(InvalidImage {
                        role,
                        container: container.name.clone(),
                        error,
                    });
                    continue;
                }
            };
            if self.filter.is_excluded(&image.canonical_name()) {
                continue;
            }
            if !resolution.images.contains(image.name()) {
                resolution.images.push(image.name().clone());
            }
        }

        if resolution.images.is_empty() {
            return resolution;
        }

        for secret_ref in self.secret_refs(namespace, template).await {
            let secret = match self
                .accessor
                .fetch_secret(&secret_ref.namespace, &secret_ref.name)
                .await
            {
                Ok(secret) => secret,
                Err(e) => {
                    warn!("Skipping pull secret {secret_ref}: {e}");
                    continue;
                }
            };
            match secret.credentials(&secret_ref.provenance()) {
                Ok(creds) => {
                    debug!("Pull secret {secret_ref} has credentials for {creds}");
                    resolution.secrets.push((secret_ref, creds));
                }
                Err(e) => warn!("Skipping pull secret {secret_ref}: {e}"),
            }
        }

        resolution
    }

    /// Pull secret references in merge order, without duplicates.
    async fn secret_refs(&self, namespace: &str, template: &PodTemplate) -> Vec<SecretRef> {
        let workload_refs = template
            .image_pull_secrets
            .iter()
            .map(|name| SecretRef::new(namespace, name));

        let service_account = template.service_account();
        let sa_refs = match self
            .accessor
            .fetch_service_account(namespace, service_account)
            .await
        {
            Ok(refs) => refs,
            Err(e) => {
                warn!("Ignoring service account pull secrets: {e}");
                Vec::new()
            }
        };

        let ordered: Vec<SecretRef> = match self.precedence {
            SecretPrecedence::ServiceAccountLast => workload_refs.chain(sa_refs).collect(),
            SecretPrecedence::WorkloadLast => sa_refs.into_iter().chain(workload_refs).collect(),
        };

        let mut refs = Vec::with_capacity(ordered.len());
        for r in ordered {
            if !refs.contains(&r) {
                refs.push(r);
            }
        }
        refs
    }
}
