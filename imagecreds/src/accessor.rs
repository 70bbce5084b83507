// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use std::{collections::BTreeMap, fmt};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::{Api, Client};
use log::trace;

use crate::{
    credentials::{self, Credentials, SecretEncoding},
    errors::{DecodeError, FetchError},
};

/// Names a secret in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

impl SecretRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// `<namespace>:secret/<name>`, recorded on every credential decoded from
    /// this secret.
    pub fn provenance(&self) -> String {
        format!("{}:secret/{}", self.namespace, self.name)
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The parts of a secret object credential resolution cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySecret {
    pub secret_type: String,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl RegistrySecret {
    /// Decodes this secret into registry credentials.
    ///
    /// Fails if the secret is not of a registry credential type, lacks the
    /// payload key for its type, or the payload does not decode.
    pub fn credentials(&self, provenance: &str) -> Result<Credentials, DecodeError> {
        let encoding = SecretEncoding::from_secret_type(&self.secret_type)
            .ok_or_else(|| DecodeError::UnsupportedType(self.secret_type.clone()))?;
        let payload = self
            .data
            .get(encoding.data_key())
            .ok_or(DecodeError::MissingKey(encoding.data_key()))?;
        credentials::decode(payload, encoding, provenance)
    }
}

impl From<Secret> for RegistrySecret {
    fn from(secret: Secret) -> Self {
        Self {
            secret_type: secret.type_.unwrap_or_default(),
            data: secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.0))
                .collect(),
        }
    }
}

/// Read access to the cluster objects credential resolution needs.
///
/// Implementations own transport, auth and retries. A missing object is
/// reported as [`FetchError::NotFound`].
#[async_trait]
pub trait SecretAccessor: Send + Sync {
    async fn fetch_secret(&self, namespace: &str, name: &str)
    -> Result<RegistrySecret, FetchError>;

    /// Returns the image pull secrets of a service account, in the order the
    /// account lists them.
    async fn fetch_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<SecretRef>, FetchError>;
}

/// [`SecretAccessor`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeAccessor {
    client: Client,
}

impl KubeAccessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretAccessor for KubeAccessor {
    async fn fetch_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<RegistrySecret, FetchError> {
        trace!("Fetching secret {namespace}/{name}");
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|source| FetchError::Api {
                kind: "secret",
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?
            .map(RegistrySecret::from)
            .ok_or_else(|| FetchError::NotFound {
                kind: "secret",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn fetch_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<SecretRef>, FetchError> {
        trace!("Fetching service account {namespace}/{name}");
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let sa = api
            .get_opt(name)
            .await
            .map_err(|source| FetchError::Api {
                kind: "service account",
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?
            .ok_or_else(|| FetchError::NotFound {
                kind: "service account",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        Ok(sa
            .image_pull_secrets
            .unwrap_or_default()
            .into_iter()
            .filter(|r| !r.name.is_empty())
            .map(|r| SecretRef::new(namespace, r.name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use k8s_openapi::ByteString;

    use super::*;
    use crate::credentials::tests::docker_config_json;

    fn secret(secret_type: &str, key: &str, payload: &str) -> Secret {
        Secret {
            type_: Some(secret_type.to_string()),
            data: Some(BTreeMap::from([(
                key.to_string(),
                ByteString(payload.as_bytes().to_vec()),
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn test_secret_credentials() {
        let payload = docker_config_json(&[("quay.io", "user", "passwd")]);
        let secret: RegistrySecret =
            secret("kubernetes.io/dockerconfigjson", ".dockerconfigjson", &payload).into();

        let creds = secret
            .credentials(&SecretRef::new("ns", "regcred").provenance())
            .unwrap();

        assert_eq!(creds.hosts(), vec!["quay.io"]);
        assert_eq!(
            creds.credentials_for("quay.io").unwrap().provenance(),
            "ns:secret/regcred"
        );
    }

    #[test]
    fn test_dockercfg_secret() {
        let payload = format!(
            r#"{{"quay.io": {{"auth": "{}"}}}}"#,
            crate::credentials::tests::auth_token("user", "passwd")
        );
        let secret: RegistrySecret = secret("kubernetes.io/dockercfg", ".dockercfg", &payload).into();

        assert_eq!(secret.credentials("x").unwrap().hosts(), vec!["quay.io"]);
    }

    #[test]
    fn test_secret_not_registry_credentials() {
        let opaque: RegistrySecret = secret("Opaque", "password", "hunter2").into();
        assert_matches!(
            opaque.credentials("x"),
            Err(DecodeError::UnsupportedType(t)) if t == "Opaque"
        );

        let wrong_key: RegistrySecret =
            secret("kubernetes.io/dockerconfigjson", ".dockercfg", "{}").into();
        assert_matches!(
            wrong_key.credentials("x"),
            Err(DecodeError::MissingKey(".dockerconfigjson"))
        );

        let untyped: RegistrySecret = Secret::default().into();
        assert_matches!(untyped.credentials("x"), Err(DecodeError::UnsupportedType(_)));
    }
}
