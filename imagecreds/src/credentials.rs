// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use std::{collections::BTreeMap, fmt};

use base64::{Engine, engine::general_purpose::STANDARD};
use log::trace;
use oci_client::secrets::RegistryAuth;
use serde::Deserialize;
use url::Url;

use crate::{errors::DecodeError, image::ImageName};

pub(crate) const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";
pub(crate) const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";
pub(crate) const DOCKER_CFG_TYPE: &str = "kubernetes.io/dockercfg";
pub(crate) const DOCKER_CFG_KEY: &str = ".dockercfg";

// Docker Hub answers to several names. Auth keys for any of them are stored
// under DOCKER_HUB_HOST, the registry image references resolve to.
const DOCKER_HUB_HOST: &str = "docker.io";
const DOCKER_HUB_ALIASES: [&str; 2] = ["index.docker.io", "registry-1.docker.io"];

/// Per-image credentials, keyed by image name without tag.
pub type ImageCreds = BTreeMap<ImageName, Credentials>;

/// A username and password for one registry host.
#[derive(Clone, PartialEq, Eq)]
pub struct Auth {
    registry: String,
    username: String,
    password: String,
    token: String,
    provenance: String,
}

impl Auth {
    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// The base64 `user:password` token as found in the secret.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Where this entry came from, e.g. `default:secret/regcred`.
    pub fn provenance(&self) -> &str {
        &self.provenance
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("provenance", &self.provenance)
            .finish()
    }
}

impl fmt::Display for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<registry credentials for {}@{}, from {}>",
            self.username, self.registry, self.provenance
        )
    }
}

impl From<&Auth> for RegistryAuth {
    fn from(auth: &Auth) -> Self {
        RegistryAuth::Basic(auth.username.clone(), auth.password.clone())
    }
}

/// Registry credentials that apply to one image, at most one per host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    m: BTreeMap<String, Auth>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts this set holds credentials for, sorted.
    pub fn hosts(&self) -> Vec<&str> {
        self.m.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Auth)> {
        self.m.iter().map(|(host, auth)| (host.as_str(), auth))
    }

    /// Merges `other` into `self`. Hosts present in both take `other`'s entry.
    pub fn merge(&mut self, other: &Credentials) {
        for (host, auth) in &other.m {
            self.m.insert(host.clone(), auth.clone());
        }
    }

    pub fn credentials_for(&self, host: &str) -> Option<&Auth> {
        let host = if DOCKER_HUB_ALIASES.contains(&host) {
            DOCKER_HUB_HOST
        } else {
            host
        };
        self.m.get(host)
    }

    /// The OCI client auth for `host`, anonymous when nothing is known.
    pub fn registry_auth(&self, host: &str) -> RegistryAuth {
        self.credentials_for(host)
            .map_or(RegistryAuth::Anonymous, RegistryAuth::from)
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.hosts().join(", "))
    }
}

/// Cluster wide best known credentials per registry host.
///
/// Unlike [`Credentials::merge`], the first entry recorded for a host is kept
/// and later ones are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultCredentials {
    m: BTreeMap<String, Auth>,
}

impl DefaultCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the accumulator, e.g. from a docker config mounted into the
    /// controller.
    pub fn seeded(creds: &Credentials) -> Self {
        let mut defaults = Self::new();
        defaults.absorb(creds);
        defaults
    }

    /// Adds the hosts of `creds` that are not known yet. Returns how many
    /// were added.
    pub fn absorb(&mut self, creds: &Credentials) -> usize {
        let mut added = 0;
        for (host, auth) in &creds.m {
            if !self.m.contains_key(host) {
                self.m.insert(host.clone(), auth.clone());
                added += 1;
            }
        }
        added
    }

    pub fn get(&self, host: &str) -> Option<&Auth> {
        self.m.get(host)
    }

    pub fn hosts(&self) -> Vec<&str> {
        self.m.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }
}

/// The on-disk layouts a registry credential secret may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretEncoding {
    /// `kubernetes.io/dockerconfigjson`, a docker `config.json`.
    DockerConfigJson,
    /// `kubernetes.io/dockercfg`, the pre 1.7 `.dockercfg` file.
    DockerCfg,
}

impl SecretEncoding {
    pub fn from_secret_type(secret_type: &str) -> Option<Self> {
        match secret_type {
            DOCKER_CONFIG_JSON_TYPE => Some(SecretEncoding::DockerConfigJson),
            DOCKER_CFG_TYPE => Some(SecretEncoding::DockerCfg),
            _ => None,
        }
    }

    pub fn secret_type(&self) -> &'static str {
        match self {
            SecretEncoding::DockerConfigJson => DOCKER_CONFIG_JSON_TYPE,
            SecretEncoding::DockerCfg => DOCKER_CFG_TYPE,
        }
    }

    /// The secret data key holding the payload.
    pub fn data_key(&self) -> &'static str {
        match self {
            SecretEncoding::DockerConfigJson => DOCKER_CONFIG_JSON_KEY,
            SecretEncoding::DockerCfg => DOCKER_CFG_KEY,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthsFile {
    auths: BTreeMap<String, AuthEntry>,
}

type LegacyFile = BTreeMap<String, AuthEntry>;

#[derive(Debug, Deserialize)]
struct AuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Decodes a registry credential payload into per host credentials.
///
/// Both the `auths` wrapped layout and the legacy flat layout are accepted,
/// whichever `encoding` the secret declared. `provenance` is recorded on
/// every entry.
pub fn decode(
    payload: &[u8],
    encoding: SecretEncoding,
    provenance: &str,
) -> Result<Credentials, DecodeError> {
    let value: serde_json::Value = serde_json::from_slice(payload).map_err(DecodeError::Json)?;
    // A top level "auths" key commits the payload to the wrapped layout, it
    // is never read as a legacy host.
    let entries = if value.get("auths").is_some() {
        AuthsFile::deserialize(value)
            .map_err(|_| DecodeError::Format)?
            .auths
    } else {
        trace!(
            "{provenance}: {} payload uses the legacy layout",
            encoding.secret_type()
        );
        LegacyFile::deserialize(value).map_err(|_| DecodeError::Format)?
    };

    let mut m = BTreeMap::new();
    for (key, entry) in entries {
        let (username, password, token) = entry_credentials(&key, entry)?;
        let registry = registry_host(&key)?;
        m.insert(
            registry.clone(),
            Auth {
                registry,
                username,
                password,
                token,
                provenance: provenance.to_string(),
            },
        );
    }
    Ok(Credentials { m })
}

fn entry_credentials(key: &str, entry: AuthEntry) -> Result<(String, String, String), DecodeError> {
    match entry {
        AuthEntry {
            auth: Some(token), ..
        } => {
            let (username, password) = decode_token(key, &token)?;
            Ok((username, password, token))
        }
        AuthEntry {
            auth: None,
            username: Some(username),
            password: Some(password),
        } => {
            let token = STANDARD.encode(format!("{username}:{password}"));
            Ok((username, password, token))
        }
        _ => Err(DecodeError::MissingAuth {
            host: key.to_string(),
        }),
    }
}

fn decode_token(key: &str, token: &str) -> Result<(String, String), DecodeError> {
    let decoded = STANDARD
        .decode(token)
        .map_err(|source| DecodeError::Base64 {
            host: key.to_string(),
            source,
        })?;
    let decoded = String::from_utf8(decoded).map_err(|_| DecodeError::Utf8 {
        host: key.to_string(),
    })?;
    decoded
        .split_once(':')
        .map(|(user, password)| (user.to_string(), password.to_string()))
        .ok_or_else(|| DecodeError::MissingSeparator {
            host: key.to_string(),
        })
}

// Auth keys show up as bare hosts, host:port, or full urls such as
// https://index.docker.io/v1/. All of them are reduced to host[:port], with a
// port kept whenever the key spells one out, scheme default or not.
fn registry_host(key: &str) -> Result<String, DecodeError> {
    if key == "http://" || key == "https://" {
        return Err(DecodeError::InvalidHost(key.to_string()));
    }

    let url = match Url::parse(key) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => url,
        _ => Url::parse(&format!("https://{key}"))
            .map_err(|_| DecodeError::InvalidHost(key.to_string()))?,
    };

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| DecodeError::InvalidHost(key.to_string()))?;

    if DOCKER_HUB_ALIASES.contains(&host) {
        return Ok(DOCKER_HUB_HOST.to_string());
    }

    Ok(match url.port().or_else(|| explicit_port(key)) {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

// Url drops a port equal to the scheme default, so read it from the key.
fn explicit_port(key: &str) -> Option<u16> {
    let rest = key.split_once("://").map_or(key, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);
    let (_, port) = authority.rsplit_once(':')?;
    port.parse().ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use assert_matches::assert_matches;

    use super::*;

    pub(crate) fn auth_token(user: &str, password: &str) -> String {
        STANDARD.encode(format!("{user}:{password}"))
    }

    pub(crate) fn docker_config_json(entries: &[(&str, &str, &str)]) -> String {
        let auths = entries
            .iter()
            .map(|(host, user, password)| {
                (
                    host.to_string(),
                    serde_json::json!({ "auth": auth_token(user, password) }),
                )
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::json!({ "auths": auths }).to_string()
    }

    #[test]
    fn test_decode_round_trip() {
        let triples = [
            ("docker.io", "user", "passwd"),
            ("quay.io", "robot+ci", "p:a:s:s"),
            ("registry.example.com:5000", "admin", ""),
        ];
        let payload = docker_config_json(&triples);

        let creds = decode(
            payload.as_bytes(),
            SecretEncoding::DockerConfigJson,
            "ns:secret/regcred",
        )
        .unwrap();

        assert_eq!(creds.len(), triples.len());
        for (host, user, password) in triples {
            let auth = creds.credentials_for(host).unwrap();
            assert_eq!(auth.registry(), host);
            assert_eq!(auth.username(), user);
            assert_eq!(auth.password(), password);
            assert_eq!(auth.token(), auth_token(user, password));
            assert_eq!(auth.provenance(), "ns:secret/regcred");
        }
    }

    #[test]
    fn test_decode_legacy_layout() {
        let payload = format!(
            r#"{{"https://index.docker.io/v1/": {{"auth": "{}", "email": "me@example.com"}}}}"#,
            auth_token("user", "passwd")
        );

        let creds = decode(payload.as_bytes(), SecretEncoding::DockerCfg, "ns:secret/old").unwrap();

        assert_eq!(creds.hosts(), vec!["docker.io"]);
        // Docker Hub aliases resolve to the same entry
        assert_eq!(creds.credentials_for("docker.io").unwrap().username(), "user");
        assert_eq!(creds.credentials_for("index.docker.io").unwrap().username(), "user");
    }

    #[test]
    fn test_auths_key_is_never_a_host() {
        let enc = SecretEncoding::DockerConfigJson;

        let payload = format!(r#"{{"auths": {{"auth": "{}"}}}}"#, auth_token("user", "passwd"));
        assert_matches!(decode(payload.as_bytes(), enc, "x"), Err(DecodeError::Format));

        let payload = r#"{"auths": {"quay.io": {"auth": 42}}}"#;
        assert_matches!(decode(payload.as_bytes(), enc, "x"), Err(DecodeError::Format));

        let creds = decode(br#"{"auths": {}}"#, enc, "x").unwrap();
        assert!(creds.is_empty());
    }

    #[test]
    fn test_decode_plain_username_password() {
        let payload = r#"{"auths": {"ghcr.io": {"username": "myuser", "password": "mypass"}}}"#;

        let creds = decode(payload.as_bytes(), SecretEncoding::DockerConfigJson, "x").unwrap();

        let auth = creds.credentials_for("ghcr.io").unwrap();
        assert_eq!(auth.username(), "myuser");
        assert_eq!(auth.password(), "mypass");
        assert_eq!(auth.token(), auth_token("myuser", "mypass"));
    }

    #[test]
    fn test_registry_host_normalization() {
        let tt = [
            ("gcr.io", "gcr.io"),
            ("https://gcr.io/v1/", "gcr.io"),
            ("http://docker.io", "docker.io"),
            ("localhost:5000", "localhost:5000"),
            ("10.0.0.1:5000/v2", "10.0.0.1:5000"),
            ("https://registry.example.com:8443", "registry.example.com:8443"),
            ("https://registry.example.com:443", "registry.example.com:443"),
            ("http://registry.example.com:80/v2/", "registry.example.com:80"),
            ("https://index.docker.io/v1/", "docker.io"),
            ("registry-1.docker.io", "docker.io"),
        ];
        for (input, output) in tt {
            assert_eq!(registry_host(input).unwrap(), output, "{input}");
        }

        assert_matches!(registry_host("https://"), Err(DecodeError::InvalidHost(_)));
        assert_matches!(registry_host("http://"), Err(DecodeError::InvalidHost(_)));
    }

    #[test]
    fn test_decode_errors() {
        let enc = SecretEncoding::DockerConfigJson;

        assert_matches!(decode(b"not json", enc, "x"), Err(DecodeError::Json(_)));
        assert_matches!(decode(b"[1, 2]", enc, "x"), Err(DecodeError::Format));
        assert_matches!(
            decode(br#"{"auths": {"quay.io": {"auth": "%%%"}}}"#, enc, "x"),
            Err(DecodeError::Base64 { .. })
        );

        let no_separator = format!(
            r#"{{"auths": {{"quay.io": {{"auth": "{}"}}}}}}"#,
            STANDARD.encode("userpasswd")
        );
        assert_matches!(
            decode(no_separator.as_bytes(), enc, "x"),
            Err(DecodeError::MissingSeparator { .. })
        );
        assert_matches!(
            decode(br#"{"auths": {"quay.io": {"email": "a@b"}}}"#, enc, "x"),
            Err(DecodeError::MissingAuth { .. })
        );

        let not_utf8 = format!(
            r#"{{"auths": {{"quay.io": {{"auth": "{}"}}}}}}"#,
            STANDARD.encode([0xff, b':'])
        );
        assert_matches!(
            decode(not_utf8.as_bytes(), enc, "x"),
            Err(DecodeError::Utf8 { host }) if host == "quay.io"
        );
        let no_host = docker_config_json(&[("https://", "user", "passwd")]);
        assert_matches!(
            decode(no_host.as_bytes(), enc, "x"),
            Err(DecodeError::InvalidHost(host)) if host == "https://"
        );
    }

    #[test]
    fn test_docker_hub_aliases_merge_last_wins() {
        let enc = SecretEncoding::DockerConfigJson;
        let workload = docker_config_json(&[("docker.io", "pod", "1")]);
        let workload = decode(workload.as_bytes(), enc, "pod").unwrap();
        let service_account = docker_config_json(&[("https://index.docker.io/v1/", "sa", "2")]);
        let service_account = decode(service_account.as_bytes(), enc, "sa").unwrap();

        let mut creds = Credentials::new();
        creds.merge(&workload);
        creds.merge(&service_account);

        assert_eq!(creds.hosts(), vec!["docker.io"]);
        assert_eq!(creds.credentials_for("docker.io").unwrap().username(), "sa");
        assert_eq!(creds.credentials_for("index.docker.io").unwrap().username(), "sa");
    }

    #[test]
    fn test_explicit_default_port_matches_image_registry() {
        let payload = docker_config_json(&[("https://registry.example.com:443", "user", "passwd")]);
        let creds = decode(payload.as_bytes(), SecretEncoding::DockerConfigJson, "x").unwrap();
        let image = crate::ImageRef::parse("registry.example.com:443/app:v1").unwrap();

        assert_eq!(creds.credentials_for(image.registry()).unwrap().username(), "user");
        assert!(creds.credentials_for("registry.example.com").is_none());
    }

    #[test]
    fn test_merge_is_last_wins() {
        let enc = SecretEncoding::DockerConfigJson;
        let first = decode(
            docker_config_json(&[("docker.io", "a", "1"), ("quay.io", "a", "1")]).as_bytes(),
            enc,
            "first",
        )
        .unwrap();
        let second = decode(docker_config_json(&[("quay.io", "b", "2")]).as_bytes(), enc, "second")
            .unwrap();

        let mut creds = Credentials::new();
        creds.merge(&first);
        creds.merge(&second);

        assert_eq!(creds.hosts(), vec!["docker.io", "quay.io"]);
        assert_eq!(creds.credentials_for("docker.io").unwrap().provenance(), "first");
        assert_eq!(creds.credentials_for("quay.io").unwrap().provenance(), "second");
        assert_eq!(
            creds.registry_auth("quay.io"),
            RegistryAuth::Basic("b".to_string(), "2".to_string())
        );
        assert_eq!(creds.registry_auth("ghcr.io"), RegistryAuth::Anonymous);
    }

    #[test]
    fn test_defaults_are_first_wins() {
        let enc = SecretEncoding::DockerConfigJson;
        let first = decode(docker_config_json(&[("quay.io", "a", "1")]).as_bytes(), enc, "first")
            .unwrap();
        let second = decode(
            docker_config_json(&[("quay.io", "b", "2"), ("gcr.io", "b", "2")]).as_bytes(),
            enc,
            "second",
        )
        .unwrap();

        let mut defaults = DefaultCredentials::seeded(&first);
        assert_eq!(defaults.absorb(&second), 1);

        assert_eq!(defaults.hosts(), vec!["gcr.io", "quay.io"]);
        assert_eq!(defaults.get("quay.io").unwrap().username(), "a");
    }

    #[test]
    fn test_debug_hides_password() {
        let creds = decode(
            docker_config_json(&[("quay.io", "robot", "hunter2")]).as_bytes(),
            SecretEncoding::DockerConfigJson,
            "ns:secret/s",
        )
        .unwrap();
        let auth = creds.credentials_for("quay.io").unwrap();

        assert!(!format!("{auth:?}").contains("hunter2"));
        assert!(!format!("{auth}").contains("hunter2"));
        assert!(!format!("{creds:?}").contains(auth.token()));
    }

    #[test]
    fn test_encoding_from_secret_type() {
        assert_eq!(
            SecretEncoding::from_secret_type("kubernetes.io/dockerconfigjson"),
            Some(SecretEncoding::DockerConfigJson)
        );
        assert_eq!(
            SecretEncoding::from_secret_type("kubernetes.io/dockercfg").map(|e| e.data_key()),
            Some(".dockercfg")
        );
        assert_eq!(SecretEncoding::from_secret_type("Opaque"), None);
    }
}
