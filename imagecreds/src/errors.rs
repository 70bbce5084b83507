// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid image reference {image}: {source}")]
    InvalidImageReference {
        image: String,
        #[source]
        source: oci_client::ParseError,
    },
    #[error("invalid exclusion pattern {pattern}: {source}")]
    InvalidExcludePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Error parsing config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("getting {kind} {namespace}/{name}: {source}")]
    Api {
        kind: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("secret payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("secret payload matches neither the auths nor the legacy registry layout")]
    Format,
    #[error("auth for {host} is not valid base64: {source}")]
    Base64 {
        host: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("auth for {host} is not valid UTF-8")]
    Utf8 { host: String },
    #[error("decoded auth for {host} has no user:password separator")]
    MissingSeparator { host: String },
    #[error("entry for {host} has neither auth nor username and password")]
    MissingAuth { host: String },
    #[error("invalid registry auth url {0:?}, expected a registry address such as https://gcr.io/v1/")]
    InvalidHost(String),
    #[error("secret type {0} does not hold registry credentials")]
    UnsupportedType(String),
    #[error("secret has no {0} data key")]
    MissingKey(&'static str),
}
