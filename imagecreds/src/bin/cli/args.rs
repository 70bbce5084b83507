// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use std::path::PathBuf;

use clap::Parser;
use imagecreds::config::CFGPATH_IMAGECREDS_CONFIG;

#[derive(Parser, Debug)]
#[command(
    long_about = "Show which registry credentials apply to the container images running in a Kubernetes cluster."
)]
#[command(name = "imagecreds")]
pub(crate) struct Cli {
    /// Optional: Location of the configuration file.
    #[clap(short, long, default_value = CFGPATH_IMAGECREDS_CONFIG)]
    pub(crate) config: PathBuf,

    /// Optional: Only scan workloads in this namespace. All namespaces are
    /// scanned by default.
    #[clap(short, long, verbatim_doc_comment)]
    pub(crate) namespace: Option<String>,

    /// Optional: Glob of images to leave out, replacing the configured list.
    /// Can be repeated. `*` matches any run of characters.
    /// Example: --exclude-image 'k8s.gcr.io/*' --exclude-image '*test*'
    #[clap(short, long, verbatim_doc_comment)]
    pub(crate) exclude_image: Vec<String>,

    /// Optional: Also list the cluster wide default credentials per
    /// registry host.
    #[clap(long, verbatim_doc_comment)]
    pub(crate) defaults: bool,
}
