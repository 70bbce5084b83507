// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use anyhow::Context;
use args::Cli;
use clap::Parser;
use imagecreds::{Config, KubeAccessor, Resolver, Scan};
use log::debug;
use table::CredsTable;

mod args;
mod discover;
mod table;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // env_logger uses the environment variable RUST_LOG to set the log level.
    env_logger::init();
    let cli = Cli::parse();

    cli.execute().await
}

impl Cli {
    pub(crate) async fn execute(&self) -> Result<(), anyhow::Error> {
        let mut config = Config::from_file(&self.config);
        if !self.exclude_image.is_empty() {
            config.registry.exclude_images.clone_from(&self.exclude_image);
        }
        debug!("Using config {config:?}");

        let client = kube::Client::try_default()
            .await
            .context("unable to create Kubernetes client")?;
        let workloads = discover::workloads(&client, self.namespace.as_deref())
            .await
            .context("unable to list workloads")?;

        let resolver = Resolver::from_config(KubeAccessor::new(client), &config)?;
        let mut scan = Scan::default();
        resolver.scan(&workloads, &mut scan).await;

        CredsTable::new_images(&scan.image_creds).print();
        if self.defaults {
            CredsTable::new_defaults(&scan.defaults).print();
        }
        Ok(())
    }
}
