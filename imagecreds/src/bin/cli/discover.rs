// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use std::fmt::Debug;

use imagecreds::{PodTemplate, Workload};
use k8s_openapi::{
    NamespaceResourceScope,
    api::{
        apps::v1::{DaemonSet, Deployment, StatefulSet},
        batch::v1::CronJob,
        core::v1::{Pod, PodTemplateSpec},
    },
};
use kube::{Api, Client, Resource, ResourceExt, api::ListParams};
use log::debug;
use serde::de::DeserializeOwned;

async fn list<K>(client: &Client, namespace: Option<&str>) -> Result<Vec<K>, kube::Error>
where
    K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    Ok(api.list(&ListParams::default()).await?.items)
}

fn workload<K: ResourceExt>(kind: &str, obj: &K, template: &PodTemplateSpec) -> Workload {
    Workload {
        kind: kind.to_string(),
        namespace: obj.namespace().unwrap_or_default(),
        name: obj.name_any(),
        template: PodTemplate::from(template),
    }
}

/// Lists the workloads whose pod templates reference images.
///
/// Pods owned by another object are left out, their owner is listed instead.
pub(crate) async fn workloads(
    client: &Client,
    namespace: Option<&str>,
) -> Result<Vec<Workload>, kube::Error> {
    let mut workloads = Vec::new();

    for d in list::<Deployment>(client, namespace).await? {
        if let Some(spec) = &d.spec {
            workloads.push(workload("Deployment", &d, &spec.template));
        }
    }
    for s in list::<StatefulSet>(client, namespace).await? {
        if let Some(spec) = &s.spec {
            workloads.push(workload("StatefulSet", &s, &spec.template));
        }
    }
    for d in list::<DaemonSet>(client, namespace).await? {
        if let Some(spec) = &d.spec {
            workloads.push(workload("DaemonSet", &d, &spec.template));
        }
    }
    for c in list::<CronJob>(client, namespace).await? {
        if let Some(job) = c.spec.as_ref().and_then(|s| s.job_template.spec.as_ref()) {
            workloads.push(workload("CronJob", &c, &job.template));
        }
    }
    for p in list::<Pod>(client, namespace).await? {
        if !p.owner_references().is_empty() {
            continue;
        }
        let template = PodTemplateSpec {
            metadata: None,
            spec: p.spec.clone(),
        };
        workloads.push(workload("Pod", &p, &template));
    }

    debug!("Discovered {} workload(s)", workloads.len());
    Ok(workloads)
}
