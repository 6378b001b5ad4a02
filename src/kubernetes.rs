// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes state puller.
//!
//! Lists nodes, services, endpoints and ingresses across all namespaces and
//! presents them to the zone template as four maps keyed `namespace/name`.
//! Uses in-cluster credentials when no kubeconfig path is configured,
//! otherwise loads the given file with an optional context override.

use std::collections::BTreeMap;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Node, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::KubernetesConfig;
use crate::discoverer::StatePuller;

/// The state passed to the zone template.
///
/// Maps are ordered so template iteration is deterministic between pulls.
#[derive(Debug, Serialize)]
pub struct KubernetesState {
    pub nodes: BTreeMap<String, Node>,
    pub services: BTreeMap<String, Service>,
    pub endpoints: BTreeMap<String, Endpoints>,
    pub ingresses: BTreeMap<String, Ingress>,
}

/// Discovers desired DNS state from a Kubernetes cluster.
pub struct Kubernetes {
    client: Client,
}

impl Kubernetes {
    /// Build a client for the configured cluster.
    pub async fn new(cfg: &KubernetesConfig) -> Result<Self> {
        let client = match &cfg.kubeconfig {
            Some(path) => {
                match &cfg.context {
                    Some(context) => {
                        info!(kubeconfig = %path, context = %context, "building kube client");
                    }
                    None => info!(kubeconfig = %path, "building kube client for default context"),
                }
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("reading kubeconfig {path}"))?;
                let options = KubeConfigOptions {
                    context: cfg.context.clone(),
                    ..KubeConfigOptions::default()
                };
                let config = Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .context("loading kubeconfig")?;
                Client::try_from(config).context("building kube client")?
            }
            None => {
                info!("building in-cluster kube client");
                Client::try_default()
                    .await
                    .context("building in-cluster kube client")?
            }
        };

        Ok(Kubernetes { client })
    }
}

fn meta_key(meta: &ObjectMeta) -> String {
    format!(
        "{}/{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    )
}

#[async_trait]
impl StatePuller for Kubernetes {
    async fn pull(&self) -> Result<Value> {
        debug!("pulling state from kubernetes");
        let params = ListParams::default();

        let mut nodes = BTreeMap::new();
        for node in Api::<Node>::all(self.client.clone())
            .list(&params)
            .await
            .context("listing nodes")?
        {
            nodes.insert(meta_key(&node.metadata), node);
        }

        let mut services = BTreeMap::new();
        for service in Api::<Service>::all(self.client.clone())
            .list(&params)
            .await
            .context("listing services")?
        {
            services.insert(meta_key(&service.metadata), service);
        }

        let mut endpoints = BTreeMap::new();
        for ep in Api::<Endpoints>::all(self.client.clone())
            .list(&params)
            .await
            .context("listing endpoints")?
        {
            endpoints.insert(meta_key(&ep.metadata), ep);
        }

        let mut ingresses = BTreeMap::new();
        for ingress in Api::<Ingress>::all(self.client.clone())
            .list(&params)
            .await
            .context("listing ingresses")?
        {
            ingresses.insert(meta_key(&ingress.metadata), ingress);
        }

        let state = KubernetesState {
            nodes,
            services,
            endpoints,
            ingresses,
        };
        serde_json::to_value(&state).context("serializing kubernetes state")
    }
}
