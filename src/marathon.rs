// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Marathon state puller.
//!
//! Pulls the application and task lists from a Marathon endpoint with
//! optional basic auth, and presents them to the zone template as two maps:
//! applications keyed by application id and tasks keyed by task id.

use std::collections::BTreeMap;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::MarathonConfig;
use crate::discoverer::StatePuller;

/// One Marathon application, reduced to the fields the zone templates use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub cmd: Option<String>,
    pub instances: Option<u32>,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<u32>,
}

/// One Marathon task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub app_id: String,
    pub host: String,
    pub ports: Vec<u32>,
    pub state: Option<String>,
    pub started_at: Option<String>,
}

/// The state passed to the zone template.
#[derive(Debug, Serialize)]
pub struct MarathonState {
    pub applications: BTreeMap<String, Application>,
    pub tasks: BTreeMap<String, Task>,
}

#[derive(Debug, Deserialize)]
struct AppsResponse {
    #[serde(default)]
    apps: Vec<Application>,
}

#[derive(Debug, Deserialize)]
struct TasksResponse {
    #[serde(default)]
    tasks: Vec<Task>,
}

/// Discovers applications and dns names from a Marathon cluster.
pub struct Marathon {
    endpoint: Url,
    basic_auth: Option<(String, String)>,
    http: reqwest::Client,
}

impl Marathon {
    pub fn new(cfg: &MarathonConfig) -> Result<Self> {
        let Some(endpoint) = cfg.endpoints.first() else {
            bail!("marathon discoverer has no endpoints configured");
        };
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid marathon endpoint {endpoint:?}"))?;

        let basic_auth = cfg
            .basic_auth
            .as_ref()
            .map(|auth| (auth.username.clone(), auth.password.clone()));

        Ok(Marathon {
            endpoint,
            basic_auth,
            http: reqwest::Client::new(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self
            .endpoint
            .join(path)
            .with_context(|| format!("building marathon url for {path}"))?;

        let mut req = self.http.get(url.clone());
        if let Some((user, password)) = &self.basic_auth {
            req = req.basic_auth(user, Some(password));
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("requesting {url}"))?;

        resp.json()
            .await
            .with_context(|| format!("decoding response from {url}"))
    }
}

#[async_trait]
impl StatePuller for Marathon {
    async fn pull(&self) -> Result<Value> {
        debug!(endpoint = %self.endpoint, "pulling state from marathon");

        let apps: AppsResponse = self.get_json("v2/apps").await?;
        let tasks: TasksResponse = self.get_json("v2/tasks").await?;

        let state = MarathonState {
            applications: apps
                .apps
                .into_iter()
                .map(|app| (app.id.clone(), app))
                .collect(),
            tasks: tasks
                .tasks
                .into_iter()
                .map(|task| (task.id.clone(), task))
                .collect(),
        };
        serde_json::to_value(&state).context("serializing marathon state")
    }
}
