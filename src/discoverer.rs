// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Discoverers combine orchestrator state and a template into a [`Zone`].
//!
//! A [`StatePuller`] reads the current state from a remote platform; the
//! [`Discoverer`] renders that state through its zone template and parses
//! the result. Discoverers are best-effort: a failed pull returns an error
//! and no partial state, and the scheduler keeps the previous successful
//! zone for the discoverer.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::trace;

use crate::template::ZoneTemplate;
use crate::zone::Zone;
use crate::zonefile::parse_zone_data;

/// Reads the state from a remote service.
///
/// The state is an opaque JSON value passed to the zone template; each
/// implementation documents its own shape.
#[async_trait]
pub trait StatePuller: Send + Sync {
    async fn pull(&self) -> Result<Value>;
}

/// Combines a state puller and a zone template into a zone source.
pub struct Discoverer {
    name: String,
    template: ZoneTemplate,
    puller: Box<dyn StatePuller>,
    // Serializes pulls so concurrent discover calls linearize.
    pull_lock: Mutex<()>,
}

impl Discoverer {
    pub fn new(name: impl Into<String>, template: ZoneTemplate, puller: Box<dyn StatePuller>) -> Self {
        Discoverer {
            name: name.into(),
            template,
            puller,
            pull_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pull the current state and render it into zone data.
    pub async fn discover(&self) -> Result<Zone> {
        let _guard = self.pull_lock.lock().await;

        let state = self.puller.pull().await.context("failed to pull state")?;
        trace!(discoverer = %self.name, "pulled state");

        let text = self
            .template
            .render(&state)
            .context("failed to render zone")?;
        trace!(discoverer = %self.name, "template output:\n{text}");

        let zone = parse_zone_data(&text).context("failed to parse rendered zone")?;
        Ok(zone)
    }
}

impl std::fmt::Debug for Discoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discoverer").field("name", &self.name).finish()
    }
}
