// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Configuration loading and validation.
//!
//! The YAML config has two top-level sections, `discoverers` and
//! `provisioners`, each keyed by backend. Backend configs hold the shared
//! base config by value and delegate to it, so the YAML stays flat while
//! the types stay composed.
//!
//! Everything that can fail is failed here, at startup: unknown top-level
//! keys, templates that do not compile, owner-flag regexes that do not
//! compile, and two provisioners claiming the same zone.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::discoverer::Discoverer;
use crate::gclouddns::GCloudDns;
use crate::kubernetes::Kubernetes;
use crate::marathon::Marathon;
use crate::provisioner::{DryRun, OwnerFlags, Provisioner};
use crate::route53::Route53;
use crate::template::{render_str, ZoneTemplate};

/// Configuration common to all discoverers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseDiscovererConfig {
    /// Skip this discoverer without removing its config.
    #[serde(default)]
    pub disabled: bool,
    /// The zone template rendered from the discoverer's state.
    #[serde(default)]
    pub template: String,
}

/// Configuration common to all provisioners.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseProvisionerConfig {
    /// The authoritative zone, fully qualified with a trailing dot.
    pub zone: String,
    /// Flag-key to regex-template pairs marking foreign record groups this
    /// instance owns. Empty means foreign groups are never pruned.
    #[serde(default, rename = "ownerFlags")]
    pub owner_flags: BTreeMap<String, String>,
}

/// Basic-auth credentials for a discoverer endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasicAuthConfig {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Config for one Kubernetes discoverer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KubernetesConfig {
    #[serde(flatten)]
    pub base: BaseDiscovererConfig,
    /// Path to a kubeconfig file; in-cluster credentials when unset.
    #[serde(default)]
    pub kubeconfig: Option<String>,
    /// Kubeconfig context override.
    #[serde(default)]
    pub context: Option<String>,
}

impl KubernetesConfig {
    pub fn disabled(&self) -> bool {
        self.base.disabled
    }

    pub fn template(&self) -> &str {
        &self.base.template
    }
}

/// Config for one Marathon discoverer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarathonConfig {
    #[serde(flatten)]
    pub base: BaseDiscovererConfig,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub basic_auth: Option<BasicAuthConfig>,
}

impl MarathonConfig {
    pub fn disabled(&self) -> bool {
        self.base.disabled
    }

    pub fn template(&self) -> &str {
        &self.base.template
    }
}

/// Config for one Route 53 provisioner.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Route53Config {
    #[serde(flatten)]
    pub base: BaseProvisionerConfig,
    /// The hosted zone id; looked up by zone name when unset.
    #[serde(default)]
    pub zoneid: Option<String>,
}

impl Route53Config {
    pub fn zone(&self) -> &str {
        &self.base.zone
    }
}

/// Config for one Google Cloud DNS provisioner.
#[derive(Debug, Clone, Deserialize)]
pub struct GCloudDnsConfig {
    #[serde(flatten)]
    pub base: BaseProvisionerConfig,
    pub project: String,
    #[serde(rename = "zoneID")]
    pub zone_id: String,
}

impl GCloudDnsConfig {
    pub fn zone(&self) -> &str {
        &self.base.zone
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoverersConfig {
    #[serde(default)]
    pub kubernetes: Vec<KubernetesConfig>,
    #[serde(default)]
    pub marathon: Vec<MarathonConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionersConfig {
    #[serde(default)]
    pub route53: Vec<Route53Config>,
    #[serde(default)]
    pub gcloud: Vec<GCloudDnsConfig>,
}

/// The dubber configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discoverers: DiscoverersConfig,
    #[serde(default)]
    pub provisioners: ProvisionersConfig,
    // Catches unknown top-level settings so typos fail at startup.
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_yaml::Value>,
}

/// Fatal configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown top level config options: {0}")]
    UnknownKeys(String),

    #[error("zone {0:?} is not fully qualified (missing trailing dot)")]
    InvalidZone(String),

    #[error("zone {0:?} managed by multiple provisioners")]
    DuplicateZone(String),

    #[error("invalid owner flag {flag:?} for zone {zone:?}")]
    OwnerFlag {
        zone: String,
        flag: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid template for {discoverer}")]
    Template {
        discoverer: String,
        #[source]
        source: tera::Error,
    },

    #[error("building discoverer {discoverer} failed")]
    Discoverer {
        discoverer: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Parse a config from YAML text, rejecting unknown top-level keys.
    pub fn from_yaml(text: &str) -> Result<Config, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text)?;
        if !cfg.unknown.is_empty() {
            let unknowns: Vec<&str> = cfg.unknown.keys().map(String::as_str).collect();
            return Err(ConfigError::UnknownKeys(unknowns.join(",")));
        }
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Config::from_yaml(&text)
    }

    /// The zones the provisioner configs claim, in config order.
    pub fn provisioned_zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = Vec::new();
        zones.extend(self.provisioners.route53.iter().map(|p| p.zone().to_string()));
        zones.extend(self.provisioners.gcloud.iter().map(|p| p.zone().to_string()));
        zones
    }

    /// Check the provisioner zone set: fully qualified names, one
    /// provisioner per zone.
    pub fn validate_zones(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for zone in self.provisioned_zones() {
            if !zone.ends_with('.') {
                return Err(ConfigError::InvalidZone(zone));
            }
            if !seen.insert(zone.clone()) {
                return Err(ConfigError::DuplicateZone(zone));
            }
        }
        Ok(())
    }

    /// Build the provisioner for every configured zone, optionally wrapped
    /// in the dry-run decorator.
    pub async fn build_provisioners(
        &self,
        dry_run: bool,
    ) -> Result<HashMap<String, Box<dyn Provisioner>>, ConfigError> {
        self.validate_zones()?;

        let mut provs: HashMap<String, Box<dyn Provisioner>> = HashMap::new();
        for pcfg in &self.provisioners.route53 {
            let zone = pcfg.zone().to_string();
            let owner_flags = compile_owner_flags(&zone, &pcfg.base.owner_flags)?;
            let prov = Route53::new(pcfg.clone(), owner_flags).await;
            provs.insert(zone, wrap_dry_run(dry_run, Box::new(prov)));
        }
        for pcfg in &self.provisioners.gcloud {
            let zone = pcfg.zone().to_string();
            let owner_flags = compile_owner_flags(&zone, &pcfg.base.owner_flags)?;
            let prov = GCloudDns::new(pcfg.clone(), owner_flags);
            provs.insert(zone, wrap_dry_run(dry_run, Box::new(prov)));
        }
        Ok(provs)
    }

    /// Build every enabled discoverer.
    pub async fn build_discoverers(&self) -> Result<Vec<Discoverer>, ConfigError> {
        let mut discoverers = Vec::new();

        for (i, dcfg) in self.discoverers.kubernetes.iter().enumerate() {
            if dcfg.disabled() {
                continue;
            }
            let name = format!("kubernetes[{i}]");
            let template = compile_template(&name, dcfg.template())?;
            let puller = Kubernetes::new(dcfg)
                .await
                .map_err(|source| ConfigError::Discoverer {
                    discoverer: name.clone(),
                    source,
                })?;
            discoverers.push(Discoverer::new(name, template, Box::new(puller)));
        }

        for (i, dcfg) in self.discoverers.marathon.iter().enumerate() {
            if dcfg.disabled() {
                continue;
            }
            let name = format!("marathon[{i}]");
            let template = compile_template(&name, dcfg.template())?;
            let puller = Marathon::new(dcfg).map_err(|source| ConfigError::Discoverer {
                discoverer: name.clone(),
                source,
            })?;
            discoverers.push(Discoverer::new(name, template, Box::new(puller)));
        }

        Ok(discoverers)
    }
}

fn wrap_dry_run(dry_run: bool, prov: Box<dyn Provisioner>) -> Box<dyn Provisioner> {
    if dry_run {
        Box::new(DryRun::new(prov))
    } else {
        prov
    }
}

fn compile_template(name: &str, source: &str) -> Result<ZoneTemplate, ConfigError> {
    ZoneTemplate::compile(source).map_err(|source| ConfigError::Template {
        discoverer: name.to_string(),
        source,
    })
}

/// Compile the owner-flag policy for one zone.
///
/// Each value is a template (rendered with an `env` map of the process
/// environment) producing a regex, which is anchored with `^`/`$` when the
/// anchors are missing.
pub fn compile_owner_flags(
    zone: &str,
    raw: &BTreeMap<String, String>,
) -> Result<OwnerFlags, ConfigError> {
    let env: BTreeMap<String, String> = std::env::vars().collect();
    let context = serde_json::json!({ "env": env });

    let mut compiled = BTreeMap::new();
    for (flag, source) in raw {
        let owner_flag_error = |source: anyhow::Error| ConfigError::OwnerFlag {
            zone: zone.to_string(),
            flag: flag.clone(),
            source,
        };

        let rendered = render_str(source, &context)
            .map_err(|e| owner_flag_error(anyhow::Error::new(e)))?;
        let regex = Regex::new(&anchor(rendered.trim()))
            .map_err(|e| owner_flag_error(anyhow::Error::new(e)))?;
        compiled.insert(flag.clone(), regex);
    }
    Ok(OwnerFlags::new(compiled))
}

/// Anchor a regex with `^` and `$` unless it already has them.
fn anchor(regex: &str) -> String {
    let mut anchored = String::with_capacity(regex.len() + 2);
    if !regex.starts_with('^') {
        anchored.push('^');
    }
    anchored.push_str(regex);
    if !regex.ends_with('$') {
        anchored.push('$');
    }
    anchored
}
