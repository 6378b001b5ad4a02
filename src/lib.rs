// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Dubber - dynamic DNS for orchestrated services
//!
//! Dubber continuously reconciles authoritative DNS zones in cloud
//! providers against a desired state derived from live orchestration
//! platforms. Discoverers pull state from Kubernetes or Marathon and
//! render it through a zone template; the reconciler diffs the result
//! against the remote zone per record group and applies the minimal change
//! set, so records dubber owns are created, updated and removed while
//! foreign records in the same zone are left untouched.
//!
//! ## Modules
//!
//! - [`zone`] - the in-memory record and zone model
//! - [`zonefile`] - the RFC 1035 master-file parser
//! - [`template`] - the zone template adapter
//! - [`discoverer`] - state pullers and the discover pipeline
//! - [`kubernetes`], [`marathon`] - the discoverer backends
//! - [`provisioner`] - the DNS backend contract and ownership policy
//! - [`route53`], [`gclouddns`] - the provisioner backends
//! - [`reconcile`] - per-zone reconciliation
//! - [`server`] - the scheduler and metrics endpoint
//! - [`config`] - YAML configuration and builders
//!
//! ## Example
//!
//! ```rust,no_run
//! use dubber::config::Config;
//!
//! let cfg = Config::from_yaml(
//!     r#"
//! provisioners:
//!   route53:
//!     - zone: example.com.
//! "#,
//! )
//! .expect("config parses");
//! assert_eq!(cfg.provisioned_zones(), vec!["example.com.".to_string()]);
//! ```

pub mod config;
pub mod constants;
pub mod discoverer;
pub mod gclouddns;
pub mod kubernetes;
pub mod marathon;
pub mod metrics;
pub mod provisioner;
pub mod reconcile;
pub mod route53;
pub mod server;
pub mod template;
pub mod zone;
pub mod zonefile;

#[cfg(test)]
mod reconcile_tests;
#[cfg(test)]
mod template_tests;
#[cfg(test)]
mod zonefile_tests;
