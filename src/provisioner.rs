// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The provisioner contract and the ownership policy.
//!
//! A provisioner is a DNS backend that can read an authoritative zone and
//! apply a change set. The reconciler only ever talks to this trait; the
//! Route 53 and Cloud DNS implementations live in their own modules, and a
//! [`DryRun`] decorator can wrap any of them.

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::info;

use crate::zone::{RecordFlags, Zone};

/// An authoritative DNS backend.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// The current authoritative records for the zone, including exactly
    /// one SOA.
    async fn remote_zone(&self) -> Result<Zone>;

    /// The flag keys that form part of the record-set identity for this
    /// backend.
    fn group_flags(&self) -> &[String];

    /// The ownership policy for this backend, compiled at startup.
    ///
    /// An empty policy means foreign record groups are never pruned.
    fn owner_flags(&self) -> &OwnerFlags;

    /// Apply a change set: remove `unwanted`, add `wanted`.
    ///
    /// `desired` and `remote` carry the full zones the change was computed
    /// from, so backends that operate on whole record sets can reconstruct
    /// them.
    async fn update_zone(
        &self,
        wanted: &Zone,
        unwanted: &Zone,
        desired: &Zone,
        remote: &Zone,
    ) -> Result<()>;
}

/// The compiled owner-flag policy: flag key to anchored regex.
///
/// A foreign remote group is eligible for pruning only when every
/// configured key is present in the group's flag set with a value the
/// regex matches. This keeps coexisting third-party records in the same
/// zone out of reach.
#[derive(Debug, Clone, Default)]
pub struct OwnerFlags(BTreeMap<String, Regex>);

impl OwnerFlags {
    pub fn new(flags: BTreeMap<String, Regex>) -> Self {
        OwnerFlags(flags)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a record group with the given flags is owned by this
    /// instance. Always false for an empty policy.
    pub fn owns(&self, flags: &RecordFlags) -> bool {
        if self.0.is_empty() {
            return false;
        }
        self.0
            .iter()
            .all(|(key, regex)| flags.get(key).is_some_and(|value| regex.is_match(value)))
    }
}

/// Wraps a provisioner, logging the change sets instead of applying them.
pub struct DryRun {
    inner: Box<dyn Provisioner>,
}

impl DryRun {
    pub fn new(inner: Box<dyn Provisioner>) -> Self {
        DryRun { inner }
    }
}

#[async_trait]
impl Provisioner for DryRun {
    async fn remote_zone(&self) -> Result<Zone> {
        self.inner.remote_zone().await
    }

    fn group_flags(&self) -> &[String] {
        self.inner.group_flags()
    }

    fn owner_flags(&self) -> &OwnerFlags {
        self.inner.owner_flags()
    }

    async fn update_zone(
        &self,
        wanted: &Zone,
        unwanted: &Zone,
        _desired: &Zone,
        _remote: &Zone,
    ) -> Result<()> {
        info!("dry-run: wanted records:\n{wanted}");
        info!("dry-run: unwanted records:\n{unwanted}");
        Ok(())
    }
}
