// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-zone reconciliation.
//!
//! One reconcile compares the desired zone fragment against a fresh fetch
//! of the remote authoritative zone, computes the minimal change set per
//! record group, prunes foreign groups the ownership policy marks as ours,
//! bumps the SOA serial, and hands the change set to the provisioner.
//!
//! The SOA is always located by scanning the remote zone for the unique
//! SOA record; a remote zone without exactly one SOA fails the reconcile.

use hickory_proto::rr::RecordType;
use thiserror::Error;
use tracing::debug;

use crate::provisioner::Provisioner;
use crate::zone::{SoaError, Zone};

/// Why a zone reconcile was aborted.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Fetching the remote zone failed; retried on the next tick.
    #[error("failed to fetch remote zone")]
    RemoteZone(#[source] anyhow::Error),

    /// The remote zone has no SOA record.
    #[error("no SOA record in remote zone")]
    NoSoa,

    /// The remote zone has more than one SOA record.
    #[error("multiple SOA records in remote zone ({0})")]
    MultipleSoa(usize),

    /// The remote SOA rdata could not be read or rewritten.
    #[error("invalid remote SOA record")]
    Soa(#[from] SoaError),

    /// Applying the change set failed; retried on the next tick.
    #[error("failed to update zone")]
    UpdateZone(#[source] anyhow::Error),
}

/// The result of a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Whether a change set was applied. False for a no-op reconcile.
    pub changed: bool,
    /// The remote SOA serial before the change (the "discovered" serial).
    pub old_serial: u32,
    /// The remote SOA serial after the change (the "provisioned" serial).
    /// Equal to `old_serial` for a no-op.
    pub new_serial: u32,
}

/// Reconcile one authoritative zone against its desired state.
///
/// On success the remote zone contains exactly the desired records (plus
/// any foreign groups the ownership policy leaves alone) and, if anything
/// changed, an SOA whose serial is one greater than before.
pub async fn reconcile_zone(
    prov: &dyn Provisioner,
    desired: &Zone,
) -> Result<ReconcileOutcome, ReconcileError> {
    let remote = prov.remote_zone().await.map_err(ReconcileError::RemoteZone)?;

    let soas: Vec<_> = remote
        .iter()
        .filter(|r| r.rrtype == RecordType::SOA)
        .collect();
    let old_soa = match soas.as_slice() {
        [] => return Err(ReconcileError::NoSoa),
        [soa] => (*soa).clone(),
        many => return Err(ReconcileError::MultipleSoa(many.len())),
    };
    let old_serial = old_soa.soa_serial()?;

    let desired_groups = desired.group(prov.group_flags());
    let mut remote_groups = remote.group(prov.group_flags());

    let mut wanted = Zone::new();
    let mut unwanted = Zone::new();

    for (key, group) in &desired_groups {
        let mut desired_group = group.clone();
        desired_group.sort();
        let desired_group = desired_group.dedupe();

        let mut remote_group = remote_groups.remove(key).unwrap_or_default();
        remote_group.sort();
        let remote_group = remote_group.dedupe();

        let (want, _, unwant) = desired_group.diff(&remote_group);
        wanted.extend(want);
        unwanted.extend(unwant);
    }

    // Whatever is left in the remote grouping is foreign: groups the
    // desired zone does not address. Prune only those the ownership policy
    // classifies as ours.
    let owner_flags = prov.owner_flags();
    for (key, group) in remote_groups {
        if !owner_flags.owns(key.group_flags()) {
            continue;
        }
        debug!(group = %key, "pruning foreign record group");
        let mut group = group;
        group.sort();
        unwanted.extend(group.dedupe());
    }

    if wanted.is_empty() && unwanted.is_empty() {
        return Ok(ReconcileOutcome {
            changed: false,
            old_serial,
            new_serial: old_serial,
        });
    }

    let new_serial = old_serial.wrapping_add(1);
    let new_soa = old_soa.with_soa_serial(new_serial)?;

    wanted.sort();
    unwanted.sort();
    wanted.push(new_soa);
    unwanted.push(old_soa);

    prov.update_zone(&wanted, &unwanted, desired, &remote)
        .await
        .map_err(ReconcileError::UpdateZone)?;

    Ok(ReconcileOutcome {
        changed: true,
        old_serial,
        new_serial,
    })
}
