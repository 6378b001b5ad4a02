// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! AWS Route 53 provisioner.
//!
//! Records map onto Route 53 resource record sets; the `route53.*` flags
//! carry the rrset attributes that do not exist in master-file syntax:
//!
//! - `route53.SetID` — the set identifier of weighted/latency record sets.
//!   Participates in the record-set identity, so differently-identified
//!   sets with the same name and type are distinct groups.
//! - `route53.Weight` — the integer weight of a weighted set.
//! - `route53.Region` — the region of a latency set.
//! - `route53.Alias` — `zoneId:dnsName` of an alias target. Alias sets
//!   emit no TTL and no resource records.
//! - `route53.EvalTargetHealth` — `"true"` sets `EvaluateTargetHealth` on
//!   the alias target.
//!
//! An update is one `ChangeBatch` of DELETE operations followed by CREATE
//! operations. A DELETE must present the record set exactly as it exists,
//! so deletions are rebuilt from the remote zone and creations from the
//! desired zone, per record-set key. Route 53 applies the batch
//! atomically.

use std::str::FromStr;

use anyhow::{anyhow, bail, Context as _, Result};
use async_trait::async_trait;
use aws_sdk_route53::types::{
    AliasTarget, Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet,
    ResourceRecordSetRegion, RrType,
};
use aws_sdk_route53::Client;
use hickory_proto::rr::{DNSClass, RecordType};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Route53Config;
use crate::provisioner::{OwnerFlags, Provisioner};
use crate::zone::{Record, RecordFlags, RecordSetKey, Zone};

/// Flag carrying the rrset `SetIdentifier`; part of the group identity.
pub const FLAG_SET_ID: &str = "route53.SetID";
/// Flag carrying the rrset `Weight`.
pub const FLAG_WEIGHT: &str = "route53.Weight";
/// Flag carrying the rrset `Region`.
pub const FLAG_REGION: &str = "route53.Region";
/// Flag carrying the alias target as `zoneId:dnsName`.
pub const FLAG_ALIAS: &str = "route53.Alias";
/// Flag enabling `EvaluateTargetHealth` on an alias target.
pub const FLAG_EVAL_TARGET_HEALTH: &str = "route53.EvalTargetHealth";

/// An AWS Route 53 provisioner for one hosted zone.
pub struct Route53 {
    cfg: Route53Config,
    owner_flags: OwnerFlags,
    group_flags: Vec<String>,
    client: Client,
    // Cached hosted zone id; populated from config or the first lookup.
    zone_id: Mutex<Option<String>>,
}

impl Route53 {
    pub async fn new(cfg: Route53Config, owner_flags: OwnerFlags) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Route53 {
            zone_id: Mutex::new(cfg.zoneid.clone()),
            group_flags: vec![FLAG_SET_ID.to_string()],
            owner_flags,
            client: Client::new(&shared),
            cfg,
        }
    }

    /// The hosted zone id, looked up by name once and cached.
    async fn hosted_zone_id(&self) -> Result<String> {
        let mut cached = self.zone_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let resp = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(self.cfg.zone())
            .max_items(1)
            .send()
            .await
            .context("listing hosted zones")?;

        let zone = resp
            .hosted_zones()
            .first()
            .filter(|hz| hz.name() == self.cfg.zone())
            .ok_or_else(|| anyhow!("unknown zone {}", self.cfg.zone()))?;

        let id = zone.id().trim_start_matches("/hostedzone/").to_string();
        debug!(zone = self.cfg.zone(), id = %id, "resolved hosted zone id");
        *cached = Some(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl Provisioner for Route53 {
    async fn remote_zone(&self) -> Result<Zone> {
        let zone_id = self.hosted_zone_id().await?;

        let mut zone = Zone::new();
        let mut start_record_name: Option<String> = None;
        let mut start_record_type: Option<RrType> = None;
        let mut start_record_identifier: Option<String> = None;
        loop {
            let mut req = self
                .client
                .list_resource_record_sets()
                .hosted_zone_id(&zone_id);
            if let Some(name) = &start_record_name {
                req = req.start_record_name(name);
            }
            if let Some(rrtype) = start_record_type.clone() {
                req = req.start_record_type(rrtype);
            }
            if let Some(identifier) = &start_record_identifier {
                req = req.start_record_identifier(identifier);
            }
            let output = req.send().await.context("listing resource record sets")?;
            for rrset in output.resource_record_sets() {
                match records_from_rrset(rrset) {
                    Ok(records) => zone.extend(Zone::from(records)),
                    Err(e) => warn!(
                        name = rrset.name(),
                        rrtype = rrset.r#type().as_str(),
                        error = %e,
                        "skipping unrepresentable record set"
                    ),
                }
            }
            if !output.is_truncated() {
                break;
            }
            start_record_name = output.next_record_name().map(str::to_string);
            start_record_type = output.next_record_type().cloned();
            start_record_identifier = output.next_record_identifier().map(str::to_string);
        }

        zone.sort();
        Ok(zone)
    }

    fn group_flags(&self) -> &[String] {
        &self.group_flags
    }

    fn owner_flags(&self) -> &OwnerFlags {
        &self.owner_flags
    }

    async fn update_zone(
        &self,
        wanted: &Zone,
        unwanted: &Zone,
        desired: &Zone,
        remote: &Zone,
    ) -> Result<()> {
        let zone_id = self.hosted_zone_id().await?;
        let changes = build_changes(&self.group_flags, wanted, unwanted, desired, remote)?;
        if changes.is_empty() {
            return Ok(());
        }

        let batch = ChangeBatch::builder()
            .set_changes(Some(changes))
            .build()
            .context("building change batch")?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(&zone_id)
            .change_batch(batch)
            .send()
            .await
            .context("applying change batch")?;

        info!(zone = self.cfg.zone(), "applied route53 change batch");
        Ok(())
    }
}

/// Build the DELETE-then-CREATE change list for an update.
///
/// Every record-set key touched by the change set is deleted as it exists
/// remotely (when it exists) and recreated as the desired zone renders it
/// (when it renders it at all). The SOA pair rides in `wanted`/`unwanted`
/// without appearing in `desired`, so creations fall back to the wanted
/// records for keys the desired zone does not address.
pub(crate) fn build_changes(
    group_flags: &[String],
    wanted: &Zone,
    unwanted: &Zone,
    desired: &Zone,
    remote: &Zone,
) -> Result<Vec<Change>> {
    let remote_groups = remote.group(group_flags);
    let desired_groups = desired.group(group_flags);
    let wanted_groups = wanted.group(group_flags);
    let unwanted_groups = unwanted.group(group_flags);

    let mut affected: Vec<&RecordSetKey> = unwanted_groups.keys().collect();
    for key in wanted_groups.keys() {
        if !unwanted_groups.contains_key(key) {
            affected.push(key);
        }
    }
    affected.sort();

    let mut deletes = Vec::new();
    let mut creates = Vec::new();
    for key in affected {
        if let Some(current) = remote_groups.get(key) {
            let mut current = current.clone();
            current.sort();
            let rrset = rrset_from_records(key, &current.dedupe())?;
            deletes.push(
                Change::builder()
                    .action(ChangeAction::Delete)
                    .resource_record_set(rrset)
                    .build()
                    .context("building delete change")?,
            );
        }

        let target = desired_groups.get(key).or_else(|| wanted_groups.get(key));
        if let Some(target) = target {
            let mut target = target.clone();
            target.sort();
            let rrset = rrset_from_records(key, &target.dedupe())?;
            creates.push(
                Change::builder()
                    .action(ChangeAction::Create)
                    .resource_record_set(rrset)
                    .build()
                    .context("building create change")?,
            );
        }
    }

    deletes.extend(creates);
    Ok(deletes)
}

/// Convert one Route 53 record set into zone records, one per value, all
/// carrying the set's attribute flags.
pub(crate) fn records_from_rrset(rrset: &ResourceRecordSet) -> Result<Vec<Record>> {
    let rrtype = RecordType::from_str(rrset.r#type().as_str())
        .map_err(|_| anyhow!("unsupported record type {:?}", rrset.r#type().as_str()))?;

    let mut flags = RecordFlags::default();
    if let Some(set_id) = rrset.set_identifier() {
        flags.insert(FLAG_SET_ID, set_id);
    }
    if let Some(weight) = rrset.weight() {
        flags.insert(FLAG_WEIGHT, weight.to_string());
    }
    if let Some(region) = rrset.region() {
        flags.insert(FLAG_REGION, region.as_str());
    }

    let mut records = Vec::new();
    let ttl = u32::try_from(rrset.ttl().unwrap_or(0)).unwrap_or(0);
    for value in rrset.resource_records() {
        records.push(
            Record::new(rrset.name(), DNSClass::IN, rrtype, ttl, value.value())
                .with_flags(flags.clone()),
        );
    }

    if let Some(alias) = rrset.alias_target() {
        flags.insert(
            FLAG_ALIAS,
            format!("{}:{}", alias.hosted_zone_id(), alias.dns_name()),
        );
        if alias.evaluate_target_health() {
            flags.insert(FLAG_EVAL_TARGET_HEALTH, "true");
        }
        // Alias targets have no rdata of their own; the placeholder keeps
        // the record comparable while the flags carry the identity.
        records.push(
            Record::new(rrset.name(), DNSClass::IN, rrtype, 0, "0.0.0.0").with_flags(flags),
        );
    }

    Ok(records)
}

/// Convert one record group back into a Route 53 record set.
pub(crate) fn rrset_from_records(key: &RecordSetKey, records: &Zone) -> Result<ResourceRecordSet> {
    let first = records
        .records()
        .first()
        .ok_or_else(|| anyhow!("empty record set for {key}"))?;

    let mut builder = ResourceRecordSet::builder()
        .name(key.name.clone())
        .r#type(RrType::from(key.rrtype.to_string().as_str()));

    if let Some(set_id) = first.flags.get(FLAG_SET_ID) {
        builder = builder.set_identifier(set_id);
    }
    if let Some(weight) = first.flags.get(FLAG_WEIGHT) {
        let weight: i64 = weight
            .parse()
            .with_context(|| format!("invalid {FLAG_WEIGHT} {weight:?} for {key}"))?;
        builder = builder.weight(weight);
    }
    if let Some(region) = first.flags.get(FLAG_REGION) {
        builder = builder.region(ResourceRecordSetRegion::from(region));
    }

    if let Some(alias) = first.flags.get(FLAG_ALIAS) {
        let Some((zone_id, dns_name)) = alias.split_once(':') else {
            bail!("invalid {FLAG_ALIAS} {alias:?} for {key}, expected zoneId:dnsName");
        };
        let eval = first
            .flags
            .get(FLAG_EVAL_TARGET_HEALTH)
            .is_some_and(|v| v == "true");
        let target = AliasTarget::builder()
            .hosted_zone_id(zone_id)
            .dns_name(dns_name)
            .evaluate_target_health(eval)
            .build()
            .context("building alias target")?;
        builder = builder.alias_target(target);
    } else {
        builder = builder.ttl(i64::from(first.ttl));
        for record in records {
            builder = builder.resource_records(
                ResourceRecord::builder()
                    .value(record.rdata.clone())
                    .build()
                    .context("building resource record")?,
            );
        }
    }

    builder.build().context("building resource record set")
}
