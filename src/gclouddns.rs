// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Google Cloud DNS provisioner.
//!
//! Cloud DNS has no official Rust SDK, so this talks to the JSON REST API
//! directly: `GET .../rrsets` to read the zone and `POST .../changes` to
//! apply a change. A Cloud DNS change carries matched `deletions` and
//! `additions` record sets and is applied atomically; the SOA replacement
//! rides in the same change, located by scanning for the SOA rrtype.
//!
//! Cloud DNS record sets have no set identifiers, so the group-flag list is
//! empty and record identity is `(name, class, type)` alone.

use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use hickory_proto::rr::{DNSClass, RecordType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::GCloudDnsConfig;
use crate::provisioner::{OwnerFlags, Provisioner};
use crate::zone::{Record, RecordSetKey, Zone};

const API_BASE: &str = "https://dns.googleapis.com/dns/v1";
const SCOPE: &str = "https://www.googleapis.com/auth/ndev.clouddns.readwrite";

/// One Cloud DNS resource record set, as the JSON API renders it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct RrSet {
    pub name: String,
    #[serde(rename = "type")]
    pub rrtype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub rrdatas: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RrSetPage {
    #[serde(default)]
    rrsets: Vec<RrSet>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct ChangeBody {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additions: Vec<RrSet>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deletions: Vec<RrSet>,
}

#[derive(Debug, Deserialize)]
struct ChangeResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: String,
}

/// A Google Cloud DNS provisioner for one managed zone.
pub struct GCloudDns {
    cfg: GCloudDnsConfig,
    owner_flags: OwnerFlags,
    group_flags: Vec<String>,
    http: reqwest::Client,
    // Application-default credentials, resolved on first use so building
    // the provisioner needs no credentials.
    auth: OnceCell<Arc<dyn TokenProvider>>,
}

impl GCloudDns {
    pub fn new(cfg: GCloudDnsConfig, owner_flags: OwnerFlags) -> Self {
        GCloudDns {
            cfg,
            owner_flags,
            group_flags: Vec::new(),
            http: reqwest::Client::new(),
            auth: OnceCell::new(),
        }
    }

    async fn bearer_token(&self) -> Result<String> {
        let provider = self
            .auth
            .get_or_try_init(gcp_auth::provider)
            .await
            .context("resolving google cloud credentials")?;
        let token = provider
            .token(&[SCOPE])
            .await
            .context("fetching google cloud access token")?;
        Ok(token.as_str().to_string())
    }

    fn zone_url(&self, suffix: &str) -> String {
        format!(
            "{API_BASE}/projects/{}/managedZones/{}{suffix}",
            self.cfg.project, self.cfg.zone_id
        )
    }
}

#[async_trait]
impl Provisioner for GCloudDns {
    async fn remote_zone(&self) -> Result<Zone> {
        let token = self.bearer_token().await?;

        let mut zone = Zone::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = self.zone_url("/rrsets");
            let mut req = self.http.get(&url).bearer_auth(&token);
            if let Some(next) = &page_token {
                req = req.query(&[("pageToken", next)]);
            }

            let page: RrSetPage = req
                .send()
                .await
                .with_context(|| format!("requesting {url}"))?
                .error_for_status()
                .with_context(|| format!("requesting {url}"))?
                .json()
                .await
                .with_context(|| format!("decoding response from {url}"))?;

            for rrset in &page.rrsets {
                match records_from_rrset(rrset) {
                    Ok(records) => zone.extend(Zone::from(records)),
                    Err(e) => warn!(
                        name = %rrset.name,
                        rrtype = %rrset.rrtype,
                        error = %e,
                        "skipping unrepresentable record set"
                    ),
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
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
        let change = build_change(&self.group_flags, wanted, unwanted, desired, remote)?;
        if change.additions.is_empty() && change.deletions.is_empty() {
            return Ok(());
        }

        let token = self.bearer_token().await?;
        let url = self.zone_url("/changes");
        let resp: ChangeResponse = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&change)
            .send()
            .await
            .with_context(|| format!("posting change to {url}"))?
            .error_for_status()
            .with_context(|| format!("posting change to {url}"))?
            .json()
            .await
            .with_context(|| format!("decoding change response from {url}"))?;

        debug!(id = %resp.id, status = %resp.status, "cloud dns change accepted");
        info!(
            project = %self.cfg.project,
            zone = self.cfg.zone(),
            "applied cloud dns change"
        );
        Ok(())
    }
}

/// Build the matched deletions/additions for an update.
///
/// Every record-set key touched by the change set is deleted as it exists
/// remotely and re-added as the desired zone renders it; the SOA pair in
/// `wanted`/`unwanted` falls back to the wanted records for keys the
/// desired zone does not address.
pub(crate) fn build_change(
    group_flags: &[String],
    wanted: &Zone,
    unwanted: &Zone,
    desired: &Zone,
    remote: &Zone,
) -> Result<ChangeBody> {
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

    let mut change = ChangeBody::default();
    for key in affected {
        if let Some(current) = remote_groups.get(key) {
            let mut current = current.clone();
            current.sort();
            change
                .deletions
                .push(rrset_from_records(key, &current.dedupe())?);
        }

        let target = desired_groups.get(key).or_else(|| wanted_groups.get(key));
        if let Some(target) = target {
            let mut target = target.clone();
            target.sort();
            change
                .additions
                .push(rrset_from_records(key, &target.dedupe())?);
        }
    }

    Ok(change)
}

/// Convert one Cloud DNS record set into zone records, one per rrdata.
pub(crate) fn records_from_rrset(rrset: &RrSet) -> Result<Vec<Record>> {
    let rrtype = RecordType::from_str(&rrset.rrtype)
        .map_err(|_| anyhow!("unsupported record type {:?}", rrset.rrtype))?;
    let ttl = u32::try_from(rrset.ttl.unwrap_or(0)).unwrap_or(0);

    Ok(rrset
        .rrdatas
        .iter()
        .map(|rrdata| Record::new(rrset.name.clone(), DNSClass::IN, rrtype, ttl, rrdata.clone()))
        .collect())
}

/// Convert one record group back into a Cloud DNS record set.
///
/// CNAME sets carry no TTL.
pub(crate) fn rrset_from_records(key: &RecordSetKey, records: &Zone) -> Result<RrSet> {
    let first = records
        .records()
        .first()
        .ok_or_else(|| anyhow!("empty record set for {key}"))?;

    Ok(RrSet {
        name: key.name.clone(),
        rrtype: key.rrtype.to_string(),
        ttl: (key.rrtype != RecordType::CNAME).then_some(i64::from(first.ttl)),
        rrdatas: records.iter().map(|r| r.rdata.clone()).collect(),
    })
}
