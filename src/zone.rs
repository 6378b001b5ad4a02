// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory DNS zone model.
//!
//! A [`Zone`] is an ordered collection of [`Record`]s belonging to one
//! authoritative domain. Records carry a flag map parsed from the trailing
//! `;` comment of their master-file representation; flags are hints for the
//! provisioners and participate in record identity via [`RecordSetKey`].
//!
//! The operations here (sort, dedupe, diff, partition, group) are the
//! foundation of the reconciler: deletion safety depends on the total order
//! and the grouping key being stable and precise.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use hickory_proto::rr::{DNSClass, RecordType};
use thiserror::Error;

/// A set of KV pairs, parsed from the comment of a record.
///
/// Flags pass hints to the provisioners. Values may be empty ("bare word").
/// The canonical string form renders keys in ascending order, `k` for empty
/// values and `k=v` otherwise, joined by single spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFlags(BTreeMap<String, String>);

impl RecordFlags {
    /// Parse simple `K=V` pairs from a comment on a record.
    ///
    /// Tokens are whitespace-separated; each token is split on the first
    /// `=`. Any bare words are included with an empty value. Parsing a
    /// string cannot fail.
    pub fn parse(comment: &str) -> Self {
        let mut flags = BTreeMap::new();
        for token in comment.split_whitespace() {
            let (k, v) = match token.split_once('=') {
                Some((k, v)) => (k, v),
                None => (token, ""),
            };
            flags.insert(k.to_string(), v.to_string());
        }
        RecordFlags(flags)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Compare two flag sets: first by flag count, then by the canonical
    /// string representation.
    pub fn compare(&self, other: &RecordFlags) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl fmt::Display for RecordFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            if v.is_empty() {
                write!(f, "{k}")?;
            } else {
                write!(f, "{k}={v}")?;
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for RecordFlags {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        RecordFlags(iter.into_iter().collect())
    }
}

/// Errors raised by the SOA helpers on [`Record`].
#[derive(Debug, Error)]
pub enum SoaError {
    /// The record is not an SOA record.
    #[error("record {0:?} is not an SOA record")]
    NotSoa(String),

    /// The SOA rdata does not have the seven master-file fields.
    #[error("SOA rdata has {0} fields, expected 7")]
    FieldCount(usize),

    /// The serial field is not a 32-bit unsigned integer.
    #[error("invalid SOA serial {value:?}")]
    Serial {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// A DNS record we wish to be present, along with flags which may contain
/// hints to the provisioner.
///
/// The canonical textual form is the tab-separated master-file rendering
/// `name\tttl\tclass\ttype\trdata`; [`fmt::Display`] appends the flag
/// comment when flags are present.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub class: DNSClass,
    pub rrtype: RecordType,
    pub ttl: u32,
    pub rdata: String,
    pub flags: RecordFlags,
}

impl Record {
    pub fn new(
        name: impl Into<String>,
        class: DNSClass,
        rrtype: RecordType,
        ttl: u32,
        rdata: impl Into<String>,
    ) -> Self {
        Record {
            name: name.into(),
            class,
            rrtype,
            ttl,
            rdata: rdata.into(),
            flags: RecordFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: RecordFlags) -> Self {
        self.flags = flags;
        self
    }

    /// The canonical textual form of the resource record, without flags.
    pub fn rr_string(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.name, self.ttl, self.class, self.rrtype, self.rdata
        )
    }

    fn soa_fields(&self) -> Result<Vec<&str>, SoaError> {
        if self.rrtype != RecordType::SOA {
            return Err(SoaError::NotSoa(self.name.clone()));
        }
        let fields: Vec<&str> = self.rdata.split_whitespace().collect();
        if fields.len() != 7 {
            return Err(SoaError::FieldCount(fields.len()));
        }
        Ok(fields)
    }

    /// The serial number of an SOA record (the third rdata field).
    pub fn soa_serial(&self) -> Result<u32, SoaError> {
        let fields = self.soa_fields()?;
        fields[2].parse().map_err(|source| SoaError::Serial {
            value: fields[2].to_string(),
            source,
        })
    }

    /// A copy of an SOA record with the serial replaced.
    pub fn with_soa_serial(&self, serial: u32) -> Result<Record, SoaError> {
        let mut fields: Vec<String> = self
            .soa_fields()?
            .into_iter()
            .map(str::to_string)
            .collect();
        fields[2] = serial.to_string();
        let mut rec = self.clone();
        rec.rdata = fields.join(" ");
        Ok(rec)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rr_string())?;
        if !self.flags.is_empty() {
            write!(f, " ; {}", self.flags)?;
        }
        Ok(())
    }
}

impl Ord for Record {
    /// Total order: name, ttl, class (numeric), rrtype (numeric), canonical
    /// RR text, then flags (count, then canonical string). Two records are
    /// equal only when every component matches.
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.ttl.cmp(&other.ttl))
            .then_with(|| u16::from(self.class).cmp(&u16::from(other.class)))
            .then_with(|| u16::from(self.rrtype).cmp(&u16::from(other.rrtype)))
            .then_with(|| self.rr_string().cmp(&other.rr_string()))
            .then_with(|| self.flags.compare(&other.flags))
    }
}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Record {}

/// The identity of a record group: header fields plus the subset of the
/// record's flags whose keys appear in the provisioner's group-flag list.
///
/// The deterministic rendering of the selected flags (keys ascending,
/// `k="v"` pairs space-joined) is the `Display` form; equal keys and equal
/// rendered strings coincide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSetKey {
    pub name: String,
    pub class: DNSClass,
    pub rrtype: RecordType,
    group_flags: RecordFlags,
}

impl RecordSetKey {
    pub fn new(record: &Record, group_flag_keys: &[String]) -> Self {
        let mut group_flags = RecordFlags::default();
        for key in group_flag_keys {
            if let Some(value) = record.flags.get(key) {
                group_flags.insert(key.clone(), value.to_string());
            }
        }
        RecordSetKey {
            name: record.name.clone(),
            class: record.class,
            rrtype: record.rrtype,
            group_flags,
        }
    }

    /// The flags that participate in this group's identity.
    pub fn group_flags(&self) -> &RecordFlags {
        &self.group_flags
    }

    /// The deterministic `k="v"` rendering of the group flags; empty when no
    /// declared group flag is present on the records.
    pub fn group_flags_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.group_flags.len());
        for (k, v) in self.group_flags.iter() {
            parts.push(format!("{k}={v:?}"));
        }
        parts.join(" ")
    }
}

impl fmt::Display for RecordSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.class, self.rrtype)?;
        if !self.group_flags.is_empty() {
            write!(f, " {}", self.group_flags_string())?;
        }
        Ok(())
    }
}

impl Ord for RecordSetKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| u16::from(self.class).cmp(&u16::from(other.class)))
            .then_with(|| u16::from(self.rrtype).cmp(&u16::from(other.rrtype)))
            .then_with(|| self.group_flags.iter().cmp(other.group_flags.iter()))
    }
}

impl PartialOrd for RecordSetKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A collection of related records.
///
/// Ordering is only significant at specific operations: [`Zone::dedupe`]
/// and [`Zone::diff`] require sorted input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zone(Vec<Record>);

impl Zone {
    pub fn new() -> Self {
        Zone::default()
    }

    pub fn push(&mut self, record: Record) {
        self.0.push(record);
    }

    pub fn extend(&mut self, other: Zone) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    /// Stable sort by the total record order.
    pub fn sort(&mut self) {
        self.0.sort();
    }

    /// Remove adjacent duplicates. The zone must already be sorted; the
    /// result length is the number of distinct records under compare.
    pub fn dedupe(mut self) -> Zone {
        self.0.dedup();
        self
    }

    /// Enumerate the differences between two zones. Both zones must be
    /// sorted before calling.
    ///
    /// Returns `(left, common, right)`: the records only in `self`, a
    /// longest common subsequence of the two, and the records only in
    /// `other`.
    pub fn diff(&self, other: &Zone) -> (Zone, Zone, Zone) {
        let common = lcs(&self.0, &other.0);

        let mut left = Zone::new();
        let mut j = 0;
        for rec in &self.0 {
            if j < common.len() && *rec == common[j] {
                j += 1;
                continue;
            }
            left.push(rec.clone());
        }

        let mut right = Zone::new();
        j = 0;
        for rec in &other.0 {
            if j < common.len() && *rec == common[j] {
                j += 1;
                continue;
            }
            right.push(rec.clone());
        }

        (left, Zone(common), right)
    }

    /// Split the zone's data into separate zones based on a list of
    /// domains. Records are assigned to the longest matching domain suffix;
    /// records matching no domain are dropped.
    pub fn partition(&self, domains: &[String]) -> BTreeMap<String, Zone> {
        let mut domains: Vec<&String> = domains.iter().collect();
        // Descending reverse-suffix order, so the most specific suffix is
        // tried first.
        domains.sort_by(|a, b| b.bytes().rev().cmp(a.bytes().rev()));

        let mut buckets: BTreeMap<String, Zone> = BTreeMap::new();
        for rec in &self.0 {
            for domain in &domains {
                if rec.name.ends_with(domain.as_str()) {
                    buckets
                        .entry((*domain).clone())
                        .or_default()
                        .push(rec.clone());
                    break;
                }
            }
        }

        buckets
    }

    /// Group all the records by name, class and type, along with the given
    /// set of grouping flags. Key identity is a pure function of the record
    /// and the flag list.
    pub fn group(&self, group_flag_keys: &[String]) -> BTreeMap<RecordSetKey, Zone> {
        let mut groups: BTreeMap<RecordSetKey, Zone> = BTreeMap::new();
        for rec in &self.0 {
            let key = RecordSetKey::new(rec, group_flag_keys);
            groups.entry(key).or_default().push(rec.clone());
        }
        groups
    }

    /// The set of records matching the provided name, class and type.
    pub fn find_set(&self, name: &str, class: DNSClass, rrtype: RecordType) -> Zone {
        Zone(
            self.0
                .iter()
                .filter(|r| r.name == name && r.class == class && r.rrtype == rrtype)
                .cloned()
                .collect(),
        )
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for rec in &self.0 {
            if !first {
                f.write_str("\n")?;
            }
            first = false;
            write!(f, "{rec}")?;
        }
        Ok(())
    }
}

impl From<Vec<Record>> for Zone {
    fn from(records: Vec<Record>) -> Self {
        Zone(records)
    }
}

impl FromIterator<Record> for Zone {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Zone(iter.into_iter().collect())
    }
}

impl IntoIterator for Zone {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Zone {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Longest common subsequence of two sorted record slices, via the standard
/// DP table. The backtrack prefers the left predecessor on ties, matching
/// the diff expectations in the tests.
fn lcs(a: &[Record], b: &[Record]) -> Vec<Record> {
    let (la, lb) = (a.len(), b.len());
    let mut table = vec![vec![0usize; lb + 1]; la + 1];

    for i in 1..=la {
        for j in 1..=lb {
            table[i][j] = if a[i - 1] == b[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    let mut common = Vec::with_capacity(table[la][lb]);
    let (mut i, mut j) = (la, lb);
    while i > 0 && j > 0 {
        if a[i - 1] == b[j - 1] {
            common.push(a[i - 1].clone());
            i -= 1;
            j -= 1;
        } else if table[i][j - 1] > table[i - 1][j] {
            j -= 1;
        } else {
            i -= 1;
        }
    }
    common.reverse();
    common
}
