//! The topology document: the store's root aggregate.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

use crate::topology::types::{Connection, Host};

/// Errors raised while decoding a durable document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document root must be a JSON object")]
    NotAnObject,
}

/// What the boundary had to repair while decoding a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub duplicate_hosts: usize,
    pub invalid_hosts: usize,
    pub invalid_connections: usize,
    pub invalid_markers: usize,
    /// Top-level collections of the wrong shape, dropped and reset to empty.
    pub invalid_fields: usize,
    pub invalid_trusted_names: usize,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of a priority request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityReport {
    pub accepted: Vec<Ipv4Addr>,
    pub rejected: Vec<Ipv4Addr>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyDocument {
    #[serde(default)]
    pub hosts: Vec<Host>,

    /// Edit requests owned by the approval workflow; never interpreted here.
    #[serde(default)]
    pub pending_edits: Vec<Value>,

    /// Addresses granted expedited probing, with the time they were marked.
    #[serde(default)]
    pub priority_ips: BTreeMap<Ipv4Addr, DateTime<Utc>>,

    #[serde(default)]
    pub trusted_hostnames: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TopologyDocument {
    /// Decode a durable document, dropping entries that do not validate.
    ///
    /// Only invalid JSON or a non-object root is an error. Bad hosts,
    /// connections, markers and wrongly shaped collections are dropped and
    /// counted in the returned report instead.
    pub fn from_json(bytes: &[u8]) -> Result<(Self, NormalizeReport), DocumentError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut root) = value else {
            return Err(DocumentError::NotAnObject);
        };
        let mut report = NormalizeReport::default();

        let hosts = match root.remove("hosts") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| parse_host(item, &mut report))
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                invalid_field("hosts", &other, &mut report);
                Vec::new()
            }
        };

        let pending_edits = match root.remove("pending_edits") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                invalid_field("pending_edits", &other, &mut report);
                Vec::new()
            }
        };

        let priority_ips = match root.remove("priority_ips") {
            Some(Value::Object(markers)) => markers
                .into_iter()
                .filter_map(|(ip, stamp)| {
                    let parsed = ip
                        .parse::<Ipv4Addr>()
                        .ok()
                        .zip(stamp.as_str().and_then(parse_timestamp));
                    if parsed.is_none() {
                        tracing::warn!(ip = %ip, stamp = %stamp, "Dropping malformed priority marker");
                        report.invalid_markers += 1;
                    }
                    parsed
                })
                .collect(),
            Some(Value::Null) | None => BTreeMap::new(),
            Some(other) => {
                invalid_field("priority_ips", &other, &mut report);
                BTreeMap::new()
            }
        };

        let trusted_hostnames = match root.remove("trusted_hostnames") {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name),
                    _ => {
                        report.invalid_trusted_names += 1;
                        None
                    }
                })
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                invalid_field("trusted_hostnames", &other, &mut report);
                Vec::new()
            }
        };

        let last_update = root
            .remove("last_update")
            .as_ref()
            .and_then(Value::as_str)
            .and_then(parse_timestamp);

        let mut document = Self {
            hosts,
            pending_edits,
            priority_ips,
            trusted_hostnames,
            last_update,
            extra: root,
        };
        report.duplicate_hosts = document.dedup_hosts();
        Ok((document, report))
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>, DocumentError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Collapse hosts sharing an `ip`; returns how many entries were removed.
    ///
    /// The surviving entry holds the value of the last occurrence at the
    /// position of the first.
    pub fn dedup_hosts(&mut self) -> usize {
        let before = self.hosts.len();
        let mut slots: HashMap<Ipv4Addr, usize> = HashMap::with_capacity(before);
        let mut unique: Vec<Host> = Vec::with_capacity(before);

        for host in self.hosts.drain(..) {
            match slots.get(&host.ip) {
                Some(&slot) => unique[slot] = host,
                None => {
                    slots.insert(host.ip, unique.len());
                    unique.push(host);
                }
            }
        }

        self.hosts = unique;
        before - self.hosts.len()
    }

    pub fn host(&self, ip: Ipv4Addr) -> Option<&Host> {
        self.hosts.iter().find(|h| h.ip == ip)
    }

    pub fn is_priority(&self, ip: Ipv4Addr) -> bool {
        self.priority_ips.contains_key(&ip)
    }

    /// Every host and connection address, each listed once, in first-seen order.
    pub fn probe_targets(&self) -> Vec<Ipv4Addr> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for host in &self.hosts {
            let addresses = std::iter::once(host.ip).chain(host.connections.iter().map(|c| c.ip));
            for ip in addresses {
                if seen.insert(ip) {
                    targets.push(ip);
                }
            }
        }
        targets
    }

    /// Mark known host addresses for expedited probing.
    pub fn mark_priority(&mut self, ips: &[Ipv4Addr], now: DateTime<Utc>) -> PriorityReport {
        let known: HashSet<Ipv4Addr> = self.hosts.iter().map(|h| h.ip).collect();
        let mut report = PriorityReport::default();
        for &ip in ips {
            if known.contains(&ip) {
                self.priority_ips.insert(ip, now);
                report.accepted.push(ip);
            } else {
                report.rejected.push(ip);
            }
        }
        report
    }

    /// Remove markers at least `ttl` old; returns how many were removed.
    pub fn expire_priority(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.priority_ips.len();
        self.priority_ips.retain(|_, marked| {
            match now.signed_duration_since(*marked).to_std() {
                Ok(age) => age < ttl,
                // Marked in the future (clock skew): keep it.
                Err(_) => true,
            }
        });
        before - self.priority_ips.len()
    }
}

fn parse_host(item: Value, report: &mut NormalizeReport) -> Option<Host> {
    let Value::Object(mut fields) = item else {
        report.invalid_hosts += 1;
        return None;
    };

    let connections = match fields.remove("connections") {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<Connection>(item) {
                Ok(connection) => Some(connection),
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping malformed connection");
                    report.invalid_connections += 1;
                    None
                }
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            report.invalid_connections += 1;
            Vec::new()
        }
    };

    match serde_json::from_value::<Host>(Value::Object(fields)) {
        Ok(mut host) => {
            host.connections = connections;
            Some(host)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed host entry");
            report.invalid_hosts += 1;
            None
        }
    }
}

fn invalid_field(field: &'static str, value: &Value, report: &mut NormalizeReport) {
    tracing::warn!(field, value = %value, "Dropping wrongly shaped document field");
    report.invalid_fields += 1;
}

/// RFC 3339, or a naive ISO-8601 stamp read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|stamp| stamp.with_timezone(&Utc))
        .ok()
        .or_else(|| raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc()))
}
