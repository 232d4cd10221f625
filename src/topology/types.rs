//! Host and connection records.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::net::Ipv4Addr;

const LEGACY_ONLINE: &str = "#00d700";
const LEGACY_OFFLINE: &str = "red";

/// Liveness of a host or connection as last observed by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    Online,
    Offline,
    /// Never probed, or the stored token was not recognized.
    #[default]
    Unknown,
}

impl Status {
    /// Decode a stored token. Besides the canonical words this accepts the
    /// legacy color tokens (`#00d700` online, `red` offline).
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        if token.eq_ignore_ascii_case("online") || token.eq_ignore_ascii_case(LEGACY_ONLINE) {
            Status::Online
        } else if token.eq_ignore_ascii_case("offline") || token.eq_ignore_ascii_case(LEGACY_OFFLINE) {
            Status::Offline
        } else {
            Status::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Online => "online",
            Status::Offline => "offline",
            Status::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = Option::<String>::deserialize(deserializer)?;
        Ok(token.as_deref().map_or(Status::Unknown, Status::from_token))
    }
}

/// On-disk latency encoding: milliseconds, with `-1` for unknown.
pub(crate) mod latency_sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    const UNKNOWN: i64 = -1;

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ms) => serializer.serialize_i64(i64::try_from(*ms).unwrap_or(i64::MAX)),
            None => serializer.serialize_i64(UNKNOWN),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let raw = Option::<f64>::deserialize(deserializer)?;
        Ok(match raw {
            Some(ms) if ms.is_finite() && ms >= 0.0 => Some(ms as u64),
            _ => None,
        })
    }
}

/// A link from a host to another address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub ip: Ipv4Addr,
    #[serde(default)]
    pub status: Status,
    #[serde(default, with = "latency_sentinel")]
    pub latency_ms: Option<u64>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Connection {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            status: Status::Unknown,
            latency_ms: None,
            attributes: Map::new(),
        }
    }
}

/// A switch or host in the topology, keyed by `ip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub ip: Ipv4Addr,
    pub name: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, with = "latency_sentinel")]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub category: String,
    /// Display metadata passed through without interpretation.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Host {
    pub fn new(ip: Ipv4Addr, name: impl Into<String>) -> Self {
        Self {
            ip,
            name: name.into(),
            status: Status::Unknown,
            latency_ms: None,
            connections: Vec::new(),
            site: String::new(),
            category: String::new(),
            attributes: Map::new(),
        }
    }

    pub fn with_connection(mut self, ip: Ipv4Addr) -> Self {
        self.connections.push(Connection::new(ip));
        self
    }
}
