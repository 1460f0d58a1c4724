//! Wire and view models for RemoteWatch telemetry
//!
//! Mirrors the JSON documents served by the backend:
//! - Inventory records (`GET /api/devices`)
//! - Usage records with parallel history series (`GET /api/usage`)
//! - Merged device views handed to the presentation layer
//!
//! Key strings are exact, spaces included (`"Physical cores"`, `"Disk Usage"`).
//! Unknown keys are kept in `extra` so a merged view loses nothing.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Device liveness as reported by the inventory endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceStatus {
    Online,
    Offline,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceStatus::Online => "Online",
            DeviceStatus::Offline => "Offline",
            DeviceStatus::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Cumulative network counter. Producers emit either a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ByteCount {
    Count(u64),
    Text(String),
}

impl ByteCount {
    pub fn value(&self) -> Option<u64> {
        match self {
            ByteCount::Count(n) => Some(*n),
            ByteCount::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for ByteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteCount::Count(n) => write!(f, "{}", n),
            ByteCount::Text(s) => f.write_str(s),
        }
    }
}

/// Decodes an optional metric sent either as a JSON number or as a numeric
/// string (Windows agents report `PercentDiskTime` as text). Unparsable text
/// reads as absent so one odd sample cannot reject a whole fetch.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Number(f64),
        Text(String),
        Other(Value),
    }

    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Number(n)) => Some(n),
        Some(Scalar::Text(s)) => s.trim().trim_end_matches('%').trim().parse().ok(),
        Some(Scalar::Other(value)) => {
            tracing::debug!("Ignoring non-numeric metric value {}", value);
            None
        }
        None => None,
    })
}

/// Identity and hardware descriptors (slow-changing)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    #[serde(rename = "OS", skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(rename = "Version", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "Processor", skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    #[serde(rename = "Architecture", skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(rename = "Physical cores", skip_serializing_if = "Option::is_none")]
    pub physical_cores: Option<u32>,
    #[serde(rename = "Logical cores", skip_serializing_if = "Option::is_none")]
    pub logical_cores: Option<u32>,
    /// GHz
    #[serde(rename = "Max Frequency", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub max_frequency: Option<f64>,
    #[serde(rename = "Current Frequency", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub current_frequency: Option<f64>,
    #[serde(rename = "Hostname", skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(rename = "IP Address", skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(rename = "Status", skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
}

/// Point-in-time resource snapshot. Memory and disk sizes are in GB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    #[serde(rename = "Total Memory", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub total_memory: Option<f64>,
    #[serde(rename = "Available Memory", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub available_memory: Option<f64>,
    #[serde(rename = "Used Memory", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub used_memory: Option<f64>,
    #[serde(rename = "Disk Total Space", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub disk_total: Option<f64>,
    #[serde(rename = "Disk Used Space", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub disk_used: Option<f64>,
    #[serde(rename = "Disk Free Space", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub disk_free: Option<f64>,
    /// Percent
    #[serde(rename = "Disk Usage", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub disk_usage: Option<f64>,
    #[serde(rename = "Total Bytes Sent", skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<ByteCount>,
    #[serde(rename = "Total Bytes Received", skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<ByteCount>,
    /// HH:MM:SS since boot
    #[serde(rename = "Uptime", skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(rename = "Timestamp", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Every non-identity field a record can carry.
///
/// Inventory and usage documents overlap on the wire, so both decode into the
/// same shape and the merge is a field-wise overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAttributes {
    #[serde(flatten)]
    pub hardware: HardwareProfile,
    #[serde(flatten)]
    pub resources: ResourceSnapshot,
    /// Keys this model does not know (`_id`, `avgCPUUsage`, ...), kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn overlay_field<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
    if let Some(value) = src {
        *dst = Some(value.clone());
    }
}

impl HardwareProfile {
    fn overlay(&mut self, top: &HardwareProfile) {
        overlay_field(&mut self.os, &top.os);
        overlay_field(&mut self.version, &top.version);
        overlay_field(&mut self.processor, &top.processor);
        overlay_field(&mut self.architecture, &top.architecture);
        overlay_field(&mut self.physical_cores, &top.physical_cores);
        overlay_field(&mut self.logical_cores, &top.logical_cores);
        overlay_field(&mut self.max_frequency, &top.max_frequency);
        overlay_field(&mut self.current_frequency, &top.current_frequency);
        overlay_field(&mut self.hostname, &top.hostname);
        overlay_field(&mut self.ip_address, &top.ip_address);
        overlay_field(&mut self.status, &top.status);
    }
}

impl ResourceSnapshot {
    fn overlay(&mut self, top: &ResourceSnapshot) {
        overlay_field(&mut self.total_memory, &top.total_memory);
        overlay_field(&mut self.available_memory, &top.available_memory);
        overlay_field(&mut self.used_memory, &top.used_memory);
        overlay_field(&mut self.disk_total, &top.disk_total);
        overlay_field(&mut self.disk_used, &top.disk_used);
        overlay_field(&mut self.disk_free, &top.disk_free);
        overlay_field(&mut self.disk_usage, &top.disk_usage);
        overlay_field(&mut self.bytes_sent, &top.bytes_sent);
        overlay_field(&mut self.bytes_received, &top.bytes_received);
        overlay_field(&mut self.uptime, &top.uptime);
        overlay_field(&mut self.timestamp, &top.timestamp);
    }
}

impl DeviceAttributes {
    /// Applies `top` over `self`: any field with a value in `top` wins.
    ///
    /// Typed fields sent as explicit `null` carry no value and leave the
    /// inventory reading in place; unknown keys are copied as-is, nulls included.
    pub fn overlay(&mut self, top: &DeviceAttributes) {
        self.hardware.overlay(&top.hardware);
        self.resources.overlay(&top.resources);
        for (key, value) in &top.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// Inventory document (`GET /api/devices`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(flatten)]
    pub attributes: DeviceAttributes,
}

/// Usage document (`GET /api/usage`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "cpuUsageHistory", default, skip_serializing_if = "Option::is_none")]
    pub cpu_history: Option<Vec<UsageHistoryEntry>>,
    #[serde(rename = "memUsageHistory", default, skip_serializing_if = "Option::is_none")]
    pub mem_history: Option<Vec<UsageHistoryEntry>>,
    #[serde(rename = "diskUsageHistory", default, skip_serializing_if = "Option::is_none")]
    pub disk_history: Option<Vec<UsageHistoryEntry>>,
    #[serde(flatten)]
    pub attributes: DeviceAttributes,
}

/// One historical sample. Raw series only carry their own metric; aligned
/// entries carry all three.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageHistoryEntry {
    pub timestamp: String,
    #[serde(rename = "cpuUsage", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(rename = "memoryUsage", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    #[serde(rename = "diskUsage", default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub disk_usage: Option<f64>,
}

pub type InventorySet = Vec<InventoryRecord>;
pub type UsageSet = Vec<UsageRecord>;
pub type AlignedHistory = Vec<UsageHistoryEntry>;

/// Merged, display-ready device record. Built fresh every poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(flatten)]
    pub attributes: DeviceAttributes,
    /// Whether a usage record matched this device
    #[serde(skip)]
    pub has_usage: bool,
    #[serde(rename = "cpuUsageHistory")]
    pub cpu_history: Vec<UsageHistoryEntry>,
    #[serde(rename = "memUsageHistory")]
    pub mem_history: Vec<UsageHistoryEntry>,
    #[serde(rename = "diskUsageHistory")]
    pub disk_history: Vec<UsageHistoryEntry>,
    #[serde(rename = "alignedHistory")]
    pub aligned_history: AlignedHistory,
}

impl DeviceView {
    /// Inventory-only view, no usage matched
    pub fn from_inventory(record: &InventoryRecord) -> Self {
        Self {
            name: record.name.clone(),
            attributes: record.attributes.clone(),
            has_usage: false,
            cpu_history: Vec::new(),
            mem_history: Vec::new(),
            disk_history: Vec::new(),
            aligned_history: Vec::new(),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.attributes.hardware.status.unwrap_or_default()
    }

    /// Used memory as a percentage of total, when both are known
    pub fn memory_percent(&self) -> Option<f64> {
        let res = &self.attributes.resources;
        match (res.used_memory, res.total_memory) {
            (Some(used), Some(total)) if total > 0.0 => Some(used / total * 100.0),
            _ => None,
        }
    }

    pub fn disk_percent(&self) -> Option<f64> {
        let res = &self.attributes.resources;
        res.disk_usage.or_else(|| match (res.disk_used, res.disk_total) {
            (Some(used), Some(total)) if total > 0.0 => Some(used / total * 100.0),
            _ => None,
        })
    }
}
