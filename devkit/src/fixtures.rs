/*!
Builders de fixtures au format du producteur

Génère des enregistrements JSON identiques à ceux publiés par les agents:
clés avec espaces (`"IP Address"`, `"Disk Usage"`...), historiques horodatés
en `HH:MM:SS`, moyennes arrondies.
*/

use chrono::{Duration as ChronoDuration, NaiveTime};
use serde_json::{json, Map, Value};

/// Un appareil de la flotte avec sa partie inventaire et sa partie usage
#[derive(Debug, Clone)]
pub struct DeviceFixture {
    name: String,
    status: Option<String>,
    os: String,
    ip: String,
    total_memory: f64,
    used_memory: f64,
    disk_usage: f64,
    live_memory: Option<f64>,
    history: Option<HistoryFixture>,
    disk_as_text: bool,
}

#[derive(Debug, Clone)]
struct HistoryFixture {
    start: NaiveTime,
    cpu: Vec<f64>,
    memory: Vec<f64>,
    disk: Vec<f64>,
}

impl DeviceFixture {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            status: Some("Online".to_string()),
            os: "Linux 6.1.0".to_string(),
            ip: "192.168.1.10".to_string(),
            total_memory: 16.0,
            used_memory: 8.0,
            disk_usage: 42.5,
            live_memory: None,
            history: None,
            disk_as_text: false,
        }
    }

    /// `None` retire la clé `Status` de l'inventaire
    pub fn status(mut self, status: Option<&str>) -> Self {
        self.status = status.map(str::to_string);
        self
    }

    pub fn ip<S: Into<String>>(mut self, ip: S) -> Self {
        self.ip = ip.into();
        self
    }

    /// Mémoire (GB) déclarée dans l'inventaire
    pub fn memory(mut self, total: f64, used: f64) -> Self {
        self.total_memory = total;
        self.used_memory = used;
        self
    }

    pub fn disk_usage(mut self, percent: f64) -> Self {
        self.disk_usage = percent;
        self
    }

    /// Mémoire utilisée rapportée par l'usage, qui écrase celle de l'inventaire
    pub fn live_memory(mut self, used: f64) -> Self {
        self.live_memory = Some(used);
        self
    }

    /// Pourcentages disque en chaînes, comme les agents Windows (WMI `PercentDiskTime`)
    pub fn disk_as_text(mut self) -> Self {
        self.disk_as_text = true;
        self
    }

    /// Historiques CPU / mémoire / disque, un échantillon par seconde à partir de 10:00:00
    pub fn history(mut self, cpu: &[f64], memory: &[f64], disk: &[f64]) -> Self {
        self.history = Some(HistoryFixture {
            start: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default(),
            cpu: cpu.to_vec(),
            memory: memory.to_vec(),
            disk: disk.to_vec(),
        });
        self
    }

    /// Enregistrement `/api/devices`
    pub fn inventory_json(&self) -> Value {
        let mut record = json!({
            "Name": self.name,
            "OS": self.os,
            "Version": "#1 SMP PREEMPT_DYNAMIC",
            "Processor": "AMD Ryzen 7 5800X 8-Core Processor",
            "Architecture": "64bit",
            "Hostname": self.name.to_lowercase(),
            "IP Address": self.ip,
            "Physical cores": 8,
            "Logical cores": 16,
            "Max Frequency": 3.8,
            "Total Memory": self.total_memory,
            "Available Memory": round2(self.total_memory - self.used_memory),
            "Used Memory": self.used_memory,
            "Disk Total Space": 465.63,
            "Disk Used Space": round2(465.63 * self.disk_usage / 100.0),
            "Disk Free Space": round2(465.63 * (100.0 - self.disk_usage) / 100.0),
            "Disk Usage": self.disk_value(self.disk_usage),
            "Total Bytes Sent": 123_456_789u64,
            "Total Bytes Received": 987_654_321u64,
            "Uptime": "12:34:56",
            "Timestamp": "09:59:59"
        });
        if let (Some(status), Some(obj)) = (&self.status, record.as_object_mut()) {
            obj.insert("Status".to_string(), Value::String(status.clone()));
        }
        record
    }

    /// Enregistrement `/api/usage`, absent si l'appareil n'a ni historique ni mesure live
    pub fn usage_json(&self) -> Option<Value> {
        if self.history.is_none() && self.live_memory.is_none() {
            return None;
        }

        let mut record = Map::new();
        record.insert("Name".to_string(), Value::String(self.name.clone()));
        if let Some(used) = self.live_memory {
            record.insert("Used Memory".to_string(), json!(used));
        }
        if let Some(history) = &self.history {
            record.insert("avgCPUUsage".to_string(), json!(average(&history.cpu)));
            record.insert("cpuUsageHistory".to_string(), series(history.start, "cpuUsage", &numbers(&history.cpu)));
            record.insert("avgMemUsage".to_string(), json!(average(&history.memory)));
            record.insert("memUsageHistory".to_string(), series(history.start, "memoryUsage", &numbers(&history.memory)));
            let disk: Vec<Value> = history.disk.iter().map(|v| self.disk_value(*v)).collect();
            record.insert("diskUsageHistory".to_string(), series(history.start, "diskUsage", &disk));
            record.insert("timestamp".to_string(), Value::String(stamp(history.start, history.cpu.len())));
        }
        Some(Value::Object(record))
    }

    fn disk_value(&self, percent: f64) -> Value {
        if self.disk_as_text {
            Value::String(percent.to_string())
        } else {
            json!(percent)
        }
    }
}

/// Flotte complète: les deux collections servies par le backend
#[derive(Debug, Clone, Default)]
pub struct FleetFixture {
    devices: Vec<DeviceFixture>,
    usage_only: Vec<String>,
}

impl FleetFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(mut self, device: DeviceFixture) -> Self {
        self.devices.push(device);
        self
    }

    /// Usage publié pour un appareil absent de l'inventaire
    pub fn usage_only<S: Into<String>>(mut self, name: S) -> Self {
        self.usage_only.push(name.into());
        self
    }

    pub fn inventory(&self) -> Value {
        Value::Array(self.devices.iter().map(DeviceFixture::inventory_json).collect())
    }

    pub fn usage(&self) -> Value {
        let mut records: Vec<Value> = self.devices.iter().filter_map(DeviceFixture::usage_json).collect();
        records.extend(self.usage_only.iter().map(|name| {
            DeviceFixture::new(name.as_str())
                .history(&[5.0], &[10.0], &[20.0])
                .usage_json()
                .unwrap_or_else(|| json!({ "Name": name }))
        }));
        Value::Array(records)
    }
}

fn numbers(values: &[f64]) -> Vec<Value> {
    values.iter().map(|v| json!(v)).collect()
}

fn series(start: NaiveTime, key: &str, values: &[Value]) -> Value {
    Value::Array(
        values
            .iter()
            .enumerate()
            .map(|(i, v)| json!({ "timestamp": stamp(start, i), key: v }))
            .collect(),
    )
}

fn stamp(start: NaiveTime, offset_secs: usize) -> String {
    (start + ChronoDuration::seconds(offset_secs as i64))
        .format("%H:%M:%S")
        .to_string()
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    (avg * 1000.0).round() / 1000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
