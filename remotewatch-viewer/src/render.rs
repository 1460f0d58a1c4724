//! Plain-text rendering of a fleet snapshot for the terminal viewer

use std::fmt::Write;

use crate::config::DisplayConfig;
use crate::models::DeviceView;
use crate::poller::FleetSnapshot;
use crate::presentation::{NotificationLevel, PresentationState};
use crate::summary::{HistorySummary, MetricStats};

const GAUGE_WIDTH: usize = 20;

struct Theme {
    filled: char,
    empty: char,
}

impl Theme {
    fn for_state(state: &PresentationState) -> Self {
        if state.dark_mode() {
            Theme { filled: '█', empty: '░' }
        } else {
            Theme { filled: '#', empty: '-' }
        }
    }

    fn gauge(&self, percent: f64) -> String {
        let clamped = percent.clamp(0.0, 100.0);
        let filled = ((clamped / 100.0) * GAUGE_WIDTH as f64).round() as usize;
        let mut bar = String::with_capacity(GAUGE_WIDTH + 2);
        bar.push('[');
        bar.extend(std::iter::repeat(self.filled).take(filled));
        bar.extend(std::iter::repeat(self.empty).take(GAUGE_WIDTH - filled));
        bar.push(']');
        bar
    }
}

pub fn render(snapshot: &FleetSnapshot, state: &PresentationState, display: &DisplayConfig) -> String {
    let theme = Theme::for_state(state);
    let mut out = String::new();

    let fetched = snapshot
        .fetched_at
        .map(|t| t.format("%H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    let _ = writeln!(
        out,
        "RemoteWatch | {} devices | generation {} | fetched {}",
        snapshot.devices.len(),
        snapshot.generation,
        fetched
    );

    if let Some(note) = state.notification() {
        let tag = match note.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Failure => "!!",
        };
        let _ = writeln!(out, "[{}] {}", tag, note.message);
    }
    if let Some(error) = &snapshot.last_error {
        let _ = writeln!(out, "[!!] Last refresh failed: {}", error);
    }
    let _ = writeln!(out, "{}", "-".repeat(60));

    if snapshot.is_loading() {
        let _ = writeln!(out, "Loading devices...");
        return out;
    }
    if snapshot.generation == 0 {
        let _ = writeln!(out, "No data received yet");
        return out;
    }
    if snapshot.devices.is_empty() {
        let _ = writeln!(out, "No devices found");
        return out;
    }

    for device in snapshot.devices.iter() {
        render_device(&mut out, device, state, display, &theme);
    }
    out
}

fn render_device(
    out: &mut String,
    device: &DeviceView,
    state: &PresentationState,
    display: &DisplayConfig,
    theme: &Theme,
) {
    let hw = &device.attributes.hardware;
    let res = &device.attributes.resources;
    let marker = if state.selected() == Some(device.name.as_str()) { '>' } else { ' ' };

    let _ = writeln!(
        out,
        "{} {}  [{}]  {}  {}",
        marker,
        device.name,
        device.status(),
        hw.os.as_deref().unwrap_or("-"),
        hw.ip_address.as_deref().unwrap_or("-"),
    );

    if let Some(processor) = &hw.processor {
        let cores = match (hw.physical_cores, hw.logical_cores) {
            (Some(p), Some(l)) => format!(" ({}C/{}T)", p, l),
            _ => String::new(),
        };
        let freq = hw.max_frequency.map(|f| format!(" @ {:.2} GHz", f)).unwrap_or_default();
        let _ = writeln!(out, "    CPU  {}{}{}", processor, cores, freq);
    }

    if let Some(percent) = device.memory_percent() {
        let _ = writeln!(
            out,
            "    MEM  {} {:5.1}%  {:.2}/{:.2} GB",
            theme.gauge(percent),
            percent,
            res.used_memory.unwrap_or_default(),
            res.total_memory.unwrap_or_default()
        );
    }
    if let Some(percent) = device.disk_percent() {
        let _ = writeln!(
            out,
            "    DISK {} {:5.1}%  {:.2} GB free",
            theme.gauge(percent),
            percent,
            res.disk_free.unwrap_or_default()
        );
    }
    if res.bytes_sent.is_some() || res.uptime.is_some() {
        let sent = res.bytes_sent.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into());
        let recv = res.bytes_received.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".into());
        let _ = writeln!(
            out,
            "    NET  sent {} / recv {}   uptime {}",
            sent,
            recv,
            res.uptime.as_deref().unwrap_or("-")
        );
    }

    if !state.is_expanded(&device.name) {
        return;
    }

    if device.aligned_history.is_empty() {
        let _ = writeln!(out, "    (no usage history)");
        return;
    }

    let summary = HistorySummary::from_aligned(&device.aligned_history);
    let _ = writeln!(
        out,
        "    avg over {} samples: cpu {}  mem {}  disk {}",
        summary.samples,
        fmt_avg(summary.cpu),
        fmt_avg(summary.memory),
        fmt_avg(summary.disk)
    );
    let _ = writeln!(out, "    {:<10} {:>7} {:>7} {:>7}", "time", "cpu%", "mem%", "disk%");
    let skip = device.aligned_history.len().saturating_sub(display.history_rows);
    for entry in device.aligned_history.iter().skip(skip) {
        let _ = writeln!(
            out,
            "    {:<10} {:>7} {:>7} {:>7}",
            entry.timestamp,
            fmt_pct(entry.cpu_usage),
            fmt_pct(entry.memory_usage),
            fmt_pct(entry.disk_usage)
        );
    }
}

fn fmt_pct(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".into())
}

fn fmt_avg(stats: Option<MetricStats>) -> String {
    stats.map(|s| format!("{:.1}%", s.average)).unwrap_or_else(|| "-".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::{merge, MergeOptions};
    use crate::models::{InventorySet, UsageSet};
    use serde_json::json;
    use std::sync::Arc;

    fn sample_snapshot() -> FleetSnapshot {
        let inventory: InventorySet = serde_json::from_value(json!([
            {"Name": "alpha", "Status": "Online", "OS": "Linux 6.1", "Processor": "Ryzen 5",
             "Physical cores": 6, "Logical cores": 12, "Max Frequency": 4.2},
            {"Name": "beta"}
        ]))
        .unwrap();
        let usage: UsageSet = serde_json::from_value(json!([{
            "Name": "alpha",
            "Total Memory": 16.0, "Used Memory": 4.0, "Disk Usage": 50.0,
            "Uptime": "01:02:03",
            "cpuUsageHistory": [{"timestamp": "10:00:00", "cpuUsage": 12.0}, {"timestamp": "10:00:01", "cpuUsage": 14.0}],
            "memUsageHistory": [{"timestamp": "10:00:00", "memoryUsage": 25.0}, {"timestamp": "10:00:01", "memoryUsage": 25.0}],
            "diskUsageHistory": [{"timestamp": "10:00:00", "diskUsage": 1.0}, {"timestamp": "10:00:01", "diskUsage": 3.0}]
        }]))
        .unwrap();
        let devices = merge(&inventory, &usage, MergeOptions::default());
        FleetSnapshot { devices: Arc::from(devices), generation: 1, ..FleetSnapshot::empty() }
    }

    #[test]
    fn test_render_collapsed_and_expanded() {
        let snapshot = sample_snapshot();
        let mut state = PresentationState::default();
        state.select("alpha");

        let text = render(&snapshot, &state, &DisplayConfig::default());
        assert!(text.contains("> alpha  [Online]  Linux 6.1"));
        assert!(text.contains("Ryzen 5 (6C/12T) @ 4.20 GHz"));
        assert!(text.contains("[#####---------------]  25.0%"));
        assert!(text.contains("  beta  [Unknown]"));
        assert!(!text.contains("avg over"));

        state.toggle_expanded("alpha");
        state.toggle_expanded("beta");
        let text = render(&snapshot, &state, &DisplayConfig::default());
        assert!(text.contains("avg over 2 samples: cpu 13.0%  mem 25.0%  disk 2.0%"));
        assert!(text.contains("10:00:01"));
        assert!(text.contains("(no usage history)"));
    }

    #[test]
    fn test_history_rows_limit() {
        let snapshot = sample_snapshot();
        let mut state = PresentationState::default();
        state.toggle_expanded("alpha");
        let display = DisplayConfig { history_rows: 1, ..Default::default() };

        let text = render(&snapshot, &state, &display);
        assert!(!text.contains("10:00:00 "));
        assert!(text.contains("10:00:01 "));
    }

    #[test]
    fn test_loading_and_empty() {
        let state = PresentationState::default();
        let text = render(&FleetSnapshot::empty(), &state, &DisplayConfig::default());
        assert!(text.contains("Loading devices..."));

        let empty = FleetSnapshot { generation: 1, ..FleetSnapshot::empty() };
        let text = render(&empty, &state, &DisplayConfig::default());
        assert!(text.contains("No devices found"));

        let failed = FleetSnapshot { last_error: Some("usage endpoint returned HTTP 500".into()), ..FleetSnapshot::empty() };
        let text = render(&failed, &state, &DisplayConfig::default());
        assert!(!text.contains("Loading devices..."));
        assert!(text.contains("[!!] Last refresh failed: usage endpoint returned HTTP 500"));
        assert!(text.contains("No data received yet"));
    }

    #[test]
    fn test_dark_mode_gauge() {
        let mut state = PresentationState::default();
        state.toggle_dark_mode();
        let theme = Theme::for_state(&state);
        assert_eq!(theme.gauge(50.0), format!("[{}{}]", "█".repeat(10), "░".repeat(10)));
        assert_eq!(theme.gauge(150.0).chars().filter(|c| *c == '█').count(), GAUGE_WIDTH);
    }
}
