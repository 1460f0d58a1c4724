//! Per-device history statistics

use crate::models::{AlignedHistory, UsageHistoryEntry};

/// Average and peak of one metric over the aligned window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    pub average: f64,
    pub peak: f64,
    pub latest: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistorySummary {
    pub samples: usize,
    pub cpu: Option<MetricStats>,
    pub memory: Option<MetricStats>,
    pub disk: Option<MetricStats>,
}

impl HistorySummary {
    pub fn from_aligned(history: &AlignedHistory) -> Self {
        Self {
            samples: history.len(),
            cpu: stats(history, |e| e.cpu_usage),
            memory: stats(history, |e| e.memory_usage),
            disk: stats(history, |e| e.disk_usage),
        }
    }
}

/// Averages are rounded to 3 decimals, like the producer's own averages
fn stats<F>(history: &[UsageHistoryEntry], metric: F) -> Option<MetricStats>
where
    F: Fn(&UsageHistoryEntry) -> Option<f64>,
{
    let values: Vec<f64> = history.iter().filter_map(&metric).collect();
    let latest = *values.last()?;
    let average = values.iter().sum::<f64>() / values.len() as f64;
    let peak = values.iter().copied().fold(f64::MIN, f64::max);

    Some(MetricStats {
        average: (average * 1000.0).round() / 1000.0,
        peak,
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: &str, cpu: f64, mem: Option<f64>) -> UsageHistoryEntry {
        UsageHistoryEntry { timestamp: ts.into(), cpu_usage: Some(cpu), memory_usage: mem, disk_usage: None }
    }

    #[test]
    fn test_summary() {
        let history = vec![entry("1", 10.0, Some(1.0)), entry("2", 20.0, None), entry("3", 3.3333, Some(2.0))];
        let summary = HistorySummary::from_aligned(&history);

        assert_eq!(summary.samples, 3);
        let cpu = summary.cpu.unwrap();
        assert_eq!(cpu.average, 11.111);
        assert_eq!(cpu.peak, 20.0);
        assert_eq!(cpu.latest, 3.3333);

        let memory = summary.memory.unwrap();
        assert_eq!(memory.average, 1.5);
        assert_eq!(memory.latest, 2.0);
        assert!(summary.disk.is_none());
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(HistorySummary::from_aligned(&Vec::new()), HistorySummary::default());
    }
}
