//! History alignment
//!
//! Zips the three per-metric series of a device into one timeline, index by
//! index. Producers sample CPU, memory and disk on the same cadence, but
//! nothing guarantees equal lengths, so the length policy is explicit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AlignmentGap;
use crate::models::{AlignedHistory, DeviceView, UsageHistoryEntry};

/// What to do when the three series have different lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignPolicy {
    /// Bound the output by the shortest series
    #[default]
    Truncate,
    /// Produce nothing
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignOptions {
    pub policy: AlignPolicy,
    /// Require identical timestamps at every index
    pub check_timestamps: bool,
}

/// Aligned history for a device; empty whenever alignment is not possible.
pub fn align(view: &DeviceView, options: AlignOptions) -> AlignedHistory {
    match align_series(&view.cpu_history, &view.mem_history, &view.disk_history, options) {
        Ok(aligned) => aligned,
        Err(gap) => {
            debug!("No aligned history for {}: {}", view.name, gap);
            Vec::new()
        }
    }
}

/// Aligns three raw series, reporting why when it cannot.
pub fn align_series(
    cpu: &[UsageHistoryEntry],
    memory: &[UsageHistoryEntry],
    disk: &[UsageHistoryEntry],
    options: AlignOptions,
) -> Result<AlignedHistory, AlignmentGap> {
    if cpu.is_empty() {
        return Err(AlignmentGap::MissingSeries("cpu"));
    }
    if memory.is_empty() {
        return Err(AlignmentGap::MissingSeries("memory"));
    }
    if disk.is_empty() {
        return Err(AlignmentGap::MissingSeries("disk"));
    }

    let same_length = cpu.len() == memory.len() && memory.len() == disk.len();
    if !same_length && options.policy == AlignPolicy::Reject {
        return Err(AlignmentGap::LengthMismatch {
            cpu: cpu.len(),
            memory: memory.len(),
            disk: disk.len(),
        });
    }

    let aligned: AlignedHistory = cpu
        .iter()
        .zip(memory)
        .zip(disk)
        .map(|((c, m), d)| UsageHistoryEntry {
            timestamp: c.timestamp.clone(),
            cpu_usage: c.cpu_usage,
            memory_usage: m.memory_usage,
            disk_usage: d.disk_usage,
        })
        .collect();

    if options.check_timestamps {
        let drift = cpu
            .iter()
            .zip(memory)
            .zip(disk)
            .position(|((c, m), d)| c.timestamp != m.timestamp || c.timestamp != d.timestamp);
        if let Some(index) = drift {
            return Err(AlignmentGap::TimestampDrift { index });
        }
    }

    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(ts: &str, v: f64) -> UsageHistoryEntry {
        UsageHistoryEntry { timestamp: ts.into(), cpu_usage: Some(v), memory_usage: None, disk_usage: None }
    }

    fn mem(ts: &str, v: f64) -> UsageHistoryEntry {
        UsageHistoryEntry { timestamp: ts.into(), cpu_usage: None, memory_usage: Some(v), disk_usage: None }
    }

    fn disk(ts: &str, v: f64) -> UsageHistoryEntry {
        UsageHistoryEntry { timestamp: ts.into(), cpu_usage: None, memory_usage: None, disk_usage: Some(v) }
    }

    #[test]
    fn test_single_sample() {
        let aligned = align_series(
            &[cpu("t1", 10.0)],
            &[mem("t1", 20.0)],
            &[disk("t1", 30.0)],
            AlignOptions::default(),
        )
        .unwrap();

        assert_eq!(
            aligned,
            vec![UsageHistoryEntry {
                timestamp: "t1".into(),
                cpu_usage: Some(10.0),
                memory_usage: Some(20.0),
                disk_usage: Some(30.0),
            }]
        );
    }

    #[test]
    fn test_equal_lengths_keep_cpu_timestamps() {
        let c = vec![cpu("10:00:01", 1.0), cpu("10:00:02", 2.0), cpu("10:00:03", 3.0)];
        let m = vec![mem("10:00:01", 4.0), mem("10:00:02", 5.0), mem("10:00:04", 6.0)];
        let d = vec![disk("a", 7.0), disk("b", 8.0), disk("c", 9.0)];

        let aligned = align_series(&c, &m, &d, AlignOptions::default()).unwrap();
        assert_eq!(aligned.len(), 3);
        for (i, entry) in aligned.iter().enumerate() {
            assert_eq!(entry.timestamp, c[i].timestamp);
        }
        assert_eq!(aligned[2].memory_usage, Some(6.0));
        assert_eq!(aligned[2].disk_usage, Some(9.0));
    }

    #[test]
    fn test_missing_series_gives_gap() {
        let c = vec![cpu("t", 1.0)];
        let m = vec![mem("t", 1.0)];
        assert_eq!(
            align_series(&c, &m, &[], AlignOptions::default()),
            Err(AlignmentGap::MissingSeries("disk"))
        );
        assert_eq!(
            align_series(&[], &m, &[], AlignOptions::default()),
            Err(AlignmentGap::MissingSeries("cpu"))
        );
    }

    #[test]
    fn test_unequal_lengths_truncate() {
        let c = vec![cpu("1", 1.0), cpu("2", 2.0), cpu("3", 3.0)];
        let m = vec![mem("1", 1.0), mem("2", 2.0)];
        let d = vec![disk("1", 1.0), disk("2", 2.0), disk("3", 3.0)];

        let aligned = align_series(&c, &m, &d, AlignOptions::default()).unwrap();
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned[1].timestamp, "2");
    }

    #[test]
    fn test_unequal_lengths_reject() {
        let c = vec![cpu("1", 1.0), cpu("2", 2.0)];
        let m = vec![mem("1", 1.0)];
        let d = vec![disk("1", 1.0), disk("2", 2.0)];
        let options = AlignOptions { policy: AlignPolicy::Reject, check_timestamps: false };

        assert_eq!(
            align_series(&c, &m, &d, options),
            Err(AlignmentGap::LengthMismatch { cpu: 2, memory: 1, disk: 2 })
        );
    }

    #[test]
    fn test_timestamp_check() {
        let c = vec![cpu("1", 1.0), cpu("2", 2.0)];
        let m = vec![mem("1", 1.0), mem("2", 2.0)];
        let d = vec![disk("1", 1.0), disk("3", 2.0)];
        let strict = AlignOptions { policy: AlignPolicy::Truncate, check_timestamps: true };

        assert_eq!(align_series(&c, &m, &d, strict), Err(AlignmentGap::TimestampDrift { index: 1 }));
        assert_eq!(align_series(&c, &m, &d, AlignOptions::default()).unwrap().len(), 2);
    }

    #[test]
    fn test_align_view_is_idempotent() {
        let record = serde_json::from_value(serde_json::json!({"Name": "A"})).unwrap();
        let mut view = DeviceView::from_inventory(&record);
        assert!(align(&view, AlignOptions::default()).is_empty());

        view.cpu_history = vec![cpu("1", 1.0), cpu("2", 2.0)];
        view.mem_history = vec![mem("1", 3.0), mem("2", 4.0)];
        view.disk_history = vec![disk("1", 5.0), disk("2", 6.0)];

        let first = align(&view, AlignOptions::default());
        let second = align(&view, AlignOptions::default());
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }
}
