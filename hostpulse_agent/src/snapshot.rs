//! Snapshot types sent to clients and the builder that normalizes raw
//! provider readings into them. Keep this module minimal and stable; it
//! defines the wire format.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::provider::{RawCpu, RawMemory};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoreSample {
    pub core_id: u32,
    pub usage: f32,
    /// MHz
    pub frequency: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CpuSnapshot {
    pub overall: f32,
    pub temperature: Option<f32>,
    /// Integer mean of core frequencies in MHz, 0 when no cores are visible.
    pub average_frequency: u64,
    pub cores: Vec<CoreSample>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub cache: u64,
    pub buffers: u64,
    /// Always derived as used/total*100; never provider-reported.
    pub usage_percent: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub cpu: CpuSnapshot,
    pub memory: MemorySnapshot,
    /// Unix epoch milliseconds at build time.
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub retry: bool,
}

/// The tagged wire unit pushed to every subscriber.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Stats { timestamp: u64, data: SystemSnapshot },
    Error { timestamp: u64, data: ErrorInfo },
    Heartbeat { timestamp: u64, data: () },
}

impl Envelope {
    pub fn stats(snapshot: SystemSnapshot) -> Self {
        Envelope::Stats {
            timestamp: snapshot.timestamp,
            data: snapshot,
        }
    }

    pub fn heartbeat() -> Self {
        Envelope::Heartbeat {
            timestamp: now_millis(),
            data: (),
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// Raw usage readings can transiently leave [0,100] due to sampling jitter;
// NaN from a broken sensor collapses to 0.
fn clamp_percent(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Normalize a raw CPU reading: clamp usages, number cores in enumeration
/// order, compute the integer-mean frequency.
pub fn build_cpu(raw: RawCpu) -> CpuSnapshot {
    let cores: Vec<CoreSample> = raw
        .cores
        .iter()
        .enumerate()
        .map(|(i, core)| CoreSample {
            core_id: i as u32,
            usage: clamp_percent(core.usage),
            frequency: core.frequency,
        })
        .collect();

    let average_frequency = if cores.is_empty() {
        0
    } else {
        cores.iter().map(|c| c.frequency).sum::<u64>() / cores.len() as u64
    };

    CpuSnapshot {
        overall: clamp_percent(raw.overall),
        temperature: raw.temperature,
        average_frequency,
        cores,
    }
}

/// Normalize a raw memory reading. `used` is clamped to `total` and the
/// usage percentage is derived from the clamped values.
pub fn build_memory(raw: RawMemory) -> MemorySnapshot {
    let used = raw.used.min(raw.total);
    let usage_percent = if raw.total > 0 {
        clamp_percent((used as f64 / raw.total as f64 * 100.0) as f32)
    } else {
        0.0
    };

    MemorySnapshot {
        total: raw.total,
        used,
        available: raw.available,
        cache: raw.cache,
        buffers: raw.buffers,
        usage_percent,
    }
}

/// Normalize one pair of raw provider readings into an immutable snapshot.
/// Pure aside from reading the wall clock for the timestamp; never retries,
/// never touches the provider.
pub fn build_snapshot(raw_cpu: RawCpu, raw_memory: RawMemory) -> SystemSnapshot {
    SystemSnapshot {
        cpu: build_cpu(raw_cpu),
        memory: build_memory(raw_memory),
        timestamp: now_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RawCore;

    fn raw_memory(total: u64, used: u64) -> RawMemory {
        RawMemory {
            total,
            used,
            available: total.saturating_sub(used),
            cache: 0,
            buffers: 0,
        }
    }

    #[test]
    fn clamps_out_of_range_usages() {
        let raw = RawCpu {
            overall: 112.4,
            temperature: None,
            cores: vec![
                RawCore { usage: -3.0, frequency: 2400 },
                RawCore { usage: 104.2, frequency: 2400 },
                RawCore { usage: f32::NAN, frequency: 2400 },
            ],
        };
        let snap = build_snapshot(raw, raw_memory(16, 8));
        assert_eq!(snap.cpu.overall, 100.0);
        assert_eq!(snap.cpu.cores[0].usage, 0.0);
        assert_eq!(snap.cpu.cores[1].usage, 100.0);
        assert_eq!(snap.cpu.cores[2].usage, 0.0);
    }

    #[test]
    fn preserves_in_range_values_and_core_order() {
        let usages = [10.0, 90.0, 55.0, 30.0];
        let raw = RawCpu {
            overall: 46.25,
            temperature: Some(52.5),
            cores: usages
                .iter()
                .map(|&u| RawCore { usage: u, frequency: 3000 })
                .collect(),
        };
        let snap = build_snapshot(raw, raw_memory(16, 8));
        assert_eq!(snap.cpu.cores.len(), 4);
        for (i, core) in snap.cpu.cores.iter().enumerate() {
            assert_eq!(core.core_id, i as u32);
            assert_eq!(core.usage, usages[i]);
        }
        assert_eq!(snap.cpu.temperature, Some(52.5));
    }

    #[test]
    fn average_frequency_is_integer_mean() {
        let raw = RawCpu {
            overall: 0.0,
            temperature: None,
            cores: vec![
                RawCore { usage: 0.0, frequency: 2400 },
                RawCore { usage: 0.0, frequency: 2401 },
                RawCore { usage: 0.0, frequency: 2402 },
            ],
        };
        let snap = build_snapshot(raw, raw_memory(16, 8));
        // (2400 + 2401 + 2402) / 3 = 2401
        assert_eq!(snap.cpu.average_frequency, 2401);
    }

    #[test]
    fn average_frequency_zero_without_cores() {
        let raw = RawCpu {
            overall: 0.0,
            temperature: None,
            cores: Vec::new(),
        };
        let snap = build_snapshot(raw, raw_memory(16, 8));
        assert_eq!(snap.cpu.average_frequency, 0);
    }

    #[test]
    fn absent_temperature_stays_none() {
        let raw = RawCpu {
            overall: 10.0,
            temperature: None,
            cores: Vec::new(),
        };
        let snap = build_snapshot(raw, raw_memory(16, 8));
        assert_eq!(snap.cpu.temperature, None);
    }

    #[test]
    fn memory_percent_is_derived_from_used_over_total() {
        let snap = build_snapshot(
            RawCpu { overall: 0.0, temperature: None, cores: Vec::new() },
            raw_memory(16_000_000_000, 8_000_000_000),
        );
        assert_eq!(snap.memory.usage_percent, 50.0);
        assert_eq!(snap.memory.used, 8_000_000_000);
    }

    #[test]
    fn memory_used_clamped_to_total() {
        let snap = build_snapshot(
            RawCpu { overall: 0.0, temperature: None, cores: Vec::new() },
            raw_memory(1_000, 2_000),
        );
        assert_eq!(snap.memory.used, 1_000);
        assert_eq!(snap.memory.usage_percent, 100.0);
    }

    #[test]
    fn zero_total_memory_yields_zero_percent() {
        let snap = build_snapshot(
            RawCpu { overall: 0.0, temperature: None, cores: Vec::new() },
            raw_memory(0, 0),
        );
        assert_eq!(snap.memory.usage_percent, 0.0);
    }

    #[test]
    fn envelope_wire_tags() {
        let snap = build_snapshot(
            RawCpu { overall: 1.0, temperature: None, cores: Vec::new() },
            raw_memory(16, 8),
        );
        let json = serde_json::to_string(&Envelope::stats(snap)).unwrap();
        assert!(json.contains("\"type\":\"stats\""));
        assert!(json.contains("\"averageFrequency\""));
        assert!(json.contains("\"usagePercent\""));

        let json = serde_json::to_string(&Envelope::heartbeat()).unwrap();
        assert!(json.contains("\"type\":\"heartbeat\""));
        assert!(json.contains("\"data\":null"));
    }
}
