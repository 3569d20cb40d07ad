//! Types that mirror the agent's JSON schema.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CoreSample {
    pub core_id: u32,
    pub usage: f32,
    /// MHz
    pub frequency: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CpuSnapshot {
    pub overall: f32,
    pub temperature: Option<f32>,
    pub average_frequency: u64,
    pub cores: Vec<CoreSample>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MemorySnapshot {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub cache: u64,
    pub buffers: u64,
    pub usage_percent: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub cpu: CpuSnapshot,
    pub memory: MemorySnapshot,
    pub timestamp: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub retry: bool,
}

/// The tagged wire unit the agent pushes over the stream.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    Stats { timestamp: u64, data: SystemSnapshot },
    Error { timestamp: u64, data: ErrorInfo },
    Heartbeat { timestamp: u64 },
}
