//! The metrics provider seam: the capability trait the core samples through,
//! plus the one sysinfo-backed adapter. Nothing outside this module touches
//! the host OS.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use sysinfo::{Components, CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::sync::Mutex;

use crate::error::{AgentError, AgentResult};

/// One logical CPU core as reported by the source, in enumeration order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCore {
    pub usage: f32,
    /// MHz
    pub frequency: u64,
}

/// Unnormalized CPU reading. Usage values may transiently leave [0,100].
#[derive(Debug, Clone, PartialEq)]
pub struct RawCpu {
    pub overall: f32,
    pub temperature: Option<f32>,
    pub cores: Vec<RawCore>,
}

/// Unnormalized memory reading, all byte counts.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMemory {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub cache: u64,
    pub buffers: u64,
}

/// Capability interface the sampler and point queries work against.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Idempotent. The sampler's readiness gate retries this until it
    /// succeeds; callers must not read before it has.
    async fn initialize(&self) -> AgentResult<()>;

    fn is_initialized(&self) -> bool;

    async fn read_cpu(&self) -> AgentResult<RawCpu>;

    async fn read_memory(&self) -> AgentResult<RawMemory>;
}

// HOSTPULSE_AGENT_TEMP=0 disables sensor scanning on hosts where it is slow
// or noisy.
fn temp_enabled() -> bool {
    static ON: OnceCell<bool> = OnceCell::new();
    *ON.get_or_init(|| {
        std::env::var("HOSTPULSE_AGENT_TEMP")
            .map(|v| v != "0")
            .unwrap_or(true)
    })
}

/// Adapter over `sysinfo`. Persistent handles behind async mutexes so CPU
/// usage deltas accumulate between refreshes.
pub struct SysinfoProvider {
    sys: Mutex<System>,
    components: Mutex<Components>,
    initialized: AtomicBool,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        Self {
            sys: Mutex::new(System::new_with_specifics(refresh_kind)),
            components: Mutex::new(Components::new()),
            initialized: AtomicBool::new(false),
        }
    }

    fn best_cpu_temp(components: &Components) -> Option<f32> {
        components.iter().find_map(|c| {
            let label = c.label().to_ascii_lowercase();
            if label.contains("cpu")
                || label.contains("package")
                || label.contains("tctl")
                || label.contains("tdie")
            {
                c.temperature()
            } else {
                None
            }
        })
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsProvider for SysinfoProvider {
    async fn initialize(&self) -> AgentResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        {
            // First refresh establishes the baseline for usage deltas.
            let mut sys = self.sys.lock().await;
            catch_unwind(AssertUnwindSafe(|| {
                sys.refresh_cpu_specifics(CpuRefreshKind::everything());
                sys.refresh_memory();
            }))
            .map_err(|_| AgentError::Provider("system refresh panicked".into()))?;
        }
        if temp_enabled() {
            let mut components = self.components.lock().await;
            let _ = catch_unwind(AssertUnwindSafe(|| components.refresh(true)));
        }
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn read_cpu(&self) -> AgentResult<RawCpu> {
        if !self.is_initialized() {
            return Err(AgentError::NotInitialized);
        }

        let (overall, cores) = {
            let mut sys = self.sys.lock().await;
            catch_unwind(AssertUnwindSafe(|| {
                sys.refresh_cpu_specifics(CpuRefreshKind::everything())
            }))
            .map_err(|_| AgentError::Provider("cpu refresh panicked".into()))?;

            let cores: Vec<RawCore> = sys
                .cpus()
                .iter()
                .map(|c| RawCore {
                    usage: c.cpu_usage(),
                    frequency: c.frequency(),
                })
                .collect();
            (sys.global_cpu_usage(), cores)
        };

        let temperature = if temp_enabled() {
            let mut components = self.components.lock().await;
            components.refresh(false);
            Self::best_cpu_temp(&components)
        } else {
            None
        };

        Ok(RawCpu {
            overall,
            temperature,
            cores,
        })
    }

    async fn read_memory(&self) -> AgentResult<RawMemory> {
        if !self.is_initialized() {
            return Err(AgentError::NotInitialized);
        }

        let mut sys = self.sys.lock().await;
        catch_unwind(AssertUnwindSafe(|| sys.refresh_memory()))
            .map_err(|_| AgentError::Provider("memory refresh panicked".into()))?;

        let total = sys.total_memory();
        let available = sys.available_memory();
        let used = total.saturating_sub(available);
        let (cache, buffers) = read_cache_and_buffers();

        Ok(RawMemory {
            total,
            used,
            available,
            cache,
            buffers,
        })
    }
}

// sysinfo does not expose page-cache or buffer sizes; read them from
// /proc/meminfo where available.
#[cfg(target_os = "linux")]
fn read_cache_and_buffers() -> (u64, u64) {
    fn parse_kb(rest: &str) -> u64 {
        rest.split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
    }

    let Ok(s) = std::fs::read_to_string("/proc/meminfo") else {
        return (0, 0);
    };
    let mut cache = 0u64;
    let mut buffers = 0u64;
    for line in s.lines() {
        if let Some(rest) = line.strip_prefix("Cached:") {
            cache = parse_kb(rest).saturating_mul(1024);
        } else if let Some(rest) = line.strip_prefix("Buffers:") {
            buffers = parse_kb(rest).saturating_mul(1024);
        }
    }
    (cache, buffers)
}

#[cfg(not(target_os = "linux"))]
fn read_cache_and_buffers() -> (u64, u64) {
    (0, 0)
}
