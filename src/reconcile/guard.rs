//! Run guards: a run stops cleanly between chunks instead of being killed
//! mid-write when it runs long or the process grows too large.

use std::fmt;
use std::time::{Duration, Instant};

use crate::model::ImportMode;
use crate::util::env::env_parse;

const INTERACTIVE_RESERVE_SECS: u64 = 30;
const BULK_RESERVE_SECS: u64 = 120;

/// Why a run was cut short. Not an error: whatever was persisted before the
/// stop stays persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStop {
    Memory { used_mb: u64, limit_mb: u64 },
    TimeBudget { elapsed_secs: u64, budget_secs: u64 },
}

impl fmt::Display for GuardStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardStop::Memory { used_mb, limit_mb } => {
                write!(f, "memory pressure ({used_mb} MB of {limit_mb} MB limit)")
            }
            GuardStop::TimeBudget {
                elapsed_secs,
                budget_secs,
            } => {
                write!(f, "time budget ({elapsed_secs}s elapsed of {budget_secs}s)")
            }
        }
    }
}

/// Checked before every chunk. The time check keeps a reserve so the final
/// chunk still has room to finish its writes inside the budget.
pub struct ResourceGuard {
    started: Instant,
    budget: Duration,
    reserve: Duration,
    memory_limit_mb: u64,
}

impl ResourceGuard {
    pub fn for_mode(mode: ImportMode) -> Self {
        let (budget_secs, reserve_secs) = match mode {
            ImportMode::Interactive => (env_parse("IMPORT_BUDGET_SECS", 300), INTERACTIVE_RESERVE_SECS),
            ImportMode::Bulk => (env_parse("IMPORT_BULK_BUDGET_SECS", 3600), BULK_RESERVE_SECS),
        };
        Self::with_limits(
            Duration::from_secs(budget_secs),
            Duration::from_secs(reserve_secs),
            env_parse("IMPORT_MEMORY_LIMIT_MB", 512),
        )
    }

    pub fn with_limits(budget: Duration, reserve: Duration, memory_limit_mb: u64) -> Self {
        Self {
            started: Instant::now(),
            budget,
            reserve,
            memory_limit_mb,
        }
    }

    pub fn check(&self) -> Option<GuardStop> {
        let elapsed = self.started.elapsed();
        if elapsed + self.reserve >= self.budget {
            return Some(GuardStop::TimeBudget {
                elapsed_secs: elapsed.as_secs(),
                budget_secs: self.budget.as_secs(),
            });
        }
        if let Some(used_mb) = resident_memory_mb() {
            if let Some(stop) = memory_stop(used_mb, self.memory_limit_mb) {
                return Some(stop);
            }
        }
        None
    }
}

/// Trips at 90% of the limit so the stop lands before the allocator does.
fn memory_stop(used_mb: u64, limit_mb: u64) -> Option<GuardStop> {
    if used_mb.saturating_mul(10) >= limit_mb.saturating_mul(9) {
        Some(GuardStop::Memory { used_mb, limit_mb })
    } else {
        None
    }
}

// VmRSS is reported in KiB whatever the kernel's page size is
#[cfg(target_os = "linux")]
fn resident_memory_mb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib / 1024)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_mb() -> Option<u64> {
    None
}
