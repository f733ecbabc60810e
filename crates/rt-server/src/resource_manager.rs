//! Resource Manager (C6, spec §4.6): admission control over RAM/VRAM so
//! multiple loaded models never collectively overcommit the machine.
//!
//! Grounded on the teacher's `GpuInfo`/batch-size admission math in
//! `utils.rs` (same idea of comparing a requested reservation against free
//! memory before committing), generalized from a single-model VRAM estimate
//! to a per-model ledger covering both RAM and VRAM, backed by
//! [`rt_core::hardware::memory_status`] instead of a hand-rolled `nvml` call.

use rt_core::hardware::memory_status;
use rt_core::{Engine, ErrorKind, OffloadPlan, ResourceReservation, RuntimeError};
use std::collections::HashMap;
use std::sync::Mutex;

/// All admitted reservations, guarded by a single mutex so `reserve` is
/// atomic with respect to the free-memory check (spec invariant I1: never
/// admit two models whose combined footprint exceeds what was free at
/// decision time).
pub struct ResourceManager {
    reservations: Mutex<HashMap<String, ResourceReservation>>,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager {
    pub fn new() -> Self {
        Self { reservations: Mutex::new(HashMap::new()) }
    }

    /// Current committed totals across every live reservation.
    fn committed(&self) -> (u64, u64) {
        let guard = self.reservations.lock().unwrap();
        guard.values().fold((0, 0), |(vram, ram), r| (vram + r.vram_bytes, ram + r.ram_bytes))
    }

    /// Checks `plan` against free memory *minus what's already committed*,
    /// then admits it atomically. Returns `OverBudget` if it doesn't fit,
    /// without touching the ledger (spec §4.6: reservation is all-or-nothing).
    pub fn reserve(&self, model_id: &str, plan: &OffloadPlan, engine: Engine) -> Result<(), RuntimeError> {
        let status = memory_status();
        let mut guard = self.reservations.lock().unwrap();
        let (committed_vram, committed_ram) = guard.values().fold((0u64, 0u64), |(v, r), res| {
            (v + res.vram_bytes, r + res.ram_bytes)
        });

        let free_vram = status.free_vram_bytes.saturating_sub(committed_vram);
        let free_ram = status.free_ram_bytes.saturating_sub(committed_ram);

        if plan.vram_bytes > free_vram || plan.ram_bytes > free_ram {
            return Err(RuntimeError::new(
                ErrorKind::OverBudget,
                format!(
                    "plan needs {} VRAM / {} RAM but only {} VRAM / {} RAM remain uncommitted",
                    plan.vram_bytes, plan.ram_bytes, free_vram, free_ram
                ),
            ));
        }

        guard.insert(
            model_id.to_string(),
            ResourceReservation {
                model_id: model_id.to_string(),
                vram_bytes: plan.vram_bytes,
                ram_bytes: plan.ram_bytes,
                engine,
                timestamp: now_unix(),
            },
        );
        drop(guard);
        crate::metrics::MODELS_LOADED.set(self.count() as i64);
        crate::metrics::VRAM_RESERVED_BYTES.set(self.committed().0 as f64);
        crate::metrics::RAM_RESERVED_BYTES.set(self.committed().1 as f64);
        Ok(())
    }

    /// Idempotent: releasing a model that was never (or no longer) reserved
    /// is not an error (spec §4.6 `release` contract).
    pub fn release(&self, model_id: &str) {
        let mut guard = self.reservations.lock().unwrap();
        guard.remove(model_id);
        drop(guard);
        crate::metrics::MODELS_LOADED.set(self.count() as i64);
        crate::metrics::VRAM_RESERVED_BYTES.set(self.committed().0 as f64);
        crate::metrics::RAM_RESERVED_BYTES.set(self.committed().1 as f64);
    }

    pub fn count(&self) -> usize {
        self.reservations.lock().unwrap().len()
    }

    /// Snapshot for the `/resources` endpoint: live machine totals plus the
    /// per-model ledger.
    pub fn status(&self) -> crate::protocol::ResourceStatus {
        let mem = memory_status();
        let per_model = self.reservations.lock().unwrap().clone();
        crate::protocol::ResourceStatus {
            total_ram_bytes: mem.total_ram_bytes,
            free_ram_bytes: mem.free_ram_bytes,
            total_vram_bytes: mem.total_vram_bytes,
            free_vram_bytes: mem.free_vram_bytes,
            per_model,
        }
    }
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_core::SpeedTier;

    fn plan(vram: u64, ram: u64) -> OffloadPlan {
        OffloadPlan { vram_layers: 0, ram_layers: 0, vram_bytes: vram, ram_bytes: ram, speed_tier: SpeedTier::Fast, label: "test".into() }
    }

    #[test]
    fn release_is_idempotent() {
        let manager = ResourceManager::new();
        manager.release("not-there");
        manager.release("not-there");
    }

    #[test]
    fn reserve_then_release_clears_ledger() {
        let manager = ResourceManager::new();
        // On a machine with zero reported free memory this will legitimately
        // reject; the invariant under test is idempotent bookkeeping, not
        // admission math (that's covered by rt_core::offload's own tests).
        let _ = manager.reserve("model-1", &plan(0, 0), Engine::LlamaCpp);
        manager.release("model-1");
        assert_eq!(manager.count(), 0);
    }
}
