//! Recipe Resolver (C4, spec §4.4).

use crate::error::{ErrorKind, Result, RuntimeError};
use crate::hardware::{Cap, HardwareInventory};
use crate::model::{Accelerator, ArtifactDescriptor, ArtifactFormat, Engine, Recipe};
use std::collections::{HashMap, HashSet};

/// Legal `(format, engine)` pairs (spec §4.4 table). Closed: SafeTensors has
/// no entry because it is out-of-core for this runtime.
fn allowed_engine(format: ArtifactFormat) -> Option<Engine> {
    match format {
        ArtifactFormat::Gguf => Some(Engine::LlamaCpp),
        ArtifactFormat::BitNet => Some(Engine::BitNet),
        ArtifactFormat::Onnx => Some(Engine::OnnxRuntime),
        ArtifactFormat::MediaPipeTask | ArtifactFormat::LiteRt => Some(Engine::MediaPipe),
        ArtifactFormat::SafeTensors => None,
    }
}

/// Default `(context_size, batch_size)` keyed off format (spec §4.4).
fn default_params(format: ArtifactFormat) -> (usize, usize) {
    match format {
        ArtifactFormat::Gguf | ArtifactFormat::BitNet => (4096, 512),
        ArtifactFormat::Onnx => (2048, 1),
        ArtifactFormat::MediaPipeTask | ArtifactFormat::LiteRt => (1024, 1),
        ArtifactFormat::SafeTensors => (2048, 1),
    }
}

/// `resolve(descriptor, inventory, explicit_recipe?) -> Recipe`.
pub fn resolve(
    descriptor: &ArtifactDescriptor,
    inventory: &HardwareInventory,
    explicit_recipe: Option<Recipe>,
) -> Result<Recipe> {
    let engine = allowed_engine(descriptor.format).ok_or_else(|| {
        RuntimeError::new(
            ErrorKind::IncompatibleRecipe,
            format!("{:?} has no compatible engine for this runtime", descriptor.format),
        )
    })?;

    let available = crate::engine_probe::available(inventory);

    if let Some(explicit) = explicit_recipe {
        return validate_explicit(descriptor, engine, &available, explicit);
    }

    let accelerator = auto_select_accelerator(engine, inventory, &available);
    let (context_size, batch_size) = default_params(descriptor.format);

    Ok(Recipe {
        engine,
        accelerator,
        context_size,
        batch_size,
        threads: None,
        extra: HashMap::new(),
    })
}

/// Never silently downgrades: mismatches are `IncompatibleRecipe` (spec
/// §4.4).
fn validate_explicit(
    descriptor: &ArtifactDescriptor,
    engine: Engine,
    available: &HashSet<(Engine, Accelerator)>,
    explicit: Recipe,
) -> Result<Recipe> {
    if explicit.engine != engine {
        return Err(RuntimeError::new(
            ErrorKind::IncompatibleRecipe,
            format!(
                "{:?} requires engine {engine:?}, but recipe specified {:?}",
                descriptor.format, explicit.engine
            ),
        ));
    }
    if !available.contains(&(explicit.engine, explicit.accelerator)) {
        return Err(RuntimeError::new(
            ErrorKind::IncompatibleRecipe,
            format!(
                "accelerator {:?} is not available for engine {:?} on this machine",
                explicit.accelerator, explicit.engine
            ),
        ));
    }
    Ok(explicit)
}

/// Per-engine priority lists (spec §4.4), bounded by availability. Tie-break
/// is the enumeration order shown, which is stable.
fn auto_select_accelerator(
    engine: Engine,
    inventory: &HardwareInventory,
    available: &HashSet<(Engine, Accelerator)>,
) -> Accelerator {
    let priority: &[Accelerator] = match engine {
        Engine::LlamaCpp | Engine::BitNet => &[
            Accelerator::Cuda,
            Accelerator::Vulkan,
            Accelerator::RocM,
            Accelerator::Metal,
            Accelerator::Cpu,
        ],
        Engine::OnnxRuntime => {
            if inventory.has(Cap::Npu) && inventory.has(Cap::DirectMl) {
                &[
                    Accelerator::Hybrid,
                    Accelerator::Npu,
                    Accelerator::DirectMl,
                    Accelerator::Cuda,
                    Accelerator::Cpu,
                ]
            } else {
                &[Accelerator::Npu, Accelerator::DirectMl, Accelerator::Cuda, Accelerator::Cpu]
            }
        }
        Engine::MediaPipe => &[
            Accelerator::Npu,
            Accelerator::Cuda,
            Accelerator::Vulkan,
            Accelerator::Metal,
            Accelerator::DirectMl,
            Accelerator::Cpu,
        ],
    };

    priority
        .iter()
        .copied()
        .find(|accel| *accel == Accelerator::Cpu || available.contains(&(engine, *accel)))
        .unwrap_or(Accelerator::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{CpuInfo, HardwareInventory};
    use crate::model::{Architecture, Task};

    fn inventory_with(caps: &[Cap]) -> HardwareInventory {
        HardwareInventory {
            cpu: CpuInfo { vendor: "AMD".into(), microarch: "zen4".into(), cores: 8, threads: 16 },
            gpus: Vec::new(),
            npu: None,
            capabilities: caps.iter().copied().collect(),
        }
    }

    fn descriptor(format: ArtifactFormat) -> ArtifactDescriptor {
        ArtifactDescriptor {
            source: "test".into(),
            local_path: None,
            repo: None,
            format,
            architecture: Architecture::Generic,
            task: Task::TextGeneration,
            size_bytes: None,
            layer_count: None,
        }
    }

    #[test]
    fn auto_selects_cuda_for_llama_cpp_when_available() {
        let inv = inventory_with(&[Cap::Cuda]);
        let recipe = resolve(&descriptor(ArtifactFormat::Gguf), &inv, None).unwrap();
        assert_eq!(recipe.engine, Engine::LlamaCpp);
        assert_eq!(recipe.accelerator, Accelerator::Cuda);
    }

    #[test]
    fn falls_back_to_cpu_with_no_capabilities() {
        let inv = inventory_with(&[]);
        let recipe = resolve(&descriptor(ArtifactFormat::Gguf), &inv, None).unwrap();
        assert_eq!(recipe.accelerator, Accelerator::Cpu);
    }

    #[test]
    fn safetensors_is_out_of_core() {
        let inv = inventory_with(&[]);
        let err = resolve(&descriptor(ArtifactFormat::SafeTensors), &inv, None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncompatibleRecipe);
    }

    #[test]
    fn explicit_recipe_mismatched_engine_rejected() {
        let inv = inventory_with(&[Cap::Cuda]);
        let explicit = Recipe {
            engine: Engine::OnnxRuntime,
            accelerator: Accelerator::Cpu,
            context_size: 2048,
            batch_size: 1,
            threads: None,
            extra: HashMap::new(),
        };
        let err = resolve(&descriptor(ArtifactFormat::Gguf), &inv, Some(explicit)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncompatibleRecipe);
    }

    #[test]
    fn explicit_recipe_unavailable_accelerator_rejected() {
        let inv = inventory_with(&[]);
        let explicit = Recipe {
            engine: Engine::LlamaCpp,
            accelerator: Accelerator::Cuda,
            context_size: 4096,
            batch_size: 512,
            threads: None,
            extra: HashMap::new(),
        };
        let err = resolve(&descriptor(ArtifactFormat::Gguf), &inv, Some(explicit)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncompatibleRecipe);
    }

    #[test]
    fn hybrid_requires_both_npu_and_directml() {
        let inv = inventory_with(&[Cap::Npu]);
        let recipe = resolve(&descriptor(ArtifactFormat::Onnx), &inv, None).unwrap();
        assert_eq!(recipe.accelerator, Accelerator::Npu);

        let inv_hybrid = inventory_with(&[Cap::Npu, Cap::DirectMl]);
        let recipe = resolve(&descriptor(ArtifactFormat::Onnx), &inv_hybrid, None).unwrap();
        assert_eq!(recipe.accelerator, Accelerator::Hybrid);
    }
}
