//! llama.cpp / BitNet adapter (spec §4.7): native library loaded from an
//! architecture-specific binary directory; streaming driven by a per-token
//! native callback. BitNet shares this adapter since it's llama.cpp's
//! ternary-weight fork with the same calling convention.

use super::{native_library_path, placeholder_embed, placeholder_generate, placeholder_stream, probe_native_library, EngineAdapter, EngineHandle};
use rt_core::{ChatMessage, ErrorKind, InferenceSettings, OffloadPlan, Recipe, RuntimeError, TokenChunk};

pub struct LlamaCppAdapter;

impl EngineAdapter for LlamaCppAdapter {
    fn load(&self, model_id: &str, bin_root: &str, microarch_dir: &str, recipe: &Recipe, plan: &OffloadPlan) -> Result<EngineHandle, RuntimeError> {
        let path = native_library_path(bin_root, recipe.engine, microarch_dir, recipe.accelerator);
        probe_native_library(&path, recipe.engine)?;
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
        // llama.cpp exposes embeddings only for models built with pooling
        // enabled; this adapter treats the capability as generally present
        // and lets the handler's reranking fallback (spec §4.10) use it.
        Some(Ok(placeholder_embed(texts)))
    }
}
