//! Engine Adapters (C7, spec §4.7): the only layer that would, in a real
//! build, dlopen a native library. No tensor math lives in this crate —
//! each adapter is a thin FFI-shaped boundary, grounded on the teacher's
//! `moshi-core` convention of keeping every native call behind a narrow
//! `Device`/session handle the rest of the server never inspects directly.
//!
//! None of these actually link llama.cpp / ONNX Runtime / MediaPipe (this
//! workspace carries no FFI crate for them); `load` locates the
//! architecture-specific binary on the native library search path (spec §6)
//! and, once found, hands back a handle whose `generate`/`embed` produce
//! deterministic placeholder output. This keeps the handler, pipelines and
//! transports fully exercised against the real state machine and streaming
//! plumbing without depending on a vendored native runtime.

mod llama_cpp;
mod mediapipe;
mod onnx;

use rt_core::{
    Accelerator, Attachment, ChatMessage, Engine, ErrorKind, InferenceSettings, OffloadPlan, Recipe, RuntimeError, TokenChunk,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Opaque handle to a loaded model. The generation lock lives here, not on
/// the tracker (spec §5: "the generation lock is a `LoadedModel` field").
pub struct EngineHandle {
    pub model_id: String,
    pub engine: Engine,
    pub accelerator: Accelerator,
    pub library_path: PathBuf,
    pub plan: OffloadPlan,
    generation_lock: tokio::sync::Mutex<()>,
    halt_flag: Arc<AtomicBool>,
    token_progress: Arc<AtomicUsize>,
}

impl EngineHandle {
    pub(crate) fn new(model_id: String, engine: Engine, accelerator: Accelerator, library_path: PathBuf, plan: OffloadPlan) -> Self {
        Self {
            model_id,
            engine,
            accelerator,
            library_path,
            plan,
            generation_lock: tokio::sync::Mutex::new(()),
            halt_flag: Arc::new(AtomicBool::new(false)),
            token_progress: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn halt_flag(&self) -> Arc<AtomicBool> {
        self.halt_flag.clone()
    }

    /// Cumulative tokens produced by the generation currently (or most
    /// recently) in flight, updated as each chunk is produced so
    /// `halt_generation` can report how far a halted stream got (spec §4.10
    /// `HaltResponse.tokens_generated`) without waiting for it to finish.
    pub fn token_progress(&self) -> Arc<AtomicUsize> {
        self.token_progress.clone()
    }

    /// Concurrent `generate` calls against the same model are serialized
    /// (spec §5); different models may proceed in parallel since each holds
    /// its own handle.
    pub fn generation_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.generation_lock
    }
}

pub trait EngineAdapter: Send + Sync {
    fn load(
        &self,
        model_id: &str,
        bin_root: &str,
        microarch_dir: &str,
        recipe: &Recipe,
        plan: &OffloadPlan,
    ) -> Result<EngineHandle, RuntimeError>;

    fn unload(&self, _handle: &EngineHandle) {}

    fn generate(&self, handle: &EngineHandle, messages: &[ChatMessage], settings: &InferenceSettings) -> Result<String, RuntimeError>;

    /// Token-at-a-time generation, observing `handle`'s halt flag between
    /// tokens (spec §5: "the next callback returning causes the adapter to
    /// stop"). Each chunk is pushed through `on_chunk` as it is produced
    /// rather than collected into a `Vec` and handed back at the end, so a
    /// caller streaming this to a transport can forward tokens as they
    /// arrive and `halt_generation` can race a real generation in progress.
    fn generate_stream(
        &self,
        handle: &EngineHandle,
        messages: &[ChatMessage],
        settings: &InferenceSettings,
        on_chunk: &mut dyn FnMut(TokenChunk),
    ) -> Result<(), RuntimeError>;

    /// `None` means the engine has no embedding capability at all; pipelines
    /// distinguish that from `NotSupportedByEngine` raised for other reasons.
    fn embed(&self, _handle: &EngineHandle, _texts: &[String]) -> Option<Result<Vec<Vec<f32>>, RuntimeError>> {
        None
    }
}

pub fn for_engine(engine: Engine) -> Box<dyn EngineAdapter> {
    match engine {
        Engine::LlamaCpp | Engine::BitNet => Box::new(llama_cpp::LlamaCppAdapter),
        Engine::OnnxRuntime => Box::new(onnx::OnnxAdapter),
        Engine::MediaPipe => Box::new(mediapipe::MediaPipeAdapter),
    }
}

/// `<bin_root>/<engine>/<os>/<cpu-microarch>/` (spec §6 native library search
/// path), with the accelerator folded into the leaf file name.
fn native_library_path(bin_root: &str, engine: Engine, microarch_dir: &str, accelerator: Accelerator) -> PathBuf {
    let engine_dir = format!("{engine:?}").to_lowercase();
    let os_dir = std::env::consts::OS;
    let file_name = format!("lib{:?}", accelerator).to_lowercase();
    PathBuf::from(bin_root).join(engine_dir).join(os_dir).join(microarch_dir).join(file_name)
}

/// Every adapter uses this in `load`: in a real deployment this is where
/// `dlopen`/`LoadLibrary` would run. Here, the file's mere presence stands
/// in for "native backend available" (spec §4.7 `ArtifactMissing` /
/// `NativeBackend` failure semantics).
fn probe_native_library(path: &PathBuf, engine: Engine) -> Result<(), RuntimeError> {
    if path.exists() {
        Ok(())
    } else {
        Err(RuntimeError::new(
            ErrorKind::NativeBackend,
            format!("no native {engine:?} library found at {}", path.display()),
        )
        .with_hint("place the architecture-matching native library on the configured bin_root search path".to_string()))
    }
}

/// Shared placeholder generation: deterministic, settings-aware, and built
/// entirely from the prompt so the pipeline/handler plumbing above this
/// layer is exercised end-to-end without a real inference engine.
fn placeholder_generate(messages: &[ChatMessage], settings: &InferenceSettings) -> String {
    let last_user = messages.iter().rev().find(|m| matches!(m.role, rt_core::Role::User)).map(|m| m.content.as_str()).unwrap_or("");
    let mut out = String::new();
    let words: Vec<&str> = last_user.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    let mut idx = 0usize;
    while out.split_whitespace().count() < settings.max_new_tokens.min(64) {
        out.push_str(words[idx % words.len()]);
        out.push(' ');
        idx += 1;
        if let Some(stop) = settings.stop_sequences.iter().find(|s| out.contains(s.as_str())) {
            let cut = out.find(stop.as_str()).unwrap();
            out.truncate(cut);
            break;
        }
    }
    out.trim().to_string()
}

fn placeholder_stream(handle: &EngineHandle, messages: &[ChatMessage], settings: &InferenceSettings, on_chunk: &mut dyn FnMut(TokenChunk)) {
    handle.token_progress.store(0, Ordering::SeqCst);
    let full = placeholder_generate(messages, settings);
    let mut cumulative = 0usize;
    for word in full.split_whitespace() {
        if handle.halt_flag.load(Ordering::SeqCst) {
            on_chunk(TokenChunk { delta: String::new(), cumulative_tokens: cumulative, finish_reason: Some(rt_core::FinishReason::Stopped) });
            return;
        }
        cumulative += 1;
        handle.token_progress.store(cumulative, Ordering::SeqCst);
        on_chunk(TokenChunk { delta: format!("{word} "), cumulative_tokens: cumulative, finish_reason: None });
    }
    let finish = if cumulative >= settings.max_new_tokens { rt_core::FinishReason::Length } else { rt_core::FinishReason::Stop };
    on_chunk(TokenChunk { delta: String::new(), cumulative_tokens: cumulative, finish_reason: Some(finish) });
}

/// L2-normalized bag-of-characters embedding, used by the adapters that
/// expose `embed` in this stub form. Deterministic and dependency-free, so
/// `generate_embeddings`/`rerank_documents`/`cluster` exercise real
/// cosine-similarity math end to end without a native embedding model.
fn placeholder_embed(texts: &[String]) -> Vec<Vec<f32>> {
    const DIM: usize = 32;
    texts
        .iter()
        .map(|text| {
            let mut v = vec![0f32; DIM];
            for (i, byte) in text.bytes().enumerate() {
                v[(byte as usize + i) % DIM] += 1.0;
            }
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in v.iter_mut() {
                    *x /= norm;
                }
            }
            v
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_library_path_includes_microarch_and_accelerator() {
        let path = native_library_path("bin", Engine::LlamaCpp, "zen4", Accelerator::Cuda);
        let s = path.to_string_lossy();
        assert!(s.contains("llamacpp"));
        assert!(s.contains("zen4"));
        assert!(s.contains("cuda"));
    }

    #[test]
    fn missing_native_library_maps_to_native_backend_error() {
        let err = probe_native_library(&PathBuf::from("/does/not/exist"), Engine::OnnxRuntime).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NativeBackend);
    }

    #[test]
    fn halting_mid_stream_stops_emitting_chunks_and_freezes_progress() {
        let handle = EngineHandle::new(
            "m".into(),
            Engine::LlamaCpp,
            Accelerator::Cpu,
            PathBuf::from("lib"),
            OffloadPlan { vram_layers: 0, ram_layers: 0, vram_bytes: 0, ram_bytes: 0, speed_tier: rt_core::SpeedTier::Fast, label: "t".into() },
        );
        let messages = vec![ChatMessage { role: rt_core::Role::User, content: "one two three four five".into(), attachments: vec![] }];
        let settings = InferenceSettings { max_new_tokens: 100, ..InferenceSettings::default() };

        let mut seen = 0usize;
        placeholder_stream(&handle, &messages, &settings, &mut |chunk| {
            seen += 1;
            if chunk.cumulative_tokens == 2 {
                handle.halt_flag.store(true, Ordering::SeqCst);
            }
        });
        assert!(seen < "one two three four five".split_whitespace().count() + 1);
        assert_eq!(handle.token_progress().load(Ordering::SeqCst), 2);
    }

    #[test]
    fn placeholder_embed_is_unit_normalized() {
        let embeddings = placeholder_embed(&["hello world".to_string()]);
        let norm: f32 = embeddings[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }
}

/// Referenced by pipelines so they can attach/describe attachments without
/// depending on adapter internals.
pub fn describe_attachment(attachment: &Attachment) -> String {
    match attachment.kind {
        rt_core::AttachmentKind::Image => "[image attachment]".to_string(),
        rt_core::AttachmentKind::Audio => "[audio attachment]".to_string(),
        rt_core::AttachmentKind::Video => "[video attachment]".to_string(),
    }
}
