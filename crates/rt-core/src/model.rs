//! Data model shared by every component (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// On-disk / on-wire artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ArtifactFormat {
    Gguf,
    BitNet,
    Onnx,
    SafeTensors,
    MediaPipeTask,
    LiteRt,
}

/// Known model architectures with specialized pipelines; anything else
/// falls back to `Generic`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Architecture {
    Florence2,
    Janus,
    Whisper,
    Clip,
    Clap,
    Moonshine,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Task {
    TextGeneration,
    ImageToText,
    Asr,
    FeatureExtraction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub source: String,
    pub local_path: Option<String>,
    pub repo: Option<String>,
    pub format: ArtifactFormat,
    pub architecture: Architecture,
    pub task: Task,
    pub size_bytes: Option<u64>,
    pub layer_count: Option<usize>,
}

/// Inference engine. A closed enumeration: no plugin runtimes (Non-goal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Engine {
    LlamaCpp,
    BitNet,
    OnnxRuntime,
    MediaPipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Accelerator {
    Cpu,
    Cuda,
    Vulkan,
    RocM,
    Metal,
    DirectMl,
    Npu,
    Hybrid,
}

/// A scalar value for a `Recipe`'s closed `extra` map. Free-form option
/// dictionaries (as the source used) are frozen into this rather than left
/// as untyped maps of `Any`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub engine: Engine,
    pub accelerator: Accelerator,
    pub context_size: usize,
    pub batch_size: usize,
    pub threads: Option<usize>,
    pub extra: HashMap<String, Scalar>,
}

impl Recipe {
    /// `{engine}-{accelerator}` tag used in logs and the `/resources` body,
    /// in the style of the `RecipeType` string tags (`bitnet-cpu`,
    /// `onnx-hybrid`, ...) this runtime's recipe table was cross-checked
    /// against.
    pub fn tag(&self) -> String {
        format!("{:?}-{:?}", self.engine, self.accelerator).to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SpeedTier {
    Slow,
    Medium,
    Fast,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffloadPlan {
    pub vram_layers: usize,
    pub ram_layers: usize,
    pub vram_bytes: u64,
    pub ram_bytes: u64,
    pub speed_tier: SpeedTier,
    pub label: String,
}

/// Per-model lifecycle state (spec §3: `Absent -> Loading -> Ready ->
/// Unloading -> Absent`). `Absent` has no variant here since it is modeled
/// as "no entry in the tracker" rather than a stored state; `Failed` is the
/// terminal state a model moves to on a fatal generation error or a
/// cancelled timeout, per spec §5 ("future calls receive `NoModelLoaded`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Loading,
    Ready,
    Unloading,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReservation {
    pub model_id: String,
    pub vram_bytes: u64,
    pub ram_bytes: u64,
    pub engine: Engine,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub max_new_tokens: usize,
    pub repetition_penalty: f64,
    pub do_sample: bool,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.95,
            top_k: 40,
            max_new_tokens: 256,
            repetition_penalty: 1.1,
            do_sample: true,
            stop_sequences: Vec::new(),
        }
    }
}

impl InferenceSettings {
    /// Clip every field into its documented bound (spec §3, property P6).
    pub fn clipped(mut self) -> Self {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);
        self.max_new_tokens = self.max_new_tokens.max(1);
        self.repetition_penalty = self.repetition_penalty.max(1.0);
        self
    }

    /// Apply a partial override (as submitted to `set_params`), leaving
    /// unspecified fields untouched, then clip.
    pub fn merged(&self, partial: &PartialInferenceSettings) -> Self {
        let mut out = self.clone();
        if let Some(v) = partial.temperature {
            out.temperature = v;
        }
        if let Some(v) = partial.top_p {
            out.top_p = v;
        }
        if let Some(v) = partial.top_k {
            out.top_k = v;
        }
        if let Some(v) = partial.max_new_tokens {
            out.max_new_tokens = v;
        }
        if let Some(v) = partial.repetition_penalty {
            out.repetition_penalty = v;
        }
        if let Some(v) = partial.do_sample {
            out.do_sample = v;
        }
        if let Some(v) = &partial.stop_sequences {
            out.stop_sequences = v.clone();
        }
        out.clipped()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialInferenceSettings {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<usize>,
    pub max_new_tokens: Option<usize>,
    pub repetition_penalty: Option<f64>,
    pub do_sample: Option<bool>,
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// Either inline bytes (base64 over the wire) or a URL; exactly one is
    /// populated.
    pub bytes: Option<Vec<u8>>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenChunk {
    pub delta: String,
    pub cumulative_tokens: usize,
    pub finish_reason: Option<FinishReason>,
}
