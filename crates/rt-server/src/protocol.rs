//! Wire types for both transports (spec §6). HTTP and stdio share the same
//! request/response shapes; only the framing differs (JSON body vs.
//! length-prefixed JSON message).

use rt_core::{Accelerator, ChatMessage, Engine, FinishReason, OffloadPlan, PartialInferenceSettings, Recipe};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct LoadModelRequest {
    pub source: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub recipe: Option<Recipe>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadModelResponse {
    pub model_id: String,
    pub engine: Engine,
    pub accelerator: Accelerator,
    pub plan: OffloadPlan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnloadModelRequest {
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub model_id: String,
    pub engine: Engine,
    pub accelerator: Accelerator,
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectActiveRequest {
    pub model_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub settings: PartialInferenceSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub text: String,
    pub finish_reason: FinishReason,
    pub engine: Engine,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub delta: String,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsRequest {
    pub input: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingsResponse {
    pub embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RerankRequest {
    pub query: String,
    pub documents: Vec<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedDocument {
    pub index: usize,
    pub document: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RerankResponse {
    pub results: Vec<RankedDocument>,
    pub used_fallback: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    pub documents: Vec<String>,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub threshold: Option<f32>,
}

fn default_k() -> usize {
    10
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticSearchResponse {
    pub results: Vec<RankedDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    KMeans,
    Hierarchical,
    Dbscan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkageMethod {
    Single,
    Complete,
    Average,
    Ward,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterRequest {
    pub texts: Vec<String>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default = "default_algorithm")]
    pub algorithm: ClusterAlgorithm,
    #[serde(default)]
    pub linkage: Option<LinkageMethod>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub eps: Option<f32>,
    #[serde(default)]
    pub min_samples: Option<usize>,
}

fn default_algorithm() -> ClusterAlgorithm {
    ClusterAlgorithm::KMeans
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterResponse {
    pub labels: Vec<i32>,
    pub n_clusters: usize,
    pub silhouette_score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    pub items: Vec<String>,
    #[serde(default)]
    pub query_index: Option<usize>,
    #[serde(default)]
    pub query_embedding: Option<Vec<f32>>,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub diversity_weight: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendedItem {
    pub index: usize,
    pub item: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendResponse {
    pub results: Vec<RecommendedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub engine: Option<Engine>,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HaltResponse {
    pub was_generating: bool,
    pub tokens_generated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub total_ram_bytes: u64,
    pub free_ram_bytes: u64,
    pub total_vram_bytes: u64,
    pub free_vram_bytes: u64,
    pub per_model: std::collections::HashMap<String, rt_core::ResourceReservation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimateSizeRequest {
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimateSizeResponse {
    pub plans: Vec<OffloadPlan>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub last_ttft_secs: Option<f64>,
    pub last_tokens_per_second: Option<f64>,
}

/// Stdio transport envelope (spec §6): `{action, ...}` routed 1:1 to the
/// same operations the HTTP layer exposes.
#[derive(Debug, Clone, Deserialize)]
pub struct StdioRequest {
    pub action: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct StdioResponse {
    pub id: Option<String>,
    pub ok: bool,
    pub body: serde_json::Value,
}
