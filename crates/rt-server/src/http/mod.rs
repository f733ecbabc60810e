//! HTTP surface (spec §6): every endpoint under `/api/v1` delegates straight
//! into [`crate::handler::Handler`] — this module only does request
//! extraction, response shaping, and SSE framing.

use crate::handler::Handler;
use crate::protocol::*;
use crate::utils::{BuildInfo, WrapJson};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rt_core::{ErrorKind, RuntimeError};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub struct AppState {
    pub handler: Arc<Handler>,
    pub build_info: BuildInfo,
    pub started_at: Instant,
    /// Wall-clock budget for a single `chat`/`chat_stream` native call
    /// (spec.md:220) after which the call is abandoned and the model is
    /// marked `Failed`, forcing a reload on next use.
    pub chat_timeout: Duration,
}

/// Runs a blocking `Handler` method on the blocking thread pool so it never
/// occupies a Tokio I/O thread (spec §5: "native inference calls... MUST be
/// executed on a thread that is not the I/O thread").
async fn blocking<T, F>(f: F) -> Result<T, RuntimeError>
where
    F: FnOnce() -> Result<T, RuntimeError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(err) => Err(RuntimeError::new(ErrorKind::GenerateError, format!("worker task panicked: {err}"))),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/build_info", get(build_info))
        .route("/models", get(list_models))
        .route("/models/loaded", get(list_models))
        .route("/models/select", post(select_active))
        .route("/load", post(load_model))
        .route("/pull", post(load_model))
        .route("/unload", post(unload_model))
        .route("/delete", post(unload_model))
        .route("/chat/completions", post(chat_completions))
        .route("/completions", post(chat_completions))
        .route("/embeddings", post(embeddings))
        .route("/reranking", post(reranking))
        .route("/semantic-search", post(semantic_search))
        .route("/cluster", post(cluster))
        .route("/recommend", post(recommend))
        .route("/resources", get(resources))
        .route("/resources/estimate", post(estimate_size))
        .route("/params", get(get_params).post(set_params))
        .route("/halt", post(halt))
        .route("/stats", get(stats))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active = state.handler.tracker.get_active();
    Json(HealthResponse {
        status: "ok",
        model_loaded: active.is_some(),
        engine: active.map(|m| m.engine),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn build_info(State(state): State<Arc<AppState>>) -> Json<BuildInfo> {
    Json(state.build_info.clone())
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<Vec<ModelSummary>> {
    Json(state.handler.list_models())
}

async fn select_active(State(state): State<Arc<AppState>>, Json(req): Json<SelectActiveRequest>) -> WrapJson<()> {
    let handler = state.handler.clone();
    WrapJson(blocking(move || handler.select_active(&req.model_id)).await)
}

async fn load_model(State(state): State<Arc<AppState>>, Json(req): Json<LoadModelRequest>) -> WrapJson<LoadModelResponse> {
    let handler = state.handler.clone();
    WrapJson(blocking(move || handler.load_model(req)).await)
}

async fn unload_model(State(state): State<Arc<AppState>>, Json(req): Json<UnloadModelRequest>) -> WrapJson<()> {
    let handler = state.handler.clone();
    WrapJson(blocking(move || handler.unload_model(req.model_id.as_deref())).await)
}

/// Non-streaming branch: runs the blocking `chat` call under the configured
/// wall-clock timeout (spec.md:220); on timeout the model is marked `Failed`
/// so the next call forces a reload rather than racing the abandoned one.
async fn chat_once(state: &AppState, req: &ChatCompletionRequest) -> Result<ChatCompletionResponse, RuntimeError> {
    let model_id = state.handler.resolve_model_id(req.model.as_deref())?;
    let handler = state.handler.clone();
    let messages = req.messages.clone();
    let settings = req.settings.clone();
    let model = Some(model_id.clone());
    let task = tokio::task::spawn_blocking(move || handler.chat(model.as_deref(), &messages, &settings));
    match tokio::time::timeout(state.chat_timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(RuntimeError::new(ErrorKind::GenerateError, format!("worker task panicked: {join_err}"))),
        Err(_) => {
            state.handler.mark_failed(&model_id);
            Err(RuntimeError::new(ErrorKind::Timeout, "chat call exceeded the configured timeout")
                .with_hint("the model has been marked unhealthy and will reload on next use"))
        }
    }
}

/// Streaming branch: the SSE response is returned immediately, built from a
/// channel a background task feeds as the adapter actually produces tokens
/// (spec §5 streaming) — the same timeout/failure handling as the
/// non-streaming path runs inside that task without delaying the response.
fn chat_stream_response(state: &AppState, req: &ChatCompletionRequest) -> Result<axum::response::Response, RuntimeError> {
    let model_id = state.handler.resolve_model_id(req.model.as_deref())?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<Event, Infallible>>();
    let handler = state.handler.clone();
    let messages = req.messages.clone();
    let settings = req.settings.clone();
    let timeout = state.chat_timeout;
    let model = Some(model_id.clone());

    tokio::spawn(async move {
        let tx_chunks = tx.clone();
        let handler_for_timeout = handler.clone();
        let task = tokio::task::spawn_blocking(move || {
            handler.chat_stream(model.as_deref(), &messages, &settings, |chunk| {
                let event = Event::default().data(
                    serde_json::to_string(&ChatCompletionChunk { delta: chunk.delta, finish_reason: chunk.finish_reason }).unwrap(),
                );
                let _ = tx_chunks.send(Ok(event));
            })
        });
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => {
                let _ = tx.send(Ok(Event::default().event("error").data(err.message)));
            }
            Ok(Err(join_err)) => {
                let _ = tx.send(Ok(Event::default().event("error").data(format!("worker task panicked: {join_err}"))));
            }
            Err(_) => {
                handler_for_timeout.mark_failed(&model_id);
                let _ = tx.send(Ok(Event::default().event("error").data("chat call exceeded the configured timeout")));
            }
        }
        let _ = tx.send(Ok(Event::default().data("[DONE]")));
    });

    let stream = UnboundedReceiverStream::new(rx);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
}

async fn chat_completions(State(state): State<Arc<AppState>>, Json(req): Json<ChatCompletionRequest>) -> axum::response::Response {
    if req.stream {
        match chat_stream_response(&state, &req) {
            Ok(response) => response,
            Err(err) => WrapJson::<()>(Err(err)).into_response(),
        }
    } else {
        WrapJson(chat_once(&state, &req).await).into_response()
    }
}

async fn embeddings(State(state): State<Arc<AppState>>, Json(req): Json<EmbeddingsRequest>) -> WrapJson<EmbeddingsResponse> {
    let handler = state.handler.clone();
    WrapJson(blocking(move || handler.generate_embeddings(req.model.as_deref(), &req.input).map(|embeddings| EmbeddingsResponse { embeddings })).await)
}

async fn reranking(State(state): State<Arc<AppState>>, Json(req): Json<RerankRequest>) -> WrapJson<RerankResponse> {
    let handler = state.handler.clone();
    WrapJson(blocking(move || handler.rerank_documents(None, &req.query, &req.documents, req.top_k)).await)
}

async fn semantic_search(State(state): State<Arc<AppState>>, Json(req): Json<SemanticSearchRequest>) -> WrapJson<SemanticSearchResponse> {
    let handler = state.handler.clone();
    WrapJson(blocking(move || handler.semantic_search(None, &req.query, &req.documents, req.k, req.threshold)).await)
}

async fn cluster(State(state): State<Arc<AppState>>, Json(req): Json<ClusterRequest>) -> WrapJson<ClusterResponse> {
    let handler = state.handler.clone();
    WrapJson(blocking(move || handler.cluster(None, &req)).await)
}

async fn recommend(State(state): State<Arc<AppState>>, Json(req): Json<RecommendRequest>) -> WrapJson<RecommendResponse> {
    let handler = state.handler.clone();
    WrapJson(blocking(move || handler.recommend(None, &req)).await)
}

async fn resources(State(state): State<Arc<AppState>>) -> Json<ResourceStatus> {
    Json(state.handler.query_resources())
}

async fn estimate_size(State(state): State<Arc<AppState>>, Json(req): Json<EstimateSizeRequest>) -> WrapJson<EstimateSizeResponse> {
    let handler = state.handler.clone();
    WrapJson(
        blocking(move || handler.estimate_size(&req.source, crate::config::Config::hf_token().as_deref()).map(|plans| EstimateSizeResponse { plans })).await,
    )
}

async fn get_params(State(state): State<Arc<AppState>>) -> Json<rt_core::InferenceSettings> {
    Json(state.handler.get_params())
}

async fn set_params(State(state): State<Arc<AppState>>, Json(partial): Json<rt_core::PartialInferenceSettings>) -> Json<rt_core::InferenceSettings> {
    Json(state.handler.set_params(&partial))
}

async fn halt(State(state): State<Arc<AppState>>, Json(req): Json<UnloadModelRequest>) -> Json<HaltResponse> {
    Json(state.handler.halt_generation(req.model_id.as_deref()))
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(state.handler.last_stats())
}
