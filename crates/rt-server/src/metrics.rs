//! Prometheus metrics exposed on `/metrics` (spec SPEC_FULL ambient stack).
//!
//! Grounded on the `prometheus` macro idiom in the teacher's `metrics.rs`
//! (`register_counter!`, `register_histogram!`, ...); `lazy_static` is
//! replaced with `std::sync::LazyLock` since the statics here have no
//! runtime configuration to thread through the macro.

use prometheus::{histogram_opts, opts, register_counter, register_gauge, register_histogram, register_int_gauge};
use prometheus::{Counter, Gauge, Histogram, IntGauge};
use std::sync::LazyLock;

pub static MODEL_LOAD_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!("rt_model_load_total", "Number of load_model calls.")).unwrap()
});

pub static MODEL_LOAD_FAILURES: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!("rt_model_load_failures_total", "Number of failed load_model calls.")).unwrap()
});

pub static MODELS_LOADED: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(opts!("rt_models_loaded", "Number of currently loaded models.")).unwrap()
});

pub static VRAM_RESERVED_BYTES: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(opts!("rt_vram_reserved_bytes", "Total VRAM currently reserved across models.")).unwrap()
});

pub static RAM_RESERVED_BYTES: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(opts!("rt_ram_reserved_bytes", "Total RAM currently reserved across models.")).unwrap()
});

pub static GENERATE_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!("rt_generate_total", "Number of chat/chat_stream calls.")).unwrap()
});

pub static GENERATE_ERRORS: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!("rt_generate_errors_total", "Number of failed generation calls.")).unwrap()
});

pub static GENERATE_CANCELLED: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!("rt_generate_cancelled_total", "Number of generations stopped by halt_generation.")).unwrap()
});

pub static TIME_TO_FIRST_TOKEN_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(histogram_opts!(
        "rt_time_to_first_token_seconds",
        "Latency from chat_stream start to first token chunk.",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0],
    ))
    .unwrap()
});

pub static TOKENS_PER_SECOND: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(histogram_opts!(
        "rt_tokens_per_second",
        "Observed generation throughput per streaming call.",
        vec![1., 5., 10., 20., 40., 80., 160., 320.],
    ))
    .unwrap()
});

pub static EMBEDDINGS_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!("rt_embeddings_total", "Number of generate_embeddings calls.")).unwrap()
});

pub static RERANK_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!("rt_rerank_total", "Number of rerank_documents calls.")).unwrap()
});

pub static RERANK_FALLBACK_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!(
        "rt_rerank_fallback_total",
        "Number of rerank_documents calls served by the embed+cosine fallback."
    ))
    .unwrap()
});

pub static CLUSTER_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!("rt_cluster_total", "Number of cluster calls.")).unwrap()
});

pub static RECOMMEND_TOTAL: LazyLock<Counter> = LazyLock::new(|| {
    register_counter!(opts!("rt_recommend_total", "Number of recommend calls.")).unwrap()
});

/// Forces every metric in this module to register at process start,
/// regardless of which code path first touches it, so `/metrics` is never
/// missing a series on a quiet server.
pub fn init() {
    LazyLock::force(&MODEL_LOAD_TOTAL);
    LazyLock::force(&MODEL_LOAD_FAILURES);
    LazyLock::force(&MODELS_LOADED);
    LazyLock::force(&VRAM_RESERVED_BYTES);
    LazyLock::force(&RAM_RESERVED_BYTES);
    LazyLock::force(&GENERATE_TOTAL);
    LazyLock::force(&GENERATE_ERRORS);
    LazyLock::force(&GENERATE_CANCELLED);
    LazyLock::force(&TIME_TO_FIRST_TOKEN_SECONDS);
    LazyLock::force(&TOKENS_PER_SECOND);
    LazyLock::force(&EMBEDDINGS_TOTAL);
    LazyLock::force(&RERANK_TOTAL);
    LazyLock::force(&RERANK_FALLBACK_TOTAL);
    LazyLock::force(&CLUSTER_TOTAL);
    LazyLock::force(&RECOMMEND_TOTAL);
}
