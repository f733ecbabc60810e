//! Pipeline Registry (C8, spec §4.8).
//!
//! A `PipelineKind` is a pure classification — selecting *which* pipeline
//! shapes input/output for a descriptor. The pipelines themselves (prompt
//! assembly, adapter dispatch) live in `rt-server` since they need the
//! engine adapters; this module only owns the registry's selection logic,
//! which the spec requires to be "pure and testable with only a descriptor
//! and an architecture string".

use crate::model::{Architecture, ArtifactDescriptor, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Florence2,
    Whisper,
    Janus,
    Clip,
    Clap,
    Rerank,
    Embedding,
    GenericText,
}

/// `dispatch(descriptor) -> PipelineKind`, priority per spec §4.8:
/// 1. explicit architecture hint, 2. substring pattern on the model id,
/// 3. task-based fixed table, 4. generic text fallback.
pub fn dispatch(descriptor: &ArtifactDescriptor) -> PipelineKind {
    if let Some(kind) = from_architecture(&descriptor.architecture) {
        return kind;
    }
    if let Some(kind) = from_substring(model_identifier(descriptor)) {
        return kind;
    }
    from_task(descriptor.task)
}

fn model_identifier(descriptor: &ArtifactDescriptor) -> &str {
    descriptor
        .repo
        .as_deref()
        .or(descriptor.local_path.as_deref())
        .unwrap_or(&descriptor.source)
}

fn from_architecture(architecture: &Architecture) -> Option<PipelineKind> {
    match architecture {
        Architecture::Florence2 => Some(PipelineKind::Florence2),
        Architecture::Whisper | Architecture::Moonshine => Some(PipelineKind::Whisper),
        Architecture::Janus => Some(PipelineKind::Janus),
        Architecture::Clip => Some(PipelineKind::Clip),
        Architecture::Clap => Some(PipelineKind::Clap),
        Architecture::Generic => None,
    }
}

fn from_substring(identifier: &str) -> Option<PipelineKind> {
    let lower = identifier.to_lowercase();
    const RERANK_SUBSTRINGS: &[&str] = &["rerank", "cross-encoder"];
    const EMBEDDING_SUBSTRINGS: &[&str] = &["dino", "speecht5"];

    if RERANK_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        Some(PipelineKind::Rerank)
    } else if EMBEDDING_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        Some(PipelineKind::Embedding)
    } else if lower.contains("code") || lower.contains("codellama") || lower.contains("starcoder") {
        Some(PipelineKind::GenericText)
    } else {
        None
    }
}

fn from_task(task: Task) -> PipelineKind {
    match task {
        Task::TextGeneration => PipelineKind::GenericText,
        Task::FeatureExtraction => PipelineKind::Embedding,
        Task::Asr => PipelineKind::Whisper,
        Task::ImageToText => PipelineKind::Florence2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArtifactFormat;

    fn descriptor(architecture: Architecture, task: Task, source: &str) -> ArtifactDescriptor {
        ArtifactDescriptor {
            source: source.to_string(),
            local_path: None,
            repo: Some(source.to_string()),
            format: ArtifactFormat::Gguf,
            architecture,
            task,
            size_bytes: None,
            layer_count: None,
        }
    }

    #[test]
    fn explicit_architecture_wins_over_substring() {
        let d = descriptor(Architecture::Whisper, Task::Asr, "org/rerank-whisper-thing");
        assert_eq!(dispatch(&d), PipelineKind::Whisper);
    }

    #[test]
    fn substring_routes_rerank_models() {
        let d = descriptor(Architecture::Generic, Task::TextGeneration, "org/bge-rerank-base");
        assert_eq!(dispatch(&d), PipelineKind::Rerank);
    }

    #[test]
    fn task_table_is_fallback() {
        let d = descriptor(Architecture::Generic, Task::FeatureExtraction, "org/plain-embedder");
        assert_eq!(dispatch(&d), PipelineKind::Embedding);
    }

    #[test]
    fn generic_text_is_the_ultimate_fallback() {
        let d = descriptor(Architecture::Generic, Task::TextGeneration, "org/some-llm");
        assert_eq!(dispatch(&d), PipelineKind::GenericText);
    }
}
