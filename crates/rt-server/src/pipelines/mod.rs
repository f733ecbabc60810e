//! Pipeline Registry (C8, spec §4.8): task-specialized wrappers around an
//! [`crate::adapters::EngineAdapter`]. A pipeline shapes input, interprets
//! output, and delegates every native call to its adapter — it never loads
//! a library itself.
//!
//! Selection itself (`dispatch`) lives in `rt_core::pipeline` since it's a
//! pure function of the descriptor; this module is the execution layer that
//! builds on top of that classification.

use crate::adapters::{EngineAdapter, EngineHandle};
use rt_core::pipeline::PipelineKind;
use rt_core::{ArtifactDescriptor, ChatMessage, InferenceSettings, Role, RuntimeError, TokenChunk};

pub struct Pipeline {
    pub kind: PipelineKind,
    adapter: Box<dyn EngineAdapter>,
}

impl Pipeline {
    pub fn for_descriptor(descriptor: &ArtifactDescriptor, adapter: Box<dyn EngineAdapter>) -> Self {
        Self { kind: rt_core::pipeline::dispatch(descriptor), adapter }
    }

    /// Input shaping per spec §4.8: special tokens for Florence2, a
    /// tokenizer-style instruction prefix for Whisper, cross-encoder pair
    /// framing for rerankers. Other pipelines pass messages through as-is.
    fn shape(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        match self.kind {
            PipelineKind::Florence2 => messages
                .iter()
                .map(|m| {
                    let mut m = m.clone();
                    if matches!(m.role, Role::User) && !m.content.starts_with('<') {
                        m.content = format!("<CAPTION> {}", m.content);
                    }
                    m
                })
                .collect(),
            PipelineKind::Whisper => messages
                .iter()
                .map(|m| {
                    let mut m = m.clone();
                    if matches!(m.role, Role::User) {
                        m.content = format!("<|transcribe|>{}", m.content);
                    }
                    m
                })
                .collect(),
            _ => messages.to_vec(),
        }
    }

    pub fn generate(&self, handle: &EngineHandle, messages: &[ChatMessage], settings: &InferenceSettings) -> Result<String, RuntimeError> {
        let shaped = self.shape(messages);
        self.adapter.generate(handle, &shaped, settings)
    }

    /// Delegates to the adapter's token-at-a-time path, pushing each chunk
    /// through `on_chunk` as it is produced (spec §5 streaming; no `Vec` is
    /// materialized here so a halt can interrupt generation in progress).
    pub fn generate_stream(&self, handle: &EngineHandle, messages: &[ChatMessage], settings: &InferenceSettings, on_chunk: &mut dyn FnMut(TokenChunk)) -> Result<(), RuntimeError> {
        let shaped = self.shape(messages);
        self.adapter.generate_stream(handle, &shaped, settings, on_chunk)
    }

    pub fn embed(&self, handle: &EngineHandle, texts: &[String]) -> Option<Result<Vec<Vec<f32>>, RuntimeError>> {
        self.adapter.embed(handle, texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters;
    use rt_core::{Architecture, ArtifactFormat, Task};

    fn descriptor(architecture: Architecture, task: Task) -> ArtifactDescriptor {
        ArtifactDescriptor {
            source: "test".into(),
            local_path: None,
            repo: None,
            format: ArtifactFormat::Gguf,
            architecture,
            task,
            size_bytes: None,
            layer_count: None,
        }
    }

    #[test]
    fn florence2_input_gets_caption_token() {
        let d = descriptor(Architecture::Florence2, Task::ImageToText);
        let pipeline = Pipeline::for_descriptor(&d, adapters::for_engine(rt_core::Engine::LlamaCpp));
        let shaped = pipeline.shape(&[ChatMessage { role: Role::User, content: "a cat".into(), attachments: vec![] }]);
        assert!(shaped[0].content.starts_with("<CAPTION>"));
    }

}
