//! stdio transport (spec §6): little-endian 4-byte length-prefixed JSON
//! framing over stdin/stdout, routed to the same [`crate::handler::Handler`]
//! operations as the HTTP surface, one message per line of work.

use crate::handler::Handler;
use crate::protocol::*;
use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use std::sync::Arc;

const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let len = match reader.read_u32::<LittleEndian>() {
        Ok(len) => len,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if len > MAX_FRAME_BYTES {
        anyhow::bail!("stdio frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit");
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).context("reading stdio frame body")?;
    Ok(Some(buf))
}

fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<()> {
    writer.write_u32::<LittleEndian>(body.len() as u32)?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Runs the stdio loop to completion (EOF on stdin). Intended to be spawned
/// on a blocking thread since `std::io::stdin` has no async-friendly read.
pub fn run(handler: Arc<Handler>) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = stdin.lock();
    let mut writer = stdout.lock();

    while let Some(frame) = read_frame(&mut reader)? {
        let response = match serde_json::from_slice::<StdioRequest>(&frame) {
            Ok(req) => dispatch(&handler, req),
            Err(err) => StdioResponse { id: None, ok: false, body: serde_json::json!({"error": err.to_string()}) },
        };
        let encoded = serde_json::to_vec(&response)?;
        write_frame(&mut writer, &encoded)?;
    }
    Ok(())
}

fn dispatch(handler: &Handler, req: StdioRequest) -> StdioResponse {
    let id = req.id.clone();
    let result = dispatch_action(handler, &req.action, req.body);
    match result {
        Ok(body) => StdioResponse { id, ok: true, body },
        Err(err) => StdioResponse { id, ok: false, body: serde_json::json!({"kind": err.kind, "message": err.message, "hint": err.hint}) },
    }
}

fn invalid(message: impl Into<String>) -> rt_core::RuntimeError {
    rt_core::RuntimeError::new(rt_core::ErrorKind::InvalidRequest, message)
}

fn parse<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> Result<T, rt_core::RuntimeError> {
    serde_json::from_value(body).map_err(|err| invalid(format!("malformed request body: {err}")))
}

fn dispatch_action(handler: &Handler, action: &str, body: serde_json::Value) -> Result<serde_json::Value, rt_core::RuntimeError> {
    let as_value = |v: impl serde::Serialize| serde_json::to_value(v).expect("response types always serialize");
    match action {
        "load_model" => {
            let req: LoadModelRequest = parse(body)?;
            handler.load_model(req).map(as_value)
        }
        "unload_model" => {
            let req: UnloadModelRequest = parse(body)?;
            handler.unload_model(req.model_id.as_deref()).map(|_| serde_json::Value::Null)
        }
        "list_models" => Ok(as_value(handler.list_models())),
        "select_active" => {
            let req: SelectActiveRequest = parse(body)?;
            handler.select_active(&req.model_id).map(|_| serde_json::Value::Null)
        }
        "chat" => {
            let req: ChatCompletionRequest = parse(body)?;
            handler.chat(req.model.as_deref(), &req.messages, &req.settings).map(as_value)
        }
        "chat_stream" => {
            let req: ChatCompletionRequest = parse(body)?;
            let mut chunks = Vec::new();
            handler
                .chat_stream(req.model.as_deref(), &req.messages, &req.settings, |chunk| chunks.push(chunk))
                .map(|_| as_value(chunks))
        }
        "halt_generation" => {
            let req: UnloadModelRequest = parse(body)?;
            Ok(as_value(handler.halt_generation(req.model_id.as_deref())))
        }
        "generate_embeddings" => {
            let req: EmbeddingsRequest = parse(body)?;
            handler.generate_embeddings(req.model.as_deref(), &req.input).map(|embeddings| as_value(EmbeddingsResponse { embeddings }))
        }
        "rerank_documents" => {
            let req: RerankRequest = parse(body)?;
            handler.rerank_documents(None, &req.query, &req.documents, req.top_k).map(as_value)
        }
        "semantic_search" => {
            let req: SemanticSearchRequest = parse(body)?;
            handler.semantic_search(None, &req.query, &req.documents, req.k, req.threshold).map(as_value)
        }
        "cluster" => {
            let req: ClusterRequest = parse(body)?;
            handler.cluster(None, &req).map(as_value)
        }
        "recommend" => {
            let req: RecommendRequest = parse(body)?;
            handler.recommend(None, &req).map(as_value)
        }
        "get_params" => Ok(as_value(handler.get_params())),
        "set_params" => {
            let req: PartialInferenceSettings = parse(body)?;
            Ok(as_value(handler.set_params(&req)))
        }
        "query_resources" => Ok(as_value(handler.query_resources())),
        "estimate_size" => {
            let req: EstimateSizeRequest = parse(body)?;
            handler.estimate_size(&req.source, crate::config::Config::hf_token().as_deref()).map(|plans| as_value(EstimateSizeResponse { plans }))
        }
        "stats" => Ok(as_value(handler.last_stats())),
        other => Err(invalid(format!("unknown action {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_a_buffer() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let frame = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(frame, b"hello");
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &vec![0u8; (MAX_FRAME_BYTES as usize) + 1]).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn eof_on_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn unknown_action_is_invalid_request() {
        let inventory = rt_core::hardware::probe();
        let config: crate::config::Config = toml::from_str("").unwrap();
        let handler = Handler::new(inventory, &config);
        let err = dispatch_action(&handler, "nonexistent", serde_json::Value::Null).unwrap_err();
        assert_eq!(err.kind, rt_core::ErrorKind::InvalidRequest);
    }
}
