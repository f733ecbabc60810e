//! Artifact Resolver (C3, spec §4.3).
//!
//! `resolve` turns a user-supplied source string into a fully classified
//! [`ArtifactDescriptor`]. Local files are inspected directly; remote
//! sources are resolved through the HuggingFace Hub API, the same crate
//! `resolve_or_download`/`resolve_hf_snapshot` in the server binary use for
//! fetching weights.

use crate::error::{ErrorKind, Result, RuntimeError};
use crate::model::{ArtifactDescriptor, ArtifactFormat, Architecture, Task};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;
use std::path::Path;

const GGUF_MAGIC: [u8; 4] = *b"GGUF";

/// `resolve(source, auth_token?) -> ArtifactDescriptor | ResolutionError`.
pub fn resolve(source: &str, auth_token: Option<&str>) -> Result<ArtifactDescriptor> {
    if let Some(desc) = resolve_local(source)? {
        return Ok(desc);
    }
    resolve_remote(source, auth_token)
}

/// Precedence rule 1: a path with a known extension that exists on disk.
fn resolve_local(source: &str) -> Result<Option<ArtifactDescriptor>> {
    let path = Path::new(source);
    if !path.exists() {
        return Ok(None);
    }

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let basename = path.file_stem().and_then(|s| s.to_str()).unwrap_or(source);

    let format = match ext {
        "gguf" => detect_gguf_variant(path, basename)?,
        "onnx" => ArtifactFormat::Onnx,
        "task" => ArtifactFormat::MediaPipeTask,
        "safetensors" => ArtifactFormat::SafeTensors,
        _ if path.is_dir() && has_onnx_file(path) => ArtifactFormat::Onnx,
        _ => {
            return Err(RuntimeError::new(
                ErrorKind::UnknownFormat,
                format!("unrecognized file extension for local artifact: {source}"),
            ))
        }
    };

    let architecture = detect_architecture(basename);
    let task = infer_task(&architecture);
    let size_bytes = path_size(path);

    Ok(Some(ArtifactDescriptor {
        source: source.to_string(),
        local_path: Some(source.to_string()),
        repo: None,
        format,
        architecture,
        task,
        size_bytes,
        layer_count: None,
    }))
}

fn has_onnx_file(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .any(|e| e.path().extension().and_then(|e| e.to_str()) == Some("onnx"))
}

fn path_size(path: &Path) -> Option<u64> {
    if path.is_dir() {
        std::fs::read_dir(path)
            .ok()
            .map(|rd| rd.flatten().filter_map(|e| e.metadata().ok()).map(|m| m.len()).sum())
    } else {
        std::fs::metadata(path).ok().map(|m| m.len())
    }
}

/// Filename substrings are a fast path; the GGUF KV architecture field is
/// authoritative when the header can be read (spec §4.3).
fn detect_gguf_variant(path: &Path, basename: &str) -> Result<ArtifactFormat> {
    const BITNET_SUBSTRINGS: &[&str] =
        &["bitnet", "b1.58", "b1_58", "1.58bit", "i2_s", "tl1", "tl2"];
    let name_lower = basename.to_lowercase();
    let substring_hit = BITNET_SUBSTRINGS.iter().any(|s| name_lower.contains(s));

    match read_gguf_architecture(path) {
        Ok(Some(arch)) => {
            let arch_lower = arch.to_lowercase();
            if BITNET_SUBSTRINGS.iter().any(|s| arch_lower.contains(s)) {
                Ok(ArtifactFormat::BitNet)
            } else {
                Ok(ArtifactFormat::Gguf)
            }
        }
        Ok(None) | Err(_) if substring_hit => Ok(ArtifactFormat::BitNet),
        Ok(None) => Ok(ArtifactFormat::Gguf),
        Err(e) => {
            tracing::debug!(error = %e, path = %path.display(), "GGUF header parse failed, using filename fast path");
            Ok(ArtifactFormat::Gguf)
        }
    }
}

/// Reads just enough of the GGUF header to recover `general.architecture`:
/// magic, version, tensor/KV counts, then KV pairs (spec §6 artifact
/// layout). Returns `Ok(None)` if the key isn't present.
fn read_gguf_architecture(path: &Path) -> std::io::Result<Option<String>> {
    let mut f = std::fs::File::open(path)?;
    let mut magic = [0u8; 4];
    f.read_exact(&mut magic)?;
    if magic != GGUF_MAGIC {
        return Ok(None);
    }
    let _version = f.read_u32::<LittleEndian>()?;
    let _tensor_count = f.read_u64::<LittleEndian>()?;
    let kv_count = f.read_u64::<LittleEndian>()?;

    for _ in 0..kv_count {
        let key = read_gguf_string(&mut f)?;
        let value_type = f.read_u32::<LittleEndian>()?;
        if key == "general.architecture" && value_type == 8 {
            return Ok(Some(read_gguf_string(&mut f)?));
        }
        skip_gguf_value(&mut f, value_type)?;
    }
    Ok(None)
}

fn read_gguf_string(f: &mut std::fs::File) -> std::io::Result<String> {
    let len = f.read_u64::<LittleEndian>()?;
    let mut buf = vec![0u8; len as usize];
    f.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn skip_gguf_value(f: &mut std::fs::File, value_type: u32) -> std::io::Result<()> {
    match value_type {
        0 | 1 | 7 => {
            f.read_u8()?;
        }
        2 | 3 => {
            f.read_u16::<LittleEndian>()?;
        }
        4 | 5 | 6 => {
            f.read_u32::<LittleEndian>()?;
        }
        8 => {
            read_gguf_string(f)?;
        }
        9 => {
            let elem_type = f.read_u32::<LittleEndian>()?;
            let count = f.read_u64::<LittleEndian>()?;
            for _ in 0..count {
                skip_gguf_value(f, elem_type)?;
            }
        }
        10 | 11 | 12 => {
            f.read_u64::<LittleEndian>()?;
        }
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unknown GGUF value type {value_type}"),
            ))
        }
    }
    Ok(())
}

/// Precedence rules 2 & 3: an `owner/repo[/subpath]` source, resolved
/// through the HuggingFace Hub.
fn resolve_remote(source: &str, auth_token: Option<&str>) -> Result<ArtifactDescriptor> {
    let (repo, variant) = split_repo_and_variant(source);
    if repo.split('/').filter(|s| !s.is_empty()).count() < 2 {
        return Err(RuntimeError::new(
            ErrorKind::SourceNotFound,
            format!("source does not look like a local path or an owner/repo reference: {source}"),
        ));
    }

    let format = detect_format_from_repo_name(&repo).or_else(|| variant.as_deref().and_then(detect_format_from_filename));
    let format = match format {
        Some(f) => f,
        None => list_repo_files(&repo, auth_token)
            .ok()
            .and_then(|files| files.iter().find_map(|f| detect_format_from_filename(f)))
            .ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::UnknownFormat,
                    format!("could not determine artifact format for remote repo {repo}"),
                )
            })?,
    };

    let basename = repo.rsplit('/').next().unwrap_or(&repo);
    let architecture = detect_architecture(basename);
    let task = infer_task(&architecture);

    Ok(ArtifactDescriptor {
        source: source.to_string(),
        local_path: None,
        repo: Some(repo),
        format,
        architecture,
        task,
        size_bytes: None,
        layer_count: None,
    })
}

/// Splits `owner/repo/variant/file` into `(owner/repo, Some(variant/file))`
/// when more than two path segments are present (explicit variant
/// specifier, precedence rule 3).
fn split_repo_and_variant(source: &str) -> (String, Option<String>) {
    let segments: Vec<&str> = source.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() <= 2 {
        (source.trim_matches('/').to_string(), None)
    } else {
        (format!("{}/{}", segments[0], segments[1]), Some(segments[2..].join("/")))
    }
}

fn detect_format_from_repo_name(repo: &str) -> Option<ArtifactFormat> {
    let lower = repo.to_lowercase();
    if lower.contains("-gguf") {
        Some(ArtifactFormat::Gguf)
    } else if lower.contains("-onnx") {
        Some(ArtifactFormat::Onnx)
    } else if lower.contains("-litert") {
        Some(ArtifactFormat::LiteRt)
    } else {
        None
    }
}

fn detect_format_from_filename(name: &str) -> Option<ArtifactFormat> {
    let lower = name.to_lowercase();
    if lower.ends_with(".gguf") {
        Some(ArtifactFormat::Gguf)
    } else if lower.ends_with(".onnx") {
        Some(ArtifactFormat::Onnx)
    } else if lower.ends_with(".task") {
        Some(ArtifactFormat::MediaPipeTask)
    } else if lower.ends_with(".safetensors") {
        Some(ArtifactFormat::SafeTensors)
    } else {
        None
    }
}

fn list_repo_files(repo: &str, auth_token: Option<&str>) -> Result<Vec<String>> {
    let builder = hf_hub::api::sync::ApiBuilder::new().with_token(auth_token.map(str::to_string));
    let api = builder
        .build()
        .map_err(|e| RuntimeError::new(ErrorKind::NetworkFetchFailed, e.to_string()))?
        .model(repo.to_string());
    let info = api
        .info()
        .map_err(|e| RuntimeError::new(ErrorKind::NetworkFetchFailed, e.to_string()))?;
    Ok(info.siblings.into_iter().map(|s| s.rfilename).collect())
}

/// Substring match on the basename/repo-name (spec §4.3); `Generic` when
/// nothing matches.
fn detect_architecture(name: &str) -> Architecture {
    let lower = name.to_lowercase();
    const TABLE: &[(&str, Architecture)] = &[
        ("florence", Architecture::Florence2),
        ("janus", Architecture::Janus),
        ("whisper", Architecture::Whisper),
        ("clip", Architecture::Clip),
        ("clap", Architecture::Clap),
        ("moonshine", Architecture::Moonshine),
    ];
    for (needle, arch) in TABLE {
        if lower.contains(needle) {
            return arch.clone();
        }
    }
    Architecture::Generic
}

/// Architecture → task, fixed table (spec §4.3).
fn infer_task(architecture: &Architecture) -> Task {
    match architecture {
        Architecture::Whisper | Architecture::Moonshine => Task::Asr,
        Architecture::Florence2 | Architecture::Janus => Task::ImageToText,
        Architecture::Clip | Architecture::Clap => Task::FeatureExtraction,
        Architecture::Generic => Task::TextGeneration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_architecture_is_case_insensitive_substring() {
        assert_eq!(detect_architecture("OpenAI-Whisper-Large-v3"), Architecture::Whisper);
        assert_eq!(detect_architecture("some-random-7b-model"), Architecture::Generic);
    }

    #[test]
    fn infer_task_follows_fixed_table() {
        assert_eq!(infer_task(&Architecture::Whisper), Task::Asr);
        assert_eq!(infer_task(&Architecture::Clip), Task::FeatureExtraction);
        assert_eq!(infer_task(&Architecture::Generic), Task::TextGeneration);
    }

    #[test]
    fn detect_format_from_repo_name_substrings() {
        assert_eq!(detect_format_from_repo_name("TheBloke/Llama-2-7B-GGUF"), Some(ArtifactFormat::Gguf));
        assert_eq!(detect_format_from_repo_name("microsoft/Phi-3-mini-4k-instruct-onnx"), Some(ArtifactFormat::Onnx));
        assert_eq!(detect_format_from_repo_name("org/plain-repo"), None);
    }

    #[test]
    fn split_repo_and_variant_keeps_two_segments_as_repo() {
        assert_eq!(split_repo_and_variant("owner/repo"), ("owner/repo".to_string(), None));
        let (repo, variant) = split_repo_and_variant("owner/repo/sub/model.gguf");
        assert_eq!(repo, "owner/repo");
        assert_eq!(variant.as_deref(), Some("sub/model.gguf"));
    }

    #[test]
    fn resolve_remote_rejects_bare_word() {
        let err = resolve_remote("not-a-repo", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceNotFound);
    }

    #[test]
    fn resolve_rejects_missing_local_file_with_unknown_extension() {
        let err = resolve("does/not/exist.xyz", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceNotFound);
    }
}
