use anyhow::Result;

#[derive(Debug, PartialEq, Clone, serde::Deserialize, serde::Serialize)]
pub struct BuildInfo {
    build_timestamp: String,
    build_date: String,
    git_branch: String,
    git_timestamp: String,
    git_date: String,
    git_hash: String,
    git_describe: String,
    rustc_host_triple: String,
    rustc_version: String,
    cargo_target_triple: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildInfo {
    pub fn new() -> BuildInfo {
        BuildInfo {
            build_timestamp: String::from(env!("VERGEN_BUILD_TIMESTAMP")),
            build_date: String::from(env!("VERGEN_BUILD_DATE")),
            git_branch: String::from(env!("VERGEN_GIT_BRANCH")),
            git_timestamp: String::from(env!("VERGEN_GIT_COMMIT_TIMESTAMP")),
            git_date: String::from(env!("VERGEN_GIT_COMMIT_DATE")),
            git_hash: String::from(env!("VERGEN_GIT_SHA")),
            git_describe: String::from(env!("VERGEN_GIT_DESCRIBE")),
            rustc_host_triple: String::from(env!("VERGEN_RUSTC_HOST_TRIPLE")),
            rustc_version: String::from(env!("VERGEN_RUSTC_SEMVER")),
            cargo_target_triple: String::from(env!("VERGEN_CARGO_TARGET_TRIPLE")),
        }
    }

    /// Returns the git describe version string (e.g. "v0.1.0-5-gabcdef1").
    pub fn git_describe(&self) -> String {
        self.git_describe.clone()
    }
}

/// Expands `$VAR` references in a config string against the process
/// environment, leaving unknown variables blank.
pub fn replace_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| "".to_string())
    })
    .to_string()
}

/// Resolves a config-file path entry: `hf://org/repo/file` downloads a
/// single file, `hf-snapshot://org/repo[/glob]` downloads a snapshot, and
/// anything else is treated as a local path after `$VAR` expansion.
pub fn resolve_or_download(input: &str) -> Result<String> {
    let path = if let Some(path) = input.strip_prefix("hf://") {
        let s: Vec<&str> = path.split('/').collect();
        if s.len() < 3 {
            anyhow::bail!("unexpected format for hf path {input}")
        }
        let repo = format!("{}/{}", s[0], s[1]);
        let file = s[2..].join("/");
        let api = hf_hub::api::sync::ApiBuilder::from_env().build()?.model(repo);
        api.get(&file)?.to_string_lossy().to_string()
    } else if let Some(path) = input.strip_prefix("hf-snapshot://") {
        resolve_hf_snapshot(path)?
    } else {
        replace_env_vars(input)
    };
    Ok(path)
}

/// Resolves an `hf-snapshot://` path, downloading matching files into the HF
/// cache and returning the local cache directory path. Supports glob
/// patterns such as `org/repo/**/*.onnx` to filter which files are fetched.
pub fn resolve_hf_snapshot(input: &str) -> Result<String> {
    let glob_chars = ['*', '?', '['];
    let glob_start = input.find(|c| glob_chars.contains(&c));

    let (repo_path, glob_pattern) = match glob_start {
        Some(pos) => {
            let repo_end = input[..pos].rfind('/').unwrap_or(pos);
            let repo_path = &input[..repo_end];
            let glob = &input[repo_end..].trim_start_matches('/');
            (repo_path.to_string(), Some(glob.to_string()))
        }
        None => (input.to_string(), None),
    };

    let parts: Vec<&str> = repo_path.split('/').collect();
    if parts.len() < 2 {
        anyhow::bail!("unexpected format for hf-snapshot path, expected org/repo: {input}")
    }
    let repo = format!("{}/{}", parts[0], parts[1]);

    let api = hf_hub::api::sync::ApiBuilder::from_env().build()?.model(repo.clone());
    let repo_info = api.info()?;

    let files_to_download: Vec<String> = if let Some(ref pattern) = glob_pattern {
        let glob = glob::Pattern::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid glob pattern '{}': {}", pattern, e))?;
        repo_info
            .siblings
            .iter()
            .filter_map(|sibling| glob.matches(&sibling.rfilename).then(|| sibling.rfilename.clone()))
            .collect()
    } else {
        repo_info.siblings.iter().map(|sibling| sibling.rfilename.clone()).collect()
    };

    if files_to_download.is_empty() {
        if glob_pattern.is_some() {
            tracing::warn!(repo = %repo, pattern = ?glob_pattern, "no files matched the glob pattern in hf-snapshot");
        }
    } else {
        tracing::info!(
            repo = %repo,
            file_count = files_to_download.len(),
            pattern = ?glob_pattern,
            "downloading files from HuggingFace snapshot"
        );
        for file in &files_to_download {
            tracing::debug!(file = %file, "downloading from HF");
            api.get(file)?;
        }
    }

    if let Some(first_file) = files_to_download.first() {
        let local_path = api.get(first_file)?;
        let mut snapshot_dir = local_path.clone();
        let depth = first_file.matches('/').count() + 1;
        for _ in 0..depth {
            snapshot_dir = snapshot_dir
                .parent()
                .ok_or_else(|| anyhow::anyhow!("failed to find snapshot directory"))?
                .to_path_buf();
        }
        Ok(snapshot_dir.to_string_lossy().to_string())
    } else {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("could not determine cache directory"))?
            .join("huggingface")
            .join("hub")
            .join(format!("models--{}--{}", parts[0], parts[1]));
        Ok(cache_dir.to_string_lossy().to_string())
    }
}

fn walk_toml(t: &mut toml::Value, f: &impl Fn(&mut String) -> Result<()>) -> Result<()> {
    match t {
        toml::Value::Table(t) => {
            for (_, t) in t.iter_mut() {
                walk_toml(t, f)?;
            }
        }
        toml::Value::Array(a) => {
            for t in a.iter_mut() {
                walk_toml(t, f)?
            }
        }
        toml::Value::String(s) => f(s)?,
        toml::Value::Integer(_)
        | toml::Value::Float(_)
        | toml::Value::Boolean(_)
        | toml::Value::Datetime(_) => {}
    }
    Ok(())
}

#[allow(dead_code)]
pub fn resolve_or_download_toml(t: &mut toml::Table) -> Result<()> {
    for (_, t) in t.iter_mut() {
        walk_toml(t, &|s: &mut String| -> Result<()> {
            *s = resolve_or_download(s)?;
            Ok(())
        })?;
    }
    Ok(())
}

pub struct WrapJson<T>(pub Result<T, rt_core::RuntimeError>);

impl<T: serde::Serialize> axum::response::IntoResponse for WrapJson<T> {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            Ok(v) => axum::Json(v).into_response(),
            Err(err) => {
                tracing::error!(?err, "request failed");
                let status = axum::http::StatusCode::from_u16(err.kind.http_status())
                    .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
                let body = serde_json::json!({
                    "error": {
                        "kind": err.kind,
                        "message": err.message,
                        "hint": err.hint,
                    }
                });
                (status, axum::Json(body)).into_response()
            }
        }
    }
}

pub struct AxumError(anyhow::Error);

impl axum::response::IntoResponse for AxumError {
    fn into_response(self) -> axum::response::Response {
        let err = self.0;
        tracing::error!(?err);
        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, format!("{err:?}")).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AxumError {
    fn from(value: E) -> Self {
        Self(value.into())
    }
}

pub type AxumResult<R> = std::result::Result<R, AxumError>;

fn conv<T>(samples: &mut Vec<f32>, data: std::borrow::Cow<symphonia::core::audio::AudioBuffer<T>>)
where
    T: symphonia::core::sample::Sample,
    f32: symphonia::core::conv::FromSample<T>,
{
    use symphonia::core::audio::Signal;
    use symphonia::core::conv::FromSample;
    samples.extend(data.chan(0).iter().map(|v| f32::from_sample(*v)))
}

/// Decodes an audio attachment's raw bytes into mono PCM f32 samples. Used
/// by pipelines (e.g. Whisper) that accept audio attachments.
pub fn pcm_decode(bytes: Vec<u8>) -> anyhow::Result<(Vec<f32>, u32)> {
    use symphonia::core::audio::{AudioBufferRef, Signal};

    let source = std::io::Cursor::new(bytes);
    let mss = symphonia::core::io::MediaSourceStream::new(Box::new(source), Default::default());
    let hint = symphonia::core::probe::Hint::new();
    let meta_opts: symphonia::core::meta::MetadataOptions = Default::default();
    let fmt_opts: symphonia::core::formats::FormatOptions = Default::default();
    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("no supported audio tracks"))?;
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &Default::default())?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut pcm_data = Vec::new();
    while let Ok(packet) = format.next_packet() {
        while !format.metadata().is_latest() {
            format.metadata().pop();
        }
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet)? {
            AudioBufferRef::F32(buf) => pcm_data.extend(buf.chan(0)),
            AudioBufferRef::U8(data) => conv(&mut pcm_data, data),
            AudioBufferRef::U16(data) => conv(&mut pcm_data, data),
            AudioBufferRef::U24(data) => conv(&mut pcm_data, data),
            AudioBufferRef::U32(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S8(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S16(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S24(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S32(data) => conv(&mut pcm_data, data),
            AudioBufferRef::F64(data) => conv(&mut pcm_data, data),
        }
    }
    Ok((pcm_data, sample_rate))
}

pub fn spawn<F>(name: &'static str, future: F) -> tokio::task::JoinHandle<()>
where
    F: std::future::Future<Output = Result<()>> + Send + 'static,
{
    tokio::task::spawn(async move {
        match future.await {
            Ok(_) => tracing::debug!(?name, "task completed successfully"),
            Err(err) => tracing::error!(?name, ?err, "task failed"),
        }
    })
}

pub fn spawn_blocking<F>(name: &'static str, f: F) -> tokio::task::JoinHandle<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || match f() {
        Ok(_) => tracing::debug!(?name, "task completed successfully"),
        Err(err) => tracing::error!(?name, ?err, "task failed"),
    })
}
