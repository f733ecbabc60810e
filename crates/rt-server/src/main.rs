use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

mod adapters;
mod banner;
mod config;
mod handler;
mod http;
mod logging;
mod metrics;
mod pipelines;
mod protocol;
mod resource_manager;
mod stdio;
mod tracker;
mod utils;

use config::Config;

#[derive(clap::Parser, Debug)]
#[clap(name = "rt-server", about = "local hardware-aware inference runtime")]
struct Args {
    #[clap(short = 'l', long = "log", default_value = "info")]
    log_level: String,

    #[clap(long)]
    config: String,

    #[clap(long)]
    silent: bool,

    /// Maximum size of each log file in MB before rotation.
    #[clap(long, default_value = "100")]
    log_max_size_mb: u64,

    /// Maximum number of rotated log files to keep.
    #[clap(long, default_value = "10")]
    log_max_files: usize,

    /// Use JSON structured logging.
    #[clap(long)]
    json: bool,

    /// Console log style: compact, pretty, or verbose.
    #[clap(long, default_value = "pretty")]
    log_style: String,

    /// Disable the stdio transport (spec §6); useful when only HTTP is wanted.
    #[clap(long)]
    no_stdio: bool,
}

struct LogConfig {
    log_dir: String,
    instance_name: String,
    log_level: String,
    silent: bool,
    max_size_mb: u64,
    max_files: usize,
    json: bool,
    log_style: logging::LogStyle,
}

fn tracing_init(config: LogConfig) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use std::io::IsTerminal;
    use tracing_rolling_file::{RollingConditionBase, RollingFileAppenderBase};
    use tracing_subscriber::fmt::time::ChronoLocal;
    use tracing_subscriber::prelude::*;

    let build_info = utils::BuildInfo::new();

    std::fs::create_dir_all(&config.log_dir)?;

    let log_path = std::path::Path::new(&config.log_dir).join(format!("log.{}", config.instance_name));

    let condition = RollingConditionBase::new().daily().max_size(config.max_size_mb * 1024 * 1024);
    let file_appender = RollingFileAppenderBase::new(log_path, condition, config.max_files)?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let filter = tracing_subscriber::filter::LevelFilter::from_str(&config.log_level)?;
    let timer = ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string());

    let file_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_timer(timer.clone())
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_writer(non_blocking_file)
            .with_filter(filter.clone())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .event_format(
                tracing_subscriber::fmt::format()
                    .with_timer(timer.clone())
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_ansi(false),
            )
            .with_writer(non_blocking_file)
            .with_filter(filter.clone())
            .boxed()
    };

    if config.silent {
        tracing_subscriber::registry().with(file_layer).init();
    } else {
        let console_layer = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer)
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_writer(std::io::stdout)
                .with_filter(filter)
                .boxed()
        } else {
            let use_ansi = std::io::stdout().is_terminal();
            let show_file = config.log_style == logging::LogStyle::Verbose;
            let pretty_formatter = logging::PrettyFormatter::new(timer)
                .with_ansi(use_ansi)
                .with_file(show_file)
                .with_target(true)
                .with_style(config.log_style);

            tracing_subscriber::fmt::layer()
                .event_format(pretty_formatter)
                .with_writer(std::io::stdout)
                .with_filter(filter)
                .boxed()
        };

        tracing_subscriber::registry().with(file_layer).with(console_layer).init();
    }

    tracing::info!(?build_info);
    tracing::info!(
        log_dir = %config.log_dir,
        max_size_mb = config.max_size_mb,
        max_files = config.max_files,
        json = config.json,
        "logging initialized with rotation"
    );

    Ok(guard)
}

async fn metrics_handler() -> axum::response::Response {
    use axum::response::IntoResponse;
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    };
    axum::response::Response::builder()
        .status(200)
        .header(axum::http::header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
        .unwrap()
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if let Err(err) = main_().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn main_() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = <Args as clap::Parser>::parse();
    let config = Config::load(&args.config)?;

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", format!("{},hyper=info,mio=info", args.log_level));
    }
    let log_style = args.log_style.parse().unwrap_or_else(|e: String| {
        eprintln!("warning: {e}, using 'pretty'");
        logging::LogStyle::Pretty
    });

    let log_config = LogConfig {
        log_dir: config.log_dir.clone(),
        instance_name: config.instance_name.clone(),
        log_level: args.log_level.clone(),
        silent: args.silent,
        max_size_mb: args.log_max_size_mb,
        max_files: args.log_max_files,
        json: args.json,
        log_style,
    };
    let _guard = tracing_init(log_config)?;
    metrics::init();

    let startup_span = tracing::info_span!("startup");
    let _enter = startup_span.enter();

    let inventory = rt_core::hardware::probe();

    if !args.silent {
        let server_banner = banner::ServerBanner::new();
        server_banner.print_logo();

        let gpus: Vec<String> = inventory
            .gpus
            .iter()
            .map(|g| match g.vram_bytes {
                Some(bytes) => format!("{} ({})", g.name, banner::format_bytes(bytes)),
                None => g.name.clone(),
            })
            .collect();
        let npu = inventory.npu.as_ref().map(|n| format!("{} ({})", n.vendor, n.driver));
        let banner_config = banner::BannerConfig {
            version: utils::BuildInfo::new().git_describe(),
            addr: config.addr.clone(),
            port: config.port,
            instance_name: config.instance_name.clone(),
            cpu_summary: format!("{} ({} cores, {} threads, {})", inventory.cpu.vendor, inventory.cpu.cores, inventory.cpu.threads, inventory.cpu.microarch),
            gpus,
            npu,
            capabilities: inventory.capabilities.iter().map(|c| format!("{c:?}")).collect(),
            preload: config
                .preload
                .iter()
                .map(|p| banner::PreloadInfo { source: p.source.clone(), engine: "auto".to_string() })
                .collect(),
        };
        server_banner.print_banner(&banner_config);
    }

    drop(_enter);

    let handler = Arc::new(handler::Handler::new(inventory, &config));

    for entry in &config.preload {
        let req = protocol::LoadModelRequest {
            source: entry.source.clone(),
            auth_token: Config::hf_token(),
            model_id: entry.model_id.clone(),
            recipe: None,
        };
        match handler.load_model(req) {
            Ok(resp) => tracing::info!(model_id = %resp.model_id, engine = ?resp.engine, "preloaded model"),
            Err(err) => tracing::error!(?err, source = %entry.source, "failed to preload model"),
        }
    }

    let app_state = Arc::new(http::AppState {
        handler: handler.clone(),
        build_info: utils::BuildInfo::new(),
        started_at: Instant::now(),
        chat_timeout: std::time::Duration::from_secs(config.chat_timeout_secs),
    });

    let app = axum::Router::new()
        .nest("/api/v1", http::router(app_state))
        .route("/metrics", axum::routing::get(metrics_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    if !args.no_stdio {
        let stdio_handler = handler.clone();
        std::thread::spawn(move || {
            if let Err(err) = stdio::run(stdio_handler) {
                tracing::error!(?err, "stdio transport exited");
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port)).await?;
    tracing::info!(addr = %config.addr, port = config.port, "listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
