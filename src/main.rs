#[macro_use]
extern crate tracing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use poem::listener::TcpListener;
use poem::{EndpointExt, IntoEndpoint, Route, Server};
use poem_openapi::OpenApiService;
use tracing_subscriber::EnvFilter;

use lust_images::config::RuntimeConfig;
use lust_images::routes::{ImageApi, UploadLimit};
use lust_images::ImageController;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct ServerConfig {
    #[clap(long, default_value = "127.0.0.1", env = "HOST")]
    /// The binding host address of the server.
    host: String,

    #[clap(long, default_value = "8000", env = "PORT")]
    port: u16,

    #[clap(long, env = "EXTERNAL_URL")]
    /// The external URL that would be used to access the server if applicable.
    ///
    /// This only affects the documentation.
    external_url: Option<String>,

    #[clap(long, env = "IMAGE_STORE_CONFIG")]
    /// The file path to a given config file.
    ///
    /// This can be either a JSON formatted config or YAML.
    config: PathBuf,

    #[clap(long, default_value = "info", env = "LOG_LEVEL")]
    /// The default log level filter for the server.
    ///
    /// Overridden by `RUST_LOG` when set.
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: ServerConfig = ServerConfig::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},poem=info", args.log_level)))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bind = format!("{}:{}", args.host, args.port);

    let cfg = Arc::new(RuntimeConfig::from_file(&args.config)?);
    let upload_limit = UploadLimit::from_config(&cfg);
    let storage = cfg.backend.connect().await?;
    let controller = Arc::new(ImageController::new(cfg, storage)?);

    let server_url = args
        .external_url
        .unwrap_or_else(|| format!("http://{}", bind));

    let api_service = OpenApiService::new(
        ImageApi::new(controller),
        "Lust Images API",
        env!("CARGO_PKG_VERSION"),
    )
    .description(
        "Image storage on S3-compatible object stores, \
        every upload is resized into a fixed set of variants served over signed URLs.",
    )
    .server(format!("{}/v1", server_url));

    let ui = api_service.redoc();
    let spec = api_service.spec_endpoint();

    let app = Route::new()
        .nest("/v1", api_service.into_endpoint().with(upload_limit))
        .nest("/ui", ui)
        .at("/spec", spec)
        .with(poem::middleware::Tracing);

    info!("Lust Images has started serving requests @ http://{}", bind);
    info!("Docs are available @ {}/ui", server_url);

    Server::new(TcpListener::bind(bind)).run(app).await?;

    Ok(())
}
