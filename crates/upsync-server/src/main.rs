//! `upsync-server` binary entrypoint.
//!
//! Loads configuration from flags and environment variables, installs the
//! metadata catalog, and starts the HTTP server.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use upsync_catalog::{Approvals, CatalogGuard};
use upsync_core::observability::{LogFormat, init_logging};
use upsync_core::{ContentSource, FsContentSource, MetadataSource, load_metadata_dir};
use upsync_server::config::ServerConfig;
use upsync_server::server::Server;
use upsync_server::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "upsync-server", about = "Update synchronization server")]
struct Args {
    /// Directory of the update metadata source.
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Path to the JSON server-configuration document.
    #[arg(long)]
    server_config: Option<PathBuf>,

    /// Directory of the update content store.
    #[arg(long)]
    content: Option<PathBuf>,

    /// Base URL clients use to reach the content routes.
    #[arg(long)]
    content_http_root: Option<String>,

    /// HTTP listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Pretty logs instead of JSON.
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(metadata) = self.metadata {
            config.metadata_path = Some(metadata);
        }
        if let Some(server_config) = self.server_config {
            config.server_config_path = Some(server_config);
        }
        if let Some(content) = self.content {
            config.content_path = Some(content);
        }
        if let Some(root) = self.content_http_root {
            config.content_http_root = Some(root);
        }
        if let Some(port) = self.port {
            config.http_port = port;
        }
        if self.debug {
            config.debug = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = ServerConfig::from_env()?;
    args.apply(&mut config);
    config.validate()?;

    init_logging(if config.debug {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    });

    let properties = config.load_properties()?;

    let guard = Arc::new(CatalogGuard::new());
    if let Some(path) = &config.metadata_path {
        tracing::info!(path = %path.display(), "loading metadata source");
        let source = load_metadata_dir(path)?;
        guard.install(Some(Arc::new(source) as Arc<dyn MetadataSource>))?;
    } else {
        tracing::warn!("no metadata source configured; sync requests will fault until one is installed");
    }

    let content: Option<Arc<dyn ContentSource>> = config.content_path.as_ref().map(|path| {
        tracing::info!(path = %path.display(), "serving content store");
        Arc::new(FsContentSource::new(path)) as Arc<dyn ContentSource>
    });

    let state = AppState::new(
        guard,
        Arc::new(Approvals::new()),
        content,
        config.content_http_root.clone(),
        properties,
    );
    Server::new(config, state).serve().await?;
    Ok(())
}
