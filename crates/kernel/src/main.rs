//! Vivaio content server.
//!
//! Loads content-type extensions, then serves the content API.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use vivaio_kernel::cli::{Cli, Command};
use vivaio_kernel::config::Config;
use vivaio_kernel::content::TypeRegistry;
use vivaio_kernel::plugin::{LoadedPlugins, NativePluginSource, PluginLoader, Toolchain};
use vivaio_kernel::routes;
use vivaio_kernel::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;
    cli.overrides.apply(&mut config);
    info!(
        bind = %config.bind_addr,
        port = config.http_port,
        plugins_dir = %config.plugins_dir.display(),
        "Configuration loaded"
    );

    let registry = TypeRegistry::new();
    let plugins = load_extensions(&config, &registry).await?;

    match cli.command() {
        Command::Build => {
            print!("{}", plugins.report());
            Ok(())
        }
        Command::Serve => serve(config, registry, plugins).await,
    }
}

/// Run the extension load pass. Any failure stops startup.
async fn load_extensions(config: &Config, registry: &TypeRegistry) -> Result<LoadedPlugins> {
    let toolchain = Toolchain::new(
        config.cargo.clone(),
        config.plugin_build_dir.clone(),
        config.plugin_force_rebuild,
    );
    let loader = PluginLoader::new().with_source(NativePluginSource::new(
        config.plugins_dir.clone(),
        toolchain,
    ));

    let registry = registry.clone();
    let result = tokio::task::spawn_blocking(move || loader.load(&registry))
        .await
        .context("extension load pass did not complete")?;

    match result {
        Ok(plugins) => Ok(plugins),
        Err(failure) => {
            error!(error = %failure.error, "extension load failed");
            eprint!("{}", failure.report);
            Err(failure.into())
        }
    }
}

async fn serve(config: Config, registry: TypeRegistry, plugins: LoadedPlugins) -> Result<()> {
    info!(
        extensions = plugins.len(),
        content_types = registry.len(),
        "Extensions and content types loaded"
    );

    let state = AppState::new(&config, registry, plugins)
        .await
        .context("failed to initialize application state")?;

    let app = routes::app(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
