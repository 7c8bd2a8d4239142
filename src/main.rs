mod cli;

use tunestream::{
    config, server,
    streaming::{handle_stream_request, FsMediaStore, GuessContentType, StreamOutcome},
};
use tunestream_common::paths::{audio_extensions, is_audio_file};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting Tunestream server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "tunestream=trace,tower_http=debug".to_string()
        } else {
            "tunestream=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Inspect {
            resource_id,
            range,
            music_dir,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(inspect(
                &resource_id,
                range.as_deref(),
                music_dir,
                cli.config.as_deref(),
            ))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("tunestream {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn inspect(
    resource_id: &str,
    range: Option<&str>,
    music_dir: Option<std::path::PathBuf>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let music_dir = match music_dir {
        Some(dir) => dir,
        None => config::load_config_or_default(config_path)?.storage.music_dir,
    };

    if !is_audio_file(std::path::Path::new(resource_id)) {
        tracing::warn!(
            "{} does not have an audio extension (expected one of: {})",
            resource_id,
            audio_extensions().join(", ")
        );
    }

    let store = FsMediaStore::new(music_dir);
    let outcome = handle_stream_request(resource_id, range, &store, &GuessContentType).await?;

    println!("Status: {}", outcome.status());
    match &outcome {
        StreamOutcome::NotFound { .. } => {
            println!("No track {:?} in {:?}", resource_id, store.root());
        }
        StreamOutcome::RangeNotSatisfiable { total } => {
            println!("Content-Range: bytes */{}", total);
        }
        StreamOutcome::Partial {
            window,
            content_type,
            ..
        } => {
            println!("Content-Type: {}", content_type);
            println!("Content-Range: {}", window.content_range());
            println!("Content-Length: {}", window.len());
            if window.end + 1 < window.total {
                println!("Next request: bytes={}-", window.end + 1);
            }
        }
        StreamOutcome::Full {
            total,
            content_type,
            ..
        } => {
            println!("Content-Type: {}", content_type);
            println!("Content-Length: {}", total);
        }
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Music dir: {:?}", config.storage.music_dir);
            println!("  Covers dir: {:?}", config.storage.covers_dir);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Music dir: {:?}", config.storage.music_dir);
        }
    }

    Ok(())
}
