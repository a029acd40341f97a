use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use layerbox::config::{load_config, validate_config, Config};
use layerbox::Layerbox;
use layerbox_oci::ImageSource;

/// Materialize container images as layered directory bundles.
#[derive(Debug, Parser)]
#[command(name = "layerbox", version)]
struct App {
    /// Path to a YAML (or `.json`) config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root of the layer and volume stores.
    #[arg(long, global = true, env = "LAYERBOX_STORE")]
    driver_store: Option<PathBuf>,

    /// Accepted for compatibility; unused.
    #[arg(long, global = true, hide = true)]
    store: Option<PathBuf>,

    /// debug, info, warn, error or fatal.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Image platform as os/arch[/variant], e.g. windows/amd64.
    #[arg(long, global = true, env = "LAYERBOX_PLATFORM")]
    platform: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Pull an image and create a bundle on top of it.
    Create {
        rootfs_uri: String,
        handle: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        disk_limit_size_bytes: i64,
        #[arg(long)]
        exclude_image_from_quota: bool,
    },
    /// Pull an image into the layer store.
    Pull { rootfs_uri: String },
    /// Delete a bundle's volume.
    Delete { handle: String },
    /// Report a bundle's disk usage.
    Stats { handle: String },
}

#[derive(Serialize)]
struct Empty {}

#[tokio::main]
async fn main() {
    let app = App::parse();
    if let Err(e) = run(app).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(app: App) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&app)?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.filter_directive())),
        )
        .init();

    let layerbox = Layerbox::from_config(&config)?;

    match app.cmd {
        Command::Create {
            rootfs_uri,
            handle,
            disk_limit_size_bytes,
            exclude_image_from_quota,
        } => {
            let source = ImageSource::parse(&rootfs_uri)?;
            let spec = layerbox
                .create(&handle, source, disk_limit_size_bytes, exclude_image_from_quota)
                .await?;
            print_json(&spec)?;
        }
        Command::Pull { rootfs_uri } => {
            let source = ImageSource::parse(&rootfs_uri)?;
            let image = layerbox.pull(source).await?;
            print_json(&image)?;
        }
        Command::Delete { handle } => {
            layerbox.delete(&handle).await?;
            print_json(&Empty {})?;
        }
        Command::Stats { handle } => {
            let stats = layerbox.stats(&handle).await?;
            print_json(&stats)?;
        }
    }
    Ok(())
}

/// File config overridden by command-line flags.
fn resolve_config(app: &App) -> layerbox::Result<Config> {
    let mut config = load_config(app.config.as_deref())?;
    if let Some(level) = &app.log_level {
        config.log_level = level.clone();
    }
    if let Some(platform) = &app.platform {
        config.platform = Some(platform.clone());
    }
    if let Some(store) = &app.driver_store {
        config.store = Some(store.clone());
    }
    validate_config(&config)?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
