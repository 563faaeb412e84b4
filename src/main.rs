use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use timeline_export::{
    export::{progress_percent, ExportFormat, ExportQuality},
    project::{ElementKind, FrameRate},
    Config, ExportConfiguration, ExportError, Exporter, Project,
};

#[derive(Parser)]
#[command(
    name = "timeline-export",
    version,
    about = "Render a multi-track editing timeline into an MP4 or WebM file",
    long_about = "Timeline-Export composites every frame of a project timeline (video clips, images and text overlays), mixes its audio and encodes the result with ffmpeg."
)]
struct Cli {
    /// Project description (TOML)
    project: PathBuf,

    /// Output file; defaults to the project name plus the format's extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Container format (mp4, webm)
    #[arg(short, long, default_value = "mp4")]
    format: ExportFormat,

    /// Quality preset (low, medium, high, very_high)
    #[arg(short, long, default_value = "high")]
    quality: ExportQuality,

    /// Output frame rate; defaults to the project's
    #[arg(long)]
    fps: Option<f64>,

    /// Export video only
    #[arg(long)]
    no_audio: bool,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    info!("Starting Timeline-Export v{}", env!("CARGO_PKG_VERSION"));
    info!("Project: {:?}", cli.project);

    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    let project = load_project(&cli.project).await?;
    let project_name = project.name.clone();

    let mut options = ExportConfiguration::for_project(&project);
    options.format = cli.format;
    options.quality = cli.quality;
    options.include_audio = !cli.no_audio;
    if let Some(fps) = cli.fps {
        options.frame_rate = FrameRate::from_fps(fps)?;
    }

    let exporter = Exporter::new(config)?;
    let mut handle = exporter.start_export(Arc::new(project), options);

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling export...");
            cancel.cancel();
        }
    });

    let mut last_percent = None;
    while let Some(progress) = handle.next_progress().await {
        let percent = progress_percent(progress);
        if last_percent != Some(percent) {
            info!("   Progress: {}%", percent);
            last_percent = Some(percent);
        }
    }

    let output = match handle.finish().await {
        Ok(output) => output,
        Err(ExportError::Cancelled) => {
            info!("Export cancelled, nothing was written");
            return Ok(());
        }
        Err(e) => {
            let message = e.user_message();
            return Err(anyhow::Error::new(e).context(message));
        }
    };

    let output_path = cli
        .output
        .unwrap_or_else(|| PathBuf::from(output.file_name(&project_name)));
    tokio::fs::write(&output_path, &output.bytes)
        .await
        .with_context(|| format!("failed to write {:?}", output_path))?;

    info!(
        "Export complete! {} ({}) saved to: {:?}",
        output.format, output.mime_type, output_path
    );
    Ok(())
}

/// Parse a project file, resolving relative source paths against its directory
async fn load_project(path: &Path) -> Result<Project> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read project {:?}", path))?;
    let mut project: Project =
        toml::from_str(&source).with_context(|| format!("failed to parse project {:?}", path))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for track in &mut project.tracks {
        for element in &mut track.elements {
            if let ElementKind::Media(media) = &mut element.kind {
                if media.source.path.is_relative() {
                    media.source.path = base.join(&media.source.path);
                }
            }
        }
    }
    Ok(project)
}
