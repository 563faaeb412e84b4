// Composite a single timeline frame to PNG for quick inspection

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use timeline_export::{Config, Exporter, Project};

#[derive(Parser)]
#[command(name = "render-still", version, about = "Composite one frame of a project timeline to PNG")]
struct Cli {
    /// Project description (TOML)
    project: PathBuf,

    /// Timeline position in seconds
    #[arg(short, long, default_value_t = 0.0)]
    time: f64,

    /// Output PNG path
    #[arg(short, long, default_value = "still.png")]
    output: PathBuf,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let source = std::fs::read_to_string(&cli.project)
        .with_context(|| format!("failed to read project {:?}", cli.project))?;
    let project: Project = toml::from_str(&source)?;

    println!("🎬 Rendering '{}' at {:.3}s", project.name, cli.time);
    let exporter = Exporter::new(config)?;
    let frame = exporter.render_frame(&project, cli.time)?;

    frame
        .save_png(&cli.output)
        .with_context(|| format!("failed to save {:?}", cli.output))?;
    info!("{}x{} frame saved to {:?}", frame.width(), frame.height(), cli.output);
    println!("✅ Saved to: {:?}", cli.output);
    Ok(())
}
