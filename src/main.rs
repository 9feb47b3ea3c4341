mod app;
mod color;
mod config;
mod data;
mod error;
mod map;
mod pipeline;
mod state;
mod ui;

use std::path::PathBuf;

use anyhow::Context;
use app::MapViewerApp;
use clap::Parser;
use config::PipelineConfig;
use eframe::egui;

/// Classify zone, connector and highway datasets into styled overlay layers
/// and show them on a map.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Pipeline config (JSON).  Uses the built-in Baltimore map when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the config's export directory.
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Run the pipeline, write exports and the manifest, then exit.
    #[arg(long)]
    headless: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = args.export_dir {
        config.export_dir = dir;
    }

    if args.headless {
        let document = pipeline::run(&config).context("pipeline run failed")?;
        for group in &document.groups {
            println!(
                "{}{}",
                group.name,
                if group.exclusive { " (exclusive)" } else { "" }
            );
            for layer in &group.layers {
                println!(
                    "  {:<40} {:>6} features  {}",
                    layer.name,
                    layer.source.feature_count,
                    layer.source.path.display()
                );
            }
        }
        println!(
            "Wrote manifest to {}",
            config.export_dir.join(pipeline::MANIFEST).display()
        );
        return Ok(());
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "TAZ Overlay – Highway Count Review",
        options,
        Box::new(move |_cc| Ok(Box::new(MapViewerApp::new(config, args.config)))),
    )
    .map_err(|e| anyhow::anyhow!("viewer failed: {e}"))
}
