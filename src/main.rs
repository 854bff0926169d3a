//! Main entry point for the dscify CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dscify::cli::{Command, is_http_url};
use dscify::download::{API_BASE, download_all};
use dscify::pipeline::prepare_destination;
use dscify::progress::{ProgressBridge, ProgressRenderer, run_extractor};
use dscify::{
    Cli, DylibLoader, ExtractionPipeline, ExtractorLoader, FileSource, Hdiutil, PipelineConfig,
    RemoteSource, SeekableSource, ZipArchive,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .format_timestamp(None)
        .format_target(false)
        .init();

    match &cli.command {
        Command::Download { concurrency } => download(*concurrency).await,
        Command::Extract {
            extractor,
            path,
            dest_path,
        } => extract_cache(&cli, extractor.clone(), path, dest_path).await,
        Command::ExtractIpsw {
            extractor,
            path,
            dest_path,
        } => extract_ipsw(&cli, extractor.clone(), path, dest_path).await,
    }
}

async fn download(concurrency: usize) -> Result<()> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()?;
    let ipsws = download_all(&client, API_BASE, concurrency).await?;
    println!("{}", serde_json::to_string(&ipsws)?);
    Ok(())
}

/// Expand a shared cache that is already on disk.
async fn extract_cache(
    cli: &Cli,
    extractor: Option<PathBuf>,
    path: &Path,
    dest_path: &Path,
) -> Result<()> {
    let extractor = DylibLoader::new(extractor).load().await?;

    prepare_destination(dest_path)
        .await
        .with_context(|| format!("Couldn't prepare {}", dest_path.display()))?;

    info!("Preparing...");
    let bridge = ProgressBridge::new();
    let renderer = ProgressRenderer::spawn(bridge.subscribe(), cli.is_quiet());
    run_extractor(extractor, path.to_path_buf(), dest_path.to_path_buf(), bridge).await?;
    renderer.join().await;

    Ok(())
}

/// Expand the shared cache inside an ipsw, local or remote.
async fn extract_ipsw(
    cli: &Cli,
    extractor: Option<PathBuf>,
    path: &str,
    dest_path: &Path,
) -> Result<()> {
    prepare_destination(dest_path)
        .await
        .with_context(|| format!("Couldn't prepare {}", dest_path.display()))?;

    let loader = DylibLoader::new(extractor);
    if is_http_url(path) {
        let source = RemoteSource::new(path.to_string()).await?;
        let mut archive = ZipArchive::new(source);
        run_pipeline(cli, &loader, &mut archive, dest_path).await?;

        // Display network transfer statistics for HTTP sources
        if !cli.is_quiet() {
            let transferred = archive.source_mut().transferred_bytes();
            eprintln!("Total bytes transferred: {}", format_size(transferred));
        }
    } else {
        let source = FileSource::open(Path::new(path))
            .await
            .with_context(|| format!("Couldn't open {}", path))?;
        let mut archive = ZipArchive::new(source);
        run_pipeline(cli, &loader, &mut archive, dest_path).await?;
    }

    Ok(())
}

async fn run_pipeline<S: SeekableSource>(
    cli: &Cli,
    loader: &DylibLoader,
    archive: &mut ZipArchive<S>,
    dest_path: &Path,
) -> Result<()> {
    let mounter = Hdiutil::new();
    let pipeline = ExtractionPipeline::new(PipelineConfig::new(dest_path), &mounter, loader);
    let renderer = ProgressRenderer::spawn(pipeline.progress(), cli.is_quiet());

    let result = pipeline.run(archive).await;
    renderer.join().await;
    let report = result?;

    info!(
        "Extracted {} ({}/{} images)",
        report.image_entry, report.progress.completed, report.progress.total
    );
    Ok(())
}

/// Format a byte size into a human-readable string.
///
/// Automatically selects the appropriate unit (bytes, KB, MB, GB)
/// based on the size magnitude.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
