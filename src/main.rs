//! tiff-pipeline - Streaming TIFF decoder.
//!
//! `info` lists the image directories of a file; `decode` runs one window of
//! a directory through the decode pipeline and writes it as a 16-bit PNG.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiff_pipeline::{
    config::{Cli, Command, DecodeConfig, InfoConfig},
    format::tiff::read_directories,
    geometry::{Point, Size},
    io::{FileRangeReader, RangeReader},
    pipeline::CancellationToken,
    pixel::{ImageBuffer, Rgba64},
    ImageDecoder,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Info(config) => run_info(config).await,
        Command::Decode(config) => run_decode(config).await,
    }
}

/// Initialize logging with the given verbosity.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tiff_pipeline=debug"
    } else {
        "tiff_pipeline=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.verbose);

    let reader = match FileRangeReader::open(&config.input).await {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to open {}: {}", config.input.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let directories = match read_directories(&reader).await {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to read directories: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let summaries: Vec<_> = directories
        .iter()
        .enumerate()
        .map(|(i, d)| d.summary(i))
        .collect();

    if config.json {
        match serde_json::to_string_pretty(&summaries) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize directories: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("{} ({} bytes)", reader.identifier(), reader.size());
    println!("═════════════════════════════════");
    for s in &summaries {
        println!(
            "#{:<3} {}x{}  {} x {} bits  {}  {}  {}  orientation {}  {} striles",
            s.index,
            s.width,
            s.height,
            s.samples_per_pixel,
            s.bits_per_sample.first().copied().unwrap_or(0),
            s.photometric,
            s.compression,
            if s.planar { "planar" } else { "chunky" },
            s.orientation,
            s.strile_count,
        );
    }
    ExitCode::SUCCESS
}

// =============================================================================
// Decode Command
// =============================================================================

async fn run_decode(config: DecodeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let reader: Arc<dyn RangeReader> = match FileRangeReader::open(&config.input).await {
        Ok(r) => Arc::new(r),
        Err(e) => {
            error!("Failed to open {}: {}", config.input.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let directories = match read_directories(reader.as_ref()).await {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to read directories: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let Some(directory) = directories.get(config.ifd) else {
        error!(
            "Directory {} does not exist, the file has {}",
            config.ifd,
            directories.len()
        );
        return ExitCode::FAILURE;
    };

    let decoder = match ImageDecoder::new(directory, reader, config.decoder_options()).await {
        Ok(d) => d,
        Err(e) => {
            error!("Cannot decode directory {}: {}", config.ifd, e);
            return ExitCode::FAILURE;
        }
    };
    let Some((offset, size)) = config.window(Size::new(decoder.width(), decoder.height())) else {
        error!(
            "Window origin ({}, {}) lies outside the {}x{} image",
            config.x,
            config.y,
            decoder.width(),
            decoder.height()
        );
        return ExitCode::FAILURE;
    };

    info!(
        "Decoding {}x{} at ({}, {}) of directory {} through {:?}",
        size.width,
        size.height,
        offset.x,
        offset.y,
        config.ifd,
        decoder.stages()
    );

    let cancellation = CancellationToken::new();
    {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling decode");
                cancellation.cancel();
            }
        });
    }

    let buffer = Arc::new(ImageBuffer::<Rgba64>::filled(
        size.width,
        size.height,
        Rgba64::TRANSPARENT_WHITE,
    ));
    let started = Instant::now();
    if let Err(e) = decoder
        .decode::<Rgba64>(
            offset,
            size,
            Point::new(0, 0),
            buffer.clone(),
            &cancellation,
        )
        .await
    {
        error!("Decode failed: {}", e);
        return ExitCode::FAILURE;
    }
    info!("Decoded in {:.1?}", started.elapsed());

    let samples: Vec<u16> = buffer
        .to_vec()
        .into_iter()
        .flat_map(|p| [p.r, p.g, p.b, p.a])
        .collect();
    let Some(image) =
        image::ImageBuffer::<image::Rgba<u16>, Vec<u16>>::from_raw(size.width, size.height, samples)
    else {
        error!("Decoded buffer does not match the window size");
        return ExitCode::FAILURE;
    };
    if let Err(e) = image.save(&config.output) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!("Wrote {}", config.output.display());
    ExitCode::SUCCESS
}
