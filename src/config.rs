//! Command-line configuration for the `tiff-pipeline` binary.
//!
//! Options can be given as flags or through environment variables with the
//! `TIFF_PIPELINE_` prefix:
//!
//! - `TIFF_PIPELINE_IFD` - Directory to decode (default: 0)
//! - `TIFF_PIPELINE_PARALLELISM` - Max striles decoded at once, 0 = sequential (default: 0)
//! - `TIFF_PIPELINE_LAZY_THRESHOLD` - Strile tables above this size are paged (default: 4096)
//! - `TIFF_PIPELINE_BATCH_SIZE` - Entries per paged strile window (default: 1024)
//! - `TIFF_PIPELINE_POOL_BUFFERS` - Buffers kept per pool size class, 0 disables pooling (default: 8)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::decoder::DecoderOptions;
use crate::geometry::{Point, Size};
use crate::pool::MemoryPool;
use crate::strile::{DEFAULT_BATCH_SIZE, DEFAULT_LAZY_THRESHOLD};

// =============================================================================
// Default Values
// =============================================================================

/// Default number of idle buffers kept per pool size class.
pub const DEFAULT_POOL_BUFFERS: usize = 8;

/// Largest accepted degree of parallelism.
pub const MAX_PARALLELISM: usize = 256;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiff-pipeline - Streaming TIFF decoder.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiff-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the image directories of a file.
    Info(InfoConfig),

    /// Decode a window of one directory to PNG.
    Decode(DecodeConfig),
}

/// Options of the `info` command.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// TIFF or BigTIFF file to inspect.
    pub input: PathBuf,

    /// Print the directories as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Options of the `decode` command.
#[derive(Args, Debug, Clone)]
pub struct DecodeConfig {
    /// TIFF or BigTIFF file to decode.
    pub input: PathBuf,

    /// Output PNG path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Index of the directory to decode.
    #[arg(long, default_value_t = 0, env = "TIFF_PIPELINE_IFD")]
    pub ifd: usize,

    // =========================================================================
    // Window
    // =========================================================================
    /// Left edge of the window, in displayed pixels.
    #[arg(long, default_value_t = 0)]
    pub x: u32,

    /// Top edge of the window, in displayed pixels.
    #[arg(long, default_value_t = 0)]
    pub y: u32,

    /// Window width; defaults to the rest of the image.
    #[arg(long)]
    pub width: Option<u32>,

    /// Window height; defaults to the rest of the image.
    #[arg(long)]
    pub height: Option<u32>,

    // =========================================================================
    // Decoder
    // =========================================================================
    /// Maximum striles decoded concurrently, 0 decodes sequentially.
    #[arg(long, default_value_t = 0, env = "TIFF_PIPELINE_PARALLELISM")]
    pub parallelism: usize,

    /// Decode in stored order, ignoring the Orientation tag.
    #[arg(long, default_value_t = false)]
    pub ignore_orientation: bool,

    /// Strile tables with more entries than this are paged lazily.
    #[arg(long, default_value_t = DEFAULT_LAZY_THRESHOLD, env = "TIFF_PIPELINE_LAZY_THRESHOLD")]
    pub lazy_threshold: u64,

    /// Entries per paged strile window.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, env = "TIFF_PIPELINE_BATCH_SIZE")]
    pub batch_size: usize,

    /// Idle buffers kept per pool size class, 0 disables pooling.
    #[arg(long, default_value_t = DEFAULT_POOL_BUFFERS, env = "TIFF_PIPELINE_POOL_BUFFERS")]
    pub pool_buffers: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl DecodeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.width == Some(0) || self.height == Some(0) {
            return Err("width and height must be greater than 0".to_string());
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(format!("parallelism must be at most {}", MAX_PARALLELISM));
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        match self.output.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => Ok(()),
            _ => Err("output must be a .png file".to_string()),
        }
    }

    /// Decoder options selected by the flags.
    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            ignore_orientation: self.ignore_orientation,
            memory_pool: if self.pool_buffers == 0 {
                MemoryPool::unpooled()
            } else {
                MemoryPool::pooled(self.pool_buffers)
            },
            max_degree_of_parallelism: self.parallelism,
            lazy_strile_threshold: self.lazy_threshold,
            strile_batch_size: self.batch_size,
            ..Default::default()
        }
    }

    /// Window to decode within an image of displayed size `image`.
    ///
    /// Returns `None` when the window starts outside the image.
    pub fn window(&self, image: Size) -> Option<(Point, Size)> {
        if self.x >= image.width || self.y >= image.height {
            return None;
        }
        let width = self.width.unwrap_or(image.width - self.x).min(image.width - self.x);
        let height = self.height.unwrap_or(image.height - self.y).min(image.height - self.y);
        Some((Point::new(self.x, self.y), Size::new(width, height)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> DecodeConfig {
        DecodeConfig {
            input: PathBuf::from("in.tif"),
            output: PathBuf::from("out.png"),
            ifd: 0,
            x: 0,
            y: 0,
            width: None,
            height: None,
            parallelism: 0,
            ignore_orientation: false,
            lazy_threshold: DEFAULT_LAZY_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            pool_buffers: DEFAULT_POOL_BUFFERS,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = test_config();
        config.width = Some(0);
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.parallelism = MAX_PARALLELISM + 1;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.output = PathBuf::from("out.jpg");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_defaults_to_rest_of_image() {
        let mut config = test_config();
        config.x = 10;
        config.height = Some(500);
        assert_eq!(
            config.window(Size::new(100, 50)),
            Some((Point::new(10, 0), Size::new(90, 50)))
        );

        config.x = 100;
        assert_eq!(config.window(Size::new(100, 50)), None);
    }

    #[test]
    fn test_decoder_options() {
        let mut config = test_config();
        config.pool_buffers = 0;
        config.parallelism = 4;
        let options = config.decoder_options();
        assert!(!options.memory_pool.is_pooled());
        assert_eq!(options.max_degree_of_parallelism, 4);
    }

    #[test]
    fn test_parse_decode_command() {
        let cli = Cli::try_parse_from([
            "tiff-pipeline",
            "decode",
            "slide.tif",
            "-o",
            "out.png",
            "--ifd",
            "2",
            "--parallelism",
            "8",
        ])
        .unwrap();
        match cli.into_command() {
            Command::Decode(config) => {
                assert_eq!(config.ifd, 2);
                assert_eq!(config.parallelism, 8);
                assert_eq!(config.output, PathBuf::from("out.png"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
