//! Local file range reader.
//!
//! Reads are positional (`pread` on Unix, `seek_read` on Windows), so one open
//! handle serves any number of concurrent requests without a shared cursor.
//! The blocking syscall runs on tokio's blocking pool.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::{check_range, RangeReader};
use crate::error::IoError;

/// A [`RangeReader`] over a file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileRangeReader {
    file: Arc<File>,
    size: u64,
    identifier: String,
}

impl FileRangeReader {
    /// Open `path` for reading.
    ///
    /// # Errors
    /// Returns `IoError::NotFound` if the file does not exist, `IoError::Io`
    /// for any other open or metadata failure.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let identifier = path.display().to_string();

        let (file, size) = tokio::task::spawn_blocking(move || -> Result<_, IoError> {
            let file = File::open(&path)?;
            let size = file.metadata()?.len();
            Ok((file, size))
        })
        .await
        .map_err(|e| IoError::Io(e.to_string()))??;

        Ok(Self {
            file: Arc::new(file),
            size,
            identifier,
        })
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;

        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || -> Result<Bytes, IoError> {
            let mut buf = vec![0u8; len];
            read_exact_at(&file, &mut buf, offset)?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|e| IoError::Io(e.to_string()))?
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tiff-pipeline-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_file_reader_reads_ranges() {
        let path = temp_path("ranges.bin");
        std::fs::write(&path, (0u8..=99).collect::<Vec<_>>()).unwrap();

        let reader = FileRangeReader::open(&path).await.unwrap();
        assert_eq!(reader.size(), 100);

        let bytes = reader.read_exact_at(10, 5).await.unwrap();
        assert_eq!(&bytes[..], &[10, 11, 12, 13, 14]);

        let result = reader.read_exact_at(98, 5).await;
        assert!(matches!(result, Err(IoError::RangeOutOfBounds { .. })));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_file_reader_missing_file() {
        let result = FileRangeReader::open(temp_path("does-not-exist.tif")).await;
        assert!(matches!(result, Err(IoError::NotFound(_))));
    }
}
