//! File-backed flash image
//!
//! The simulated chip lives in a [`MemFlash`] while the tool runs. Its
//! content is loaded from a raw image file at start and written back after
//! every command that can change it, so the ring frontier survives restarts
//! the way it does on real hardware.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use flashring::{Capacity, FlashEngine, MemFlash};
use log::{debug, info};

/// A raw NOR image on the host filesystem.
#[derive(Debug, Clone)]
pub struct ImageFile {
    path: PathBuf,
}

impl ImageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the image, creating an erased one if the file does not exist.
    ///
    /// An existing file must match the configured capacity exactly.
    pub async fn load_or_create(&self, capacity: Capacity) -> Result<MemFlash> {
        let total = capacity.total_bytes() as usize;
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => {
                if data.len() != total {
                    bail!(
                        "Image {} is {} bytes, expected {}",
                        self.path.display(),
                        data.len(),
                        total
                    );
                }
                info!("Loaded image {} ({} bytes)", self.path.display(), total);
                data
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let data = vec![0xFF; total];
                tokio::fs::write(&self.path, &data)
                    .await
                    .with_context(|| format!("Failed to create image {}", self.path.display()))?;
                info!("Created erased image {} ({} bytes)", self.path.display(), total);
                data
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read image {}", self.path.display()));
            }
        };
        MemFlash::from_image(data, capacity.sector_size())
            .with_context(|| format!("Invalid geometry for {}", self.path.display()))
    }

    /// Write the current chip content back to the file.
    pub async fn persist(&self, engine: &FlashEngine<MemFlash>) -> Result<()> {
        let data = engine.flash().with_device(|mem| mem.image().to_vec()).await;
        tokio::fs::write(&self.path, &data)
            .await
            .with_context(|| format!("Failed to write image {}", self.path.display()))?;
        debug!("Persisted {} bytes to {}", data.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_erased_image() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let image = ImageFile::new(dir.path().join("flash.bin"));
        let mem = image.load_or_create(Capacity::new(8192, 4096)?).await?;

        assert!(mem.image().iter().all(|&b| b == 0xFF));
        assert_eq!(std::fs::read(image.path())?.len(), 8192);
        Ok(())
    }

    #[tokio::test]
    async fn test_persist_and_reload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let image = ImageFile::new(dir.path().join("flash.bin"));
        let capacity = Capacity::new(8192, 4096)?;

        let engine = FlashEngine::new(image.load_or_create(capacity).await?);
        engine.bring_up().await?;
        engine.write(0x1000, b"kept").await?;
        image.persist(&engine).await?;

        let mem = image.load_or_create(capacity).await?;
        assert_eq!(&mem.image()[0x1000..0x1004], b"kept");
        Ok(())
    }

    #[tokio::test]
    async fn test_size_mismatch_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("flash.bin");
        std::fs::write(&path, vec![0xFF; 4096])?;

        let err = ImageFile::new(&path)
            .load_or_create(Capacity::new(8192, 4096)?)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected 8192"));
        Ok(())
    }
}
