//! The merged grid kept between runs in the data bucket.

use std::io::{Read, Write};
use std::sync::Arc;

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, instrument, warn};
use w4h_common::{ForecastGrid, StageTimer};

use storage::ObjectStorage;

use crate::error::{EtlError, EtlResult};

/// Object key of the archive.
pub const ARCHIVE_KEY: &str = "w4h_data.bin.gz";

/// Gzip-compressed bincode snapshot of a [`ForecastGrid`].
pub struct GridArchive {
    storage: Arc<ObjectStorage>,
    key: String,
}

impl GridArchive {
    pub fn new(storage: Arc<ObjectStorage>) -> Self {
        Self {
            storage,
            key: ARCHIVE_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    /// Previously saved grid, or `None` before the first successful run.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn load(&self) -> EtlResult<Option<ForecastGrid>> {
        let timer = StageTimer::start("load_archive");
        let Some(bytes) = self.storage.get_optional(&self.key).await? else {
            warn!("No archived grid found, continuing without history");
            return Ok(None);
        };

        let grid = decode(&bytes)?;
        info!(
            compressed = bytes.len(),
            steps = grid.coords().time.len(),
            "Loaded archived grid"
        );
        timer.finish();
        Ok(Some(grid))
    }

    /// Replace the archive with `grid`.
    #[instrument(skip(self, grid), fields(key = %self.key))]
    pub async fn save(&self, grid: &ForecastGrid) -> EtlResult<()> {
        let timer = StageTimer::start("save_archive");
        let bytes = encode(grid)?;
        let size = bytes.len();
        self.storage.put(&self.key, bytes).await?;
        info!(compressed = size, "Saved grid archive");
        timer.finish();
        Ok(())
    }
}

pub fn encode(grid: &ForecastGrid) -> EtlResult<Bytes> {
    let raw = bincode::serde::encode_to_vec(grid, bincode::config::standard())
        .map_err(|e| EtlError::Archive(format!("serialize: {}", e)))?;

    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 4), Compression::default());
    encoder
        .write_all(&raw)
        .map_err(|e| EtlError::Archive(format!("compress: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| EtlError::Archive(format!("compress: {}", e)))?;
    Ok(Bytes::from(compressed))
}

pub fn decode(bytes: &[u8]) -> EtlResult<ForecastGrid> {
    let mut raw = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut raw)
        .map_err(|e| EtlError::Archive(format!("decompress: {}", e)))?;

    let (grid, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map_err(|e| EtlError::Archive(format!("deserialize: {}", e)))?;
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use object_store::memory::InMemory;
    use w4h_common::{Field, GridCoords};

    fn grid() -> ForecastGrid {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 1, 0, 0).unwrap();
        let coords = GridCoords::new(vec![0.0], vec![10.0, 10.25], vec![t]).unwrap();
        ForecastGrid::new(coords)
            .with_field("utci", Field::new(vec![12.5, f32::NAN]))
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let storage = Arc::new(ObjectStorage::from_store(Arc::new(InMemory::new()), "data"));
        let archive = GridArchive::new(storage);

        assert!(archive.load().await.unwrap().is_none());
        archive.save(&grid()).await.unwrap();
        let loaded = archive.load().await.unwrap().unwrap();
        assert!(loaded.is_identical(&grid()));
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        assert!(matches!(decode(b"not gzip"), Err(EtlError::Archive(_))));
    }
}
