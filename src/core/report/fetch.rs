// Bounded concurrent snapshot download

use crate::core::evidence_store::{EvidenceStore, StorageError};
use printpdf::image_crate::{self, DynamicImage};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Why one snapshot could not be placed in the report
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("fetch task failed: {0}")]
    Task(String),
}

pub type FetchResult = Result<DynamicImage, FetchError>;

/// Download and decode every key, at most `max_in_flight` downloads at a time.
/// Decoding runs on the blocking pool once a download has finished.
///
/// The returned vector lines up with `keys`: slot `i` holds the outcome for
/// `keys[i]` whatever order the downloads finished in. A failure only affects
/// its own slot.
pub async fn fetch_all(
    store: Arc<dyn EvidenceStore>,
    keys: &[String],
    max_in_flight: usize,
) -> Vec<FetchResult> {
    let semaphore = Arc::new(Semaphore::new(max_in_flight.max(1)));

    let handles: Vec<_> = keys
        .iter()
        .cloned()
        .map(|key| {
            let store = store.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let bytes = {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| FetchError::Task(e.to_string()))?;
                    store.get(&key).await?
                };
                // Decoding is CPU-bound and must not stall the runtime workers
                tokio::task::spawn_blocking(move || decode_snapshot(&bytes))
                    .await
                    .map_err(|e| FetchError::Task(e.to_string()))?
            })
        })
        .collect();

    let mut slots = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(FetchError::Task(e.to_string())),
        };
        if let Err(e) = &outcome {
            tracing::warn!(index, key = %keys[index], error = %e, "snapshot fetch failed");
        }
        slots.push(outcome);
    }
    slots
}

/// Decode to 8-bit RGB in the PDF writer's image type.
/// Alpha channels are not embedded in the report.
pub fn decode_snapshot(bytes: &[u8]) -> FetchResult {
    let rgb = image::load_from_memory(bytes)
        .map_err(|e| FetchError::Decode(e.to_string()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    image_crate::RgbImage::from_raw(width, height, rgb.into_raw())
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| FetchError::Decode("pixel buffer size mismatch".to_string()))
}
