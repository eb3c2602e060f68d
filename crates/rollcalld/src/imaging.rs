use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use async_trait::async_trait;
use rollcall_core::annotate::{annotate_jpeg, AnnotateError, ImageSink};
use rollcall_core::AcceptedMatch;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("reading label font {path}: {source}")]
    FontRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("label font {0} is not a usable TTF/OTF font")]
    FontInvalid(PathBuf),
    #[error("spawning imaging thread: {0}")]
    Spawn(std::io::Error),
}

/// Dimensions of a successfully decoded upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

/// Messages sent from HTTP handlers to the imaging thread.
enum ImagingRequest {
    Validate {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<ImageInfo, AnnotateError>>,
    },
    Annotate {
        image: Vec<u8>,
        matches: Vec<AcceptedMatch>,
        reply: oneshot::Sender<Result<(), AnnotateError>>,
    },
}

/// Clone-safe handle to the imaging thread.
#[derive(Clone)]
pub struct ImagingHandle {
    tx: mpsc::Sender<ImagingRequest>,
}

impl ImagingHandle {
    /// Decode `image` to prove it is a readable photo.
    pub async fn validate(&self, image: Vec<u8>) -> Result<ImageInfo, AnnotateError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ImagingRequest::Validate { image, reply: reply_tx })
            .await
            .map_err(|_| AnnotateError::WorkerGone)?;
        reply_rx.await.map_err(|_| AnnotateError::WorkerGone)?
    }
}

#[async_trait]
impl ImageSink for ImagingHandle {
    async fn store_annotated(&self, image: Vec<u8>, matches: Vec<AcceptedMatch>) -> Result<(), AnnotateError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ImagingRequest::Annotate {
                image,
                matches,
                reply: reply_tx,
            })
            .await
            .map_err(|_| AnnotateError::WorkerGone)?;
        reply_rx.await.map_err(|_| AnnotateError::WorkerGone)?
    }
}

/// Spawn the imaging worker on a dedicated OS thread.
///
/// Image decode and JPEG encode are CPU-bound, so they stay off the async
/// runtime. The label font is loaded up front; a bad font path fails startup.
pub fn spawn_imaging(output: PathBuf, font_path: Option<&Path>) -> Result<ImagingHandle, ImagingError> {
    let font = match font_path {
        Some(path) => {
            let bytes = std::fs::read(path).map_err(|source| ImagingError::FontRead {
                path: path.to_path_buf(),
                source,
            })?;
            let font = FontVec::try_from_vec(bytes).map_err(|_| ImagingError::FontInvalid(path.to_path_buf()))?;
            tracing::info!(path = %path.display(), "label font loaded");
            Some(font)
        }
        None => {
            tracing::info!("no label font configured; annotated photos carry boxes only");
            None
        }
    };

    let (tx, mut rx) = mpsc::channel::<ImagingRequest>(8);

    std::thread::Builder::new()
        .name("rollcall-imaging".into())
        .spawn(move || {
            tracing::info!(output = %output.display(), "imaging thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    ImagingRequest::Validate { image, reply } => {
                        let _ = reply.send(run_validate(&image));
                    }
                    ImagingRequest::Annotate { image, matches, reply } => {
                        let _ = reply.send(run_annotate(&image, &matches, font.as_ref(), &output));
                    }
                }
            }
            tracing::info!("imaging thread exiting");
        })
        .map_err(ImagingError::Spawn)?;

    Ok(ImagingHandle { tx })
}

fn run_validate(image: &[u8]) -> Result<ImageInfo, AnnotateError> {
    let decoded = image::load_from_memory(image)?;
    Ok(ImageInfo {
        width: decoded.width(),
        height: decoded.height(),
    })
}

/// Draw the matches and replace the single "last attendance photo" slot.
fn run_annotate(
    image: &[u8],
    matches: &[AcceptedMatch],
    font: Option<&FontVec>,
    output: &Path,
) -> Result<(), AnnotateError> {
    let jpeg = annotate_jpeg(image, matches, font)?;
    if let Some(dir) = output.parent() {
        std::fs::create_dir_all(dir)?;
    }
    // Write then rename so readers of the slot never see a partial file.
    let staging = output.with_extension("jpg.tmp");
    std::fs::write(&staging, &jpeg)?;
    std::fs::rename(&staging, output)?;
    tracing::debug!(matches = matches.len(), bytes = jpeg.len(), "annotated photo saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use rollcall_core::BoundingBox;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 130, 140]));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[tokio::test]
    async fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn_imaging(dir.path().join("last.jpg"), None).unwrap();

        let info = handle.validate(png(40, 30)).await.unwrap();
        assert_eq!(info, ImageInfo { width: 40, height: 30 });
        assert!(matches!(
            handle.validate(b"definitely not a photo".to_vec()).await,
            Err(AnnotateError::Image(_))
        ));
    }

    #[tokio::test]
    async fn test_store_annotated_overwrites_slot() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out/last_attendance.jpg");
        let handle = spawn_imaging(output.clone(), None).unwrap();

        let matches = vec![AcceptedMatch {
            roll_no: "R1".into(),
            bbox: BoundingBox { x: 2.0, y: 2.0, width: 10.0, height: 10.0 },
            distance: 0.2,
        }];
        handle.store_annotated(png(32, 32), matches).await.unwrap();
        handle.store_annotated(png(64, 48), Vec::new()).await.unwrap();

        let saved = image::open(&output).unwrap();
        assert_eq!((saved.width(), saved.height()), (64, 48));
        assert!(!output.with_extension("jpg.tmp").exists());
    }

    #[test]
    fn test_bad_font_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("font.ttf");
        std::fs::write(&font, b"not a font").unwrap();

        let missing = spawn_imaging(dir.path().join("a.jpg"), Some(&dir.path().join("nope.ttf")));
        assert!(matches!(missing, Err(ImagingError::FontRead { .. })));
        let invalid = spawn_imaging(dir.path().join("a.jpg"), Some(&font));
        assert!(matches!(invalid, Err(ImagingError::FontInvalid(_))));
    }
}
