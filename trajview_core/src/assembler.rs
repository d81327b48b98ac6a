//! Animation assembly: ordered sample images → one looping GIF.
//!
//! The artifact only appears at its final path once encoding has fully
//! succeeded. Bytes go to a hidden sibling file first and are renamed into
//! place; on any failure the sibling is removed.

use crate::error::EncodingError;
use crate::summary::ArtifactInfo;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// NeuQuant sampling factor (1 = best quality, 30 = fastest).
const GIF_SPEED: i32 = 10;

/// A rendered image tagged with its schedule position.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub ordinal: usize,
    pub image: RgbaImage,
}

/// Collects images in schedule order and encodes them on [`finish`](Self::finish).
#[derive(Debug)]
pub struct AnimationAssembler {
    path: PathBuf,
    fps: f64,
    frames: Vec<RenderedFrame>,
    size: Option<(u32, u32)>,
}

impl AnimationAssembler {
    pub fn new(path: impl Into<PathBuf>, fps: f64) -> Result<Self, EncodingError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(EncodingError::InvalidFps(fps));
        }
        Ok(Self {
            path: path.into(),
            fps,
            frames: Vec::new(),
            size: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Per-frame delay in milliseconds (`1000 / fps`).
    pub fn frame_delay_ms(&self) -> u32 {
        (1000.0 / self.fps).round().max(1.0) as u32
    }

    /// Appends the next image. Ordinals must strictly increase and every
    /// image must match the first one's size.
    pub fn push(&mut self, frame: RenderedFrame) -> Result<(), EncodingError> {
        if let Some(previous) = self.frames.last() {
            if frame.ordinal <= previous.ordinal {
                return Err(EncodingError::OutOfOrder {
                    ordinal: frame.ordinal,
                    previous: previous.ordinal,
                });
            }
        }
        let dims = frame.image.dimensions();
        match self.size {
            None => self.size = Some(dims),
            Some((expected_width, expected_height)) if (expected_width, expected_height) != dims => {
                return Err(EncodingError::FrameSize {
                    ordinal: frame.ordinal,
                    width: dims.0,
                    height: dims.1,
                    expected_width,
                    expected_height,
                });
            }
            Some(_) => {}
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Encodes every pushed image into an infinitely looping GIF and moves
    /// it into place.
    pub fn finish(self) -> Result<ArtifactInfo, EncodingError> {
        if self.frames.is_empty() {
            return Err(EncodingError::NoFrames);
        }
        let frame_count = self.frames.len();
        let delay = Delay::from_numer_denom_ms(self.frame_delay_ms(), 1);

        let bytes = encode_gif(self.frames, delay)?;
        let size_bytes = write_atomically(&self.path, &bytes)?;
        info!(
            "Wrote {} ({} frames, {} bytes, {:.1} fps)",
            self.path.display(),
            frame_count,
            size_bytes,
            self.fps
        );
        Ok(ArtifactInfo {
            path: self.path,
            size_bytes,
            frame_count,
        })
    }
}

/// Convenience wrapper: pushes `frames` in order and finishes.
pub fn assemble(
    frames: impl IntoIterator<Item = RenderedFrame>,
    fps: f64,
    path: impl Into<PathBuf>,
) -> Result<ArtifactInfo, EncodingError> {
    let mut assembler = AnimationAssembler::new(path, fps)?;
    for frame in frames {
        assembler.push(frame)?;
    }
    assembler.finish()
}

fn encode_gif(frames: Vec<RenderedFrame>, delay: Delay) -> Result<Vec<u8>, EncodingError> {
    let mut bytes = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(&mut bytes, GIF_SPEED);
        encoder.set_repeat(Repeat::Infinite)?;
        for frame in frames {
            debug!("Encoding frame for sample {}", frame.ordinal);
            encoder.encode_frame(image::Frame::from_parts(frame.image, 0, 0, delay))?;
        }
    }
    Ok(bytes)
}

/// Writes `bytes` to a hidden sibling of `path`, then renames it over `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<u64, EncodingError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let temp = temp_sibling(path);
    let result = fs::write(&temp, bytes)
        .and_then(|_| fs::rename(&temp, path))
        .and_then(|_| fs::metadata(path))
        .map(|meta| meta.len());
    match result {
        Ok(size) => Ok(size),
        Err(err) => {
            if temp.exists() {
                if let Err(cleanup) = fs::remove_file(&temp) {
                    warn!("Could not remove {}: {}", temp.display(), cleanup);
                }
            }
            Err(err.into())
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "animation.gif".to_string());
    path.with_file_name(format!(".{}.partial", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgba};
    use std::io::Cursor;

    fn frame(ordinal: usize, shade: u8) -> RenderedFrame {
        RenderedFrame {
            ordinal,
            image: RgbaImage::from_pixel(16, 8, Rgba([shade, 0, 0, 255])),
        }
    }

    #[test]
    fn test_assembles_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sliding_scene.gif");
        let info = assemble(vec![frame(0, 10), frame(1, 120), frame(3, 250)], 4.0, &path).unwrap();

        assert_eq!(info.frame_count, 3);
        assert_eq!(info.path, path);
        assert!(info.size_bytes > 0);
        assert!(!temp_sibling(&path).exists());

        let bytes = fs::read(&path).unwrap();
        let decoder = GifDecoder::new(Cursor::new(bytes)).unwrap();
        let frames = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].delay().numer_denom_ms(), (250, 1));
        let reds: Vec<u8> = frames.iter().map(|f| f.buffer().get_pixel(0, 0).0[0]).collect();
        assert!(reds[0] < reds[1] && reds[1] < reds[2]);
    }

    #[test]
    fn test_zero_frames_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.gif");
        assert!(matches!(assemble(Vec::new(), 4.0, &path), Err(EncodingError::NoFrames)));
        assert!(!path.exists());
    }

    #[test]
    fn test_rejects_out_of_order_and_mismatched_frames() {
        let mut assembler = AnimationAssembler::new("unused.gif", 4.0).unwrap();
        assembler.push(frame(2, 0)).unwrap();
        assert!(matches!(
            assembler.push(frame(1, 0)),
            Err(EncodingError::OutOfOrder { ordinal: 1, previous: 2 })
        ));
        let wrong_size = RenderedFrame {
            ordinal: 3,
            image: RgbaImage::new(4, 4),
        };
        assert!(matches!(assembler.push(wrong_size), Err(EncodingError::FrameSize { .. })));
        assert_eq!(assembler.len(), 1);
    }

    #[test]
    fn test_invalid_fps() {
        assert!(matches!(AnimationAssembler::new("x.gif", 0.0), Err(EncodingError::InvalidFps(_))));
    }

    #[test]
    fn test_unwritable_destination_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        // A directory already occupies the artifact path, so the rename fails
        let path = dir.path().join("taken.gif");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        let result = assemble(vec![frame(0, 1)], 2.0, &path);
        assert!(matches!(result, Err(EncodingError::Io(_))));
        assert!(!temp_sibling(&path).exists());
    }
}
