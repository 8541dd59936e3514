//! Raster-animation encoding: the black-box encoding primitive and the
//! size-targeting loop that drives it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{MabatakiError, MabatakiResult};

pub const DEFAULT_TARGET_SIZE_MB: f64 = 5.0;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Halving stops once the palette is at or below this floor.
const COLOR_FLOOR: u32 = 32;
const COLOR_MIN: u32 = 16;
const COLOR_MAX: u32 = 256;

/// Encoding occupies the 60..=95 window of the overall export progress scale.
pub(crate) const PROGRESS_ENCODE_START: f64 = 60.0;
pub(crate) const PROGRESS_ENCODE_END: f64 = 95.0;

/// Encode request exchanged with the execution context. The pixel buffers
/// are owned: handing the request to a context is a move, and the buffers
/// are gone from the caller afterwards.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeRequest {
    pub buffers: Vec<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "delays")]
    pub delays_ms: Vec<u32>,
    pub initial_color_count: u32,
    #[serde(rename = "targetSizeMB")]
    pub target_size_mb: f64,
    pub max_attempts: u32,
}

/// Best encoded buffer found within the attempt budget.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeOutcome {
    #[serde(rename = "buffer")]
    pub bytes: Vec<u8>,
    #[serde(rename = "sizeMB")]
    pub size_mb: f64,
    pub attempts: u32,
    #[serde(rename = "finalColorCount")]
    pub color_count: u32,
}

/// The external encoding primitive: raw RGBA frame buffers, a palette size
/// and per-frame delays in, one encoded byte buffer out. Deterministic for
/// fixed inputs; may fail on allocation.
pub trait AnimationEncoder: Send + Sync {
    fn encode(
        &self,
        buffers: &[Vec<u8>],
        width: u32,
        height: u32,
        color_count: u32,
        delays_ms: &[u32],
    ) -> MabatakiResult<Vec<u8>>;
}

/// Cooperative cancellation shared between a bridge and a running encode
/// loop; checked between trials only, since trials are indivisible.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Initial palette size derived from the user-facing quality (30..=100) and
/// compression level (1..=10) settings.
pub fn initial_color_count(quality: u32, compression_level: u32) -> u32 {
    let quality_factor = (quality as f64 / 100.0).max(0.3);
    let compression_factor = (1.0 - compression_level.saturating_sub(1) as f64 * 0.05).max(0.35);
    let count = (256.0 * quality_factor * compression_factor).round() as u32;
    count.clamp(COLOR_MIN, COLOR_MAX)
}

/// Drive the encoding primitive through sequential trials until the size
/// budget is met, the palette floor is reached, or the attempt budget runs
/// out. The best (smallest) result is kept across all trials; missing the
/// budget is not an error.
pub fn encode_with_budget(
    encoder: &dyn AnimationEncoder,
    request: &EncodeRequest,
    cancel: &CancelFlag,
    on_progress: &mut dyn FnMut(f64, Option<&str>),
) -> MabatakiResult<EncodeOutcome> {
    if request.buffers.is_empty() {
        return Err(MabatakiError::encode("no image buffers provided"));
    }
    if request.max_attempts == 0 {
        return Err(MabatakiError::validation("max_attempts must be >= 1"));
    }

    let span = PROGRESS_ENCODE_END - PROGRESS_ENCODE_START;
    let mut color_count = request.initial_color_count.clamp(COLOR_MIN, COLOR_MAX);
    let mut best: Option<(Vec<u8>, f64, u32)> = None;
    let mut attempts = 0u32;

    for attempt in 0..request.max_attempts {
        if cancel.is_cancelled() {
            return Err(MabatakiError::bridge("encode cancelled"));
        }
        attempts = attempt + 1;

        let value = PROGRESS_ENCODE_START + (attempt as f64 / request.max_attempts as f64) * span;
        let note = format!(
            "encoding (attempt {attempts}/{}, {color_count} colors)",
            request.max_attempts
        );
        on_progress(value, Some(&note));

        let bytes = encoder
            .encode(
                &request.buffers,
                request.width,
                request.height,
                color_count,
                &request.delays_ms,
            )
            .map_err(|err| {
                classify_encode_error(err, request.buffers.len(), request.width, request.height)
            })?;
        let size_mb = bytes.len() as f64 / (1024.0 * 1024.0);
        tracing::debug!(attempt = attempts, color_count, size_mb, "encode attempt");

        let improved = best.as_ref().is_none_or(|(_, best_size, _)| size_mb < *best_size);
        if improved {
            best = Some((bytes, size_mb, color_count));
        }

        if size_mb <= request.target_size_mb {
            break;
        }
        if color_count > COLOR_FLOOR {
            color_count = (color_count / 2).max(COLOR_MIN);
            continue;
        }
        // The palette cannot shrink further.
        break;
    }

    let (bytes, size_mb, color_count) = best
        .ok_or_else(|| MabatakiError::encode("animation encoding produced no result"))?;
    Ok(EncodeOutcome {
        bytes,
        size_mb,
        attempts,
        color_count,
    })
}

/// Allocation-pattern failures get remediation steps and an estimated
/// memory figure; everything else surfaces the raw message.
fn classify_encode_error(
    err: MabatakiError,
    frame_count: usize,
    width: u32,
    height: u32,
) -> MabatakiError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("alloc") || lower.contains("memory") || lower.contains("oom") {
        let estimated_mb =
            frame_count as f64 * width as f64 * height as f64 * 4.0 / (1024.0 * 1024.0);
        MabatakiError::encode(format!(
            "not enough memory to encode the animation\n\
             try one of:\n\
             1. shrink the source images (currently {width}x{height}px)\n\
             2. shorten the animation\n\
             3. lower the frame rate\n\
             estimated memory required: about {estimated_mb:.0}MB"
        ))
    } else {
        err
    }
}

/// Default [`AnimationEncoder`]: palette-quantized APNG. NeuQuant learns a
/// palette from a subsample of all frames, every frame is indexed against
/// it, and the result is written as an animated PNG with per-frame delays.
#[derive(Clone, Debug)]
pub struct ApngEncoder {
    /// NeuQuant sampling factor (1 = exhaustive, 30 = fastest).
    pub sample_factor: i32,
}

impl Default for ApngEncoder {
    fn default() -> Self {
        Self { sample_factor: 10 }
    }
}

/// Cap on the pixels fed to palette training; frames are stride-sampled
/// down to this budget.
const MAX_TRAIN_PIXELS: usize = 1 << 16;

impl ApngEncoder {
    fn training_samples(buffers: &[Vec<u8>], width: u32, height: u32) -> Vec<u8> {
        let total_pixels = buffers.len() * (width as usize) * (height as usize);
        let stride = (total_pixels / MAX_TRAIN_PIXELS).max(1);
        let mut samples = Vec::with_capacity(total_pixels.div_ceil(stride) * 4);
        for buffer in buffers {
            for pixel in buffer.chunks_exact(4).step_by(stride) {
                samples.extend_from_slice(pixel);
            }
        }
        samples
    }
}

impl AnimationEncoder for ApngEncoder {
    fn encode(
        &self,
        buffers: &[Vec<u8>],
        width: u32,
        height: u32,
        color_count: u32,
        delays_ms: &[u32],
    ) -> MabatakiResult<Vec<u8>> {
        if buffers.is_empty() {
            return Err(MabatakiError::encode("no image buffers provided"));
        }
        if delays_ms.len() != buffers.len() {
            return Err(MabatakiError::encode(
                "delay count does not match frame count",
            ));
        }
        let expected = width as usize * height as usize * 4;
        if expected == 0 {
            return Err(MabatakiError::encode("frame dimensions must be non-zero"));
        }
        for (index, buffer) in buffers.iter().enumerate() {
            if buffer.len() != expected {
                return Err(MabatakiError::encode(format!(
                    "frame {index} has {} bytes, expected {expected} (RGBA {width}x{height})",
                    buffer.len()
                )));
            }
        }

        let colors = color_count.clamp(COLOR_MIN, COLOR_MAX) as usize;
        let samples = Self::training_samples(buffers, width, height);
        let quantizer = color_quant::NeuQuant::new(self.sample_factor, colors, &samples);

        let palette_rgba = quantizer.color_map_rgba();
        let mut plte = Vec::with_capacity(palette_rgba.len() / 4 * 3);
        let mut trns = Vec::with_capacity(palette_rgba.len() / 4);
        for entry in palette_rgba.chunks_exact(4) {
            plte.extend_from_slice(&entry[..3]);
            trns.push(entry[3]);
        }

        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(plte);
        encoder.set_trns(trns);
        encoder
            .set_animated(buffers.len() as u32, 0)
            .map_err(|e| MabatakiError::encode(format!("animation header: {e}")))?;

        let mut writer = encoder
            .write_header()
            .map_err(|e| MabatakiError::encode(format!("png header: {e}")))?;

        let mut indexed = vec![0u8; width as usize * height as usize];
        for (buffer, &delay_ms) in buffers.iter().zip(delays_ms) {
            for (slot, pixel) in indexed.iter_mut().zip(buffer.chunks_exact(4)) {
                *slot = quantizer.index_of(pixel) as u8;
            }
            let numerator = delay_ms.clamp(1, u16::MAX as u32) as u16;
            writer
                .set_frame_delay(numerator, 1000)
                .map_err(|e| MabatakiError::encode(format!("frame delay: {e}")))?;
            writer
                .write_image_data(&indexed)
                .map_err(|e| MabatakiError::encode(format!("frame data: {e}")))?;
        }

        writer
            .finish()
            .map_err(|e| MabatakiError::encode(format!("png finish: {e}")))?;
        Ok(out)
    }
}
