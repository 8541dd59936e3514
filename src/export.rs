//! End-to-end export: source images + pattern + settings in, one
//! size-budgeted APNG byte buffer out.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use image::RgbaImage;
use image::imageops::FilterType;

use crate::blink::{pattern_frames, reduce_frame_density};
use crate::bridge::{ContextKind, create_context};
use crate::encode::{
    AnimationEncoder, ApngEncoder, DEFAULT_MAX_ATTEMPTS, DEFAULT_TARGET_SIZE_MB, EncodeOutcome,
    EncodeRequest, initial_color_count,
};
use crate::error::{MabatakiError, MabatakiResult};
use crate::model::{BlinkSettings, EyeState, Frame, LoopPattern};

/// Ceiling on the raw pixel memory materialized for one export.
pub const MAX_MEMORY_MB: usize = 800;

/// Density reduction never shrinks a sequence below this many frames; a
/// sequence that still exceeds the ceiling here is a capacity error.
const MIN_FRAMES_AFTER_REDUCTION: usize = 10;

/// The three eye states as normalized RGBA images of identical dimensions.
#[derive(Clone, Debug)]
pub struct BlinkImages {
    open: RgbaImage,
    half: RgbaImage,
    closed: RgbaImage,
}

impl BlinkImages {
    /// Three-image mode. The open image fixes the output dimensions; the
    /// other two are resized to match when they differ.
    pub fn new(open: RgbaImage, half: RgbaImage, closed: RgbaImage) -> MabatakiResult<Self> {
        if open.width() == 0 || open.height() == 0 {
            return Err(MabatakiError::validation(
                "the open-eye image must have non-zero dimensions",
            ));
        }
        let (width, height) = open.dimensions();
        Ok(Self {
            half: conform(half, width, height),
            closed: conform(closed, width, height),
            open,
        })
    }

    /// Two-image mode: no half-open art, the closed image stands in for the
    /// half state.
    pub fn two(open: RgbaImage, closed: RgbaImage) -> MabatakiResult<Self> {
        let half = closed.clone();
        Self::new(open, half, closed)
    }

    pub fn from_paths(
        open: &Path,
        half: Option<&Path>,
        closed: &Path,
    ) -> MabatakiResult<Self> {
        let open = load_rgba(open)?;
        let closed = load_rgba(closed)?;
        match half {
            Some(path) => Self::new(open, load_rgba(path)?, closed),
            None => Self::two(open, closed),
        }
    }

    pub fn width(&self) -> u32 {
        self.open.width()
    }

    pub fn height(&self) -> u32 {
        self.open.height()
    }

    fn image_for(&self, state: EyeState) -> &RgbaImage {
        match state {
            EyeState::Open => &self.open,
            EyeState::Half => &self.half,
            EyeState::Closed => &self.closed,
        }
    }
}

fn load_rgba(path: &Path) -> MabatakiResult<RgbaImage> {
    let image = image::open(path).map_err(|e| {
        MabatakiError::validation(format!("failed to load image '{}': {e}", path.display()))
    })?;
    Ok(image.to_rgba8())
}

fn conform(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        image
    } else {
        image::imageops::resize(&image, width, height, FilterType::Triangle)
    }
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Image quality slider, 1..=100.
    pub quality: u32,
    /// Compression level slider, 1..=10.
    pub compression_level: u32,
    pub target_size_mb: f64,
    pub max_attempts: u32,
    pub context: ContextKind,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            quality: 85,
            compression_level: 5,
            target_size_mb: DEFAULT_TARGET_SIZE_MB,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            context: ContextKind::Worker,
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> MabatakiResult<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(MabatakiError::validation("quality must be in 1..=100"));
        }
        if !(1..=10).contains(&self.compression_level) {
            return Err(MabatakiError::validation(
                "compression_level must be in 1..=10",
            ));
        }
        if !(self.target_size_mb.is_finite() && self.target_size_mb > 0.0) {
            return Err(MabatakiError::validation("target_size_mb must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(MabatakiError::validation("max_attempts must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ExportResult {
    pub outcome: EncodeOutcome,
    /// The best result still exceeds the size target; the caller decides how
    /// to warn.
    pub oversize: bool,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
}

/// Export with the default APNG encoder.
pub fn export_animation(
    images: &BlinkImages,
    pattern: &LoopPattern,
    settings: &BlinkSettings,
    options: &ExportOptions,
    on_progress: &mut dyn FnMut(f64, Option<&str>),
) -> MabatakiResult<ExportResult> {
    export_with_encoder(
        images,
        pattern,
        settings,
        options,
        Arc::new(ApngEncoder::default()),
        on_progress,
    )
}

/// Export with an injected encoding primitive.
#[tracing::instrument(skip_all, fields(fps = settings.fps, length = settings.animation_length))]
pub fn export_with_encoder(
    images: &BlinkImages,
    pattern: &LoopPattern,
    settings: &BlinkSettings,
    options: &ExportOptions,
    encoder: Arc<dyn AnimationEncoder>,
    on_progress: &mut dyn FnMut(f64, Option<&str>),
) -> MabatakiResult<ExportResult> {
    pattern.validate()?;
    settings.validate()?;
    options.validate()?;

    on_progress(5.0, Some("generating frame plan"));
    let frames = pattern_frames(pattern, settings);
    if frames.is_empty() {
        return Err(MabatakiError::validation(
            "frame generation produced no frames; increase the animation length",
        ));
    }

    let (width, height) = (images.width(), images.height());
    let frames = fit_frames_to_memory(frames, width, height, MAX_MEMORY_MB, settings)?;
    let frame_count = frames.len();
    tracing::debug!(frame_count, width, height, "frame plan ready");

    on_progress(20.0, Some("materializing pixel buffers"));
    let (buffers, delays_ms) = materialize_buffers(images, &frames, on_progress);

    on_progress(55.0, Some("handing off to the encoder"));
    let request = EncodeRequest {
        buffers,
        width,
        height,
        delays_ms,
        initial_color_count: initial_color_count(options.quality, options.compression_level),
        target_size_mb: options.target_size_mb,
        max_attempts: options.max_attempts,
    };

    let context = create_context(options.context, encoder);
    let outcome = context.encode(request, on_progress)?;
    on_progress(95.0, None);

    let oversize = outcome.size_mb > options.target_size_mb;
    on_progress(100.0, Some("done"));
    Ok(ExportResult {
        oversize,
        frame_count,
        width,
        height,
        outcome,
    })
}

/// Apply density reduction until the sequence fits under the memory ceiling
/// or hits the frame floor; still over afterwards is fatal.
fn fit_frames_to_memory(
    mut frames: Vec<Frame>,
    width: u32,
    height: u32,
    max_memory_mb: usize,
    settings: &BlinkSettings,
) -> MabatakiResult<Vec<Frame>> {
    let bytes_per_frame = width as usize * height as usize * 4;
    let max_frames = (max_memory_mb * 1024 * 1024) / bytes_per_frame;

    while frames.len() > max_frames && frames.len() > MIN_FRAMES_AFTER_REDUCTION {
        frames = reduce_frame_density(&frames);
        tracing::debug!(frames = frames.len(), "reduced frame density");
    }
    if frames.len() > max_frames {
        return Err(MabatakiError::capacity(format!(
            "the animation does not fit in memory at {width}x{height}px with {} frames; \
             shrink the source images or set the animation length to {}s or less",
            frames.len(),
            (settings.animation_length / 2.0).floor()
        )));
    }
    Ok(frames)
}

/// Clone the matching source image into one owned buffer per frame and round
/// frame durations to whole-millisecond delays (at least 1 ms).
fn materialize_buffers(
    images: &BlinkImages,
    frames: &[Frame],
    on_progress: &mut dyn FnMut(f64, Option<&str>),
) -> (Vec<Vec<u8>>, Vec<u32>) {
    let mut buffers = Vec::with_capacity(frames.len());
    let mut delays_ms = Vec::with_capacity(frames.len());
    for (index, frame) in frames.iter().enumerate() {
        buffers.push(images.image_for(frame.state).as_raw().clone());
        delays_ms.push((frame.duration_ms.round().max(1.0)) as u32);
        on_progress(
            30.0 + (index as f64 / frames.len() as f64) * 25.0,
            None,
        );
        // Yield periodically so a host UI sharing this thread can repaint.
        if index % 3 == 0 {
            thread::yield_now();
        }
    }
    (buffers, delays_ms)
}

/// Rough size estimate before any encoding happens, for pre-export hints.
pub fn estimate_size_mb(
    width: u32,
    height: u32,
    frame_count: usize,
    quality: u32,
    compression_level: u32,
) -> f64 {
    let total_pixels = width as f64 * height as f64 * frame_count as f64;
    let quality_factor = quality as f64 / 100.0;
    let compression_factor = compression_level as f64 / 10.0;
    // Typical PNG compression lands at 20..50% of raw, content dependent.
    let ratio = 0.15 + quality_factor * 0.25 - compression_factor * 0.08;
    let frame_data = total_pixels * 4.0 * ratio;
    let overhead = 2048.0 + frame_count as f64 * 150.0;
    (frame_data + overhead) / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MabatakiResult;
    use crate::model::StepSpec;
    use image::Rgba;

    struct CountingEncoder;

    impl AnimationEncoder for CountingEncoder {
        fn encode(
            &self,
            buffers: &[Vec<u8>],
            _width: u32,
            _height: u32,
            _color_count: u32,
            _delays_ms: &[u32],
        ) -> MabatakiResult<Vec<u8>> {
            // Tiny deterministic payload so the first attempt meets any
            // sensible target.
            Ok(vec![buffers.len() as u8; 128])
        }
    }

    fn images(width: u32, height: u32) -> BlinkImages {
        BlinkImages::new(
            RgbaImage::from_pixel(width, height, Rgba([250, 240, 230, 255])),
            RgbaImage::from_pixel(width, height, Rgba([160, 150, 140, 255])),
            RgbaImage::from_pixel(width, height, Rgba([20, 20, 20, 255])),
        )
        .unwrap()
    }

    fn neutral_pattern() -> LoopPattern {
        LoopPattern::from_specs(&[StepSpec {
            blink_count: 1,
            blink_speed: 0.15,
            blink_interval: 0.2,
            pause_duration: 3.0,
            closed_hold: 0.0,
        }])
        .unwrap()
    }

    fn frames_of(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|_| Frame {
                state: EyeState::Open,
                duration_ms: 1000.0 / 24.0,
            })
            .collect()
    }

    #[test]
    fn export_runs_end_to_end_with_ordered_progress() {
        let mut values = Vec::new();
        let result = export_with_encoder(
            &images(4, 4),
            &neutral_pattern(),
            &BlinkSettings {
                fps: 12,
                animation_length: 4.0,
            },
            &ExportOptions::default(),
            Arc::new(CountingEncoder),
            &mut |v, _| values.push(v),
        )
        .unwrap();

        assert!(result.frame_count > 0);
        assert!(!result.oversize);
        assert_eq!(result.width, 4);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*values.last().unwrap(), 100.0);
    }

    #[test]
    fn export_rejects_an_empty_frame_plan() {
        let err = export_with_encoder(
            &images(4, 4),
            &neutral_pattern(),
            &BlinkSettings {
                fps: 12,
                animation_length: 0.0,
            },
            &ExportOptions::default(),
            Arc::new(CountingEncoder),
            &mut |_, _| {},
        )
        .unwrap_err();
        assert!(matches!(err, MabatakiError::Validation(_)));
    }

    #[test]
    fn memory_ceiling_halves_frames_until_they_fit() {
        // 2000 frames at 512x512 RGBA is ~2.1GB against an 800MB ceiling:
        // two reductions land at 500 frames (~500MB).
        let before = frames_of(2000);
        let total_ms: f64 = before.iter().map(|f| f.duration_ms).sum();
        let after = fit_frames_to_memory(
            before,
            512,
            512,
            800,
            &BlinkSettings::default(),
        )
        .unwrap();
        assert_eq!(after.len(), 500);
        let after_ms: f64 = after.iter().map(|f| f.duration_ms).sum();
        assert!((after_ms - total_ms).abs() < 1e-6);
    }

    #[test]
    fn memory_ceiling_failure_is_a_capacity_error() {
        // 256MB per frame allows only 3 frames; reduction stops at the
        // 10-frame floor, still over the ceiling.
        let err = fit_frames_to_memory(
            frames_of(2000),
            8192,
            8192,
            800,
            &BlinkSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MabatakiError::Capacity(_)));
        assert!(err.to_string().contains("8192x8192px"));
    }

    #[test]
    fn two_image_mode_substitutes_the_closed_art() {
        let open = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]));
        let closed = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let images = BlinkImages::two(open, closed).unwrap();
        assert_eq!(
            images.image_for(EyeState::Half).as_raw(),
            images.image_for(EyeState::Closed).as_raw()
        );
    }

    #[test]
    fn mismatched_dimensions_are_conformed_to_the_open_image() {
        let open = RgbaImage::from_pixel(8, 6, Rgba([255, 255, 255, 255]));
        let half = RgbaImage::from_pixel(4, 4, Rgba([128, 128, 128, 255]));
        let closed = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 255]));
        let images = BlinkImages::new(open, half, closed).unwrap();
        assert_eq!(images.image_for(EyeState::Half).dimensions(), (8, 6));
        assert_eq!(images.image_for(EyeState::Closed).dimensions(), (8, 6));
    }

    #[test]
    fn delays_round_to_whole_milliseconds_with_a_floor_of_one() {
        let images = images(2, 2);
        let frames = vec![
            Frame {
                state: EyeState::Open,
                duration_ms: 41.666,
            },
            Frame {
                state: EyeState::Closed,
                duration_ms: 0.2,
            },
        ];
        let (buffers, delays) = materialize_buffers(&images, &frames, &mut |_, _| {});
        assert_eq!(buffers.len(), 2);
        assert_eq!(delays, vec![42, 1]);
    }

    #[test]
    fn estimate_tracks_frame_count_and_quality() {
        let small = estimate_size_mb(512, 512, 100, 85, 5);
        let more_frames = estimate_size_mb(512, 512, 200, 85, 5);
        let lower_quality = estimate_size_mb(512, 512, 100, 40, 5);
        assert!(more_frames > small);
        assert!(lower_quality < small);
    }
}
