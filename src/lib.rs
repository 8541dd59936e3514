#![forbid(unsafe_code)]

pub mod blink;
pub mod bridge;
pub mod encode;
pub mod error;
pub mod export;
pub mod model;
pub mod presets;

pub use blink::{expand_step, pattern_frames, reduce_frame_density, single_blink};
pub use bridge::{
    ContextKind, ENCODE_TIMEOUT, EncodeContext, InlineContext, WorkerContext, WorkerMessage,
    WorkerRequest, create_context,
};
pub use encode::{
    AnimationEncoder, ApngEncoder, CancelFlag, DEFAULT_MAX_ATTEMPTS, DEFAULT_TARGET_SIZE_MB,
    EncodeOutcome, EncodeRequest, encode_with_budget, initial_color_count,
};
pub use error::{MabatakiError, MabatakiResult};
pub use export::{
    BlinkImages, ExportOptions, ExportResult, MAX_MEMORY_MB, estimate_size_mb, export_animation,
    export_with_encoder,
};
pub use model::{BlinkSettings, EyeState, Frame, LoopPattern, LoopStep, StepId, StepSpec};
pub use presets::{DEFAULT_PRESET_ID, EmotionPreset, PresetCategory, find_preset, presets};
