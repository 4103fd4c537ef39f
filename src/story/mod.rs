//! Story generation: script parsing, per-scene media and the run loop.

pub mod diagnostics;
mod error;
pub mod media;
pub mod orchestrator;
pub mod parser;
mod scene;
mod studio;

pub use error::{StoryError, MALFORMED_SCENES_MESSAGE, NO_SCENES_MESSAGE};
pub use media::{NarrationSettings, VideoSettings};
pub use orchestrator::{Orchestrator, RunError, RunState};
pub use scene::{scene_label, SceneAsset, SceneDescriptor};
pub use studio::{GeminiStudio, SceneStudio, StudioSettings, DEFAULT_TEXT_MODEL};
