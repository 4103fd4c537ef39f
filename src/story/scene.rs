use serde::{Deserialize, Serialize};

/// One narrative beat as split out of the script by the text model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDescriptor {
    /// Visual prompt for the video model.
    pub image_prompt: String,
    /// Verbatim excerpt of the script, narrated and shown as caption.
    pub caption_text: String,
}

/// Generated media for one scene.
#[derive(Clone, PartialEq, Eq)]
pub struct SceneAsset {
    pub video: Vec<u8>,
    /// Narration as a self-contained WAV container.
    pub audio: Vec<u8>,
    pub caption: String,
}

impl std::fmt::Debug for SceneAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneAsset")
            .field("video", &format_args!("{} bytes", self.video.len()))
            .field("audio", &format_args!("{} bytes", self.audio.len()))
            .field("caption", &self.caption)
            .finish()
    }
}

/// Label used for per-scene progress and error attribution (1-based).
pub fn scene_label(index: usize, total: usize) -> String {
    format!("scene {}/{}", index + 1, total)
}
