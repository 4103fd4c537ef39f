use async_trait::async_trait;

use super::error::StoryError;
use super::media::{self, NarrationSettings, VideoSettings};
use super::parser;
use super::scene::SceneDescriptor;
use crate::gemini::{GeminiClient, RetryPolicy};
use crate::progress::Progress;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-pro";

/// The generative backend a run talks to.
#[async_trait]
pub trait SceneStudio: Send + Sync {
    /// Split a script into ordered scenes.
    async fn parse_script(
        &self,
        script: &str,
        progress: &Progress,
    ) -> Result<Vec<SceneDescriptor>, StoryError>;

    /// Produce the video clip for one scene.
    async fn render_video(
        &self,
        scene: &SceneDescriptor,
        progress: &Progress,
    ) -> Result<Vec<u8>, StoryError>;

    /// Produce the narration (WAV) for one scene.
    async fn render_narration(
        &self,
        scene: &SceneDescriptor,
        progress: &Progress,
    ) -> Result<Vec<u8>, StoryError>;
}

/// Models and limits used by [`GeminiStudio`].
#[derive(Debug, Clone, PartialEq)]
pub struct StudioSettings {
    pub text_model: String,
    pub retry: RetryPolicy,
    pub video: VideoSettings,
    pub narration: NarrationSettings,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            retry: RetryPolicy::default(),
            video: VideoSettings::default(),
            narration: NarrationSettings::default(),
        }
    }
}

/// [`SceneStudio`] backed by the Gemini REST API.
pub struct GeminiStudio {
    client: GeminiClient,
    settings: StudioSettings,
}

impl GeminiStudio {
    pub fn new(client: GeminiClient, settings: StudioSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &StudioSettings {
        &self.settings
    }
}

#[async_trait]
impl SceneStudio for GeminiStudio {
    async fn parse_script(
        &self,
        script: &str,
        progress: &Progress,
    ) -> Result<Vec<SceneDescriptor>, StoryError> {
        parser::parse_script(
            &self.client,
            &self.settings.text_model,
            &self.settings.retry,
            progress,
            script,
        )
        .await
    }

    async fn render_video(
        &self,
        scene: &SceneDescriptor,
        progress: &Progress,
    ) -> Result<Vec<u8>, StoryError> {
        media::generate_video(
            &self.client,
            &self.settings.video,
            &self.settings.retry,
            progress,
            &scene.image_prompt,
        )
        .await
    }

    async fn render_narration(
        &self,
        scene: &SceneDescriptor,
        progress: &Progress,
    ) -> Result<Vec<u8>, StoryError> {
        media::generate_audio(
            &self.client,
            &self.settings.narration,
            &self.settings.retry,
            progress,
            &scene.caption_text,
        )
        .await
    }
}
