//! Per-scene media generation: one video clip and one narration clip.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::error::StoryError;
use crate::gemini::types::{GenerateContentRequest, GenerationConfig, VideoParameters};
use crate::gemini::{call_with_retry, GeminiClient, RetryPolicy};
use crate::progress::{Progress, ProgressEvent};
use crate::wav;

pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const DEFAULT_SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Puck";

/// Video generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub model: String,
    pub resolution: String,
    pub aspect_ratio: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_VIDEO_MODEL.to_string(),
            resolution: "720p".to_string(),
            aspect_ratio: "16:9".to_string(),
            poll_interval: Duration::from_millis(5000),
            timeout: Duration::from_millis(300_000),
        }
    }
}

impl VideoSettings {
    fn parameters(&self) -> VideoParameters {
        VideoParameters {
            aspect_ratio: self.aspect_ratio.clone(),
            resolution: self.resolution.clone(),
            sample_count: 1,
        }
    }
}

/// Text-to-speech parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationSettings {
    pub model: String,
    pub voice: String,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_SPEECH_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }
}

/// Generate one video clip for `prompt` and return its bytes.
///
/// Submits a long-running job, then polls it every `poll_interval` until it
/// is done. Elapsed time is counted in poll intervals, so the timeout is hit
/// after `timeout / poll_interval` polls regardless of request latency.
pub async fn generate_video(
    client: &GeminiClient,
    settings: &VideoSettings,
    policy: &RetryPolicy,
    progress: &Progress,
    prompt: &str,
) -> Result<Vec<u8>, StoryError> {
    let parameters = settings.parameters();
    let mut operation = call_with_retry(policy, progress, || {
        client.submit_video(&settings.model, prompt, &parameters)
    })
    .await?;

    // Poll responses may omit the name; keep the one from the submit.
    let name = operation.name.clone();
    let mut elapsed = Duration::ZERO;
    while !operation.done {
        if elapsed >= settings.timeout {
            log::error!("Video operation {} timed out after {:?}", name, elapsed);
            return Err(StoryError::VideoTimeout {
                timeout: settings.timeout,
            });
        }

        tokio::time::sleep(settings.poll_interval).await;
        elapsed += settings.poll_interval;

        operation = call_with_retry(policy, progress, || client.get_operation(&name)).await?;
        log::debug!("Polled {} after {:?}: done={}", name, elapsed, operation.done);
        progress.emit(ProgressEvent::Polling { elapsed });

        if let Some(error) = &operation.error {
            return Err(StoryError::VideoGeneration(error.message.clone()));
        }
    }

    if let Some(error) = &operation.error {
        return Err(StoryError::VideoGeneration(error.message.clone()));
    }

    let uri = operation.video_uri().ok_or_else(|| {
        log::warn!("Video operation {} finished without a video", name);
        StoryError::VideoAssetMissing
    })?;

    let bytes = client.download(uri).await.map_err(StoryError::from_download)?;
    log::info!("Video ready ({} bytes)", bytes.len());
    Ok(bytes)
}

/// Speak `text` and return the narration as a WAV container.
pub async fn generate_audio(
    client: &GeminiClient,
    settings: &NarrationSettings,
    policy: &RetryPolicy,
    progress: &Progress,
    text: &str,
) -> Result<Vec<u8>, StoryError> {
    let request =
        GenerateContentRequest::text(text, GenerationConfig::speech(settings.voice.as_str()));
    let response = call_with_retry(policy, progress, || {
        client.generate_content(&settings.model, &request)
    })
    .await?;

    let encoded = response
        .first_inline_data()
        .ok_or_else(|| StoryError::AudioGeneration("no audio data received.".to_string()))?;
    let pcm = BASE64
        .decode(encoded)
        .map_err(|e| StoryError::AudioGeneration(format!("invalid audio payload: {}", e)))?;

    log::info!("Narration ready ({} bytes of PCM)", pcm.len());
    wav::narration_wav(&pcm)
        .map_err(|e| StoryError::AudioGeneration(format!("invalid audio payload: {}", e)))
}
