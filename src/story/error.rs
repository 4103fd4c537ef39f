use std::time::Duration;

use crate::gemini::GeminiError;
use crate::store::StoreError;

/// Shown when the text model's answer cannot be read as a scene list.
pub const MALFORMED_SCENES_MESSAGE: &str =
    "The AI failed to structure the story into scenes. Please try a different script.";

/// Shown when the script yields no scenes at all.
pub const NO_SCENES_MESSAGE: &str = "Could not parse the script into scenes. Please try rephrasing.";

/// Errors raised while turning a script into scene media.
#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("{0}")]
    SceneParse(String),

    #[error("Video generation timed out after {} seconds.", .timeout.as_secs())]
    VideoTimeout { timeout: Duration },

    #[error("Video generation operation failed: {0}")]
    VideoGeneration(String),

    #[error(
        "Video generation may have succeeded, but no download link was provided. \
         This can happen if the prompt is rejected by a safety filter."
    )]
    VideoAssetMissing,

    #[error("Failed to download video. Status: {status} {reason}. Details: {body}")]
    VideoDownload {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Audio generation failed: {0}")]
    AudioGeneration(String),

    #[error("Failed to stage scene media: {0}")]
    Staging(#[from] std::io::Error),

    #[error(transparent)]
    Gemini(#[from] GeminiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StoryError {
    /// Map a download failure from the wire layer, keeping other failures as-is.
    pub(crate) fn from_download(error: GeminiError) -> Self {
        match error {
            GeminiError::Download {
                status,
                reason,
                body,
            } => StoryError::VideoDownload {
                status,
                reason,
                body,
            },
            other => StoryError::Gemini(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinct_from_provider_error() {
        let timeout = StoryError::VideoTimeout {
            timeout: Duration::from_millis(300_000),
        };
        assert_eq!(
            timeout.to_string(),
            "Video generation timed out after 300 seconds."
        );
        let provider = StoryError::VideoGeneration("prompt rejected".to_string());
        assert_eq!(
            provider.to_string(),
            "Video generation operation failed: prompt rejected"
        );
    }

    #[test]
    fn test_asset_missing_mentions_safety_filter() {
        assert!(StoryError::VideoAssetMissing
            .to_string()
            .contains("safety filter"));
    }

    #[test]
    fn test_from_download_keeps_status_and_body() {
        let error = StoryError::from_download(GeminiError::Download {
            status: 404,
            reason: "Not Found".to_string(),
            body: "gone".to_string(),
        });
        assert!(matches!(error, StoryError::VideoDownload { status: 404, .. }));
        assert!(error.to_string().contains("gone"));

        let other = StoryError::from_download(GeminiError::Decode("x".to_string()));
        assert!(matches!(other, StoryError::Gemini(_)));
    }
}
