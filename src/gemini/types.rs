//! Request and response bodies for the Gemini REST API.

use serde::{Deserialize, Serialize};

/// Body of a `models/{model}:generateContent` call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// A single-turn request containing one text part.
    pub fn text(prompt: impl Into<String>, config: GenerationConfig) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part::text(prompt)],
            }],
            generation_config: Some(config),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

/// Binary payload carried inline as base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

impl GenerationConfig {
    /// Structured JSON output constrained by `schema`.
    pub fn json(schema: serde_json::Value) -> Self {
        Self {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(schema),
            ..Self::default()
        }
    }

    /// Audio output spoken with a prebuilt voice.
    pub fn speech(voice_name: impl Into<String>) -> Self {
        Self {
            response_modalities: Some(vec!["AUDIO".to_string()]),
            speech_config: Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice_name.into(),
                    },
                },
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    fn first_part(&self) -> Option<&Part> {
        self.candidates.first()?.content.as_ref()?.parts.first()
    }

    /// Text of the first part of the first candidate.
    pub fn first_text(&self) -> Option<&str> {
        self.first_part()?.text.as_deref()
    }

    /// Base64 inline data of the first part of the first candidate.
    pub fn first_inline_data(&self) -> Option<&str> {
        self.first_part()?
            .inline_data
            .as_ref()
            .map(|inline| inline.data.as_str())
    }
}

/// Body of a `models/{model}:predictLongRunning` video call.
#[derive(Debug, Serialize)]
pub struct VideoRequest {
    pub instances: Vec<VideoInstance>,
    pub parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
pub struct VideoInstance {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParameters {
    pub aspect_ratio: String,
    pub resolution: String,
    pub sample_count: u32,
}

/// A long-running operation as returned by submit and poll calls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub response: Option<OperationResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
    #[serde(default)]
    pub generated_videos: Vec<GeneratedSample>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    #[serde(default, alias = "generatedVideos")]
    pub generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratedSample {
    #[serde(default)]
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoRef {
    #[serde(default)]
    pub uri: Option<String>,
}

impl Operation {
    /// Download location of the first generated video, if any.
    pub fn video_uri(&self) -> Option<&str> {
        let response = self.response.as_ref()?;
        let samples = response
            .generate_video_response
            .as_ref()
            .map(|r| r.generated_samples.as_slice())
            .filter(|s| !s.is_empty())
            .unwrap_or(response.generated_videos.as_slice());
        samples
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
    }
}

/// Standard Google API error envelope.
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_request_serialization() {
        let request = GenerateContentRequest::text(
            "split this",
            GenerationConfig::json(serde_json::json!({"type": "ARRAY"})),
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "split this");
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(json["generationConfig"]["responseSchema"]["type"], "ARRAY");
        assert!(json["generationConfig"].get("speechConfig").is_none());
        assert!(json["contents"][0]["parts"][0].get("inlineData").is_none());
    }

    #[test]
    fn test_speech_request_serialization() {
        let request = GenerateContentRequest::text("Hello", GenerationConfig::speech("Puck"));
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            json["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Puck"
        );
    }

    #[test]
    fn test_video_request_serialization() {
        let request = VideoRequest {
            instances: vec![VideoInstance {
                prompt: "a rocket".to_string(),
            }],
            parameters: VideoParameters {
                aspect_ratio: "16:9".to_string(),
                resolution: "720p".to_string(),
                sample_count: 1,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["instances"][0]["prompt"], "a rocket");
        assert_eq!(json["parameters"]["aspectRatio"], "16:9");
        assert_eq!(json["parameters"]["resolution"], "720p");
        assert_eq!(json["parameters"]["sampleCount"], 1);
    }

    #[test]
    fn test_response_inline_data() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"inlineData":{"mimeType":"audio/L16;rate=24000","data":"AAEC"}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.first_inline_data(), Some("AAEC"));
        assert_eq!(response.first_text(), None);
    }

    #[test]
    fn test_response_without_candidates() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.first_text(), None);
        assert_eq!(response.first_inline_data(), None);
    }

    #[test]
    fn test_operation_pending() {
        let op: Operation = serde_json::from_str(r#"{"name":"models/veo/operations/abc"}"#).unwrap();
        assert!(!op.done);
        assert!(op.error.is_none());
        assert_eq!(op.video_uri(), None);
    }

    #[test]
    fn test_operation_rest_video_uri() {
        let op: Operation = serde_json::from_str(
            r#"{"name":"op","done":true,"response":{"generateVideoResponse":{"generatedSamples":[{"video":{"uri":"https://files/v1?alt=media"}}]}}}"#,
        )
        .unwrap();
        assert_eq!(op.video_uri(), Some("https://files/v1?alt=media"));
    }

    #[test]
    fn test_operation_sdk_style_video_uri() {
        let op: Operation = serde_json::from_str(
            r#"{"done":true,"response":{"generatedVideos":[{"video":{"uri":"https://files/v2"}}]}}"#,
        )
        .unwrap();
        assert_eq!(op.video_uri(), Some("https://files/v2"));
    }

    #[test]
    fn test_operation_done_without_samples() {
        let op: Operation = serde_json::from_str(
            r#"{"done":true,"response":{"generateVideoResponse":{"raiMediaFilteredCount":1}}}"#,
        )
        .unwrap();
        assert_eq!(op.video_uri(), None);
    }

    #[test]
    fn test_operation_error() {
        let op: Operation = serde_json::from_str(
            r#"{"done":true,"error":{"code":3,"message":"prompt rejected"}}"#,
        )
        .unwrap();
        let error = op.error.unwrap();
        assert_eq!(error.code, Some(3));
        assert_eq!(error.message, "prompt rejected");
    }
}
