//! Script → scene list, via one structured-output call to the text model.

use serde_json::json;

use super::error::{StoryError, MALFORMED_SCENES_MESSAGE, NO_SCENES_MESSAGE};
use super::scene::SceneDescriptor;
use crate::gemini::types::{GenerateContentRequest, GenerationConfig};
use crate::gemini::{call_with_retry, GeminiClient, RetryPolicy};
use crate::progress::Progress;

const INSTRUCTIONS: &str = r#"Parse the following script into distinct scenes. Each scene corresponds to a single continuous action. For each scene, create a highly descriptive and vivid visual prompt suitable for a cinematic AI video generator. The prompt should be detailed, specifying style, lighting, and composition where possible (e.g., 'cinematic shot', 'golden hour lighting', 'wide angle'). Also, extract the original text for the scene to be used as a caption. Ensure the caption text is verbatim. Return a JSON array of objects with 'image_prompt' and 'caption_text' keys.

Example:
Script: "The rocket stood on the launchpad, steaming in the cold morning air. With a final countdown, it roared to life, ascending into the bright blue sky."
Output: [
    {"image_prompt": "Cinematic wide shot of a tall, futuristic rocket on a launchpad at dawn. The air is cold, with steam billowing dramatically around its base. The lighting is soft, early morning light.", "caption_text": "The rocket stood on the launchpad, steaming in the cold morning air."},
    {"image_prompt": "Dynamic, low-angle shot of the powerful rocket ascending rapidly into a clear, bright blue sky, leaving a thick trail of white smoke. Lens flare from the sun.", "caption_text": "With a final countdown, it roared to life, ascending into the bright blue sky."}
]

Now, parse this script:"#;

/// Full prompt sent to the text model for `script`.
pub fn build_prompt(script: &str) -> String {
    format!("{}\n\"{}\"", INSTRUCTIONS, script)
}

/// Response schema: an array of `{image_prompt, caption_text}` objects.
pub fn scene_schema() -> serde_json::Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "image_prompt": {
                    "type": "STRING",
                    "description": "A concise, visually descriptive prompt for an AI video generator."
                },
                "caption_text": {
                    "type": "STRING",
                    "description": "The original text from the script for this scene."
                }
            },
            "required": ["image_prompt", "caption_text"]
        }
    })
}

/// Decode the model's JSON answer into scenes.
pub fn decode_scenes(text: &str) -> Result<Vec<SceneDescriptor>, StoryError> {
    let scenes: Vec<SceneDescriptor> = serde_json::from_str(text.trim()).map_err(|e| {
        log::error!("Failed to parse scenes from script: {}", e);
        StoryError::SceneParse(MALFORMED_SCENES_MESSAGE.to_string())
    })?;

    if scenes.is_empty() {
        return Err(StoryError::SceneParse(NO_SCENES_MESSAGE.to_string()));
    }
    Ok(scenes)
}

/// Split `script` into ordered scene descriptors.
pub async fn parse_script(
    client: &GeminiClient,
    model: &str,
    policy: &RetryPolicy,
    progress: &Progress,
    script: &str,
) -> Result<Vec<SceneDescriptor>, StoryError> {
    if script.trim().is_empty() {
        return Err(StoryError::SceneParse(NO_SCENES_MESSAGE.to_string()));
    }

    let request =
        GenerateContentRequest::text(build_prompt(script), GenerationConfig::json(scene_schema()));
    let response = call_with_retry(policy, progress, || client.generate_content(model, &request))
        .await?;

    let text = response.first_text().ok_or_else(|| {
        log::error!("Scene parser response carried no text");
        StoryError::SceneParse(MALFORMED_SCENES_MESSAGE.to_string())
    })?;

    let scenes = decode_scenes(text)?;
    log::info!("Script parsed into {} scenes", scenes.len());
    Ok(scenes)
}
