//! One generation run: parse, generate every scene in order, persist.

use std::fmt;

use chrono::Utc;

use super::diagnostics::{self, INVALID_KEY_MESSAGE};
use super::error::{StoryError, NO_SCENES_MESSAGE};
use super::scene::{scene_label, SceneAsset, SceneDescriptor};
use super::studio::SceneStudio;
use crate::credentials::CredentialGate;
use crate::playback::PlayableAsset;
use crate::progress::{Progress, ProgressEvent};
use crate::store::{CreationId, CreationStore, NewCreation};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Parsing,
    GeneratingVideo { scene: usize },
    GeneratingAudio { scene: usize },
    Persisting,
    Finished,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Parsing => f.write_str("parsing"),
            RunState::GeneratingVideo { scene } => write!(f, "generating video for scene {}", scene + 1),
            RunState::GeneratingAudio { scene } => write!(f, "generating audio for scene {}", scene + 1),
            RunState::Persisting => f.write_str("persisting"),
            RunState::Finished => f.write_str("finished"),
            RunState::Failed => f.write_str("failed"),
        }
    }
}

/// The one error a failed run reports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("An API key is required. Please select an API key to continue.")]
    MissingCredential,

    #[error("{}", INVALID_KEY_MESSAGE)]
    InvalidCredential,

    #[error("{message}")]
    Failed { message: String },
}

/// Runs scripts through a [`SceneStudio`] and saves the result.
pub struct Orchestrator<S, St, G> {
    studio: S,
    store: St,
    gate: G,
    progress: Progress,
    state: RunState,
    playable: Vec<PlayableAsset>,
}

impl<S, St, G> Orchestrator<S, St, G>
where
    S: SceneStudio,
    St: CreationStore,
    G: CredentialGate,
{
    pub fn new(studio: S, store: St, gate: G, progress: Progress) -> Self {
        Self {
            studio,
            store,
            gate,
            progress,
            state: RunState::Idle,
            playable: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Scenes finished so far in the current (or last) run.
    pub fn playable(&self) -> &[PlayableAsset] {
        &self.playable
    }

    /// Hand the finished scenes to the caller, leaving the list empty.
    pub fn take_playable(&mut self) -> Vec<PlayableAsset> {
        std::mem::take(&mut self.playable)
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    pub fn gate(&self) -> &G {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut G {
        &mut self.gate
    }

    fn set_state(&mut self, state: RunState) {
        log::debug!("Run state: {} -> {}", self.state, state);
        self.state = state;
    }

    /// Generate and persist a creation for `script`.
    ///
    /// Scenes are generated strictly one after another. Each finished scene
    /// is appended to [`playable`](Self::playable) right away. Nothing is
    /// persisted unless every scene succeeded.
    pub async fn run(&mut self, script: &str) -> Result<CreationId, RunError> {
        if !self.gate.has_key() {
            self.set_state(RunState::Failed);
            return Err(RunError::MissingCredential);
        }

        self.playable.clear();
        self.set_state(RunState::Parsing);
        self.progress.status("Parsing your story into scenes...");

        let scenes = match self.studio.parse_script(script, &self.progress).await {
            Ok(scenes) if scenes.is_empty() => {
                Err(StoryError::SceneParse(NO_SCENES_MESSAGE.to_string()))
            }
            other => other,
        };
        let scenes = match scenes {
            Ok(scenes) => scenes,
            Err(error) => return Err(self.fail(&error, None)),
        };

        let total = scenes.len();
        log::info!("Generating {} scenes", total);
        let mut assets = Vec::with_capacity(total);

        for (index, scene) in scenes.iter().enumerate() {
            match self.generate_scene(index, total, scene).await {
                Ok(asset) => assets.push(asset),
                Err(error) => {
                    return Err(self.fail(&error, Some((index, total, &scene.caption_text))));
                }
            }
        }

        self.set_state(RunState::Persisting);
        self.progress.status("Saving your creation...");
        let creation = NewCreation {
            script: script.to_string(),
            assets,
            created_at: Utc::now(),
        };
        let id = match self.store.add(creation) {
            Ok(id) => id,
            Err(error) => return Err(self.fail(&StoryError::Store(error), None)),
        };

        self.set_state(RunState::Finished);
        log::info!("Creation {} finished with {} scenes", id, total);
        Ok(id)
    }

    async fn generate_scene(
        &mut self,
        index: usize,
        total: usize,
        scene: &SceneDescriptor,
    ) -> Result<SceneAsset, StoryError> {
        let label = scene_label(index, total);

        self.set_state(RunState::GeneratingVideo { scene: index });
        self.progress.status(format!(
            "Generating video for {}: \"{}\"",
            label, scene.image_prompt
        ));
        let video = self
            .studio
            .render_video(scene, &self.progress.scoped(format!("Video for {}", label)))
            .await?;

        self.set_state(RunState::GeneratingAudio { scene: index });
        self.progress
            .status(format!("Creating narration for {}...", label));
        let audio = self
            .studio
            .render_narration(scene, &self.progress.scoped(format!("Narration for {}", label)))
            .await?;

        let asset = SceneAsset {
            video,
            audio,
            caption: scene.caption_text.clone(),
        };
        self.playable.push(PlayableAsset::from_scene(&asset)?);
        self.progress.emit(ProgressEvent::SceneReady {
            scene: index + 1,
            total,
        });
        Ok(asset)
    }

    /// Collapse `error` into the run's single message.
    fn fail(&mut self, error: &StoryError, scene: Option<(usize, usize, &str)>) -> RunError {
        log::error!("Generation failed: {}", error);
        self.set_state(RunState::Failed);

        let message = diagnostics::enrich(&error.to_string(), scene);
        if diagnostics::indicates_invalid_key(&message) {
            self.gate.invalidate();
            return RunError::InvalidCredential;
        }
        RunError::Failed { message }
    }
}
