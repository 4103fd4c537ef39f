//! Looping sequential playback of generated scenes.
//!
//! Scenes play one after another: the muted video and its narration start
//! together, the end of the video moves to the next scene (stopping any
//! narration still running), and the last scene wraps back to the first.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::pipeline::{self, Pipeline, PipelineError, Tool};
use crate::progress::Progress;
use crate::story::{scene_label, SceneAsset};

/// Errors raised while preparing or playing scenes.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("nothing to play")]
    Empty,

    #[error("failed to stage media: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// A media payload staged as a local file.
///
/// The file is removed when the handle is dropped or released.
#[derive(Debug)]
pub struct MediaHandle {
    file: NamedTempFile,
    len: usize,
}

impl MediaHandle {
    /// Stage `bytes` into a temp file named with `extension`.
    pub fn stage(bytes: &[u8], extension: &str) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("storyreel-")
            .suffix(&format!(".{}", extension))
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            file,
            len: bytes.len(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the payload back through the handle.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path())
    }

    /// Remove the backing file now, reporting any failure.
    pub fn release(self) -> std::io::Result<()> {
        self.file.close()
    }
}

/// A scene whose media can be handed to a player.
#[derive(Debug)]
pub struct PlayableAsset {
    pub video: MediaHandle,
    pub audio: MediaHandle,
    pub caption: String,
}

impl PlayableAsset {
    pub fn from_scene(scene: &SceneAsset) -> std::io::Result<Self> {
        Ok(Self {
            video: MediaHandle::stage(&scene.video, "mp4")?,
            audio: MediaHandle::stage(&scene.audio, "wav")?,
            caption: scene.caption.clone(),
        })
    }

    /// Stage every scene of a creation, in order.
    pub fn from_scenes(scenes: &[SceneAsset]) -> std::io::Result<Vec<Self>> {
        scenes.iter().map(Self::from_scene).collect()
    }
}

/// Position within a looping scene list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCursor {
    index: usize,
    len: usize,
}

impl PlaybackCursor {
    pub fn new(len: usize) -> Self {
        Self { index: 0, len }
    }

    /// Current scene index, `None` for an empty list.
    pub fn current(&self) -> Option<usize> {
        (self.len > 0).then_some(self.index)
    }

    /// Advance after the current video ended; wraps to the first scene.
    pub fn on_video_ended(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        self.index = (self.index + 1) % self.len;
        Some(self.index)
    }
}

/// How one scene's playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneOutcome {
    VideoEnded,
    Interrupted,
}

/// Plays a single scene and blocks until it is over.
pub trait SceneLauncher {
    fn play_scene(&mut self, asset: &PlayableAsset) -> Result<SceneOutcome, PlaybackError>;
}

/// Launcher backed by two `ffplay` processes.
#[derive(Debug)]
pub struct FfplayLauncher {
    poll_interval: Duration,
}

impl Default for FfplayLauncher {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl FfplayLauncher {
    fn video_args(asset: &PlayableAsset) -> Vec<String> {
        vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-an".to_string(),
            "-autoexit".to_string(),
            "-window_title".to_string(),
            asset.caption.clone(),
            asset.video.path().display().to_string(),
        ]
    }

    fn audio_args(asset: &PlayableAsset) -> Vec<String> {
        vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-nodisp".to_string(),
            "-autoexit".to_string(),
            asset.audio.path().display().to_string(),
        ]
    }
}

impl SceneLauncher for FfplayLauncher {
    fn play_scene(&mut self, asset: &PlayableAsset) -> Result<SceneOutcome, PlaybackError> {
        let mut video = Pipeline::detached(Tool::Ffplay, &Self::video_args(asset))?;
        let mut audio = Pipeline::detached(Tool::Ffplay, &Self::audio_args(asset))?;

        loop {
            if pipeline::ctrlc_received() {
                video.kill();
                audio.kill();
                return Ok(SceneOutcome::Interrupted);
            }

            if let Some(status) = video.try_wait()? {
                if audio.is_running() {
                    audio.kill();
                }
                if !status.success() {
                    log::warn!("ffplay exited with {} for '{}'", status, asset.caption);
                }
                return Ok(SceneOutcome::VideoEnded);
            }

            std::thread::sleep(self.poll_interval);
        }
    }
}

/// Drives a [`SceneLauncher`] around the scene list.
#[derive(Debug, Clone)]
pub struct Player {
    loops: Option<u32>,
    progress: Progress,
}

impl Player {
    /// `loops = None` plays until interrupted.
    pub fn new(loops: Option<u32>, progress: Progress) -> Self {
        Self { loops, progress }
    }

    /// Play `assets` in order, looping. Returns the number of scenes played.
    pub fn run(
        &self,
        assets: &[PlayableAsset],
        launcher: &mut impl SceneLauncher,
    ) -> Result<usize, PlaybackError> {
        if assets.is_empty() {
            return Err(PlaybackError::Empty);
        }
        if self.loops == Some(0) {
            return Ok(0);
        }

        let mut cursor = PlaybackCursor::new(assets.len());
        let mut completed_loops = 0u32;
        let mut played = 0usize;

        while let Some(index) = cursor.current() {
            let asset = &assets[index];
            self.progress.status(format!(
                "Playing {}: {}",
                scene_label(index, assets.len()),
                asset.caption
            ));

            if launcher.play_scene(asset)? == SceneOutcome::Interrupted {
                log::info!("Playback interrupted after {} scenes", played);
                break;
            }
            played += 1;

            if cursor.on_video_ended() == Some(0) {
                completed_loops += 1;
                if self.loops.is_some_and(|limit| completed_loops >= limit) {
                    break;
                }
            }
        }

        Ok(played)
    }
}
