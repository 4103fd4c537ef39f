//! Exporting a creation as downloadable files.
//!
//! Two outputs exist: the narration of every scene joined into one WAV, and
//! a combined WebM that replays the scenes in order onto one surface while
//! the joined narration plays underneath.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pipeline::{self, Pipeline, PipelineError, Tool};
use crate::playback::{MediaHandle, PlayableAsset};
use crate::progress::{Progress, ProgressEvent};
use crate::wav::{self, WavError};

/// Message shown to the user for any failed combined export.
pub const EXPORT_FAILED_MESSAGE: &str = "Export failed. Please try again.";

/// Frame rate of the combined export.
pub const DEFAULT_EXPORT_FPS: u32 = 30;

/// A file offered for download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Download {
    pub file_name: &'static str,
    pub mime: &'static str,
}

pub const AUDIO_DOWNLOAD: Download = Download {
    file_name: "storyreel-audio.wav",
    mime: wav::WAV_MIME,
};

pub const VIDEO_DOWNLOAD: Download = Download {
    file_name: "storyreel-video.webm",
    mime: "video/webm",
};

/// How per-scene narration containers are joined.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AudioJoin {
    /// Concatenate whole containers, headers included.
    #[default]
    Splice,
    /// One header over all PCM data.
    Merge,
}

impl std::fmt::Display for AudioJoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioJoin::Splice => write!(f, "splice"),
            AudioJoin::Merge => write!(f, "merge"),
        }
    }
}

/// Export parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub fps: u32,
    pub join: AudioJoin,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            fps: DEFAULT_EXPORT_FPS,
            join: AudioJoin::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("there are no scenes to export")]
    NothingToExport,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write '{}': {}", .path.display(), .source)]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid narration audio: {0}")]
    Wav(#[from] WavError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("could not read video dimensions: {0}")]
    VideoInfo(String),
}

/// Write `bytes` as `download.file_name` inside `dir`, atomically.
pub fn save_download(dir: &Path, download: Download, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(download.file_name);

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(&path).map_err(|e| ExportError::Persist {
        path: path.clone(),
        source: e.error,
    })?;

    log::info!(
        "Saved {} ({}, {} bytes)",
        path.display(),
        download.mime,
        bytes.len()
    );
    Ok(path)
}

/// Join every scene's narration, in scene order.
pub fn join_audio(assets: &[PlayableAsset], join: AudioJoin) -> Result<Vec<u8>, ExportError> {
    if assets.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let payloads = assets
        .iter()
        .map(|asset| asset.audio.read())
        .collect::<Result<Vec<_>, _>>()?;

    let joined = match join {
        AudioJoin::Splice => wav::splice(payloads.iter().map(Vec::as_slice)),
        AudioJoin::Merge => wav::merge(payloads.iter().map(Vec::as_slice))?,
    };

    let seconds: f64 = payloads
        .iter()
        .filter_map(|p| wav::read_wav(p).ok())
        .map(|(header, _)| wav::duration_secs(&header))
        .sum();
    log::debug!(
        "Joined {} narration clips ({}, {:.1}s)",
        payloads.len(),
        join,
        seconds
    );
    Ok(joined)
}

/// Save the joined narration as `storyreel-audio.wav` in `out_dir`.
pub fn export_audio(
    assets: &[PlayableAsset],
    join: AudioJoin,
    out_dir: &Path,
) -> Result<PathBuf, ExportError> {
    let joined = join_audio(assets, join)?;
    save_download(out_dir, AUDIO_DOWNLOAD, &joined)
}

/// Source of raw RGBA frames for one scene.
pub trait FrameSource {
    /// Fill `frame` with the next frame. `Ok(false)` marks the end of the scene.
    fn next_frame(&mut self, frame: &mut [u8]) -> Result<bool, ExportError>;
}

/// Destination of raw RGBA frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ExportError>;

    /// Stop and discard everything written so far.
    fn abort(&mut self);
}

/// Copy every frame of every scene, in order, from its source into `sink`.
///
/// A scene's source is opened only after the previous one reached its end.
/// On any failure the sink is aborted before the error is returned.
pub fn record_scenes<Src, Open, Sink>(
    scene_count: usize,
    frame_len: usize,
    mut open: Open,
    sink: &mut Sink,
    progress: &Progress,
) -> Result<u64, ExportError>
where
    Src: FrameSource,
    Open: FnMut(usize) -> Result<Src, ExportError>,
    Sink: FrameSink,
{
    let mut frame = vec![0u8; frame_len];
    let mut pump = || -> Result<u64, ExportError> {
        let mut written = 0u64;
        for scene in 0..scene_count {
            progress.emit(ProgressEvent::Exporting {
                scene: scene + 1,
                total: scene_count,
            });
            let mut source = open(scene)?;
            while source.next_frame(&mut frame)? {
                sink.write_frame(&frame)?;
                written += 1;
            }
        }
        Ok(written)
    };

    match pump() {
        Ok(written) => Ok(written),
        Err(e) => {
            log::error!("Export aborted: {}", e);
            sink.abort();
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamListing {
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Extract the first video stream's size from `ffprobe -print_format json`.
pub fn parse_stream_listing(json: &[u8]) -> Result<(u32, u32), ExportError> {
    let listing: StreamListing =
        serde_json::from_slice(json).map_err(|e| ExportError::VideoInfo(e.to_string()))?;

    listing
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .find_map(|s| Some((s.width?, s.height?)))
        .filter(|&(w, h)| w > 0 && h > 0)
        .ok_or_else(|| ExportError::VideoInfo("no video stream found".to_string()))
}

/// Round down to even dimensions, as required for yuv420p encoding.
pub fn even_dimensions(width: u32, height: u32) -> Result<(u32, u32), ExportError> {
    let even = (width & !1, height & !1);
    if even.0 == 0 || even.1 == 0 {
        return Err(ExportError::VideoInfo(format!(
            "video too small to encode: {}x{}",
            width, height
        )));
    }
    Ok(even)
}

/// Native size of the video at `path`.
pub fn video_dimensions(path: &Path) -> Result<(u32, u32), ExportError> {
    let args = vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_streams".to_string(),
        path.display().to_string(),
    ];
    let mut ffprobe = Pipeline::reader(Tool::Ffprobe, &args)?;

    let mut json = Vec::new();
    if let Some(stdout) = ffprobe.stdout() {
        stdout.read_to_end(&mut json)?;
    }
    ffprobe.finish()?;

    parse_stream_listing(&json)
}

/// Decodes one scene into frames scaled to the export surface.
pub struct DecoderSource {
    pipeline: Option<Pipeline>,
}

impl DecoderSource {
    pub fn decoder_args(path: &Path, width: u32, height: u32, fps: u32) -> Vec<String> {
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
            path.display().to_string(),
            "-an".to_string(),
            "-vf".to_string(),
            format!("fps={},scale={}:{}", fps, width, height),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "pipe:1".to_string(),
        ]
    }

    pub fn spawn(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self, ExportError> {
        let pipeline = Pipeline::reader(Tool::Ffmpeg, &Self::decoder_args(path, width, height, fps))?;
        Ok(Self {
            pipeline: Some(pipeline),
        })
    }
}

impl FrameSource for DecoderSource {
    fn next_frame(&mut self, frame: &mut [u8]) -> Result<bool, ExportError> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(false);
        };
        let Some(stdout) = pipeline.stdout() else {
            return Ok(false);
        };

        let mut filled = 0;
        while filled < frame.len() {
            match stdout.read(&mut frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == frame.len() {
            return Ok(true);
        }

        if filled > 0 {
            log::warn!("Dropping trailing partial frame ({} bytes)", filled);
        }
        if let Some(done) = self.pipeline.take() {
            done.finish()?;
        }
        Ok(false)
    }
}

/// Encodes raw frames plus the joined narration into WebM.
pub struct EncoderSink {
    pipeline: Pipeline,
}

impl EncoderSink {
    pub fn encoder_args(width: u32, height: u32, fps: u32, audio: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "-s".to_string(),
            format!("{}x{}", width, height),
            "-r".to_string(),
            fps.to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-ignore_length".to_string(),
            "1".to_string(),
            "-i".to_string(),
            audio.display().to_string(),
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
            "-c:v".to_string(),
            "libvpx".to_string(),
            "-b:v".to_string(),
            "2M".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "libvorbis".to_string(),
            "-af".to_string(),
            "apad".to_string(),
            "-shortest".to_string(),
            "-f".to_string(),
            "webm".to_string(),
            output.display().to_string(),
        ]
    }

    pub fn spawn(width: u32, height: u32, fps: u32, audio: &Path, output: &Path) -> Result<Self, ExportError> {
        let pipeline = Pipeline::writer(
            Tool::Ffmpeg,
            &Self::encoder_args(width, height, fps, audio, output),
        )?;
        Ok(Self { pipeline })
    }

    pub fn finish(self) -> Result<(), ExportError> {
        self.pipeline.finish()?;
        Ok(())
    }
}

impl FrameSink for EncoderSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ExportError> {
        let Some(stdin) = self.pipeline.stdin() else {
            return Err(ExportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder input already closed",
            )));
        };
        stdin.write_all(frame)?;
        Ok(())
    }

    fn abort(&mut self) {
        self.pipeline.kill();
    }
}

/// Render the creation into `storyreel-video.webm` inside `out_dir`.
///
/// The output is written to a temp file next to the destination and only
/// moved into place once the encoder exited cleanly.
pub fn export_video(
    assets: &[PlayableAsset],
    options: ExportOptions,
    out_dir: &Path,
    progress: &Progress,
) -> Result<PathBuf, ExportError> {
    let first = assets.first().ok_or(ExportError::NothingToExport)?;
    if !pipeline::is_tool_on_path(Tool::Ffmpeg) {
        return Err(PipelineError::ToolNotFound(Tool::Ffmpeg).into());
    }

    let (native_w, native_h) = video_dimensions(first.video.path())?;
    let (width, height) = even_dimensions(native_w, native_h)?;
    log::info!(
        "Exporting {} scenes at {}x{} ({} fps)",
        assets.len(),
        width,
        height,
        options.fps
    );

    let audio = MediaHandle::stage(&join_audio(assets, options.join)?, "wav")?;

    std::fs::create_dir_all(out_dir)?;
    let output = tempfile::Builder::new()
        .prefix(".storyreel-")
        .suffix(".webm")
        .tempfile_in(out_dir)?;

    let mut encoder = EncoderSink::spawn(width, height, options.fps, audio.path(), output.path())?;
    let frame_len = width as usize * height as usize * 4;

    let frames = record_scenes(
        assets.len(),
        frame_len,
        |scene| DecoderSource::spawn(assets[scene].video.path(), width, height, options.fps),
        &mut encoder,
        progress,
    )?;
    encoder.finish()?;

    let path = out_dir.join(VIDEO_DOWNLOAD.file_name);
    output.persist(&path).map_err(|e| ExportError::Persist {
        path: path.clone(),
        source: e.error,
    })?;

    log::info!(
        "Saved {} ({}, {} frames)",
        path.display(),
        VIDEO_DOWNLOAD.mime,
        frames
    );
    Ok(path)
}
