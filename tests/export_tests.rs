//! Export of joined narration and the frame recording loop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use storyreel::export::{
    export_audio, export_video, join_audio, record_scenes, AudioJoin, ExportError,
    ExportOptions, FrameSink, FrameSource, AUDIO_DOWNLOAD,
};
use storyreel::playback::PlayableAsset;
use storyreel::progress::{drain, Progress, ProgressEvent};
use storyreel::story::SceneAsset;
use storyreel::wav;

const FRAME_LEN: usize = 4;

/// Yields a fixed number of frames filled with the scene number.
struct CountingSource {
    scene: u8,
    remaining: usize,
    fail_after: Option<usize>,
}

impl FrameSource for CountingSource {
    fn next_frame(&mut self, frame: &mut [u8]) -> Result<bool, ExportError> {
        if self.fail_after == Some(self.remaining) {
            return Err(ExportError::VideoInfo("decoder died".to_string()));
        }
        if self.remaining == 0 {
            return Ok(false);
        }
        self.remaining -= 1;
        frame.fill(self.scene);
        Ok(true)
    }
}

#[derive(Default)]
struct RecordingSink {
    frames: Vec<Vec<u8>>,
    aborted: bool,
}

impl FrameSink for RecordingSink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), ExportError> {
        self.frames.push(frame.to_vec());
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

fn source(scene: u8, frames: usize) -> CountingSource {
    CountingSource {
        scene,
        remaining: frames,
        fail_after: None,
    }
}

fn playable(audio: Vec<Vec<u8>>) -> Vec<PlayableAsset> {
    let scenes: Vec<_> = audio
        .into_iter()
        .enumerate()
        .map(|(i, audio)| SceneAsset {
            video: vec![i as u8],
            audio,
            caption: format!("Scene {}.", i + 1),
        })
        .collect();
    PlayableAsset::from_scenes(&scenes).unwrap()
}

#[test]
fn test_record_scenes_plays_every_scene_in_order() {
    let mut sink = RecordingSink::default();
    let opened = Arc::new(Mutex::new(Vec::new()));
    let (progress, mut rx) = Progress::channel();

    let log = Arc::clone(&opened);
    let written = record_scenes(
        3,
        FRAME_LEN,
        |scene| {
            log.lock().unwrap().push(scene);
            Ok(source(scene as u8 + 1, scene + 1))
        },
        &mut sink,
        &progress,
    )
    .unwrap();

    assert_eq!(written, 6);
    assert_eq!(*opened.lock().unwrap(), vec![0, 1, 2]);
    assert!(!sink.aborted);
    let firsts: Vec<u8> = sink.frames.iter().map(|f| f[0]).collect();
    assert_eq!(firsts, vec![1, 2, 2, 3, 3, 3]);

    let exporting: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|u| match u.event {
            ProgressEvent::Exporting { scene, total } => Some((scene, total)),
            _ => None,
        })
        .collect();
    assert_eq!(exporting, vec![(1, 3), (2, 3), (3, 3)]);
}

#[test]
fn test_record_scenes_aborts_on_source_error() {
    let mut sink = RecordingSink::default();
    let mut sources: VecDeque<_> = vec![
        source(1, 2),
        CountingSource {
            scene: 2,
            remaining: 3,
            fail_after: Some(1),
        },
        source(3, 2),
    ]
    .into();

    let result = record_scenes(
        3,
        FRAME_LEN,
        |_| Ok(sources.pop_front().expect("source per scene")),
        &mut sink,
        &Progress::disabled(),
    );

    assert!(matches!(result, Err(ExportError::VideoInfo(_))));
    assert!(sink.aborted);
    // Two frames from scene 1, two from scene 2 before the failure.
    assert_eq!(sink.frames.len(), 4);
}

#[test]
fn test_record_scenes_aborts_when_open_fails() {
    let mut sink = RecordingSink::default();

    let result = record_scenes(
        2,
        FRAME_LEN,
        |scene| {
            if scene == 1 {
                Err(ExportError::VideoInfo("missing clip".to_string()))
            } else {
                Ok(source(1, 1))
            }
        },
        &mut sink,
        &Progress::disabled(),
    );

    assert!(result.is_err());
    assert!(sink.aborted);
    assert_eq!(sink.frames.len(), 1);
}

#[test]
fn test_splice_keeps_every_container() {
    let clips = vec![
        wav::narration_wav(&[1, 0, 2, 0]).unwrap(),
        wav::narration_wav(&[3, 0, 4, 0, 5, 0]).unwrap(),
    ];
    let total: usize = clips.iter().map(Vec::len).sum();
    let assets = playable(clips.clone());

    let joined = join_audio(&assets, AudioJoin::Splice).unwrap();

    assert_eq!(joined.len(), total);
    assert_eq!(&joined[..clips[0].len()], clips[0].as_slice());
}

#[test]
fn test_merge_writes_single_header() {
    let assets = playable(vec![
        wav::narration_wav(&[1, 0, 2, 0]).unwrap(),
        wav::narration_wav(&[3, 0, 4, 0, 5, 0]).unwrap(),
    ]);

    let joined = join_audio(&assets, AudioJoin::Merge).unwrap();

    let (header, data) = wav::read_wav(&joined).unwrap();
    assert_eq!(header.data_size, 10);
    assert_eq!(header.sample_rate, wav::NARRATION_SAMPLE_RATE);
    assert_eq!(data, &[1, 0, 2, 0, 3, 0, 4, 0, 5, 0]);
    assert_eq!(joined.len(), wav::WAV_HEADER_LEN + 10);
}

#[test]
fn test_export_audio_writes_download_file() {
    let dir = TempDir::new().unwrap();
    let assets = playable(vec![wav::narration_wav(&[7, 0]).unwrap()]);

    let path = export_audio(&assets, AudioJoin::Splice, dir.path()).unwrap();

    assert_eq!(path, dir.path().join(AUDIO_DOWNLOAD.file_name));
    assert_eq!(std::fs::read(&path).unwrap(), wav::narration_wav(&[7, 0]).unwrap());
}

#[test]
fn test_export_without_scenes() {
    let dir = TempDir::new().unwrap();

    assert!(matches!(
        export_audio(&[], AudioJoin::Merge, dir.path()),
        Err(ExportError::NothingToExport)
    ));
    assert!(matches!(
        export_video(&[], ExportOptions::default(), dir.path(), &Progress::disabled()),
        Err(ExportError::NothingToExport)
    ));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
