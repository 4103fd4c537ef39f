//! DiskStore behavior across reopen, concurrency and a full run.

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use storyreel::credentials::EnvCredentials;
use storyreel::progress::Progress;
use storyreel::store::{CreationStore, DiskStore, NewCreation};
use storyreel::story::{Orchestrator, SceneAsset, SceneDescriptor, SceneStudio, StoryError};

fn asset(tag: &str) -> SceneAsset {
    SceneAsset {
        video: format!("video-{}", tag).into_bytes(),
        audio: format!("audio-{}", tag).into_bytes(),
        caption: format!("Caption {}.", tag),
    }
}

fn creation(script: &str, minute: u32, tags: &[&str]) -> NewCreation {
    NewCreation {
        script: script.to_string(),
        assets: tags.iter().map(|t| asset(t)).collect(),
        created_at: Utc.with_ymd_and_hms(2026, 3, 14, 9, minute, 0).unwrap(),
    }
}

#[test]
fn test_creations_survive_reopen() {
    let dir = TempDir::new().unwrap();

    let id = {
        let store = DiskStore::open(dir.path()).unwrap();
        store.add(creation("A rocket.", 0, &["a", "b"])).unwrap()
    };

    let store = DiskStore::open(dir.path()).unwrap();
    let loaded = store.load(id).unwrap().expect("creation persisted");
    assert_eq!(loaded.script, "A rocket.");
    assert_eq!(loaded.assets, vec![asset("a"), asset("b")]);
    assert_eq!(
        loaded.created_at,
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
    );

    // Ids keep increasing after reopen.
    let next = store.add(creation("Later.", 1, &["c"])).unwrap();
    assert!(next > id);
}

#[test]
fn test_list_is_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = DiskStore::open(dir.path()).unwrap();

    let old = store.add(creation("old", 5, &["a"])).unwrap();
    let newest = store.add(creation("newest", 30, &["b"])).unwrap();
    let middle = store.add(creation("middle", 10, &["c"])).unwrap();

    let ids: Vec<_> = store.list().unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![newest, middle, old]);
}

#[test]
fn test_delete_is_idempotent_and_keeps_shared_media() {
    let dir = TempDir::new().unwrap();
    let store = DiskStore::open(dir.path()).unwrap();

    let first = store.add(creation("first", 0, &["shared", "x"])).unwrap();
    let second = store.add(creation("second", 1, &["shared"])).unwrap();

    assert!(store.delete(first).unwrap());
    assert!(!store.delete(first).unwrap());
    assert!(!store.delete(9999).unwrap());

    assert!(store.load(first).unwrap().is_none());
    let survivor = store.load(second).unwrap().unwrap();
    assert_eq!(survivor.assets, vec![asset("shared")]);

    let summaries = store.list().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, second);
}

#[test]
fn test_unknown_id_loads_none() {
    let dir = TempDir::new().unwrap();
    let store = DiskStore::open(dir.path()).unwrap();
    assert!(store.load(42).unwrap().is_none());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_concurrent_adds_get_distinct_ids() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(DiskStore::open(dir.path()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let tag = n.to_string();
                store
                    .add(creation(&format!("script {}", n), n, &[tag.as_str()]))
                    .unwrap()
            })
        })
        .collect();

    let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);

    let reopened = DiskStore::open(dir.path()).unwrap();
    assert_eq!(reopened.list().unwrap().len(), 4);
}

#[test]
fn test_handles_opened_earlier_see_each_others_adds() {
    let dir = TempDir::new().unwrap();
    let long_run = DiskStore::open(dir.path()).unwrap();
    let other = DiskStore::open(dir.path()).unwrap();

    let a = other.add(creation("other", 0, &["a"])).unwrap();
    let b = long_run.add(creation("long run", 1, &["b"])).unwrap();

    assert_ne!(a, b);
    let scripts: Vec<_> = DiskStore::open(dir.path())
        .unwrap()
        .list()
        .unwrap()
        .into_iter()
        .map(|s| s.script)
        .collect();
    assert_eq!(scripts, vec!["long run", "other"]);
    assert_eq!(other.list().unwrap().len(), 2);
}

#[test]
fn test_delete_from_one_handle_is_not_undone_by_another() {
    let dir = TempDir::new().unwrap();
    let stale = DiskStore::open(dir.path()).unwrap();
    let first = stale.add(creation("first", 0, &["gone"])).unwrap();

    let cli = DiskStore::open(dir.path()).unwrap();
    assert!(cli.delete(first).unwrap());

    let second = stale.add(creation("second", 1, &["kept"])).unwrap();

    assert!(second > first);
    let ids: Vec<_> = cli.list().unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![second]);
    assert!(stale.load(first).unwrap().is_none());
    assert_eq!(cli.load(second).unwrap().unwrap().assets, vec![asset("kept")]);
}

#[test]
fn test_concurrent_adds_through_separate_handles() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();

    let handles: Vec<_> = (0..4u32)
        .map(|n| {
            let store = DiskStore::open(&root).unwrap();
            thread::spawn(move || {
                let tag = format!("separate-{}", n);
                store
                    .add(creation(&format!("script {}", n), n, &[tag.as_str()]))
                    .unwrap()
            })
        })
        .collect();

    let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    assert_eq!(DiskStore::open(&root).unwrap().list().unwrap().len(), 4);
}

struct TwoSceneStudio;

#[async_trait]
impl SceneStudio for TwoSceneStudio {
    async fn parse_script(
        &self,
        _script: &str,
        _progress: &Progress,
    ) -> Result<Vec<SceneDescriptor>, StoryError> {
        Ok(vec![
            SceneDescriptor {
                image_prompt: "dawn".to_string(),
                caption_text: "Morning came.".to_string(),
            },
            SceneDescriptor {
                image_prompt: "dusk".to_string(),
                caption_text: "Night fell.".to_string(),
            },
        ])
    }

    async fn render_video(
        &self,
        scene: &SceneDescriptor,
        _progress: &Progress,
    ) -> Result<Vec<u8>, StoryError> {
        Ok(format!("mp4:{}", scene.image_prompt).into_bytes())
    }

    async fn render_narration(
        &self,
        scene: &SceneDescriptor,
        _progress: &Progress,
    ) -> Result<Vec<u8>, StoryError> {
        Ok(format!("wav:{}", scene.caption_text).into_bytes())
    }
}

#[tokio::test]
async fn test_run_persists_to_disk() {
    let dir = TempDir::new().unwrap();
    let mut orchestrator = Orchestrator::new(
        TwoSceneStudio,
        DiskStore::open(dir.path()).unwrap(),
        EnvCredentials::with_key(Some("key".to_string())),
        Progress::disabled(),
    );

    let id = orchestrator
        .run("Morning came. Night fell.")
        .await
        .unwrap();

    let store = DiskStore::open(dir.path()).unwrap();
    let creation = store.load(id).unwrap().unwrap();
    assert_eq!(creation.script, "Morning came. Night fell.");
    assert_eq!(creation.assets.len(), 2);
    assert_eq!(creation.assets[0].video, b"mp4:dawn");
    assert_eq!(creation.assets[1].audio, b"wav:Night fell.");
    assert_eq!(creation.assets[1].caption, "Night fell.");
}
