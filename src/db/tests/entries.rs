use crate::db::*;
use crate::types::{Job, JobKey, Quality};
use tempfile::NamedTempFile;

fn job(key: &str) -> Job {
    Job::new(
        key,
        format!("https://open.spotify.com/track/{key}"),
        "/music/Mix",
        Quality::default(),
    )
}

#[tokio::test]
async fn test_contains_after_record() {
    let temp_file = NamedTempFile::new().unwrap();
    let ledger = Ledger::open(temp_file.path()).await.unwrap();

    let key = JobKey::from("track-a");
    assert!(!ledger.contains(&key).await.unwrap());

    ledger.record(&job("track-a")).await.unwrap();

    assert!(ledger.contains(&key).await.unwrap());
    assert!(!ledger.contains(&JobKey::from("track-b")).await.unwrap());

    ledger.close().await;
}

#[tokio::test]
async fn test_record_is_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();
    let ledger = Ledger::open(temp_file.path()).await.unwrap();

    let first = job("dup").with_title("First Title");
    let second = job("dup").with_title("Second Title");

    ledger.record(&first).await.unwrap();
    ledger.record(&second).await.unwrap();
    ledger.record(&first).await.unwrap();

    assert_eq!(ledger.count().await.unwrap(), 1);

    // INSERT OR IGNORE keeps the original row
    let entry = ledger.get(&JobKey::from("dup")).await.unwrap().unwrap();
    assert_eq!(entry.title.as_deref(), Some("First Title"));

    ledger.close().await;
}

#[tokio::test]
async fn test_entry_fields_are_stored() {
    let temp_file = NamedTempFile::new().unwrap();
    let ledger = Ledger::open(temp_file.path()).await.unwrap();

    let mut j = job("abc").with_title("Song");
    j.playlist_id = Some("playlist-1".to_string());
    ledger.record(&j).await.unwrap();

    let entry = ledger.get(&JobKey::from("abc")).await.unwrap().unwrap();
    assert_eq!(entry.id, "abc");
    assert_eq!(entry.url, "https://open.spotify.com/track/abc");
    assert_eq!(entry.destination, "/music/Mix");
    assert_eq!(entry.playlist_id.as_deref(), Some("playlist-1"));
    assert!(entry.recorded_at > 0);

    assert!(ledger.get(&JobKey::from("missing")).await.unwrap().is_none());

    ledger.close().await;
}

#[tokio::test]
async fn test_recorded_keys_sorted() {
    let temp_file = NamedTempFile::new().unwrap();
    let ledger = Ledger::open(temp_file.path()).await.unwrap();

    for key in ["c", "a", "b"] {
        ledger.record(&job(key)).await.unwrap();
    }

    let keys = ledger.recorded_keys().await.unwrap();
    assert_eq!(
        keys,
        vec![JobKey::from("a"), JobKey::from("b"), JobKey::from("c")]
    );

    ledger.close().await;
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let temp_file = NamedTempFile::new().unwrap();

    {
        let ledger = Ledger::open(temp_file.path()).await.unwrap();
        ledger.record(&job("persisted")).await.unwrap();
        ledger.close().await;
    }

    let ledger = Ledger::open(temp_file.path()).await.unwrap();
    assert!(ledger.contains(&JobKey::from("persisted")).await.unwrap());
    assert_eq!(ledger.count().await.unwrap(), 1);

    ledger.close().await;
}

#[tokio::test]
async fn test_concurrent_records_from_clones() {
    let temp_file = NamedTempFile::new().unwrap();
    let ledger = Ledger::open(temp_file.path()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.record(&job(&format!("k{i:02}"))).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(ledger.count().await.unwrap(), 16);

    ledger.close().await;
}
