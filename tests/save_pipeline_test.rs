//! End-to-end save pipeline scenarios

use slotvault::save::{
    LocalSetup, MockSaveProvider, MockSetup, OutcomeReceiver, ProviderCode, SaveError,
    SaveOutcome, SavePipeline, StorageSetup, StorageStatus, UserDirectory, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const USER: UserId = UserId(1);

fn directory(setup: Arc<dyn StorageSetup>) -> Arc<UserDirectory> {
    let directory = Arc::new(UserDirectory::new(setup, Duration::from_millis(5)));
    directory.register_user(USER);
    directory.set_save_data_user(Some(USER));
    directory
}

fn mock_pipeline(provider: &MockSaveProvider) -> (SavePipeline, OutcomeReceiver) {
    let setup = Arc::new(MockSetup::new(provider.clone()));
    SavePipeline::new(directory(setup)).expect("runtime available")
}

async fn collect(rx: &mut OutcomeReceiver, n: usize) -> Vec<SaveOutcome> {
    let mut outcomes = Vec::with_capacity(n);
    for _ in 0..n {
        let outcome = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("outcome arrives")
            .expect("channel open");
        outcomes.push(outcome);
    }
    outcomes
}

async fn wait_released(provider: &MockSaveProvider) {
    for _ in 0..100 {
        if provider.open_containers() == 0 && provider.open_updates() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "handles still open: {} containers, {} updates",
        provider.open_containers(),
        provider.open_updates()
    );
}

#[tokio::test]
async fn test_batch_commits_every_blob() {
    let provider = MockSaveProvider::new();
    let (mut pipeline, mut rx) = mock_pipeline(&provider);

    pipeline.begin_batch("slot1").unwrap();
    let a = pipeline.submit_blob("progress.dat", b"level 3");
    let b = pipeline.submit_blob("options.dat", b"volume=7");
    assert_eq!(pipeline.end_batch().unwrap(), 2);

    let outcomes = collect(&mut rx, 2).await;
    let ids: Vec<_> = outcomes.iter().map(|o| o.id).collect();
    assert!(ids.contains(&a) && ids.contains(&b));
    assert!(outcomes.iter().all(|o| o.succeeded() && o.error_code() == 0));

    assert_eq!(provider.submit_count(), 1);
    assert_eq!(provider.blob("slot1", "progress.dat").as_deref(), Some(&b"level 3"[..]));
    assert_eq!(provider.blob("slot1", "options.dat").as_deref(), Some(&b"volume=7"[..]));
    wait_released(&provider).await;
}

#[tokio::test]
async fn test_submit_failure_shared_by_batch() {
    let provider = MockSaveProvider::new();
    provider.fail_submit(ProviderCode::QUOTA_EXCEEDED);
    let (mut pipeline, mut rx) = mock_pipeline(&provider);

    pipeline.begin_batch("slot1").unwrap();
    for n in 0..3 {
        pipeline.submit_blob(&format!("blob{n}"), b"x");
    }
    pipeline.end_batch().unwrap();

    let outcomes = collect(&mut rx, 3).await;
    for outcome in &outcomes {
        assert_eq!(outcome.error(), Some(SaveError::QuotaExceeded));
        assert_eq!(outcome.error_code(), SaveError::QuotaExceeded.code());
    }
    assert!(provider.is_empty());
    wait_released(&provider).await;
}

#[tokio::test]
async fn test_blob_write_failure_is_isolated() {
    let provider = MockSaveProvider::new();
    provider.fail_blob_write("bad.dat", ProviderCode::UPDATE_TOO_BIG);
    let (mut pipeline, mut rx) = mock_pipeline(&provider);

    pipeline.begin_batch("slot2").unwrap();
    let good = pipeline.submit_blob("good.dat", b"ok");
    let bad = pipeline.submit_blob("bad.dat", b"too much");
    pipeline.end_batch().unwrap();

    let outcomes: HashMap<_, _> = collect(&mut rx, 2)
        .await
        .into_iter()
        .map(|o| (o.id, o.result))
        .collect();
    assert_eq!(outcomes[&good], Ok(()));
    assert_eq!(outcomes[&bad], Err(SaveError::UpdateTooBig));

    assert!(provider.blob("slot2", "good.dat").is_some());
    assert!(provider.blob("slot2", "bad.dat").is_none());
    wait_released(&provider).await;
}

#[tokio::test]
async fn test_all_writes_failing_skips_submit() {
    let provider = MockSaveProvider::new();
    provider.fail_blob_write("only.dat", ProviderCode::BLOB_NOT_FOUND);
    let (mut pipeline, mut rx) = mock_pipeline(&provider);

    pipeline.begin_batch("slot3").unwrap();
    pipeline.submit_blob("only.dat", b"?");
    pipeline.end_batch().unwrap();

    let outcome = collect(&mut rx, 1).await.remove(0);
    assert_eq!(outcome.error(), Some(SaveError::BlobNotFound));
    assert_eq!(provider.submit_count(), 0);
    wait_released(&provider).await;
}

#[tokio::test]
async fn test_container_failure_fails_whole_batch() {
    let provider = MockSaveProvider::new();
    provider.fail_create_container(ProviderCode::NO_ACCESS);
    let (mut pipeline, mut rx) = mock_pipeline(&provider);

    pipeline.begin_batch("locked").unwrap();
    pipeline.submit_blob("a", b"1");
    pipeline.submit_blob("b", b"2");
    pipeline.end_batch().unwrap();

    let outcomes = collect(&mut rx, 2).await;
    assert!(outcomes.iter().all(|o| o.error() == Some(SaveError::NoAccess)));
    assert_eq!(provider.submit_count(), 0);
}

#[tokio::test]
async fn test_update_failure_fails_whole_batch() {
    let provider = MockSaveProvider::new();
    provider.fail_create_update(ProviderCode::CONTAINER_NOT_IN_SYNC);
    let (mut pipeline, mut rx) = mock_pipeline(&provider);

    pipeline.begin_batch("stale").unwrap();
    pipeline.submit_blob("a", b"1");
    pipeline.end_batch().unwrap();

    let outcome = collect(&mut rx, 1).await.remove(0);
    assert_eq!(outcome.error(), Some(SaveError::ContainerNotInSync));
    wait_released(&provider).await;
}

#[tokio::test]
async fn test_setup_failure_reported_for_every_item() {
    let provider = MockSaveProvider::new();
    let setup = Arc::new(MockSetup::new(provider.clone()).failing(ProviderCode::NO_SERVICE_CONFIGURATION));
    let directory = directory(setup.clone());
    let (mut pipeline, mut rx) = SavePipeline::new(Arc::clone(&directory)).unwrap();

    pipeline.begin_batch("slot1").unwrap();
    pipeline.submit_blob("a", b"1");
    pipeline.submit_blob("b", b"2");
    pipeline.end_batch().unwrap();

    let outcomes = collect(&mut rx, 2).await;
    assert!(outcomes
        .iter()
        .all(|o| o.error() == Some(SaveError::NoServiceConfiguration)));
    assert_eq!(directory.storage_status(USER), Some(StorageStatus::Failed));

    // Failure is sticky; setup is not retried
    pipeline.submit_blob("slot1/c", b"3");
    let outcome = collect(&mut rx, 1).await.remove(0);
    assert_eq!(outcome.error(), Some(SaveError::NoServiceConfiguration));
    assert_eq!(setup.setup_calls(), 1);
    assert_eq!(provider.open_containers(), 0);
}

#[tokio::test]
async fn test_no_save_user_reports_user_not_found() {
    let provider = MockSaveProvider::new();
    let (mut pipeline, mut rx) = mock_pipeline(&provider);
    pipeline.directory().set_save_data_user(None);

    let id = pipeline.submit_blob("c/blob", b"1");
    let outcome = collect(&mut rx, 1).await.remove(0);

    assert_eq!(outcome.id, id);
    assert_eq!(outcome.error(), Some(SaveError::UserNotFound));
    assert_eq!(outcome.error_code(), SaveError::UserNotFound.code());
}

#[tokio::test]
async fn test_slow_setup_shared_between_commits() {
    let provider = MockSaveProvider::new();
    let setup = Arc::new(MockSetup::new(provider.clone()).with_delay(Duration::from_millis(50)));
    let directory = directory(setup.clone());
    let (mut pipeline, mut rx) = SavePipeline::new(Arc::clone(&directory)).unwrap();

    pipeline.submit_blob("one/a", b"1");
    pipeline.submit_blob("two/b", b"2");

    let outcomes = collect(&mut rx, 2).await;
    assert!(outcomes.iter().all(SaveOutcome::succeeded));
    assert_eq!(setup.setup_calls(), 1);
    assert_eq!(directory.storage_status(USER), Some(StorageStatus::Ready));
    assert_eq!(provider.blob("one", "a").as_deref(), Some(&b"1"[..]));
    assert_eq!(provider.blob("two", "b").as_deref(), Some(&b"2"[..]));
}

#[tokio::test]
async fn test_local_provider_end_to_end() {
    let root = std::env::temp_dir().join(format!("slotvault_e2e_{}", std::process::id()));
    let setup = Arc::new(LocalSetup::new(&root, 1024));
    let (mut pipeline, mut rx) = SavePipeline::new(directory(setup)).unwrap();

    pipeline.begin_batch("slot1").unwrap();
    pipeline.submit_blob("progress.dat", b"checkpoint 12");
    let big = pipeline.submit_blob("huge.dat", &[0u8; 2048]);
    pipeline.end_batch().unwrap();

    let outcomes: HashMap<_, _> = collect(&mut rx, 2)
        .await
        .into_iter()
        .map(|o| (o.id, o.result))
        .collect();
    assert_eq!(outcomes[&big], Err(SaveError::UpdateTooBig));
    assert_eq!(outcomes.values().filter(|r| r.is_ok()).count(), 1);

    let saved = root.join("user-1").join("slot1");
    assert_eq!(
        std::fs::read(saved.join("progress.dat")).ok(),
        Some(b"checkpoint 12".to_vec())
    );
    assert!(!saved.join("huge.dat").exists());

    std::fs::remove_dir_all(root).ok();
}

#[tokio::test]
async fn test_local_failed_placement_rolls_back() {
    let root = std::env::temp_dir().join(format!("slotvault_rollback_{}", std::process::id()));
    let container = root.join("user-1").join("c");
    // "b" cannot replace a non-empty directory, so placing it fails after "a"
    std::fs::create_dir_all(container.join("b").join("inner")).unwrap();
    std::fs::write(container.join("a"), b"old a").unwrap();

    let setup = Arc::new(LocalSetup::new(&root, 1024));
    let (mut pipeline, mut rx) = SavePipeline::new(directory(setup)).unwrap();

    pipeline.begin_batch("c").unwrap();
    pipeline.submit_blob("a", b"new a");
    pipeline.submit_blob("b", b"new b");
    pipeline.end_batch().unwrap();

    let outcomes = collect(&mut rx, 2).await;
    assert!(outcomes
        .iter()
        .all(|o| o.error() == Some(SaveError::ContainerSyncFailed)));

    assert_eq!(std::fs::read(container.join("a")).ok(), Some(b"old a".to_vec()));
    assert!(container.join("b").join("inner").is_dir());
    for leftover in ["a.partial", "b.partial", "a.previous"] {
        assert!(!container.join(leftover).exists(), "{leftover} left behind");
    }

    std::fs::remove_dir_all(root).ok();
}

#[tokio::test]
async fn test_local_failed_placement_removes_new_blobs() {
    let root = std::env::temp_dir().join(format!("slotvault_rollback_new_{}", std::process::id()));
    let container = root.join("user-1").join("c");
    std::fs::create_dir_all(container.join("b").join("inner")).unwrap();

    let setup = Arc::new(LocalSetup::new(&root, 1024));
    let (mut pipeline, mut rx) = SavePipeline::new(directory(setup)).unwrap();

    pipeline.begin_batch("c").unwrap();
    pipeline.submit_blob("a", b"fresh");
    pipeline.submit_blob("b", b"blocked");
    pipeline.end_batch().unwrap();

    let outcomes = collect(&mut rx, 2).await;
    assert!(outcomes.iter().all(|o| !o.succeeded()));
    assert!(!container.join("a").exists());
    assert!(!container.join("a.partial").exists());
    assert!(!container.join("b.partial").exists());

    std::fs::remove_dir_all(root).ok();
}
