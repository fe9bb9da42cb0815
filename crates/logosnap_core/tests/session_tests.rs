use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use logosnap_core::{
    ActiveView, BlobStorageService, CapacityPolicy, FavoriteEntry, FavoriteStore, FavoriteToggle,
    GeneratedImage, ImageGenerationService, ImageRef, Logo, LogoId, PortError, PortResult,
    SessionConfig, SessionController, SessionError, TempImageHandle,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

//=========================================================================================
// Test doubles
//=========================================================================================

#[derive(Default)]
struct ScriptedGenerator {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    // 1-based call numbers that fail.
    failing_calls: Mutex<HashSet<usize>>,
    // 1-based call numbers that never answer.
    stalled_calls: Mutex<HashSet<usize>>,
}

impl ScriptedGenerator {
    fn fail_call(&self, n: usize) {
        self.failing_calls.lock().unwrap().insert(n);
    }

    fn stall_call(&self, n: usize) {
        self.stalled_calls.lock().unwrap().insert(n);
    }
}

#[async_trait]
impl ImageGenerationService for ScriptedGenerator {
    async fn generate_image(&self, prompt: &str) -> PortResult<GeneratedImage> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.failing_calls.lock().unwrap().contains(&n) {
            return Err(PortError::Unexpected(format!("call {} failed", n)));
        }
        if self.stalled_calls.lock().unwrap().contains(&n) {
            std::future::pending::<()>().await;
        }
        Ok(GeneratedImage {
            url: format!("https://images.test/{}.png", n),
        })
    }
}

/// Blocks every request until the test opens the gate.
struct GatedGenerator {
    started: Notify,
    gate: Semaphore,
}

#[async_trait]
impl ImageGenerationService for GatedGenerator {
    async fn generate_image(&self, _prompt: &str) -> PortResult<GeneratedImage> {
        self.started.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .forget();
        Ok(GeneratedImage {
            url: "https://images.test/gated.png".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingBlobs {
    next: AtomicUsize,
    created: Mutex<Vec<TempImageHandle>>,
    revoked: Mutex<Vec<TempImageHandle>>,
    downloads: Mutex<Vec<(String, Bytes)>>,
    fetched: Mutex<Vec<String>>,
}

impl RecordingBlobs {
    fn live(&self) -> HashSet<TempImageHandle> {
        let created: HashSet<_> = self.created.lock().unwrap().iter().cloned().collect();
        let revoked: HashSet<_> = self.revoked.lock().unwrap().iter().cloned().collect();
        created.difference(&revoked).cloned().collect()
    }
}

#[async_trait]
impl BlobStorageService for RecordingBlobs {
    async fn fetch_as_binary(&self, url: &str) -> PortResult<Bytes> {
        self.fetched.lock().unwrap().push(url.to_string());
        Ok(Bytes::from(format!("bytes of {}", url)))
    }

    fn create_temporary_url(&self, _data: Bytes) -> TempImageHandle {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let handle = TempImageHandle {
            key: n.to_string(),
            url: format!("/images/{}", n),
        };
        self.created.lock().unwrap().push(handle.clone());
        handle
    }

    fn revoke_temporary_url(&self, handle: &TempImageHandle) {
        self.revoked.lock().unwrap().push(handle.clone());
    }

    async fn trigger_download(&self, data: Bytes, filename: &str) -> PortResult<()> {
        self.downloads
            .lock()
            .unwrap()
            .push((filename.to_string(), data));
        Ok(())
    }
}

#[derive(Default)]
struct MemoryStore {
    entries: Mutex<Vec<FavoriteEntry>>,
}

impl MemoryStore {
    fn ids(&self) -> Vec<LogoId> {
        self.entries.lock().unwrap().iter().map(|e| e.id()).collect()
    }
}

#[async_trait]
impl FavoriteStore for MemoryStore {
    async fn persist_favorite(&self, entry: &FavoriteEntry) -> PortResult<bool> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(true)
    }

    async fn remove_favorite_persisted(&self, id: LogoId) -> PortResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.id() != id);
        Ok(entries.len() != before)
    }

    async fn list_persisted_favorites(&self) -> PortResult<Vec<FavoriteEntry>> {
        Ok(self.entries.lock().unwrap().clone())
    }
}

/// Parks `persist_favorite` until the test opens the gate.
struct GatedStore {
    inner: MemoryStore,
    persist_started: Notify,
    gate: Semaphore,
}

#[async_trait]
impl FavoriteStore for GatedStore {
    async fn persist_favorite(&self, entry: &FavoriteEntry) -> PortResult<bool> {
        self.persist_started.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .forget();
        self.inner.persist_favorite(entry).await
    }

    async fn remove_favorite_persisted(&self, id: LogoId) -> PortResult<bool> {
        self.inner.remove_favorite_persisted(id).await
    }

    async fn list_persisted_favorites(&self) -> PortResult<Vec<FavoriteEntry>> {
        self.inner.list_persisted_favorites().await
    }
}

struct Harness {
    generator: Arc<ScriptedGenerator>,
    blobs: Arc<RecordingBlobs>,
    store: Arc<MemoryStore>,
    session: SessionController,
}

fn harness_with(config: SessionConfig) -> Harness {
    let generator = Arc::new(ScriptedGenerator::default());
    let blobs = Arc::new(RecordingBlobs::default());
    let store = Arc::new(MemoryStore::default());
    let session = SessionController::new(generator.clone(), blobs.clone(), store.clone(), config);
    Harness {
        generator,
        blobs,
        store,
        session,
    }
}

fn harness() -> Harness {
    harness_with(SessionConfig::default())
}

fn stored_logo(created_offset_secs: i64) -> Logo {
    Logo {
        id: Uuid::new_v4(),
        image: ImageRef {
            source_url: "https://images.test/stored.png".to_string(),
            display_url: None,
            data: Bytes::from_static(b"stored"),
        },
        prompt: "stored".to_string(),
        created_at: Utc::now() + Duration::seconds(created_offset_secs),
    }
}

//=========================================================================================
// Purchase and generation
//=========================================================================================

#[tokio::test]
async fn new_session_is_unpaid_and_empty() {
    let h = harness();
    let snapshot = h.session.snapshot().await;
    assert!(!snapshot.has_paid);
    assert_eq!(snapshot.credits_remaining, 0);
    assert!(snapshot.current_batch.is_empty());
    assert_eq!(snapshot.favorites_count, 0);
    assert_eq!(snapshot.favorites_capacity, 50);
    assert_eq!(snapshot.active_view, ActiveView::Generate);
}

#[tokio::test]
async fn purchase_grants_five_credits_each_time() {
    let h = harness();
    let snapshot = h.session.purchase().await;
    assert!(snapshot.has_paid);
    assert_eq!(snapshot.credits_remaining, 5);

    let snapshot = h.session.purchase().await;
    assert_eq!(snapshot.credits_remaining, 10);
}

#[tokio::test]
async fn generate_without_credits_changes_nothing() {
    let h = harness();
    let err = h.session.generate("fox").await.unwrap_err();
    assert!(matches!(err, SessionError::NoCredits));
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.credits_remaining, 0);
    assert!(snapshot.current_batch.is_empty());
}

#[tokio::test]
async fn blank_prompt_is_rejected() {
    let h = harness();
    h.session.purchase().await;
    let err = h.session.generate("   ").await.unwrap_err();
    assert!(matches!(err, SessionError::EmptyPrompt));
    assert_eq!(h.session.snapshot().await.credits_remaining, 5);
}

#[tokio::test]
async fn successful_generation_replaces_batch_and_spends_one_credit() {
    let h = harness();
    h.session.purchase().await;

    let batch = h.session.generate("  fox ").await.unwrap();
    assert_eq!(batch.prompt, "fox");
    assert_eq!(batch.logos.len(), 4);
    assert!(batch.logos.iter().all(|l| l.prompt == "fox"));
    assert!(batch.logos.iter().all(|l| l.image.display_url.is_some()));

    let mut prompts = h.generator.prompts.lock().unwrap().clone();
    prompts.sort();
    assert_eq!(
        prompts,
        (1..=4)
            .map(|i| format!(
                "fox. Logo design {}. Clean, professional, minimalist style.",
                i
            ))
            .collect::<Vec<_>>()
    );

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.credits_remaining, 4);
    let ids: Vec<_> = snapshot.current_batch.iter().map(|l| l.id).collect();
    assert_eq!(ids, batch.logos.iter().map(|l| l.id).collect::<Vec<_>>());
    assert!(!snapshot.is_generating);
}

#[tokio::test]
async fn partial_failure_keeps_previous_batch_and_credits() {
    let h = harness();
    h.session.purchase().await;
    let first = h.session.generate("fox").await.unwrap();

    h.generator.fail_call(6);
    let err = h.session.generate("owl").await.unwrap_err();
    match err {
        SessionError::Generation { failed, .. } => assert_eq!(failed, 1),
        other => panic!("unexpected error: {:?}", other),
    }

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.credits_remaining, 4);
    let ids: Vec<_> = snapshot.current_batch.iter().map(|l| l.id).collect();
    assert_eq!(ids, first.logos.iter().map(|l| l.id).collect::<Vec<_>>());

    // Only the first batch's four URLs remain alive; the failed attempt's were released.
    assert_eq!(h.blobs.created.lock().unwrap().len(), 7);
    assert_eq!(h.blobs.live().len(), 4);
    assert!(!h.session.snapshot().await.is_generating);
}

#[tokio::test]
async fn session_stays_usable_after_a_failed_generation() {
    let h = harness();
    h.session.purchase().await;
    h.generator.fail_call(1);
    assert!(h.session.generate("fox").await.is_err());

    let batch = h.session.generate("fox").await.unwrap();
    assert_eq!(batch.logos.len(), 4);
    assert_eq!(h.session.snapshot().await.credits_remaining, 4);
}

#[tokio::test]
async fn replacing_a_batch_revokes_its_temporary_urls() {
    let h = harness();
    h.session.purchase().await;
    h.session.generate("fox").await.unwrap();
    let first_handles: HashSet<_> = h.blobs.live();
    assert_eq!(first_handles.len(), 4);

    h.session.generate("owl").await.unwrap();
    let live = h.blobs.live();
    assert_eq!(live.len(), 4);
    assert!(live.is_disjoint(&first_handles));
}

#[tokio::test]
async fn shutdown_and_drop_release_temporary_urls() {
    let h = harness();
    h.session.purchase().await;
    h.session.generate("fox").await.unwrap();
    h.session.shutdown().await;
    assert!(h.blobs.live().is_empty());
    assert!(h.session.snapshot().await.current_batch.is_empty());

    let Harness { blobs, session, .. } = harness();
    session.purchase().await;
    session.generate("fox").await.unwrap();
    assert_eq!(blobs.live().len(), 4);
    drop(session);
    assert!(blobs.live().is_empty());
}

#[tokio::test]
async fn concurrent_generation_is_rejected() {
    let generator = Arc::new(GatedGenerator {
        started: Notify::new(),
        gate: Semaphore::new(0),
    });
    let blobs = Arc::new(RecordingBlobs::default());
    let session = Arc::new(SessionController::new(
        generator.clone(),
        blobs,
        Arc::new(MemoryStore::default()),
        SessionConfig::default(),
    ));
    session.purchase().await;

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.generate("fox").await }
    });
    generator.started.notified().await;

    assert!(session.snapshot().await.is_generating);
    let err = session.generate("owl").await.unwrap_err();
    assert!(matches!(err, SessionError::GenerationInProgress));

    generator.gate.add_permits(4);
    let batch = pending.await.unwrap().unwrap();
    assert_eq!(batch.logos.len(), 4);
    assert_eq!(session.snapshot().await.credits_remaining, 4);
}

#[tokio::test]
async fn cancelled_generation_releases_its_temporary_urls() {
    let h = harness();
    h.session.purchase().await;
    // Three images arrive, the fourth never does, and the caller gives up.
    h.generator.stall_call(4);

    let outcome = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        h.session.generate("fox"),
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(h.blobs.created.lock().unwrap().len(), 3);
    assert!(h.blobs.live().is_empty());

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.credits_remaining, 5);
    assert!(snapshot.current_batch.is_empty());
    assert!(!snapshot.is_generating);

    h.session.shutdown().await;
    assert!(h.blobs.live().is_empty());

    // The abandoned attempt does not block the next one.
    let batch = h.session.generate("fox").await.unwrap();
    assert_eq!(batch.logos.len(), 4);
    assert_eq!(h.blobs.live().len(), 4);
    assert_eq!(h.session.snapshot().await.credits_remaining, 4);
}

//=========================================================================================
// Favorites
//=========================================================================================

#[tokio::test]
async fn toggle_twice_restores_membership() {
    let h = harness();
    h.session.purchase().await;
    let batch = h.session.generate("fox").await.unwrap();
    let id = batch.logos[0].id;

    let outcome = h.session.toggle_favorite(id).await.unwrap();
    assert_eq!(outcome, FavoriteToggle::Added { evicted: None });
    assert!(h.session.is_favorite(id).await);
    assert_eq!(h.store.ids(), vec![id]);

    let outcome = h.session.toggle_favorite(id).await.unwrap();
    assert_eq!(outcome, FavoriteToggle::Removed);
    assert!(!h.session.is_favorite(id).await);
    assert!(h.store.ids().is_empty());
}

#[tokio::test]
async fn toggling_an_unknown_logo_fails() {
    let h = harness();
    let id = Uuid::new_v4();
    let err = h.session.toggle_favorite(id).await.unwrap_err();
    assert!(matches!(err, SessionError::LogoNotFound(missing) if missing == id));
}

#[tokio::test]
async fn favorites_survive_batch_replacement() {
    let h = harness();
    h.session.purchase().await;
    let first = h.session.generate("fox").await.unwrap();
    let id = first.logos[2].id;
    h.session.toggle_favorite(id).await.unwrap();

    h.session.generate("owl").await.unwrap();
    assert!(h.session.is_favorite(id).await);
    let favorite = h.session.favorite(id).await.unwrap();
    assert_eq!(favorite.logo.prompt, "fox");
    // The batch URL died with the batch; the favorite keeps only its bytes.
    assert!(favorite.logo.image.display_url.is_none());
    assert!(!favorite.logo.image.data.is_empty());

    // Still removable after its batch is gone.
    assert_eq!(
        h.session.toggle_favorite(id).await.unwrap(),
        FavoriteToggle::Removed
    );
}

#[tokio::test]
async fn removing_while_a_favorite_is_being_persisted_leaves_nothing_stored() {
    let store = Arc::new(GatedStore {
        inner: MemoryStore::default(),
        persist_started: Notify::new(),
        gate: Semaphore::new(0),
    });
    let session = Arc::new(SessionController::new(
        Arc::new(ScriptedGenerator::default()),
        Arc::new(RecordingBlobs::default()),
        store.clone(),
        SessionConfig::default(),
    ));
    session.purchase().await;
    let id = session.generate("fox").await.unwrap().logos[0].id;

    let adding = tokio::spawn({
        let session = session.clone();
        async move { session.toggle_favorite(id).await }
    });
    store.persist_started.notified().await;

    let removing = tokio::spawn({
        let session = session.clone();
        async move { session.remove_favorite(id).await }
    });
    // Let the removal run while the add is still writing.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    store.gate.add_permits(1);

    assert_eq!(
        adding.await.unwrap().unwrap(),
        FavoriteToggle::Added { evicted: None }
    );
    removing.await.unwrap();

    assert!(!session.is_favorite(id).await);
    assert!(store.inner.ids().is_empty());
    assert_eq!(session.restore_favorites().await.unwrap(), 0);
}

#[tokio::test]
async fn remove_favorite_is_idempotent() {
    let h = harness();
    h.session.purchase().await;
    let batch = h.session.generate("fox").await.unwrap();
    let id = batch.logos[0].id;
    h.session.toggle_favorite(id).await.unwrap();

    h.session.remove_favorite(id).await;
    h.session.remove_favorite(id).await;
    h.session.remove_favorite(Uuid::new_v4()).await;
    assert!(!h.session.is_favorite(id).await);
    assert_eq!(h.session.snapshot().await.favorites_count, 0);
}

#[tokio::test]
async fn walkthrough_fills_favorites_to_capacity_then_rejects() {
    let h = harness();
    let snapshot = h.session.purchase().await;
    assert_eq!(snapshot.credits_remaining, 5);

    let batch = h.session.generate("fox").await.unwrap();
    assert_eq!(h.session.snapshot().await.credits_remaining, 4);
    assert_eq!(batch.logos.len(), 4);

    h.session.toggle_favorite(batch.logos[0].id).await.unwrap();
    assert_eq!(h.session.snapshot().await.favorites_count, 1);

    let mut pending: Vec<LogoId> = batch.logos[1..].iter().map(|l| l.id).collect();
    let mut count = 1;
    while count < 50 {
        if pending.is_empty() {
            if h.session.snapshot().await.credits_remaining == 0 {
                h.session.purchase().await;
            }
            let next = h.session.generate("fox").await.unwrap();
            pending = next.logos.iter().map(|l| l.id).collect();
        }
        let id = pending.remove(0);
        h.session.toggle_favorite(id).await.unwrap();
        count += 1;
    }
    assert_eq!(h.session.snapshot().await.favorites_count, 50);

    if pending.is_empty() {
        h.session.purchase().await;
        pending = h
            .session
            .generate("fox")
            .await
            .unwrap()
            .logos
            .iter()
            .map(|l| l.id)
            .collect();
    }
    let extra = pending[0];
    let err = h.session.toggle_favorite(extra).await.unwrap_err();
    assert!(matches!(err, SessionError::FavoritesFull { capacity: 50 }));
    assert_eq!(h.session.snapshot().await.favorites_count, 50);
    assert!(!h.session.is_favorite(extra).await);
    assert_eq!(h.store.ids().len(), 50);
}

#[tokio::test]
async fn evict_oldest_policy_makes_room() {
    let h = harness_with(SessionConfig {
        favorites_capacity: 2,
        capacity_policy: CapacityPolicy::EvictOldest,
        ..SessionConfig::default()
    });
    h.session.purchase().await;
    let batch = h.session.generate("fox").await.unwrap();
    let ids: Vec<_> = batch.logos.iter().map(|l| l.id).collect();

    h.session.toggle_favorite(ids[0]).await.unwrap();
    h.session.toggle_favorite(ids[1]).await.unwrap();
    let outcome = h.session.toggle_favorite(ids[2]).await.unwrap();

    assert_eq!(outcome, FavoriteToggle::Added { evicted: Some(ids[0]) });
    assert!(!h.session.is_favorite(ids[0]).await);
    assert_eq!(h.store.ids(), vec![ids[1], ids[2]]);
}

#[tokio::test]
async fn favorites_are_listed_newest_first() {
    let h = harness();
    h.session.purchase().await;
    let batch = h.session.generate("fox").await.unwrap();
    for logo in &batch.logos {
        h.session.toggle_favorite(logo.id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let listed: Vec<_> = h
        .session
        .list_favorites_newest_first()
        .await
        .iter()
        .map(|e| e.id())
        .collect();
    let mut expected: Vec<_> = batch.logos.iter().map(|l| l.id).collect();
    expected.reverse();
    assert_eq!(listed, expected);
}

#[tokio::test]
async fn clear_favorites_empties_memory_and_store() {
    let h = harness();
    h.session.purchase().await;
    let batch = h.session.generate("fox").await.unwrap();
    for logo in &batch.logos {
        h.session.toggle_favorite(logo.id).await.unwrap();
    }

    assert_eq!(h.session.clear_favorites().await, 4);
    assert_eq!(h.session.snapshot().await.favorites_count, 0);
    assert!(h.store.ids().is_empty());
}

#[tokio::test]
async fn restore_favorites_loads_persisted_entries_up_to_capacity() {
    let h = harness_with(SessionConfig {
        favorites_capacity: 3,
        ..SessionConfig::default()
    });
    for i in 0..5 {
        let entry = FavoriteEntry::new(stored_logo(i), Utc::now() + Duration::seconds(i));
        h.store.persist_favorite(&entry).await.unwrap();
    }

    let restored = h.session.restore_favorites().await.unwrap();
    assert_eq!(restored, 3);
    assert_eq!(h.session.snapshot().await.favorites_count, 3);

    let persisted = h.store.ids();
    for id in &persisted[..3] {
        assert!(h.session.is_favorite(*id).await);
    }
}

//=========================================================================================
// Views and downloads
//=========================================================================================

#[tokio::test]
async fn active_view_can_be_switched() {
    let h = harness();
    h.session.set_active_view(ActiveView::Favorites).await;
    assert_eq!(h.session.snapshot().await.active_view, ActiveView::Favorites);
}

#[tokio::test]
async fn download_uses_held_bytes_and_names_the_file() {
    let h = harness();
    h.session.purchase().await;
    let batch = h.session.generate("fox").await.unwrap();
    let logo = &batch.logos[1];

    let download = h.session.download(logo.id).await.unwrap();
    assert_eq!(download.filename, format!("logosnap-logo-{}.png", logo.id));
    assert_eq!(download.data, logo.image.data);

    let downloads = h.blobs.downloads.lock().unwrap();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].0, download.filename);
}

#[tokio::test]
async fn download_of_a_favorite_without_bytes_fetches_its_source() {
    let h = harness();
    let mut logo = stored_logo(0);
    logo.image.data = Bytes::new();
    let id = logo.id;
    h.store
        .persist_favorite(&FavoriteEntry::new(logo, Utc::now()))
        .await
        .unwrap();
    h.session.restore_favorites().await.unwrap();

    let download = h.session.download(id).await.unwrap();
    assert_eq!(
        download.data,
        Bytes::from("bytes of https://images.test/stored.png")
    );
    assert!(h
        .blobs
        .fetched
        .lock()
        .unwrap()
        .contains(&"https://images.test/stored.png".to_string()));
}

#[tokio::test]
async fn download_of_an_unknown_logo_fails() {
    let h = harness();
    let err = h.session.download(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, SessionError::LogoNotFound(_)));
}
