use leancanvas::canvas_store::{CanvasStore, DebouncedSaver};
use leancanvas::client_wrapper::Role;
use leancanvas::memory::{ThreadMessage, ThreadStore};
use leancanvas::{mutation, CanvasState};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_canvases_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("canvases.json");

    let store = CanvasStore::open(&path).await;
    let canvas = mutation::add_item(&CanvasState::initial(), "channels", None, "Newsletter");
    store.save("c1", canvas.clone()).await.unwrap();
    store.rename("c1", "Newsletter tools").await.unwrap();
    drop(store);

    let reopened = CanvasStore::open(&path).await;
    let record = reopened.get("c1").await.unwrap();
    assert_eq!(record.state, canvas);
    assert_eq!(record.name, "Newsletter tools");
    assert_eq!(reopened.state_or_initial("missing").await, CanvasState::initial());
}

#[tokio::test]
async fn test_debounced_saves_per_canvas() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CanvasStore::open(dir.path().join("canvases.json")).await);
    let saver = DebouncedSaver::new(store.clone(), Duration::from_millis(20));

    let base = CanvasState::initial();
    for value in ["a", "ab", "abc"] {
        saver
            .schedule("c1", mutation::add_item(&base, "solution", None, value))
            .await;
    }
    saver.schedule("c2", base.clone()).await;
    assert_eq!(saver.pending_count().await, 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(saver.pending_count().await, 0);
    let saved = store.get("c1").await.unwrap().state;
    assert_eq!(
        saved.get("solution").unwrap().items,
        Some(vec!["abc".to_string()])
    );
    assert_eq!(store.list().await.len(), 2);
}

#[tokio::test]
async fn test_threads_persist_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = ThreadStore::with_dir(dir.path());
    store
        .append(
            "canvas/1",
            vec![
                ThreadMessage::new("u1", Role::User, "What is my UVP?"),
                ThreadMessage::new("a1", Role::Assistant, "Let's rank problems first."),
            ],
        )
        .await
        .unwrap();

    let fresh = ThreadStore::with_dir(dir.path());
    let history = fresh.history("canvas/1").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].to_ui_message().text_content(), "Let's rank problems first.");

    fresh.clear("canvas/1").await.unwrap();
    assert!(ThreadStore::with_dir(dir.path()).history("canvas/1").await.is_empty());
}

#[tokio::test]
async fn test_similar_thread_ids_keep_separate_histories() {
    let dir = tempfile::tempdir().unwrap();
    let store = ThreadStore::with_dir(dir.path());
    store
        .append("team/alpha", vec![ThreadMessage::new("u1", Role::User, "alpha secret")])
        .await
        .unwrap();
    store
        .append("team_alpha", vec![ThreadMessage::new("u2", Role::User, "other canvas")])
        .await
        .unwrap();

    let reopened = ThreadStore::with_dir(dir.path());
    let slash: Vec<String> = reopened
        .history("team/alpha")
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    let underscore: Vec<String> = reopened
        .history("team_alpha")
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(slash, vec!["alpha secret"]);
    assert_eq!(underscore, vec!["other canvas"]);
}
