//! Session-log feed against the in-memory API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{session_log, MockApi};
use operator_console::LogFeed;
use shared_types::RunStatus;

fn seeded(count: usize) -> Arc<MockApi> {
    let api = Arc::new(MockApi::new());
    api.state().logs = (0..count)
        .map(|i| {
            let connection = if i % 2 == 0 { "c1" } else { "c2" };
            session_log(&format!("log{i:02}"), connection, i as i64, RunStatus::Finished)
        })
        .collect();
    api
}

fn ids(logs: &[shared_types::SessionLog]) -> Vec<&str> {
    logs.iter().map(|log| log.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_pages_newest_window() {
    let api = seeded(12);
    let feed = LogFeed::new(api.clone(), common::test_config(), None);

    feed.load().await.unwrap();
    assert!(feed.has_more());
    assert_eq!(feed.items().len(), 10);

    assert!(feed.load_more().await);
    assert!(!feed.has_more());

    let newest_first = feed.newest_first();
    assert_eq!(newest_first.len(), 12);
    assert_eq!(newest_first[0].id, "log11");
    assert_eq!(newest_first[11].id, "log00");
}

#[tokio::test(start_paused = true)]
async fn test_background_refresh_converges_running_logs() {
    let api = seeded(3);
    api.state().logs[2].status = RunStatus::Running;
    let feed = LogFeed::new(api.clone(), common::test_config(), None);

    feed.load().await.unwrap();
    assert!(feed.is_refreshing());
    assert!(feed.items()[2].is_running());

    api.state().logs[2].status = RunStatus::Finished;
    api.state()
        .logs
        .push(session_log("log03", "c2", 3, RunStatus::Running));

    tokio::time::sleep(Duration::from_millis(5100)).await;
    let items = feed.items();
    assert_eq!(ids(&items), vec!["log00", "log01", "log02", "log03"]);
    assert_eq!(items[2].status, RunStatus::Finished);

    feed.close();
    assert!(!feed.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failures_are_swallowed() {
    let api = seeded(2);
    let feed = LogFeed::new(api.clone(), common::test_config(), None);
    feed.load().await.unwrap();

    api.state().fail_logs = true;
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(feed.is_refreshing());
    assert_eq!(feed.items().len(), 2);
    assert_eq!(api.state().log_list_fetches, 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_load_empties_feed() {
    let api = seeded(4);
    let feed = LogFeed::new(api.clone(), common::test_config(), None);
    feed.load().await.unwrap();
    assert_eq!(feed.items().len(), 4);

    api.state().fail_logs = true;
    assert!(feed.load().await.is_err());
    assert!(feed.items().is_empty());
    assert!(!feed.has_more());
}

#[tokio::test(start_paused = true)]
async fn test_connection_filter() {
    let api = seeded(6);
    let feed = LogFeed::new(api.clone(), common::test_config(), Some("c1".to_string()));
    feed.load().await.unwrap();
    assert_eq!(ids(&feed.items()), vec!["log00", "log02", "log04"]);

    assert!(feed.toggle_expanded("log02"));
    assert_eq!(feed.expanded().as_deref(), Some("log02"));

    feed.set_connection(Some("c2".to_string())).await.unwrap();
    assert_eq!(feed.connection_id().as_deref(), Some("c2"));
    assert_eq!(feed.expanded(), None);
    assert_eq!(ids(&feed.items()), vec!["log01", "log03", "log05"]);
    assert!(feed.is_refreshing());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_expanded() {
    let api = seeded(2);
    let feed = LogFeed::new(api, common::test_config(), None);

    assert!(feed.toggle_expanded("log00"));
    assert!(feed.toggle_expanded("log01"), "expanding another row moves it");
    assert!(!feed.toggle_expanded("log01"));
    assert_eq!(feed.expanded(), None);
}

#[tokio::test(start_paused = true)]
async fn test_clear() {
    let api = seeded(12);
    let feed = LogFeed::new(api.clone(), common::test_config(), None);
    feed.load().await.unwrap();

    feed.clear().await.unwrap();
    assert!(feed.items().is_empty());
    assert!(!feed.has_more());
    assert!(api.state().logs.is_empty());

    api.state()
        .logs
        .push(session_log("new", "c1", 100, RunStatus::Running));
    tokio::time::sleep(Duration::from_millis(5100)).await;
    assert_eq!(ids(&feed.items()), vec!["new"]);
}
