//! Live log tailer against the in-memory API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{session_log, t0, LogScript, MockApi};
use operator_console::{LogTailer, Viewport};
use shared_types::{LogEntryKind, RunStatus, Step, StepStatus};

fn api_with(logs: &[(&str, RunStatus, LogScript)]) -> Arc<MockApi> {
    let api = Arc::new(MockApi::new());
    {
        let mut state = api.state();
        for (i, (id, status, script)) in logs.iter().enumerate() {
            state.logs.push(session_log(id, "c1", i as i64, *status));
            state.log_scripts.insert(id.to_string(), script.clone());
        }
    }
    api
}

fn step(id: &str, log_id: Option<&str>, status: StepStatus) -> Step {
    Step {
        id: id.to_string(),
        tool: "ssh".to_string(),
        label: "Run df".to_string(),
        icon: "terminal".to_string(),
        args_payload: r#"{"command":"df -h"}"#.to_string(),
        status,
        result: Some("/dev/sda1 42%".to_string()),
        content_offset: None,
        log_id: log_id.map(str::to_string),
        model_name: None,
        started_at: Some(t0()),
        finished_at: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_follows_running_log_until_finished() {
    let api = api_with(&[(
        "run",
        RunStatus::Running,
        LogScript {
            finish_on: Some(3),
            grow: true,
            ..LogScript::default()
        },
    )]);
    let tailer = LogTailer::new(api.clone(), common::test_config());

    assert!(tailer.open("run", false).await.unwrap());
    assert!(tailer.is_polling());
    assert_eq!(tailer.log().unwrap().entries.len(), 1);
    assert!(tailer.should_follow());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(api.log_fetches("run"), 3);
    assert!(!tailer.is_polling());

    let log = tailer.log().unwrap();
    assert_eq!(log.status, RunStatus::Finished);
    assert_eq!(log.entries.len(), 3);
    assert!(tailer.should_follow());
    assert!(!tailer.should_follow(), "nothing new since the last check");
}

#[tokio::test(start_paused = true)]
async fn test_finished_log_is_fetched_once() {
    let api = api_with(&[("done", RunStatus::Finished, LogScript::default())]);
    let tailer = LogTailer::new(api.clone(), common::test_config());

    assert!(tailer.open("done", false).await.unwrap());
    assert!(!tailer.is_polling());
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(api.log_fetches("done"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switching_discards_stale_response() {
    let api = api_with(&[
        (
            "slow",
            RunStatus::Running,
            LogScript {
                delay: Duration::from_secs(1),
                ..LogScript::default()
            },
        ),
        ("fast", RunStatus::Finished, LogScript::default()),
    ]);
    let tailer = LogTailer::new(api.clone(), common::test_config());

    let (slow, fast) = tokio::join!(tailer.open("slow", true), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        tailer.open("fast", false).await
    });

    assert!(!slow.unwrap(), "superseded response is dropped");
    assert!(fast.unwrap());
    assert_eq!(tailer.log_id().as_deref(), Some("fast"));
    assert_eq!(tailer.log().unwrap().id, "fast");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(api.log_fetches("slow"), 1, "no poller for the old selection");
    assert!(!tailer.is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_switching_cancels_previous_poller() {
    let api = api_with(&[
        ("first", RunStatus::Running, LogScript::default()),
        ("second", RunStatus::Running, LogScript::default()),
    ]);
    let tailer = LogTailer::new(api.clone(), common::test_config());

    tailer.open("first", false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(api.log_fetches("first"), 3);

    tailer.open("second", false).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(api.log_fetches("first"), 3);
    assert!(api.log_fetches("second") > 1);
    assert_eq!(tailer.log().unwrap().id, "second");
}

#[tokio::test(start_paused = true)]
async fn test_step_completion_settles_poller() {
    let api = api_with(&[("trace", RunStatus::Running, LogScript::default())]);
    let tailer = LogTailer::new(api.clone(), common::test_config());

    let running = step("st1", Some("trace"), StepStatus::Running);
    assert!(tailer.select_step(&running).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(api.log_fetches("trace"), 3);

    // Updates for other steps are ignored.
    tailer.step_updated(&step("other", Some("trace"), StepStatus::Completed));
    assert!(tailer.is_polling());

    api.state().logs[0].status = RunStatus::Finished;
    tailer.step_updated(&step("st1", Some("trace"), StepStatus::Completed));
    assert!(!tailer.is_polling());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(api.log_fetches("trace"), 4, "exactly one trailing fetch");
    assert_eq!(tailer.log().unwrap().status, RunStatus::Finished);
}

#[tokio::test(start_paused = true)]
async fn test_step_without_log_shows_synthesized_entries() {
    let api = Arc::new(MockApi::new());
    let tailer = LogTailer::new(api, common::test_config());

    let mut done = step("st2", None, StepStatus::Completed);
    done.finished_at = Some(t0() + chrono::Duration::seconds(2));
    assert!(!tailer.select_step(&done).await.unwrap());
    assert!(tailer.log().is_none());

    let entries = tailer.entries(t0());
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, LogEntryKind::Command);
    assert_eq!(entries[1].kind, LogEntryKind::Output);
    assert_eq!(entries[1].content, "/dev/sda1 42%");

    tailer.close();
    assert!(tailer.entries(t0()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_manual_scroll_up_is_respected() {
    let api = api_with(&[(
        "run",
        RunStatus::Running,
        LogScript {
            grow: true,
            ..LogScript::default()
        },
    )]);
    let tailer = LogTailer::new(api, common::test_config());
    tailer.open("run", false).await.unwrap();
    assert!(tailer.should_follow());

    tailer.on_scroll(Viewport {
        scroll_top: 0,
        viewport_height: 300,
        content_height: 1200,
    });
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!tailer.should_follow());

    tailer.on_scroll(Viewport {
        scroll_top: 880,
        viewport_height: 300,
        content_height: 1200,
    });
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(tailer.should_follow());
}
