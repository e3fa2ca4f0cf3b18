//! End-to-end dispatcher behavior against recording collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use nexus_agent::{Dispatcher, DispatcherConfig, REMINDER_TITLE};
use nexus_kernel::{
    EventBus, GuiAction, Scheduler, SchedulerConfig, TASK_COMPLETED, TASK_FAILED, TASK_STARTED,
    TASK_SUBMITTED, TaskDescriptor, TaskKind, TaskStatus,
};

use common::{MockActuator, MockSearch, Mocks, RecordingStore, dispatcher, record_events, settle};

fn open(app: &str) -> TaskDescriptor {
    TaskDescriptor::new(
        format!("Open {app}"),
        TaskKind::GuiAutomation(GuiAction::Open { app: app.into() }),
    )
}

fn respond(text: &str) -> TaskDescriptor {
    TaskDescriptor::new("Greeting", TaskKind::Response { text: text.into() })
}

fn shell(command: &str) -> TaskDescriptor {
    TaskDescriptor::new(format!("Run {command}"), TaskKind::Shell { command: command.into() })
}

// ---------------------------------------------------------------------------
// Open fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_app_opens_its_website() {
    let store = Arc::new(RecordingStore::default());
    let mocks = Mocks::new(
        MockActuator::missing_apps(),
        MockSearch::with_urls(&["https://unknownapp.example.com", "https://other.example.com"]),
    );
    let dispatcher = dispatcher(store.clone(), &mocks);

    let task = dispatcher.submit_descriptor(open("unknownapp")).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.result.unwrap().contains("https://unknownapp.example.com"));
    assert_eq!(
        *mocks.search.queries.lock().unwrap(),
        vec!["unknownapp official website".to_string()]
    );
    assert_eq!(
        *mocks.automation.opened.lock().unwrap(),
        vec!["https://unknownapp.example.com".to_string()]
    );

    let notices = mocks.actuator.notifications.lock().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0, "Nexus");
}

#[tokio::test]
async fn unknown_app_without_website_fails() {
    let store = Arc::new(RecordingStore::default());
    let mocks = Mocks::new(MockActuator::missing_apps(), MockSearch::default());
    let dispatcher = dispatcher(store.clone(), &mocks);

    let task = dispatcher.submit_descriptor(open("ghostapp")).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("open failed: ghostapp is not installed"));
    assert!(mocks.automation.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn other_gui_failures_fail_the_task() {
    let store = Arc::new(RecordingStore::default());
    let mocks = Mocks::new(MockActuator::missing_apps(), MockSearch::with_urls(&["https://x.example"]));
    let dispatcher = dispatcher(store.clone(), &mocks);

    let close = TaskDescriptor::new(
        "Close vlc",
        TaskKind::GuiAutomation(GuiAction::Close { app: "vlc".into() }),
    );
    let task = dispatcher.submit_descriptor(close).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("close failed: vlc is not running"));
    assert!(mocks.search.queries.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Dispatch table
// ---------------------------------------------------------------------------

#[tokio::test]
async fn media_queries_go_to_the_player() {
    let store = Arc::new(RecordingStore::default());
    let mocks = Mocks::default();
    let dispatcher = dispatcher(store.clone(), &mocks);

    let play = TaskDescriptor::new("Play jazz", TaskKind::WebSearch { query: "jazz song".into() });
    let task = dispatcher.submit_descriptor(play).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.result.as_deref(), Some("Playing jazz song"));
    assert_eq!(*mocks.automation.played.lock().unwrap(), vec!["jazz song".to_string()]);
    assert!(mocks.search.queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn plain_queries_report_the_hit_count() {
    let store = Arc::new(RecordingStore::default());
    let mocks = Mocks::new(
        MockActuator::working(),
        MockSearch::with_urls(&["https://a.example", "https://b.example"]),
    );
    let dispatcher = dispatcher(store.clone(), &mocks);

    let search = TaskDescriptor::new(
        "Search: rust traits",
        TaskKind::WebSearch { query: "rust traits".into() },
    );
    let task = dispatcher.submit_descriptor(search).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.result.as_deref(), Some("Search results for 'rust traits': 2 found"));
    assert!(mocks.automation.played.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reminders_notify_with_their_title() {
    let store = Arc::new(RecordingStore::default());
    let mocks = Mocks::default();
    let dispatcher = dispatcher(store.clone(), &mocks);

    let reminder = TaskDescriptor::new(
        "Remind: stretch",
        TaskKind::Reminder { message: "stretch".into() },
    );
    let task = dispatcher.submit_descriptor(reminder).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.result.as_deref(), Some("Reminder sent: stretch"));
    assert_eq!(
        *mocks.actuator.notifications.lock().unwrap(),
        vec![(REMINDER_TITLE.to_string(), "stretch".to_string())]
    );
}

#[tokio::test]
async fn shell_output_includes_stderr_only_when_present() {
    let store = Arc::new(RecordingStore::default());
    let mocks = Mocks::default();
    let dispatcher = dispatcher(store.clone(), &mocks);

    let quiet = dispatcher.submit_descriptor(shell("ls")).await.unwrap();
    let noisy = dispatcher.submit_descriptor(shell("warn")).await.unwrap();

    let quiet = settle(store.as_ref(), quiet.id).await;
    let noisy = settle(store.as_ref(), noisy.id).await;

    assert_eq!(quiet.result.as_deref(), Some("Command executed. Output: ls"));
    assert_eq!(
        noisy.result.as_deref(),
        Some("Command executed. Output: partial Error: careful")
    );
}

#[tokio::test]
async fn shell_errors_fail_the_task() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = dispatcher(store.clone(), &Mocks::default());

    let task = dispatcher.submit_descriptor(shell("fail")).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("invalid input: refused"));
}

#[tokio::test]
async fn empty_response_uses_the_description() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = dispatcher(store.clone(), &Mocks::default());

    let task = dispatcher.submit_descriptor(respond("")).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.result.as_deref(), Some("Greeting"));
}

#[tokio::test]
async fn general_work_reports_the_description() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = dispatcher(store.clone(), &Mocks::default());

    let general = TaskDescriptor::new("Check Emails", TaskKind::general(Some("email"), 2));
    let task = dispatcher.submit_descriptor(general).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.result.as_deref(), Some("Executed: Check Emails"));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transitions_are_recorded_before_events() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = dispatcher(store.clone(), &Mocks::default());
    let events = record_events(dispatcher.bus());

    let task = dispatcher.submit_descriptor(respond("hi")).await.unwrap();
    settle(store.as_ref(), task.id).await;

    for _ in 0..100 {
        if events.lock().unwrap().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        store.statuses(task.id),
        vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Completed]
    );
    let topics: Vec<String> = events.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
    assert_eq!(topics, vec![TASK_SUBMITTED, TASK_STARTED, TASK_COMPLETED]);
    assert!(events.lock().unwrap().iter().all(|(_, id)| *id == Some(task.id)));
}

#[tokio::test]
async fn panics_become_failed_tasks() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = dispatcher(store.clone(), &Mocks::default());
    let events = record_events(dispatcher.bus());

    let task = dispatcher.submit_descriptor(shell("panic")).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(done.error.as_deref(), Some("task panicked: boom"));
    assert_eq!(
        store.statuses(task.id),
        vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Failed]
    );

    // The pool survives the panic.
    let next = dispatcher.submit_descriptor(respond("still here")).await.unwrap();
    assert_eq!(settle(store.as_ref(), next.id).await.status, TaskStatus::Completed);

    assert!(events.lock().unwrap().iter().any(|(t, id)| t == TASK_FAILED && *id == Some(task.id)));
}

#[tokio::test]
async fn persistence_failure_marks_the_task_failed() {
    let store = Arc::new(RecordingStore::failing_on(TaskStatus::Completed));
    let dispatcher = dispatcher(store.clone(), &Mocks::default());

    let task = dispatcher.submit_descriptor(respond("hi")).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error.unwrap().starts_with("persistence error"));
    assert_eq!(
        store.statuses(task.id),
        vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Failed]
    );
}

#[tokio::test]
async fn pending_write_failure_rejects_the_submission() {
    let store = Arc::new(RecordingStore::failing_on(TaskStatus::Pending));
    let dispatcher = dispatcher(store.clone(), &Mocks::default());

    let err = dispatcher.submit_descriptor(respond("hi")).await.unwrap_err();
    assert!(err.to_string().starts_with("store error"));
    assert_eq!(store.len(), 0);
}

#[tokio::test]
async fn full_queue_rejects_before_persisting() {
    let store = Arc::new(RecordingStore::default());
    let mocks = Mocks::default();
    // Never started, so the single queue slot stays occupied.
    let scheduler = Scheduler::new(SchedulerConfig::new().with_queue_capacity(1));
    let dispatcher = Dispatcher::new(
        store.clone(),
        EventBus::new(),
        scheduler,
        mocks.collaborators(),
        DispatcherConfig::default(),
    );

    dispatcher.submit_descriptor(respond("first")).await.unwrap();
    let err = dispatcher.submit_descriptor(respond("second")).await.unwrap_err();

    assert!(err.is_queue_full());
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn shutdown_rejects_new_work() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = dispatcher(store.clone(), &Mocks::default());
    dispatcher.scheduler().shutdown();

    assert!(dispatcher.submit_descriptor(respond("late")).await.is_err());
    assert!(dispatcher.submit_descriptor(respond("later").with_delay(5)).await.is_err());
    assert_eq!(store.len(), 0);
}

// ---------------------------------------------------------------------------
// Deferred execution
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn scheduled_task_waits_for_its_time() {
    let store = Arc::new(RecordingStore::default());
    let dispatcher = dispatcher(store.clone(), &Mocks::default());
    let events = record_events(dispatcher.bus());

    let task = dispatcher
        .submit_descriptor(respond("later").with_delay(5))
        .await
        .unwrap();
    assert_eq!(dispatcher.scheduler().delayed(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.snapshot(task.id).unwrap().status, TaskStatus::Pending);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let done = store.snapshot(task.id).unwrap();
    assert!(done.status.is_terminal());
    assert_eq!(
        store.statuses(task.id),
        vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Completed]
    );

    // Deferred submissions are not announced; execution events still are.
    let topics: Vec<String> = events.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
    assert!(!topics.iter().any(|t| t == TASK_SUBMITTED));
    assert!(topics.iter().any(|t| t == TASK_STARTED));
}

#[tokio::test]
async fn open_success_skips_the_fallback() {
    let store = Arc::new(RecordingStore::default());
    let mocks = Mocks::new(MockActuator::working(), MockSearch::with_urls(&["https://x.example"]));
    let dispatcher = dispatcher(store.clone(), &mocks);

    let task = dispatcher.submit_descriptor(open("notepad")).await.unwrap();
    let done = settle(store.as_ref(), task.id).await;

    assert_eq!(done.result.as_deref(), Some("Opened notepad"));
    assert_eq!(*mocks.actuator.calls.lock().unwrap(), vec!["open notepad".to_string()]);
    assert!(mocks.search.queries.lock().unwrap().is_empty());
    assert!(mocks.actuator.notifications.lock().unwrap().is_empty());
}
