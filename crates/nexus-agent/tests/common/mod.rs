//! Recording collaborators and an in-memory store shared by the agent
//! integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nexus_adapters::{
    ActionOutcome, Actuator, AdapterError, CommandOutput, SearchResult, ShellRunner,
    WebAutomation, WebSearch,
};
use nexus_agent::{Collaborators, Dispatcher, DispatcherConfig};
use nexus_kernel::{Event, EventBus, Scheduler, SchedulerConfig, TASK_TOPICS, Task, TaskId, TaskStatus};
use nexus_store::{StoreError, StoreResult, TaskRepository};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Keeps tasks in a map and records every status written.  Writes of
/// `fail_on` are refused with an I/O error.
#[derive(Default)]
pub struct RecordingStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
    history: Mutex<Vec<(TaskId, TaskStatus)>>,
    fail_on: Option<TaskStatus>,
}

impl RecordingStore {
    pub fn failing_on(status: TaskStatus) -> Self {
        Self {
            fail_on: Some(status),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn snapshot(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    pub fn statuses(&self, id: TaskId) -> Vec<TaskStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(task_id, _)| *task_id == id)
            .map(|(_, status)| *status)
            .collect()
    }
}

#[async_trait]
impl TaskRepository for RecordingStore {
    async fn upsert(&self, task: &Task) -> StoreResult<()> {
        if self.fail_on == Some(task.status) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.history.lock().unwrap().push((task.id, task.status));
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.snapshot(id))
    }

    async fn list(&self) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self.tasks.lock().unwrap().values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn list_by_status(&self, status: TaskStatus) -> StoreResult<Vec<Task>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|t| t.status == status)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Actuator whose `open` and `close` outcomes are fixed up front.
pub struct MockActuator {
    pub open_fails: bool,
    pub close_fails: bool,
    pub calls: Mutex<Vec<String>>,
    pub notifications: Mutex<Vec<(String, String)>>,
}

impl MockActuator {
    pub fn working() -> Self {
        Self {
            open_fails: false,
            close_fails: false,
            calls: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    pub fn missing_apps() -> Self {
        Self {
            open_fails: true,
            close_fails: true,
            ..Self::working()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Actuator for MockActuator {
    async fn open(&self, app: &str) -> ActionOutcome {
        self.record(format!("open {app}"));
        if self.open_fails {
            ActionOutcome::failure(format!("{app} is not installed"))
        } else {
            ActionOutcome::success(format!("Opened {app}"))
        }
    }

    async fn type_text(&self, text: &str) -> ActionOutcome {
        self.record(format!("type {text}"));
        ActionOutcome::success(format!("Typed: {text}"))
    }

    async fn press(&self, key: &str) -> ActionOutcome {
        self.record(format!("press {key}"));
        ActionOutcome::success(format!("Pressed {key}"))
    }

    async fn close(&self, app: &str) -> ActionOutcome {
        self.record(format!("close {app}"));
        if self.close_fails {
            ActionOutcome::failure(format!("{app} is not running"))
        } else {
            ActionOutcome::success(format!("Closed {app}"))
        }
    }

    async fn install(&self, app: &str) -> ActionOutcome {
        self.record(format!("install {app}"));
        ActionOutcome::success(format!("Installed {app}"))
    }

    async fn uninstall(&self, app: &str) -> ActionOutcome {
        self.record(format!("uninstall {app}"));
        ActionOutcome::success(format!("Uninstalled {app}"))
    }

    async fn notify(&self, title: &str, message: &str) -> ActionOutcome {
        self.notifications
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
        ActionOutcome::success("notified")
    }
}

/// Search engine returning a fixed result list and recording queries.
#[derive(Default)]
pub struct MockSearch {
    pub results: Vec<SearchResult>,
    pub queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn with_urls(urls: &[&str]) -> Self {
        Self {
            results: urls
                .iter()
                .map(|url| SearchResult {
                    title: format!("Result for {url}"),
                    url: (*url).to_string(),
                    snippet: String::new(),
                })
                .collect(),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WebSearch for MockSearch {
    async fn search(&self, query: &str) -> nexus_adapters::Result<Vec<SearchResult>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.results.clone())
    }
}

#[derive(Default)]
pub struct MockAutomation {
    pub played: Mutex<Vec<String>>,
    pub opened: Mutex<Vec<String>>,
}

#[async_trait]
impl WebAutomation for MockAutomation {
    async fn search_and_play(&self, query: &str) -> nexus_adapters::Result<String> {
        self.played.lock().unwrap().push(query.to_string());
        Ok(format!("Playing {query}"))
    }

    async fn open_url(&self, url: &str) -> nexus_adapters::Result<String> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(format!("Opened {url}"))
    }
}

/// Echoes the command back.  A few magic commands misbehave on purpose.
#[derive(Default)]
pub struct MockShell;

#[async_trait]
impl ShellRunner for MockShell {
    async fn run(&self, command: &str) -> nexus_adapters::Result<CommandOutput> {
        match command {
            "panic" => panic!("boom"),
            "fail" => Err(AdapterError::InvalidInput("refused".into())),
            "warn" => Ok(CommandOutput {
                stdout: "partial".into(),
                stderr: "careful".into(),
                exit_code: 1,
            }),
            other => Ok(CommandOutput {
                stdout: other.to_string(),
                stderr: String::new(),
                exit_code: 0,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Mocks {
    pub actuator: Arc<MockActuator>,
    pub search: Arc<MockSearch>,
    pub automation: Arc<MockAutomation>,
}

impl Mocks {
    pub fn new(actuator: MockActuator, search: MockSearch) -> Self {
        Self {
            actuator: Arc::new(actuator),
            search: Arc::new(search),
            automation: Arc::new(MockAutomation::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            actuator: self.actuator.clone(),
            shell: Arc::new(MockShell),
            search: self.search.clone(),
            automation: self.automation.clone(),
        }
    }
}

impl Default for Mocks {
    fn default() -> Self {
        Self::new(MockActuator::working(), MockSearch::default())
    }
}

/// A dispatcher over `store` with a started scheduler and no simulated work
/// delay.
pub fn dispatcher(store: Arc<dyn TaskRepository>, mocks: &Mocks) -> Dispatcher {
    let scheduler = Scheduler::new(SchedulerConfig::new());
    scheduler.start().unwrap();
    Dispatcher::new(
        store,
        EventBus::new(),
        scheduler,
        mocks.collaborators(),
        DispatcherConfig { max_work_secs: 0 },
    )
}

/// Record `(topic, task_id)` for every lifecycle event on `bus`.
pub fn record_events(bus: &EventBus) -> Arc<Mutex<Vec<(String, Option<Uuid>)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for topic in TASK_TOPICS {
        let seen = Arc::clone(&seen);
        bus.subscribe(topic, move |event: Arc<Event>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push((event.name.clone(), event.task_id()));
                Ok::<(), String>(())
            }
        });
    }
    seen
}

/// Poll `store` until task `id` is terminal.
pub async fn settle(store: &dyn TaskRepository, id: TaskId) -> Task {
    for _ in 0..500 {
        if let Some(task) = store.get(id).await.unwrap()
            && task.status.is_terminal()
        {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} never reached a terminal state");
}
