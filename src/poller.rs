//! Polls a remote job until it reaches a terminal state while a spinner
//! keeps animating on its own, faster timer.

use crate::artifact::GeneratedArtifact;
use crate::errors::MirakoError;
use crate::task::{TaskHandle, TaskState, TaskStatus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_SPINNER_INTERVAL: Duration = Duration::from_millis(100);

/// Status-fetch capability bound to one endpoint.
pub type StatusFetch = Arc<dyn Fn(&str) -> Result<TaskStatus, MirakoError> + Send + Sync>;

/// Something that can show a one-line progress indicator.
pub trait Progress {
    /// Redraws the line with the next frame and the given text.
    fn render(&mut self, text: &str);
    /// Removes the line. Called exactly once per loop.
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub spinner_interval: Duration,
    /// Upper bound on the whole wait; `None` polls until cancelled.
    pub max_wait: Option<Duration>,
}

impl PollConfig {
    pub fn every(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            spinner_interval: DEFAULT_SPINNER_INTERVAL,
            max_wait: None,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Drives `fetch` until the job completes, fails, or `cancel` fires.
///
/// Fetches run on the blocking pool and report back through a capacity-1
/// channel, so a slow request never holds up spinner redraws and at most
/// one fetch is outstanding at a time. Cancellation is checked first on
/// every wake-up.
pub async fn wait_for(
    handle: &TaskHandle,
    fetch: StatusFetch,
    config: &PollConfig,
    cancel: &CancellationToken,
    progress: &mut dyn Progress,
) -> Result<GeneratedArtifact, MirakoError> {
    let result = poll_loop(handle, fetch, config, cancel, progress).await;
    progress.clear();
    result
}

async fn poll_loop(
    handle: &TaskHandle,
    fetch: StatusFetch,
    config: &PollConfig,
    cancel: &CancellationToken,
    progress: &mut dyn Progress,
) -> Result<GeneratedArtifact, MirakoError> {
    let mut poll_tick = interval_at(Instant::now() + config.poll_interval, config.poll_interval);
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut spinner_tick = interval(config.spinner_interval);
    spinner_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let deadline = wait_limit(config.max_wait);
    tokio::pin!(deadline);

    let (tx, mut rx) = mpsc::channel::<Result<TaskStatus, MirakoError>>(1);
    let mut in_flight = false;
    let mut last_label = handle.kind.initial_label().to_string();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(task = %handle.id, "poll cancelled");
                return Err(MirakoError::Cancelled(format!(
                    "stopped waiting for {} task {}",
                    handle.kind.describe(),
                    handle.id
                )));
            }
            _ = &mut deadline => {
                let waited = config.max_wait.unwrap_or_default();
                return Err(MirakoError::WaitTimeout(waited));
            }
            Some(polled) = rx.recv() => {
                in_flight = false;
                let status = polled?;
                debug!(task = %handle.id, status = status.label(), "status observed");
                last_label = status.label().to_string();

                match status.state() {
                    TaskState::Completed => {
                        return status.into_payload().ok_or_else(|| {
                            MirakoError::UnexpectedResponse("completed without a result".to_string())
                        });
                    }
                    TaskState::Failed | TaskState::Canceled | TaskState::TimedOut => {
                        return Err(MirakoError::JobFailed {
                            job: handle.kind.describe(),
                            state: status.label().to_string(),
                            detail: status.error_detail().map(str::to_string),
                        });
                    }
                    TaskState::Pending | TaskState::Processing => poll_tick.reset(),
                }
            }
            _ = poll_tick.tick(), if !in_flight => {
                in_flight = true;
                let fetch = Arc::clone(&fetch);
                let tx = tx.clone();
                let id = handle.id.clone();
                debug!(task = %id, "polling status");
                tokio::task::spawn_blocking(move || {
                    let _ = tx.blocking_send(fetch(&id));
                });
            }
            _ = spinner_tick.tick() => {
                progress.render(&format!("Status: {}", last_label));
            }
        }
    }
}

async fn wait_limit(max_wait: Option<Duration>) {
    match max_wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending::<()>().await,
    }
}

/// Runs one blocking call on the blocking pool while the spinner shows
/// `label`. Used for single long requests that are not polled.
pub async fn with_spinner<T, F>(
    label: &str,
    call: F,
    spinner_interval: Duration,
    cancel: &CancellationToken,
    progress: &mut dyn Progress,
) -> Result<T, MirakoError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MirakoError> + Send + 'static,
{
    let mut spinner_tick = interval(spinner_interval);
    spinner_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut call = tokio::task::spawn_blocking(call);

    let result = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                break Err(MirakoError::Cancelled(label.trim_end_matches('.').to_string()));
            }
            joined = &mut call => {
                break joined.map_err(|e| MirakoError::Transport(e.to_string())).and_then(|r| r);
            }
            _ = spinner_tick.tick() => progress.render(label),
        }
    };
    progress.clear();
    result
}

/// Builds a single-threaded runtime, wires Ctrl-C to a cancellation token
/// and runs `work` to completion.
///
/// The runtime is shut down in the background so an abandoned in-flight
/// request does not hold up exit.
pub fn run_interruptible<T, W, Fut>(work: W) -> Result<T, MirakoError>
where
    W: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, MirakoError>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| MirakoError::io("Failed to start async runtime", e))?;

    let cancel = CancellationToken::new();
    let result = runtime.block_on(async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });
        work(cancel.clone()).await
    });

    runtime.shutdown_background();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::encode_base64;
    use crate::task::TaskKind;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<String>,
        clears: usize,
    }

    impl Progress for Recorder {
        fn render(&mut self, text: &str) {
            assert_eq!(self.clears, 0, "rendered after clear");
            self.frames.push(text.to_string());
        }

        fn clear(&mut self) {
            self.clears += 1;
        }
    }

    /// Replays a fixed sequence of wire statuses; repeats the last one forever.
    struct Script {
        kind: TaskKind,
        steps: Mutex<VecDeque<(&'static str, Option<GeneratedArtifact>, Option<&'static str>)>>,
        calls: AtomicUsize,
    }

    impl Script {
        fn new(
            kind: TaskKind,
            steps: Vec<(&'static str, Option<GeneratedArtifact>, Option<&'static str>)>,
        ) -> Arc<Self> {
            Arc::new(Self {
                kind,
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn fetch(self: &Arc<Self>) -> StatusFetch {
            let script = Arc::clone(self);
            Arc::new(move |_id: &str| {
                script.calls.fetch_add(1, Ordering::SeqCst);
                let mut steps = script.steps.lock().unwrap();
                let (label, payload, detail) = if steps.len() > 1 {
                    steps.pop_front().unwrap()
                } else {
                    steps.front().cloned().unwrap()
                };
                TaskStatus::observe(script.kind, label, payload, detail.map(str::to_string))
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn fast() -> PollConfig {
        PollConfig {
            poll_interval: Duration::from_millis(20),
            spinner_interval: Duration::from_millis(5),
            max_wait: None,
        }
    }

    #[tokio::test]
    async fn completes_after_non_terminal_polls() {
        let payload = GeneratedArtifact::InlineBase64(encode_base64(b"ABC"));
        let script = Script::new(
            TaskKind::ImageGenerate,
            vec![
                ("PROCESSING", None, None),
                ("PROCESSING", None, None),
                ("COMPLETED", Some(payload.clone()), None),
            ],
        );
        let handle = TaskHandle::new("task-1", TaskKind::ImageGenerate);
        let mut progress = Recorder::default();

        let artifact = wait_for(
            &handle,
            script.fetch(),
            &fast(),
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap();

        assert_eq!(artifact, payload);
        assert_eq!(script.calls(), 3);
        assert_eq!(progress.clears, 1);
    }

    #[tokio::test]
    async fn first_frame_shows_initial_label() {
        let script = Script::new(
            TaskKind::AvatarBuild,
            vec![(
                "READY",
                Some(GeneratedArtifact::Identifier("av-1".to_string())),
                None,
            )],
        );
        let handle = TaskHandle::new("av-1", TaskKind::AvatarBuild);
        let mut progress = Recorder::default();

        wait_for(
            &handle,
            script.fetch(),
            &fast(),
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap();

        assert_eq!(progress.frames.first().map(String::as_str), Some("Status: PENDING"));
    }

    #[tokio::test]
    async fn spinner_shows_latest_status() {
        let script = Script::new(
            TaskKind::VideoGenerate,
            vec![
                ("IN_QUEUE", None, None),
                ("RUNNING_STEP", None, None),
                (
                    "COMPLETED",
                    Some(GeneratedArtifact::RemoteUrl("https://cdn/v.mp4".to_string())),
                    None,
                ),
            ],
        );
        let handle = TaskHandle::new("v-1", TaskKind::VideoGenerate);
        let mut progress = Recorder::default();

        wait_for(
            &handle,
            script.fetch(),
            &fast(),
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap();

        assert_eq!(progress.frames[0], "Status: PROCESSING");
        assert!(progress.frames.iter().any(|f| f == "Status: IN_QUEUE"));
        assert!(progress.frames.iter().any(|f| f == "Status: RUNNING_STEP"));
    }

    #[tokio::test]
    async fn failure_carries_error_detail() {
        let script = Script::new(
            TaskKind::ImageGenerate,
            vec![("FAILED", None, Some("quota exceeded"))],
        );
        let handle = TaskHandle::new("task-2", TaskKind::ImageGenerate);
        let mut progress = Recorder::default();

        let err = wait_for(
            &handle,
            script.fetch(),
            &fast(),
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MirakoError::JobFailed { .. }));
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(script.calls(), 1);
        assert_eq!(progress.clears, 1);
    }

    #[tokio::test]
    async fn failure_without_detail_names_literal_state() {
        for (kind, label) in [
            (TaskKind::ImageGenerate, "CANCELED"),
            (TaskKind::AvatarGenerate, "TIMEDOUT"),
            (TaskKind::VoiceClone, "CANCELLED"),
            (TaskKind::VoiceClone, "TIMED_OUT"),
            (TaskKind::AvatarBuild, "ERROR"),
        ] {
            let script = Script::new(kind, vec![(label, None, None)]);
            let handle = TaskHandle::new("t", kind);
            let err = wait_for(
                &handle,
                script.fetch(),
                &fast(),
                &CancellationToken::new(),
                &mut Recorder::default(),
            )
            .await
            .unwrap_err();
            assert!(err.to_string().contains(label), "{} -> {}", label, err);
        }
    }

    #[tokio::test]
    async fn transport_error_aborts_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetch: StatusFetch = Arc::new(move |_id: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(MirakoError::Transport("connection reset".to_string()))
        });
        let handle = TaskHandle::new("task-3", TaskKind::ImageGenerate);
        let mut progress = Recorder::default();

        let err = wait_for(&handle, fetch, &fast(), &CancellationToken::new(), &mut progress)
            .await
            .unwrap_err();

        assert!(matches!(err, MirakoError::Transport(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(progress.clears, 1);
    }

    #[tokio::test]
    async fn cancellation_while_processing_aborts() {
        let script = Script::new(TaskKind::ImageGenerate, vec![("PROCESSING", None, None)]);
        let handle = TaskHandle::new("task-4", TaskKind::ImageGenerate);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(70)).await;
            trigger.cancel();
        });
        let mut progress = Recorder::default();

        let err = wait_for(&handle, script.fetch(), &fast(), &cancel, &mut progress)
            .await
            .unwrap_err();

        assert!(matches!(err, MirakoError::Cancelled(_)));
        assert!(script.calls() >= 1);
        assert_eq!(progress.clears, 1);
    }

    #[tokio::test]
    async fn cancellation_before_start_never_polls() {
        let script = Script::new(TaskKind::ImageGenerate, vec![("PROCESSING", None, None)]);
        let handle = TaskHandle::new("task-5", TaskKind::ImageGenerate);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut progress = Recorder::default();

        let err = wait_for(&handle, script.fetch(), &fast(), &cancel, &mut progress)
            .await
            .unwrap_err();

        assert!(matches!(err, MirakoError::Cancelled(_)));
        assert_eq!(script.calls(), 0);
        assert!(progress.frames.is_empty());
        assert_eq!(progress.clears, 1);
    }

    #[tokio::test]
    async fn slow_fetch_does_not_stall_spinner_or_overlap() {
        let calls = Arc::new(AtomicUsize::new(0));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let (c, busy) = (Arc::clone(&calls), Arc::clone(&concurrent));
        let fetch: StatusFetch = Arc::new(move |_id: &str| {
            assert_eq!(busy.fetch_add(1, Ordering::SeqCst), 0, "overlapping polls");
            std::thread::sleep(Duration::from_millis(60));
            busy.fetch_sub(1, Ordering::SeqCst);
            let n = c.fetch_add(1, Ordering::SeqCst);
            if n < 1 {
                TaskStatus::observe(TaskKind::ImageGenerate, "PROCESSING", None, None)
            } else {
                TaskStatus::observe(
                    TaskKind::ImageGenerate,
                    "COMPLETED",
                    Some(GeneratedArtifact::InlineBase64("QUJD".to_string())),
                    None,
                )
            }
        });
        let handle = TaskHandle::new("task-6", TaskKind::ImageGenerate);
        let mut progress = Recorder::default();

        wait_for(&handle, fetch, &fast(), &CancellationToken::new(), &mut progress)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // two 60ms fetches at a 5ms spinner cadence leave plenty of frames
        assert!(progress.frames.len() >= 10, "{} frames", progress.frames.len());
    }

    #[tokio::test]
    async fn max_wait_bounds_the_loop() {
        let script = Script::new(TaskKind::VoiceClone, vec![("PROCESSING", None, None)]);
        let handle = TaskHandle::new("task-7", TaskKind::VoiceClone);
        let config = fast().with_max_wait(Some(Duration::from_millis(80)));
        let mut progress = Recorder::default();

        let err = wait_for(
            &handle,
            script.fetch(),
            &config,
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MirakoError::WaitTimeout(_)));
        assert_eq!(progress.clears, 1);
    }

    #[tokio::test]
    async fn with_spinner_returns_call_result() {
        let mut progress = Recorder::default();
        let value = with_spinner(
            "Processing...",
            || {
                std::thread::sleep(Duration::from_millis(20));
                Ok(42)
            },
            Duration::from_millis(5),
            &CancellationToken::new(),
            &mut progress,
        )
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(progress.frames[0], "Processing...");
        assert_eq!(progress.clears, 1);
    }

    #[test]
    fn run_interruptible_drives_work() {
        let out = run_interruptible(|cancel| async move {
            assert!(!cancel.is_cancelled());
            Ok::<_, MirakoError>(7)
        })
        .unwrap();
        assert_eq!(out, 7);
    }
}
