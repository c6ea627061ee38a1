// Single-job encode session: owns one ffmpeg child and reports progress over a channel

use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::classify::FailureClassifier;
use super::core::{EncodeJob, EncodePlan, ProgressState, Tools, format_command};
use super::error::EncodeError;

/// Lines of stderr kept for failure classification
const STDERR_TAIL_LINES: usize = 200;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);
/// How often [`EncodeSession::wait_for_outcome`] checks for an interrupt
const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cooperative cancellation flag shared between the caller and the reader loop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

#[derive(Debug)]
pub enum EncodeOutcome {
    Completed { output: PathBuf },
    Failed(EncodeError),
    Cancelled,
}

impl EncodeOutcome {
    fn state(&self) -> SessionState {
        match self {
            EncodeOutcome::Completed { .. } => SessionState::Completed,
            EncodeOutcome::Failed(_) => SessionState::Failed,
            EncodeOutcome::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Message from the reader thread to whoever drives the session
#[derive(Debug)]
pub enum SessionEvent {
    Started { job_id: Uuid },
    /// Sent only when the whole-number percentage changes
    Progress { job_id: Uuid, percent: u8 },
    Finished { job_id: Uuid, outcome: EncodeOutcome },
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub tools: Tools,
    /// Time between the polite termination signal and a hard kill
    pub grace_period: Duration,
    /// Hard backstop for a hung encoder; `None` waits indefinitely
    pub timeout: Option<Duration>,
    pub classifier: FailureClassifier,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tools: Tools::default(),
            grace_period: Duration::from_secs(3),
            timeout: None,
            classifier: FailureClassifier::default(),
        }
    }
}

struct ActiveRun {
    job_id: Uuid,
    token: CancellationToken,
    child: Arc<Mutex<Child>>,
    handle: JoinHandle<()>,
}

/// Runs at most one encode at a time.
///
/// Events arrive on [`EncodeSession::events`]; the session never touches
/// caller state from its background thread.
pub struct EncodeSession {
    settings: Arc<SessionSettings>,
    state: Arc<Mutex<SessionState>>,
    active: Option<ActiveRun>,
    tx: Sender<SessionEvent>,
    rx: Receiver<SessionEvent>,
}

impl EncodeSession {
    pub fn new(settings: SessionSettings) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            settings: Arc::new(settings),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            active: None,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.rx
    }

    /// Token of the current (or last) job, for cancelling from elsewhere
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.active.as_ref().map(|run| run.token.clone())
    }

    pub fn start(&mut self, job: EncodeJob, plan: EncodePlan) -> Result<Uuid, EncodeError> {
        self.start_with_token(job, plan, CancellationToken::new())
    }

    /// Spawn ffmpeg for `job` and begin streaming its progress.
    ///
    /// Rejected with [`EncodeError::AlreadyRunning`] while another job is
    /// running; nothing is spawned in that case.
    pub fn start_with_token(
        &mut self,
        job: EncodeJob,
        plan: EncodePlan,
        token: CancellationToken,
    ) -> Result<Uuid, EncodeError> {
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Running {
                warn!("Rejected job {}: a job is already running", job.id);
                return Err(EncodeError::AlreadyRunning);
            }
            *state = SessionState::Running;
        }

        // Reap the previous reader thread, if any
        if let Some(previous) = self.active.take() {
            let _ = previous.handle.join();
        }

        let program = self.settings.tools.ffmpeg_program();
        info!("Running: {}", format_command(&program, &plan.args));

        let mut cmd = self.settings.tools.ffmpeg_command();
        cmd.args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                *lock(&self.state) = SessionState::Idle;
                return Err(EncodeError::from_spawn(e, program));
            }
        };

        let Some(stderr) = child.stderr.take() else {
            let _ = child.kill();
            let _ = child.wait();
            *lock(&self.state) = SessionState::Idle;
            return Err(EncodeError::Io(io::Error::other(
                "Failed to capture ffmpeg stderr",
            )));
        };

        let job_id = job.id;
        let child = Arc::new(Mutex::new(child));
        let _ = self.tx.send(SessionEvent::Started { job_id });

        let run = ReaderRun {
            job,
            expected_duration_s: plan.expected_duration_s,
            token: token.clone(),
            child: child.clone(),
            settings: self.settings.clone(),
            state: self.state.clone(),
            tx: self.tx.clone(),
        };
        let handle = thread::spawn(move || run.run(stderr));

        self.active = Some(ActiveRun {
            job_id,
            token,
            child,
            handle,
        });
        Ok(job_id)
    }

    /// Request cancellation of the running job. No-op when nothing runs.
    ///
    /// The encoder is sent a termination signal right away so a stalled
    /// reader wakes up; escalation to a kill happens on the reader thread.
    pub fn cancel(&self) {
        if !self.is_running() {
            return;
        }
        if let Some(run) = &self.active {
            if !run.token.is_cancelled() {
                info!("Cancelling job {}", run.job_id);
                run.token.cancel();
                signal_terminate(&run.child);
            }
        }
    }

    /// Drain events until the current job finishes and return its outcome.
    ///
    /// Any message on `interrupts` (typically sent from a Ctrl-C handler)
    /// cancels the job; draining continues until `Finished` arrives.
    /// Events other than `Finished` are passed to `on_event`. Returns `None`
    /// when there is no job to wait for.
    pub fn wait_for_outcome(
        &self,
        interrupts: &Receiver<()>,
        mut on_event: impl FnMut(&SessionEvent),
    ) -> Option<EncodeOutcome> {
        let run = self.active.as_ref()?;
        loop {
            if interrupts.try_recv().is_ok() {
                self.cancel();
            }
            match self.rx.recv_timeout(INTERRUPT_POLL_INTERVAL) {
                Ok(SessionEvent::Finished { outcome, .. }) => return Some(outcome),
                Ok(event) => on_event(&event),
                // Finished was already taken by someone else
                Err(RecvTimeoutError::Timeout) if run.handle.is_finished() => {
                    while let Ok(event) = self.rx.try_recv() {
                        match event {
                            SessionEvent::Finished { outcome, .. } => return Some(outcome),
                            event => on_event(&event),
                        }
                    }
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Block until the current job's reader thread has finished.
    pub fn join(&mut self) {
        if let Some(run) = self.active.take() {
            let _ = run.handle.join();
        }
    }

    /// Return a finished session to `Idle`. Has no effect while running.
    pub fn reset(&mut self) {
        let mut state = lock(&self.state);
        if state.is_terminal() {
            *state = SessionState::Idle;
        }
    }
}

impl Drop for EncodeSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Everything the background reader needs, moved onto its thread
struct ReaderRun {
    job: EncodeJob,
    expected_duration_s: f64,
    token: CancellationToken,
    child: Arc<Mutex<Child>>,
    settings: Arc<SessionSettings>,
    state: Arc<Mutex<SessionState>>,
    tx: Sender<SessionEvent>,
}

/// Kills and reaps the child on every exit path of the reader thread
struct ChildGuard(Arc<Mutex<Child>>);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let mut child = lock(&self.0);
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
        }
        let _ = child.wait();
    }
}

impl ReaderRun {
    fn run(self, stderr: impl io::Read) {
        let _guard = ChildGuard(self.child.clone());
        let job_id = self.job.id;

        let timed_out = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel::<()>();
        if let Some(timeout) = self.settings.timeout {
            spawn_watchdog(
                timeout,
                done_rx,
                self.child.clone(),
                self.settings.grace_period,
                timed_out.clone(),
            );
        }

        let mut progress = ProgressState::new(self.expected_duration_s);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let token = &self.token;
        let tx = &self.tx;

        let read_result = for_each_line(BufReader::new(stderr), |line| {
            if token.is_cancelled() {
                return false;
            }
            if let Some(percent) = progress.observe_line(line) {
                let _ = tx.send(SessionEvent::Progress { job_id, percent });
            }
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
            true
        });
        if let Err(e) = &read_result {
            warn!("Error reading ffmpeg output: {}", e);
        }

        let outcome = if self.token.is_cancelled() {
            terminate(&self.child, self.settings.grace_period);
            EncodeOutcome::Cancelled
        } else {
            let status = wait_for_exit(&self.child);
            drop(done_tx);
            let stderr_text = tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
            self.classify_exit(status, &stderr_text, &timed_out, &mut progress)
        };

        if let EncodeOutcome::Failed(err) = &outcome {
            warn!("Job {} failed: {}", job_id, err);
            remove_partial_output(&self.job.output_path);
        } else {
            debug!("Job {} finished: {:?}", job_id, outcome.state());
        }

        *lock(&self.state) = outcome.state();
        let _ = self.tx.send(SessionEvent::Finished { job_id, outcome });
    }

    fn classify_exit(
        &self,
        status: io::Result<ExitStatus>,
        stderr: &str,
        timed_out: &AtomicBool,
        progress: &mut ProgressState,
    ) -> EncodeOutcome {
        if timed_out.load(Ordering::SeqCst) {
            let seconds = self.settings.timeout.map(|t| t.as_secs()).unwrap_or(0);
            return EncodeOutcome::Failed(EncodeError::Timeout { seconds });
        }
        // A cancel that raced with end-of-stream still wins over success
        if self.token.is_cancelled() {
            return EncodeOutcome::Cancelled;
        }

        match status {
            Ok(status) if status.success() => {
                if let Some(percent) = progress.complete() {
                    let _ = self.tx.send(SessionEvent::Progress {
                        job_id: self.job.id,
                        percent,
                    });
                }
                EncodeOutcome::Completed {
                    output: self.job.output_path.clone(),
                }
            }
            Ok(status) if was_signalled(&status, stderr) => {
                debug!("ffmpeg stopped by an external signal: {}", status);
                EncodeOutcome::Cancelled
            }
            Ok(status) => {
                EncodeOutcome::Failed(self.settings.classifier.classify(status.code(), stderr))
            }
            Err(e) => EncodeOutcome::Failed(EncodeError::Io(e)),
        }
    }
}

/// Call `on_line` for every `\r`- or `\n`-terminated segment, skipping empty
/// ones. Stops early when `on_line` returns `false`. A trailing segment
/// without terminator is delivered at end of stream.
fn for_each_line<R: BufRead>(mut reader: R, mut on_line: impl FnMut(&str) -> bool) -> io::Result<()> {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let available = match reader.fill_buf() {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            break;
        }

        let mut consumed = 0;
        let mut keep_going = true;
        for (i, &byte) in available.iter().enumerate() {
            if byte == b'\n' || byte == b'\r' {
                buf.extend_from_slice(&available[consumed..i]);
                consumed = i + 1;
                if !buf.is_empty() {
                    let line = String::from_utf8_lossy(&buf);
                    keep_going = on_line(&line);
                    buf.clear();
                    if !keep_going {
                        break;
                    }
                }
            }
        }
        if keep_going {
            buf.extend_from_slice(&available[consumed..]);
            consumed = available.len();
        }
        reader.consume(consumed);
        if !keep_going {
            return Ok(());
        }
    }

    if !buf.is_empty() {
        on_line(&String::from_utf8_lossy(&buf));
    }
    Ok(())
}

/// Ask the child to stop (SIGTERM on unix, kill elsewhere)
fn signal_terminate(child: &Mutex<Child>) {
    let mut child = lock(child);
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }

    #[cfg(unix)]
    {
        if let Ok(pid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: plain kill(2) on a pid we spawned and have not yet reaped
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
            return;
        }
    }

    let _ = child.kill();
}

/// SIGTERM, wait up to `grace`, then kill
fn terminate(child: &Mutex<Child>, grace: Duration) {
    signal_terminate(child);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = lock(child).try_wait() {
            return;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }

    warn!("ffmpeg did not exit within {:?}; killing it", grace);
    let mut child = lock(child);
    let _ = child.kill();
    let _ = child.wait();
}

/// Poll for exit without holding the lock across a blocking wait, so
/// `cancel()` can still signal the process meanwhile
fn wait_for_exit(child: &Mutex<Child>) -> io::Result<ExitStatus> {
    loop {
        if let Some(status) = lock(child).try_wait()? {
            return Ok(status);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn spawn_watchdog(
    timeout: Duration,
    done: Receiver<()>,
    child: Arc<Mutex<Child>>,
    grace: Duration,
    timed_out: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = done.recv_timeout(timeout) {
            warn!("ffmpeg exceeded the {:?} timeout", timeout);
            timed_out.store(true, Ordering::SeqCst);
            terminate(&child, grace);
        }
    });
}

/// ffmpeg catches SIGINT/SIGTERM and exits with "received signal N"
#[cfg(unix)]
fn was_signalled(status: &ExitStatus, stderr: &str) -> bool {
    use std::os::unix::process::ExitStatusExt;

    if let Some(signal) = status.signal() {
        if matches!(signal, 2 | 3 | 15) {
            return true;
        }
    }

    stderr.contains("received signal 2")
        || stderr.contains("received signal 3")
        || stderr.contains("received signal 15")
}

#[cfg(not(unix))]
fn was_signalled(_status: &ExitStatus, stderr: &str) -> bool {
    stderr.contains("received signal")
}

fn remove_partial_output(path: &std::path::Path) {
    if !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}
