use super::messages::SupervisorMessage;
use crate::actors::process::ProcessHandle;
use crate::command;
use crate::config::{BuildConfig, RunContext, DEFAULT_FILE_REGEX};
use crate::encoding::{Decoder, Encoding};
use crate::env::{self, PathOverride};
use crate::error::{Error, Result};
use crate::events::{JobStatus, Output, SupervisorState};
use crate::listener::ProcessListener;
use crate::sink::{OutputSink, ResultPatterns};
use crate::types::{Dir, EnvMap};

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Forwards pump callbacks into the supervisor's inbox.
///
/// This is the only thing the pump tasks ever touch; the sink is reached
/// exclusively from the actor task.
struct Mailbox {
    sender: mpsc::UnboundedSender<SupervisorMessage>,
}

impl ProcessListener for Mailbox {
    fn on_data(&self, job: &Arc<ProcessHandle>, output: Output) {
        let _ = self.sender.send(SupervisorMessage::Data {
            job: job.clone(),
            output,
        });
    }

    fn on_finished(&self, job: &Arc<ProcessHandle>) {
        let _ = self
            .sender
            .send(SupervisorMessage::Finished { job: job.clone() });
    }
}

/// The job occupying the supervisor's slot.
struct CurrentJob {
    handle: Arc<ProcessHandle>,
    quiet: bool,
    /// Working directory and PATH at spawn time, shown on failure.
    debug_text: String,
    /// One per stream, indexed by `Output::stream_index`.
    decoders: [Decoder; 2],
    finished: bool,
}

pub struct Supervisor {
    inbox: mpsc::UnboundedReceiver<SupervisorMessage>,
    listener: Arc<dyn ProcessListener>,
    sink: Box<dyn OutputSink>,
    current: Option<CurrentJob>,
    state_tx: watch::Sender<SupervisorState>,
}

impl Supervisor {
    pub fn new(
        inbox: mpsc::UnboundedReceiver<SupervisorMessage>,
        mailbox: mpsc::UnboundedSender<SupervisorMessage>,
        sink: Box<dyn OutputSink>,
        state_tx: watch::Sender<SupervisorState>,
    ) -> Self {
        Self {
            inbox,
            listener: Arc::new(Mailbox { sender: mailbox }),
            sink,
            current: None,
            state_tx,
        }
    }

    pub fn spawn(self) {
        tokio::spawn(async move { self.run().await });
    }

    async fn run(mut self) {
        use SupervisorMessage::*;
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                Run {
                    config,
                    context,
                    response,
                } => {
                    if config.kill {
                        self.cancel();
                    } else {
                        self.start_run(config, context);
                    }
                    let _ = response.send(());
                }
                Data { job, output } => self.on_data(job, output),
                Finished { job } => self.on_finished(job),
                Shutdown { response } => {
                    if let Some(current) = self.current.take() {
                        current.handle.kill();
                    }
                    let _ = response.send(());
                    break;
                }
            }
        }
        debug!("supervisor stopped");
    }

    fn set_state(&self, state: SupervisorState) {
        self.state_tx.send_replace(state);
    }

    fn cancel(&mut self) {
        let alive = self
            .current
            .as_ref()
            .map_or(false, |current| current.handle.is_alive());
        if !alive {
            debug!("cancel requested with no running job");
            return;
        }
        if let Some(current) = self.current.take() {
            self.sink.append("[Cancelled]");
            current.handle.kill();
            info!(job_id = %current.handle.id(), "job cancelled");
            self.set_state(SupervisorState::Cancelled {
                job_id: current.handle.id(),
            });
        }
    }

    fn start_run(&mut self, config: BuildConfig, context: RunContext) {
        if let Some(previous) = self.current.take() {
            if previous.handle.is_alive() && previous.handle.kill() {
                info!(job_id = %previous.handle.id(), "job superseded");
            }
        }

        let working_dir = context.resolve_working_dir(config.working_dir.as_deref());
        let (encoding, patterns) = match Self::prepare(&config, working_dir.clone()) {
            Ok(prepared) => prepared,
            Err(e) => {
                // still give the sink a usable state before reporting
                if let Ok(patterns) = ResultPatterns::new(DEFAULT_FILE_REGEX, "", working_dir) {
                    self.sink.reset(patterns);
                }
                self.report_failure(&e, config.quiet);
                return;
            }
        };
        self.sink.reset(patterns);

        let argv = command::build_argv(&config, context.active_file.as_deref());
        self.sink.append(&command::echo_line(&argv));

        let merged_env = context.merge_env(&config.env);
        match self.spawn_job(&config, &argv, &merged_env, working_dir.as_deref()) {
            Ok((handle, debug_text)) => {
                let job_id = handle.id();
                self.current = Some(CurrentJob {
                    handle,
                    quiet: config.quiet,
                    debug_text,
                    decoders: [Decoder::new(encoding), Decoder::new(encoding)],
                    finished: false,
                });
                self.set_state(SupervisorState::Running { job_id });
            }
            Err(e) => self.report_failure(&e, config.quiet),
        }
    }

    fn prepare(config: &BuildConfig, base_dir: Option<Dir>) -> Result<(Encoding, ResultPatterns)> {
        let encoding = Encoding::from_label(&config.encoding)?;
        let patterns = ResultPatterns::new(&config.file_regex, &config.line_regex, base_dir)?;
        Ok((encoding, patterns))
    }

    /// Sets up the process-wide working directory and PATH, then starts the job.
    fn spawn_job(
        &self,
        config: &BuildConfig,
        argv: &[String],
        merged_env: &EnvMap,
        working_dir: Option<&std::path::Path>,
    ) -> Result<(Arc<ProcessHandle>, String)> {
        if let Some(dir) = working_dir {
            env::enter_working_dir(dir)?;
        }

        let cwd = std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        let path = match merged_env.get("PATH") {
            Some(path) => path.clone(),
            None => std::env::var("PATH").unwrap_or_default(),
        };
        let debug_text = format!("[dir: {}]\n[path: {}]", cwd, path);

        let handle = {
            let _path = config.path.as_deref().map(PathOverride::apply);
            let child_env = env::child_env(merged_env);
            // the child inherits the directory entered above; a relative
            // working_dir must not be resolved a second time
            ProcessHandle::start(
                argv,
                &child_env,
                None,
                config.shell,
                self.listener.clone(),
            )?
        };
        Ok((handle, debug_text))
    }

    fn report_failure(&mut self, error: &Error, quiet: bool) {
        warn!(error = %error, "failed to start job");
        self.sink.append(&format!("{}\n", error));
        if !quiet {
            self.sink.append("[Finished]");
        }
        self.set_state(SupervisorState::Failed);
    }

    /// Finds the current job if `job` is it; otherwise kills `job`.
    fn current_for(&mut self, job: &ProcessHandle) -> Option<&mut CurrentJob> {
        match self.current.as_mut() {
            Some(current) if current.handle.id() == job.id() => Some(current),
            _ => {
                if job.kill() {
                    debug!(job_id = %job.id(), "killed stale job");
                }
                None
            }
        }
    }

    pub(crate) fn on_data(&mut self, job: Arc<ProcessHandle>, output: Output) {
        let Some(current) = self.current_for(&job) else {
            return;
        };
        let decoder = &mut current.decoders[output.stream_index()];
        let encoding = decoder.encoding();
        let text = decoder
            .decode(output.bytes())
            .unwrap_or_else(|e| decode_error_text(encoding, &e));
        if !text.is_empty() {
            self.sink.append(&text);
        }
    }

    pub(crate) fn on_finished(&mut self, job: Arc<ProcessHandle>) {
        let Some(current) = self.current_for(&job) else {
            return;
        };
        if current.finished {
            return;
        }
        current.finished = true;

        let mut text = String::new();
        for decoder in current.decoders.iter_mut() {
            match decoder.flush() {
                Some(Ok(tail)) => text.push_str(&tail),
                Some(Err(e)) => text.push_str(&decode_error_text(decoder.encoding(), &e)),
                None => {}
            }
        }

        let status = job.status();
        let exit_code = status.code();
        if !current.quiet {
            let elapsed = job.started_at().elapsed().as_secs_f64();
            match status {
                JobStatus::Running | JobStatus::Exited { code: 0 } => {
                    text.push_str(&format!("[Finished in {:.1}s]", elapsed))
                }
                JobStatus::Lost => {
                    text.push_str(&format!(
                        "[Finished in {:.1}s with unknown exit status]\n",
                        elapsed
                    ));
                    text.push_str(&current.debug_text);
                }
                JobStatus::Exited { .. } | JobStatus::Killed { .. } => {
                    text.push_str(&format!(
                        "[Finished in {:.1}s with exit code {}]\n",
                        elapsed,
                        exit_code.unwrap_or_default()
                    ));
                    text.push_str(&current.debug_text);
                }
            }
        }
        if !text.is_empty() {
            self.sink.append(&text);
        }

        let errors = self.sink.count_results();
        if errors == 0 {
            self.sink.status_message("Build finished");
        } else {
            self.sink
                .status_message(&format!("Build finished with {} errors", errors));
        }
        self.sink.reset_cursor();

        info!(job_id = %job.id(), ?exit_code, errors, "job finished");
        self.set_state(SupervisorState::Finished {
            job_id: job.id(),
            exit_code,
        });
    }
}

fn decode_error_text(encoding: Encoding, error: &Error) -> String {
    let reason = match error {
        Error::Decode { reason, .. } => reason.clone(),
        other => other.to_string(),
    };
    format!(
        "[Decode error - output not {}]\n Error: {}\n",
        encoding, reason
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sink::BufferSink;
    use bytes::Bytes;
    use std::time::Duration;

    fn supervisor(sink: &BufferSink) -> Supervisor {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        Supervisor::new(rx, tx, Box::new(sink.clone()), state_tx)
    }

    fn sleeper() -> BuildConfig {
        BuildConfig {
            prefix: vec!["sh".into(), "-c".into(), "sleep 30".into()],
            ..BuildConfig::default()
        }
    }

    fn stdout(text: &str) -> Output {
        Output::Stdout(Bytes::copy_from_slice(text.as_bytes()))
    }

    #[tokio::test]
    async fn stale_output_is_discarded_and_kills_the_job() {
        let sink = BufferSink::new();
        let mut actor = supervisor(&sink);
        let argv = vec!["sleep".to_string(), "30".to_string()];
        let stale = ProcessHandle::start(&argv, &EnvMap::new(), None, false, actor.listener.clone())
            .unwrap();

        actor.on_data(stale.clone(), stdout("late output\n"));
        assert_eq!(sink.contents(), "");
        assert!(stale.is_killed());
        let status = tokio::time::timeout(Duration::from_secs(5), stale.wait()).await;
        assert!(status.is_ok());
    }

    #[tokio::test]
    async fn superseded_job_is_killed_once_and_silenced() {
        let sink = BufferSink::new();
        let mut actor = supervisor(&sink);

        actor.start_run(sleeper(), RunContext::default());
        let first = actor.current.as_ref().unwrap().handle.clone();
        actor.start_run(sleeper(), RunContext::default());
        let second = actor.current.as_ref().unwrap().handle.clone();

        assert!(first.is_killed());
        assert!(!first.kill(), "superseding should already have killed it");
        assert!(!second.is_killed());

        let echo = sink.contents();
        actor.on_data(first.clone(), stdout("from first\n"));
        actor.on_finished(first);
        assert_eq!(sink.contents(), echo);

        actor.on_data(second.clone(), stdout("from second\r\n"));
        assert_eq!(sink.contents(), format!("{}from second\n", echo));
        second.kill();
    }

    #[tokio::test]
    async fn decode_errors_become_placeholder_text() {
        let sink = BufferSink::new();
        let mut actor = supervisor(&sink);
        actor.start_run(sleeper(), RunContext::default());
        let job = actor.current.as_ref().unwrap().handle.clone();
        let echo = sink.contents();

        actor.on_data(job.clone(), Output::Stderr(Bytes::from_static(b"\xff\xfe\n")));
        actor.on_data(job.clone(), stdout("still here\n"));
        assert_eq!(
            sink.contents(),
            format!(
                "{}[Decode error - output not utf-8]\n Error: invalid utf-8 sequence of 1 bytes from index 0\nstill here\n",
                echo
            )
        );
        job.kill();
    }

    #[tokio::test]
    async fn cancel_without_job_is_a_noop() {
        let sink = BufferSink::new();
        let mut actor = supervisor(&sink);
        actor.cancel();
        assert_eq!(sink.contents(), "");
        assert_eq!(*actor.state_tx.borrow(), SupervisorState::Idle);
    }

    #[tokio::test]
    async fn bad_encoding_fails_the_run() {
        let sink = BufferSink::new();
        let mut actor = supervisor(&sink);
        let config = BuildConfig {
            encoding: "klingon".into(),
            ..sleeper()
        };
        actor.start_run(config, RunContext::default());
        assert!(actor.current.is_none());
        assert_eq!(sink.contents(), "unknown encoding: klingon\n[Finished]");
        assert_eq!(*actor.state_tx.borrow(), SupervisorState::Failed);
    }
}
