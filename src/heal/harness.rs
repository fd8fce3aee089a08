use crate::error::{HealError, Result};
use std::{io::Read,
          path::PathBuf,
          process::{Child, Command, Stdio},
          sync::{mpsc::{self, Receiver},
                 Arc, Mutex},
          thread,
          time::{Duration, Instant}};

/// Upper bound on one test suite run
pub const SUITE_TIMEOUT: Duration = Duration::from_secs(180);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to keep reading output once the suite process is gone. Processes it
/// left behind may hold the pipes open indefinitely.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Which application and page object one suite run targets. Passed to the
/// child as `TEST_URL` and `SELECTOR_MODULE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessInvocation {
    pub target_url: String,
    pub selector_module: String,
}

impl HarnessInvocation {
    pub fn new(target_url: impl Into<String>, selector_module: impl Into<String>) -> Self {
        Self { target_url: target_url.into(), selector_module: selector_module.into() }
    }
}

/// How one suite run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Exit code 0
    pub passed: bool,

    /// `None` when killed by a signal or on timeout
    pub exit_code: Option<i32>,

    /// `stdout + "\n" + stderr`
    pub log: String,

    /// Killed after exceeding the timeout
    pub timed_out: bool,
}

/// Runs the UI test suite as a child process
#[derive(Debug, Clone)]
pub struct TestHarness {
    program: String,
    args: Vec<String>,
    workdir: PathBuf,
    timeout: Duration,
}

impl TestHarness {
    /// Arbitrary command
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, workdir: PathBuf::from("."), timeout: SUITE_TIMEOUT }
    }

    /// `<python> -m <module>`
    pub fn python_module(python: impl Into<String>, module: impl Into<String>) -> Self {
        Self::new(python, vec!["-m".to_string(), module.into()])
    }

    /// Builder method: set working directory
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = dir.into();
        self
    }

    /// Builder method: set timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the suite once. Only a failure to spawn is an `Err`; failing tests and
    /// timeouts are a [`RunOutcome`] with `passed == false`.
    pub fn run(&self, invocation: &HarnessInvocation) -> Result<RunOutcome> {
        log::info!(
            "Running: {} {} (TEST_URL={}, SELECTOR_MODULE={})",
            self.program,
            self.args.join(" "),
            invocation.target_url,
            invocation.selector_module
        );

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.workdir)
            .env("TEST_URL", &invocation.target_url)
            .env("SELECTOR_MODULE", &invocation.selector_module)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a timeout takes down the browsers and drivers the suite started
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|e| HealError::Harness(format!("Failed to spawn '{}': {}", self.program, e)))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let (exit_code, timed_out) = self.wait(&mut child)?;

        let output_deadline = Instant::now() + OUTPUT_GRACE;
        let log = format!("{}\n{}", collect_output(stdout, output_deadline), collect_output(stderr, output_deadline));
        let passed = exit_code == Some(0) && !timed_out;

        if passed {
            log::info!("  Command successful.");
        } else if timed_out {
            log::error!("  Command timed out after {}s.", self.timeout.as_secs());
        } else {
            log::warn!("  Command failed (exit code: {:?}).", exit_code);
            if !log.trim().is_empty() {
                log::debug!("--- Captured log ---\n{}\n--------------------", log);
            }
        }

        Ok(RunOutcome { passed, exit_code, log, timed_out })
    }

    fn wait(&self, child: &mut Child) -> Result<(Option<i32>, bool)> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(|e| HealError::Harness(e.to_string()))? {
                return Ok((status.code(), false));
            }
            if Instant::now() >= deadline {
                kill_tree(child);
                return Ok((None, true));
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::{sys::signal::{killpg, Signal},
              unistd::Pid};

    let group = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(group, Signal::SIGKILL) {
        log::warn!("Failed to kill process group {} of timed out test run: {}", group, e);
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill timed out test run: {}", e);
    }
    let _ = child.wait();
}

/// Output of one pipe, appended as it is read
struct Drained {
    bytes: Arc<Mutex<Vec<u8>>>,
    eof: Receiver<()>,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Drained> {
    pipe.map(|mut pipe| {
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let (tx, eof) = mpsc::channel();
        let sink = Arc::clone(&bytes);
        thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut out) = sink.lock() {
                            out.extend_from_slice(&buf[..n]);
                        }
                    }
                }
            }
            let _ = tx.send(());
        });
        Drained { bytes, eof }
    })
}

/// Output read until EOF, or up to `deadline` when leftover processes still hold the pipe open
fn collect_output(output: Option<Drained>, deadline: Instant) -> String {
    let Some(output) = output else {
        return String::new();
    };
    if output.eof.recv_timeout(deadline.saturating_duration_since(Instant::now())).is_err() {
        log::warn!("Test run output still open after exit. Leftover processes may be holding it.");
    }
    let text = output.bytes.lock().map(|bytes| String::from_utf8_lossy(&bytes).into_owned()).unwrap_or_default();
    text
}
