use crate::error::{HealError, Result};
use std::{collections::VecDeque,
          io::{BufRead, BufReader, Read},
          path::PathBuf,
          process::{Child, Command, Stdio},
          sync::{Arc, Mutex},
          thread,
          time::{Duration, Instant}};

/// Upper bound on a dev server becoming reachable
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(240);

/// Pause between readiness probes
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const STOP_GRACE: Duration = Duration::from_secs(10);
const OUTPUT_TAIL_LINES: usize = 20;

/// A dev server to bring up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    /// Display name
    pub name: String,

    /// Working directory, relative to the run's workdir
    pub dir: PathBuf,

    /// Port exported as `PORT` and probed for readiness
    pub port: u16,

    pub program: String,
    pub args: Vec<String>,

    /// File that must exist in `dir` before spawning
    pub manifest: Option<String>,
}

impl ServerSpec {
    /// `npm start` in `dir`
    pub fn npm(name: impl Into<String>, dir: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            port,
            program: "npm".to_string(),
            args: vec!["start".to_string()],
            manifest: Some("package.json".to_string()),
        }
    }

    /// Builder method: replace the command
    pub fn command(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self.manifest = None;
        self
    }

    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

struct RunningServer {
    name: String,
    child: Child,
    output: Arc<Mutex<VecDeque<String>>>,
}

/// Starts dev servers and stops the ones it started
pub struct ServerManager {
    specs: Vec<ServerSpec>,
    workdir: PathBuf,
    running: Vec<RunningServer>,
    client: reqwest::blocking::Client,
    readiness_timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for ServerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let running: Vec<&str> = self.running.iter().map(|s| s.name.as_str()).collect();
        f.debug_struct("ServerManager").field("specs", &self.specs).field("running", &running).finish()
    }
}

impl ServerManager {
    pub fn new(specs: Vec<ServerSpec>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| HealError::ServerStartFailed { name: "probe".to_string(), reason: e.to_string() })?;

        Ok(Self {
            specs,
            workdir: PathBuf::from("."),
            running: Vec::new(),
            client,
            readiness_timeout: READINESS_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        })
    }

    /// Builder method: directory server dirs are relative to
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = dir.into();
        self
    }

    /// Builder method: set readiness timeout
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Builder method: set poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Number of servers this manager spawned and has not stopped
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Whether anything answers HTTP on `port`
    pub fn is_listening(&self, port: u16) -> bool {
        self.client.get(format!("http://localhost:{}", port)).send().is_ok()
    }

    /// Start every configured server, in order
    pub fn start_all(&mut self) -> Result<()> {
        for spec in self.specs.clone() {
            self.start(&spec)?;
        }
        Ok(())
    }

    /// Start one server unless its port already answers
    pub fn start(&mut self, spec: &ServerSpec) -> Result<()> {
        log::info!("Starting {} on port {}...", spec.name, spec.port);

        if self.is_listening(spec.port) {
            log::warn!("Port {} is already in use. Assuming {} is running.", spec.port, spec.name);
            return Ok(());
        }

        let failed = |reason: String| HealError::ServerStartFailed { name: spec.name.clone(), reason };

        let dir = self.workdir.join(&spec.dir);
        if !dir.is_dir() {
            return Err(failed(format!("directory {} not found", dir.display())));
        }
        if let Some(manifest) = &spec.manifest {
            if !dir.join(manifest).exists() {
                return Err(failed(format!("'{}' not found in {}", manifest, dir.display())));
            }
        }

        log::debug!("Running command: {} {} in {}", spec.program, spec.args.join(" "), dir.display());
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&dir)
            .env("PORT", spec.port.to_string())
            .env("BROWSER", "none")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|e| failed(e.to_string()))?;

        let output = Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES)));
        collect_tail(child.stdout.take(), Arc::clone(&output));
        collect_tail(child.stderr.take(), Arc::clone(&output));

        self.running.push(RunningServer { name: spec.name.clone(), child, output });

        match self.wait_until_ready(spec) {
            Ok(()) => {
                log::info!("{} is running on {}", spec.name, spec.url());
                Ok(())
            }
            Err(reason) => {
                if let Some(server) = self.running.last() {
                    let tail = server.output.lock().map(|lines| Vec::from(lines.clone())).unwrap_or_default();
                    if !tail.is_empty() {
                        log::error!("Last output of {}:\n{}", spec.name, tail.join("\n"));
                    }
                }
                self.stop(&spec.name);
                Err(failed(reason))
            }
        }
    }

    fn wait_until_ready(&mut self, spec: &ServerSpec) -> std::result::Result<(), String> {
        log::info!("Waiting for {} on port {} to be ready...", spec.name, spec.port);
        let started = Instant::now();
        let mut attempt = 0u32;

        while started.elapsed() < self.readiness_timeout {
            attempt += 1;
            if self.is_listening(spec.port) {
                log::info!("Server on port {} is ready after {} attempts", spec.port, attempt);
                return Ok(());
            }

            if let Some(server) = self.running.iter_mut().find(|s| s.name == spec.name) {
                if let Ok(Some(status)) = server.child.try_wait() {
                    return Err(format!("process exited early with {}", status));
                }
            }

            if attempt % 10 == 0 {
                let elapsed = started.elapsed().as_secs();
                log::info!(
                    "  Still waiting... {}s elapsed, {}s remaining",
                    elapsed,
                    self.readiness_timeout.as_secs().saturating_sub(elapsed)
                );
            }
            thread::sleep(self.poll_interval);
        }

        Err(format!("not reachable after {}s", self.readiness_timeout.as_secs()))
    }

    /// Stop one server this manager started
    pub fn stop(&mut self, name: &str) {
        let Some(index) = self.running.iter().position(|s| s.name == name) else {
            return;
        };
        let mut server = self.running.remove(index);
        log::info!("Stopping {}...", server.name);
        terminate(&mut server.child);
        log::info!("{} stopped", server.name);
    }

    /// Stop every server this manager started; servers found already running are left alone
    pub fn stop_all(&mut self) {
        let names: Vec<String> = self.running.iter().map(|s| s.name.clone()).collect();
        for name in names {
            self.stop(&name);
        }
    }
}

impl Drop for ServerManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn collect_tail<R: Read + Send + 'static>(pipe: Option<R>, tail: Arc<Mutex<VecDeque<String>>>) {
    let Some(pipe) = pipe else {
        return;
    };
    thread::spawn(move || {
        for line in BufReader::new(pipe).lines().map_while(std::result::Result::ok) {
            if let Ok(mut tail) = tail.lock() {
                if tail.len() == OUTPUT_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
    });
}

/// SIGTERM to the process group, SIGKILL once the grace period runs out
#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::{sys::signal::{killpg, Signal},
              unistd::Pid};

    let group = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(group, Signal::SIGTERM) {
        log::debug!("SIGTERM to process group {} failed: {}", group, e);
    }

    let deadline = Instant::now() + STOP_GRACE;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }

    log::warn!("Force killing process group {}...", group);
    let _ = killpg(group, Signal::SIGKILL);
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write, net::TcpListener};

    /// Answers every connection with an empty 200
    fn http_stub() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            for mut stream in listener.incoming().map_while(std::result::Result::ok) {
                let mut buf = [0u8; 1024];
                let _ = std::io::Read::read(&mut stream, &mut buf);
                let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            }
        });
        port
    }

    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    #[test]
    fn test_npm_spec() {
        let spec = ServerSpec::npm("react_v1", "react_v1", 3000);
        assert_eq!(spec.program, "npm");
        assert_eq!(spec.args, vec!["start"]);
        assert_eq!(spec.manifest.as_deref(), Some("package.json"));
        assert_eq!(spec.url(), "http://localhost:3000");
    }

    #[test]
    fn test_is_listening() {
        let manager = ServerManager::new(Vec::new()).unwrap();
        assert!(manager.is_listening(http_stub()));
        assert!(!manager.is_listening(free_port()));
    }

    #[test]
    fn test_running_server_is_reused() {
        let port = http_stub();
        let spec = ServerSpec::npm("app", "does-not-exist", port);
        let mut manager = ServerManager::new(vec![spec]).unwrap();

        manager.start_all().unwrap();
        assert_eq!(manager.running_count(), 0);
        manager.stop_all();
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ServerSpec::npm("app", ".", free_port());
        let mut manager = ServerManager::new(vec![spec]).unwrap().workdir(dir.path());

        let err = manager.start_all().unwrap_err();
        assert!(matches!(err, HealError::ServerStartFailed { .. }));
        assert!(err.to_string().contains("package.json"));
    }

    #[cfg(unix)]
    #[test]
    fn test_early_exit_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ServerSpec::npm("app", ".", free_port())
            .command("sh", vec!["-c".to_string(), "echo boom >&2; exit 1".to_string()]);
        let mut manager = ServerManager::new(vec![spec])
            .unwrap()
            .workdir(dir.path())
            .poll_interval(Duration::from_millis(50))
            .readiness_timeout(Duration::from_secs(20));

        let started = Instant::now();
        let err = manager.start_all().unwrap_err();

        assert!(err.to_string().contains("exited early"));
        assert!(started.elapsed() < Duration::from_secs(15));
        assert_eq!(manager.running_count(), 0);
    }
}
