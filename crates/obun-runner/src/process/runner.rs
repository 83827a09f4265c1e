use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use obun_core::BuildRecord;

use crate::error::RunnerError;

/// Starts built artifacts as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    grace_period: Duration,
    own_group: bool,
}

/// A live artifact process. Standard streams are shared with the terminal.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    pid: u32,
    artifact: PathBuf,
    grace_period: Duration,
    own_group: bool,
}

impl ProcessRunner {
    /// On Unix each artifact leads its own process group, so terminating it
    /// also stops whatever it forked.
    pub fn new(grace_period: Duration) -> Self {
        Self {
            grace_period,
            own_group: true,
        }
    }

    /// Keep the artifact in our process group. It then receives terminal
    /// signals (Ctrl-C) directly and may read the terminal, but
    /// [`RunningProcess::terminate`] only reaches the artifact itself.
    pub fn with_process_group(mut self, own_group: bool) -> Self {
        self.own_group = own_group;
        self
    }

    /// Spawn the artifact described by `record`.
    pub fn start(&self, record: &BuildRecord) -> Result<RunningProcess, RunnerError> {
        let (program, args) = command_for(&record.artifact, record.shebang.as_deref());
        debug!(program = %program, ?args, "Spawning artifact");

        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        if self.own_group {
            command.process_group(0);
        }

        let child = command
            .spawn()
            .map_err(|source| RunnerError::ProcessSpawn {
                program: program.clone(),
                source,
            })?;

        let pid = child.id().ok_or_else(|| RunnerError::ProcessSpawn {
            program,
            source: std::io::Error::other("process exited before its id was read"),
        })?;
        info!(pid, artifact = %record.artifact.display(), "Artifact started");

        Ok(RunningProcess {
            child,
            pid,
            artifact: record.artifact.clone(),
            grace_period: self.grace_period,
            own_group: self.own_group,
        })
    }
}

impl RunningProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Wait for the process to exit on its own.
    pub async fn wait(&mut self) -> Result<ExitStatus, RunnerError> {
        self.child.wait().await.map_err(RunnerError::Io)
    }

    /// Stop the process and wait until it is gone.
    ///
    /// Sends SIGTERM first; if the process is still alive after the grace
    /// period it is killed outright. Returns only after the exit is
    /// confirmed. With its own process group the signals go to the whole
    /// group, and members left behind by the exited leader are killed.
    pub async fn terminate(mut self) -> Result<ExitStatus, RunnerError> {
        let pid = self.pid;
        let term_err = |source| RunnerError::Terminate { pid, source };

        if let Some(status) = self.child.try_wait().map_err(term_err)? {
            debug!(pid, "Process had already exited");
            self.sweep_group().await;
            return Ok(status);
        }

        if let Err(e) = send_signal(pid, "TERM", self.own_group).await {
            warn!(pid, "SIGTERM failed ({e}), killing");
            return self.kill().await;
        }

        match tokio::time::timeout(self.grace_period, self.child.wait()).await {
            Ok(status) => {
                let status = status.map_err(term_err)?;
                info!(pid, code = exit_code(&status), "Process stopped");
                self.sweep_group().await;
                Ok(status)
            }
            Err(_) => {
                warn!(
                    pid,
                    grace_ms = self.grace_period.as_millis() as u64,
                    "Process ignored SIGTERM, killing"
                );
                self.kill().await
            }
        }
    }

    async fn kill(mut self) -> Result<ExitStatus, RunnerError> {
        let pid = self.pid;
        let term_err = |source| RunnerError::Terminate { pid, source };
        if self.own_group {
            if let Err(e) = send_signal(pid, "KILL", true).await {
                debug!(pid, "Group SIGKILL failed: {e}");
            }
        }
        match self.child.start_kill() {
            Ok(()) => {}
            // already reaped
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(term_err(e)),
        }
        self.child.wait().await.map_err(term_err)
    }

    /// Kill group members that outlived the leader. Errors only mean the
    /// group is already empty.
    async fn sweep_group(&self) {
        if self.own_group {
            if let Err(e) = send_signal(self.pid, "KILL", true).await {
                debug!(pid = self.pid, "Process group already empty: {e}");
            }
        }
    }
}

/// Program and arguments that execute `artifact`.
///
/// With a shebang the interpreter is invoked directly (`/usr/bin/env
/// python3` becomes `/usr/bin/env python3 <artifact>`), so the artifact
/// does not have to be executable. Without one the artifact runs itself.
pub fn command_for(artifact: &Path, shebang: Option<&str>) -> (String, Vec<OsString>) {
    let interpreter = shebang
        .map(|s| s.trim_start_matches("#!").trim())
        .filter(|s| !s.is_empty());

    match interpreter {
        Some(line) => {
            let mut words = line.split_whitespace();
            let program = words.next().unwrap_or_default().to_string();
            let mut args: Vec<OsString> = words.map(OsString::from).collect();
            args.push(artifact.as_os_str().to_os_string());
            (program, args)
        }
        None => (artifact.to_string_lossy().to_string(), Vec::new()),
    }
}

/// Exit code to surface for a child's status: its own code, or
/// `128 + signal` when it was killed by a signal.
pub fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Send `signal` to `pid`, or to the process group it leads.
#[cfg(unix)]
async fn send_signal(pid: u32, signal: &str, group: bool) -> std::io::Result<()> {
    let target = if group {
        format!("-{pid}")
    } else {
        pid.to_string()
    };
    let status = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg("--")
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!("kill exited with {status}")))
    }
}

#[cfg(not(unix))]
async fn send_signal(_pid: u32, _signal: &str, _group: bool) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "signals are not available on this platform",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Instant;

    use obun_core::BuildMode;
    use tempfile::TempDir;

    fn record(artifact: PathBuf, shebang: Option<&str>) -> BuildRecord {
        BuildRecord {
            entry: artifact.with_file_name("index.obun"),
            artifact,
            mode: BuildMode::Run,
            shebang: shebang.map(String::from),
            fragments: BTreeMap::new(),
            built_at: Default::default(),
        }
    }

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("dist.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        path
    }

    #[test]
    fn test_command_for_shebang() {
        let (program, args) = command_for(Path::new("/p/dist.py"), Some("/usr/bin/env python3"));
        assert_eq!(program, "/usr/bin/env");
        assert_eq!(args, vec![OsString::from("python3"), OsString::from("/p/dist.py")]);

        let (program, args) = command_for(Path::new("/p/dist.sh"), Some("#!/bin/sh"));
        assert_eq!(program, "/bin/sh");
        assert_eq!(args, vec![OsString::from("/p/dist.sh")]);
    }

    #[test]
    fn test_command_for_self_executing() {
        let (program, args) = command_for(Path::new("/p/dist"), None);
        assert_eq!(program, "/p/dist");
        assert!(args.is_empty());
    }

    #[tokio::test]
    async fn test_exit_code_is_surfaced() {
        let tmp = TempDir::new().unwrap();
        let path = script(&tmp, "exit 7");
        let runner = ProcessRunner::new(Duration::from_secs(1));

        let mut proc = runner.start(&record(path, Some("/bin/sh"))).unwrap();
        let status = proc.wait().await.unwrap();
        assert_eq!(exit_code(&status), 7);
    }

    #[tokio::test]
    async fn test_terminate_polite() {
        let tmp = TempDir::new().unwrap();
        let path = script(&tmp, "exec sleep 30");
        let runner = ProcessRunner::new(Duration::from_secs(5));

        let proc = runner.start(&record(path, Some("/bin/sh"))).unwrap();
        let started = Instant::now();
        let status = proc.terminate().await.unwrap();
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_terminate_escalates_after_grace() {
        let tmp = TempDir::new().unwrap();
        let path = script(&tmp, "trap '' TERM\nwhile true; do sleep 1; done");
        let runner = ProcessRunner::new(Duration::from_millis(300));

        let proc = runner.start(&record(path, Some("/bin/sh"))).unwrap();
        // let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = proc.terminate().await.unwrap();
        assert_eq!(exit_code(&status), 128 + 9);
    }

    /// Zombies count as gone: an orphan may wait a while for its reaper.
    fn is_alive(pid: &str) -> bool {
        if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            let state = stat.rsplit(')').next().unwrap_or("").trim_start();
            return !state.starts_with('Z');
        }
        std::process::Command::new("kill")
            .args(["-0", pid])
            .status()
            .unwrap()
            .success()
    }

    #[tokio::test]
    async fn test_terminate_stops_forked_processes() {
        let tmp = TempDir::new().unwrap();
        let pid_file = tmp.path().join("grandchild.pid");
        let path = script(
            &tmp,
            &format!("sleep 60 &\necho $! > {}\nwait", pid_file.display()),
        );
        let runner = ProcessRunner::new(Duration::from_secs(2));

        let proc = runner.start(&record(path, Some("/bin/sh"))).unwrap();
        let started = Instant::now();
        let grandchild = loop {
            if let Ok(text) = std::fs::read_to_string(&pid_file) {
                if text.ends_with('\n') {
                    break text.trim().to_string();
                }
            }
            assert!(started.elapsed() < Duration::from_secs(5), "no grandchild pid");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert!(is_alive(&grandchild));

        proc.terminate().await.unwrap();
        // the sleep is not our child, so its death is observed asynchronously
        let deadline = Instant::now() + Duration::from_secs(2);
        while is_alive(&grandchild) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!is_alive(&grandchild));
    }

    #[tokio::test]
    async fn test_shared_group_still_terminates_artifact() {
        let tmp = TempDir::new().unwrap();
        let path = script(&tmp, "exec sleep 30");
        let runner = ProcessRunner::new(Duration::from_secs(5)).with_process_group(false);

        let proc = runner.start(&record(path, Some("/bin/sh"))).unwrap();
        let status = proc.terminate().await.unwrap();
        assert_eq!(exit_code(&status), 128 + 15);
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let tmp = TempDir::new().unwrap();
        let path = script(&tmp, "true");
        let runner = ProcessRunner::new(Duration::from_secs(1));
        let err = runner
            .start(&record(path, Some("/definitely/not/an/interpreter")))
            .unwrap_err();
        assert!(matches!(err, RunnerError::ProcessSpawn { .. }));
        assert_eq!(err.exit_code(), 69);
    }
}
