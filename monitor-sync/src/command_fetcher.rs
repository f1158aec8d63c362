//! [`Fetcher`] that shells out to a configured build-status command.
//!
//! The command receives the previous snapshot as JSON on stdin (and its id
//! in `MONITOR_BUILD_ID`) and must print the remote view as a JSON object on
//! stdout. Keys it does not print are treated as "not reported".
//!
//! On unix the command leads its own process group, and a timeout kills the
//! whole group so a backgrounded grandchild cannot keep the pipes open.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use monitor_core::{settings::FetcherSettings, BuildSnapshot, BuildUpdate};

use crate::collaborators::Fetcher;
use crate::error::FetchError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandFetcher {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from `fetcher.*` settings. Fails when no command is configured.
    pub fn from_settings(settings: &FetcherSettings) -> Result<Self, FetchError> {
        let Some((program, args)) = settings.command.split_first() else {
            return Err(FetchError::NotConfigured);
        };
        Ok(Self::new(
            program.clone(),
            args.to_vec(),
            Duration::from_secs(settings.timeout_secs),
        ))
    }
}

impl Fetcher for CommandFetcher {
    fn fetch(&self, build: &BuildSnapshot) -> Result<BuildUpdate, FetchError> {
        let payload = build.to_payload().map_err(FetchError::Encode)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("MONITOR_BUILD_ID", &build.id.0)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| FetchError::Unreachable(format!("failed to start `{}`: {e}", self.program)))?;

        // Feed stdin and drain both pipes off-thread so a chatty command
        // cannot block on a full pipe while we wait on it.
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // A command that ignores stdin closes it early; not an error.
                let _ = stdin.write_all(payload.as_bytes());
            }
        });
        let stdout = child.stdout.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout));
        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || read_pipe(stderr));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    // The pipe threads are left detached; they end once the
                    // killed group's pipes close.
                    kill_and_reap(&mut child);
                    tracing::warn!(
                        "fetch command `{}` timed out for build {}",
                        self.program,
                        build.id
                    );
                    return Err(FetchError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill_and_reap(&mut child);
                    return Err(FetchError::Unreachable(format!(
                        "failed to wait on `{}`: {e}",
                        self.program
                    )));
                }
            }
        };

        let _ = writer.join();
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(FetchError::Unreachable(format!(
                "`{}` exited with {status}: {}",
                self.program,
                stderr.trim()
            )));
        }

        let update = BuildUpdate::parse(stdout.trim())?;
        tracing::debug!("fetched remote view for build {}", build.id);
        Ok(update)
    }
}

fn kill_and_reap(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Ok(pid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn read_pipe<R: Read>(pipe: Option<R>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}
