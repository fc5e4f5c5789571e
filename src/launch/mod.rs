//! Running the entry process
//!
//! The launcher starts exactly one process, the descriptor's entry command,
//! and reports its exit code. It does not restart or supervise: when the
//! process exits, the launch is over.

mod probe;

pub use probe::{probe, ProbeOutcome};

use crate::descriptor::{BindAddress, LaunchDescriptor};
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Port {port} is already in use on {host}")]
    PortInUse {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("Entry command is empty")]
    EmptyCommand,

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed while waiting for the entry process: {0}")]
    Wait(#[source] io::Error),
}

/// How the wait for the listening socket ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    ExitedEarly(ExitStatus),
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Request path, e.g. `/` or `/health`
    pub path: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Local directory the process runs in (the application source root)
    pub workdir: PathBuf,
    pub startup_timeout: Duration,
    pub probe: Option<ProbeOptions>,
    /// Refuse to start when the bind port is already taken
    pub check_port: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            startup_timeout: Duration::from_secs(30),
            probe: None,
            check_port: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub readiness: Readiness,
    pub probe: Option<ProbeOutcome>,
    pub exit_code: i32,
    pub interrupted: bool,
}

pub struct Launcher {
    descriptor: LaunchDescriptor,
    options: LaunchOptions,
}

impl Launcher {
    pub fn new(descriptor: LaunchDescriptor, options: LaunchOptions) -> Self {
        Self {
            descriptor,
            options,
        }
    }

    fn command(&self) -> Result<(String, Command), LaunchError> {
        let argv = self.descriptor.entry.argv();
        let (program, args) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(LaunchError::EmptyCommand);
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.options.workdir)
            .envs(&self.descriptor.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        Ok((argv.join(" "), command))
    }

    /// Start the entry process and wait for it to exit
    pub async fn run(&self) -> Result<LaunchReport, LaunchError> {
        let bind = &self.descriptor.entry.bind;
        if self.options.check_port {
            ensure_port_free(bind).await?;
        }

        let (command_line, mut command) = self.command()?;
        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            program: self.descriptor.entry.server.clone(),
            source,
        })?;
        info!(pid = ?child.id(), command = %command_line, "Started entry process");

        let target = bind.connect_target();
        let waited = tokio::select! {
            readiness = wait_for_listener(&mut child, &target, self.options.startup_timeout) => Some(readiness?),
            _ = tokio::signal::ctrl_c() => None,
        };
        let readiness = match waited {
            Some(readiness) => readiness,
            None => return self.interrupt(child, Readiness::TimedOut, None).await,
        };

        let mut probe_outcome = None;
        match readiness {
            Readiness::ExitedEarly(status) => {
                let exit_code = exit_code(status);
                error!(exit_code, address = %bind, "Entry process exited before listening");
                return Ok(LaunchReport {
                    readiness,
                    probe: None,
                    exit_code,
                    interrupted: false,
                });
            }
            Readiness::TimedOut => {
                warn!(
                    address = %bind,
                    timeout_secs = self.options.startup_timeout.as_secs(),
                    "Entry process is not accepting connections yet; still running"
                );
            }
            Readiness::Ready => {
                info!(address = %bind, "Entry process is listening");
                if let Some(options) = &self.options.probe {
                    let url = probe_url(bind, &options.path);
                    let outcome = probe(&url, options.timeout).await;
                    if outcome.is_healthy() {
                        info!(url = %url, outcome = %outcome, "Liveness probe passed");
                    } else {
                        warn!(url = %url, outcome = %outcome, "Liveness probe failed");
                    }
                    probe_outcome = Some(outcome);
                }
            }
        }

        let finished = tokio::select! {
            status = child.wait() => Some(status.map_err(LaunchError::Wait)?),
            _ = tokio::signal::ctrl_c() => None,
        };
        match finished {
            Some(status) => {
                let exit_code = exit_code(status);
                info!(exit_code, "Entry process exited");
                Ok(LaunchReport {
                    readiness,
                    probe: probe_outcome,
                    exit_code,
                    interrupted: false,
                })
            }
            None => self.interrupt(child, readiness, probe_outcome).await,
        }
    }

    async fn interrupt(
        &self,
        mut child: Child,
        readiness: Readiness,
        probe: Option<ProbeOutcome>,
    ) -> Result<LaunchReport, LaunchError> {
        info!("Interrupted; stopping entry process");
        if let Err(e) = child.start_kill() {
            warn!(error = %e, "Failed to signal entry process");
        }
        let status = child.wait().await.map_err(LaunchError::Wait)?;
        Ok(LaunchReport {
            readiness,
            probe,
            exit_code: exit_code(status),
            interrupted: true,
        })
    }
}

/// URL a local client uses to probe `bind` at `path`
pub fn probe_url(bind: &BindAddress, path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    format!("http://{}{}", bind.connect_target(), path)
}

/// Fails with [`LaunchError::PortInUse`] when `bind` cannot be bound right now
pub async fn ensure_port_free(bind: &BindAddress) -> Result<(), LaunchError> {
    let addr = bind.to_string();
    match TcpListener::bind(addr.as_str()).await {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(source) => Err(LaunchError::PortInUse {
            host: bind.host.clone(),
            port: bind.port,
            source,
        }),
    }
}

/// Poll `target` until it accepts a TCP connection, `child` exits, or
/// `limit` elapses
pub async fn wait_for_listener(
    child: &mut Child,
    target: &str,
    limit: Duration,
) -> Result<Readiness, LaunchError> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().map_err(LaunchError::Wait)? {
            return Ok(Readiness::ExitedEarly(status));
        }
        if let Ok(Ok(_)) = timeout(CONNECT_ATTEMPT_TIMEOUT, TcpStream::connect(target)).await {
            return Ok(Readiness::Ready);
        }
        if Instant::now() >= deadline {
            return Ok(Readiness::TimedOut);
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Process exit code; on Unix a fatal signal maps to `128 + signo`
pub fn exit_code(status: ExitStatus) -> i32 {
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

#[cfg(all(test, unix))]
mod tests {
    use super::probe::tests::serve_status;
    use super::*;
    use crate::descriptor::{AppRef, CopySpec, EntryCommand, ImageRef};
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn descriptor(server: String, bind: BindAddress) -> LaunchDescriptor {
        LaunchDescriptor {
            version: "1.0".to_string(),
            base_image: ImageRef::parse("python:3.11-slim").unwrap(),
            system_packages: vec![],
            workdir: "/app".to_string(),
            manifest: "requirements.txt".to_string(),
            lock: None,
            source: CopySpec::default(),
            env: BTreeMap::new(),
            expose: bind.port,
            entry: EntryCommand {
                server,
                bind,
                app: AppRef::new("main", "app"),
                args: vec![],
            },
        }
    }

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn options(workdir: &Path, secs: u64) -> LaunchOptions {
        LaunchOptions {
            workdir: workdir.to_path_buf(),
            startup_timeout: Duration::from_secs(secs),
            probe: None,
            check_port: true,
        }
    }

    #[test]
    fn test_probe_url() {
        let bind = BindAddress::new("0.0.0.0", 5000);
        assert_eq!(probe_url(&bind, "/health"), "http://127.0.0.1:5000/health");
        assert_eq!(probe_url(&bind, "health"), "http://127.0.0.1:5000/health");
    }

    #[tokio::test]
    async fn test_port_in_use_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let err = ensure_port_free(&BindAddress::new("127.0.0.1", port))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::PortInUse { port: p, .. } if p == port));
    }

    #[tokio::test]
    async fn test_failing_entry_propagates_exit_code() {
        let temp = TempDir::new().unwrap();
        let server = script(temp.path(), "broken-server", "exit 3");
        let bind = BindAddress::new("127.0.0.1", free_port().await);

        let report = Launcher::new(descriptor(server, bind.clone()), options(temp.path(), 5))
            .run()
            .await
            .unwrap();

        assert!(matches!(report.readiness, Readiness::ExitedEarly(_)));
        assert_eq!(report.exit_code, 3);
        assert!(TcpStream::connect(bind.connect_target()).await.is_err());
    }

    #[tokio::test]
    async fn test_signal_maps_to_128_plus_signo() {
        let temp = TempDir::new().unwrap();
        let server = script(temp.path(), "killed-server", "kill -TERM $$");
        let bind = BindAddress::new("127.0.0.1", free_port().await);

        let report = Launcher::new(descriptor(server, bind), options(temp.path(), 5))
            .run()
            .await
            .unwrap();
        assert_eq!(report.exit_code, 128 + 15);
    }

    #[tokio::test]
    async fn test_missing_server_binary() {
        let temp = TempDir::new().unwrap();
        let bind = BindAddress::new("127.0.0.1", free_port().await);
        let err = Launcher::new(
            descriptor("/nonexistent/gunicorn".to_string(), bind),
            options(temp.path(), 1),
        )
        .run()
        .await
        .unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_ready_entry_is_probed_and_exit_code_returned() {
        let temp = TempDir::new().unwrap();
        let addr = serve_status("200 OK").await;
        let bind = BindAddress::parse(&addr).unwrap();
        let server = script(temp.path(), "server", "sleep 1\nexit 0");

        let mut options = options(temp.path(), 5);
        // the in-test HTTP server already owns the port
        options.check_port = false;
        options.probe = Some(ProbeOptions {
            path: "/".to_string(),
            timeout: Duration::from_secs(5),
        });

        let report = Launcher::new(descriptor(server, bind), options)
            .run()
            .await
            .unwrap();
        assert_eq!(report.readiness, Readiness::Ready);
        assert_eq!(report.probe, Some(ProbeOutcome::Healthy { status: 200 }));
        assert_eq!(report.exit_code, 0);
    }

    /// Entry process for `test_entry_process_listens_and_answers`: serves
    /// the address in `LAUNCHBOX_ENTRY_BIND` until it has answered one request
    #[test]
    #[ignore]
    fn entry_server() {
        use std::io::{Read, Write};

        let Ok(bind) = std::env::var("LAUNCHBOX_ENTRY_BIND") else {
            return;
        };
        std::thread::spawn(|| {
            std::thread::sleep(Duration::from_secs(20));
            std::process::exit(2);
        });

        let listener = std::net::TcpListener::bind(&bind).unwrap();
        for stream in listener.incoming() {
            let mut stream = stream.unwrap();
            let mut buf = [0u8; 1024];
            // readiness checks connect and close without sending anything
            if stream.read(&mut buf).unwrap_or(0) == 0 {
                continue;
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                .unwrap();
            stream.flush().unwrap();
            return;
        }
    }

    #[tokio::test]
    async fn test_entry_process_listens_and_answers() {
        let temp = TempDir::new().unwrap();
        let exe = std::env::current_exe().unwrap();
        let server = script(
            temp.path(),
            "entry",
            &format!(
                "LAUNCHBOX_ENTRY_BIND=\"$2\" exec \"{}\" launch::tests::entry_server --exact --ignored --nocapture --test-threads=1",
                exe.display()
            ),
        );
        let bind = BindAddress::new("127.0.0.1", free_port().await);

        let mut options = options(temp.path(), 20);
        options.probe = Some(ProbeOptions {
            path: "/".to_string(),
            timeout: Duration::from_secs(5),
        });

        let report = Launcher::new(descriptor(server, bind), options)
            .run()
            .await
            .unwrap();
        assert_eq!(report.readiness, Readiness::Ready);
        assert_eq!(report.probe, Some(ProbeOutcome::Healthy { status: 200 }));
        assert_eq!(report.exit_code, 0);
    }

    #[tokio::test]
    async fn test_wait_for_listener_times_out() {
        let temp = TempDir::new().unwrap();
        let server = script(temp.path(), "idle", "sleep 5");
        let mut child = Command::new(&server).kill_on_drop(true).spawn().unwrap();
        let port = free_port().await;

        let readiness = wait_for_listener(
            &mut child,
            &format!("127.0.0.1:{}", port),
            Duration::from_millis(300),
        )
        .await
        .unwrap();
        assert_eq!(readiness, Readiness::TimedOut);
        child.kill().await.unwrap();
    }
}
