//! SSH adapter
//!
//! libssh2 is blocking, so each call runs on the blocking pool. Once the
//! command is started the channel is read without blocking until it closes,
//! the environment's deadline passes, or the caller stops waiting. In the
//! last two cases the channel and session are torn down; a PTY is requested
//! so the remote process receives SIGHUP when that happens.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use ssh2::{Channel, CheckResult, KnownHostFileKind, Session};
use tracing::{debug, info, warn};

use crate::adapters::{AdapterOutcome, ConnectionAdapter, FailureKind, InitContext};
use crate::config::settings::SshSettings;
use crate::models::environment::{ConnectionMethod, ConnectionParams, Environment, SshAuth};
use crate::utils::{fingerprint_sha256, shell_quote};

/// Headroom on top of the command deadline before the async side gives up
const DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// Pause between reads of a running command
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bound on closing the channel and session after a deadline or abort
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

enum Credentials {
    Key(PathBuf),
    Password(SecretString),
}

/// Owned copy of everything the blocking call needs
struct SshTarget {
    environment_id: String,
    host: String,
    port: u16,
    username: String,
    credentials: Credentials,
    command: String,
    deadline: Duration,
}

/// Raises the abort flag when the async caller stops waiting
struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Why a running command was stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Expired,
    Aborted,
}

/// Runs the init script over SSH
pub struct SshAdapter {
    settings: SshSettings,
}

impl SshAdapter {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }
}

/// `cd <working_directory> && <init_script_path>`
pub fn build_init_command(working_directory: &str, init_script_path: &str) -> String {
    format!("cd {} && {}", shell_quote(working_directory), init_script_path)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[async_trait]
impl ConnectionAdapter for SshAdapter {
    async fn execute_init(&self, env: &Environment, ctx: &InitContext) -> AdapterOutcome {
        let ConnectionParams::Ssh(params) = &env.params else {
            return AdapterOutcome::failed(
                FailureKind::Config,
                format!("{} is not an ssh environment", env.id),
                "",
            );
        };

        let credentials = match &params.auth {
            SshAuth::Key(path) => Credentials::Key(expand_home(path)),
            SshAuth::Password(password) => {
                Credentials::Password(SecretString::from(password.expose_secret().to_owned()))
            }
        };

        let target = SshTarget {
            environment_id: env.id.clone(),
            host: params.host.clone(),
            port: params.port,
            username: params.username.clone(),
            credentials,
            command: build_init_command(&env.working_directory, &env.init_script_path),
            deadline: env.timeout,
        };

        info!(
            "[{}] ssh {}@{}:{} attempt {} (job {})",
            env.id, params.username, params.host, params.port, ctx.attempt, ctx.job_id
        );

        let settings = self.settings.clone();
        let hard_deadline = hard_deadline(env.timeout, settings.connect_timeout);
        let abort = Arc::new(AtomicBool::new(false));
        let _abort_guard = AbortOnDrop(abort.clone());
        let task = tokio::task::spawn_blocking(move || run_blocking(&target, &settings, &abort));

        match tokio::time::timeout(hard_deadline, task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => AdapterOutcome::failed(
                FailureKind::Connection,
                format!("ssh worker failed: {}", e),
                "",
            ),
            Err(_) => AdapterOutcome::failed(
                FailureKind::Timeout,
                format!("no response within {:?}", hard_deadline),
                "",
            ),
        }
    }

    fn supports(&self, method: ConnectionMethod) -> bool {
        method == ConnectionMethod::Ssh
    }
}

/// Backstop for the async side; the blocking side enforces the deadline itself
fn hard_deadline(timeout: Duration, connect_timeout_secs: u64) -> Duration {
    timeout
        .saturating_add(Duration::from_secs(connect_timeout_secs))
        .saturating_add(DEADLINE_GRACE)
}

fn millis(duration: Duration) -> u32 {
    duration.as_millis().min(u128::from(u32::MAX)) as u32
}

fn connect(target: &SshTarget, settings: &SshSettings) -> Result<Session, String> {
    let connect_timeout = Duration::from_secs(settings.connect_timeout);

    let addr = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| format!("cannot resolve {}: {}", target.host, e))?
        .next()
        .ok_or_else(|| format!("no address for {}", target.host))?;

    let tcp = TcpStream::connect_timeout(&addr, connect_timeout)
        .map_err(|e| format!("cannot reach {}: {}", addr, e))?;

    let mut session = Session::new().map_err(|e| format!("cannot create session: {}", e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(millis(connect_timeout));
    session
        .handshake()
        .map_err(|e| format!("handshake failed: {}", e))?;

    verify_host_key(&session, target, settings)?;

    match &target.credentials {
        Credentials::Key(path) => session
            .userauth_pubkey_file(&target.username, None, path, None)
            .map_err(|e| format!("key authentication failed: {}", e))?,
        Credentials::Password(password) => session
            .userauth_password(&target.username, password.expose_secret())
            .map_err(|e| format!("password authentication failed: {}", e))?,
    }
    if !session.authenticated() {
        return Err(format!("authentication rejected for {}", target.username));
    }

    Ok(session)
}

fn verify_host_key(
    session: &Session,
    target: &SshTarget,
    settings: &SshSettings,
) -> Result<(), String> {
    let (host_key, _) = session
        .host_key()
        .ok_or_else(|| "host key unavailable".to_string())?;
    let fingerprint = fingerprint_sha256(host_key);
    debug!("[{}] host key {}", target.environment_id, fingerprint);

    if !settings.strict_host_key_checking {
        return Ok(());
    }

    let mut known_hosts = session
        .known_hosts()
        .map_err(|e| format!("known hosts unavailable: {}", e))?;
    if let Some(path) = &settings.known_hosts_path {
        known_hosts
            .read_file(&expand_home(Path::new(path)), KnownHostFileKind::OpenSSH)
            .map_err(|e| format!("cannot read {}: {}", path, e))?;
    }

    match known_hosts.check_port(&target.host, target.port, host_key) {
        CheckResult::Match => Ok(()),
        CheckResult::Mismatch => Err(format!("host key mismatch ({})", fingerprint)),
        CheckResult::NotFound => Err(format!("host key not trusted ({})", fingerprint)),
        _ => Err(format!("host key check failed ({})", fingerprint)),
    }
}

fn should_stop(now: Instant, expires_at: Option<Instant>, abort: &AtomicBool) -> Option<Stop> {
    if abort.load(Ordering::SeqCst) {
        Some(Stop::Aborted)
    } else if expires_at.is_some_and(|at| now >= at) {
        Some(Stop::Expired)
    } else {
        None
    }
}

/// Append whatever the stream has buffered without waiting for more
fn drain_available(reader: &mut impl Read, sink: &mut Vec<u8>) -> std::io::Result<()> {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => sink.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// Decode command output, appending stderr when it has content
fn collect_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut output = String::from_utf8_lossy(stdout).into_owned();
    let stderr = String::from_utf8_lossy(stderr);
    if !stderr.trim().is_empty() {
        output.push('\n');
        output.push_str(&stderr);
    }
    output
}

/// Interrupt the command and close the channel and the session
fn teardown(session: &Session, channel: &mut Channel, reason: &str) {
    session.set_blocking(true);
    session.set_timeout(millis(TEARDOWN_TIMEOUT));
    // ^C to the PTY's foreground group; closing delivers SIGHUP
    let _ = channel.write_all(&[0x03]);
    let _ = channel.close();
    let _ = session.disconnect(None, reason, None);
}

fn run_blocking(target: &SshTarget, settings: &SshSettings, abort: &AtomicBool) -> AdapterOutcome {
    if abort.load(Ordering::SeqCst) {
        return AdapterOutcome::failed(FailureKind::Cancelled, "aborted before connecting", "");
    }

    let session = match connect(target, settings) {
        Ok(session) => session,
        Err(message) => {
            warn!("[{}] {}", target.environment_id, message);
            return AdapterOutcome::failed(FailureKind::Connection, message, "");
        }
    };

    if abort.load(Ordering::SeqCst) {
        let _ = session.disconnect(None, "aborted", None);
        return AdapterOutcome::failed(FailureKind::Cancelled, "aborted after connecting", "");
    }

    session.set_timeout(millis(target.deadline));

    let mut channel = match session.channel_session() {
        Ok(channel) => channel,
        Err(e) => {
            return AdapterOutcome::failed(
                FailureKind::Connection,
                format!("cannot open channel: {}", e),
                "",
            )
        }
    };

    if let Err(e) = channel.request_pty("xterm", None, None) {
        debug!("[{}] pty unavailable: {}", target.environment_id, e);
    }

    debug!("[{}] exec: {}", target.environment_id, target.command);
    if let Err(e) = channel.exec(&target.command) {
        return AdapterOutcome::failed(
            FailureKind::Connection,
            format!("cannot exec command: {}", e),
            "",
        );
    }

    // None when the deadline is too far out to represent
    let expires_at = Instant::now().checked_add(target.deadline);
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    session.set_blocking(false);
    let stop = loop {
        let read = drain_available(&mut channel, &mut stdout)
            .and_then(|()| drain_available(&mut channel.stderr(), &mut stderr));
        if let Err(e) = read {
            teardown(&session, &mut channel, "read failed");
            return AdapterOutcome::failed(
                FailureKind::Connection,
                format!("reading output failed: {}", e),
                collect_output(&stdout, &stderr),
            );
        }

        if channel.eof() {
            let _ = drain_available(&mut channel, &mut stdout);
            let _ = drain_available(&mut channel.stderr(), &mut stderr);
            break None;
        }

        if let Some(stop) = should_stop(Instant::now(), expires_at, abort) {
            break Some(stop);
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let output = collect_output(&stdout, &stderr);
    match stop {
        Some(Stop::Expired) => {
            warn!(
                "[{}] command exceeded {:?}, closing session",
                target.environment_id, target.deadline
            );
            teardown(&session, &mut channel, "deadline exceeded");
            return AdapterOutcome::failed(
                FailureKind::Timeout,
                format!("command exceeded {:?}", target.deadline),
                output,
            );
        }
        Some(Stop::Aborted) => {
            info!("[{}] aborted, closing session", target.environment_id);
            teardown(&session, &mut channel, "aborted");
            return AdapterOutcome::failed(FailureKind::Cancelled, "aborted", output);
        }
        None => {}
    }

    session.set_blocking(true);
    session.set_timeout(millis(TEARDOWN_TIMEOUT));
    let _ = channel.wait_close();
    match channel.exit_status() {
        Ok(0) => AdapterOutcome::succeeded(output),
        Ok(code) => AdapterOutcome::failed(
            FailureKind::Command,
            format!("exit status {}", code),
            output,
        ),
        Err(e) => AdapterOutcome::failed(
            FailureKind::Connection,
            format!("exit status unavailable: {}", e),
            output,
        ),
    }
}
