//! Helpers for running child processes with timeouts, bounded capture and
//! line-by-line log files.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, info, instrument, warn};
use wait_timeout::ChildExt;

type SharedLog = Arc<Option<Mutex<BufWriter<File>>>>;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Short description of how the command ended, for error messages.
    pub fn describe_failure(&self) -> String {
        if self.timed_out {
            return "timed out".to_string();
        }
        match self.status.code() {
            Some(code) => format!("exited with code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Options for [`run_command`].
#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    pub timeout: Duration,
    /// Bytes of stdout/stderr kept in memory; the rest is drained and counted.
    pub output_limit_bytes: usize,
    /// Append every output line to this file as it is produced.
    pub log_path: Option<&'a Path>,
    /// Banner written at the top of the log file before the child starts.
    pub log_banner: Option<&'a str>,
}

impl Default for RunOptions<'_> {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            output_limit_bytes: 100_000,
            log_path: None,
            log_banner: None,
        }
    }
}

/// Quote a command line for logging.
pub fn display_command(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|arg| quote_arg(&arg.to_string_lossy())));
    parts.join(" ")
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '='))
    {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\\\""))
}

/// Run a command to completion, killing it after `options.timeout`.
///
/// stdout and stderr are read concurrently while the child runs so the pipes
/// never fill up. When `options.log_path` is set, each line from either stream
/// is appended to that file and flushed immediately.
///
/// On unix the child leads its own process group, and a timeout kills the
/// whole group so grandchildren holding the pipes do not outlive the step.
#[instrument(skip_all, fields(timeout_secs = options.timeout.as_secs(), logged = options.log_path.is_some()))]
pub fn run_command(mut cmd: Command, options: &RunOptions<'_>) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut cmd);

    let rendered = display_command(&cmd);
    info!(target: "shell", "{rendered}");

    let log = Arc::new(open_log(options)?);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, command = %rendered, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {rendered}"));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = options.output_limit_bytes;
    let stdout_log = Arc::clone(&log);
    let stderr_log = Arc::clone(&log);
    let stdout_handle = thread::spawn(move || read_lines_limited(stdout, limit, stdout_log));
    let stderr_handle = thread::spawn(move || read_lines_limited(stderr, limit, stderr_log));

    let mut timed_out = false;
    let status = match child.wait_timeout(options.timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = options.timeout.as_secs(),
                command = %rendered,
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_tree(&mut child).context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        debug!(stdout_truncated, stderr_truncated, "output truncated in memory");
    }

    if let Some(mutex) = &*log
        && let Ok(mut writer) = mutex.lock()
    {
        let trailer = if timed_out {
            "[timed out]\n".to_string()
        } else {
            format!("[{status}]\n")
        };
        if let Err(e) = writer.write_all(trailer.as_bytes()).and_then(|()| writer.flush()) {
            warn!(err = %e, "failed to finish command log");
        }
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// SIGKILL the child's process group, falling back to the child alone.
fn kill_process_tree(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => warn!(%status, "kill of process group failed, killing child only"),
            Err(err) => warn!(err = %err, "could not run kill, killing child only"),
        }
    }
    child.kill()
}

fn open_log(options: &RunOptions<'_>) -> Result<Option<Mutex<BufWriter<File>>>> {
    let Some(path) = options.log_path else {
        return Ok(None);
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open command log {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    if let Some(banner) = options.log_banner {
        let rule = "-".repeat(banner.len());
        writeln!(writer, "{rule}\n{banner}\n{rule}")
            .and_then(|()| writer.flush())
            .with_context(|| format!("write command log {}", path.display()))?;
    }
    Ok(Some(Mutex::new(writer)))
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Read a stream line by line with a size limit, tee-ing each line to the log.
fn read_lines_limited<R: Read>(reader: R, limit: usize, log: SharedLog) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        if let Some(mutex) = &*log
            && let Ok(mut writer) = mutex.lock()
        {
            let result = writer.write_all(&line).and_then(|()| {
                if line.ends_with(b"\n") {
                    Ok(())
                } else {
                    writer.write_all(b"\n")
                }
            });
            if let Err(e) = result.and_then(|()| writer.flush()) {
                warn!(err = %e, "failed to write command log");
            }
        }

        let remaining = limit.saturating_sub(collected.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            collected.extend_from_slice(&line[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((collected, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_exit_status() {
        let output = run_command(sh("echo hello; exit 3"), &RunOptions::default()).expect("run");
        assert_eq!(output.stdout_lossy(), "hello\n");
        assert!(!output.success());
        assert_eq!(output.describe_failure(), "exited with code 3");
    }

    #[test]
    fn tees_both_streams_into_log_with_banner() {
        let temp = tempfile::tempdir().expect("tempdir");
        let log_path = temp.path().join("logs/step.log");
        let options = RunOptions {
            log_path: Some(&log_path),
            log_banner: Some("started at now"),
            ..RunOptions::default()
        };
        let output = run_command(sh("echo out; echo err 1>&2"), &options).expect("run");
        assert!(output.success());

        let log = fs::read_to_string(&log_path).expect("read log");
        let rule = "-".repeat("started at now".len());
        assert!(log.starts_with(&format!("{rule}\nstarted at now\n{rule}\n")));
        assert!(log.contains("out\n"));
        assert!(log.contains("err\n"));
        assert!(log.contains("[exit status:"));
    }

    #[test]
    fn limits_captured_output() {
        let options = RunOptions {
            output_limit_bytes: 4,
            ..RunOptions::default()
        };
        let output = run_command(sh("echo 0123456789"), &options).expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 7);
    }

    #[test]
    fn kills_on_timeout() {
        let options = RunOptions {
            timeout: Duration::from_millis(200),
            ..RunOptions::default()
        };
        let output = run_command(sh("exec sleep 5"), &options).expect("run");
        assert!(output.timed_out);
        assert!(!output.success());
        assert_eq!(output.describe_failure(), "timed out");
    }

    #[test]
    fn timeout_kills_grandchildren_holding_the_pipes() {
        let options = RunOptions {
            timeout: Duration::from_millis(200),
            ..RunOptions::default()
        };
        let started = std::time::Instant::now();
        let output = run_command(sh("sleep 4; echo done"), &options).expect("run");
        let elapsed = started.elapsed();

        assert!(output.timed_out);
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
        assert!(!output.stdout_lossy().contains("done"));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let cmd = Command::new("definitely-not-a-real-program-rolling-perf");
        let err = run_command(cmd, &RunOptions::default()).unwrap_err();
        assert!(format!("{err:#}").contains("spawn"));
    }

    #[test]
    fn display_command_quotes_spaces() {
        let mut cmd = Command::new("git");
        cmd.args(["commit", "-m", "hello world"]);
        assert_eq!(display_command(&cmd), "git commit -m \"hello world\"");
    }
}
