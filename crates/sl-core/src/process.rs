//! External process invocation.
//!
//! Legacy solvers and engine adapters are separate executables. Every
//! invocation runs with an explicit working directory (never a process-wide
//! chdir), captured stdout/stderr, optional stdin redirection, and a hard
//! timeout. A hung or failing process is reported as a chunk-level solver
//! error and never takes the run down.

use std::fs::File;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sl_common::{Error, Result};

/// True when `program` resolves on PATH.
#[must_use]
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Run `program` with `args`, waiting at most `timeout` when given.
///
/// `stdin_file` is redirected into the child (the `solver < input.dat`
/// convention of the legacy location codes). Non-zero exit becomes
/// `SolverFailed`; exceeding the timeout kills the child and returns
/// `SolverTimeout`.
pub fn run_command(
    program: &str,
    args: &[String],
    cwd: &Path,
    stdin_file: Option<&Path>,
    timeout: Option<Duration>,
) -> Result<Output> {
    if !command_exists(program) {
        return Err(Error::SolverMissing {
            command: program.to_owned(),
        });
    }

    let rendered = if args.is_empty() {
        program.to_owned()
    } else {
        format!("{} {}", program, args.join(" "))
    };

    let mut command = Command::new(program);
    command.args(args);
    command.current_dir(cwd);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    match stdin_file {
        Some(path) => {
            command.stdin(Stdio::from(File::open(path)?));
        }
        None => {
            command.stdin(Stdio::null());
        }
    }

    let Some(limit) = timeout else {
        let output = command.output()?;
        return validate_output(&rendered, output);
    };

    let mut child = command.spawn()?;
    let started_at = Instant::now();

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    let (stdout_tx, stdout_rx) = std::sync::mpsc::channel();
    let (stderr_tx, stderr_rx) = std::sync::mpsc::channel();

    thread::spawn(move || {
        use std::io::Read;
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        let _ = stdout_tx.send(buf);
    });

    thread::spawn(move || {
        use std::io::Read;
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        let _ = stderr_tx.send(buf);
    });

    loop {
        if let Some(status) = child.try_wait()? {
            let stdout = stdout_rx
                .recv_timeout(Duration::from_millis(100))
                .unwrap_or_default();
            let stderr = stderr_rx
                .recv_timeout(Duration::from_millis(100))
                .unwrap_or_default();
            return validate_output(
                &rendered,
                Output {
                    status,
                    stdout,
                    stderr,
                },
            );
        }

        if started_at.elapsed() >= limit {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::SolverTimeout {
                command: rendered,
                seconds: limit.as_secs(),
            });
        }

        thread::sleep(Duration::from_millis(20));
    }
}

fn validate_output(rendered: &str, output: Output) -> Result<Output> {
    if output.status.success() {
        return Ok(output);
    }
    let status = output.status.code().unwrap_or(-1);
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    Err(Error::solver_failure(rendered, status, &stderr))
}
