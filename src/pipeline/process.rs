//! External command execution.
//!
//! Every external binary (soffice, ffmpeg, the HTML renderer) goes through
//! [`run_cmd`]. Output is captured in full; a non-zero exit becomes a
//! [`ToolError`] carrying both streams so the tool's own message reaches the
//! HTTP caller. Children are killed when the awaiting future is dropped, so a
//! request that times out does not leave an encoder running.

use crate::error::ToolError;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured output of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run `program` with `args`, optionally writing `stdin` to it, and wait for
/// it to exit.
pub async fn run_cmd(
    program: impl AsRef<OsStr>,
    args: &[String],
    stdin: Option<&[u8]>,
) -> Result<CommandOutput, ToolError> {
    let program = program.as_ref();
    let program_name = program.to_string_lossy().into_owned();
    let start = Instant::now();

    let failure = |code: Option<i32>, stdout: Vec<u8>, stderr: Vec<u8>| ToolError {
        program: program_name.clone(),
        args: args.to_vec(),
        code,
        stdout,
        stderr,
    };

    debug!("Running {} {}", program_name, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failure(None, Vec::new(), e.to_string().into_bytes()))?;

    // Stdin is fed from its own task while the outputs are drained, otherwise
    // a child that writes before it finishes reading can fill the pipe.
    let feeder = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_vec();
            let name = program_name.clone();
            Some(tokio::spawn(async move {
                // A child that exits without reading closes the pipe early;
                // its exit status reports that case.
                if let Err(e) = pipe.write_all(&input).await {
                    debug!("{}: stdin closed early: {}", name, e);
                }
            }))
        }
        _ => None,
    };

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| failure(None, Vec::new(), e.to_string().into_bytes()))?;

    if let Some(feeder) = feeder {
        let _ = feeder.await;
    }

    if !output.status.success() {
        let err = failure(output.status.code(), output.stdout, output.stderr);
        warn!("{} failed after {:?}: {}", err.command_line(), start.elapsed(), err);
        return Err(err);
    }

    debug!("{} finished in {:?}", program_name, start.elapsed());
    Ok(CommandOutput {
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
