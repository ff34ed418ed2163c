//! Line-oriented interactive front end.
//!
//! Asks for file names, answers the retry questions raised by the transfer
//! loops, echoes transferred content, and repeats get/send rounds until the
//! user declines.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::service::RemoteFiles;
use crate::transfer::{get_file, send_file, RetryPolicy, TransferError, TransferReport};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub rounds: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct Console<R, W> {
    input: R,
    output: W,
    /// Set when a prompt raised by a transfer loop could not be shown or
    /// answered; [`run_session`] reports it once the transfer returns.
    failure: Option<io::Error>,
}

impl<R, W> Console<R, W>
where
    R: BufRead,
    W: Write,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            failure: None,
        }
    }

    pub fn into_inner(self) -> (R, W) {
        (self.input, self.output)
    }

    /// `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
    }

    /// Prompts until a non-empty name is entered. `None` at end of input.
    pub fn ask_name(&mut self, prompt: &str) -> io::Result<Option<String>> {
        loop {
            write!(self.output, "{prompt}")?;
            self.output.flush()?;
            match self.read_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => writeln!(self.output, "Invalid file name.")?,
                Some(line) => return Ok(Some(line)),
            }
        }
    }

    /// Prompts until `y`, `Y`, `n` or `N` is entered. End of input is "no".
    pub fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        loop {
            write!(self.output, "{prompt}")?;
            self.output.flush()?;
            match self.read_line()?.as_deref() {
                None => return Ok(false),
                Some("y") | Some("Y") => return Ok(true),
                Some("n") | Some("N") => return Ok(false),
                Some(_) => writeln!(
                    self.output,
                    "Invalid response. Enter 'y' for yes or 'n' for no."
                )?,
            }
        }
    }

    fn report(&mut self, report: &TransferReport) -> io::Result<()> {
        writeln!(
            self.output,
            "Transferred {} bytes in {} chunks.",
            report.bytes, report.chunks
        )?;
        if !report.remote_closed {
            writeln!(
                self.output,
                "WARNING: remote file {} was not closed cleanly.",
                report.remote_path
            )?;
        }
        Ok(())
    }

    fn retry_with_name(&mut self, question: &str, prompt: &str) -> io::Result<Option<String>> {
        if !self.confirm(question)? {
            return Ok(None);
        }
        self.ask_name(prompt)
    }

    /// Takes the console error recorded during the last transfer, if any.
    pub fn take_failure(&mut self) -> Option<io::Error> {
        self.failure.take()
    }

    fn settle<T>(&mut self, result: io::Result<Option<T>>) -> Option<T> {
        match result {
            Ok(answer) => answer,
            Err(e) => {
                warn!("console I/O failed during a transfer: {e}");
                self.failure.get_or_insert(e);
                None
            }
        }
    }
}

impl<R, W> RetryPolicy for Console<R, W>
where
    R: BufRead,
    W: Write,
{
    fn retry_remote_open(&mut self, _path: &str, error: &TransferError) -> Option<String> {
        let answer = writeln!(self.output, "ERROR: {error}").and_then(|()| {
            self.retry_with_name(
                "Remote file could not be opened. Try again (y/n)? ",
                "Please enter a file name to get from server: ",
            )
        });
        self.settle(answer)
    }

    fn retry_local_open(&mut self, path: &Path, error: &io::Error) -> Option<PathBuf> {
        let answer = writeln!(self.output, "ERROR opening local file {}: {error}", path.display())
            .and_then(|()| {
                self.retry_with_name(
                    "Could not open local file. Try again (y/n)? ",
                    "Please enter a file name to send to server: ",
                )
            });
        self.settle(answer).map(PathBuf::from)
    }

    fn on_chunk(&mut self, data: &[u8]) {
        if self.failure.is_some() {
            return;
        }
        let echoed = writeln!(self.output, "{}", String::from_utf8_lossy(data)).map(|()| Some(()));
        self.settle(echoed);
    }
}

/// Runs get/send rounds against `remote` until the user stops or input ends.
///
/// Failures of a single transfer are reported and the round continues;
/// session-fatal transfer errors end the session.
pub async fn run_session<F, R, W>(
    remote: &F,
    console: &mut Console<R, W>,
) -> Result<SessionSummary, SessionError>
where
    F: RemoteFiles + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut summary = SessionSummary::default();
    loop {
        let Some(remote_name) = console.ask_name("Please enter a file name to get from server: ")? else {
            break;
        };
        let Some(local_name) =
            console.ask_name(&format!("Enter the file name to store {remote_name} as: "))?
        else {
            break;
        };
        summary.rounds += 1;
        writeln!(
            console.output,
            "Copy remote server file {remote_name} to local client file {local_name}."
        )?;
        let outcome = get_file(remote, &remote_name, Path::new(&local_name), console).await;
        if let Some(e) = console.take_failure() {
            return Err(e.into());
        }
        record(console, &mut summary, outcome)?;

        let Some(local_name) = console.ask_name("Please enter a file name to send to server: ")? else {
            break;
        };
        let Some(remote_name) =
            console.ask_name(&format!("Enter the file name to store {local_name} as: "))?
        else {
            break;
        };
        writeln!(
            console.output,
            "Copy local client file {local_name} to remote server file {remote_name}."
        )?;
        let outcome = send_file(remote, Path::new(&local_name), &remote_name, console).await;
        if let Some(e) = console.take_failure() {
            return Err(e.into());
        }
        record(console, &mut summary, outcome)?;

        if !console.confirm("Procedure complete. get/send another set of files (y/n)? ")? {
            break;
        }
    }
    Ok(summary)
}

fn record<R, W>(
    console: &mut Console<R, W>,
    summary: &mut SessionSummary,
    outcome: Result<TransferReport, TransferError>,
) -> Result<(), SessionError>
where
    R: BufRead,
    W: Write,
{
    match outcome {
        Ok(report) => {
            summary.completed += 1;
            console.report(&report)?;
            Ok(())
        }
        Err(e) if e.is_session_fatal() => Err(e.into()),
        Err(e) => {
            summary.failed += 1;
            writeln!(console.output, "ERROR: {e}")?;
            Ok(())
        }
    }
}
