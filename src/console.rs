//! Interactive command loop.
//!
//! The loop only parses commands and collects calibration answers; what a
//! command does is delegated to a [`CommandHandler`], so the acquisition core
//! never reads from the terminal. Input and output are generic async streams,
//! which lets tests drive the loop from an in-memory script.
//!
//! A shutdown `watch` ends the loop as soon as it flips to `true`, even while
//! a prompt is waiting for input.

use crate::calibration::CalibrationSettings;
use crate::calibration::{
    DIVISION_FACTOR, FOLDER_ID, LOG_INTERVAL, START_DATE, START_TIME, STOP_DATE, STOP_TIME,
};
use crate::error::LoggerError;
use async_trait::async_trait;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

/// Shown before every command.
pub const COMMAND_PROMPT: &str = "Enter 'calibrate', 'start' to log data, or 'quit' to exit: ";

/// Calibration questions in the order they are asked.
///
/// The window questions may all be left blank for a continuous session, and
/// the division factor may be left blank to store raw values.
const CALIBRATION_PROMPTS: [(&str, &str); 7] = [
    (START_TIME, "Start Time (HH:MM:SS, blank for continuous): "),
    (START_DATE, "Start Date (DD-MM-YYYY, blank for continuous): "),
    (STOP_TIME, "Stop Time (HH:MM:SS, blank for continuous): "),
    (STOP_DATE, "Stop Date (DD-MM-YYYY, blank for continuous): "),
    (LOG_INTERVAL, "Log Interval (in seconds): "),
    (FOLDER_ID, "Remote Folder ID: "),
    (DIVISION_FACTOR, "Division Factor (blank for none): "),
];

/// A console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Ask the calibration questions and save the answers
    Calibrate,
    /// Run one logging session
    Start,
    /// Leave the loop
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "calibrate" => Ok(Command::Calibrate),
            "start" => Ok(Command::Start),
            "quit" => Ok(Command::Quit),
            other => Err(format!("Invalid command '{other}'")),
        }
    }
}

/// What the console does for each command.
#[async_trait]
pub trait CommandHandler: Send {
    /// Validate and persist the collected answers.
    async fn calibrate(&mut self, settings: CalibrationSettings) -> Result<(), LoggerError>;

    /// Run one logging session; the returned text is shown to the operator.
    async fn start(&mut self) -> Result<String, LoggerError>;
}

/// Run the loop until `quit`, end of input, or `shutdown` turns `true`.
pub async fn run<R, W>(
    input: &mut R,
    output: &mut W,
    handler: &mut dyn CommandHandler,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    loop {
        let Some(line) = prompt(input, output, COMMAND_PROMPT, &mut shutdown).await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(Command::Calibrate) => {
                let Some(settings) = ask_calibration(input, output, &mut shutdown).await? else {
                    break;
                };
                match handler.calibrate(settings).await {
                    Ok(()) => say(output, "Calibration settings saved.").await?,
                    Err(e) => say(output, &format!("Error during calibration: {e}")).await?,
                }
            }
            Ok(Command::Start) => match handler.start().await {
                Ok(summary) => say(output, &summary).await?,
                Err(e) => say(output, &format!("Error during logging: {e}")).await?,
            },
            Err(e) => say(output, &format!("{e}.")).await?,
        }
    }
    if *shutdown.borrow() {
        tracing::info!("Shutdown signal received, leaving console");
    }
    say(output, "Exiting program.").await
}

async fn ask_calibration<R, W>(
    input: &mut R,
    output: &mut W,
    shutdown: &mut watch::Receiver<bool>,
) -> std::io::Result<Option<CalibrationSettings>>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    say(output, "Enter the following recording time settings:").await?;
    let mut settings = CalibrationSettings::new();
    for (key, question) in CALIBRATION_PROMPTS {
        let Some(answer) = prompt(input, output, question, shutdown).await? else {
            return Ok(None);
        };
        let answer = answer.trim();
        if !answer.is_empty() {
            settings.insert(key, answer);
        }
    }
    Ok(Some(settings))
}

/// Write `question` and read one line. `None` at end of input or on shutdown.
async fn prompt<R, W>(
    input: &mut R,
    output: &mut W,
    question: &str,
    shutdown: &mut watch::Receiver<bool>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    if *shutdown.borrow_and_update() {
        return Ok(None);
    }
    output.write_all(question.as_bytes()).await?;
    output.flush().await?;
    let mut line = String::new();
    let read = tokio::select! {
        read = input.read_line(&mut line) => read?,
        _ = shutdown_requested(shutdown) => return Ok(None),
    };
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Resolves once `shutdown` is `true`. Never resolves if the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn say<W: AsyncWrite + Unpin + Send>(output: &mut W, message: &str) -> std::io::Result<()> {
    output.write_all(message.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
