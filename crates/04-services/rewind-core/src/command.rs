//! Textual `reverse ...` command surface.

use crate::error::{RewindError, RewindResult};
use crate::host::RewindHost;
use crate::manager::ReverseManager;
use crate::status::{GoOutcome, ReverseStatus};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Parsed `reverse` command. Durations are in emulated seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReverseCmd {
    Start,
    Stop,
    Status,
    /// Go to an absolute time.
    Goto(f64),
    /// Go back from the end of history.
    Back(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ReverseReply {
    Started,
    Stopped,
    Status(ReverseStatus),
    Moved(GoOutcome),
}

impl FromStr for ReverseCmd {
    type Err = RewindError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace().peekable();
        if words.peek() == Some(&"reverse") {
            words.next();
        }
        let verb = words
            .next()
            .ok_or_else(|| RewindError::invalid_command("missing subcommand"))?;
        let cmd = match verb {
            "start" => ReverseCmd::Start,
            "stop" => ReverseCmd::Stop,
            "status" => ReverseCmd::Status,
            "goto" => ReverseCmd::Goto(parse_secs(verb, words.next())?),
            "back" | "goback" => ReverseCmd::Back(parse_secs(verb, words.next())?),
            other => {
                return Err(RewindError::invalid_command(format!(
                    "unknown subcommand `{other}`"
                )))
            }
        };
        if let Some(extra) = words.next() {
            return Err(RewindError::invalid_command(format!(
                "unexpected argument `{extra}`"
            )));
        }
        Ok(cmd)
    }
}

fn parse_secs(verb: &str, word: Option<&str>) -> RewindResult<f64> {
    let word =
        word.ok_or_else(|| RewindError::invalid_command(format!("`{verb}` needs seconds")))?;
    match word.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs),
        _ => Err(RewindError::invalid_command(format!(
            "`{word}` is not a non-negative number of seconds"
        ))),
    }
}

impl fmt::Display for ReverseCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReverseCmd::Start => f.write_str("reverse start"),
            ReverseCmd::Stop => f.write_str("reverse stop"),
            ReverseCmd::Status => f.write_str("reverse status"),
            ReverseCmd::Goto(secs) => write!(f, "reverse goto {secs}"),
            ReverseCmd::Back(secs) => write!(f, "reverse back {secs}"),
        }
    }
}

impl<E: fmt::Debug> ReverseManager<E> {
    /// Runs one parsed command against `host`.
    pub fn execute<H: RewindHost<E>>(
        &mut self,
        host: &mut H,
        cmd: ReverseCmd,
    ) -> RewindResult<ReverseReply> {
        match cmd {
            ReverseCmd::Start => {
                self.start(host);
                Ok(ReverseReply::Started)
            }
            ReverseCmd::Stop => {
                self.stop()?;
                Ok(ReverseReply::Stopped)
            }
            ReverseCmd::Status => Ok(ReverseReply::Status(self.status(&*host))),
            ReverseCmd::Goto(secs) => {
                let ticks = self.secs_to_ticks(secs)?;
                self.go(host, ticks.into()).map(ReverseReply::Moved)
            }
            ReverseCmd::Back(secs) => {
                let ticks = self.secs_to_ticks(secs)?;
                self.go_back(host, ticks).map(ReverseReply::Moved)
            }
        }
    }

    fn secs_to_ticks(&self, secs: f64) -> RewindResult<u64> {
        self.config()
            .ticks_from_secs(secs)
            .ok_or_else(|| RewindError::invalid_command(format!("bad duration {secs}")))
    }
}
