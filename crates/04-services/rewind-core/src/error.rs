use crate::host::HostError;
use crate::time::EmuTime;
use thiserror::Error;

pub type RewindResult<T> = Result<T, RewindError>;

/// User-facing rewind failures.
///
/// Caller bugs (codec size mismatches, a region changing size, time running
/// backwards in the event log) are assertions, not variants here.
#[derive(Debug, Error)]
pub enum RewindError {
    #[error("reverse is not enabled")]
    NotEnabled,

    #[error("reverse is already collecting")]
    AlreadyCollecting,

    #[error("no history available")]
    NoHistory,

    #[error("cannot accept live input while replaying")]
    ReplayInProgress,

    #[error("invalid reverse command: {0}")]
    InvalidCommand(String),

    #[error("host rejected input: {0}")]
    Host(#[from] HostError),

    #[error("replay aborted at {at}{}: {source}", recovered_suffix(.recovered_at))]
    ReplayAborted {
        at: EmuTime,
        recovered_at: Option<EmuTime>,
        #[source]
        source: HostError,
    },
}

impl RewindError {
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        RewindError::InvalidCommand(msg.into())
    }
}

fn recovered_suffix(recovered_at: &Option<EmuTime>) -> String {
    match recovered_at {
        Some(time) => format!(" (recovered at {time})"),
        None => " (history discarded)".to_string(),
    }
}
