use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub struct Error {
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<CommandError> for Error {
    fn from(err: CommandError) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single shell command run.
///
/// These never travel past the poller that produced them: they are cached
/// as the poller's last result and shown in place of the entity label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    SpawnFailed(String),
    CommandTimedOut(Duration),
    ProcessExitedNonZero { code: Option<i32>, output: String },
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::SpawnFailed(reason) => write!(f, "spawn failed: {reason}"),
            CommandError::CommandTimedOut(after) => {
                write!(f, "command timed out after {}ms", after.as_millis())
            }
            CommandError::ProcessExitedNonZero { code: Some(code), .. } => {
                write!(f, "exit status {code}")
            }
            CommandError::ProcessExitedNonZero { code: None, .. } => {
                write!(f, "terminated by signal")
            }
        }
    }
}

impl std::error::Error for CommandError {}
