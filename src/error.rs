use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PrimerError {
    #[error("config invalid: {0}")]
    Config(String),
    #[error("command invocation failed: {0}")]
    CommandInvocation(String),
    #[error("monitor output unparsable: {0}")]
    Parse(String),
    #[error("scheduling anomaly: {0}")]
    Scheduling(String),
}

impl PrimerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_INVALID",
            Self::CommandInvocation(_) => "COMMAND_FAILED",
            Self::Parse(_) => "PARSE_FAILED",
            Self::Scheduling(_) => "SCHEDULING",
        }
    }
}
