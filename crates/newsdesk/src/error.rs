use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeightsError {
    #[error("權重總和必須為 100%，目前為 {0}%")]
    InvalidSum(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("{command}: missing argument")]
    MissingArgument { command: &'static str },

    #[error("{command}: invalid id {value:?}")]
    InvalidId { command: &'static str, value: String },

    #[error("invalid filter condition: {0}")]
    InvalidFilter(String),

    #[error("invalid category assignment: {0}")]
    InvalidAssignment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("operation not allowed while the workflow is {0}")]
    WrongStage(&'static str),

    #[error("no candidate with id {0}")]
    UnknownCandidate(usize),

    #[error("no news items selected")]
    NothingSelected,

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Weights(#[from] WeightsError),
}
