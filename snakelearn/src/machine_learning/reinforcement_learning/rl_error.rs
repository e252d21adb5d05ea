use serde_json::Error as SerdeError;
use std::io::Error as IOError;

#[derive(thiserror::Error, Debug)]
pub enum RLError {
    #[error("Action out of range got: {value} when max action value is {max}.")]
    ActionOutOfRange { value: u32, max: u32 },
    #[error("Observation of len {received} does not match the expected len {expected}.")]
    ObservationSize { expected: usize, received: usize },
    #[error("Tried to sample {requested} replays from an empty replay buffer.")]
    EmptyReplayBuffer { requested: usize },
    #[error("Invalid configuration: {0}.")]
    InvalidConfig(String),
    #[error("Model record error: {0}.")]
    Recorder(String),
    #[error("Couldn't serialize the model descriptor.")]
    Serialization(#[from] SerdeError),
    #[error("IO error")]
    Io(#[from] IOError),
}

pub type RLResult<T> = std::result::Result<T, RLError>;
