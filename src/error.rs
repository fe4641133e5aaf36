use burn::record::RecorderError;
use thiserror::Error;

/// Errors surfaced by the training core.
///
/// Contract violations and numerical faults are fatal for a training run; the
/// caller decides whether to abort or restore from a checkpoint.
#[derive(Debug, Error)]
pub enum HrlError {
    #[error("tensor `{0}` is not registered in memory")]
    UnregisteredTensor(String),

    #[error("cannot register tensor `{0}`: memory is already sized")]
    MemoryAlreadySized(String),

    #[error("shape mismatch for `{name}`: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} is empty")]
    Empty(&'static str),

    #[error("non-finite value in {0}")]
    NumericalFault(String),

    #[error("store_transition called without a preceding stochastic act")]
    MissingAction,

    #[error("checkpoint module `{0}` cannot be loaded into the live agent")]
    UnloadableModule(String),

    #[error("checkpoint {path} has no `{name}` module")]
    MissingCheckpointModule { path: String, name: String },

    #[error("pretrained model `{name}` not found in {registry}")]
    ModelNotFound { name: String, registry: String },

    #[error("recorder error: {0}")]
    Recorder(String),

    #[error("tensor data error: {0}")]
    TensorData(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<RecorderError> for HrlError {
    fn from(err: RecorderError) -> Self {
        HrlError::Recorder(format!("{:?}", err))
    }
}

pub type Result<T> = std::result::Result<T, HrlError>;
