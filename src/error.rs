use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported optimizer `{0}`")]
    UnknownOptimizer(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("backward called before a training forward pass")]
    MissingForward,

    #[error("{layer} layer expects {expected} signal")]
    UnexpectedSignal {
        layer: &'static str,
        expected: &'static str,
    },

    #[error("numeric error: {0}")]
    Numeric(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Return `ShapeMismatch` unless `actual` equals `expected`.
pub(crate) fn ensure_shape(
    context: &'static str,
    expected: &[usize],
    actual: &[usize],
) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}
