use thiserror::Error;

/// Failures of a PDR run.
///
/// Genuine counterexamples are not errors; they are reported through
/// [`crate::pdr::Verdict::Unsafe`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PdrError {
    /// The prover failed or was queried in an inconsistent state.
    #[error("solver failure: {0}")]
    Solver(String),

    /// A precondition of a frame or transition operation was violated.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The control-flow automaton cannot be encoded.
    #[error("invalid control-flow automaton: {0}")]
    InvalidCfa(String),

    /// The run was cancelled through its shutdown notifier.
    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PdrError>;

macro_rules! ensure_arg {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::PdrError::InvalidArgument(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure_arg;
