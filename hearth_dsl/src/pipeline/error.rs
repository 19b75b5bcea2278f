use crate::evaluation::RuntimeError;
use crate::logging::{codes, Code};
use crate::syntax::SyntaxError;
use crate::utils::Position;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure of any stage, keeping the stages apart
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Lexical and syntax failures; `is_lexical` tells them apart
    #[error("{0}")]
    Syntax(#[from] SyntaxError),

    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    #[error("could not start scanner thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl PipelineError {
    pub fn is_lexical(&self) -> bool {
        matches!(self, Self::Syntax(error) if error.is_lexical())
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax(_))
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }

    pub fn error_code(&self) -> Code {
        match self {
            Self::Syntax(error) => error.error_code(),
            Self::Runtime(error) => error.error_code(),
            Self::Spawn(_) => codes::system::INITIALIZATION_FAILURE,
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self {
            Self::Syntax(error) => Some(error.position()),
            Self::Runtime(error) => Some(error.position()),
            Self::Spawn(_) => None,
        }
    }
}
