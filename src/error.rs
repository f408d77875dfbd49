use thiserror::Error;

use crate::executor::BatchResult;

#[derive(Error, Debug)]
pub enum Error {
    #[error("data base error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[error("binding error: {message}")]
    Binding {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    #[error("builder error: {0}")]
    Builder(String),
    #[error("incomplete element: {0}")]
    IncompleteElement(String),
    #[error("executor error: {message}")]
    Executor {
        message: String,
        #[source]
        source: Option<Box<Error>>,
    },
    /// A flushed batch failed; `successful` holds the batches already sent,
    /// in queue order.
    #[error("Error executing batch for {statement_id}: {source}")]
    Batch {
        statement_id: String,
        successful: Vec<BatchResult>,
        #[source]
        source: Box<Error>,
    },
    #[error("Expected one result (or null) to be returned by select_one(), but found: {0}")]
    TooManyResults(usize),
    #[error("{0}")]
    Message(String),
    #[error("MultipleErrors: {0:?}")]
    MultipleErrors(Vec<Error>),
}

impl Error {
    pub fn binding(message: impl Into<String>) -> Self {
        Error::Binding {
            message: message.into(),
            source: None,
        }
    }

    pub fn binding_caused_by(message: impl Into<String>, cause: Error) -> Self {
        Error::Binding {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn executor(message: impl Into<String>) -> Self {
        Error::Executor {
            message: message.into(),
            source: None,
        }
    }

    pub fn executor_caused_by(message: impl Into<String>, cause: Error) -> Self {
        Error::Executor {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Batches that completed before a flush failed; empty for other errors.
    pub fn successful_batches(&self) -> &[BatchResult] {
        match self {
            Error::Batch { successful, .. } => successful,
            _ => &[],
        }
    }

    /// True for failures that came out of the connection boundary unchanged.
    pub fn is_database_error(&self) -> bool {
        matches!(self, Error::SqlxError(_))
    }

    /// True when the failure only means "not resolvable yet".
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::IncompleteElement(_))
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Message(e)
    }
}

impl From<&String> for Error {
    fn from(e: &String) -> Self {
        Error::Message(e.clone())
    }
}
impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Message(e.to_string())
    }
}

impl From<Vec<Error>> for Error {
    fn from(e: Vec<Error>) -> Self {
        Error::MultipleErrors(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn wrapped_errors_keep_their_cause() {
        let cause = Error::SqlxError(sqlx::Error::RowNotFound);
        let err = Error::binding_caused_by("Error invoking mapper method", cause);
        let source = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("data base error"));
        assert!(!err.is_database_error());
    }

    #[test]
    fn classifies_database_and_incomplete_errors() {
        assert!(Error::SqlxError(sqlx::Error::PoolTimedOut).is_database_error());
        assert!(Error::IncompleteElement("ns.missing".into()).is_incomplete());
        assert!(!Error::Builder("dup".into()).is_incomplete());
    }

    #[test]
    fn only_batch_errors_carry_successful_batches() {
        let err = Error::Batch {
            statement_id: "users.touch".into(),
            successful: Vec::new(),
            source: Box::new(Error::SqlxError(sqlx::Error::PoolClosed)),
        };
        assert!(err.to_string().starts_with("Error executing batch for users.touch: "));
        assert!(!err.is_database_error());
        assert!(Error::executor("boom").successful_batches().is_empty());
    }
}
