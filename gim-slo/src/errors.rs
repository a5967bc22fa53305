use std::{error::Error as StdError, fmt};

use backtrace::Backtrace;
use http::StatusCode;
use thiserror::Error;

pub trait ErrorCode: StdError + 'static {
    fn code(&self) -> (StatusCode, &'static str);
}

#[derive(Error, Debug)]
pub enum Code {
    #[error(transparent)]
    Any(#[from] anyhow::Error),
    #[error("Not found. {0}")]
    NotFound(String),
    #[error("Forbidden. {0}")]
    Forbidden(String),
    #[error("Please recheck the request.see: {0}")]
    Validates(#[source] validator::ValidationErrors),
    #[error("Please recheck the request.see: {0}")]
    BadRequest(String),
    #[error("Conflict. {0}")]
    Conflict(String),
    #[error("Version conflict. {0}")]
    VersionConflict(String),
    #[error(
        "Committed as {audit_id}, but {undelivered} of {attempted} events were not delivered"
    )]
    PublishFailed {
        audit_id: String,
        undelivered: usize,
        attempted: usize,
    },
}

impl ErrorCode for Code {
    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Any(_) => (StatusCode::INTERNAL_SERVER_ERROR, "1010001"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "1010002"),
            Self::Validates(_) => (StatusCode::UNPROCESSABLE_ENTITY, "1010004"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "1010005"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "1010006"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "1010007"),
            Self::VersionConflict(_) => (StatusCode::CONFLICT, "1010008"),
            Self::PublishFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "1010009")
            }
        }
    }
}

pub struct WithBacktrace {
    source: Code,
    backtrace: Backtrace,
}

impl WithBacktrace {
    pub fn kind(&self) -> &Code {
        &self.source
    }

    pub fn status(&self) -> (StatusCode, &'static str) {
        self.source.code()
    }
}

impl fmt::Debug for WithBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithBacktrace")
            .field("source", &self.source)
            .field("backtrace", &self.backtrace)
            .finish()
    }
}

impl fmt::Display for WithBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl StdError for WithBacktrace {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

impl From<Code> for WithBacktrace {
    fn from(source: Code) -> Self {
        Self {
            source,
            backtrace: Backtrace::new(),
        }
    }
}

impl From<WithBacktrace> for Code {
    fn from(value: WithBacktrace) -> Self {
        value.source
    }
}

/// Errors compare by kind only.
impl PartialEq for WithBacktrace {
    fn eq(&self, other: &Self) -> bool {
        self.status().1 == other.status().1
    }
}

#[inline]
pub fn any<E: StdError>(err: E) -> WithBacktrace {
    Code::Any(anyhow::anyhow!("{}", err.to_string())).into()
}

#[inline]
pub fn anyhow(err: anyhow::Error) -> WithBacktrace {
    Code::Any(err).into()
}

#[inline]
pub fn not_found<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::NotFound(err.to_string()).into()
}

#[inline]
pub fn forbidden<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::Forbidden(err.to_string()).into()
}

#[inline]
pub fn bad_request<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::BadRequest(err.to_string()).into()
}

/// A write that would break a structural rule: duplicate pair, taken slug
/// or hierarchy cycle.
#[inline]
pub fn conflict<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::Conflict(err.to_string()).into()
}

/// The stored resource version moved past the one the caller read.
#[inline]
pub fn version_conflict<S: ToString + ?Sized>(err: &S) -> WithBacktrace {
    Code::VersionConflict(err.to_string()).into()
}

/// The change recorded under `audit_id` committed but `undelivered` of the
/// `attempted` events were lost.
#[inline]
pub fn publish_failed(
    audit_id: &str,
    undelivered: usize,
    attempted: usize,
) -> WithBacktrace {
    Code::PublishFailed {
        audit_id: audit_id.to_owned(),
        undelivered,
        attempted,
    }
    .into()
}
