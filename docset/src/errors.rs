use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

/// Error kinds for docset operations.
///
/// Each kind describes a specific category of contract violation. All errors
/// are raised synchronously at the call that violates the contract; nothing
/// is retried internally.
///
/// # Examples
///
/// ```rust,ignore
/// use docset::errors::{DocsetError, ErrorKind, DocsetResult};
///
/// fn example() -> DocsetResult<()> {
///     Err(DocsetError::new("Index not found", ErrorKind::IndexNotFound))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// Index does not exist
    IndexNotFound,
    /// An index was re-declared with an incompatible uniqueness constraint
    IndexTypeMismatch,
    /// An operation requiring an identity index ran without one designated
    NoIdentityIndex,
    /// Mark/unmark/purge called outside a valid mark cycle
    InvalidMark,
    /// `end()` called without a matching `begin()`
    BracketMismatch,
    /// Unknown or unsupported query/update operator
    UnsupportedOperator,
    /// Malformed sort specification
    InvalidSortSpec,
    /// Two values of mutually incomparable types were compared
    IncomparableTypes,
    /// Invalid data type for operation
    InvalidDataType,
    /// Invalid field name or key specification
    InvalidFieldName,
    /// One or more event listeners failed during dispatch
    EventError,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::IndexNotFound => write!(f, "Index not found"),
            ErrorKind::IndexTypeMismatch => write!(f, "Index type mismatch"),
            ErrorKind::NoIdentityIndex => write!(f, "No identity index"),
            ErrorKind::InvalidMark => write!(f, "Invalid mark"),
            ErrorKind::BracketMismatch => write!(f, "Bracket mismatch"),
            ErrorKind::UnsupportedOperator => write!(f, "Unsupported operator"),
            ErrorKind::InvalidSortSpec => write!(f, "Invalid sort specification"),
            ErrorKind::IncomparableTypes => write!(f, "Incomparable types"),
            ErrorKind::InvalidDataType => write!(f, "Invalid data type"),
            ErrorKind::InvalidFieldName => write!(f, "Invalid field name"),
            ErrorKind::EventError => write!(f, "Event error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom docset error type.
///
/// `DocsetError` encapsulates the error message, kind, an optional cause, and
/// a captured backtrace. Listener dispatch aggregates every failing listener
/// into a single error whose `related()` list carries all underlying errors.
///
/// # Type alias
///
/// The `DocsetResult<T>` type alias is equivalent to `Result<T, DocsetError>`
/// and is used throughout the codebase for operations that can fail.
#[derive(Clone)]
pub struct DocsetError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DocsetError>>,
    related: Vec<DocsetError>,
    backtrace: Backtrace,
}

impl DocsetError {
    /// Creates a new `DocsetError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DocsetError {
            message: message.to_string(),
            error_kind,
            cause: None,
            related: Vec::new(),
            backtrace: Backtrace::new(),
        }
    }

    /// Creates a new `DocsetError` with a cause error.
    ///
    /// This creates an error chain where the cause error is preserved for
    /// debugging.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: DocsetError) -> Self {
        DocsetError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            related: Vec::new(),
            backtrace: Backtrace::new(),
        }
    }

    /// Creates an aggregate error carrying every underlying error.
    ///
    /// Used by event dispatch: all listeners run to completion and their
    /// failures are surfaced as one error after the pass.
    pub fn aggregate(message: &str, error_kind: ErrorKind, errors: Vec<DocsetError>) -> Self {
        let mut message = message.to_string();
        for err in &errors {
            message.push_str("; ");
            message.push_str(err.message());
        }
        DocsetError {
            message,
            error_kind,
            cause: errors.first().map(|e| Box::new(e.clone())),
            related: errors,
            backtrace: Backtrace::new(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DocsetError> {
        self.cause.as_deref()
    }

    /// All underlying errors of an aggregate error; empty otherwise.
    pub fn related(&self) -> &[DocsetError] {
        &self.related
    }
}

impl Display for DocsetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DocsetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace),
        }
    }
}

impl Error for DocsetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for docset operations.
pub type DocsetResult<T> = Result<T, DocsetError>;

impl From<String> for DocsetError {
    fn from(msg: String) -> Self {
        DocsetError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for DocsetError {
    fn from(msg: &str) -> Self {
        DocsetError::new(msg, ErrorKind::InternalError)
    }
}
