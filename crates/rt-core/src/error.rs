use thiserror::Error;

/// The closed set of error kinds the runtime can surface to a caller.
///
/// Kept separate from the error message so the Unified Handler can match on
/// it (the `NotSupportedByEngine` reranking fallback and the `OverBudget`
/// replan-once rule both need this, not a string).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceNotFound,
    UnknownFormat,
    UnsupportedArchitecture,
    IncompatibleRecipe,
    OverBudget,
    NetworkFetchFailed,
    AuthRequired,
    NativeBackend,
    NoModelLoaded,
    UnknownModel,
    NotSupportedByEngine,
    GenerateError,
    Cancelled,
    Timeout,
    InvalidRequest,
}

impl ErrorKind {
    /// HTTP status this kind maps to, per spec's error-propagation table.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::SourceNotFound | ErrorKind::UnknownModel => 404,
            ErrorKind::NoModelLoaded => 503,
            ErrorKind::NotSupportedByEngine => 501,
            ErrorKind::InvalidRequest => 400,
            _ => 500,
        }
    }
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: Option<String>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

macro_rules! kind_ctor {
    ($name:ident, $kind:ident) => {
        pub fn $name(message: impl Into<String>) -> RuntimeError {
            RuntimeError::new(ErrorKind::$kind, message)
        }
    };
}

kind_ctor!(source_not_found, SourceNotFound);
kind_ctor!(unknown_format, UnknownFormat);
kind_ctor!(unsupported_architecture, UnsupportedArchitecture);
kind_ctor!(incompatible_recipe, IncompatibleRecipe);
kind_ctor!(over_budget, OverBudget);
kind_ctor!(network_fetch_failed, NetworkFetchFailed);
kind_ctor!(native_backend, NativeBackend);
kind_ctor!(no_model_loaded, NoModelLoaded);
kind_ctor!(unknown_model, UnknownModel);
kind_ctor!(not_supported_by_engine, NotSupportedByEngine);
kind_ctor!(generate_error, GenerateError);
kind_ctor!(invalid_request, InvalidRequest);
kind_ctor!(auth_required, AuthRequired);
kind_ctor!(cancelled, Cancelled);
kind_ctor!(timeout, Timeout);
