//! Error taxonomy of the dispatch pipeline.
//!
//! Routing-level conditions (no route, verb mismatch, missing file) are not
//! errors: they resolve into ordinary 404/405 responses. What remains here is
//! either a startup failure ([`CompileError`]), a malformed transport input
//! ([`RequestError`]), a misuse of the response state machine
//! ([`ResponseError`]) or a handler fault surfacing to the host
//! ([`DispatchError`]).

use crate::query;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Boxed error returned by handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Malformed route pattern, raised at mount time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("route pattern is empty")]
    EmptyPattern,

    #[error("route pattern `{0}` must start with `/`")]
    MissingLeadingSlash(String),

    #[error("route pattern `{0}` contains an empty segment")]
    EmptySegment(String),

    #[error("wildcard `*` must be the last segment of `{0}`")]
    WildcardNotLast(String),

    #[error("parameter without a name in `{0}`")]
    EmptyParamName(String),

    #[error("parameter `{name}` is declared twice in `{pattern}`")]
    DuplicateParam { pattern: String, name: String },

    #[error("route `{0}` accepts no HTTP verb")]
    NoVerbs(String),
}

/// Transport input that cannot become a [`Request`](crate::Request).
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("unsupported HTTP method `{0}`")]
    UnsupportedMethod(String),

    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid query string: {0}")]
    Query(#[from] query::Error),

    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of the body renderers.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("template renderer `{0}` cannot render structured data")]
    TemplateUnsupported(String),

    #[error("failed to stream `{path}`: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Misuse of the response state machine.
#[derive(Debug, Error)]
pub enum ResponseError {
    /// The response is already finalized; the mutation was rejected and the
    /// emitted output is unchanged.
    #[error("response is already sent")]
    Locked,

    #[error("cookie `{0}` is marked signed but no cookie signer is configured")]
    SignerMissing(String),

    /// A header or cookie carried CR, LF or NUL. Nothing was queued.
    #[error("header `{0}` contains a line break or NUL byte")]
    InvalidHeader(String),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Failure of one dispatch cycle, surfaced to the host.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler returned an error. Whatever the response accumulated before
    /// the fault is undefined; the host answers with a 5xx of its own.
    #[error("handler mounted at `{pattern}` failed: {source}")]
    Handler {
        pattern: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Request(#[from] RequestError),

    /// Finalizing the default response failed.
    #[error(transparent)]
    Response(#[from] ResponseError),
}

/// Failed lookup in a request's [`Extensions`](crate::request::Extensions).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("no extension registered under `{0}`")]
    Missing(String),

    #[error("extension `{0}` holds a value of another type")]
    TypeMismatch(String),
}

/// Incomplete [`ServerBuilder`](crate::ServerBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("the `listener` method must be called before `build`")]
    MissingListener,

    #[error("the `app` method must be called before `build`")]
    MissingApp,
}

/// Failure loading [`Settings`](crate::Settings).
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        #[rustfmt::skip]
        let cases: [(Box<dyn std::error::Error>, &str); 4] = [
            (Box::new(CompileError::WildcardNotLast("/a/*/b".into())),
                "wildcard `*` must be the last segment of `/a/*/b`"),
            (Box::new(ResponseError::Locked),
                "response is already sent"),
            (Box::new(RequestError::UnsupportedMethod("PATCH".into())),
                "unsupported HTTP method `PATCH`"),
            (Box::new(ExtensionError::TypeMismatch("user".into())),
                "extension `user` holds a value of another type"),
        ];

        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn handler_fault_keeps_source() {
        let err = DispatchError::Handler {
            pattern: "/users/:id".into(),
            source: "database down".into(),
        };

        assert_eq!(
            err.to_string(),
            "handler mounted at `/users/:id` failed: database down"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
