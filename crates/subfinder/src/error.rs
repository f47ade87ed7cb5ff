use derive_more::From;
use serde::Serialize;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    CliUsage(String),
    InvalidTarget(String),
    UnknownSource(String),
    Config(String),
    Cancelled,

    #[from]
    SystemTime(std::time::SystemTimeError),

    #[from]
    File(std::io::Error),

    #[from]
    Fmt(std::fmt::Error),

    #[from]
    Json(serde_json::Error),

    #[from]
    TimeFormat(time::error::Format),

    #[from]
    Reqwest(reqwest::Error),
}

// region:    --- Error Boilerplate

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate

// region:    --- Source errors

/// Failure of a single source. Captured per source, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum SourceError {
    /// Transport failure (DNS, TLS, connection reset...)
    Network(String),
    /// Non-2xx status code
    HttpStatus(u16),
    /// Payload could not be decoded
    Decode(String),
    /// Per-source deadline exceeded, in milliseconds
    Timeout(u64),
    /// Required configuration field is absent
    ConfigMissing(String),
    Panicked(String),
}

impl core::fmt::Display for SourceError {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Network(reason) => write!(fmt, "network error: {reason}"),
            Self::HttpStatus(status) => write!(fmt, "unexpected HTTP status {status}"),
            Self::Decode(reason) => write!(fmt, "malformed payload: {reason}"),
            Self::Timeout(ms) => write!(fmt, "timed out after {ms}ms"),
            Self::ConfigMissing(field) => write!(fmt, "missing configuration: {field}"),
            Self::Panicked(reason) => write!(fmt, "source panicked: {reason}"),
        }
    }
}

impl std::error::Error for SourceError {}

// endregion: --- Source errors
