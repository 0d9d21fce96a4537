/*!
    Error types for the rtspull media pipeline.
*/

use std::fmt;

/**
    Error type shared across the pipeline crates.

    Fatal kinds terminate the session; would-block and decoder-EOF
    conditions are represented by [`Error::Eof`] and absorbed inside the
    stage that hits them.
*/
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),
    /// Unrecoverable network failure (open failure, read-error storm, probe failure)
    Network { message: String },
    /// Codec error (decoder init/open failure, decode failure)
    Codec { message: String },
    /// Audio device error
    Device { message: String },
    /// Invalid data (malformed input, missing codec parameters)
    InvalidData { message: String },
    /// Unsupported format (valid but not handled)
    UnsupportedFormat { message: String },
    /// End of stream (control flow, not a failure)
    Eof,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Network { message } => write!(f, "network error: {message}"),
            Self::Codec { message } => write!(f, "codec error: {message}"),
            Self::Device { message } => write!(f, "device error: {message}"),
            Self::InvalidData { message } => write!(f, "invalid data: {message}"),
            Self::UnsupportedFormat { message } => write!(f, "unsupported format: {message}"),
            Self::Eof => write!(f, "end of stream"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl Error {
    /**
        Create a network error with the given message.
    */
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /**
        Create a codec error with the given message.
    */
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /**
        Create a device error with the given message.
    */
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    /**
        Create an invalid data error with the given message.
    */
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /**
        Create an unsupported format error with the given message.
    */
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    /**
        Returns true if this is an EOF error.
    */
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

/**
    Result type alias for the pipeline crates.
*/
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn error_display() {
        let e = Error::network("too many consecutive read errors");
        assert_eq!(
            format!("{e}"),
            "network error: too many consecutive read errors"
        );

        let e = Error::codec("decode failed");
        assert_eq!(format!("{e}"), "codec error: decode failed");

        let e = Error::device("format not supported");
        assert_eq!(format!("{e}"), "device error: format not supported");

        let e = Error::Eof;
        assert_eq!(format!("{e}"), "end of stream");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "connection refused");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(format!("{e}").contains("connection refused"));
    }

    #[test]
    fn error_is_eof() {
        assert!(Error::Eof.is_eof());
        assert!(!Error::codec("test").is_eof());
    }

    #[test]
    fn error_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let e = Error::Io(io_err);
        assert!(StdError::source(&e).is_some());

        let e = Error::Eof;
        assert!(StdError::source(&e).is_none());
    }
}
