//! Error types.

use crate::serializer::FrameStack;
use std::fmt::{self, Display, Formatter};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    frames: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorKind {
    /// Raised at schema-build time: duplicate read/write assignment, illegal
    /// `fallback` on a final type, non-fallback reader on an abstract type,
    /// redefining a built-in, or a static ancestor with a writer-bearing
    /// subtype.
    MalformedProtocol,
    /// Raised at (de)serialize time: no reader/writer resolvable for a
    /// runtime value, or the value's type cannot be named.
    MissingOperation,
    /// Raised at deserialize time: the tag read does not match the typed
    /// reader invoked.
    TypeMismatch,
    /// Raised at deserialize time: `END_OBJECT` missing, `superCount` not
    /// fully consumed, or the stream ended mid-value.
    Framing,
    /// Surfaced from the underlying byte sink/source, unwrapped.
    Io,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>, frames: Option<&FrameStack>) -> Self {
        Error {
            kind,
            message: message.into(),
            frames: frames.map(|f| f.describe()),
            source: None,
        }
    }

    pub(crate) fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, e.to_string(), None).with_source(e)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::MalformedProtocol => "malformed protocol",
            ErrorKind::MissingOperation => "missing operation",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::Framing => "framing error",
            ErrorKind::Io => "IO error",
        })
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(ref frames) = self.frames {
            write!(f, "\nframes:\n{}", frames)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

macro_rules! error {
    ($kind:ident, $frames:expr, $($arg:tt)*) => {
        $crate::error::Error::new(
            $crate::error::ErrorKind::$kind,
            format!($($arg)*),
            $frames,
        )
    };
}

macro_rules! bail {
    ($($arg:tt)*) => { return Err(error!($($arg)*)) };
}

macro_rules! ensure {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond { bail!($($arg)*); }
    };
}

pub(crate) use bail;
pub(crate) use ensure;
pub(crate) use error;
