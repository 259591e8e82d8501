use std::fmt;
use std::fmt::{Display, Formatter};

/// Failure to produce a file's contents at the reader seam. Carries only the
/// rendered message; callers log or surface it, never match on it.
#[derive(Debug)]
pub struct Error(String);

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error(message)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Error {}
