//! Closeable request resources.

use std::fmt::Display;

/// A resource released by a single fallible `close`.
///
/// Registered with [`RequestStore::add_closer`](crate::RequestStore::add_closer);
/// close errors are logged and dropped.
pub trait Close: Send + 'static {
    type Error: Display;

    fn close(self) -> Result<(), Self::Error>;
}

#[cfg(feature = "tempfile")]
impl Close for tempfile::NamedTempFile {
    type Error = std::io::Error;

    fn close(self) -> Result<(), Self::Error> {
        tempfile::NamedTempFile::close(self)
    }
}

#[cfg(feature = "tempfile")]
impl Close for tempfile::TempDir {
    type Error = std::io::Error;

    fn close(self) -> Result<(), Self::Error> {
        tempfile::TempDir::close(self)
    }
}
