//! Record stream interfaces.
//!
//! The sort and merge engines never touch bytes themselves: they read and write records through
//! these sequential-access collaborators, which own the encoding of a concrete record type.

use std::error::Error;
use std::path::Path;

/// Sequential record source bound to a storage location.
pub trait RecordReader<T> {
    type Error: Error;

    /// Opens the underlying resource for reading.
    fn open(&mut self) -> Result<(), Self::Error>;

    /// Reads the next record. Returns `Ok(None)` at end of stream, and keeps returning it on
    /// subsequent calls.
    fn read_next(&mut self) -> Result<Option<T>, Self::Error>;

    /// Releases the underlying resource. Closing a closed reader is a no-op.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// Sequential record sink bound to a storage location.
pub trait RecordWriter<T> {
    type Error: Error;

    /// Opens the underlying resource for writing, creating or truncating it.
    fn open(&mut self) -> Result<(), Self::Error>;

    /// Writes records in the given order.
    fn write_batch(&mut self, records: &[T]) -> Result<(), Self::Error>;

    /// Flushes and releases the underlying resource. Closing a closed writer is a no-op.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// Creates readers and writers bound to a given location for one record type.
pub trait IoFactory<T> {
    type Error: Error;
    type Reader: RecordReader<T, Error = Self::Error>;
    type Writer: RecordWriter<T, Error = Self::Error>;

    /// Returns an unopened reader over `path`.
    fn reader(&self, path: &Path) -> Self::Reader;

    /// Returns an unopened writer over `path`.
    fn writer(&self, path: &Path) -> Self::Writer;
}
