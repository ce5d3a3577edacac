//! RMP (Rust MessagePack) record streams.
//! Records are stored one MessagePack value after another. For more information see https://msgpack.org/.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::stream::{IoFactory, RecordReader, RecordWriter};

/// MessagePack stream error.
#[derive(Debug)]
pub enum RmpStreamError {
    /// Common I/O error.
    IO(io::Error),
    /// Record serialization error.
    SerializationError(rmp_serde::encode::Error),
    /// Record deserialization error.
    DeserializationError(rmp_serde::decode::Error),
    /// Stream used before being opened.
    NotOpen(PathBuf),
}

impl Error for RmpStreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            RmpStreamError::IO(err) => Some(err),
            RmpStreamError::SerializationError(err) => Some(err),
            RmpStreamError::DeserializationError(err) => Some(err),
            RmpStreamError::NotOpen(_) => None,
        }
    }
}

impl Display for RmpStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            RmpStreamError::IO(err) => write!(f, "I/O operation failed: {}", err),
            RmpStreamError::SerializationError(err) => write!(f, "data serialization error: {}", err),
            RmpStreamError::DeserializationError(err) => write!(f, "data deserialization error: {}", err),
            RmpStreamError::NotOpen(path) => write!(f, "stream '{}' is not open", path.display()),
        }
    }
}

impl From<io::Error> for RmpStreamError {
    fn from(err: io::Error) -> Self {
        RmpStreamError::IO(err)
    }
}

/// Creates MessagePack readers and writers.
pub struct RmpIoFactory<T> {
    rw_buf_size: Option<usize>,

    item_type: PhantomData<T>,
}

impl<T> RmpIoFactory<T> {
    pub fn new() -> Self {
        RmpIoFactory {
            rw_buf_size: None,
            item_type: PhantomData,
        }
    }

    /// Sets file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> Self {
        self.rw_buf_size = Some(buf_size);
        return self;
    }
}

impl<T> Default for RmpIoFactory<T> {
    fn default() -> Self {
        RmpIoFactory::new()
    }
}

impl<T> Clone for RmpIoFactory<T> {
    fn clone(&self) -> Self {
        RmpIoFactory {
            rw_buf_size: self.rw_buf_size,
            item_type: PhantomData,
        }
    }
}

impl<T> IoFactory<T> for RmpIoFactory<T>
where
    T: serde::ser::Serialize + serde::de::DeserializeOwned,
{
    type Error = RmpStreamError;
    type Reader = RmpReader<T>;
    type Writer = RmpWriter<T>;

    fn reader(&self, path: &Path) -> Self::Reader {
        RmpReader {
            path: path.to_path_buf(),
            rw_buf_size: self.rw_buf_size,
            reader: None,
            item_type: PhantomData,
        }
    }

    fn writer(&self, path: &Path) -> Self::Writer {
        RmpWriter {
            path: path.to_path_buf(),
            rw_buf_size: self.rw_buf_size,
            writer: None,
            item_type: PhantomData,
        }
    }
}

/// MessagePack record reader.
pub struct RmpReader<T> {
    path: PathBuf,
    rw_buf_size: Option<usize>,
    reader: Option<io::Take<io::BufReader<fs::File>>>,

    item_type: PhantomData<T>,
}

impl<T> RecordReader<T> for RmpReader<T>
where
    T: serde::de::DeserializeOwned,
{
    type Error = RmpStreamError;

    fn open(&mut self) -> Result<(), Self::Error> {
        let file = fs::File::open(&self.path)?;
        let file_len = file.metadata()?.len();

        let reader = match self.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };
        self.reader = Some(reader.take(file_len));

        return Ok(());
    }

    fn read_next(&mut self) -> Result<Option<T>, Self::Error> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| RmpStreamError::NotOpen(self.path.clone()))?;

        if reader.limit() == 0 {
            Ok(None)
        } else {
            rmp_serde::decode::from_read(reader)
                .map(Some)
                .map_err(RmpStreamError::DeserializationError)
        }
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.reader = None;
        return Ok(());
    }
}

/// MessagePack record writer.
pub struct RmpWriter<T> {
    path: PathBuf,
    rw_buf_size: Option<usize>,
    writer: Option<io::BufWriter<fs::File>>,

    item_type: PhantomData<T>,
}

impl<T> RecordWriter<T> for RmpWriter<T>
where
    T: serde::ser::Serialize,
{
    type Error = RmpStreamError;

    fn open(&mut self) -> Result<(), Self::Error> {
        let file = fs::File::create(&self.path)?;
        self.writer = Some(match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        });

        return Ok(());
    }

    fn write_batch(&mut self, records: &[T]) -> Result<(), Self::Error> {
        let mut writer = self
            .writer
            .as_mut()
            .ok_or_else(|| RmpStreamError::NotOpen(self.path.clone()))?;

        for record in records {
            rmp_serde::encode::write(&mut writer, record).map_err(RmpStreamError::SerializationError)?;
        }

        return Ok(());
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{RmpIoFactory, RmpStreamError};
    use crate::stream::{IoFactory, RecordReader, RecordWriter};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    #[case(None)]
    #[case(Some(16))]
    fn test_rmp_stream(tmp_dir: tempfile::TempDir, #[case] buf_size: Option<usize>) {
        let path = tmp_dir.path().join("records");
        let mut factory: RmpIoFactory<(i32, String)> = RmpIoFactory::new();
        if let Some(buf_size) = buf_size {
            factory = factory.with_rw_buf_size(buf_size);
        }

        let saved: Vec<(i32, String)> = (0..100).map(|i| (i, format!("record-{}", i))).collect();

        let mut writer = factory.writer(&path);
        writer.open().unwrap();
        writer.write_batch(&saved[..40]).unwrap();
        writer.write_batch(&saved[40..]).unwrap();
        writer.close().unwrap();

        let mut reader = factory.reader(&path);
        reader.open().unwrap();
        let mut restored = Vec::new();
        while let Some(record) = reader.read_next().unwrap() {
            restored.push(record);
        }
        assert_eq!(restored, saved);
        assert!(reader.read_next().unwrap().is_none());
        reader.close().unwrap();
        reader.close().unwrap();
    }

    #[rstest]
    fn test_rmp_empty_stream(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("empty");
        let factory: RmpIoFactory<u32> = RmpIoFactory::new();

        let mut writer = factory.writer(&path);
        writer.open().unwrap();
        writer.close().unwrap();

        let mut reader = factory.reader(&path);
        reader.open().unwrap();
        assert!(reader.read_next().unwrap().is_none());
    }

    #[rstest]
    fn test_rmp_not_open(tmp_dir: tempfile::TempDir) {
        let factory: RmpIoFactory<u32> = RmpIoFactory::new();

        let mut reader = factory.reader(&tmp_dir.path().join("missing"));
        assert!(matches!(reader.read_next(), Err(RmpStreamError::NotOpen(_))));
        assert!(matches!(reader.open(), Err(RmpStreamError::IO(_))));

        let mut writer = factory.writer(&tmp_dir.path().join("unopened"));
        assert!(matches!(writer.write_batch(&[1]), Err(RmpStreamError::NotOpen(_))));
    }
}
