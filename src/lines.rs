//! Line-oriented record streams.
//!
//! Each record occupies one line of a text file. A [`LineCodec`] maps lines to records and back,
//! so any delimiter-separated format can be plugged in without the engine knowing about it.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::stream::{IoFactory, RecordReader, RecordWriter};

/// Boxed line decoding error.
pub type DecodeError = Box<dyn Error + Send + Sync>;

/// Converts between text lines and records.
pub trait LineCodec<T> {
    /// Decodes a line (without its line terminator) into a record.
    /// `line_number` starts at 1.
    fn decode(&self, line: &str, line_number: usize) -> Result<T, DecodeError>;

    /// Encodes a record into a line without a line terminator.
    fn encode(&self, record: &T) -> String;
}

/// Codec keeping every line as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainLines;

impl LineCodec<String> for PlainLines {
    fn decode(&self, line: &str, _line_number: usize) -> Result<String, DecodeError> {
        Ok(line.to_string())
    }

    fn encode(&self, record: &String) -> String {
        record.clone()
    }
}

/// Compares delimiter-separated lines by one of their fields.
///
/// A line missing the field sorts before every line that has it.
#[derive(Debug, Clone)]
pub struct DelimitedKey {
    delimiter: char,
    field: usize,
}

impl DelimitedKey {
    /// Creates a key over the zero-based `field` of lines split by `delimiter`.
    pub fn new(delimiter: char, field: usize) -> Self {
        DelimitedKey { delimiter, field }
    }

    pub fn key<'a>(&self, line: &'a str) -> Option<&'a str> {
        line.split(self.delimiter).nth(self.field)
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }
}

/// Line stream error.
#[derive(Debug)]
pub enum LineStreamError {
    /// Common I/O error.
    IO(io::Error),
    /// A line could not be decoded into a record.
    Decode {
        path: PathBuf,
        line: usize,
        source: DecodeError,
    },
    /// Stream used before being opened.
    NotOpen(PathBuf),
}

impl Error for LineStreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            LineStreamError::IO(err) => Some(err),
            LineStreamError::Decode { source, .. } => Some(source.as_ref()),
            LineStreamError::NotOpen(_) => None,
        }
    }
}

impl Display for LineStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            LineStreamError::IO(err) => write!(f, "I/O operation failed: {}", err),
            LineStreamError::Decode { path, line, source } => {
                write!(f, "line {} of '{}' could not be decoded: {}", line, path.display(), source)
            }
            LineStreamError::NotOpen(path) => write!(f, "stream '{}' is not open", path.display()),
        }
    }
}

impl From<io::Error> for LineStreamError {
    fn from(err: io::Error) -> Self {
        LineStreamError::IO(err)
    }
}

/// Creates line readers and writers sharing one codec.
#[derive(Debug, Clone, Default)]
pub struct LineIoFactory<C> {
    codec: C,
    rw_buf_size: Option<usize>,
}

impl<C> LineIoFactory<C> {
    pub fn new(codec: C) -> Self {
        LineIoFactory {
            codec,
            rw_buf_size: None,
        }
    }

    /// Sets file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> Self {
        self.rw_buf_size = Some(buf_size);
        return self;
    }
}

impl<T, C> IoFactory<T> for LineIoFactory<C>
where
    C: LineCodec<T> + Clone,
{
    type Error = LineStreamError;
    type Reader = LineReader<T, C>;
    type Writer = LineWriter<T, C>;

    fn reader(&self, path: &Path) -> Self::Reader {
        LineReader {
            path: path.to_path_buf(),
            codec: self.codec.clone(),
            rw_buf_size: self.rw_buf_size,
            reader: None,
            line: String::new(),
            line_number: 0,
            item_type: PhantomData,
        }
    }

    fn writer(&self, path: &Path) -> Self::Writer {
        LineWriter {
            path: path.to_path_buf(),
            codec: self.codec.clone(),
            rw_buf_size: self.rw_buf_size,
            writer: None,
            item_type: PhantomData,
        }
    }
}

/// Line record reader.
pub struct LineReader<T, C> {
    path: PathBuf,
    codec: C,
    rw_buf_size: Option<usize>,
    reader: Option<io::BufReader<fs::File>>,
    line: String,
    line_number: usize,

    item_type: PhantomData<T>,
}

impl<T, C: LineCodec<T>> RecordReader<T> for LineReader<T, C> {
    type Error = LineStreamError;

    fn open(&mut self) -> Result<(), Self::Error> {
        let file = fs::File::open(&self.path)?;
        self.reader = Some(match self.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        });
        self.line_number = 0;

        return Ok(());
    }

    fn read_next(&mut self) -> Result<Option<T>, Self::Error> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| LineStreamError::NotOpen(self.path.clone()))?;

        self.line.clear();
        if reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        let line = self.line.strip_suffix('\n').unwrap_or(&self.line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        self.codec
            .decode(line, self.line_number)
            .map(Some)
            .map_err(|source| LineStreamError::Decode {
                path: self.path.clone(),
                line: self.line_number,
                source,
            })
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.reader = None;
        return Ok(());
    }
}

/// Line record writer.
pub struct LineWriter<T, C> {
    path: PathBuf,
    codec: C,
    rw_buf_size: Option<usize>,
    writer: Option<io::BufWriter<fs::File>>,

    item_type: PhantomData<T>,
}

impl<T, C: LineCodec<T>> RecordWriter<T> for LineWriter<T, C> {
    type Error = LineStreamError;

    fn open(&mut self) -> Result<(), Self::Error> {
        let file = fs::File::create(&self.path)?;
        self.writer = Some(match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        });

        return Ok(());
    }

    fn write_batch(&mut self, records: &[T]) -> Result<(), Self::Error> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LineStreamError::NotOpen(self.path.clone()))?;

        for record in records {
            writer.write_all(self.codec.encode(record).as_bytes())?;
            writer.write_all(b"\n")?;
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
    use std::cmp::Ordering;
    use std::fs;

    use rstest::*;

    use super::{DecodeError, DelimitedKey, LineCodec, LineIoFactory, LineReader, LineStreamError, LineWriter, PlainLines};
    use crate::stream::{IoFactory, RecordReader, RecordWriter};

    #[derive(Clone)]
    struct NumberCodec;

    impl LineCodec<u32> for NumberCodec {
        fn decode(&self, line: &str, _line_number: usize) -> Result<u32, DecodeError> {
            Ok(line.trim().parse()?)
        }

        fn encode(&self, record: &u32) -> String {
            record.to_string()
        }
    }

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn test_plain_lines(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("lines.txt");
        fs::write(&path, "b,2\r\na,1\n\nc,3").unwrap();

        let factory = LineIoFactory::new(PlainLines);
        let mut reader: LineReader<String, _> = factory.reader(&path);
        reader.open().unwrap();

        let mut lines = Vec::new();
        while let Some(line) = reader.read_next().unwrap() {
            lines.push(line);
        }
        reader.close().unwrap();
        assert_eq!(lines, vec!["b,2", "a,1", "", "c,3"]);

        let out = tmp_dir.path().join("out.txt");
        let mut writer: LineWriter<String, _> = factory.writer(&out);
        writer.open().unwrap();
        writer.write_batch(&lines).unwrap();
        writer.close().unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "b,2\na,1\n\nc,3\n");
    }

    #[rstest]
    fn test_decode_error_reports_line(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("numbers.txt");
        fs::write(&path, "1\n2\nthree\n").unwrap();

        let factory = LineIoFactory::new(NumberCodec).with_rw_buf_size(4);
        let mut reader: LineReader<u32, _> = factory.reader(&path);
        reader.open().unwrap();

        assert_eq!(reader.read_next().unwrap(), Some(1));
        assert_eq!(reader.read_next().unwrap(), Some(2));
        match reader.read_next() {
            Err(LineStreamError::Decode { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[rstest]
    #[case("1,bob", "2,alice", Ordering::Greater)]
    #[case("1,alice", "2,alice", Ordering::Equal)]
    #[case("1", "2,alice", Ordering::Less)]
    fn test_delimited_key(#[case] a: &str, #[case] b: &str, #[case] expected: Ordering) {
        let key = DelimitedKey::new(',', 1);
        assert_eq!(key.compare(a, b), expected);
    }
}
