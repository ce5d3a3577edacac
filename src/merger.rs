//! K-way merger.

use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::buffer::LimitedBuffer;
use crate::error::{ConfigError, SortError};
use crate::logging::JobLog;
use crate::stream::{RecordReader, RecordWriter};

/// Default number of records held in memory at once.
pub const DEFAULT_MAX_LOADED_RECORDS: usize = 100_000;

/// Merge frontier slot: a source together with its next unconsumed record.
struct MergeSource<T, R> {
    reader: R,
    head: Option<T>,
    open: bool,
}

/// Linear scan merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
///
/// The frontier holds one slot per input, indexed by the input position. Every step scans the open slots
/// for the least head; when heads compare equal the input listed first wins, which keeps the output order
/// deterministic. Time complexity is *m* \* *n* where *m* is the number of items and *n* the number of inputs.
///
/// Inputs must be opened before being handed to the merger. Each input is closed as soon as it is exhausted.
pub struct LinearMerger<T, R, F>
where
    R: RecordReader<T>,
    F: Fn(&T, &T) -> Ordering,
{
    sources: Vec<MergeSource<T, R>>,
    compare: F,
    log: JobLog,
    initiated: bool,
}

impl<T, R, F> LinearMerger<T, R, F>
where
    R: RecordReader<T>,
    F: Fn(&T, &T) -> Ordering,
{
    /// Creates an instance of a linear merger using opened readers as inputs.
    /// Reader items should be sorted according to `compare` otherwise the result is undefined.
    pub fn new<I>(readers: I, compare: F, log: JobLog) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        let sources = readers
            .into_iter()
            .map(|reader| MergeSource {
                reader,
                head: None,
                open: true,
            })
            .collect();

        return LinearMerger {
            sources,
            compare,
            log,
            initiated: false,
        };
    }

    /// Number of inputs not exhausted yet.
    pub fn open_sources(&self) -> usize {
        self.sources.iter().filter(|source| source.open).count()
    }

    /// Closes every input still open. Close failures are logged.
    pub fn close_all(&mut self) {
        for idx in 0..self.sources.len() {
            self.close_source(idx);
        }
    }

    fn close_source(&mut self, idx: usize) {
        let source = &mut self.sources[idx];
        if !source.open {
            return;
        }
        source.open = false;
        source.head = None;

        if let Err(err) = source.reader.close() {
            self.log
                .warn(format_args!("failed to close merge input #{}: {}", idx, err));
        }
    }

    fn fill_head(&mut self, idx: usize) -> Result<(), R::Error> {
        match self.sources[idx].reader.read_next()? {
            Some(record) => self.sources[idx].head = Some(record),
            None => self.close_source(idx),
        }

        return Ok(());
    }

    fn prime(&mut self) -> Result<(), R::Error> {
        for idx in 0..self.sources.len() {
            self.fill_head(idx)?;
        }

        return Ok(());
    }

    fn winner(&self) -> Option<usize> {
        let mut winner: Option<(usize, &T)> = None;

        for (idx, source) in self.sources.iter().enumerate() {
            if let Some(head) = &source.head {
                match winner {
                    // an equal head doesn't replace the current winner
                    Some((_, best)) if (self.compare)(best, head) != Ordering::Greater => {}
                    _ => winner = Some((idx, head)),
                }
            }
        }

        return winner.map(|(idx, _)| idx);
    }
}

impl<T, R, F> Iterator for LinearMerger<T, R, F>
where
    R: RecordReader<T>,
    F: Fn(&T, &T) -> Ordering,
{
    type Item = Result<T, R::Error>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            if let Err(err) = self.prime() {
                return Some(Err(err));
            }
        }

        let idx = self.winner()?;
        let record = self.sources[idx].head.take()?;
        if let Err(err) = self.fill_head(idx) {
            return Some(Err(err));
        }

        return Some(Ok(record));
    }
}

fn close_reader<T, R: RecordReader<T>>(reader: &mut R, log: &JobLog) {
    if let Err(err) = reader.close() {
        log.warn(format_args!("failed to close merge input: {}", err));
    }
}

/// Merges sorted readers into `writer`.
///
/// Takes ownership of unopened readers and an unopened writer, opens them, streams the merged records to the
/// writer through an output buffer of `buffer_limit` records and closes everything. On failure every handle
/// still open is closed and the error is returned unchanged. Returns the number of merged records.
pub fn merge_streams<T, R, W, F>(
    readers: Vec<R>,
    mut writer: W,
    compare: F,
    buffer_limit: usize,
    log: &JobLog,
) -> Result<u64, SortError<R::Error, W::Error>>
where
    R: RecordReader<T>,
    W: RecordWriter<T>,
    F: Fn(&T, &T) -> Ordering,
{
    log.info(format_args!("opening {} files to merge for reading", readers.len()));
    let mut opened = Vec::with_capacity(readers.len());
    for mut reader in readers {
        if let Err(err) = reader.open() {
            for mut reader in opened {
                close_reader::<T, R>(&mut reader, log);
            }
            return Err(SortError::Input(err));
        }
        opened.push(reader);
    }

    log.info(format_args!("opening output file"));
    if let Err(err) = writer.open() {
        for mut reader in opened {
            close_reader::<T, R>(&mut reader, log);
        }
        return Err(SortError::Output(err));
    }

    log.info(format_args!("merging files . . ."));
    let mut merger = LinearMerger::new(opened, compare, log.clone());
    match drain(&mut merger, &mut writer, buffer_limit) {
        Ok(records) => {
            writer.close().map_err(SortError::Output)?;
            log.info(format_args!("merge complete, {} records written", records));
            Ok(records)
        }
        Err(err) => {
            log.error(format_args!("merge operation failed"));
            merger.close_all();
            if let Err(close_err) = writer.close() {
                log.warn(format_args!("failed to close merge output: {}", close_err));
            }
            Err(err)
        }
    }
}

fn drain<T, R, W, F>(
    merger: &mut LinearMerger<T, R, F>,
    writer: &mut W,
    buffer_limit: usize,
) -> Result<u64, SortError<R::Error, W::Error>>
where
    R: RecordReader<T>,
    W: RecordWriter<T>,
    F: Fn(&T, &T) -> Ordering,
{
    let mut buffer = LimitedBuffer::new(buffer_limit);
    let mut records = 0;

    for record in merger {
        let record = record.map_err(SortError::Input)?;
        if buffer.is_full() {
            writer.write_batch(buffer.as_slice()).map_err(SortError::Output)?;
            buffer.clear();
        }
        buffer.push(record);
        records += 1;
    }

    if !buffer.is_empty() {
        writer.write_batch(buffer.as_slice()).map_err(SortError::Output)?;
    }

    return Ok(records);
}

/// External merger builder. Provides methods for [`ExternalMerger`] initialization.
pub struct ExternalMergerBuilder<T, R, W, F> {
    /// Sorted inputs. Their order decides which record goes first on ties.
    readers: Option<Vec<R>>,
    /// Merge destination.
    writer: Option<W>,
    /// Function used to compare records.
    compare: Option<F>,
    /// Output buffer size in records.
    max_loaded_records: usize,
    /// Job logger.
    log: JobLog,

    /// Record type.
    item_type: PhantomData<T>,
}

impl<T, R, W, F> ExternalMergerBuilder<T, R, W, F>
where
    R: RecordReader<T>,
    W: RecordWriter<T>,
    F: Fn(&T, &T) -> Ordering,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalMergerBuilder::default()
    }

    /// Builds an [`ExternalMerger`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalMerger<T, R, W, F>, ConfigError> {
        let compare = self.compare.ok_or(ConfigError::MissingComparator)?;
        let readers = self.readers.ok_or(ConfigError::MissingReaders)?;
        let writer = self.writer.ok_or(ConfigError::MissingWriter)?;
        if self.max_loaded_records < 1 {
            return Err(ConfigError::InvalidMaxLoadedRecords(self.max_loaded_records));
        }

        return Ok(ExternalMerger {
            readers,
            writer,
            compare,
            max_loaded_records: self.max_loaded_records,
            log: self.log,
            item_type: PhantomData,
        });
    }

    /// Sets the sorted inputs. Unopened readers are expected.
    pub fn with_readers(mut self, readers: Vec<R>) -> Self {
        self.readers = Some(readers);
        return self;
    }

    /// Sets the merge destination. An unopened writer is expected.
    pub fn with_writer(mut self, writer: W) -> Self {
        self.writer = Some(writer);
        return self;
    }

    /// Sets the function used to compare records.
    pub fn with_comparator(mut self, compare: F) -> Self {
        self.compare = Some(compare);
        return self;
    }

    /// Sets how many records may be buffered before being written to the destination.
    pub fn with_max_loaded_records(mut self, max_loaded_records: usize) -> Self {
        self.max_loaded_records = max_loaded_records;
        return self;
    }

    /// Sets the job logger.
    pub fn with_log(mut self, log: JobLog) -> Self {
        self.log = log;
        return self;
    }
}

impl<T, R, W, F> Default for ExternalMergerBuilder<T, R, W, F> {
    fn default() -> Self {
        ExternalMergerBuilder {
            readers: None,
            writer: None,
            compare: None,
            max_loaded_records: DEFAULT_MAX_LOADED_RECORDS,
            log: JobLog::default(),
            item_type: PhantomData,
        }
    }
}

/// External merger. Merges the contents of several sorted inputs into a single sorted output.
pub struct ExternalMerger<T, R, W, F> {
    readers: Vec<R>,
    writer: W,
    compare: F,
    max_loaded_records: usize,
    log: JobLog,

    item_type: PhantomData<T>,
}

impl<T, R, W, F> ExternalMerger<T, R, W, F>
where
    R: RecordReader<T>,
    W: RecordWriter<T>,
    F: Fn(&T, &T) -> Ordering,
{
    /// Runs the merge. Returns the number of records written.
    pub fn merge(self) -> Result<u64, SortError<R::Error, W::Error>> {
        merge_streams(
            self.readers,
            self.writer,
            self.compare,
            self.max_loaded_records,
            &self.log,
        )
    }
}
