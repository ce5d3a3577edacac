//! External sorter.

use std::cmp::Ordering;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::buffer::{load_chunk, LimitedBuffer};
use crate::error::{ConfigError, SortError};
use crate::logging::JobLog;
use crate::merger::{merge_streams, DEFAULT_MAX_LOADED_RECORDS};
use crate::run::{check_tmp_dir, TmpRunManager};
use crate::stream::{IoFactory, RecordReader, RecordWriter};

/// Outcome of a successful sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSummary {
    /// Number of records written to the destination.
    pub records: u64,
    /// Number of temporary runs spilled. Zero when the input fit in a single chunk.
    pub runs: usize,
    /// Temporary runs that could not be deleted and require manual cleanup.
    pub undeletable: Vec<PathBuf>,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
pub struct ExternalSorterBuilder<T, F, IF, OF> {
    /// Function used to compare records.
    compare: Option<F>,
    /// Input file.
    input: Option<PathBuf>,
    /// Destination file.
    output: Option<PathBuf>,
    /// Factory of the input reader.
    input_io_factory: Option<IF>,
    /// Factory of the destination writer and of temporary run readers and writers.
    output_io_factory: Option<OF>,
    /// Directory to be used to store temporary runs.
    tmp_dir: Option<PathBuf>,
    /// Maximum number of records held in memory at once.
    max_loaded_records: usize,
    /// Job logger.
    log: JobLog,

    /// Record type.
    item_type: PhantomData<T>,
}

impl<T, F, IF, OF> ExternalSorterBuilder<T, F, IF, OF>
where
    F: Fn(&T, &T) -> Ordering,
    IF: IoFactory<T>,
    OF: IoFactory<T>,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    /// Every setting except the memory ceiling and the logger is mandatory.
    pub fn build(self) -> Result<ExternalSorter<T, F, IF, OF>, ConfigError> {
        let compare = self.compare.ok_or(ConfigError::MissingComparator)?;
        let input = self.input.ok_or(ConfigError::MissingInput)?;
        let output = self.output.ok_or(ConfigError::MissingOutput)?;
        let output_base_name = output
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| ConfigError::InvalidOutput(output.clone()))?;
        let input_io_factory = self.input_io_factory.ok_or(ConfigError::MissingInputIoFactory)?;
        let output_io_factory = self.output_io_factory.ok_or(ConfigError::MissingOutputIoFactory)?;
        let tmp_dir = self.tmp_dir.ok_or(ConfigError::MissingTmpDir)?;
        check_tmp_dir(&tmp_dir)?;
        if self.max_loaded_records < 1 {
            return Err(ConfigError::InvalidMaxLoadedRecords(self.max_loaded_records));
        }

        return Ok(ExternalSorter {
            compare,
            input,
            output,
            output_base_name,
            input_io_factory,
            output_io_factory,
            tmp_dir,
            max_loaded_records: self.max_loaded_records,
            log: self.log,
            item_type: PhantomData,
        });
    }

    /// Sets the function used to compare records.
    pub fn with_comparator(mut self, compare: F) -> Self {
        self.compare = Some(compare);
        return self;
    }

    /// Sets the file to be sorted.
    pub fn with_input(mut self, path: &Path) -> Self {
        self.input = Some(path.into());
        return self;
    }

    /// Sets the destination file. An existing file is replaced.
    pub fn with_output(mut self, path: &Path) -> Self {
        self.output = Some(path.into());
        return self;
    }

    /// Sets the factory used to read the input.
    pub fn with_input_io_factory(mut self, factory: IF) -> Self {
        self.input_io_factory = Some(factory);
        return self;
    }

    /// Sets the factory used to write the destination and to write and read temporary runs.
    pub fn with_output_io_factory(mut self, factory: OF) -> Self {
        self.output_io_factory = Some(factory);
        return self;
    }

    /// Sets directory to be used to store temporary runs.
    pub fn with_tmp_dir(mut self, path: &Path) -> Self {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Specifies how many records may be loaded into main memory at once, both while sorting chunks and while
    /// buffering merged output. Decrease it if memory runs short.
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

impl<T, F, IF, OF> Default for ExternalSorterBuilder<T, F, IF, OF> {
    fn default() -> Self {
        ExternalSorterBuilder {
            compare: None,
            input: None,
            output: None,
            input_io_factory: None,
            output_io_factory: None,
            tmp_dir: None,
            max_loaded_records: DEFAULT_MAX_LOADED_RECORDS,
            log: JobLog::default(),
            item_type: PhantomData,
        }
    }
}

/// External sorter.
///
/// Sorts the input file into the destination holding at most `max_loaded_records` records in memory.
/// Input that fits in a single chunk is sorted in memory and written directly. Larger input is split into
/// sorted temporary runs which are then merged into the destination and deleted. Records comparing equal keep
/// their input order.
pub struct ExternalSorter<T, F, IF, OF> {
    compare: F,
    input: PathBuf,
    output: PathBuf,
    output_base_name: OsString,
    input_io_factory: IF,
    output_io_factory: OF,
    tmp_dir: PathBuf,
    max_loaded_records: usize,
    log: JobLog,

    item_type: PhantomData<T>,
}

impl<T, F, IF, OF> ExternalSorter<T, F, IF, OF>
where
    F: Fn(&T, &T) -> Ordering,
    IF: IoFactory<T>,
    OF: IoFactory<T>,
{
    /// Sorts the input into the destination.
    ///
    /// On failure every opened stream is closed, temporary runs are deleted (best-effort), a partially written
    /// destination is removed (best-effort) and the original error is returned.
    pub fn sort(&self) -> Result<SortSummary, SortError<IF::Error, OF::Error>> {
        let mut reader = self.input_io_factory.reader(&self.input);
        reader.open().map_err(SortError::Input)?;
        self.log
            .info(format_args!("input file, '{}' opened for reading", self.input.display()));

        self.log.info(format_args!("loading records into memory"));
        let (chunk, exhausted) = match load_chunk(&mut reader, self.max_loaded_records) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.log.error(format_args!("input file could not be read: {}", err));
                self.close_input(&mut reader);
                return Err(SortError::Input(err));
            }
        };

        if exhausted {
            self.close_input(&mut reader);
            self.log.info(format_args!(
                "complete input file fits in memory, no temporary files required"
            ));
            return self.write_direct(chunk);
        }

        self.log.info(format_args!(
            "full file doesn't fit in main memory, using out-of-core resources"
        ));
        let spilled = self.spill(&mut reader, chunk);
        self.close_input(&mut reader);
        let mut runs = spilled?;

        self.log.info(format_args!(
            "merging {} temporary files into: '{}'...",
            runs.runs().len(),
            self.output.display()
        ));
        let readers: Vec<_> = runs
            .runs()
            .iter()
            .map(|run| self.output_io_factory.reader(run.path()))
            .collect();
        let writer = self.output_io_factory.writer(&self.output);
        let merged = merge_streams(readers, writer, &self.compare, self.max_loaded_records, &self.log);

        let spilled_runs = runs.runs().len();
        let undeletable = self.cleanup_runs(&mut runs);

        match merged {
            Ok(records) => {
                self.log.info(format_args!("sort complete, {} records written", records));
                Ok(SortSummary {
                    records,
                    runs: spilled_runs,
                    undeletable,
                })
            }
            Err(err) => {
                self.remove_output();
                Err(err.map_input(SortError::Output))
            }
        }
    }

    fn write_direct(&self, mut chunk: LimitedBuffer<T>) -> Result<SortSummary, SortError<IF::Error, OF::Error>> {
        self.remove_output();
        chunk.sort_by(&self.compare);

        match self.write_file(&self.output, chunk.as_slice()) {
            Ok(()) => {
                self.log.info(format_args!(
                    "output file, '{}' written successfully",
                    self.output.display()
                ));
                Ok(SortSummary {
                    records: chunk.len() as u64,
                    runs: 0,
                    undeletable: Vec::new(),
                })
            }
            Err(err) => {
                self.log.error(format_args!(
                    "an error occurred while writing the output file: {}",
                    err
                ));
                self.remove_output();
                Err(SortError::Output(err))
            }
        }
    }

    /// Spills the first chunk and the rest of the input into sorted runs.
    /// On failure the runs created so far are deleted before the error is returned.
    fn spill(
        &self,
        reader: &mut IF::Reader,
        first: LimitedBuffer<T>,
    ) -> Result<TmpRunManager, SortError<IF::Error, OF::Error>> {
        let mut runs = TmpRunManager::new(&self.tmp_dir, &self.output_base_name, self.log.clone())?;
        self.remove_output();

        match self.spill_chunks(reader, &mut runs, first) {
            Ok(()) => Ok(runs),
            Err(err) => {
                self.log.error(format_args!("spilling to temporary files failed: {}", err));
                self.cleanup_runs(&mut runs);
                Err(err)
            }
        }
    }

    fn spill_chunks(
        &self,
        reader: &mut IF::Reader,
        runs: &mut TmpRunManager,
        first: LimitedBuffer<T>,
    ) -> Result<(), SortError<IF::Error, OF::Error>> {
        let mut chunk = first;
        let mut exhausted = false;

        loop {
            chunk.sort_by(&self.compare);

            let run = runs.next_run()?;
            self.log.debug(format_args!(
                "writing {} records to temporary file: '{}'",
                chunk.len(),
                run.path().display()
            ));
            self.write_file(run.path(), chunk.as_slice())
                .map_err(SortError::Output)?;

            if exhausted {
                break;
            }

            let (next, next_exhausted) =
                load_chunk(reader, self.max_loaded_records).map_err(SortError::Input)?;
            if next.is_empty() {
                break;
            }
            chunk = next;
            exhausted = next_exhausted;
        }

        return Ok(());
    }

    /// Writes `records` into a freshly created file, closing it whatever happens.
    fn write_file(&self, path: &Path, records: &[T]) -> Result<(), OF::Error> {
        let mut writer = self.output_io_factory.writer(path);
        writer.open()?;

        match writer.write_batch(records) {
            Ok(()) => writer.close(),
            Err(err) => {
                if let Err(close_err) = writer.close() {
                    self.log
                        .warn(format_args!("failed to close '{}': {}", path.display(), close_err));
                }
                Err(err)
            }
        }
    }

    /// Deletes every run of the job and returns the ones left behind.
    fn cleanup_runs(&self, runs: &mut TmpRunManager) -> Vec<PathBuf> {
        let report = runs.cleanup_all();
        if !report.is_clean() {
            self.log.warn(format_args!(
                "{} temporary files left in '{}'",
                report.undeletable.len(),
                self.tmp_dir.display()
            ));
        }

        return report.undeletable;
    }

    fn close_input(&self, reader: &mut IF::Reader) {
        if let Err(err) = reader.close() {
            self.log.warn(format_args!(
                "failed to close input file '{}': {}",
                self.input.display(),
                err
            ));
        }
    }

    /// Removes the destination file if it exists.
    fn remove_output(&self) {
        match fs::remove_file(&self.output) {
            Ok(()) => self
                .log
                .debug(format_args!("removed output file '{}'", self.output.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => self.log.warn(format_args!(
                "couldn't remove output file, '{}' from disk: {}",
                self.output.display(),
                err
            )),
        }
    }
}
