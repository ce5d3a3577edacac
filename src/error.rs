//! Sort and merge errors.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::path::PathBuf;

/// Job configuration error. Always detected before any I/O takes place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No comparator was supplied.
    MissingComparator,
    /// No input resource was supplied.
    MissingInput,
    /// No output resource was supplied.
    MissingOutput,
    /// Output resource has no file name to derive temporary run names from.
    InvalidOutput(PathBuf),
    /// No input I/O factory was supplied.
    MissingInputIoFactory,
    /// No output I/O factory was supplied.
    MissingOutputIoFactory,
    /// No temporary directory was supplied.
    MissingTmpDir,
    /// Temporary directory does not exist.
    TmpDirNotFound(PathBuf),
    /// Temporary directory path is not a directory.
    TmpDirNotDirectory(PathBuf),
    /// Temporary directory is not writable.
    TmpDirReadOnly(PathBuf),
    /// Memory ceiling must be at least one record.
    InvalidMaxLoadedRecords(usize),
    /// No merge readers were supplied.
    MissingReaders,
    /// No merge writer was supplied.
    MissingWriter,
}

impl Error for ConfigError {}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingComparator => write!(f, "no comparator specified"),
            ConfigError::MissingInput => write!(f, "no input resource specified"),
            ConfigError::MissingOutput => write!(f, "no output resource specified"),
            ConfigError::InvalidOutput(path) => {
                write!(f, "output resource '{}' has no file name", path.display())
            }
            ConfigError::MissingInputIoFactory => write!(f, "no input I/O factory defined"),
            ConfigError::MissingOutputIoFactory => write!(f, "no output I/O factory defined"),
            ConfigError::MissingTmpDir => write!(f, "no temporary working directory specified"),
            ConfigError::TmpDirNotFound(path) => {
                write!(f, "temporary directory '{}' does not exist", path.display())
            }
            ConfigError::TmpDirNotDirectory(path) => {
                write!(f, "temporary space resource '{}' is not a directory", path.display())
            }
            ConfigError::TmpDirReadOnly(path) => {
                write!(f, "temporary directory '{}' is not writable", path.display())
            }
            ConfigError::InvalidMaxLoadedRecords(value) => {
                write!(f, "max loaded records must be greater than 0 (got {})", value)
            }
            ConfigError::MissingReaders => write!(f, "no readers to merge specified"),
            ConfigError::MissingWriter => write!(f, "no merge writer specified"),
        }
    }
}

/// Sorting or merging error.
///
/// `I` is the error type of the input streams (the input I/O factory of a sort, the sources of a merge),
/// `O` is the error type of the output streams (destination and temporary runs of a sort, the writer of a merge).
#[derive(Debug)]
pub enum SortError<I: Error, O: Error> {
    /// Invalid job configuration.
    Config(ConfigError),
    /// Input data stream error.
    Input(I),
    /// Output or temporary run stream error.
    Output(O),
}

impl<I: Error, O: Error> SortError<I, O> {
    /// Maps the input error type, leaving other variants untouched.
    pub fn map_input<J: Error>(self, f: impl FnOnce(I) -> SortError<J, O>) -> SortError<J, O> {
        match self {
            SortError::Config(err) => SortError::Config(err),
            SortError::Input(err) => f(err),
            SortError::Output(err) => SortError::Output(err),
        }
    }

    /// Returns `true` if the error is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, SortError::Config(_))
    }
}

impl<I: Error, O: Error> From<ConfigError> for SortError<I, O> {
    fn from(err: ConfigError) -> Self {
        SortError::Config(err)
    }
}

impl<I, O> Error for SortError<I, O>
where
    I: Error + 'static,
    O: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(match &self {
            SortError::Config(err) => err,
            SortError::Input(err) => err,
            SortError::Output(err) => err,
        })
    }
}

impl<I: Error, O: Error> Display for SortError<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Config(err) => write!(f, "configuration error: {}", err),
            SortError::Input(err) => write!(f, "input data stream error: {}", err),
            SortError::Output(err) => write!(f, "output data stream error: {}", err),
        }
    }
}
