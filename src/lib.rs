//! `ext-batch-sort` sorts record files too large to fit in memory and merges already sorted ones.
//!
//! External sorting is required when the data being sorted do not fit into the main memory (RAM) of a computer
//! and instead must be resided in slower external memory, usually a hard disk drive. Sorting is achieved in two
//! passes. During the first pass it sorts chunks of data that each fit in RAM and spills them to temporary runs,
//! during the second pass it merges the runs together. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `ext-batch-sort` is built for batch pipelines:
//!
//! * **Hard memory ceiling:**
//!   at most `max_loaded_records` records are held in memory, both while sorting chunks and while buffering
//!   merged output.
//! * **Schema agnostic:**
//!   records are read and written through [`RecordReader`] / [`RecordWriter`] collaborators obtained from an
//!   [`IoFactory`]. MessagePack ([`RmpIoFactory`]) and line-oriented text ([`LineIoFactory`]) streams are provided.
//! * **Deterministic:**
//!   records comparing equal keep their input order when sorting, and follow the order of the inputs when merging.
//! * **No leftovers:**
//!   temporary runs are deleted once the job finishes, whether it succeeded or failed. Runs that cannot be
//!   deleted are reported as warnings.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use ext_batch_sort::{DelimitedKey, ExternalSorterBuilder, LineIoFactory, PlainLines};
//!
//! let key = DelimitedKey::new(',', 1);
//! let sorter = ExternalSorterBuilder::new()
//!     .with_comparator(move |a: &String, b: &String| key.compare(a, b))
//!     .with_input(Path::new("people.csv"))
//!     .with_output(Path::new("people-sorted.csv"))
//!     .with_input_io_factory(LineIoFactory::new(PlainLines))
//!     .with_output_io_factory(LineIoFactory::new(PlainLines))
//!     .with_tmp_dir(Path::new("./"))
//!     .with_max_loaded_records(100_000)
//!     .build()
//!     .unwrap();
//!
//! let summary = sorter.sort().unwrap();
//! println!("{} records sorted using {} temporary runs", summary.records, summary.runs);
//! ```

pub mod buffer;
pub mod error;
pub mod lines;
pub mod logging;
pub mod merger;
pub mod rmp;
pub mod run;
pub mod sort;
pub mod stream;

pub use buffer::{load_chunk, LimitedBuffer};
pub use error::{ConfigError, SortError};
pub use lines::{DelimitedKey, LineCodec, LineIoFactory, LineStreamError, PlainLines};
pub use logging::JobLog;
pub use merger::{merge_streams, ExternalMerger, ExternalMergerBuilder, LinearMerger, DEFAULT_MAX_LOADED_RECORDS};
pub use rmp::{RmpIoFactory, RmpStreamError};
pub use run::{CleanupReport, RunHandle, TmpRunManager};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortSummary};
pub use stream::{IoFactory, RecordReader, RecordWriter};
