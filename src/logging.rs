//! Job logger.
//!
//! Every sort or merge job writes its log records through a [`JobLog`] handed to it by the caller
//! instead of reaching for the process-wide logger directly. The default handle forwards to whatever
//! logger the application installed through the `log` facade.

use std::fmt;
use std::sync::Arc;

use log::{Level, Log, Metadata, Record};

const DEFAULT_TARGET: &str = "ext_batch_sort";

/// Forwards records to the logger installed via the `log` facade.
struct FacadeLog;

impl Log for FacadeLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record)
    }

    fn flush(&self) {
        log::logger().flush()
    }
}

/// Logger injected into sort and merge jobs.
#[derive(Clone)]
pub struct JobLog {
    sink: Arc<dyn Log>,
    target: String,
}

impl JobLog {
    /// Creates a job logger writing to `sink` under the given target.
    pub fn new(sink: Arc<dyn Log>, target: impl Into<String>) -> Self {
        JobLog {
            sink,
            target: target.into(),
        }
    }

    /// Returns a copy of this logger using a different target.
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        JobLog {
            sink: self.sink.clone(),
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(Level::Debug, args);
    }

    fn emit(&self, level: Level, args: fmt::Arguments<'_>) {
        let record = Record::builder()
            .args(args)
            .level(level)
            .target(&self.target)
            .build();

        if self.sink.enabled(record.metadata()) {
            self.sink.log(&record);
        }
    }
}

impl Default for JobLog {
    fn default() -> Self {
        JobLog::new(Arc::new(FacadeLog), DEFAULT_TARGET)
    }
}

impl fmt::Debug for JobLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobLog").field("target", &self.target).finish()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::{Arc, Mutex};

    use log::{Level, Log, Metadata, Record};

    use super::JobLog;

    /// Log sink collecting records in memory.
    #[derive(Default)]
    pub(crate) struct CaptureLog {
        records: Mutex<Vec<(Level, String, String)>>,
    }

    impl CaptureLog {
        pub(crate) fn messages(&self, level: Level) -> Vec<String> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _, _)| *l == level)
                .map(|(_, _, msg)| msg.clone())
                .collect()
        }

        pub(crate) fn targets(&self) -> Vec<String> {
            self.records.lock().unwrap().iter().map(|(_, t, _)| t.clone()).collect()
        }
    }

    impl Log for CaptureLog {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            self.records.lock().unwrap().push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }

        fn flush(&self) {}
    }

    pub(crate) fn capture() -> (Arc<CaptureLog>, JobLog) {
        let sink = Arc::new(CaptureLog::default());
        let log = JobLog::new(sink.clone(), "test-job");
        (sink, log)
    }

    #[test]
    fn test_job_log_routes_to_injected_sink() {
        let (sink, log) = capture();

        log.info(format_args!("loaded {} records", 3));
        log.warn(format_args!("couldn't delete '{}'", "people0"));
        log.with_target("other").debug(format_args!("detail"));

        assert_eq!(sink.messages(Level::Info), vec!["loaded 3 records"]);
        assert_eq!(sink.messages(Level::Warn), vec!["couldn't delete 'people0'"]);
        assert_eq!(sink.targets(), vec!["test-job", "test-job", "other"]);
    }
}
