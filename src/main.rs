use std::cmp::Ordering;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use ext_batch_sort::{DelimitedKey, ExternalMergerBuilder, ExternalSorterBuilder, IoFactory, LineIoFactory, PlainLines};

fn main() {
    let arg_parser = build_arg_parser();
    let (command, args) = arg_parser.subcommand().expect("subcommand is required");

    let log_level: LogLevel = args.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let options = Options::from_args(args);
    let result = match command {
        "sort" => sort(args, &options),
        "merge" => merge(args, &options),
        other => Err(format!("unknown command: {}", other).into()),
    };

    if let Err(err) = result {
        log::error!("{} failed: {}", command, err);
        process::exit(1);
    }
}

/// Options shared by every command.
struct Options {
    max_loaded_records: usize,
    io_buf_size: Option<usize>,
    key: Option<DelimitedKey>,
    order: Order,
}

impl Options {
    fn from_args(args: &clap::ArgMatches) -> Self {
        let delimiter: char = args.value_of_t_or_exit("delimiter");
        let key = args
            .is_present("key")
            .then(|| DelimitedKey::new(delimiter, args.value_of_t_or_exit("key")));
        let io_buf_size = args
            .value_of("io_buf_size")
            .map(|size| parse_buf_size(size).expect("value is pre-validated"));

        Options {
            max_loaded_records: args.value_of_t_or_exit("max_records"),
            io_buf_size,
            key,
            order: args.value_of_t_or_exit("sort"),
        }
    }

    fn io_factory(&self) -> LineIoFactory<PlainLines> {
        let factory = LineIoFactory::new(PlainLines);
        match self.io_buf_size {
            Some(buf_size) => factory.with_rw_buf_size(buf_size),
            None => factory,
        }
    }

    fn comparator(&self) -> impl Fn(&String, &String) -> Ordering {
        let key = self.key.clone();
        let order = self.order;

        move |a: &String, b: &String| {
            let ordering = match &key {
                Some(key) => key.compare(a, b),
                None => a.cmp(b),
            };
            match order {
                Order::Asc => ordering,
                Order::Desc => ordering.reverse(),
            }
        }
    }
}

fn sort(args: &clap::ArgMatches, options: &Options) -> Result<(), Box<dyn Error>> {
    let input = args.value_of("input").expect("value is required");
    let output = args.value_of("output").expect("value is required");

    // removed when the command returns
    let scratch = if args.is_present("tmp_dir") {
        None
    } else {
        Some(tempfile::tempdir()?)
    };
    let tmp_dir = match &scratch {
        Some(scratch) => scratch.path().to_path_buf(),
        None => PathBuf::from(args.value_of("tmp_dir").expect("value is present")),
    };
    log::info!("using {} as a temporary directory", tmp_dir.display());

    let sorter = ExternalSorterBuilder::new()
        .with_comparator(options.comparator())
        .with_input(Path::new(input))
        .with_output(Path::new(output))
        .with_input_io_factory(options.io_factory())
        .with_output_io_factory(options.io_factory())
        .with_tmp_dir(&tmp_dir)
        .with_max_loaded_records(options.max_loaded_records)
        .build()?;

    let summary = sorter.sort()?;
    log::info!(
        "{} records sorted into {} ({} temporary runs)",
        summary.records,
        output,
        summary.runs
    );

    return Ok(());
}

fn merge(args: &clap::ArgMatches, options: &Options) -> Result<(), Box<dyn Error>> {
    let output = args.value_of("output").expect("value is required");
    let factory = options.io_factory();

    let readers = args
        .values_of("inputs")
        .expect("value is required")
        .map(|input| IoFactory::<String>::reader(&factory, Path::new(input)))
        .collect();
    let writer = IoFactory::<String>::writer(&factory, Path::new(output));

    let merger = ExternalMergerBuilder::new()
        .with_readers(readers)
        .with_writer(writer)
        .with_comparator(options.comparator())
        .with_max_loaded_records(options.max_loaded_records)
        .build()?;

    let records = merger.merge()?;
    log::info!("{} records merged into {}", records, output);

    return Ok(());
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Order::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Order as clap::ArgEnum>::from_str(s, false)
    }
}

/// Parses a human-readable buffer size, rejecting sizes the platform can't address.
fn parse_buf_size(value: &str) -> Result<usize, String> {
    let size = value
        .parse::<ByteSize>()
        .map_err(|err| format!("Buffer size format incorrect: {}", err))?;

    return usize::try_from(size.as_u64()).map_err(|_| format!("Buffer size {} is too large", size));
}

fn common_args() -> Vec<clap::Arg<'static>> {
    vec![
        clap::Arg::new("output")
            .short('o')
            .long("output")
            .help("result file")
            .required(true)
            .takes_value(true),
        clap::Arg::new("sort")
            .short('s')
            .long("sort")
            .help("sorting order")
            .takes_value(true)
            .default_value("asc")
            .possible_values(Order::possible_values()),
        clap::Arg::new("key")
            .short('k')
            .long("key")
            .help("zero-based index of the field to sort by, the whole line is used if omitted")
            .takes_value(true)
            .validator(|v| match v.parse::<usize>() {
                Ok(_) => Ok(()),
                Err(err) => Err(format!("Key field format incorrect: {}", err)),
            }),
        clap::Arg::new("delimiter")
            .short('t')
            .long("delimiter")
            .help("field delimiter")
            .takes_value(true)
            .default_value(","),
        clap::Arg::new("max_records")
            .short('m')
            .long("max-records")
            .help("maximum number of records held in memory")
            .takes_value(true)
            .default_value("100000")
            .validator(|v| match v.parse::<usize>() {
                Ok(0) => Err("Max records must be greater than 0".to_string()),
                Ok(_) => Ok(()),
                Err(err) => Err(format!("Max records format incorrect: {}", err)),
            }),
        clap::Arg::new("io_buf_size")
            .long("io-buf-size")
            .help("file read/write buffer size")
            .takes_value(true)
            .validator(|v| parse_buf_size(v).map(|_| ())),
        clap::Arg::new("log_level")
            .short('l')
            .long("loglevel")
            .help("logging level")
            .takes_value(true)
            .default_value("info")
            .possible_values(LogLevel::possible_values()),
    ]
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("ext-batch-sort")
        .about("external sorter and merger for line-oriented record files")
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            clap::App::new("sort")
                .about("sort a file holding more records than fit in memory")
                .arg(
                    clap::Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("file to be sorted")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::new("tmp_dir")
                        .short('d')
                        .long("tmp-dir")
                        .help("directory to be used to store temporary runs")
                        .takes_value(true),
                )
                .args(common_args()),
        )
        .subcommand(
            clap::App::new("merge")
                .about("merge already sorted files, ties are resolved in input order")
                .arg(
                    clap::Arg::new("inputs")
                        .help("sorted files to be merged")
                        .required(true)
                        .takes_value(true)
                        .multiple_values(true),
                )
                .args(common_args()),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
