use std::path;

use env_logger;
use log;
use serde::{Deserialize, Serialize};

use ext_batch_sort::{IoFactory, RecordReader, RecordWriter, RmpIoFactory};
use ext_batch_sort::{ExternalSorter, ExternalSorterBuilder};

#[derive(Debug, Serialize, Deserialize)]
struct Measurement {
    sensor: String,
    timestamp: u64,
    value: f64,
}

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let factory: RmpIoFactory<Measurement> = RmpIoFactory::new();
    let sensors = ["north", "east", "south", "west"];

    let mut writer = factory.writer(path::Path::new("measurements.bin"));
    writer.open().unwrap();
    let measurements: Vec<Measurement> = (0..10_000u64)
        .map(|i| Measurement {
            sensor: sensors[(i * 7 % 4) as usize].to_string(),
            timestamp: (i * 7919) % 10_000,
            value: i as f64 / 10.0,
        })
        .collect();
    writer.write_batch(&measurements).unwrap();
    writer.close().unwrap();

    let sorter: ExternalSorter<Measurement, _, _, _> = ExternalSorterBuilder::new()
        .with_comparator(|a: &Measurement, b: &Measurement| {
            a.sensor.cmp(&b.sensor).then(a.timestamp.cmp(&b.timestamp))
        })
        .with_input(path::Path::new("measurements.bin"))
        .with_output(path::Path::new("measurements-sorted.bin"))
        .with_input_io_factory(factory.clone())
        .with_output_io_factory(factory.clone())
        .with_tmp_dir(path::Path::new("./"))
        .with_max_loaded_records(1_000)
        .build()
        .unwrap();

    let summary = sorter.sort().unwrap();
    println!("{} measurements sorted using {} temporary runs", summary.records, summary.runs);

    let mut reader = factory.reader(path::Path::new("measurements-sorted.bin"));
    reader.open().unwrap();
    for _ in 0..5 {
        match reader.read_next().unwrap() {
            Some(measurement) => println!("{:?}", measurement),
            None => break,
        }
    }
    reader.close().unwrap();
}
