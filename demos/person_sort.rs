use std::fs;
use std::path;

use env_logger;
use log;

use ext_batch_sort::lines::DecodeError;
use ext_batch_sort::{ExternalSorter, ExternalSorterBuilder, LineCodec, LineIoFactory};

#[derive(Debug, Clone)]
struct Person {
    id: u64,
    name: String,
}

#[derive(Clone)]
struct PersonCodec;

impl LineCodec<Person> for PersonCodec {
    fn decode(&self, line: &str, line_number: usize) -> Result<Person, DecodeError> {
        let (id, name) = line
            .split_once(',')
            .ok_or_else(|| format!("line {} is not an 'id,name' pair", line_number))?;

        return Ok(Person {
            id: id.trim().parse()?,
            name: name.trim().to_string(),
        });
    }

    fn encode(&self, person: &Person) -> String {
        format!("{},{}", person.id, person.name)
    }
}

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let names = ["carol", "alice", "dave", "bob", "alice", "erin"];
    let people: Vec<String> = (0..1_000)
        .map(|id| format!("{},{}", id, names[id % names.len()]))
        .collect();
    fs::write("people.csv", people.join("\n")).unwrap();

    let sorter: ExternalSorter<Person, _, _, _> = ExternalSorterBuilder::new()
        .with_comparator(|a: &Person, b: &Person| a.name.cmp(&b.name))
        .with_input(path::Path::new("people.csv"))
        .with_output(path::Path::new("people-sorted.csv"))
        .with_input_io_factory(LineIoFactory::new(PersonCodec))
        .with_output_io_factory(LineIoFactory::new(PersonCodec))
        .with_tmp_dir(path::Path::new("./"))
        .with_max_loaded_records(100)
        .build()
        .unwrap();

    let summary = sorter.sort().unwrap();
    println!("{} people sorted by name using {} temporary runs", summary.records, summary.runs);

    for line in fs::read_to_string("people-sorted.csv").unwrap().lines().take(5) {
        println!("{}", line);
    }
}
