use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::process;

use clap::{Arg, Command};

use otuprov::metadata;

fn main() {
    match wrapper() {
        Err(e) => {
            io::stderr().write(format!("{}\n", e).as_bytes()).unwrap();
            process::exit(1);
        }
        _ => (),
    };
}

struct CLI {
    in_dir: String,
    out_dir: String,
    out_file: String,
}

fn wrapper() -> Result<(), anyhow::Error> {
    let cli = get_cli();
    merge_metadata(&cli)
}

fn get_cli() -> CLI {
    let matches = Command::new("merge-metadata")
        .version("0.1.0")
        .about("Concatenate per-dataset metadata tables, tagging rows with their dataset and relabeling samples")
        .arg(
            Arg::new("in_dir")
                .value_name("IN-DIR")
                .help("Directory with all metadata files to be read")
                .required(true),
        )
        .arg(
            Arg::new("out_dir")
                .value_name("OUT-DIR")
                .help("Directory to write the merged metadata file to")
                .required(true),
        )
        .arg(
            Arg::new("out_file")
                .value_name("OUT-FILE")
                .help("Output file name")
                .required(true),
        )
        .get_matches();

    CLI {
        in_dir: matches.get_one::<String>("in_dir").unwrap().clone(),
        out_dir: matches.get_one::<String>("out_dir").unwrap().clone(),
        out_file: matches.get_one::<String>("out_file").unwrap().clone(),
    }
}

fn merge_metadata(cli: &CLI) -> Result<(), anyhow::Error> {
    let mut tables = Vec::new();
    for (dataset, path) in metadata::find_metadata_files(&cli.in_dir)? {
        println!("{}", path.display());
        tables.push(metadata::read_metadata_table(&path, &dataset)?);
    }

    for overlap in metadata::overlapping_samples(&tables) {
        eprintln!("WARNING: {}", overlap);
    }

    let out_path = Path::new(&cli.out_dir).join(&cli.out_file);
    let dest = fs::File::create(out_path)?;
    metadata::write_merged(&tables, dest)?;

    Ok(())
}
