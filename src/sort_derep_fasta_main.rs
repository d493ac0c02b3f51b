use std::fs;
use std::io;
use std::io::Write;
use std::process;

use clap::{Arg, Command};

use otuprov::relabel;

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
    map_file: String,
    fasta_in: String,
    fasta_out: String,
}

fn wrapper() -> Result<(), anyhow::Error> {
    let cli = get_cli();
    sort_derep_fasta(&cli)
}

fn get_cli() -> CLI {
    let matches = Command::new("sort-derep-fasta")
        .version("0.1.0")
        .about("Re-total per-sequence sizes from a dereplication map and rewrite the fasta largest first")
        .arg(
            Arg::new("map_file")
                .value_name("DEREP.MAP")
                .help("Dereplication map (seqID<TAB>sample:count sample2:count)")
                .required(true),
        )
        .arg(
            Arg::new("fasta_in")
                .value_name("FASTA-IN")
                .help("Dereplicated fasta corresponding to the map")
                .required(true),
        )
        .arg(
            Arg::new("fasta_out")
                .value_name("FASTA-OUT")
                .help("Relabeled and sorted output fasta")
                .required(true),
        )
        .get_matches();

    CLI {
        map_file: matches.get_one::<String>("map_file").unwrap().clone(),
        fasta_in: matches.get_one::<String>("fasta_in").unwrap().clone(),
        fasta_out: matches.get_one::<String>("fasta_out").unwrap().clone(),
    }
}

fn sort_derep_fasta(cli: &CLI) -> Result<(), anyhow::Error> {
    println!("Parsing dereplication map: {}", cli.map_file);
    let map_text = fs::read_to_string(&cli.map_file)?;
    let sizes = relabel::total_sizes(&cli.map_file, &map_text)?;

    println!("Reading fasta file: {}", cli.fasta_in);
    let input = fs::File::open(&cli.fasta_in)?;

    println!("Writing sorted and relabeled fasta: {}", cli.fasta_out);
    let dest = fs::File::create(&cli.fasta_out)?;
    relabel::sort_fasta_by_size(input, dest, &sizes)?;

    Ok(())
}
