use std::fs;
use std::io;
use std::io::Write;
use std::process;

use clap::{Arg, Command};

use otuprov::cluster;
use otuprov::derep_map;
use otuprov::provenance;

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
    cluster_file: String,
    derep_map: String,
    derep_dir: String,
    table_out: String,
}

fn wrapper() -> Result<(), anyhow::Error> {
    let cli = get_cli();
    reprovenance(&cli)
}

fn get_cli() -> CLI {
    let matches = Command::new("reprovenance")
        .version("0.1.0")
        .about("Rebuild an OTU x sample count table from clustering results and layered dereplication maps")
        .arg(
            Arg::new("cluster_file")
                .value_name("CLUSTER.TAB")
                .help("Clustering results for the doubly dereplicated reads")
                .required(true),
        )
        .arg(
            Arg::new("derep_map")
                .value_name("MASTER.MAP")
                .help("Master dereplication map indicating which datasets each clustered sequence was found in")
                .required(true),
        )
        .arg(
            Arg::new("derep_dir")
                .value_name("DEREP-DIR")
                .help("Directory with per-dataset dereplication maps, labeled datasetID.map")
                .required(true),
        )
        .arg(
            Arg::new("table_out")
                .value_name("TABLE.TXT")
                .help("File name for the output OTU table")
                .required(true),
        )
        .get_matches();

    CLI {
        cluster_file: matches.get_one::<String>("cluster_file").unwrap().clone(),
        derep_map: matches.get_one::<String>("derep_map").unwrap().clone(),
        derep_dir: matches.get_one::<String>("derep_dir").unwrap().clone(),
        table_out: matches.get_one::<String>("table_out").unwrap().clone(),
    }
}

fn reprovenance(cli: &CLI) -> Result<(), anyhow::Error> {
    println!("Parsing clustering results...");
    let assignment = cluster::read_cluster_results(&cli.cluster_file)?;

    println!("Parsing master dereplication map...");
    let master = derep_map::read_master_derep_map(&cli.derep_map)?;
    for dup in master.duplicates() {
        eprintln!(
            "WARNING: {} has two origins in {}: kept {}, dropped {}",
            dup.seq_id, dup.dataset, dup.kept, dup.dropped
        );
    }

    let index = provenance::build_contribution_index(&assignment, &master)?;

    println!("Reading all dataset dereplication maps...");
    let dataset_maps = derep_map::read_dataset_derep_maps(&cli.derep_dir)?;

    println!("Collapsing...");
    let table = provenance::assemble_table(&index, &dataset_maps)?;

    let out = fs::File::create(&cli.table_out)?;
    table.write_tsv(out)?;

    Ok(())
}
