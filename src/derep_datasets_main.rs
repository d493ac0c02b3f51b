use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::process;

use clap::{Arg, ArgAction, Command};

use otuprov::derep_run::{self, DerepJob};
use otuprov::keys;
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
    in_dir: String,
    out_dir: String,
    dereplicate: bool,
    relabel: bool,
    derep_cmd: String,
}

fn wrapper() -> Result<(), anyhow::Error> {
    let cli = get_cli();
    if cli.dereplicate {
        dereplicate(&cli)?;
    }
    if cli.relabel {
        relabel_outputs(&cli)?;
    }
    Ok(())
}

fn get_cli() -> CLI {
    let matches = Command::new("derep-datasets")
        .version("0.1.0")
        .about("Dereplicate each dataset's trimmed reads and relabel the outputs with dataset provenance")
        .arg(
            Arg::new("in_dir")
                .value_name("IN-DIR")
                .help("Directory with *.raw_trimmed.fasta files")
                .required(true),
        )
        .arg(
            Arg::new("out_dir")
                .value_name("OUT-DIR")
                .help("Directory to write resulting files to")
                .required(true),
        )
        .arg(
            Arg::new("dereplicate")
                .short('d')
                .help("Dereplicate reads")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("relabel")
                .short('l')
                .help("Relabel map files and dereplicated fastas")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("derep_cmd")
                .long("derep-cmd")
                .value_name("COMMAND")
                .help("Dereplication tool command line to run per dataset")
                .default_value("dereplicate.py"),
        )
        .get_matches();

    CLI {
        in_dir: matches.get_one::<String>("in_dir").unwrap().clone(),
        out_dir: matches.get_one::<String>("out_dir").unwrap().clone(),
        dereplicate: matches.get_flag("dereplicate"),
        relabel: matches.get_flag("relabel"),
        derep_cmd: matches.get_one::<String>("derep_cmd").unwrap().clone(),
    }
}

fn dereplicate(cli: &CLI) -> Result<(), anyhow::Error> {
    println!("Dereplicating reads");

    let tool: Vec<String> = cli
        .derep_cmd
        .split_whitespace()
        .map(String::from)
        .collect();

    let mut jobs = Vec::new();
    for file_name in derep_run::find_trimmed_fastas(&cli.in_dir)? {
        jobs.push(DerepJob::new(&cli.in_dir, &cli.out_dir, &file_name)?);
    }

    fs::DirBuilder::new().recursive(true).create(&cli.out_dir)?;
    derep_run::run_derep_jobs(&tool, &jobs)
}

fn relabel_outputs(cli: &CLI) -> Result<(), anyhow::Error> {
    println!("Relabeling output files from dereplication");

    let out_dir = Path::new(&cli.out_dir);
    for entry in fs::read_dir(out_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };

        if let Some(stem) = file_name.strip_suffix(derep_run::MAP_SUFFIX) {
            println!("{}", entry.path().display());
            let dataset = keys::dataset_from_stem(stem);
            let text = fs::read_to_string(entry.path())?;
            let relabeled = relabel::relabel_map(file_name, &text, &dataset)?;
            fs::write(relabeled_path(&entry.path()), relabeled)?;
        } else if let Some(stem) =
            file_name.strip_suffix(derep_run::DEREP_FASTA_SUFFIX)
        {
            println!("{}", entry.path().display());
            let dataset = keys::dataset_from_stem(stem);
            let input = fs::File::open(entry.path())?;
            let dest = fs::File::create(relabeled_path(&entry.path()))?;
            relabel::relabel_derep_fasta(input, dest, &dataset)?;
        }
    }

    Ok(())
}

fn relabeled_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".relabeled");
    std::path::PathBuf::from(name)
}
