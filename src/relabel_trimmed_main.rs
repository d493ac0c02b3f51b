use std::fs;
use std::io;
use std::io::Write;
use std::process;

use clap::{Arg, Command};

use otuprov::derep_run;
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

fn wrapper() -> Result<(), anyhow::Error> {
    let matches = Command::new("relabel-trimmed")
        .version("0.1.0")
        .about("Prefix every sequence header in *.raw_trimmed.fasta files with its dataset ID")
        .arg(
            Arg::new("trimmed_dir")
                .value_name("TRIMMED-DIR")
                .help("Directory with *.raw_trimmed.fasta files")
                .required(true),
        )
        .get_matches();

    let trimmed_dir = matches.get_one::<String>("trimmed_dir").unwrap();

    for file_name in derep_run::find_trimmed_fastas(trimmed_dir)? {
        let path = std::path::Path::new(trimmed_dir).join(&file_name);
        println!("{}", path.display());

        let stem = file_name.split('.').next().unwrap_or(&file_name);
        let dataset = keys::dataset_from_stem(stem);

        let input = fs::File::open(&path)?;
        let mut out_name = path.as_os_str().to_os_string();
        out_name.push(".relabeled");
        let dest = fs::File::create(out_name)?;

        relabel::relabel_trimmed_fasta(input, dest, &dataset)?;
    }

    Ok(())
}
