//! Concatenation of per-dataset metadata tables.
//!
//! Each dataset ships a tab-delimited metadata table whose first
//! column is the sample ID. Merging tags every row with its dataset,
//! requalifies the sample IDs as `datasetID--sampleID`, and stacks the
//! tables row-wise over the union of their columns. Raw sample IDs
//! shared between datasets are reported as warnings before relabeling
//! makes them disjoint; the merge itself never drops rows.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow;

use crate::keys;

pub const METADATA_SUFFIX: &str = ".metadata.txt";
pub const DATASET_COLUMN: &str = "dataset_id";

/// One dataset's metadata table, with raw (unprefixed) sample IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMetadata {
    dataset: String,
    index_name: String,
    columns: Vec<String>,
    samples: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl DatasetMetadata {
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }
}

/// Raw sample IDs shared by two datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOverlap {
    pub dataset_a: String,
    pub dataset_b: String,
    pub samples: Vec<String>,
}

impl fmt::Display for SampleOverlap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} and {} have {} overlapping sample IDs",
            self.dataset_a,
            self.dataset_b,
            self.samples.len()
        )
    }
}

/// Finds `*.metadata.txt` files in a directory, returning
/// (dataset, path) pairs sorted by dataset. The dataset name is the
/// file stem before the first `.`.
pub fn find_metadata_files<P: AsRef<Path>>(
    meta_dir: P,
) -> Result<Vec<(String, PathBuf)>, anyhow::Error> {
    let mut found = Vec::new();

    for entry in fs::read_dir(&meta_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let file_name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if !file_name.ends_with(METADATA_SUFFIX) {
            continue;
        }
        let dataset = file_name.split('.').next().unwrap_or(file_name);
        found.push((dataset.to_string(), entry.path()));
    }

    found.sort();
    Ok(found)
}

/// Reads one metadata table. The first column holds sample IDs; the
/// remaining header names become metadata columns.
pub fn read_metadata_table<P: AsRef<Path>>(
    path: P,
    dataset: &str,
) -> Result<DatasetMetadata, anyhow::Error> {
    let name = path.as_ref().display().to_string();
    let file = fs::File::open(&path)?;
    parse_metadata_table(&name, dataset, file)
}

/// Parses metadata-table text, with `name` identifying the source in
/// error messages.
pub fn parse_metadata_table<R: io::Read>(
    name: &str,
    dataset: &str,
    input: R,
) -> Result<DatasetMetadata, anyhow::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|err| anyhow::anyhow!("{}: {}", name, err))?
        .clone();
    if headers.is_empty() {
        return Err(MetadataError::NoColumns(name.to_string()).into());
    }
    let index_name = headers[0].to_string();
    let columns: Vec<String> =
        headers.iter().skip(1).map(String::from).collect();

    let mut samples = Vec::new();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|err| anyhow::anyhow!("{}: {}", name, err))?;
        let mut fields = record.iter();
        let sample = fields
            .next()
            .ok_or_else(|| MetadataError::NoColumns(name.to_string()))?;
        samples.push(sample.to_string());
        rows.push(fields.map(String::from).collect());
    }

    Ok(DatasetMetadata {
        dataset: dataset.to_string(),
        index_name,
        columns,
        samples,
        rows,
    })
}

/// Pairwise comparison of raw sample IDs across datasets. The check
/// runs before relabeling so true cross-dataset collisions are
/// visible; after prefixing they would be structurally disjoint.
pub fn overlapping_samples(tables: &[DatasetMetadata]) -> Vec<SampleOverlap> {
    let mut overlaps = Vec::new();

    for (at, table_a) in tables.iter().enumerate() {
        for table_b in &tables[at + 1..] {
            let shared: Vec<String> = table_a
                .samples
                .iter()
                .filter(|sample| table_b.samples.contains(sample))
                .cloned()
                .collect();
            if !shared.is_empty() {
                overlaps.push(SampleOverlap {
                    dataset_a: table_a.dataset.clone(),
                    dataset_b: table_b.dataset.clone(),
                    samples: shared,
                });
            }
        }
    }

    overlaps
}

/// Writes the row-wise concatenation of all tables as one
/// tab-delimited table. Sample IDs are requalified as
/// `datasetID--sampleID`, every row gains a `dataset_id` column, and
/// the columns are the union of all tables' columns in first-seen
/// order; cells a table never defined stay empty.
pub fn write_merged<W: io::Write>(
    tables: &[DatasetMetadata],
    dest: W,
) -> Result<(), anyhow::Error> {
    let mut columns: Vec<String> = Vec::new();
    for table in tables {
        for column in &table.columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }
    columns.push(DATASET_COLUMN.to_string());

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(dest);

    let index_name = tables
        .first()
        .map(|t| t.index_name.clone())
        .unwrap_or_default();
    let mut header = vec![index_name];
    header.extend(columns.iter().cloned());
    writer.write_record(&header)?;

    for table in tables {
        for (sample, row) in table.samples.iter().zip(&table.rows) {
            let mut record = vec![keys::sample_key(&table.dataset, sample)];
            for column in &columns {
                if column == DATASET_COLUMN {
                    record.push(table.dataset.clone());
                } else {
                    let value = table
                        .columns
                        .iter()
                        .position(|c| c == column)
                        .and_then(|at| row.get(at))
                        .cloned()
                        .unwrap_or_default();
                    record.push(value);
                }
            }
            writer.write_record(&record)?;
        }
    }

    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    NoColumns(String),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetadataError::NoColumns(file) => {
                write!(f, "{}: metadata table has no columns", file)
            }
        }
    }
}

impl Error for MetadataError {}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    fn table(name: &str, dataset: &str, text: &str) -> DatasetMetadata {
        parse_metadata_table(name, dataset, text.as_bytes()).unwrap()
    }

    #[test]
    fn table_splits_index_from_columns() {
        let meta = table(
            "crc_zhao.metadata.txt",
            "crc_zhao",
            "sample\tage\tdisease\ns1\t44\tCRC\ns2\t51\tH\n",
        );
        assert_eq!(meta.columns(), ["age".to_string(), "disease".to_string()]);
        assert_eq!(meta.samples(), ["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn overlap_reported_on_raw_ids() {
        let a = table("a.metadata.txt", "a", "sample\tage\ns1\t4\ns2\t5\n");
        let b = table("b.metadata.txt", "b", "sample\tage\ns2\t6\ns3\t7\n");
        let c = table("c.metadata.txt", "c", "sample\tage\ns9\t1\n");

        let overlaps = overlapping_samples(&[a, b, c]);
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].dataset_a, "a");
        assert_eq!(overlaps[0].dataset_b, "b");
        assert_eq!(overlaps[0].samples, vec!["s2".to_string()]);
    }

    #[test]
    fn merged_rows_disjoint_after_relabeling() {
        let a = table("a.metadata.txt", "a", "sample\tage\ns1\t4\n");
        let b = table("b.metadata.txt", "b", "sample\tage\ns1\t6\n");

        let mut out = Vec::new();
        write_merged(&[a, b], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = "\
sample\tage\tdataset_id
a--s1\t4\ta
b--s1\t6\tb
";
        assert_eq!(text, expected);
    }

    #[test]
    fn merged_columns_union_in_first_seen_order() {
        let a = table("a.metadata.txt", "a", "sample\tage\tsex\ns1\t4\tF\n");
        let b = table("b.metadata.txt", "b", "sample\tdisease\tage\ns2\tCRC\t9\n");

        let mut out = Vec::new();
        write_merged(&[a, b], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = "\
sample\tage\tsex\tdisease\tdataset_id
a--s1\t4\tF\t\ta
b--s2\t9\t\tCRC\tb
";
        assert_eq!(text, expected);
    }

    #[test]
    fn ragged_rows_name_the_file() {
        let err = parse_metadata_table(
            "bad.metadata.txt",
            "bad",
            "sample\tage\ns1\t4\textra\n".as_bytes(),
        )
        .unwrap_err();
        assert!(format!("{}", err).contains("bad.metadata.txt"));
    }

    #[test]
    fn metadata_files_discovered_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("crc_zhao.metadata.txt"), "sample\tage\n").unwrap();
        fs::write(dir.path().join("ibd_gevers.metadata.txt"), "sample\tage\n")
            .unwrap();
        fs::write(dir.path().join("crc_zhao.map"), "x\ts1:1\n").unwrap();

        let found = find_metadata_files(dir.path()).unwrap();
        let datasets: Vec<&str> =
            found.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(datasets, vec!["crc_zhao", "ibd_gevers"]);
    }
}
