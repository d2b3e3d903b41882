//! Tab-separated input tables: one header row of feature labels, then one row per
//! sample with a numeric cell for every feature.

use ndarray::Array2;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug)]
pub struct Table {
    pub labels: Vec<String>,
    pub values: Array2<f64>,
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to read '{}': {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("'{}' has an empty header row; every column needs a label", path.display())]
    NoColumns { path: PathBuf },
    #[error("'{}' contains a header but no data rows", path.display())]
    NoRows { path: PathBuf },
    #[error(
        "'{}' row {row}, column '{column}' holds '{value}', which is not a number",
        path.display()
    )]
    NonNumeric {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
}

pub fn load_table(path: &Path) -> Result<Table, TableError> {
    let csv_error = |source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_error)?;

    let labels: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();
    if labels.is_empty() || labels.iter().all(String::is_empty) {
        return Err(TableError::NoColumns {
            path: path.to_path_buf(),
        });
    }

    let mut cells = Vec::new();
    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        for (column, field) in record.iter().enumerate() {
            let value = field.parse::<f64>().map_err(|_| TableError::NonNumeric {
                path: path.to_path_buf(),
                row: rows + 1,
                column: labels[column].clone(),
                value: field.to_string(),
            })?;
            cells.push(value);
        }
        rows += 1;
    }
    if rows == 0 {
        return Err(TableError::NoRows {
            path: path.to_path_buf(),
        });
    }

    let values = Array2::from_shape_vec((rows, labels.len()), cells).map_err(|_| {
        TableError::NoColumns {
            path: path.to_path_buf(),
        }
    })?;
    Ok(Table { labels, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_tsv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        write!(file, "{content}")?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn header_becomes_labels() {
        let file = create_test_tsv("chins\tsitups\tjumps\n5\t162\t60\n2\t110\t60\n").unwrap();
        let table = load_table(file.path()).unwrap();
        assert_eq!(table.labels, vec!["chins", "situps", "jumps"]);
        assert_eq!(table.values.dim(), (2, 3));
        assert_eq!(table.values[(1, 1)], 110.0);
    }

    #[test]
    fn non_numeric_cells_are_located() {
        let file = create_test_tsv("a\tb\n1.0\t2.0\n3.0\tNA\n").unwrap();
        match load_table(file.path()).unwrap_err() {
            TableError::NonNumeric {
                row, column, value, ..
            } => {
                assert_eq!(row, 2);
                assert_eq!(column, "b");
                assert_eq!(value, "NA");
            }
            other => panic!("expected a non-numeric cell error, got {other:?}"),
        }
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let file = create_test_tsv("a\tb\n1.0\t2.0\n3.0\n").unwrap();
        assert!(matches!(
            load_table(file.path()).unwrap_err(),
            TableError::Csv { .. }
        ));
    }

    #[test]
    fn header_only_files_have_no_rows() {
        let file = create_test_tsv("a\tb\n").unwrap();
        assert!(matches!(
            load_table(file.path()).unwrap_err(),
            TableError::NoRows { .. }
        ));
    }
}
