//! Row reader
//!
//! Materializes CSV files, uploaded streams and spreadsheet tabs into an
//! ordered list of rows keyed by normalized header.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use super::normalize::{normalize_countries, normalize_key};
use crate::core::config::SheetLocator;
use crate::sync::SheetsClient;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("input unavailable: {0}")]
    InputUnavailable(String),
}

/// Where the rows of a run come from
pub enum RowSource<'a> {
    Path(PathBuf),
    Stream(Box<dyn Read + 'a>),
    Sheet {
        client: &'a dyn SheetsClient,
        locator: SheetLocator,
    },
}

/// One input row: normalized header to trimmed cell value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    index: usize,
    values: BTreeMap<String, String>,
}

impl Row {
    pub fn new(index: usize, values: BTreeMap<String, String>) -> Self {
        Self { index, values }
    }

    /// Build a row from raw header/value pairs
    pub fn from_pairs<K: AsRef<str>, V: AsRef<str>>(
        index: usize,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (normalize_key(k.as_ref()), v.as_ref().trim().to_string()))
            .collect();
        Self { index, values }
    }

    /// Zero-based position in the input
    pub fn index(&self) -> usize {
        self.index
    }

    /// Non-empty value of a column
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Value of a column, empty when missing
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Every value lowercased, except `countries`, which is upper-cased with
    /// `;` read as `,`
    pub fn folded(&self) -> Self {
        let values = self
            .values
            .iter()
            .map(|(k, v)| {
                let v = if k == "countries" {
                    normalize_countries(v)
                } else {
                    v.to_lowercase()
                };
                (k.clone(), v)
            })
            .collect();
        Self {
            index: self.index,
            values,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(normalize_key(key), value.into());
    }

    /// Columns present in the row
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

/// Read every row of a source
pub fn read_rows(source: RowSource<'_>) -> Result<Vec<Row>, ReadError> {
    let rows = match source {
        RowSource::Path(path) => read_path(&path)?,
        RowSource::Stream(stream) => read_csv(stream, "input stream")?,
        RowSource::Sheet { client, locator } => {
            let grid = client
                .read_tab(&locator.sheet_id, &locator.input_tab_id)
                .map_err(|e| {
                    ReadError::InputUnavailable(format!(
                        "sheet {} tab {}: {}",
                        locator.sheet_id, locator.input_tab_id, e
                    ))
                })?;
            rows_from_grid(grid)
        }
    };
    info!(rows = rows.len(), "input rows read");
    Ok(rows)
}

fn read_path(path: &Path) -> Result<Vec<Row>, ReadError> {
    let file = File::open(path)
        .map_err(|e| ReadError::InputUnavailable(format!("{}: {}", path.display(), e)))?;
    read_csv(file, &path.display().to_string())
}

fn read_csv(reader: impl Read, label: &str) -> Result<Vec<Row>, ReadError> {
    let mut csv = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: Vec<String> = csv
        .headers()
        .map_err(|e| ReadError::InputUnavailable(format!("{}: {}", label, e)))?
        .iter()
        .map(|h| normalize_key(h.trim_start_matches('\u{feff}')))
        .collect();
    debug!(columns = headers.len(), source = label, "csv header read");

    let mut rows = Vec::new();
    for (index, record) in csv.records().enumerate() {
        let record =
            record.map_err(|e| ReadError::InputUnavailable(format!("{}: {}", label, e)))?;
        let values = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty())
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push(Row::new(index, values));
    }
    Ok(rows)
}

/// Turn a header-first cell grid into rows; short rows are padded
fn rows_from_grid(grid: Vec<Vec<String>>) -> Vec<Row> {
    let mut lines = grid.into_iter();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header.iter().map(|h| normalize_key(h)).collect();
    lines
        .filter(|cells| cells.iter().any(|c| !c.trim().is_empty()))
        .enumerate()
        .map(|(index, cells)| {
            let values = headers
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(i, h)| {
                    let cell = cells.get(i).map(|c| c.trim()).unwrap_or("");
                    (h.clone(), cell.to_string())
                })
                .collect();
            Row::new(index, values)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncError;
    use std::io::Cursor;
    use tempfile::tempdir;

    struct StubSheets(Vec<Vec<String>>);

    impl SheetsClient for StubSheets {
        fn read_tab(&self, _sheet_id: &str, _tab_id: &str) -> crate::sync::Result<Vec<Vec<String>>> {
            if self.0.is_empty() {
                return Err(SyncError::Decode("bad payload".to_string()));
            }
            Ok(self.0.clone())
        }
    }

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_headers_are_normalized() {
        let input = "Title, Course Pacing ,Number\nIntro Bio, instructor-paced ,BIO101\n";
        let rows = read_rows(RowSource::Stream(Box::new(Cursor::new(input)))).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("course_pacing"), Some("instructor-paced"));
        assert_eq!(rows[0].get("number"), Some("BIO101"));
        assert_eq!(rows[0].index(), 0);
    }

    #[test]
    fn test_empty_csv_has_no_rows() {
        let rows = read_rows(RowSource::Stream(Box::new(Cursor::new("title,number\n")))).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let tmp = tempdir().unwrap();
        let err = read_rows(RowSource::Path(tmp.path().join("nope.csv"))).unwrap_err();
        assert!(matches!(err, ReadError::InputUnavailable(_)));
    }

    #[test]
    fn test_short_records_are_padded() {
        let rows =
            read_rows(RowSource::Stream(Box::new(Cursor::new("a,b,c\n1,2\n")))).unwrap();
        assert_eq!(rows[0].get("b"), Some("2"));
        assert_eq!(rows[0].get("c"), None);
        assert_eq!(rows[0].value("c"), "");
    }

    #[test]
    fn test_sheet_rows() {
        let client = StubSheets(grid(&[
            &["UUID", "Product Type", "Countries"],
            &["abc", "Course", "us;ca"],
            &["", "", ""],
            &["def"],
        ]));
        let rows = read_rows(RowSource::Sheet {
            client: &client,
            locator: SheetLocator {
                sheet_id: "s".to_string(),
                input_tab_id: "0".to_string(),
            },
        })
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("uuid"), Some("def"));

        let folded = rows[0].folded();
        assert_eq!(folded.get("product_type"), Some("course"));
        assert_eq!(folded.get("countries"), Some("US,CA"));
    }

    #[test]
    fn test_malformed_sheet_is_unavailable() {
        let client = StubSheets(Vec::new());
        let err = read_rows(RowSource::Sheet {
            client: &client,
            locator: SheetLocator {
                sheet_id: "s".to_string(),
                input_tab_id: "0".to_string(),
            },
        })
        .unwrap_err();
        assert!(matches!(err, ReadError::InputUnavailable(_)));
    }
}
