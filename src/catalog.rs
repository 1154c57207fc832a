//! Course catalog loading
//!
//! Catalog exports start with a few banner rows, followed by a header row
//! and one row per course/lesson pair. Columns are addressed by header text.
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::config::CatalogConfig;
use crate::error::CatalogError;

/// One catalog row keyed by header text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    fields: HashMap<String, String>,
}

impl CourseRecord {
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self { fields }
    }

    /// Cell value for a header, if the column exists
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Course identifier, empty when the column is absent
    pub fn course_id(&self, columns: &CatalogConfig) -> &str {
        self.get(&columns.course_id_column).unwrap_or_default()
    }

    /// Lesson identifier, empty when the column is absent
    pub fn lesson_id(&self, columns: &CatalogConfig) -> &str {
        self.get(&columns.lesson_id_column).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Load all course records from a catalog file.
///
/// Fails on the first row whose column count differs from the header's; the
/// whole catalog is rejected rather than the row skipped.
pub fn load_catalog(path: &Path, banner_rows: usize) -> Result<Vec<CourseRecord>, CatalogError> {
    let file = File::open(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    let mut rows = reader.records();

    for row in 1..=banner_rows as u64 {
        match rows.next() {
            Some(Ok(_)) => {}
            Some(Err(source)) => return Err(CatalogError::Csv { row, source }),
            None => return Err(CatalogError::MissingHeader { row }),
        }
    }

    let header_row = banner_rows as u64 + 1;
    let headers: Vec<String> = match rows.next() {
        Some(Ok(record)) => record
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect(),
        Some(Err(source)) => return Err(CatalogError::Csv { row: header_row, source }),
        None => return Err(CatalogError::MissingHeader { row: header_row }),
    };
    debug!("Catalog header: {:?}", headers);

    let mut courses = Vec::new();
    let mut row = header_row;
    for result in rows {
        row += 1;
        let record = result.map_err(|source| CatalogError::Csv { row, source })?;
        // Blank lines are skipped by the reader, so prefer its line number
        if let Some(position) = record.position() {
            row = position.line();
        }

        if record.len() != headers.len() {
            return Err(CatalogError::ColumnCount {
                row,
                expected: headers.len(),
                found: record.len(),
            });
        }

        let fields = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|value| value.trim().to_string()))
            .collect();
        courses.push(CourseRecord::new(fields));
    }

    if courses.is_empty() {
        return Err(CatalogError::Empty);
    }

    info!("📋 Loaded {} course rows from {}", courses.len(), path.display());
    Ok(courses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BANNER: &str = "Lesson export\nSchool: demo\nGenerated 2024-01-01\n";

    fn catalog_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_well_formed_catalog() {
        let file = catalog_file(&format!(
            "{BANNER}课程ID,课节ID,名称\n 101 ,2001,Math\n102,2002, Physics \n"
        ));
        let courses = load_catalog(file.path(), 3).unwrap();
        let columns = CatalogConfig::default();

        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].course_id(&columns), "101");
        assert_eq!(courses[0].lesson_id(&columns), "2001");
        assert_eq!(courses[1].get("名称"), Some("Physics"));
        assert_eq!(courses[1].len(), 3);
    }

    #[test]
    fn test_column_mismatch_reports_row() {
        let file = catalog_file(&format!("{BANNER}课程ID,课节ID\n1,2\n3\n4,5\n"));
        match load_catalog(file.path(), 3) {
            Err(CatalogError::ColumnCount { row, expected, found }) => {
                assert_eq!(row, 6);
                assert_eq!(expected, 2);
                assert_eq!(found, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_header_only_is_empty_catalog() {
        let file = catalog_file(&format!("{BANNER}课程ID,课节ID\n"));
        assert!(matches!(load_catalog(file.path(), 3), Err(CatalogError::Empty)));
    }

    #[test]
    fn test_truncated_banner_is_missing_header() {
        let file = catalog_file("only one line\n");
        assert!(matches!(
            load_catalog(file.path(), 3),
            Err(CatalogError::MissingHeader { row: 2 })
        ));
    }

    #[test]
    fn test_banner_rows_may_have_any_width() {
        let file = catalog_file("a\nb,c,d,e\n\"quoted, banner\"\nid,lesson\n7,8\n");
        let courses = load_catalog(file.path(), 3).unwrap();
        assert_eq!(courses[0].get("id"), Some("7"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_catalog(Path::new("/definitely/not/here.csv"), 3).unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn test_missing_id_column_yields_empty_id() {
        let record = CourseRecord::new(HashMap::from([("other".to_string(), "x".to_string())]));
        assert_eq!(record.course_id(&CatalogConfig::default()), "");
    }
}
