//! Delimited-text table reader.
//!
//! Both workload tables share one format: a required header row, then
//! one record per line. A field may be wrapped in double quotes, in
//! which case commas inside the quoted region are literal. Fields are
//! trimmed of surrounding whitespace after unquoting. Blank lines are
//! skipped. An empty header row is fatal, as is any row whose field
//! count differs from the header's.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, SimError};

/// A parsed table: header names plus rows of fields, with by-name
/// column access.
#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    columns: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Read and parse a table file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SimError::Workload(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| SimError::Workload(format!("{}: {}", path.display(), e)))
    }

    /// Parse table content. Errors are returned as bare messages; the
    /// file-path context is attached by [`Table::from_file`].
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut lines = content.lines();

        let header_line = lines.next().ok_or_else(|| "file is empty".to_string())?;
        let headers = split_line(header_line);
        if headers.iter().all(|h| h.is_empty()) {
            return Err("empty header row".to_string());
        }

        let mut columns = HashMap::new();
        for (idx, name) in headers.iter().enumerate() {
            columns.insert(name.clone(), idx);
        }

        let mut rows = Vec::new();
        for (offset, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_line(line);
            if fields.len() != headers.len() {
                return Err(format!(
                    "line {} has {} fields but header has {}",
                    offset + 2,
                    fields.len(),
                    headers.len()
                ));
            }
            rows.push(fields);
        }

        Ok(Self {
            headers,
            columns,
            rows,
        })
    }

    /// Header names in declaration order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fetch a field by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> std::result::Result<&str, String> {
        let col = self
            .columns
            .get(column)
            .ok_or_else(|| format!("missing column '{}'", column))?;
        Ok(self.rows[row][*col].as_str())
    }
}

/// Split one line into trimmed, unquoted fields. A double quote toggles
/// quoted mode; commas inside a quoted region are part of the field.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());

    fields
}
