//! Column-oriented tables read from delimited text.
//!
//! A [`Dataset`] is an ordered set of named, equally long columns. Numeric
//! columns store missing values as NaN; categorical columns store a sorted
//! level set plus one optional code per row.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DataError;

/// Tokens treated as missing in input files.
const MISSING_TOKENS: &[&str] = &["NA", "na", "Na", ".", "", "-", "NaN", "nan"];

/// A categorical column: sorted levels and a per-row level index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    levels: Vec<String>,
    codes: Vec<Option<usize>>,
}

impl Factor {
    /// Build a factor from raw values, `None` meaning missing.
    /// Levels are sorted lexicographically.
    pub fn from_values<S: AsRef<str>>(values: &[Option<S>]) -> Self {
        let levels: Vec<String> = values
            .iter()
            .flatten()
            .map(|s| s.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let codes = values
            .iter()
            .map(|v| {
                v.as_ref()
                    .and_then(|s| levels.binary_search_by(|l| l.as_str().cmp(s.as_ref())).ok())
            })
            .collect();
        Self { levels, codes }
    }

    /// Build a factor with no missing values.
    pub fn from_strings<S: AsRef<str>>(values: &[S]) -> Self {
        let wrapped: Vec<Option<&str>> = values.iter().map(|s| Some(s.as_ref())).collect();
        Self::from_values(&wrapped)
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Level index of a row, `None` when missing.
    pub fn code(&self, row: usize) -> Option<usize> {
        self.codes[row]
    }

    /// Level label of a row, `None` when missing.
    pub fn label(&self, row: usize) -> Option<&str> {
        self.codes[row].map(|c| self.levels[c].as_str())
    }

    /// Levels that actually occur, in level order.
    pub fn observed_levels(&self) -> Vec<String> {
        let mut seen = vec![false; self.levels.len()];
        for c in self.codes.iter().flatten() {
            seen[*c] = true;
        }
        self.levels
            .iter()
            .zip(seen)
            .filter_map(|(l, s)| s.then(|| l.clone()))
            .collect()
    }

    fn select(&self, rows: &[usize]) -> Self {
        Self {
            levels: self.levels.clone(),
            codes: rows.iter().map(|&r| self.codes[r]).collect(),
        }
    }
}

/// One column of a [`Dataset`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Factor),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(f) => f.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match self {
            Column::Numeric(v) => v[row].is_nan(),
            Column::Categorical(f) => f.code(row).is_none(),
        }
    }

    /// Cell rendered as text, `NA` when missing.
    pub fn format_cell(&self, row: usize) -> String {
        match self {
            Column::Numeric(v) if v[row].is_nan() => "NA".to_string(),
            Column::Numeric(v) => format!("{}", v[row]),
            Column::Categorical(f) => f.label(row).unwrap_or("NA").to_string(),
        }
    }

    fn select(&self, rows: &[usize]) -> Self {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&r| v[r]).collect()),
            Column::Categorical(f) => Column::Categorical(f.select(rows)),
        }
    }
}

/// An immutable-by-convention table of named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column addition.
    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, DataError> {
        self.push_column(name, column)?;
        Ok(self)
    }

    /// Append a column. The first column fixes the row count.
    pub fn push_column(&mut self, name: &str, column: Column) -> Result<(), DataError> {
        if self.names.iter().any(|n| n == name) {
            return Err(DataError::DuplicateColumn(name.to_string()));
        }
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            return Err(DataError::LengthMismatch {
                name: name.to_string(),
                expected: self.n_rows,
                got: column.len(),
            });
        }
        self.names.push(name.to_string());
        self.columns.push(column);
        Ok(())
    }

    /// Replace an existing column, keeping its position.
    pub fn replace_column(&mut self, name: &str, column: Column) -> Result<(), DataError> {
        let idx = self.index_of(name)?;
        if column.len() != self.n_rows {
            return Err(DataError::LengthMismatch {
                name: name.to_string(),
                expected: self.n_rows,
                got: column.len(),
            });
        }
        self.columns[idx] = column;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    fn index_of(&self, name: &str) -> Result<usize, DataError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<&Column, DataError> {
        Ok(&self.columns[self.index_of(name)?])
    }

    /// Numeric column values (NaN for missing).
    pub fn numeric(&self, name: &str) -> Result<&[f64], DataError> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v),
            Column::Categorical(_) => Err(DataError::ColumnType {
                name: name.to_string(),
                expected: "numeric",
            }),
        }
    }

    pub fn factor(&self, name: &str) -> Result<&Factor, DataError> {
        match self.column(name)? {
            Column::Categorical(f) => Ok(f),
            Column::Numeric(_) => Err(DataError::ColumnType {
                name: name.to_string(),
                expected: "categorical",
            }),
        }
    }

    /// Indices of rows with no missing value in any of `vars`.
    pub fn complete_rows(&self, vars: &[&str]) -> Result<Vec<usize>, DataError> {
        let cols = vars
            .iter()
            .map(|v| self.column(v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..self.n_rows)
            .filter(|&r| cols.iter().all(|c| !c.is_missing(r)))
            .collect())
    }

    /// A new dataset holding only `rows`, in that order.
    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            n_rows: rows.len(),
        }
    }

    /// Render the table as tab-separated text with a header row.
    pub fn to_tsv(&self) -> String {
        let mut out = self.names.join("\t");
        out.push('\n');
        for r in 0..self.n_rows {
            let cells: Vec<String> = self.columns.iter().map(|c| c.format_cell(r)).collect();
            let _ = writeln!(out, "{}", cells.join("\t"));
        }
        out
    }

    /// Write the table as TSV.
    pub fn write_tsv(&self, path: &Path) -> Result<(), DataError> {
        std::fs::write(path, self.to_tsv()).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Options controlling column type inference.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Columns read as categorical even when every value parses as a number.
    pub categorical: Vec<String>,
}

/// Read a delimited text file (tab, comma or whitespace separated).
pub fn read_delimited(path: &Path, options: &ReadOptions) -> Result<Dataset, DataError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let data = parse_delimited(&contents, options)?;
    debug!(
        "Read {} rows x {} columns from {}",
        data.n_rows(),
        data.n_cols(),
        path.display()
    );
    Ok(data)
}

#[derive(Clone, Copy)]
enum Delimiter {
    Tab,
    Comma,
    Whitespace,
}

impl Delimiter {
    fn detect(header: &str) -> Self {
        if header.contains('\t') {
            Delimiter::Tab
        } else if header.contains(',') {
            Delimiter::Comma
        } else {
            Delimiter::Whitespace
        }
    }

    fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self {
            Delimiter::Tab => line.split('\t').map(clean_field).collect(),
            Delimiter::Comma => line.split(',').map(clean_field).collect(),
            Delimiter::Whitespace => line.split_whitespace().map(clean_field).collect(),
        }
    }
}

fn clean_field(s: &str) -> &str {
    s.trim().trim_matches('"')
}

fn is_missing_token(s: &str) -> bool {
    MISSING_TOKENS.contains(&s)
}

/// Parse delimited text held in memory.
pub fn parse_delimited(contents: &str, options: &ReadOptions) -> Result<Dataset, DataError> {
    let mut lines = contents.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header_line) = lines.next().ok_or(DataError::Parse {
        line: 1,
        message: "empty input".to_string(),
    })?;
    let delim = Delimiter::detect(header_line);
    let headers: Vec<String> = delim.split(header_line).into_iter().map(String::from).collect();

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (line_idx, line) in lines {
        let fields = delim.split(line);
        if fields.len() != headers.len() {
            return Err(DataError::Parse {
                line: line_idx + 1,
                message: format!("expected {} fields, found {}", headers.len(), fields.len()),
            });
        }
        for (col, field) in raw.iter_mut().zip(fields) {
            col.push((!is_missing_token(field)).then(|| field.to_string()));
        }
    }

    let mut data = Dataset::new();
    for (name, values) in headers.iter().zip(raw) {
        let force_categorical = options.categorical.iter().any(|c| c == name);
        let parsed: Option<Vec<f64>> = if force_categorical {
            None
        } else {
            values
                .iter()
                .map(|v| match v {
                    None => Some(f64::NAN),
                    Some(s) => s.parse::<f64>().ok(),
                })
                .collect()
        };
        let column = match parsed {
            Some(nums) => Column::Numeric(nums),
            None => Column::Categorical(Factor::from_values(&values)),
        };
        data.push_column(name, column)?;
    }
    Ok(data)
}
