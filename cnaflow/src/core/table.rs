//! Per-cell tables keyed by cell identity.

use crate::errors::CnaflowError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// A typed column of a [`CellTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum Column {
    /// Floating point values.
    Float(Vec<f64>),
    /// Integer values.
    Int(Vec<i64>),
    /// Text values.
    Text(Vec<String>),
}

impl Column {
    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Returns true if the column has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the float values, if this is a float column.
    #[must_use]
    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the integer values, if this is an integer column.
    #[must_use]
    pub fn as_int(&self) -> Option<&[i64]> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Renders one value as text.
    #[must_use]
    pub fn format_value(&self, index: usize) -> String {
        match self {
            Self::Float(v) => v[index].to_string(),
            Self::Int(v) => v[index].to_string(),
            Self::Text(v) => v[index].clone(),
        }
    }

    /// Returns the values at the given row indices, in order.
    #[must_use]
    pub fn take(&self, rows: &[usize]) -> Self {
        match self {
            Self::Float(v) => Self::Float(rows.iter().map(|&r| v[r]).collect()),
            Self::Int(v) => Self::Int(rows.iter().map(|&r| v[r]).collect()),
            Self::Text(v) => Self::Text(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }

    /// Infers the narrowest column type for a set of text values.
    #[must_use]
    pub fn infer(values: Vec<String>) -> Self {
        if let Ok(ints) = values.iter().map(|v| v.parse::<i64>()).collect::<Result<Vec<_>, _>>() {
            return Self::Int(ints);
        }
        if let Ok(floats) = values.iter().map(|v| v.parse::<f64>()).collect::<Result<Vec<_>, _>>() {
            return Self::Float(floats);
        }
        Self::Text(values)
    }
}

/// Cells removed by an inner join because one side lacked them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedCells {
    /// Label of the table the join was performed with.
    pub table: String,
    /// Cells present on the left side only.
    pub missing_right: Vec<String>,
    /// Cells present on the right side only.
    pub missing_left: Vec<String>,
}

impl DroppedCells {
    /// Returns the total number of dropped cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.missing_right.len() + self.missing_left.len()
    }

    /// Returns true if nothing was dropped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// A table with one row per cell and ordered, named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellTable {
    cells: Vec<String>,
    columns: Vec<(String, Column)>,
}

impl CellTable {
    /// Creates a table with no columns.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if a cell identity is repeated.
    pub fn new(cells: Vec<String>) -> Result<Self, CnaflowError> {
        let mut seen = HashSet::with_capacity(cells.len());
        for cell in &cells {
            if !seen.insert(cell.as_str()) {
                return Err(CnaflowError::MalformedInput(format!(
                    "duplicate cell identity '{cell}'"
                )));
            }
        }
        Ok(Self {
            cells,
            columns: Vec::new(),
        })
    }

    /// Adds a column, builder style.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` on a length mismatch or a duplicate name.
    pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Result<Self, CnaflowError> {
        self.push_column(name, column)?;
        Ok(self)
    }

    /// Adds a column.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` on a length mismatch or a duplicate name.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<(), CnaflowError> {
        let name = name.into();
        if column.len() != self.cells.len() {
            return Err(CnaflowError::MalformedInput(format!(
                "column '{name}' has {} values for {} cells",
                column.len(),
                self.cells.len()
            )));
        }
        if self.column(&name).is_some() {
            return Err(CnaflowError::MalformedInput(format!(
                "duplicate column '{name}'"
            )));
        }
        self.columns.push((name, column));
        Ok(())
    }

    /// Returns the cell identities.
    #[must_use]
    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the column names in order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, column)| column)
    }

    /// Keeps the given rows, in order.
    #[must_use]
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            cells: rows.iter().map(|&r| self.cells[r].clone()).collect(),
            columns: self
                .columns
                .iter()
                .map(|(name, column)| (name.clone(), column.take(rows)))
                .collect(),
        }
    }

    /// Inner-joins another table on cell identity.
    ///
    /// Row order follows `self`. Columns of `other` whose names already exist
    /// are suffixed with `.{label}`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if a suffixed column name still collides.
    pub fn inner_join(&self, other: &Self, label: &str) -> Result<(Self, DroppedCells), CnaflowError> {
        let other_index: HashMap<&str, usize> = other
            .cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut left_rows = Vec::new();
        let mut right_rows = Vec::new();
        let mut missing_right = Vec::new();
        for (i, cell) in self.cells.iter().enumerate() {
            match other_index.get(cell.as_str()) {
                Some(&j) => {
                    left_rows.push(i);
                    right_rows.push(j);
                }
                None => missing_right.push(cell.clone()),
            }
        }
        let own: HashSet<&str> = self.cells.iter().map(String::as_str).collect();
        let missing_left = other
            .cells
            .iter()
            .filter(|c| !own.contains(c.as_str()))
            .cloned()
            .collect();

        let mut joined = self.take_rows(&left_rows);
        for (name, column) in &other.columns {
            let name = if joined.column(name).is_some() {
                format!("{name}.{label}")
            } else {
                name.clone()
            };
            joined.push_column(name, column.take(&right_rows))?;
        }

        Ok((
            joined,
            DroppedCells {
                table: label.to_string(),
                missing_right,
                missing_left,
            },
        ))
    }

    /// Renders the table as tab-separated text with a `cell` header column.
    #[must_use]
    pub fn to_tsv(&self) -> String {
        let mut out = String::from("cell");
        for (name, _) in &self.columns {
            out.push('\t');
            out.push_str(name);
        }
        out.push('\n');
        for (row, cell) in self.cells.iter().enumerate() {
            out.push_str(cell);
            for (_, column) in &self.columns {
                let _ = write!(out, "\t{}", column.format_value(row));
            }
            out.push('\n');
        }
        out
    }

    /// Parses tab-separated text whose first column holds cell identities.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` on ragged rows or an empty document.
    pub fn from_tsv(text: &str) -> Result<Self, CnaflowError> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| CnaflowError::MalformedInput("empty table".into()))?;
        let names: Vec<&str> = header.split('\t').skip(1).collect();

        let mut cells = Vec::new();
        let mut raw: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for (line_no, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != names.len() + 1 {
                return Err(CnaflowError::MalformedInput(format!(
                    "line {} has {} fields, expected {}",
                    line_no + 2,
                    fields.len(),
                    names.len() + 1
                )));
            }
            cells.push(fields[0].to_string());
            for (values, field) in raw.iter_mut().zip(&fields[1..]) {
                values.push((*field).to_string());
            }
        }

        let mut table = Self::new(cells)?;
        for (name, values) in names.into_iter().zip(raw) {
            table.push_column(name, Column::infer(values))?;
        }
        Ok(table)
    }
}
