//! Labelled dense matrices.

use crate::errors::CnaflowError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A dense, labelled, row-major matrix of expression values.
///
/// Rows are features (genes, or genomic bins after binning) and columns are
/// cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionMatrix {
    row_names: Vec<String>,
    col_names: Vec<String>,
    values: Vec<f64>,
}

impl ExpressionMatrix {
    /// Creates a matrix from labels and row-major values.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the value count does not match the labels.
    pub fn new(
        row_names: Vec<String>,
        col_names: Vec<String>,
        values: Vec<f64>,
    ) -> Result<Self, CnaflowError> {
        if values.len() != row_names.len() * col_names.len() {
            return Err(CnaflowError::MalformedInput(format!(
                "matrix has {} values but {} rows x {} columns",
                values.len(),
                row_names.len(),
                col_names.len()
            )));
        }
        Ok(Self {
            row_names,
            col_names,
            values,
        })
    }

    /// Builds a matrix from one value vector per row.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if a row has the wrong length.
    pub fn from_rows(
        row_names: Vec<String>,
        col_names: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, CnaflowError> {
        let n_cols = col_names.len();
        let mut values = Vec::with_capacity(rows.len() * n_cols);
        for (name, row) in row_names.iter().zip(&rows) {
            if row.len() != n_cols {
                return Err(CnaflowError::MalformedInput(format!(
                    "row '{name}' has {} values, expected {n_cols}",
                    row.len()
                )));
            }
            values.extend_from_slice(row);
        }
        Self::new(row_names, col_names, values)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.row_names.len()
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.col_names.len()
    }

    /// Returns the row labels.
    #[must_use]
    pub fn row_names(&self) -> &[String] {
        &self.row_names
    }

    /// Returns the column (cell) labels.
    #[must_use]
    pub fn col_names(&self) -> &[String] {
        &self.col_names
    }

    /// Returns the raw row-major values.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns one row.
    #[must_use]
    pub fn row(&self, index: usize) -> &[f64] {
        let n = self.n_cols();
        &self.values[index * n..(index + 1) * n]
    }

    /// Returns the value at a row and column.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.n_cols() + col]
    }

    /// Iterates over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on zero; an empty column set yields no values anyway
        self.values.chunks_exact(self.n_cols().max(1))
    }

    /// Returns one column as an owned vector.
    #[must_use]
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.n_rows()).map(|row| self.get(row, col)).collect()
    }

    /// Sums every column.
    #[must_use]
    pub fn column_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_cols()];
        for row in self.rows() {
            for (sum, value) in sums.iter_mut().zip(row) {
                *sum += value;
            }
        }
        sums
    }

    /// Returns the mean of each row.
    #[must_use]
    pub fn row_means(&self) -> Vec<f64> {
        let n = self.n_cols().max(1) as f64;
        self.rows().map(|row| row.iter().sum::<f64>() / n).collect()
    }

    /// Keeps the given rows, in the given order.
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut values = Vec::with_capacity(rows.len() * self.n_cols());
        for &row in rows {
            values.extend_from_slice(self.row(row));
        }
        Self {
            row_names: rows.iter().map(|&r| self.row_names[r].clone()).collect(),
            col_names: self.col_names.clone(),
            values,
        }
    }

    /// Keeps the given columns, in the given order.
    #[must_use]
    pub fn select_columns(&self, cols: &[usize]) -> Self {
        let mut values = Vec::with_capacity(self.n_rows() * cols.len());
        for row in self.rows() {
            values.extend(cols.iter().map(|&c| row[c]));
        }
        Self {
            row_names: self.row_names.clone(),
            col_names: cols.iter().map(|&c| self.col_names[c].clone()).collect(),
            values,
        }
    }

    /// Returns true if every value is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Applies a function to every value in place.
    pub fn map_in_place(&mut self, f: impl Fn(f64) -> f64) {
        for value in &mut self.values {
            *value = f(*value);
        }
    }

    /// Consumes the matrix and returns its parts.
    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Vec<String>, Vec<f64>) {
        (self.row_names, self.col_names, self.values)
    }
}

/// A genomic interval covered by one matrix row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locus {
    /// Chromosome name as given in the coordinate table.
    pub chrom: String,
    /// Start position.
    pub start: u64,
    /// End position.
    pub end: u64,
}

impl Locus {
    /// Creates a new locus.
    #[must_use]
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    /// Orders loci by chromosome rank, then start.
    #[must_use]
    pub fn genome_order(&self, other: &Self) -> Ordering {
        chrom_rank(&self.chrom)
            .cmp(&chrom_rank(&other.chrom))
            .then_with(|| self.start.cmp(&other.start))
            .then_with(|| self.end.cmp(&other.end))
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

/// Sort rank of a chromosome name: autosomes numerically, then X, Y, MT,
/// then anything else by name.
#[must_use]
pub fn chrom_rank(chrom: &str) -> (u32, String) {
    let bare = chrom
        .strip_prefix("chr")
        .or_else(|| chrom.strip_prefix("Chr"))
        .unwrap_or(chrom);
    if let Ok(n) = bare.parse::<u32>() {
        return (n, String::new());
    }
    match bare {
        "X" | "x" => (1_000, String::new()),
        "Y" | "y" => (1_001, String::new()),
        "M" | "MT" | "m" | "mt" => (1_002, String::new()),
        other => (1_003, other.to_string()),
    }
}

/// An expression matrix whose rows carry genomic coordinates.
///
/// Rows are kept sorted in genome order; consecutive rows on the same
/// chromosome are neighbours for binning and smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomicMatrix {
    matrix: ExpressionMatrix,
    loci: Vec<Locus>,
}

impl GenomicMatrix {
    /// Creates a genomic matrix.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the locus count differs from the row count.
    pub fn new(matrix: ExpressionMatrix, loci: Vec<Locus>) -> Result<Self, CnaflowError> {
        if loci.len() != matrix.n_rows() {
            return Err(CnaflowError::MalformedInput(format!(
                "{} loci for {} rows",
                loci.len(),
                matrix.n_rows()
            )));
        }
        Ok(Self { matrix, loci })
    }

    /// Returns the underlying matrix.
    #[must_use]
    pub fn matrix(&self) -> &ExpressionMatrix {
        &self.matrix
    }

    /// Returns the row loci.
    #[must_use]
    pub fn loci(&self) -> &[Locus] {
        &self.loci
    }

    /// Returns the cell labels.
    #[must_use]
    pub fn cells(&self) -> &[String] {
        self.matrix.col_names()
    }

    /// Returns contiguous row ranges, one per chromosome, in row order.
    #[must_use]
    pub fn chromosome_ranges(&self) -> Vec<std::ops::Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;
        for i in 1..=self.loci.len() {
            if i == self.loci.len() || self.loci[i].chrom != self.loci[start].chrom {
                if start < i {
                    ranges.push(start..i);
                }
                start = i;
            }
        }
        ranges
    }

    /// Keeps the given rows, in the given order.
    #[must_use]
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            matrix: self.matrix.select_rows(rows),
            loci: rows.iter().map(|&r| self.loci[r].clone()).collect(),
        }
    }

    /// Consumes the value and returns the matrix and loci.
    #[must_use]
    pub fn into_parts(self) -> (ExpressionMatrix, Vec<Locus>) {
        (self.matrix, self.loci)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn test_matrix_dimension_check() {
        let result = ExpressionMatrix::new(names("g", 2), names("c", 3), vec![0.0; 5]);
        assert!(matches!(result, Err(CnaflowError::MalformedInput(_))));
    }

    #[test]
    fn test_column_sums_and_selection() {
        let m = ExpressionMatrix::from_rows(
            names("g", 2),
            names("c", 3),
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap();

        assert_eq!(m.column_sums(), vec![5.0, 7.0, 9.0]);
        assert_eq!(m.row_means(), vec![2.0, 5.0]);

        let cols = m.select_columns(&[2, 0]);
        assert_eq!(cols.col_names(), &["c2".to_string(), "c0".to_string()]);
        assert_eq!(cols.row(1), &[6.0, 4.0]);

        let rows = m.select_rows(&[1]);
        assert_eq!(rows.n_rows(), 1);
        assert_eq!(rows.row(0), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_chrom_rank_ordering() {
        let mut chroms = vec!["chrX", "chr10", "2", "chrMT", "chr1", "GL000", "Y"];
        chroms.sort_by_key(|c| chrom_rank(c));
        assert_eq!(chroms, vec!["chr1", "2", "chr10", "chrX", "Y", "chrMT", "GL000"]);
    }

    #[test]
    fn test_chromosome_ranges() {
        let m = ExpressionMatrix::new(names("g", 4), names("c", 1), vec![1.0; 4]).unwrap();
        let loci = vec![
            Locus::new("1", 10, 20),
            Locus::new("1", 30, 40),
            Locus::new("2", 5, 6),
            Locus::new("X", 1, 2),
        ];
        let g = GenomicMatrix::new(m, loci).unwrap();
        assert_eq!(g.chromosome_ranges(), vec![0..2, 2..3, 3..4]);
    }
}
