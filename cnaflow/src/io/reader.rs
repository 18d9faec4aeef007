//! Tab-separated readers for counts, gene coordinates and cell metadata.

use crate::core::{CellTable, ExpressionMatrix, Locus};
use crate::errors::CnaflowError;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Gene name to genomic locus.
pub type GeneCoordinates = HashMap<String, Locus>;

/// Reads raw count matrices.
pub trait RawReader: Send + Sync {
    /// Reads one or more gene-by-cell matrices and combines them column-wise.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` on structurally invalid input.
    fn read(&self, paths: &[PathBuf]) -> Result<ExpressionMatrix, CnaflowError>;
}

/// Reads gene-by-cell TSV matrices: a header of cell ids, then one row per
/// gene whose first field is the gene name.
#[derive(Debug, Clone, Copy, Default)]
pub struct TsvMatrixReader;

impl RawReader for TsvMatrixReader {
    fn read(&self, paths: &[PathBuf]) -> Result<ExpressionMatrix, CnaflowError> {
        if paths.is_empty() {
            return Err(CnaflowError::MalformedInput("no count matrices given".into()));
        }
        let matrices = paths
            .iter()
            .map(|path| {
                let text = read_text(path)?;
                parse_matrix(&text).map_err(|e| with_path(e, path))
            })
            .collect::<Result<Vec<_>, _>>()?;
        combine_columns(matrices)
    }
}

fn read_text(path: &Path) -> Result<String, CnaflowError> {
    std::fs::read_to_string(path).map_err(|e| {
        CnaflowError::MalformedInput(format!("cannot read {}: {e}", path.display()))
    })
}

fn with_path(err: CnaflowError, path: &Path) -> CnaflowError {
    match err {
        CnaflowError::MalformedInput(msg) => {
            CnaflowError::MalformedInput(format!("{}: {msg}", path.display()))
        }
        other => other,
    }
}

fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
}

/// Parses one gene-by-cell matrix.
pub fn parse_matrix(text: &str) -> Result<ExpressionMatrix, CnaflowError> {
    let mut lines = data_lines(text);
    let (_, header) = lines
        .next()
        .ok_or_else(|| CnaflowError::MalformedInput("empty matrix".into()))?;
    let cells: Vec<String> = header.split('\t').skip(1).map(str::to_string).collect();
    if cells.is_empty() {
        return Err(CnaflowError::MalformedInput("matrix header names no cells".into()));
    }

    let mut genes = Vec::new();
    let mut values = Vec::new();
    let mut seen = HashSet::new();
    for (line_no, line) in lines {
        let mut fields = line.split('\t');
        let gene = fields.next().unwrap_or_default().to_string();
        if !seen.insert(gene.clone()) {
            return Err(CnaflowError::MalformedInput(format!(
                "line {line_no}: duplicate gene '{gene}'"
            )));
        }
        let before = values.len();
        for field in fields {
            let value: f64 = field.trim().parse().map_err(|_| {
                CnaflowError::MalformedInput(format!("line {line_no}: '{field}' is not a number"))
            })?;
            if !value.is_finite() || value < 0.0 {
                return Err(CnaflowError::MalformedInput(format!(
                    "line {line_no}: count {value} is not a finite non-negative number"
                )));
            }
            values.push(value);
        }
        if values.len() - before != cells.len() {
            return Err(CnaflowError::MalformedInput(format!(
                "line {line_no}: {} values for {} cells",
                values.len() - before,
                cells.len()
            )));
        }
        genes.push(gene);
    }
    ExpressionMatrix::new(genes, cells, values)
}

/// Combines matrices column-wise on the genes they all share, keeping the
/// gene order of the first.
pub fn combine_columns(mut matrices: Vec<ExpressionMatrix>) -> Result<ExpressionMatrix, CnaflowError> {
    if matrices.len() == 1 {
        return Ok(matrices.remove(0));
    }
    let mut cells = Vec::new();
    let mut seen_cells = HashSet::new();
    for m in &matrices {
        for cell in m.col_names() {
            if !seen_cells.insert(cell.as_str()) {
                return Err(CnaflowError::MalformedInput(format!(
                    "cell '{cell}' appears in more than one matrix"
                )));
            }
            cells.push(cell.clone());
        }
    }

    let indices: Vec<HashMap<&str, usize>> = matrices
        .iter()
        .map(|m| {
            m.row_names()
                .iter()
                .enumerate()
                .map(|(i, g)| (g.as_str(), i))
                .collect()
        })
        .collect();
    let first = matrices
        .first()
        .ok_or_else(|| CnaflowError::MalformedInput("no count matrices given".into()))?;
    let genes: Vec<String> = first
        .row_names()
        .iter()
        .filter(|g| indices.iter().all(|idx| idx.contains_key(g.as_str())))
        .cloned()
        .collect();
    if genes.is_empty() {
        return Err(CnaflowError::MalformedInput("matrices share no genes".into()));
    }

    let mut values = Vec::with_capacity(genes.len() * cells.len());
    for gene in &genes {
        for (m, idx) in matrices.iter().zip(&indices) {
            values.extend_from_slice(m.row(idx[gene.as_str()]));
        }
    }
    ExpressionMatrix::new(genes, cells, values)
}

/// Parses a `gene chrom start end` table. A header line is skipped when its
/// start field is not numeric.
pub fn parse_coordinates(text: &str) -> Result<GeneCoordinates, CnaflowError> {
    let mut coords = GeneCoordinates::new();
    for (index, (line_no, line)) in data_lines(text).enumerate() {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() < 4 {
            return Err(CnaflowError::MalformedInput(format!(
                "line {line_no}: expected gene, chrom, start, end"
            )));
        }
        let (Ok(start), Ok(end)) = (fields[2].parse::<u64>(), fields[3].parse::<u64>()) else {
            if index == 0 {
                continue;
            }
            return Err(CnaflowError::MalformedInput(format!(
                "line {line_no}: bad coordinates '{}' '{}'",
                fields[2], fields[3]
            )));
        };
        if end < start {
            return Err(CnaflowError::MalformedInput(format!(
                "line {line_no}: end {end} before start {start}"
            )));
        }
        coords.insert(fields[0].to_string(), Locus::new(fields[1], start, end));
    }
    Ok(coords)
}

/// Reads a gene coordinate file.
pub fn read_coordinates(path: &Path) -> Result<GeneCoordinates, CnaflowError> {
    parse_coordinates(&read_text(path)?).map_err(|e| with_path(e, path))
}

/// Reads a per-cell metadata table whose first column holds cell ids.
pub fn read_metadata(path: &Path) -> Result<CellTable, CnaflowError> {
    CellTable::from_tsv(&read_text(path)?).map_err(|e| with_path(e, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_matrix() {
        let m = parse_matrix("gene\tc1\tc2\nA\t1\t0\nB\t2\t5\n").unwrap();
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.col_names(), &["c1".to_string(), "c2".to_string()]);
        assert_eq!(m.row(1), &[2.0, 5.0]);
    }

    #[test]
    fn test_ragged_matrix_is_malformed() {
        let err = parse_matrix("gene\tc1\tc2\nA\t1\n").unwrap_err();
        assert!(matches!(err, CnaflowError::MalformedInput(_)));
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_non_numeric_and_negative_rejected() {
        assert!(parse_matrix("g\tc1\nA\tx\n").is_err());
        assert!(parse_matrix("g\tc1\nA\t-1\n").is_err());
        assert!(parse_matrix("g\tc1\nA\t1\nA\t2\n").is_err());
    }

    #[test]
    fn test_combine_on_shared_genes() {
        let a = parse_matrix("g\tc1\nA\t1\nB\t2\nC\t3\n").unwrap();
        let b = parse_matrix("g\tc2\nC\t30\nA\t10\n").unwrap();
        let m = combine_columns(vec![a, b]).unwrap();

        assert_eq!(m.row_names(), &["A".to_string(), "C".to_string()]);
        assert_eq!(m.row(0), &[1.0, 10.0]);
        assert_eq!(m.row(1), &[3.0, 30.0]);
    }

    #[test]
    fn test_combine_rejects_repeated_cells() {
        let a = parse_matrix("g\tc1\nA\t1\n").unwrap();
        let b = parse_matrix("g\tc1\nA\t2\n").unwrap();
        assert!(combine_columns(vec![a, b]).is_err());
    }

    #[test]
    fn test_coordinates_with_header() {
        let coords = parse_coordinates("gene\tchrom\tstart\tend\nA\tchr1\t100\t200\n").unwrap();
        assert_eq!(coords["A"], Locus::new("chr1", 100, 200));
        assert!(parse_coordinates("A\tchr1\t100\t200\nB\tchr1\tx\t1\n").is_err());
    }

    #[test]
    fn test_reader_reads_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "gene\tc1\nA\t4\n").unwrap();
        let m = TsvMatrixReader.read(&[file.path().to_path_buf()]).unwrap();
        assert_eq!(m.get(0, 0), 4.0);
    }
}
