//! Expression-driven genomic binning.
//!
//! Consecutive genes of one chromosome are summed into a bin until the bin's
//! mean expression across cells reaches the target. A trailing bin that never
//! reaches it is folded into the previous bin of the same chromosome.

use super::mean;
use crate::core::{ExpressionMatrix, GenomicMatrix, Locus};
use crate::errors::CnaflowError;
use rayon::prelude::*;
use std::ops::Range;

const STAGE: &str = "bin";

struct Bin {
    locus: Locus,
    values: Vec<f64>,
}

fn bin_chromosome(input: &GenomicMatrix, rows: Range<usize>, target_mean: f64) -> Vec<Bin> {
    let matrix = input.matrix();
    let loci = input.loci();
    let mut bins: Vec<Bin> = Vec::new();
    let mut acc = vec![0.0; matrix.n_cols()];
    let mut open: Option<usize> = None;

    for i in rows.clone() {
        for (a, v) in acc.iter_mut().zip(matrix.row(i)) {
            *a += v;
        }
        let first = *open.get_or_insert(i);
        if mean(&acc) >= target_mean {
            bins.push(Bin {
                locus: Locus::new(loci[first].chrom.clone(), loci[first].start, loci[i].end),
                values: std::mem::replace(&mut acc, vec![0.0; matrix.n_cols()]),
            });
            open = None;
        }
    }

    if let Some(first) = open {
        let end = loci[rows.end - 1].end;
        match bins.last_mut() {
            Some(last) => {
                for (a, v) in last.values.iter_mut().zip(&acc) {
                    *a += v;
                }
                last.locus.end = end;
            }
            None => bins.push(Bin {
                locus: Locus::new(loci[first].chrom.clone(), loci[first].start, end),
                values: acc,
            }),
        }
    }
    bins
}

/// Bins genes per chromosome. Chromosomes are processed in parallel on the
/// current rayon pool.
pub fn bin_by_expression(input: &GenomicMatrix, target_mean: f64) -> Result<GenomicMatrix, CnaflowError> {
    if !(target_mean.is_finite() && target_mean > 0.0) {
        return Err(CnaflowError::transform(STAGE, format!("invalid target mean {target_mean}")));
    }
    if input.matrix().n_rows() == 0 {
        return Err(CnaflowError::transform(STAGE, "no genes to bin"));
    }

    let per_chrom: Vec<Vec<Bin>> = input
        .chromosome_ranges()
        .into_par_iter()
        .map(|rows| bin_chromosome(input, rows, target_mean))
        .collect();

    let bins: Vec<Bin> = per_chrom.into_iter().flatten().collect();
    let names = bins.iter().map(|b| b.locus.to_string()).collect();
    let mut values = Vec::with_capacity(bins.len() * input.matrix().n_cols());
    let mut loci = Vec::with_capacity(bins.len());
    for bin in bins {
        values.extend(bin.values);
        loci.push(bin.locus);
    }
    let matrix = ExpressionMatrix::new(names, input.cells().to_vec(), values)?;
    GenomicMatrix::new(matrix, loci)
}
