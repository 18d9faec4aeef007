//! Core domain model types for cnaflow.
//!
//! This module contains the data flowing between stages:
//! - Labelled expression matrices, with and without genomic loci
//! - Per-cell tables with inner-join support
//! - Stage payloads and resolver marks

mod data;
mod matrix;
mod status;
mod table;

pub use data::{CoreCells, Reduction, StageData};
pub use matrix::{chrom_rank, ExpressionMatrix, GenomicMatrix, Locus};
pub use status::{StageMark, StageOutcome};
pub use table::{CellTable, Column, DroppedCells};
