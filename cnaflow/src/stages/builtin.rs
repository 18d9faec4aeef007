//! The built-in CNA stages.
//!
//! Each stage wraps one function from [`crate::transforms`] and declares the
//! parameters that belong in its cache key. Parameters that do not change the
//! output (worker count, rendering, output paths) never appear in a key.

use super::{Stage, StageInputs};
use crate::cache::KeySegment;
use crate::context::{CellCycleBranch, OutlierFilter, RunConfig, RunContext};
use crate::core::StageData;
use crate::errors::CnaflowError;
use crate::render::Chart;
use crate::transforms;
use sha2::{Digest, Sha256};
use std::io::Write as _;
use std::path::Path;
use tempfile::NamedTempFile;

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CnaflowError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Short digest of the cell-cycle marker list, so editing the list
/// invalidates the QC artifact.
fn gene_list_digest(genes: &[String]) -> String {
    let mut hasher = Sha256::new();
    for gene in genes {
        hasher.update(gene.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(&hasher.finalize()[..4])
}

/// Per-cell QC metrics from the raw counts.
#[derive(Debug, Default)]
pub struct QcStage;

impl Stage for QcStage {
    fn name(&self) -> &str {
        "qc"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        KeySegment::new("qc")
            .param("x", config.qc.mito_pattern.as_str())
            .param("h", gene_list_digest(&config.qc.cell_cycle_genes))
    }

    fn compute(&self, _inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let counts = ctx.counts()?;
        let mito = ctx.config().mito_regex()?;
        let table = transforms::qc::qc_metrics(&counts, &mito, &ctx.config().qc.cell_cycle_genes)?;
        Ok(StageData::Table(table))
    }

    fn reads_raw(&self) -> bool {
        true
    }

    fn charts(&self, _output: &StageData) -> Vec<Chart> {
        vec![Chart::scatter("qc", "total_counts", "n_genes")
            .with_title("QC: library size vs detected genes")
            .with_color("mito_fraction")]
    }
}

/// Cell and gene filtering.
#[derive(Debug, Default)]
pub struct FilterStage;

impl Stage for FilterStage {
    fn name(&self) -> &str {
        "filter"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        KeySegment::new("filter")
            .param("g", config.filter.min_genes_per_cell)
            .param("m", config.filter.max_mito_fraction)
            .param("c", config.filter.min_cells_per_gene)
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let counts = ctx.counts()?;
        let qc = inputs.table("qc")?;
        let filtered = transforms::filter::filter_cells_and_genes(&counts, qc, &ctx.config().filter)?;
        Ok(StageData::Matrix(filtered))
    }

    fn reads_raw(&self) -> bool {
        true
    }
}

/// Genomic coordinate mapping.
#[derive(Debug, Default)]
pub struct CoordStage;

impl Stage for CoordStage {
    fn name(&self) -> &str {
        "coord"
    }

    fn key_segment(&self, _config: &RunConfig) -> KeySegment {
        KeySegment::new("coord")
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let coordinates = ctx.coordinates()?;
        let mapped = transforms::coords::attach_coordinates(inputs.matrix("filter")?, &coordinates)?;
        Ok(StageData::Genomic(mapped))
    }

    fn reads_raw(&self) -> bool {
        true
    }
}

/// Library-size normalization.
#[derive(Debug, Default)]
pub struct NormStage;

impl Stage for NormStage {
    fn name(&self) -> &str {
        "norm"
    }

    fn key_segment(&self, _config: &RunConfig) -> KeySegment {
        KeySegment::new("norm")
    }

    fn compute(&self, inputs: &StageInputs, _ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let normalized = transforms::normalize::normalize_library_size(inputs.genomic("coord")?)?;
        Ok(StageData::Genomic(normalized))
    }
}

/// Expression-driven genomic binning.
#[derive(Debug, Default)]
pub struct BinStage;

impl Stage for BinStage {
    fn name(&self) -> &str {
        "bin"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        KeySegment::new("bin").param("m", config.binning.target_mean)
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let input = inputs.genomic("norm")?;
        let target = ctx.config().binning.target_mean;
        let binned = ctx.install(|| transforms::binning::bin_by_expression(input, target))?;
        Ok(StageData::Genomic(binned))
    }
}

/// High-expression outlier bin removal.
#[derive(Debug, Default)]
pub struct RmolStage;

impl Stage for RmolStage {
    fn name(&self) -> &str {
        "rmol"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        match config.outliers {
            OutlierFilter::Quantile(q) => KeySegment::new("rmol").param("q", q),
            OutlierFilter::Disabled => KeySegment::new("rmol").param("q", "off"),
        }
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let kept = transforms::outliers::remove_outlier_bins(inputs.genomic("bin")?, ctx.config().outliers)?;
        Ok(StageData::Genomic(kept))
    }
}

/// Winsorized z-scores.
#[derive(Debug, Default)]
pub struct ZwinsStage;

impl Stage for ZwinsStage {
    fn name(&self) -> &str {
        "zwins"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        KeySegment::new("zwins").param("t", config.zscore.winsorize)
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let scaled = transforms::zscore::zscore_winsorize(inputs.genomic("rmol")?, ctx.config().zscore.winsorize)?;
        Ok(StageData::Genomic(scaled))
    }
}

/// Moving-average smoothing along each chromosome.
#[derive(Debug, Default)]
pub struct SmoothStage;

impl Stage for SmoothStage {
    fn name(&self) -> &str {
        "smooth"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        KeySegment::new("smooth").param("w", config.smoothing.window)
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let input = inputs.genomic("zwins")?;
        let window = ctx.config().smoothing.window;
        let smoothed = ctx.install(|| transforms::smoothing::smooth(input, window))?;
        Ok(StageData::Genomic(smoothed))
    }
}

/// Core (non-cycling) cell detection from QC scores.
///
/// The `<prefix>-core-cells.txt` list is written only when the stage
/// computes; a cached list is not re-exported on load or skip.
#[derive(Debug, Default)]
pub struct CellCycleStage;

impl Stage for CellCycleStage {
    fn name(&self) -> &str {
        "cc"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        match config.cell_cycle {
            CellCycleBranch::Detect { sd_threshold } => KeySegment::new("cc").param("sd", sd_threshold),
            CellCycleBranch::Disabled => KeySegment::new("cc"),
        }
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let CellCycleBranch::Detect { sd_threshold } = ctx.config().cell_cycle else {
            return Err(CnaflowError::InvalidConfiguration(
                "cell-cycle stage scheduled while the branch is disabled".into(),
            ));
        };
        let core = transforms::cell_cycle::detect_core_cells(inputs.table("qc")?, sd_threshold)?;

        let path = ctx.output_path("core-cells.txt");
        write_atomic(&path, core.to_text().as_bytes())?;
        tracing::info!(path = %path.display(), cells = core.len(), "Wrote core cell list");

        Ok(StageData::CoreCells(core))
    }
}

/// Principal components, fitted on the core cells when the cell-cycle
/// branch runs.
#[derive(Debug, Default)]
pub struct PcaStage;

impl Stage for PcaStage {
    fn name(&self) -> &str {
        "pca"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        KeySegment::new("pca").param("n", config.pca.components)
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let core = if inputs.declares("cc") {
            Some(inputs.core_cells("cc")?)
        } else {
            None
        };
        let reduction = transforms::pca::pca(inputs.genomic("smooth")?, ctx.config().pca.components, core)?;
        Ok(StageData::Reduction(reduction))
    }
}

/// Community detection in PC space.
#[derive(Debug, Default)]
pub struct CommunityStage;

impl Stage for CommunityStage {
    fn name(&self) -> &str {
        "comm"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        KeySegment::new("comm").param("k", config.community.neighbors)
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let reduction = inputs.reduction("pca")?;
        let k = ctx.config().community.neighbors;
        let table = ctx.install(|| transforms::community::detect_communities(reduction, k))?;
        Ok(StageData::Table(table))
    }
}

/// t-SNE embedding.
#[derive(Debug, Default)]
pub struct TsneStage;

impl Stage for TsneStage {
    fn name(&self) -> &str {
        "tsne"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        KeySegment::new("tsne")
            .param("s", config.embedding.seed)
            .param("p", config.embedding.perplexity)
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let reduction = inputs.reduction("pca")?;
        let embedding = &ctx.config().embedding;
        let (perplexity, seed) = (embedding.perplexity, embedding.seed);
        let table = ctx.install(|| transforms::tsne::tsne(reduction, perplexity, seed))?;
        Ok(StageData::Table(table))
    }
}

/// UMAP embedding.
#[derive(Debug, Default)]
pub struct UmapStage;

impl Stage for UmapStage {
    fn name(&self) -> &str {
        "umap"
    }

    fn key_segment(&self, config: &RunConfig) -> KeySegment {
        KeySegment::new("umap")
            .param("s", config.embedding.seed)
            .param("k", config.embedding.umap_neighbors)
            .param("e", config.embedding.epochs)
    }

    fn compute(&self, inputs: &StageInputs, ctx: &RunContext) -> Result<StageData, CnaflowError> {
        let reduction = inputs.reduction("pca")?;
        let embedding = &ctx.config().embedding;
        let (neighbors, epochs, seed) = (embedding.umap_neighbors, embedding.epochs, embedding.seed);
        let table = ctx.install(|| transforms::umap::umap(reduction, neighbors, epochs, seed))?;
        Ok(StageData::Table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EmbeddingSelection;

    #[test]
    fn test_segments_render_parameters() {
        let config = RunConfig::new("run1")
            .with_bin_target(3.0)
            .with_winsorize(3.0)
            .with_smoothing_window(3);

        assert_eq!(BinStage.key_segment(&config).render(), "bin.m3");
        assert_eq!(ZwinsStage.key_segment(&config).render(), "zwins.t3");
        assert_eq!(SmoothStage.key_segment(&config).render(), "smooth.w3");
        assert_eq!(FilterStage.key_segment(&config).render(), "filter.g200.m0p2.c3");
        assert_eq!(RmolStage.key_segment(&config).render(), "rmol.q0p99");
        assert_eq!(
            RmolStage.key_segment(&config.clone().with_outliers(OutlierFilter::Disabled)).render(),
            "rmol.qoff"
        );
    }

    #[test]
    fn test_irrelevant_parameters_stay_out_of_keys() {
        let a = RunConfig::new("run1");
        let b = RunConfig::new("run1")
            .with_workers(8)
            .with_render(false)
            .with_output_dir("elsewhere")
            .with_embedding(EmbeddingSelection::Both);

        let stages: [&dyn Stage; 6] = [&QcStage, &FilterStage, &BinStage, &SmoothStage, &PcaStage, &TsneStage];
        for stage in stages {
            assert_eq!(stage.key_segment(&a), stage.key_segment(&b), "{}", stage.name());
        }
    }

    #[test]
    fn test_qc_segment_tracks_marker_list() {
        let a = RunConfig::new("run1");
        let mut b = a.clone();
        b.qc.cell_cycle_genes.push("AURKA".into());
        assert_ne!(QcStage.key_segment(&a), QcStage.key_segment(&b));
        assert!(QcStage.key_segment(&a).render().starts_with("qc.x~5EMT~2D.h"));
    }

    #[test]
    fn test_embedding_seeds_above_i64_range_stay_distinct() {
        let mut a = RunConfig::new("run1");
        a.embedding.seed = u64::MAX;
        let mut b = a.clone();
        b.embedding.seed = u64::MAX - 1;
        assert_ne!(TsneStage.key_segment(&a), TsneStage.key_segment(&b));
        assert_ne!(UmapStage.key_segment(&a), UmapStage.key_segment(&b));
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("run1-core-cells.txt");
        write_atomic(&path, b"old\n").unwrap();
        write_atomic(&path, b"c1\nc2\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "c1\nc2\n");
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_cell_cycle_segment() {
        let config = RunConfig::new("run1").with_cell_cycle(CellCycleBranch::Detect { sd_threshold: 3.0 });
        assert_eq!(CellCycleStage.key_segment(&config).render(), "cc.sd3");
    }
}
