//! Run configuration.
//!
//! A [`RunConfig`] is usually read from a TOML file:
//!
//! ```toml
//! prefix = "run1"
//! store_dir = "cache"
//! outliers = "disabled"
//! cell_cycle = { sd_threshold = 3.0 }
//!
//! [inputs]
//! matrices = ["counts.tsv"]
//! coordinates = "genes.tsv"
//!
//! [smoothing]
//! window = 3
//!
//! [embedding]
//! method = "both"
//! ```
//!
//! Execution-only options (`use_cache`, `workers`, `render`, directories)
//! never take part in cache keys.

use crate::errors::CnaflowError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Namespace of every artifact this run reads or writes.
    pub prefix: String,
    /// Reuse cached artifacts. When false every stage recomputes and
    /// replaces its artifact.
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    /// Worker threads available to parallel-capable stages.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Artifact store directory.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Directory for the result table, charts and the core-cell list.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Input files.
    #[serde(default)]
    pub inputs: InputConfig,
    /// QC scoring.
    #[serde(default)]
    pub qc: QcConfig,
    /// Cell and gene filtering.
    #[serde(default)]
    pub filter: FilterConfig,
    /// Genomic binning.
    #[serde(default)]
    pub binning: BinningConfig,
    /// High-expression outlier bin removal.
    #[serde(default)]
    pub outliers: OutlierFilter,
    /// Z-score scaling.
    #[serde(default)]
    pub zscore: ZScoreConfig,
    /// Moving-average smoothing.
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    /// Optional cell-cycle branch.
    #[serde(default)]
    pub cell_cycle: CellCycleBranch,
    /// Principal components.
    #[serde(default)]
    pub pca: PcaConfig,
    /// Community detection.
    #[serde(default)]
    pub community: CommunityConfig,
    /// 2-D embeddings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Chart rendering.
    #[serde(default)]
    pub render: RenderConfig,
}

fn default_use_cache() -> bool {
    true
}

fn default_workers() -> usize {
    1
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

/// Paths of the raw inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Gene-by-cell count matrices, combined column-wise.
    #[serde(default)]
    pub matrices: Vec<PathBuf>,
    /// Gene coordinate table.
    #[serde(default)]
    pub coordinates: Option<PathBuf>,
    /// Optional per-cell metadata joined into the result.
    #[serde(default)]
    pub metadata: Option<PathBuf>,
}

/// QC scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcConfig {
    /// Regex selecting mitochondrial genes.
    #[serde(default = "default_mito_pattern")]
    pub mito_pattern: String,
    /// Marker genes whose share of counts is the cell-cycle score.
    #[serde(default = "default_cell_cycle_genes")]
    pub cell_cycle_genes: Vec<String>,
}

fn default_mito_pattern() -> String {
    "^MT-".to_string()
}

fn default_cell_cycle_genes() -> Vec<String> {
    [
        "MKI67", "TOP2A", "PCNA", "MCM2", "MCM5", "TYMS", "CCNB1", "CDK1", "BIRC5", "UBE2C",
        "CENPF", "HMGB2",
    ]
    .iter()
    .map(|g| (*g).to_string())
    .collect()
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            mito_pattern: default_mito_pattern(),
            cell_cycle_genes: default_cell_cycle_genes(),
        }
    }
}

/// Cell and gene filtering thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum detected genes per kept cell.
    #[serde(default = "default_min_genes_per_cell")]
    pub min_genes_per_cell: usize,
    /// Maximum mitochondrial fraction per kept cell.
    #[serde(default = "default_max_mito_fraction")]
    pub max_mito_fraction: f64,
    /// Minimum kept cells a gene must be detected in.
    #[serde(default = "default_min_cells_per_gene")]
    pub min_cells_per_gene: usize,
}

fn default_min_genes_per_cell() -> usize {
    200
}

fn default_max_mito_fraction() -> f64 {
    0.2
}

fn default_min_cells_per_gene() -> usize {
    3
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_genes_per_cell: default_min_genes_per_cell(),
            max_mito_fraction: default_max_mito_fraction(),
            min_cells_per_gene: default_min_cells_per_gene(),
        }
    }
}

/// Genomic binning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningConfig {
    /// Mean expression a bin must reach before it is closed.
    #[serde(default = "default_target_mean")]
    pub target_mean: f64,
}

fn default_target_mean() -> f64 {
    3.0
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            target_mean: default_target_mean(),
        }
    }
}

/// Removal of bins with outlying mean expression.
///
/// Written in TOML either as a quantile (`outliers = 0.99`) or as
/// `outliers = "disabled"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OutlierRepr", into = "OutlierRepr")]
pub enum OutlierFilter {
    /// Keep every bin.
    Disabled,
    /// Drop bins whose mean exceeds this quantile of all bin means.
    Quantile(f64),
}

impl Default for OutlierFilter {
    fn default() -> Self {
        Self::Quantile(0.99)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum OutlierRepr {
    Quantile(f64),
    Keyword(String),
}

impl TryFrom<OutlierRepr> for OutlierFilter {
    type Error = String;

    fn try_from(repr: OutlierRepr) -> Result<Self, Self::Error> {
        match repr {
            OutlierRepr::Quantile(q) => Ok(Self::Quantile(q)),
            OutlierRepr::Keyword(k) if k.eq_ignore_ascii_case("disabled") => Ok(Self::Disabled),
            OutlierRepr::Keyword(k) => Err(format!(
                "outliers must be a quantile or \"disabled\", got \"{k}\""
            )),
        }
    }
}

impl From<OutlierFilter> for OutlierRepr {
    fn from(filter: OutlierFilter) -> Self {
        match filter {
            OutlierFilter::Disabled => Self::Keyword("disabled".to_string()),
            OutlierFilter::Quantile(q) => Self::Quantile(q),
        }
    }
}

/// Z-score scaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScoreConfig {
    /// Scores are clipped to `[-winsorize, winsorize]`.
    #[serde(default = "default_winsorize")]
    pub winsorize: f64,
}

fn default_winsorize() -> f64 {
    3.0
}

impl Default for ZScoreConfig {
    fn default() -> Self {
        Self {
            winsorize: default_winsorize(),
        }
    }
}

/// Moving-average smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Bins averaged on each side of the centre bin.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_window() -> usize {
    3
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}

/// Whether the cell-cycle branch runs.
///
/// Written as `cell_cycle = "disabled"` or `cell_cycle = { sd_threshold = 3.0 }`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "CellCycleRepr", into = "CellCycleRepr")]
pub enum CellCycleBranch {
    /// PCA is fitted on all cells.
    #[default]
    Disabled,
    /// Cycling cells are detected and excluded from the PCA fit.
    Detect {
        /// Standard deviations above the mean score that mark a cell as cycling.
        sd_threshold: f64,
    },
}

impl CellCycleBranch {
    /// Returns true if the branch is selected.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Detect { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CellCycleRepr {
    Detect { sd_threshold: f64 },
    Keyword(String),
}

impl TryFrom<CellCycleRepr> for CellCycleBranch {
    type Error = String;

    fn try_from(repr: CellCycleRepr) -> Result<Self, Self::Error> {
        match repr {
            CellCycleRepr::Detect { sd_threshold } => Ok(Self::Detect { sd_threshold }),
            CellCycleRepr::Keyword(k) if k.eq_ignore_ascii_case("disabled") => Ok(Self::Disabled),
            CellCycleRepr::Keyword(k) => Err(format!(
                "cell_cycle must be \"disabled\" or {{ sd_threshold = .. }}, got \"{k}\""
            )),
        }
    }
}

impl From<CellCycleBranch> for CellCycleRepr {
    fn from(branch: CellCycleBranch) -> Self {
        match branch {
            CellCycleBranch::Disabled => Self::Keyword("disabled".to_string()),
            CellCycleBranch::Detect { sd_threshold } => Self::Detect { sd_threshold },
        }
    }
}

/// Principal components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcaConfig {
    /// Number of components kept.
    #[serde(default = "default_components")]
    pub components: usize,
}

fn default_components() -> usize {
    10
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            components: default_components(),
        }
    }
}

/// Community detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityConfig {
    /// Neighbours per cell in the kNN graph.
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,
}

fn default_neighbors() -> usize {
    10
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            neighbors: default_neighbors(),
        }
    }
}

/// Which 2-D embedding paths run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EmbeddingSelection {
    /// t-SNE only.
    #[default]
    Tsne,
    /// UMAP only.
    Umap,
    /// Both, combined on cell identity.
    Both,
}

impl EmbeddingSelection {
    /// Builds a selection from two switches.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if neither method is selected.
    pub fn from_flags(tsne: bool, umap: bool) -> Result<Self, CnaflowError> {
        match (tsne, umap) {
            (true, true) => Ok(Self::Both),
            (true, false) => Ok(Self::Tsne),
            (false, true) => Ok(Self::Umap),
            (false, false) => Err(CnaflowError::InvalidConfiguration(
                "at least one embedding method must be selected".into(),
            )),
        }
    }

    /// Returns true if t-SNE runs.
    #[must_use]
    pub fn tsne(&self) -> bool {
        matches!(self, Self::Tsne | Self::Both)
    }

    /// Returns true if UMAP runs.
    #[must_use]
    pub fn umap(&self) -> bool {
        matches!(self, Self::Umap | Self::Both)
    }
}

impl FromStr for EmbeddingSelection {
    type Err = CnaflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tsne" | "t-sne" | "a" => Ok(Self::Tsne),
            "umap" | "b" => Ok(Self::Umap),
            "both" => Ok(Self::Both),
            other => Err(CnaflowError::InvalidConfiguration(format!(
                "embedding method must be one of tsne, umap, both; got \"{other}\""
            ))),
        }
    }
}

impl TryFrom<String> for EmbeddingSelection {
    type Error = CnaflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EmbeddingSelection> for String {
    fn from(selection: EmbeddingSelection) -> Self {
        selection.to_string()
    }
}

impl fmt::Display for EmbeddingSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tsne => write!(f, "tsne"),
            Self::Umap => write!(f, "umap"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// 2-D embedding parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which methods run.
    #[serde(default)]
    pub method: EmbeddingSelection,
    /// Random seed shared by both methods.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// t-SNE perplexity.
    #[serde(default = "default_perplexity")]
    pub perplexity: f64,
    /// UMAP neighbourhood size.
    #[serde(default = "default_umap_neighbors")]
    pub umap_neighbors: usize,
    /// UMAP optimisation epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
}

fn default_seed() -> u64 {
    1
}

fn default_perplexity() -> f64 {
    30.0
}

fn default_umap_neighbors() -> usize {
    15
}

fn default_epochs() -> usize {
    200
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            method: EmbeddingSelection::default(),
            seed: default_seed(),
            perplexity: default_perplexity(),
            umap_neighbors: default_umap_neighbors(),
            epochs: default_epochs(),
        }
    }
}

/// Chart rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Write chart documents to the output directory.
    #[serde(default = "default_render_enabled")]
    pub enabled: bool,
}

fn default_render_enabled() -> bool {
    true
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: default_render_enabled(),
        }
    }
}

impl RunConfig {
    /// Creates a configuration with defaults for a prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            use_cache: default_use_cache(),
            workers: default_workers(),
            store_dir: default_store_dir(),
            output_dir: default_output_dir(),
            inputs: InputConfig::default(),
            qc: QcConfig::default(),
            filter: FilterConfig::default(),
            binning: BinningConfig::default(),
            outliers: OutlierFilter::default(),
            zscore: ZScoreConfig::default(),
            smoothing: SmoothingConfig::default(),
            cell_cycle: CellCycleBranch::default(),
            pca: PcaConfig::default(),
            community: CommunityConfig::default(),
            embedding: EmbeddingConfig::default(),
            render: RenderConfig::default(),
        }
    }

    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the document does not parse.
    pub fn from_toml_str(text: &str) -> Result<Self, CnaflowError> {
        toml::from_str(text).map_err(|e| CnaflowError::InvalidConfiguration(e.to_string()))
    }

    /// Reads a TOML file. Relative input, store and output paths are
    /// resolved against the file's directory.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CnaflowError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, CnaflowError> {
        toml::to_string_pretty(self).map_err(|e| CnaflowError::Serialization(e.to_string()))
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.store_dir);
        resolve(&mut self.output_dir);
        self.inputs.matrices.iter_mut().for_each(resolve);
        self.inputs.coordinates.iter_mut().for_each(resolve);
        self.inputs.metadata.iter_mut().for_each(resolve);
    }

    /// Sets the prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets cache reuse.
    #[must_use]
    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the store directory.
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = dir.into();
        self
    }

    /// Sets the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Sets the binning target mean.
    #[must_use]
    pub fn with_bin_target(mut self, target_mean: f64) -> Self {
        self.binning.target_mean = target_mean;
        self
    }

    /// Sets the outlier filter.
    #[must_use]
    pub fn with_outliers(mut self, outliers: OutlierFilter) -> Self {
        self.outliers = outliers;
        self
    }

    /// Sets the winsorization threshold.
    #[must_use]
    pub fn with_winsorize(mut self, threshold: f64) -> Self {
        self.zscore.winsorize = threshold;
        self
    }

    /// Sets the smoothing window.
    #[must_use]
    pub fn with_smoothing_window(mut self, window: usize) -> Self {
        self.smoothing.window = window;
        self
    }

    /// Sets the cell-cycle branch.
    #[must_use]
    pub fn with_cell_cycle(mut self, branch: CellCycleBranch) -> Self {
        self.cell_cycle = branch;
        self
    }

    /// Sets the embedding selection.
    #[must_use]
    pub fn with_embedding(mut self, method: EmbeddingSelection) -> Self {
        self.embedding.method = method;
        self
    }

    /// Enables or disables chart rendering.
    #[must_use]
    pub fn with_render(mut self, enabled: bool) -> Self {
        self.render.enabled = enabled;
        self
    }

    /// Compiles the mitochondrial gene pattern.
    pub fn mito_regex(&self) -> Result<Regex, CnaflowError> {
        Regex::new(&self.qc.mito_pattern).map_err(|e| {
            CnaflowError::InvalidConfiguration(format!("invalid mito_pattern: {e}"))
        })
    }

    /// Checks every option for usable values.
    pub fn validate(&self) -> Result<(), CnaflowError> {
        fn invalid(msg: String) -> Result<(), CnaflowError> {
            Err(CnaflowError::InvalidConfiguration(msg))
        }
        fn positive(name: &str, v: f64) -> Result<(), CnaflowError> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                invalid(format!("{name} must be a positive finite number, got {v}"))
            }
        }

        if self.prefix.trim().is_empty() {
            return invalid("prefix must not be empty".into());
        }
        if self.workers == 0 {
            return invalid("workers must be at least 1".into());
        }
        self.mito_regex()?;
        let f = &self.filter;
        if !(0.0..=1.0).contains(&f.max_mito_fraction) {
            return invalid(format!(
                "filter.max_mito_fraction must be within [0, 1], got {}",
                f.max_mito_fraction
            ));
        }
        positive("binning.target_mean", self.binning.target_mean)?;
        if let OutlierFilter::Quantile(q) = self.outliers {
            if !(q > 0.0 && q <= 1.0) {
                return invalid(format!("outliers quantile must be within (0, 1], got {q}"));
            }
        }
        positive("zscore.winsorize", self.zscore.winsorize)?;
        if self.smoothing.window == 0 {
            return invalid("smoothing.window must be at least 1".into());
        }
        if let CellCycleBranch::Detect { sd_threshold } = self.cell_cycle {
            if !sd_threshold.is_finite() {
                return invalid(format!("cell_cycle.sd_threshold must be finite, got {sd_threshold}"));
            }
        }
        if self.pca.components == 0 {
            return invalid("pca.components must be at least 1".into());
        }
        if self.community.neighbors == 0 {
            return invalid("community.neighbors must be at least 1".into());
        }
        let e = &self.embedding;
        positive("embedding.perplexity", e.perplexity)?;
        if e.umap_neighbors < 2 {
            return invalid("embedding.umap_neighbors must be at least 2".into());
        }
        if e.epochs == 0 {
            return invalid("embedding.epochs must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config = RunConfig::from_toml_str("prefix = \"run1\"").unwrap();
        assert_eq!(config, RunConfig::new("run1"));
        assert!(config.use_cache);
        assert_eq!(config.outliers, OutlierFilter::Quantile(0.99));
        assert_eq!(config.cell_cycle, CellCycleBranch::Disabled);
        assert_eq!(config.embedding.method, EmbeddingSelection::Tsne);
    }

    #[test]
    fn test_tagged_variants_parse() {
        let config = RunConfig::from_toml_str(
            r#"
            prefix = "run1"
            outliers = "disabled"
            cell_cycle = { sd_threshold = 2.5 }

            [embedding]
            method = "B"
            "#,
        )
        .unwrap();

        assert_eq!(config.outliers, OutlierFilter::Disabled);
        assert_eq!(config.cell_cycle, CellCycleBranch::Detect { sd_threshold: 2.5 });
        assert_eq!(config.embedding.method, EmbeddingSelection::Umap);
    }

    #[test]
    fn test_bad_outlier_keyword_rejected() {
        let err = RunConfig::from_toml_str("prefix = \"r\"\noutliers = \"sometimes\"").unwrap_err();
        assert!(matches!(err, CnaflowError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_no_embedding_is_invalid() {
        assert!(matches!(
            EmbeddingSelection::from_flags(false, false),
            Err(CnaflowError::InvalidConfiguration(_))
        ));
        assert!("none".parse::<EmbeddingSelection>().is_err());
        assert!(RunConfig::from_toml_str("prefix = \"r\"\n[embedding]\nmethod = \"\"").is_err());
    }

    #[test]
    fn test_selection_flags() {
        assert_eq!(EmbeddingSelection::from_flags(true, true).unwrap(), EmbeddingSelection::Both);
        assert!(EmbeddingSelection::Both.tsne() && EmbeddingSelection::Both.umap());
        assert!(!EmbeddingSelection::Tsne.umap());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RunConfig::new("run1").validate().is_ok());
        assert!(RunConfig::new("").validate().is_err());
        assert!(RunConfig::new("r").with_workers(0).validate().is_err());
        assert!(RunConfig::new("r").with_smoothing_window(0).validate().is_err());
        assert!(RunConfig::new("r").with_bin_target(f64::NAN).validate().is_err());
        assert!(RunConfig::new("r")
            .with_outliers(OutlierFilter::Quantile(1.5))
            .validate()
            .is_err());

        let mut config = RunConfig::new("r");
        config.qc.mito_pattern = "([".into();
        assert!(matches!(
            config.validate(),
            Err(CnaflowError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RunConfig::new("run1")
            .with_outliers(OutlierFilter::Disabled)
            .with_cell_cycle(CellCycleBranch::Detect { sd_threshold: 3.0 })
            .with_embedding(EmbeddingSelection::Both);
        let text = config.to_toml_string().unwrap();
        assert_eq!(RunConfig::from_toml_str(&text).unwrap(), config);
    }
}
