//! Chart rendering.
//!
//! Charts are a side effect of a run: they are drawn from stage outputs and
//! the merged table, and a failed render never fails the run.

use crate::core::{CellTable, Column};
use crate::errors::CnaflowError;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// A scatter plot request.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    /// File-name stem, e.g. `qc` or `tsne`.
    pub name: String,
    /// Chart title.
    pub title: String,
    /// Column on the x axis.
    pub x: String,
    /// Column on the y axis.
    pub y: String,
    /// Optional column used for colour.
    pub color: Option<String>,
}

impl Chart {
    /// Creates a scatter of `y` against `x`.
    #[must_use]
    pub fn scatter(name: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            x: x.into(),
            y: y.into(),
            color: None,
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Colours points by a column.
    #[must_use]
    pub fn with_color(mut self, column: impl Into<String>) -> Self {
        self.color = Some(column.into());
        self
    }
}

/// Turns a table into a renderable document.
pub trait ChartRenderer: Send + Sync {
    /// Renders a chart and returns where it was written, if anywhere.
    fn render(&self, chart: &Chart, table: &CellTable) -> Result<Option<PathBuf>, CnaflowError>;
}

/// Discards every chart.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRenderer;

impl ChartRenderer for NoOpRenderer {
    fn render(&self, _chart: &Chart, _table: &CellTable) -> Result<Option<PathBuf>, CnaflowError> {
        Ok(None)
    }
}

/// Writes Vega-Lite JSON documents with inline data.
#[derive(Debug, Clone)]
pub struct VegaLiteRenderer {
    out_dir: PathBuf,
    prefix: String,
}

impl VegaLiteRenderer {
    /// Creates a renderer writing `<out_dir>/<prefix>-<chart>.vl.json`.
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Returns the output directory.
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Builds the Vega-Lite document for a chart.
    pub fn document(chart: &Chart, table: &CellTable) -> Result<Value, CnaflowError> {
        let lookup = |name: &str| {
            table.column(name).ok_or_else(|| {
                CnaflowError::Internal(format!("chart '{}' needs missing column '{name}'", chart.name))
            })
        };
        let x = lookup(&chart.x)?;
        let y = lookup(&chart.y)?;
        let color = chart.color.as_deref().map(lookup).transpose()?;

        let values: Vec<Value> = table
            .cells()
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                let mut point = Map::new();
                point.insert("cell".into(), json!(cell));
                point.insert(chart.x.clone(), cell_value(x, row));
                point.insert(chart.y.clone(), cell_value(y, row));
                if let (Some(name), Some(column)) = (&chart.color, color) {
                    point.insert(name.clone(), cell_value(column, row));
                }
                Value::Object(point)
            })
            .collect();

        let mut encoding = json!({
            "x": {"field": chart.x, "type": "quantitative"},
            "y": {"field": chart.y, "type": "quantitative"},
            "tooltip": [{"field": "cell", "type": "nominal"}],
        });
        if let (Some(name), Some(column)) = (&chart.color, color) {
            let kind = match column {
                Column::Float(_) => "quantitative",
                Column::Int(_) | Column::Text(_) => "nominal",
            };
            encoding["color"] = json!({"field": name, "type": kind});
        }

        Ok(json!({
            "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
            "title": chart.title,
            "data": {"values": values},
            "mark": {"type": "point", "filled": true, "size": 12},
            "encoding": encoding,
        }))
    }
}

fn cell_value(column: &Column, row: usize) -> Value {
    match column {
        Column::Float(v) => json!(v[row]),
        Column::Int(v) => json!(v[row]),
        Column::Text(v) => json!(v[row]),
    }
}

impl ChartRenderer for VegaLiteRenderer {
    fn render(&self, chart: &Chart, table: &CellTable) -> Result<Option<PathBuf>, CnaflowError> {
        let doc = Self::document(chart, table)?;
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(format!("{}-{}.vl.json", self.prefix, chart.name));
        std::fs::write(&path, serde_json::to_vec_pretty(&doc)?)?;
        Ok(Some(path))
    }
}

/// Renders a chart, logging instead of failing.
pub fn render_logged(renderer: &dyn ChartRenderer, chart: &Chart, table: &CellTable) {
    match renderer.render(chart, table) {
        Ok(Some(path)) => tracing::debug!(chart = %chart.name, path = %path.display(), "Chart written"),
        Ok(None) => {}
        Err(e) => tracing::warn!(chart = %chart.name, error = %e, "Chart rendering failed"),
    }
}
