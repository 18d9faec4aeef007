use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cnaflow::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cnaflow")]
#[command(about = "Cached single-cell copy-number pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, execute and merge; writes `<output_dir>/<prefix>-cells.tsv`
    Run(RunArgs),

    /// Show what each stage would do without running anything
    Plan(RunArgs),

    /// Print the cache key of every in-scope stage
    Keys(RunArgs),

    /// Print a configuration file with every default filled in
    DefaultConfig {
        /// Run prefix to put in the file
        #[arg(long, default_value = "run1")]
        prefix: String,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to the TOML configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Override the run prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Recompute every stage and overwrite stored artifacts
    #[arg(long)]
    no_cache: bool,

    /// Worker threads for parallel stages
    #[arg(short, long)]
    workers: Option<usize>,

    /// Embedding method: tsne, umap or both
    #[arg(short, long)]
    embedding: Option<EmbeddingSelection>,
}

impl RunArgs {
    async fn load(&self) -> Result<RunConfig> {
        let mut config = RunConfig::from_file(&self.config)
            .await
            .with_context(|| format!("reading {}", self.config.display()))?;
        if let Some(prefix) = &self.prefix {
            config = config.with_prefix(prefix.clone());
        }
        if self.no_cache {
            config = config.with_use_cache(false);
        }
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(embedding) = self.embedding {
            config = config.with_embedding(embedding);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs)?;

    match cli.command {
        Commands::Run(args) => run(&args).await,
        Commands::Plan(args) => plan(&args).await,
        Commands::Keys(args) => keys(&args).await,
        Commands::DefaultConfig { prefix } => {
            print!("{}", RunConfig::new(prefix).to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(args: &RunArgs) -> Result<()> {
    let token = CancellationToken::new();
    let pipeline = CnaPipeline::from_config(args.load().await?)
        .await?
        .with_events(Arc::new(LoggingEventSink::default()))
        .with_cancellation(token.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping after the current stage");
            token.cancel("interrupted");
        }
    });

    let result = pipeline.run().await?;
    println!(
        "{} cells, {} stages computed, {} loaded -> {}",
        result.table.len(),
        result.report.computed_count(),
        result.report.loaded_count(),
        result.output_path.display()
    );
    Ok(())
}

async fn plan(args: &RunArgs) -> Result<()> {
    let pipeline = CnaPipeline::from_config(args.load().await?).await?;
    let resolution = pipeline.plan().await?;
    for (stage, mark) in resolution.marks() {
        let key = resolution.key(stage).map_or("", CacheKey::as_str);
        println!("{stage:<8} {:<10} {key}", mark.to_string());
    }
    Ok(())
}

async fn keys(args: &RunArgs) -> Result<()> {
    let pipeline = CnaPipeline::from_config(args.load().await?).await?;
    for (stage, key) in pipeline.keys() {
        println!("{stage:<8} {}", key.file_name());
    }
    Ok(())
}
