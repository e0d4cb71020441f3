use std::fmt::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use culprit_core::graph::{FirstParentStrategy, GraphBuild, GraphBuilder};
use culprit_core::repo::GitRepository;
use culprit_core::store::persist_metrics;

#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Path to git repository (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// First-parent rule: declared or prefer-linear (overrides config)
    #[arg(long)]
    pub first_parent: Option<FirstParentStrategy>,

    /// Save metric rows to the database
    #[arg(long)]
    pub persist: bool,

    /// Database path (implies --persist)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Config file (default: culprit.toml in the repository, if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Write output to a file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub async fn run(args: GraphArgs) -> anyhow::Result<()> {
    let repo_path = super::resolve_repo_path(&args.path)?;
    let mut config = super::load_config(args.config.as_deref(), &repo_path)?;
    if let Some(strategy) = args.first_parent {
        config.graph.first_parent = strategy;
    }

    let repo = GitRepository::open(&repo_path)
        .with_context(|| format!("Failed to open {}", repo_path.display()))?;
    let build = GraphBuilder::new(config.graph.clone())
        .build(&repo)
        .context("Failed to build commit graph")?;

    if args.persist || args.db.is_some() {
        let db_path = super::resolve_db_path(&repo_path, &config, args.db.as_deref());
        let store = super::open_store(&db_path)?;
        let stats = persist_metrics(&store, &build.metrics, &super::progress_reporter()).await;
        if !stats.errors.is_empty() {
            eprintln!(
                "Warning: {} of {} metric rows failed to persist",
                stats.errors.len(),
                build.metrics.len()
            );
        }
    }

    let rendered = match args.format.as_str() {
        "json" => {
            serde_json::to_string_pretty(&build.export()).context("Failed to serialize graph")?
        }
        _ => render_text(&build),
    };

    match &args.output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Cannot write output: {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn render_text(build: &GraphBuild) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", build.summary());
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<12} {:>4} {:>4} {:>5} {:>5} {:>6} {:>5} {:>5} {:>5}",
        "commit", "in", "out", "min", "max", "seg", "merg", "days", "heads"
    );
    for &v in &build.order {
        let id = &build.graph.vertex_at(v).id;
        let Some(m) = build.metrics_for(id) else {
            continue;
        };
        let short = id.get(..12).unwrap_or(id);
        let _ = writeln!(
            out,
            "{:<12} {:>4} {:>4} {:>5} {:>5} {:>6} {:>5} {:>5} {:>5}{}",
            short,
            m.in_degree,
            m.out_degree,
            m.min_depth,
            m.max_depth,
            m.distance_to_segment_start,
            m.distinct_upstream_merges_before,
            m.days_since_last_merge,
            m.branch_count_time_aware,
            if m.is_merge { "  (merge)" } else { "" },
        );
    }
    out.trim_end().to_string()
}
