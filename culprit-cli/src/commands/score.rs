use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;

use culprit_patch::{RiskScore, score_patch};

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Patch file to score; reads stdin when absent or `-`
    pub patch: Option<PathBuf>,

    /// Score at or above which the patch counts as a likely defect fix
    /// (default: from config)
    #[arg(long, allow_hyphen_values = true)]
    pub threshold: Option<i32>,

    /// Config file (default: culprit.toml in the current directory, if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

pub fn run(args: ScoreArgs) -> anyhow::Result<()> {
    let threshold = match args.threshold {
        Some(threshold) => threshold,
        None => super::load_config(args.config.as_deref(), Path::new("."))?.risk.threshold,
    };

    let patch = read_patch(args.patch.as_deref())?;
    let score = score_patch(&patch);
    let likely = score.is_likely_defect(threshold);

    match args.format.as_str() {
        "json" => {
            let report = serde_json::json!({
                "score": score.score,
                "hits": score.hits,
                "threshold": threshold,
                "likely_defect": likely,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print!("{}", render_text(&score, threshold)),
    }
    Ok(())
}

fn read_patch(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read patch file: {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Cannot read patch from stdin")?;
            Ok(text)
        }
    }
}

fn render_text(score: &RiskScore, threshold: i32) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(out, "score: {}", score.score);
    for hit in &score.hits {
        let _ = writeln!(
            out,
            "  line {:>4}  {:<16} {:+}",
            hit.patch_line,
            hit.signal.as_str(),
            hit.signal.weight()
        );
    }
    let verdict = if score.is_likely_defect(threshold) { "yes" } else { "no" };
    let _ = writeln!(out, "likely defect: {verdict} (threshold {threshold})");
    out
}
