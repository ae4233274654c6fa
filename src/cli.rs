use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::classifier::ZeroShotClassifier;
use crate::config::{self, ServiceConfig};
use crate::verdict::{Verdict, VerdictEngine};

/// AI-powered bad-content detector
#[derive(Debug, Parser)]
#[command(name = "detect", version)]
pub struct DetectArgs {
    /// Text string to analyze
    #[arg(short, long)]
    pub text: Option<String>,

    /// Path to a .txt file to analyze
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Path to a directory of .txt files
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Comma-separated list of labels to detect
    #[arg(short, long, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,

    /// Score threshold (0.0-1.0) at or above which a label is flagged
    #[arg(short = 'T', long, default_value_t = config::DEFAULT_THRESHOLD)]
    pub threshold: f32,

    /// Path to save full JSON results
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(args: DetectArgs) -> Result<()> {
    init_logging(args.verbose);

    // collect and validate inputs before paying for the model load
    let inputs = collect_inputs(&args)?;
    if inputs.is_empty() {
        bail!("please specify --text, --file, or --dir with at least one input");
    }

    let config = ServiceConfig::from_env();
    fs::create_dir_all(&config.cache_dir)?;

    info!(model_id = config.model_id.as_str(), "loading zero-shot classifier model");
    let classifier = Arc::new(ZeroShotClassifier::load(
        &config.model_id,
        &config.cache_dir,
        config.device.as_deref(),
    )?);
    let engine = VerdictEngine::new(classifier);

    let labels = args.labels.as_deref();
    info!(threshold = args.threshold, ?labels, "running detection");

    let mut verdicts = Vec::with_capacity(inputs.len());
    for (source, text) in &inputs {
        let verdict = engine
            .evaluate(text, labels, args.threshold)
            .with_context(|| format!("detection failed for {source}"))?;
        report(source, &verdict);
        verdicts.push((source.clone(), verdict));
    }

    if let Some(path) = &args.output {
        write_results(path, labels, args.threshold, &verdicts)?;
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Gather (source, text) pairs from --text, --file, and --dir, in that
/// order. Fails fast on missing paths; unreadable or empty files inside a
/// directory are logged and skipped.
fn collect_inputs(args: &DetectArgs) -> Result<Vec<(String, String)>> {
    let mut inputs = Vec::new();

    if let Some(text) = &args.text {
        inputs.push(("<input>".to_string(), text.clone()));
    }
    if let Some(file) = &args.file {
        if !file.is_file() {
            bail!("file not found: {}", file.display());
        }
        let content = fs::read_to_string(file)
            .with_context(|| format!("could not read {}", file.display()))?;
        inputs.push((file.display().to_string(), content));
    }
    if let Some(dir) = &args.dir {
        if !dir.is_dir() {
            bail!("directory not found: {}", dir.display());
        }
        load_texts_from_dir(dir, &mut inputs);
    }

    Ok(inputs)
}

/// Recursively load every .txt file under `dir`, sorted for a stable
/// report order.
fn load_texts_from_dir(dir: &Path, out: &mut Vec<(String, String)>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("could not read {}: {e}", dir.display());
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            load_texts_from_dir(&path, out);
            continue;
        }
        let is_txt = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        if !is_txt {
            continue;
        }
        match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => {
                warn!("skipping empty file {}", path.display());
            }
            Ok(content) => out.push((path.display().to_string(), content)),
            Err(e) => warn!("could not read {}: {e}", path.display()),
        }
    }
}

fn report(source: &str, verdict: &Verdict) {
    if verdict.is_safe {
        println!("[ SAFE ] {source}");
    } else {
        println!("[FLAGGED] {source}");
        for (label, score) in &verdict.flagged_labels {
            println!("   - {label}: {score:.2}");
        }
    }
}

fn write_results(
    path: &Path,
    labels: Option<&[String]>,
    threshold: f32,
    verdicts: &[(String, Verdict)],
) -> Result<()> {
    let labels = labels.map(<[String]>::to_vec).unwrap_or_else(config::default_labels);
    let results: Vec<_> = verdicts
        .iter()
        .map(|(source, verdict)| {
            json!({
                "source": source,
                "scores": verdict.scores,
                "flagged_labels": verdict.flagged_labels,
                "is_safe": verdict.is_safe,
            })
        })
        .collect();
    let out = json!({
        "threshold": threshold,
        "labels": labels,
        "results": results,
    });

    fs::write(path, serde_json::to_string_pretty(&out)?)
        .with_context(|| format!("could not write output file {}", path.display()))?;
    info!("results written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_labels_and_threshold() {
        let args = DetectArgs::try_parse_from([
            "detect", "--text", "hello", "-l", "a,b", "-T", "0.8",
        ])
        .unwrap();

        assert_eq!(args.text.as_deref(), Some("hello"));
        assert_eq!(args.labels, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(args.threshold, 0.8);
        assert!(!args.verbose);
    }

    #[test]
    fn dir_walk_picks_only_txt_files_recursively() {
        let root = std::env::temp_dir().join(format!("safetext-cli-test-{}", std::process::id()));
        let nested = root.join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join("a.txt"), "first").unwrap();
        fs::write(root.join("notes.md"), "ignored").unwrap();
        fs::write(root.join("empty.txt"), "   ").unwrap();
        fs::write(nested.join("b.txt"), "second").unwrap();

        let mut out = Vec::new();
        load_texts_from_dir(&root, &mut out);
        fs::remove_dir_all(&root).unwrap();

        let texts: Vec<&str> = out.iter().map(|(_, text)| text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        assert!(out[0].0.ends_with("a.txt"));
        assert!(out[1].0.ends_with("b.txt"));
    }

    #[test]
    fn text_input_is_labelled_as_stdin_placeholder() {
        let args = DetectArgs::try_parse_from(["detect", "--text", "hi"]).unwrap();
        let inputs = collect_inputs(&args).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].0, "<input>");
        assert_eq!(inputs[0].1, "hi");
    }

    #[test]
    fn missing_file_is_an_error() {
        let args =
            DetectArgs::try_parse_from(["detect", "--file", "/no/such/file.txt"]).unwrap();
        assert!(collect_inputs(&args).is_err());
    }
}
