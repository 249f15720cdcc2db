use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use ngs_consensus::cli::Cli;
use ngs_consensus::fragment::{ExternalCommandProcessor, FragmentInput};

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let processor = ExternalCommandProcessor {
        program: cli.processor_cmd.clone(),
    };
    let fragments = discover_fragments(&cli.fragments_dir)?;
    info!("discovered {} fragment(s) in '{}'", fragments.len(), cli.fragments_dir.display());

    let config = cli.into_config()?;
    let summary = ngs_consensus::run(&processor, &fragments, &config)?;

    let score = summary
        .final_score
        .map(|s| format!("{s:.4}"))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "ran {} iteration(s), converged={}, final alignment score={score}, output in '{}'",
        summary.iterations_run,
        summary.converged,
        summary.output_dir.display()
    );
    Ok(())
}

/// Lists the input read fragments to drive the refinement loop over. Each
/// file directly under `fragments_dir` is treated as one fragment; its file
/// stem becomes the fragment id used to name its base-call output.
fn discover_fragments(fragments_dir: &std::path::Path) -> Result<Vec<FragmentInput>> {
    let mut fragments = Vec::new();
    for entry in fs::read_dir(fragments_dir)
        .with_context(|| format!("reading fragments directory '{}'", fragments_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let is_hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        if !path.is_file() || is_hidden {
            continue;
        }
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("fragment file '{}' has no usable file stem", path.display()))?
            .to_string();
        fragments.push(FragmentInput { id, path });
    }

    if fragments.is_empty() {
        anyhow::bail!(ngs_consensus::error::PipelineError::EmptyFragmentsDir {
            dir: fragments_dir.to_path_buf(),
        });
    }

    fragments.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(fragments)
}
