use std::fmt::Write as _;

use snapsolve_core::content::{DebugResult, SolutionResult};
use snapsolve_core::orchestrator::PipelineEvent;
use snapsolve_llm::registry::ProviderDetails;
use tokio::sync::mpsc;

/// Print progress to stderr until every sender is gone.
pub(crate) async fn print_progress(mut rx: mpsc::UnboundedReceiver<PipelineEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Progress {
                message,
                percent,
                is_error,
            } => {
                if is_error {
                    eprintln!("[{percent:>3}%] error: {message}");
                } else {
                    eprintln!("[{percent:>3}%] {message}");
                }
            }
            PipelineEvent::ProblemExtracted(content) => {
                let tasks = content.tasks().len().max(1);
                eprintln!("       detected {} ({tasks} task(s))", content.kind);
            }
            PipelineEvent::Failed(e) => tracing::debug!("run failed: {e}"),
            PipelineEvent::SolutionReady(_) | PipelineEvent::DebugReady(_) => {}
        }
    }
}

pub(crate) fn print_solution(solution: &SolutionResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(solution)?);
    } else {
        print!("{}", render_solution(solution));
    }
    Ok(())
}

pub(crate) fn print_debug(result: &DebugResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    if !result.issues.is_empty() {
        println!("Issues:");
        for issue in &result.issues {
            println!("  - {issue}");
        }
        println!();
    }
    print!("{}", render_solution(&result.solution));
    Ok(())
}

pub(crate) fn print_providers(details: &[ProviderDetails], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(details)?);
    } else {
        print!("{}", render_providers(details));
    }
    Ok(())
}

fn render_solution(solution: &SolutionResult) -> String {
    let mut out = String::new();
    if !solution.thoughts.is_empty() {
        out.push_str("Thoughts:\n");
        for thought in &solution.thoughts {
            let _ = writeln!(out, "  - {thought}");
        }
        out.push('\n');
    }
    let _ = writeln!(out, "{}\n", solution.code.trim_end());
    let _ = writeln!(out, "Time complexity:  {}", solution.time_complexity);
    let _ = writeln!(out, "Space complexity: {}", solution.space_complexity);
    if solution.fallback_used {
        out.push_str("(the model answer was not fully structured; shown as received)\n");
    }
    out
}

fn render_providers(details: &[ProviderDetails]) -> String {
    let mut out = String::new();
    for entry in details {
        let d = &entry.descriptor;
        let pricing = if d.is_free { "free" } else { "paid" };
        let key = if d.requires_api_key { "key" } else { "no key" };
        let _ = writeln!(
            out,
            "{:<12} {:<22} {pricing:<5} {key:<7} {} model(s)",
            d.id,
            d.display_name,
            entry.models.len()
        );
        for model in &entry.models {
            let vision = if model.supports_vision { " [vision]" } else { "" };
            let _ = writeln!(out, "    {}{vision}", model.id);
        }
    }
    out
}
