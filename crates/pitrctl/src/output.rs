//! Terminal output - ASCII status lines, colored in text mode.

use owo_colors::OwoColorize;
use pitr_common::plan::Plan;
use pitr_common::{Outcome, OutputFormat};

/// Print an outcome. Text goes to stdout on success and stderr on failure,
/// structured formats always go to stdout.
pub fn emit(outcome: &Outcome, format: OutputFormat) {
    if format.is_structured() {
        println!("{}", outcome.render(format));
        return;
    }

    if outcome.success {
        println!("{} {}", "[OK]".bright_green(), outcome.message);
        if let Some(detail) = &outcome.detail {
            println!("  {}", detail);
        }
    } else {
        eprintln!(
            "{} {} {}",
            "[ERROR]".bright_red(),
            outcome.message,
            format!("(code {})", outcome.code).dimmed()
        );
        if let Some(detail) = &outcome.detail {
            eprintln!("  {}", detail.yellow());
        }
    }
}

/// Print a plan in the requested format
pub fn emit_plan(plan: &Plan, format: OutputFormat) {
    match format {
        OutputFormat::Text => print!("{}", plan.to_text()),
        other => println!("{}", plan.render(other)),
    }
}
