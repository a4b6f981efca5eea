//! Stress command implementation.

use mailroom_testkit::{run_contention, StressConfig, StressReport};
use tracing::info;

/// Runs the stress command.
pub async fn run(config: &StressConfig, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if config.writers == 0 || config.transactions_per_writer == 0 {
        return Err("writers and transactions must both be at least 1".into());
    }

    info!(
        writers = config.writers,
        transactions = config.transactions_per_writer,
        keys = config.keys,
        "starting contention run"
    );
    let report = run_contention(config).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_text(&report),
    }

    if !report.is_consistent() {
        return Err(format!(
            "store total {} does not match committed deltas {}",
            report.observed_total, report.expected_total
        )
        .into());
    }
    Ok(())
}

fn print_text(report: &StressReport) {
    report.print_summary("Contention Run");
    println!("Reloads: {}", report.stats.document_reloads);
    println!("Consistent: {}", if report.is_consistent() { "yes" } else { "NO" });
}
