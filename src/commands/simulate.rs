//! Simulate command implementation for the ICN CLI

use anyhow::Result;
use log::info;
use std::time::Duration;

use crate::simulation::{run_balanced_scenario, ScenarioOptions};
use crate::utils::{format_duration, print_header};

/// Run the balanced forwarding scenario and print what happened
pub async fn run(interests: usize, producer_delay_ms: u64, timeout_ms: u64) -> Result<()> {
    let options = ScenarioOptions {
        interests,
        producer_delay: Duration::from_millis(producer_delay_ms),
        timeout: Duration::from_millis(timeout_ms),
    };
    info!("Running balanced forwarding scenario: {:?}", options);

    let report = run_balanced_scenario(&options).await?;

    print_header("Results");
    for result in &report.results {
        println!("{:<12} {}", result.name.to_string(), result.outcome);
    }
    println!("completed in {}", format_duration(report.elapsed));

    print_header("Served by producer");
    for (node, count) in &report.served {
        println!("{:<6} {}", node, count);
    }

    for (node, metrics) in &report.metrics {
        print_header(&format!("Metrics {}", node));
        for (name, value) in metrics {
            println!("  {:<24} {}", name, value);
        }
    }

    Ok(())
}
