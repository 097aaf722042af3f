//! End-of-run report.

use runner::RunSummary;

/// Print detailed summary
pub fn print_summary(summary: &RunSummary) {
    let stats = summary.stats.summary();
    let verdict = if summary.is_success() { "PASSED" } else { "FAILED" };

    println!("\n=== tee-stress: {verdict} ===\n");

    println!("Overview");
    println!("   ├─ Iterations: {}/{}", summary.executed, summary.requested);
    println!("   ├─ Duration: {:.2}s", summary.elapsed.as_secs_f64());
    println!("   ├─ Completed: {}", stats.completed);
    println!("   ├─ Errors: {}", stats.errors);
    println!("   ├─ Timeouts: {}", stats.timeouts);
    println!("   └─ Units consumed: {}", stats.units_consumed);

    println!("\nIteration duration (ms)");
    println!("   └─ {}", stats.duration_ms);

    if let Some(failed) = &summary.failed {
        println!("\nFailed iteration");
        println!("   ├─ Index: {}", failed.index);
        println!("   ├─ Pipeline: {}", failed.pipeline_name);
        println!("   ├─ Outcome: {}", failed.outcome);
        println!("   ├─ Branches attached: {}", failed.branches_attached);
        println!("   ├─ Remaining trace: {:?}", failed.remaining_trace);
        match &failed.failure {
            Some(error) => println!("   └─ Error: {error}"),
            None => println!("   └─ Error: -"),
        }
    }

    println!();
}
