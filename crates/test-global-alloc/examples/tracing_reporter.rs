use fragtrack::{HeapReport, Reporter};
use tracing::{info, info_span, warn};

struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, report: &HeapReport) -> Result<(), Box<dyn std::error::Error>> {
        let span = info_span!("fragtrack", caller = %report.caller_name);
        let _enter = span.enter();

        info!(
            live_records = report.stats.live_records,
            total_allocated = report.stats.total_allocated,
            largest_free_block = report.stats.largest_free_block,
            "fragmentation index {:.4} ({})",
            report.stats.fragmentation_index,
            report.fragmentation_level
        );

        for record in &report.largest_records {
            info!(address = %format!("{:#x}", record.address), size = record.size, "live block");
        }

        if report.stats.dropped_records > 0 {
            warn!(dropped = report.stats.dropped_records, "records dropped");
        }

        Ok(())
    }
}

#[global_allocator]
static GLOBAL: fragtrack::TrackingAllocator = fragtrack::TrackingAllocator::system();

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .init();

    let _guard = fragtrack::ReportGuardBuilder::new("main")
        .limit(3)
        .reporter(Box::new(TracingReporter))
        .build();

    let mut blocks: Vec<String> = (0..32).map(|i| "x".repeat(i * 10)).collect();
    blocks.retain(|s| s.len() % 30 == 0);
    std::hint::black_box(&blocks);

    Ok(())
}
