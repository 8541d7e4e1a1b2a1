use std::time::Instant;

use crate::output::{Format, HeapReport, Reporter};
use crate::reporters::{JsonPrettyReporter, JsonReporter, TableReporter};
use crate::{global, suppress_tracking, Registry};

/// Builder for a guard that prints a heap fragmentation report when dropped.
///
/// # Examples
///
/// Basic usage with default settings:
///
/// ```rust
/// use fragtrack::ReportGuardBuilder;
///
/// let _guard = ReportGuardBuilder::new("my_program").build();
/// // Report is printed when _guard goes out of scope
/// ```
///
/// Custom configuration:
///
/// ```rust
/// use fragtrack::{Format, ReportGuardBuilder};
///
/// let _guard = ReportGuardBuilder::new("benchmark")
///     .limit(10)
///     .format(Format::JsonPretty)
///     .build();
/// ```
///
/// The builder only reads the registry. Records appear in it only when a
/// [`TrackingAllocator`](crate::TrackingAllocator) is installed, either by
/// hand or through the [`main`](crate::main) macro.
pub struct ReportGuardBuilder {
    caller_name: &'static str,
    reporter: ReporterConfig,
    limit: usize,
    registry: &'static Registry,
}

enum ReporterConfig {
    Format(Format),
    Custom(Box<dyn Reporter>),
    None, // Will default to Format::Table
}

impl ReportGuardBuilder {
    /// Creates a builder reporting on the [`global`] registry under
    /// `caller_name`.
    pub fn new(caller_name: &'static str) -> Self {
        Self {
            caller_name,
            reporter: ReporterConfig::None,
            limit: 0,
            registry: global(),
        }
    }

    /// Number of largest live blocks listed in the report.
    ///
    /// Default: `0` (none listed). `FRAGTRACK_RECORDS` overrides it.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the output format for the report.
    pub fn format(mut self, format: Format) -> Self {
        self.reporter = ReporterConfig::Format(format);
        self
    }

    /// Sets a custom reporter. Overrides any format setting.
    ///
    /// ```rust
    /// use fragtrack::{HeapReport, ReportGuardBuilder, Reporter};
    ///
    /// struct CsvReporter;
    /// impl Reporter for CsvReporter {
    ///     fn report(&self, report: &HeapReport) -> Result<(), Box<dyn std::error::Error>> {
    ///         println!("{},{}", report.caller_name, report.stats.fragmentation_index);
    ///         Ok(())
    ///     }
    /// }
    ///
    /// let _guard = ReportGuardBuilder::new("main")
    ///     .reporter(Box::new(CsvReporter))
    ///     .build();
    /// ```
    pub fn reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = ReporterConfig::Custom(reporter);
        self
    }

    /// Reports on `registry` instead of the global one.
    pub fn registry(mut self, registry: &'static Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Builds the guard.
    ///
    /// `FRAGTRACK_JSON=1` (or `true`) replaces the configured reporter with
    /// the compact JSON one. `FRAGTRACK_RECORDS=N` overrides the listing
    /// limit.
    pub fn build(self) -> ReportGuard {
        let _untracked = suppress_tracking();

        let reporter: Box<dyn Reporter> = if env_flag("FRAGTRACK_JSON") {
            Box::new(JsonReporter)
        } else {
            match self.reporter {
                ReporterConfig::Format(format) => match format {
                    Format::Table => Box::new(TableReporter),
                    Format::Json => Box::new(JsonReporter),
                    Format::JsonPretty => Box::new(JsonPrettyReporter),
                },
                ReporterConfig::Custom(reporter) => reporter,
                ReporterConfig::None => Box::new(TableReporter),
            }
        };

        let limit = std::env::var("FRAGTRACK_RECORDS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(self.limit);

        tracing::debug!(
            caller = self.caller_name,
            limit,
            live_records = self.registry.len(),
            "fragtrack report guard started"
        );

        ReportGuard {
            caller_name: self.caller_name,
            reporter,
            limit,
            registry: self.registry,
            start_time: Instant::now(),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

/// Prints a heap report when dropped. Created by [`ReportGuardBuilder`].
///
/// The report describes the registry at the moment of the drop. A guard
/// created at the top of `main` (which is what [`main`](crate::main) does)
/// outlives every local of `main`, so its report lists only blocks still live
/// at exit. Call [`snapshot`](Self::snapshot) earlier to see the working set.
pub struct ReportGuard {
    caller_name: &'static str,
    reporter: Box<dyn Reporter>,
    limit: usize,
    registry: &'static Registry,
    start_time: Instant,
}

impl ReportGuard {
    /// Report for the current registry contents, without printing it.
    pub fn snapshot(&self) -> HeapReport {
        let _untracked = suppress_tracking();
        let total_elapsed = self.start_time.elapsed().as_nanos() as u64;
        let largest_records = if self.limit > 0 {
            self.registry.largest_records(self.limit)
        } else {
            Vec::new()
        };
        HeapReport::new(
            self.caller_name,
            total_elapsed,
            self.registry.stats(),
            largest_records,
        )
    }
}

impl Drop for ReportGuard {
    fn drop(&mut self) {
        let report = self.snapshot();
        let _untracked = suppress_tracking();

        if report.stats.dropped_records > 0 {
            tracing::warn!(
                dropped = report.stats.dropped_records,
                "some allocations were not recorded"
            );
        }

        match self.reporter.report(&report) {
            Ok(()) => (),
            Err(e) => eprintln!("Failed to report fragtrack metrics: {}", e),
        }
    }
}
