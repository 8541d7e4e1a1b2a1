use serde::{Deserialize, Serialize};

use crate::{AllocationRecord, FragmentationLevel, HeapStats};

/// Output format for heap reports.
///
/// * `Table` - Human-readable table format (default)
/// * `Json` - Compact JSON format (single line)
/// * `JsonPretty` - Pretty-printed JSON format with indentation
///
/// ```rust
/// use fragtrack::{Format, ReportGuardBuilder};
///
/// let _guard = ReportGuardBuilder::new("main")
///     .format(Format::JsonPretty)
///     .build();
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Table,
    Json,
    JsonPretty,
}

/// Everything a [`Reporter`] receives when a [`ReportGuard`](crate::ReportGuard)
/// is dropped. Serializes to the JSON printed by the JSON reporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapReport {
    pub caller_name: String,
    /// Nanoseconds between building the guard and dropping it.
    pub total_elapsed: u64,
    pub fragmentation_level: FragmentationLevel,
    pub stats: HeapStats,
    /// Biggest live blocks, biggest first. Empty unless a listing limit is set.
    pub largest_records: Vec<AllocationRecord>,
}

impl HeapReport {
    pub fn new(
        caller_name: impl Into<String>,
        total_elapsed: u64,
        stats: HeapStats,
        largest_records: Vec<AllocationRecord>,
    ) -> Self {
        Self {
            caller_name: caller_name.into(),
            total_elapsed,
            fragmentation_level: stats.fragmentation_level(),
            stats,
            largest_records,
        }
    }
}

/// Trait for implementing custom heap report output.
///
/// Implement this trait to send reports to a logging system, a file, or a CI
/// check instead of stdout.
///
/// ```rust
/// use fragtrack::{HeapReport, Reporter};
/// use std::error::Error;
///
/// struct SimpleLogger;
///
/// impl Reporter for SimpleLogger {
///     fn report(&self, report: &HeapReport) -> Result<(), Box<dyn Error>> {
///         println!("{}: {} live bytes", report.caller_name, report.stats.total_allocated);
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter: Send + Sync {
    fn report(&self, report: &HeapReport) -> Result<(), Box<dyn std::error::Error>>;
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log(THRESHOLD).floor() as usize).min(UNITS.len() - 1);
    let unit_value = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", unit_value, UNITS[unit_index])
    }
}
