use colored::*;
use prettytable::{color, Attr, Cell, Row, Table};
use std::time::Duration;

use crate::output::{format_bytes, HeapReport, Reporter};
use crate::FragmentationLevel;

fn header_cell(text: &str, use_colors: bool) -> Cell {
    if use_colors {
        Cell::new(text)
            .with_style(Attr::Bold)
            .with_style(Attr::ForegroundColor(color::CYAN))
    } else {
        Cell::new(text).with_style(Attr::Bold)
    }
}

fn level_label(level: FragmentationLevel) -> ColoredString {
    match level {
        FragmentationLevel::Acceptable => level.to_string().green(),
        FragmentationLevel::Concerning => level.to_string().yellow(),
        FragmentationLevel::Severe => level.to_string().red().bold(),
    }
}

pub(crate) fn display_table(report: &HeapReport) {
    let use_colors = std::env::var("NO_COLOR").is_err();
    let stats = &report.stats;

    let mut table = Table::new();
    table.add_row(Row::new(vec![
        header_cell("Metric", use_colors),
        header_cell("Value", use_colors),
    ]));

    let rows = [
        ("Live records", stats.live_records.to_string()),
        ("Total allocated", format_bytes(stats.total_allocated as u64)),
        ("Span", format_bytes(stats.span as u64)),
        (
            "Fragmentation index",
            format!(
                "{:.4} ({})",
                stats.fragmentation_index,
                level_label(report.fragmentation_level)
            ),
        ),
        (
            "Largest free block",
            format_bytes(stats.largest_free_block as u64),
        ),
        ("Dropped records", stats.dropped_records.to_string()),
    ];
    for (name, value) in rows {
        table.add_row(Row::new(vec![Cell::new(name), Cell::new(&value)]));
    }

    println!(
        "{} heap fragmentation - live blocks ordered by address",
        "[fragtrack]".blue().bold(),
    );
    println!(
        "{}: {:.2?}",
        report.caller_name.yellow().bold(),
        Duration::from_nanos(report.total_elapsed),
    );

    table.printstd();

    if !report.largest_records.is_empty() {
        let mut records = Table::new();
        records.add_row(Row::new(vec![
            header_cell("Address", use_colors),
            header_cell("Size", use_colors),
        ]));
        for record in &report.largest_records {
            records.add_row(Row::new(vec![
                Cell::new(&format!("{:#x}", record.address)),
                Cell::new(&format_bytes(record.size as u64)),
            ]));
        }

        println!();
        println!(
            "Largest live blocks ({}/{})",
            report.largest_records.len(),
            stats.live_records
        );
        records.printstd();
    }

    if stats.dropped_records > 0 {
        println!();
        println!(
            "* {} allocations were served but not recorded, metrics undercount the heap.",
            stats.dropped_records.to_string().yellow().bold()
        );
        println!(
            "  Raise the record cap given to {}.",
            "Registry::with_limit".cyan().bold()
        );
    }
}

pub(crate) struct TableReporter;

impl Reporter for TableReporter {
    fn report(&self, report: &HeapReport) -> Result<(), Box<dyn std::error::Error>> {
        display_table(report);
        Ok(())
    }
}

pub(crate) struct JsonReporter;

impl Reporter for JsonReporter {
    fn report(&self, report: &HeapReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", serde_json::to_string(report)?);
        Ok(())
    }
}

pub(crate) struct JsonPrettyReporter;

impl Reporter for JsonPrettyReporter {
    fn report(&self, report: &HeapReport) -> Result<(), Box<dyn std::error::Error>> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok(())
    }
}
