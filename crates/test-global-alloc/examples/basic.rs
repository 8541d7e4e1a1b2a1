use std::sync::OnceLock;

use fragtrack::format_bytes;

// The exit report runs after `main`'s locals are dropped, so the surviving
// blocks are parked here to show up in it.
static SURVIVORS: OnceLock<Vec<Vec<u64>>> = OnceLock::new();

fn print_metrics(label: &str) {
    let stats = fragtrack::global().stats();
    println!(
        "{label}: {} records, {} allocated, fragmentation index {:.4}, largest free block {}",
        stats.live_records,
        format_bytes(stats.total_allocated as u64),
        stats.fragmentation_index,
        format_bytes(stats.largest_free_block as u64),
    );
}

#[fragtrack::main(limit = 5)]
fn main() {
    print_metrics("start");

    let mut blocks: Vec<Vec<u64>> = (1..=16).map(|i| vec![i; 16 * i as usize]).collect();
    print_metrics("after 16 allocations");

    // Free every other block to punch holes between the survivors.
    let mut index = 0;
    blocks.retain(|_| {
        index += 1;
        index % 2 == 0
    });
    print_metrics("after freeing every other block");

    let level = fragtrack::global().stats().fragmentation_level();
    println!("fragmentation level: {level}");

    let _ = SURVIVORS.set(blocks);
}
