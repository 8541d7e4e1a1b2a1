use std::alloc::System;

use fragtrack::{Registry, TrackingAllocator};

// A bounded registry of its own, kept apart from the global one.
static REGISTRY: Registry = Registry::with_limit(64);

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::with_registry(System, &REGISTRY);

fn main() {
    let blocks: Vec<Box<[u8; 256]>> = (0..200).map(|_| Box::new([0u8; 256])).collect();

    let stats = REGISTRY.stats();
    println!("live records: {}", stats.live_records);
    println!("limit: {:?}", REGISTRY.limit());
    println!("dropped records: {}", stats.dropped_records > 0);
    println!("global registry empty: {}", fragtrack::global().is_empty());

    drop(blocks);
}
