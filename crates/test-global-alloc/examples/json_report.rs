use std::sync::OnceLock;

// Still live when the exit report is taken.
static RETAINED: OnceLock<(Vec<u8>, Vec<u8>)> = OnceLock::new();

#[fragtrack::main(format = "json", limit = 2)]
fn main() {
    let small = vec![0u8; 100];
    let gap = vec![0u8; 4096];
    let large = vec![0u8; 1000];
    drop(gap);

    let _ = RETAINED.set((small, large));
}
