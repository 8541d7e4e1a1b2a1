use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

// Kept past `main` so the exit report lists them.
static KEPT: OnceLock<Vec<Vec<usize>>> = OnceLock::new();

fn allocate_and_work(thread_id: usize, iterations: usize) -> Vec<Vec<usize>> {
    let mut kept = Vec::new();
    for i in 0..iterations {
        let short_lived = vec![thread_id; 100];
        std::hint::black_box(&short_lived);

        let s = format!("Thread {} iteration {}", thread_id, i);
        std::hint::black_box(&s);

        if i % 10 == 0 {
            kept.push(vec![i; 1024]);
        }

        thread::sleep(Duration::from_micros(1));
    }
    kept
}

#[fragtrack::main(limit = 3)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    const NUM_THREADS: usize = 8;

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|i| thread::spawn(move || allocate_and_work(i, 50)))
        .collect();

    let mut kept = allocate_and_work(99, 50);
    for handle in handles {
        kept.extend(handle.join().expect("Thread panicked"));
    }

    let registry = fragtrack::global();
    let retained = kept
        .iter()
        .filter(|v| {
            registry.get(v.as_ptr() as usize) == Some(v.capacity() * std::mem::size_of::<usize>())
        })
        .count();
    println!("retained blocks tracked: {}/{}", retained, kept.len());

    println!("All threads completed successfully");
    let _ = KEPT.set(kept);

    Ok(())
}
