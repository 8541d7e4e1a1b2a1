use std::time::Duration;

async fn fill(len: usize) -> Vec<u8> {
    tokio::time::sleep(Duration::from_millis(1)).await;
    vec![7; len]
}

#[fragtrack::main(format = "json-pretty")]
#[tokio::main]
async fn main() {
    let mut buffers = Vec::new();
    for i in 1..=8 {
        buffers.push(fill(i * 256).await);
    }
    buffers.retain(|b| b.len() % 512 == 0);

    println!("async buffers kept: {}", buffers.len());
}
