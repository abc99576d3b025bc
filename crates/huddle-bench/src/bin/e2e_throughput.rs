//! End-to-end throughput benchmark for Huddle.
//!
//! Connects N authenticated clients to one room of a running server, has
//! every client post chat messages as fast as it can, and counts the chat
//! events delivered back.

use futures_util::{SinkExt, StreamExt};
use huddle_protocol::{codec, Event, InboundFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};

const SERVER_URL: &str = "ws://127.0.0.1:8080/ws/chat/general";
const USER_HEADER: &str = "x-authenticated-user";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("Huddle end-to-end throughput benchmark");
    println!("Make sure the server is running: cargo run --release --bin huddle");
    println!();

    run_chat_benchmark(num_clients).await;
}

async fn run_chat_benchmark(num_clients: usize) {
    println!("Chat benchmark: {} clients in one room", num_clients);
    println!("  Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let message_count = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 1));

    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let msg_count = Arc::clone(&message_count);
        let barrier = Arc::clone(&barrier);

        let handle = tokio::spawn(async move {
            if let Err(e) = run_client(client_id, msg_count, barrier).await {
                eprintln!("Client {} error: {}", client_id, e);
            }
        });
        handles.push(handle);
    }

    // Wait for all clients to connect
    barrier.wait().await;
    println!("All {} clients connected", num_clients);

    println!("Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    message_count.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_messages = message_count.load(Ordering::SeqCst);

    let msgs_per_sec = total_messages as f64 / elapsed.as_secs_f64();
    let msgs_per_sec_per_client = msgs_per_sec / num_clients as f64;

    println!();
    println!("Results");
    println!("  Clients:        {:>10}", num_clients);
    println!("  Duration:       {:>10.2}s", elapsed.as_secs_f64());
    println!("  Delivered:      {:>10}", total_messages);
    println!("  Throughput:     {:>10.0} events/s", msgs_per_sec);
    println!("  Per-Client:     {:>10.0} events/s", msgs_per_sec_per_client);

    for handle in handles {
        handle.abort();
    }
}

async fn run_client(
    client_id: usize,
    message_count: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut request = SERVER_URL.into_client_request()?;
    request.headers_mut().insert(
        USER_HEADER,
        HeaderValue::from_str(&format!("bench-{}", client_id))?,
    );
    let (ws, _) = connect_async(request).await?;
    let (mut sender, mut receiver) = ws.split();

    // The server opens with the room's user list.
    if let Some(Ok(_user_list)) = receiver.next().await {}

    barrier.wait().await;

    let chat = codec::encode_inbound(&InboundFrame::new("benchmark payload"))?;
    let chat_msg = Message::Text(chat);

    let recv_count = Arc::clone(&message_count);
    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            if let Ok(Message::Text(text)) = result {
                if let Ok(Event::ChatMessage { .. }) = codec::decode(&text) {
                    recv_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    });

    loop {
        if sender.send(chat_msg.clone()).await.is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
