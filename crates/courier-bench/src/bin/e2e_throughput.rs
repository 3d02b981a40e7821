//! End-to-end throughput benchmark for Courier.
//!
//! Each client plays a transport adapter: it opens one AMQP connection with
//! a producer and a consumer link on its own queue, then streams message
//! arrivals over the bridge and counts the `Send` commands coming back.

use bytes::BytesMut;
use courier_bench::arrival;
use courier_protocol::{
    codec, Command, ConnectionId, Event, Frame, LinkId, Role, Terminus, TerminusKind,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SERVER_URL: &str = "ws://127.0.0.1:5672/bridge";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;
const CREDIT_WINDOW: u32 = 1000;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║         Courier End-to-End Throughput Benchmark              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Make sure the server is running: cargo run --release        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    run_benchmark(num_clients).await;
}

async fn run_benchmark(num_clients: usize) {
    println!("📊 Publish/Consume Benchmark: {} clients", num_clients);
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
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

    barrier.wait().await;
    println!("✓ All {} clients connected", num_clients);

    println!("⏳ Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    message_count.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("📈 Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total_messages = message_count.load(Ordering::SeqCst);

    let msgs_per_sec = total_messages as f64 / elapsed.as_secs_f64();
    let msgs_per_sec_per_client = msgs_per_sec / num_clients as f64;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Clients:              {:>10}                           ║",
        num_clients
    );
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!(
        "║  Delivered Messages:   {:>10}                           ║",
        total_messages
    );
    println!(
        "║  Throughput:           {:>10.0} msg/s                    ║",
        msgs_per_sec
    );
    println!(
        "║  Per-Client:           {:>10.0} msg/s                    ║",
        msgs_per_sec_per_client
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    for handle in handles {
        handle.abort();
    }
}

fn encode(frame: &Frame) -> Result<Message, BoxError> {
    Ok(Message::Binary(codec::encode(frame)?.to_vec()))
}

async fn run_client(
    client_id: usize,
    message_count: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let (ws, _) = connect_async(SERVER_URL).await?;
    let (mut sender, mut receiver) = ws.split();

    sender.send(encode(&Frame::hello())?).await?;
    match receiver.next().await {
        Some(Ok(Message::Binary(data))) => match codec::decode(&data)? {
            Frame::Ready { .. } => {}
            other => return Err(format!("Expected ready, got {}", other.kind()).into()),
        },
        _ => return Err("Bridge closed during handshake".into()),
    }

    let connection = ConnectionId::new(format!("bench-{client_id}"));
    let queue = format!("bench-{client_id}");
    let producer = LinkId::new(connection.clone(), "producer");
    let consumer = LinkId::new(connection.clone(), "consumer");

    for event in [
        Event::ConnectionOpening {
            connection: connection.clone(),
        },
        Event::LinkOpening {
            link: producer.clone(),
            role: Role::Receiver,
            source: Terminus::default(),
            target: Terminus::address(TerminusKind::Target, queue.clone()),
            credit: 0,
        },
        Event::LinkOpening {
            link: consumer.clone(),
            role: Role::Sender,
            source: Terminus::address(TerminusKind::Source, queue),
            target: Terminus::default(),
            credit: 0,
        },
        Event::LinkSendable {
            link: consumer.clone(),
            credit: CREDIT_WINDOW,
        },
    ] {
        sender.send(encode(&Frame::event(event))?).await?;
    }

    barrier.wait().await;

    // Consumer: count sends and top credit back up every half window.
    let (credit_tx, mut credit_rx) = tokio::sync::mpsc::unbounded_channel::<u32>();
    let recv_count = message_count.clone();
    let recv_consumer = consumer.clone();
    let recv_task = tokio::spawn(async move {
        let mut recv_buf = BytesMut::with_capacity(65536);
        let mut outstanding = CREDIT_WINDOW;

        while let Some(result) = receiver.next().await {
            if let Ok(Message::Binary(data)) = result {
                recv_buf.extend_from_slice(&data);
                while let Ok(Some(frame)) = codec::decode_from(&mut recv_buf) {
                    if let Frame::Command {
                        command: Command::Send { link, .. },
                    } = frame
                    {
                        if link == recv_consumer {
                            recv_count.fetch_add(1, Ordering::Relaxed);
                            outstanding = outstanding.saturating_sub(1);
                            if outstanding < CREDIT_WINDOW / 2 {
                                outstanding = CREDIT_WINDOW;
                                let _ = credit_tx.send(CREDIT_WINDOW);
                            }
                        }
                    }
                }
            }
        }
    });

    let mut tag = 0;
    loop {
        while let Ok(credit) = credit_rx.try_recv() {
            let grant = Event::LinkSendable {
                link: consumer.clone(),
                credit,
            };
            if sender.send(encode(&Frame::event(grant))?).await.is_err() {
                break;
            }
        }

        tag += 1;
        let frame = Frame::event(arrival(producer.clone(), tag, 64));
        if sender.send(encode(&frame)?).await.is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    recv_task.abort();
    Ok(())
}
