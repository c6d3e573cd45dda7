//! Session pump benchmark suite.
//!
//! Measures echo round trips through a full session (inbound pump,
//! handler, outbound pump) over an in-memory transport:
//! - Payload sizes: 64 B, 1 KiB, 16 KiB
//! - Messages per session: 100
//!
//! Run with: cargo bench --bench session_pump
//! Results saved to: target/criterion/

use activity_pump::{Handler, QueryParams, Session, UpgraderConfig, handler_fn};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Runtime;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::Role;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[64, 1024, 16 * 1024];
const MESSAGES_PER_SESSION: usize = 100;

// ============================================================================
// Benchmark: Echo Round Trip
// ============================================================================

fn bench_echo_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("session_pump");

    for &size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes((size * MESSAGES_PER_SESSION) as u64));
        group.bench_with_input(BenchmarkId::new("echo", size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async move {
                echo_session(size).await.expect("echo session");
            });
        });
    }

    group.finish();
}

// ============================================================================
// Helpers
// ============================================================================

fn echo_handler() -> impl Handler {
    handler_fn(|_identity, _query, mut inbound, outbound, _shutdown, mut notify| async move {
        loop {
            tokio::select! {
                _ = notify.recv() => break,
                received = inbound.recv() => match received {
                    Some(payload) => {
                        if outbound.send(payload).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    })
}

async fn echo_session(size: usize) -> anyhow::Result<()> {
    let (server, client) = tokio::io::duplex(256 << 10);
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    let mut client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;

    let session = Session::open("bench", &UpgraderConfig::new());
    let run = tokio::spawn(async move {
        let handler = echo_handler();
        session.run(server, QueryParams::default(), &handler).await
    });

    let payload = "a".repeat(size);
    for _ in 0..MESSAGES_PER_SESSION {
        client.send(Message::text(payload.clone())).await?;
        match client.next().await {
            Some(Ok(Message::Text(_))) => {}
            other => anyhow::bail!("unexpected reply: {other:?}"),
        }
    }

    client.close(None).await?;
    run.await?;
    Ok(())
}

criterion_group!(benches, bench_echo_round_trip);
criterion_main!(benches);
