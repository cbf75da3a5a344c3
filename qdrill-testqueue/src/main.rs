use std::net::SocketAddr;
use std::sync::Arc;

use qdrill_core::MemoryQueue;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:4575".parse()?;
    let mut queues: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:4575")
                })?;
                bind_addr = addr.parse()?;
            }
            "--queue" => {
                let name = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--queue requires a queue name"))?;
                queues.push(name);
            }
            "-h" | "--help" => {
                eprintln!(
                    "qdrill-testqueue\n\nUSAGE:\n  qdrill-testqueue [--bind 127.0.0.1:4575] [--queue <name>]...\n\nOUTPUT:\n  Prints ENDPOINT=<url> and one QUEUE_URL=<url> per queue to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }
    if queues.is_empty() {
        queues.push("local-pedro".to_string());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let queue = Arc::new(MemoryQueue::new());
    for name in &queues {
        queue.create_queue(name.as_str());
    }

    let base_url = format!("http://{addr}");
    let app = qdrill_testqueue::router(queue, &base_url, Default::default());

    println!("ENDPOINT={base_url}");
    for name in &queues {
        println!("QUEUE_URL={}", qdrill_testqueue::queue_url(&base_url, name));
    }
    tracing::info!(%addr, queues = queues.len(), "test queue listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
