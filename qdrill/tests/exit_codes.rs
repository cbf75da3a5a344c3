use std::path::Path;
use std::process::{Command, Output};

use anyhow::Context as _;
use qdrill_testqueue::TestQueue;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn expect_code(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

async fn run_qdrill(args: Vec<String>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_qdrill");
    tokio::task::spawn_blocking(move || Command::new(exe).args(&args).output())
        .await
        .context("spawn_blocking join")?
        .context("run qdrill binary")
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_qdrill");

    let out = Command::new(exe)
        .arg("run")
        .arg("--wait-time")
        .arg("10x")
        .output()
        .context("run qdrill binary")?;

    expect_code(&out, 30)
}

#[test]
fn help_exits_0() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_qdrill");

    let out = Command::new(exe)
        .arg("--help")
        .output()
        .context("run qdrill binary")?;

    expect_code(&out, 0)
}

#[tokio::test]
async fn zero_total_exit_30() -> anyhow::Result<()> {
    let out = run_qdrill(args(&["run", "--endpoint", "memory://", "--total", "0"])).await?;
    expect_code(&out, 30)?;
    anyhow::ensure!(
        String::from_utf8_lossy(&out.stderr).contains("invalid drill config"),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

#[tokio::test]
async fn oversized_batch_exit_30() -> anyhow::Result<()> {
    let out = run_qdrill(args(&[
        "run",
        "--endpoint",
        "memory://",
        "--batch-size",
        "11",
    ]))
    .await?;
    expect_code(&out, 30)
}

#[tokio::test]
async fn unknown_yaml_key_exit_30() -> anyhow::Result<()> {
    let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/configs/unknown_key.yaml");
    let out = run_qdrill(vec![
        "run".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ])
    .await?;
    expect_code(&out, 30)
}

#[tokio::test]
async fn unsupported_endpoint_exit_30() -> anyhow::Result<()> {
    let out = run_qdrill(args(&["run", "--endpoint", "ftp://localhost:21"])).await?;
    expect_code(&out, 30)
}

#[tokio::test]
async fn unknown_queue_exit_40() -> anyhow::Result<()> {
    let server = TestQueue::start(&["jobs"]).await.context("start test queue")?;
    let endpoint = server.base_url().to_string();

    let out = run_qdrill(vec![
        "run".to_string(),
        "--endpoint".to_string(),
        endpoint,
        "--queue".to_string(),
        "missing".to_string(),
        "--total".to_string(),
        "10".to_string(),
    ])
    .await?;

    let sends = server.stats().sends();
    server.shutdown().await;

    expect_code(&out, 40)?;
    anyhow::ensure!(sends == 0, "no message may be sent before setup succeeds");
    Ok(())
}

#[tokio::test]
async fn clean_memory_drill_exit_0() -> anyhow::Result<()> {
    let out = run_qdrill(args(&[
        "run",
        "--endpoint",
        "memory://",
        "--total",
        "50",
        "--producers",
        "5",
        "--consumers",
        "5",
        "--wait-time",
        "1s",
    ]))
    .await?;
    expect_code(&out, 0)
}

#[tokio::test]
async fn receive_timeout_exit_11() -> anyhow::Result<()> {
    // Nothing was sent, so the receive phase can only end by timing out.
    let out = run_qdrill(args(&[
        "run",
        "--endpoint",
        "memory://",
        "--skip-send",
        "--total",
        "20",
        "--consumers",
        "2",
        "--wait-time",
        "100ms",
        "--receive-timeout",
        "300ms",
        "--shutdown-grace",
        "500ms",
        "--output",
        "json",
    ]))
    .await?;
    expect_code(&out, 11)
}

#[tokio::test]
async fn over_long_wait_time_exit_30() -> anyhow::Result<()> {
    let out = run_qdrill(args(&["run", "--endpoint", "memory://", "--wait-time", "30s"])).await?;
    expect_code(&out, 30)
}

#[tokio::test]
async fn zero_visibility_timeout_exit_30() -> anyhow::Result<()> {
    let out = run_qdrill(args(&[
        "run",
        "--endpoint",
        "memory://",
        "--visibility-timeout",
        "0s",
    ]))
    .await?;
    expect_code(&out, 30)
}

#[tokio::test]
async fn out_of_range_yaml_duration_exit_30() -> anyhow::Result<()> {
    let config = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/configs/huge_duration.yaml");
    let out = run_qdrill(vec![
        "run".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ])
    .await?;
    expect_code(&out, 30)?;
    anyhow::ensure!(
        String::from_utf8_lossy(&out.stderr).contains("failed to parse YAML"),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}
