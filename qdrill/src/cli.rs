use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use qdrill_core::RemainderPolicy;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 20s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 20s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 20s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 20s, 250ms, 1m)"
        )),
    }
}

fn parse_remainder(input: &str) -> Result<RemainderPolicy, String> {
    input
        .trim()
        .parse()
        .map_err(|_| format!("invalid remainder policy '{input}' (expected spread or drop)"))
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    HumanReadable,
    /// Emit JSON progress and summary lines (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "qdrill",
    author,
    version,
    about = "Send/receive throughput drill for SQS-compatible queues",
    long_about = "qdrill sends a fixed number of messages to a queue with a pool of producers, then drains the same number with a pool of consumers, and reports rate and per-request latency for both phases.\n\nSettings are layered: CLI flags and QDRILL_* environment variables win over a --config YAML file, which wins over the built-in defaults.",
    after_help = "Examples:\n  qdrill run\n  qdrill run --total 10000 --producers 50 --consumers 50 --queue orders\n  qdrill run --endpoint memory:// --output json\n  qdrill run --config drill.yaml --skip-receive\n  qdrill export-config --total 5000 --out drill.yaml"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the send/receive drill
    Run(RunArgs),

    /// Write the fully resolved drill settings as YAML
    ExportConfig(ExportConfigArgs),
}

/// Drill settings shared by every subcommand. `None` means "not set on the command line".
#[derive(Debug, Clone, Default, Args)]
pub struct DrillArgs {
    /// YAML file with drill settings (flags override it)
    #[arg(long, env = "QDRILL_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Messages to send, and to receive
    #[arg(long, env = "QDRILL_TOTAL")]
    pub total: Option<u64>,

    /// Concurrent producer workers
    #[arg(long, env = "QDRILL_PRODUCERS")]
    pub producers: Option<u64>,

    /// Concurrent consumer workers
    #[arg(long, env = "QDRILL_CONSUMERS")]
    pub consumers: Option<u64>,

    /// Queue name to resolve
    #[arg(long, env = "QDRILL_QUEUE")]
    pub queue: Option<String>,

    /// Queue service endpoint (http://host:port, or memory:// for an in-process queue)
    #[arg(long, env = "QDRILL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Region name sent along with every request
    #[arg(long, env = "QDRILL_REGION")]
    pub region: Option<String>,

    /// Max messages per receive call (1-10)
    #[arg(long, env = "QDRILL_BATCH_SIZE")]
    pub batch_size: Option<u32>,

    /// Long-poll wait per receive call (e.g. 20s)
    #[arg(long, env = "QDRILL_WAIT_TIME", value_parser = parse_duration)]
    pub wait_time: Option<Duration>,

    /// How long received messages stay invisible to other consumers (e.g. 20s)
    #[arg(long, env = "QDRILL_VISIBILITY_TIMEOUT", value_parser = parse_duration)]
    pub visibility_timeout: Option<Duration>,

    /// What to do when total is not divisible by producers: spread or drop
    #[arg(long, env = "QDRILL_REMAINDER", value_parser = parse_remainder)]
    pub remainder: Option<RemainderPolicy>,

    /// Give up on the receive phase after this long (default: wait until drained)
    #[arg(long, env = "QDRILL_RECEIVE_TIMEOUT", value_parser = parse_duration)]
    pub receive_timeout: Option<Duration>,

    /// How long consumers may finish their last poll before being aborted
    #[arg(long, env = "QDRILL_SHUTDOWN_GRACE", value_parser = parse_duration)]
    pub shutdown_grace: Option<Duration>,

    /// Skip the send phase (drain a queue filled earlier)
    #[arg(long)]
    pub skip_send: bool,

    /// Skip the receive phase (only fill the queue)
    #[arg(long)]
    pub skip_receive: bool,

    /// Send this file's contents as the message body
    #[arg(long, env = "QDRILL_BODY_FILE", value_name = "PATH")]
    pub body_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub drill: DrillArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Log filter (e.g. debug, qdrill_core=trace); overrides RUST_LOG
    #[arg(long, env = "QDRILL_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportConfigArgs {
    #[command(flatten)]
    pub drill: DrillArgs,

    /// Output YAML file path (stdout when omitted)
    #[arg(long)]
    pub out: Option<PathBuf>,
}
