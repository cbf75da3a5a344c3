use std::path::PathBuf;
use std::time::Duration;

use qdrill_core::{ReceiveOptions, RemainderPolicy, RunConfig};

use crate::cli::DrillArgs;
use crate::drill_yaml::{DrillYaml, YamlDuration};

pub(crate) const DEFAULT_TOTAL: u64 = 1000;
pub(crate) const DEFAULT_PRODUCERS: u64 = 25;
pub(crate) const DEFAULT_CONSUMERS: u64 = 25;
pub(crate) const DEFAULT_QUEUE: &str = "local-pedro";
pub(crate) const DEFAULT_ENDPOINT: &str = "http://localhost:4575";
pub(crate) const DEFAULT_REGION: &str = "us-west-1";

/// Prefix selecting the in-process queue instead of a remote service.
pub(crate) const MEMORY_ENDPOINT: &str = "memory://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Http(String),
    Memory,
}

impl Endpoint {
    pub(crate) fn parse(raw: &str) -> anyhow::Result<Self> {
        let raw = raw.trim();
        if raw.starts_with(MEMORY_ENDPOINT) {
            return Ok(Self::Memory);
        }
        if raw.starts_with("http://") {
            return Ok(Self::Http(raw.to_string()));
        }
        anyhow::bail!("unsupported endpoint `{raw}` (expected http://host:port or memory://)")
    }

    pub(crate) fn as_str(&self) -> &str {
        match self {
            Self::Http(url) => url,
            Self::Memory => MEMORY_ENDPOINT,
        }
    }
}

/// Fully resolved drill settings: CLI/env over YAML over defaults.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub run: RunConfig,
    pub endpoint: Endpoint,
    pub region: String,
    pub body_file: Option<PathBuf>,
}

impl Settings {
    pub(crate) fn resolve(args: &DrillArgs, file: DrillYaml) -> anyhow::Result<Self> {
        let defaults = ReceiveOptions::default();
        let duration = |cli: Option<Duration>, yaml: Option<YamlDuration>| {
            cli.or_else(|| yaml.map(YamlDuration::into_inner))
        };

        let remainder = match (args.remainder, file.remainder.as_deref()) {
            (Some(p), _) => p,
            (None, Some(raw)) => raw.parse::<RemainderPolicy>().map_err(|_| {
                anyhow::anyhow!("invalid remainder policy `{raw}` (expected spread or drop)")
            })?,
            (None, None) => RemainderPolicy::default(),
        };

        let mut run = RunConfig::new(
            args.total.or(file.total).unwrap_or(DEFAULT_TOTAL),
            args.producers.or(file.producers).unwrap_or(DEFAULT_PRODUCERS),
            args.consumers.or(file.consumers).unwrap_or(DEFAULT_CONSUMERS),
            args.queue
                .clone()
                .or(file.queue)
                .unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
        );
        run.remainder = remainder;
        run.receive = ReceiveOptions {
            max_batch: args.batch_size.or(file.batch_size).unwrap_or(defaults.max_batch),
            wait_time: duration(args.wait_time, file.wait_time).unwrap_or(defaults.wait_time),
            visibility_timeout: duration(args.visibility_timeout, file.visibility_timeout)
                .unwrap_or(defaults.visibility_timeout),
        };
        run.receive_timeout = duration(args.receive_timeout, file.receive_timeout);
        if let Some(grace) = duration(args.shutdown_grace, file.shutdown_grace) {
            run.shutdown_grace = grace;
        }
        // Flags can only switch a phase off; the file decides otherwise.
        run.skip_send = args.skip_send || file.skip_send.unwrap_or(false);
        run.skip_receive = args.skip_receive || file.skip_receive.unwrap_or(false);

        let endpoint = args
            .endpoint
            .clone()
            .or(file.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            run,
            endpoint: Endpoint::parse(&endpoint)?,
            region: args
                .region
                .clone()
                .or(file.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            body_file: args.body_file.clone().or(file.body_file),
        })
    }

    /// The settings as a config file that resolves back to the same drill.
    pub(crate) fn to_yaml(&self) -> DrillYaml {
        let run = &self.run;
        DrillYaml {
            total: Some(run.total),
            producers: Some(run.producer_concurrency),
            consumers: Some(run.consumer_concurrency),
            queue: Some(run.queue.clone()),
            endpoint: Some(self.endpoint.as_str().to_string()),
            region: Some(self.region.clone()),
            batch_size: Some(run.receive.max_batch),
            wait_time: Some(run.receive.wait_time.into()),
            visibility_timeout: Some(run.receive.visibility_timeout.into()),
            remainder: Some(run.remainder.to_string()),
            receive_timeout: run.receive_timeout.map(YamlDuration::from),
            shutdown_grace: Some(run.shutdown_grace.into()),
            skip_send: Some(run.skip_send),
            skip_receive: Some(run.skip_receive),
            body_file: self.body_file.clone(),
        }
    }
}
