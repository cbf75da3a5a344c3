use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;

use qdrill_core::{MemoryQueue, MessageTemplate, QueueClient, SqsClient};

use crate::cli::RunArgs;
use crate::drill_yaml::{DrillYaml, load_drill_yaml};
use crate::exit_codes::ExitCode;
use crate::logging;
use crate::output::{self, OutputFormatter};
use crate::run_error::RunError;
use crate::settings::{Endpoint, Settings};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    logging::init_logging(args.log_level.as_deref()).map_err(RunError::InvalidInput)?;

    let settings = resolve_settings(&args.drill).await?;
    settings
        .run
        .validate()
        .map_err(|e| RunError::InvalidInput(anyhow::Error::new(e).context("invalid drill config")))?;

    let template = Arc::new(message_template(settings.body_file.as_deref()).await?);

    let out = output::formatter(args.output);
    out.print_header(&settings);

    match &settings.endpoint {
        Endpoint::Memory => {
            let queue = MemoryQueue::new().with_queue(settings.run.queue.clone());
            drive(Arc::new(queue), &settings, template, out.as_ref()).await
        }
        Endpoint::Http(url) => {
            let client = SqsClient::new(url, &settings.region).map_err(|e| {
                RunError::InvalidInput(anyhow::Error::new(e).context("invalid endpoint"))
            })?;
            drive(Arc::new(client), &settings, template, out.as_ref()).await
        }
    }
}

/// Layers CLI/env flags over the optional YAML file.
pub(crate) async fn resolve_settings(
    args: &crate::cli::DrillArgs,
) -> Result<Settings, RunError> {
    let file = match &args.config {
        Some(path) => load_drill_yaml(path).await.map_err(RunError::InvalidInput)?,
        None => DrillYaml::default(),
    };

    Settings::resolve(args, file).map_err(RunError::InvalidInput)
}

async fn message_template(body_file: Option<&Path>) -> Result<MessageTemplate, RunError> {
    let template = MessageTemplate::default();
    let Some(path) = body_file else {
        return Ok(template);
    };

    let body = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read message body: {}", path.display()))
        .map_err(RunError::InvalidInput)?;
    Ok(template.with_body(body))
}

async fn drive<Q: QueueClient>(
    client: Arc<Q>,
    settings: &Settings,
    template: Arc<MessageTemplate>,
    out: &dyn OutputFormatter,
) -> Result<ExitCode, RunError> {
    let report = qdrill_core::runner::run_drill(client, &settings.run, template, out.progress())
        .await
        .map_err(RunError::from)?;

    out.print_summary(&report)
        .map_err(|e| RunError::RuntimeError(e.context("failed to print summary")))?;

    let code = ExitCode::from_report(&report);
    if code != ExitCode::Success {
        tracing::warn!(exit_code = code.as_i32(), "drill finished degraded");
    }
    Ok(code)
}
