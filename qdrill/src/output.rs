use crate::cli::OutputFormat;
use crate::settings::Settings;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, settings: &Settings);
    fn progress(&self) -> Option<qdrill_core::runner::ProgressFn>;
    fn print_summary(&self, report: &qdrill_core::runner::DrillReport) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
