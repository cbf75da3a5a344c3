use std::fmt::Write as _;
use std::sync::Arc;

mod format;
mod progress;

use format::{format_elapsed, format_rate, phase_line};
use progress::HumanProgress;
use qdrill_core::runner::{ConsumerExit, DrillReport, ProgressFn, ReceiveOutcome};

use super::OutputFormatter;
use crate::settings::Settings;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, settings: &Settings) {
        let run = &settings.run;
        eprintln!(
            "queue: {} endpoint={} total={} producers={} consumers={} batch={}",
            run.queue,
            settings.endpoint.as_str(),
            run.total,
            run.producer_concurrency,
            run.consumer_concurrency,
            run.receive.max_batch
        );
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |u| {
            let message = format!(
                "{}/s elapsed={}",
                format_rate(u.rate),
                format_elapsed(u.elapsed)
            );
            progress.update(u.phase, u.completed, u.target, message);
        }))
    }

    fn print_summary(&self, report: &DrillReport) -> anyhow::Result<()> {
        self.progress.finish();

        if let Some(send) = &report.send {
            println!("{}", phase_line(&send.stats));
        }
        if let Some(receive) = &report.receive {
            println!("{}", phase_line(&receive.stats));
        }

        let failures = render_failures(report);
        if !failures.is_empty() {
            eprint!("{failures}");
        }
        Ok(())
    }
}

fn render_failures(report: &DrillReport) -> String {
    let mut out = String::new();

    if let Some(send) = &report.send {
        if send.producers.dropped_remainder > 0 {
            writeln!(
                out,
                "send: remainder of {} messages not sent (remainder=drop)",
                send.producers.dropped_remainder
            )
            .ok();
        }
        for w in send.producers.failed_workers() {
            if let Some(err) = &w.error {
                writeln!(
                    out,
                    "send: producer {} stopped after {}/{}: {err}",
                    w.worker, w.sent, w.assigned
                )
                .ok();
            }
        }
    }

    if let Some(receive) = &report.receive {
        match receive.outcome {
            ReceiveOutcome::Completed { .. } => {}
            ReceiveOutcome::Starved { remaining } => {
                writeln!(
                    out,
                    "receive: all consumers stopped with {remaining} messages outstanding"
                )
                .ok();
            }
            ReceiveOutcome::TimedOut { remaining } => {
                writeln!(
                    out,
                    "receive: timed out with {remaining} messages outstanding"
                )
                .ok();
            }
        }

        for w in &receive.consumers.workers {
            match &w.exit {
                ConsumerExit::ReceiveFailed(err) => {
                    writeln!(out, "receive: consumer {} stopped: {err}", w.worker).ok();
                }
                ConsumerExit::AckFailed {
                    acknowledged,
                    batch,
                    error,
                } => {
                    writeln!(
                        out,
                        "receive: consumer {} stopped after acknowledging {acknowledged}/{batch} of a batch: {error}",
                        w.worker
                    )
                    .ok();
                }
                ConsumerExit::Cancelled | ConsumerExit::ReportClosed => {}
            }
        }
    }

    out
}
