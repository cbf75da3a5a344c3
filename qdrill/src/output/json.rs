use serde::Serialize;
use std::io::Write as _;
use std::sync::Arc;

use qdrill_core::runner::{
    ConsumerReport, DrillReport, PhaseStats, ProducerReport, ProgressFn, ProgressUpdate,
};

use super::OutputFormatter;
use crate::settings::Settings;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _settings: &Settings) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, report: &DrillReport) -> anyhow::Result<()> {
        let line = build_summary_line(report);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub phase: String,
    pub tick: u64,
    pub elapsed_secs: u64,
    pub interval_secs: f64,
    pub completed: u64,
    pub target: u64,
    pub rate: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        phase: u.phase.to_string(),
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs(),
        interval_secs: u.interval.as_secs_f64(),
        completed: u.completed,
        target: u.target,
        rate: u.rate,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub queue: String,
    pub degraded: bool,
    pub timed_out: bool,
    pub send: Option<JsonSendSummary>,
    pub receive: Option<JsonReceiveSummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonPhaseStats {
    pub count: u64,
    pub elapsed_secs: f64,
    pub rate: Option<f64>,
    pub avg_latency_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSendSummary {
    #[serde(flatten)]
    pub stats: JsonPhaseStats,
    pub assigned: u64,
    pub unsent: u64,
    pub dropped_remainder: u64,
    pub failed_producers: Vec<JsonWorkerFailure>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonReceiveSummary {
    #[serde(flatten)]
    pub stats: JsonPhaseStats,
    pub outcome: String,
    pub remaining: i64,
    pub aborted_consumers: u64,
    pub lost_acknowledged: u64,
    pub failed_consumers: Vec<JsonWorkerFailure>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonWorkerFailure {
    pub worker: u64,
    pub error: String,
}

fn phase_stats(stats: &PhaseStats) -> JsonPhaseStats {
    JsonPhaseStats {
        count: stats.count,
        elapsed_secs: stats.elapsed.as_secs_f64(),
        rate: stats.rate,
        avg_latency_ms: stats.avg_latency_ms,
    }
}

fn producer_failures(report: &ProducerReport) -> Vec<JsonWorkerFailure> {
    report
        .failed_workers()
        .filter_map(|w| {
            w.error.as_ref().map(|err| JsonWorkerFailure {
                worker: w.worker,
                error: err.to_string(),
            })
        })
        .collect()
}

fn consumer_failures(report: &ConsumerReport) -> Vec<JsonWorkerFailure> {
    report
        .failed_workers()
        .map(|w| JsonWorkerFailure {
            worker: w.worker,
            error: w.exit.to_string(),
        })
        .collect()
}

fn build_summary_line(report: &DrillReport) -> JsonSummaryLine {
    let send = report.send.as_ref().map(|s| JsonSendSummary {
        stats: phase_stats(&s.stats),
        assigned: s.producers.assigned_total(),
        unsent: s.producers.unsent_total(),
        dropped_remainder: s.producers.dropped_remainder,
        failed_producers: producer_failures(&s.producers),
    });

    let receive = report.receive.as_ref().map(|r| JsonReceiveSummary {
        stats: phase_stats(&r.stats),
        outcome: r.outcome.to_string(),
        remaining: r.outcome.remaining(),
        aborted_consumers: r.consumers.aborted,
        lost_acknowledged: r.consumers.lost_acknowledged(),
        failed_consumers: consumer_failures(&r.consumers),
    });

    JsonSummaryLine {
        kind: "summary",
        queue: report.queue.as_str().to_string(),
        degraded: report.is_degraded(),
        timed_out: report.timed_out(),
        send,
        receive,
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
