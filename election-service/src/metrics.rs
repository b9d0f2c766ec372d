use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::OnceCell;

use crate::reconciler::TickReport;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum VoteOutcome {
    Authorized,
    Relayed,
    Recorded,
    AlreadyVoted,
    Rejected,
    Unknown,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ResultAction {
    Finalize,
    Publish,
}

#[derive(Default)]
pub struct Metrics {
    vote_total: HashMap<VoteOutcome, u64>,
    result_total: HashMap<ResultAction, u64>,
    ticks_total: u64,
    ticks_aborted_total: u64,
    elections_auto_closed_total: u64,
    auto_close_failures_total: u64,
}

static METRICS: OnceCell<Mutex<Metrics>> = OnceCell::new();

fn get() -> &'static Mutex<Metrics> {
    METRICS.get_or_init(|| Mutex::new(Metrics::default()))
}

fn with_metrics(f: impl FnOnce(&mut Metrics)) {
    let mut m = get().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut m);
}

pub fn record_vote_outcome(outcome: VoteOutcome) {
    with_metrics(|m| *m.vote_total.entry(outcome).or_insert(0) += 1);
}

pub fn record_result_action(action: ResultAction) {
    with_metrics(|m| *m.result_total.entry(action).or_insert(0) += 1);
}

pub fn record_tick(report: &TickReport) {
    if report.skipped {
        return;
    }
    with_metrics(|m| {
        m.ticks_total += 1;
        m.elections_auto_closed_total += report.closed.len() as u64;
        m.auto_close_failures_total += report.failed.len() as u64;
    });
}

pub fn record_tick_aborted() {
    with_metrics(|m| m.ticks_aborted_total += 1);
}

fn vote_outcome_label(outcome: VoteOutcome) -> &'static str {
    match outcome {
        VoteOutcome::Authorized => "authorized",
        VoteOutcome::Relayed => "relayed",
        VoteOutcome::Recorded => "recorded",
        VoteOutcome::AlreadyVoted => "already_voted",
        VoteOutcome::Rejected => "rejected",
        VoteOutcome::Unknown => "unknown",
        VoteOutcome::Failed => "failed",
    }
}

pub fn snapshot_as_json(db_path: &str) -> serde_json::Value {
    use serde_json::json;
    let m = get().lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let votes: Vec<serde_json::Value> = m
        .vote_total
        .iter()
        .map(|(outcome, count)| {
            json!({
                "outcome": vote_outcome_label(*outcome),
                "count": count
            })
        })
        .collect();

    let results: Vec<serde_json::Value> = m
        .result_total
        .iter()
        .map(|(action, count)| {
            json!({
                "action": match action {
                    ResultAction::Finalize => "finalize",
                    ResultAction::Publish => "publish",
                },
                "count": count
            })
        })
        .collect();

    let db_bytes = storage_db_bytes(db_path);
    let db_mb = db_bytes.map(|b| round2(bytes_to_mb(b)));
    let fs_free_mb = filesystem_free_mb_from_db_path(db_path);

    json!({
        "vote_total": votes,
        "result_total": results,
        "auto_close": {
            "ticks_total": m.ticks_total,
            "ticks_aborted_total": m.ticks_aborted_total,
            "elections_closed_total": m.elections_auto_closed_total,
            "close_failures_total": m.auto_close_failures_total,
        },
        "storage": {
            "db_path": db_path,
            "db_size_mb": db_mb,
            "free_storage_mb": fs_free_mb,
        }
    })
}

fn storage_db_bytes(db_path: &str) -> Option<u64> {
    std::fs::metadata(db_path)
        .ok()
        .and_then(|m| if m.is_file() { Some(m.len()) } else { None })
}

fn bytes_to_mb(bytes: u64) -> f64 {
    let mb = 1024.0 * 1024.0;
    (bytes as f64) / mb
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn filesystem_free_mb_from_db_path(db_path: &str) -> Option<f64> {
    use sysinfo::Disks;
    let disks = Disks::new_with_refreshed_list();
    let path = std::path::Path::new(db_path);
    let mount = path.canonicalize().ok().and_then(|p| {
        disks
            .iter()
            .filter(|d| p.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
    });

    mount.map(|d| round2(bytes_to_mb(d.available_space())))
}
