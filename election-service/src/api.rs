//! HTTP routes. Handlers only translate between JSON and the services.

use axum::{
    extract::State,
    middleware,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth_middleware::{admin_auth, VoterId};
use crate::database::models::{CandidateProfileRecord, VoteReceiptRecord, VoterSummary};
use crate::error::{ServiceError, ServiceResult};
use crate::ledger::ElectionTally;
use crate::lifecycle::{CreatedElection, ElectionState, ProfileUpdate};
use crate::metrics::{self, ResultAction, VoteOutcome};
use crate::monitor::MonitorReport;
use crate::results::{ElectionProgress, ElectionResult};
use crate::signing::VoteAuthorization;
use crate::state::AppState;
use crate::types::*;
use crate::utils::now_unix;

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/metrics", get(get_metrics))
        .route("/admin/monitor", get(get_monitor))
        .route("/admin/elections", post(create_election))
        .route("/admin/elections/{id}/open", post(open_election))
        .route("/admin/elections/{id}/close", post(close_election))
        .route("/admin/elections/{id}/schedule", post(set_schedule))
        .route("/admin/elections/{id}/state", get(election_state))
        .route("/admin/elections/{id}/live", get(live_tally))
        .route("/admin/elections/{id}/voters", get(election_voters))
        .route("/admin/elections/{id}/candidates", post(add_candidate))
        .route(
            "/admin/elections/{id}/candidates/{cid}",
            put(rename_candidate).delete(hide_candidate),
        )
        .route(
            "/admin/elections/{id}/candidates/{cid}/profile",
            get(get_candidate_profile).put(save_candidate_profile),
        )
        .route("/admin/results/{id}", get(get_result))
        .route("/admin/results/{id}/finalize", post(finalize_result))
        .route("/admin/results/{id}/publish", post(publish_result))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(health_check))
        .route("/version", get(get_version))
        .route("/vote/signature", post(issue_signature))
        .route("/vote/relay", post(relay_vote))
        .route("/vote/receipt", post(record_receipt))
        .route("/vote/status", post(vote_status))
        .route("/vote/history", get(vote_history))
        .route("/public/progress", get(live_progress))
        .route("/public/results", get(list_published_results))
        .route("/public/results/{id}", get(get_published_result))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

async fn get_version() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "git_hash": option_env!("ELECTION_BUILD_GIT_HASH").unwrap_or("unknown"),
        "build_time_unix": option_env!("ELECTION_BUILD_TIME_UNIX").unwrap_or("unknown"),
    }))
}

async fn get_metrics(State(state): State<AppState>) -> Json<Value> {
    Json(metrics::snapshot_as_json(&state.db_path))
}

async fn get_monitor(State(state): State<AppState>) -> Json<MonitorReport> {
    Json(state.monitor.report().await)
}

fn track_vote<T>(result: ServiceResult<T>, success: VoteOutcome) -> ServiceResult<T> {
    let outcome = match &result {
        Ok(_) => success,
        Err(ServiceError::AlreadyVoted) => VoteOutcome::AlreadyVoted,
        Err(ServiceError::LedgerOutcomeUnknown) => VoteOutcome::Unknown,
        Err(
            ServiceError::LedgerRejected(_)
            | ServiceError::ElectionClosed
            | ServiceError::ElectionNotFound
            | ServiceError::CandidateNotFound
            | ServiceError::VoteNotConfirmed
            | ServiceError::Validation(_),
        ) => VoteOutcome::Rejected,
        Err(_) => VoteOutcome::Failed,
    };
    metrics::record_vote_outcome(outcome);
    result
}

async fn issue_signature(
    State(state): State<AppState>,
    VoterId(voter_id): VoterId,
    ApiJson(req): ApiJson<SignatureRequest>,
) -> ServiceResult<Json<VoteAuthorization>> {
    info!(
        "POST /vote/signature - election {} wallet {}",
        req.election_id, req.voter_address
    );
    let result = state
        .relay
        .issue_signed_vote_authorization(&voter_id, req.election_id, req.voter_address)
        .await;
    track_vote(result, VoteOutcome::Authorized).map(Json)
}

async fn relay_vote(
    State(state): State<AppState>,
    VoterId(voter_id): VoterId,
    ApiJson(req): ApiJson<RelayVoteRequest>,
) -> ServiceResult<Json<VoteReceiptRecord>> {
    info!(
        "POST /vote/relay - election {} candidate {}",
        req.election_id, req.candidate_id
    );
    let result = state
        .relay
        .submit_server_relayed_vote(&voter_id, req.election_id, req.candidate_id)
        .await;
    track_vote(result, VoteOutcome::Relayed).map(Json)
}

async fn record_receipt(
    State(state): State<AppState>,
    VoterId(voter_id): VoterId,
    ApiJson(req): ApiJson<RecordReceiptRequest>,
) -> ServiceResult<Json<VoteReceiptRecord>> {
    info!(
        "POST /vote/receipt - election {} tx {}",
        req.election_id, req.tx_hash
    );
    let result = state
        .relay
        .record_signed_relay_vote(&voter_id, req.election_id, req.candidate_id, &req.tx_hash)
        .await;
    track_vote(result, VoteOutcome::Recorded).map(Json)
}

async fn vote_status(
    State(state): State<AppState>,
    VoterId(voter_id): VoterId,
    ApiJson(req): ApiJson<VoteStatusRequest>,
) -> ServiceResult<Json<VoteStatusResponse>> {
    let has_voted = state.relay.has_voted(&voter_id, req.election_id).await?;
    Ok(Json(VoteStatusResponse {
        election_id: req.election_id,
        has_voted,
    }))
}

async fn vote_history(
    State(state): State<AppState>,
    VoterId(voter_id): VoterId,
) -> ServiceResult<Json<Vec<VoteReceiptRecord>>> {
    Ok(Json(state.relay.vote_history(&voter_id).await?))
}

async fn create_election(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateElectionRequest>,
) -> ServiceResult<Json<CreatedElection>> {
    info!("POST /admin/elections - '{}'", req.title);
    Ok(Json(state.lifecycle.create_election(&req.title).await?))
}

async fn open_election(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ServiceResult<Json<TxResponse>> {
    info!("POST /admin/elections/{}/open", id);
    let tx = state.lifecycle.open_election(id).await?;
    Ok(Json(TxResponse::new([tx])))
}

async fn close_election(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ServiceResult<Json<TxResponse>> {
    info!("POST /admin/elections/{}/close", id);
    let tx = state.lifecycle.close_election(id).await?;
    Ok(Json(TxResponse::new([tx])))
}

async fn set_schedule(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
    ApiJson(req): ApiJson<ScheduleRequest>,
) -> ServiceResult<Json<TxResponse>> {
    info!("POST /admin/elections/{}/schedule - {:?}", id, req);
    let txs = state
        .lifecycle
        .set_schedule(id, req.mode, req.start_time, req.end_time)
        .await?;
    Ok(Json(TxResponse::new(txs)))
}

async fn election_state(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ServiceResult<Json<ElectionState>> {
    Ok(Json(state.lifecycle.election_state(id).await?))
}

async fn live_tally(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ServiceResult<Json<ElectionTally>> {
    Ok(Json(state.results.live_tally(id).await?))
}

async fn election_voters(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ServiceResult<Json<Vec<VoterSummary>>> {
    Ok(Json(state.relay.voters(id).await?))
}

async fn add_candidate(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
    ApiJson(req): ApiJson<CandidateNameRequest>,
) -> ServiceResult<Json<TxResponse>> {
    info!("POST /admin/elections/{}/candidates - '{}'", id, req.name);
    let tx = state.lifecycle.add_candidate(id, &req.name).await?;
    Ok(Json(TxResponse::new([tx])))
}

async fn rename_candidate(
    State(state): State<AppState>,
    ApiPath((id, cid)): ApiPath<(u64, u64)>,
    ApiJson(req): ApiJson<CandidateNameRequest>,
) -> ServiceResult<Json<TxResponse>> {
    info!("PUT /admin/elections/{}/candidates/{} - '{}'", id, cid, req.name);
    let tx = state.lifecycle.rename_candidate(id, cid, &req.name).await?;
    Ok(Json(TxResponse::new([tx])))
}

async fn hide_candidate(
    State(state): State<AppState>,
    ApiPath((id, cid)): ApiPath<(u64, u64)>,
) -> ServiceResult<Json<TxResponse>> {
    info!("DELETE /admin/elections/{}/candidates/{}", id, cid);
    let tx = state.lifecycle.hide_candidate(id, cid).await?;
    Ok(Json(TxResponse::new([tx])))
}

async fn get_candidate_profile(
    State(state): State<AppState>,
    ApiPath((id, cid)): ApiPath<(u64, u64)>,
) -> ServiceResult<Json<CandidateProfileRecord>> {
    Ok(Json(state.lifecycle.candidate_profile(id, cid).await?))
}

async fn save_candidate_profile(
    State(state): State<AppState>,
    ApiPath((id, cid)): ApiPath<(u64, u64)>,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> ServiceResult<Json<CandidateProfileRecord>> {
    info!("PUT /admin/elections/{}/candidates/{}/profile", id, cid);
    Ok(Json(
        state.lifecycle.save_candidate_profile(id, cid, update).await?,
    ))
}

async fn get_result(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ServiceResult<Json<ElectionResult>> {
    Ok(Json(state.results.get_result(id).await?))
}

async fn finalize_result(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ServiceResult<Json<ElectionResult>> {
    info!("POST /admin/results/{}/finalize", id);
    let result = state.results.finalize(id).await?;
    metrics::record_result_action(ResultAction::Finalize);
    Ok(Json(result))
}

async fn publish_result(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ServiceResult<Json<ElectionResult>> {
    info!("POST /admin/results/{}/publish", id);
    let result = state.results.publish(id).await?;
    metrics::record_result_action(ResultAction::Publish);
    Ok(Json(result))
}

async fn list_published_results(
    State(state): State<AppState>,
) -> ServiceResult<Json<Vec<ElectionResult>>> {
    Ok(Json(state.results.list_published_results().await?))
}

async fn get_published_result(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<u64>,
) -> ServiceResult<Json<ElectionResult>> {
    Ok(Json(state.results.get_published_result(id).await?))
}

async fn live_progress(
    State(state): State<AppState>,
) -> ServiceResult<Json<Vec<ElectionProgress>>> {
    Ok(Json(state.results.live_progress(now_unix()).await?))
}
