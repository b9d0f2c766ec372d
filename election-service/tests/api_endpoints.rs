mod common;

use alloy::primitives::{Address, Signature, B256};
use axum::http::{Method, StatusCode};
use common::{setup_app, Caller, TestApp};
use serde_json::json;

const NIM: &str = "2211501234";

async fn open_election_with_candidates(app: &TestApp, names: &[&str]) -> u64 {
    let (status, created) = app
        .call(
            Method::POST,
            "/admin/elections",
            Caller::Admin,
            Some(json!({ "title": "BEM 2026" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", created);
    let id = created["election_id"].as_u64().unwrap();

    for name in names {
        let (status, body) = app
            .call(
                Method::POST,
                &format!("/admin/elections/{}/candidates", id),
                Caller::Admin,
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/admin/elections/{}/open", id),
            Caller::Admin,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    id
}

#[tokio::test]
async fn health_and_version_are_public() {
    let app = setup_app().await;
    let (status, _) = app.call(Method::GET, "/healthz", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, version) = app.call(Method::GET, "/version", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(version["name"], "election-service");
}

#[tokio::test]
async fn admin_routes_require_the_token() {
    let app = setup_app().await;
    let (status, body) = app
        .call(
            Method::POST,
            "/admin/elections",
            Caller::Anonymous,
            Some(json!({ "title": "BEM" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ok"], false);

    let (status, _) = app
        .call(Method::GET, "/admin/results/1", Caller::Voter(NIM), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.ledger.write_attempts(), 0);
}

#[tokio::test]
async fn voter_routes_require_the_voter_header() {
    let app = setup_app().await;
    let (status, _) = app
        .call(
            Method::POST,
            "/vote/relay",
            Caller::Anonymous,
            Some(json!({ "election_id": 1, "candidate_id": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn relayed_vote_through_published_result() {
    let app = setup_app().await;
    let id = open_election_with_candidates(&app, &["Alya", "Bima"]).await;

    let (status, receipt) = app
        .call(
            Method::POST,
            "/vote/relay",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id, "candidate_id": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", receipt);
    assert_eq!(receipt["mode"], "server_relay");

    let (status, body) = app
        .call(
            Method::POST,
            "/vote/relay",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id, "candidate_id": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);

    let (_, status_body) = app
        .call(
            Method::POST,
            "/vote/status",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id })),
        )
        .await;
    assert_eq!(status_body["has_voted"], true);

    let (_, history) = app
        .call(Method::GET, "/vote/history", Caller::Voter(NIM), None)
        .await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (_, voters) = app
        .call(
            Method::GET,
            &format!("/admin/elections/{}/voters", id),
            Caller::Admin,
            None,
        )
        .await;
    assert_eq!(voters[0]["voter_id"], NIM);

    // Not public before publishing
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/admin/results/{}/publish", id),
            Caller::Admin,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.call(
        Method::POST,
        &format!("/admin/elections/{}/close", id),
        Caller::Admin,
        None,
    )
    .await;
    let (status, _) = app
        .call(
            Method::POST,
            &format!("/admin/results/{}/finalize", id),
            Caller::Admin,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .call(
            Method::GET,
            &format!("/public/results/{}", id),
            Caller::Anonymous,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/admin/results/{}/publish", id),
            Caller::Admin,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Later ledger changes do not leak into the published result
    app.ledger.credit_vote_unchecked(id, 1);
    let (status, published) = app
        .call(
            Method::GET,
            &format!("/public/results/{}", id),
            Caller::Anonymous,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["total_votes"], 1);
    assert_eq!(published["candidates"][1]["vote_count"], 1);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/admin/results/{}/finalize", id),
            Caller::Admin,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, list) = app
        .call(Method::GET, "/public/results", Caller::Anonymous, None)
        .await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn signed_relay_round_trip() {
    let app = setup_app().await;
    let id = open_election_with_candidates(&app, &["Alya", "Bima"]).await;
    let wallet = Address::repeat_byte(0x42);

    let (status, auth) = app
        .call(
            Method::POST,
            "/vote/signature",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id, "voter_address": wallet })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", auth);

    let identity: B256 = auth["identity_hash"].as_str().unwrap().parse().unwrap();
    let deadline = auth["deadline"].as_u64().unwrap();
    let sig_hex = auth["signature"].as_str().unwrap().trim_start_matches("0x");
    let sig_bytes = hex::decode(sig_hex).unwrap();
    let signature = Signature::try_from(sig_bytes.as_slice()).unwrap();

    let tx = app
        .ledger
        .vote_by_signature(wallet, id, 1, identity, deadline, &signature)
        .unwrap();

    let (status, receipt) = app
        .call(
            Method::POST,
            "/vote/receipt",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id, "candidate_id": 1, "tx_hash": tx.to_string() })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", receipt);
    assert_eq!(receipt["mode"], "signed_relay");

    // No second authorization once the ledger has the vote
    let (status, _) = app
        .call(
            Method::POST,
            "/vote/signature",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id, "voter_address": wallet })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn candidate_edits_are_locked_after_opening() {
    let app = setup_app().await;
    let id = open_election_with_candidates(&app, &["Alya"]).await;
    let writes = app.ledger.write_attempts();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/admin/elections/{}/candidates/1", id),
            Caller::Admin,
            Some(json!({ "name": "Renamed" })),
        )
        .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(body["ok"], false);

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("/admin/elections/{}/candidates/1/profile", id),
            Caller::Admin,
            Some(json!({ "tagline": "Late" })),
        )
        .await;
    assert_eq!(status, StatusCode::LOCKED);
    assert_eq!(app.ledger.write_attempts(), writes);

    let (_, state) = app
        .call(
            Method::GET,
            &format!("/admin/elections/{}/state", id),
            Caller::Admin,
            None,
        )
        .await;
    assert_eq!(state["opened_once"], true);
    assert_eq!(state["locked"], true);
}

#[tokio::test]
async fn scheduled_window_is_validated() {
    let app = setup_app().await;
    let (_, created) = app
        .call(
            Method::POST,
            "/admin/elections",
            Caller::Admin,
            Some(json!({ "title": "DPM" })),
        )
        .await;
    let id = created["election_id"].as_u64().unwrap();

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/admin/elections/{}/schedule", id),
            Caller::Admin,
            Some(json!({ "mode": "scheduled", "start_time": 2000, "end_time": 1000 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/admin/elections/{}/schedule", id),
            Caller::Admin,
            Some(json!({ "mode": "scheduled", "start_time": 1000, "end_time": 2000 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tx_hashes"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn ledger_outages_map_to_service_unavailable() {
    let app = setup_app().await;
    let id = open_election_with_candidates(&app, &["Alya"]).await;
    app.ledger.fail_reads(true);

    let (status, _) = app
        .call(
            Method::POST,
            "/vote/relay",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id, "candidate_id": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    app.ledger.fail_reads(false);
    app.ledger.time_out_writes(true);
    let (status, _) = app
        .call(
            Method::POST,
            "/vote/relay",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id, "candidate_id": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

    let (_, history) = app
        .call(Method::GET, "/vote/history", Caller::Voter(NIM), None)
        .await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_elections_and_candidates() {
    let app = setup_app().await;
    let id = open_election_with_candidates(&app, &["Alya"]).await;

    let (status, _) = app
        .call(
            Method::POST,
            "/vote/relay",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id + 5, "candidate_id": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(
            Method::POST,
            "/vote/relay",
            Caller::Voter(NIM),
            Some(json!({ "election_id": id, "candidate_id": 9 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_requests_use_the_error_envelope() {
    let app = setup_app().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/vote/relay",
            Caller::Voter(NIM),
            Some(json!({ "election_id": "abc", "candidate_id": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(body["reason"].as_str().unwrap().contains("election_id"));

    let (status, body) = app
        .call(Method::GET, "/public/results/abc", Caller::Anonymous, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(body["reason"].is_string());

    let (status, body) = app
        .call(
            Method::PUT,
            "/admin/elections/1/candidates/x",
            Caller::Admin,
            Some(json!({ "name": "Alya" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(app.ledger.write_attempts(), 0);
}

#[tokio::test]
async fn progress_shows_live_scheduled_elections() {
    let app = setup_app().await;
    let now = chrono::Utc::now().timestamp() as u64;

    let (_, created) = app
        .call(
            Method::POST,
            "/admin/elections",
            Caller::Admin,
            Some(json!({ "title": "BEM 2026" })),
        )
        .await;
    let id = created["election_id"].as_u64().unwrap();
    for name in ["Alya", "Bima"] {
        app.call(
            Method::POST,
            &format!("/admin/elections/{}/candidates", id),
            Caller::Admin,
            Some(json!({ "name": name })),
        )
        .await;
    }

    // Open but still manual: not on the public board
    app.call(
        Method::POST,
        &format!("/admin/elections/{}/open", id),
        Caller::Admin,
        None,
    )
    .await;
    let (status, items) = app
        .call(Method::GET, "/public/progress", Caller::Anonymous, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(items.as_array().unwrap().is_empty());

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/admin/elections/{}/schedule", id),
            Caller::Admin,
            Some(json!({ "mode": "scheduled", "start_time": now - 60, "end_time": now + 3600 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    app.call(
        Method::POST,
        "/vote/relay",
        Caller::Voter(NIM),
        Some(json!({ "election_id": id, "candidate_id": 2 })),
    )
    .await;

    let (_, items) = app
        .call(Method::GET, "/public/progress", Caller::Anonymous, None)
        .await;
    let items = items.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["election_id"], id);
    assert_eq!(items[0]["total_votes"], 1);
    assert_eq!(items[0]["candidates"][1]["vote_count"], 1);
    assert!(items[0]["candidates"][0].get("name").is_none());
}

#[tokio::test]
async fn monitor_reports_chain_and_signer() {
    let app = setup_app().await;

    let (status, _) = app
        .call(Method::GET, "/admin/monitor", Caller::Anonymous, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, report) = app
        .call(Method::GET, "/admin/monitor", Caller::Admin, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["rpc"]["ok"], true);
    assert_eq!(report["rpc"]["chain_id"], 31337);
    assert_eq!(report["signer"]["configured"], true);
    assert!(report["signer"]["address"].is_string());
    assert_eq!(report["signer"]["balance"], "0");

    app.ledger.fail_reads(true);
    let (status, report) = app
        .call(Method::GET, "/admin/monitor", Caller::Admin, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["rpc"]["ok"], false);
    assert!(report["rpc"]["error"].is_string());
}
