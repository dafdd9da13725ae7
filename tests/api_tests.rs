use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use curator_api::{
    api::{create_router, AppState},
    services::{
        stores::{InMemoryCatalog, InMemoryHistoryStore, InMemoryPlanGateway, InMemoryRateLimitStore},
        ActorQuota, CandidateRanker, ManualClock, RateLimiter, RationaleGenerator,
        SmartPicksService, TasteProfileBuilder, EXPORT_BUCKET, RECOMMENDATIONS_BUCKET,
    },
};

const USER: &str = "8f0c6a8e-user";

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_genre(878, "Science Fiction")
        .with_genre(18, "Drama")
        .with_genre(35, "Comedy")
        .with_movie(603, &[878, 28], 90.0)
        .with_movie(157336, &[878, 18], 85.0)
        .with_movie(120, &[12, 14], 80.0)
        .with_movie(13, &[35, 18], 75.0)
        .with_movie(680, &[80, 53], 70.0)
        .with_movie(550, &[18], 65.0)
        .with_movie(78, &[878, 18], 60.0)
        .with_movie(62, &[878, 9648], 55.0)
}

fn create_test_server(history: InMemoryHistoryStore, ip_limit: u32) -> TestServer {
    let catalog = Arc::new(catalog());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 15).unwrap(),
    ));
    let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()), clock)
        .with_bucket(RECOMMENDATIONS_BUCKET, 60)
        .with_bucket(EXPORT_BUCKET, 3600);
    let timeout = Duration::from_secs(1);

    let service = SmartPicksService::new(
        Arc::new(InMemoryPlanGateway::new().with_entitled(USER)),
        limiter,
        TasteProfileBuilder::new(Arc::new(history), catalog.clone(), timeout),
        CandidateRanker::new(catalog.clone(), timeout),
        RationaleGenerator::new(catalog, timeout),
        ActorQuota {
            per_user: 100,
            per_ip: ip_limit,
        },
    );

    let state = AppState::new(service).with_metered_bucket(
        EXPORT_BUCKET,
        ActorQuota {
            per_user: 2,
            per_ip: 10,
        },
    );

    TestServer::new(create_router(state)).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(InMemoryHistoryStore::new(), 60);
    let response = server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_smart_picks_follow_taste() {
    let history = InMemoryHistoryStore::new()
        .with_watched(USER, vec![157336])
        .with_collection(USER, &[78]);
    let server = create_test_server(history, 60);

    let response = server
        .post("/api/v1/smart-picks")
        .add_header("x-user-id", USER)
        .json(&json!({ "limit": 2 }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    assert_eq!(body["profile"]["top_genres"][0]["genre_id"], 18);
    assert_eq!(body["profile"]["sample_size"], 2);
    assert_eq!(body["degraded"], false);

    let picks = body["picks"].as_array().unwrap();
    assert_eq!(picks.len(), 2);
    // drama and sci-fi weigh the same, so popularity decides
    assert_eq!(picks[0]["tmdb_id"], 603);
    assert_eq!(picks[0]["rationale"][0], "Because you love Science Fiction");
    assert_eq!(picks[1]["tmdb_id"], 13);
    assert_eq!(picks[1]["rationale"][0], "Because you love Drama");
}

#[tokio::test]
async fn test_cold_start_is_popularity_order() {
    let server = create_test_server(InMemoryHistoryStore::new(), 60);

    let response = server
        .post("/api/v1/smart-picks")
        .add_header("x-user-id", USER)
        .json(&json!({ "limit": 5, "exclude_tmdb_ids": [120] }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let ids: Vec<i64> = body["picks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["tmdb_id"].as_i64().unwrap())
        .collect();

    assert_eq!(ids, vec![603, 157336, 13, 680, 550]);
    for pick in body["picks"].as_array().unwrap() {
        assert_eq!(pick["rationale"], json!(["Trending with the community"]));
    }
}

#[tokio::test]
async fn test_missing_user_is_unauthorized() {
    let server = create_test_server(InMemoryHistoryStore::new(), 60);

    let response = server.post("/api/v1/smart-picks").json(&json!({})).await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_ineligible_user_is_forbidden() {
    let server = create_test_server(InMemoryHistoryStore::new(), 60);

    let response = server
        .post("/api/v1/smart-picks")
        .add_header("x-user-id", "free-tier-user")
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ip_quota_exhaustion_returns_retry_after() {
    let server = create_test_server(InMemoryHistoryStore::new(), 60);

    for _ in 0..60 {
        server
            .post("/api/v1/smart-picks")
            .add_header("x-user-id", USER)
            .add_header("x-forwarded-for", "203.0.113.50")
            .json(&json!({}))
            .await
            .assert_status_ok();
    }

    let response = server
        .post("/api/v1/smart-picks")
        .add_header("x-user-id", USER)
        .add_header("x-forwarded-for", "203.0.113.50")
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.header("retry-after"), "45");
    let body: serde_json::Value = response.json();
    assert_eq!(body["retry_after_seconds"], 45);
}

#[tokio::test]
async fn test_metered_bucket_check() {
    let server = create_test_server(InMemoryHistoryStore::new(), 60);

    for _ in 0..2 {
        server
            .post("/api/v1/rate-limits/export/check")
            .add_header("x-user-id", USER)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    let response = server
        .post("/api/v1/rate-limits/export/check")
        .add_header("x-user-id", USER)
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);

    let response = server
        .post("/api/v1/rate-limits/uploads/check")
        .add_header("x-user-id", USER)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_anonymous_bucket_check_is_unauthorized() {
    let server = create_test_server(InMemoryHistoryStore::new(), 60);

    server
        .post("/api/v1/rate-limits/uploads/check")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .post("/api/v1/rate-limits/export/check")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server(InMemoryHistoryStore::new(), 60);
    let request_id = "6f1d2c1e-3b7a-4c7e-9d2a-1f0e5b6a7c8d";

    let response = server
        .get("/health")
        .add_header("x-request-id", request_id)
        .await;

    assert_eq!(response.header("x-request-id"), request_id);
}
