use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use movigation_client::{
    clock::{ManualClock, SystemClock},
    config::Config,
    error::ErrorKind,
    models::{FeedbackResponse, MovieId, SessionId, TrackId, UserId, WatchTime},
    services::{
        FeedbackTargeter, HttpRecommendationApi, NotificationKind, RecommendationApi,
        ReplaceOutcome, SessionStore,
    },
    storage::{KeyValueStore, MemoryStore, StorageKey},
};

#[derive(Default)]
struct Recorded {
    request_ids: Vec<String>,
    authorization: Vec<String>,
    recommend: Vec<Value>,
    single: Vec<Value>,
    satisfaction: Vec<Value>,
    plays: Vec<(i64, Value)>,
}

type Shared = Arc<Mutex<Recorded>>;

fn record_headers(recorded: &Shared, headers: &HeaderMap) {
    let mut recorded = recorded.lock().unwrap();
    if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        recorded.request_ids.push(id.to_string());
    }
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        recorded.authorization.push(auth.to_string());
    }
}

fn movie(id: i64, runtime: u32) -> Value {
    json!({
        "movie_id": id,
        "tmdb_id": id + 1000,
        "title": format!("Movie {}", id),
        "genres": ["액션"],
        "runtime": runtime,
        "poster_path": format!("/{}.jpg", id),
        "vote_average": 7.5,
        "release_date": "2011-05-01"
    })
}

async fn recommend(
    State(recorded): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    record_headers(&recorded, &headers);
    recorded.lock().unwrap().recommend.push(body);
    Json(json!({
        "track_a": {"movies": [movie(1, 90), movie(2, 95)], "total_runtime": 185, "label": "Picked for you"},
        "track_b": {"movies": [movie(3, 60), movie(4, 60), movie(5, 60)], "total_runtime": 180, "label": "Popular"},
        "session_id": 42
    }))
}

async fn recommend_single(
    State(recorded): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    record_headers(&recorded, &headers);
    recorded.lock().unwrap().single.push(body);
    Json(json!({"success": true, "movie": movie(6, 85)}))
}

async fn movie_detail(
    State(recorded): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Json<Value> {
    record_headers(&recorded, &headers);
    Json(json!({"info": {"movie_id": id, "adult": id == 2}, "otts": []}))
}

async fn satisfaction(
    State(recorded): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    record_headers(&recorded, &headers);
    recorded.lock().unwrap().satisfaction.push(body);
    Json(json!({"status": "ok"}))
}

async fn play(
    State(recorded): State<Shared>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> StatusCode {
    recorded.lock().unwrap().plays.push((id, body));
    StatusCode::NO_CONTENT
}

fn backend_router(recorded: Shared) -> Router {
    Router::new()
        .route("/api/v2/recommend", post(recommend))
        .route("/api/v2/recommend/single", post(recommend_single))
        .route("/api/movies/:id", get(movie_detail))
        .route("/api/movies/:id/play", post(play))
        .route("/mypage/satisfaction", post(satisfaction))
        .with_state(recorded)
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn test_config(api_base_url: String) -> Config {
    Config {
        api_base_url,
        api_token: Some("test-token".to_string()),
        request_timeout_secs: 2,
        settle_delay_ms: 0,
        ..Config::default()
    }
}

fn session_store(config: &Config, storage: Arc<MemoryStore>) -> SessionStore {
    let api = HttpRecommendationApi::from_config(config).unwrap();
    SessionStore::new(Arc::new(api), storage, Arc::new(SystemClock), config)
}

#[tokio::test]
async fn test_session_round_trip_against_backend() {
    let recorded = Shared::default();
    let config = test_config(serve(backend_router(recorded.clone())).await);
    let store = session_store(&config, Arc::new(MemoryStore::new()));

    store.set_time("03:00".parse().unwrap()).await;
    store.toggle_genre("액션").await;
    store.load_recommendations().await.unwrap();

    let view = store.view().await;
    assert_eq!(view.track_a.total_runtime(), 185);
    assert_eq!(view.track_b.total_runtime(), 180);
    assert_eq!(view.session_id, Some(SessionId(42)));
    assert_eq!(
        view.track_a.slots()[0].settled().unwrap().poster_url,
        "https://image.tmdb.org/t/p/w500/1.jpg"
    );

    let outcome = store.replace_slot(TrackId::A, MovieId(1)).await;
    assert!(matches!(outcome, ReplaceOutcome::Replaced(ref m) if m.id == MovieId(6)));
    assert_eq!(store.view().await.track_a.total_runtime(), 180);

    let recorded = recorded.lock().unwrap();
    assert_eq!(
        recorded.recommend[0],
        json!({"runtime_limit": 180, "genres": ["액션"], "exclude_adult": false})
    );
    let single = &recorded.single[0];
    assert_eq!(single["target_runtime"], 85);
    assert_eq!(single["track"], "a");
    assert_eq!(single["excluded_ids"], json!([1, 2, 3, 4, 5]));
}

#[tokio::test]
async fn test_requests_carry_request_id_and_token() {
    let recorded = Shared::default();
    let config = test_config(serve(backend_router(recorded.clone())).await);
    let api = HttpRecommendationApi::from_config(&config).unwrap();

    api.movie_detail(MovieId(1)).await.unwrap();
    api.movie_detail(MovieId(2)).await.unwrap();

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.request_ids.len(), 2);
    assert_ne!(recorded.request_ids[0], recorded.request_ids[1]);
    assert!(uuid::Uuid::parse_str(&recorded.request_ids[0]).is_ok());
    assert_eq!(recorded.authorization[0], "Bearer test-token");
}

#[tokio::test]
async fn test_detail_prefetch_marks_adult_movies() {
    let recorded = Shared::default();
    let config = test_config(serve(backend_router(recorded)).await);
    let store = session_store(&config, Arc::new(MemoryStore::new()));
    store.load_recommendations().await.unwrap();

    assert_eq!(store.prefetch_details(vec![MovieId(1), MovieId(2)]).await, 2);

    let view = store.view().await;
    assert!(!view.track_a.slots()[0].settled().unwrap().adult);
    assert!(view.track_a.slots()[1].settled().unwrap().adult);
}

#[tokio::test]
async fn test_server_error_empties_tracks() {
    let broken = Router::new().route(
        "/api/v2/recommend",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "engine down") }),
    );
    let config = test_config(serve(broken).await);
    let store = session_store(&config, Arc::new(MemoryStore::new()));

    let err = store.load_recommendations().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Other);

    let view = store.view().await;
    assert!(view.track_a.is_empty() && view.track_b.is_empty());
    assert_eq!(view.track_a.total_runtime(), 0);
    assert_eq!(view.error, Some(err));
    assert!(!view.is_loading);
}

#[tokio::test]
async fn test_unreachable_backend_reports_network_error() {
    // Bind then release a port so nothing is listening on it
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = test_config(format!("http://{}", addr));
    let store = session_store(&config, Arc::new(MemoryStore::new()));
    let err = store.load_recommendations().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
}

#[tokio::test]
async fn test_undecodable_replacement_rolls_back() {
    let recorded = Shared::default();
    let router = Router::new()
        .route("/api/v2/recommend", post(recommend))
        .route("/api/movies/:id", get(movie_detail))
        .route(
            "/api/v2/recommend/single",
            post(|| async { Json(json!({"success": true, "movie": {"title": "no id"}})) }),
        )
        .with_state(recorded);
    let config = test_config(serve(router).await);
    let store = session_store(&config, Arc::new(MemoryStore::new()));
    store.load_recommendations().await.unwrap();
    let mut notifications = store.subscribe_notifications();

    let outcome = store.replace_slot(TrackId::B, MovieId(3)).await;
    assert_eq!(
        outcome,
        ReplaceOutcome::RolledBack(NotificationKind::ReplacementFailed)
    );
    let view = store.view().await;
    assert_eq!(view.track_b.total_runtime(), 180);
    assert!(view.excluded_ids.contains(&MovieId(3)));
    assert_eq!(
        notifications.recv().await.unwrap().kind,
        NotificationKind::ReplacementFailed
    );
}

#[tokio::test]
async fn test_feedback_flow_against_backend() {
    let recorded = Shared::default();
    let config = test_config(serve(backend_router(recorded.clone())).await);
    let storage = Arc::new(MemoryStore::new());
    let user = UserId(7);

    let store = session_store(&config, storage.clone());
    store.set_user(Some(user)).await;
    store.set_time(WatchTime::from_minutes(90)).await;
    store.load_recommendations().await.unwrap();
    let view = store.view().await;
    let watched = view.track_a.slots()[0].settled().unwrap().clone();

    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let api = Arc::new(HttpRecommendationApi::from_config(&config).unwrap());
    let targeter = FeedbackTargeter::new(user, storage.clone(), api, clock.clone(), &config);

    targeter
        .record_click(&watched, view.session_id, view.filters.time, Some(8))
        .await;
    assert_eq!(targeter.check(Duration::ZERO).await, None);

    clock.advance(chrono::Duration::minutes(90));
    let candidate = targeter.check(Duration::ZERO).await.unwrap();
    assert_eq!(candidate.movie_id, watched.id);
    assert_eq!(targeter.prompt().await, Some(candidate));

    assert_eq!(targeter.respond(FeedbackResponse::Good).await, None);
    assert!(storage
        .get(&StorageKey::FeedbackDone(user))
        .await
        .unwrap()
        .is_some());

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.plays, vec![(1, json!({"provider_id": 8}))]);
    assert_eq!(
        recorded.satisfaction,
        vec![json!({"session_id": "42", "is_positive": true})]
    );
}
