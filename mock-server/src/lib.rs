pub mod error;
pub mod store;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{FromRef, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

pub use error::AppError;
pub use store::{Comment, Genre, LikeStatus, Movie, Page, Review, Shelf, Store, User};

pub type Db = Arc<RwLock<Store>>;

/// Failure and latency injection, plus per-path hit counters.
#[derive(Clone, Default)]
pub struct Faults {
    inner: Arc<FaultState>,
}

#[derive(Default)]
struct FaultState {
    fail_next: AtomicU32,
    latency_ms: AtomicU64,
    hits: Mutex<HashMap<String, usize>>,
}

impl Faults {
    /// Answer the next `n` requests with 503.
    pub fn fail_next(&self, n: u32) {
        self.inner.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Requests seen for `path` (without query string), injected failures included.
    pub fn hits(&self, path: &str) -> usize {
        self.lock_hits().get(path).copied().unwrap_or(0)
    }

    fn record(&self, path: &str) {
        *self.lock_hits().entry(path.to_string()).or_insert(0) += 1;
    }

    fn latency(&self) -> Duration {
        Duration::from_millis(self.inner.latency_ms.load(Ordering::SeqCst))
    }

    fn take_failure(&self) -> bool {
        self.inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn lock_hits(&self) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
        self.inner
            .hits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct AppState {
    pub db: Db,
    pub faults: Faults,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.db)
    }
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/genres", get(genres))
        .route("/movies/popular", get(popular_movies))
        .route("/movies/search", get(search_movies))
        .route("/movies/{id}", get(get_movie))
        .route("/movies/{id}/reviews", get(movie_reviews))
        .route("/reviews", get(list_reviews).post(create_review))
        .route(
            "/reviews/{id}",
            get(get_review).put(update_review).delete(delete_review),
        )
        .route("/reviews/{id}/comments", get(list_comments).post(add_comment))
        .route("/reviews/{id}/like", get(like_status).post(toggle_review_like))
        .route("/comments/{id}", delete(delete_comment))
        .route("/comments/{id}/like", post(toggle_comment_like))
        .route("/users/me/favorites", get(favorites))
        .route(
            "/users/me/favorites/{id}",
            post(add_favorite).delete(remove_favorite),
        )
        .route("/users/me/watch-later", get(watch_later))
        .route(
            "/users/me/watch-later/{id}",
            post(add_watch_later).delete(remove_watch_later),
        )
        .layer(middleware::from_fn_with_state(
            state.faults.clone(),
            inject_faults,
        ))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, AppState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn inject_faults(State(faults): State<Faults>, request: Request, next: Next) -> Response {
    faults.record(request.uri().path());
    let latency = faults.latency();
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    if faults.take_failure() {
        info!(path = %request.uri().path(), "injecting 503");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "service unavailable" })),
        )
            .into_response();
    }
    next.run(request).await
}

fn bearer(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)
}

async fn authenticate(db: &Db, headers: &HeaderMap) -> Result<User, AppError> {
    let token = bearer(headers)?;
    db.read().await.user_for_token(token)
}

// --- auth ---

async fn register(
    State(db): State<Db>,
    Json(input): Json<store::Credentials>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = db.write().await.register(input)?;
    info!(username = %user.username, "registered");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login(
    State(db): State<Db>,
    Json(input): Json<store::Credentials>,
) -> Result<Json<Value>, AppError> {
    let (token, user) = db.write().await.login(&input)?;
    Ok(Json(json!({ "token": token, "user": user })))
}

async fn logout(State(db): State<Db>, headers: HeaderMap) -> Result<StatusCode, AppError> {
    let token = bearer(&headers)?;
    db.write().await.logout(token);
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(db): State<Db>, headers: HeaderMap) -> Result<Json<User>, AppError> {
    authenticate(&db, &headers).await.map(Json)
}

// --- movies ---

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default = "first_page")]
    page: u32,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    query: String,
    #[serde(default = "first_page")]
    page: u32,
}

#[derive(Deserialize)]
struct ReviewQuery {
    #[serde(default = "first_page")]
    page: u32,
    genre: Option<u32>,
}

fn first_page() -> u32 {
    1
}

async fn genres(State(db): State<Db>) -> Json<Value> {
    Json(json!({ "genres": db.read().await.genres() }))
}

async fn popular_movies(State(db): State<Db>, Query(q): Query<PageQuery>) -> Json<Page<Movie>> {
    Json(db.read().await.popular(q.page))
}

async fn search_movies(State(db): State<Db>, Query(q): Query<SearchQuery>) -> Json<Page<Movie>> {
    Json(db.read().await.search(&q.query, q.page))
}

async fn get_movie(State(db): State<Db>, Path(id): Path<u64>) -> Result<Json<Movie>, AppError> {
    db.read().await.movie(id).cloned().map(Json)
}

async fn movie_reviews(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Review>>, AppError> {
    db.read().await.movie_reviews(id).map(Json)
}

// --- reviews ---

async fn list_reviews(State(db): State<Db>, Query(q): Query<ReviewQuery>) -> Json<Page<Review>> {
    Json(db.read().await.reviews(q.page, q.genre))
}

async fn get_review(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Review>, AppError> {
    db.read().await.review(id).cloned().map(Json)
}

async fn create_review(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<store::NewReview>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let user = authenticate(&db, &headers).await?;
    let review = db.write().await.create_review(&user, input)?;
    info!(review = %review.id, movie = review.movie_id, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

async fn update_review(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<store::UpdateReview>,
) -> Result<Json<Review>, AppError> {
    let user = authenticate(&db, &headers).await?;
    db.write().await.update_review(&user, id, input).map(Json)
}

async fn delete_review(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let user = authenticate(&db, &headers).await?;
    db.write().await.delete_review(&user, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- favorites / watch later ---

async fn favorites(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    let user = authenticate(&db, &headers).await?;
    let list = db.read().await.shelf(&user, Shelf::Favorites);
    Ok(Json(json!({ "favorites": list })))
}

async fn watch_later(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Value>, AppError> {
    let user = authenticate(&db, &headers).await?;
    let list = db.read().await.shelf(&user, Shelf::WatchLater);
    Ok(Json(json!({ "watchLater": list })))
}

async fn shelve(db: &Db, headers: &HeaderMap, shelf: Shelf, id: Uuid) -> Result<StatusCode, AppError> {
    let user = authenticate(db, headers).await?;
    db.write().await.shelve(&user, shelf, id)?;
    Ok(StatusCode::CREATED)
}

async fn unshelve(
    db: &Db,
    headers: &HeaderMap,
    shelf: Shelf,
    id: Uuid,
) -> Result<StatusCode, AppError> {
    let user = authenticate(db, headers).await?;
    db.write().await.unshelve(&user, shelf, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_favorite(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    shelve(&db, &headers, Shelf::Favorites, id).await
}

async fn remove_favorite(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    unshelve(&db, &headers, Shelf::Favorites, id).await
}

async fn add_watch_later(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    shelve(&db, &headers, Shelf::WatchLater, id).await
}

async fn remove_watch_later(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    unshelve(&db, &headers, Shelf::WatchLater, id).await
}

// --- comments / likes ---

async fn list_comments(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let comments = db.read().await.comments(id)?;
    Ok(Json(json!({ "comments": comments })))
}

async fn add_comment(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<store::NewComment>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let user = authenticate(&db, &headers).await?;
    let comment = db.write().await.add_comment(&user, id, input)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn delete_comment(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let user = authenticate(&db, &headers).await?;
    db.write().await.delete_comment(&user, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_status(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeStatus>, AppError> {
    let user = authenticate(&db, &headers).await?;
    db.read().await.like_status(&user, id).map(Json)
}

async fn toggle_review_like(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeStatus>, AppError> {
    let user = authenticate(&db, &headers).await?;
    db.write().await.toggle_review_like(&user, id).map(Json)
}

async fn toggle_comment_like(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeStatus>, AppError> {
    let user = authenticate(&db, &headers).await?;
    db.write().await.toggle_comment_like(&user, id).map(Json)
}
