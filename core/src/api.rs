//! Async domain client for the review API.
//!
//! # Design
//! `ApiClient` executes the requests built by `ReviewClient` over a
//! host-supplied `Transport`. Reads are coalesced per key by an
//! `InflightCache` owned by the client and retried by its `RetryPolicy`.
//! Writes go straight to the transport exactly once, since repeating them
//! could duplicate side effects.
//!
//! Every request passes through one pipeline: bearer token, per-attempt
//! timeout, and status interpretation. A 401 clears the held token; a 429
//! logs the server's `retry-after` hint.
//!
//! Reads whose answer depends on the signed-in user are keyed by session
//! generation, so a read started under one token is never joined by a
//! caller holding another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::{error_from_response, parse_empty, parse_json, ReviewClient};
use crate::config::ClientConfig;
use crate::dedup::InflightCache;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::retry::RetryPolicy;
use crate::types::{
    ApiResponse, AuthSession, Comment, CommentList, Credentials, FavoriteOutcome, Favorites,
    GenreList, LikeStatus, Movie, NewComment, NewReview, Page, Review, UpdateReview, User,
    WatchLater,
};

/// Bearer token shared by all clones of one client. The generation moves on
/// every token change.
#[derive(Debug, Clone, Default)]
struct Session {
    token: Arc<RwLock<Option<String>>>,
    generation: Arc<AtomicU64>,
}

impl Session {
    fn get(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set(&self, token: Option<String>) {
        let mut held = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *held = token;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct Pipeline {
    transport: Arc<dyn Transport>,
    session: Session,
    timeout: Duration,
}

impl Pipeline {
    /// Send `request` and return the server's answer whatever its status.
    async fn exchange(&self, mut request: HttpRequest) -> Result<HttpResponse, ApiError> {
        if let Some(token) = self.session.get() {
            request.set_header("authorization", format!("Bearer {token}"));
        }
        debug!(method = request.method.as_str(), path = %request.path, "sending request");

        let response = match tokio::time::timeout(self.timeout, self.transport.execute(request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ApiError::Network(format!(
                    "no response within {}ms",
                    self.timeout.as_millis()
                )))
            }
        };
        match response.status {
            401 => {
                warn!("unauthorized response, signing out");
                self.session.set(None);
            }
            429 => warn!(
                retry_after = response.header("retry-after").unwrap_or("unspecified"),
                "rate limited by server"
            ),
            _ => {}
        }
        Ok(response)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let response = self.exchange(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(error_from_response(&response))
        }
    }
}

/// Review API client. Cheap to clone; clones share the session token and the
/// in-flight request map.
#[derive(Clone)]
pub struct ApiClient {
    requests: ReviewClient,
    pipeline: Pipeline,
    inflight: InflightCache<HttpResponse, ApiError>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            requests: ReviewClient::new(&config.base_url),
            pipeline: Pipeline {
                transport,
                session: Session::default(),
                timeout: config.timeout,
            },
            inflight: InflightCache::new(),
            retry: config.retry_policy(),
        }
    }

    pub fn requests(&self) -> &ReviewClient {
        &self.requests
    }

    pub fn token(&self) -> Option<String> {
        self.pipeline.session.get()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        self.pipeline.session.set(Some(token.into()));
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Number of reads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.in_flight()
    }

    /// Key for a read whose answer depends on who is signed in.
    fn session_key(&self, key: &str) -> String {
        format!("session{}-{key}", self.pipeline.session.generation())
    }

    async fn read(&self, key: String, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let pipeline = self.pipeline.clone();
        let retry = self.retry;
        self.inflight
            .run(key, move || async move {
                retry.run(|| pipeline.send(request.clone())).await
            })
            .await
    }

    async fn write(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.pipeline.send(request).await
    }

    // --- auth ---

    pub async fn register(&self, credentials: &Credentials) -> Result<ApiResponse<User>, ApiError> {
        let response = self.write(self.requests.build_register(credentials)?).await?;
        typed(response, 201)
    }

    /// Log in and keep the returned token for subsequent requests.
    pub async fn login(
        &self,
        credentials: &Credentials,
    ) -> Result<ApiResponse<AuthSession>, ApiError> {
        let response = self.write(self.requests.build_login(credentials)?).await?;
        let session: ApiResponse<AuthSession> = typed(response, 200)?;
        self.set_token(session.data.token.clone());
        Ok(session)
    }

    /// Log out. The local token is dropped even if the server call fails.
    pub async fn logout(&self) -> Result<ApiResponse<()>, ApiError> {
        let result = self.write(self.requests.build_logout()).await;
        self.pipeline.session.set(None);
        empty(result?, 204)
    }

    pub async fn current_user(&self) -> Result<ApiResponse<User>, ApiError> {
        let response = self
            .read(self.session_key("me"), self.requests.build_current_user())
            .await?;
        typed(response, 200)
    }

    // --- movies ---

    pub async fn popular_movies(&self, page: u32) -> Result<ApiResponse<Page<Movie>>, ApiError> {
        let response = self
            .read(format!("popular-{page}"), self.requests.build_popular_movies(page))
            .await?;
        typed(response, 200)
    }

    pub async fn search_movies(
        &self,
        query: &str,
        page: u32,
    ) -> Result<ApiResponse<Page<Movie>>, ApiError> {
        let response = self
            .read(
                format!("search-{query}-{page}"),
                self.requests.build_search_movies(query, page),
            )
            .await?;
        typed(response, 200)
    }

    pub async fn movie(&self, id: u64) -> Result<ApiResponse<Movie>, ApiError> {
        let response = self
            .read(format!("movie-{id}"), self.requests.build_movie(id))
            .await?;
        typed(response, 200)
    }

    pub async fn genres(&self) -> Result<ApiResponse<GenreList>, ApiError> {
        let response = self
            .read("genres".to_string(), self.requests.build_genres())
            .await?;
        typed(response, 200)
    }

    // --- reviews ---

    pub async fn reviews(
        &self,
        page: u32,
        genre: Option<u32>,
    ) -> Result<ApiResponse<Page<Review>>, ApiError> {
        let genre_key = genre.map_or_else(|| "all".to_string(), |g| g.to_string());
        let response = self
            .read(
                format!("reviews-{page}-{genre_key}"),
                self.requests.build_reviews(page, genre),
            )
            .await?;
        typed(response, 200)
    }

    pub async fn review(&self, id: Uuid) -> Result<ApiResponse<Review>, ApiError> {
        let response = self
            .read(format!("review-{id}"), self.requests.build_review(id))
            .await?;
        typed(response, 200)
    }

    pub async fn movie_reviews(&self, movie_id: u64) -> Result<ApiResponse<Vec<Review>>, ApiError> {
        let response = self
            .read(
                format!("movie-reviews-{movie_id}"),
                self.requests.build_movie_reviews(movie_id),
            )
            .await?;
        typed(response, 200)
    }

    pub async fn create_review(&self, input: &NewReview) -> Result<ApiResponse<Review>, ApiError> {
        let response = self.write(self.requests.build_create_review(input)?).await?;
        typed(response, 201)
    }

    pub async fn update_review(
        &self,
        id: Uuid,
        input: &UpdateReview,
    ) -> Result<ApiResponse<Review>, ApiError> {
        let response = self
            .write(self.requests.build_update_review(id, input)?)
            .await?;
        typed(response, 200)
    }

    pub async fn delete_review(&self, id: Uuid) -> Result<ApiResponse<()>, ApiError> {
        let response = self.write(self.requests.build_delete_review(id)).await?;
        empty(response, 204)
    }

    // --- favorites ---

    pub async fn favorites(&self) -> Result<ApiResponse<Favorites>, ApiError> {
        let response = self
            .read(self.session_key("favorites"), self.requests.build_favorites())
            .await?;
        typed(response, 200)
    }

    /// Add a favorite. A 409 means it already was one and is not an error.
    pub async fn add_favorite(
        &self,
        review_id: Uuid,
    ) -> Result<ApiResponse<FavoriteOutcome>, ApiError> {
        let response = self
            .pipeline
            .exchange(self.requests.build_add_favorite(review_id))
            .await?;
        if response.status == 409 {
            return Ok(ApiResponse {
                status: response.status,
                headers: response.headers,
                data: FavoriteOutcome::AlreadyFavorited,
            });
        }
        Ok(empty(response, 201)?.map(|()| FavoriteOutcome::Added))
    }

    pub async fn remove_favorite(&self, review_id: Uuid) -> Result<ApiResponse<()>, ApiError> {
        let response = self
            .write(self.requests.build_remove_favorite(review_id))
            .await?;
        empty(response, 204)
    }

    // --- watch later ---

    pub async fn watch_later(&self) -> Result<ApiResponse<WatchLater>, ApiError> {
        let response = self
            .read(self.session_key("watch-later"), self.requests.build_watch_later())
            .await?;
        typed(response, 200)
    }

    pub async fn add_watch_later(&self, review_id: Uuid) -> Result<ApiResponse<()>, ApiError> {
        let response = self
            .write(self.requests.build_add_watch_later(review_id))
            .await?;
        empty(response, 201)
    }

    pub async fn remove_watch_later(&self, review_id: Uuid) -> Result<ApiResponse<()>, ApiError> {
        let response = self
            .write(self.requests.build_remove_watch_later(review_id))
            .await?;
        empty(response, 204)
    }

    // --- comments ---

    pub async fn comments(&self, review_id: Uuid) -> Result<ApiResponse<Vec<Comment>>, ApiError> {
        let response = self
            .read(
                format!("comments-{review_id}"),
                self.requests.build_comments(review_id),
            )
            .await?;
        let list: ApiResponse<CommentList> = typed(response, 200)?;
        Ok(list.map(|l| l.comments))
    }

    pub async fn add_comment(
        &self,
        review_id: Uuid,
        input: &NewComment,
    ) -> Result<ApiResponse<Comment>, ApiError> {
        let response = self
            .write(self.requests.build_add_comment(review_id, input)?)
            .await?;
        typed(response, 201)
    }

    pub async fn delete_comment(&self, id: Uuid) -> Result<ApiResponse<()>, ApiError> {
        let response = self.write(self.requests.build_delete_comment(id)).await?;
        empty(response, 204)
    }

    // --- likes ---

    pub async fn like_status(&self, review_id: Uuid) -> Result<ApiResponse<LikeStatus>, ApiError> {
        let response = self
            .read(
                self.session_key(&format!("like-{review_id}")),
                self.requests.build_like_status(review_id),
            )
            .await?;
        typed(response, 200)
    }

    pub async fn toggle_review_like(
        &self,
        review_id: Uuid,
    ) -> Result<ApiResponse<LikeStatus>, ApiError> {
        let response = self
            .write(self.requests.build_toggle_review_like(review_id))
            .await?;
        typed(response, 200)
    }

    pub async fn toggle_comment_like(&self, id: Uuid) -> Result<ApiResponse<LikeStatus>, ApiError> {
        let response = self
            .write(self.requests.build_toggle_comment_like(id))
            .await?;
        typed(response, 200)
    }
}

fn typed<T: DeserializeOwned>(
    response: HttpResponse,
    expected: u16,
) -> Result<ApiResponse<T>, ApiError> {
    let data = parse_json(&response, expected)?;
    Ok(ApiResponse {
        status: response.status,
        headers: response.headers,
        data,
    })
}

fn empty(response: HttpResponse, expected: u16) -> Result<ApiResponse<()>, ApiError> {
    parse_empty(&response, expected)?;
    Ok(ApiResponse {
        status: response.status,
        headers: response.headers,
        data: (),
    })
}
