//! Stateless HTTP request builder and response parser for the review API.
//!
//! # Design
//! `ReviewClient` holds only a `base_url` and carries no mutable state between
//! calls. Each endpoint has a `build_*` method that produces an `HttpRequest`;
//! responses are interpreted by `parse_json` / `parse_empty` against the
//! status the endpoint is expected to return. `ApiClient` executes the
//! round-trip in between.

use serde::de::DeserializeOwned;
use serde::Serialize;
use url::form_urlencoded;
use uuid::Uuid;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{Credentials, ErrorBody, NewComment, NewReview, UpdateReview};

/// Synchronous, stateless request builder for the review API.
#[derive(Debug, Clone)]
pub struct ReviewClient {
    base_url: String,
}

impl ReviewClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // --- auth ---

    pub fn build_register(&self, credentials: &Credentials) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/auth/register", credentials)
    }

    pub fn build_login(&self, credentials: &Credentials) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/auth/login", credentials)
    }

    pub fn build_logout(&self) -> HttpRequest {
        self.bare(HttpMethod::Post, "/auth/logout")
    }

    pub fn build_current_user(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/auth/me")
    }

    // --- movies ---

    pub fn build_popular_movies(&self, page: u32) -> HttpRequest {
        let page = page.to_string();
        let query = encode_query(&[("page", page.as_str())]);
        self.bare(HttpMethod::Get, &format!("/movies/popular?{query}"))
    }

    pub fn build_search_movies(&self, query: &str, page: u32) -> HttpRequest {
        let page = page.to_string();
        let query = encode_query(&[("query", query), ("page", page.as_str())]);
        self.bare(HttpMethod::Get, &format!("/movies/search?{query}"))
    }

    pub fn build_movie(&self, id: u64) -> HttpRequest {
        self.bare(HttpMethod::Get, &format!("/movies/{id}"))
    }

    pub fn build_genres(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/genres")
    }

    // --- reviews ---

    pub fn build_reviews(&self, page: u32, genre: Option<u32>) -> HttpRequest {
        let page = page.to_string();
        let genre = genre.map(|g| g.to_string());
        let mut pairs = vec![("page", page.as_str())];
        if let Some(genre) = genre.as_deref() {
            pairs.push(("genre", genre));
        }
        self.bare(HttpMethod::Get, &format!("/reviews?{}", encode_query(&pairs)))
    }

    pub fn build_review(&self, id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Get, &format!("/reviews/{id}"))
    }

    pub fn build_movie_reviews(&self, movie_id: u64) -> HttpRequest {
        self.bare(HttpMethod::Get, &format!("/movies/{movie_id}/reviews"))
    }

    pub fn build_create_review(&self, input: &NewReview) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/reviews", input)
    }

    pub fn build_update_review(
        &self,
        id: Uuid,
        input: &UpdateReview,
    ) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Put, &format!("/reviews/{id}"), input)
    }

    pub fn build_delete_review(&self, id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Delete, &format!("/reviews/{id}"))
    }

    // --- favorites / watch later ---

    pub fn build_favorites(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/users/me/favorites")
    }

    pub fn build_add_favorite(&self, review_id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Post, &format!("/users/me/favorites/{review_id}"))
    }

    pub fn build_remove_favorite(&self, review_id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Delete, &format!("/users/me/favorites/{review_id}"))
    }

    pub fn build_watch_later(&self) -> HttpRequest {
        self.bare(HttpMethod::Get, "/users/me/watch-later")
    }

    pub fn build_add_watch_later(&self, review_id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Post, &format!("/users/me/watch-later/{review_id}"))
    }

    pub fn build_remove_watch_later(&self, review_id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Delete, &format!("/users/me/watch-later/{review_id}"))
    }

    // --- comments / likes ---

    pub fn build_comments(&self, review_id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Get, &format!("/reviews/{review_id}/comments"))
    }

    pub fn build_add_comment(
        &self,
        review_id: Uuid,
        input: &NewComment,
    ) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, &format!("/reviews/{review_id}/comments"), input)
    }

    pub fn build_delete_comment(&self, id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Delete, &format!("/comments/{id}"))
    }

    pub fn build_like_status(&self, review_id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Get, &format!("/reviews/{review_id}/like"))
    }

    pub fn build_toggle_review_like(&self, review_id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Post, &format!("/reviews/{review_id}/like"))
    }

    pub fn build_toggle_comment_like(&self, id: Uuid) -> HttpRequest {
        self.bare(HttpMethod::Post, &format!("/comments/{id}/like"))
    }

    fn bare(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers: Vec::new(),
            body: None,
        }
    }

    fn json<T: Serialize>(
        &self,
        method: HttpMethod,
        path: &str,
        input: &T,
    ) -> Result<HttpRequest, ApiError> {
        let body =
            serde_json::to_string(input).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method,
            path: format!("{}{path}", self.base_url),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(body),
        })
    }
}

/// Deserialize `response` after checking it carries the `expected` status.
pub fn parse_json<T: DeserializeOwned>(
    response: &HttpResponse,
    expected: u16,
) -> Result<T, ApiError> {
    check_status(response, expected)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

/// Check the status of a response whose body is ignored.
pub fn parse_empty(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    check_status(response, expected)
}

/// Map a response that is not the expected one to the appropriate `ApiError`.
pub fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    Err(error_from_response(response))
}

/// Build the error for a response, pulling the human-readable message out of
/// the `{message}` / `{error}` envelope when present.
pub fn error_from_response(response: &HttpResponse) -> ApiError {
    if response.status == 404 {
        return ApiError::NotFound;
    }
    let message = serde_json::from_str::<ErrorBody>(&response.body)
        .ok()
        .and_then(ErrorBody::text)
        .unwrap_or_else(|| response.body.clone());
    ApiError::Status {
        status: response.status,
        message,
        retry_after: response.header("retry-after").map(str::to_string),
    }
}

fn encode_query(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
