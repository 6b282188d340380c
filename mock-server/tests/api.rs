use axum::{
    http::{self, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, AppState, Genre, LikeStatus, Movie, Page, Review, User};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn authed(method: &str, uri: &str, token: &str, body: Option<&str>) -> Request<String> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    match body {
        Some(body) => builder
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .unwrap(),
        None => builder.body(String::new()).unwrap(),
    }
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            &format!(r#"{{"username":"{username}","password":"{password}"}}"#),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    body["token"].as_str().unwrap().to_string()
}

async fn register_and_login(app: &Router, username: &str) -> String {
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/register",
            &format!(r#"{{"username":"{username}","password":"pw"}}"#),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    login(app, username, "pw").await
}

async fn create_review(app: &Router, admin: &str, movie_id: u64) -> Review {
    let resp = app
        .clone()
        .oneshot(authed(
            "POST",
            "/reviews",
            admin,
            Some(&format!(
                r#"{{"movie_id":{movie_id},"title":"Worth it","body":"Yes.","rating":8}}"#
            )),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await
}

// --- movies ---

#[tokio::test]
async fn genres_are_wrapped_in_envelope() {
    let resp = app().oneshot(get("/genres")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    let genres: Vec<Genre> = serde_json::from_value(body["genres"].clone()).unwrap();
    assert!(genres.iter().any(|g| g.name == "Science Fiction"));
}

#[tokio::test]
async fn popular_movies_second_page() {
    let resp = app().oneshot(get("/movies/popular?page=2")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let page: Page<Movie> = body_json(resp).await;
    assert_eq!(page.page, 2);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.results.len(), 1);
}

#[tokio::test]
async fn search_decodes_query_string() {
    let resp = app()
        .oneshot(get("/movies/search?query=the+dark&page=1"))
        .await
        .unwrap();
    let page: Page<Movie> = body_json(resp).await;
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].title, "The Dark Knight");
}

#[tokio::test]
async fn unknown_movie_returns_404_with_error_field() {
    let resp = app().oneshot(get("/movies/1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = body_json(resp).await;
    assert_eq!(body["error"], "movie not found");
}

// --- auth ---

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    register_and_login(&app, "ann").await;
    let resp = app
        .oneshot(json_request(
            "POST",
            "/auth/register",
            r#"{"username":"ann","password":"other"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("already taken"));
}

#[tokio::test]
async fn bad_credentials_return_401() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            r#"{"username":"admin","password":"wrong"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_reflects_token_and_logout_revokes_it() {
    let app = app();
    let token = register_and_login(&app, "bo").await;

    let resp = app.clone().oneshot(authed("GET", "/auth/me", &token, None)).await.unwrap();
    let user: User = body_json(resp).await;
    assert_eq!(user.username, "bo");
    assert!(!user.is_admin);

    let resp = app
        .clone()
        .oneshot(authed("POST", "/auth/logout", &token, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    let resp = app.oneshot(authed("GET", "/auth/me", &token, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn favorites_require_authentication() {
    let resp = app().oneshot(get("/users/me/favorites")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- reviews ---

#[tokio::test]
async fn non_admin_cannot_create_reviews() {
    let app = app();
    let token = register_and_login(&app, "cy").await;
    let resp = app
        .oneshot(authed(
            "POST",
            "/reviews",
            &token,
            Some(r#"{"movie_id":603,"title":"t","body":"b","rating":5}"#),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn review_lifecycle() {
    let app = app();
    let admin = login(&app, "admin", "admin").await;
    let review = create_review(&app, &admin, 27205).await;
    assert_eq!(review.movie_title, "Inception");

    let resp = app
        .clone()
        .oneshot(get("/reviews?page=1&genre=878"))
        .await
        .unwrap();
    let page: Page<Review> = body_json(resp).await;
    assert_eq!(page.results, vec![review.clone()]);

    let resp = app
        .clone()
        .oneshot(authed(
            "PUT",
            &format!("/reviews/{}", review.id),
            &admin,
            Some(r#"{"rating":10}"#),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated: Review = body_json(resp).await;
    assert_eq!(updated.rating, 10);
    assert_eq!(updated.title, review.title);

    let resp = app
        .clone()
        .oneshot(authed("DELETE", &format!("/reviews/{}", review.id), &admin, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .oneshot(get(&format!("/reviews/{}", review.id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_rating_is_rejected() {
    let app = app();
    let admin = login(&app, "admin", "admin").await;
    let resp = app
        .oneshot(authed(
            "POST",
            "/reviews",
            &admin,
            Some(r#"{"movie_id":603,"title":"t","body":"b","rating":11}"#),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- shelves / likes ---

#[tokio::test]
async fn favoriting_twice_conflicts() {
    let app = app();
    let admin = login(&app, "admin", "admin").await;
    let review = create_review(&app, &admin, 603).await;
    let token = register_and_login(&app, "di").await;
    let uri = format!("/users/me/favorites/{}", review.id);

    let resp = app.clone().oneshot(authed("POST", &uri, &token, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = app.clone().oneshot(authed("POST", &uri, &token, None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .oneshot(authed("GET", "/users/me/favorites", &token, None))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["favorites"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn like_toggles_back_and_forth() {
    let app = app();
    let admin = login(&app, "admin", "admin").await;
    let review = create_review(&app, &admin, 13).await;
    let uri = format!("/reviews/{}/like", review.id);

    let resp = app.clone().oneshot(authed("POST", &uri, &admin, None)).await.unwrap();
    let status: LikeStatus = body_json(resp).await;
    assert_eq!(status, LikeStatus { liked: true, likes: 1 });

    let resp = app.clone().oneshot(authed("POST", &uri, &admin, None)).await.unwrap();
    let status: LikeStatus = body_json(resp).await;
    assert_eq!(status, LikeStatus { liked: false, likes: 0 });

    let resp = app.oneshot(authed("GET", &uri, &admin, None)).await.unwrap();
    let status: LikeStatus = body_json(resp).await;
    assert!(!status.liked);
}

// --- fault injection ---

#[tokio::test]
async fn injected_failures_precede_normal_service() {
    let state = AppState::default();
    let app = app_with_state(state.clone());
    state.faults.fail_next(1);

    let resp = app.clone().oneshot(get("/genres")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let resp = app.oneshot(get("/genres")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    assert_eq!(state.faults.hits("/genres"), 2);
}
