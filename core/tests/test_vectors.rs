//! Verify request building and response parsing against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Bodies are compared as parsed JSON, not raw strings, to avoid false
//! negatives from field ordering.

use reelreview_core::client::{parse_empty, parse_json};
use reelreview_core::{
    ApiError, Credentials, Favorites, HttpMethod, HttpRequest, HttpResponse, NewComment,
    NewReview, Page, Review, ReviewClient, UpdateReview, WatchLater,
};
use serde_json::Value;
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:3000";

fn client() -> ReviewClient {
    ReviewClient::new(BASE_URL)
}

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn uuid(v: &Value) -> Uuid {
    v.as_str().unwrap().parse().unwrap()
}

fn build(c: &ReviewClient, op: &str, input: &Value) -> HttpRequest {
    match op {
        "popular_movies" => c.build_popular_movies(input["page"].as_u64().unwrap() as u32),
        "search_movies" => c.build_search_movies(
            input["query"].as_str().unwrap(),
            input["page"].as_u64().unwrap() as u32,
        ),
        "movie" => c.build_movie(input["id"].as_u64().unwrap()),
        "reviews" => c.build_reviews(
            input["page"].as_u64().unwrap() as u32,
            input["genre"].as_u64().map(|g| g as u32),
        ),
        "login" => {
            let creds: Credentials = serde_json::from_value(input.clone()).unwrap();
            c.build_login(&creds).unwrap()
        }
        "create_review" => {
            let review: NewReview = serde_json::from_value(input.clone()).unwrap();
            c.build_create_review(&review).unwrap()
        }
        "update_review" => {
            let patch: UpdateReview = serde_json::from_value(input["patch"].clone()).unwrap();
            c.build_update_review(uuid(&input["id"]), &patch).unwrap()
        }
        "add_comment" => {
            let comment: NewComment = serde_json::from_value(input["comment"].clone()).unwrap();
            c.build_add_comment(uuid(&input["review_id"]), &comment).unwrap()
        }
        "add_favorite" => c.build_add_favorite(uuid(&input["id"])),
        "remove_watch_later" => c.build_remove_watch_later(uuid(&input["id"])),
        "toggle_comment_like" => c.build_toggle_comment_like(uuid(&input["id"])),
        other => panic!("unknown op: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[test]
fn request_test_vectors() {
    let raw = include_str!("../../test-vectors/requests.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    let c = client();
    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let expected = &case["expected_request"];
        let req = build(&c, case["op"].as_str().unwrap(), &case["input"]);

        assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: path");

        let expected_headers: Vec<(String, String)> = expected["headers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| {
                let arr = h.as_array().unwrap();
                (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
            })
            .collect();
        assert_eq!(req.headers, expected_headers, "{name}: headers");

        match req.body.as_deref() {
            Some(body) => {
                let body: Value = serde_json::from_str(body).unwrap();
                assert_eq!(body, expected["body"], "{name}: body");
            }
            None => assert!(expected["body"].is_null(), "{name}: body should be None"),
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn parse(kind: &str, response: &HttpResponse, expected: u16) -> Result<Value, ApiError> {
    match kind {
        "review_page" => parse_json::<Page<Review>>(response, expected)
            .map(|v| serde_json::to_value(v).unwrap()),
        "review" => {
            parse_json::<Review>(response, expected).map(|v| serde_json::to_value(v).unwrap())
        }
        "favorites" => {
            parse_json::<Favorites>(response, expected).map(|v| serde_json::to_value(v).unwrap())
        }
        "watch_later" => {
            parse_json::<WatchLater>(response, expected).map(|v| serde_json::to_value(v).unwrap())
        }
        "empty" => parse_empty(response, expected).map(|()| Value::Null),
        other => panic!("unknown kind: {other}"),
    }
}

#[test]
fn response_test_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let sim = &case["simulated_response"];
        let response = HttpResponse {
            status: sim["status"].as_u64().unwrap() as u16,
            headers: Vec::new(),
            body: sim["body"].as_str().unwrap().to_string(),
        };
        let expected_status = case["expected_status"].as_u64().unwrap() as u16;
        let result = parse(case["kind"].as_str().unwrap(), &response, expected_status);

        if let Some(expected_error) = case.get("expected_error") {
            let err = result.unwrap_err();
            match expected_error.as_str().unwrap() {
                "NotFound" => assert!(matches!(err, ApiError::NotFound), "{name}: {err:?}"),
                "Deserialization" => {
                    assert!(matches!(err, ApiError::Deserialization(_)), "{name}: {err:?}")
                }
                "Status" => match err {
                    ApiError::Status { status, message, .. } => {
                        assert_eq!(status as u64, case["expected_status_code"].as_u64().unwrap(), "{name}");
                        assert_eq!(message, case["expected_message"].as_str().unwrap(), "{name}");
                    }
                    other => panic!("{name}: expected Status, got {other:?}"),
                },
                other => panic!("{name}: unknown expected error {other}"),
            }
        } else {
            assert_eq!(result.unwrap(), case["expected_result"], "{name}: parsed result");
        }
    }
}
