//! End-to-end tests driving the router in-process, with mockito standing in
//! for the generative-language endpoint.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Value};
use tower::ServiceExt;

use dream_journal::{build_router, Config, JournalDatabase, SharedSystemState, UnifiedAppState};

const ANALYSIS: &str = r#"{"actionsPerformed":"ran through a forest","location":"","time":"night","movementThroughTime":"","emotionalContent":"fear then relief","surfacePsychologicalContent":"","workDone":"","familiarPersons":"my brother","pastEventRelation":"","futureEventRelation":"","messages":"","spatialAwareness":""}"#;

fn app_for(gemini: &ServerGuard) -> Router {
    let config = Config::for_testing(&gemini.url());
    let db = Arc::new(JournalDatabase::new_in_memory().expect("in-memory database"));
    let state = SharedSystemState::new(config, db).expect("state");
    build_router(UnifiedAppState::new(Arc::new(state)))
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn sign_up(app: &Router, email: &str) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/auth/signup",
        None,
        Some(json!({ "email": email, "password": "dreamer-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

async fn mock_analysis(server: &mut ServerGuard, analysis: &str) -> mockito::Mock {
    server
        .mock("POST", "/models/gemini-2.0-flash:generateContent")
        .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "candidates": [{ "content": { "parts": [{ "text": analysis }] } }] }).to_string())
        .create_async()
        .await
}

#[tokio::test]
async fn journal_routes_require_a_session() {
    let gemini = Server::new_async().await;
    let app = app_for(&gemini);

    let (status, body) = call(&app, "GET", "/dreams/drafts", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("signed in"));

    let (status, _) = call(&app, "GET", "/stats", Some("not-a-real-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_up_sign_in_and_sign_out() {
    let gemini = Server::new_async().await;
    let app = app_for(&gemini);

    let (status, _) = call(&app, "POST", "/auth/signup", None, Some(json!({ "email": "bad", "password": "longenough" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, "POST", "/auth/signup", None, Some(json!({ "email": "a@b.co", "password": "short" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let token = sign_up(&app, "sleeper@example.com").await;
    let (status, _) = call(
        &app,
        "POST",
        "/auth/signup",
        None,
        Some(json!({ "email": "sleeper@example.com", "password": "dreamer-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        "POST",
        "/auth/signin",
        None,
        Some(json!({ "email": "sleeper@example.com", "password": "wrong-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, state) = call(&app, "GET", "/auth/state", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["ready"], true);
    assert_eq!(state["user"]["email"], "sleeper@example.com");

    let (status, _) = call(&app, "POST", "/auth/signout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, state) = call(&app, "GET", "/auth/state", Some(&token), None).await;
    assert!(state["user"].is_null());
}

#[tokio::test]
async fn session_cookie_is_accepted() {
    let gemini = Server::new_async().await;
    let app = app_for(&gemini);
    let (status, body) = call(&app, "POST", "/auth/anonymous", None, None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["isAnonymous"], true);
    let token = body["token"].as_str().unwrap();

    let request = Request::builder()
        .uri("/dreams/archived")
        .header(header::COOKIE, format!("theme=dark; session_id={}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn federated_sign_in_needs_the_shared_secret() {
    let gemini = Server::new_async().await;
    let app = app_for(&gemini);
    let identity = json!({ "provider": "google", "subject": "42", "email": "fed@example.com" });

    let (status, _) = call(&app, "POST", "/auth/federated", None, Some(identity.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("POST")
        .uri("/auth/federated")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-federation-secret", "federation-test-secret")
        .body(Body::from(identity.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_some());
}

#[tokio::test]
async fn draft_is_analyzed_archived_and_rendered() {
    let mut gemini = Server::new_async().await;
    let mock = mock_analysis(&mut gemini, ANALYSIS).await;
    let app = app_for(&gemini);
    let token = sign_up(&app, "flow@example.com").await;

    let (status, draft) = call(
        &app,
        "POST",
        "/dreams/drafts",
        Some(&token),
        Some(json!({ "dreamText": "I ran through a dark forest", "dreamTitle": "Forest" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let draft_id = draft["id"].as_str().unwrap().to_string();

    let (status, updated) = call(
        &app,
        "PUT",
        &format!("/dreams/drafts/{}", draft_id),
        Some(&token),
        Some(json!({ "dreamTitle": "Dark forest" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["dreamTitle"], "Dark forest");

    let (status, current) = call(&app, "GET", "/dreams/drafts/current", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["id"], draft_id.as_str());
    assert_eq!(current["dreamTitle"], "Dark forest");

    let (status, archived) = call(&app, "POST", &format!("/dreams/drafts/{}/analyze", draft_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED, "{}", archived);
    mock.assert_async().await;

    let (_, drafts) = call(&app, "GET", "/dreams/drafts", Some(&token), None).await;
    assert_eq!(drafts.as_array().unwrap().len(), 0);
    let (status, _) = call(&app, "GET", "/dreams/drafts/current", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, all) = call(&app, "GET", "/dreams/archived", Some(&token), None).await;
    let all = all.as_array().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["dreamText"], "I ran through a dark forest");
    assert_eq!(all[0]["matchedRealityEvent"], "");

    let archived_id = all[0]["id"].as_str().unwrap().to_string();
    let (status, detail) = call(&app, "GET", &format!("/dreams/archived/{}", archived_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["analysis"]["kind"], "parsed");
    let labels: Vec<&str> = detail["analysis"]["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["label"].as_str().unwrap())
        .collect();
    assert!(labels.contains(&"Actions Performed"));
    assert!(!labels.contains(&"Location"));

    let (status, matched) = call(
        &app,
        "PUT",
        &format!("/dreams/archived/{}/match", archived_id),
        Some(&token),
        Some(json!({ "matchedRealityEvent": "Hiked on Saturday" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(matched["matchedRealityEvent"], "Hiked on Saturday");

    let (status, _) = call(&app, "DELETE", &format!("/dreams/archived/{}", archived_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &format!("/dreams/archived/{}", archived_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analysis_failure_is_bad_gateway_and_keeps_draft() {
    let mut gemini = Server::new_async().await;
    gemini
        .mock("POST", "/models/gemini-2.0-flash:generateContent")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("internal")
        .create_async()
        .await;
    let app = app_for(&gemini);
    let token = sign_up(&app, "fail@example.com").await;

    let (_, draft) = call(&app, "POST", "/dreams/drafts", Some(&token), Some(json!({ "dreamText": "falling" }))).await;
    let draft_id = draft["id"].as_str().unwrap();

    let (status, body) = call(&app, "POST", &format!("/dreams/drafts/{}/analyze", draft_id), Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body["error"].as_str().unwrap().contains("internal"));

    let (_, drafts) = call(&app, "GET", "/dreams/drafts", Some(&token), None).await;
    assert_eq!(drafts.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_draft_is_rejected() {
    let gemini = Server::new_async().await;
    let app = app_for(&gemini);
    let token = sign_up(&app, "empty@example.com").await;

    let (status, _) = call(&app, "POST", "/dreams/drafts", Some(&token), Some(json!({ "dreamText": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, "POST", "/dreams/drafts", Some(&token), Some(json!({ "dreamText": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_select_and_confirm_match() {
    let mut gemini = Server::new_async().await;
    mock_analysis(&mut gemini, ANALYSIS).await;
    let app = app_for(&gemini);
    let token = sign_up(&app, "match@example.com").await;

    let (_, draft) = call(&app, "POST", "/dreams/drafts", Some(&token), Some(json!({ "dreamText": "A train to the Sea" }))).await;
    let (_, archived) = call(
        &app,
        "POST",
        &format!("/dreams/drafts/{}/analyze", draft["id"].as_str().unwrap()),
        Some(&token),
        None,
    )
    .await;
    let dream_id = archived["id"].as_str().unwrap().to_string();

    let (status, event) = call(&app, "POST", "/reality/events", Some(&token), Some(json!({ "eventText": "Booked a seaside trip" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let event_id = event["id"].as_str().unwrap().to_string();

    let (status, results) = call(&app, "GET", "/search?q=SEA&scope=7", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["dreams"].as_array().unwrap().len(), 1);
    assert_eq!(results["events"].as_array().unwrap().len(), 1);

    let (status, _) = call(&app, "GET", "/search?q=sea&scope=fortnight", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "POST", "/match/selection/confirm", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    call(&app, "PUT", "/match/selection", Some(&token), Some(json!({ "target": "dream", "id": "someone-else" }))).await;
    let (_, selection) = call(&app, "PUT", "/match/selection", Some(&token), Some(json!({ "target": "dream", "id": dream_id }))).await;
    assert_eq!(selection["dreamId"], dream_id.as_str());
    let (_, selection) = call(&app, "PUT", "/match/selection", Some(&token), Some(json!({ "target": "event", "id": event_id }))).await;
    assert_eq!(selection["eventId"], event_id.as_str());

    let (status, matched) = call(&app, "POST", "/match/selection/confirm", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(matched["matchedRealityEvent"].as_str().unwrap().ends_with("Booked a seaside trip"));

    let (_, selection) = call(&app, "GET", "/match/selection", Some(&token), None).await;
    assert!(selection["dreamId"].is_null());
    assert!(selection["eventId"].is_null());
}

#[tokio::test]
async fn stats_skip_unparsable_analyses() {
    let mut gemini = Server::new_async().await;
    mock_analysis(&mut gemini, "this is not json").await;
    let app = app_for(&gemini);
    let token = sign_up(&app, "stats@example.com").await;

    let (_, draft) = call(&app, "POST", "/dreams/drafts", Some(&token), Some(json!({ "dreamText": "Blurry dream" }))).await;
    let (status, archived) = call(
        &app,
        "POST",
        &format!("/dreams/drafts/{}/analyze", draft["id"].as_str().unwrap()),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(archived["analysis"]["kind"], "raw");

    let (status, stats) = call(&app, "GET", "/stats", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalDreams"], 1);
    assert_eq!(stats["skipped"], 1);
    assert!(stats["presence"].as_array().unwrap().iter().all(|p| p["count"] == 0));
}

#[tokio::test]
async fn chat_turns_and_archive() {
    let mut gemini = Server::new_async().await;
    gemini
        .mock("POST", "/models/gemini-2.0-flash:generateContent")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({ "candidates": [{ "content": { "parts": [{ "text": "Tell me more." }] } }] }).to_string())
        .create_async()
        .await;
    gemini
        .mock("POST", "/models/imagen-3.0-generate-002:predict")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({ "predictions": [{ "bytesBase64Encoded": "aGVsbG8=" }] }).to_string())
        .create_async()
        .await;
    let app = app_for(&gemini);
    let token = sign_up(&app, "chat@example.com").await;

    let (status, exchange) = call(&app, "POST", "/reality/chat/messages", Some(&token), Some(json!({ "text": "Long day at work" }))).await;
    assert_eq!(status, StatusCode::OK, "{}", exchange);
    assert_eq!(exchange["reply"]["text"], "Tell me more.");
    let conversation_id = exchange["conversationId"].as_str().unwrap().to_string();

    let (status, image) = call(&app, "POST", "/reality/chat/images", Some(&token), Some(json!({ "prompt": "an office at dusk" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(image["conversationId"], conversation_id.as_str());
    assert_eq!(image["reply"]["imageBase64"], "aGVsbG8=");

    let (_, active) = call(&app, "GET", "/reality/chat", Some(&token), None).await;
    assert_eq!(active["messages"].as_array().unwrap().len(), 4);

    let (status, archived) = call(&app, "POST", "/reality/chat/archive", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(archived["isArchived"], true);

    let (_, active) = call(&app, "GET", "/reality/chat", Some(&token), None).await;
    assert!(active["conversationId"].is_null());

    let (_, conversations) = call(&app, "GET", "/reality/conversations", Some(&token), None).await;
    assert_eq!(conversations.as_array().unwrap().len(), 1);
    let (_, messages) = call(&app, "GET", &format!("/reality/conversations/{}/messages", conversation_id), Some(&token), None).await;
    assert_eq!(messages.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn users_cannot_see_each_others_journal() {
    let gemini = Server::new_async().await;
    let app = app_for(&gemini);
    let alice = sign_up(&app, "alice@example.com").await;
    let bob = sign_up(&app, "bob@example.com").await;

    let (_, draft) = call(&app, "POST", "/dreams/drafts", Some(&alice), Some(json!({ "dreamText": "secret dream" }))).await;
    let (_, bobs) = call(&app, "GET", "/dreams/drafts", Some(&bob), None).await;
    assert!(bobs.as_array().unwrap().is_empty());

    let (status, _) = call(&app, "DELETE", &format!("/dreams/drafts/{}", draft["id"].as_str().unwrap()), Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn live_list_sends_initial_snapshot() {
    let gemini = Server::new_async().await;
    let app = app_for(&gemini);
    let token = sign_up(&app, "live@example.com").await;
    call(&app, "POST", "/reality/events", Some(&token), Some(json!({ "eventText": "Morning run" }))).await;

    let request = Request::builder()
        .uri("/live/events")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));

    let mut body = response.into_body().into_data_stream();
    let first = tokio_test::assert_ok!(body.next().await.unwrap());
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("event: snapshot"));
    assert!(text.contains("Morning run"));

    let (status, _) = call(&app, "GET", "/live/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_and_admin_endpoints() {
    let gemini = Server::new_async().await;
    let app = app_for(&gemini);

    let (status, health) = call(&app, "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["ready"], true);

    sign_up(&app, "admin@example.com").await;
    let (status, stats) = call(&app, "GET", "/admin/stats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["database"]["total_users"], 1);
    assert_eq!(stats["activeSessions"], 1);

    let (status, _) = call(&app, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
