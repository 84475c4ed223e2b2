mod common;

use actix_web::{http::StatusCode, test, web, App};
use chat_service::routes;
use common::{bearer, Harness};
use serde_json::{json, Value};

macro_rules! app {
    ($harness:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($harness.state.clone()))
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn health_is_public() {
    let h = Harness::new();
    let app = app!(h);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn api_requires_bearer_token() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::get().uri("/api/v1/conversations").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::get()
        .uri("/api/v1/conversations")
        .insert_header(("Authorization", "Bearer not-a-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn direct_conversation_send_and_list() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .insert_header(bearer("u1"))
        .set_json(json!({"participant_ids": ["u2"], "is_group": false}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;
    let conversation_id = created["id"].as_str().unwrap().to_string();

    // same pair from the other side resolves to the same conversation
    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .insert_header(bearer("u2"))
        .set_json(json!({"participant_ids": ["u1"], "is_group": false}))
        .to_request();
    let again: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(again["id"], created["id"]);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/conversations/{conversation_id}/messages"))
        .insert_header(bearer("u1"))
        .set_json(json!({"type": "text", "text": "hello"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let sent: Value = test::read_body_json(resp).await;
    assert_eq!(sent["content"], json!({"type": "text", "text": "hello"}));

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/conversations/{conversation_id}/messages"))
        .insert_header(bearer("u2"))
        .to_request();
    let messages: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"], sent["id"]);

    let req = test::TestRequest::get()
        .uri("/api/v1/conversations")
        .insert_header(bearer("u2"))
        .to_request();
    let conversations: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["last_message"]["message_id"], sent["id"]);
}

#[actix_web::test]
async fn repeated_participant_ids_create_one_direct_conversation() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .insert_header(bearer("u1"))
        .set_json(json!({"participant_ids": ["u2", "u2", "u1"], "is_group": false}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["participants"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .insert_header(bearer("u1"))
        .set_json(json!({"participant_ids": ["u2", "u3"], "is_group": false}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn image_message_with_attachments() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .insert_header(bearer("u1"))
        .set_json(json!({"participant_ids": ["u2"], "is_group": false}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/conversations/{}/messages", created["id"].as_str().unwrap()))
        .insert_header(bearer("u1"))
        .set_json(json!({
            "type": "image",
            "attachments": [{"file_name": "cat.png", "data": "aGVsbG8="}]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let sent: Value = test::read_body_json(resp).await;
    assert_eq!(sent["content"]["type"], "image");
    assert_eq!(h.media.stored_count(), 1);
}

#[actix_web::test]
async fn non_member_is_forbidden() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .insert_header(bearer("u1"))
        .set_json(json!({"participant_ids": ["u2"], "is_group": false}))
        .to_request();
    let created: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/conversations/{}", created["id"].as_str().unwrap()))
        .insert_header(bearer("mallory"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "NOT_CONVERSATION_MEMBER");
}

#[actix_web::test]
async fn unknown_conversation_is_not_found() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/conversations/{}", uuid::Uuid::new_v4()))
        .insert_header(bearer("u1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn group_lifecycle_over_http() {
    let h = Harness::new();
    let app = app!(h);

    let req = test::TestRequest::post()
        .uri("/api/v1/conversations")
        .insert_header(bearer("u1"))
        .set_json(json!({"participant_ids": ["u2", "u3"], "is_group": true, "name": "trip"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let group: Value = test::read_body_json(resp).await;
    let id = group["id"].as_str().unwrap().to_string();
    assert_eq!(group["participants"].as_array().unwrap().len(), 3);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/conversations/{id}"))
        .insert_header(bearer("u2"))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::patch()
        .uri(&format!("/api/v1/conversations/{id}"))
        .insert_header(bearer("u2"))
        .set_json(json!({"name": "road trip"}))
        .to_request();
    let renamed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(renamed["name"], "road trip");

    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/conversations/{id}/members/me"))
        .insert_header(bearer("u3"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/conversations/{id}"))
        .insert_header(bearer("u3"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn internal_notify_checks_token() {
    let h = Harness::new();
    let mut session = h.connect("u1").await;
    let app = app!(h);
    let body = json!({
        "user_ids": ["u1", "offline"],
        "event": "new_post",
        "payload": {"post_id": "p1"}
    });

    let req = test::TestRequest::post()
        .uri("/internal/notify")
        .insert_header(("X-Internal-Token", "wrong"))
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/internal/notify")
        .insert_header(("X-Internal-Token", "internal-test-token"))
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let report: Value = test::read_body_json(resp).await;
    assert_eq!(report, json!({"delivered": 1, "failed": 0}));

    let event = common::next_event(&mut session).await;
    assert_eq!(event["type"], "new_post");
    assert_eq!(event["payload"]["post"]["post_id"], "p1");
}
