pub mod conversations;
pub mod groups;
pub mod internal;
pub mod messages;
pub mod wsroute;

use actix_web::{get, web, HttpResponse};

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Mount every endpoint of the service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .route("/metrics", web::get().to(crate::metrics::metrics_handler))
        .service(wsroute::ws_handler)
        .service(internal::notify)
        .service(
            web::scope("/api/v1")
                .service(conversations::create_conversation)
                .service(conversations::list_conversations)
                .service(conversations::get_conversation)
                .service(conversations::mark_seen)
                .service(conversations::clear_history)
                .service(conversations::set_mute)
                .service(groups::add_member)
                .service(groups::leave_group)
                .service(groups::update_group)
                .service(messages::send_message)
                .service(messages::list_messages)
                .service(messages::recall_message),
        );
}
