//! Prometheus metrics for message traffic and realtime delivery

use actix_web::{http::header::ContentType, HttpResponse};
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static::lazy_static! {
    pub static ref MESSAGES_SENT: IntCounter = register_int_counter!(
        "chat_messages_sent_total",
        "Messages persisted through send"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref MESSAGES_RECALLED: IntCounter = register_int_counter!(
        "chat_messages_recalled_total",
        "Messages transitioned to the recalled tombstone"
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Live realtime sessions across all users
    pub static ref REALTIME_SESSIONS: IntGauge = register_int_gauge!(
        "chat_realtime_sessions",
        "Currently registered realtime sessions"
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref EVENTS_DELIVERED: IntCounterVec = register_int_counter_vec!(
        "chat_events_delivered_total",
        "Realtime events pushed to a session",
        &["event"]
    ).expect("Prometheus metrics registration should succeed at startup");

    pub static ref DELIVERY_FAILURES: IntCounterVec = register_int_counter_vec!(
        "chat_event_delivery_failures_total",
        "Realtime events dropped because the session was gone",
        &["event"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Uploaded media deleted after a partially failed send
    pub static ref MEDIA_ROLLBACKS: IntCounter = register_int_counter!(
        "chat_media_rollbacks_total",
        "Uploaded media objects deleted by send rollback"
    ).expect("Prometheus metrics registration should succeed at startup");
}

/// `GET /metrics`
pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %err, "failed to encode metrics");
        return HttpResponse::InternalServerError().body(err.to_string());
    }
    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(buffer)
}
