use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use super::Metrics;
use crate::utils::CircuitState;

/// Start the metrics HTTP server
/// This should be called in a separate thread/runtime to avoid conflicts
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://0.0.0.0:{}/metrics", port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(metrics.clone()))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn metrics_handler(metrics: web::Data<Arc<Metrics>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

/// Index sync health as last exported by the relay
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncHealth {
    pub status: &'static str,
    pub service: &'static str,
    pub mirror_circuit: &'static str,
    pub outbox_backlog: i64,
    pub outbox_oldest_age_seconds: f64,
    pub dead_letters: u64,
}

impl SyncHealth {
    /// Degraded while the mirror breaker is not closed; the process itself
    /// keeps serving orders either way.
    pub fn from_metrics(metrics: &Metrics) -> Self {
        let circuit = CircuitState::from_gauge(metrics.circuit_breaker_state.get());

        Self {
            status: if circuit == CircuitState::Closed { "healthy" } else { "degraded" },
            service: "fulfillment-core",
            mirror_circuit: circuit.as_str(),
            outbox_backlog: metrics.outbox_backlog.get(),
            outbox_oldest_age_seconds: metrics.outbox_oldest_age_seconds.get(),
            dead_letters: metrics.dlq_messages_total.get(),
        }
    }
}

async fn health_handler(metrics: web::Data<Arc<Metrics>>) -> impl Responder {
    HttpResponse::Ok().json(SyncHealth::from_metrics(&metrics))
}
