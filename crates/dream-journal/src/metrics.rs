use prometheus::{Encoder, Histogram, IntCounterVec, IntGauge, Registry, TextEncoder};
use lazy_static::lazy_static;
use std::sync::OnceLock;
use axum::response::IntoResponse;
use axum::http::StatusCode;
use tracing::error;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static ANALYSES: OnceLock<IntCounterVec> = OnceLock::new();
static ANALYSIS_LATENCY: OnceLock<Histogram> = OnceLock::new();
static LIVE_SUBSCRIPTIONS: OnceLock<IntGauge> = OnceLock::new();

pub fn init_metrics() {
    let req_counter = REQ_COUNTER.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"],
        )
        .expect("static metric definition")
    });

    let analyses = ANALYSES.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("analyses_total", "Dream analysis requests by outcome"),
            &["outcome"],
        )
        .expect("static metric definition")
    });

    let analysis_latency = ANALYSIS_LATENCY.get_or_init(|| {
        Histogram::with_opts(prometheus::HistogramOpts::new(
            "analysis_latency_seconds",
            "Round trip time of generative analysis calls",
        ))
        .expect("static metric definition")
    });

    let live_subscriptions = LIVE_SUBSCRIPTIONS.get_or_init(|| {
        IntGauge::new("live_subscriptions", "Open live-list streams").expect("static metric definition")
    });

    REGISTRY.register(Box::new(req_counter.clone())).ok();
    REGISTRY.register(Box::new(analyses.clone())).ok();
    REGISTRY.register(Box::new(analysis_latency.clone())).ok();
    REGISTRY.register(Box::new(live_subscriptions.clone())).ok();
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_analysis(outcome: &str) {
    if let Some(counter) = ANALYSES.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn observe_analysis_latency(duration: f64) {
    if let Some(histogram) = ANALYSIS_LATENCY.get() {
        histogram.observe(duration);
    }
}

pub fn inc_live_subscriptions() {
    if let Some(gauge) = LIVE_SUBSCRIPTIONS.get() {
        gauge.inc();
    }
}

pub fn dec_live_subscriptions() {
    if let Some(gauge) = LIVE_SUBSCRIPTIONS.get() {
        gauge.dec();
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, [("content-type", "text/plain")], Vec::new());
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
