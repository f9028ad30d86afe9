//! ---
//! psc_section: "03-persistence-logging"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Metrics collection and export utilities."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across the kernel.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Per-decision series exported by the kernel.
#[derive(Debug, Clone)]
pub struct KernelMetrics {
    decisions_total: IntCounter,
    decision_seconds: Histogram,
    agent_timeouts_total: IntCounterVec,
    validator_rewrites_total: IntCounterVec,
    energy_cost_eur_total: Gauge,
}

impl KernelMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let decisions_total = IntCounter::with_opts(Opts::new(
            "rpsc_decisions_total",
            "Committed decisions since start-up",
        ))?;
        let decision_seconds = Histogram::with_opts(
            HistogramOpts::new("rpsc_decision_seconds", "End-to-end tick latency")
                .buckets(vec![0.01, 0.05, 0.25, 1.0, 4.0, 10.0, 30.0]),
        )?;
        let agent_timeouts_total = IntCounterVec::new(
            Opts::new(
                "rpsc_agent_timeouts_total",
                "Specialist deadline misses replaced by stubs",
            ),
            &["agent"],
        )?;
        let validator_rewrites_total = IntCounterVec::new(
            Opts::new(
                "rpsc_validator_rewrites_total",
                "Feasibility rewrites applied to tentative commands",
            ),
            &["kind"],
        )?;
        // Gauge, not counter: negative spot prices make the sum decrease.
        let energy_cost_eur_total = Gauge::with_opts(Opts::new(
            "rpsc_energy_cost_eur_total",
            "Cumulative pumping cost across committed decisions",
        ))?;

        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(decision_seconds.clone()))?;
        registry.register(Box::new(agent_timeouts_total.clone()))?;
        registry.register(Box::new(validator_rewrites_total.clone()))?;
        registry.register(Box::new(energy_cost_eur_total.clone()))?;

        Ok(Self {
            decisions_total,
            decision_seconds,
            agent_timeouts_total,
            validator_rewrites_total,
            energy_cost_eur_total,
        })
    }

    pub fn observe_decision(&self, seconds: f64, cost_eur: f64) {
        self.decisions_total.inc();
        self.decision_seconds.observe(seconds);
        self.energy_cost_eur_total.add(cost_eur);
    }

    pub fn record_agent_timeout(&self, agent: &str) {
        self.agent_timeouts_total.with_label_values(&[agent]).inc();
    }

    pub fn record_rewrite(&self, kind: &str) {
        self.validator_rewrites_total
            .with_label_values(&[kind])
            .inc();
    }
}

/// Bind and spawn an HTTP exporter serving the registry at `/metrics`.
/// Bind errors surface immediately; the server itself runs detached until
/// [`MetricsServer::shutdown`].
pub async fn spawn_http_server(
    registry: SharedRegistry,
    addr: SocketAddr,
) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get(move || metrics_handler(registry.clone())),
    );
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    let addr = listener.local_addr()?;
    info!(address = %addr, "metrics exporter listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics exporter failed")
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_str(encoder.format_type()).unwrap(),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain"),
                )],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_metrics_register_once() {
        let registry = new_registry();
        let metrics = KernelMetrics::new(registry.clone()).unwrap();
        metrics.observe_decision(0.3, 12.5);
        metrics.observe_decision(0.2, -2.0);
        metrics.record_agent_timeout("energy_cost");
        metrics.record_rewrite("min_one_pump_forced");
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "rpsc_decisions_total"));
        // Double registration must fail loudly.
        assert!(KernelMetrics::new(registry).is_err());
    }
}
