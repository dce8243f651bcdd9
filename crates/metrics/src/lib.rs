use std::convert::Infallible;
use std::net::SocketAddr;

use anyhow::Result;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{Encoder, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::info;

pub const ALIVE_BODY: &str = "Bot is alive!";

/// Prometheus registry plus the counters the monitor updates.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
    fetches: IntCounterVec,
    notifications: IntCounter,
    delivery_failures: IntCounter,
    next_fire: GaugeVec,
}

impl MetricsHandle {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let fetches = IntCounterVec::new(
            Opts::new("stock_fetch_total", "Upstream fetches by lane and outcome"),
            &["lane", "outcome"],
        )?;
        let notifications = IntCounter::new(
            "stock_notifications_total",
            "Notifications delivered to subscribers",
        )?;
        let delivery_failures = IntCounter::new(
            "stock_delivery_failures_total",
            "Notifications that failed to deliver",
        )?;
        let next_fire = GaugeVec::new(
            Opts::new("stock_lane_next_fire_seconds", "Seconds until a lane fetches again"),
            &["lane"],
        )?;

        registry.register(Box::new(fetches.clone()))?;
        registry.register(Box::new(notifications.clone()))?;
        registry.register(Box::new(delivery_failures.clone()))?;
        registry.register(Box::new(next_fire.clone()))?;

        Ok(Self {
            registry,
            fetches,
            notifications,
            delivery_failures,
            next_fire,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_fetch(&self, lane: &str, outcome: &str) {
        self.fetches.with_label_values(&[lane, outcome]).inc();
    }

    pub fn fetch_count(&self, lane: &str, outcome: &str) -> u64 {
        self.fetches.with_label_values(&[lane, outcome]).get()
    }

    pub fn record_deliveries(&self, delivered: usize, failed: usize) {
        self.notifications.inc_by(delivered as u64);
        self.delivery_failures.inc_by(failed as u64);
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications.get()
    }

    pub fn set_next_fire(&self, lane: &str, seconds: f64) {
        self.next_fire.with_label_values(&[lane]).set(seconds);
    }

    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serves `/metrics` and a liveness ping on `/`.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let make_svc = make_service_fn(move |_| {
            let metrics = self.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, Infallible>(metrics.respond(req.uri().path())) }
                }))
            }
        });

        let server = Server::try_bind(&addr)?.serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }

    fn respond(&self, path: &str) -> Response<Body> {
        let (status, body) = match path {
            "/" => (StatusCode::OK, ALIVE_BODY.to_string()),
            "/metrics" => match self.render() {
                Ok(text) => (StatusCode::OK, text),
                Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            },
            _ => (StatusCode::NOT_FOUND, String::from("not found")),
        };
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response
    }
}
