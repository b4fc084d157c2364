//! Prometheus-compatible metrics endpoint
//!
//! Exposes arena counters in Prometheus text format and as JSON.
//! Default endpoint: http://localhost:9090/metrics

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for the arena server
#[derive(Debug)]
pub struct Metrics {
    // Arena state
    pub players: AtomicU64,
    pub food_particles: AtomicU64,
    pub round: AtomicU64,

    // Network stats
    pub connections_active: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub malformed_messages: AtomicU64,

    // Game events
    pub unknown_player_updates: AtomicU64,
    pub food_consumed: AtomicU64,
    pub wins: AtomicU64,
    pub persistence_failures: AtomicU64,
    pub session_resets: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players: AtomicU64::new(0),
            food_particles: AtomicU64::new(0),
            round: AtomicU64::new(1),
            connections_active: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            unknown_player_updates: AtomicU64::new(0),
            food_consumed: AtomicU64::new(0),
            wins: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            session_resets: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record the gauges that describe the current arena
    pub fn observe_arena(&self, players: usize, food: usize, round: u64) {
        self.players.store(players as u64, Ordering::Relaxed);
        self.food_particles.store(food as u64, Ordering::Relaxed);
        self.round.store(round, Ordering::Relaxed);
    }

    /// Record the outcome of one publish
    pub fn record_delivery(&self, delivered: usize, dropped: usize, bytes: usize) {
        self.messages_sent.fetch_add(delivered as u64, Ordering::Relaxed);
        self.frames_dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("arena_players", "Players currently in the arena", "gauge",
            self.players.load(Ordering::Relaxed));
        metric!("arena_food_particles", "Food particles on the field", "gauge",
            self.food_particles.load(Ordering::Relaxed));
        metric!("arena_round", "Current round number", "gauge",
            self.round.load(Ordering::Relaxed));

        metric!("arena_connections_active", "Active WebTransport connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("arena_messages_received_total", "Client messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("arena_messages_sent_total", "Server messages queued for delivery", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("arena_frames_dropped_total", "Outbound frames dropped on full or closed queues", "counter",
            self.frames_dropped.load(Ordering::Relaxed));
        metric!("arena_bytes_sent_total", "Bytes queued for delivery", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("arena_bytes_received_total", "Bytes received from clients", "counter",
            self.bytes_received.load(Ordering::Relaxed));
        metric!("arena_malformed_messages_total", "Client messages that failed validation", "counter",
            self.malformed_messages.load(Ordering::Relaxed));

        metric!("arena_unknown_player_updates_total", "Position reports for unknown players", "counter",
            self.unknown_player_updates.load(Ordering::Relaxed));
        metric!("arena_food_consumed_total", "Food particles consumed", "counter",
            self.food_consumed.load(Ordering::Relaxed));
        metric!("arena_wins_total", "Rounds won", "counter",
            self.wins.load(Ordering::Relaxed));
        metric!("arena_persistence_failures_total", "Failed player store calls", "counter",
            self.persistence_failures.load(Ordering::Relaxed));
        metric!("arena_session_resets_total", "Session resets", "counter",
            self.session_resets.load(Ordering::Relaxed));
        metric!("arena_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        serde_json::json!({
            "arena": {
                "players": load(&self.players),
                "food": load(&self.food_particles),
                "round": load(&self.round),
            },
            "network": {
                "connections": load(&self.connections_active),
                "messages_received": load(&self.messages_received),
                "messages_sent": load(&self.messages_sent),
                "frames_dropped": load(&self.frames_dropped),
                "bytes_sent": load(&self.bytes_sent),
                "bytes_received": load(&self.bytes_received),
                "malformed": load(&self.malformed_messages),
            },
            "game": {
                "unknown_player_updates": load(&self.unknown_player_updates),
                "food_consumed": load(&self.food_consumed),
                "wins": load(&self.wins),
                "persistence_failures": load(&self.persistence_failures),
                "session_resets": load(&self.session_resets),
                "uptime_seconds": self.uptime_seconds(),
            },
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Build the response for one raw HTTP request
fn route(request: &str, metrics: &Metrics) -> String {
    let path = request
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("GET "))
        .and_then(|rest| rest.split_whitespace().next());

    match path {
        Some("/metrics") => http_response("200 OK", "text/plain; version=0.0.4", &metrics.to_prometheus()),
        Some("/metrics/json") | Some("/json") => {
            http_response("200 OK", "application/json", &metrics.to_json())
        }
        Some("/health") | Some("/") => http_response("200 OK", "text/plain", "OK"),
        _ => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string(),
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&request, &metrics);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
