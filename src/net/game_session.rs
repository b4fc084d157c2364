//! Session service - applies client events to the shared game session and
//! publishes the resulting state.
//!
//! Every mutation happens under the session write lock, one event at a time,
//! and the broadcast for that mutation is queued before the lock is released
//! so all clients observe states in mutation order. The only await performed
//! outside the lock is the durable win write.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::game::constants::player::MAX_NAME_LEN;
use crate::game::session::{GameError, GameSession, UpdateOutcome, WinSummary};
use crate::game::state::PlayerId;
use crate::metrics::Metrics;
use crate::net::broadcast::{ConnectionId, ConnectionSet, Delivery};
use crate::net::protocol::{ClientMessage, GameSnapshot, ServerMessage};
use crate::store::{PersistenceError, PersistenceGateway};
use crate::util::vec2::Vec2;

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Name is required")]
    InvalidName,
    #[error("Login failed: {0}")]
    Persistence(#[from] PersistenceError),
}

/// What an accepted position report led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionOutcome {
    /// State was broadcast as an `Update`
    Broadcast { consumed: usize },
    /// The report won the round; `Win` and `Reset` were broadcast
    Won(WinSummary),
    /// The report crossed the win score but the durable write failed
    WinAborted { id: PlayerId },
}

/// Clean a display name: drop control characters and markup, collapse
/// whitespace, cap the length
pub fn sanitize_name(raw: &str) -> String {
    let collapsed = raw
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | '&'))
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    collapsed
        .chars()
        .take(MAX_NAME_LEN)
        .collect::<String>()
        .trim_end()
        .to_string()
}

pub struct SessionService<P> {
    session: Arc<RwLock<GameSession>>,
    gateway: Arc<P>,
    connections: Arc<ConnectionSet>,
    metrics: Arc<Metrics>,
}

impl<P> Clone for SessionService<P> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            gateway: self.gateway.clone(),
            connections: self.connections.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<P: PersistenceGateway> SessionService<P> {
    pub fn new(
        session: GameSession,
        gateway: Arc<P>,
        connections: Arc<ConnectionSet>,
        metrics: Arc<Metrics>,
    ) -> Self {
        metrics.observe_arena(session.players().len(), session.food().len(), session.round());
        Self {
            session: Arc::new(RwLock::new(session)),
            gateway,
            connections,
            metrics,
        }
    }

    pub fn session(&self) -> &Arc<RwLock<GameSession>> {
        &self.session
    }

    pub fn connections(&self) -> &Arc<ConnectionSet> {
        &self.connections
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Dispatch one decoded client message.
    ///
    /// Returns the player id the connection should now be bound to, if the
    /// message changed it.
    pub async fn handle_message(&self, conn: ConnectionId, message: ClientMessage) -> Option<PlayerId> {
        match message {
            ClientMessage::Login { name } => self.login(conn, &name).await.ok(),
            ClientMessage::Ready { id } => {
                self.ready(conn, id).await;
                Some(id)
            }
            ClientMessage::Position { id, x, y } => {
                if let Err(e) = self.report_position(id, Vec2::new(x, y)).await {
                    match e {
                        GameError::UnknownPlayer(_) => warn!("Dropped position report: {}", e),
                        _ => debug!("Dropped position report: {}", e),
                    }
                }
                None
            }
        }
    }

    /// Resolve a name to a stored player and spawn them
    pub async fn login(&self, conn: ConnectionId, raw_name: &str) -> Result<PlayerId, LoginError> {
        let result = self.try_login(conn, raw_name).await;
        if let Err(e) = &result {
            if let LoginError::Persistence(cause) = e {
                error!("Login for '{}' failed: {}", raw_name, cause);
                self.metrics.persistence_failures.fetch_add(1, Ordering::Relaxed);
            } else {
                debug!("Rejected login on connection {}: {}", conn, e);
            }
            self.publish_to(conn, &ServerMessage::LoginRejected { reason: e.to_string() });
        }
        result
    }

    async fn try_login(&self, conn: ConnectionId, raw_name: &str) -> Result<PlayerId, LoginError> {
        let name = sanitize_name(raw_name);
        if name.is_empty() {
            return Err(LoginError::InvalidName);
        }

        let record = self.gateway.find_or_create(&name).await?;

        let mut session = self.session.write().await;
        session.spawn_player(record.id, record.name, record.wins);
        let state = GameSnapshot::from_session(&session);
        self.observe(&session);
        self.publish_to(
            conn,
            &ServerMessage::LoginAccepted {
                id: record.id,
                wins: record.wins,
                state,
            },
        );
        info!("Connection {} logged in as {}", conn, record.id);
        Ok(record.id)
    }

    /// Client is ready: arm the round and send it the full state
    pub async fn ready(&self, conn: ConnectionId, id: PlayerId) {
        let mut session = self.session.write().await;
        session.mark_ready();
        let state = GameSnapshot::from_session(&session);
        self.publish_to(conn, &ServerMessage::Init { id, state });
        debug!("Player {} ready on connection {}", id, conn);
    }

    /// Apply a position report, then run the win transition if it crossed the
    /// win score
    pub async fn report_position(&self, id: PlayerId, position: Vec2) -> Result<PositionOutcome, GameError> {
        {
            let mut session = self.session.write().await;
            let outcome = session.update_position(id, position).map_err(|e| {
                if matches!(e, GameError::UnknownPlayer(_)) {
                    self.metrics.unknown_player_updates.fetch_add(1, Ordering::Relaxed);
                }
                e
            })?;

            match outcome {
                UpdateOutcome::Moved { consumed } => {
                    self.record_consumed(consumed);
                    self.publish_all(&ServerMessage::Update(GameSnapshot::from_session(&session)));
                    return Ok(PositionOutcome::Broadcast { consumed });
                }
                UpdateOutcome::WinReserved { consumed, .. } => self.record_consumed(consumed),
            }
        }

        self.settle_win(id).await
    }

    /// Durable increment for a reserved win, then reset or release the latch
    async fn settle_win(&self, id: PlayerId) -> Result<PositionOutcome, GameError> {
        match self.gateway.increment_wins(id).await {
            Ok(wins) => {
                let mut session = self.session.write().await;
                let summary = session.finish_win(id, wins)?;
                self.metrics.wins.fetch_add(1, Ordering::Relaxed);
                self.metrics.session_resets.fetch_add(1, Ordering::Relaxed);
                self.publish_all(&ServerMessage::Win { id });
                self.publish_all(&ServerMessage::Reset(GameSnapshot::from_session(&session)));
                self.observe(&session);
                info!(
                    "Round {} won by {} ({})",
                    summary.round,
                    summary.name.as_deref().unwrap_or("departed player"),
                    id
                );
                Ok(PositionOutcome::Won(summary))
            }
            Err(e) => {
                error!("Failed to record win for {}: {}", id, e);
                self.metrics.persistence_failures.fetch_add(1, Ordering::Relaxed);
                self.session.write().await.abort_win(id);
                Ok(PositionOutcome::WinAborted { id })
            }
        }
    }

    /// Remove a departed player and tell everyone else
    pub async fn disconnect(&self, id: PlayerId) -> bool {
        let mut session = self.session.write().await;
        let removed = session.remove_player(id).is_some();
        self.observe(&session);
        self.publish_all(&ServerMessage::Update(GameSnapshot::from_session(&session)));
        removed
    }

    fn observe(&self, session: &GameSession) {
        self.metrics
            .observe_arena(session.players().len(), session.food().len(), session.round());
    }

    fn record_consumed(&self, consumed: usize) {
        if consumed > 0 {
            self.metrics.food_consumed.fetch_add(consumed as u64, Ordering::Relaxed);
        }
    }

    fn record(&self, delivery: Delivery) {
        self.metrics
            .record_delivery(delivery.delivered, delivery.dropped, delivery.bytes);
    }

    fn publish_all(&self, message: &ServerMessage) {
        self.record(self.connections.send_all(message));
    }

    fn publish_to(&self, conn: ConnectionId, message: &ServerMessage) {
        self.record(self.connections.send_to(conn, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::{mpsc, Semaphore};

    use crate::config::GameConfig;
    use crate::game::session::SessionPhase;
    use crate::game::state::FoodParticle;
    use crate::game::systems::food::FoodField;
    use crate::net::broadcast::Frame;
    use crate::net::protocol::decode;
    use crate::store::{MemoryStore, PlayerRecord};

    /// Store whose win writes always fail; logins optionally fail too
    struct FailingStore {
        inner: MemoryStore,
        fail_login: bool,
    }

    impl PersistenceGateway for FailingStore {
        async fn find_or_create(&self, name: &str) -> Result<PlayerRecord, PersistenceError> {
            if self.fail_login {
                return Err(PersistenceError::Backend("connection refused".to_string()));
            }
            self.inner.find_or_create(name).await
        }

        async fn increment_wins(&self, _id: PlayerId) -> Result<u32, PersistenceError> {
            Err(PersistenceError::Backend("disk full".to_string()))
        }
    }

    /// Store whose win writes wait for a permit
    struct GatedStore {
        inner: MemoryStore,
        gate: Semaphore,
        increments: AtomicUsize,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                gate: Semaphore::new(0),
                increments: AtomicUsize::new(0),
            }
        }
    }

    impl PersistenceGateway for GatedStore {
        async fn find_or_create(&self, name: &str) -> Result<PlayerRecord, PersistenceError> {
            self.inner.find_or_create(name).await
        }

        async fn increment_wins(&self, id: PlayerId) -> Result<u32, PersistenceError> {
            self.increments.fetch_add(1, Ordering::SeqCst);
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| PersistenceError::Backend(e.to_string()))?;
            self.inner.increment_wins(id).await
        }
    }

    fn service<P: PersistenceGateway>(store: P, win_score: u32) -> SessionService<P> {
        let config = GameConfig {
            food_count: 5,
            win_score,
            ..GameConfig::default()
        };
        SessionService::new(
            GameSession::with_seed(config, 11),
            Arc::new(store),
            Arc::new(ConnectionSet::new(32)),
            Arc::new(Metrics::new()),
        )
    }

    fn drain(rx: &mut mpsc::Receiver<Frame>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            messages.push(decode(&frame).unwrap());
        }
        messages
    }

    /// Put food under each point and park the rest in a far corner
    async fn stage_food<P: PersistenceGateway>(service: &SessionService<P>, at: &[Vec2]) {
        let mut session = service.session().write().await;
        let bounds = session.food().bounds();
        let radius = session.config().food_radius;
        let count = session.config().food_count;
        let mut particles: Vec<FoodParticle> = at
            .iter()
            .map(|p| FoodParticle::new(*p, radius, "#00FF00".to_string()))
            .collect();
        while particles.len() < count {
            particles.push(FoodParticle::new(Vec2::new(1995.0, 5.0), radius, "#000000".to_string()));
        }
        session.set_food(FoodField::from_particles(bounds, radius, particles));
    }

    async fn join<P: PersistenceGateway>(
        service: &SessionService<P>,
        name: &str,
    ) -> (PlayerId, ConnectionId, mpsc::Receiver<Frame>) {
        let (conn, mut rx) = service.connections().register();
        let id = service.login(conn, name).await.unwrap();
        service.ready(conn, id).await;
        drain(&mut rx);
        (id, conn, rx)
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  Alice  "), "Alice");
        assert_eq!(sanitize_name("a\t\nb   c"), "a b c");
        assert_eq!(sanitize_name("<script>&"), "script");
        assert_eq!(sanitize_name("bad\u{0007}bell"), "badbell");
        assert_eq!(sanitize_name(" <> & "), "");
        assert_eq!(sanitize_name(&"x".repeat(50)).len(), MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn test_login_replies_to_caller_only() {
        let service = service(MemoryStore::new(), 700);
        let (conn, mut rx) = service.connections().register();
        let (_, mut bystander) = service.connections().register();

        let id = service.login(conn, "  Alice ").await.unwrap();

        match drain(&mut rx).as_slice() {
            [ServerMessage::LoginAccepted { id: got, wins, state }] => {
                assert_eq!(*got, id);
                assert_eq!(*wins, 0);
                assert_eq!(state.players[&id].name, "Alice");
                assert_eq!(state.food.len(), 5);
            }
            other => panic!("Unexpected messages: {:?}", other),
        }
        assert!(drain(&mut bystander).is_empty());
        assert_eq!(service.metrics().players.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_relogin_keeps_identity_and_wins() {
        let store = MemoryStore::new();
        let record = store.find_or_create("Alice").await.unwrap();
        store.increment_wins(record.id).await.unwrap();
        let service = service(store, 700);
        let (conn, mut rx) = service.connections().register();

        let first = service.login(conn, "Alice").await.unwrap();
        let second = service.login(conn, "Alice").await.unwrap();

        assert_eq!(first, record.id);
        assert_eq!(second, record.id);
        assert_eq!(service.session().read().await.players().len(), 1);
        let replies = drain(&mut rx);
        assert!(matches!(replies.last(), Some(ServerMessage::LoginAccepted { wins: 1, .. })));
    }

    #[tokio::test]
    async fn test_login_rejects_empty_name() {
        let service = service(MemoryStore::new(), 700);
        let (conn, mut rx) = service.connections().register();

        let result = service.login(conn, "  <> ").await;

        assert!(matches!(result, Err(LoginError::InvalidName)));
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::LoginRejected {
                reason: "Name is required".to_string()
            }]
        );
        assert!(service.session().read().await.players().is_empty());
    }

    #[tokio::test]
    async fn test_login_persistence_failure() {
        let service = service(
            FailingStore {
                inner: MemoryStore::new(),
                fail_login: true,
            },
            700,
        );
        let (conn, mut rx) = service.connections().register();

        let result = service.login(conn, "Alice").await;

        assert!(matches!(result, Err(LoginError::Persistence(_))));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::LoginRejected { .. }]
        ));
        assert!(service.session().read().await.players().is_empty());
        assert_eq!(service.metrics().persistence_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_ready_sends_init_and_arms() {
        let service = service(MemoryStore::new(), 700);
        let (conn, mut rx) = service.connections().register();
        let id = service.login(conn, "Alice").await.unwrap();
        drain(&mut rx);

        let bound = service.handle_message(conn, ClientMessage::Ready { id }).await;

        assert_eq!(bound, Some(id));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Init { id: got, state }] if *got == id && state.players.contains_key(&id)
        ));
        assert_eq!(service.session().read().await.phase(), SessionPhase::InProgress);
    }

    #[tokio::test]
    async fn test_position_broadcasts_update() {
        let service = service(MemoryStore::new(), 700);
        let (alice, _, mut rx_alice) = join(&service, "Alice").await;
        let (_, mut watcher) = service.connections().register();
        stage_food(&service, &[Vec2::new(110.0, 100.0)]).await;

        let outcome = service.report_position(alice, Vec2::new(100.0, 100.0)).await.unwrap();

        assert_eq!(outcome, PositionOutcome::Broadcast { consumed: 1 });
        for rx in [&mut rx_alice, &mut watcher] {
            match drain(rx).as_slice() {
                [ServerMessage::Update(state)] => {
                    let player = &state.players[&alice];
                    assert_eq!(player.position, Vec2::new(100.0, 100.0));
                    assert_eq!(player.radius, 21.0);
                    assert_eq!(player.score, 1);
                    assert_eq!(state.food.len(), 5);
                }
                other => panic!("Unexpected messages: {:?}", other),
            }
        }
        assert_eq!(service.metrics().food_consumed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unknown_player_is_silent() {
        let service = service(MemoryStore::new(), 700);
        let (_, _, mut rx) = join(&service, "Alice").await;
        let stranger = uuid::Uuid::new_v4();

        let result = service.report_position(stranger, Vec2::new(1.0, 1.0)).await;
        let bound = service
            .handle_message(0, ClientMessage::Position { id: stranger, x: 1.0, y: 1.0 })
            .await;

        assert_eq!(result, Err(GameError::UnknownPlayer(stranger)));
        assert_eq!(bound, None);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(service.metrics().unknown_player_updates.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_win_broadcasts_win_then_reset() {
        let service = service(MemoryStore::new(), 1);
        let (alice, _, mut rx) = join(&service, "Alice").await;
        stage_food(&service, &[Vec2::new(400.0, 400.0)]).await;

        let outcome = service.report_position(alice, Vec2::new(400.0, 400.0)).await.unwrap();

        match outcome {
            PositionOutcome::Won(summary) => {
                assert_eq!(summary.id, alice);
                assert_eq!(summary.wins, 1);
                assert_eq!(summary.name.as_deref(), Some("Alice"));
            }
            other => panic!("Expected a win, got {:?}", other),
        }
        match drain(&mut rx).as_slice() {
            [ServerMessage::Win { id }, ServerMessage::Reset(state)] => {
                assert_eq!(*id, alice);
                assert!(state.players.is_empty());
                assert_eq!(state.food.len(), 5);
            }
            other => panic!("Unexpected messages: {:?}", other),
        }

        let session = service.session().read().await;
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.round(), 2);
        assert_eq!(service.metrics().wins.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_failed_win_write_aborts_quietly() {
        let service = service(
            FailingStore {
                inner: MemoryStore::new(),
                fail_login: false,
            },
            1,
        );
        let (alice, _, mut rx) = join(&service, "Alice").await;
        stage_food(&service, &[Vec2::new(400.0, 400.0)]).await;

        let outcome = service.report_position(alice, Vec2::new(400.0, 400.0)).await.unwrap();

        assert_eq!(outcome, PositionOutcome::WinAborted { id: alice });
        assert!(drain(&mut rx).is_empty());
        let session = service.session().read().await;
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.players().get(alice).unwrap().score, 1);
        assert_eq!(session.round(), 1);
        assert_eq!(service.metrics().persistence_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_single_win_under_concurrent_crossings() {
        let service = service(GatedStore::new(), 1);
        let (alice, _, mut rx) = join(&service, "Alice").await;
        let (bob, _, _rx_bob) = join(&service, "Bob").await;
        drain(&mut rx);
        stage_food(&service, &[Vec2::new(400.0, 400.0), Vec2::new(1200.0, 900.0)]).await;

        let pending = {
            let service = service.clone();
            tokio::spawn(async move { service.report_position(alice, Vec2::new(400.0, 400.0)).await })
        };
        while service.gateway.increments.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let blocked = service.report_position(bob, Vec2::new(1200.0, 900.0)).await;
        assert_eq!(blocked, Err(GameError::WinPending { winner: alice }));
        assert!(drain(&mut rx).is_empty());

        // Departures still go through while the write is outstanding
        assert!(service.disconnect(bob).await);
        assert!(matches!(drain(&mut rx).as_slice(), [ServerMessage::Update(state)] if !state.players.contains_key(&bob)));

        service.gateway.gate.add_permits(1);
        let outcome = pending.await.unwrap().unwrap();

        assert!(matches!(outcome, PositionOutcome::Won(ref summary) if summary.id == alice));
        assert_eq!(service.gateway.increments.load(Ordering::SeqCst), 1);
        assert_eq!(service.gateway.inner.get(alice).map(|r| r.wins), Some(1));
        assert_eq!(service.gateway.inner.get(bob).map(|r| r.wins), Some(0));
        let wins = drain(&mut rx)
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::Win { .. }))
            .count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_even_when_absent() {
        let service = service(MemoryStore::new(), 700);
        let (alice, _, mut rx) = join(&service, "Alice").await;
        let (_, mut watcher) = service.connections().register();

        assert!(service.disconnect(alice).await);
        assert!(!service.disconnect(alice).await);

        assert_eq!(drain(&mut watcher).len(), 2);
        assert_eq!(drain(&mut rx).len(), 2);
        assert!(service.session().read().await.players().is_empty());
    }

    #[tokio::test]
    async fn test_failed_login_keeps_binding() {
        let service = service(MemoryStore::new(), 700);
        let (conn, _rx) = service.connections().register();

        let bound = service
            .handle_message(conn, ClientMessage::Login { name: "\u{0000}".to_string() })
            .await;
        assert_eq!(bound, None);

        let bound = service
            .handle_message(conn, ClientMessage::Login { name: "Carol".to_string() })
            .await;
        assert!(bound.is_some());
    }
}
