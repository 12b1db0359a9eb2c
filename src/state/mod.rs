mod roster;
mod session;
mod submission;

pub use roster::RemovedUser;

use crate::config::ServerConfig;
use crate::protocol::ServerMessage;
use crate::resolver::EntityResolver;
use crate::sports::SportCatalog;
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// All sessions, by code. Single source of truth.
    pub sessions: Arc<RwLock<HashMap<SessionCode, Session>>>,
    /// Per-session submission locks. The check-duplicate-then-commit sequence
    /// holds this, never the whole sessions map, so unrelated sessions don't
    /// block each other.
    submit_locks: Arc<RwLock<HashMap<SessionCode, Arc<Mutex<()>>>>>,
    /// Per-session broadcast channels (one room per session code)
    rooms: Arc<RwLock<HashMap<SessionCode, broadcast::Sender<ServerMessage>>>>,
    /// Direct channels to individual connections
    conns: Arc<RwLock<HashMap<ConnId, mpsc::UnboundedSender<ServerMessage>>>>,
    /// Running countdown tasks, by session code
    pub(crate) timers: Arc<RwLock<HashMap<SessionCode, JoinHandle<()>>>>,
    pub resolver: Arc<dyn EntityResolver>,
    pub catalog: Arc<SportCatalog>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(resolver: Arc<dyn EntityResolver>, catalog: SportCatalog, config: ServerConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            submit_locks: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            conns: Arc::new(RwLock::new(HashMap::new())),
            timers: Arc::new(RwLock::new(HashMap::new())),
            resolver,
            catalog: Arc::new(catalog),
            config,
        }
    }

    /// Register a connection's direct channel; the receiver is drained by the
    /// connection's socket loop
    pub async fn register_conn(&self, conn_id: &str) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.conns.write().await.insert(conn_id.to_string(), tx);
        rx
    }

    pub async fn unregister_conn(&self, conn_id: &str) {
        self.conns.write().await.remove(conn_id);
    }

    /// Send a message to one connection. Missing/closed connections are fine.
    pub async fn send_to_conn(&self, conn_id: &str, msg: ServerMessage) {
        if let Some(tx) = self.conns.read().await.get(conn_id) {
            let _ = tx.send(msg);
        }
    }

    /// Subscribe to a session's room, creating the channel on first use
    pub async fn subscribe_room(&self, code: &str) -> broadcast::Receiver<ServerMessage> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(code.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .subscribe()
    }

    /// Broadcast to everyone subscribed to a session's room.
    /// No receivers connected is fine.
    pub async fn broadcast_to_room(&self, code: &str, msg: ServerMessage) {
        if let Some(tx) = self.rooms.read().await.get(code) {
            let _ = tx.send(msg);
        }
    }

    /// The submission lock for one session, created on first use
    pub async fn submit_lock(&self, code: &str) -> Arc<Mutex<()>> {
        let mut locks = self.submit_locks.write().await;
        locks
            .entry(code.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
