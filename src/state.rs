use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::components::{Dashboard, TaskEvents};
use crate::config::AppConfig;
use crate::repository::TaskRepository;
use crate::session::SessionStore;
use crate::supabase::{IdentityProvider, TableStore};

/// Server-side state of one browser.
pub struct ClientSession {
    pub session: Arc<SessionStore>,
    pub repo: TaskRepository,
    pub events: TaskEvents,
    dashboard: Mutex<Dashboard>,
    turn: Mutex<()>,
}

impl ClientSession {
    pub fn new(session: SessionStore, store: Arc<dyn TableStore>) -> Self {
        let session = Arc::new(session);
        let repo = TaskRepository::new(session.clone(), store);
        let events = TaskEvents::new();
        Self {
            dashboard: Mutex::new(Dashboard::mount(repo.clone(), &events)),
            session,
            repo,
            events,
            turn: Mutex::new(()),
        }
    }

    /// Held for the whole of a request, so one browser's requests run one at a time.
    pub async fn take_turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().await
    }

    /// Whether the server has to remember this browser: it is signed in or
    /// waiting on a sign-in callback.
    pub async fn holds_state(&self) -> bool {
        self.session.current_identity().is_some() || self.session.sign_in_pending().await
    }

    /// Holding the guard serializes this browser's dashboard work.
    pub async fn dashboard(&self) -> MutexGuard<'_, Dashboard> {
        self.dashboard.lock().await
    }

    /// Unmounts the dashboard and mounts an empty one, so the next visit
    /// starts from a fresh fetch.
    pub async fn reset_dashboard(&self) {
        let mut dashboard = self.dashboard.lock().await;
        dashboard.unmount();
        *dashboard = Dashboard::mount(self.repo.clone(), &self.events);
    }
}

/// Client sessions idle for this long are dropped on the next insert.
pub const CLIENT_IDLE_TTL: Duration = Duration::from_secs(12 * 60 * 60);

struct Entry {
    client: Arc<ClientSession>,
    last_seen: Instant,
}

#[derive(Clone)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<Uuid, Entry>>>,
    idle_ttl: Duration,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_idle_ttl(CLIENT_IDLE_TTL)
    }
}

impl ClientRegistry {
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            clients: Arc::default(),
            idle_ttl,
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<ClientSession>> {
        let mut clients = self.clients.write().await;
        let entry = clients.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(entry.client.clone())
    }

    pub async fn insert(&self, client: Arc<ClientSession>) -> Uuid {
        let id = Uuid::new_v4();
        let now = Instant::now();
        let mut clients = self.clients.write().await;

        let before = clients.len();
        clients.retain(|_, entry| now.duration_since(entry.last_seen) < self.idle_ttl);
        if clients.len() < before {
            debug!(evicted = before - clients.len(), "dropped idle client sessions");
        }

        clients.insert(
            id,
            Entry {
                client,
                last_seen: now,
            },
        );
        debug!(client_id = %id, "opened client session");
        id
    }

    pub async fn remove(&self, id: Uuid) {
        if self.clients.write().await.remove(&id).is_some() {
            debug!(client_id = %id, "closed client session");
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub provider: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn TableStore>,
    pub clients: ClientRegistry,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn TableStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            store,
            clients: ClientRegistry::default(),
        }
    }
}
