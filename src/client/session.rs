//! Session lifecycle
//!
//! A [`Session`] is one HTTP connection pool plus its creation time. The
//! client owns exactly one live session. It is replaced, never mutated:
//!
//! ```text
//! Uninitialized -> Initialized -> Recreating -> Initialized
//!                        \
//!                         -> Closed (shutdown)
//! ```
//!
//! Recreation happens proactively (background monitor, age check before each
//! request) and reactively (repeated connection failures, empty-body
//! answers). Recreations are serialized; callers that observed the same
//! generation collapse into a single recreation.

use crate::client::inner::ClientInner;
use crate::config::ClientConfig;
use crate::error::{AbodeError, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One HTTP connection pool and its bookkeeping
#[derive(Clone)]
pub struct Session {
    http: reqwest::Client,
    permits: Arc<Semaphore>,
    created_at: Instant,
    generation: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.generation)
            .field("age", &self.age())
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl Session {
    /// Build a new pool with the configured timeouts and bounds
    pub fn build(config: &ClientConfig, generation: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.total)
            .connect_timeout(config.timeouts.connect)
            .read_timeout(config.timeouts.read)
            .pool_max_idle_per_host(config.pool.max_idle_per_host)
            .cookie_store(true)
            .user_agent(format!("abode-client/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AbodeError::connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            permits: Arc::new(Semaphore::new(config.pool.max_connections)),
            created_at: Instant::now(),
            generation,
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Reserve one of the pool's connection slots
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AbodeError::connection("Session connection pool closed"))
    }
}

/// Holder of the single live session
#[derive(Default)]
pub struct SessionManager {
    slot: RwLock<Option<Session>>,
    recreate_lock: Mutex<()>,
    next_generation: AtomicU64,
    closed: AtomicBool,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live session, if any
    pub async fn current(&self) -> Option<Session> {
        self.slot.read().await.clone()
    }

    pub async fn generation(&self) -> Option<u64> {
        self.slot.read().await.as_ref().map(Session::generation)
    }

    pub async fn age(&self) -> Option<Duration> {
        self.slot.read().await.as_ref().map(Session::age)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Return the live session, creating the first one if needed.
    /// The flag is true when this call created it.
    pub async fn get_or_init(&self, config: &ClientConfig) -> Result<(Session, bool)> {
        if self.is_closed() {
            return Err(AbodeError::Closed);
        }
        if let Some(session) = self.current().await {
            return Ok((session, false));
        }

        let mut slot = self.slot.write().await;
        if self.is_closed() {
            return Err(AbodeError::Closed);
        }
        if let Some(session) = slot.as_ref() {
            return Ok((session.clone(), false));
        }

        let session = Session::build(config, self.next_generation.fetch_add(1, Ordering::SeqCst))?;
        debug!(generation = session.generation(), "Session initialized");
        *slot = Some(session.clone());
        Ok((session, true))
    }

    /// Swap in a brand new session. In-flight requests keep the old pool
    /// alive until they finish; it is released with its last clone.
    async fn replace(&self, config: &ClientConfig) -> Result<Session> {
        let session = Session::build(config, self.next_generation.fetch_add(1, Ordering::SeqCst))?;
        let mut slot = self.slot.write().await;
        if self.is_closed() {
            return Err(AbodeError::Closed);
        }
        if let Some(old) = slot.replace(session.clone()) {
            debug!(
                generation = old.generation(),
                age_secs = old.age().as_secs(),
                "Closing previous session"
            );
        }
        Ok(session)
    }

    /// Release the session for good
    pub async fn close(&self) -> Option<Session> {
        self.closed.store(true, Ordering::SeqCst);
        self.slot.write().await.take()
    }
}

/// Running background monitor
pub(crate) struct MonitorHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                warn!("Session monitor ended abnormally: {e}");
            }
        }
    }
}

/// Background guard that recreates the session before the server-side idle
/// timeout. Holds only a weak reference so a dropped client stops it.
async fn session_monitor(client: Weak<ClientInner>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(inner) = client.upgrade() else {
            break;
        };
        if inner.sessions.is_closed() {
            break;
        }

        match inner.refresh_stale_session("session monitor").await {
            Ok(true) => debug!("Session monitor replaced a stale session"),
            Ok(false) => {}
            Err(AbodeError::Closed) => break,
            Err(e) => warn!("Session monitor iteration failed: {e}"),
        }
    }

    debug!("Session monitor stopped");
}

impl ClientInner {
    /// Live session, initialized on first use and replaced when older than
    /// the configured maximum age
    pub(crate) async fn ready_session(&self) -> Result<Session> {
        let session = self.initialized_session().await?;
        if session.age() <= self.config.session.max_age {
            return Ok(session);
        }

        self.refresh_stale_session("request").await?;
        self.sessions.current().await.ok_or(AbodeError::Closed)
    }

    /// Live session without the age check. Starts the monitor when this call
    /// created the first session.
    pub(crate) async fn initialized_session(&self) -> Result<Session> {
        let (session, created) = self.sessions.get_or_init(&self.config).await?;
        if created {
            self.start_monitor();
        }
        Ok(session)
    }

    /// Recreate the session when it outlived `max_age`
    pub(crate) async fn refresh_stale_session(&self, trigger: &str) -> Result<bool> {
        let Some(session) = self.sessions.current().await else {
            return Ok(false);
        };
        let age = session.age();
        if age <= self.config.session.max_age {
            return Ok(false);
        }

        info!(
            age_secs = age.as_secs(),
            max_age_secs = self.config.session.max_age.as_secs(),
            trigger,
            "Session exceeded maximum age"
        );
        self.recreate_session(Some(session.generation()), "session age")
            .await?;
        Ok(true)
    }

    /// Replace the session, drop credentials bound to the old one, and log in
    /// again.
    ///
    /// `observed` is the generation the caller considered broken. When a
    /// concurrent caller already replaced it, this call returns without a
    /// second recreation.
    pub(crate) async fn recreate_session(&self, observed: Option<u64>, reason: &str) -> Result<()> {
        let _guard = self.sessions.recreate_lock.lock().await;

        if self.sessions.is_closed() {
            return Err(AbodeError::Closed);
        }

        let current = self.sessions.generation().await;
        if let (Some(observed), Some(current)) = (observed, current) {
            if observed != current {
                debug!(observed, current, "Session already recreated by another task");
                return Ok(());
            }
        }

        let session = self.sessions.replace(&self.config).await?;
        self.auth.write().await.clear_tokens();
        self.settings.clear().await;
        self.health.write().await.record_recreation();

        info!(generation = session.generation(), reason, "Session recreated");

        self.login_serialized(None).await
    }

    pub(crate) fn start_monitor(&self) {
        if !self.config.session.monitor_enabled || self.sessions.is_closed() {
            return;
        }

        let mut slot = self.monitor.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(session_monitor(
            self.self_ref.clone(),
            self.config.session.monitor_interval,
            token.clone(),
        ));
        debug!(
            interval_secs = self.config.session.monitor_interval.as_secs(),
            "Session monitor started"
        );
        *slot = Some(MonitorHandle { token, handle });
    }

    /// Stop the monitor and release the session. Terminal.
    pub(crate) async fn close_sessions(&self) {
        {
            let _guard = self.sessions.recreate_lock.lock().await;
            if let Some(session) = self.sessions.close().await {
                debug!(generation = session.generation(), "Session released");
            }
        }

        let monitor = self
            .monitor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }
    }
}
