//! Shared directory connection with idle expiry and query throttling
//!
//! State machine: **Closed** → **Open** (bound, idle timer armed) →
//! **Closed** (explicit [`DirectoryClient::close`] or idle timeout).
//!
//! One lock guards the connection state: the Closed/Open check, installing
//! or taking the session, re-arming the idle timer, and the timer's own
//! expiry. Binding and unbinding happen outside it, so `is_open` and
//! `close` never wait on a network round-trip. A session bound while
//! another was installed is unbound again.
//!
//! Every re-arm bumps a generation counter; an expiring timer only closes
//! the connection if its generation is still current and no search is in
//! flight. Searches register through an [`InFlight`] guard that releases
//! on drop, including when the search future is cancelled.
//!
//! Searches are serialized across callers by a separate gate, and each
//! query is preceded by the configured throttle delay. The state lock is
//! not held while queries run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rabdap_common::config::DirectoryConfig;
use rabdap_common::IdField;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::query::{build_queries, DirectoryQuery, SearchTerms};
use super::{DirectoryConnector, DirectoryRecord, DirectorySession};
use crate::error::{SyncError, SyncResult};

pub const DEFAULT_THROTTLE_MS: u64 = 500;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Timing settings for the directory client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Delay observed before every query, including the first
    pub throttle: Duration,
    /// Idle period after which the connection is closed
    pub idle_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(DEFAULT_THROTTLE_MS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl From<&DirectoryConfig> for ClientSettings {
    fn from(config: &DirectoryConfig) -> Self {
        Self {
            throttle: config.throttle(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

type SharedState = Arc<Mutex<ConnectionState>>;

struct ConnectionState {
    session: Option<Arc<dyn DirectorySession>>,
    /// Bumped on every re-arm or cancel of the idle timer
    generation: u64,
    idle_timer: Option<JoinHandle<()>>,
    /// Searches currently using the session
    in_flight: usize,
}

impl ConnectionState {
    fn cancel_idle_timer(&mut self) {
        if let Some(handle) = self.idle_timer.take() {
            handle.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    fn arm_idle_timer(&mut self, shared: &SharedState, idle: Duration) {
        self.cancel_idle_timer();
        let generation = self.generation;
        let shared = Arc::clone(shared);
        self.idle_timer = Some(tokio::spawn(expire_after_idle(shared, generation, idle)));
    }

    fn finish_search(&mut self, shared: &SharedState, idle: Duration) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.session.is_some() {
            self.arm_idle_timer(shared, idle);
        }
    }
}

/// Registration of one search against the open session
///
/// Dropping it releases the registration and restarts the idle period.
struct InFlight {
    state: SharedState,
    idle: Duration,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let idle = self.idle;
        match self.state.try_lock() {
            Ok(mut state) => state.finish_search(&self.state, idle),
            Err(_) => {
                let shared = Arc::clone(&self.state);
                runtime.spawn(async move {
                    shared.lock().await.finish_search(&shared, idle);
                });
            }
        }
    }
}

/// Process-wide directory client
pub struct DirectoryClient {
    connector: Arc<dyn DirectoryConnector>,
    settings: ClientSettings,
    state: SharedState,
    query_gate: Mutex<()>,
}

impl DirectoryClient {
    pub fn new(connector: Arc<dyn DirectoryConnector>, settings: ClientSettings) -> Self {
        Self {
            connector,
            settings,
            state: Arc::new(Mutex::new(ConnectionState {
                session: None,
                generation: 0,
                idle_timer: None,
                in_flight: 0,
            })),
            query_gate: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> ClientSettings {
        self.settings
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    /// Bind a new connection and arm the idle timer
    ///
    /// Fails with [`SyncError::AlreadyOpen`] if a connection is held.
    pub async fn open(&self) -> SyncResult<()> {
        if self.state.lock().await.session.is_some() {
            return Err(SyncError::AlreadyOpen);
        }

        let fresh = self.bind().await?;

        let surplus = {
            let mut state = self.state.lock().await;
            if state.session.is_some() {
                Some(fresh)
            } else {
                self.install(&mut state, fresh);
                None
            }
        };

        match surplus {
            Some(session) => {
                discard(session).await;
                Err(SyncError::AlreadyOpen)
            }
            None => Ok(()),
        }
    }

    /// Push the idle deadline out by a full idle period
    pub async fn reset(&self) -> SyncResult<()> {
        let mut state = self.state.lock().await;
        if state.session.is_none() {
            return Err(SyncError::NotOpen);
        }
        state.arm_idle_timer(&self.state, self.settings.idle_timeout);
        Ok(())
    }

    /// Release the connection; a no-op when already closed
    pub async fn close(&self) -> SyncResult<()> {
        let session = {
            let mut state = self.state.lock().await;
            state.cancel_idle_timer();
            state.session.take()
        };

        match session {
            Some(session) => {
                info!("Closing directory connection");
                session.unbind().await
            }
            None => Ok(()),
        }
    }

    /// Search the directory for `terms` on a logical field
    ///
    /// Opens the connection if needed. Queries run one at a time, each
    /// after the throttle delay; results are concatenated in query order
    /// without deduplication. Transport errors abort the search and are
    /// not retried.
    pub async fn search(
        &self,
        terms: impl Into<SearchTerms>,
        field: IdField,
    ) -> SyncResult<Vec<DirectoryRecord>> {
        let terms = terms.into();
        let queries = build_queries(&terms, field);
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let _gate = self.query_gate.lock().await;
        let (session, in_flight) = self.acquire().await?;
        let result = self.run_queries(session.as_ref(), &queries).await;
        drop(in_flight);

        if let Ok(records) = &result {
            info!(
                field = %field,
                terms = terms.len(),
                queries = queries.len(),
                returned = records.len(),
                "Directory search completed"
            );
        }
        result
    }

    async fn run_queries(
        &self,
        session: &dyn DirectorySession,
        queries: &[DirectoryQuery],
    ) -> SyncResult<Vec<DirectoryRecord>> {
        let mut records = Vec::new();

        for (index, query) in queries.iter().enumerate() {
            tokio::time::sleep(self.settings.throttle).await;

            debug!(
                chunk = index + 1,
                of = queries.len(),
                terms = query.values.len(),
                "Querying directory"
            );

            let found = session.search(query).await?;
            if found.is_empty() {
                debug!(chunk = index + 1, "Directory query matched nothing, skipping");
                continue;
            }
            records.extend(found);
        }

        Ok(records)
    }

    /// Open-or-reset and register an in-flight search
    async fn acquire(&self) -> SyncResult<(Arc<dyn DirectorySession>, InFlight)> {
        {
            let mut state = self.state.lock().await;
            if let Some(session) = state.session.clone() {
                let in_flight = self.register(&mut state);
                return Ok((session, in_flight));
            }
        }

        let fresh = self.bind().await?;

        let (session, in_flight, surplus) = {
            let mut state = self.state.lock().await;
            let (session, surplus) = match state.session.clone() {
                Some(existing) => (existing, Some(fresh)),
                None => {
                    self.install(&mut state, Arc::clone(&fresh));
                    (fresh, None)
                }
            };
            let in_flight = self.register(&mut state);
            (session, in_flight, surplus)
        };

        if let Some(surplus) = surplus {
            discard(surplus).await;
        }
        Ok((session, in_flight))
    }

    fn register(&self, state: &mut ConnectionState) -> InFlight {
        state.in_flight += 1;
        state.arm_idle_timer(&self.state, self.settings.idle_timeout);
        InFlight {
            state: Arc::clone(&self.state),
            idle: self.settings.idle_timeout,
        }
    }

    async fn bind(&self) -> SyncResult<Arc<dyn DirectorySession>> {
        debug!("Binding directory connection");
        self.connector.connect().await
    }

    fn install(&self, state: &mut ConnectionState, session: Arc<dyn DirectorySession>) {
        state.session = Some(session);
        state.arm_idle_timer(&self.state, self.settings.idle_timeout);
        info!(
            idle_timeout_secs = self.settings.idle_timeout.as_secs(),
            "Directory connection opened"
        );
    }
}

/// Unbind a session that lost the race to be installed
async fn discard(session: Arc<dyn DirectorySession>) {
    debug!("Connection already open, unbinding the extra bind");
    if let Err(e) = session.unbind().await {
        warn!(error = %e, "Directory unbind of extra connection failed");
    }
}

async fn expire_after_idle(state: SharedState, generation: u64, idle: Duration) {
    tokio::time::sleep(idle).await;

    let session = {
        let mut state = state.lock().await;
        if state.generation != generation || state.in_flight > 0 {
            return;
        }
        state.idle_timer = None;
        state.session.take()
    };

    if let Some(session) = session {
        info!(idle_secs = idle.as_secs(), "Directory connection idle, closing");
        if let Err(e) = session.unbind().await {
            warn!(error = %e, "Directory unbind after idle timeout failed");
        }
    }
}

impl fmt::Debug for DirectoryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryClient")
            .field("settings", &self.settings)
            .finish()
    }
}
