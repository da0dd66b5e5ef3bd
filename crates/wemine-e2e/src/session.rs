// Session - one isolated browser/HTTP context per test
//
// A session owns the network conditions, the HTTP transport and the DOM
// surface of one test. Closing it resets the network and closes the surface;
// a session dropped without being closed does the same on a best-effort
// basis.

use crate::config::SuiteConfig;
use crate::error::{Error, Result};
use crate::network::NetworkController;
use crate::surface::{Launcher, Surface, SurfaceContext};
use crate::transport::HttpTransport;
use crate::wait::WaitCoordinator;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

struct SessionInner {
    id: u64,
    network: NetworkController,
    http: HttpTransport,
    surface: Arc<dyn Surface>,
    closed: AtomicBool,
}

/// Handle to a test's session; clones share it.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Opens a session with fresh network state.
    pub async fn open(config: &SuiteConfig, launcher: &dyn Launcher) -> Result<Self> {
        Self::open_with(NetworkController::new(), config, launcher).await
    }

    /// Opens a session on a given controller (e.g. a seeded one).
    pub async fn open_with(
        network: NetworkController,
        config: &SuiteConfig,
        launcher: &dyn Launcher,
    ) -> Result<Self> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
        let http = HttpTransport::new(network.clone())?;
        let surface = launcher
            .open(SurfaceContext {
                network: network.clone(),
                http: http.clone(),
                base_url: config.base_url.clone(),
            })
            .await
            .map_err(|e| e.context(format!("opening session {}", id)))?;

        tracing::debug!(session = id, base_url = %config.base_url, "Session opened");
        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                network,
                http,
                surface,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn network(&self) -> &NetworkController {
        &self.inner.network
    }

    pub fn http(&self) -> &HttpTransport {
        &self.inner.http
    }

    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.inner.surface
    }

    pub fn waits(&self) -> WaitCoordinator {
        WaitCoordinator::new(self.inner.network.clone(), Arc::clone(&self.inner.surface))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Fails with [`Error::SessionClosed`] once the session is closed.
    pub fn ensure_open(&self, action: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed(action.to_string()));
        }
        Ok(())
    }

    /// Tears the session down. Calling it again does nothing.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let leaked_offline = self.inner.network.reset();
        self.inner.network.shutdown();
        let result = self.inner.surface.close().await;
        tracing::debug!(session = self.inner.id, leaked_offline, "Session closed");
        result
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        tracing::warn!(session = self.id, "Session dropped without close, cleaning up");
        self.network.shutdown();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let surface = Arc::clone(&self.surface);
            handle.spawn(async move {
                if let Err(e) = surface.close().await {
                    tracing::warn!(error = %e, "Closing dropped session failed");
                }
            });
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .field("network", &self.inner.network)
            .finish()
    }
}
