//! TCP listener running one [`Session`] per connection.
//!
//! [`GymServer`] accepts connections and runs each session on its own OS
//! thread. The environment provider and hooks are shared immutably; every
//! session owns its environment and its RNG.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use gymsock_core::config::ServerConfig;
use gymsock_core::error::ConfigError;
use gymsock_core::seed::session_rng;
use gymsock_core::traits::{EnvironmentProvider, Hooks};
use rand_chacha::ChaCha8Rng;
use tracing::{info, info_span, warn};

use crate::protocol::ProtocolError;
use crate::session::Session;

/// Consecutive failed `accept` calls tolerated before the server stops.
const ACCEPT_ATTEMPTS: u32 = 5;
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// GymServer
// ---------------------------------------------------------------------------

/// TCP server exposing environments from a provider.
pub struct GymServer {
    listener: TcpListener,
    provider: Arc<dyn EnvironmentProvider>,
    hooks: Arc<Hooks>,
    seed: Option<u64>,
    next_connection: AtomicU64,
}

impl GymServer {
    /// Bind to the given address (e.g. `"127.0.0.1:5001"`).
    ///
    /// Sessions sample actions with entropy-seeded RNGs unless a root seed is
    /// set with [`with_seed`](Self::with_seed).
    pub fn bind(
        addr: &str,
        provider: Arc<dyn EnvironmentProvider>,
        hooks: Hooks,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            provider,
            hooks: Arc::new(hooks),
            seed: None,
            next_connection: AtomicU64::new(0),
        })
    }

    /// Bind to the configured address with the configured root seed.
    pub fn bind_with_config(
        config: &ServerConfig,
        provider: Arc<dyn EnvironmentProvider>,
        hooks: Hooks,
    ) -> Result<Self, ConfigError> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            provider,
            hooks: Arc::new(hooks),
            seed: config.seed,
            next_connection: AtomicU64::new(0),
        })
    }

    /// Derive every session RNG from `seed` and the connection index.
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept one connection and run its session on the calling thread.
    pub fn serve_one(&self) -> Result<(), ProtocolError> {
        let (stream, peer) = self.listener.accept()?;
        let rng = self.next_rng();
        handle_connection(stream, peer, self.provider.as_ref(), &self.hooks, rng)
    }

    /// Accept connections forever, one session thread each.
    pub fn serve(&self) -> std::io::Result<()> {
        info!(addr = %self.local_addr()?, "listening");
        loop {
            self.spawn_next()?;
        }
    }

    /// Accept exactly `count` connections, then wait for their sessions.
    pub fn serve_n(&self, count: usize) -> std::io::Result<()> {
        let handles = (0..count)
            .map(|_| self.spawn_next())
            .collect::<std::io::Result<Vec<_>>>()?;
        for handle in handles {
            if handle.join().is_err() {
                warn!("session thread panicked");
            }
        }
        Ok(())
    }

    fn next_rng(&self) -> ChaCha8Rng {
        let index = self.next_connection.fetch_add(1, Ordering::Relaxed);
        session_rng(self.seed, index)
    }

    fn spawn_next(&self) -> std::io::Result<thread::JoinHandle<()>> {
        let (stream, peer) = retry_accept(|| self.listener.accept())?;
        let rng = self.next_rng();
        let provider = Arc::clone(&self.provider);
        let hooks = Arc::clone(&self.hooks);
        thread::Builder::new()
            .name(format!("session-{peer}"))
            .spawn(move || {
                // the session logs its own outcome
                let _ = handle_connection(stream, peer, provider.as_ref(), &hooks, rng);
            })
    }
}

/// Run `accept`, backing off exponentially between failures. The last error
/// is returned once [`ACCEPT_ATTEMPTS`] calls in a row have failed.
fn retry_accept<T>(mut accept: impl FnMut() -> std::io::Result<T>) -> std::io::Result<T> {
    let mut delay = ACCEPT_BACKOFF;
    let mut attempt = 1;
    loop {
        match accept() {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt >= ACCEPT_ATTEMPTS => {
                warn!(error = %e, attempts = attempt, "accept keeps failing, giving up");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, attempt, "accept failed, retrying");
                thread::sleep(delay);
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Connection handler
// ---------------------------------------------------------------------------

fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    provider: &dyn EnvironmentProvider,
    hooks: &Hooks,
    rng: ChaCha8Rng,
) -> Result<(), ProtocolError> {
    let span = info_span!("session", %peer);
    let _enter = span.enter();

    stream.set_nodelay(true)?;
    let reader = BufReader::new(stream.try_clone()?);
    let writer = BufWriter::new(stream);
    Session::new(reader, writer, provider, hooks, rng).run()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
