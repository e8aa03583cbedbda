//! # WebMap Local
//!
//! A small development server for the WebMap application: serves the app
//! directory over HTTP with caching disabled, falls back to nearby ports
//! when the preferred one is taken, and opens the default browser at the
//! bound address.
//!
//! ## Example
//!
//! ```no_run
//! use webmap_local::{ServerConfig, run};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     run(ServerConfig::new("site", 8000)).await
//! }
//! ```

use std::{
    error::Error,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use axum::{
    Router,
    http::{HeaderValue, header},
};
use tokio::net::{TcpListener, TcpSocket};
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer};

/// Port used when no argument is given or the argument is unusable.
pub const DEFAULT_PORT: u16 = 8000;

/// How many consecutive ports to try before giving up.
pub const MAX_BIND_ATTEMPTS: u16 = 10;

/// Cache directive attached to every response, so the browser always
/// reflects the on-disk state of the files during development.
const NO_CACHE: &str = "no-store, no-cache, must-revalidate";

/// Everything the server needs to start, passed in explicitly.
pub struct ServerConfig {
    /// Directory the files are served from.
    pub root: PathBuf,
    /// Port to try first.
    pub preferred_port: u16,
    /// Number of consecutive ports to try, starting at `preferred_port`.
    pub max_bind_attempts: u16,
}

impl ServerConfig {
    /// Creates a configuration with the default bind-attempt budget.
    pub fn new(root: impl Into<PathBuf>, preferred_port: u16) -> Self {
        Self {
            root: root.into(),
            preferred_port,
            max_bind_attempts: MAX_BIND_ATTEMPTS,
        }
    }
}

/// A listener together with where it actually ended up.
#[derive(Debug)]
pub struct BoundListener {
    pub listener: TcpListener,
    /// Port the listener is bound to.
    pub port: u16,
    /// How many occupied ports were skipped to get there.
    pub offset: u16,
}

/// Turns the optional command-line argument into a usable port.
///
/// Missing, unparsable, or out-of-range input falls back to
/// [`DEFAULT_PORT`] with a warning on stderr. This never fails.
pub fn resolve_port(argument: Option<String>) -> u16 {
    let Some(value) = argument else {
        return DEFAULT_PORT;
    };

    match value.parse::<u16>() {
        Ok(port) if port != 0 => port,
        _ => {
            eprintln!("Warning: invalid port '{value}', using default port {DEFAULT_PORT}");
            DEFAULT_PORT
        }
    }
}

/// Binds a listener on the first free port at or after `preferred_port`.
///
/// Tries `preferred_port`, then each next port in turn, up to
/// `max_attempts` candidates. A port that is already in use advances to
/// the next candidate; any other bind error (permission denied, bad
/// address) is returned immediately. Candidates past the end of the port
/// space count as unavailable.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns the last "address in use" error when every candidate is
/// occupied, or the first non-recoverable bind error.
pub async fn acquire_listener(
    host: IpAddr,
    preferred_port: u16,
    max_attempts: u16,
) -> io::Result<BoundListener> {
    let mut last_in_use = None;

    for offset in 0..max_attempts {
        let Some(port) = preferred_port.checked_add(offset) else {
            break;
        };

        match bind_reusable(SocketAddr::new(host, port)) {
            Ok(listener) => {
                return Ok(BoundListener {
                    listener,
                    port,
                    offset,
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => last_in_use = Some(e),
            Err(e) => return Err(e),
        }
    }

    Err(last_in_use.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrInUse,
            format!("no candidate ports starting at {preferred_port}"),
        )
    }))
}

/// Binds `addr` with `SO_REUSEADDR` set, so a freshly restarted server can
/// reclaim its old port without waiting out lingering sockets.
fn bind_reusable(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

/// Serves `root` on the given listener until Ctrl+C.
///
/// Every response carries `Cache-Control: no-store, no-cache,
/// must-revalidate`. Requests are plain static-file GETs; paths that would
/// escape `root` are rejected with 404.
pub async fn serve(listener: TcpListener, root: PathBuf) -> io::Result<()> {
    let app = router(&root);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Starts the server: binds a port, announces the address, opens the
/// browser, and serves until interrupted.
///
/// # Errors
///
/// Returns an error when no port could be bound within the attempt
/// budget, or when the serve loop itself fails. A browser that refuses to
/// open is only a warning.
pub async fn run(config: ServerConfig) -> Result<(), Box<dyn Error>> {
    let bound = acquire_listener(
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        config.preferred_port,
        config.max_bind_attempts,
    )
    .await
    .map_err(|e| format!("could not bind a port starting at {}: {e}", config.preferred_port))?;

    if bound.offset > 0 {
        println!(
            "Port {} is in use, listening on {} instead",
            config.preferred_port, bound.port
        );
    }
    println!(
        "Serving {} at http://localhost:{}",
        config.root.display(),
        bound.port
    );
    println!("Press Ctrl+C to stop");

    let url = format!("http://localhost:{}", bound.port);
    if let Err(e) = open::that(&url) {
        eprintln!("Warning: could not open the browser: {e}");
    }

    serve(bound.listener, config.root).await?;

    println!("Server stopped");
    Ok(())
}

fn router(root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(NO_CACHE),
        ))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler means no shutdown request can ever arrive;
        // park instead of resolving, which would stop the server at once.
        std::future::pending::<()>().await;
    }
}
