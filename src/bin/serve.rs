//! Serves the WebMap application for local development.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin serve          # Port 8000
//! cargo run --bin serve -- 3000  # Custom port
//! ```

use std::{env, error::Error, path::PathBuf};

use webmap_local::{ServerConfig, resolve_port, run};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let port = resolve_port(env::args().nth(1));

    run(ServerConfig::new(app_root(), port)).await
}

/// Directory the server exposes: the executable's own directory, falling
/// back to the working directory.
fn app_root() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}
