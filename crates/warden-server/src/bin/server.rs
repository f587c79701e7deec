//! Warden server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite content store, connects the role directory when one is configured
//! and serves the JSON API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for a principal's `password_hash`:
//!
//! ```
//! cargo run -p warden-server --bin server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use warden_access::{HttpDirectory, RoleCache};
use warden_engine::Warden;
use warden_server::{AppState, ServerConfig, auth::AuthConfig};
use warden_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Warden access and governance server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("WARDEN"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let registry = server_cfg.build_registry();
  tracing::info!(
    types = ?registry.enabled_types().map(|t| t.type_key.as_str()).collect::<Vec<_>>(),
    "entity types enabled",
  );

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let directory = match server_cfg.directory_config() {
    Some(cfg) => {
      let base_url = cfg.base_url.clone();
      let directory = HttpDirectory::new(cfg).context("failed to build directory client")?;
      tracing::info!(%base_url, "role directory configured");
      Some(directory)
    }
    None => {
      tracing::warn!("no role directory configured; role-based access is disabled");
      None
    }
  };
  let cache = RoleCache::new(directory, server_cfg.role_cache_config());

  let state = AppState {
    warden: Arc::new(Warden::new(registry, store, cache)),
    auth:   Arc::new(AuthConfig::new(server_cfg.principals.clone())),
  };

  let app = warden_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Prompt for a password and read one line from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, Write as _};
  eprint!("Password: ");
  io::stderr().flush().ok();
  let line = io::stdin()
    .lines()
    .next()
    .context("no password given on stdin")??;
  Ok(line.trim_end_matches('\r').to_owned())
}

/// Resolve a leading `~/` against `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}
