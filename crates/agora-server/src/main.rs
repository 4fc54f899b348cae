//! Agora forum server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `AGORA_*`
//! environment overrides, opens the SQLite store, seeds an empty forum and
//! serves the HTTP interface.
//!
//! # Password hash generation
//!
//! ```
//! cargo run -p agora-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use agora_api::{ApiConfig, AppState};
use agora_service::{
  Forum, bootstrap::seed_forum, mail::LogMailer, password::hash_password, plugin::PluginRegistry,
  user::SessionLifetimes,
};
use agora_store_sqlite::SqliteStore;
use anyhow::Context as _;
use clap::Parser;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Agora forum server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ServerConfig {
  host:             String,
  port:             u16,
  store_path:       PathBuf,
  page_size:        u32,
  /// Prefix of the links placed in outgoing mail.
  base_url:         String,
  session_cookie:   String,
  remember_me_days: u32,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let api = ApiConfig::default();
    Self {
      host:             "127.0.0.1".into(),
      port:             8080,
      store_path:       PathBuf::from("~/.local/share/agora/forum.db"),
      page_size:        api.page_size,
      base_url:         "http://localhost:8080".into(),
      session_cookie:   api.session_cookie,
      remember_me_days: api.remember_me_days,
    }
  }
}

impl ServerConfig {
  fn api(&self) -> ApiConfig {
    ApiConfig {
      page_size:        self.page_size,
      session_cookie:   self.session_cookie.clone(),
      remember_me_days: self.remember_me_days,
    }
  }
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
    let hash = hash_password(&password).map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("AGORA"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);
  seed_forum(store.as_ref()).await.context("failed to seed forum")?;

  let forum = Forum::new(
    store,
    Arc::new(LogMailer),
    PluginRegistry::new(),
    server_cfg.base_url.clone(),
  )
  .with_session_lifetimes(SessionLifetimes::remembered_for_days(server_cfg.remember_me_days));
  let app = agora_api::router(AppState::new(forum, server_cfg.api()));
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/forum.db")), PathBuf::from(home).join("forum.db"));
    assert_eq!(expand_tilde(Path::new("/tmp/forum.db")), PathBuf::from("/tmp/forum.db"));
  }

  #[test]
  fn missing_keys_fall_back_to_defaults() {
    let settings = config::Config::builder()
      .add_source(config::File::from_str("port = 9000", config::FileFormat::Toml))
      .build()
      .unwrap();
    let cfg: ServerConfig = settings.try_deserialize().unwrap();
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.page_size, 20);
    assert_eq!(cfg.session_cookie, "agora_session");
    assert_eq!(cfg.api().remember_me_days, 14);
  }
}
