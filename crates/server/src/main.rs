//! Shipwright server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use shipwright_core::config::AppConfig;
use shipwright_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shipwright - release sequencing and deployment state for packaged applications
#[derive(Parser, Debug)]
#[command(name = "shipwrightd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "SHIPWRIGHT_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration. The file is optional; `SHIPWRIGHT_` env vars override it.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SHIPWRIGHT_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

/// Initialize every backend and verify connectivity before accepting requests.
async fn build_state(config: AppConfig) -> Result<AppState> {
    let metadata = shipwright_metadata::from_config(&config.metadata, &config.tasks)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .health_check()
        .await
        .context("metadata health check failed")?;
    tracing::info!("Metadata store initialized");

    let gitops = shipwright_gitops::from_config(&config.gitops)
        .await
        .context("failed to initialize gitops resources")?;
    gitops
        .health_check()
        .await
        .context("gitops resource health check failed")?;
    tracing::info!("GitOps resources initialized");

    let cipher =
        shipwright_crypto::from_config(&config.crypto).context("failed to load encryption key")?;

    Ok(AppState::new(config, metadata, gitops, cipher))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Shipwright v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    shipwright_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let bind = config.server.bind.clone();
    let state = build_state(config).await?;
    let app = create_router(state);

    let addr: SocketAddr = bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::config::{CryptoConfig, MetadataConfig};
    use tempfile::tempdir;

    #[test]
    fn load_config_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:9000"

[metadata]
type = "sqlite"
path = "/tmp/shipwright.db"

[gitops]
secret_name = "gitops-creds"

[gitops.resources]
type = "memory"

[tasks]
stale_after_secs = 30
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(matches!(config.metadata, MetadataConfig::Sqlite { .. }));
        assert_eq!(config.gitops.secret_name, "gitops-creds");
        assert_eq!(config.gitops.configmap_name, "kotsadm-gitops");
        assert_eq!(config.tasks.stale_after_secs, 30);
    }

    #[test]
    fn load_config_rejects_invalid_section() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(&path, "[tasks]\nstale_after_secs = 0\n").unwrap();

        let err = load_config(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("stale_after_secs"));
    }

    #[tokio::test]
    async fn build_state_for_testing() {
        let state = build_state(AppConfig::for_testing()).await.unwrap();
        state.metadata.health_check().await.unwrap();
        assert!(!state.gitops.is_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn build_state_rejects_bad_key() {
        let config = AppConfig {
            crypto: CryptoConfig {
                encryption_key: Some("not-a-key".to_string()),
            },
            ..AppConfig::for_testing()
        };
        assert!(build_state(config).await.is_err());
    }
}
