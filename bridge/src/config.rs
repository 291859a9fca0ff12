use anyhow::{Context, Result, bail};
use kube_client::KubeConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::controller::{ControllerConfig, DEFAULT_FIELD_MANAGER};
use crate::storage::StorageConfig;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Process configuration, read from the environment
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub addr: SocketAddr,
    pub data_dir: PathBuf,
    pub namespace: String,
    pub advertised_address: String,
    pub artifact_owner: String,
    pub retention_ttl: Duration,
    pub poll_interval: Duration,
    pub kube: KubeConfig,
}

impl BridgeConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let addr = var("ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("ADDR is not a valid socket address")?;

        let Some(namespace) = var("NAMESPACE") else {
            bail!("NAMESPACE must be set");
        };

        let advertised_address = var("ADVERTISED_ADDRESS")
            .unwrap_or_else(|| format!("flux-bridge.{namespace}.svc.cluster.local."));

        let mut kube = KubeConfig::new(
            var("KUBE_API_URL").unwrap_or_else(|| "https://kubernetes.default.svc".to_string()),
            DEFAULT_FIELD_MANAGER,
        );
        kube.token = var("KUBE_TOKEN");
        kube.token_file = var("KUBE_TOKEN_FILE")
            .map(PathBuf::from)
            .or_else(|| in_service_account("token"));
        kube.ca_cert = var("KUBE_CA_FILE")
            .map(PathBuf::from)
            .or_else(|| in_service_account("ca.crt"));

        let poll_interval = seconds(var("POLL_INTERVAL_SECS"), "POLL_INTERVAL_SECS", 2)?;
        if poll_interval.is_zero() {
            bail!("POLL_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            addr,
            data_dir: PathBuf::from(var("DATA_DIR").unwrap_or_else(|| "./data".to_string())),
            advertised_address,
            artifact_owner: var("ARTIFACT_OWNER").unwrap_or_else(|| "confighub".to_string()),
            retention_ttl: seconds(var("ARTIFACT_RETENTION_TTL_SECS"), "ARTIFACT_RETENTION_TTL_SECS", 0)?,
            poll_interval,
            namespace,
            kube,
        })
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig::local(
            &self.data_dir,
            self.advertised_address.as_str(),
            self.namespace.as_str(),
            self.artifact_owner.as_str(),
        )
        .with_retention_ttl(self.retention_ttl)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::new(self.namespace.as_str()).with_poll_interval(self.poll_interval)
    }
}

fn seconds(value: Option<String>, name: &str, default: u64) -> Result<Duration> {
    let secs = match value {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{name} must be a whole number of seconds"))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}

fn in_service_account(file: &str) -> Option<PathBuf> {
    let path = Path::new(SERVICE_ACCOUNT_DIR).join(file);
    path.exists().then_some(path)
}
