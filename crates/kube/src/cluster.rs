//! Cluster connection resolution: in-cluster service account,
//! kubeconfig file, or explicit coordinates.

use crate::error::{GatewayError, GatewayResult};
use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use urumi_core::config::ClusterConfig;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Resolved connection parameters for one API server.
#[derive(Debug, Clone, Default)]
pub struct ClusterConnection {
    /// API server base URL (e.g. "https://10.0.0.1:443").
    pub server: String,
    /// Bearer token, if any.
    pub token: Option<String>,
    /// PEM bundle for the cluster CA.
    pub ca_pem: Option<Vec<u8>>,
    /// Client certificate PEM, paired with `client_key_pem`.
    pub client_cert_pem: Option<Vec<u8>>,
    /// Client key PEM.
    pub client_key_pem: Option<Vec<u8>>,
    /// Skip TLS verification. Development only.
    pub insecure: bool,
}

impl ClusterConnection {
    /// Resolve a connection from configuration. `Auto` prefers the
    /// in-cluster service account and falls back to the default
    /// kubeconfig.
    pub fn resolve(config: &ClusterConfig) -> GatewayResult<Self> {
        match config {
            ClusterConfig::Auto => {
                if in_cluster_env_present() {
                    tracing::info!("Detected in-cluster service account");
                    Self::in_cluster()
                } else {
                    let path = default_kubeconfig_path()?;
                    tracing::info!(path = %path.display(), "Using default kubeconfig");
                    Self::from_kubeconfig(&path, None)
                }
            }
            ClusterConfig::InCluster => Self::in_cluster(),
            ClusterConfig::Kubeconfig { path, context } => {
                let path = match path {
                    Some(path) => path.clone(),
                    None => default_kubeconfig_path()?,
                };
                Self::from_kubeconfig(&path, context.as_deref())
            }
            ClusterConfig::Explicit {
                server,
                token,
                ca_cert_path,
                insecure_skip_tls_verify,
            } => {
                let ca_pem = match ca_cert_path {
                    Some(path) => Some(std::fs::read(path)?),
                    None => None,
                };
                Ok(Self {
                    server: server.clone(),
                    token: token.clone(),
                    ca_pem,
                    client_cert_pem: None,
                    client_key_pem: None,
                    insecure: *insecure_skip_tls_verify,
                })
            }
        }
    }

    /// Build a connection from the mounted service account.
    pub fn in_cluster() -> GatewayResult<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| GatewayError::Config("KUBERNETES_SERVICE_HOST is not set".to_string()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| GatewayError::Config("KUBERNETES_SERVICE_PORT is not set".to_string()))?;
        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = std::fs::read_to_string(dir.join("token"))?;
        let ca_pem = std::fs::read(dir.join("ca.crt"))?;
        Ok(Self {
            server: format!("https://{host}:{port}"),
            token: Some(token.trim().to_string()),
            ca_pem: Some(ca_pem),
            client_cert_pem: None,
            client_key_pem: None,
            insecure: false,
        })
    }

    /// Build a connection from a kubeconfig file, selecting `context` or
    /// the file's current-context.
    pub fn from_kubeconfig(path: &Path, context: Option<&str>) -> GatewayResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let kubeconfig: Kubeconfig = serde_yaml::from_str(&raw)
            .map_err(|e| GatewayError::Config(format!("invalid kubeconfig: {e}")))?;
        kubeconfig.resolve(context, path)
    }
}

fn in_cluster_env_present() -> bool {
    std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
        && std::env::var("KUBERNETES_SERVICE_PORT").is_ok()
}

fn default_kubeconfig_path() -> GatewayResult<PathBuf> {
    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var("HOME")
        .map_err(|_| GatewayError::Config("cannot locate kubeconfig: HOME is not set".to_string()))?;
    Ok(PathBuf::from(home).join(".kube").join("config"))
}

// Minimal kubeconfig model: just the fields needed to reach a cluster
// with token or client-certificate credentials.

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    current_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    server: String,
    #[serde(rename = "certificate-authority")]
    certificate_authority: Option<PathBuf>,
    #[serde(rename = "certificate-authority-data")]
    certificate_authority_data: Option<String>,
    #[serde(rename = "insecure-skip-tls-verify", default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
struct UserEntry {
    token: Option<String>,
    #[serde(rename = "client-certificate")]
    client_certificate: Option<PathBuf>,
    #[serde(rename = "client-certificate-data")]
    client_certificate_data: Option<String>,
    #[serde(rename = "client-key")]
    client_key: Option<PathBuf>,
    #[serde(rename = "client-key-data")]
    client_key_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    user: Option<String>,
}

impl Kubeconfig {
    fn resolve(&self, context: Option<&str>, source: &Path) -> GatewayResult<ClusterConnection> {
        let context_name = context
            .map(str::to_string)
            .or_else(|| self.current_context.clone())
            .ok_or_else(|| {
                GatewayError::Config("kubeconfig has no current-context".to_string())
            })?;
        let context = self
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| {
                GatewayError::Config(format!("kubeconfig context '{context_name}' not found"))
            })?;
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                GatewayError::Config(format!(
                    "kubeconfig cluster '{}' not found",
                    context.cluster
                ))
            })?;
        let user = context
            .user
            .as_ref()
            .and_then(|name| self.users.iter().find(|u| &u.name == name))
            .map(|u| &u.user);

        let base_dir = source.parent().unwrap_or_else(|| Path::new("."));
        let ca_pem = read_inline_or_file(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base_dir,
        )?;

        let (token, client_cert_pem, client_key_pem) = match user {
            Some(user) => {
                let cert = read_inline_or_file(
                    user.client_certificate_data.as_deref(),
                    user.client_certificate.as_deref(),
                    base_dir,
                )?;
                let key = read_inline_or_file(
                    user.client_key_data.as_deref(),
                    user.client_key.as_deref(),
                    base_dir,
                )?;
                (user.token.clone(), cert, key)
            }
            None => (None, None, None),
        };

        Ok(ClusterConnection {
            server: cluster.server.clone(),
            token,
            ca_pem,
            client_cert_pem,
            client_key_pem,
            insecure: cluster.insecure_skip_tls_verify,
        })
    }
}

/// Prefer inline base64 data over a file reference; relative file paths
/// resolve against the kubeconfig's directory.
fn read_inline_or_file(
    data: Option<&str>,
    path: Option<&Path>,
    base_dir: &Path,
) -> GatewayResult<Option<Vec<u8>>> {
    if let Some(data) = data {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| GatewayError::Config(format!("invalid base64 in kubeconfig: {e}")))?;
        return Ok(Some(decoded));
    }
    if let Some(path) = path {
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        };
        return Ok(Some(std::fs::read(full)?));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: dev
clusters:
  - name: dev-cluster
    cluster:
      server: https://cluster.example.com:6443
      certificate-authority-data: LS0tLUNB
contexts:
  - name: dev
    context:
      cluster: dev-cluster
      user: dev-user
users:
  - name: dev-user
    user:
      token: sometoken
"#;

    #[test]
    fn resolves_current_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KUBECONFIG.as_bytes()).unwrap();
        let conn = ClusterConnection::from_kubeconfig(file.path(), None).unwrap();
        assert_eq!(conn.server, "https://cluster.example.com:6443");
        assert_eq!(conn.token.as_deref(), Some("sometoken"));
        assert_eq!(conn.ca_pem.as_deref(), Some(b"----CA".as_slice()));
        assert!(!conn.insecure);
    }

    #[test]
    fn unknown_context_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KUBECONFIG.as_bytes()).unwrap();
        let err = ClusterConnection::from_kubeconfig(file.path(), Some("prod")).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn explicit_config_passes_through() {
        let config = ClusterConfig::Explicit {
            server: "https://localhost:6443".to_string(),
            token: Some("t".to_string()),
            ca_cert_path: None,
            insecure_skip_tls_verify: true,
        };
        let conn = ClusterConnection::resolve(&config).unwrap();
        assert_eq!(conn.server, "https://localhost:6443");
        assert!(conn.insecure);
    }
}
