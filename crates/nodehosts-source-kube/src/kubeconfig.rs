//! Kubeconfig files
//!
//! Reads the current context of a kubeconfig into [`ClientSettings`]:
//! server, CA, bearer token (inline or file), and client certificate.
//! Relative paths resolve against the kubeconfig's directory. Credential
//! plugins (`exec`, `auth-provider`) are not run.

use crate::client::{ClientIdentity, ClientSettings};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nodehosts_core::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    pub current_context: Option<String>,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    /// Directory relative paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: Cluster,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub certificate_authority: Option<String>,
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: Context,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Context {
    pub cluster: String,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: AuthInfo,
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    pub token_file: Option<String>,
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub client_key_data: Option<String>,
    #[serde(default)]
    pub exec: Option<serde_yaml::Value>,
    #[serde(default)]
    pub auth_provider: Option<serde_yaml::Value>,
}

impl std::fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInfo")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_file", &self.token_file)
            .field("client_certificate", &self.client_certificate)
            .field("client_key", &self.client_key)
            .field("exec", &self.exec.is_some())
            .field("auth_provider", &self.auth_provider.is_some())
            .finish()
    }
}

impl AuthInfo {
    fn uses_plugin(&self) -> bool {
        self.exec.is_some() || self.auth_provider.is_some()
    }
}

impl Kubeconfig {
    /// Read and parse a kubeconfig file
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read kubeconfig {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&text, base_dir)
    }

    /// Parse kubeconfig YAML, resolving relative paths against `base_dir`
    pub fn parse(text: &str, base_dir: PathBuf) -> Result<Self> {
        let mut config: Kubeconfig = serde_yaml::from_str(text)
            .map_err(|e| Error::config(format!("Invalid kubeconfig: {}", e)))?;
        config.base_dir = base_dir;
        Ok(config)
    }

    /// Settings for the current context
    pub fn into_settings(self) -> Result<ClientSettings> {
        let name = self
            .current_context
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::config("kubeconfig has no current-context"))?;

        let context = self
            .contexts
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.context)
            .ok_or_else(|| Error::config(format!("kubeconfig context '{}' not found", name)))?;

        let cluster = self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                Error::config(format!("kubeconfig cluster '{}' not found", context.cluster))
            })?;

        let user = match context.user.as_deref() {
            Some(user) => Some(
                self.users
                    .iter()
                    .find(|u| u.name == user)
                    .map(|u| &u.user)
                    .ok_or_else(|| Error::config(format!("kubeconfig user '{}' not found", user)))?,
            ),
            None => None,
        };

        let server = cluster
            .server
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::config(format!("kubeconfig cluster '{}' has no server", context.cluster))
            })?;

        let mut settings = ClientSettings {
            api_server: server,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
            ..ClientSettings::default()
        };

        match (&cluster.certificate_authority_data, &cluster.certificate_authority) {
            (Some(data), _) => {
                settings.ca_data = Some(decode("certificate-authority-data", data)?);
            }
            (None, Some(path)) => settings.ca_file = Some(self.resolve(path)),
            (None, None) => {}
        }

        if let Some(user) = user {
            settings.token = user.token.clone().filter(|t| !t.is_empty());
            settings.token_file = user.token_file.as_deref().map(|path| self.resolve(path));
            settings.identity = self.identity(user)?;

            let has_credentials =
                settings.token.is_some() || settings.token_file.is_some() || settings.identity.is_some();
            if user.uses_plugin() && !has_credentials {
                return Err(Error::config(format!(
                    "kubeconfig user '{}' relies on a credential plugin, which is not supported",
                    context.user.as_deref().unwrap_or_default()
                )));
            }
        }

        Ok(settings)
    }

    fn identity(&self, user: &AuthInfo) -> Result<Option<ClientIdentity>> {
        let certificate = self.pem(
            "client-certificate",
            &user.client_certificate_data,
            &user.client_certificate,
        )?;
        let key = self.pem("client-key", &user.client_key_data, &user.client_key)?;

        match (certificate, key) {
            (Some(certificate), Some(key)) => Ok(Some(ClientIdentity { certificate, key })),
            (None, None) => Ok(None),
            _ => Err(Error::config(
                "kubeconfig gives a client certificate without a key, or a key without a certificate",
            )),
        }
    }

    /// Inline base64 data wins over a file path
    fn pem(&self, field: &str, data: &Option<String>, path: &Option<String>) -> Result<Option<Vec<u8>>> {
        match (data, path) {
            (Some(data), _) => decode(&format!("{}-data", field), data).map(Some),
            (None, Some(path)) => {
                let path = self.resolve(path);
                std::fs::read(&path).map(Some).map_err(|e| {
                    Error::config(format!("Failed to read {} {}: {}", field, path.display(), e))
                })
            }
            (None, None) => Ok(None),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base_dir.join(path)
    }
}

fn decode(field: &str, data: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(data.trim())
        .map_err(|e| Error::config(format!("kubeconfig {} is not valid base64: {}", field, e)))
}
