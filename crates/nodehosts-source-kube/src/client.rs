//! Kubernetes API access over reqwest
//!
//! Only two calls are needed: list nodes, and watch nodes from a resource
//! version. Watch responses are newline-delimited JSON read chunk by chunk
//! through a [`LineBuffer`].

use crate::api::NodeList;
use crate::kubeconfig::Kubeconfig;
use nodehosts_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a pod finds its service account credentials
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Connect timeout for every API request
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request timeout for list calls (watches are long-lived)
const LIST_TIMEOUT: Duration = Duration::from_secs(60);

/// Time a watch may outlive its requested server-side timeout
pub const WATCH_DEADLINE_SLACK: Duration = Duration::from_secs(2);

/// Connection options as given on the command line or in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionFlags {
    /// Kubeconfig path, or a `KUBECONFIG`-style path list
    pub kubeconfig: Option<String>,
    pub api_server: Option<String>,
    pub token_file: Option<String>,
    pub ca_file: Option<String>,
    pub insecure_skip_tls_verify: bool,
}

/// PEM client certificate and key
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientIdentity {
    pub certificate: Vec<u8>,
    pub key: Vec<u8>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("key", &"<redacted>")
            .finish()
    }
}

/// How to reach and authenticate to the API server
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_server: String,
    /// Bearer token given inline
    pub token: Option<String>,
    /// File holding a bearer token; wins over `token` and is re-read per request
    pub token_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
    /// PEM CA bundle given inline; wins over `ca_file`
    pub ca_data: Option<Vec<u8>>,
    pub identity: Option<ClientIdentity>,
    pub insecure_skip_tls_verify: bool,
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("api_server", &self.api_server)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_file", &self.token_file)
            .field("ca_file", &self.ca_file)
            .field("ca_data", &self.ca_data.as_ref().map(Vec::len))
            .field("identity", &self.identity)
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .finish()
    }
}

impl ClientSettings {
    /// Resolve connection flags into settings
    ///
    /// With a kubeconfig, its current context supplies server and
    /// credentials. Without one, an explicit API server is used as given;
    /// otherwise the in-cluster defaults apply: the server comes from
    /// `KUBERNETES_SERVICE_HOST` and `KUBERNETES_SERVICE_PORT`, and the
    /// token and CA default to the mounted service account. Explicit flags
    /// override whatever the kubeconfig says.
    pub fn resolve(flags: &ConnectionFlags) -> Result<Self> {
        Self::resolve_with(
            flags,
            |key| std::env::var(key).ok(),
            Path::new(SERVICE_ACCOUNT_DIR),
        )
    }

    fn resolve_with(
        flags: &ConnectionFlags,
        env: impl Fn(&str) -> Option<String>,
        service_account_dir: &Path,
    ) -> Result<Self> {
        let kubeconfig = flags
            .kubeconfig
            .as_deref()
            .and_then(|paths| std::env::split_paths(paths).find(|p| !p.as_os_str().is_empty()));

        let mut settings = match (&kubeconfig, &flags.api_server) {
            (Some(path), _) => {
                info!("Loading kubeconfig {}", path.display());
                Kubeconfig::read(path)?.into_settings()?
            }
            (None, Some(url)) => Self {
                api_server: url.clone(),
                ..Self::default()
            },
            (None, None) => Self::in_cluster(&env, service_account_dir)?,
        };

        if let Some(url) = &flags.api_server {
            settings.api_server = url.clone();
        }
        if let Some(path) = &flags.token_file {
            settings.token_file = Some(PathBuf::from(path));
            settings.token = None;
        }
        if let Some(path) = &flags.ca_file {
            settings.ca_file = Some(PathBuf::from(path));
            settings.ca_data = None;
        }
        settings.insecure_skip_tls_verify |= flags.insecure_skip_tls_verify;
        settings.api_server = settings.api_server.trim_end_matches('/').to_string();

        Ok(settings)
    }

    fn in_cluster(env: &impl Fn(&str) -> Option<String>, service_account_dir: &Path) -> Result<Self> {
        let host = env("KUBERNETES_SERVICE_HOST").filter(|h| !h.is_empty()).ok_or_else(|| {
            Error::config(
                "No API server or kubeconfig given and KUBERNETES_SERVICE_HOST is not set (not running in a cluster?)",
            )
        })?;
        let port = env("KUBERNETES_SERVICE_PORT")
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "443".to_string());
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };

        Ok(Self {
            api_server: format!("https://{}:{}", host, port),
            token_file: Some(service_account_dir.join("token")),
            ca_file: Some(service_account_dir.join("ca.crt")),
            ..Self::default()
        })
    }
}

/// Client for the node endpoints of the API server
#[derive(Clone)]
pub struct KubeClient {
    base: String,
    token: Option<String>,
    token_file: Option<PathBuf>,
    http: reqwest::Client,
}

impl KubeClient {
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);

        let ca = match (&settings.ca_data, &settings.ca_file) {
            (Some(pem), _) => Some((pem.clone(), "inline CA data".to_string())),
            (None, Some(ca_file)) => {
                let pem = std::fs::read(ca_file).map_err(|e| {
                    Error::config(format!("Failed to read CA file {}: {}", ca_file.display(), e))
                })?;
                Some((pem, format!("CA file {}", ca_file.display())))
            }
            (None, None) => None,
        };
        if let Some((pem, origin)) = ca {
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| Error::config(format!("Invalid {}: {}", origin, e)))?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(identity) = &settings.identity {
            let mut pem = identity.certificate.clone();
            pem.push(b'\n');
            pem.extend_from_slice(&identity.key);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| Error::config(format!("Invalid client certificate or key: {}", e)))?;
            builder = builder.use_rustls_tls().identity(identity);
        }

        if settings.insecure_skip_tls_verify {
            warn!("TLS verification of the API server is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base: settings.api_server.clone(),
            token: settings.token.clone(),
            token_file: settings.token_file.clone(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn nodes_url(&self) -> String {
        format!("{}/api/v1/nodes", self.base)
    }

    /// Build a GET request, re-reading the token so rotated tokens are used
    async fn get(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        let request = self.http.get(url).header("Accept", "application/json");

        match (&self.token_file, &self.token) {
            (Some(path), _) => {
                let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::config(format!("Failed to read token file {}: {}", path.display(), e))
                })?;
                Ok(request.bearer_auth(token.trim()))
            }
            (None, Some(token)) => Ok(request.bearer_auth(token)),
            (None, None) => Ok(request),
        }
    }

    /// `GET /api/v1/nodes`
    pub async fn list_nodes(&self) -> Result<NodeList> {
        let url = self.nodes_url();
        debug!("Listing nodes: {}", url);

        let response = self
            .get(&url)
            .await?
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::http(format!("Node list request failed: {}", e)))?;

        let response = check_status(response, "Node list").await?;

        response
            .json::<NodeList>()
            .await
            .map_err(|e| Error::http(format!("Failed to decode node list: {}", e)))
    }

    /// `GET /api/v1/nodes?watch=true`
    ///
    /// Returns the streaming response once headers arrived; the body is
    /// read by the caller. The whole call, body included, fails once it
    /// runs [`WATCH_DEADLINE_SLACK`] past `timeout_secs`, so a stalled
    /// connection cannot hold the watch open.
    pub async fn watch_nodes(
        &self,
        resource_version: Option<&str>,
        timeout_secs: u64,
    ) -> Result<reqwest::Response> {
        let mut query = vec![
            ("watch", "true".to_string()),
            ("allowWatchBookmarks", "true".to_string()),
            ("timeoutSeconds", timeout_secs.to_string()),
        ];
        if let Some(rv) = resource_version {
            query.push(("resourceVersion", rv.to_string()));
        }

        let response = self
            .get(&self.nodes_url())
            .await?
            .query(&query)
            .timeout(Duration::from_secs(timeout_secs) + WATCH_DEADLINE_SLACK)
            .send()
            .await
            .map_err(|e| Error::http(format!("Node watch request failed: {}", e)))?;

        check_status(response, "Node watch").await
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    match status.as_u16() {
        401 | 403 => Err(Error::http(format!(
            "{} failed: not authorized to list/watch nodes. Status: {}",
            what, status
        ))),
        _ => Err(Error::http(format!("{} failed: {} - {}", what, status, body))),
    }
}

/// Splits a chunked body into complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no newline
    scanned: usize,
}

impl LineBuffer {
    /// Add a chunk and return every line it completed
    ///
    /// Blank lines are dropped. Only the new bytes are searched.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            if let Some(line) = decode_line(&self.pending[start..end]) {
                lines.push(line);
            }
            start = end + 1;
            from = start;
        }

        self.pending.drain(..start);
        self.scanned = self.pending.len();
        lines
    }

    /// Return the unterminated tail, if any
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        decode_line(&std::mem::take(&mut self.pending))
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}
