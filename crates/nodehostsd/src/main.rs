// # nodehostsd - cluster hosts file daemon
//
// This daemon is a thin integration layer around nodehosts-core:
// 1. Parse command-line flags (each with an environment fallback)
// 2. Initialize logging and the runtime
// 3. Register event sources and sinks
// 4. Run the hosts engine until SIGTERM/SIGINT or a fatal error
//
// All reconciliation logic lives in nodehosts-core.
//
// ## Example
//
// ```bash
// # In a pod with a service account allowed to list/watch nodes
// nodehostsd --hostsfile /etc/hosts.d/cluster
//
// # Outside the cluster, with the current context of a kubeconfig
// nodehostsd --kubeconfig ~/.kube/config
//
// # Against a local `kubectl proxy`, printing to stdout
// NODEHOSTS_API_SERVER=http://127.0.0.1:8001 nodehostsd
// ```

use anyhow::{Context, Result};
use clap::Parser;
use nodehosts_core::config::{EngineConfig, EventSourceConfig, HostsConfig, SinkConfig};
use nodehosts_core::node::AddressPolicy;
use nodehosts_core::{ComponentRegistry, EngineEvent, HostsEngine};
use std::process::ExitCode;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (including a failed initial sync)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodehostsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<NodehostsExitCode> for ExitCode {
    fn from(code: NodehostsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Keep a hosts file in sync with the nodes of a Kubernetes cluster
#[derive(Parser, Debug)]
#[command(name = "nodehostsd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a kubeconfig; only needed outside the cluster
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<String>,

    /// Kubernetes API server URL; overrides the kubeconfig server
    #[arg(long, visible_alias = "master", env = "NODEHOSTS_API_SERVER")]
    api_server: Option<String>,

    /// File holding a bearer token for the API server
    #[arg(long, env = "NODEHOSTS_TOKEN_FILE")]
    token_file: Option<String>,

    /// PEM bundle used to verify the API server certificate
    #[arg(long, env = "NODEHOSTS_CA_FILE")]
    ca_file: Option<String>,

    /// Do not verify the API server certificate (testing only)
    #[arg(long, env = "NODEHOSTS_INSECURE_SKIP_TLS_VERIFY")]
    insecure_skip_tls_verify: bool,

    /// Hosts file to maintain; the document goes to stdout when omitted
    #[arg(long, env = "NODEHOSTS_HOSTS_FILE")]
    hostsfile: Option<String>,

    /// Seconds to wait for the initial node list (0 waits forever)
    #[arg(long, default_value = "60", env = "NODEHOSTS_SYNC_TIMEOUT_SECS")]
    sync_timeout_secs: u64,

    /// Address types to publish, most preferred first
    #[arg(
        long,
        default_value = "InternalIP,ExternalIP",
        env = "NODEHOSTS_ADDRESS_PREFERENCE"
    )]
    address_preference: AddressPolicy,

    /// Seconds to wait before relisting after a broken watch
    #[arg(long, default_value = "5", env = "NODEHOSTS_RELIST_DELAY_SECS")]
    relist_delay_secs: u64,

    /// Server-side timeout requested for each node watch, in seconds
    #[arg(long, default_value = "300", env = "NODEHOSTS_WATCH_TIMEOUT_SECS")]
    watch_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "NODEHOSTS_LOG_LEVEL")]
    log_level: String,
}

impl Args {
    /// Build and validate the engine configuration
    fn to_config(&self) -> Result<HostsConfig> {
        let sink = match self.hostsfile.as_deref() {
            Some(path) if !path.is_empty() => SinkConfig::File {
                path: path.to_string(),
            },
            _ => SinkConfig::Stdout,
        };

        let config = HostsConfig {
            source: EventSourceConfig::Kubernetes {
                kubeconfig: self.kubeconfig.clone().filter(|path| !path.is_empty()),
                api_server: self.api_server.clone(),
                token_file: self.token_file.clone(),
                ca_file: self.ca_file.clone(),
                insecure_skip_tls_verify: self.insecure_skip_tls_verify,
                relist_delay_secs: self.relist_delay_secs,
                watch_timeout_secs: self.watch_timeout_secs,
            },
            sink,
            engine: EngineConfig {
                sync_timeout_secs: self.sync_timeout_secs,
                address_preference: self.address_preference.clone(),
                ..EngineConfig::default()
            },
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "Log level '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                NodehostsExitCode::ConfigError.into()
            } else {
                NodehostsExitCode::CleanShutdown.into()
            };
        }
    };

    let log_level = match parse_log_level(&args.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return NodehostsExitCode::ConfigError.into();
        }
    };

    // Logs go to stderr so stdout can carry the hosts document
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return NodehostsExitCode::ConfigError.into();
    }

    let config = match args.to_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return NodehostsExitCode::ConfigError.into();
        }
    };

    info!("Starting nodehostsd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return NodehostsExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let (engine, events) = match build_engine(&config) {
            Ok(built) => built,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return NodehostsExitCode::ConfigError;
            }
        };

        match run_daemon(engine, events).await {
            Ok(()) => NodehostsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                NodehostsExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Create the event source, sink and engine from configuration
fn build_engine(config: &HostsConfig) -> Result<(HostsEngine, mpsc::Receiver<EngineEvent>)> {
    let registry = ComponentRegistry::new();
    nodehosts_core::sink::register(&registry);

    #[cfg(feature = "kubernetes")]
    {
        debug!("Registering Kubernetes event source");
        nodehosts_source_kube::register(&registry);
    }

    let source = registry
        .create_event_source(&config.source)
        .context("Failed to create event source")?;
    let sink = registry
        .create_sink(&config.sink)
        .context("Failed to create hosts sink")?;

    info!(
        "Event source: {}, sink: {}",
        config.source.type_name(),
        config.sink.type_name()
    );

    let built = HostsEngine::new(source, sink, config.engine.clone())?;
    Ok(built)
}

/// Run the engine until a shutdown signal or a fatal error
async fn run_daemon(
    mut engine: HostsEngine,
    mut events: mpsc::Receiver<EngineEvent>,
) -> Result<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let signals = wait_for_shutdown_signal().await?;
    tokio::spawn(async move {
        let name = signals.await;
        info!("Received shutdown signal: {}", name);
        let _ = shutdown_tx.send(());
    });

    engine.run_with_shutdown(shutdown_rx).await?;

    info!("Daemon stopped");
    Ok(())
}

/// Install handlers for SIGTERM and SIGINT
///
/// Handlers are installed before this returns so no signal is missed; the
/// returned future resolves with the name of the first signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal()
-> Result<impl std::future::Future<Output = &'static str> + Send + 'static> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Install a Ctrl-C handler
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal()
-> Result<impl std::future::Future<Output = &'static str> + Send + 'static> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to wait for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        "SIGINT"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodehosts_core::node::AddressType;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("nodehostsd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_write_to_stdout() {
        let config = parse(&["--api-server", "http://127.0.0.1:8001"])
            .to_config()
            .unwrap();

        assert!(matches!(config.sink, SinkConfig::Stdout));
        assert_eq!(config.engine.sync_timeout_secs, 60);
        assert_eq!(
            config.engine.address_preference.preference(),
            &[AddressType::InternalIp, AddressType::ExternalIp]
        );
    }

    #[test]
    fn hostsfile_selects_file_sink() {
        let config = parse(&[
            "--api-server",
            "https://10.0.0.1:6443",
            "--hostsfile",
            "/etc/hosts.d/cluster",
            "--address-preference",
            "ExternalIP",
            "--sync-timeout-secs",
            "0",
        ])
        .to_config()
        .unwrap();

        match config.sink {
            SinkConfig::File { path } => assert_eq!(path, "/etc/hosts.d/cluster"),
            other => panic!("expected a file sink, got {:?}", other),
        }
        assert_eq!(config.engine.sync_timeout_secs, 0);
        assert_eq!(
            config.engine.address_preference.preference(),
            &[AddressType::ExternalIp]
        );
    }

    #[test]
    fn kubeconfig_and_master_flags() {
        let config = parse(&[
            "--kubeconfig",
            "/home/ops/.kube/config",
            "--master",
            "https://10.0.0.1:6443",
            "--watch-timeout-secs",
            "60",
        ])
        .to_config()
        .unwrap();

        match config.source {
            EventSourceConfig::Kubernetes {
                kubeconfig,
                api_server,
                watch_timeout_secs,
                ..
            } => {
                assert_eq!(kubeconfig.as_deref(), Some("/home/ops/.kube/config"));
                assert_eq!(api_server.as_deref(), Some("https://10.0.0.1:6443"));
                assert_eq!(watch_timeout_secs, 60);
            }
            other => panic!("expected a Kubernetes source, got {:?}", other),
        }
    }

    #[test]
    fn zero_watch_timeout_is_rejected() {
        assert!(
            parse(&["--api-server", "http://127.0.0.1:8001", "--watch-timeout-secs", "0"])
                .to_config()
                .is_err()
        );
    }

    #[test]
    fn invalid_api_server_is_rejected() {
        assert!(parse(&["--api-server", "ftp://nope"]).to_config().is_err());
    }

    #[test]
    fn invalid_address_preference_is_a_parse_error() {
        assert!(
            Args::try_parse_from(["nodehostsd", "--address-preference", "Carrier"]).is_err()
        );
    }

    #[test]
    fn log_levels() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(NodehostsExitCode::CleanShutdown as u8, 0);
        assert_eq!(NodehostsExitCode::ConfigError as u8, 1);
        assert_eq!(NodehostsExitCode::RuntimeError as u8, 2);
    }
}
