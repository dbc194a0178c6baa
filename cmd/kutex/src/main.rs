mod settings;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use k8s_openapi::api::core::v1::{EndpointPort, Service};
use pkg_gateway::{ClusterGateway, KubeGateway};
use pkg_swap::{RestoreEngine, SnapshotState, SwapEngine, list_swapped};
use settings::{Overrides, Settings};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "kutex",
    about = "Kubernetes To External: point services at external endpoints and back"
)]
struct Cli {
    /// Namespace the service is placed in [default: default]
    #[arg(long, short, global = true)]
    namespace: Option<String>,

    /// Path to the kubeconfig file [default: $KUBECONFIG, ~/.kube/config, or in-cluster]
    #[arg(long, short, global = true)]
    kubeconfig: Option<String>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    context: Option<String>,

    /// Path to YAML config file [default: ~/.kutex/config.yaml]
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace a service with one pointing to an external address
    #[command(visible_alias = "replace")]
    Swap {
        /// Name of the service to swap
        service: String,
        /// IP address of the external backend
        address: String,
    },
    /// Restore every swapped service in the namespace
    Restore,
    /// List swapped services in the namespace
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let settings = Settings::load(
        Overrides {
            namespace: cli.namespace,
            kubeconfig: cli.kubeconfig,
            context: cli.context,
        },
        cli.config.as_deref(),
    )?;
    info!("Using namespace {}", settings.namespace);

    let gateway: Arc<dyn ClusterGateway> = Arc::new(
        KubeGateway::connect(
            settings.kubeconfig.as_deref(),
            settings.context.as_deref(),
            &settings.namespace,
        )
        .await
        .context("cannot connect to the cluster")?,
    );

    match cli.command {
        Commands::Swap { service, address } => {
            let outcome = SwapEngine::new(gateway)
                .swap(&service, &address)
                .await
                .with_context(|| format!("swap of service {} failed", service))?;
            println!(
                "Endpoint {} created pointing to {} (ports: {})",
                outcome.endpoints,
                outcome.address,
                port_list(&outcome.ports)
            );
        }
        Commands::Restore => {
            let report = RestoreEngine::new(gateway)
                .restore()
                .await
                .context("restore failed")?;
            for name in &report.restored {
                println!("Restored service {}", name);
            }
            for name in &report.skipped {
                println!("Skipped service {} (swap marker without snapshot)", name);
            }
            if report.restored.is_empty() && report.skipped.is_empty() {
                println!("(no swapped services in {})", settings.namespace);
            }
        }
        Commands::List => {
            let swapped = list_swapped(gateway.as_ref()).await?;

            println!(
                "{:<32} {:<10} {:<14} {}",
                "NAME", "SNAPSHOT", "ORIGINAL TYPE", "ORIGINAL SELECTOR"
            );
            for entry in &swapped {
                let (state, original) = match &entry.snapshot {
                    SnapshotState::Valid(svc) => ("ok", Some(svc.as_ref())),
                    SnapshotState::Missing => ("missing", None),
                    SnapshotState::Malformed(_) => ("malformed", None),
                };
                println!(
                    "{:<32} {:<10} {:<14} {}",
                    entry.name(),
                    state,
                    original.map(service_type).unwrap_or("-"),
                    original.map(selector_string).unwrap_or_else(|| "-".to_string())
                );
            }

            if swapped.is_empty() {
                println!("(no swapped services in {})", settings.namespace);
            }
        }
    }

    Ok(())
}

fn service_type(svc: &Service) -> &str {
    svc.spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .unwrap_or("ClusterIP")
}

fn port_list(ports: &[EndpointPort]) -> String {
    if ports.is_empty() {
        return "<none>".to_string();
    }
    ports
        .iter()
        .map(|p| {
            let protocol = p.protocol.as_deref().unwrap_or("TCP");
            match p.name.as_deref() {
                Some(name) if !name.is_empty() => format!("{}:{}/{}", name, p.port, protocol),
                _ => format!("{}/{}", p.port, protocol),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn selector_string(svc: &Service) -> String {
    match svc.spec.as_ref().and_then(|s| s.selector.as_ref()) {
        Some(sel) if !sel.is_empty() => sel
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(","),
        _ => "<none>".to_string(),
    }
}
