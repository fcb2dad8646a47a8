//! aideploy operator - serves AI models declared as AIDeployment resources

mod config;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, Resource};

use aideploy_common::crd::{AIDeployment, AIModelMap};
use aideploy_common::telemetry::{init_tracing, LogFormat};
use aideploy_common::CONTROLLER_NAME;
use aideploy_engine::EngineRegistry;
use aideploy_reconcile::{
    error_policy, reconcile, CatalogModelResolver, ClusterClient, Context, KubeClusterClient,
};

use crate::config::ControllerArgs;

/// aideploy - converge declared AI workloads into running model servers
#[derive(Parser, Debug)]
#[command(name = "aideploy-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Log output format (text or json)
    #[arg(long, env = "AIDEPLOY_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches AIDeployments and converges their Deployment, Service, and
    /// Ingress.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format)?;

    if cli.crd {
        println!("{}", crd_manifests()?);
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.controller).await,
    }
}

/// All CRDs as a multi-document YAML stream
fn crd_manifests() -> anyhow::Result<String> {
    let documents = [
        serde_yaml::to_string(&AIDeployment::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize AIDeployment CRD: {}", e))?,
        serde_yaml::to_string(&AIModelMap::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize AIModelMap CRD: {}", e))?,
    ];
    Ok(documents.join("---\n"))
}

/// Ensure all aideploy CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply so
/// the schema always matches the running version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(CONTROLLER_NAME).force();

    for crd in [AIDeployment::crd(), AIModelMap::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD...");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install {} CRD: {}", name, e))?;
    }

    tracing::info!("All aideploy CRDs installed/updated");
    Ok(())
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let registry = EngineRegistry::new(args.engine_config()?);
    tracing::info!(engines = ?registry.names(), "engine registry ready");

    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(client.clone()));
    let ctx = Arc::new(Context::new(
        cluster.clone(),
        Arc::new(CatalogModelResolver::new(cluster)),
        registry,
        args.settings(),
    ));

    let namespace = args.watch_namespace.as_deref();
    let deployments: Api<AIDeployment> = scoped_api(&client, namespace);

    // Abort in-flight passes once shutdown is requested
    let shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    tracing::info!(namespace = namespace.unwrap_or("<all>"), "Starting AIDeployment controller");

    Controller::new(deployments, WatcherConfig::default())
        .owns(scoped_api::<Deployment>(&client, namespace), WatcherConfig::default())
        .owns(scoped_api::<Service>(&client, namespace), WatcherConfig::default())
        .owns(scoped_api::<Ingress>(&client, namespace), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "AIDeployment reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "AIDeployment reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("aideploy controller shutting down");
    Ok(())
}
