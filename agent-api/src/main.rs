use std::sync::Arc;

use agent_api::agent::BrowserAgent;
use agent_api::config::{Config, LogFormat};
use agent_api::resources::{ChromeLauncher, OpenAiConnector, ResourceProvisioner};
use agent_api::tasks::{TaskExecutor, TaskLifecycleManager, TaskStore};
use agent_api::{api, AppState};
use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "agent_api=debug,tower_http=info".into()),
    );
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);
    info!(
        port = config.port,
        browser = %config.browser.executable.display(),
        model = %config.llm.model,
        secrets = ?config.secrets,
        "agent api starting"
    );

    let launcher = ChromeLauncher::new(config.browser.clone())
        .context("failed to build browser launcher")?;
    let resources = Arc::new(ResourceProvisioner::new(
        Arc::new(launcher),
        Arc::new(OpenAiConnector::new(config.llm.clone())),
        config.browser.startup_timeout,
    ));

    let store = Arc::new(TaskStore::new());
    let executor = Arc::new(TaskExecutor::new(
        store.clone(),
        resources.clone(),
        Arc::new(
            BrowserAgent::new(config.agent_max_steps).with_secrets(config.secrets.clone()),
        ),
        config.task_timeout,
    ));
    let tasks = Arc::new(TaskLifecycleManager::new(
        store,
        executor,
        resources,
        config.default_task.clone(),
    ));
    let state = Arc::new(AppState::new(tasks.clone()));

    let app = api::router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tasks.shutdown(config.shutdown_drain).await;
    info!("agent api stopped");
    Ok(())
}
