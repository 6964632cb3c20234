//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::control::ReconService;
use crate::task::TaskSnapshot;

use super::stream;

/// Shared application state.
pub struct AppState {
    pub config: Arc<Config>,
    /// Task registry, stream hub and orchestrator behind one handle
    pub service: ReconService,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub name: &'static str,
    pub key: &'static str,
    pub display_name: &'static str,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let service = ReconService::with_defaults(Arc::clone(&config));

    match &config.results_dir {
        Some(dir) => tracing::info!("Results root: {}", dir.display()),
        None => tracing::info!("Results root derived from the project layout"),
    }

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        service,
    });
    let app = router(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // Setup graceful shutdown on SIGTERM/SIGINT
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/modules", get(list_modules))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/:project", get(get_task))
        .route("/ws", get(stream::control_ws))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wait for shutdown signal and ask every active run to stop.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received, stopping active runs...");

    let stopped: Vec<String> = state
        .service
        .tasks()
        .projects()
        .into_iter()
        .filter(|project| state.service.stop(project))
        .collect();
    if stopped.is_empty() {
        tracing::info!("No active runs to stop");
    } else {
        tracing::info!(projects = ?stopped, "Requested stop for active runs");
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Modules with a registered handler, in canonical order.
async fn list_modules(State(state): State<Arc<AppState>>) -> Json<Vec<ModuleInfo>> {
    let modules = state
        .service
        .orchestrator()
        .modules()
        .kinds()
        .into_iter()
        .map(|kind| ModuleInfo {
            name: kind.as_str(),
            key: kind.subtask_key(),
            display_name: kind.display_name(),
        })
        .collect();
    Json(modules)
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskSnapshot>> {
    let snapshots = state
        .service
        .tasks()
        .all()
        .iter()
        .map(|task| task.snapshot())
        .collect();
    Json(snapshots)
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
) -> Result<Json<TaskSnapshot>, (StatusCode, String)> {
    state
        .service
        .tasks()
        .get(&project)
        .map(|task| Json(task.snapshot()))
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("No task for project {}", project),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ModuleKind;
    use crate::task::TaskStatus;
    use serde_json::Value;
    use tempfile::tempdir;

    async fn spawn_app(results_root: &std::path::Path) -> (String, Arc<AppState>) {
        let root = results_root.to_string_lossy().to_string();
        let config = Arc::new(
            Config::from_lookup(|key| (key == "RECON_RESULTS_DIR").then(|| root.clone())).unwrap(),
        );
        let state = Arc::new(AppState {
            config: Arc::clone(&config),
            service: ReconService::with_defaults(config),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    #[tokio::test]
    async fn test_health() {
        let root = tempdir().unwrap();
        let (base, _state) = spawn_app(root.path()).await;

        let body: Value = reqwest::get(format!("{}/api/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_modules_lists_every_kind() {
        let root = tempdir().unwrap();
        let (base, _state) = spawn_app(root.path()).await;

        let body: Vec<Value> = reqwest::get(format!("{}/api/modules", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.len(), ModuleKind::ALL.len());
        assert_eq!(body[0]["name"], "subfinder");
        assert_eq!(body[0]["key"], "subdomains");
        assert_eq!(body[0]["display_name"], "Subdomain Discovery");
        assert!(body.iter().any(|m| m["name"] == "paramspyder"));
    }

    #[tokio::test]
    async fn test_task_lookup() {
        let root = tempdir().unwrap();
        let (base, state) = spawn_app(root.path()).await;

        let missing = reqwest::get(format!("{}/api/tasks/ghost", base))
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

        let task = state.service.tasks().get_or_create("acme");
        task.write_log("queued");

        let body: Value = reqwest::get(format!("{}/api/tasks/acme", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["project"], "acme");
        assert_eq!(body["status"], TaskStatus::Pending.as_str());
        assert_eq!(body["log"], "queued\n");

        let all: Vec<Value> = reqwest::get(format!("{}/api/tasks", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }
}
