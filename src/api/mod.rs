//! HTTP and WebSocket control plane.
//!
//! - `GET /api/health`, `/api/modules`, `/api/tasks`, `/api/tasks/:project`
//! - `GET /ws` upgrades to the start/pause/resume/stop/status protocol

mod routes;
mod stream;

pub use routes::{serve, AppState, HealthResponse, ModuleInfo};
pub use stream::{ControlAction, ControlRequest};
