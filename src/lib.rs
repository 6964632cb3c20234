//! # Recon Orchestrator
//!
//! A self-hosted service that runs multi-stage reconnaissance pipelines per
//! project and streams their progress to the operator.
//!
//! This library provides:
//! - A WebSocket control plane to start, pause, resume and stop runs
//! - A sequential pipeline of recon modules wrapping external tools
//! - A bounded-concurrency HTTP prober for mass liveness checks
//!
//! ## Architecture
//!
//! ```text
//!   client ──ws──▶ api::stream ──▶ control::ReconService ──spawn──▶ pipeline::Orchestrator
//!     ▲                               │          │                      │
//!     │                               ▼          ▼                      ▼
//!     └──────── broadcast::StreamHub ◀── RunLog  task::TaskRegistry   modules::*
//!                                                                       │
//!                                                                       ▼
//!                                                                 probe::probe_all
//! ```
//!
//! ## Run Flow
//! 1. A `start` request claims the project's task
//! 2. The orchestrator walks the module list, honouring pause/stop between modules
//! 3. Every log line and progress update is relayed to the project's subscribers
//! 4. The control layer applies the terminal status when the run returns
//!
//! ## Modules
//! - `task`: Task, subtask and control-token state
//! - `pipeline`: Orchestrator, module trait and registry
//! - `modules`: Built-in recon stages
//! - `broadcast`: Per-project stream fan-out

pub mod api;
pub mod broadcast;
pub mod config;
pub mod control;
pub mod modules;
pub mod pipeline;
pub mod probe;
pub mod task;

pub use config::Config;
pub use control::ReconService;
