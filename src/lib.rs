//! # captacion
//!
//! Talent-evaluation tracking for young athletes: zones and centers,
//! evaluators, athletes, evaluation sessions and test results, with
//! administrator, evaluator and athlete roles.
//!
//! The application is a small MVC stack on a from-scratch HTTP/1.1 server:
//!
//! ```text
//! server ─▶ app ─▶ router ─▶ middleware ─▶ controller ─▶ models ─▶ database
//!                    │                          │
//!                 context (request, db, session, config)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use captacion::app::App;
//! use captacion::config::Config;
//! use captacion::database::Database;
//! use captacion::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     Database::open(&config.db_path)?.migrate()?;
//!
//!     let server = Server::bind(&config.bind).await?;
//!     let app = App::new(config)?;
//!     server.run(move |req| app.handle(req)).await?;
//!     Ok(())
//! }
//! ```

// ── Transport ─────────────────────────────────────────────────────────────────
pub mod http;
pub mod server;

// ── Application ───────────────────────────────────────────────────────────────
pub mod app;
pub mod config;
pub mod context;
pub mod controller;
pub mod middleware;
pub mod router;
pub mod security;
pub mod session;

// ── Storage ───────────────────────────────────────────────────────────────────
pub mod database;
pub mod models;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
