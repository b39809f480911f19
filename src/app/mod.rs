//! The assembled application: router, middleware, configuration and the
//! session store, turning one parsed [`Request`] into one [`Response`].
//!
//! ```no_run
//! use captacion::app::App;
//! use captacion::config::Config;
//! use captacion::server::Server;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let server = Server::bind(&config.bind).await?;
//! let app = App::new(config)?;
//! server.run(move |req| app.handle(req)).await?;
//! # Ok(())
//! # }
//! ```

pub mod routes;

use std::sync::Arc;

use tracing::error;

use crate::config::Config;
use crate::context::Context;
use crate::controller;
use crate::database::Database;
use crate::middleware::{LoggerMiddleware, Middleware};
use crate::router::{RouteError, Router};
use crate::security::{AuthMiddleware, CorsMiddleware, RoleMiddleware};
use crate::session::SessionStore;
use crate::{Request, Response, StatusCode};

/// Everything a request needs that outlives it.
#[derive(Debug)]
pub struct App {
    router: Router,
    config: Arc<Config>,
    sessions: SessionStore,
}

impl App {
    /// Wires the named middleware, every controller action and the route
    /// table.
    ///
    /// # Errors
    ///
    /// [`RouteError`] if a route pattern does not compile.
    pub fn new(config: Config) -> Result<Self, RouteError> {
        let mut router = Router::new();

        let registry = router.middleware_mut();
        registry.register("auth", |_args: &[String]| Arc::new(AuthMiddleware) as Arc<dyn Middleware>);
        registry.register("role", |args: &[String]| {
            Arc::new(RoleMiddleware::new(args.iter().cloned())) as Arc<dyn Middleware>
        });
        registry.register("api", |_args: &[String]| Arc::new(CorsMiddleware::new()) as Arc<dyn Middleware>);

        router.layer(LoggerMiddleware);
        controller::register(&mut router);
        routes::define(&mut router)?;

        let sessions = SessionStore::new(config.session_lifetime);
        Ok(Self {
            router,
            config: Arc::new(config),
            sessions,
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Opens a connection for the request and dispatches it.
    pub fn handle(&self, request: Request) -> Response {
        let db = match Database::open(&self.config.db_path) {
            Ok(db) => db,
            Err(e) => {
                error!(error = %e, "database unavailable");
                return unavailable(&request);
            }
        };

        let ctx = Context::new(request, db, Arc::clone(&self.config), self.sessions.clone());
        self.router.dispatch(ctx)
    }
}

// Answer when no connection could be opened, shaped like the error pages.
fn unavailable(request: &Request) -> Response {
    let path = request.route_path();
    if path == "api" || path.starts_with("api/") || request.is_json() {
        return controller::error("Error interno del servidor", StatusCode::InternalServerError, None);
    }
    controller::page(
        StatusCode::InternalServerError,
        "500 Internal Server Error",
        "<h1>500 Internal Server Error</h1><p>Ocurrió un error inesperado.</p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(raw: &str) -> Request {
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn app_with_db(path: PathBuf) -> App {
        let config = Config {
            db_path: path,
            ..Config::default()
        };
        App::new(config).unwrap()
    }

    // ── Wiring ───────────────────────────────────────────────────────────────

    #[test]
    fn every_route_action_is_registered() {
        let app = app_with_db(PathBuf::from(":memory:"));
        for route in app.router().routes() {
            assert!(app.router().has_action(route.action()), "{} has no action", route.action());
        }
    }

    #[test]
    fn middleware_names_are_known() {
        let app = app_with_db(PathBuf::from(":memory:"));
        for route in app.router().routes() {
            for directive in route.middleware() {
                assert!(
                    ["auth", "role", "api"].iter().any(|n| *n == directive.name()),
                    "unexpected middleware {directive}"
                );
            }
        }
    }

    // ── Handling ─────────────────────────────────────────────────────────────

    #[test]
    fn unknown_path_is_404() {
        let app = app_with_db(PathBuf::from(":memory:"));
        let res = app.handle(parse("GET /no/existe HTTP/1.1\r\n\r\n"));
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[test]
    fn dashboard_requires_login() {
        let app = app_with_db(PathBuf::from(":memory:"));
        let res = app.handle(parse("GET / HTTP/1.1\r\n\r\n"));
        assert_eq!(res.status(), StatusCode::Found);
        assert_eq!(res.headers().get("location"), Some("/login?redirect=%2F"));
    }

    #[test]
    fn unopenable_database_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with_db(dir.path().join("missing").join("captacion.db"));

        let res = app.handle(parse("GET /login HTTP/1.1\r\n\r\n"));
        assert_eq!(res.status(), StatusCode::InternalServerError);
        assert!(res.headers().get("content-type").unwrap().starts_with("text/html"));

        let res = app.handle(parse("GET /api/pruebas HTTP/1.1\r\n\r\n"));
        let body: serde_json::Value = serde_json::from_slice(res.content()).unwrap();
        assert_eq!(body["success"], false);
    }
}
