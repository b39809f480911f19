//! Middleware pipeline: composable before/after request handler logic.
//!
//! Each middleware wraps the next layer, enabling request inspection,
//! short-circuit responses, and response decoration without coupling actions
//! to infrastructure concerns.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain; call [`Next::run`] to advance.
//! - [`Directive`]: a route's middleware reference, `name` or `name:arg1,arg2`.
//! - [`MiddlewareRegistry`]: builds middleware instances from directives.
//! - [`LoggerMiddleware`]: built-in request/response logger.
//!
//! Requests run on a blocking worker from start to finish, so the whole
//! pipeline is synchronous.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::{Response, context::Context};

/// The core trait for all middleware.
///
/// Implementors receive the request [`Context`] by value and a [`Next`]
/// cursor. They may:
///
/// - **Pass through**: call `next.run(ctx)` without modification.
/// - **Short-circuit**: return a [`Response`] without calling `next`.
/// - **Decorate**: call `next.run(ctx)`, then adjust the response.
///
/// Middleware is shared by every worker thread, hence `Send + Sync`.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, next: Next<'_>) -> Response;
}

/// A cursor into the remaining middleware chain for a single request.
///
/// When every layer has run, [`run`](Self::run) calls the endpoint that
/// invokes the matched action.
///
/// # Examples
///
/// ```
/// use captacion::context::Context;
/// use captacion::http::Response;
/// use captacion::middleware::{Middleware, Next};
///
/// struct PassThrough;
///
/// impl Middleware for PassThrough {
///     fn handle(&self, ctx: Context, next: Next<'_>) -> Response {
///         next.run(ctx)
///     }
/// }
/// ```
pub struct Next<'a> {
    layers: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Fn(Context) -> Response,
}

impl<'a> Next<'a> {
    pub fn new(layers: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Fn(Context) -> Response) -> Self {
        Self { layers, endpoint }
    }

    /// Invokes the next layer, or the endpoint once the layers are exhausted.
    pub fn run(self, ctx: Context) -> Response {
        match self.layers.split_first() {
            Some((layer, rest)) => layer.handle(
                ctx,
                Next {
                    layers: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => (self.endpoint)(ctx),
        }
    }
}

/// A middleware reference as written in a route table: `name` or
/// `name:arg1,arg2`.
///
/// # Examples
///
/// ```
/// use captacion::middleware::Directive;
///
/// let d = Directive::parse("role:Administrador,Evaluador");
/// assert_eq!(d.name(), "role");
/// assert_eq!(d.args(), ["Administrador", "Evaluador"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    name: String,
    args: Vec<String>,
}

impl Directive {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((name, args)) => Self {
                name: name.trim().to_owned(),
                args: args
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_owned)
                    .collect(),
            },
            None => Self {
                name: raw.trim().to_owned(),
                args: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.name, self.args.join(","))
        }
    }
}

/// Builds a middleware instance from a directive's arguments.
pub type MiddlewareFactory = Box<dyn Fn(&[String]) -> Arc<dyn Middleware> + Send + Sync>;

/// Named middleware factories that route directives are resolved against.
#[derive(Default)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, MiddlewareFactory>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&[String]) -> Arc<dyn Middleware> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_owned(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiates the middleware named by `directive`. Unknown names are
    /// logged and yield `None`.
    pub fn resolve(&self, directive: &Directive) -> Option<Arc<dyn Middleware>> {
        match self.factories.get(directive.name()) {
            Some(factory) => Some(factory(directive.args())),
            None => {
                warn!(middleware = %directive, "unknown middleware skipped");
                None
            }
        }
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("MiddlewareRegistry").field("names", &names).finish()
    }
}

/// Logs each request's method, path, status, and duration.
///
/// Emits a single `info` event after the downstream layers complete. It never
/// short-circuits.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next<'_>) -> Response {
        let start = Instant::now();
        let method = ctx.request().method().to_string();
        let path = ctx.request().path().to_owned();

        let response = next.run(ctx);

        info!(
            %method,
            %path,
            status = response.status().as_u16(),
            elapsed = ?start.elapsed(),
            "request handled"
        );
        response
    }
}
