//! Request routing: map URL patterns and HTTP verbs to named actions.
//!
//! Routes are registered with a pattern, an action identifier
//! (`Controller@method`), the verbs they answer and a list of middleware
//! directives:
//!
//! | Pattern               | Example match      | Captured params  |
//! |-----------------------|--------------------|------------------|
//! | `api/centros`         | `api/centros`      | *(none)*         |
//! | `api/atletas/ver/{id}`| `api/atletas/ver/5`| `id → "5"`       |
//!
//! A placeholder `{name}` matches one segment of letters, digits, `_` and `-`.
//! Patterns and request paths are compared with their leading and trailing
//! slashes trimmed, so the root route is the empty pattern.
//!
//! Routes are matched in registration order; the first route whose pattern
//! matches and whose verbs include the request verb wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::{Context, PathParams};
use crate::middleware::{Directive, Middleware, MiddlewareRegistry, Next};
use crate::{Response, StatusCode};

/// Identifier of the action answering unmatched requests.
pub const NOT_FOUND_ACTION: &str = "ErrorController@notFound";

/// Errors raised while registering routes.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A controller action: receives the request context and the route's ordered
/// argument list.
pub type Action = fn(&mut Context, &Args) -> Response;

/// The ordered arguments an action is called with.
///
/// Each slot holds the captured value for the declared parameter, else its
/// declared default, else `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args(Vec<Option<String>>);

impl Args {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self(values)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).and_then(Option::as_deref)
    }

    /// The argument at `index` parsed as an integer id.
    pub fn int(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(|v| v.parse().ok())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One declared action parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    name: String,
    default: Option<String>,
}

impl ParamSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }
}

/// A registered route.
///
/// Until [`param`](Self::param) or [`param_or`](Self::param_or) is called, the
/// parameter contract is the pattern's placeholders in order.
#[derive(Debug, Clone)]
pub struct Route {
    pattern: String,
    regex: Regex,
    action: String,
    verbs: Vec<String>,
    middleware: Vec<Directive>,
    params: Vec<ParamSpec>,
    explicit_params: bool,
}

impl Route {
    fn new(pattern: &str, action: &str, verbs: &str, middleware: Vec<Directive>) -> Result<Self, RouteError> {
        let pattern = pattern.trim_matches('/').to_owned();
        let (regex, names) = compile(&pattern)?;
        let mut verbs: Vec<String> = verbs
            .split('|')
            .map(|v| v.trim().to_ascii_uppercase())
            .filter(|v| !v.is_empty())
            .collect();
        if verbs.is_empty() {
            verbs.push("GET".to_owned());
        }

        Ok(Self {
            pattern,
            regex,
            action: action.to_owned(),
            verbs,
            middleware,
            params: names
                .into_iter()
                .map(|name| ParamSpec { name, default: None })
                .collect(),
            explicit_params: false,
        })
    }

    /// Declares the next action parameter, bound to the capture of that name.
    pub fn param(&mut self, name: &str) -> &mut Self {
        self.declare(name, None)
    }

    /// Declares the next action parameter with a fallback used when the
    /// pattern does not capture it.
    pub fn param_or(&mut self, name: &str, default: &str) -> &mut Self {
        self.declare(name, Some(default.to_owned()))
    }

    fn declare(&mut self, name: &str, default: Option<String>) -> &mut Self {
        if !self.explicit_params {
            self.params.clear();
            self.explicit_params = true;
        }
        self.params.push(ParamSpec {
            name: name.to_owned(),
            default,
        });
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn verbs(&self) -> &[String] {
        &self.verbs
    }

    pub fn middleware(&self) -> &[Directive] {
        &self.middleware
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn allows(&self, verb: &str) -> bool {
        self.verbs.iter().any(|v| v.eq_ignore_ascii_case(verb))
    }

    /// The named captures if `path` matches the pattern.
    pub fn captures(&self, path: &str) -> Option<PathParams> {
        let caps = self.regex.captures(path.trim_matches('/'))?;
        let mut params = PathParams::new();
        for name in self.regex.capture_names().flatten() {
            if let Some(value) = caps.name(name) {
                params.insert(name, value.as_str());
            }
        }
        Some(params)
    }

    /// The ordered argument list for the declared parameters.
    pub fn args(&self, params: &PathParams) -> Args {
        Args(
            self.params
                .iter()
                .map(|spec| {
                    params
                        .get(&spec.name)
                        .map(str::to_owned)
                        .or_else(|| spec.default.clone())
                })
                .collect(),
        )
    }

    // This route under `prefix`, with `middleware` ahead of its own.
    fn prefixed(self, prefix: &str, middleware: &[Directive]) -> Result<Self, RouteError> {
        let joined = [prefix.trim_matches('/'), self.pattern.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        let (regex, _) = compile(&joined)?;

        let mut all = middleware.to_vec();
        all.extend(self.middleware);

        Ok(Self {
            pattern: joined,
            regex,
            middleware: all,
            ..self
        })
    }
}

// `{name}` becomes `(?P<name>[a-zA-Z0-9_-]+)`; everything else is literal.
fn compile(pattern: &str) -> Result<(Regex, Vec<String>), RouteError> {
    let mut source = String::from("^");
    let mut names = Vec::new();
    let mut rest = pattern;

    while let Some(open) = rest.find('{') {
        let (literal, tail) = rest.split_at(open);
        source.push_str(&regex::escape(literal));

        let placeholder = tail[1..]
            .find('}')
            .map(|close| &tail[1..=close])
            .filter(|name| {
                !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });

        match placeholder {
            Some(name) => {
                source.push_str(&format!("(?P<{name}>[a-zA-Z0-9_-]+)"));
                names.push(name.to_owned());
                rest = &tail[name.len() + 2..];
            }
            None => {
                source.push_str(r"\{");
                rest = &tail[1..];
            }
        }
    }
    source.push_str(&regex::escape(rest));
    source.push('$');

    let regex = Regex::new(&source).map_err(|source| RouteError::Pattern {
        pattern: pattern.to_owned(),
        source,
    })?;
    Ok((regex, names))
}

// `Controller` is shorthand for `Controller@index`.
fn action_key(id: &str) -> String {
    if id.contains('@') {
        id.to_owned()
    } else {
        format!("{id}@index")
    }
}

/// Route table, action registry and middleware registry.
///
/// # Examples
///
/// ```
/// use captacion::context::Context;
/// use captacion::router::{Args, Router};
/// use captacion::{Response, StatusCode};
///
/// fn show(_ctx: &mut Context, args: &Args) -> Response {
///     Response::html(StatusCode::Ok, format!("atleta {}", args.get(0).unwrap_or("?")))
/// }
///
/// let mut router = Router::new();
/// router.action("AtletaController@show", show);
/// router.add("atletas/ver/{id}", "AtletaController@show", "GET", &["auth"]).unwrap();
///
/// let (route, params) = router.matches("atletas/ver/5", "GET").unwrap();
/// assert_eq!(route.action(), "AtletaController@show");
/// assert_eq!(params.get("id"), Some("5"));
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    actions: HashMap<String, Action>,
    middleware: MiddlewareRegistry,
    layers: Vec<Arc<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route answering `verbs` (`"GET"`, `"GET|POST"`).
    ///
    /// # Errors
    ///
    /// [`RouteError::Pattern`] if the compiled pattern is not a valid regex.
    pub fn add(
        &mut self,
        pattern: &str,
        action: &str,
        verbs: &str,
        middleware: &[&str],
    ) -> Result<&mut Route, RouteError> {
        let directives = middleware.iter().map(|m| Directive::parse(m)).collect();
        let route = Route::new(pattern, action, verbs, directives)?;
        debug!(pattern = route.pattern(), action, "route registered");
        self.routes.push(route);
        let last = self.routes.len() - 1;
        Ok(&mut self.routes[last])
    }

    /// Registers the routes added by `build` under `prefix`, with `middleware`
    /// ahead of each route's own.
    pub fn group<F>(&mut self, prefix: &str, build: F, middleware: &[&str]) -> Result<(), RouteError>
    where
        F: FnOnce(&mut Router) -> Result<(), RouteError>,
    {
        let mut inner = Router::new();
        build(&mut inner)?;

        let directives: Vec<Directive> = middleware.iter().map(|m| Directive::parse(m)).collect();
        for route in inner.routes {
            self.routes.push(route.prefixed(prefix, &directives)?);
        }
        Ok(())
    }

    /// Registers the function behind an action identifier.
    pub fn action(&mut self, id: &str, action: Action) {
        self.actions.insert(action_key(id), action);
    }

    pub fn has_action(&self, id: &str) -> bool {
        self.actions.contains_key(&action_key(id))
    }

    /// Registry that route directives are resolved against.
    pub fn middleware_mut(&mut self) -> &mut MiddlewareRegistry {
        &mut self.middleware
    }

    /// Adds middleware that wraps every request, matched or not.
    pub fn layer(&mut self, middleware: impl Middleware + 'static) {
        self.layers.push(Arc::new(middleware));
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// The first route matching `path` that allows `verb`, with its captures.
    pub fn matches(&self, path: &str, verb: &str) -> Option<(&Route, PathParams)> {
        self.routes
            .iter()
            .filter(|route| route.allows(verb))
            .find_map(|route| route.captures(path).map(|params| (route, params)))
    }

    /// Runs the request through the global layers, the matched route's
    /// middleware and finally its action.
    pub fn dispatch(&self, mut ctx: Context) -> Response {
        let path = ctx.request().route_path();
        let verb = ctx.request().method().as_str().to_owned();

        let Some((route, params)) = self.matches(&path, &verb) else {
            debug!(%path, %verb, "no route matched");
            let endpoint = |ctx: Context| self.not_found(ctx);
            return Next::new(&self.layers, &endpoint).run(ctx);
        };

        let args = route.args(&params);
        ctx.set_params(params);

        let mut layers = self.layers.clone();
        layers.extend(route.middleware().iter().filter_map(|d| self.middleware.resolve(d)));

        let action = self.actions.get(&action_key(route.action())).copied();
        let endpoint = |mut ctx: Context| match action {
            Some(action) => action(&mut ctx, &args),
            None => {
                warn!(action = route.action(), "route action is not registered");
                self.not_found(ctx)
            }
        };
        Next::new(&layers, &endpoint).run(ctx)
    }

    fn not_found(&self, mut ctx: Context) -> Response {
        match self.actions.get(NOT_FOUND_ACTION) {
            Some(action) => action(&mut ctx, &Args::default()),
            None => Response::html(
                StatusCode::NotFound,
                "<h1>404 Not Found</h1><p>The requested URL was not found on this server.</p>",
            ),
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .field("actions", &self.actions.len())
            .field("middleware", &self.middleware)
            .field("layers", &self.layers.len())
            .finish()
    }
}
