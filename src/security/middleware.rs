//! Security middleware: authentication, role authorization and CORS.
//!
//! - [`AuthMiddleware`] (`auth`): requires a live session.
//! - [`RoleMiddleware`] (`role:<Name>,...`): requires one of the listed roles.
//! - [`CorsMiddleware`] (`api`): Cross-Origin Resource Sharing header injection
//!   and preflight (`OPTIONS`) short-circuiting.
//!
//! API requests (see [`Context::wants_json`]) are refused with a JSON error
//! body; browser requests are redirected.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::json;
use tracing::debug;

use crate::{
    Method, Response, StatusCode,
    context::Context,
    middleware::{Middleware, Next},
};

fn refuse(status: StatusCode, message: &str) -> Response {
    Response::json(status, &json!({ "success": false, "message": message }))
}

/// Requires a logged-in user.
///
/// Anonymous browser requests are redirected to `login?redirect=<path>` so the
/// login form can send the user back; API requests get `401 Unauthorized`.
pub struct AuthMiddleware;

impl Middleware for AuthMiddleware {
    fn handle(&self, ctx: Context, next: Next<'_>) -> Response {
        if ctx.is_logged_in() {
            return next.run(ctx);
        }

        debug!(path = ctx.request().path(), "anonymous request refused");
        if ctx.wants_json() {
            return refuse(StatusCode::Unauthorized, "No autenticado");
        }

        let back = utf8_percent_encode(ctx.request().path(), NON_ALPHANUMERIC).to_string();
        Response::redirect(ctx.config().url(&format!("login?redirect={back}")))
    }
}

/// Requires the session role to be one of `roles`.
///
/// Built from a `role:Administrador,Evaluador` directive. Browser requests
/// without the role are redirected to the `403` page; API requests get
/// `403 Forbidden`. An anonymous request is refused the same way, so the
/// directive also works without a preceding `auth`.
pub struct RoleMiddleware {
    roles: Vec<String>,
}

impl RoleMiddleware {
    pub fn new<S: Into<String>>(roles: impl IntoIterator<Item = S>) -> Self {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl Middleware for RoleMiddleware {
    fn handle(&self, ctx: Context, next: Next<'_>) -> Response {
        let roles: Vec<&str> = self.roles.iter().map(String::as_str).collect();
        if ctx.has_role(&roles) {
            return next.run(ctx);
        }

        debug!(path = ctx.request().path(), required = ?self.roles, "role check failed");
        if ctx.wants_json() {
            return refuse(StatusCode::Forbidden, "No autorizado");
        }
        Response::redirect(ctx.config().url("403"))
    }
}

/// CORS middleware: validates the `Origin` header, handles preflight requests,
/// and injects `Access-Control-*` headers on actual responses.
///
/// Constructed via [`CorsMiddleware::new`] and further configured through the
/// builder methods [`allow_origin`](Self::allow_origin),
/// [`allow_method`](Self::allow_method), and [`allow_header`](Self::allow_header).
///
/// # Behavior
///
/// - If no `Origin` header is present the request passes through unmodified.
/// - If the origin is not in the allow-list the request passes through unmodified.
/// - `OPTIONS` preflight requests are short-circuited with `204 No Content` and the
///   appropriate `Access-Control-*` headers; the action is **not** called.
/// - For all other requests the action runs normally and the CORS headers are
///   appended to the response.
/// - Specific origins are echoed back with `Vary: Origin`; the wildcard is not.
///
/// # Examples
///
/// ```rust
/// use captacion::security::CorsMiddleware;
///
/// let cors = CorsMiddleware::new()
///     .allow_origin("https://panel.example.com")
///     .allow_header("X-Requested-With");
/// ```
pub struct CorsMiddleware {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl CorsMiddleware {
    /// Creates a `CorsMiddleware` with permissive defaults.
    ///
    /// | Setting          | Default value                          |
    /// |------------------|----------------------------------------|
    /// | Allowed origins  | `*` (all origins)                      |
    /// | Allowed methods  | `GET`, `POST`, `OPTIONS`               |
    /// | Allowed headers  | `Content-Type`, `Authorization`        |
    pub fn new() -> Self {
        Self {
            allowed_origins: vec!["*".to_owned()],
            allowed_methods: vec!["GET".to_owned(), "POST".to_owned(), "OPTIONS".to_owned()],
            allowed_headers: vec!["Content-Type".to_owned(), "Authorization".to_owned()],
        }
    }

    /// Only the given origins, instead of the `*` default.
    pub fn with_origins<S: Into<String>>(origins: impl IntoIterator<Item = S>) -> Self {
        Self {
            allowed_origins: origins.into_iter().map(Into::into).collect(),
            ..Self::new()
        }
    }

    /// Adds an allowed origin. `"*"` permits every origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Adds an allowed HTTP method, sent verbatim in
    /// `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn allow_method(mut self, method: impl Into<String>) -> Self {
        self.allowed_methods.push(method.into());
        self
    }

    /// Adds an allowed request header, sent verbatim in
    /// `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn allow_header(mut self, header: impl Into<String>) -> Self {
        self.allowed_headers.push(header.into());
        self
    }

    // The `Access-Control-Allow-Origin` value for `origin`, if allowed.
    fn allowed(&self, origin: &str) -> Option<String> {
        if self.allowed_origins.iter().any(|o| o == "*") {
            Some("*".to_owned())
        } else if self.allowed_origins.iter().any(|o| o == origin) {
            Some(origin.to_owned())
        } else {
            None
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next<'_>) -> Response {
        let Some(origin) = ctx.request().headers().get("origin") else {
            return next.run(ctx);
        };
        let Some(allow_origin) = self.allowed(origin) else {
            return next.run(ctx);
        };

        let methods = self.allowed_methods.join(", ");
        let headers = self.allowed_headers.join(", ");
        let is_wildcard = allow_origin == "*";

        if ctx.request().method() == &Method::Options {
            let mut resp = Response::new(StatusCode::NoContent)
                .header("Access-Control-Allow-Origin", &allow_origin)
                .header("Access-Control-Allow-Methods", &methods)
                .header("Access-Control-Allow-Headers", &headers)
                .header("Access-Control-Max-Age", "3600");
            if !is_wildcard {
                resp.add_header("Vary", "Origin");
            }
            return resp;
        }

        let mut resp = next.run(ctx);
        resp.add_header("Access-Control-Allow-Origin", &allow_origin);
        resp.add_header("Access-Control-Allow-Methods", &methods);
        resp.add_header("Access-Control-Allow-Headers", &headers);
        if !is_wildcard {
            resp.add_header("Vary", "Origin");
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{context, context_from};
    use crate::models::rol;
    use crate::session::{COOKIE_NAME, Session, SessionStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn ok(_ctx: Context) -> Response {
        Response::new(StatusCode::Ok)
    }

    fn run(layer: impl Middleware + 'static, ctx: Context) -> Response {
        let layers: Vec<Arc<dyn Middleware>> = vec![Arc::new(layer)];
        Next::new(&layers, &ok).run(ctx)
    }

    fn as_role(role: &str, path: &str, extra: &str) -> Context {
        let sessions = SessionStore::new(Duration::from_secs(60));
        let token = sessions.create(Session::new(1, role));
        let raw = format!("GET {path} HTTP/1.1\r\nCookie: {COOKIE_NAME}={token}\r\n{extra}\r\n");
        context_from(raw.as_bytes(), sessions)
    }

    fn raw(method: &str, path: &str, headers: &str) -> Context {
        let raw = format!("{method} {path} HTTP/1.1\r\n{headers}\r\n");
        context_from(raw.as_bytes(), SessionStore::new(Duration::from_secs(60)))
    }

    // ── AuthMiddleware ────────────────────────────────────────────────────────

    #[test]
    fn auth_redirects_browser_to_login_with_return_path() {
        let res = run(AuthMiddleware, context("GET", "/admin/zonas"));
        assert_eq!(res.status(), StatusCode::Found);
        assert_eq!(
            res.headers().get("location"),
            Some("/login?redirect=%2Fadmin%2Fzonas")
        );
    }

    #[test]
    fn auth_answers_api_with_401() {
        let res = run(AuthMiddleware, context("GET", "/api/centros"));
        assert_eq!(res.status(), StatusCode::Unauthorized);
        let body: serde_json::Value = serde_json::from_slice(res.content()).unwrap();
        assert_eq!(body["success"], false);
    }

    #[test]
    fn auth_passes_logged_in_user() {
        let res = run(AuthMiddleware, as_role(rol::ATLETA, "/", ""));
        assert_eq!(res.status(), StatusCode::Ok);
    }

    // ── RoleMiddleware ────────────────────────────────────────────────────────

    #[test]
    fn role_accepts_any_listed_role() {
        let mw = RoleMiddleware::new([rol::ADMINISTRADOR, rol::EVALUADOR]);
        let res = run(mw, as_role(rol::EVALUADOR, "/admin/zonas", ""));
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[test]
    fn role_redirects_browser_to_403() {
        let mw = RoleMiddleware::new([rol::ADMINISTRADOR]);
        let res = run(mw, as_role(rol::ATLETA, "/admin/zonas", ""));
        assert_eq!(res.status(), StatusCode::Found);
        assert_eq!(res.headers().get("location"), Some("/403"));
    }

    #[test]
    fn role_answers_api_with_403() {
        let mw = RoleMiddleware::new([rol::EVALUADOR]);
        let res = run(mw, as_role(rol::ATLETA, "/api/resultados/guardar", ""));
        assert_eq!(res.status(), StatusCode::Forbidden);
    }

    // ── CorsMiddleware ────────────────────────────────────────────────────────

    #[test]
    fn cors_without_origin_passes_through() {
        let res = run(CorsMiddleware::new(), context("GET", "/api/centros"));
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(!res.headers().contains("access-control-allow-origin"));
    }

    #[test]
    fn cors_wildcard_decorates_response() {
        let ctx = raw("GET", "/api/centros", "Origin: https://app.example.com\r\n");
        let res = run(CorsMiddleware::new(), ctx);
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get("access-control-allow-origin"), Some("*"));
        assert!(!res.headers().contains("vary"));
    }

    #[test]
    fn cors_preflight_short_circuits() {
        let ctx = raw("OPTIONS", "/api/login", "Origin: https://app.example.com\r\n");
        let cors = CorsMiddleware::with_origins(["https://app.example.com"]);
        let res = run(cors, ctx);
        assert_eq!(res.status(), StatusCode::NoContent);
        assert_eq!(
            res.headers().get("access-control-allow-origin"),
            Some("https://app.example.com")
        );
        assert_eq!(res.headers().get("access-control-max-age"), Some("3600"));
        assert_eq!(res.headers().get("vary"), Some("Origin"));
    }

    #[test]
    fn cors_rejected_origin_gets_no_headers() {
        let ctx = raw("GET", "/api/centros", "Origin: https://evil.example.com\r\n");
        let cors = CorsMiddleware::with_origins(["https://app.example.com"]);
        let res = run(cors, ctx);
        assert!(!res.headers().contains("access-control-allow-origin"));
    }
}
