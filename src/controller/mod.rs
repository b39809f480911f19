//! Controller actions and the response helpers they share.
//!
//! Every action has the [`Action`](crate::router::Action) signature and is
//! registered under its `Controller@method` identifier by [`register`].
//! JSON answers use one envelope:
//!
//! ```json
//! { "success": true, "message": "...", "data": ... }
//! { "success": false, "message": "...", "errors": { ... } }
//! ```

pub mod admin;
pub mod api;
pub mod auth;
pub mod dashboard;
pub mod error;

use serde::Serialize;
use serde_json::{Map, Value as Json, json};

use crate::context::Context;
use crate::database::Record;
use crate::router::Router;
use crate::{Response, StatusCode};

/// Registers every controller action on `router`.
pub fn register(router: &mut Router) {
    auth::register(router);
    dashboard::register(router);
    admin::register(router);
    api::register(router);
    error::register(router);
}

/// Serializes `value` as the JSON body.
pub fn json<T: Serialize + ?Sized>(value: &T, status: StatusCode) -> Response {
    Response::json(status, value)
}

/// The success envelope, with `data` when there is some.
pub fn success(data: Option<Json>, message: &str, status: StatusCode) -> Response {
    let mut body = Map::new();
    body.insert("success".to_owned(), Json::Bool(true));
    body.insert("message".to_owned(), Json::from(message));
    if let Some(data) = data {
        body.insert("data".to_owned(), data);
    }
    json(&body, status)
}

/// The failure envelope, with per-field `errors` when there are some.
pub fn error(message: &str, status: StatusCode, errors: Option<Json>) -> Response {
    let mut body = json!({ "success": false, "message": message });
    if let (Some(errors), Json::Object(map)) = (errors, &mut body) {
        map.insert("errors".to_owned(), errors);
    }
    json(&body, status)
}

/// Redirects to `path` under the application URL.
pub fn redirect(ctx: &Context, path: &str) -> Response {
    Response::redirect(ctx.config().url(path))
}

/// Records as a JSON array, each with the listed computed attributes.
pub(crate) fn collection(records: &[Record], computed: &[&str]) -> Json {
    Json::Array(records.iter().map(|r| r.to_json_with(computed)).collect())
}

// Required integer input, or a validation message for `errors`.
pub(crate) fn required_id(ctx: &Context, key: &str, errors: &mut Map<String, Json>) -> Option<i64> {
    let parsed = ctx.request().input(key).and_then(|v| v.trim().parse::<i64>().ok());
    if parsed.is_none() {
        errors.insert(key.to_owned(), Json::from(format!("El campo {key} es obligatorio")));
    }
    parsed
}

// Minimal HTML document for browser pages.
pub(crate) fn page(status: StatusCode, title: &str, body: &str) -> Response {
    Response::html(
        status,
        format!(
            "<!DOCTYPE html>\n<html lang=\"es\"><head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>{body}</body></html>\n"
        ),
    )
}

/// Escapes text for interpolation into HTML.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
