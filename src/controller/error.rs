//! `ErrorController`: the 404, 403 and 500 pages.

use tracing::debug;

use crate::context::Context;
use crate::router::{Args, NOT_FOUND_ACTION, Router};
use crate::{Response, StatusCode};

pub(super) fn register(router: &mut Router) {
    router.action(NOT_FOUND_ACTION, not_found);
    router.action("ErrorController@forbidden", forbidden);
    router.action("ErrorController@serverError", server_error);
}

fn render(ctx: &Context, status: StatusCode, message: &str) -> Response {
    if ctx.wants_json() {
        return super::error(message, status, None);
    }
    let title = format!("{} {}", status.as_u16(), status.canonical_reason());
    super::page(
        status,
        &title,
        &format!("<h1>{title}</h1><p>{}</p>", super::escape_html(message)),
    )
}

pub fn not_found(ctx: &mut Context, _args: &Args) -> Response {
    debug!(path = ctx.request().path(), "not found");
    render(ctx, StatusCode::NotFound, "La página solicitada no existe.")
}

pub fn forbidden(ctx: &mut Context, _args: &Args) -> Response {
    render(ctx, StatusCode::Forbidden, "No tiene permisos para acceder a esta página.")
}

pub fn server_error(ctx: &mut Context, _args: &Args) -> Response {
    render(ctx, StatusCode::InternalServerError, "Ocurrió un error inesperado.")
}
