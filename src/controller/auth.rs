//! `AuthController`: the browser login form, login, logout and self-service
//! registration.

use std::collections::BTreeMap;

use tracing::info;

use crate::context::Context;
use crate::controller::{escape_html, page, redirect};
use crate::models::{rol, usuario};
use crate::router::{Args, Router};
use crate::security::{self, hash};
use crate::session::COOKIE_NAME;
use crate::{Method, Response, StatusCode};

/// Shortest password accepted at registration.
const MIN_PASSWORD_LEN: usize = 6;

/// Roles a visitor may pick when registering.
const SELF_SERVICE_ROLES: &[&str] = &[rol::ATLETA, rol::EVALUADOR];

pub(super) fn register(router: &mut Router) {
    router.action("AuthController@login", login);
    router.action("AuthController@logout", logout);
    router.action("AuthController@register", registro);
}

/// `GET login` shows the form; `POST login` checks the credentials.
pub fn login(ctx: &mut Context, _args: &Args) -> Response {
    let target = ctx.request().input("redirect").and_then(|r| safe_target(&r));

    if ctx.request().method() != &Method::Post {
        if ctx.is_logged_in() {
            return redirect(ctx, target.as_deref().unwrap_or(""));
        }
        return form(StatusCode::Ok, target.as_deref(), None, "");
    }

    let email = ctx.request().input("email").unwrap_or_default().trim().to_owned();
    let password = ctx.request().input("password").unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return form(
            StatusCode::UnprocessableEntity,
            target.as_deref(),
            Some("Ingrese email y contraseña."),
            &email,
        );
    }

    let Some(user) = security::attempt(ctx.db(), &email, &password) else {
        return form(
            StatusCode::Unauthorized,
            target.as_deref(),
            Some("Credenciales inválidas."),
            &email,
        );
    };

    let Some(id) = user.key().as_i64() else {
        return form(StatusCode::InternalServerError, target.as_deref(), Some("Usuario inválido."), &email);
    };
    let token = ctx.login(id, &user.get("rol").to_string());
    redirect(ctx, target.as_deref().unwrap_or("")).cookie(COOKIE_NAME, &token)
}

/// Ends the session and returns to the login form.
pub fn logout(ctx: &mut Context, _args: &Args) -> Response {
    if let Some(id) = ctx.user_id() {
        info!(user_id = id, "logout");
    }
    ctx.logout();
    redirect(ctx, "login").expire_cookie(COOKIE_NAME)
}

/// `GET register` shows the form; `POST register` creates the account and
/// sends the visitor to the login form.
///
/// The role comes from `rol_id` and defaults to athlete. Administrators are
/// never created here.
pub fn registro(ctx: &mut Context, _args: &Args) -> Response {
    if ctx.request().method() != &Method::Post {
        if ctx.is_logged_in() {
            return redirect(ctx, "");
        }
        return registro_form(StatusCode::Ok, &BTreeMap::new(), "", "");
    }

    let nombre = ctx.request().input("nombre").unwrap_or_default().trim().to_owned();
    let email = ctx.request().input("email").unwrap_or_default().trim().to_owned();
    let password = ctx.request().input("password").unwrap_or_default();
    let confirmacion = ctx.request().input("password_confirmation");
    let rol_id = ctx.request().input("rol_id").filter(|r| !r.trim().is_empty());

    let mut errors = BTreeMap::new();
    if nombre.is_empty() {
        errors.insert("nombre", "El nombre es obligatorio.");
    }
    if !email.contains('@') {
        errors.insert("email", "Ingrese un email válido.");
    } else if usuario::find_by_email(ctx.db(), &email).is_some() {
        errors.insert("email", "El email ya está registrado.");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.insert("password", "La contraseña debe tener al menos 6 caracteres.");
    } else if confirmacion.is_some_and(|c| c != password) {
        errors.insert("password", "Las contraseñas no coinciden.");
    }

    let rol = match rol_id {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|id| rol::ROL.find(ctx.db(), id)),
        None => rol::find_by_name(ctx.db(), rol::ATLETA),
    };
    let rol = rol.filter(|r| {
        let nombre = r.get("nombre").to_string();
        SELF_SERVICE_ROLES.contains(&nombre.as_str())
    });
    if rol.is_none() {
        errors.insert("rol_id", "Rol no permitido.");
    }

    let Some(rol) = rol.filter(|_| errors.is_empty()) else {
        return registro_form(StatusCode::UnprocessableEntity, &errors, &nombre, &email);
    };

    let mut cuenta = usuario::USUARIO.new_record();
    cuenta
        .set("nombre", nombre.as_str())
        .set("email", email.as_str())
        .set("password", hash::make(&password))
        .set("rol_id", rol.key());
    if !cuenta.save(ctx.db()) {
        errors.insert("email", "No se pudo crear la cuenta.");
        return registro_form(StatusCode::InternalServerError, &errors, &nombre, &email);
    }

    info!(id = %cuenta.key(), rol = %rol.get("nombre"), "account registered");
    redirect(ctx, "login")
}

fn registro_form(
    status: StatusCode,
    errors: &BTreeMap<&str, &str>,
    nombre: &str,
    email: &str,
) -> Response {
    let alerts: String = errors
        .values()
        .map(|m| format!("<p class=\"error\">{}</p>", escape_html(m)))
        .collect();

    page(
        status,
        "Registrarse",
        &format!(
            "<h1>Registrarse</h1>{alerts}\
             <form method=\"post\" action=\"register\">\
             <label>Nombre <input type=\"text\" name=\"nombre\" value=\"{}\"></label>\
             <label>Email <input type=\"email\" name=\"email\" value=\"{}\"></label>\
             <label>Contraseña <input type=\"password\" name=\"password\"></label>\
             <label>Repetir contraseña <input type=\"password\" name=\"password_confirmation\"></label>\
             <label>Rol <select name=\"rol_id\"><option value=\"3\">Atleta</option>\
             <option value=\"2\">Evaluador</option></select></label>\
             <button type=\"submit\">Crear cuenta</button></form>",
            escape_html(nombre),
            escape_html(email)
        ),
    )
}

// Only same-site paths are followed after login.
fn safe_target(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !raw.starts_with('/') || raw.starts_with("//") || raw.contains('\\') {
        return None;
    }
    Some(raw.trim_start_matches('/').to_owned())
}

fn form(status: StatusCode, target: Option<&str>, message: Option<&str>, email: &str) -> Response {
    let alert = message
        .map(|m| format!("<p class=\"error\">{}</p>", escape_html(m)))
        .unwrap_or_default();
    let hidden = target
        .map(|t| {
            format!(
                "<input type=\"hidden\" name=\"redirect\" value=\"/{}\">",
                escape_html(t)
            )
        })
        .unwrap_or_default();

    page(
        status,
        "Iniciar sesión",
        &format!(
            "<h1>Iniciar sesión</h1>{alert}\
             <form method=\"post\" action=\"login\">{hidden}\
             <label>Email <input type=\"email\" name=\"email\" value=\"{}\"></label>\
             <label>Contraseña <input type=\"password\" name=\"password\"></label>\
             <button type=\"submit\">Ingresar</button></form>",
            escape_html(email)
        ),
    )
}
