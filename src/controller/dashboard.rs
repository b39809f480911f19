//! `DashboardController`: the landing page after login, summarized per role.

use chrono::{Local, NaiveDate};
use serde_json::{Value as Json, json};

use crate::context::Context;
use crate::controller::{collection, escape_html, page, redirect, success};
use crate::database::{Database, Record};
use crate::models::{atleta, centro::CENTRO, evaluador, resultado::RESULTADO, sesion, zona::ZONA};
use crate::router::{Args, Router};
use crate::session::COOKIE_NAME;
use crate::{Response, StatusCode};

/// Upcoming sessions listed on the evaluator dashboard.
const PROXIMAS_LIMIT: u64 = 5;

pub(super) fn register(router: &mut Router) {
    router.action("DashboardController@index", index);
}

pub fn index(ctx: &mut Context, _args: &Args) -> Response {
    let Some(user) = ctx.user() else {
        // The session outlived its user row.
        ctx.logout();
        return redirect(ctx, "login").expire_cookie(COOKIE_NAME);
    };

    let role = ctx.role().unwrap_or_default().to_owned();
    let (admin, evaluator) = (ctx.is_admin(), ctx.is_evaluator());
    let today = Local::now().date_naive();
    let db = ctx.db();

    let nombre = crate::models::usuario::full_name(db, &user);
    let resumen = if admin {
        admin_summary(db)
    } else if evaluator {
        evaluator_summary(db, &user, today)
    } else {
        athlete_summary(db, &user)
    };

    if ctx.wants_json() {
        let data = json!({ "nombre": nombre, "rol": role, "resumen": resumen });
        return success(Some(data), "", StatusCode::Ok);
    }

    let items: String = resumen
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(_, v)| !v.is_array() && !v.is_object())
        .map(|(k, v)| format!("<li>{}: {}</li>", escape_html(k), escape_html(&plain(v))))
        .collect();
    page(
        StatusCode::Ok,
        "Inicio",
        &format!(
            "<h1>Hola, {}</h1><p>{}</p><ul>{items}</ul>",
            escape_html(&nombre),
            escape_html(&role)
        ),
    )
}

fn plain(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

fn admin_summary(db: &mut Database) -> Json {
    json!({
        "zonas": ZONA.query().count(db),
        "centros": CENTRO.query().count(db),
        "evaluadores": evaluador::EVALUADOR.query().count(db),
        "atletas": atleta::ATLETA.query().count(db),
    })
}

fn evaluator_summary(db: &mut Database, user: &Record, today: NaiveDate) -> Json {
    let perfil = user
        .key()
        .as_i64()
        .and_then(|id| evaluador::find_by_usuario(db, id))
        .and_then(|p| p.key().as_i64());
    let Some(perfil) = perfil else {
        return json!({ "atletas": 0, "sesiones": 0, "proximas": [] });
    };

    let atletas = atleta::by_evaluador(db, perfil).len();
    let sesiones = sesion::by_evaluador(db, perfil);
    let proximas = sesion::proximas(db, today, Some(perfil), PROXIMAS_LIMIT);

    json!({
        "atletas": atletas,
        "sesiones": sesiones.len(),
        "pendientes": sesiones.iter().filter(|s| sesion::is_pendiente(s)).count(),
        "completadas": sesiones.iter().filter(|s| sesion::is_completada(s)).count(),
        "proximas": collection(&proximas, &["fecha_formateada", "horario"]),
    })
}

fn athlete_summary(db: &mut Database, user: &Record) -> Json {
    let perfil = user.key().as_i64().and_then(|id| atleta::find_by_usuario(db, id));
    let Some(perfil) = perfil else {
        return json!({ "resultados": 0 });
    };
    let resultados = RESULTADO
        .query()
        .where_eq("atleta_id", perfil.key())
        .count(db);

    json!({
        "perfil": perfil.to_json_with(&["nombre_completo", "edad", "imc"]),
        "edad": perfil.get("edad"),
        "resultados": resultados,
    })
}
