//! The JSON API under `api/`: login, reference data, athletes and results.

use serde_json::{Map, Value as Json, json};
use tracing::{info, warn};

use crate::context::Context;
use crate::controller::{collection, error, required_id, success};
use crate::database::{Record, Value};
use crate::models::{atleta, centro, evaluador, prueba, resultado, usuario};
use crate::router::{Args, Router};
use crate::security::{self, Resource};
use crate::session::COOKIE_NAME;
use crate::{Response, StatusCode};

/// Computed attributes included with every athlete.
const ATLETA_COMPUTED: &[&str] = &["nombre_completo", "edad", "imc"];

/// Columns of the results export, in CSV order, with their header labels.
const EXPORT_COLUMNS: &[(&str, &str)] = &[
    ("fecha", "Fecha"),
    ("sesion", "Sesión"),
    ("dni", "DNI"),
    ("apellido", "Apellido"),
    ("nombre", "Nombre"),
    ("prueba", "Prueba"),
    ("unidad", "Unidad"),
    ("valor_izquierdo", "Izquierdo"),
    ("valor_derecho", "Derecho"),
    ("valor_promedio", "Promedio"),
];

pub(super) fn register(router: &mut Router) {
    router.action("Api\\AuthController@login", login);
    router.action("Api\\AuthController@logout", logout);
    router.action("Api\\CentroController@index", centros);
    router.action("Api\\AtletaController@index", atletas);
    router.action("Api\\AtletaController@view", ver_atleta);
    router.action("Api\\PruebaController@index", pruebas);
    router.action("Api\\ResultadoController@store", guardar_resultado);
    router.action("Api\\ResultadoController@export", exportar_resultados);
}

// ── Authentication ───────────────────────────────────────────────────────────

pub fn login(ctx: &mut Context, _args: &Args) -> Response {
    let email = ctx.request().input("email").unwrap_or_default().trim().to_owned();
    let password = ctx.request().input("password").unwrap_or_default();

    let mut errors = Map::new();
    if email.is_empty() {
        errors.insert("email".to_owned(), Json::from("El email es obligatorio"));
    }
    if password.is_empty() {
        errors.insert("password".to_owned(), Json::from("La contraseña es obligatoria"));
    }
    if !errors.is_empty() {
        return error("Datos incompletos", StatusCode::UnprocessableEntity, Some(Json::Object(errors)));
    }

    let Some(user) = security::attempt(ctx.db(), &email, &password) else {
        return error("Credenciales inválidas", StatusCode::Unauthorized, None);
    };
    let Some(id) = user.key().as_i64() else {
        return error("Usuario inválido", StatusCode::InternalServerError, None);
    };

    let token = ctx.login(id, &user.get("rol").to_string());
    let nombre = usuario::full_name(ctx.db(), &user);
    success(
        Some(json!({ "usuario": user.to_json(), "nombre": nombre })),
        "Sesión iniciada",
        StatusCode::Ok,
    )
    .cookie(COOKIE_NAME, &token)
}

pub fn logout(ctx: &mut Context, _args: &Args) -> Response {
    ctx.logout();
    success(None, "Sesión cerrada", StatusCode::Ok).expire_cookie(COOKIE_NAME)
}

// ── Reference data ───────────────────────────────────────────────────────────

/// Active centers, optionally of one zone (`?zona_id=`).
pub fn centros(ctx: &mut Context, _args: &Args) -> Response {
    let zona = ctx.request().query_param("zona_id").and_then(|z| z.parse::<i64>().ok());
    let db = ctx.db();
    let centros = match zona {
        Some(zona) => centro::by_zona(db, zona),
        None => centro::activos(db),
    };
    success(Some(collection(&centros, &[])), "", StatusCode::Ok)
}

/// Active tests, optionally of one type (`?tipo=`), plus the known types.
pub fn pruebas(ctx: &mut Context, _args: &Args) -> Response {
    let tipo = ctx.request().query_param("tipo").map(str::to_owned);
    let db = ctx.db();
    let pruebas = match tipo.as_deref() {
        Some(tipo) => prueba::by_tipo(db, tipo),
        None => prueba::activas(db),
    };
    let tipos: Map<String, Json> = prueba::tipos()
        .iter()
        .map(|(clave, nombre)| ((*clave).to_owned(), Json::from(*nombre)))
        .collect();

    success(
        Some(json!({ "pruebas": collection(&pruebas, &[]), "tipos": tipos })),
        "",
        StatusCode::Ok,
    )
}

// ── Athletes ─────────────────────────────────────────────────────────────────

/// The athletes visible to the caller: all active ones for administrators,
/// the assigned ones for evaluators, the own profile for athletes.
pub fn atletas(ctx: &mut Context, _args: &Args) -> Response {
    let user_id = ctx.user_id().unwrap_or_default();
    let (admin, evaluator) = (ctx.is_admin(), ctx.is_evaluator());
    let db = ctx.db();

    let atletas = if admin {
        atleta::activos(db)
    } else if evaluator {
        match evaluador::find_by_usuario(db, user_id).and_then(|p| p.key().as_i64()) {
            Some(perfil) => atleta::by_evaluador(db, perfil),
            None => Vec::new(),
        }
    } else {
        atleta::find_by_usuario(db, user_id).into_iter().collect()
    };

    success(Some(collection(&atletas, ATLETA_COMPUTED)), "", StatusCode::Ok)
}

/// One athlete with their recorded results.
pub fn ver_atleta(ctx: &mut Context, args: &Args) -> Response {
    let Some(id) = args.int(0) else {
        return error("Atleta no encontrado", StatusCode::NotFound, None);
    };
    let Some(found) = atleta::ATLETA.find(ctx.db(), id) else {
        return error("Atleta no encontrado", StatusCode::NotFound, None);
    };
    if !security::can_access(ctx, Resource::Atleta, id) {
        return error("No autorizado", StatusCode::Forbidden, None);
    }

    let resultados = resultado::RESULTADO.query().where_eq("atleta_id", id).get(ctx.db());
    let mut data = found.to_json_with(ATLETA_COMPUTED);
    if let Json::Object(map) = &mut data {
        map.insert("resultados".to_owned(), collection(&resultados, &["valor_final"]));
    }
    success(Some(data), "", StatusCode::Ok)
}

// ── Results ──────────────────────────────────────────────────────────────────

// Optional numeric input; present but unparseable values are reported.
fn optional_number(ctx: &Context, key: &str, errors: &mut Map<String, Json>) -> Option<f64> {
    let raw = ctx.request().input(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            errors.insert(key.to_owned(), Json::from(format!("El campo {key} debe ser numérico")));
            None
        }
    }
}

/// Records or replaces the result of one test for one athlete in a session.
///
/// Answers `201` when a new result is stored and `200` when an existing one
/// is updated. The average is recomputed from whichever sides are present.
pub fn guardar_resultado(ctx: &mut Context, _args: &Args) -> Response {
    let mut errors = Map::new();
    let sesion_id = required_id(ctx, "sesion_id", &mut errors);
    let atleta_id = required_id(ctx, "atleta_id", &mut errors);
    let prueba_id = required_id(ctx, "prueba_id", &mut errors);
    let izquierdo = optional_number(ctx, "valor_izquierdo", &mut errors);
    let derecho = optional_number(ctx, "valor_derecho", &mut errors);
    let observaciones = ctx.request().input("observaciones");

    if izquierdo.is_none() && derecho.is_none() && errors.is_empty() {
        errors.insert("valor".to_owned(), Json::from("Debe informar al menos un valor"));
    }
    let (Some(sesion_id), Some(atleta_id), Some(prueba_id)) = (sesion_id, atleta_id, prueba_id) else {
        return error("Datos inválidos", StatusCode::UnprocessableEntity, Some(Json::Object(errors)));
    };
    if !errors.is_empty() {
        return error("Datos inválidos", StatusCode::UnprocessableEntity, Some(Json::Object(errors)));
    }

    if !security::can_access(ctx, Resource::Sesion, sesion_id)
        || !security::can_access(ctx, Resource::Atleta, atleta_id)
    {
        return error("No autorizado", StatusCode::Forbidden, None);
    }

    let db = ctx.db();
    if prueba::PRUEBA.find(db, prueba_id).is_none() {
        let errors = json!({ "prueba_id": "La prueba no existe" });
        return error("Datos inválidos", StatusCode::UnprocessableEntity, Some(errors));
    }

    let existing = resultado::find_existing(db, sesion_id, atleta_id, prueba_id);
    let created = existing.is_none();
    let mut record: Record = existing.unwrap_or_else(|| resultado::RESULTADO.new_record());
    record
        .set("sesion_id", sesion_id)
        .set("atleta_id", atleta_id)
        .set("prueba_id", prueba_id)
        .set("valor_izquierdo", izquierdo)
        .set("valor_derecho", derecho)
        .set("valor_promedio", Value::Null);
    if let Some(observaciones) = observaciones {
        record.set("observaciones", observaciones);
    }
    resultado::calcular_promedio(&mut record);

    if !record.save(db) {
        warn!(sesion_id, atleta_id, prueba_id, error = ?db.last_error(), "result not saved");
        return error("No se pudo guardar el resultado", StatusCode::InternalServerError, None);
    }
    info!(sesion_id, atleta_id, prueba_id, created, "result saved");

    let status = if created { StatusCode::Created } else { StatusCode::Ok };
    success(Some(record.to_json_with(&["valor_final"])), "Resultado guardado", status)
}

/// The caller's results as a CSV attachment.
pub fn exportar_resultados(ctx: &mut Context, _args: &Args) -> Response {
    let admin = ctx.is_admin();
    let user_id = ctx.user_id().unwrap_or_default();
    let db = ctx.db();

    let evaluador_id = if admin {
        None
    } else {
        match evaluador::find_by_usuario(db, user_id).and_then(|p| p.key().as_i64()) {
            Some(id) => Some(id),
            None => return error("Perfil de evaluador no encontrado", StatusCode::Forbidden, None),
        }
    };

    let rows = resultado::exportables(db, evaluador_id);
    Response::new(StatusCode::Ok)
        .header("Content-Type", "text/csv; charset=utf-8")
        .header("Content-Disposition", "attachment; filename=\"resultados.csv\"")
        .body(to_csv(&rows))
}

fn to_csv(rows: &[Record]) -> String {
    let mut out = String::new();
    let header: Vec<String> = EXPORT_COLUMNS.iter().map(|(_, label)| csv_field(label)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for row in rows {
        let fields: Vec<String> = EXPORT_COLUMNS
            .iter()
            .map(|(column, _)| csv_field(&row.get(column).to_string()))
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

// Quotes fields holding separators, quotes or line breaks.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context_from;
    use crate::database::Database;
    use crate::models::rol;
    use crate::security::hash;
    use crate::session::{Session, SessionStore};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    // Users: 1 admin, 2 evaluator (profile 1), 3 athlete (profile of atleta 1).
    fn seed(db: &mut Database) {
        for (nombre, email, rol_id) in [
            ("admin", "admin@example.com", 1),
            ("eva", "eva@example.com", 2),
            ("ana", "ana@example.com", 3),
        ] {
            db.insert(
                "usuarios",
                &[
                    ("nombre", nombre.into()),
                    ("email", email.into()),
                    ("password", hash::make("secreto").into()),
                    ("rol_id", Value::from(rol_id)),
                ],
            )
            .unwrap();
        }
        db.insert("evaluadores", &[("usuario_id", 2.into()), ("nombre", "Eva".into()), ("apellido", "Ruiz".into())])
            .unwrap();
        db.insert(
            "atletas",
            &[
                ("usuario_id", 3.into()),
                ("nombre", "Ana".into()),
                ("apellido", "Paz".into()),
                ("dni", "30111222".into()),
                ("evaluador_id", 1.into()),
            ],
        )
        .unwrap();
        db.insert("atletas", &[("nombre", "Otro".into()), ("apellido", "Atleta".into())]).unwrap();
        db.insert(
            "sesiones_evaluacion",
            &[("nombre", "Inicial".into()), ("fecha", "2026-03-01".into()), ("evaluador_id", 1.into())],
        )
        .unwrap();
        db.insert("pruebas", &[("nombre", "Salto, largo".into()), ("unidad_medida", "cm".into())]).unwrap();
    }

    fn request(method: &str, path: &str, session: Option<(i64, &str)>, json_body: Option<Json>) -> Context {
        let sessions = SessionStore::new(Duration::from_secs(60));
        let mut head = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n");
        if let Some((user_id, role)) = session {
            let token = sessions.create(Session::new(user_id, role));
            head.push_str(&format!("Cookie: {COOKIE_NAME}={token}\r\n"));
        }
        let body = json_body.map(|b| b.to_string()).unwrap_or_default();
        if !body.is_empty() {
            head.push_str(&format!(
                "Content-Type: application/json\r\nContent-Length: {}\r\n",
                body.len()
            ));
        }
        let raw = format!("{head}\r\n{body}");
        let mut ctx = context_from(raw.as_bytes(), sessions);
        seed(ctx.db());
        ctx
    }

    fn body(res: &Response) -> Json {
        serde_json::from_slice(res.content()).unwrap()
    }

    // ── login / logout ────────────────────────────────────────────────────────

    #[test]
    fn login_returns_user_without_password() {
        let payload = json!({ "email": "eva@example.com", "password": "secreto" });
        let mut ctx = request("POST", "/api/login", None, Some(payload));
        let res = login(&mut ctx, &Args::default());

        assert_eq!(res.status(), StatusCode::Ok);
        assert!(res.headers().get("set-cookie").is_some());
        let data = &body(&res)["data"];
        assert_eq!(data["nombre"], "Eva Ruiz");
        assert_eq!(data["usuario"]["rol"], rol::EVALUADOR);
        assert!(data["usuario"].get("password").is_none());
    }

    #[test]
    fn login_rejects_bad_input() {
        let mut ctx = request("POST", "/api/login", None, Some(json!({ "email": "eva@example.com" })));
        let res = login(&mut ctx, &Args::default());
        assert_eq!(res.status(), StatusCode::UnprocessableEntity);
        assert!(body(&res)["errors"].get("password").is_some());

        let payload = json!({ "email": "eva@example.com", "password": "mala" });
        let res = login(&mut request("POST", "/api/login", None, Some(payload)), &Args::default());
        assert_eq!(res.status(), StatusCode::Unauthorized);
    }

    #[test]
    fn logout_clears_session() {
        let mut ctx = request("POST", "/api/logout", Some((2, rol::EVALUADOR)), None);
        let res = logout(&mut ctx, &Args::default());
        assert_eq!(res.status(), StatusCode::Ok);
        assert!(!ctx.is_logged_in());
    }

    // ── listings ──────────────────────────────────────────────────────────────

    #[test]
    fn atletas_depend_on_role() {
        let count = |session| {
            let mut ctx = request("GET", "/api/atletas", Some(session), None);
            body(&atletas(&mut ctx, &Args::default()))["data"].as_array().unwrap().len()
        };
        assert_eq!(count((1, rol::ADMINISTRADOR)), 2);
        assert_eq!(count((2, rol::EVALUADOR)), 1);
        assert_eq!(count((3, rol::ATLETA)), 1);
    }

    #[test]
    fn atletas_carry_computed_attributes() {
        let mut ctx = request("GET", "/api/atletas", Some((2, rol::EVALUADOR)), None);
        let data = body(&atletas(&mut ctx, &Args::default()))["data"][0].clone();
        assert_eq!(data["nombre_completo"], "Ana Paz");
        assert!(data.get("imc").is_some());
    }

    #[test]
    fn ver_atleta_checks_ownership() {
        let view = |session, id: &str| {
            let mut ctx = request("GET", "/api/atletas/ver/x", Some(session), None);
            ver_atleta(&mut ctx, &Args::new(vec![Some(id.to_owned())])).status()
        };
        assert_eq!(view((2, rol::EVALUADOR), "1"), StatusCode::Ok);
        assert_eq!(view((2, rol::EVALUADOR), "2"), StatusCode::Forbidden);
        assert_eq!(view((3, rol::ATLETA), "2"), StatusCode::Forbidden);
        assert_eq!(view((1, rol::ADMINISTRADOR), "99"), StatusCode::NotFound);
        assert_eq!(view((1, rol::ADMINISTRADOR), "abc-1"), StatusCode::NotFound);
    }

    #[test]
    fn pruebas_include_types() {
        let mut ctx = request("GET", "/api/pruebas", Some((2, rol::EVALUADOR)), None);
        let data = body(&pruebas(&mut ctx, &Args::default()))["data"].clone();
        assert_eq!(data["pruebas"].as_array().unwrap().len(), 1);
        assert_eq!(data["tipos"]["fuerza"], "Fuerza");
    }

    // ── results ───────────────────────────────────────────────────────────────

    #[test]
    fn guardar_creates_then_updates() {
        let payload = json!({ "sesion_id": 1, "atleta_id": 1, "prueba_id": 1, "valor_izquierdo": 10, "valor_derecho": 12 });
        let mut ctx = request("POST", "/api/resultados/guardar", Some((2, rol::EVALUADOR)), Some(payload));
        let res = guardar_resultado(&mut ctx, &Args::default());
        assert_eq!(res.status(), StatusCode::Created);
        assert_eq!(body(&res)["data"]["valor_promedio"], 11.0);

        // Same triple again: the row is updated, not duplicated.
        let res = guardar_resultado(&mut ctx, &Args::default());
        assert_eq!(res.status(), StatusCode::Ok);
        let total = resultado::RESULTADO.query().count(ctx.db());
        assert_eq!(total, 1);
    }

    #[test]
    fn guardar_single_side_has_no_average() {
        let payload = json!({ "sesion_id": "1", "atleta_id": "1", "prueba_id": "1", "valor_derecho": "7,5" });
        let mut ctx = request("POST", "/api/resultados/guardar", Some((2, rol::EVALUADOR)), Some(payload));
        let data = body(&guardar_resultado(&mut ctx, &Args::default()))["data"].clone();
        assert_eq!(data["valor_derecho"], 7.5);
        assert_eq!(data["valor_promedio"], Json::Null);
        assert_eq!(data["valor_final"], 7.5);
    }

    #[test]
    fn guardar_validates_input() {
        let payload = json!({ "sesion_id": 1, "valor_izquierdo": "mucho" });
        let mut ctx = request("POST", "/api/resultados/guardar", Some((2, rol::EVALUADOR)), Some(payload));
        let res = guardar_resultado(&mut ctx, &Args::default());
        assert_eq!(res.status(), StatusCode::UnprocessableEntity);
        let errors = body(&res)["errors"].clone();
        assert!(errors.get("atleta_id").is_some());
        assert!(errors.get("valor_izquierdo").is_some());
    }

    #[test]
    fn guardar_refuses_foreign_athlete() {
        let payload = json!({ "sesion_id": 1, "atleta_id": 2, "prueba_id": 1, "valor_izquierdo": 1 });
        let mut ctx = request("POST", "/api/resultados/guardar", Some((2, rol::EVALUADOR)), Some(payload));
        assert_eq!(guardar_resultado(&mut ctx, &Args::default()).status(), StatusCode::Forbidden);
    }

    #[test]
    fn export_is_csv_with_quoted_fields() {
        let mut ctx = request("GET", "/api/resultados/exportar", Some((2, rol::EVALUADOR)), None);
        ctx.db()
            .insert(
                "resultados_pruebas",
                &[
                    ("sesion_id", 1.into()),
                    ("atleta_id", 1.into()),
                    ("prueba_id", 1.into()),
                    ("valor_izquierdo", 3.5.into()),
                ],
            )
            .unwrap();

        let res = exportar_resultados(&mut ctx, &Args::default());
        assert_eq!(res.headers().get("content-type"), Some("text/csv; charset=utf-8"));
        let text = std::str::from_utf8(res.content()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Fecha,Sesión,DNI,Apellido,Nombre,Prueba,Unidad,Izquierdo,Derecho,Promedio");
        assert_eq!(lines[1], "2026-03-01,Inicial,30111222,Paz,Ana,\"Salto, largo\",cm,3.5,,");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn export_without_profile_is_forbidden() {
        let mut ctx = request("GET", "/api/resultados/exportar", Some((1, rol::EVALUADOR)), None);
        assert_eq!(exportar_resultados(&mut ctx, &Args::default()).status(), StatusCode::Forbidden);
    }
}
