//! Administration of zones and centers. Every route of the `admin` group is
//! restricted to administrators by its group middleware.

use serde_json::{Map, Value as Json};
use tracing::info;

use crate::context::Context;
use crate::controller::{collection, error, success};
use crate::database::{Direction, Operator, Record, Value};
use crate::models::{centro::CENTRO, evaluador::EVALUADOR, sesion::SESION, zona::ZONA};
use crate::router::{Args, Router};
use crate::{Response, StatusCode};

pub(super) fn register(router: &mut Router) {
    router.action("Admin\\ZonaController@index", zonas);
    router.action("Admin\\ZonaController@create", crear_zona);
    router.action("Admin\\ZonaController@edit", editar_zona);
    router.action("Admin\\ZonaController@delete", eliminar_zona);
    router.action("Admin\\CentroController@index", centros);
    router.action("Admin\\CentroController@create", crear_centro);
    router.action("Admin\\CentroController@edit", editar_centro);
    router.action("Admin\\CentroController@delete", eliminar_centro);
}

// Body fields, with the `flag` checkbox normalized to 0/1 and blank foreign
// keys to NULL.
fn admin_input(ctx: &Context, flag: &str) -> Vec<(String, Value)> {
    ctx.request()
        .inputs()
        .into_iter()
        .map(|(key, value)| {
            if key == flag {
                let on = value.as_bool() && value.as_str().is_none_or(|s| s != "false" && s != "off");
                (key, Value::from(on))
            } else if key.ends_with("_id") && value.as_str().is_some_and(|s| s.trim().is_empty()) {
                (key, Value::Null)
            } else {
                (key, value)
            }
        })
        .collect()
}

fn require_nombre(record: &Record, errors: &mut Map<String, Json>) {
    if record.get("nombre").to_string().trim().is_empty() {
        errors.insert("nombre".to_owned(), Json::from("El nombre es obligatorio"));
    }
}

fn validate_zona(record: &Record) -> Option<Json> {
    let mut errors = Map::new();
    require_nombre(record, &mut errors);
    (!errors.is_empty()).then_some(Json::Object(errors))
}

fn validate_centro(ctx: &mut Context, record: &Record) -> Option<Json> {
    let mut errors = Map::new();
    require_nombre(record, &mut errors);
    let zona = record.get("zona_id");
    if !zona.is_null() && zona.as_i64().and_then(|id| ZONA.find(ctx.db(), id)).is_none() {
        errors.insert("zona_id".to_owned(), Json::from("La zona no existe"));
    }
    (!errors.is_empty()).then_some(Json::Object(errors))
}

fn find_zona(ctx: &mut Context, args: &Args) -> Option<Record> {
    let id = args.int(0)?;
    ZONA.find(ctx.db(), id)
}

fn find_centro(ctx: &mut Context, args: &Args) -> Option<Record> {
    let id = args.int(0)?;
    CENTRO.find(ctx.db(), id)
}

/// Sort direction from `?orden=`; ascending unless asked otherwise.
fn orden(ctx: &Context) -> Direction {
    ctx.request().query_param("orden").map_or(Direction::Asc, Direction::parse)
}

// ── Zones ────────────────────────────────────────────────────────────────────

/// Every zone, active or not, by name.
pub fn zonas(ctx: &mut Context, _args: &Args) -> Response {
    let direction = orden(ctx);
    let zonas = ZONA.query().order_by("nombre", direction).get(ctx.db());
    success(Some(collection(&zonas, &[])), "", StatusCode::Ok)
}

pub fn crear_zona(ctx: &mut Context, _args: &Args) -> Response {
    let input = admin_input(ctx, "activa");
    let mut zona = ZONA.new_record();
    zona.fill_from(input.iter().map(|(k, v)| (k.as_str(), v.clone())));
    if let Some(errors) = validate_zona(&zona) {
        return error("Datos inválidos", StatusCode::UnprocessableEntity, Some(errors));
    }

    if !zona.save(ctx.db()) {
        return error("No se pudo crear la zona", StatusCode::InternalServerError, None);
    }
    info!(id = %zona.key(), "zone created");
    success(Some(zona.to_json()), "Zona creada", StatusCode::Created)
}

pub fn editar_zona(ctx: &mut Context, args: &Args) -> Response {
    let Some(mut zona) = find_zona(ctx, args) else {
        return error("Zona no encontrada", StatusCode::NotFound, None);
    };
    let input = admin_input(ctx, "activa");
    zona.fill_from(input.iter().map(|(k, v)| (k.as_str(), v.clone())));
    if let Some(errors) = validate_zona(&zona) {
        return error("Datos inválidos", StatusCode::UnprocessableEntity, Some(errors));
    }

    let changed: Vec<String> = zona.get_dirty().into_keys().collect();
    if !zona.save(ctx.db()) {
        return error("No se pudo actualizar la zona", StatusCode::InternalServerError, None);
    }
    info!(id = %zona.key(), ?changed, "zone updated");
    success(Some(zona.to_json()), "Zona actualizada", StatusCode::Ok)
}

pub fn eliminar_zona(ctx: &mut Context, args: &Args) -> Response {
    let Some(mut zona) = find_zona(ctx, args) else {
        return error("Zona no encontrada", StatusCode::NotFound, None);
    };
    let centros = CENTRO.query().where_eq("zona_id", zona.key()).count(ctx.db());
    if centros > 0 {
        return error("La zona tiene centros asignados", StatusCode::UnprocessableEntity, None);
    }
    if !zona.delete(ctx.db()) {
        return error("No se pudo eliminar la zona", StatusCode::InternalServerError, None);
    }
    info!(id = %zona.key(), "zone deleted");
    success(None, "Zona eliminada", StatusCode::Ok)
}

// ── Centers ──────────────────────────────────────────────────────────────────

/// Centers with their zone name, optionally of one zone (`?zona_id=`).
pub fn centros(ctx: &mut Context, _args: &Args) -> Response {
    let zona = ctx.request().query_param("zona_id").and_then(|z| z.parse::<i64>().ok());
    let mut query = CENTRO
        .query()
        .select(&["centros.*", "zonas.nombre AS zona_nombre"])
        .left_join("zonas", "zonas.id", Operator::Eq, "centros.zona_id")
        .order_by("centros.nombre", orden(ctx));
    if let Some(zona) = zona {
        query = query.where_eq("centros.zona_id", zona);
    }
    let centros = query.get(ctx.db());
    success(Some(collection(&centros, &[])), "", StatusCode::Ok)
}

pub fn crear_centro(ctx: &mut Context, _args: &Args) -> Response {
    let input = admin_input(ctx, "activo");
    let mut centro = CENTRO.new_record();
    centro.fill_from(input.iter().map(|(k, v)| (k.as_str(), v.clone())));
    if let Some(errors) = validate_centro(ctx, &centro) {
        return error("Datos inválidos", StatusCode::UnprocessableEntity, Some(errors));
    }

    if !centro.save(ctx.db()) {
        return error("No se pudo crear el centro", StatusCode::InternalServerError, None);
    }
    info!(id = %centro.key(), "center created");
    success(Some(centro.to_json()), "Centro creado", StatusCode::Created)
}

pub fn editar_centro(ctx: &mut Context, args: &Args) -> Response {
    let Some(mut centro) = find_centro(ctx, args) else {
        return error("Centro no encontrado", StatusCode::NotFound, None);
    };
    let input = admin_input(ctx, "activo");
    centro.fill_from(input.iter().map(|(k, v)| (k.as_str(), v.clone())));
    if let Some(errors) = validate_centro(ctx, &centro) {
        return error("Datos inválidos", StatusCode::UnprocessableEntity, Some(errors));
    }

    let changed: Vec<String> = centro.get_dirty().into_keys().collect();
    if !centro.save(ctx.db()) {
        return error("No se pudo actualizar el centro", StatusCode::InternalServerError, None);
    }
    info!(id = %centro.key(), ?changed, "center updated");
    success(Some(centro.to_json()), "Centro actualizado", StatusCode::Ok)
}

/// Refused while evaluators or sessions still reference the center.
pub fn eliminar_centro(ctx: &mut Context, args: &Args) -> Response {
    let Some(mut centro) = find_centro(ctx, args) else {
        return error("Centro no encontrado", StatusCode::NotFound, None);
    };
    let db = ctx.db();
    let evaluadores = EVALUADOR.query().where_eq("centro_id", centro.key()).count(db);
    let sesiones = SESION.query().where_eq("centro_id", centro.key()).count(db);
    if evaluadores + sesiones > 0 {
        return error("El centro tiene evaluadores o sesiones asignados", StatusCode::UnprocessableEntity, None);
    }
    if !centro.delete(db) {
        return error("No se pudo eliminar el centro", StatusCode::InternalServerError, None);
    }
    info!(id = %centro.key(), "center deleted");
    success(None, "Centro eliminado", StatusCode::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context_from;
    use crate::session::SessionStore;
    use std::time::Duration;

    fn form(method: &str, path: &str, body: &str) -> Context {
        let raw = format!(
            "{method} {path} HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        context_from(raw.as_bytes(), SessionStore::new(Duration::from_secs(60)))
    }

    fn body(res: &Response) -> Json {
        serde_json::from_slice(res.content()).unwrap()
    }

    fn id(value: i64) -> Args {
        Args::new(vec![Some(value.to_string())])
    }

    #[test]
    fn create_ignores_unfillable_fields() {
        let mut ctx = form("POST", "/admin/zonas/create", "nombre=Norte&id=99&activa=1");
        let res = crear_zona(&mut ctx, &Args::default());
        assert_eq!(res.status(), StatusCode::Created);
        let data = body(&res)["data"].clone();
        assert_eq!(data["nombre"], "Norte");
        assert_eq!(data["id"], 1);
    }

    #[test]
    fn create_requires_name() {
        let mut ctx = form("POST", "/admin/zonas/create", "descripcion=x");
        let res = crear_zona(&mut ctx, &Args::default());
        assert_eq!(res.status(), StatusCode::UnprocessableEntity);
        assert!(body(&res)["errors"].get("nombre").is_some());
    }

    #[test]
    fn edit_updates_only_changed_columns() {
        let mut ctx = form("POST", "/admin/zonas/edit/1", "descripcion=Zona+norte&activa=off");
        ZONA.create(ctx.db(), [("nombre", Value::from("Norte"))]).unwrap();

        let res = editar_zona(&mut ctx, &id(1));
        assert_eq!(res.status(), StatusCode::Ok);
        let stored = ZONA.find(ctx.db(), 1).unwrap();
        assert_eq!(stored.get("nombre"), Value::from("Norte"));
        assert_eq!(stored.get("descripcion"), Value::from("Zona norte"));
        assert_eq!(stored.get("activa"), Value::Integer(0));
    }

    #[test]
    fn edit_and_delete_unknown_zone_is_404() {
        let mut ctx = form("POST", "/admin/zonas/edit/7", "nombre=X");
        assert_eq!(editar_zona(&mut ctx, &id(7)).status(), StatusCode::NotFound);
        assert_eq!(eliminar_zona(&mut ctx, &id(7)).status(), StatusCode::NotFound);
    }

    #[test]
    fn delete_refuses_zone_with_centers() {
        let mut ctx = form("POST", "/admin/zonas/delete/1", "");
        let db = ctx.db();
        ZONA.create(db, [("nombre", Value::from("Norte"))]).unwrap();
        ZONA.create(db, [("nombre", Value::from("Sur"))]).unwrap();
        db.insert("centros", &[("nombre", "Club".into()), ("zona_id", 1.into())]).unwrap();

        assert_eq!(eliminar_zona(&mut ctx, &id(1)).status(), StatusCode::UnprocessableEntity);
        assert_eq!(eliminar_zona(&mut ctx, &id(2)).status(), StatusCode::Ok);
        assert!(ZONA.find(ctx.db(), 2).is_none());
    }

    #[test]
    fn delete_counts_inactive_centers_too() {
        let mut ctx = form("POST", "/admin/zonas/delete/1", "");
        let db = ctx.db();
        ZONA.create(db, [("nombre", Value::from("Norte"))]).unwrap();
        db.insert(
            "centros",
            &[("nombre", "Cerrado".into()), ("zona_id", 1.into()), ("activo", 0.into())],
        )
        .unwrap();

        let res = eliminar_zona(&mut ctx, &id(1));
        assert_eq!(res.status(), StatusCode::UnprocessableEntity);
        assert_eq!(body(&res)["message"], "La zona tiene centros asignados");
        assert!(ZONA.find(ctx.db(), 1).is_some());
    }

    #[test]
    fn zonas_sort_by_requested_direction() {
        let mut ctx = form("GET", "/admin/zonas?orden=desc", "");
        for nombre in ["Centro", "Sur", "Norte"] {
            ZONA.create(ctx.db(), [("nombre", Value::from(nombre))]).unwrap();
        }
        let data = body(&zonas(&mut ctx, &Args::default()))["data"].clone();
        let nombres: Vec<&str> = data.as_array().unwrap().iter().map(|z| z["nombre"].as_str().unwrap()).collect();
        assert_eq!(nombres, ["Sur", "Norte", "Centro"]);
    }

    // ── Centers ──────────────────────────────────────────────────────────────

    #[test]
    fn create_centro_checks_zone() {
        let mut ctx = form("POST", "/admin/centros/create", "nombre=Club&zona_id=9&activo=1");
        let res = crear_centro(&mut ctx, &Args::default());
        assert_eq!(res.status(), StatusCode::UnprocessableEntity);
        assert!(body(&res)["errors"].get("zona_id").is_some());

        let mut ctx = form("POST", "/admin/centros/create", "nombre=Club&zona_id=&activo=1");
        let res = crear_centro(&mut ctx, &Args::default());
        assert_eq!(res.status(), StatusCode::Created);
        assert!(body(&res)["data"]["zona_id"].is_null());
        assert_eq!(CENTRO.query().count(ctx.db()), 1);
    }

    #[test]
    fn edit_centro_moves_it_to_another_zone() {
        let mut ctx = form("POST", "/admin/centros/edit/1", "zona_id=2&activo=off");
        let db = ctx.db();
        ZONA.create(db, [("nombre", Value::from("Norte"))]).unwrap();
        ZONA.create(db, [("nombre", Value::from("Sur"))]).unwrap();
        CENTRO
            .create(db, [("nombre", Value::from("Club")), ("zona_id", Value::from(1))])
            .unwrap();

        let res = editar_centro(&mut ctx, &id(1));
        assert_eq!(res.status(), StatusCode::Ok);
        let stored = CENTRO.find(ctx.db(), 1).unwrap();
        assert_eq!(stored.get("zona_id"), Value::Integer(2));
        assert_eq!(stored.get("activo"), Value::Integer(0));
        assert_eq!(stored.get("nombre"), Value::from("Club"));
        assert_eq!(editar_centro(&mut ctx, &id(5)).status(), StatusCode::NotFound);
    }

    #[test]
    fn delete_centro_refuses_while_referenced() {
        let mut ctx = form("POST", "/admin/centros/delete/1", "");
        let db = ctx.db();
        CENTRO.create(db, [("nombre", Value::from("Club"))]).unwrap();
        CENTRO.create(db, [("nombre", Value::from("Vacío"))]).unwrap();
        db.insert(
            "evaluadores",
            &[("nombre", "Eva".into()), ("apellido", "Ruiz".into()), ("centro_id", 1.into())],
        )
        .unwrap();

        assert_eq!(eliminar_centro(&mut ctx, &id(1)).status(), StatusCode::UnprocessableEntity);
        assert_eq!(eliminar_centro(&mut ctx, &id(2)).status(), StatusCode::Ok);
        assert!(CENTRO.find(ctx.db(), 2).is_none());
        assert_eq!(eliminar_centro(&mut ctx, &id(2)).status(), StatusCode::NotFound);
    }

    #[test]
    fn centros_include_zone_name() {
        let mut ctx = form("GET", "/admin/centros", "");
        let db = ctx.db();
        ZONA.create(db, [("nombre", Value::from("Norte"))]).unwrap();
        db.insert("centros", &[("nombre", "Club".into()), ("zona_id", 1.into())]).unwrap();
        db.insert("centros", &[("nombre", "Sin zona".into())]).unwrap();

        let data = body(&centros(&mut ctx, &Args::default()))["data"].clone();
        assert_eq!(data.as_array().unwrap().len(), 2);
        assert_eq!(data[0]["zona_nombre"], "Norte");
        assert_eq!(data[1]["zona_nombre"], Json::Null);
    }
}
