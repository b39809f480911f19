//! The route table.
//!
//! Browser pages sit at the root and under `admin/`; the JSON API lives under
//! `api/` behind the `api` (CORS) middleware. API routes that browsers may
//! preflight also answer `OPTIONS`.

use crate::models::rol;
use crate::router::{RouteError, Router};

pub fn define(router: &mut Router) -> Result<(), RouteError> {
    // Authentication
    router.add("login", "AuthController@login", "GET|POST", &[])?;
    router.add("logout", "AuthController@logout", "GET|POST", &[])?;
    router.add("register", "AuthController@register", "GET|POST", &[])?;

    router.add("", "DashboardController@index", "GET", &["auth"])?;

    let admin_only = format!("role:{}", rol::ADMINISTRADOR);
    router.group(
        "admin",
        |r| {
            r.add("zonas", "Admin\\ZonaController@index", "GET", &[])?;
            r.add("zonas/create", "Admin\\ZonaController@create", "POST", &[])?;
            r.add("zonas/edit/{id}", "Admin\\ZonaController@edit", "POST", &[])?;
            r.add("zonas/delete/{id}", "Admin\\ZonaController@delete", "POST", &[])?;
            r.add("centros", "Admin\\CentroController@index", "GET", &[])?;
            r.add("centros/create", "Admin\\CentroController@create", "POST", &[])?;
            r.add("centros/edit/{id}", "Admin\\CentroController@edit", "POST", &[])?;
            r.add("centros/delete/{id}", "Admin\\CentroController@delete", "POST", &[])?;
            Ok(())
        },
        &["auth", admin_only.as_str()],
    )?;

    let evaluator_only = format!("role:{}", rol::EVALUADOR);
    router.group(
        "api",
        |r| {
            r.add("login", "Api\\AuthController@login", "POST|OPTIONS", &[])?;
            r.add("logout", "Api\\AuthController@logout", "POST|OPTIONS", &["auth"])?;

            r.add("centros", "Api\\CentroController@index", "GET|OPTIONS", &["auth"])?;
            r.add("atletas", "Api\\AtletaController@index", "GET|OPTIONS", &["auth"])?;
            r.add("atletas/ver/{id}", "Api\\AtletaController@view", "GET|OPTIONS", &["auth"])?;
            r.add("pruebas", "Api\\PruebaController@index", "GET|OPTIONS", &["auth"])?;

            r.add(
                "resultados/guardar",
                "Api\\ResultadoController@store",
                "POST|OPTIONS",
                &["auth", evaluator_only.as_str()],
            )?;
            r.add(
                "resultados/exportar",
                "Api\\ResultadoController@export",
                "GET|OPTIONS",
                &["auth", evaluator_only.as_str()],
            )?;
            Ok(())
        },
        &["api"],
    )?;

    router.add("404", "ErrorController@notFound", "GET", &[])?;
    router.add("403", "ErrorController@forbidden", "GET", &[])?;
    router.add("500", "ErrorController@serverError", "GET", &[])?;
    Ok(())
}
