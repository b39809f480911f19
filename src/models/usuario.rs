//! User accounts. Every user has one role; evaluators and athletes also have a
//! profile row linked through `usuario_id`.

use crate::database::{Database, Model, Operator, Record};

use super::{atleta, evaluador, rol};

pub static USUARIO: Model = Model::new("usuarios", "id")
    .with_fillable(&["nombre", "email", "password", "rol_id"])
    .with_hidden(&["password", "remember_token"]);

// Every user column plus the role name as `rol`.
fn with_role() -> crate::database::QueryBuilder {
    USUARIO
        .query()
        .select(&["usuarios.*", "roles.nombre AS rol"])
        .left_join("roles", "roles.id", Operator::Eq, "usuarios.rol_id")
}

pub fn find_by_email(db: &mut Database, email: &str) -> Option<Record> {
    with_role().where_eq("usuarios.email", email).first(db)
}

/// The user with its role name loaded into `rol`.
pub fn find_with_role(db: &mut Database, id: i64) -> Option<Record> {
    with_role().where_eq("usuarios.id", id).first(db)
}

/// `true` if the user's role is one of `roles`. Needs `rol` loaded.
pub fn has_role(usuario: &Record, roles: &[&str]) -> bool {
    usuario
        .get("rol")
        .as_str()
        .is_some_and(|nombre| roles.iter().any(|r| *r == nombre))
}

/// The profile name for evaluators and athletes, else the account name.
pub fn full_name(db: &mut Database, usuario: &Record) -> String {
    let Some(id) = usuario.key().as_i64() else {
        return usuario.get("nombre").to_string();
    };

    let perfil = if has_role(usuario, &[rol::EVALUADOR]) {
        evaluador::find_by_usuario(db, id)
    } else if has_role(usuario, &[rol::ATLETA]) {
        atleta::find_by_usuario(db, id)
    } else {
        None
    };

    match perfil {
        Some(perfil) => perfil.get("nombre_completo").to_string(),
        None => usuario.get("nombre").to_string(),
    }
}
