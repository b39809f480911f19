use crate::database::{Accessor, Database, Model, Record};

pub static EVALUADOR: Model = Model::new("evaluadores", "id")
    .with_fillable(&[
        "usuario_id",
        "nombre",
        "apellido",
        "dni",
        "domicilio",
        "telefono",
        "email",
        "centro_id",
        "activo",
    ])
    .with_accessors(&[("nombre_completo", super::nombre_completo as Accessor)]);

pub fn find_by_dni(db: &mut Database, dni: &str) -> Option<Record> {
    EVALUADOR.query().where_eq("dni", dni).first(db)
}

/// The evaluator profile linked to a user account.
pub fn find_by_usuario(db: &mut Database, usuario_id: i64) -> Option<Record> {
    EVALUADOR.query().where_eq("usuario_id", usuario_id).first(db)
}

pub fn activos(db: &mut Database) -> Vec<Record> {
    EVALUADOR.query().where_eq("activo", true).get(db)
}
