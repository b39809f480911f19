use crate::database::{Database, Model, Record};

pub const ADMINISTRADOR: &str = "Administrador";
pub const EVALUADOR: &str = "Evaluador";
pub const ATLETA: &str = "Atleta";

pub static ROL: Model = Model::new("roles", "id").with_fillable(&["nombre", "descripcion"]);

pub fn find_by_name(db: &mut Database, nombre: &str) -> Option<Record> {
    ROL.query().where_eq("nombre", nombre).first(db)
}
