use crate::database::{Database, Model, Record};

pub static ZONA: Model =
    Model::new("zonas", "id").with_fillable(&["nombre", "descripcion", "activa"]);

pub fn activas(db: &mut Database) -> Vec<Record> {
    ZONA.query().where_eq("activa", true).get(db)
}
