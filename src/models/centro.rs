use crate::database::{Database, Model, Record};

pub static CENTRO: Model = Model::new("centros", "id").with_fillable(&[
    "nombre", "direccion", "zona_id", "telefono", "email", "activo",
]);

pub fn activos(db: &mut Database) -> Vec<Record> {
    CENTRO.query().where_eq("activo", true).get(db)
}

pub fn by_zona(db: &mut Database, zona_id: i64) -> Vec<Record> {
    CENTRO
        .query()
        .where_eq("zona_id", zona_id)
        .where_eq("activo", true)
        .get(db)
}
