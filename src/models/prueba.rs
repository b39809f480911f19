use crate::database::{Database, Direction, Model, Record};

pub static PRUEBA: Model = Model::new("pruebas", "id").with_fillable(&[
    "nombre",
    "descripcion",
    "tipo",
    "unidad_medida",
    "instrucciones",
    "valor_minimo",
    "valor_maximo",
    "es_mejor_mayor",
    "activo",
]);

/// Test categories: stored key and display label.
pub const TIPOS: &[(&str, &str)] = &[
    ("fuerza", "Fuerza"),
    ("velocidad", "Velocidad"),
    ("resistencia", "Resistencia"),
    ("flexibilidad", "Flexibilidad"),
    ("coordinacion", "Coordinación"),
    ("otro", "Otro"),
];

pub fn tipos() -> &'static [(&'static str, &'static str)] {
    TIPOS
}

/// Active tests by name.
pub fn activas(db: &mut Database) -> Vec<Record> {
    PRUEBA
        .query()
        .where_eq("activo", true)
        .order_by("nombre", Direction::Asc)
        .get(db)
}

pub fn by_tipo(db: &mut Database, tipo: &str) -> Vec<Record> {
    PRUEBA
        .query()
        .where_eq("tipo", tipo)
        .where_eq("activo", true)
        .order_by("nombre", Direction::Asc)
        .get(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Value;

    #[test]
    fn activas_are_sorted_by_name() {
        let mut db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        for (nombre, tipo, activo) in [
            ("Salto vertical", "fuerza", 1),
            ("Flexión de tronco", "flexibilidad", 1),
            ("Abdominales", "fuerza", 1),
            ("Carrera 1000 m", "resistencia", 0),
        ] {
            db.insert(
                "pruebas",
                &[("nombre", nombre.into()), ("tipo", tipo.into()), ("activo", activo.into())],
            )
            .unwrap();
        }

        let nombres: Vec<Value> = activas(&mut db).iter().map(|p| p.get("nombre")).collect();
        assert_eq!(
            nombres,
            vec![
                Value::from("Abdominales"),
                Value::from("Flexión de tronco"),
                Value::from("Salto vertical"),
            ]
        );
        assert_eq!(by_tipo(&mut db, "fuerza").len(), 2);
        assert!(by_tipo(&mut db, "resistencia").is_empty());
    }

    #[test]
    fn tipos_cover_every_category() {
        let keys: Vec<&str> = tipos().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys.len(), 6);
        assert!(keys.contains(&"coordinacion"));
    }
}
