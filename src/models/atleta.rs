//! Athletes: identity, anthropometrics and the evaluator that follows them.

use chrono::{Local, NaiveDate};

use crate::database::{Accessor, Database, Model, Record, Value};

pub static ATLETA: Model = Model::new("atletas", "id")
    .with_fillable(&[
        "usuario_id",
        "nombre",
        "apellido",
        "dni",
        "fecha_nacimiento",
        "sexo",
        "domicilio",
        "localidad",
        "telefono",
        "email",
        "altura",
        "peso",
        "envergadura",
        "altura_sentado",
        "evaluador_id",
        "activo",
    ])
    .with_accessors(&[
        ("nombre_completo", super::nombre_completo as Accessor),
        ("edad", edad as Accessor),
        ("imc", imc as Accessor),
    ]);

pub fn find_by_dni(db: &mut Database, dni: &str) -> Option<Record> {
    ATLETA.query().where_eq("dni", dni).first(db)
}

/// The athlete profile linked to a user account.
pub fn find_by_usuario(db: &mut Database, usuario_id: i64) -> Option<Record> {
    ATLETA.query().where_eq("usuario_id", usuario_id).first(db)
}

pub fn activos(db: &mut Database) -> Vec<Record> {
    ATLETA.query().where_eq("activo", true).get(db)
}

/// Active athletes followed by one evaluator.
pub fn by_evaluador(db: &mut Database, evaluador_id: i64) -> Vec<Record> {
    ATLETA
        .query()
        .where_eq("evaluador_id", evaluador_id)
        .where_eq("activo", true)
        .get(db)
}

fn edad(atleta: &Record) -> Value {
    edad_at(atleta, Local::now().date_naive()).into()
}

/// Age in whole years on `today`, `None` without a valid birth date.
pub fn edad_at(atleta: &Record, today: NaiveDate) -> Option<u32> {
    let born = atleta.get("fecha_nacimiento").as_date()?;
    today.years_since(born)
}

/// Body-mass index from `altura` (cm) and `peso` (kg), rounded to two decimals.
fn imc(atleta: &Record) -> Value {
    let altura = atleta.get("altura").as_f64().filter(|a| *a > 0.0);
    let peso = atleta.get("peso").as_f64().filter(|p| *p > 0.0);
    match (altura, peso) {
        (Some(altura), Some(peso)) => {
            let metros = altura / 100.0;
            Value::Real((peso / (metros * metros) * 100.0).round() / 100.0)
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atleta(attrs: &[(&str, Value)]) -> Record {
        let mut r = ATLETA.new_record();
        r.fill(attrs.iter().map(|(k, v)| (*k, v.clone())));
        r
    }

    #[test]
    fn edad_counts_completed_years() {
        let a = atleta(&[("fecha_nacimiento", "2008-06-15".into())]);
        let before = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let on = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(edad_at(&a, before), Some(15));
        assert_eq!(edad_at(&a, on), Some(16));
    }

    #[test]
    fn edad_needs_a_birth_date() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(edad_at(&atleta(&[]), today), None);
        assert_eq!(atleta(&[]).get("edad"), Value::Null);
    }

    #[test]
    fn imc_rounds_to_two_decimals() {
        let a = atleta(&[("altura", 175.0.into()), ("peso", 70.into())]);
        assert_eq!(a.get("imc"), Value::Real(22.86));
    }

    #[test]
    fn imc_is_null_without_measurements() {
        assert_eq!(atleta(&[("altura", 175.0.into())]).get("imc"), Value::Null);
        let zero = atleta(&[("altura", 0.into()), ("peso", 60.into())]);
        assert_eq!(zero.get("imc"), Value::Null);
    }

    #[test]
    fn by_evaluador_filters_owner_and_activity() {
        let mut db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let ev = db
            .insert("evaluadores", &[("nombre", "Eva".into()), ("apellido", "Ruiz".into())])
            .unwrap();
        let rows = [("A", Some(ev), 1), ("B", Some(ev), 0), ("C", None, 1)];
        for (nombre, evaluador, activo) in rows {
            db.insert(
                "atletas",
                &[
                    ("nombre", nombre.into()),
                    ("apellido", "X".into()),
                    ("evaluador_id", evaluador.into()),
                    ("activo", activo.into()),
                ],
            )
            .unwrap();
        }

        let propios = by_evaluador(&mut db, ev);
        assert_eq!(propios.len(), 1);
        assert_eq!(propios[0].get("nombre_completo"), Value::from("A X"));
        assert_eq!(activos(&mut db).len(), 2);
    }
}
