//! Test results: one measurement per (session, athlete, test), optionally
//! taken on both sides of the body.

use crate::database::{Accessor, Database, Direction, Model, Operator, Record, Value};

pub static RESULTADO: Model = Model::new("resultados_pruebas", "id")
    .with_fillable(&[
        "sesion_id",
        "atleta_id",
        "prueba_id",
        "valor_izquierdo",
        "valor_derecho",
        "valor_promedio",
        "observaciones",
    ])
    .with_accessors(&[("valor_final", valor_final as Accessor)]);

/// An athlete's results in one session, with the test name and unit.
pub fn by_sesion_and_atleta(db: &mut Database, sesion_id: i64, atleta_id: i64) -> Vec<Record> {
    RESULTADO
        .query()
        .select(&[
            "resultados_pruebas.*",
            "pruebas.nombre AS prueba_nombre",
            "pruebas.unidad_medida AS unidad_medida",
        ])
        .join("pruebas", "pruebas.id", Operator::Eq, "resultados_pruebas.prueba_id")
        .where_eq("resultados_pruebas.sesion_id", sesion_id)
        .where_eq("resultados_pruebas.atleta_id", atleta_id)
        .get(db)
}

/// Every athlete's result for one test of a session, with the athlete's name.
pub fn by_sesion_and_prueba(db: &mut Database, sesion_id: i64, prueba_id: i64) -> Vec<Record> {
    RESULTADO
        .query()
        .select(&[
            "resultados_pruebas.*",
            "atletas.nombre AS atleta_nombre",
            "atletas.apellido AS atleta_apellido",
        ])
        .join("atletas", "atletas.id", Operator::Eq, "resultados_pruebas.atleta_id")
        .where_eq("resultados_pruebas.sesion_id", sesion_id)
        .where_eq("resultados_pruebas.prueba_id", prueba_id)
        .get(db)
}

/// The stored result for the triple, if one was already recorded.
pub fn find_existing(
    db: &mut Database,
    sesion_id: i64,
    atleta_id: i64,
    prueba_id: i64,
) -> Option<Record> {
    RESULTADO
        .query()
        .where_map([
            ("sesion_id", sesion_id),
            ("atleta_id", atleta_id),
            ("prueba_id", prueba_id),
        ])
        .first(db)
}

/// Flat rows for the CSV export, limited to one evaluator's sessions when
/// `evaluador_id` is given.
pub fn exportables(db: &mut Database, evaluador_id: Option<i64>) -> Vec<Record> {
    let mut query = RESULTADO
        .query()
        .select(&[
            "sesiones_evaluacion.fecha AS fecha",
            "sesiones_evaluacion.nombre AS sesion",
            "atletas.dni AS dni",
            "atletas.apellido AS apellido",
            "atletas.nombre AS nombre",
            "pruebas.nombre AS prueba",
            "pruebas.unidad_medida AS unidad",
            "resultados_pruebas.valor_izquierdo AS valor_izquierdo",
            "resultados_pruebas.valor_derecho AS valor_derecho",
            "resultados_pruebas.valor_promedio AS valor_promedio",
        ])
        .join(
            "sesiones_evaluacion",
            "sesiones_evaluacion.id",
            Operator::Eq,
            "resultados_pruebas.sesion_id",
        )
        .join("atletas", "atletas.id", Operator::Eq, "resultados_pruebas.atleta_id")
        .join("pruebas", "pruebas.id", Operator::Eq, "resultados_pruebas.prueba_id");

    if let Some(id) = evaluador_id {
        query = query.where_eq("sesiones_evaluacion.evaluador_id", id);
    }

    query
        .order_by("sesiones_evaluacion.fecha", Direction::Desc)
        .order_by("atletas.apellido", Direction::Asc)
        .order_by("pruebas.nombre", Direction::Asc)
        .get(db)
}

/// The value to display: the average, else the left side, else the right.
fn valor_final(resultado: &Record) -> Value {
    ["valor_promedio", "valor_izquierdo", "valor_derecho"]
        .into_iter()
        .map(|key| resultado.get(key))
        .find(|v| !v.is_null())
        .unwrap_or_default()
}

pub fn tiene_ambos_lados(resultado: &Record) -> bool {
    !resultado.get("valor_izquierdo").is_null() && !resultado.get("valor_derecho").is_null()
}

/// Sets `valor_promedio` to the mean of both sides when both are present.
pub fn calcular_promedio(resultado: &mut Record) -> &mut Record {
    if tiene_ambos_lados(resultado) {
        let izquierdo = resultado.get("valor_izquierdo").as_f64();
        let derecho = resultado.get("valor_derecho").as_f64();
        if let (Some(i), Some(d)) = (izquierdo, derecho) {
            resultado.set("valor_promedio", (i + d) / 2.0);
        }
    }
    resultado
}
