//! Table models of the evaluation domain.
//!
//! Each submodule declares one static [`Model`](crate::database::Model) plus the
//! finders and computed attributes the controllers use. Finders take the
//! request's [`Database`](crate::database::Database) explicitly.

pub mod atleta;
pub mod centro;
pub mod evaluador;
pub mod prueba;
pub mod resultado;
pub mod rol;
pub mod sesion;
pub mod usuario;
pub mod zona;

use crate::database::{Record, Value};

// `nombre apellido`, trimmed, for the models that carry both.
pub(crate) fn nombre_completo(record: &Record) -> Value {
    let full = format!("{} {}", record.get("nombre"), record.get("apellido"));
    Value::Text(full.trim().to_owned())
}
