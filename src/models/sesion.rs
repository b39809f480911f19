//! Evaluation sessions: when and where a group of tests is taken.

use std::fmt;

use chrono::NaiveDate;

use crate::database::{Accessor, Database, Direction, Model, Operator, Record, Value};

pub static SESION: Model = Model::new("sesiones_evaluacion", "id")
    .with_fillable(&[
        "nombre",
        "descripcion",
        "fecha",
        "hora_inicio",
        "hora_fin",
        "centro_id",
        "evaluador_id",
        "observaciones",
        "estado",
    ])
    .with_accessors(&[
        ("fecha_formateada", fecha_formateada as Accessor),
        ("horario", horario as Accessor),
    ]);

/// Lifecycle of a session, stored as lowercase text in `estado`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estado {
    Pendiente,
    Completada,
    Cancelada,
}

impl Estado {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::Completada => "completada",
            Self::Cancelada => "cancelada",
        }
    }

    pub fn of(sesion: &Record) -> Option<Self> {
        match sesion.get("estado").as_str()? {
            "pendiente" => Some(Self::Pendiente),
            "completada" => Some(Self::Completada),
            "cancelada" => Some(Self::Cancelada),
            _ => None,
        }
    }
}

impl fmt::Display for Estado {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An evaluator's sessions, most recent day first, then by start time.
pub fn by_evaluador(db: &mut Database, evaluador_id: i64) -> Vec<Record> {
    SESION
        .query()
        .where_eq("evaluador_id", evaluador_id)
        .order_by("fecha", Direction::Desc)
        .order_by("hora_inicio", Direction::Asc)
        .get(db)
}

/// Pending sessions from `today` on, soonest first, optionally of one
/// evaluator only.
pub fn proximas(
    db: &mut Database,
    today: NaiveDate,
    evaluador_id: Option<i64>,
    limit: u64,
) -> Vec<Record> {
    let mut query = SESION
        .query()
        .where_op("fecha", Operator::Gte, today)
        .where_eq("estado", Estado::Pendiente.as_str());
    if let Some(id) = evaluador_id {
        query = query.where_eq("evaluador_id", id);
    }
    query
        .order_by("fecha", Direction::Asc)
        .order_by("hora_inicio", Direction::Asc)
        .limit(limit)
        .get(db)
}

/// `fecha` as `dd/mm/yyyy`.
fn fecha_formateada(sesion: &Record) -> Value {
    sesion
        .get("fecha")
        .as_date()
        .map(|d| d.format("%d/%m/%Y").to_string())
        .into()
}

/// `HH:MM - HH:MM` from the start and end times.
fn horario(sesion: &Record) -> Value {
    let hhmm = |key: &str| {
        let value = sesion.get(key).to_string();
        value.get(..5).map(str::to_owned).unwrap_or(value)
    };
    Value::Text(format!("{} - {}", hhmm("hora_inicio"), hhmm("hora_fin")))
}

pub fn is_completada(sesion: &Record) -> bool {
    Estado::of(sesion) == Some(Estado::Completada)
}

pub fn is_pendiente(sesion: &Record) -> bool {
    Estado::of(sesion) == Some(Estado::Pendiente)
}

pub fn is_cancelada(sesion: &Record) -> bool {
    Estado::of(sesion) == Some(Estado::Cancelada)
}
