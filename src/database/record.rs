//! Active-record style mapping between table rows and in-memory records.
//!
//! A [`Model`] is a static description of one table: its name, primary key and a
//! closed table of computed attributes. A [`Record`] is one row of that table held
//! as two attribute maps: the current `attributes` and the `original` snapshot
//! taken when the row was loaded or last saved. The difference between the two
//! is the dirty set, and only the dirty set is written on update.
//!
//! ```
//! use captacion::database::{Database, Value};
//! use captacion::models::zona::ZONA;
//!
//! let mut db = Database::open_in_memory().unwrap();
//! db.migrate().unwrap();
//!
//! let mut zona = ZONA.new_record();
//! zona.fill([("nombre", "Norte")]);
//! assert!(zona.save(&mut db));
//! assert!(zona.exists());
//!
//! zona.set("nombre", "Noroeste");
//! assert_eq!(zona.get_dirty().len(), 1);
//! assert!(zona.save(&mut db));
//!
//! let reloaded = ZONA.find(&mut db, zona.key()).unwrap();
//! assert_eq!(reloaded.get("nombre"), Value::from("Noroeste"));
//! ```

use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use super::query::QueryBuilder;
use super::{Database, Row, Value};

/// A computed attribute: derives a value from the record's stored attributes.
pub type Accessor = fn(&Record) -> Value;

/// Static description of a table.
pub struct Model {
    table: &'static str,
    primary_key: &'static str,
    accessors: &'static [(&'static str, Accessor)],
    fillable: &'static [&'static str],
    hidden: &'static [&'static str],
}

impl Model {
    pub const fn new(table: &'static str, primary_key: &'static str) -> Self {
        Self {
            table,
            primary_key,
            accessors: &[],
            fillable: &[],
            hidden: &[],
        }
    }

    /// Attaches the model's computed attributes, looked up by name in
    /// [`Record::get`].
    pub const fn with_accessors(self, accessors: &'static [(&'static str, Accessor)]) -> Self {
        Self {
            table: self.table,
            primary_key: self.primary_key,
            accessors,
            fillable: self.fillable,
            hidden: self.hidden,
        }
    }

    /// Columns [`Record::fill_from`] may assign from untrusted input.
    pub const fn with_fillable(self, fillable: &'static [&'static str]) -> Self {
        Self {
            table: self.table,
            primary_key: self.primary_key,
            accessors: self.accessors,
            fillable,
            hidden: self.hidden,
        }
    }

    /// Columns left out of a record's JSON form.
    pub const fn with_hidden(self, hidden: &'static [&'static str]) -> Self {
        Self {
            table: self.table,
            primary_key: self.primary_key,
            accessors: self.accessors,
            fillable: self.fillable,
            hidden,
        }
    }

    pub fn fillable(&self) -> &'static [&'static str] {
        self.fillable
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    pub fn accessor(&self, name: &str) -> Option<Accessor> {
        self.accessors
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
    }

    /// Starts a query over this model's table.
    pub fn query(&'static self) -> QueryBuilder {
        QueryBuilder::new(self)
    }

    pub fn find(&'static self, db: &mut Database, id: impl Into<Value>) -> Option<Record> {
        self.query().find(db, id)
    }

    pub fn all(&'static self, db: &mut Database) -> Vec<Record> {
        self.query().get(db)
    }

    /// An empty record that will be inserted on its first save.
    pub fn new_record(&'static self) -> Record {
        Record {
            model: self,
            attributes: Row::new(),
            original: Row::new(),
            state: RecordState::New,
        }
    }

    /// Fills a new record with `attributes` and inserts it.
    pub fn create<K, V>(
        &'static self,
        db: &mut Database,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Option<Record>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut record = self.new_record();
        record.fill(attributes);
        record.save(db).then_some(record)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field(
                "accessors",
                &self.accessors.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            )
            .field("fillable", &self.fillable)
            .field("hidden", &self.hidden)
            .finish()
    }
}

/// Where a record stands relative to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Not yet inserted.
    New,
    /// Backed by a row.
    Persisted,
    /// Its row has been deleted; further saves are refused.
    Deleted,
}

/// One row of a [`Model`]'s table.
#[derive(Debug, Clone)]
pub struct Record {
    model: &'static Model,
    attributes: Row,
    original: Row,
    state: RecordState,
}

impl Record {
    /// Wraps a fetched row. The snapshot equals the row, so nothing is dirty.
    pub fn hydrate(model: &'static Model, row: Row) -> Self {
        Self {
            model,
            original: row.clone(),
            attributes: row,
            state: RecordState::Persisted,
        }
    }

    pub fn model(&self) -> &'static Model {
        self.model
    }

    /// Sets every given attribute. The original snapshot is left alone, so the
    /// filled keys become dirty where they differ from it.
    pub fn fill<K, V>(&mut self, attributes: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in attributes {
            self.attributes.insert(key.into(), value.into());
        }
        self
    }

    /// Like [`fill`](Self::fill), but drops every key outside the model's
    /// fillable list.
    pub fn fill_from<'a>(&mut self, input: impl IntoIterator<Item = (&'a str, Value)>) -> &mut Self {
        for (key, value) in input {
            if self.model.fillable.iter().any(|f| *f == key) {
                self.attributes.insert(key.to_owned(), value);
            }
        }
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Stored attribute `key`, else the model's computed attribute of that
    /// name, else `Null`.
    pub fn get(&self, key: &str) -> Value {
        if let Some(value) = self.attributes.get(key) {
            return value.clone();
        }
        match self.model.accessor(key) {
            Some(accessor) => accessor(self),
            None => Value::Null,
        }
    }

    /// Stored attribute only, without the accessor fallback.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Attributes that differ from the snapshot or are missing from it.
    pub fn get_dirty(&self) -> Row {
        self.attributes
            .iter()
            .filter(|(k, v)| self.original.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.attributes
            .iter()
            .any(|(k, v)| self.original.get(k) != Some(v))
    }

    /// `true` if any of `keys` is dirty.
    pub fn is_dirty_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| match self.attributes.get(*k) {
            Some(v) => self.original.get(*k) != Some(v),
            None => false,
        })
    }

    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    pub fn get_original(&self, key: &str) -> Option<&Value> {
        self.original.get(key)
    }

    pub fn original(&self) -> &Row {
        &self.original
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// `true` while the record is backed by a row.
    pub fn exists(&self) -> bool {
        self.state == RecordState::Persisted
    }

    /// Primary key value, `Null` before the first insert.
    pub fn key(&self) -> Value {
        self.attributes
            .get(self.model.primary_key)
            .cloned()
            .unwrap_or_default()
    }

    /// Inserts a new record or updates the dirty columns of a persisted one.
    ///
    /// Returns `false` if the statement failed or the record was deleted. A
    /// persisted record with nothing dirty saves trivially without touching the
    /// database.
    pub fn save(&mut self, db: &mut Database) -> bool {
        match self.state {
            RecordState::Deleted => {
                warn!(table = self.model.table, "refusing to save a deleted record");
                false
            }
            RecordState::Persisted => self.perform_update(db),
            RecordState::New => self.perform_insert(db),
        }
    }

    fn perform_update(&mut self, db: &mut Database) -> bool {
        let dirty = self.get_dirty();
        if dirty.is_empty() {
            return true;
        }

        let set = dirty
            .keys()
            .map(|k| format!("{k} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        // The key is matched on its snapshot value in case it was reassigned.
        let key = self
            .original
            .get(self.model.primary_key)
            .cloned()
            .unwrap_or_else(|| self.key());
        if key.is_null() {
            warn!(table = self.model.table, "cannot update a record loaded without its key");
            return false;
        }
        let mut bindings: Vec<Value> = dirty.into_values().collect();
        bindings.push(key);

        let sql = format!(
            "UPDATE {} SET {set} WHERE {} = ?",
            self.model.table, self.model.primary_key
        );
        let db = db.query(&sql, &bindings);
        if db.error() || db.count() == 0 {
            return false;
        }

        debug!(table = self.model.table, key = %self.key(), "record updated");
        self.sync_original();
        true
    }

    fn perform_insert(&mut self, db: &mut Database) -> bool {
        let id = {
            let fields: Vec<(&str, Value)> = self
                .attributes
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone()))
                .collect();
            db.insert(self.model.table, &fields)
        };
        let Some(id) = id else {
            return false;
        };

        if self.key().is_null() {
            self.attributes
                .insert(self.model.primary_key.to_owned(), Value::Integer(id));
        }
        debug!(table = self.model.table, id, "record inserted");
        self.state = RecordState::Persisted;
        self.sync_original();
        true
    }

    /// Deletes the backing row. Returns `false`, without issuing a statement,
    /// if there is no row or the key was not loaded, and `false` if no row
    /// matched the key.
    pub fn delete(&mut self, db: &mut Database) -> bool {
        let key = self.key();
        if !self.exists() || key.is_null() {
            return false;
        }

        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            self.model.table, self.model.primary_key
        );
        let db = db.query(&sql, &[key]);
        if db.error() || db.count() == 0 {
            return false;
        }

        self.state = RecordState::Deleted;
        true
    }

    // Stored attributes minus the model's hidden columns.
    fn visible(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes
            .iter()
            .filter(|(k, _)| !self.model.hidden.iter().any(|h| *h == k.as_str()))
    }

    /// The visible stored attributes as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// The stored attributes plus the named computed attributes.
    pub fn to_json_with(&self, computed: &[&str]) -> serde_json::Value {
        let mut json = self.to_json();
        if let serde_json::Value::Object(map) = &mut json {
            for name in computed {
                let value = serde_json::to_value(self.get(name)).unwrap_or_default();
                map.insert((*name).to_owned(), value);
            }
        }
        json
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.visible())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{atleta::ATLETA, usuario::USUARIO, zona::ZONA};
    use pretty_assertions::assert_eq;

    fn db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn new_record_is_clean_after_save() {
        let mut db = db();
        let mut zona = ZONA.new_record();
        zona.fill([("nombre", "Centro"), ("descripcion", "Casco urbano")]);
        assert!(zona.is_dirty());

        assert!(zona.save(&mut db));
        assert!(zona.get_dirty().is_empty());
        assert_eq!(zona.state(), RecordState::Persisted);
        assert_eq!(zona.key(), Value::Integer(db.last_insert_id()));
    }

    #[test]
    fn single_mutation_dirties_one_key() {
        let mut db = db();
        let mut zona = ZONA.create(&mut db, [("nombre", "Sur")]).unwrap();
        zona.set("nombre", "Sudeste");

        let dirty = zona.get_dirty();
        assert_eq!(dirty.keys().collect::<Vec<_>>(), vec!["nombre"]);
        assert!(zona.is_dirty_any(&["nombre", "activa"]));
        assert!(!zona.is_dirty_any(&["descripcion"]));
        assert_eq!(zona.get_original("nombre"), Some(&Value::from("Sur")));
    }

    #[test]
    fn setting_the_same_value_is_not_dirty() {
        let mut db = db();
        let mut zona = ZONA.create(&mut db, [("nombre", "Este")]).unwrap();
        zona.set("nombre", "Este");
        assert!(!zona.is_dirty());
    }

    #[test]
    fn clean_update_issues_no_statement() {
        let mut db = db();
        let mut zona = ZONA.create(&mut db, [("nombre", "Oeste")]).unwrap();
        let before = db.statements_executed();
        assert!(zona.save(&mut db));
        assert_eq!(db.statements_executed(), before);
    }

    #[test]
    fn update_writes_only_dirty_columns() {
        let mut db = db();
        let id = db
            .insert("zonas", &[("nombre", "Norte".into()), ("activa", 1.into())])
            .unwrap();
        let mut zona = ZONA.find(&mut db, id).unwrap();

        // A concurrent write to a column this record does not touch survives.
        db.query("UPDATE zonas SET activa = 0 WHERE id = ?", &[id.into()]);
        zona.set("nombre", "Norte Grande");
        assert!(zona.save(&mut db));

        let fresh = ZONA.find(&mut db, id).unwrap();
        assert_eq!(fresh.get("nombre"), Value::from("Norte Grande"));
        assert_eq!(fresh.get("activa"), Value::Integer(0));
    }

    #[test]
    fn delete_without_row_issues_no_statement() {
        let mut db = db();
        let mut zona = ZONA.new_record();
        zona.set("nombre", "Fantasma");
        assert!(!zona.delete(&mut db));
        assert_eq!(db.statements_executed(), 0);
    }

    #[test]
    fn deleted_record_refuses_save() {
        let mut db = db();
        let mut zona = ZONA.create(&mut db, [("nombre", "Temporal")]).unwrap();
        assert!(zona.delete(&mut db));
        assert_eq!(zona.state(), RecordState::Deleted);
        assert!(ZONA.find(&mut db, zona.key()).is_none());

        let before = db.statements_executed();
        zona.set("nombre", "Revivida");
        assert!(!zona.save(&mut db));
        assert!(!zona.delete(&mut db));
        assert_eq!(db.statements_executed(), before);
    }

    #[test]
    fn record_without_key_neither_updates_nor_deletes() {
        let mut db = db();
        ZONA.create(&mut db, [("nombre", "Centro")]).unwrap();
        let mut zona = ZONA.query().select(&["nombre"]).first(&mut db).unwrap();
        assert!(zona.key().is_null());

        let before = db.statements_executed();
        assert!(!zona.delete(&mut db));
        assert_eq!(zona.state(), RecordState::Persisted);
        zona.set("nombre", "Otro");
        assert!(!zona.save(&mut db));
        assert_eq!(db.statements_executed(), before);
        assert_eq!(ZONA.query().count(&mut db), 1);
    }

    #[test]
    fn vanished_row_fails_update_and_delete() {
        let mut db = db();
        let mut zona = ZONA.create(&mut db, [("nombre", "Centro")]).unwrap();
        db.query("DELETE FROM zonas", &[]);

        zona.set("nombre", "Otro");
        assert!(!zona.save(&mut db));
        assert!(zona.is_dirty());
        assert!(!zona.delete(&mut db));
        assert_eq!(zona.state(), RecordState::Persisted);
    }

    #[test]
    fn failed_insert_leaves_record_new() {
        let mut db = db();
        let mut zona = ZONA.new_record();
        zona.set("no_such_column", 1);
        assert!(!zona.save(&mut db));
        assert_eq!(zona.state(), RecordState::New);
        assert!(db.error());
    }

    #[test]
    fn fill_from_ignores_guarded_columns() {
        let mut zona = ZONA.new_record();
        zona.fill_from([
            ("nombre", Value::from("Litoral")),
            ("id", Value::from(99)),
            ("activa", Value::from(0)),
        ]);
        assert_eq!(zona.attribute("nombre"), Some(&Value::from("Litoral")));
        assert_eq!(zona.attribute("activa"), Some(&Value::Integer(0)));
        assert!(zona.attribute("id").is_none());
    }

    #[test]
    fn get_falls_back_to_accessor_then_null() {
        let mut atleta = ATLETA.new_record();
        atleta.fill([("nombre", "Lucía"), ("apellido", "Pérez")]);
        assert_eq!(atleta.get("nombre_completo"), Value::from("Lucía Pérez"));
        assert_eq!(atleta.get("no_existe"), Value::Null);
    }

    #[test]
    fn stored_attribute_shadows_accessor() {
        let mut atleta = ATLETA.new_record();
        atleta.fill([("nombre", "Lucía"), ("apellido", "Pérez")]);
        atleta.set("nombre_completo", "Lu");
        assert_eq!(atleta.get("nombre_completo"), Value::from("Lu"));
    }

    #[test]
    fn json_form_omits_hidden_columns() {
        let mut usuario = USUARIO.new_record();
        usuario.fill([("email", "a@b.c"), ("password", "secreto")]);
        let json = usuario.to_json();
        assert_eq!(json["email"], "a@b.c");
        assert!(json.get("password").is_none());
    }

    #[test]
    fn to_json_with_appends_computed_attributes() {
        let mut atleta = ATLETA.new_record();
        atleta.fill([("nombre", "Ana"), ("apellido", "Gómez")]);
        let json = atleta.to_json_with(&["nombre_completo"]);
        assert_eq!(json["nombre"], "Ana");
        assert_eq!(json["nombre_completo"], "Ana Gómez");
    }
}
