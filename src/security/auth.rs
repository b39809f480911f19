//! Credential checks and per-record ownership rules.

use tracing::{debug, info, warn};

use crate::context::Context;
use crate::database::{Database, Record};
use crate::models::{atleta::ATLETA, evaluador, sesion::SESION, usuario};

use super::hash;

/// Records whose access depends on who owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Atleta,
    Sesion,
}

/// The user with `email` if `password` matches, loaded with its role name.
///
/// Stored hashes made with older parameters are upgraded on success.
pub fn attempt(db: &mut Database, email: &str, password: &str) -> Option<Record> {
    let Some(user) = usuario::find_by_email(db, email) else {
        info!(email, "login failed: unknown email");
        return None;
    };

    let stored = user.get("password").to_string();
    if !hash::check(password, &stored) {
        warn!(email, "login failed: wrong password");
        return None;
    }

    if hash::needs_rehash(&stored) {
        // Reload without the joined `rol` column before saving.
        if let Some(mut row) = usuario::USUARIO.find(db, user.key()) {
            row.set("password", hash::make(password));
            if row.save(db) {
                debug!(email, "password hash upgraded");
            }
        }
    }

    info!(email, "login succeeded");
    Some(user)
}

/// Whether the session's user may see the record `id` of `resource`.
///
/// Administrators see everything. Evaluators see the athletes and sessions
/// assigned to their evaluator profile; athletes see their own athlete
/// profile only.
pub fn can_access(ctx: &mut Context, resource: Resource, id: i64) -> bool {
    if ctx.is_admin() {
        return true;
    }
    let Some(user_id) = ctx.user_id() else {
        return false;
    };

    let evaluator = ctx.is_evaluator();
    let athlete = ctx.is_athlete();
    let db = ctx.db();

    match resource {
        Resource::Atleta if evaluator => {
            let Some(atleta) = ATLETA.find(db, id) else {
                return false;
            };
            owned_by_evaluator(db, &atleta, user_id)
        }
        Resource::Atleta if athlete => ATLETA
            .find(db, id)
            .is_some_and(|atleta| atleta.get("usuario_id").as_i64() == Some(user_id)),
        Resource::Sesion if evaluator => {
            let Some(sesion) = SESION.find(db, id) else {
                return false;
            };
            owned_by_evaluator(db, &sesion, user_id)
        }
        _ => false,
    }
}

// `record.evaluador_id` is the evaluator profile of `user_id`.
fn owned_by_evaluator(db: &mut Database, record: &Record, user_id: i64) -> bool {
    let Some(perfil) = evaluador::find_by_usuario(db, user_id) else {
        return false;
    };
    let owner = record.get("evaluador_id");
    !owner.is_null() && owner.as_i64() == perfil.key().as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{context, context_from};
    use crate::models::rol;
    use crate::database::Value;
    use crate::session::{COOKIE_NAME, Session, SessionStore};
    use sha2::Digest;

    fn user(db: &mut Database, email: &str, password: &str, rol_id: i64) -> i64 {
        db.insert(
            "usuarios",
            &[
                ("nombre", email.into()),
                ("email", email.into()),
                ("password", password.into()),
                ("rol_id", rol_id.into()),
            ],
        )
        .unwrap()
    }

    fn logged_in(user_id: i64, role: &str) -> Context {
        let sessions = SessionStore::new(std::time::Duration::from_secs(60));
        let token = sessions.create(Session::new(user_id, role));
        let raw = format!("GET / HTTP/1.1\r\nCookie: {COOKIE_NAME}={token}\r\n\r\n");
        context_from(raw.as_bytes(), sessions)
    }

    // ── attempt ───────────────────────────────────────────────────────────────

    #[test]
    fn attempt_checks_password() {
        let mut db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        user(&mut db, "ana@example.com", &hash::make("secreto"), 1);

        let found = attempt(&mut db, "ana@example.com", "secreto").unwrap();
        assert_eq!(found.get("rol"), Value::from(rol::ADMINISTRADOR));
        assert!(attempt(&mut db, "ana@example.com", "otro").is_none());
        assert!(attempt(&mut db, "nadie@example.com", "secreto").is_none());
    }

    #[test]
    fn attempt_upgrades_weak_hash() {
        let mut db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        let weak = {
            let salt = "00";
            let digest = hex::encode(sha2::Sha256::digest(format!("{salt}clave")));
            format!("sha256$1${salt}${digest}")
        };
        let id = user(&mut db, "eva@example.com", &weak, 2);

        assert!(attempt(&mut db, "eva@example.com", "clave").is_some());
        let stored = usuario::USUARIO.find(&mut db, id).unwrap().get("password").to_string();
        assert!(!hash::needs_rehash(&stored));
        assert!(hash::check("clave", &stored));
    }

    // ── can_access ────────────────────────────────────────────────────────────

    #[test]
    fn anonymous_sees_nothing() {
        let mut ctx = context("GET", "/");
        assert!(!can_access(&mut ctx, Resource::Atleta, 1));
    }

    #[test]
    fn admin_sees_everything() {
        let mut ctx = logged_in(1, rol::ADMINISTRADOR);
        assert!(can_access(&mut ctx, Resource::Atleta, 999));
        assert!(can_access(&mut ctx, Resource::Sesion, 999));
    }

    #[test]
    fn evaluator_sees_assigned_records_only() {
        let mut ctx = logged_in(0, rol::EVALUADOR);
        let db = ctx.db();
        let uid = user(db, "eva@example.com", "x", 2);
        let other_uid = user(db, "otro@example.com", "x", 2);
        let mine = db
            .insert("evaluadores", &[("usuario_id", uid.into()), ("nombre", "Eva".into()), ("apellido", "R".into())])
            .unwrap();
        let theirs = db
            .insert("evaluadores", &[("usuario_id", other_uid.into()), ("nombre", "Otro".into()), ("apellido", "S".into())])
            .unwrap();
        let a1 = db
            .insert("atletas", &[("nombre", "A".into()), ("apellido", "B".into()), ("evaluador_id", mine.into())])
            .unwrap();
        let a2 = db
            .insert("atletas", &[("nombre", "C".into()), ("apellido", "D".into()), ("evaluador_id", theirs.into())])
            .unwrap();
        let s1 = db
            .insert("sesiones_evaluacion", &[("nombre", "S".into()), ("fecha", "2026-01-10".into()), ("evaluador_id", mine.into())])
            .unwrap();

        let token = ctx.login(uid, rol::EVALUADOR);
        assert!(!token.is_empty());
        assert!(can_access(&mut ctx, Resource::Atleta, a1));
        assert!(!can_access(&mut ctx, Resource::Atleta, a2));
        assert!(can_access(&mut ctx, Resource::Sesion, s1));
        assert!(!can_access(&mut ctx, Resource::Sesion, s1 + 100));
    }

    #[test]
    fn athlete_sees_own_profile_only() {
        let mut ctx = logged_in(0, rol::ATLETA);
        let db = ctx.db();
        let uid = user(db, "atleta@example.com", "x", 3);
        let own = db
            .insert("atletas", &[("usuario_id", uid.into()), ("nombre", "A".into()), ("apellido", "B".into())])
            .unwrap();
        let other = db.insert("atletas", &[("nombre", "C".into()), ("apellido", "D".into())]).unwrap();
        let sesion = db
            .insert("sesiones_evaluacion", &[("nombre", "S".into()), ("fecha", "2026-01-10".into())])
            .unwrap();

        ctx.login(uid, rol::ATLETA);
        assert!(can_access(&mut ctx, Resource::Atleta, own));
        assert!(!can_access(&mut ctx, Resource::Atleta, other));
        assert!(!can_access(&mut ctx, Resource::Sesion, sesion));
    }
}
