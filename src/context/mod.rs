//! Per-request context: the request, its route parameters, the request's
//! database connection and the logged-in session.
//!
//! A [`Context`] is created by the application entry point for every request
//! and moved through the middleware chain into the action. It owns the
//! [`Database`] opened for that request, so the connection is closed when the
//! context is dropped.

use std::sync::Arc;

use crate::config::Config;
use crate::database::{Database, Record};
use crate::models::{rol, usuario};
use crate::session::{COOKIE_NAME, Session, SessionStore};
use crate::Request;

/// Values captured from the matched route pattern, in pattern order.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an earlier capture of the same name in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything an action may touch while handling one request.
pub struct Context {
    request: Request,
    params: PathParams,
    db: Database,
    config: Arc<Config>,
    sessions: SessionStore,
    // Token and snapshot of the caller's live session.
    session: Option<(String, Session)>,
}

impl Context {
    /// Builds the context and resumes the session named by the request cookie.
    pub fn new(request: Request, db: Database, config: Arc<Config>, sessions: SessionStore) -> Self {
        let session = request
            .headers()
            .cookie(COOKIE_NAME)
            .and_then(|token| sessions.touch(token).map(|s| (token.to_owned(), s)));

        Self {
            request,
            params: PathParams::new(),
            db,
            config,
            sessions,
            session,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }

    /// The connection opened for this request.
    pub fn db(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref().map(|(_, s)| s)
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.session().map(|s| s.user_id)
    }

    pub fn role(&self) -> Option<&str> {
        self.session().map(|s| s.role.as_str())
    }

    /// `true` if the session's role is one of `roles`.
    pub fn has_role(&self, roles: &[&str]) -> bool {
        self.role().is_some_and(|role| roles.iter().any(|r| *r == role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(&[rol::ADMINISTRADOR])
    }

    pub fn is_evaluator(&self) -> bool {
        self.has_role(&[rol::EVALUADOR])
    }

    pub fn is_athlete(&self) -> bool {
        self.has_role(&[rol::ATLETA])
    }

    /// The logged-in user, loaded with its role name.
    pub fn user(&mut self) -> Option<Record> {
        let id = self.user_id()?;
        usuario::find_with_role(&mut self.db, id)
    }

    /// Starts a session for the user and returns the cookie token.
    pub fn login(&mut self, user_id: i64, role: &str) -> String {
        if let Some((old, _)) = self.session.take() {
            self.sessions.destroy(&old);
        }
        self.sessions.purge_expired();

        let session = Session::new(user_id, role);
        let token = self.sessions.create(session.clone());
        self.session = Some((token.clone(), session));
        token
    }

    /// Ends the current session. Returns `false` if there was none.
    pub fn logout(&mut self) -> bool {
        match self.session.take() {
            Some((token, _)) => self.sessions.destroy(&token).is_some(),
            None => false,
        }
    }

    /// `true` for API routes and for clients that ask for JSON.
    pub fn wants_json(&self) -> bool {
        let path = self.request.route_path();
        path == "api"
            || path.starts_with("api/")
            || self.request.is_json()
            || self
                .request
                .headers()
                .get("accept")
                .is_some_and(|a| a.contains("application/json"))
    }
}
