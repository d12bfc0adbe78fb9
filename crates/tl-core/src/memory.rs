//! In-memory [`SessionStore`] for unit tests.

use std::convert::Infallible;

use chrono::{DateTime, Utc};

use crate::error::TrackError;
use crate::overlap::ranges_overlap;
use crate::session::{NewSession, Session, SessionStore};
use crate::types::{SessionId, SessionState};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: Vec<Session>,
    next_id: i64,
}

impl MemoryStore {
    /// Inserts a plain session and returns its id.
    pub fn add(
        &mut self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        parent: Option<SessionId>,
    ) -> SessionId {
        let state = if end.is_some() {
            SessionState::Completed
        } else {
            SessionState::Working
        };
        let Ok(id) = self.insert(&NewSession {
            start_time: start,
            end_time: end,
            description: format!("session {}", self.next_id + 1),
            project: None,
            tags: Vec::new(),
            estimate_minutes: None,
            explicit_duration_minutes: None,
            remark: None,
            state,
            parent_session_id: parent,
            continues_session_id: None,
        });
        id
    }

    pub fn all(&self) -> &[Session] {
        &self.sessions
    }

    fn sorted(mut sessions: Vec<Session>) -> Vec<Session> {
        sessions.sort_by_key(|session| (session.start_time, session.id));
        sessions
    }

    fn select(&self, keep: impl Fn(&Session) -> bool) -> Vec<Session> {
        Self::sorted(self.sessions.iter().filter(|s| keep(s)).cloned().collect())
    }
}

impl SessionStore for MemoryStore {
    type Error = Infallible;

    fn insert(&mut self, session: &NewSession) -> Result<SessionId, Self::Error> {
        self.next_id += 1;
        let Ok(id) = SessionId::new(self.next_id) else {
            unreachable!("ids count up from 1");
        };
        self.sessions.push(session.clone().with_id(id));
        Ok(id)
    }

    fn update(&mut self, session: &Session) -> Result<(), Self::Error> {
        if let Some(slot) = self.sessions.iter_mut().find(|s| s.id == session.id) {
            *slot = session.clone();
        }
        Ok(())
    }

    fn delete(&mut self, id: SessionId) -> Result<bool, Self::Error> {
        let existed = self.sessions.iter().any(|s| s.id == id);
        let mut doomed = vec![id];
        let mut idx = 0;
        while idx < doomed.len() {
            let parent = doomed[idx];
            doomed.extend(
                self.sessions
                    .iter()
                    .filter(|s| s.parent_session_id == Some(parent))
                    .map(|s| s.id),
            );
            idx += 1;
        }
        self.sessions.retain(|s| !doomed.contains(&s.id));
        for session in &mut self.sessions {
            if session.continues_session_id.is_some_and(|root| doomed.contains(&root)) {
                session.continues_session_id = None;
            }
        }
        Ok(existed)
    }

    fn get_by_id(&self, id: SessionId) -> Result<Option<Session>, Self::Error> {
        Ok(self.sessions.iter().find(|s| s.id == id).cloned())
    }

    fn get_active(&self) -> Result<Option<Session>, Self::Error> {
        Ok(self.sessions.iter().find(|s| s.is_active()).cloned())
    }

    fn get_children(&self, parent: SessionId) -> Result<Vec<Session>, Self::Error> {
        Ok(self.select(|s| s.parent_session_id == Some(parent)))
    }

    fn get_overlapping(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        exclude: Option<SessionId>,
    ) -> Result<Vec<Session>, Self::Error> {
        Ok(self.select(|s| {
            s.parent_session_id.is_none()
                && Some(s.id) != exclude
                && ranges_overlap(start, end, s.start_time, s.end_time)
        }))
    }

    fn get_continuation_chain(&self, root: SessionId) -> Result<Vec<Session>, Self::Error> {
        Ok(self.select(|s| s.id == root || s.continues_session_id == Some(root)))
    }

    fn list_paused(&self) -> Result<Vec<Session>, Self::Error> {
        let mut paused = self.select(|s| s.state == SessionState::Paused);
        paused.reverse();
        Ok(paused)
    }

    fn list_top_level_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, Self::Error> {
        Ok(self.select(|s| {
            s.parent_session_id.is_none() && s.start_time >= start && s.start_time < end
        }))
    }

    fn last_top_level_before(&self, at: DateTime<Utc>) -> Result<Option<Session>, Self::Error> {
        Ok(self
            .select(|s| s.parent_session_id.is_none() && s.start_time < at)
            .pop())
    }

    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, Self::Error> {
        Ok(self.select(|s| s.start_time >= start && s.start_time < end))
    }

    fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, TrackError>,
    ) -> Result<T, TrackError> {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }
}
