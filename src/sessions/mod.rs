//! Realtime Sessions
//!
//! In-process registry of live coaching sessions. Sessions hold a rolling
//! transcript and activity timestamps; there is no persistence, a restart
//! drops them all. Stale entries are reaped by an explicit cleanup call
//! rather than a background task.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session already ended: {0}")]
    Ended(String),
}

/// One exchange in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub user_text: String,
    pub coach_text: String,
    pub timestamp: DateTime<Utc>,
}

/// A live coaching session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub coach_id: i64,
    pub transport: String,
    pub is_active: bool,
    pub is_processing: bool,
    pub transcript: Vec<TranscriptTurn>,
    pub turn_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    fn new(user_id: i64, coach_id: i64, transport: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            coach_id,
            transport,
            is_active: true,
            is_processing: false,
            transcript: Vec::new(),
            turn_count: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// The last `count` turns, oldest first, for prompt context.
    pub fn transcript_tail(&self, count: usize) -> &[TranscriptTurn] {
        let start = self.transcript.len().saturating_sub(count);
        &self.transcript[start..]
    }
}

/// Registry counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub by_transport: HashMap<String, usize>,
}

/// In-process session registry.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, user_id: i64, coach_id: i64, transport: &str) -> Session {
        let session = Session::new(user_id, coach_id, transport.to_string());
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        session
    }

    pub fn get(&self, session_id: &str) -> Result<Session, SessionError> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Remove the session and return its final state, marked inactive.
    pub fn end(&self, session_id: &str) -> Result<Session, SessionError> {
        let mut session = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.is_active = false;
        session.is_processing = false;
        Ok(session)
    }

    /// Record one completed exchange and bump the activity clock.
    pub fn add_turn(
        &self,
        session_id: &str,
        user_text: &str,
        coach_text: &str,
    ) -> Result<Session, SessionError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        session.transcript.push(TranscriptTurn {
            user_text: user_text.to_string(),
            coach_text: coach_text.to_string(),
            timestamp: Utc::now(),
        });
        session.turn_count += 1;
        session.last_activity = Utc::now();
        Ok(session.clone())
    }

    pub fn set_processing(&self, session_id: &str, processing: bool) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.is_processing = processing;
        session.last_activity = Utc::now();
        Ok(())
    }

    /// Drop sessions idle for longer than `max_idle_minutes`. Returns the
    /// number removed.
    pub fn cleanup_stale(&self, max_idle_minutes: i64) -> usize {
        let cutoff = Utc::now() - Duration::minutes(max_idle_minutes);
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.last_activity >= cutoff);
        before - sessions.len()
    }

    pub fn stats(&self) -> RegistryStats {
        let sessions = self.sessions.read();
        let mut by_transport: HashMap<String, usize> = HashMap::new();
        for session in sessions.values() {
            *by_transport.entry(session.transport.clone()).or_default() += 1;
        }
        RegistryStats {
            total_sessions: sessions.len(),
            active_sessions: sessions.values().filter(|s| s.is_active).count(),
            by_transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let registry = SessionRegistry::new();
        let session = registry.create(1, 2, "voice");

        let fetched = registry.get(&session.id).unwrap();
        assert_eq!(fetched.user_id, 1);
        assert_eq!(fetched.coach_id, 2);
        assert!(fetched.is_active);
        assert_eq!(fetched.turn_count, 0);
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let registry = SessionRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_end_removes_and_marks_inactive() {
        let registry = SessionRegistry::new();
        let session = registry.create(1, 2, "text");

        let ended = registry.end(&session.id).unwrap();
        assert!(!ended.is_active);
        assert!(registry.get(&session.id).is_err());
        assert!(matches!(
            registry.end(&session.id),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_turn_grows_transcript() {
        let registry = SessionRegistry::new();
        let session = registry.create(1, 2, "voice");

        registry.add_turn(&session.id, "hello", "hi there").unwrap();
        let updated = registry.add_turn(&session.id, "more", "sure").unwrap();

        assert_eq!(updated.turn_count, 2);
        assert_eq!(updated.transcript.len(), 2);
        assert_eq!(updated.transcript[0].user_text, "hello");
        assert_eq!(updated.transcript_tail(1)[0].user_text, "more");
    }

    #[test]
    fn test_cleanup_stale_removes_only_idle() {
        let registry = SessionRegistry::new();
        let stale = registry.create(1, 2, "voice");
        let fresh = registry.create(3, 4, "voice");

        {
            let mut sessions = registry.sessions.write();
            sessions.get_mut(&stale.id).unwrap().last_activity =
                Utc::now() - Duration::minutes(120);
        }

        assert_eq!(registry.cleanup_stale(60), 1);
        assert!(registry.get(&stale.id).is_err());
        assert!(registry.get(&fresh.id).is_ok());
    }

    #[test]
    fn test_stats_counts_by_transport() {
        let registry = SessionRegistry::new();
        registry.create(1, 2, "voice");
        registry.create(3, 2, "voice");
        registry.create(4, 5, "text");

        let stats = registry.stats();
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.active_sessions, 3);
        assert_eq!(stats.by_transport["voice"], 2);
        assert_eq!(stats.by_transport["text"], 1);
    }
}
