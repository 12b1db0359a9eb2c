use super::AppState;
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Session codes: uppercase alphanumeric, collision-checked on generation
const CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 6;

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

impl AppState {
    /// Create a new session in the waiting state
    pub async fn create_session(&self, host_username: &str) -> Session {
        let mut sessions = self.sessions.write().await;

        let code = loop {
            let candidate = generate_code();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let session = Session::new(code.clone(), host_username.to_string());
        sessions.insert(code.clone(), session.clone());
        tracing::info!("Created session: {} (host: {})", code, host_username);
        session
    }

    pub async fn get_session(&self, code: &str) -> Option<Session> {
        self.sessions.read().await.get(code).cloned()
    }

    /// Start the countdown. Fails unless the session is still waiting.
    pub async fn start_session(&self, code: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(code) else {
            return false;
        };
        if session.status != SessionStatus::Waiting {
            return false;
        }

        let now = Utc::now();
        session.status = SessionStatus::Active;
        session.started_at = Some(now);
        session.ends_at = Some(now + Duration::seconds(GAME_DURATION_SECS));
        tracing::info!("Started session {}, ends at {:?}", code, session.ends_at);
        true
    }

    /// Pause an active session, capturing the seconds remaining.
    /// Returns None if the session is missing, not active, or already paused.
    pub async fn pause_session(&self, code: &str) -> Option<i64> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(code)?;
        if session.status != SessionStatus::Active || session.is_paused {
            return None;
        }

        let ends_at = session.ends_at?;
        let remaining = (ends_at - Utc::now()).num_seconds().max(0);

        session.is_paused = true;
        session.time_remaining_at_pause = Some(remaining);
        tracing::info!("Session {} paused with {}s remaining", code, remaining);
        Some(remaining)
    }

    /// Resume a paused session, recomputing the end time from the stored
    /// remainder. Returns the new end time.
    pub async fn resume_session(&self, code: &str) -> Option<DateTime<Utc>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(code)?;
        if session.status != SessionStatus::Active || !session.is_paused {
            return None;
        }

        let remaining = session.time_remaining_at_pause.unwrap_or(0);
        let new_ends_at = Utc::now() + Duration::seconds(remaining);
        session.ends_at = Some(new_ends_at);
        session.is_paused = false;
        session.time_remaining_at_pause = None;

        tracing::info!("Session {} resumed, new ends_at: {}", code, new_ends_at);
        Some(new_ends_at)
    }

    /// Mark a session completed. Idempotent: completed is terminal.
    ///
    /// Returns None for an unknown code, Some(true) if this call performed
    /// the transition, Some(false) if the session was already completed.
    pub async fn complete_session(&self, code: &str) -> Option<bool> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(code)?;
        if session.status == SessionStatus::Completed {
            return Some(false);
        }

        session.status = SessionStatus::Completed;
        session.is_paused = false;
        session.time_remaining_at_pause = None;
        tracing::info!(
            "Ended session {}, final count: {}",
            code,
            session.athletes.len()
        );
        Some(true)
    }

    pub async fn is_host(&self, code: &str, username: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(code)
            .map(|s| s.host_username == username)
            .unwrap_or(false)
    }

    /// Which session does this connection belong to?
    pub async fn find_code_by_conn(&self, conn_id: &str) -> Option<SessionCode> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.connected_users.contains_key(conn_id))
            .map(|s| s.code.clone())
    }
}
