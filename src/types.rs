use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Opaque ID types for type safety
pub type SessionCode = String;
pub type ConnId = String;
/// Wikidata Q-ID of a person (e.g. "Q615" for Lionel Messi)
pub type EntityId = String;
/// Wikidata Q-ID of a sport (e.g. "Q5372" for basketball)
pub type SportId = String;

/// Fixed game length once started
pub const GAME_DURATION_SECS: i64 = 2 * 60 * 60;
/// How long a disconnected player's name stays reserved
pub const RECLAIM_WINDOW_SECS: i64 = 5 * 60;
/// Collective target. A target, not a limit - the game runs until the timer expires.
pub const SUBMISSION_TARGET: usize = 2000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Completed,
}

/// An accepted submission. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Athlete {
    /// Display name; the resolver's canonical name when available, else the sanitized input
    pub name: String,
    /// Normalized form used for fallback duplicate detection
    pub normalized_name: String,
    pub sport: SportId,
    /// Human-readable sport label (e.g. "basketball")
    pub sport_display: Option<String>,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    /// Authoritative duplicate-detection key. None only on the degraded path
    /// where the resolver could not supply one.
    pub entity_id: Option<EntityId>,
    /// Disambiguation hint the submitter supplied, if any
    pub hint: Option<String>,
    /// Canonical name from the resolver, kept separately from `name` for reference
    pub canonical_name: Option<String>,
}

/// Why a submission was turned away
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingFields,
    AuthFailed,
    InvalidSport,
    InvalidInput,
    SessionNotFound,
    GameNotActive,
    GamePaused,
    DisambiguationRequired,
    Duplicate,
    InvalidAthlete,
    WrongSport,
    ValidationFailed,
}

/// Audit record of a rejected submission. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedSubmission {
    pub name: String,
    pub sport: SportId,
    pub username: String,
    pub reason: RejectReason,
    pub submitted_at: DateTime<Utc>,
}

/// Grace-period record for a disconnected player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectedUser {
    pub disconnected_at: DateTime<Utc>,
    /// Submission count at the moment of disconnection
    pub submissions_count: usize,
}

/// One contest instance. Owns all of its nested collections exclusively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub code: SessionCode,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub host_username: String,
    pub athletes: Vec<Athlete>,
    /// Normalized names seen so far (fallback duplicate key)
    pub athlete_names: HashSet<String>,
    /// Entity IDs seen so far (authoritative duplicate key)
    pub athlete_entity_ids: HashSet<EntityId>,
    /// Live connections: transport id -> username
    pub connected_users: HashMap<ConnId, String>,
    /// Recently departed players, by username
    pub disconnected_users: HashMap<String, DisconnectedUser>,
    pub rejected_submissions: Vec<RejectedSubmission>,
    // Pause is a reversible sub-state of "active"
    pub is_paused: bool,
    pub time_remaining_at_pause: Option<i64>,
}

impl Session {
    pub fn new(code: SessionCode, host_username: String) -> Self {
        Self {
            code,
            status: SessionStatus::Waiting,
            created_at: Utc::now(),
            started_at: None,
            ends_at: None,
            host_username,
            athletes: Vec::new(),
            athlete_names: HashSet::new(),
            athlete_entity_ids: HashSet::new(),
            connected_users: HashMap::new(),
            disconnected_users: HashMap::new(),
            rejected_submissions: Vec::new(),
            is_paused: false,
            time_remaining_at_pause: None,
        }
    }
}

/// Roster entry with connection status, as shown to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStatusInfo {
    pub username: String,
    pub is_connected: bool,
    pub is_host: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub username: String,
    pub score: usize,
    pub rank: usize,
}

/// Public view of an accepted submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthleteInfo {
    pub name: String,
    pub sport: String,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_name: Option<String>,
}

impl From<&Athlete> for AthleteInfo {
    fn from(a: &Athlete) -> Self {
        Self {
            name: a.name.clone(),
            sport: a.sport_display.clone().unwrap_or_else(|| a.sport.clone()),
            submitted_by: a.submitted_by.clone(),
            submitted_at: a.submitted_at,
            canonical_name: a.canonical_name.clone(),
        }
    }
}

/// Public view of a rejected submission (part of the end-of-game dump)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedInfo {
    pub name: String,
    pub sport: String,
    pub username: String,
    pub reason: RejectReason,
}

impl From<&RejectedSubmission> for RejectedInfo {
    fn from(r: &RejectedSubmission) -> Self {
        Self {
            name: r.name.clone(),
            sport: r.sport.clone(),
            username: r.username.clone(),
            reason: r.reason,
        }
    }
}
