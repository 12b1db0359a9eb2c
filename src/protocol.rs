use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinSession {
        code: String,
        username: String,
    },
    /// Host-only: start the countdown
    StartGame {
        code: String,
        username: String,
    },
    SubmitAthlete {
        session_code: String,
        athlete_name: String,
        sport: String,
        username: String,
        /// Optional disambiguation hint (team, country, birth year, ...)
        #[serde(default)]
        hint: Option<String>,
    },
    /// Host-only
    PauseGame {
        code: String,
        username: String,
    },
    /// Host-only
    ResumeGame {
        code: String,
        username: String,
    },
    /// Host-only: end before the timer expires
    EndGameEarly {
        code: String,
        username: String,
    },
    /// Host-only: kick a player out of the session entirely
    RemovePlayer {
        code: String,
        username: String,
        target_username: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full state snapshot sent to a joining (or reconnecting) client
    SessionJoined {
        code: SessionCode,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
        athletes: Vec<AthleteInfo>,
        count: usize,
        users: Vec<UserStatusInfo>,
        your_submissions: usize,
        reconnected: bool,
        is_host: bool,
        host_username: String,
        leaderboard: Vec<LeaderboardEntry>,
        is_paused: bool,
        time_remaining_at_pause: Option<i64>,
    },
    UserJoined {
        username: String,
        users: Vec<UserStatusInfo>,
        user_count: usize,
        reconnected: bool,
    },
    UserLeft {
        username: String,
        users: Vec<UserStatusInfo>,
        user_count: usize,
        reason: String,
    },
    /// Broadcast after the host kicks a player
    UserRemoved {
        username: String,
        users: Vec<UserStatusInfo>,
        leaderboard: Vec<LeaderboardEntry>,
    },
    /// Sent directly to the kicked player
    PlayerRemoved {
        username: String,
        message: String,
    },
    GameStarted {
        started_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
    GamePaused {
        time_remaining: i64,
    },
    GameResumed {
        ends_at: DateTime<Utc>,
    },
    TimerTick {
        remaining: i64,
    },
    GameEnded {
        final_count: usize,
        goal_reached: bool,
        athletes: Vec<AthleteInfo>,
        leaderboard: Vec<LeaderboardEntry>,
        rejected_submissions: Vec<RejectedInfo>,
    },
    AthleteAdded {
        athlete: AthleteInfo,
        count: usize,
    },
    LeaderboardUpdate {
        leaderboard: Vec<LeaderboardEntry>,
    },
    /// Sent to the submitter when their submission is rejected
    SubmissionError {
        error: RejectReason,
        message: String,
        #[serde(default, skip_serializing_if = "is_false")]
        requires_hint: bool,
    },
    Error {
        message: String,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}
