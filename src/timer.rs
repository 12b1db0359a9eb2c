//! Per-session countdown. One background task per active session ticks the
//! remaining time out to the room once a second and ends the game when the
//! deadline passes. Pause cancels the task outright; resume spawns a fresh
//! one against the pushed-back deadline.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep, Duration};

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{SessionStatus, AthleteInfo, RejectedInfo, SUBMISSION_TARGET};

/// Spawn the countdown task for a session, replacing (and aborting) any
/// previous one so pause/resume cycles never leave two timers running.
pub async fn start_timer(state: Arc<AppState>, code: &str) {
    let mut timers = state.timers.write().await;
    if let Some(old) = timers.remove(code) {
        old.abort();
    }
    let task_state = state.clone();
    let task_code = code.to_string();
    let handle = tokio::spawn(async move {
        run_countdown(task_state, task_code).await;
    });
    timers.insert(code.to_string(), handle);
}

/// Abort a session's countdown task if one is running.
pub async fn cancel_timer(state: &AppState, code: &str) {
    let mut timers = state.timers.write().await;
    if let Some(handle) = timers.remove(code) {
        handle.abort();
    }
}

async fn run_countdown(state: Arc<AppState>, code: String) {
    loop {
        sleep(Duration::from_secs(1)).await;

        // Re-read the deadline every tick: resume moves it, and the session
        // can end early underneath us
        let Some(session) = state.get_session(&code).await else {
            return;
        };
        if session.status != SessionStatus::Active || session.is_paused {
            return;
        }
        let Some(ends_at) = session.ends_at else {
            return;
        };

        let remaining = (ends_at - Utc::now()).num_seconds();
        if remaining <= 0 {
            tracing::info!("Time expired for session {}", code);
            // Drop our own handle without aborting: finish_game cancels the
            // session timer, and aborting the task that is running it would
            // cut off the end-of-game broadcast at the next await point
            state.timers.write().await.remove(&code);
            finish_game(&state, &code).await;
            return;
        }

        state
            .broadcast_to_room(&code, ServerMessage::TimerTick { remaining })
            .await;
    }
}

/// Transition a session to completed and broadcast the final results.
///
/// Idempotent: both the timer expiry path and the host's end-early action
/// funnel through here, and only the caller that actually performed the
/// transition emits the game-ended dump.
pub async fn finish_game(state: &AppState, code: &str) {
    match state.complete_session(code).await {
        Some(true) => {}
        Some(false) => {
            tracing::debug!("Session {} already completed", code);
            return;
        }
        None => return,
    }

    cancel_timer(state, code).await;

    let Some(session) = state.get_session(code).await else {
        return;
    };
    let final_count = session.athletes.len();
    let leaderboard = state.leaderboard(code).await;

    tracing::info!(
        "Game ended for session {}: {} athletes submitted",
        code,
        final_count
    );

    state
        .broadcast_to_room(
            code,
            ServerMessage::GameEnded {
                final_count,
                goal_reached: final_count >= SUBMISSION_TARGET,
                athletes: session.athletes.iter().map(AthleteInfo::from).collect(),
                leaderboard,
                rejected_submissions: session
                    .rejected_submissions
                    .iter()
                    .map(RejectedInfo::from)
                    .collect(),
            },
        )
        .await;
}
