//! WebSocket message dispatch
//!
//! Join is handled separately because it wires the socket into a session
//! room; every other message is dispatched here. All replies go through the
//! connection registry, broadcasts through the session room.

use std::sync::Arc;

use crate::pipeline::{self, SubmitRequest};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, RemovedUser};
use crate::timer;
use crate::types::{AthleteInfo, SessionStatus};
use tokio::sync::broadcast;

async fn send_error(state: &AppState, conn_id: &str, message: impl Into<String>) {
    state
        .send_to_conn(
            conn_id,
            ServerMessage::Error {
                message: message.into(),
            },
        )
        .await;
}

/// Admit a connection into a session.
///
/// On success the joiner gets a full state snapshot over their direct
/// channel, the room is told about the new user, and the room receiver for
/// this socket is returned. The user-joined broadcast goes out *before* the
/// joiner subscribes, so they never see their own announcement.
pub async fn handle_join(
    state: &Arc<AppState>,
    conn_id: &str,
    code: &str,
    username: &str,
) -> Option<broadcast::Receiver<ServerMessage>> {
    let username = username.trim();
    if username.is_empty() {
        send_error(state, conn_id, "Username is required").await;
        return None;
    }

    // One session per socket. Allowing a second join would strand this
    // connection's roster entry in the first session, since disconnect
    // teardown only covers one.
    if let Some(existing) = state.find_code_by_conn(conn_id).await {
        tracing::warn!(
            "Connection {} tried to join {} while in {}",
            conn_id,
            code,
            existing
        );
        send_error(state, conn_id, "Already in a session").await;
        return None;
    }

    let Some(session) = state.get_session(code).await else {
        send_error(state, conn_id, "Session not found").await;
        return None;
    };
    if session.status == SessionStatus::Completed {
        send_error(state, conn_id, "This session has ended").await;
        return None;
    }

    // A name in the reclaim window belongs to whoever left with it; anyone
    // else holding it live blocks the join
    let reconnected = state.can_reclaim(code, username).await;
    if !reconnected && state.is_name_held_by_other(code, username, conn_id).await {
        send_error(state, conn_id, "Username already in use").await;
        return None;
    }

    state.connect_user(code, conn_id, username).await;
    tracing::info!(
        "{} {} session {}",
        username,
        if reconnected { "reconnected to" } else { "joined" },
        code
    );

    let Some(session) = state.get_session(code).await else {
        return None;
    };
    let users = state.users_with_status(code).await;
    let leaderboard = state.leaderboard(code).await;
    let your_submissions = state.submission_count(code, username).await;

    state
        .send_to_conn(
            conn_id,
            ServerMessage::SessionJoined {
                code: session.code.clone(),
                status: session.status,
                started_at: session.started_at,
                ends_at: session.ends_at,
                athletes: session.athletes.iter().map(AthleteInfo::from).collect(),
                count: session.athletes.len(),
                users: users.clone(),
                your_submissions,
                reconnected,
                is_host: session.host_username == username,
                host_username: session.host_username.clone(),
                leaderboard,
                is_paused: session.is_paused,
                time_remaining_at_pause: session.time_remaining_at_pause,
            },
        )
        .await;

    state
        .broadcast_to_room(
            code,
            ServerMessage::UserJoined {
                username: username.to_string(),
                users,
                user_count: state.connected_count(code).await,
                reconnected,
            },
        )
        .await;

    Some(state.subscribe_room(code).await)
}

/// Tear down a departed connection: drop any session membership into the
/// reclaim window and tell the room.
pub async fn handle_disconnect(state: &Arc<AppState>, conn_id: &str) {
    let Some(code) = state.find_code_by_conn(conn_id).await else {
        return;
    };
    let Some(username) = state.disconnect_user(&code, conn_id).await else {
        return;
    };
    tracing::info!("{} disconnected from session {}", username, code);

    state
        .broadcast_to_room(
            &code,
            ServerMessage::UserLeft {
                username,
                users: state.users_with_status(&code).await,
                user_count: state.connected_count(&code).await,
                reason: "disconnected".to_string(),
            },
        )
        .await;
}

/// Claimed identities on host actions are checked against the connection
/// registry before the host check itself.
async fn authorize_host(
    state: &AppState,
    conn_id: &str,
    code: &str,
    username: &str,
    action: &str,
) -> bool {
    if !state.verify_sender(code, conn_id, username).await {
        send_error(state, conn_id, "Authentication failed").await;
        return false;
    }
    if !state.is_host(code, username).await {
        send_error(state, conn_id, format!("Only the host can {action}")).await;
        return false;
    }
    true
}

/// Handle post-join client messages.
pub async fn handle_message(state: &Arc<AppState>, conn_id: &str, msg: ClientMessage) {
    match msg {
        ClientMessage::JoinSession { .. } => {
            // Handled by the socket loop before dispatch
            tracing::debug!("Duplicate join handling skipped");
        }

        ClientMessage::StartGame { code, username } => {
            if !authorize_host(state, conn_id, &code, &username, "start the game").await {
                return;
            }
            if !state.start_session(&code).await {
                send_error(state, conn_id, "Game already started").await;
                return;
            }
            let Some(session) = state.get_session(&code).await else {
                return;
            };
            let (Some(started_at), Some(ends_at)) = (session.started_at, session.ends_at) else {
                return;
            };
            tracing::info!("Game started for session {}", code);
            state
                .broadcast_to_room(&code, ServerMessage::GameStarted { started_at, ends_at })
                .await;
            timer::start_timer(state.clone(), &code).await;
        }

        ClientMessage::PauseGame { code, username } => {
            if !authorize_host(state, conn_id, &code, &username, "pause the game").await {
                return;
            }
            let Some(time_remaining) = state.pause_session(&code).await else {
                send_error(state, conn_id, "Cannot pause: game is not active").await;
                return;
            };
            timer::cancel_timer(state, &code).await;
            tracing::info!(
                "Game paused for session {} with {}s remaining",
                code,
                time_remaining
            );
            state
                .broadcast_to_room(&code, ServerMessage::GamePaused { time_remaining })
                .await;
        }

        ClientMessage::ResumeGame { code, username } => {
            if !authorize_host(state, conn_id, &code, &username, "resume the game").await {
                return;
            }
            let Some(ends_at) = state.resume_session(&code).await else {
                send_error(state, conn_id, "Cannot resume: game is not paused").await;
                return;
            };
            tracing::info!("Game resumed for session {}", code);
            state
                .broadcast_to_room(&code, ServerMessage::GameResumed { ends_at })
                .await;
            timer::start_timer(state.clone(), &code).await;
        }

        ClientMessage::EndGameEarly { code, username } => {
            if !authorize_host(state, conn_id, &code, &username, "end the game").await {
                return;
            }
            let active = state
                .get_session(&code)
                .await
                .map(|s| s.status == SessionStatus::Active)
                .unwrap_or(false);
            if !active {
                send_error(state, conn_id, "Game is not active").await;
                return;
            }
            tracing::info!("Host ended session {} early", code);
            timer::finish_game(state, &code).await;
        }

        ClientMessage::RemovePlayer {
            code,
            username,
            target_username,
        } => {
            if !authorize_host(state, conn_id, &code, &username, "remove players").await {
                return;
            }
            if target_username == username {
                send_error(state, conn_id, "Cannot remove yourself").await;
                return;
            }
            match state.remove_user(&code, &target_username).await {
                RemovedUser::Connected(target_conn) => {
                    state
                        .send_to_conn(
                            &target_conn,
                            ServerMessage::PlayerRemoved {
                                username: target_username.clone(),
                                message: "You have been removed from the session by the host"
                                    .to_string(),
                            },
                        )
                        .await;
                }
                RemovedUser::Departed => {}
                RemovedUser::NotFound => {
                    send_error(state, conn_id, "Player not found").await;
                    return;
                }
            }
            tracing::info!("{} removed from session {} by host", target_username, code);
            state
                .broadcast_to_room(
                    &code,
                    ServerMessage::UserRemoved {
                        username: target_username,
                        users: state.users_with_status(&code).await,
                        leaderboard: state.leaderboard(&code).await,
                    },
                )
                .await;
        }

        ClientMessage::SubmitAthlete {
            session_code,
            athlete_name,
            sport,
            username,
            hint,
        } => {
            let code = session_code.clone();
            let outcome = pipeline::process_submission(
                state,
                conn_id,
                SubmitRequest {
                    session_code,
                    athlete_name,
                    sport,
                    username,
                    hint,
                },
            )
            .await;

            match outcome {
                Ok(accepted) => {
                    state
                        .broadcast_to_room(
                            &code,
                            ServerMessage::AthleteAdded {
                                athlete: AthleteInfo::from(&accepted.athlete),
                                count: accepted.count,
                            },
                        )
                        .await;
                    state
                        .broadcast_to_room(
                            &code,
                            ServerMessage::LeaderboardUpdate {
                                leaderboard: state.leaderboard(&code).await,
                            },
                        )
                        .await;
                }
                Err(rejection) => {
                    state
                        .send_to_conn(
                            conn_id,
                            ServerMessage::SubmissionError {
                                error: rejection.reason,
                                message: rejection.message,
                                requires_hint: rejection.requires_hint,
                            },
                        )
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn join_rejected_once_session_completed() {
        let state = Arc::new(test_state());
        let session = state.create_session("alice").await;
        let code = session.code.clone();
        state.start_session(&code).await;
        state.complete_session(&code).await;

        let mut rx = state.register_conn("c1").await;
        assert!(handle_join(&state, "c1", &code, "bob").await.is_none());

        let reply = rx.recv().await.unwrap();
        match reply {
            ServerMessage::Error { message } => assert_eq!(message, "This session has ended"),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn join_rejects_live_name_but_allows_reclaim() {
        let state = Arc::new(test_state());
        let session = state.create_session("alice").await;
        let code = session.code.clone();

        let mut rx1 = state.register_conn("c1").await;
        assert!(handle_join(&state, "c1", &code, "bob").await.is_some());
        match rx1.recv().await.unwrap() {
            ServerMessage::SessionJoined { reconnected, .. } => assert!(!reconnected),
            other => panic!("unexpected reply: {:?}", other),
        }

        // Same name from a second live connection is rejected
        let mut rx2 = state.register_conn("c2").await;
        assert!(handle_join(&state, "c2", &code, "bob").await.is_none());
        match rx2.recv().await.unwrap() {
            ServerMessage::Error { message } => assert_eq!(message, "Username already in use"),
            other => panic!("unexpected reply: {:?}", other),
        }

        // After a disconnect the name is reclaimable within the grace window
        state.disconnect_user(&code, "c1").await;
        let mut rx3 = state.register_conn("c3").await;
        assert!(handle_join(&state, "c3", &code, "bob").await.is_some());
        match rx3.recv().await.unwrap() {
            ServerMessage::SessionJoined { reconnected, .. } => assert!(reconnected),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn second_join_on_a_bound_connection_is_rejected() {
        let state = Arc::new(test_state());
        let first = state.create_session("alice").await;
        let second = state.create_session("zara").await;

        let mut rx = state.register_conn("c1").await;
        assert!(handle_join(&state, "c1", &first.code, "bob").await.is_some());
        // Drain the join snapshot
        rx.recv().await.unwrap();

        assert!(handle_join(&state, "c1", &second.code, "bob").await.is_none());
        match rx.recv().await.unwrap() {
            ServerMessage::Error { message } => assert_eq!(message, "Already in a session"),
            other => panic!("unexpected reply: {:?}", other),
        }

        // Still a member of the first session only, so the disconnect
        // teardown has exactly one entry to clean up
        let roster = state.get_session(&first.code).await.unwrap().connected_users;
        assert_eq!(roster.len(), 1);
        assert!(state
            .get_session(&second.code)
            .await
            .unwrap()
            .connected_users
            .is_empty());

        handle_disconnect(&state, "c1").await;
        assert!(state
            .get_session(&first.code)
            .await
            .unwrap()
            .connected_users
            .is_empty());
    }

    #[tokio::test]
    async fn joiner_does_not_see_their_own_announcement() {
        let state = Arc::new(test_state());
        let session = state.create_session("alice").await;
        let code = session.code.clone();

        state.register_conn("c1").await;
        let mut alice_room = handle_join(&state, "c1", &code, "alice").await.unwrap();

        state.register_conn("c2").await;
        let mut bob_room = handle_join(&state, "c2", &code, "bob").await.unwrap();

        // Alice sees bob join; bob's own room receiver starts empty
        match alice_room.recv().await.unwrap() {
            ServerMessage::UserJoined { username, .. } => assert_eq!(username, "bob"),
            other => panic!("unexpected broadcast: {:?}", other),
        }
        assert!(bob_room.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_host_cannot_start_the_game() {
        let state = Arc::new(test_state());
        let session = state.create_session("alice").await;
        let code = session.code.clone();

        state.register_conn("c1").await;
        handle_join(&state, "c1", &code, "bob").await.unwrap();

        let mut rx = state.register_conn("c2").await;
        handle_join(&state, "c2", &code, "carol").await.unwrap();
        // Drain the join snapshot
        rx.recv().await.unwrap();

        handle_message(
            &state,
            "c2",
            ClientMessage::StartGame {
                code: code.clone(),
                username: "carol".to_string(),
            },
        )
        .await;

        match rx.recv().await.unwrap() {
            ServerMessage::Error { message } => {
                assert_eq!(message, "Only the host can start the game")
            }
            other => panic!("unexpected reply: {:?}", other),
        }
        assert_eq!(
            state.get_session(&code).await.unwrap().status,
            SessionStatus::Waiting
        );
    }
}
