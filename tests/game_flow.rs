use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use rosterdash::config::ServerConfig;
use rosterdash::protocol::{ClientMessage, ServerMessage};
use rosterdash::resolver::{EntityResolver, Resolution, ResolverResult};
use rosterdash::sports::SportCatalog;
use rosterdash::state::AppState;
use rosterdash::types::{RejectReason, SessionStatus};
use rosterdash::ws::handlers::{handle_disconnect, handle_join, handle_message};
use tokio::sync::{broadcast, mpsc};

const SOCCER: &str = "Q2736";

/// Resolver scripted by (lowercased name, lowercased hint)
struct ScriptedResolver {
    responses: HashMap<(String, Option<String>), Resolution>,
}

impl ScriptedResolver {
    fn new(entries: &[(&str, Option<&str>, Resolution)]) -> Self {
        Self {
            responses: entries
                .iter()
                .map(|(name, hint, res)| {
                    (
                        (name.to_lowercase(), hint.map(|h| h.to_lowercase())),
                        res.clone(),
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl EntityResolver for ScriptedResolver {
    async fn resolve(
        &self,
        name: &str,
        _sport: &String,
        hint: Option<&str>,
    ) -> ResolverResult<Resolution> {
        let keyed = (name.to_lowercase(), hint.map(|h| h.to_lowercase()));
        if let Some(res) = self.responses.get(&keyed) {
            return Ok(res.clone());
        }
        // Fall back to the hintless entry so hints don't change unambiguous names
        Ok(self
            .responses
            .get(&(name.to_lowercase(), None))
            .cloned()
            .unwrap_or(Resolution::NotFound))
    }
}

fn resolved(entity_id: &str, canonical: &str) -> Resolution {
    Resolution::Resolved {
        entity_id: entity_id.to_string(),
        canonical_name: Some(canonical.to_string()),
    }
}

fn contest_state() -> Arc<AppState> {
    let resolver = ScriptedResolver::new(&[
        ("lionel messi", None, resolved("Q615", "Lionel Messi")),
        ("messi", None, resolved("Q615", "Lionel Messi")),
        (
            "ronaldo",
            None,
            Resolution::Ambiguous {
                candidates: vec!["Q11571".to_string(), "Q82133".to_string()],
            },
        ),
        ("ronaldo", Some("portugal"), resolved("Q11571", "Cristiano Ronaldo")),
        ("ronaldo", Some("brazil"), resolved("Q82133", "Ronaldo Nazário")),
        ("neymar", None, resolved("Q142794", "Neymar")),
    ]);
    Arc::new(AppState::new(
        Arc::new(resolver),
        SportCatalog::builtin(),
        ServerConfig::default(),
    ))
}

fn submit(code: &str, username: &str, name: &str, hint: Option<&str>) -> ClientMessage {
    ClientMessage::SubmitAthlete {
        session_code: code.to_string(),
        athlete_name: name.to_string(),
        sport: SOCCER.to_string(),
        username: username.to_string(),
        hint: hint.map(String::from),
    }
}

/// Pop room broadcasts until one matches, skipping timer ticks.
fn next_room(rx: &mut broadcast::Receiver<ServerMessage>) -> ServerMessage {
    loop {
        match rx.try_recv() {
            Ok(ServerMessage::TimerTick { .. }) => continue,
            Ok(msg) => return msg,
            Err(e) => panic!("expected a room broadcast, got {:?}", e),
        }
    }
}

fn next_direct(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
    match rx.try_recv() {
        Ok(msg) => msg,
        Err(e) => panic!("expected a direct message, got {:?}", e),
    }
}

fn drain_room(rx: &mut broadcast::Receiver<ServerMessage>) {
    while rx.try_recv().is_ok() {}
}

/// End-to-end flow: join, start, submit through every interesting branch of
/// the pipeline, end early, and verify the final dump.
#[tokio::test]
async fn test_full_game_flow() {
    let state = contest_state();
    let session = state.create_session("alice").await;
    let code = session.code.clone();

    // Host and one player join
    let mut alice_direct = state.register_conn("conn-alice").await;
    let mut alice_room = handle_join(&state, "conn-alice", &code, "alice")
        .await
        .expect("host join");
    match next_direct(&mut alice_direct) {
        ServerMessage::SessionJoined { is_host, status, .. } => {
            assert!(is_host);
            assert_eq!(status, SessionStatus::Waiting);
        }
        other => panic!("expected session_joined, got {:?}", other),
    }

    let mut bob_direct = state.register_conn("conn-bob").await;
    let mut bob_room = handle_join(&state, "conn-bob", &code, "bob")
        .await
        .expect("player join");
    match next_direct(&mut bob_direct) {
        ServerMessage::SessionJoined { is_host, .. } => assert!(!is_host),
        other => panic!("expected session_joined, got {:?}", other),
    }
    match next_room(&mut alice_room) {
        ServerMessage::UserJoined { username, user_count, .. } => {
            assert_eq!(username, "bob");
            assert_eq!(user_count, 2);
        }
        other => panic!("expected user_joined, got {:?}", other),
    }

    // Submissions before the start are rejected
    handle_message(&state, "conn-bob", submit(&code, "bob", "Messi", None)).await;
    match next_direct(&mut bob_direct) {
        ServerMessage::SubmissionError { error, .. } => {
            assert_eq!(error, RejectReason::GameNotActive)
        }
        other => panic!("expected submission_error, got {:?}", other),
    }

    // Host starts the game
    handle_message(
        &state,
        "conn-alice",
        ClientMessage::StartGame {
            code: code.clone(),
            username: "alice".to_string(),
        },
    )
    .await;
    assert!(matches!(
        next_room(&mut alice_room),
        ServerMessage::GameStarted { .. }
    ));
    drain_room(&mut bob_room);

    // First submission accepted, canonical name preferred
    handle_message(&state, "conn-bob", submit(&code, "bob", "messi", None)).await;
    match next_room(&mut alice_room) {
        ServerMessage::AthleteAdded { athlete, count } => {
            assert_eq!(athlete.name, "Lionel Messi");
            assert_eq!(count, 1);
        }
        other => panic!("expected athlete_added, got {:?}", other),
    }
    match next_room(&mut alice_room) {
        ServerMessage::LeaderboardUpdate { leaderboard } => {
            assert_eq!(leaderboard[0].username, "bob");
            assert_eq!(leaderboard[0].score, 1);
        }
        other => panic!("expected leaderboard_update, got {:?}", other),
    }

    // Another spelling of the same athlete is a duplicate
    handle_message(&state, "conn-alice", submit(&code, "alice", "Lionel Messi", None)).await;
    match next_direct(&mut alice_direct) {
        ServerMessage::SubmissionError { error, message, .. } => {
            assert_eq!(error, RejectReason::Duplicate);
            assert!(message.contains("Lionel Messi"));
        }
        other => panic!("expected submission_error, got {:?}", other),
    }

    // Ambiguous surname requires a hint
    handle_message(&state, "conn-bob", submit(&code, "bob", "Ronaldo", None)).await;
    match next_direct(&mut bob_direct) {
        ServerMessage::SubmissionError {
            error,
            requires_hint,
            ..
        } => {
            assert_eq!(error, RejectReason::DisambiguationRequired);
            assert!(requires_hint);
        }
        other => panic!("expected submission_error, got {:?}", other),
    }

    // A hint resolves it
    handle_message(
        &state,
        "conn-bob",
        submit(&code, "bob", "Ronaldo", Some("Portugal")),
    )
    .await;
    drain_room(&mut alice_room);
    drain_room(&mut bob_room);

    // The surname is still ambiguous, but now flagged as partially taken
    handle_message(&state, "conn-alice", submit(&code, "alice", "Ronaldo", None)).await;
    match next_direct(&mut alice_direct) {
        ServerMessage::SubmissionError { error, message, .. } => {
            assert_eq!(error, RejectReason::DisambiguationRequired);
            assert!(message.contains("Some have already been submitted"));
        }
        other => panic!("expected submission_error, got {:?}", other),
    }

    // The other candidate is still submittable
    handle_message(
        &state,
        "conn-alice",
        submit(&code, "alice", "Ronaldo", Some("Brazil")),
    )
    .await;
    drain_room(&mut alice_room);
    drain_room(&mut bob_room);

    // Host ends the game early; everyone gets the final dump exactly once
    handle_message(
        &state,
        "conn-alice",
        ClientMessage::EndGameEarly {
            code: code.clone(),
            username: "alice".to_string(),
        },
    )
    .await;
    match next_room(&mut bob_room) {
        ServerMessage::GameEnded {
            final_count,
            goal_reached,
            athletes,
            leaderboard,
            rejected_submissions,
        } => {
            assert_eq!(final_count, 3);
            assert!(!goal_reached);
            assert_eq!(athletes.len(), 3);
            assert_eq!(leaderboard.len(), 2);
            // Ambiguity probes without a record plus the two real rejections
            assert!(!rejected_submissions.is_empty());
        }
        other => panic!("expected game_ended, got {:?}", other),
    }

    // A second end attempt changes nothing
    handle_message(
        &state,
        "conn-alice",
        ClientMessage::EndGameEarly {
            code: code.clone(),
            username: "alice".to_string(),
        },
    )
    .await;
    match next_direct(&mut alice_direct) {
        ServerMessage::Error { message } => assert_eq!(message, "Game is not active"),
        other => panic!("expected error, got {:?}", other),
    }

    // Nobody can join a completed session
    let mut late_direct = state.register_conn("conn-late").await;
    assert!(handle_join(&state, "conn-late", &code, "carol").await.is_none());
    match next_direct(&mut late_direct) {
        ServerMessage::Error { message } => assert_eq!(message, "This session has ended"),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn pause_blocks_submissions_and_resume_extends_deadline() {
    let state = contest_state();
    let session = state.create_session("alice").await;
    let code = session.code.clone();

    let mut alice_direct = state.register_conn("conn-alice").await;
    let mut alice_room = handle_join(&state, "conn-alice", &code, "alice")
        .await
        .expect("host join");
    next_direct(&mut alice_direct);

    handle_message(
        &state,
        "conn-alice",
        ClientMessage::StartGame {
            code: code.clone(),
            username: "alice".to_string(),
        },
    )
    .await;
    let ends_at_before = state.get_session(&code).await.unwrap().ends_at.unwrap();
    drain_room(&mut alice_room);

    handle_message(
        &state,
        "conn-alice",
        ClientMessage::PauseGame {
            code: code.clone(),
            username: "alice".to_string(),
        },
    )
    .await;
    match next_room(&mut alice_room) {
        ServerMessage::GamePaused { time_remaining } => assert!(time_remaining > 0),
        other => panic!("expected game_paused, got {:?}", other),
    }

    // Submissions are refused while paused
    handle_message(&state, "conn-alice", submit(&code, "alice", "Neymar", None)).await;
    match next_direct(&mut alice_direct) {
        ServerMessage::SubmissionError { error, .. } => {
            assert_eq!(error, RejectReason::GamePaused)
        }
        other => panic!("expected submission_error, got {:?}", other),
    }

    // Pausing twice is refused
    handle_message(
        &state,
        "conn-alice",
        ClientMessage::PauseGame {
            code: code.clone(),
            username: "alice".to_string(),
        },
    )
    .await;
    match next_direct(&mut alice_direct) {
        ServerMessage::Error { message } => {
            assert_eq!(message, "Cannot pause: game is not active")
        }
        other => panic!("expected error, got {:?}", other),
    }

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    handle_message(
        &state,
        "conn-alice",
        ClientMessage::ResumeGame {
            code: code.clone(),
            username: "alice".to_string(),
        },
    )
    .await;
    let resumed_ends_at = match next_room(&mut alice_room) {
        ServerMessage::GameResumed { ends_at } => ends_at,
        other => panic!("expected game_resumed, got {:?}", other),
    };
    // The deadline moved back by at least the paused duration
    assert!(resumed_ends_at > ends_at_before);

    // Submissions work again
    handle_message(&state, "conn-alice", submit(&code, "alice", "Neymar", None)).await;
    match next_room(&mut alice_room) {
        ServerMessage::AthleteAdded { athlete, .. } => assert_eq!(athlete.name, "Neymar"),
        other => panic!("expected athlete_added, got {:?}", other),
    }
}

#[tokio::test]
async fn reconnect_within_grace_window_keeps_attribution() {
    let state = contest_state();
    let session = state.create_session("alice").await;
    let code = session.code.clone();

    let mut alice_direct = state.register_conn("conn-alice").await;
    let mut alice_room = handle_join(&state, "conn-alice", &code, "alice")
        .await
        .expect("host join");
    next_direct(&mut alice_direct);

    state.register_conn("conn-bob").await;
    handle_join(&state, "conn-bob", &code, "bob").await.expect("player join");
    drain_room(&mut alice_room);

    handle_message(
        &state,
        "conn-alice",
        ClientMessage::StartGame {
            code: code.clone(),
            username: "alice".to_string(),
        },
    )
    .await;
    drain_room(&mut alice_room);

    handle_message(&state, "conn-bob", submit(&code, "bob", "Messi", None)).await;
    drain_room(&mut alice_room);

    // Bob's transport drops
    state.unregister_conn("conn-bob").await;
    handle_disconnect(&state, "conn-bob").await;
    match next_room(&mut alice_room) {
        ServerMessage::UserLeft { username, reason, .. } => {
            assert_eq!(username, "bob");
            assert_eq!(reason, "disconnected");
        }
        other => panic!("expected user_left, got {:?}", other),
    }

    // Within the grace window the name is reclaimable and carries the
    // departed identity with it
    let mut bob2_direct = state.register_conn("conn-bob2").await;
    let _bob2_room = handle_join(&state, "conn-bob2", &code, "bob")
        .await
        .expect("reclaim join");
    match next_direct(&mut bob2_direct) {
        ServerMessage::SessionJoined {
            reconnected,
            your_submissions,
            ..
        } => {
            assert!(reconnected);
            assert_eq!(your_submissions, 1);
        }
        other => panic!("expected session_joined, got {:?}", other),
    }

    // And the reclaimed identity can keep submitting
    handle_message(&state, "conn-bob2", submit(&code, "bob", "Neymar", None)).await;
    drain_room(&mut alice_room);
    let leaderboard = state.leaderboard(&code).await;
    let bob_entry = leaderboard.iter().find(|e| e.username == "bob").unwrap();
    assert_eq!(bob_entry.score, 2);
}

#[tokio::test]
async fn removed_player_is_notified_and_leaves_the_roster() {
    let state = contest_state();
    let session = state.create_session("alice").await;
    let code = session.code.clone();

    let mut alice_direct = state.register_conn("conn-alice").await;
    let mut alice_room = handle_join(&state, "conn-alice", &code, "alice")
        .await
        .expect("host join");
    next_direct(&mut alice_direct);

    let mut bob_direct = state.register_conn("conn-bob").await;
    handle_join(&state, "conn-bob", &code, "bob").await.expect("player join");
    next_direct(&mut bob_direct);
    drain_room(&mut alice_room);

    // Host cannot remove themself
    handle_message(
        &state,
        "conn-alice",
        ClientMessage::RemovePlayer {
            code: code.clone(),
            username: "alice".to_string(),
            target_username: "alice".to_string(),
        },
    )
    .await;
    match next_direct(&mut alice_direct) {
        ServerMessage::Error { message } => assert_eq!(message, "Cannot remove yourself"),
        other => panic!("expected error, got {:?}", other),
    }

    handle_message(
        &state,
        "conn-alice",
        ClientMessage::RemovePlayer {
            code: code.clone(),
            username: "alice".to_string(),
            target_username: "bob".to_string(),
        },
    )
    .await;

    match next_direct(&mut bob_direct) {
        ServerMessage::PlayerRemoved { username, .. } => assert_eq!(username, "bob"),
        other => panic!("expected player_removed, got {:?}", other),
    }
    match next_room(&mut alice_room) {
        ServerMessage::UserRemoved { username, users, .. } => {
            assert_eq!(username, "bob");
            assert!(users.iter().all(|u| u.username != "bob"));
        }
        other => panic!("expected user_removed, got {:?}", other),
    }

    // A removed name is free immediately, with no grace record
    assert!(!state.can_reclaim(&code, "bob").await);
}
