//! The submission pipeline: sanitize -> resolve -> disambiguate -> dedup ->
//! commit, atomic per session.
//!
//! Step order matters. Ambiguity is checked against the session's already
//! accepted entity ids *before* the plain duplicate check, because accepted
//! candidates can resolve ambiguity on their own: once every athlete matching
//! a search term has been submitted, the term is simply a duplicate, not
//! ambiguous. The resolver call happens before the session's submit lock is
//! taken; no network I/O runs inside the critical section.

use crate::resolver::Resolution;
use crate::sanitize::{normalize_name, sanitize_name};
use crate::state::AppState;
use crate::types::*;
use chrono::Utc;

#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub session_code: String,
    pub athlete_name: String,
    pub sport: String,
    pub username: String,
    pub hint: Option<String>,
}

/// A tagged rejection, ready to be sent back to the submitter
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub message: String,
    pub requires_hint: bool,
}

impl Rejection {
    fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            requires_hint: false,
        }
    }

    fn needs_hint(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            requires_hint: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Accepted {
    pub athlete: Athlete,
    /// Session submission count after the commit
    pub count: usize,
}

/// Run one submission through the full pipeline.
///
/// On success the athlete is committed to the session; the caller is
/// responsible for recomputing the leaderboard and broadcasting. Rejections
/// that reflect on the game (duplicates, unverifiable athletes, resolver
/// outages) are recorded in the session's audit trail before returning.
pub async fn process_submission(
    state: &AppState,
    conn_id: &str,
    req: SubmitRequest,
) -> Result<Accepted, Rejection> {
    let code = req.session_code.trim();
    let username = req.username.trim();
    let sport = req.sport.trim();

    if code.is_empty() || username.is_empty() || sport.is_empty() || req.athlete_name.trim().is_empty()
    {
        return Err(Rejection::new(
            RejectReason::MissingFields,
            "Missing required fields",
        ));
    }

    // The claimed submitter must be the name bound to this connection
    if !state.verify_sender(code, conn_id, username).await {
        return Err(Rejection::new(
            RejectReason::AuthFailed,
            "Authentication failed",
        ));
    }

    if !state.catalog.is_valid_qid(sport) {
        return Err(Rejection::new(
            RejectReason::InvalidSport,
            "Invalid sport selection. Please select a valid sport.",
        ));
    }
    let sport_display = state
        .catalog
        .label(sport)
        .unwrap_or(sport)
        .to_string();

    let name = match sanitize_name(&req.athlete_name) {
        Ok(clean) => clean,
        Err(message) => {
            state
                .record_rejection(code, &req.athlete_name, sport, username, RejectReason::InvalidInput)
                .await;
            return Err(Rejection::new(RejectReason::InvalidInput, message));
        }
    };

    let session = state
        .get_session(code)
        .await
        .ok_or_else(|| Rejection::new(RejectReason::SessionNotFound, "Session not found"))?;
    if session.status != SessionStatus::Active {
        return Err(Rejection::new(
            RejectReason::GameNotActive,
            "Game is not active",
        ));
    }
    if session.is_paused {
        return Err(Rejection::new(
            RejectReason::GamePaused,
            "Game is paused. Wait for the host to resume.",
        ));
    }

    let normalized = normalize_name(&name);

    // Network round-trip; deliberately outside the submit lock
    let resolution = match state
        .resolver
        .resolve(&name, &sport.to_string(), req.hint.as_deref())
        .await
    {
        Ok(resolution) => resolution,
        Err(e) => {
            tracing::error!("Resolver error for '{}': {}", name, e);
            state
                .record_rejection(code, &name, sport, username, RejectReason::ValidationFailed)
                .await;
            return Err(Rejection::new(
                RejectReason::ValidationFailed,
                "Validation service unavailable. Please try again.",
            ));
        }
    };

    // Ambiguity is judged against what the session has already accepted,
    // before the ordinary duplicate check
    if let Resolution::Ambiguous { candidates } = &resolution {
        let available = state.available_entity_ids(code, candidates).await;

        if available.is_empty() {
            state
                .record_rejection(code, &name, sport, username, RejectReason::Duplicate)
                .await;
            return Err(Rejection::new(
                RejectReason::Duplicate,
                format!(
                    "All athletes named '{name}' in {sport_display} have already been submitted"
                ),
            ));
        }
        if available.len() < candidates.len() {
            return Err(Rejection::needs_hint(
                RejectReason::DisambiguationRequired,
                format!(
                    "Multiple athletes found with the name '{name}' in {sport_display}. \
                     Some have already been submitted. Please add a hint (team, country, \
                     or birth year) to identify a different player."
                ),
            ));
        }
        return Err(Rejection::needs_hint(
            RejectReason::DisambiguationRequired,
            format!(
                "Multiple athletes found with the name '{name}' in {sport_display}. \
                 Please add a hint (team, country, or birth year) to identify the \
                 specific player."
            ),
        ));
    }

    // Critical section: duplicate check and commit must be atomic per
    // session, or two concurrent submissions of the same athlete both pass
    let lock = state.submit_lock(code).await;
    let _guard = lock.lock().await;

    match resolution {
        Resolution::Resolved {
            entity_id,
            canonical_name,
        } => {
            if state.is_duplicate(code, &normalized, Some(&entity_id)).await {
                state
                    .record_rejection(code, &name, sport, username, RejectReason::Duplicate)
                    .await;
                let display = canonical_name.as_deref().unwrap_or(&name);
                return Err(Rejection::new(
                    RejectReason::Duplicate,
                    format!("{display} has already been submitted"),
                ));
            }

            let athlete = Athlete {
                name: canonical_name.clone().unwrap_or_else(|| name.clone()),
                normalized_name: normalized,
                sport: sport.to_string(),
                sport_display: Some(sport_display),
                submitted_by: username.to_string(),
                submitted_at: Utc::now(),
                entity_id: Some(entity_id.clone()),
                hint: req.hint.clone(),
                canonical_name,
            };

            let count = state
                .record_athlete(code, athlete.clone())
                .await
                .ok_or_else(|| {
                    Rejection::new(RejectReason::SessionNotFound, "Session not found")
                })?;

            tracing::info!(
                "Athlete {} added to session {} by {} (entity_id: {})",
                athlete.name,
                code,
                username,
                entity_id
            );
            Ok(Accepted { athlete, count })
        }

        // No entity id on these paths: the name set is the only dedup signal,
        // and a known name reads as a duplicate rather than a fresh failure
        unresolved @ (Resolution::NotFound | Resolution::WrongSport { .. }) => {
            if state.is_duplicate(code, &normalized, None).await {
                state
                    .record_rejection(code, &name, sport, username, RejectReason::Duplicate)
                    .await;
                return Err(Rejection::new(
                    RejectReason::Duplicate,
                    format!("{name} has already been submitted"),
                ));
            }

            let (reason, message) = match unresolved {
                Resolution::WrongSport { .. } => (
                    RejectReason::WrongSport,
                    format!("No athlete found with that name for {sport_display}"),
                ),
                _ => (
                    RejectReason::InvalidAthlete,
                    format!("{name} could not be verified as a real athlete"),
                ),
            };
            state.record_rejection(code, &name, sport, username, reason).await;
            Err(Rejection::new(reason, message))
        }

        Resolution::Ambiguous { .. } => unreachable!("handled before the lock"),
    }
}
