use super::AppState;
use crate::types::*;
use chrono::Utc;
use std::collections::HashMap;

impl AppState {
    /// Append an accepted submission and index it in both dedup sets.
    /// Returns the session's new submission count.
    ///
    /// Callers must hold the session's submit lock so this commit is atomic
    /// with the preceding duplicate check.
    pub async fn record_athlete(&self, code: &str, athlete: Athlete) -> Option<usize> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(code)?;

        session
            .athlete_names
            .insert(athlete.normalized_name.clone());
        if let Some(ref entity_id) = athlete.entity_id {
            session.athlete_entity_ids.insert(entity_id.clone());
        }
        session.athletes.push(athlete);
        Some(session.athletes.len())
    }

    /// Duplicate check.
    ///
    /// When an entity id is present it is authoritative: only the id set is
    /// consulted, never the name set. Two different athletes sharing a search
    /// term ("ronaldo") must both be acceptable once disambiguated to
    /// distinct ids. The normalized-name set is a fallback for the degraded
    /// path where no id could be resolved.
    pub async fn is_duplicate(
        &self,
        code: &str,
        normalized_name: &str,
        entity_id: Option<&str>,
    ) -> bool {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(code) else {
            return false;
        };

        match entity_id {
            Some(id) => session.athlete_entity_ids.contains(id),
            None => session.athlete_names.contains(normalized_name),
        }
    }

    /// Of the given candidate entity ids, which are not yet in the session?
    /// Used during disambiguation: "Ronaldo" stays submittable after
    /// Cristiano was added as long as the Brazilian Ronaldo is still free.
    pub async fn available_entity_ids(&self, code: &str, candidates: &[EntityId]) -> Vec<EntityId> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(code) else {
            return candidates.to_vec();
        };
        candidates
            .iter()
            .filter(|id| !session.athlete_entity_ids.contains(*id))
            .cloned()
            .collect()
    }

    /// Append to the rejected-submission audit trail
    pub async fn record_rejection(
        &self,
        code: &str,
        name: &str,
        sport: &str,
        username: &str,
        reason: RejectReason,
    ) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(code) else {
            return;
        };
        session.rejected_submissions.push(RejectedSubmission {
            name: name.to_string(),
            sport: sport.to_string(),
            username: username.to_string(),
            reason,
            submitted_at: Utc::now(),
        });
        tracing::info!(
            "Recorded rejected submission: {} by {} (reason: {:?})",
            name,
            username,
            reason
        );
    }

    /// Ranked per-participant submission counts: score descending, then name
    /// for stability, with dense 1-based ranks. Covers connected users,
    /// grace-period users, and anyone who submitted but left for good.
    pub async fn leaderboard(&self, code: &str) -> Vec<LeaderboardEntry> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(code) else {
            return Vec::new();
        };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for athlete in &session.athletes {
            *counts.entry(athlete.submitted_by.as_str()).or_insert(0) += 1;
        }

        let mut usernames: Vec<&str> = session
            .connected_users
            .values()
            .map(String::as_str)
            .chain(session.disconnected_users.keys().map(String::as_str))
            .chain(counts.keys().copied())
            .collect();
        usernames.sort_unstable();
        usernames.dedup();

        let mut leaderboard: Vec<LeaderboardEntry> = usernames
            .into_iter()
            .map(|username| LeaderboardEntry {
                username: username.to_string(),
                score: counts.get(username).copied().unwrap_or(0),
                rank: 0,
            })
            .collect();

        leaderboard.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.username.cmp(&b.username))
        });
        for (i, entry) in leaderboard.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        leaderboard
    }
}
