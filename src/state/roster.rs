use super::AppState;
use crate::types::*;
use chrono::{Duration, Utc};

/// Outcome of a host removing a player from the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedUser {
    /// The target was live; carries their connection id so they can be told
    Connected(ConnId),
    /// The target was in the reclaim window; their grace record is gone
    Departed,
    NotFound,
}

impl AppState {
    /// Bind a connection to a username in a session.
    ///
    /// Any *other* connection id still mapped to the same name is removed
    /// first: a transport reconnect can produce a new connection id before
    /// the old one is torn down, and the stale mapping must not survive.
    /// A grace-period record for the name is cleared (this is the reclaim).
    pub async fn connect_user(&self, code: &str, conn_id: &str, username: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(code) else {
            return false;
        };

        let stale: Vec<ConnId> = session
            .connected_users
            .iter()
            .filter(|(_, name)| name.as_str() == username)
            .map(|(id, _)| id.clone())
            .collect();
        for stale_id in stale {
            session.connected_users.remove(&stale_id);
            tracing::info!(
                "Cleaned up stale connection for {} (conn: {})",
                username,
                stale_id
            );
        }

        if session.disconnected_users.remove(username).is_some() {
            tracing::info!("User {} reconnected to session {}", username, code);
        }

        session
            .connected_users
            .insert(conn_id.to_string(), username.to_string());
        true
    }

    /// Unbind a connection; the freed name goes into the grace-period table
    /// together with the user's submission count at this moment.
    /// Returns the freed name.
    pub async fn disconnect_user(&self, code: &str, conn_id: &str) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(code)?;
        let username = session.connected_users.remove(conn_id)?;

        let submissions_count = session
            .athletes
            .iter()
            .filter(|a| a.submitted_by == username)
            .count();
        session.disconnected_users.insert(
            username.clone(),
            DisconnectedUser {
                disconnected_at: Utc::now(),
                submissions_count,
            },
        );

        tracing::info!("User {} disconnected from session {}", username, code);
        Some(username)
    }

    /// True only if a genuinely different live connection holds the name.
    /// The requesting connection's own stale mapping does not count, so a
    /// reconnect on a fresh transport id is never rejected as "name taken".
    pub async fn is_name_held_by_other(
        &self,
        code: &str,
        username: &str,
        requesting_conn: &str,
    ) -> bool {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(code) else {
            return false;
        };
        session
            .connected_users
            .iter()
            .any(|(id, name)| name == username && id != requesting_conn)
    }

    /// Can this name be reclaimed (disconnected less than the grace window ago)?
    pub async fn can_reclaim(&self, code: &str, username: &str) -> bool {
        let sessions = self.sessions.read().await;
        let Some(record) = sessions
            .get(code)
            .and_then(|s| s.disconnected_users.get(username))
        else {
            return false;
        };
        Utc::now() - record.disconnected_at < Duration::seconds(RECLAIM_WINDOW_SECS)
    }

    /// Fully remove a user from the session (host kick). Unlike a disconnect
    /// this leaves no grace-period record.
    pub async fn remove_user(&self, code: &str, target_username: &str) -> RemovedUser {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(code) else {
            return RemovedUser::NotFound;
        };

        let target_conn = session
            .connected_users
            .iter()
            .find(|(_, name)| name.as_str() == target_username)
            .map(|(id, _)| id.clone());

        if let Some(conn_id) = target_conn {
            session.connected_users.remove(&conn_id);
            tracing::info!(
                "User {} removed from session {} (conn: {})",
                target_username,
                code,
                conn_id
            );
            RemovedUser::Connected(conn_id)
        } else if session.disconnected_users.remove(target_username).is_some() {
            tracing::info!(
                "Disconnected user {} removed from session {}",
                target_username,
                code
            );
            RemovedUser::Departed
        } else {
            tracing::warn!(
                "User {} not found in session {} for removal",
                target_username,
                code
            );
            RemovedUser::NotFound
        }
    }

    /// Roster with connection status: host first, then connected, then by name
    pub async fn users_with_status(&self, code: &str) -> Vec<UserStatusInfo> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(code) else {
            return Vec::new();
        };

        let mut users: Vec<UserStatusInfo> = Vec::new();
        let connected: std::collections::HashSet<&String> =
            session.connected_users.values().collect();

        for username in &connected {
            users.push(UserStatusInfo {
                username: (*username).clone(),
                is_connected: true,
                is_host: **username == session.host_username,
            });
        }
        for username in session.disconnected_users.keys() {
            if !connected.contains(username) {
                users.push(UserStatusInfo {
                    username: username.clone(),
                    is_connected: false,
                    is_host: *username == session.host_username,
                });
            }
        }

        users.sort_by(|a, b| {
            (!a.is_host, !a.is_connected, &a.username).cmp(&(!b.is_host, !b.is_connected, &b.username))
        });
        users
    }

    /// How many connections a session currently has
    pub async fn connected_count(&self, code: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(code)
            .map(|s| s.connected_users.len())
            .unwrap_or(0)
    }

    /// Number of accepted submissions by one user
    pub async fn submission_count(&self, code: &str, username: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(code)
            .map(|s| {
                s.athletes
                    .iter()
                    .filter(|a| a.submitted_by == username)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Does this connection speak for the claimed username? Guards against
    /// a connection submitting under somebody else's name.
    pub async fn verify_sender(&self, code: &str, conn_id: &str, username: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(code)
            .and_then(|s| s.connected_users.get(conn_id))
            .map(|name| name == username)
            .unwrap_or(false)
    }
}
