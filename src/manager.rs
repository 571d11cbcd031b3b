//! Registry of competitor sessions and the configured team roster.
//!
//! The manager owns every session record for the lifetime of the match
//! (closed sessions stay around so the final ranking can score them) and
//! enforces that each team holds at most one active login.

use crate::competitor::{Competitor, LoginState};
use crate::score_board::ScoreRecord;
use crate::types::{Instrument, SessionId};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::info;

/// Login failures; authentication errors close the session.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum LoginError {
    /// Unknown team or wrong secret.
    #[error("BadCredentials")]
    BadCredentials,
    /// The team is already logged in on another session.
    #[error("AlreadyActive")]
    AlreadyActive,
}

/// Registry of known competitors.
#[derive(Debug)]
pub struct CompetitorManager {
    roster: BTreeMap<String, String>,
    competitors: HashMap<SessionId, Competitor>,
    active_teams: HashMap<String, SessionId>,
    next_login_sequence: u64,
}

impl CompetitorManager {
    /// Create a manager for the configured team/secret roster.
    #[must_use]
    pub fn new(roster: BTreeMap<String, String>) -> Self {
        Self {
            roster,
            competitors: HashMap::new(),
            active_teams: HashMap::new(),
            next_login_sequence: 0,
        }
    }

    /// Track a freshly accepted session.
    pub fn register(&mut self, competitor: Competitor) {
        self.competitors.insert(competitor.session_id, competitor);
    }

    /// Look up a session.
    #[must_use]
    pub fn get(&self, session_id: SessionId) -> Option<&Competitor> {
        self.competitors.get(&session_id)
    }

    /// Look up a session mutably.
    pub fn get_mut(&mut self, session_id: SessionId) -> Option<&mut Competitor> {
        self.competitors.get_mut(&session_id)
    }

    /// Authenticate a pending session and bind its team slot. On success the
    /// session turns `Active` with a fresh zeroed account.
    pub fn login(
        &mut self,
        session_id: SessionId,
        team: &str,
        secret: &str,
    ) -> Result<(), LoginError> {
        if self.roster.get(team).map(String::as_str) != Some(secret) {
            return Err(LoginError::BadCredentials);
        }
        if self.active_teams.contains_key(team) {
            return Err(LoginError::AlreadyActive);
        }
        let sequence = self.next_login_sequence;
        self.next_login_sequence += 1;
        if let Some(competitor) = self.competitors.get_mut(&session_id) {
            competitor.team = Some(team.to_string());
            competitor.state = LoginState::Active;
            competitor.login_sequence = sequence;
            self.active_teams.insert(team.to_string(), session_id);
            info!(team, session_id, "competitor logged in");
        }
        Ok(())
    }

    /// Release a closing session's team slot. The record itself is kept for
    /// the final ranking.
    pub fn release(&mut self, session_id: SessionId) {
        if let Some(competitor) = self.competitors.get_mut(&session_id) {
            competitor.state = LoginState::Closed;
            if let Some(team) = &competitor.team {
                if self.active_teams.get(team) == Some(&session_id) {
                    self.active_teams.remove(team);
                }
            }
        }
    }

    /// Iterate all sessions mutably (mark-to-market, shutdown).
    pub fn competitors_mut(&mut self) -> impl Iterator<Item = &mut Competitor> {
        self.competitors.values_mut()
    }

    /// Session ids in ascending accept order.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.competitors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The team name behind a session, if it logged in.
    #[must_use]
    pub fn team_name(&self, session_id: SessionId) -> Option<&str> {
        self.competitors
            .get(&session_id)
            .and_then(|c| c.team.as_deref())
    }

    /// Final ranking: every roster team scored from its most recent session
    /// (teams that never logged in score zero), ordered by profit descending
    /// with earlier logins winning ties.
    #[must_use]
    pub fn finalize(&self) -> Vec<ScoreRecord> {
        let mut records: Vec<(i64, u64, ScoreRecord)> = Vec::with_capacity(self.roster.len());
        for team in self.roster.keys() {
            let latest = self
                .competitors
                .values()
                .filter(|c| c.team.as_deref() == Some(team.as_str()))
                .max_by_key(|c| c.login_sequence);
            let (profit, sequence, record) = match latest {
                Some(competitor) => (
                    competitor.account.profit(),
                    competitor.login_sequence,
                    ScoreRecord {
                        team: team.clone(),
                        profit: competitor.account.profit(),
                        position: competitor.account.position(Instrument::Etf),
                        trades: competitor.trades,
                        errors: competitor.errors,
                    },
                ),
                None => (
                    0,
                    u64::MAX,
                    ScoreRecord {
                        team: team.clone(),
                        profit: 0,
                        position: 0,
                        trades: 0,
                        errors: 0,
                    },
                ),
            };
            records.push((profit, sequence, record));
        }
        records.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        records.into_iter().map(|(_, _, record)| record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::FrequencyLimiter;
    use tokio::sync::mpsc;

    fn manager_with(teams: &[(&str, &str)]) -> CompetitorManager {
        let roster = teams
            .iter()
            .map(|(t, s)| (t.to_string(), s.to_string()))
            .collect();
        CompetitorManager::new(roster)
    }

    fn register(manager: &mut CompetitorManager, session_id: SessionId) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let competitor = Competitor::new(session_id, tx, FrequencyLimiter::new(1.0, 10));
        manager.register(competitor);
        // Receiver is dropped; sends become no-ops, which these tests ignore.
    }

    #[test]
    fn login_checks_credentials_and_slot() {
        let mut manager = manager_with(&[("TeamOne", "hunter2")]);
        register(&mut manager, 1);
        register(&mut manager, 2);

        assert_eq!(
            manager.login(1, "TeamOne", "wrong"),
            Err(LoginError::BadCredentials)
        );
        assert_eq!(
            manager.login(1, "NoSuchTeam", "hunter2"),
            Err(LoginError::BadCredentials)
        );
        assert_eq!(manager.login(1, "TeamOne", "hunter2"), Ok(()));
        assert_eq!(
            manager.login(2, "TeamOne", "hunter2"),
            Err(LoginError::AlreadyActive)
        );

        // Releasing the first session frees the slot.
        manager.release(1);
        assert_eq!(manager.login(2, "TeamOne", "hunter2"), Ok(()));
    }

    #[test]
    fn finalize_ranks_by_profit_then_login_order() {
        let mut manager = manager_with(&[("Alpha", "a"), ("Beta", "b"), ("Gamma", "g")]);
        register(&mut manager, 1);
        register(&mut manager, 2);
        manager.login(1, "Beta", "b").unwrap();
        manager.login(2, "Alpha", "a").unwrap();

        // Equal profit: Beta logged in first, so Beta ranks above Alpha.
        // Gamma never logged in and scores zero, tying as well but ranking
        // after both logged-in teams.
        let records = manager.finalize();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].team, "Beta");
        assert_eq!(records[1].team, "Alpha");
        assert_eq!(records[2].team, "Gamma");
    }
}
