use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{require_field, ExchangeError, ExchangeResult, PlayerId, Role, Roster};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub player_id: PlayerId,
    pub role: Role,
}

/// Opaque bearer tokens mapped to the player they were issued to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionGate {
    sessions: HashMap<String, Session>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn login(&mut self, roster: &Roster, player_id: &str, secret: &str) -> ExchangeResult<Session> {
        require_field(player_id, "name")?;
        require_field(secret, "password")?;
        let player = roster.verify(player_id, secret)?;

        let session = Session {
            token: Uuid::new_v4().to_string(),
            player_id: player.id.clone(),
            role: player.role,
        };
        self.sessions.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    pub fn authorize(&self, token: Option<&str>) -> ExchangeResult<&Session> {
        token
            .and_then(|t| self.sessions.get(t))
            .ok_or(ExchangeError::Unauthenticated)
    }

    pub fn require_role(session: &Session, role: Role) -> ExchangeResult<()> {
        if session.role != role {
            let needed = match role {
                Role::Admin => "admin",
                Role::Member => "member",
            };
            return Err(ExchangeError::Forbidden(needed));
        }
        Ok(())
    }

    pub fn logout(&mut self, token: &str) {
        self.sessions.remove(token);
    }

    /// Drops every session issued to `player_id`, returning how many were removed.
    pub fn invalidate_all(&mut self, player_id: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.player_id != player_id);
        before - self.sessions.len()
    }
}
