use serde::{Deserialize, Serialize};

use crate::{require_field, ExchangeError, ExchangeResult, PlayerId, Role, Round};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub secret: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub role: Role,
}

/// Registered players in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.iter().map(|p| &p.id)
    }

    /// First player holding the admin role, if any.
    pub fn admin(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.role == Role::Admin)
    }

    pub fn list(&self) -> Vec<PlayerSummary> {
        self.players
            .iter()
            .map(|p| PlayerSummary {
                id: p.id.clone(),
                role: p.role,
            })
            .collect()
    }

    pub fn add(
        &mut self,
        id: impl Into<PlayerId>,
        secret: impl Into<String>,
        role: Option<Role>,
    ) -> ExchangeResult<()> {
        let id = id.into();
        let secret = secret.into();
        require_field(&id, "name")?;
        require_field(&secret, "password")?;
        if self.contains(&id) {
            return Err(ExchangeError::Conflict("player already exists".into()));
        }

        self.players.push(Player {
            id,
            secret,
            role: role.unwrap_or(Role::Member),
        });
        Ok(())
    }

    /// Creates the first admin. Only valid on an empty roster.
    pub fn bootstrap(
        &mut self,
        id: impl Into<PlayerId>,
        secret: impl Into<String>,
    ) -> ExchangeResult<()> {
        if !self.is_empty() {
            return Err(ExchangeError::InvalidState(
                "players already exist; use the admin panel to add more".into(),
            ));
        }
        self.add(id, secret, Some(Role::Admin))
    }

    pub fn remove(&mut self, id: &str, round: &Round) -> ExchangeResult<Player> {
        if round.is_started() {
            return Err(ExchangeError::InvalidState(
                "cannot delete players after the round has started".into(),
            ));
        }
        let index = self
            .players
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ExchangeError::NotFound("player not found".into()))?;
        Ok(self.players.remove(index))
    }

    /// Replaces the secret. Callers must also drop the player's sessions.
    pub fn reset_credential(&mut self, id: &str, new_secret: impl Into<String>) -> ExchangeResult<()> {
        let new_secret = new_secret.into();
        require_field(&new_secret, "new password")?;
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ExchangeError::NotFound("player not found".into()))?;
        player.secret = new_secret;
        Ok(())
    }

    pub fn verify(&self, id: &str, secret: &str) -> ExchangeResult<&Player> {
        self.get(id)
            .filter(|p| p.secret == secret)
            .ok_or(ExchangeError::Unauthorized)
    }
}
