use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{ExchangeError, ExchangeResult, PlayerId, Roster};

/// Recipient(s) bound to a drawing player. Only the double-spinner ever holds a pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Assignment {
    Single(PlayerId),
    Pair(PlayerId, PlayerId),
}

impl Assignment {
    pub fn recipients(&self) -> Vec<&PlayerId> {
        match self {
            Assignment::Single(to) => vec![to],
            Assignment::Pair(first, second) => vec![first, second],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawRecord {
    pub has_drawn: bool,
    pub draw_count: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrawPhase {
    NotStarted,
    Eligible,
    Drawn,
    EligibleSecond,
    DrawnTwice,
    Exhausted,
}

impl DrawPhase {
    pub fn can_draw(self) -> bool {
        matches!(self, DrawPhase::Eligible | DrawPhase::EligibleSecond)
    }

    fn message(self) -> &'static str {
        match self {
            DrawPhase::NotStarted => "The round has not started yet.",
            DrawPhase::Eligible => "You can draw now.",
            DrawPhase::EligibleSecond => "You may draw one more time.",
            DrawPhase::Drawn | DrawPhase::DrawnTwice => "You have already drawn.",
            DrawPhase::Exhausted => {
                "All assignments have already been made. You cannot draw in this round."
            }
        }
    }
}

/// What a single player is allowed to do right now.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawStatus {
    pub started: bool,
    pub phase: DrawPhase,
    pub can_draw: bool,
    pub message: String,
    pub assignment: Option<Assignment>,
    pub has_drawn: bool,
    /// True while the player is the double-spinner and still has a draw left.
    pub is_double_spinner: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundSnapshot {
    pub assignments: BTreeMap<PlayerId, Assignment>,
    pub started: bool,
    pub double_spinner: Option<PlayerId>,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Round {
    started: bool,
    double_spinner: Option<PlayerId>,
    pool: Vec<PlayerId>,
    assignments: BTreeMap<PlayerId, Assignment>,
    draw_status: BTreeMap<PlayerId, DrawRecord>,
}

impl Round {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn double_spinner(&self) -> Option<&PlayerId> {
        self.double_spinner.as_ref()
    }

    pub fn pool(&self) -> &[PlayerId] {
        &self.pool
    }

    pub fn assignment(&self, player: &str) -> Option<&Assignment> {
        self.assignments.get(player)
    }

    pub fn draw_record(&self, player: &str) -> DrawRecord {
        self.draw_status.get(player).copied().unwrap_or_default()
    }

    /// Opens a new round over the current roster.
    ///
    /// `admin_participates` only shifts the parity used to decide whether a
    /// double-spinner is needed and whether the admin can be drawn; the admin
    /// keeps the ability to draw either way.
    pub fn start(
        &mut self,
        roster: &Roster,
        admin_participates: bool,
        double_spinner: Option<&str>,
    ) -> ExchangeResult<()> {
        if self.started {
            return Err(ExchangeError::InvalidState("round has already started".into()));
        }
        if roster.len() < 2 {
            return Err(ExchangeError::InvalidState(
                "need at least 2 players to start".into(),
            ));
        }

        let mut eligible: Vec<PlayerId> = roster.ids().cloned().collect();
        if !admin_participates {
            if let Some(admin) = roster.admin() {
                eligible.retain(|id| *id != admin.id);
            }
        }

        let effective_count = roster.len() - usize::from(!admin_participates);
        let double_spinner = if effective_count % 2 == 1 {
            let name = double_spinner.filter(|n| !n.is_empty()).ok_or_else(|| {
                ExchangeError::InvalidInput("odd number of players; select a double-spinner".into())
            })?;
            if !roster.contains(name) {
                return Err(ExchangeError::NotFound("double-spinner player not found".into()));
            }
            if !eligible.iter().any(|id| id == name) {
                return Err(ExchangeError::InvalidInput(
                    "double-spinner must be a participating player".into(),
                ));
            }
            Some(name.to_string())
        } else {
            None
        };

        let draw_status = eligible
            .iter()
            .map(|id| (id.clone(), DrawRecord::default()))
            .collect();

        *self = Round {
            started: true,
            double_spinner,
            pool: eligible,
            assignments: BTreeMap::new(),
            draw_status,
        };
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Round::default();
    }

    fn is_double_spinner(&self, player: &str) -> bool {
        self.double_spinner.as_deref() == Some(player)
    }

    fn has_draw_left(&self, player: &str, record: DrawRecord) -> bool {
        !record.has_drawn || (self.is_double_spinner(player) && record.draw_count < 2)
    }

    fn candidates<'a>(&'a self, player: &'a str) -> impl Iterator<Item = &'a PlayerId> + 'a {
        self.pool.iter().filter(move |id| id.as_str() != player)
    }

    pub fn phase(&self, player: &str) -> DrawPhase {
        if !self.started {
            return DrawPhase::NotStarted;
        }
        let record = self.draw_record(player);
        if record.has_drawn {
            if self.has_draw_left(player, record) {
                DrawPhase::EligibleSecond
            } else if record.draw_count >= 2 {
                DrawPhase::DrawnTwice
            } else {
                DrawPhase::Drawn
            }
        } else if self.candidates(player).next().is_none() {
            DrawPhase::Exhausted
        } else {
            DrawPhase::Eligible
        }
    }

    pub fn status(&self, player: &str) -> DrawStatus {
        let phase = self.phase(player);
        let record = self.draw_record(player);
        DrawStatus {
            started: self.started,
            phase,
            can_draw: phase.can_draw(),
            message: phase.message().to_string(),
            assignment: self.assignments.get(player).cloned(),
            has_drawn: record.has_drawn,
            is_double_spinner: self.is_double_spinner(player) && record.draw_count < 2,
        }
    }

    /// Picks a recipient for `player` and removes it from the pool.
    ///
    /// Every check runs before the first mutation, so a failed draw leaves the
    /// round untouched.
    pub fn draw<R: Rng + ?Sized>(&mut self, player: &str, rng: &mut R) -> ExchangeResult<PlayerId> {
        if !self.started {
            return Err(ExchangeError::InvalidState("round has not started yet".into()));
        }

        let record = self.draw_record(player);
        if !self.has_draw_left(player, record) {
            return Err(ExchangeError::Conflict("you have already drawn".into()));
        }

        let candidates: Vec<&PlayerId> = self.candidates(player).collect();
        let recipient = candidates
            .choose(rng)
            .map(|id| (*id).clone())
            .ok_or(ExchangeError::Exhausted)?;

        let assignment = match self.assignments.get(player) {
            None => Assignment::Single(recipient.clone()),
            Some(Assignment::Single(first)) => Assignment::Pair(first.clone(), recipient.clone()),
            Some(Assignment::Pair(..)) => {
                return Err(ExchangeError::Conflict("you have already drawn".into()))
            }
        };

        self.assignments.insert(player.to_string(), assignment);
        self.draw_status.insert(
            player.to_string(),
            DrawRecord {
                has_drawn: true,
                draw_count: record.draw_count + 1,
            },
        );
        if let Some(index) = self.pool.iter().position(|id| *id == recipient) {
            self.pool.remove(index);
        }

        Ok(recipient)
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            assignments: self.assignments.clone(),
            started: self.started,
            double_spinner: self.double_spinner.clone(),
            pool_size: self.pool.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn roster(ids: &[&str]) -> Roster {
        let mut roster = Roster::new();
        roster.bootstrap(ids[0], "pw").unwrap();
        for id in &ids[1..] {
            roster.add(*id, "pw", None).unwrap();
        }
        roster
    }

    fn all_recipients(round: &Round) -> Vec<PlayerId> {
        round
            .snapshot()
            .assignments
            .values()
            .flat_map(|a| a.recipients().into_iter().cloned())
            .collect()
    }

    #[test]
    fn nothing_happens_before_start() {
        let mut round = Round::new();
        let status = round.status("alice");
        assert_eq!(status.phase, DrawPhase::NotStarted);
        assert!(!status.can_draw);
        assert!(!status.started);

        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = round.draw("alice", &mut rng).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn start_rejects_small_roster_and_double_start() {
        let mut round = Round::new();
        let err = round.start(&roster(&["alice"]), true, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let players = roster(&["alice", "bob"]);
        round.start(&players, true, None).unwrap();
        let err = round.start(&players, true, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn two_players_swap_deterministically() {
        let players = roster(&["alice", "bob"]);
        let mut round = Round::new();
        round.start(&players, true, None).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert_eq!(round.draw("alice", &mut rng).unwrap(), "bob");
        assert_eq!(round.draw("bob", &mut rng).unwrap(), "alice");
        assert!(round.pool().is_empty());
        assert_eq!(
            round.assignment("alice"),
            Some(&Assignment::Single("bob".into()))
        );
    }

    #[test]
    fn full_even_round_never_self_assigns() {
        let players = roster(&["alice", "bob", "carol", "dave"]);
        let mut completed = 0;

        for seed in 0..64 {
            let mut round = Round::new();
            round.start(&players, true, None).unwrap();
            assert_eq!(round.double_spinner(), None);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            let mut exhausted = false;
            for player in ["alice", "bob", "carol", "dave"] {
                match round.draw(player, &mut rng) {
                    Ok(to) => assert_ne!(to, player),
                    Err(err) => {
                        // Only the last drawer can be left with nobody but themselves.
                        assert_eq!(err, ExchangeError::Exhausted);
                        assert_eq!(player, "dave");
                        assert_eq!(round.pool(), &["dave".to_string()]);
                        exhausted = true;
                    }
                }
            }

            let recipients = all_recipients(&round);
            let unique: HashSet<_> = recipients.iter().collect();
            assert_eq!(unique.len(), recipients.len());
            assert_eq!(recipients.len() + round.pool().len(), 4);
            for (from, to) in &round.snapshot().assignments {
                assert!(!to.recipients().contains(&from));
            }
            if !exhausted {
                assert!(round.pool().is_empty());
                completed += 1;
            }
        }

        assert!(completed > 0);
    }

    #[test]
    fn odd_round_requires_double_spinner() {
        let players = roster(&["alice", "bob", "carol"]);
        let mut round = Round::new();

        let err = round.start(&players, true, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!round.is_started());

        let err = round.start(&players, true, Some("zed")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        round.start(&players, true, Some("bob")).unwrap();
        assert_eq!(round.double_spinner().map(String::as_str), Some("bob"));
        // no duplicate pool entry for the double-spinner
        assert_eq!(round.pool().len(), 3);
    }

    #[test]
    fn double_spinner_draws_twice_then_conflicts() {
        let players = roster(&["alice", "bob", "carol"]);
        let mut round = Round::new();
        round.start(&players, true, Some("bob")).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(99);

        assert!(round.status("bob").is_double_spinner);
        let first = round.draw("bob", &mut rng).unwrap();
        let status = round.status("bob");
        assert_eq!(status.phase, DrawPhase::EligibleSecond);
        assert!(status.can_draw);
        assert!(status.is_double_spinner);

        let second = round.draw("bob", &mut rng).unwrap();
        assert_ne!(first, second);
        assert_ne!(first, "bob");
        assert_ne!(second, "bob");
        assert_eq!(
            round.assignment("bob"),
            Some(&Assignment::Pair(first, second))
        );
        let status = round.status("bob");
        assert_eq!(status.phase, DrawPhase::DrawnTwice);
        assert!(!status.is_double_spinner);

        let err = round.draw("bob", &mut rng).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(round.draw_record("bob").draw_count, 2);

        // bob took alice and carol; alice can only draw bob
        assert_eq!(round.draw("alice", &mut rng).unwrap(), "bob");
        assert_eq!(round.status("carol").phase, DrawPhase::Exhausted);
        assert!(!round.status("carol").can_draw);
        let err = round.draw("carol", &mut rng).unwrap_err();
        assert_eq!(err, ExchangeError::Exhausted);
        assert!(round.pool().is_empty());
    }

    #[test]
    fn regular_player_draws_once() {
        let players = roster(&["alice", "bob", "carol", "dave"]);
        let mut round = Round::new();
        round.start(&players, true, None).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        round.draw("carol", &mut rng).unwrap();
        assert_eq!(round.status("carol").phase, DrawPhase::Drawn);
        let pool_before = round.pool().to_vec();
        let err = round.draw("carol", &mut rng).unwrap_err();
        assert_eq!(err, ExchangeError::Conflict("you have already drawn".into()));
        assert_eq!(round.pool(), pool_before.as_slice());
        assert_eq!(round.draw_record("carol").draw_count, 1);
    }

    #[test]
    fn admin_sitting_out_shifts_parity_and_leaves_pool() {
        let players = roster(&["alice", "bob", "carol", "dave"]);
        let mut round = Round::new();

        // 4 players minus the admin is odd
        let err = round.start(&players, false, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = round.start(&players, false, Some("alice")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        round.start(&players, false, Some("carol")).unwrap();
        assert!(!round.pool().contains(&"alice".to_string()));
        assert_eq!(round.pool().len(), 3);

        // the admin is never a target but can still draw
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let to = round.draw("alice", &mut rng).unwrap();
        assert_ne!(to, "alice");
        for player in ["bob", "dave"] {
            if let Ok(to) = round.draw(player, &mut rng) {
                assert_ne!(to, "alice");
            }
        }
    }

    #[test]
    fn even_parity_ignores_supplied_double_spinner() {
        let players = roster(&["alice", "bob"]);
        let mut round = Round::new();
        round.start(&players, true, Some("bob")).unwrap();
        assert_eq!(round.double_spinner(), None);
    }

    #[test]
    fn status_is_side_effect_free() {
        let players = roster(&["alice", "bob", "carol", "dave"]);
        let mut round = Round::new();
        round.start(&players, true, None).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        round.draw("bob", &mut rng).unwrap();

        let before = round.clone();
        let first = round.status("alice");
        let second = round.status("alice");
        round.status("bob");
        round.status("nobody");
        assert_eq!(first, second);
        assert_eq!(round, before);
    }

    #[test]
    fn reset_clears_everything_from_any_state() {
        let players = roster(&["alice", "bob", "carol"]);
        let mut round = Round::new();
        round.reset();
        assert_eq!(round, Round::default());

        round.start(&players, true, Some("carol")).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        round.draw("carol", &mut rng).unwrap();
        round.reset();

        let snapshot = round.snapshot();
        assert!(!snapshot.started);
        assert!(snapshot.assignments.is_empty());
        assert_eq!(snapshot.double_spinner, None);
        assert_eq!(snapshot.pool_size, 0);
        assert_eq!(round.draw_record("carol"), DrawRecord::default());
        assert_eq!(round, Round::default());
    }

    #[test]
    fn pair_assignment_serializes_as_ordered_array() {
        let single = serde_json::to_value(Assignment::Single("bob".into())).unwrap();
        assert_eq!(single, serde_json::json!("bob"));
        let pair = serde_json::to_value(Assignment::Pair("bob".into(), "carol".into())).unwrap();
        assert_eq!(pair, serde_json::json!(["bob", "carol"]));
        let back: Assignment = serde_json::from_value(pair).unwrap();
        assert_eq!(back, Assignment::Pair("bob".into(), "carol".into()));
    }
}
