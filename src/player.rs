use std::collections::VecDeque;

use crate::components::{Pos, PowerUpKind};

pub const MOVE_DELAY: u64 = 3;
pub const TRAIL_CAP: usize = 50;
pub const INVULN_TICKS: u32 = 12;
pub const POWER_DURATION: u64 = 200;

pub struct ActiveEffect {
    pub kind: PowerUpKind,
    pub expires_at: u64,
}

pub struct Player {
    pub pos: Pos,
    pub keys: usize,
    pub invuln: u32,
    pub has_bomb: bool,
    // Newest position at the front; the back is where the player was
    // longest ago.
    pub trail: VecDeque<Pos>,
    pub move_delay: u64,
    last_move: u64,
    effects: Vec<ActiveEffect>,
}

impl Player {
    pub fn new(pos: Pos) -> Player {
        Player {
            pos,
            keys: 0,
            invuln: 0,
            has_bomb: false,
            trail: VecDeque::new(),
            move_delay: MOVE_DELAY,
            last_move: 0,
            effects: Vec::new(),
        }
    }

    pub fn can_move(&self, now: u64) -> bool {
        self.last_move == 0 || now - self.last_move >= self.move_delay
    }

    pub fn record_move(&mut self, pos: Pos, now: u64) {
        self.trail.push_front(self.pos);
        self.trail.truncate(TRAIL_CAP);
        self.pos = pos;
        self.last_move = now;
    }

    pub fn grant_invuln(&mut self) {
        self.invuln = self.invuln.max(INVULN_TICKS);
    }

    pub fn respawn(&mut self, at: Pos) {
        self.pos = at;
        self.trail.clear();
        self.grant_invuln();
    }

    pub fn apply_power(&mut self, kind: PowerUpKind, now: u64) {
        self.effects.push(ActiveEffect {
            kind,
            expires_at: now + POWER_DURATION,
        });
        self.refresh_delay();
    }

    pub fn tick_effects(&mut self, now: u64) {
        if self.invuln > 0 {
            self.invuln -= 1;
        }
        let before = self.effects.len();
        self.effects.retain(|e| e.expires_at > now);
        if self.effects.len() != before {
            self.refresh_delay();
        }
    }

    fn refresh_delay(&mut self) {
        let hasted = self.effects.iter().any(|e| e.kind == PowerUpKind::Speed);
        self.move_delay = if hasted {
            (MOVE_DELAY / 2).max(1)
        } else {
            MOVE_DELAY
        };
    }

    pub fn power_remaining(&self, now: u64) -> Option<u64> {
        self.effects
            .iter()
            .map(|e| e.expires_at.saturating_sub(now))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moves_are_debounced_by_the_move_delay() {
        let mut p = Player::new(Pos::new(1, 1));
        assert!(p.can_move(1));
        p.record_move(Pos::new(2, 1), 1);
        assert!(!p.can_move(2));
        assert!(!p.can_move(3));
        assert!(p.can_move(4));
    }

    #[test]
    fn trail_keeps_newest_first_and_caps_length() {
        let mut p = Player::new(Pos::new(1, 1));
        for i in 0..60u64 {
            p.record_move(Pos::new(1 + i as usize + 1, 1), i + 1);
        }
        assert_eq!(p.trail.len(), TRAIL_CAP);
        // Front is the cell just vacated, back the oldest remembered.
        assert_eq!(p.trail.front().copied(), Some(Pos::new(60, 1)));
        assert_eq!(p.trail.back().copied(), Some(Pos::new(11, 1)));
    }

    #[test]
    fn speed_power_halves_the_delay_then_restores_it() {
        let mut p = Player::new(Pos::new(1, 1));
        assert_eq!(p.move_delay, MOVE_DELAY);
        p.apply_power(PowerUpKind::Speed, 10);
        assert_eq!(p.move_delay, 1);
        p.tick_effects(10 + POWER_DURATION - 1);
        assert_eq!(p.move_delay, 1);
        p.tick_effects(10 + POWER_DURATION);
        assert_eq!(p.move_delay, MOVE_DELAY);
        assert_eq!(p.power_remaining(10 + POWER_DURATION), None);
    }

    #[test]
    fn invuln_counts_down_and_never_shortens() {
        let mut p = Player::new(Pos::new(1, 1));
        p.grant_invuln();
        assert_eq!(p.invuln, INVULN_TICKS);
        p.tick_effects(1);
        p.tick_effects(2);
        assert_eq!(p.invuln, INVULN_TICKS - 2);
        // A fresh grant tops it back up rather than stacking.
        p.grant_invuln();
        assert_eq!(p.invuln, INVULN_TICKS);
    }

    #[test]
    fn respawn_clears_the_trail_and_grants_mercy() {
        let mut p = Player::new(Pos::new(1, 1));
        p.record_move(Pos::new(2, 1), 1);
        p.record_move(Pos::new(3, 1), 4);
        p.keys = 2;
        p.respawn(Pos::new(1, 1));
        assert!(p.trail.is_empty());
        assert_eq!(p.pos, Pos::new(1, 1));
        assert_eq!(p.invuln, INVULN_TICKS);
        // Keys survive a death.
        assert_eq!(p.keys, 2);
    }
}
