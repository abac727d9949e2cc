use rand::Rng;

use crate::components::{Agent, Dir, Phase, Pos, Tile};
use crate::level::{Level, SwitchEffect, SPIKE_TOGGLE_MAX, SPIKE_TOGGLE_MIN};
use crate::monster::{Heatmap, Monster};
use crate::path;
use crate::place;
use crate::player::Player;

pub const SAFE_LIFETIME: u64 = 160;
pub const MAGNET_START: u8 = 100;
pub const BOMB_FUSE: u64 = 30;
const BREAK_DELAY: u64 = 8;
const EXPLOSION_TTL: u64 = 20;
const BREAKING_TTL: u64 = 16;
const SPEEDUP_EVERY: u64 = 300;

#[derive(Clone, Copy)]
pub struct Rules {
    pub size: usize,
    pub hardcore: bool,
}

impl Default for Rules {
    fn default() -> Rules {
        Rules {
            size: 21,
            hardcore: false,
        }
    }
}

#[derive(Default, Clone, Copy)]
pub struct TickInput {
    pub dir: Option<Dir>,
    pub place_bomb: bool,
}

#[derive(Clone, Copy)]
enum EventKind {
    Detonate(Pos),
    BreakWalls(Pos),
}

// Delayed consequences run through this queue instead of ad-hoc timers.
// The generation tag kills anything scheduled before a restart.
struct TimedEvent {
    fire_at: u64,
    generation: u64,
    kind: EventKind,
}

pub struct PlacedBomb {
    pub pos: Pos,
    pub placed_at: u64,
}

pub struct Explosion {
    pub center: Pos,
    pub started: u64,
}

pub struct BreakingWall {
    pub pos: Pos,
    pub started: u64,
}

pub struct Game {
    pub level: Level,
    pub player: Player,
    pub monster: Monster,
    pub heat: Heatmap,
    pub phase: Phase,
    pub ticks: u64,
    pub deaths: u32,
    pub spikes_armed: bool,
    pub bomb: Option<PlacedBomb>,
    pub explosions: Vec<Explosion>,
    pub breaking: Vec<BreakingWall>,
    events: Vec<TimedEvent>,
    generation: u64,
    rules: Rules,
}

impl Game {
    pub fn new(rules: Rules, rng: &mut impl Rng) -> Game {
        let mut level = Level::generate(rules.size, rng);
        place::populate(&mut level, rng);
        Game::from_level(level, rules)
    }

    fn from_level(level: Level, rules: Rules) -> Game {
        let player = Player::new(level.start);
        let monster = Monster::new(level.monster_spawn);
        let heat = Heatmap::new(level.n);
        Game {
            level,
            player,
            monster,
            heat,
            phase: Phase::Playing,
            ticks: 0,
            deaths: 0,
            spikes_armed: false,
            bomb: None,
            explosions: Vec::new(),
            breaking: Vec::new(),
            events: Vec::new(),
            generation: 0,
            rules,
        }
    }

    // Fresh maze, fresh run. Events already in flight stay queued but
    // their generation no longer matches, so they fizzle when they fire.
    pub fn restart(&mut self, rng: &mut impl Rng) {
        let mut level = Level::generate(self.rules.size, rng);
        place::populate(&mut level, rng);
        let stale = std::mem::take(&mut self.events);
        let generation = self.generation + 1;
        *self = Game::from_level(level, self.rules);
        self.events = stale;
        self.generation = generation;
    }

    pub fn keys_required(&self) -> usize {
        self.level.keys.len()
    }

    // Corridor steps between hunter and hunted; None while a wall or an
    // unused safe zone seals the monster off.
    pub fn monster_distance(&self) -> Option<usize> {
        path::distance(&self.level, self.monster.pos, self.player.pos, Agent::Monster)
    }

    // One simulation step: player intent, timers, monster, collision,
    // win check, in that order.
    pub fn tick(&mut self, rng: &mut impl Rng, input: TickInput) {
        if self.phase != Phase::Playing {
            return;
        }
        self.ticks += 1;
        let player_was = self.player.pos;
        let monster_was = self.monster.pos;
        if let Some(dir) = input.dir {
            self.try_move(dir);
        }
        if input.place_bomb {
            self.try_place_bomb();
        }
        if self.phase != Phase::Playing {
            return;
        }
        self.advance_timers(rng);
        self.monster.observe(self.player.pos);
        self.monster.take_turn(&self.level, &self.player, &self.heat);
        self.resolve_collision(player_was, monster_was);
        self.check_win();
    }

    fn try_move(&mut self, dir: Dir) {
        if !self.player.can_move(self.ticks) {
            return;
        }
        let next = match self.level.offset(self.player.pos, dir) {
            Some(p) if self.level.is_walkable(p, Agent::Player) => p,
            _ => return,
        };
        self.player.record_move(next, self.ticks);
        self.heat.bump(next);
        self.enter_tile(next);
    }

    fn enter_tile(&mut self, pos: Pos) {
        if let Some(key) = self
            .level
            .keys
            .iter_mut()
            .find(|k| !k.collected && k.pos == pos)
        {
            key.collected = true;
            self.player.keys += 1;
        }
        if !self.player.has_bomb {
            if let Some(i) = self.level.bombs.iter().position(|&b| b == pos) {
                self.level.bombs.remove(i);
                self.player.has_bomb = true;
            }
        }
        if let Some(i) = self.level.powerups.iter().position(|p| p.pos == pos) {
            let kind = self.level.powerups.remove(i).kind;
            self.player.apply_power(kind, self.ticks);
        }
        match self.level.tile(pos) {
            Tile::Switch => self.trip_switch(pos),
            Tile::Spike => self.spike_check(pos),
            Tile::Safe => self.use_zone(pos),
            _ => {}
        }
    }

    // Spikes only bite on entry; a spike waking up underfoot is a
    // warning, not a kill.
    fn spike_check(&mut self, pos: Pos) {
        if !self.spikes_armed {
            return;
        }
        if self.level.spikes.iter().any(|s| s.pos == pos && s.active) {
            self.kill_player();
        }
    }

    fn use_zone(&mut self, pos: Pos) {
        let now = self.ticks;
        if let Some(zone) = self.level.zone_at_mut(pos) {
            if !zone.used {
                zone.used = true;
                zone.used_at = now;
                zone.magnet = MAGNET_START;
                self.player.grant_invuln();
            }
        }
    }

    fn trip_switch(&mut self, pos: Pos) {
        let idx = match self.level.switches.iter().position(|s| s.pos == pos) {
            Some(i) => i,
            None => return,
        };
        if self.level.switches[idx].active {
            return;
        }
        self.level.switches[idx].active = true;
        let effect = self.level.switches[idx].effect;
        match effect {
            SwitchEffect::Rotate(block) => self.rotate_with_care(block),
            SwitchEffect::OpenDoor(door) => {
                self.level.open_door(door);
            }
            SwitchEffect::ToggleSpikes => self.spikes_armed = !self.spikes_armed,
            SwitchEffect::Reroute => self.level.reroute_from(pos),
        }
    }

    // A turn must not drop a wall on an agent or seal the route to the
    // exit or an outstanding key. Four quarter turns are the original
    // layout again, which satisfied both, so the loop always settles.
    fn rotate_with_care(&mut self, block: usize) {
        if block >= self.level.blocks.len() {
            return;
        }
        for _ in 0..4 {
            self.level.rotate_block(block);
            let cells = self.level.blocks[block].cells();
            let pattern = self.level.blocks[block].pattern;
            let crushes = cells.iter().zip(pattern).any(|(&c, t)| {
                t == Tile::Wall && (c == self.player.pos || c == self.monster.pos)
            });
            if !crushes && self.route_intact() {
                return;
            }
        }
    }

    // Winnability from where the player stands and from the respawn
    // point; both matter once deaths send the player back to start.
    fn route_intact(&self) -> bool {
        let mut targets = vec![self.level.exit];
        targets.extend(
            self.level
                .keys
                .iter()
                .filter(|k| !k.collected)
                .map(|k| k.pos),
        );
        path::all_reachable(&self.level, self.player.pos, &targets, Agent::Player)
            && path::all_reachable(&self.level, self.level.start, &targets, Agent::Player)
    }

    fn try_place_bomb(&mut self) {
        if !self.player.has_bomb || self.bomb.is_some() {
            return;
        }
        let pos = self.player.pos;
        if self.level.tile(pos) != Tile::Floor || pos == self.level.exit {
            return;
        }
        self.player.has_bomb = false;
        self.bomb = Some(PlacedBomb {
            pos,
            placed_at: self.ticks,
        });
        self.schedule(BOMB_FUSE, EventKind::Detonate(pos));
    }

    fn schedule(&mut self, delay: u64, kind: EventKind) {
        self.events.push(TimedEvent {
            fire_at: self.ticks + delay,
            generation: self.generation,
            kind,
        });
    }

    fn advance_timers(&mut self, rng: &mut impl Rng) {
        let now = self.ticks;
        self.player.tick_effects(now);
        for spike in &mut self.level.spikes {
            if now >= spike.next_toggle {
                spike.active = !spike.active;
                spike.next_toggle = now + rng.gen_range(SPIKE_TOGGLE_MIN..SPIKE_TOGGLE_MAX);
            }
        }
        for zone in &mut self.level.zones {
            if zone.used {
                zone.magnet = zone.magnet.saturating_sub(1);
            }
        }
        let expired: Vec<Pos> = self
            .level
            .zones
            .iter()
            .filter(|z| z.used && now - z.used_at >= SAFE_LIFETIME)
            .map(|z| z.pos)
            .collect();
        for pos in expired {
            self.level.set(pos, Tile::Floor);
            self.level.zones.retain(|z| z.pos != pos);
        }
        let mut due = Vec::new();
        let mut i = 0;
        while i < self.events.len() {
            if self.events[i].fire_at <= now {
                due.push(self.events.remove(i));
            } else {
                i += 1;
            }
        }
        for event in due {
            if event.generation != self.generation {
                continue;
            }
            match event.kind {
                EventKind::Detonate(center) => self.detonate(center),
                EventKind::BreakWalls(center) => self.break_walls(center),
            }
        }
        self.explosions.retain(|e| now - e.started < EXPLOSION_TTL);
        self.breaking.retain(|b| now - b.started < BREAKING_TTL);
        if now % SPEEDUP_EVERY == 0 {
            self.monster.hasten();
        }
    }

    fn detonate(&mut self, center: Pos) {
        self.bomb = None;
        self.explosions.push(Explosion {
            center,
            started: self.ticks,
        });
        self.schedule(BREAK_DELAY, EventKind::BreakWalls(center));
    }

    // Clear walls in the 3x3 around the blast. The border ring stays,
    // and a wall under the monster stays; nothing else in the blast can
    // be a wall.
    fn break_walls(&mut self, center: Pos) {
        let monster = self.monster.pos;
        let n = self.level.n as isize;
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                let x = center.x as isize + dx;
                let y = center.y as isize + dy;
                if x < 1 || y < 1 || x >= n - 1 || y >= n - 1 {
                    continue;
                }
                let p = Pos::new(x as usize, y as usize);
                if self.level.tile(p) != Tile::Wall || p == monster {
                    continue;
                }
                self.level.set(p, Tile::Floor);
                self.breaking.push(BreakingWall {
                    pos: p,
                    started: self.ticks,
                });
            }
        }
    }

    fn resolve_collision(&mut self, player_was: Pos, monster_was: Pos) {
        if self.player.invuln > 0 {
            return;
        }
        let overlap = self.player.pos == self.monster.pos;
        let crossed = self.player.pos == monster_was && self.monster.pos == player_was;
        if overlap || crossed {
            self.kill_player();
        }
    }

    fn kill_player(&mut self) {
        if self.player.invuln > 0 {
            return;
        }
        self.deaths += 1;
        self.monster.learn();
        if self.rules.hardcore {
            self.phase = Phase::GameOver;
        } else {
            self.player.respawn(self.level.start);
        }
    }

    fn check_win(&mut self) {
        if self.phase == Phase::Playing
            && self.player.pos == self.level.exit
            && self.player.keys >= self.keys_required()
        {
            self.phase = Phase::Won;
        }
    }
}
