use crate::components::{Agent, Dir, Pos};
use crate::level::Level;
use crate::path;
use crate::player::Player;

pub const BASE_COOLDOWN: u32 = 6;
pub const LEARNING_CAP: u32 = 10;
pub const SPEED_CAP: f32 = 2.0;
pub const SPEED_STEP: f32 = 0.1;
pub const ALERT_CHASE_MIN: u8 = 30;
pub const MAGNET_PULL_MIN: u8 = 30;
const ALERT_RADIUS: usize = 6;
const ALERT_RISE: u8 = 5;
const ALERT_DECAY: u8 = 2;
const TRAIL_MIN: usize = 5;
const HEAT_AMBUSH_MIN: u32 = 12;

// Per-cell visit counts for the player. Feeds the monster's ambush
// targeting and nothing else.
pub struct Heatmap {
    n: usize,
    counts: Vec<u32>,
}

impl Heatmap {
    pub fn new(n: usize) -> Heatmap {
        Heatmap {
            n,
            counts: vec![0; n * n],
        }
    }

    pub fn bump(&mut self, p: Pos) {
        let c = &mut self.counts[p.y * self.n + p.x];
        *c = c.saturating_add(1);
    }

    // First strict maximum in scan order, so ties resolve the same way
    // every tick.
    pub fn hottest(&self) -> Option<(Pos, u32)> {
        let mut best: Option<(usize, u32)> = None;
        for (idx, &c) in self.counts.iter().enumerate() {
            if c > 0 && best.map_or(true, |(_, b)| c > b) {
                best = Some((idx, c));
            }
        }
        best.map(|(idx, c)| (Pos::new(idx % self.n, idx / self.n), c))
    }
}

pub struct Monster {
    pub pos: Pos,
    pub cooldown: u32,
    pub alert: u8,
    pub learning: u32,
    pub speed: f32,
}

impl Monster {
    pub fn new(pos: Pos) -> Monster {
        Monster {
            pos,
            cooldown: BASE_COOLDOWN,
            alert: 0,
            learning: 1,
            speed: 1.0,
        }
    }

    // Alert climbs while the player is close and bleeds away otherwise.
    pub fn observe(&mut self, player: Pos) {
        if self.pos.manhattan(player) <= ALERT_RADIUS {
            self.alert = (self.alert + ALERT_RISE).min(100);
        } else {
            self.alert = self.alert.saturating_sub(ALERT_DECAY);
        }
    }

    pub fn learn(&mut self) {
        self.learning = (self.learning + 1).min(LEARNING_CAP);
    }

    pub fn hasten(&mut self) {
        self.speed = (self.speed + SPEED_STEP).min(SPEED_CAP);
    }

    // Priority order: a loud safe-zone magnet, then stale scent (the old
    // end of the trail) when alert is high, then a learned ambush spot
    // when alert is low, then the player directly.
    pub fn choose_target(&self, level: &Level, player: &Player, heat: &Heatmap) -> Pos {
        if let Some(zone) = level
            .zones
            .iter()
            .filter(|z| z.used && z.magnet > MAGNET_PULL_MIN)
            .max_by_key(|z| z.magnet)
        {
            return zone.pos;
        }
        if self.alert > ALERT_CHASE_MIN && player.trail.len() > TRAIL_MIN {
            if let Some(&oldest) = player.trail.back() {
                return oldest;
            }
        }
        if self.alert <= ALERT_CHASE_MIN && self.learning >= 2 {
            if let Some((spot, hits)) = heat.hottest() {
                if hits >= HEAT_AMBUSH_MIN / self.learning {
                    return spot;
                }
            }
        }
        player.pos
    }

    // One decision per ready tick: step along the shortest route, or
    // nudge greedily when no route exists.
    pub fn take_turn(&mut self, level: &Level, player: &Player, heat: &Heatmap) {
        if self.cooldown > 0 {
            self.cooldown -= 1;
            return;
        }
        let target = self.choose_target(level, player, heat);
        let step = path::first_step(level, self.pos, target, Agent::Monster)
            .or_else(|| self.greedy_step(level, target));
        if let Some(next) = step {
            self.pos = next;
        }
        self.cooldown = self.turn_cooldown();
    }

    // Learning shaves the cooldown, the global speedup divides it, and
    // the floor of one tick keeps the chase fair.
    pub fn turn_cooldown(&self) -> u32 {
        let eased = BASE_COOLDOWN.saturating_sub((self.learning - 1) / 2).max(1);
        ((eased as f32 / self.speed).floor() as u32).max(1)
    }

    // Fallback when BFS finds nothing: lean along the dominant axis,
    // then the other, entering any walkable cell.
    fn greedy_step(&self, level: &Level, target: Pos) -> Option<Pos> {
        let dx = target.x as isize - self.pos.x as isize;
        let dy = target.y as isize - self.pos.y as isize;
        if dx == 0 && dy == 0 {
            return None;
        }
        let horiz = if dx > 0 { Dir::Right } else { Dir::Left };
        let vert = if dy > 0 { Dir::Down } else { Dir::Up };
        let order = if dx.abs() > dy.abs() {
            [horiz, vert]
        } else {
            [vert, horiz]
        };
        for dir in order {
            let skip = (dir == horiz && dx == 0) || (dir == vert && dy == 0);
            if skip {
                continue;
            }
            if let Some(next) = level.offset(self.pos, dir) {
                if level.is_walkable(next, Agent::Monster) {
                    return Some(next);
                }
            }
        }
        None
    }
}
