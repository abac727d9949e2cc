use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::components::{Agent, Pos, PowerUpKind, Tile};
use crate::level::{
    Key, Level, PowerUp, RotatingBlock, SafeZone, SpikeTrap, SwitchEffect, WallSwitch,
    SPIKE_TOGGLE_MAX, SPIKE_TOGGLE_MIN,
};
use crate::path;

pub const KEY_COUNT: usize = 3;
const KEY_SPACING: usize = 5;
const KEY_EXCLUSION: usize = 6;
const ZONE_START_GAP: usize = 8;
const SPIKE_START_GAP: usize = 6;
const SWITCH_START_GAP: usize = 3;
const DOOR_START_GAP: usize = 4;
const ATTEMPTS: usize = 200;

// Zone footprints around a sampled corner cell: one full 2x2 and the
// four L shapes with a corner dropped.
const ZONE_SHAPES: [&[(usize, usize)]; 5] = [
    &[(0, 0), (1, 0), (0, 1), (1, 1)],
    &[(0, 0), (1, 0), (0, 1)],
    &[(0, 0), (1, 0), (1, 1)],
    &[(0, 0), (0, 1), (1, 1)],
    &[(1, 0), (0, 1), (1, 1)],
];

// Fills a carved maze with everything the run needs. Order is fixed so a
// seed reproduces the same board. Rotating blocks go in before doors:
// block placement re-checks the route, and that check is only meaningful
// while the board is still open. Doors are placed blind, the backstop
// repairs whatever they seal, and the monster takes its corner on the
// repaired board.
pub fn populate(level: &mut Level, rng: &mut impl Rng) {
    let mut claimed: HashSet<Pos> = HashSet::new();
    claimed.insert(level.start);
    claimed.insert(level.exit);

    place_keys(level, rng, &mut claimed);
    place_zones(level, rng, &mut claimed);
    place_blocks(level, rng, &mut claimed);
    place_doors(level, rng, &mut claimed);
    place_spikes(level, rng, &mut claimed);
    place_switches(level, rng, &mut claimed);
    place_pickups(level, rng, &mut claimed);
    ensure_solvable(level);
    place_monster(level, &mut claimed);
}

// Rejection-sample an unclaimed floor cell satisfying `pred`. After the
// attempt budget the predicate is dropped rather than failing the level.
fn sample_floor(
    level: &Level,
    rng: &mut impl Rng,
    claimed: &HashSet<Pos>,
    pred: impl Fn(Pos) -> bool,
) -> Option<Pos> {
    let floors = level.floor_cells();
    for _ in 0..ATTEMPTS {
        if let Some(&p) = floors.choose(rng) {
            if !claimed.contains(&p) && pred(p) {
                return Some(p);
            }
        }
    }
    floors.into_iter().find(|p| !claimed.contains(p))
}

fn place_keys(level: &mut Level, rng: &mut impl Rng, claimed: &mut HashSet<Pos>) {
    let start = level.start;
    let exit = level.exit;
    let mut keys: Vec<Key> = Vec::new();
    for _ in 0..KEY_COUNT {
        let spot = sample_floor(level, rng, claimed, |p| {
            p.manhattan(start) >= KEY_EXCLUSION
                && p.manhattan(exit) >= KEY_EXCLUSION
                && keys.iter().all(|k| k.pos.manhattan(p) >= KEY_SPACING)
        });
        if let Some(pos) = spot {
            claimed.insert(pos);
            keys.push(Key {
                pos,
                collected: false,
            });
        }
    }
    level.keys = keys;
}

fn place_zones(level: &mut Level, rng: &mut impl Rng, claimed: &mut HashSet<Pos>) {
    let start = level.start;
    let n = level.n;
    let count = rng.gen_range(1..=4);
    for _ in 0..count {
        let corner = match sample_floor(level, rng, claimed, |p| {
            p.manhattan(start) >= ZONE_START_GAP && p.x < n - 2 && p.y < n - 2
        }) {
            Some(p) => p,
            None => break,
        };
        let shape = ZONE_SHAPES[rng.gen_range(0..ZONE_SHAPES.len())];
        let mut placed = 0;
        for &(dx, dy) in shape {
            let p = Pos::new(corner.x + dx, corner.y + dy);
            if level.interior(p) && level.tile(p) == Tile::Floor && !claimed.contains(&p) {
                level.set(p, Tile::Safe);
                level.zones.push(SafeZone {
                    pos: p,
                    used: false,
                    used_at: 0,
                    magnet: 0,
                });
                claimed.insert(p);
                placed += 1;
            }
        }
        // A footprint walled in on every side still yields its corner.
        if placed == 0 {
            level.set(corner, Tile::Safe);
            level.zones.push(SafeZone {
                pos: corner,
                used: false,
                used_at: 0,
                magnet: 0,
            });
            claimed.insert(corner);
        }
    }
}

fn place_doors(level: &mut Level, rng: &mut impl Rng, claimed: &mut HashSet<Pos>) {
    let start = level.start;
    let count = rng.gen_range(0..=4);
    for _ in 0..count {
        let spot = sample_floor(level, rng, claimed, |p| {
            p.manhattan(start) >= DOOR_START_GAP
        });
        if let Some(pos) = spot {
            level.set(pos, Tile::Door);
            level.doors.push(pos);
            claimed.insert(pos);
        }
    }
}

// Spikes cluster around two anchors so they read as trapped regions
// rather than random noise.
fn place_spikes(level: &mut Level, rng: &mut impl Rng, claimed: &mut HashSet<Pos>) {
    let start = level.start;
    let mut anchors = Vec::new();
    for _ in 0..2 {
        if let Some(p) = sample_floor(level, rng, claimed, |p| {
            p.manhattan(start) >= SPIKE_START_GAP
        }) {
            anchors.push(p);
        }
    }
    if anchors.is_empty() {
        return;
    }
    let total = rng.gen_range(4..=6);
    for i in 0..total {
        let anchor = anchors[i % anchors.len()];
        let spot = sample_floor(level, rng, claimed, |p| p.manhattan(anchor) <= 2);
        if let Some(pos) = spot {
            level.set(pos, Tile::Spike);
            level.spikes.push(SpikeTrap {
                pos,
                active: rng.gen_bool(0.5),
                next_toggle: rng.gen_range(SPIKE_TOGGLE_MIN..SPIKE_TOGGLE_MAX),
            });
            claimed.insert(pos);
        }
    }
}

fn place_blocks(level: &mut Level, rng: &mut impl Rng, claimed: &mut HashSet<Pos>) {
    let count = rng.gen_range(2..=3);
    'blocks: for _ in 0..count {
        for _ in 0..ATTEMPTS {
            let anchor = Pos::new(
                rng.gen_range(1..level.n - 2),
                rng.gen_range(1..level.n - 2),
            );
            if let Some(block) = try_block(level, anchor, claimed) {
                let cells = block.cells();
                let orig: Vec<Tile> = cells.iter().map(|&c| level.tile(c)).collect();
                level.blocks.push(block);
                let idx = level.blocks.len() - 1;
                level.write_block(idx);
                if solvable(level) {
                    claimed.extend(cells);
                    continue 'blocks;
                }
                // The normalized pattern severed the route; put the
                // original tiles back and resample.
                for (cell, tile) in cells.into_iter().zip(orig) {
                    level.set(cell, tile);
                }
                level.blocks.pop();
            }
        }
    }
}

// Capture the 2x2 under `anchor` as a rotor pattern: walls stay walls,
// everything else flattens to floor, the anchor cell becomes a marker.
// Patterns that would rotate trivially get one cell flipped.
fn try_block(level: &Level, anchor: Pos, claimed: &HashSet<Pos>) -> Option<RotatingBlock> {
    let block = RotatingBlock {
        anchor,
        pattern: [Tile::Floor; 4],
    };
    let cells = block.cells();
    for &c in &cells {
        if !level.interior(c) || claimed.contains(&c) {
            return None;
        }
        if !matches!(level.tile(c), Tile::Floor | Tile::Wall) {
            return None;
        }
    }
    let mut pattern = [Tile::Floor; 4];
    for (slot, &c) in pattern.iter_mut().zip(&cells).skip(1) {
        *slot = match level.tile(c) {
            Tile::Wall => Tile::Wall,
            _ => Tile::Floor,
        };
    }
    let walls = pattern.iter().filter(|&&t| t == Tile::Wall).count();
    if walls == 0 {
        pattern[2] = Tile::Wall;
    } else if walls == 3 {
        pattern[2] = Tile::Floor;
    }
    pattern[0] = Tile::RotorAnchor;
    Some(RotatingBlock { anchor, pattern })
}

fn place_switches(level: &mut Level, rng: &mut impl Rng, claimed: &mut HashSet<Pos>) {
    let start = level.start;
    let count = rng.gen_range(2..=4);
    let mut cursor = 0;
    let mut next_block = 0;
    let mut next_door = 0;
    for _ in 0..count {
        let mut effect = None;
        for k in 0..4 {
            let kind = (cursor + k) % 4;
            effect = match kind {
                0 if next_block < level.blocks.len() => {
                    next_block += 1;
                    Some(SwitchEffect::Rotate(next_block - 1))
                }
                1 if next_door < level.doors.len() => {
                    next_door += 1;
                    Some(SwitchEffect::OpenDoor(level.doors[next_door - 1]))
                }
                2 if !level.spikes.is_empty() => Some(SwitchEffect::ToggleSpikes),
                3 => Some(SwitchEffect::Reroute),
                _ => None,
            };
            if effect.is_some() {
                cursor = (kind + 1) % 4;
                break;
            }
        }
        let effect = match effect {
            Some(e) => e,
            None => break,
        };
        let spot = sample_floor(level, rng, claimed, |p| {
            p.manhattan(start) >= SWITCH_START_GAP
        });
        if let Some(pos) = spot {
            level.set(pos, Tile::Switch);
            level.switches.push(WallSwitch {
                pos,
                effect,
                active: false,
            });
            claimed.insert(pos);
        }
    }
}

fn place_pickups(level: &mut Level, rng: &mut impl Rng, claimed: &mut HashSet<Pos>) {
    for _ in 0..rng.gen_range(0..=2u32) {
        if let Some(pos) = sample_floor(level, rng, claimed, |_| true) {
            level.bombs.push(pos);
            claimed.insert(pos);
        }
    }
    for _ in 0..rng.gen_range(0..=2u32) {
        if let Some(pos) = sample_floor(level, rng, claimed, |_| true) {
            level.powerups.push(PowerUp {
                pos,
                kind: PowerUpKind::Speed,
            });
            claimed.insert(pos);
        }
    }
}

// The monster starts in the far half of the board, on the cell nearest
// the corner opposite the player. Distance comes first: within the far
// pool, cells it can hunt from are preferred, but a temporarily sealed
// far cell still beats one next to the start; door openings and the
// greedy fallback free it later.
fn place_monster(level: &mut Level, claimed: &mut HashSet<Pos>) {
    let corner = Pos::new(level.n - 2, 1);
    let start = level.start;
    let candidates: Vec<Pos> = level
        .floor_cells()
        .into_iter()
        .filter(|p| !claimed.contains(p))
        .collect();
    let far: Vec<Pos> = candidates
        .iter()
        .copied()
        .filter(|p| p.manhattan(start) > level.n / 2)
        .collect();
    let pool: &[Pos] = if far.is_empty() { &candidates } else { &far };
    let spot = pool
        .iter()
        .copied()
        .filter(|&p| path::reachable(level, p, start, Agent::Monster))
        .min_by_key(|p| p.manhattan(corner))
        .or_else(|| pool.iter().copied().min_by_key(|p| p.manhattan(corner)))
        .unwrap_or(level.exit);
    claimed.insert(spot);
    level.monster_spawn = spot;
}

fn required(level: &Level) -> Vec<Pos> {
    let mut targets = vec![level.exit];
    targets.extend(level.keys.iter().filter(|k| !k.collected).map(|k| k.pos));
    targets
}

fn solvable(level: &Level) -> bool {
    path::all_reachable(level, level.start, &required(level), Agent::Player)
}

// Doors are placed blind, so a door (or pair of doors) can wall off the
// exit or a key. Open the cheapest set that restores the route; opening
// every door always succeeds because doors are the only blind hazard.
pub fn ensure_solvable(level: &mut Level) {
    while !solvable(level) {
        let doors = level.doors.clone();
        if doors.is_empty() {
            return;
        }
        let mut fixed = false;
        for door in &doors {
            level.set(*door, Tile::Floor);
            if solvable(level) {
                level.doors.retain(|d| d != door);
                fixed = true;
                break;
            }
            level.set(*door, Tile::Door);
        }
        if !fixed {
            // No single door fixes it; open the first and iterate.
            level.open_door(doors[0]);
        }
    }
}
