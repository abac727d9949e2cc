use rand::seq::SliceRandom;
use rand::Rng;

use crate::components::{Agent, Dir, Pos, PowerUpKind, Tile};

pub const SPIKE_TOGGLE_MIN: u64 = 40;
pub const SPIKE_TOGGLE_MAX: u64 = 120;

pub struct Key {
    pub pos: Pos,
    pub collected: bool,
}

pub struct SafeZone {
    pub pos: Pos,
    pub used: bool,
    pub used_at: u64,
    pub magnet: u8,
}

pub struct SpikeTrap {
    pub pos: Pos,
    pub active: bool,
    pub next_toggle: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchEffect {
    Rotate(usize),
    OpenDoor(Pos),
    ToggleSpikes,
    Reroute,
}

pub struct WallSwitch {
    pub pos: Pos,
    pub effect: SwitchEffect,
    pub active: bool,
}

// Pattern cells in clockwise ring order from the anchor (top-left):
// [top-left, top-right, bottom-right, bottom-left]. A clockwise turn of
// the block is then a rotate_right(1) of the array.
pub struct RotatingBlock {
    pub anchor: Pos,
    pub pattern: [Tile; 4],
}

impl RotatingBlock {
    pub fn cells(&self) -> [Pos; 4] {
        let Pos { x, y } = self.anchor;
        [
            Pos::new(x, y),
            Pos::new(x + 1, y),
            Pos::new(x + 1, y + 1),
            Pos::new(x, y + 1),
        ]
    }
}

pub struct PowerUp {
    pub pos: Pos,
    pub kind: PowerUpKind,
}

pub struct Level {
    pub n: usize,
    tiles: Vec<Vec<Tile>>,
    pub start: Pos,
    pub exit: Pos,
    pub keys: Vec<Key>,
    pub doors: Vec<Pos>,
    pub zones: Vec<SafeZone>,
    pub spikes: Vec<SpikeTrap>,
    pub switches: Vec<WallSwitch>,
    pub blocks: Vec<RotatingBlock>,
    pub bombs: Vec<Pos>,
    pub powerups: Vec<PowerUp>,
    pub monster_spawn: Pos,
}

impl Level {
    fn blank(n: usize) -> Level {
        Level {
            n,
            tiles: vec![vec![Tile::Wall; n]; n],
            start: Pos::new(1, 1),
            exit: Pos::new(n - 2, n - 2),
            keys: Vec::new(),
            doors: Vec::new(),
            zones: Vec::new(),
            spikes: Vec::new(),
            switches: Vec::new(),
            blocks: Vec::new(),
            bombs: Vec::new(),
            powerups: Vec::new(),
            monster_spawn: Pos::new(n - 2, 1),
        }
    }

    pub fn generate(n: usize, rng: &mut impl Rng) -> Level {
        let mut level = Level::blank(n);
        level.carve_maze(rng);
        level.set(level.exit, Tile::Floor);
        level.widen(rng);
        level
    }

    // Iterative backtracker over the odd-coordinate lattice.
    fn carve_maze(&mut self, rng: &mut impl Rng) {
        self.set(self.start, Tile::Floor);
        let mut stack = vec![self.start];
        while let Some(&cell) = stack.last() {
            let mut open = Vec::new();
            for dir in Dir::ALL {
                if let Some((_, next)) = self.jump(cell, dir) {
                    if self.tile(next) == Tile::Wall {
                        open.push(dir);
                    }
                }
            }
            match open.choose(rng).and_then(|&d| self.jump(cell, d)) {
                Some((mid, next)) => {
                    self.set(mid, Tile::Floor);
                    self.set(next, Tile::Floor);
                    stack.push(next);
                }
                None => {
                    stack.pop();
                }
            }
        }
    }

    // Knock out a few walls so the maze is not a strict tree; dead ends
    // make chases too easy to script.
    fn widen(&mut self, rng: &mut impl Rng) {
        let attempts = self.n * self.n / 14;
        for _ in 0..attempts {
            let p = Pos::new(
                rng.gen_range(1..self.n - 1),
                rng.gen_range(1..self.n - 1),
            );
            if self.tile(p) != Tile::Wall {
                continue;
            }
            let floors = Dir::ALL
                .iter()
                .filter_map(|&d| self.offset(p, d))
                .filter(|&q| self.tile(q) == Tile::Floor)
                .count();
            if floors >= 2 {
                self.set(p, Tile::Floor);
            }
        }
    }

    pub fn tile(&self, p: Pos) -> Tile {
        self.tiles[p.y][p.x]
    }

    pub fn set(&mut self, p: Pos, t: Tile) {
        self.tiles[p.y][p.x] = t;
    }

    pub fn in_bounds(&self, p: Pos) -> bool {
        p.x < self.n && p.y < self.n
    }

    pub fn interior(&self, p: Pos) -> bool {
        p.x >= 1 && p.x < self.n - 1 && p.y >= 1 && p.y < self.n - 1
    }

    pub fn offset(&self, p: Pos, dir: Dir) -> Option<Pos> {
        let (dx, dy) = dir.delta();
        let x = p.x as isize + dx;
        let y = p.y as isize + dy;
        if x < 0 || y < 0 || x >= self.n as isize || y >= self.n as isize {
            return None;
        }
        Some(Pos::new(x as usize, y as usize))
    }

    // Midpoint and landing cell two steps out, or None if the landing
    // cell would leave the interior.
    fn jump(&self, p: Pos, dir: Dir) -> Option<(Pos, Pos)> {
        let (dx, dy) = dir.delta();
        let x = p.x as isize + 2 * dx;
        let y = p.y as isize + 2 * dy;
        if x < 1 || y < 1 || x >= (self.n - 1) as isize || y >= (self.n - 1) as isize {
            return None;
        }
        let mid = Pos::new((p.x as isize + dx) as usize, (p.y as isize + dy) as usize);
        Some((mid, Pos::new(x as usize, y as usize)))
    }

    pub fn is_walkable(&self, p: Pos, agent: Agent) -> bool {
        if !self.in_bounds(p) {
            return false;
        }
        match self.tile(p) {
            Tile::Wall | Tile::Door => false,
            Tile::Safe => match agent {
                Agent::Player => true,
                Agent::Monster => self.zone_at(p).map_or(true, |z| z.used),
            },
            _ => true,
        }
    }

    pub fn zone_at(&self, p: Pos) -> Option<&SafeZone> {
        self.zones.iter().find(|z| z.pos == p)
    }

    pub fn zone_at_mut(&mut self, p: Pos) -> Option<&mut SafeZone> {
        self.zones.iter_mut().find(|z| z.pos == p)
    }

    pub fn floor_cells(&self) -> Vec<Pos> {
        let mut cells = Vec::new();
        for y in 1..self.n - 1 {
            for x in 1..self.n - 1 {
                let p = Pos::new(x, y);
                if self.tile(p) == Tile::Floor {
                    cells.push(p);
                }
            }
        }
        cells
    }

    // One clockwise quarter turn; pattern and grid stay in lockstep.
    pub fn rotate_block(&mut self, idx: usize) {
        self.blocks[idx].pattern.rotate_right(1);
        self.write_block(idx);
    }

    pub fn write_block(&mut self, idx: usize) {
        let cells = self.blocks[idx].cells();
        let pattern = self.blocks[idx].pattern;
        for (cell, tile) in cells.into_iter().zip(pattern) {
            self.set(cell, tile);
        }
    }

    pub fn open_door(&mut self, p: Pos) -> bool {
        if self.tile(p) != Tile::Door {
            return false;
        }
        self.set(p, Tile::Floor);
        self.doors.retain(|&d| d != p);
        true
    }

    // Carve a short passage out of the first wall adjacent to `from`.
    // Never touches the border ring.
    pub fn reroute_from(&mut self, from: Pos) {
        for dir in Dir::ALL {
            let first = match self.offset(from, dir) {
                Some(p) if self.interior(p) && self.tile(p) == Tile::Wall => p,
                _ => continue,
            };
            self.set(first, Tile::Floor);
            if let Some(second) = self.offset(first, dir) {
                if self.interior(second) && self.tile(second) == Tile::Wall {
                    self.set(second, Tile::Floor);
                }
            }
            return;
        }
    }

    #[cfg(test)]
    pub fn parse(rows: &[&str]) -> Level {
        let n = rows.len();
        let mut level = Level::blank(n);
        for (y, row) in rows.iter().enumerate() {
            assert_eq!(row.chars().count(), n, "grid must be square");
            for (x, ch) in row.chars().enumerate() {
                let p = Pos::new(x, y);
                let tile = match ch {
                    '#' => Tile::Wall,
                    '.' => Tile::Floor,
                    'P' => {
                        level.start = p;
                        Tile::Floor
                    }
                    'E' => {
                        level.exit = p;
                        Tile::Floor
                    }
                    'M' => {
                        level.monster_spawn = p;
                        Tile::Floor
                    }
                    'K' => {
                        level.keys.push(Key {
                            pos: p,
                            collected: false,
                        });
                        Tile::Floor
                    }
                    'D' => {
                        level.doors.push(p);
                        Tile::Door
                    }
                    'S' => {
                        level.zones.push(SafeZone {
                            pos: p,
                            used: false,
                            used_at: 0,
                            magnet: 0,
                        });
                        Tile::Safe
                    }
                    '^' => {
                        level.spikes.push(SpikeTrap {
                            pos: p,
                            active: true,
                            next_toggle: u64::MAX,
                        });
                        Tile::Spike
                    }
                    _ => panic!("unknown map char {ch:?}"),
                };
                level.set(p, tile);
            }
        }
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_maze_keeps_border_and_is_solvable() {
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let level = Level::generate(21, &mut rng);
            for i in 0..21 {
                assert_eq!(level.tile(Pos::new(i, 0)), Tile::Wall);
                assert_eq!(level.tile(Pos::new(i, 20)), Tile::Wall);
                assert_eq!(level.tile(Pos::new(0, i)), Tile::Wall);
                assert_eq!(level.tile(Pos::new(20, i)), Tile::Wall);
            }
            assert_eq!(level.tile(level.start), Tile::Floor);
            assert_eq!(level.tile(level.exit), Tile::Floor);
            assert!(
                path::reachable(&level, level.start, level.exit, Agent::Player),
                "seed {seed} produced an unsolvable maze"
            );
        }
    }

    #[test]
    fn widening_leaves_some_walls_standing() {
        let mut rng = StdRng::seed_from_u64(3);
        let level = Level::generate(21, &mut rng);
        let walls = (1..20)
            .flat_map(|y| (1..20).map(move |x| Pos::new(x, y)))
            .filter(|&p| level.tile(p) == Tile::Wall)
            .count();
        assert!(walls > 0, "widening ate the whole maze");
    }

    fn open_room() -> Level {
        Level::parse(&[
            "#######",
            "#P....#",
            "#.....#",
            "#.....#",
            "#.....#",
            "#....E#",
            "#######",
        ])
    }

    #[test]
    fn four_rotations_restore_the_block() {
        let mut level = open_room();
        level.blocks.push(RotatingBlock {
            anchor: Pos::new(3, 3),
            pattern: [Tile::RotorAnchor, Tile::Wall, Tile::Floor, Tile::Floor],
        });
        level.write_block(0);
        let before: Vec<Tile> = level.blocks[0]
            .cells()
            .iter()
            .map(|&c| level.tile(c))
            .collect();
        for _ in 0..4 {
            level.rotate_block(0);
        }
        let after: Vec<Tile> = level.blocks[0]
            .cells()
            .iter()
            .map(|&c| level.tile(c))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn single_rotation_moves_the_wall_clockwise() {
        let mut level = open_room();
        level.blocks.push(RotatingBlock {
            anchor: Pos::new(3, 3),
            pattern: [Tile::Wall, Tile::Floor, Tile::Floor, Tile::RotorAnchor],
        });
        level.write_block(0);
        assert_eq!(level.tile(Pos::new(3, 3)), Tile::Wall);
        level.rotate_block(0);
        assert_eq!(level.tile(Pos::new(3, 3)), Tile::RotorAnchor);
        assert_eq!(level.tile(Pos::new(4, 3)), Tile::Wall);
    }

    #[test]
    fn reroute_carves_through_the_first_wall_clockwise() {
        let mut level = Level::parse(&[
            "#######",
            "#P....#",
            "#.###.#",
            "#.#.#.#",
            "#.###.#",
            "#....E#",
            "#######",
        ]);
        // From (2,2): Up is floor, Right is the wall at (3,2).
        level.reroute_from(Pos::new(2, 2));
        assert_eq!(level.tile(Pos::new(3, 2)), Tile::Floor);
        // Carving continues one more cell in the same direction.
        assert_eq!(level.tile(Pos::new(4, 2)), Tile::Floor);
    }

    #[test]
    fn reroute_never_breaches_the_border() {
        let mut level = Level::parse(&[
            "#####",
            "#P..#",
            "#...#",
            "#..E#",
            "#####",
        ]);
        level.reroute_from(Pos::new(1, 1));
        for i in 0..5 {
            assert_eq!(level.tile(Pos::new(i, 0)), Tile::Wall);
            assert_eq!(level.tile(Pos::new(0, i)), Tile::Wall);
        }
    }

    #[test]
    fn doors_block_both_agents_until_opened() {
        let mut level = Level::parse(&[
            "#####",
            "#P#.#",
            "#D#.#",
            "#..E#",
            "#####",
        ]);
        let door = Pos::new(1, 2);
        assert!(!level.is_walkable(door, Agent::Player));
        assert!(!level.is_walkable(door, Agent::Monster));
        assert!(level.open_door(door));
        assert!(level.is_walkable(door, Agent::Player));
        assert!(level.doors.is_empty());
        // A second open on the same cell is a no-op.
        assert!(!level.open_door(door));
    }

    #[test]
    fn unused_safe_zone_blocks_only_the_monster() {
        let mut level = Level::parse(&[
            "#####",
            "#P..#",
            "#S..#",
            "#..E#",
            "#####",
        ]);
        let zone = Pos::new(1, 2);
        assert!(level.is_walkable(zone, Agent::Player));
        assert!(!level.is_walkable(zone, Agent::Monster));
        if let Some(z) = level.zone_at_mut(zone) {
            z.used = true;
        }
        assert!(level.is_walkable(zone, Agent::Monster));
    }

    #[test]
    fn spikes_are_walkable_for_everyone() {
        let level = Level::parse(&[
            "#####",
            "#P..#",
            "#^..#",
            "#..E#",
            "#####",
        ]);
        let spike = Pos::new(1, 2);
        assert!(level.is_walkable(spike, Agent::Player));
        assert!(level.is_walkable(spike, Agent::Monster));
    }
}
