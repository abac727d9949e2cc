use std::collections::VecDeque;

use crate::components::{Agent, Dir, Pos};
use crate::level::Level;

// Breadth-first flood from `from`, recording each visited cell's parent.
// Neighbors expand in Dir::ALL order, so equal-length paths always tie
// the same way and the chase never jitters.
fn flood(level: &Level, from: Pos, agent: Agent) -> Vec<Option<Pos>> {
    let n = level.n;
    let mut parents: Vec<Option<Pos>> = vec![None; n * n];
    let mut seen = vec![false; n * n];
    let mut queue = VecDeque::new();
    seen[from.y * n + from.x] = true;
    queue.push_back(from);
    while let Some(cell) = queue.pop_front() {
        for dir in Dir::ALL {
            let next = match level.offset(cell, dir) {
                Some(p) => p,
                None => continue,
            };
            let idx = next.y * n + next.x;
            if seen[idx] || !level.is_walkable(next, agent) {
                continue;
            }
            seen[idx] = true;
            parents[idx] = Some(cell);
            queue.push_back(next);
        }
    }
    parents
}

fn visited(level: &Level, from: Pos, parents: &[Option<Pos>], p: Pos) -> bool {
    p == from || parents[p.y * level.n + p.x].is_some()
}

// Full path from `from` to `to`, exclusive of `from`, inclusive of `to`.
pub fn shortest(level: &Level, from: Pos, to: Pos, agent: Agent) -> Option<Vec<Pos>> {
    if from == to {
        return Some(Vec::new());
    }
    let parents = flood(level, from, agent);
    if !visited(level, from, &parents, to) {
        return None;
    }
    let mut steps = Vec::new();
    let mut cur = to;
    while cur != from {
        steps.push(cur);
        cur = parents[cur.y * level.n + cur.x]?;
    }
    steps.reverse();
    Some(steps)
}

// First step only, recovered by walking the parent chain back from the
// target until it meets `from`; the path itself is never built.
pub fn first_step(level: &Level, from: Pos, to: Pos, agent: Agent) -> Option<Pos> {
    if from == to {
        return None;
    }
    let parents = flood(level, from, agent);
    let mut cur = to;
    loop {
        let parent = parents[cur.y * level.n + cur.x]?;
        if parent == from {
            return Some(cur);
        }
        cur = parent;
    }
}

pub fn reachable(level: &Level, from: Pos, to: Pos, agent: Agent) -> bool {
    let parents = flood(level, from, agent);
    visited(level, from, &parents, to)
}

pub fn distance(level: &Level, from: Pos, to: Pos, agent: Agent) -> Option<usize> {
    shortest(level, from, to, agent).map(|steps| steps.len())
}

// One flood answering reachability for several targets at once.
pub fn all_reachable(level: &Level, from: Pos, targets: &[Pos], agent: Agent) -> bool {
    let parents = flood(level, from, agent);
    targets.iter().all(|&t| visited(level, from, &parents, t))
}
