use std::collections::VecDeque;

use crate::infra::Position;
use crate::state::Map;

/// Distance reported for cells that cannot reach each other.
pub const UNREACHABLE: u32 = u32::MAX;

/// All-pairs shortest path lengths between free cells, computed once per map.
///
/// Free cells get a compact slot so the table only holds `free * free` entries.
#[derive(Clone, Debug)]
pub struct DistanceTable {
    width: i32,
    height: i32,
    slots: Vec<Option<usize>>,
    free: usize,
    dist: Vec<u32>,
}

impl DistanceTable {
    pub fn compute(map: &Map) -> Self {
        let mut slots = vec![None; map.len()];
        let mut free = 0;
        for pos in map.free_cells() {
            if let Some(index) = map.index(&pos) {
                slots[index] = Some(free);
                free += 1;
            }
        }

        let mut table = Self {
            width: map.width,
            height: map.height,
            slots,
            free,
            dist: vec![UNREACHABLE; free * free],
        };

        for start in map.free_cells() {
            table.fill_from(map, start);
        }

        tracing::debug!(free_cells = free, "Distance table computed");
        table
    }

    fn fill_from(&mut self, map: &Map, start: Position) {
        let Some(from) = self.slot(&start) else {
            return;
        };
        let row = from * self.free;

        let mut queue = VecDeque::from([start]);
        self.dist[row + from] = 0;

        while let Some(current) = queue.pop_front() {
            let Some(current_slot) = self.slot(&current) else {
                continue;
            };
            let next_dist = self.dist[row + current_slot] + 1;

            for neighbor in current.neighbors() {
                if !map.is_free(&neighbor) {
                    continue;
                }
                let Some(neighbor_slot) = self.slot(&neighbor) else {
                    continue;
                };
                if self.dist[row + neighbor_slot] != UNREACHABLE {
                    continue;
                }
                self.dist[row + neighbor_slot] = next_dist;
                queue.push_back(neighbor);
            }
        }
    }

    fn slot(&self, pos: &Position) -> Option<usize> {
        if pos.x < 0 || pos.x >= self.width || pos.y < 0 || pos.y >= self.height {
            return None;
        }
        self.slots[(pos.y * self.width + pos.x) as usize]
    }

    /// Shortest path length, or [`UNREACHABLE`] when either cell is a wall or disconnected.
    pub fn distance(&self, from: Position, to: Position) -> u32 {
        match (self.slot(&from), self.slot(&to)) {
            (Some(a), Some(b)) => self.dist[a * self.free + b],
            _ => UNREACHABLE,
        }
    }
}
