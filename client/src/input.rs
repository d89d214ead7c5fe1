//! Input sources for the headless client
//!
//! The client asks its input source for a heading once per tick. Sources
//! only look at the mirrored board, so they never depend on timing.

use crate::game::ClientGame;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shared::{Board, Direction};
use std::collections::VecDeque;

pub trait InputSource {
    /// Heading to send this tick, or `None` to keep the current one
    fn next_direction(&mut self, game: &ClientGame) -> Option<Direction>;

    /// Called when our snake is (re)spawned so sources can reset
    fn on_spawn(&mut self) {}
}

/// Plays back a fixed list of headings, one per tick while alive
#[derive(Debug, Default)]
pub struct ScriptedInput {
    script: VecDeque<Direction>,
}

impl ScriptedInput {
    pub fn new(script: impl IntoIterator<Item = Direction>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn push(&mut self, direction: Direction) {
        self.script.push_back(direction);
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl InputSource for ScriptedInput {
    fn next_direction(&mut self, game: &ClientGame) -> Option<Direction> {
        if !game.is_alive() {
            return None;
        }
        self.script.pop_front()
    }
}

/// Seeded autopilot that wanders around and steers clear of deadly cells
#[derive(Debug)]
pub struct Wanderer {
    rng: StdRng,
    heading: Direction,
    /// Chance per tick of turning even when the way ahead is free
    turn_chance: f64,
}

impl Wanderer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            // spawned snakes face up
            heading: Direction::Up,
            turn_chance: 0.1,
        }
    }

    pub fn with_turn_chance(mut self, turn_chance: f64) -> Self {
        self.turn_chance = turn_chance.clamp(0.0, 1.0);
        self
    }

    pub fn heading(&self) -> Direction {
        self.heading
    }
}

/// Cell one step from `(x, y)`, wrapping at the edges
pub fn neighbour(board: &Board, (x, y): (u8, u8), direction: Direction) -> (u8, u8) {
    let (dx, dy) = direction.delta();
    let nx = (x as i16 + dx).rem_euclid(board.width() as i16);
    let ny = (y as i16 + dy).rem_euclid(board.height() as i16);
    (nx as u8, ny as u8)
}

fn is_safe(board: &Board, cell: (u8, u8)) -> bool {
    board
        .get(cell.0, cell.1)
        .map(|tile| !tile.tile_type.is_deadly())
        .unwrap_or(false)
}

impl InputSource for Wanderer {
    fn next_direction(&mut self, game: &ClientGame) -> Option<Direction> {
        let (board, head) = match (game.board(), game.own_head()) {
            (Some(board), Some(head)) => (board, head),
            _ => return None,
        };

        let ahead_safe = is_safe(board, neighbour(board, head, self.heading));
        if ahead_safe && !self.rng.gen_bool(self.turn_chance) {
            return None;
        }

        let mut turns: Vec<Direction> = Direction::ALL
            .iter()
            .copied()
            .filter(|d| *d != self.heading && *d != self.heading.opposite())
            .filter(|d| is_safe(board, neighbour(board, head, *d)))
            .collect();
        turns.shuffle(&mut self.rng);

        let choice = turns.first().copied()?;
        self.heading = choice;
        Some(choice)
    }

    fn on_spawn(&mut self) {
        self.heading = Direction::Up;
    }
}
