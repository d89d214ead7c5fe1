//! Game rules plugged into the tick simulation
//!
//! A [`GameMode`] decides what happens each tick and turns player intent
//! into [`EventKind`]s. It only ever reads the state through a
//! [`TickContext`] and only changes it by pushing events.

use crate::simulation::{EventKind, GameState, Position, TickContext};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use shared::{Direction, Tile, TileType};
use std::collections::HashSet;

const RANDOM_PLACEMENT_ATTEMPTS: usize = 64;

/// What happens to a snake leaving the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicy {
    #[default]
    Wrap,
    Kill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaRules {
    pub width: u8,
    pub height: u8,
    /// Snakes advance one cell every this many ticks
    pub move_interval: u32,
    pub food_interval: u32,
    pub wall_interval: u32,
    /// Ticks a dead player waits before respawning
    pub respawn_delay: u16,
    /// Chance that a dead snake's segment turns into food
    pub food_drop_chance: f64,
    pub edge: EdgePolicy,
}

impl Default for ArenaRules {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            move_interval: 2,
            food_interval: 100,
            wall_interval: 200,
            respawn_delay: 40,
            food_drop_chance: 0.5,
            edge: EdgePolicy::Wrap,
        }
    }
}

pub trait GameMode {
    /// Pushes the initial board
    fn start(&mut self, ctx: &mut TickContext);

    /// Called once per tick after buffered player actions were handled
    fn update(&mut self, ctx: &mut TickContext);

    fn receive_input(&mut self, ctx: &mut TickContext, player_id: u8, direction: Direction);

    /// Returns false when the player already has a snake or there is no room
    fn spawn_player(&mut self, ctx: &mut TickContext, player_id: u8) -> bool;

    fn remove_player(&mut self, ctx: &mut TickContext, player_id: u8);

    fn respawn_delay(&self) -> u16;

    fn board_size(&self) -> (u8, u8);
}

/// Free-for-all arena: periodic food and walls, snakes die on contact
pub struct ArenaMode {
    rules: ArenaRules,
    rng: StdRng,
}

impl ArenaMode {
    pub fn new(rules: ArenaRules, seed: u64) -> Self {
        Self {
            rules,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn rules(&self) -> &ArenaRules {
        &self.rules
    }

    /// Next cell in `direction`, or `None` when the edge kills
    fn step(&self, (x, y): Position, direction: Direction) -> Option<Position> {
        let (dx, dy) = direction.delta();
        let width = self.rules.width as i16;
        let height = self.rules.height as i16;
        let nx = x as i16 + dx;
        let ny = y as i16 + dy;
        match self.rules.edge {
            EdgePolicy::Wrap => Some((nx.rem_euclid(width) as u8, ny.rem_euclid(height) as u8)),
            EdgePolicy::Kill => {
                ((0..width).contains(&nx) && (0..height).contains(&ny))
                    .then_some((nx as u8, ny as u8))
            }
        }
    }

    /// Direction a snake will move this tick, including inputs pushed this step
    fn pending_direction(ctx: &TickContext, player_id: u8, current: Direction) -> Direction {
        ctx.pushed()
            .filter_map(|event| match event.kind {
                EventKind::SnakeInput {
                    player_id: id,
                    direction,
                } if id == player_id => Some(direction),
                _ => None,
            })
            .last()
            .unwrap_or(current)
    }

    /// Cells already written by events pushed during this step
    fn claimed_cells(ctx: &TickContext) -> HashSet<Position> {
        let mut claimed = HashSet::new();
        for event in ctx.pushed() {
            match event.kind {
                EventKind::BoardSet { x, y, .. } => {
                    claimed.insert((x, y));
                }
                EventKind::SnakeSpawn { head, tail, .. } => {
                    claimed.insert(head);
                    claimed.insert(tail);
                }
                _ => {}
            }
        }
        claimed
    }

    fn random_cell<F>(&mut self, state: &GameState, fits: F) -> Option<Position>
    where
        F: Fn(Position) -> bool,
    {
        let (width, height) = (state.board.width(), state.board.height());
        if width == 0 || height == 0 {
            return None;
        }
        for _ in 0..RANDOM_PLACEMENT_ATTEMPTS {
            let cell = (self.rng.gen_range(0..width), self.rng.gen_range(0..height));
            if fits(cell) {
                return Some(cell);
            }
        }

        let candidates: Vec<Position> = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .filter(|cell| fits(*cell))
            .collect();
        if candidates.is_empty() {
            None
        } else {
            Some(candidates[self.rng.gen_range(0..candidates.len())])
        }
    }

    fn place_item(&mut self, ctx: &mut TickContext, tile_type: TileType) {
        let claimed = Self::claimed_cells(ctx);
        let state = ctx.state();
        let cell = self.random_cell(state, |(x, y)| {
            state.board.is_empty_at(x, y) && !claimed.contains(&(x, y))
        });
        if let Some((x, y)) = cell {
            ctx.push(EventKind::BoardSet {
                x,
                y,
                tile: Tile::unowned(tile_type),
            });
        }
    }

    fn kill_snake(&mut self, ctx: &mut TickContext, player_id: u8) {
        let Some(snake) = ctx.state().snake(player_id) else {
            return;
        };
        let segments: Vec<Position> = snake.segments.iter().copied().collect();
        let chance = self.rules.food_drop_chance.clamp(0.0, 1.0);

        ctx.push(EventKind::SnakeKill { player_id });
        for (x, y) in segments {
            let tile_type = if self.rng.gen_bool(chance) {
                TileType::Food
            } else {
                TileType::Empty
            };
            ctx.push(EventKind::BoardSet {
                x,
                y,
                tile: Tile::unowned(tile_type),
            });
        }
        debug!("Snake {} died at tick {}", player_id, ctx.tick());
    }

    fn move_snakes(&mut self, ctx: &mut TickContext) {
        let mut claimed = Self::claimed_cells(ctx);
        let view: &TickContext = ctx;
        let snakes: Vec<(u8, Position, Option<Position>, Direction)> = view
            .state()
            .snakes
            .values()
            .map(|snake| {
                (
                    snake.player_id,
                    snake.head(),
                    snake.segments.back().copied(),
                    Self::pending_direction(view, snake.player_id, snake.direction),
                )
            })
            .collect();

        for (player_id, head, tail, direction) in snakes {
            let Some(next) = self.step(head, direction) else {
                self.kill_snake(ctx, player_id);
                continue;
            };
            let target = ctx.state().board.get(next.0, next.1).unwrap_or_default();
            if claimed.contains(&next) || target.tile_type.is_deadly() {
                self.kill_snake(ctx, player_id);
                continue;
            }

            let grew = target.tile_type == TileType::Food;
            ctx.push(EventKind::SnakeMove {
                player_id,
                head: next,
                direction,
                grew,
            });
            ctx.push(EventKind::BoardSet {
                x: next.0,
                y: next.1,
                tile: Tile::new(TileType::SnakeHead, player_id),
            });
            ctx.push(EventKind::BoardSet {
                x: head.0,
                y: head.1,
                tile: Tile::new(TileType::SnakeBody, player_id),
            });
            if let (false, Some((x, y))) = (grew, tail) {
                ctx.push(EventKind::BoardSet {
                    x,
                    y,
                    tile: Tile::EMPTY,
                });
            }
            claimed.insert(next);
        }
    }
}

impl GameMode for ArenaMode {
    fn start(&mut self, ctx: &mut TickContext) {
        info!(
            "Starting arena {}x{} ({:?} edges)",
            self.rules.width, self.rules.height, self.rules.edge
        );
        ctx.push(EventKind::BoardReset {
            width: self.rules.width,
            height: self.rules.height,
        });
    }

    fn update(&mut self, ctx: &mut TickContext) {
        let tick = ctx.tick();
        if tick % self.rules.move_interval.max(1) == 0 {
            self.move_snakes(ctx);
        }
        if self.rules.food_interval > 0 && tick % self.rules.food_interval == 0 {
            self.place_item(ctx, TileType::Food);
        }
        if self.rules.wall_interval > 0 && tick % self.rules.wall_interval == 0 {
            self.place_item(ctx, TileType::Wall);
        }
    }

    fn receive_input(&mut self, ctx: &mut TickContext, player_id: u8, direction: Direction) {
        let Some(snake) = ctx.state().snake(player_id) else {
            debug!("Input from player {} without a snake ignored", player_id);
            return;
        };
        if snake.len() > 1 && direction == snake.heading.opposite() {
            return;
        }
        if Self::pending_direction(ctx, player_id, snake.direction) == direction {
            return;
        }
        ctx.push(EventKind::SnakeInput {
            player_id,
            direction,
        });
    }

    fn spawn_player(&mut self, ctx: &mut TickContext, player_id: u8) -> bool {
        if ctx.state().snake(player_id).is_some() {
            return false;
        }
        let claimed = Self::claimed_cells(ctx);
        let state = ctx.state();
        let free = |x: u8, y: u8| state.board.is_empty_at(x, y) && !claimed.contains(&(x, y));
        let cell = self.random_cell(state, |(x, y)| {
            y.checked_add(1).map_or(false, |below| free(x, y) && free(x, below))
        });

        match cell {
            Some((x, y)) => {
                ctx.push(EventKind::SnakeSpawn {
                    player_id,
                    head: (x, y),
                    tail: (x, y + 1),
                    direction: Direction::Up,
                });
                true
            }
            None => {
                debug!("No room to spawn player {}", player_id);
                false
            }
        }
    }

    fn remove_player(&mut self, ctx: &mut TickContext, player_id: u8) {
        self.kill_snake(ctx, player_id);
    }

    fn respawn_delay(&self) -> u16 {
        self.rules.respawn_delay
    }

    fn board_size(&self) -> (u8, u8) {
        (self.rules.width, self.rules.height)
    }
}
