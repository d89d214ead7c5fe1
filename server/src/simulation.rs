//! Event-sourced tick simulation
//!
//! The simulation owns the authoritative [`GameState`]. Game logic never
//! mutates the state directly; it pushes [`TickEvent`]s through a
//! [`TickContext`], and the simulation applies them in push order once the
//! step finishes. A trailing window of events is kept so lagging sessions can
//! be caught up with deltas; older events are folded into a baseline state
//! and dropped.

use log::{debug, warn};
use shared::{Board, Direction, Tile, TileType};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

/// Ticks of event history kept for delta catch-up
pub const DEFAULT_PAST_SIZE: u32 = 100;

pub type Position = (u8, u8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snake {
    pub player_id: u8,
    /// Head first
    pub segments: VecDeque<Position>,
    /// Direction the player asked for
    pub direction: Direction,
    /// Direction of the last completed move
    pub heading: Direction,
}

impl Snake {
    pub fn head(&self) -> Position {
        self.segments.front().copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub tick: u32,
    pub board: Board,
    pub snakes: BTreeMap<u8, Snake>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            tick: 0,
            board: Board::new(0, 0),
            snakes: BTreeMap::new(),
        }
    }
}

impl GameState {
    pub fn snake(&self, player_id: u8) -> Option<&Snake> {
        self.snakes.get(&player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Replaces the board and removes every snake
    BoardReset { width: u8, height: u8 },
    BoardSet { x: u8, y: u8, tile: Tile },
    /// Places a two segment snake; also paints its cells
    SnakeSpawn {
        player_id: u8,
        head: Position,
        tail: Position,
        direction: Direction,
    },
    SnakeInput { player_id: u8, direction: Direction },
    /// Moves the head; board cells are updated by accompanying `BoardSet`s
    SnakeMove {
        player_id: u8,
        head: Position,
        direction: Direction,
        grew: bool,
    },
    /// Removes the snake; its cells are cleared by accompanying `BoardSet`s
    SnakeKill { player_id: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickEvent {
    pub tick: u32,
    pub kind: EventKind,
}

impl TickEvent {
    pub fn apply(&self, state: &mut GameState) {
        match &self.kind {
            EventKind::BoardReset { width, height } => {
                state.board = Board::new(*width, *height);
                state.snakes.clear();
            }
            EventKind::BoardSet { x, y, tile } => {
                if !state.board.set(*x, *y, *tile) {
                    warn!("BoardSet outside the board at ({}, {})", x, y);
                }
            }
            EventKind::SnakeSpawn {
                player_id,
                head,
                tail,
                direction,
            } => {
                state
                    .board
                    .set(head.0, head.1, Tile::new(TileType::SnakeHead, *player_id));
                state
                    .board
                    .set(tail.0, tail.1, Tile::new(TileType::SnakeBody, *player_id));
                state.snakes.insert(
                    *player_id,
                    Snake {
                        player_id: *player_id,
                        segments: VecDeque::from([*head, *tail]),
                        direction: *direction,
                        heading: *direction,
                    },
                );
            }
            EventKind::SnakeInput {
                player_id,
                direction,
            } => {
                if let Some(snake) = state.snakes.get_mut(player_id) {
                    snake.direction = *direction;
                }
            }
            EventKind::SnakeMove {
                player_id,
                head,
                direction,
                grew,
            } => {
                if let Some(snake) = state.snakes.get_mut(player_id) {
                    snake.segments.push_front(*head);
                    if !grew {
                        snake.segments.pop_back();
                    }
                    snake.heading = *direction;
                }
            }
            EventKind::SnakeKill { player_id } => {
                state.snakes.remove(player_id);
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimulationError {
    #[error("simulation has not been started")]
    NotStarted,
    #[error("simulation is already running")]
    AlreadyStarted,
}

/// Requested history has already been pruned
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("events after tick {requested} are gone, history starts at tick {oldest_retained}")]
pub struct HistoryGap {
    pub requested: u32,
    pub oldest_retained: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Running,
}

/// Handle given to game logic for the duration of one step
pub struct TickContext<'a> {
    tick: u32,
    state: &'a GameState,
    events: &'a mut VecDeque<TickEvent>,
    first_new: usize,
}

impl<'a> TickContext<'a> {
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// State as of the previous tick; events pushed in this step are not applied yet
    pub fn state(&self) -> &GameState {
        self.state
    }

    pub fn push(&mut self, kind: EventKind) {
        self.events.push_back(TickEvent {
            tick: self.tick,
            kind,
        });
    }

    pub fn pushed(&self) -> impl Iterator<Item = &TickEvent> {
        self.events.range(self.first_new..)
    }
}

pub struct Simulation {
    phase: Phase,
    current_tick: u32,
    past_size: u32,
    state: GameState,
    baseline: GameState,
    events: VecDeque<TickEvent>,
    oldest_retained: u32,
}

impl Simulation {
    pub fn new(past_size: u32) -> Self {
        Self {
            phase: Phase::Uninitialized,
            current_tick: 0,
            past_size,
            state: GameState::default(),
            baseline: GameState::default(),
            events: VecDeque::new(),
            oldest_retained: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn past_size(&self) -> u32 {
        self.past_size
    }

    /// Oldest tick whose events are all still retained
    pub fn oldest_retained(&self) -> u32 {
        self.oldest_retained
    }

    pub fn retained_events(&self) -> usize {
        self.events.len()
    }

    /// Runs the tick 0 step (which is expected to push a `BoardReset`) and applies it
    pub fn start<F>(&mut self, step: F) -> Result<(), SimulationError>
    where
        F: FnOnce(&mut TickContext),
    {
        if self.phase == Phase::Running {
            return Err(SimulationError::AlreadyStarted);
        }
        self.phase = Phase::Running;
        self.run_step(step);
        Ok(())
    }

    /// Advances one tick
    pub fn simulate<F>(&mut self, step: F) -> Result<(), SimulationError>
    where
        F: FnOnce(&mut TickContext),
    {
        if self.phase != Phase::Running {
            return Err(SimulationError::NotStarted);
        }
        self.current_tick += 1;
        self.run_step(step);
        self.prune();
        Ok(())
    }

    fn run_step<F>(&mut self, step: F)
    where
        F: FnOnce(&mut TickContext),
    {
        let first_new = self.events.len();
        let mut ctx = TickContext {
            tick: self.current_tick,
            state: &self.state,
            events: &mut self.events,
            first_new,
        };
        step(&mut ctx);

        for event in self.events.range(first_new..) {
            event.apply(&mut self.state);
        }
        self.state.tick = self.current_tick;
    }

    fn prune(&mut self) {
        let cutoff = self.current_tick.saturating_sub(self.past_size);
        if cutoff <= self.oldest_retained {
            return;
        }

        let mut pruned = 0;
        while self.events.front().map_or(false, |e| e.tick < cutoff) {
            if let Some(event) = self.events.pop_front() {
                event.apply(&mut self.baseline);
                self.baseline.tick = event.tick;
                pruned += 1;
            }
        }
        self.oldest_retained = cutoff;
        if pruned > 0 {
            debug!(
                "Pruned {} events, history now starts at tick {}",
                pruned, cutoff
            );
        }
    }

    /// Retained events newer than `last_tick`, in push order
    pub fn events_since(
        &self,
        last_tick: u32,
    ) -> Result<impl Iterator<Item = &TickEvent>, HistoryGap> {
        if last_tick.saturating_add(1) < self.oldest_retained {
            return Err(HistoryGap {
                requested: last_tick,
                oldest_retained: self.oldest_retained,
            });
        }
        Ok(self.events.iter().filter(move |e| e.tick > last_tick))
    }

    /// Rebuilds the current state from the baseline and the retained events
    pub fn replay(&self) -> GameState {
        let mut state = self.baseline.clone();
        for event in &self.events {
            event.apply(&mut state);
        }
        state.tick = self.current_tick;
        state
    }
}
