//! Text rendering of the mirrored board

use crate::game::ClientGame;
use shared::{Tile, TileType};
use std::fmt::Write;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Render every n-th client tick
    pub every: u32,
    pub show_roster: bool,
    pub show_chat: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            every: 10,
            show_roster: true,
            show_chat: true,
        }
    }
}

pub struct Renderer {
    config: RenderConfig,
    frames: u32,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Renderer { config, frames: 0 }
    }

    /// Returns a frame when one is due this tick
    pub fn frame(&mut self, game: &ClientGame) -> Option<String> {
        let due = self.frames % self.config.every.max(1) == 0;
        self.frames = self.frames.wrapping_add(1);
        if !due {
            return None;
        }
        Some(self.render(game))
    }

    pub fn render(&self, game: &ClientGame) -> String {
        let mut out = String::new();
        self.draw_board(game, &mut out);
        if self.config.show_roster {
            self.draw_roster(game, &mut out);
        }
        if self.config.show_chat {
            for line in game.chat() {
                let _ = writeln!(out, "<{}> {}", game.display_name(line.player_id), line.message);
            }
        }
        out
    }

    fn draw_board(&self, game: &ClientGame, out: &mut String) {
        let Some(board) = game.board() else {
            out.push_str("(waiting for board)\n");
            return;
        };

        for y in 0..board.height() {
            for x in 0..board.width() {
                let tile = board.get(x, y).unwrap_or(Tile::EMPTY);
                out.push(tile_glyph(tile, game.own_id()));
            }
            out.push('\n');
        }
    }

    fn draw_roster(&self, game: &ClientGame, out: &mut String) {
        for (id, player) in game.players() {
            let marker = if Some(*id) == game.own_id() { '*' } else { ' ' };
            let status = match player.head {
                Some((x, y)) => format!("len {} at ({}, {})", player.length, x, y),
                None => "dead".to_string(),
            };
            let _ = writeln!(out, "{}{:>3} {:<16} {}", marker, id, player.name, status);
        }
    }
}

pub fn tile_glyph(tile: Tile, own_id: Option<u8>) -> char {
    let own = Some(tile.player_id) == own_id;
    match tile.tile_type {
        TileType::Empty => '.',
        TileType::Wall => '#',
        TileType::Food => '*',
        TileType::SnakeHead if own => '@',
        TileType::SnakeHead => 'O',
        TileType::SnakeBody if own => 's',
        TileType::SnakeBody => 'o',
    }
}
