//! Tile grid shared by the server simulation and the client mirror

use crate::codec::{CodecError, ReadMessage, WriteMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TileType {
    #[default]
    Empty = 0,
    Wall = 1,
    Food = 2,
    SnakeBody = 3,
    SnakeHead = 4,
}

impl TileType {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(TileType::Empty),
            1 => Ok(TileType::Wall),
            2 => Ok(TileType::Food),
            3 => Ok(TileType::SnakeBody),
            4 => Ok(TileType::SnakeHead),
            value => Err(CodecError::InvalidValue {
                what: "tile type",
                value,
            }),
        }
    }

    /// Whether a snake head entering this tile dies
    pub fn is_deadly(self) -> bool {
        matches!(
            self,
            TileType::Wall | TileType::SnakeBody | TileType::SnakeHead
        )
    }
}

/// One board cell: what occupies it and which player owns it (0 = nobody)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tile {
    pub tile_type: TileType,
    pub player_id: u8,
}

impl Tile {
    pub const EMPTY: Tile = Tile {
        tile_type: TileType::Empty,
        player_id: 0,
    };

    pub fn new(tile_type: TileType, player_id: u8) -> Self {
        Self {
            tile_type,
            player_id,
        }
    }

    pub fn unowned(tile_type: TileType) -> Self {
        Self::new(tile_type, 0)
    }

    pub fn write(&self, writer: &mut WriteMessage) {
        writer.write_u8(self.tile_type as u8);
        writer.write_u8(self.player_id);
    }

    pub fn read(reader: &mut ReadMessage) -> Result<Self, CodecError> {
        let tile_type = TileType::from_u8(reader.read_u8()?)?;
        let player_id = reader.read_u8()?;
        Ok(Self {
            tile_type,
            player_id,
        })
    }
}

/// Fixed-size grid addressed by `(x, y)`, stored row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    width: u8,
    height: u8,
    tiles: Vec<Tile>,
}

impl Board {
    pub fn new(width: u8, height: u8) -> Self {
        Self {
            width,
            height,
            tiles: vec![Tile::EMPTY; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    fn index(&self, x: u8, y: u8) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| y as usize * self.width as usize + x as usize)
    }

    pub fn get(&self, x: u8, y: u8) -> Option<Tile> {
        self.index(x, y).map(|i| self.tiles[i])
    }

    /// Returns false (and changes nothing) when `(x, y)` is off the board
    pub fn set(&mut self, x: u8, y: u8, tile: Tile) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.tiles[i] = tile;
                true
            }
            None => false,
        }
    }

    pub fn is_empty_at(&self, x: u8, y: u8) -> bool {
        self.get(x, y)
            .map_or(false, |tile| tile.tile_type == TileType::Empty)
    }

    /// Every non-empty cell in row-major order
    pub fn non_empty_cells(&self) -> impl Iterator<Item = (u8, u8, Tile)> + '_ {
        let width = self.width as usize;
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, tile)| tile.tile_type != TileType::Empty)
            .map(move |(i, tile)| ((i % width) as u8, (i / width) as u8, *tile))
    }

    pub fn count(&self, tile_type: TileType) -> usize {
        self.tiles
            .iter()
            .filter(|tile| tile.tile_type == tile_type)
            .count()
    }
}
