use rand::Rng;
use std::collections::VecDeque;

// ============================================================================
// Configuration
// ============================================================================

pub const GRID_WIDTH: usize = 10;
pub const GRID_HEIGHT: usize = 20;

/// Lookahead depth of the next-piece queue. The buffer is refilled to this
/// length before and after every dequeue, so it never runs dry.
pub const QUEUE_LOOKAHEAD: usize = 4;

/// The sweep never tests the topmost row, matching the reference behavior.
/// Rows with index below this margin are exempt from clearing.
pub const SWEEP_TOP_EXEMPT_ROWS: usize = 1;

// Timing (in milliseconds)
const BASE_DROP_MS: u64 = 1000;
const MIN_DROP_MS: u64 = 100;
const SPEED_STEP_MS: u64 = 100;
pub const LINES_PER_LEVEL: u32 = 10;

// Scoring
pub const SCORE_SINGLE: u32 = 100;
pub const SCORE_DOUBLE: u32 = 300;
pub const SCORE_TRIPLE: u32 = 500;
pub const SCORE_TETRIS: u32 = 800;

// ============================================================================
// Types
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Position {
    pub x: i16,
    pub y: i16,
}

/// Square boolean occupancy mask. Each active piece owns a copy and rotates
/// it in place; the canonical masks from `PieceKind::mask` are never shared.
pub type ShapeMask = Vec<Vec<bool>>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    pub fn mask(&self) -> ShapeMask {
        let rows: &[&[u8]] = match self {
            PieceKind::I => &[&[0, 1, 0, 0], &[0, 1, 0, 0], &[0, 1, 0, 0], &[0, 1, 0, 0]],
            PieceKind::O => &[&[1, 1], &[1, 1]],
            PieceKind::T => &[&[0, 1, 0], &[1, 1, 1], &[0, 0, 0]],
            PieceKind::S => &[&[0, 1, 1], &[1, 1, 0], &[0, 0, 0]],
            PieceKind::Z => &[&[1, 1, 0], &[0, 1, 1], &[0, 0, 0]],
            PieceKind::J => &[&[0, 1, 0], &[0, 1, 0], &[1, 1, 0]],
            PieceKind::L => &[&[0, 1, 0], &[0, 1, 0], &[0, 1, 1]],
        };
        rows.iter()
            .map(|row| row.iter().map(|&cell| cell != 0).collect())
            .collect()
    }

    fn random() -> Self {
        let mut rng = rand::thread_rng();
        match rng.gen_range(0..7) {
            0 => PieceKind::I,
            1 => PieceKind::O,
            2 => PieceKind::T,
            3 => PieceKind::S,
            4 => PieceKind::Z,
            5 => PieceKind::J,
            _ => PieceKind::L,
        }
    }
}

/// Rotates a square mask 90 degrees in place: transpose, then reverse each
/// row (clockwise) or reverse the row order (counter-clockwise).
pub fn rotate_mask(mask: &mut ShapeMask, clockwise: bool) {
    let n = mask.len();
    for y in 0..n {
        for x in 0..y {
            let tmp = mask[y][x];
            mask[y][x] = mask[x][y];
            mask[x][y] = tmp;
        }
    }
    if clockwise {
        for row in mask.iter_mut() {
            row.reverse();
        }
    } else {
        mask.reverse();
    }
}

#[derive(Clone, Debug)]
pub struct ActivePiece {
    pub kind: PieceKind,
    pub shape: ShapeMask,
    pub position: Position,
}

impl ActivePiece {
    /// Creates the piece at the centered spawn position for its kind.
    pub fn spawn(kind: PieceKind) -> Self {
        let shape = kind.mask();
        let x = (GRID_WIDTH as i16 / 2) - (shape.len() as i16 / 2);
        Self {
            kind,
            shape,
            position: Position { x, y: 0 },
        }
    }

    pub fn spawn_at(kind: PieceKind, x: i16, y: i16) -> Self {
        Self {
            kind,
            shape: kind.mask(),
            position: Position { x, y },
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CellState {
    Empty,
    Filled(PieceKind),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GameState {
    NotStarted,
    Running,
    Paused,
    GameOver,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum GameEvent {
    PieceMoved,
    PieceRotated,
    PieceLocked,
    PieceHeld,
    LinesCleared(u32),
    LevelUp(u32),
    Paused,
    Unpaused,
    GameStarted,
    GameOver,
}

// ============================================================================
// Board
// ============================================================================

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Board {
    pub cells: Vec<Vec<CellState>>,
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: vec![vec![CellState::Empty; GRID_WIDTH]; GRID_HEIGHT],
        }
    }

    /// True if any occupied cell of `shape` at `pos` leaves the horizontal
    /// bounds, passes the bottom, or lands on a filled cell. Cells above the
    /// top row are not collisions: a piece may hang partially off the top.
    pub fn collides(&self, shape: &ShapeMask, pos: Position) -> bool {
        for (dy, row) in shape.iter().enumerate() {
            for (dx, &occupied) in row.iter().enumerate() {
                if !occupied {
                    continue;
                }
                let x = pos.x + dx as i16;
                let y = pos.y + dy as i16;
                if x < 0 || x >= GRID_WIDTH as i16 {
                    return true;
                }
                if y >= GRID_HEIGHT as i16 {
                    return true;
                }
                if y < 0 {
                    continue;
                }
                if self.cells[y as usize][x as usize] != CellState::Empty {
                    return true;
                }
            }
        }
        false
    }

    /// Writes `kind` into every cell covered by `shape`. Unconditional: the
    /// caller must have verified the placement with `collides` first.
    pub fn merge(&mut self, shape: &ShapeMask, pos: Position, kind: PieceKind) {
        debug_assert!(!self.collides(shape, pos), "merge on colliding placement");
        for (dy, row) in shape.iter().enumerate() {
            for (dx, &occupied) in row.iter().enumerate() {
                if !occupied {
                    continue;
                }
                let x = pos.x + dx as i16;
                let y = pos.y + dy as i16;
                if y >= 0 && y < GRID_HEIGHT as i16 && x >= 0 && x < GRID_WIDTH as i16 {
                    self.cells[y as usize][x as usize] = CellState::Filled(kind);
                }
            }
        }
    }

    /// Removes every full row from the bottom up, inserting an empty row at
    /// the top for each, and returns the number of rows cleared. The topmost
    /// rows (`SWEEP_TOP_EXEMPT_ROWS`) are never tested.
    pub fn sweep_full_rows(&mut self) -> u32 {
        let mut cleared = 0;
        let mut y = GRID_HEIGHT - 1;
        while y >= SWEEP_TOP_EXEMPT_ROWS {
            if self.is_row_full(y) {
                self.cells.remove(y);
                self.cells.insert(0, vec![CellState::Empty; GRID_WIDTH]);
                cleared += 1;
                // The rows above shifted into y; retest the same index.
            } else {
                y -= 1;
            }
        }
        cleared
    }

    pub fn is_row_full(&self, y: usize) -> bool {
        self.cells[y].iter().all(|cell| *cell != CellState::Empty)
    }

    pub fn filled_count_in_row(&self, y: usize) -> usize {
        self.cells[y]
            .iter()
            .filter(|cell| **cell != CellState::Empty)
            .count()
    }

    pub fn total_filled_cells(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|cell| **cell != CellState::Empty)
            .count()
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Piece Provider Trait
// ============================================================================

pub trait PieceProvider {
    fn next_piece(&mut self) -> PieceKind;
}

struct RandomPieceProvider;

impl PieceProvider for RandomPieceProvider {
    fn next_piece(&mut self) -> PieceKind {
        PieceKind::random()
    }
}

pub struct SequencePieceProvider {
    pieces: Vec<PieceKind>,
    index: usize,
}

impl SequencePieceProvider {
    pub fn new(pieces: Vec<PieceKind>) -> Self {
        Self { pieces, index: 0 }
    }
}

impl PieceProvider for SequencePieceProvider {
    fn next_piece(&mut self) -> PieceKind {
        let piece = self.pieces[self.index % self.pieces.len()];
        self.index += 1;
        piece
    }
}

// ============================================================================
// Piece Queue
// ============================================================================

pub struct PieceQueue {
    buffer: VecDeque<PieceKind>,
    provider: Box<dyn PieceProvider>,
}

impl PieceQueue {
    pub fn new(provider: Box<dyn PieceProvider>) -> Self {
        Self {
            buffer: VecDeque::new(),
            provider,
        }
    }

    /// Removes and returns the front of the buffer. The buffer is topped up
    /// to the lookahead depth both before and after the pop, so the preview
    /// always shows `QUEUE_LOOKAHEAD` kinds.
    pub fn dequeue_next(&mut self) -> PieceKind {
        self.refill();
        let kind = self
            .buffer
            .pop_front()
            .unwrap_or_else(|| self.provider.next_piece());
        self.refill();
        kind
    }

    fn refill(&mut self) {
        while self.buffer.len() < QUEUE_LOOKAHEAD {
            self.buffer.push_back(self.provider.next_piece());
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.refill();
    }

    pub fn preview(&self) -> impl Iterator<Item = PieceKind> + '_ {
        self.buffer.iter().copied()
    }
}

// ============================================================================
// Game
// ============================================================================

pub struct Game {
    pub board: Board,
    pub active: Option<ActivePiece>,
    pub hold_slot: Option<PieceKind>,
    pub can_hold: bool,
    pub score: u32,
    pub lines_cleared: u32,
    pub level: u32,
    pub state: GameState,
    queue: PieceQueue,
    events: Vec<GameEvent>,
}

impl Game {
    pub fn new() -> Self {
        Self::with_provider(Box::new(RandomPieceProvider))
    }

    pub fn with_provider(provider: Box<dyn PieceProvider>) -> Self {
        Self {
            board: Board::new(),
            active: None,
            hold_slot: None,
            can_hold: true,
            score: 0,
            lines_cleared: 0,
            level: 1,
            state: GameState::NotStarted,
            queue: PieceQueue::new(provider),
            events: Vec::new(),
        }
    }

    /// Builds a running game around a prepared board and active piece, for
    /// tests that need exact placements.
    pub fn with_board(board: Board, piece: ActivePiece) -> Self {
        let mut game = Self::new();
        game.board = board;
        game.active = Some(piece);
        game.state = GameState::Running;
        game.queue.reset();
        game
    }

    /// Starts a fresh game; from `GameOver` this is the explicit restart.
    /// All session state is reset and the first piece spawns immediately.
    pub fn start(&mut self) {
        self.board = Board::new();
        self.score = 0;
        self.lines_cleared = 0;
        self.level = 1;
        self.hold_slot = None;
        self.can_hold = true;
        self.queue.reset();
        self.events.clear();
        self.state = GameState::Running;
        self.spawn_from_queue();
        self.events.push(GameEvent::GameStarted);
    }

    // ------------------------------------------------------------------
    // Commands (silent no-ops unless Running)
    // ------------------------------------------------------------------

    /// Shifts the active piece horizontally, reverting on collision. There
    /// is no vertical analog; descent goes through the drop commands.
    pub fn move_piece(&mut self, dx: i16) -> bool {
        if self.state != GameState::Running {
            return false;
        }
        let Some(piece) = self.active.as_mut() else {
            return false;
        };
        piece.position.x += dx;
        if self.board.collides(&piece.shape, piece.position) {
            piece.position.x -= dx;
            false
        } else {
            self.events.push(GameEvent::PieceMoved);
            true
        }
    }

    /// Rotates the active piece's mask in place, then searches for a free
    /// horizontal offset (+1, -2, +3, -4, ...). If the offset magnitude
    /// exceeds the shape width the rotation is fully reverted.
    pub fn rotate_piece(&mut self, clockwise: bool) -> bool {
        if self.state != GameState::Running {
            return false;
        }
        let Some(piece) = self.active.as_mut() else {
            return false;
        };
        let original_x = piece.position.x;
        rotate_mask(&mut piece.shape, clockwise);
        let mut offset: i16 = 1;
        while self.board.collides(&piece.shape, piece.position) {
            piece.position.x += offset;
            offset = -(offset + offset.signum());
            if offset.abs() > piece.shape.len() as i16 {
                rotate_mask(&mut piece.shape, !clockwise);
                piece.position.x = original_x;
                return false;
            }
        }
        self.events.push(GameEvent::PieceRotated);
        true
    }

    /// Drops the active piece one row. On contact the piece locks at its
    /// prior position, full rows are swept, and the next piece spawns.
    pub fn soft_drop(&mut self) {
        if self.state != GameState::Running {
            return;
        }
        let landed = {
            let Some(piece) = self.active.as_mut() else {
                return;
            };
            piece.position.y += 1;
            if self.board.collides(&piece.shape, piece.position) {
                piece.position.y -= 1;
                true
            } else {
                false
            }
        };
        if landed {
            self.lock_and_spawn();
        }
    }

    /// Drops the active piece until contact, then locks, sweeps, and spawns
    /// in one call. Never leaves an unmerged piece mid-fall.
    pub fn hard_drop(&mut self) {
        if self.state != GameState::Running {
            return;
        }
        {
            let Some(piece) = self.active.as_mut() else {
                return;
            };
            loop {
                piece.position.y += 1;
                if self.board.collides(&piece.shape, piece.position) {
                    piece.position.y -= 1;
                    break;
                }
            }
        }
        self.lock_and_spawn();
    }

    /// Stores or swaps the active piece's kind with the hold slot. Allowed
    /// once per piece lifetime: `can_hold` resets on spawn, clears on use.
    pub fn hold(&mut self) {
        if self.state != GameState::Running || !self.can_hold {
            return;
        }
        let Some(current) = self.active.as_ref().map(|piece| piece.kind) else {
            return;
        };
        match self.hold_slot.take() {
            Some(stored) => {
                // Swap path: the queue is not consumed. The respawn position
                // is still validated, so a swap into a blocked spawn ends
                // the game the same way a queue-driven spawn would.
                self.hold_slot = Some(current);
                let piece = ActivePiece::spawn(stored);
                if self.board.collides(&piece.shape, piece.position) {
                    self.state = GameState::GameOver;
                    self.events.push(GameEvent::GameOver);
                }
                self.active = Some(piece);
            }
            None => {
                self.hold_slot = Some(current);
                self.spawn_from_queue();
            }
        }
        self.can_hold = false;
        self.events.push(GameEvent::PieceHeld);
    }

    pub fn toggle_pause(&mut self) {
        match self.state {
            GameState::Running => {
                self.state = GameState::Paused;
                self.events.push(GameEvent::Paused);
            }
            GameState::Paused => {
                self.state = GameState::Running;
                self.events.push(GameEvent::Unpaused);
            }
            GameState::NotStarted | GameState::GameOver => {
                // Pause toggling is only valid mid-game.
            }
        }
    }

    // ------------------------------------------------------------------
    // Lock / spawn protocol
    // ------------------------------------------------------------------

    fn lock_and_spawn(&mut self) {
        let Some(piece) = self.active.take() else {
            return;
        };
        self.board.merge(&piece.shape, piece.position, piece.kind);
        self.events.push(GameEvent::PieceLocked);
        let cleared = self.board.sweep_full_rows();
        if cleared > 0 {
            self.events.push(GameEvent::LinesCleared(cleared));
            self.add_score(cleared);
        }
        self.spawn_from_queue();
    }

    fn spawn_from_queue(&mut self) {
        let kind = self.queue.dequeue_next();
        let piece = ActivePiece::spawn(kind);
        self.can_hold = true;
        if self.board.collides(&piece.shape, piece.position) {
            self.state = GameState::GameOver;
            self.events.push(GameEvent::GameOver);
        }
        self.active = Some(piece);
    }

    pub fn add_score(&mut self, lines: u32) {
        let base_score = match lines {
            1 => SCORE_SINGLE,
            2 => SCORE_DOUBLE,
            3 => SCORE_TRIPLE,
            4 => SCORE_TETRIS,
            _ => 0,
        };
        self.score += base_score * self.level;
        self.lines_cleared += lines;

        let new_level = (self.lines_cleared / LINES_PER_LEVEL) + 1;
        if new_level > self.level {
            self.level = new_level;
            self.events.push(GameEvent::LevelUp(self.level));
        }
    }

    // ------------------------------------------------------------------
    // Read-only snapshots
    // ------------------------------------------------------------------

    /// Milliseconds between gravity drops at the current level, floored at
    /// the minimum interval.
    pub fn drop_interval_ms(&self) -> u64 {
        let speed_reduction = (self.level - 1) as u64 * SPEED_STEP_MS;
        BASE_DROP_MS.saturating_sub(speed_reduction).max(MIN_DROP_MS)
    }

    /// Returns the visual grid state with the active piece overlaid.
    pub fn render_grid(&self) -> Vec<Vec<CellState>> {
        let mut visual_grid = self.board.cells.clone();
        if let Some(piece) = &self.active {
            for (dy, row) in piece.shape.iter().enumerate() {
                for (dx, &occupied) in row.iter().enumerate() {
                    if !occupied {
                        continue;
                    }
                    let x = piece.position.x + dx as i16;
                    let y = piece.position.y + dy as i16;
                    if y >= 0 && y < GRID_HEIGHT as i16 && x >= 0 && x < GRID_WIDTH as i16 {
                        visual_grid[y as usize][x as usize] = CellState::Filled(piece.kind);
                    }
                }
            }
        }
        visual_grid
    }

    /// Where the active piece would land if hard-dropped right now.
    pub fn ghost_position(&self) -> Option<Position> {
        let piece = self.active.as_ref()?;
        let mut pos = piece.position;
        while !self.board.collides(
            &piece.shape,
            Position {
                x: pos.x,
                y: pos.y + 1,
            },
        ) {
            pos.y += 1;
        }
        Some(pos)
    }

    pub fn preview(&self) -> Vec<PieceKind> {
        self.queue.preview().collect()
    }

    pub fn is_game_over(&self) -> bool {
        self.state == GameState::GameOver
    }

    /// Takes and clears all pending events.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

pub mod test_helpers {
    use super::*;

    pub fn empty_board() -> Board {
        Board::new()
    }

    pub fn fill_row(board: &mut Board, y: usize) {
        for x in 0..GRID_WIDTH {
            board.cells[y][x] = CellState::Filled(PieceKind::T);
        }
    }

    pub fn fill_row_with_gap(board: &mut Board, y: usize, gap_x: usize) {
        for x in 0..GRID_WIDTH {
            if x != gap_x {
                board.cells[y][x] = CellState::Filled(PieceKind::T);
            }
        }
    }
}
