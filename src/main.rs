use crossterm::{
    event::{
        self, Event, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
        PushKeyboardEnhancementFlags,
    },
    terminal::{
        disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame, Terminal,
};
use std::{
    io::{self, stdout},
    time::{Duration, Instant},
};

use cattris::game::{CellState, Game, GameState, PieceKind, GRID_HEIGHT, GRID_WIDTH};
use cattris::input::{map_key, AutoRepeat, Command};

// ============================================================================
// Visual Constants
// ============================================================================

const CELL_WIDTH: u16 = 2;
const BLOCK_CHAR: &str = "██";
const GHOST_CHAR: &str = "░░";
const EMPTY_CHAR: &str = "  ";
const PREVIEW_SHOWN: usize = 3;

const FRAME_POLL_MS: u64 = 16;

// ============================================================================
// Color Mapping
// ============================================================================

fn piece_color(kind: PieceKind) -> Color {
    match kind {
        PieceKind::I => Color::Cyan,
        PieceKind::O => Color::Yellow,
        PieceKind::T => Color::Magenta,
        PieceKind::S => Color::Green,
        PieceKind::Z => Color::Red,
        PieceKind::J => Color::Blue,
        PieceKind::L => Color::Rgb(240, 160, 0),
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn render(frame: &mut Frame, game: &Game) {
    let area = frame.size();

    match game.state {
        GameState::NotStarted => render_start_screen(frame, area),
        GameState::Running => render_game(frame, game, area),
        GameState::Paused => render_paused(frame, game, area),
        GameState::GameOver => render_game_over(frame, game, area),
    }
}

fn render_game(frame: &mut Frame, game: &Game, area: Rect) {
    let grid_display_width = (GRID_WIDTH as u16 * CELL_WIDTH) + 2;
    let grid_display_height = GRID_HEIGHT as u16 + 2;
    let side_width = 12;
    let info_width = 14;
    let total_width = grid_display_width + side_width + info_width + 4;
    let total_height = grid_display_height + 3;

    let main_area = centered_rect(total_width, total_height, area);

    let vertical = Layout::vertical([
        Constraint::Length(grid_display_height),
        Constraint::Fill(1),
    ])
    .split(main_area);

    let game_row = vertical[0];

    // Layout: [Grid][Hold+Next][Info]
    let horizontal = Layout::horizontal([
        Constraint::Length(grid_display_width),
        Constraint::Length(side_width),
        Constraint::Length(info_width),
    ])
    .split(game_row);

    render_grid(frame, game, horizontal[0]);

    let side = Layout::vertical([Constraint::Length(6), Constraint::Fill(1)]).split(horizontal[1]);
    render_hold(frame, game, side[0]);
    render_preview(frame, game, side[1]);

    render_info(frame, game, horizontal[2]);

    let controls_area = Rect {
        x: area.x,
        y: game_row.y + game_row.height,
        width: area.width,
        height: 2,
    };

    if controls_area.y + 1 < area.height {
        let controls = Paragraph::new(vec![Line::from(
            "←→: Move | ↑: Rotate | ↓: Soft Drop | Space: Hard Drop | C: Hold | P: Pause | Q: Quit",
        )])
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(controls, controls_area);
    }
}

fn render_grid(frame: &mut Frame, game: &Game, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Cattris ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let visual_grid = game.render_grid();

    // Ghost cells: the active piece's footprint at its landing position.
    let mut ghost_cells: Vec<(i16, i16)> = Vec::new();
    if let (Some(piece), Some(ghost_pos)) = (&game.active, game.ghost_position()) {
        for (dy, row) in piece.shape.iter().enumerate() {
            for (dx, &occupied) in row.iter().enumerate() {
                if occupied {
                    ghost_cells.push((ghost_pos.x + dx as i16, ghost_pos.y + dy as i16));
                }
            }
        }
    }
    let ghost_color = game.active.as_ref().map(|p| piece_color(p.kind));

    let mut lines: Vec<Line> = Vec::new();

    for y in 0..GRID_HEIGHT {
        let mut spans: Vec<Span> = Vec::new();

        for x in 0..GRID_WIDTH {
            let (symbol, style) = match visual_grid[y][x] {
                CellState::Filled(kind) => (BLOCK_CHAR, Style::default().fg(piece_color(kind))),
                CellState::Empty => {
                    if ghost_cells.contains(&(x as i16, y as i16)) {
                        (
                            GHOST_CHAR,
                            Style::default().fg(ghost_color.unwrap_or(Color::DarkGray)),
                        )
                    } else {
                        (EMPTY_CHAR, Style::default())
                    }
                }
            };

            spans.push(Span::styled(symbol, style));
        }

        lines.push(Line::from(spans));
    }

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

/// Renders a piece kind's mask as block rows, skipping empty mask rows.
fn mask_lines(kind: PieceKind) -> Vec<Line<'static>> {
    let mask = kind.mask();
    let color = piece_color(kind);
    let mut lines = Vec::new();

    for row in &mask {
        if row.iter().all(|&occupied| !occupied) {
            continue;
        }
        let mut spans: Vec<Span> = vec![Span::raw(" ")];
        for &occupied in row {
            if occupied {
                spans.push(Span::styled(BLOCK_CHAR, Style::default().fg(color)));
            } else {
                spans.push(Span::raw(EMPTY_CHAR));
            }
        }
        lines.push(Line::from(spans));
    }

    lines
}

fn render_hold(frame: &mut Frame, game: &Game, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Hold ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines: Vec<Line> = vec![Line::from("")];
    if let Some(kind) = game.hold_slot {
        lines.extend(mask_lines(kind));
    }

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

fn render_preview(frame: &mut Frame, game: &Game, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Next ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines: Vec<Line> = Vec::new();

    for (i, kind) in game.preview().into_iter().take(PREVIEW_SHOWN).enumerate() {
        if i > 0 {
            lines.push(Line::from(""));
        }
        lines.extend(mask_lines(kind));
    }

    let paragraph = Paragraph::new(lines);
    frame.render_widget(paragraph, inner);
}

fn render_info(frame: &mut Frame, game: &Game, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Info ")
        .title_alignment(Alignment::Center);

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled("Score", Style::default().fg(Color::Yellow))),
        Line::from(format!("{}", game.score)),
        Line::from(""),
        Line::from(Span::styled("Lines", Style::default().fg(Color::Cyan))),
        Line::from(format!("{}", game.lines_cleared)),
        Line::from(""),
        Line::from(Span::styled("Level", Style::default().fg(Color::Green))),
        Line::from(format!("{}", game.level)),
    ];

    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(paragraph, inner);
}

fn render_start_screen(frame: &mut Frame, area: Rect) {
    let text = vec![
        Line::from(""),
        Line::from(Span::styled("CATTRIS", Style::default().fg(Color::Cyan))),
        Line::from(""),
        Line::from(Span::styled(
            "Press Enter to start",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            "Press ESC to quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Welcome ")
            .title_alignment(Alignment::Center),
    );

    let popup_area = centered_rect(28, 10, area);
    frame.render_widget(paragraph, popup_area);
}

fn render_game_over(frame: &mut Frame, game: &Game, area: Rect) {
    // First render the game in background
    render_game(frame, game, area);

    let text = vec![
        Line::from(""),
        Line::from(Span::styled("GAME OVER", Style::default().fg(Color::Red))),
        Line::from(""),
        Line::from(format!("Score: {}", game.score)),
        Line::from(format!("Lines: {}", game.lines_cleared)),
        Line::from(format!("Level: {}", game.level)),
        Line::from(""),
        Line::from(Span::styled(
            "Enter: restart | ESC: quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Game Over ")
            .title_alignment(Alignment::Center)
            .style(Style::default().bg(Color::Black)),
    );

    let popup_area = centered_rect(30, 12, area);
    frame.render_widget(paragraph, popup_area);
}

fn render_paused(frame: &mut Frame, game: &Game, area: Rect) {
    render_game(frame, game, area);

    let text = vec![
        Line::from(""),
        Line::from(Span::styled("PAUSED", Style::default().fg(Color::Yellow))),
        Line::from(""),
        Line::from(Span::styled(
            "Press P to continue",
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            "Press ESC to quit",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Paused ")
            .title_alignment(Alignment::Center)
            .style(Style::default().bg(Color::Black)),
    );

    let popup_area = centered_rect(24, 10, area);
    frame.render_widget(paragraph, popup_area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let horizontal = Layout::horizontal([
        Constraint::Fill(1),
        Constraint::Length(width.min(area.width)),
        Constraint::Fill(1),
    ])
    .split(area);

    let vertical = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height.min(area.height)),
        Constraint::Fill(1),
    ])
    .split(horizontal[1]);

    vertical[1]
}

// ============================================================================
// Main Loop
// ============================================================================

fn main() -> io::Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    // Key release events drive auto-repeat shutoff where the terminal
    // supports them; without them the terminal's own key repeat applies.
    let enhanced_keys = supports_keyboard_enhancement().unwrap_or(false);
    if enhanced_keys {
        stdout().execute(PushKeyboardEnhancementFlags(
            KeyboardEnhancementFlags::REPORT_EVENT_TYPES,
        ))?;
    }
    let backend = CrosstermBackend::new(stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut game = Game::new();

    // Gravity accumulator: excess beyond one interval is discarded, so the
    // drop rate never exceeds one row per frame no matter how far behind
    // the clock falls.
    let mut drop_accumulator = Duration::ZERO;
    let mut last_frame = Instant::now();

    // Press-and-hold auto-repeat, independent of the gravity cadence. Only
    // armed when release events are available to stop it.
    let mut auto_repeat = AutoRepeat::new(enhanced_keys);

    loop {
        terminal.draw(|frame| render(frame, &game))?;

        if event::poll(Duration::from_millis(FRAME_POLL_MS))? {
            if let Event::Key(key) = event::read()? {
                match key.kind {
                    KeyEventKind::Press | KeyEventKind::Repeat => {
                        let now = Instant::now();
                        match map_key(key.code) {
                            Some(Command::Quit) => break,
                            Some(Command::TogglePause) => {
                                game.toggle_pause();
                                if game.state == GameState::Running {
                                    // Don't credit paused time as drop progress.
                                    last_frame = Instant::now();
                                }
                            }
                            Some(Command::Start) => {
                                if game.state == GameState::NotStarted || game.is_game_over() {
                                    game.start();
                                    drop_accumulator = Duration::ZERO;
                                    last_frame = Instant::now();
                                }
                            }
                            Some(Command::MoveLeft) => {
                                game.move_piece(-1);
                                auto_repeat.press_move(-1, now);
                            }
                            Some(Command::MoveRight) => {
                                game.move_piece(1);
                                auto_repeat.press_move(1, now);
                            }
                            Some(Command::SoftDrop) => {
                                game.soft_drop();
                                drop_accumulator = Duration::ZERO;
                                auto_repeat.press_soft_drop(now);
                            }
                            Some(Command::HardDrop) => {
                                game.hard_drop();
                                drop_accumulator = Duration::ZERO;
                            }
                            Some(Command::RotateCw) => {
                                game.rotate_piece(true);
                            }
                            Some(Command::Hold) => {
                                game.hold();
                            }
                            None => {}
                        }
                    }
                    KeyEventKind::Release => match map_key(key.code) {
                        Some(Command::MoveLeft) => auto_repeat.release_move(-1),
                        Some(Command::MoveRight) => auto_repeat.release_move(1),
                        Some(Command::SoftDrop) => auto_repeat.release_soft_drop(),
                        _ => {}
                    },
                }
            }
        }

        let now = Instant::now();
        let delta = now - last_frame;
        last_frame = now;

        if game.state == GameState::Running {
            // Auto-repeat fires only while running.
            if let Some(dx) = auto_repeat.poll_move(now) {
                game.move_piece(dx);
            }
            if auto_repeat.poll_soft_drop(now) {
                game.soft_drop();
                drop_accumulator = Duration::ZERO;
            }

            drop_accumulator += delta;
            if drop_accumulator > Duration::from_millis(game.drop_interval_ms()) {
                game.soft_drop();
                drop_accumulator = Duration::ZERO;
            }
        } else {
            auto_repeat.stop_all();
        }

        // The frontend is the journal's consumer; draining it every frame
        // keeps it bounded over a long session.
        game.take_events();
    }

    // Restore terminal
    if enhanced_keys {
        stdout().execute(PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
