use crossterm::event::KeyCode;
use std::time::{Duration, Instant};

// ============================================================================
// Auto-repeat timing (in milliseconds)
// ============================================================================

pub const MOVE_REPEAT_MS: u64 = 80;
pub const SOFT_DROP_REPEAT_MS: u64 = 50;

// ============================================================================
// Engine Commands
// ============================================================================

/// The engine's full mutation surface. Input devices translate raw events
/// into these; the engine itself never sees a key code or a timer.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Command {
    MoveLeft,
    MoveRight,
    SoftDrop,
    HardDrop,
    RotateCw,
    Hold,
    TogglePause,
    Start,
    Quit,
}

pub fn map_key(code: KeyCode) -> Option<Command> {
    match code {
        KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => Some(Command::MoveLeft),
        KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => Some(Command::MoveRight),
        KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => Some(Command::SoftDrop),
        KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => Some(Command::RotateCw),
        KeyCode::Char(' ') => Some(Command::HardDrop),
        KeyCode::Char('c') | KeyCode::Char('C') => Some(Command::Hold),
        KeyCode::Char('p') | KeyCode::Char('P') => Some(Command::TogglePause),
        KeyCode::Enter | KeyCode::Char('r') | KeyCode::Char('R') => Some(Command::Start),
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => Some(Command::Quit),
        _ => None,
    }
}

// ============================================================================
// Repeat Timer
// ============================================================================

/// Fixed-interval repeat trigger for press-and-hold input. The owner starts
/// it on press, polls it every frame, and stops it on release (or whenever
/// the game leaves the running phase). The first firing comes one interval
/// after `start`; the initial press itself is dispatched by the caller.
pub struct RepeatTimer {
    interval: Duration,
    next_fire: Option<Instant>,
}

impl RepeatTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_fire: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn start(&mut self, now: Instant) {
        self.next_fire = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next_fire = None;
    }

    pub fn is_active(&self) -> bool {
        self.next_fire.is_some()
    }

    /// Returns true if the timer is due, rescheduling it one interval out.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_fire {
            Some(deadline) if now >= deadline => {
                self.next_fire = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// Auto-repeat
// ============================================================================

/// Press-and-hold state for the movement and soft-drop keys. The timers are
/// armed only when the terminal reports key releases: without a release
/// event to stop it, a single tap would repeat until the game left the
/// running phase. On terminals without release reporting, the terminal's
/// own key repeat delivers further press events instead.
pub struct AutoRepeat {
    release_supported: bool,
    move_timer: RepeatTimer,
    soft_drop_timer: RepeatTimer,
    held_move: Option<i16>,
}

impl AutoRepeat {
    pub fn new(release_supported: bool) -> Self {
        Self {
            release_supported,
            move_timer: RepeatTimer::from_millis(MOVE_REPEAT_MS),
            soft_drop_timer: RepeatTimer::from_millis(SOFT_DROP_REPEAT_MS),
            held_move: None,
        }
    }

    pub fn press_move(&mut self, dx: i16, now: Instant) {
        if self.release_supported {
            self.held_move = Some(dx);
            self.move_timer.start(now);
        }
    }

    pub fn press_soft_drop(&mut self, now: Instant) {
        if self.release_supported {
            self.soft_drop_timer.start(now);
        }
    }

    pub fn release_move(&mut self, dx: i16) {
        if self.held_move == Some(dx) {
            self.held_move = None;
            self.move_timer.stop();
        }
    }

    pub fn release_soft_drop(&mut self) {
        self.soft_drop_timer.stop();
    }

    /// Direction due for an auto-repeated move this frame, if any.
    pub fn poll_move(&mut self, now: Instant) -> Option<i16> {
        let dx = self.held_move?;
        self.move_timer.poll(now).then_some(dx)
    }

    pub fn poll_soft_drop(&mut self, now: Instant) -> bool {
        self.soft_drop_timer.poll(now)
    }

    /// Disarms everything; called whenever the game leaves `Running`.
    pub fn stop_all(&mut self) {
        self.move_timer.stop();
        self.soft_drop_timer.stop();
        self.held_move = None;
    }
}
