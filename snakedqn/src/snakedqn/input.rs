use std::{io, time::Duration};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};

use super::game_model::snake::SnakeAction;

/// Poll timeout, which is also the frame cadence of the UI loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameInput {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Quit,
    Restart,
}

impl GameInput {
    pub fn direction(self) -> Option<SnakeAction> {
        match self {
            GameInput::MoveUp => Some(SnakeAction::Up),
            GameInput::MoveDown => Some(SnakeAction::Down),
            GameInput::MoveLeft => Some(SnakeAction::Left),
            GameInput::MoveRight => Some(SnakeAction::Right),
            GameInput::Quit | GameInput::Restart => None,
        }
    }
}

pub fn input_for_key(code: KeyCode) -> Option<GameInput> {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => Some(GameInput::Quit),
        KeyCode::Char('h') | KeyCode::Char('a') | KeyCode::Left => Some(GameInput::MoveLeft),
        KeyCode::Char('j') | KeyCode::Char('s') | KeyCode::Down => Some(GameInput::MoveDown),
        KeyCode::Char('k') | KeyCode::Char('w') | KeyCode::Up => Some(GameInput::MoveUp),
        KeyCode::Char('l') | KeyCode::Char('d') | KeyCode::Right => Some(GameInput::MoveRight),
        KeyCode::Char('n') => Some(GameInput::Restart),
        _ => None,
    }
}

pub fn handle_events() -> io::Result<Option<GameInput>> {
    if event::poll(POLL_INTERVAL)? {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                return Ok(input_for_key(key.code));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        assert_eq!(input_for_key(KeyCode::Esc), Some(GameInput::Quit));
        assert_eq!(input_for_key(KeyCode::Char('w')), Some(GameInput::MoveUp));
        assert_eq!(input_for_key(KeyCode::Char('j')), Some(GameInput::MoveDown));
        assert_eq!(input_for_key(KeyCode::Left), Some(GameInput::MoveLeft));
        assert_eq!(input_for_key(KeyCode::Char('d')), Some(GameInput::MoveRight));
        assert_eq!(input_for_key(KeyCode::Char('n')), Some(GameInput::Restart));
        assert_eq!(input_for_key(KeyCode::Char('x')), None);
    }

    #[test]
    fn test_direction_mapping() {
        assert_eq!(GameInput::MoveUp.direction(), Some(SnakeAction::Up));
        assert_eq!(GameInput::MoveLeft.direction(), Some(SnakeAction::Left));
        assert_eq!(GameInput::Quit.direction(), None);
    }
}
