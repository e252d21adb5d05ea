// game_engine.rs

use ratatui::Frame;
use std::{
    io,
    time::{Duration, Instant},
};
use tracing::info;

use super::{
    engine::Engine,
    game_model::{Game, GameConfig},
    input::GameInput,
};

pub const GAME_TICK: Duration = Duration::from_millis(150);

/// Keyboard controlled snake.
pub struct GameEngine {
    game: Game,
    tick_rate: Duration,
    last_tick: Instant,
    highscore: u32,
}

impl GameEngine {
    pub fn new(config: GameConfig) -> GameEngine {
        GameEngine {
            game: Game::new(config),
            tick_rate: GAME_TICK,
            last_tick: Instant::now(),
            highscore: 0,
        }
    }

    fn restart(&mut self) {
        info!(score = self.game.score(), highscore = self.highscore, "restarting game");
        self.game.reset();
        self.last_tick = Instant::now();
    }

    /// Advances the game once per tick; a finished game waits for a restart.
    fn advance(&mut self, now: Instant) {
        if now.duration_since(self.last_tick) < self.tick_rate || self.game.is_over() {
            return;
        }
        self.last_tick = now;
        let events = self.game.step();
        if events.ate_food {
            self.highscore = self.highscore.max(self.game.score());
        }
        if self.game.is_over() {
            info!(score = self.game.score(), status = ?events.status, "game over");
        }
    }
}

impl Engine for GameEngine {
    fn tick(&mut self, user_input: Option<GameInput>) -> io::Result<bool> {
        match user_input {
            Some(GameInput::Quit) => return Ok(true),
            Some(GameInput::Restart) => self.restart(),
            Some(input) => {
                if let Some(direction) = input.direction() {
                    self.game.change_direction(direction);
                }
            }
            None => {}
        }
        self.advance(Instant::now());
        Ok(false)
    }

    fn render_frame(&self, frame: &mut Frame) {
        frame.render_widget(self.game.snapshot(), frame.size());
    }
}
