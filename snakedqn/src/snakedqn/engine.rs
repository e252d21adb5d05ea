// engine.rs

use std::io;

use ratatui::Frame;

use super::input::GameInput;

/// One screen of the application. `tick` returns `true` when the user wants to quit.
pub trait Engine {
    fn tick(&mut self, input: Option<GameInput>) -> io::Result<bool>;
    fn render_frame(&self, frame: &mut Frame);
}
