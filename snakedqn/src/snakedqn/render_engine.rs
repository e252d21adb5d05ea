use std::io::{self, stdout, Stdout};

use crossterm::{
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{prelude::*, widgets::*};

use super::game_model::{snake::Position, CollisionType, GameSnapshot, GameStatus};

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[derive(Debug)]
pub struct RenderEngine {
    terminal: Tui,
}

impl RenderEngine {
    pub fn init_render_engine() -> Result<RenderEngine, io::Error> {
        enable_raw_mode()?;
        stdout().execute(EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
        Ok(RenderEngine { terminal })
    }

    pub fn deinit_render_engine(self) -> io::Result<()> {
        disable_raw_mode()?;
        stdout().execute(LeaveAlternateScreen)?;
        Ok(())
    }

    pub fn render<F>(&mut self, render_fn: F) -> io::Result<CompletedFrame<'_>>
    where
        F: FnOnce(&mut Frame),
    {
        self.terminal.draw(|frame| render_fn(frame))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tile {
    Empty,
    Head,
    Body,
    Food,
}

impl Tile {
    // every tile is two characters wide so the board looks square
    const EMPTY: &'static str = "  ";
    const HEAD: &'static str = "██";
    const BODY: &'static str = "▓▓";
    const FOOD: &'static str = "()";

    fn span(self) -> Span<'static> {
        match self {
            Tile::Empty => Span::raw(Self::EMPTY),
            Tile::Head => Span::styled(Self::HEAD, Style::default().fg(Color::LightGreen)),
            Tile::Body => Span::styled(Self::BODY, Style::default().fg(Color::Green)),
            Tile::Food => Span::styled(
                Self::FOOD,
                Style::default()
                    .fg(Color::Rgb(255, 192, 203))
                    .add_modifier(Modifier::BOLD),
            ),
        }
    }
}

fn tiles(snapshot: &GameSnapshot) -> Vec<Vec<Tile>> {
    let mut rows = vec![vec![Tile::Empty; snapshot.width]; snapshot.height];
    let mut put = |position: &Position, tile: Tile| {
        if let (Ok(x), Ok(y)) = (usize::try_from(position.x), usize::try_from(position.y)) {
            if let Some(cell) = rows.get_mut(y).and_then(|row| row.get_mut(x)) {
                *cell = tile;
            }
        }
    };
    if let Some(food) = &snapshot.food {
        put(food, Tile::Food);
    }
    for (i, cell) in snapshot.body.iter().enumerate() {
        put(cell, if i == 0 { Tile::Head } else { Tile::Body });
    }
    rows
}

fn status_text(status: GameStatus) -> Option<&'static str> {
    match status {
        GameStatus::Running => None,
        GameStatus::Dead(CollisionType::Wall) => Some("Hit the wall"),
        GameStatus::Dead(CollisionType::SelfCollision) => Some("Bit its own tail"),
        GameStatus::Won => Some("Filled the board"),
    }
}

/// Rows for the cells, the borders and the status line.
fn board_height(height: usize) -> u16 {
    u16::try_from(height).unwrap_or(u16::MAX).saturating_add(4)
}

/// Every cell is two characters wide, plus the borders.
fn board_width(width: usize) -> u16 {
    u16::try_from(width)
        .unwrap_or(u16::MAX)
        .saturating_mul(2)
        .saturating_add(2)
}

impl WidgetRef for GameSnapshot {
    fn render_ref(&self, area: Rect, buf: &mut Buffer) {
        let mut text: Vec<Line> = tiles(self)
            .into_iter()
            .map(|row| Line::from(row.into_iter().map(Tile::span).collect::<Vec<_>>()))
            .collect();
        if let Some(status) = status_text(self.status) {
            text.push(Line::from(""));
            text.push(Line::from(status.red().bold()));
        }

        let block = Block::default()
            .border_style(Style::default().fg(Color::Blue))
            .borders(Borders::ALL)
            .title(Span::styled(
                format!("Score: {}", self.score),
                Style::default()
                    .add_modifier(Modifier::BOLD)
                    .fg(Color::Rgb(255, 192, 203)),
            ))
            .title_alignment(Alignment::Center);
        let [board] = Layout::vertical([Constraint::Length(board_height(self.height))])
            .flex(layout::Flex::Center)
            .areas(area);
        let [board] = Layout::horizontal([Constraint::Length(board_width(self.width))])
            .flex(layout::Flex::Center)
            .areas(board);
        Paragraph::new(text).block(block).render(board, buf);
    }
}

impl Widget for GameSnapshot {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.render_ref(area, buf)
    }
}
