use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use snakelearn::{RLAction, RLResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(&self, other: &Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The neighbouring cell in `direction`. `y` grows downwards.
    pub fn moved(self, direction: SnakeAction) -> Position {
        let (dx, dy) = direction.delta();
        Position::new(self.x + dx, self.y + dy)
    }
}

/// Both the heading of the snake and the action the agent picks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnakeAction {
    Up,
    Right,
    Down,
    Left,
}

impl SnakeAction {
    /// In action index order.
    pub const ALL: [SnakeAction; 4] = [
        SnakeAction::Up,
        SnakeAction::Right,
        SnakeAction::Down,
        SnakeAction::Left,
    ];

    pub fn opposite(self) -> SnakeAction {
        match self {
            SnakeAction::Up => SnakeAction::Down,
            SnakeAction::Right => SnakeAction::Left,
            SnakeAction::Down => SnakeAction::Up,
            SnakeAction::Left => SnakeAction::Right,
        }
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            SnakeAction::Up => (0, -1),
            SnakeAction::Right => (1, 0),
            SnakeAction::Down => (0, 1),
            SnakeAction::Left => (-1, 0),
        }
    }
}

impl From<SnakeAction> for u32 {
    fn from(val: SnakeAction) -> Self {
        match val {
            SnakeAction::Up => 0,
            SnakeAction::Right => 1,
            SnakeAction::Down => 2,
            SnakeAction::Left => 3,
        }
    }
}

impl RLAction for SnakeAction {
    const SIZE: u32 = 4;

    fn from_index(index: u32) -> RLResult<Self> {
        let index = Self::check_index(index)?;
        Ok(Self::ALL[index as usize])
    }
}

#[derive(Clone, Debug)]
pub struct Snake {
    /// Head first.
    body: VecDeque<Position>,
    heading: SnakeAction,
}

impl Snake {
    /// A straight snake with its tail trailing behind `head`.
    pub fn new(head: Position, length: usize, heading: SnakeAction) -> Self {
        let behind = heading.opposite();
        let body = std::iter::successors(Some(head), |cell| Some(cell.moved(behind)))
            .take(length.max(1))
            .collect();
        Self { body, heading }
    }

    pub fn head(&self) -> Position {
        // body is never empty
        self.body[0]
    }

    pub fn heading(&self) -> SnakeAction {
        self.heading
    }

    pub fn set_heading(&mut self, heading: SnakeAction) {
        self.heading = heading;
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn cells(&self) -> impl Iterator<Item = &Position> {
        self.body.iter()
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.body.contains(position)
    }

    /// Moves the head to `new_head`. The tail stays in place when growing.
    pub fn advance(&mut self, new_head: Position, grow: bool) {
        self.body.push_front(new_head);
        if !grow {
            self.body.pop_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snakelearn::RLError;

    #[test]
    fn test_manhattan_distance() {
        let a = Position::new(1, 7);
        let b = Position::new(4, 3);
        assert_eq!(a.manhattan(&b), 7);
        assert_eq!(b.manhattan(&a), 7);
        assert_eq!(a.manhattan(&a), 0);
    }

    #[test]
    fn test_action_index_conversion() {
        for (i, action) in SnakeAction::ALL.iter().enumerate() {
            assert_eq!(u32::from(*action), i as u32);
            assert_eq!(SnakeAction::from_index(i as u32).unwrap(), *action);
        }
        assert!(matches!(
            SnakeAction::from_index(4),
            Err(RLError::ActionOutOfRange { value: 4, max: 3 })
        ));
    }

    #[test]
    fn test_new_snake_trails_behind_head() {
        let snake = Snake::new(Position::new(5, 5), 3, SnakeAction::Right);
        let cells: Vec<Position> = snake.cells().copied().collect();
        assert_eq!(
            cells,
            vec![Position::new(5, 5), Position::new(4, 5), Position::new(3, 5)]
        );
        assert_eq!(snake.head(), Position::new(5, 5));
    }

    #[test]
    fn test_advance_with_and_without_growth() {
        let mut snake = Snake::new(Position::new(2, 2), 2, SnakeAction::Down);
        snake.advance(Position::new(2, 3), false);
        assert_eq!(snake.len(), 2);
        assert!(!snake.contains(&Position::new(2, 1)));
        snake.advance(Position::new(2, 4), true);
        assert_eq!(snake.len(), 3);
        assert_eq!(snake.head(), Position::new(2, 4));
    }
}
