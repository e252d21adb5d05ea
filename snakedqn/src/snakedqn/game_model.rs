use rand::{rngs::StdRng, seq::IteratorRandom, SeedableRng};
use serde::{Deserialize, Serialize};

pub mod snake;

use snake::{Position, Snake, SnakeAction};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub width: usize,
    pub height: usize,
    pub initial_length: usize,
    /// Makes food placement reproducible.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: 10,
            height: 10,
            initial_length: 3,
            seed: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionType {
    Wall,
    SelfCollision,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameStatus {
    Running,
    Dead(CollisionType),
    /// The snake fills the whole board.
    Won,
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepEvents {
    pub ate_food: bool,
    pub status: GameStatus,
    /// Head to food distance before the tick.
    pub distance_before: Option<u32>,
    pub distance_after: Option<u32>,
}

/// Owned copy of everything needed to draw one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct GameSnapshot {
    pub width: usize,
    pub height: usize,
    /// Head first.
    pub body: Vec<Position>,
    pub food: Option<Position>,
    pub heading: SnakeAction,
    pub score: u32,
    pub status: GameStatus,
    pub steps: usize,
}

#[derive(Debug, Clone)]
pub struct Game {
    config: GameConfig,
    snake: Snake,
    next_heading: SnakeAction,
    food: Option<Position>,
    score: u32,
    status: GameStatus,
    steps: usize,
    rng: StdRng,
}

impl Game {
    pub fn new(config: GameConfig) -> Self {
        let config = GameConfig {
            width: config.width.max(1),
            height: config.height.max(1),
            ..config
        };
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let head = Self::start_position(&config);
        let mut game = Self {
            snake: Snake::new(head, 1, SnakeAction::Right),
            next_heading: SnakeAction::Right,
            food: None,
            score: 0,
            status: GameStatus::Running,
            steps: 0,
            rng,
            config,
        };
        game.reset();
        game
    }

    fn start_position(config: &GameConfig) -> Position {
        Position::new((config.width / 2) as i32, (config.height / 2) as i32)
    }

    pub fn reset(&mut self) {
        let head = Self::start_position(&self.config);
        // the body extends to the left of the head and has to fit on the board
        let length = self.config.initial_length.clamp(1, head.x as usize + 1);
        self.snake = Snake::new(head, length, SnakeAction::Right);
        self.next_heading = SnakeAction::Right;
        self.score = 0;
        self.status = GameStatus::Running;
        self.steps = 0;
        self.food = self.random_free_cell();
        // a starting snake may already cover the whole board
        if self.food.is_none() {
            self.status = GameStatus::Won;
        }
    }

    /// Reversing into the snake's own neck is ignored.
    pub fn change_direction(&mut self, direction: SnakeAction) {
        if direction != self.snake.heading().opposite() {
            self.next_heading = direction;
        }
    }

    pub fn step(&mut self) -> StepEvents {
        let distance_before = self.food_distance();
        if self.status != GameStatus::Running {
            return StepEvents {
                ate_food: false,
                status: self.status,
                distance_before,
                distance_after: distance_before,
            };
        }

        self.steps += 1;
        self.snake.set_heading(self.next_heading);
        let new_head = self.snake.head().moved(self.next_heading);
        let mut ate_food = false;
        if !self.in_bounds(&new_head) {
            self.status = GameStatus::Dead(CollisionType::Wall);
        } else if self.snake.contains(&new_head) {
            self.status = GameStatus::Dead(CollisionType::SelfCollision);
        } else {
            ate_food = self.food == Some(new_head);
            self.snake.advance(new_head, ate_food);
            if ate_food {
                self.score += 1;
                self.food = self.random_free_cell();
                if self.food.is_none() {
                    self.status = GameStatus::Won;
                }
            }
        }

        StepEvents {
            ate_food,
            status: self.status,
            distance_before,
            distance_after: self.food_distance(),
        }
    }

    fn random_free_cell(&mut self) -> Option<Position> {
        let (width, height) = self.bounds();
        let snake = &self.snake;
        (0..height as i32)
            .flat_map(|y| (0..width as i32).map(move |x| Position::new(x, y)))
            .filter(|cell| !snake.contains(cell))
            .choose(&mut self.rng)
    }

    fn food_distance(&self) -> Option<u32> {
        self.food.map(|food| self.snake.head().manhattan(&food))
    }

    pub fn in_bounds(&self, position: &Position) -> bool {
        let (width, height) = self.bounds();
        (0..width as i32).contains(&position.x) && (0..height as i32).contains(&position.y)
    }

    /// Outside the board or part of the snake.
    pub fn is_blocked(&self, position: &Position) -> bool {
        !self.in_bounds(position) || self.snake.contains(position)
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.config.width, self.config.height)
    }

    pub fn snake(&self) -> &Snake {
        &self.snake
    }

    pub fn food(&self) -> Option<Position> {
        self.food
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_alive(&self) -> bool {
        self.status == GameStatus::Running
    }

    pub fn is_over(&self) -> bool {
        !self.is_alive()
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            width: self.config.width,
            height: self.config.height,
            body: self.snake.cells().copied().collect(),
            food: self.food,
            heading: self.snake.heading(),
            score: self.score,
            status: self.status,
            steps: self.steps,
        }
    }

    #[cfg(test)]
    pub(crate) fn place_food(&mut self, food: Option<Position>) {
        self.food = food;
    }
}
