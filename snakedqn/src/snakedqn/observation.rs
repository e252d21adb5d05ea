// observation.rs

use std::{fmt::Debug, marker::PhantomData};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use snakelearn::RLState;

use super::game_model::{
    snake::{Position, SnakeAction},
    Game,
};

#[derive(ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodingKind {
    /// 13 features in [0, 1]
    Extended,
    /// 4 features in [-1, 1]
    Compact,
}

impl Default for EncodingKind {
    fn default() -> Self {
        Self::Extended
    }
}

impl EncodingKind {
    pub fn size(self) -> usize {
        match self {
            EncodingKind::Extended => ExtendedEncoder::SIZE,
            EncodingKind::Compact => CompactEncoder::SIZE,
        }
    }
}

/// Turns a game into a fixed-length feature vector.
pub trait StateEncoder: Clone + Debug + Send + 'static {
    const SIZE: usize;
    const KIND: EncodingKind;

    fn encode(game: &Game) -> Vec<f32>;
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Danger next to the head, food direction, heading and danger two cells ahead. Directions are
/// in action order.
#[derive(Clone, Copy, Debug)]
pub struct ExtendedEncoder;

impl ExtendedEncoder {
    fn food_lies(head: Position, food: Position, direction: SnakeAction) -> bool {
        match direction {
            SnakeAction::Up => food.y < head.y,
            SnakeAction::Right => food.x > head.x,
            SnakeAction::Down => food.y > head.y,
            SnakeAction::Left => food.x < head.x,
        }
    }
}

impl StateEncoder for ExtendedEncoder {
    const SIZE: usize = 13;
    const KIND: EncodingKind = EncodingKind::Extended;

    fn encode(game: &Game) -> Vec<f32> {
        let head = game.snake().head();
        let heading = game.snake().heading();
        let food = game.food();

        let danger = SnakeAction::ALL
            .iter()
            .map(|&direction| flag(game.is_blocked(&head.moved(direction))));
        let food_direction = SnakeAction::ALL.iter().map(|&direction| {
            flag(food.map_or(false, |food| Self::food_lies(head, food, direction)))
        });
        let heading_one_hot = SnakeAction::ALL
            .iter()
            .map(|&direction| flag(direction == heading));
        let far_danger = flag(game.is_blocked(&head.moved(heading).moved(heading)));

        danger
            .chain(food_direction)
            .chain(heading_one_hot)
            .chain(std::iter::once(far_danger))
            .collect()
    }
}

/// Per direction: -1 when moving there dies or reverses, 1 when it gets closer to the food.
#[derive(Clone, Copy, Debug)]
pub struct CompactEncoder;

impl StateEncoder for CompactEncoder {
    const SIZE: usize = 4;
    const KIND: EncodingKind = EncodingKind::Compact;

    fn encode(game: &Game) -> Vec<f32> {
        let head = game.snake().head();
        let reverse = game.snake().heading().opposite();
        SnakeAction::ALL
            .iter()
            .map(|&direction| {
                let next = head.moved(direction);
                if direction == reverse || game.is_blocked(&next) {
                    -1.0
                } else if game
                    .food()
                    .is_some_and(|food| next.manhattan(&food) < head.manhattan(&food))
                {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct SnakeObservation<E: StateEncoder> {
    features: Vec<f32>,
    _encoder: PhantomData<E>,
}

impl<E: StateEncoder> SnakeObservation<E> {
    pub fn encode(game: &Game) -> Self {
        Self {
            features: E::encode(game),
            _encoder: PhantomData,
        }
    }
}

impl<E: StateEncoder> AsRef<[f32]> for SnakeObservation<E> {
    fn as_ref(&self) -> &[f32] {
        &self.features
    }
}

impl<E: StateEncoder> RLState for SnakeObservation<E> {
    const SIZE: usize = E::SIZE;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snakedqn::game_model::GameConfig;

    fn game() -> Game {
        let mut game = Game::new(GameConfig {
            seed: Some(21),
            ..Default::default()
        });
        game.place_food(Some(Position::new(5, 2)));
        game
    }

    fn assert_lengths(game: &Game) {
        assert_eq!(ExtendedEncoder::encode(game).len(), ExtendedEncoder::SIZE);
        assert_eq!(CompactEncoder::encode(game).len(), CompactEncoder::SIZE);
    }

    #[test]
    fn test_lengths_over_a_whole_game() {
        let mut game = game();
        assert_lengths(&game);
        game.change_direction(SnakeAction::Down);
        game.step();
        assert_lengths(&game);
        while game.is_alive() {
            assert_lengths(&game);
            game.step();
        }
        assert_lengths(&game);
    }

    #[test]
    fn test_extended_features_after_reset() {
        let features = ExtendedEncoder::encode(&game());
        // left of the head is the neck
        assert_eq!(&features[0..4], &[0.0, 0.0, 0.0, 1.0]);
        // food is straight above
        assert_eq!(&features[4..8], &[1.0, 0.0, 0.0, 0.0]);
        // heading right
        assert_eq!(&features[8..12], &[0.0, 1.0, 0.0, 0.0]);
        assert_eq!(features[12], 0.0);
        assert!(features.iter().all(|f| (0.0..=1.0).contains(f)));
    }

    #[test]
    fn test_extended_far_danger_near_wall() {
        let mut game = game();
        game.place_food(None);
        for _ in 0..3 {
            game.step();
        }
        // head at x = 8, two cells ahead is outside the board
        let features = ExtendedEncoder::encode(&game);
        assert_eq!(features[1], 0.0);
        assert_eq!(features[12], 1.0);
        assert_eq!(&features[4..8], &[0.0; 4]);
    }

    #[test]
    fn test_compact_features() {
        let features = CompactEncoder::encode(&game());
        assert_eq!(features, vec![1.0, 0.0, 0.0, -1.0]);
        assert!(features.iter().all(|f| (-1.0..=1.0).contains(f)));
    }

    #[test]
    fn test_kind_matches_encoder() {
        assert_eq!(ExtendedEncoder::KIND.size(), ExtendedEncoder::SIZE);
        assert_eq!(CompactEncoder::KIND.size(), CompactEncoder::SIZE);
    }

    #[test]
    fn test_observation_wraps_encoder() {
        let observation = SnakeObservation::<CompactEncoder>::encode(&game());
        assert_eq!(observation.as_ref().len(), SnakeObservation::<CompactEncoder>::SIZE);
    }
}
