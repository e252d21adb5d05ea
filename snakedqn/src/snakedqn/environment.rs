use std::{
    marker::PhantomData,
    sync::{Arc, Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use snakelearn::{RLEnvironment, Reward, StepReply};
use tracing::info;

use super::{
    game_model::{snake::SnakeAction, Game, GameConfig, GameSnapshot, GameStatus, StepEvents},
    observation::{SnakeObservation, StateEncoder},
};

/// Latest frame published by the simulation thread, taken by the renderer.
pub type SnapshotSlot = Arc<Mutex<Option<GameSnapshot>>>;

pub fn new_snapshot_slot() -> SnapshotSlot {
    Arc::new(Mutex::new(None))
}

pub fn take_snapshot(slot: &SnapshotSlot) -> Option<GameSnapshot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

fn store_snapshot(slot: &SnapshotSlot, snapshot: GameSnapshot) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RewardConfig {
    pub food_reward: Reward,
    pub death_penalty: Reward,
    /// Given for moving closer to the food, taken for moving away.
    pub shaping_reward: Reward,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            food_reward: 100.0,
            death_penalty: -100.0,
            shaping_reward: 1.0,
        }
    }
}

impl RewardConfig {
    pub fn reward(&self, events: &StepEvents) -> Reward {
        if events.ate_food {
            self.food_reward
        } else if matches!(events.status, GameStatus::Dead(_)) {
            self.death_penalty
        } else {
            match (events.distance_before, events.distance_after) {
                (Some(before), Some(after)) if after < before => self.shaping_reward,
                _ => -self.shaping_reward,
            }
        }
    }
}

/// Snake as a Markov decision process. Owns the only live game of a run.
pub struct SnakeEnvironment<E: StateEncoder> {
    game: Game,
    rewards: RewardConfig,
    episode_reward: Reward,
    snapshot_slot: Option<SnapshotSlot>,
    closed: bool,
    _encoder: PhantomData<E>,
}

impl<E: StateEncoder> SnakeEnvironment<E> {
    pub fn new(config: GameConfig, rewards: RewardConfig) -> Self {
        Self {
            game: Game::new(config),
            rewards,
            episode_reward: 0.0,
            snapshot_slot: None,
            closed: false,
            _encoder: PhantomData,
        }
    }

    /// Publishes a snapshot to `slot` after every reset and step.
    pub fn with_snapshot_slot(mut self, slot: SnapshotSlot) -> Self {
        self.snapshot_slot = Some(slot);
        self.publish();
        self
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn score(&self) -> u32 {
        self.game.score()
    }

    fn publish(&self) {
        if let Some(slot) = &self.snapshot_slot {
            store_snapshot(slot, self.game.snapshot());
        }
    }
}

impl<E: StateEncoder> RLEnvironment for SnakeEnvironment<E> {
    type State = SnakeObservation<E>;
    type Action = SnakeAction;

    fn reset(&mut self) -> Self::State {
        self.game.reset();
        self.episode_reward = 0.0;
        self.publish();
        self.state()
    }

    fn step(&mut self, action: Self::Action) -> StepReply<Self::State> {
        let reward = if self.game.is_alive() {
            self.game.change_direction(action);
            let events = self.game.step();
            self.rewards.reward(&events)
        } else {
            0.0
        };
        self.episode_reward += reward;
        self.publish();
        StepReply {
            observation: self.state(),
            reward,
            done: self.game.is_over(),
        }
    }

    fn state(&self) -> Self::State {
        SnakeObservation::encode(&self.game)
    }

    fn is_done(&self) -> bool {
        self.game.is_over()
    }

    fn episode_reward(&self) -> Reward {
        self.episode_reward
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.snapshot_slot = None;
            info!(score = self.game.score(), "snake environment closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snakedqn::{
        game_model::snake::Position,
        observation::{CompactEncoder, ExtendedEncoder},
    };

    fn environment() -> SnakeEnvironment<ExtendedEncoder> {
        SnakeEnvironment::new(
            GameConfig {
                seed: Some(31),
                ..Default::default()
            },
            RewardConfig::default(),
        )
    }

    #[test]
    fn test_food_reward() {
        let mut env = environment();
        env.reset();
        env.game.place_food(Some(Position::new(6, 5)));
        let reply = env.step(SnakeAction::Right);
        assert_eq!(reply.reward, 100.0);
        assert!(!reply.done);
        assert_eq!(env.score(), 1);
        assert_eq!(env.game().snake().len(), 4);
    }

    #[test]
    fn test_death_penalty_and_done() {
        let mut env = environment();
        env.reset();
        env.game.place_food(None);
        let mut reply = env.step(SnakeAction::Right);
        while !reply.done {
            assert_eq!(reply.reward, -1.0);
            reply = env.step(SnakeAction::Right);
        }
        assert_eq!(reply.reward, -100.0);
        assert!(!env.game().is_alive());
        assert!(env.is_done());
        assert_eq!(reply.observation.as_ref().len(), ExtendedEncoder::SIZE);
        assert_eq!(env.step(SnakeAction::Up).reward, 0.0);
    }

    #[test]
    fn test_full_board_episode_is_done() {
        let mut env = SnakeEnvironment::<CompactEncoder>::new(
            GameConfig {
                width: 2,
                height: 1,
                initial_length: 2,
                seed: Some(1),
            },
            RewardConfig::default(),
        );
        env.reset();
        assert!(env.is_done());
        let reply = env.step(SnakeAction::Right);
        assert!(reply.done);
        assert_eq!(reply.reward, 0.0);
        assert_eq!(env.game().status(), GameStatus::Won);
    }

    #[test]
    fn test_shaping_reward_sign() {
        let mut env = environment();
        env.reset();
        env.game.place_food(Some(Position::new(5, 0)));
        assert_eq!(env.step(SnakeAction::Up).reward, 1.0);
        assert_eq!(env.step(SnakeAction::Right).reward, -1.0);
        assert!((env.episode_reward() - 0.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_rewards_bounded_under_random_play() {
        let mut env = SnakeEnvironment::<CompactEncoder>::new(
            GameConfig {
                seed: Some(32),
                ..Default::default()
            },
            RewardConfig::default(),
        );
        env.reset();
        for i in 0..500u32 {
            let score = env.score();
            let reply = env.step(SnakeAction::ALL[(i % 7 % 4) as usize]);
            if env.score() > score {
                assert!(reply.reward > 0.0);
            } else if reply.done {
                assert!(reply.reward < 0.0);
            } else {
                assert!(reply.reward.abs() <= 1.0);
            }
            if reply.done {
                env.reset();
            }
        }
    }

    #[test]
    fn test_snapshots_published_until_closed() {
        let slot = new_snapshot_slot();
        let mut env = environment().with_snapshot_slot(Arc::clone(&slot));
        assert!(take_snapshot(&slot).is_some());
        env.step(SnakeAction::Up);
        let snapshot = take_snapshot(&slot).unwrap();
        assert_eq!(snapshot.steps, 1);
        assert!(take_snapshot(&slot).is_none());

        env.close();
        env.close();
        env.step(SnakeAction::Up);
        assert!(take_snapshot(&slot).is_none());
    }
}
