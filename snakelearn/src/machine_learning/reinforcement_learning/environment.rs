use std::fmt::Debug;

use super::rl_error::{RLError, RLResult};

// envrionment.rs
pub type Reward = f32;

pub struct Replay<E: RLEnvironment> {
    pub prev_state: E::State,
    pub action: E::Action,
    pub reward: Reward,
    pub next_state: E::State,
    pub terminal: bool,
}

/// What the environment answers to a single action.
#[derive(Clone, Debug)]
pub struct StepReply<S> {
    pub observation: S,
    pub reward: Reward,
    pub done: bool,
}

pub trait RLAction: Clone + Debug + Copy + Into<u32> + Send {
    const SIZE: u32;

    fn from_index(index: u32) -> RLResult<Self>;

    fn check_index(index: u32) -> RLResult<u32> {
        if index < Self::SIZE {
            Ok(index)
        } else {
            Err(RLError::ActionOutOfRange {
                value: index,
                max: Self::SIZE - 1,
            })
        }
    }
}

pub trait RLState: Clone + Debug + AsRef<[f32]> + Send {
    const SIZE: usize;
}

/// A discrete-action Markov decision process that the DQN trainer can drive.
///
/// The trainer calls [`reset`](RLEnvironment::reset) to start an episode and
/// [`step`](RLEnvironment::step) until the reply reports `done` or the per-episode step budget
/// runs out. [`close`](RLEnvironment::close) is called once training is over and must be safe to
/// call more than once.
pub trait RLEnvironment: Send {
    type State: RLState;
    type Action: RLAction;

    fn reset(&mut self) -> Self::State;
    fn step(&mut self, action: Self::Action) -> StepReply<Self::State>;
    fn state(&self) -> Self::State;
    fn is_done(&self) -> bool;
    fn episode_reward(&self) -> Reward;
    fn close(&mut self);
}
