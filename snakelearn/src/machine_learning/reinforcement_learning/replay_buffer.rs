use super::{
    environment::{RLEnvironment, Replay},
    rl_error::{RLError, RLResult},
};
use rand::{seq::IteratorRandom, Rng};
use std::collections::VecDeque;

pub struct ReplayBuffer<E: RLEnvironment> {
    memory: VecDeque<Replay<E>>,
    max_size: usize,
}

impl<E: RLEnvironment> ReplayBuffer<E> {
    pub fn new(max_size: usize) -> Self {
        Self {
            memory: VecDeque::with_capacity(max_size.min(4096)),
            max_size,
        }
    }

    pub fn add(&mut self, replay: Replay<E>) {
        if self.memory.len() >= self.max_size {
            self.memory.pop_front();
        }
        self.memory.push_back(replay);
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Uniform sample without replacement. Returns fewer than `amount` replays when the buffer
    /// holds fewer.
    pub fn get<R: Rng>(&self, amount: usize, rng: &mut R) -> RLResult<Vec<&Replay<E>>> {
        if self.memory.is_empty() {
            return Err(RLError::EmptyReplayBuffer { requested: amount });
        }
        Ok(self.memory.iter().choose_multiple(rng, amount))
    }
}
