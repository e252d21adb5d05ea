use serde::{Deserialize, Serialize};

use crate::machine_learning::reinforcement_learning::rl_error::{RLError, RLResult};

/// Hyperparameters of a discrete Q-learning run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct QLearningConfig {
    /// Seed for exploration, replay sampling and network initialization.
    pub seed: u64,
    /// Total environment steps of the run.
    pub max_step: usize,
    /// Steps after which an episode is cut short (without a terminal flag).
    pub max_epoch_step: usize,
    /// Replay buffer capacity.
    pub exp_rep_max_size: usize,
    pub batch_size: usize,
    /// Every this many steps the target network is replaced by the online network.
    pub target_dqn_update_freq: usize,
    /// Steps of pure exploration before the first gradient update.
    pub update_start: usize,
    /// Multiplier applied to every environment reward before it is stored.
    pub reward_factor: f32,
    pub gamma: f32,
    /// Bound on the absolute TD error used as the regression target.
    pub error_clamp: f32,
    pub min_epsilon: f32,
    /// Steps over which epsilon decays from 1 to `min_epsilon`.
    pub epsilon_nb_step: usize,
    pub double_dqn: bool,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            seed: 123,
            max_step: 15_000,
            max_epoch_step: 200,
            exp_rep_max_size: 150_000,
            batch_size: 128,
            target_dqn_update_freq: 500,
            update_start: 10,
            reward_factor: 0.01,
            gamma: 0.99,
            error_clamp: 1.0,
            min_epsilon: 0.1,
            epsilon_nb_step: 1000,
            double_dqn: true,
        }
    }
}

impl QLearningConfig {
    pub fn validate(&self) -> RLResult<()> {
        let positive = [
            ("max_epoch_step", self.max_epoch_step),
            ("exp_rep_max_size", self.exp_rep_max_size),
            ("batch_size", self.batch_size),
            ("target_dqn_update_freq", self.target_dqn_update_freq),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(RLError::InvalidConfig(format!("{name} must be positive")));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(RLError::InvalidConfig(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(0.0..=1.0).contains(&self.min_epsilon) {
            return Err(RLError::InvalidConfig(format!(
                "min_epsilon must be in [0, 1], got {}",
                self.min_epsilon
            )));
        }
        if self.error_clamp <= 0.0 {
            return Err(RLError::InvalidConfig(format!(
                "error_clamp must be positive, got {}",
                self.error_clamp
            )));
        }
        Ok(())
    }

    pub fn epsilon_schedule(&self) -> EpsilonSchedule {
        EpsilonSchedule {
            min_epsilon: self.min_epsilon,
            decay_steps: self.epsilon_nb_step,
            start_step: self.update_start,
        }
    }
}

/// Linear decay from full exploration to `min_epsilon`, starting once learning starts.
#[derive(Clone, Copy, Debug)]
pub struct EpsilonSchedule {
    min_epsilon: f32,
    decay_steps: usize,
    start_step: usize,
}

impl EpsilonSchedule {
    pub fn epsilon(&self, step: usize) -> f32 {
        if step < self.start_step {
            return 1.0;
        }
        if self.decay_steps == 0 {
            return self.min_epsilon;
        }
        let progress = (step - self.start_step) as f32 / self.decay_steps as f32;
        (1.0 - (1.0 - self.min_epsilon) * progress).max(self.min_epsilon)
    }
}

pub struct LearningRateScheduler {
    lr: f32,
    step_size: f32,
    curr_step: usize,
    update_interval: usize,
    warmup: usize,
}

impl LearningRateScheduler {
    pub fn new(initial: f32, step_size: f32, update_interval: usize, warmup: usize) -> Self {
        Self {
            lr: initial,
            step_size,
            curr_step: 0,
            update_interval: update_interval.max(1),
            warmup,
        }
    }

    pub fn constant(lr: f32) -> Self {
        Self::new(lr, 1.0, usize::MAX, 0)
    }

    pub fn step(&mut self) -> f32 {
        self.curr_step += 1;
        if self.curr_step < self.warmup && self.warmup != 0 {
            self.lr * (self.curr_step as f32 / self.warmup as f32)
        } else if self.curr_step % self.update_interval == 0 {
            self.lr *= self.step_size;
            self.lr
        } else {
            self.lr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn test_default_config_is_valid() {
        assert!(QLearningConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = QLearningConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RLError::InvalidConfig(_))));
    }

    #[test]
    fn test_gamma_out_of_range_rejected() {
        let config = QLearningConfig {
            gamma: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_epsilon_schedule_endpoints() {
        let schedule = QLearningConfig::default().epsilon_schedule();
        assert_eq!(schedule.epsilon(0), 1.0);
        assert_eq!(schedule.epsilon(9), 1.0);
        assert_eq!(schedule.epsilon(10), 1.0);
        assert!(approx_eq!(f32, schedule.epsilon(510), 0.55, epsilon = 1e-5));
        assert!(approx_eq!(f32, schedule.epsilon(1010), 0.1, epsilon = 1e-5));
        assert!(approx_eq!(f32, schedule.epsilon(50_000), 0.1, epsilon = 1e-5));
    }

    #[test]
    fn test_constant_learning_rate() {
        let mut scheduler = LearningRateScheduler::constant(0.001);
        for _ in 0..1000 {
            assert_eq!(scheduler.step(), 0.001);
        }
    }

    #[test]
    fn test_learning_rate_warmup_then_decay() {
        let mut scheduler = LearningRateScheduler::new(1.0, 0.5, 10, 4);
        assert!(approx_eq!(f32, scheduler.step(), 0.25, epsilon = 1e-6));
        assert!(approx_eq!(f32, scheduler.step(), 0.5, epsilon = 1e-6));
        assert!(approx_eq!(f32, scheduler.step(), 0.75, epsilon = 1e-6));
        for _ in 4..10 {
            assert_eq!(scheduler.step(), 1.0);
        }
        assert!(approx_eq!(f32, scheduler.step(), 0.5, epsilon = 1e-6));
    }
}
