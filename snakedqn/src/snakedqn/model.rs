use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use snakelearn::{
    machine_learning::argmax, DenseNetworkConfig, DenseQNetwork, QLearningConfig, RLAction,
    RLError, RLResult,
};

use super::{
    environment::RewardConfig,
    game_model::{snake::SnakeAction, GameConfig},
    observation::EncodingKind,
};

/// Written next to every saved network so it can be rebuilt and played back.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelDescriptor {
    pub encoding: EncodingKind,
    pub observation_size: usize,
    pub action_size: usize,
    pub board: GameConfig,
    pub rewards: RewardConfig,
    pub network: DenseNetworkConfig,
    pub training: QLearningConfig,
    pub steps_trained: usize,
    pub cancelled: bool,
}

impl ModelDescriptor {
    pub fn sidecar_path(model_path: &Path) -> PathBuf {
        model_path.with_extension("json")
    }

    pub fn save(&self, model_path: &Path) -> RLResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(Self::sidecar_path(model_path), json)?;
        Ok(())
    }

    pub fn load(model_path: &Path) -> RLResult<Self> {
        let json = fs::read_to_string(Self::sidecar_path(model_path))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Checks that the saved sizes match the snake actions and the recorded encoding.
    pub fn validate(&self) -> RLResult<()> {
        if self.action_size != SnakeAction::SIZE as usize {
            return Err(RLError::InvalidConfig(format!(
                "saved network has {} actions, snake has {}",
                self.action_size,
                SnakeAction::SIZE
            )));
        }
        if self.observation_size != self.encoding.size() {
            return Err(RLError::ObservationSize {
                expected: self.encoding.size(),
                received: self.observation_size,
            });
        }
        Ok(())
    }
}

pub trait InferenceModel {
    fn predict_move(&self, state: &[f32]) -> RLResult<SnakeAction>;
}

/// Always takes the action with the highest Q-value.
pub struct GreedyPolicy<B: Backend> {
    model: DenseQNetwork<B>,
    device: B::Device,
    observation_size: usize,
}

impl<B: Backend> GreedyPolicy<B> {
    pub fn new(model: DenseQNetwork<B>, device: B::Device, observation_size: usize) -> Self {
        Self {
            model,
            device,
            observation_size,
        }
    }

    pub fn load(
        model_path: &Path,
        descriptor: &ModelDescriptor,
        device: B::Device,
    ) -> RLResult<Self> {
        descriptor.validate()?;
        let model = descriptor.network.load::<B>(
            model_path,
            &device,
            descriptor.observation_size,
            descriptor.action_size,
        )?;
        Ok(Self::new(model, device, descriptor.observation_size))
    }
}

impl<B: Backend> InferenceModel for GreedyPolicy<B> {
    fn predict_move(&self, state: &[f32]) -> RLResult<SnakeAction> {
        if state.len() != self.observation_size {
            return Err(RLError::ObservationSize {
                expected: self.observation_size,
                received: state.len(),
            });
        }
        let q_values = self.model.q_values(state, &self.device);
        let best = argmax(&q_values).ok_or_else(|| {
            RLError::InvalidConfig("network produced no usable Q-values".to_string())
        })?;
        SnakeAction::from_index(best as u32)
    }
}
