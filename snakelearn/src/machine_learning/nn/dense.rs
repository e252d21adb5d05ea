use std::path::Path;

use burn::{
    module::Module,
    nn::{Linear, LinearConfig, Relu},
    optim::{decay::WeightDecayConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor, TensorData,
    },
};
use serde::{Deserialize, Serialize};

use crate::machine_learning::reinforcement_learning::{
    rl_error::{RLError, RLResult},
    rl_model::RLModel,
};

/// Gradient update rule used for the Q-network.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Updater {
    Adam,
    RmsProp,
    Sgd,
}

/// Shape and optimizer of a fully connected Q-network.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DenseNetworkConfig {
    /// L2 penalty, applied as optimizer weight decay.
    pub l2: f32,
    pub updater: Updater,
    pub learning_rate: f32,
    pub num_hidden_nodes: usize,
    /// Number of hidden ReLU layers.
    pub num_layers: usize,
}

impl Default for DenseNetworkConfig {
    fn default() -> Self {
        Self {
            l2: 0.001,
            updater: Updater::Adam,
            learning_rate: 0.001,
            num_hidden_nodes: 50,
            num_layers: 3,
        }
    }
}

impl DenseNetworkConfig {
    pub fn weight_decay(&self) -> Option<WeightDecayConfig> {
        if self.l2 > 0.0 {
            Some(WeightDecayConfig::new(self.l2.into()))
        } else {
            None
        }
    }

    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
        inputs: usize,
        outputs: usize,
    ) -> RLResult<DenseQNetwork<B>> {
        if self.num_layers == 0 || self.num_hidden_nodes == 0 {
            return Err(RLError::InvalidConfig(format!(
                "dense network needs at least one hidden layer and node, got {} layers of {}",
                self.num_layers, self.num_hidden_nodes
            )));
        }
        if inputs == 0 || outputs == 0 {
            return Err(RLError::InvalidConfig(format!(
                "dense network needs inputs and outputs, got {inputs} -> {outputs}"
            )));
        }
        let mut hidden = Vec::with_capacity(self.num_layers);
        hidden.push(LinearConfig::new(inputs, self.num_hidden_nodes).init(device));
        for _ in 1..self.num_layers {
            hidden.push(LinearConfig::new(self.num_hidden_nodes, self.num_hidden_nodes).init(device));
        }
        let output = LinearConfig::new(self.num_hidden_nodes, outputs).init(device);
        Ok(DenseQNetwork {
            hidden,
            output,
            activation: Relu::new(),
        })
    }

    /// Rebuilds the network shape from this config and fills it with the weights stored at
    /// `path`.
    pub fn load<B: Backend>(
        &self,
        path: &Path,
        device: &B::Device,
        inputs: usize,
        outputs: usize,
    ) -> RLResult<DenseQNetwork<B>> {
        let model = self.init(device, inputs, outputs)?;
        let record = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(path.to_path_buf(), device)
            .map_err(|err| RLError::Recorder(format!("{err:?}")))?;
        Ok(model.load_record(record))
    }
}

#[derive(Module, Debug)]
pub struct DenseQNetwork<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> DenseQNetwork<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.hidden.iter().fold(input, |x, layer| {
            let x = layer.forward(x);
            self.activation.forward(x)
        });
        self.output.forward(x)
    }

    /// Q-values of a single observation.
    pub fn q_values(&self, observation: &[f32], device: &B::Device) -> Vec<f32> {
        let input = Tensor::<B, 2>::from_data(
            TensorData::new(observation.to_vec(), [1, observation.len()]),
            device,
        );
        self.forward(input).into_data().iter::<f32>().collect()
    }
}

impl<B: AutodiffBackend> RLModel<B> for DenseQNetwork<B> {
    fn predict(&self, observation: Tensor<B, 2>) -> Tensor<B, 2> {
        self.forward(observation)
    }

    fn optimize<O: Optimizer<Self, B>>(
        self,
        loss: Tensor<B, 1>,
        optimizer: &mut O,
        lr: f32,
    ) -> Self {
        let grads = loss.backward();
        let gradient_params = GradientsParams::from_grads(grads, &self);
        optimizer.step(lr.into(), self, gradient_params)
    }

    fn save_model(&self, path: &Path) -> RLResult<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.clone()
            .save_file(path.to_path_buf(), &recorder)
            .map_err(|err| RLError::Recorder(format!("{err:?}")))
    }
}
