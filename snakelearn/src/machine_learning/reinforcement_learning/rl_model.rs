use std::path::Path;

use burn::{
    module::AutodiffModule,
    optim::Optimizer,
    tensor::{backend::AutodiffBackend, Tensor},
};

use super::rl_error::RLResult;

/// A trainable Q-value approximator: `[batch, observation]` in, `[batch, actions]` out.
pub trait RLModel<B: AutodiffBackend>: AutodiffModule<B> {
    fn predict(&self, observation: Tensor<B, 2>) -> Tensor<B, 2>;
    fn optimize<O: Optimizer<Self, B>>(self, loss: Tensor<B, 1>, optimizer: &mut O, lr: f32)
        -> Self;
    fn save_model(&self, path: &Path) -> RLResult<()>;
}
