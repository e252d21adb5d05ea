// driver.rs

use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use burn::tensor::backend::AutodiffBackend;
use snakelearn::{
    CancellationToken, DQNet, DenseNetworkConfig, DenseQNetwork, LearningRateScheduler,
    QLearningConfig, RLAction, RLEnvironment, RLModel, RLResult, TrainingEvent,
};
use tracing::{error, info};

use super::{
    environment::{RewardConfig, SnakeEnvironment},
    game_model::{snake::SnakeAction, GameConfig},
    model::ModelDescriptor,
    observation::StateEncoder,
};

/// Steps over which the reported loss is averaged.
pub const LOSS_REPORT_INTERVAL: usize = 100;

#[derive(Clone, Debug, PartialEq)]
pub struct LearningRateSchedule {
    pub step_size: f32,
    pub update_interval: usize,
    pub warmup: usize,
}

impl Default for LearningRateSchedule {
    fn default() -> Self {
        Self {
            step_size: 1.0,
            update_interval: 10_000,
            warmup: 0,
        }
    }
}

impl LearningRateSchedule {
    pub fn scheduler(&self, initial: f32) -> LearningRateScheduler {
        LearningRateScheduler::new(initial, self.step_size, self.update_interval, self.warmup)
    }
}

/// Everything one training run needs.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingPlan {
    pub learning: QLearningConfig,
    pub network: DenseNetworkConfig,
    pub schedule: LearningRateSchedule,
    pub board: GameConfig,
    pub rewards: RewardConfig,
    pub load_model: Option<PathBuf>,
    pub save_model: Option<PathBuf>,
}

impl Default for TrainingPlan {
    fn default() -> Self {
        let learning = QLearningConfig::default();
        Self {
            board: GameConfig {
                seed: Some(learning.seed),
                ..Default::default()
            },
            learning,
            network: DenseNetworkConfig::default(),
            schedule: LearningRateSchedule::default(),
            rewards: RewardConfig::default(),
            load_model: None,
            save_model: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingReport {
    /// `None` when saving failed.
    pub model_path: Option<PathBuf>,
    pub steps: usize,
    pub episodes: usize,
    pub cancelled: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrainingUpdate {
    Progress {
        step: usize,
        epsilon: f32,
        learning_rate: f32,
        /// Average over the last report interval, `None` before learning starts.
        loss: Option<f32>,
    },
    Episode {
        episode: usize,
        score: u32,
        reward: f32,
    },
    Finished(TrainingReport),
    Failed(String),
}

#[derive(Default)]
struct LossWindow {
    sum: f32,
    count: usize,
}

impl LossWindow {
    fn push(&mut self, loss: Option<f32>) {
        if let Some(loss) = loss {
            self.sum += loss;
            self.count += 1;
        }
    }

    fn flush(&mut self) -> Option<f32> {
        let average = (self.count > 0).then(|| self.sum / self.count as f32);
        *self = Self::default();
        average
    }
}

pub fn default_model_path() -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    PathBuf::from(format!("network-{millis}.mpk"))
}

/// Builds or loads the network, trains it on `env` and saves the result. Blocks until training
/// finishes or `cancel` fires.
pub fn run_training<B, E, F>(
    plan: &TrainingPlan,
    device: B::Device,
    env: &mut SnakeEnvironment<E>,
    cancel: &CancellationToken,
    mut on_update: F,
) -> RLResult<TrainingReport>
where
    B: AutodiffBackend,
    E: StateEncoder,
    F: FnMut(TrainingUpdate),
{
    let dqn = DQNet::<B>::new(device.clone(), plan.learning.clone())?;
    let action_size = SnakeAction::SIZE as usize;
    let model: DenseQNetwork<B> = match &plan.load_model {
        Some(path) => {
            info!(?path, "resuming from saved network");
            B::seed(plan.learning.seed);
            plan.network.load(path, &device, E::SIZE, action_size)?
        }
        None => dqn.init_dense(&plan.network, E::SIZE, action_size)?,
    };
    info!(
        encoding = ?E::KIND,
        width = plan.board.width,
        height = plan.board.height,
        "training snake agent"
    );

    let mut loss_window = LossWindow::default();
    let outcome = dqn.train_dense(
        env,
        model,
        &plan.network,
        plan.schedule.scheduler(plan.network.learning_rate),
        cancel,
        |env: &SnakeEnvironment<E>, event| match event {
            TrainingEvent::Step(progress) => {
                loss_window.push(progress.loss);
                let step = progress.step + 1;
                if step % LOSS_REPORT_INTERVAL == 0 {
                    on_update(TrainingUpdate::Progress {
                        step,
                        epsilon: progress.epsilon,
                        learning_rate: progress.learning_rate,
                        loss: loss_window.flush(),
                    });
                }
            }
            TrainingEvent::EpisodeEnd(summary) => {
                info!(
                    episode = summary.episode,
                    score = env.score(),
                    reward = summary.reward,
                    truncated = summary.truncated,
                    "episode finished"
                );
                on_update(TrainingUpdate::Episode {
                    episode: summary.episode,
                    score: env.score(),
                    reward: summary.reward,
                });
            }
        },
    );
    env.close();
    let outcome = outcome?;

    // the recorder always writes `.mpk`, report the file that actually exists
    let path = plan
        .save_model
        .clone()
        .unwrap_or_else(default_model_path)
        .with_extension("mpk");
    let descriptor = ModelDescriptor {
        encoding: E::KIND,
        observation_size: E::SIZE,
        action_size,
        board: plan.board.clone(),
        rewards: plan.rewards.clone(),
        network: plan.network.clone(),
        training: plan.learning.clone(),
        steps_trained: outcome.steps,
        cancelled: outcome.cancelled,
    };
    let model_path = match save_trained(&outcome.model, &descriptor, &path) {
        Ok(()) => {
            info!(?path, steps = outcome.steps, "saved trained network");
            Some(path)
        }
        Err(err) => {
            error!(%err, ?path, "could not save trained network");
            None
        }
    };

    Ok(TrainingReport {
        model_path,
        steps: outcome.steps,
        episodes: outcome.episodes,
        cancelled: outcome.cancelled,
    })
}

fn save_trained<B: AutodiffBackend>(
    model: &DenseQNetwork<B>,
    descriptor: &ModelDescriptor,
    path: &Path,
) -> RLResult<()> {
    model.save_model(path)?;
    descriptor.save(path)
}
