// dqnet.rs

use burn::{
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, Optimizer, RmsPropConfig, SgdConfig},
    tensor::{backend::AutodiffBackend, cast::ToElement, Tensor, TensorData},
};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use tracing::{debug, info, warn};

use crate::machine_learning::{
    argmax,
    nn::dense::{DenseNetworkConfig, DenseQNetwork, Updater},
    one_hot,
    reinforcement_learning::{
        cancellation::CancellationToken,
        environment::{RLAction, RLEnvironment, RLState, Replay, Reward},
        q_learning::config::{LearningRateScheduler, QLearningConfig},
        replay_buffer::ReplayBuffer,
        rl_error::{RLError, RLResult},
        rl_model::RLModel,
    },
};

/// Reported after every environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepProgress {
    pub step: usize,
    pub epsilon: f32,
    pub learning_rate: f32,
    /// Loss of the gradient update done in this step, if any.
    pub loss: Option<f32>,
}

/// Reported when an episode ends, either by the environment or by the step budget.
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub steps: usize,
    /// Raw environment reward of the episode, before the reward factor.
    pub reward: Reward,
    pub truncated: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrainingEvent {
    Step(StepProgress),
    EpisodeEnd(EpisodeSummary),
}

pub struct TrainingOutcome<M> {
    pub model: M,
    pub steps: usize,
    pub episodes: usize,
    pub cancelled: bool,
}

struct TrainBatch {
    pub size: usize,
    pub prev_state_batch: Vec<f32>,
    pub action_batch: Vec<f32>,
    pub reward_batch: Vec<f32>,
    pub next_state_batch: Vec<f32>,
    pub terminal_batch: Vec<f32>,
}

/// Deep Q-learning over a discrete action space with experience replay, a periodically synced
/// target network and optional double-DQN targets.
pub struct DQNet<B: AutodiffBackend> {
    device: B::Device,
    config: QLearningConfig,
}

impl<B: AutodiffBackend> DQNet<B> {
    pub fn new(device: B::Device, config: QLearningConfig) -> RLResult<Self> {
        config.validate()?;
        Ok(Self { device, config })
    }

    pub fn config(&self) -> &QLearningConfig {
        &self.config
    }

    /// Seeds the backend with the run seed and builds a fresh network.
    pub fn init_dense(
        &self,
        network: &DenseNetworkConfig,
        inputs: usize,
        outputs: usize,
    ) -> RLResult<DenseQNetwork<B>> {
        B::seed(self.config.seed);
        network.init(&self.device, inputs, outputs)
    }

    /// Trains a dense network with the optimizer its config asks for.
    pub fn train_dense<E, H>(
        &self,
        env: &mut E,
        model: DenseQNetwork<B>,
        network: &DenseNetworkConfig,
        lr_scheduler: LearningRateScheduler,
        cancel: &CancellationToken,
        hook: H,
    ) -> RLResult<TrainingOutcome<DenseQNetwork<B>>>
    where
        E: RLEnvironment,
        H: FnMut(&E, TrainingEvent),
    {
        info!(updater = ?network.updater, l2 = network.l2, "building optimizer");
        match network.updater {
            Updater::Adam => {
                let optimizer = AdamConfig::new()
                    .with_weight_decay(network.weight_decay())
                    .init::<B, DenseQNetwork<B>>();
                self.train(env, model, optimizer, lr_scheduler, cancel, hook)
            }
            Updater::RmsProp => {
                let optimizer = RmsPropConfig::new()
                    .with_weight_decay(network.weight_decay())
                    .init::<B, DenseQNetwork<B>>();
                self.train(env, model, optimizer, lr_scheduler, cancel, hook)
            }
            Updater::Sgd => {
                let optimizer = SgdConfig::new()
                    .with_weight_decay(network.weight_decay())
                    .init::<B, DenseQNetwork<B>>();
                self.train(env, model, optimizer, lr_scheduler, cancel, hook)
            }
        }
    }

    /// Runs the blocking training loop until `max_step` steps are done or `cancel` fires.
    pub fn train<E, M, O, H>(
        &self,
        env: &mut E,
        model: M,
        mut optimizer: O,
        mut lr_scheduler: LearningRateScheduler,
        cancel: &CancellationToken,
        mut hook: H,
    ) -> RLResult<TrainingOutcome<M>>
    where
        E: RLEnvironment,
        M: RLModel<B>,
        O: Optimizer<M, B>,
        H: FnMut(&E, TrainingEvent),
    {
        let mut rng = XorShiftRng::seed_from_u64(self.config.seed);
        let epsilon_schedule = self.config.epsilon_schedule();
        let mut replay_buffer: ReplayBuffer<E> = ReplayBuffer::new(self.config.exp_rep_max_size);
        let mut model = model;
        let mut target_model = model.clone();

        let mut state = env.reset();
        Self::check_observation::<E>(&state)?;

        let mut steps = 0;
        let mut episode = 0;
        let mut episode_step = 0;
        let mut learning_rate = 0.0;
        let mut cancelled = false;

        info!(
            max_step = self.config.max_step,
            batch_size = self.config.batch_size,
            double_dqn = self.config.double_dqn,
            "starting q-learning"
        );

        for step in 0..self.config.max_step {
            if cancel.is_cancelled() {
                info!(step, "training cancelled");
                cancelled = true;
                break;
            }
            let epsilon = epsilon_schedule.epsilon(step);
            let action = self.action_policy::<E, M>(&model, &state, epsilon, &mut rng)?;
            let reply = env.step(action);
            Self::check_observation::<E>(&reply.observation)?;
            steps = step + 1;
            episode_step += 1;

            replay_buffer.add(Replay {
                prev_state: state,
                action,
                reward: reply.reward * self.config.reward_factor,
                next_state: reply.observation.clone(),
                terminal: reply.done,
            });

            let mut loss = None;
            if step >= self.config.update_start {
                let batch = self.sample_batch(&replay_buffer, &mut rng)?;
                learning_rate = lr_scheduler.step();
                let (updated, loss_value) =
                    self.learn(model, &target_model, &mut optimizer, learning_rate, batch);
                model = updated;
                if !loss_value.is_finite() {
                    warn!(step, loss_value, "non-finite loss");
                }
                loss = Some(loss_value);
            }
            if steps % self.config.target_dqn_update_freq == 0 {
                debug!(step, "syncing target network");
                target_model = model.clone();
            }

            hook(
                env,
                TrainingEvent::Step(StepProgress {
                    step,
                    epsilon,
                    learning_rate,
                    loss,
                }),
            );

            let truncated = !reply.done && episode_step >= self.config.max_epoch_step;
            if reply.done || truncated {
                let summary = EpisodeSummary {
                    episode,
                    steps: episode_step,
                    reward: env.episode_reward(),
                    truncated,
                };
                debug!(?summary, "episode finished");
                hook(env, TrainingEvent::EpisodeEnd(summary));
                episode += 1;
                episode_step = 0;
                state = env.reset();
                Self::check_observation::<E>(&state)?;
            } else {
                state = reply.observation;
            }
        }

        info!(steps, episodes = episode, cancelled, "q-learning finished");
        Ok(TrainingOutcome {
            model,
            steps,
            episodes: episode,
            cancelled,
        })
    }

    fn check_observation<E: RLEnvironment>(state: &E::State) -> RLResult<()> {
        let received = state.as_ref().len();
        if received == E::State::SIZE {
            Ok(())
        } else {
            Err(RLError::ObservationSize {
                expected: E::State::SIZE,
                received,
            })
        }
    }

    fn action_policy<E, M>(
        &self,
        model: &M,
        state: &E::State,
        epsilon: f32,
        rng: &mut XorShiftRng,
    ) -> RLResult<E::Action>
    where
        E: RLEnvironment,
        M: RLModel<B>,
    {
        if rng.gen::<f32>() < epsilon {
            return E::Action::from_index(rng.gen_range(0..E::Action::SIZE));
        }
        let input = self.tensor(state.as_ref().to_vec(), 1, E::State::SIZE);
        let q_values: Vec<f32> = model
            .predict(input)
            .detach()
            .into_data()
            .iter::<f32>()
            .collect();
        match argmax(&q_values) {
            Some(best) => E::Action::from_index(best as u32),
            None => {
                warn!("Q-values are all NaN, falling back to a random action");
                E::Action::from_index(rng.gen_range(0..E::Action::SIZE))
            }
        }
    }

    fn sample_batch<E: RLEnvironment>(
        &self,
        replay_buffer: &ReplayBuffer<E>,
        rng: &mut XorShiftRng,
    ) -> RLResult<TrainBatch> {
        let replays = replay_buffer.get(self.config.batch_size, rng)?;
        let prev_state_batch: Vec<f32> = replays
            .iter()
            .flat_map(|&r| r.prev_state.as_ref())
            .copied()
            .collect();
        let actions: Vec<usize> = replays
            .iter()
            .map(|&r| Into::<u32>::into(r.action) as usize)
            .collect();
        let action_batch = one_hot(&actions, E::Action::SIZE as usize);
        let reward_batch: Vec<f32> = replays.iter().map(|&r| r.reward).collect();
        let next_state_batch: Vec<f32> = replays
            .iter()
            .flat_map(|&r| r.next_state.as_ref())
            .copied()
            .collect();
        let terminal_batch: Vec<f32> = replays
            .iter()
            .map(|&r| if r.terminal { 0.0 } else { 1.0 }) // map to multiplier for train
            .collect();
        Ok(TrainBatch {
            size: replays.len(),
            prev_state_batch,
            action_batch,
            reward_batch,
            next_state_batch,
            terminal_batch,
        })
    }

    fn learn<M, O>(
        &self,
        model: M,
        target_model: &M,
        optimizer: &mut O,
        learning_rate: f32,
        batch: TrainBatch,
    ) -> (M, f32)
    where
        M: RLModel<B>,
        O: Optimizer<M, B>,
    {
        let n = batch.size;
        let state_size = batch.prev_state_batch.len() / n;
        let action_size = batch.action_batch.len() / n;

        let prev_state_tensor = self.tensor(batch.prev_state_batch, n, state_size);
        let action_tensor = self.tensor(batch.action_batch, n, action_size);
        let reward_tensor = self.tensor(batch.reward_batch, n, 1);
        let next_state_tensor = self.tensor(batch.next_state_batch, n, state_size);
        let terminal_tensor = self.tensor(batch.terminal_batch, n, 1);

        let next_target_q = target_model.predict(next_state_tensor.clone()).detach();
        let next_q = if self.config.double_dqn {
            // the online network picks the action, the target network values it
            let online_next: Vec<f32> = model
                .predict(next_state_tensor)
                .detach()
                .into_data()
                .iter::<f32>()
                .collect();
            let best_actions: Vec<usize> = online_next
                .chunks(action_size)
                .map(|row| argmax(row).unwrap_or(0))
                .collect();
            let best_mask = self.tensor(one_hot(&best_actions, action_size), n, action_size);
            (next_target_q * best_mask).sum_dim(1)
        } else {
            next_target_q.max_dim(1)
        };
        let expected = (next_q * terminal_tensor)
            .mul_scalar(self.config.gamma)
            .add(reward_tensor);

        let prev_q = (model.predict(prev_state_tensor) * action_tensor).sum_dim(1);
        let current = prev_q.clone().detach();
        let td_error =
            (expected - current.clone()).clamp(-self.config.error_clamp, self.config.error_clamp);
        let loss = MseLoss::new().forward(prev_q, current + td_error, Reduction::Mean);
        let loss_value = loss.clone().into_scalar().to_f32();

        (
            model.optimize(loss, optimizer, learning_rate),
            loss_value,
        )
    }

    fn tensor(&self, values: Vec<f32>, rows: usize, columns: usize) -> Tensor<B, 2> {
        Tensor::from_data(TensorData::new(values, [rows, columns]), &self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine_learning::reinforcement_learning::environment::StepReply;
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    const CORRIDOR_LEN: usize = 5;

    #[derive(Clone, Debug)]
    struct CorridorState(Vec<f32>);

    impl AsRef<[f32]> for CorridorState {
        fn as_ref(&self) -> &[f32] {
            &self.0
        }
    }

    impl RLState for CorridorState {
        const SIZE: usize = CORRIDOR_LEN;
    }

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum CorridorAction {
        Back,
        Forward,
    }

    impl From<CorridorAction> for u32 {
        fn from(action: CorridorAction) -> Self {
            match action {
                CorridorAction::Back => 0,
                CorridorAction::Forward => 1,
            }
        }
    }

    impl RLAction for CorridorAction {
        const SIZE: u32 = 2;

        fn from_index(index: u32) -> RLResult<Self> {
            match Self::check_index(index)? {
                0 => Ok(CorridorAction::Back),
                _ => Ok(CorridorAction::Forward),
            }
        }
    }

    /// Walk forward to the last cell to win, the episode never ends otherwise.
    struct Corridor {
        position: usize,
        reward: Reward,
        observation_len: usize,
        closed: bool,
    }

    impl Corridor {
        fn new() -> Self {
            Self {
                position: 0,
                reward: 0.0,
                observation_len: CORRIDOR_LEN,
                closed: false,
            }
        }
    }

    impl RLEnvironment for Corridor {
        type State = CorridorState;
        type Action = CorridorAction;

        fn reset(&mut self) -> CorridorState {
            self.position = 0;
            self.reward = 0.0;
            self.state()
        }

        fn step(&mut self, action: CorridorAction) -> StepReply<CorridorState> {
            self.position = match action {
                CorridorAction::Back => self.position.saturating_sub(1),
                CorridorAction::Forward => (self.position + 1).min(CORRIDOR_LEN - 1),
            };
            let done = self.is_done();
            let reward = if done { 1.0 } else { -0.1 };
            self.reward += reward;
            StepReply {
                observation: self.state(),
                reward,
                done,
            }
        }

        fn state(&self) -> CorridorState {
            let mut features = vec![0.0; self.observation_len];
            if let Some(cell) = features.get_mut(self.position) {
                *cell = 1.0;
            }
            CorridorState(features)
        }

        fn is_done(&self) -> bool {
            self.position == CORRIDOR_LEN - 1
        }

        fn episode_reward(&self) -> Reward {
            self.reward
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn small_config() -> QLearningConfig {
        QLearningConfig {
            max_step: 120,
            max_epoch_step: 30,
            exp_rep_max_size: 500,
            batch_size: 16,
            target_dqn_update_freq: 20,
            update_start: 5,
            reward_factor: 1.0,
            epsilon_nb_step: 50,
            ..Default::default()
        }
    }

    fn small_network() -> DenseNetworkConfig {
        DenseNetworkConfig {
            num_hidden_nodes: 8,
            num_layers: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = QLearningConfig {
            target_dqn_update_freq: 0,
            ..Default::default()
        };
        assert!(DQNet::<TestBackend>::new(NdArrayDevice::default(), config).is_err());
    }

    #[test]
    fn test_training_runs_full_step_budget() {
        let dqn = DQNet::<TestBackend>::new(NdArrayDevice::default(), small_config()).unwrap();
        let network = small_network();
        let model = dqn
            .init_dense(&network, CORRIDOR_LEN, CorridorAction::SIZE as usize)
            .unwrap();
        let mut env = Corridor::new();
        let mut events = Vec::new();
        let outcome = dqn
            .train_dense(
                &mut env,
                model,
                &network,
                LearningRateScheduler::constant(network.learning_rate),
                &CancellationToken::new(),
                |_env: &Corridor, event| events.push(event),
            )
            .unwrap();

        assert_eq!(outcome.steps, 120);
        assert!(!outcome.cancelled);
        assert!(outcome.episodes > 0);

        let losses: Vec<f32> = events
            .iter()
            .filter_map(|event| match event {
                TrainingEvent::Step(progress) => progress.loss,
                _ => None,
            })
            .collect();
        assert_eq!(losses.len(), 120 - 5);
        assert!(losses.iter().all(|loss| loss.is_finite()));

        let episode_ends = events
            .iter()
            .filter(|event| matches!(event, TrainingEvent::EpisodeEnd(_)))
            .count();
        assert_eq!(episode_ends, outcome.episodes);
    }

    #[test]
    fn test_each_optimizer_trains() {
        for updater in [Updater::Adam, Updater::RmsProp, Updater::Sgd] {
            let config = QLearningConfig {
                max_step: 30,
                double_dqn: false,
                ..small_config()
            };
            let dqn = DQNet::<TestBackend>::new(NdArrayDevice::default(), config).unwrap();
            let network = DenseNetworkConfig {
                updater,
                ..small_network()
            };
            let model = dqn.init_dense(&network, CORRIDOR_LEN, 2).unwrap();
            let outcome = dqn
                .train_dense(
                    &mut Corridor::new(),
                    model,
                    &network,
                    LearningRateScheduler::constant(network.learning_rate),
                    &CancellationToken::new(),
                    |_: &Corridor, _| {},
                )
                .unwrap();
            assert_eq!(outcome.steps, 30);
        }
    }

    #[test]
    fn test_episode_truncated_at_max_epoch_step() {
        let config = QLearningConfig {
            max_step: 21,
            max_epoch_step: 7,
            update_start: 100,
            ..small_config()
        };
        let dqn = DQNet::<TestBackend>::new(NdArrayDevice::default(), config).unwrap();
        let network = small_network();
        let model = dqn.init_dense(&network, CORRIDOR_LEN, 2).unwrap();
        let mut env = StuckCorridor(Corridor::new());
        let mut summaries = Vec::new();
        dqn.train_dense(
            &mut env,
            model,
            &network,
            LearningRateScheduler::constant(network.learning_rate),
            &CancellationToken::new(),
            |_: &StuckCorridor, event| {
                if let TrainingEvent::EpisodeEnd(summary) = event {
                    summaries.push(summary);
                }
            },
        )
        .unwrap();
        assert_eq!(summaries.len(), 3);
        assert!(summaries.iter().all(|s| s.truncated && s.steps == 7));
    }

    #[test]
    fn test_cancelled_before_start() {
        let dqn = DQNet::<TestBackend>::new(NdArrayDevice::default(), small_config()).unwrap();
        let network = small_network();
        let model = dqn.init_dense(&network, CORRIDOR_LEN, 2).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = dqn
            .train_dense(
                &mut Corridor::new(),
                model,
                &network,
                LearningRateScheduler::constant(network.learning_rate),
                &cancel,
                |_: &Corridor, _| {},
            )
            .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.steps, 0);
    }

    #[test]
    fn test_wrong_observation_size_is_error() {
        let dqn = DQNet::<TestBackend>::new(NdArrayDevice::default(), small_config()).unwrap();
        let network = small_network();
        let model = dqn.init_dense(&network, CORRIDOR_LEN, 2).unwrap();
        let mut env = Corridor::new();
        env.observation_len = 3;
        let result = dqn.train_dense(
            &mut env,
            model,
            &network,
            LearningRateScheduler::constant(network.learning_rate),
            &CancellationToken::new(),
            |_: &Corridor, _| {},
        );
        assert!(matches!(
            result,
            Err(RLError::ObservationSize {
                expected: 5,
                received: 3
            })
        ));
    }

    /// A corridor whose goal can never be reached.
    struct StuckCorridor(Corridor);

    impl RLEnvironment for StuckCorridor {
        type State = CorridorState;
        type Action = CorridorAction;

        fn reset(&mut self) -> CorridorState {
            self.0.reset()
        }

        fn step(&mut self, _action: CorridorAction) -> StepReply<CorridorState> {
            let reply = self.0.step(CorridorAction::Back);
            StepReply {
                done: false,
                ..reply
            }
        }

        fn state(&self) -> CorridorState {
            self.0.state()
        }

        fn is_done(&self) -> bool {
            false
        }

        fn episode_reward(&self) -> Reward {
            self.0.episode_reward()
        }

        fn close(&mut self) {
            self.0.close()
        }
    }
}
