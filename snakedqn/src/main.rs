mod snakedqn;

use std::{io, path::PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use snakedqn::{EncodingKind, GameConfig, LearningRateSchedule, RewardConfig};
use snakelearn::{DenseNetworkConfig, QLearningConfig, Updater};

#[derive(Parser)]
#[command(version, about)]
pub struct SnakeArgs {
    /// Trains with the default configuration when omitted
    #[command(subcommand)]
    mode: Option<SnakeMode>,
}

#[derive(Subcommand)]
pub enum SnakeMode {
    /// Play snake with the keyboard
    Play {
        #[command(flatten)]
        board: BoardArgs,
    },
    /// Train a deep Q-network
    Train {
        #[command(flatten)]
        training_args: TrainingArgs,
    },
    /// Watch a saved network play
    Watch {
        #[command(flatten)]
        watch_args: WatchArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum BackendType {
    #[default]
    #[value(name = "ndarray")]
    NdArray,
    Wgpu,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum UpdaterArg {
    #[default]
    Adam,
    RmsProp,
    Sgd,
}

impl From<UpdaterArg> for Updater {
    fn from(value: UpdaterArg) -> Self {
        match value {
            UpdaterArg::Adam => Updater::Adam,
            UpdaterArg::RmsProp => Updater::RmsProp,
            UpdaterArg::Sgd => Updater::Sgd,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct BoardArgs {
    #[arg(long, default_value_t = 10)]
    pub width: usize,
    #[arg(long, default_value_t = 10)]
    pub height: usize,
    #[arg(long, default_value_t = 3)]
    pub initial_length: usize,
}

impl From<BoardArgs> for GameConfig {
    fn from(value: BoardArgs) -> Self {
        GameConfig {
            width: value.width,
            height: value.height,
            initial_length: value.initial_length,
            seed: None,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct WatchArgs {
    /// Saved network, its `.json` descriptor must lie next to it
    pub file: PathBuf,
    #[arg(value_enum, long, default_value_t = BackendType::NdArray)]
    pub backend: BackendType,
    /// Number of games to play
    #[arg(long, default_value_t = 1000)]
    pub episodes: usize,
    /// Pause between two moves
    #[arg(long, default_value_t = 10)]
    pub delay_ms: u64,
    /// Moves after which a game is ended
    #[arg(long, default_value_t = 1000)]
    pub max_episode_steps: usize,
}

#[derive(Parser, Clone, Debug)]
pub struct TrainingArgs {
    // Which burn backend to train on
    #[arg(value_enum, long, default_value_t = BackendType::NdArray)]
    pub backend: BackendType,
    // How the board is turned into network inputs
    #[arg(value_enum, long, default_value_t = EncodingKind::Extended)]
    pub encoding: EncodingKind,
    /// Train without the terminal UI, progress goes to stdout
    #[arg(long)]
    pub headless: bool,

    #[command(flatten)]
    pub board: BoardArgs,

    /// Seed for exploration, replay sampling, weights and food placement
    #[arg(long, default_value_t = 123)]
    pub seed: u64,

    /// Total number of training steps
    #[arg(long, default_value_t = 15_000)]
    pub max_step: usize,

    /// Steps after which an episode is cut short
    #[arg(long, default_value_t = 200)]
    pub max_epoch_step: usize,

    /// Size of the replay buffer
    #[arg(long, default_value_t = 150_000)]
    pub exp_rep_max_size: usize,

    /// Batch size for training
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Steps between two target network updates
    #[arg(long, default_value_t = 500)]
    pub target_dqn_update_freq: usize,

    /// Steps before the first gradient update
    #[arg(long, default_value_t = 10)]
    pub update_start: usize,

    /// Multiplier for every stored reward
    #[arg(long, default_value_t = 0.01)]
    pub reward_factor: f32,

    /// Discount factor (gamma)
    #[arg(long, default_value_t = 0.99)]
    pub gamma: f32,

    /// Bound on the absolute TD error
    #[arg(long, default_value_t = 1.0)]
    pub error_clamp: f32,

    /// Exploration rate (epsilon) after the decay
    #[arg(long, default_value_t = 0.1)]
    pub min_epsilon: f32,

    /// Steps over which epsilon decays
    #[arg(long, default_value_t = 1000)]
    pub epsilon_nb_step: usize,

    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub double_dqn: bool,

    /// L2 penalty
    #[arg(long, default_value_t = 0.001)]
    pub l2: f32,

    #[arg(value_enum, long, default_value_t = UpdaterArg::Adam)]
    pub updater: UpdaterArg,

    /// Learning rate
    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f32,

    #[arg(long, default_value_t = 50)]
    pub num_hidden_nodes: usize,

    /// Number of hidden layers
    #[arg(long, default_value_t = 3)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 100.0)]
    pub food_reward: f32,

    #[arg(long, default_value_t = -100.0, allow_hyphen_values = true)]
    pub death_penalty: f32,

    /// Reward for moving towards the food, its negation for moving away
    #[arg(long, default_value_t = 1.0)]
    pub shaping_reward: f32,

    /// Learning rate decay step
    #[arg(long, default_value_t = 1.0)]
    pub lr_step_size: f32,

    /// Learning rate decay interval
    #[arg(long, default_value_t = 10_000)]
    pub lr_update_interval: usize,

    /// Warmup steps
    #[arg(long, default_value_t = 0)]
    pub lr_warmup: usize,

    #[arg(long)]
    pub load_model: Option<PathBuf>,

    /// Defaults to `network-<unix millis>.mpk`
    #[arg(long)]
    pub save_model: Option<PathBuf>,
}

impl TrainingArgs {
    pub fn defaults() -> Self {
        Self::parse_from([env!("CARGO_PKG_NAME")])
    }
}

impl From<TrainingArgs> for snakedqn::TrainingPlan {
    fn from(value: TrainingArgs) -> Self {
        let learning = QLearningConfig {
            seed: value.seed,
            max_step: value.max_step,
            max_epoch_step: value.max_epoch_step,
            exp_rep_max_size: value.exp_rep_max_size,
            batch_size: value.batch_size,
            target_dqn_update_freq: value.target_dqn_update_freq,
            update_start: value.update_start,
            reward_factor: value.reward_factor,
            gamma: value.gamma,
            error_clamp: value.error_clamp,
            min_epsilon: value.min_epsilon,
            epsilon_nb_step: value.epsilon_nb_step,
            double_dqn: value.double_dqn,
        };
        let network = DenseNetworkConfig {
            l2: value.l2,
            updater: value.updater.into(),
            learning_rate: value.learning_rate,
            num_hidden_nodes: value.num_hidden_nodes,
            num_layers: value.num_layers,
        };
        let schedule = LearningRateSchedule {
            step_size: value.lr_step_size,
            update_interval: value.lr_update_interval,
            warmup: value.lr_warmup,
        };
        let rewards = RewardConfig {
            food_reward: value.food_reward,
            death_penalty: value.death_penalty,
            shaping_reward: value.shaping_reward,
        };
        Self {
            board: GameConfig {
                seed: Some(value.seed),
                ..GameConfig::from(value.board)
            },
            learning,
            network,
            schedule,
            rewards,
            load_model: value.load_model,
            save_model: value.save_model,
        }
    }
}

fn main() -> io::Result<()> {
    let args = SnakeArgs::parse();
    snakedqn::game_loop(args)
}
