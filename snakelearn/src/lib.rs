pub mod machine_learning;

pub use machine_learning::nn::dense::{DenseNetworkConfig, DenseQNetwork, Updater};
pub use machine_learning::reinforcement_learning::{
    cancellation::CancellationToken,
    environment::{RLAction, RLEnvironment, RLState, Reward, StepReply},
    q_learning::{
        config::{EpsilonSchedule, LearningRateScheduler, QLearningConfig},
        dqnet::{DQNet, EpisodeSummary, StepProgress, TrainingEvent, TrainingOutcome},
    },
    rl_error::{RLError, RLResult},
    rl_model::RLModel,
};
