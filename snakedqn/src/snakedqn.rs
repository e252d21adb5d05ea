mod agent_engine;
mod driver;
mod engine;
mod environment;
mod game_engine;
mod game_model;
mod info;
mod input;
mod logging;
mod model;
mod observation;
mod render_engine;
mod watch_engine;

use std::{io, path::Path, time::Duration};

use agent_engine::TrainingEngine;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::backend::{AutodiffBackend, Backend},
};
use driver::TrainingUpdate;
use environment::SnakeEnvironment;
use input::handle_events;
use model::{GreedyPolicy, ModelDescriptor};
use observation::{CompactEncoder, ExtendedEncoder, StateEncoder};
use snakelearn::CancellationToken;
use tracing::{error, info};
use watch_engine::{EvaluationPlan, WatchEngine};

pub use driver::{LearningRateSchedule, TrainingPlan};
pub use environment::RewardConfig;
pub use game_model::GameConfig;
pub use observation::EncodingKind;

use crate::{BackendType, SnakeArgs, SnakeMode, TrainingArgs, WatchArgs};

use self::{engine::Engine, game_engine::GameEngine, render_engine::RenderEngine};

pub fn game_loop(game_args: SnakeArgs) -> io::Result<()> {
    let mode = game_args.mode.unwrap_or_else(|| SnakeMode::Train {
        training_args: TrainingArgs::defaults(),
    });

    if let SnakeMode::Train { training_args } = &mode {
        if training_args.headless {
            logging::init_stdout_logging()?;
            let result = training(training_args.clone(), None);
            if let Err(err) = &result {
                error!(%err, "training failed");
            }
            return result;
        }
    }

    logging::init_file_logging(Path::new(logging::LOG_FILE))?;
    let mut render_engine = RenderEngine::init_render_engine()?;
    let result = match mode {
        SnakeMode::Play { board } => {
            let mut game_engine = GameEngine::new(board.into());
            run_engine(&mut game_engine, &mut render_engine)
        }
        SnakeMode::Train { training_args } => training(training_args, Some(&mut render_engine)),
        SnakeMode::Watch { watch_args } => watch(watch_args, &mut render_engine),
    };
    render_engine.deinit_render_engine()?;
    if let Err(err) = &result {
        error!(%err, "snakedqn stopped with an error");
    }
    result
}

fn run_engine<En: Engine>(engine: &mut En, render_engine: &mut RenderEngine) -> io::Result<()> {
    let mut should_quit = false;
    while !should_quit {
        // rendering
        render_engine.render(|frame| engine.render_frame(frame))?;
        // tick
        let user_input = handle_events()?;
        should_quit = engine.tick(user_input)?;
    }
    Ok(())
}

fn training(training_args: TrainingArgs, render_engine: Option<&mut RenderEngine>) -> io::Result<()> {
    let backend = training_args.backend;
    let encoding = training_args.encoding;
    let plan = TrainingPlan::from(training_args);
    match (backend, encoding) {
        (BackendType::NdArray, EncodingKind::Extended) => learning_model_loop::<
            Autodiff<NdArray>,
            ExtendedEncoder,
        >(plan, NdArrayDevice::default(), render_engine),
        (BackendType::NdArray, EncodingKind::Compact) => learning_model_loop::<
            Autodiff<NdArray>,
            CompactEncoder,
        >(plan, NdArrayDevice::default(), render_engine),
        (BackendType::Wgpu, EncodingKind::Extended) => learning_model_loop::<
            Autodiff<Wgpu>,
            ExtendedEncoder,
        >(plan, WgpuDevice::default(), render_engine),
        (BackendType::Wgpu, EncodingKind::Compact) => learning_model_loop::<
            Autodiff<Wgpu>,
            CompactEncoder,
        >(plan, WgpuDevice::default(), render_engine),
    }
}

/// Trains in the terminal UI, or on this thread with progress in the log when there is no
/// render engine.
fn learning_model_loop<B: AutodiffBackend, E: StateEncoder>(
    plan: TrainingPlan,
    device: B::Device,
    render_engine: Option<&mut RenderEngine>,
) -> io::Result<()> {
    match render_engine {
        Some(render_engine) => {
            let mut rl_engine = TrainingEngine::new::<B, E>(plan, device);
            run_engine(&mut rl_engine, render_engine)
        }
        None => {
            let mut env = SnakeEnvironment::<E>::new(plan.board.clone(), plan.rewards.clone());
            let report = driver::run_training::<B, E, _>(
                &plan,
                device,
                &mut env,
                &CancellationToken::new(),
                |update| match update {
                    TrainingUpdate::Progress {
                        step,
                        epsilon,
                        learning_rate,
                        loss,
                    } => info!(step, epsilon, learning_rate, ?loss, "training progress"),
                    TrainingUpdate::Episode { .. }
                    | TrainingUpdate::Finished(_)
                    | TrainingUpdate::Failed(_) => {}
                },
            )
            .map_err(io::Error::other)?;
            info!(?report, "training finished");
            Ok(())
        }
    }
}

fn watch(watch_args: WatchArgs, render_engine: &mut RenderEngine) -> io::Result<()> {
    let descriptor = ModelDescriptor::load(&watch_args.file).map_err(io::Error::other)?;
    info!(
        file = ?watch_args.file,
        encoding = ?descriptor.encoding,
        steps_trained = descriptor.steps_trained,
        "watching saved network"
    );
    match watch_args.backend {
        BackendType::NdArray => {
            watch_model_loop::<NdArray>(watch_args, descriptor, NdArrayDevice::default(), render_engine)
        }
        BackendType::Wgpu => {
            watch_model_loop::<Wgpu>(watch_args, descriptor, WgpuDevice::default(), render_engine)
        }
    }
}

fn watch_model_loop<B: Backend>(
    watch_args: WatchArgs,
    descriptor: ModelDescriptor,
    device: B::Device,
    render_engine: &mut RenderEngine,
) -> io::Result<()> {
    let policy =
        GreedyPolicy::<B>::load(&watch_args.file, &descriptor, device).map_err(io::Error::other)?;
    // every evaluation game gets fresh food positions
    let board = GameConfig {
        seed: None,
        ..descriptor.board
    };
    let plan = EvaluationPlan {
        episodes: watch_args.episodes,
        delay: Duration::from_millis(watch_args.delay_ms),
        max_episode_steps: watch_args.max_episode_steps,
    };
    let mut watch_engine = match descriptor.encoding {
        EncodingKind::Extended => WatchEngine::new::<ExtendedEncoder, _>(policy, board, plan),
        EncodingKind::Compact => WatchEngine::new::<CompactEncoder, _>(policy, board, plan),
    };
    run_engine(&mut watch_engine, render_engine)
}
