use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use burn::tensor::backend::AutodiffBackend;
use ratatui::{
    layout::{Constraint, Layout},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use snakelearn::CancellationToken;
use tracing::error;

use super::{
    driver::{self, TrainingPlan, TrainingUpdate},
    engine::Engine,
    environment::{new_snapshot_slot, take_snapshot, SnakeEnvironment, SnapshotSlot},
    game_model::GameSnapshot,
    info::Info,
    input::GameInput,
    observation::StateEncoder,
};

/// Spawns the training worker. The worker owns the environment; updates come back over the
/// returned channel and frames through `slot`.
pub fn spawn_training<B, E>(
    plan: TrainingPlan,
    device: B::Device,
    slot: Option<SnapshotSlot>,
    cancel: CancellationToken,
) -> (thread::JoinHandle<()>, Receiver<TrainingUpdate>)
where
    B: AutodiffBackend,
    E: StateEncoder,
{
    let (update_tx, update_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut env = SnakeEnvironment::<E>::new(plan.board.clone(), plan.rewards.clone());
        if let Some(slot) = slot {
            env = env.with_snapshot_slot(slot);
        }
        let result = driver::run_training::<B, E, _>(&plan, device, &mut env, &cancel, |update| {
            let _ = update_tx.send(update);
        });
        let update = match result {
            Ok(report) => TrainingUpdate::Finished(report),
            Err(err) => {
                error!(%err, "training failed");
                TrainingUpdate::Failed(err.to_string())
            }
        };
        let _ = update_tx.send(update);
    });
    (handle, update_rx)
}

pub struct TrainingEngine {
    agent_engine_handle: Option<thread::JoinHandle<()>>,
    latest_snapshot: SnapshotSlot,
    train_info_rx: Receiver<TrainingUpdate>,
    cancel: CancellationToken,
    agent_visual_model: Option<GameSnapshot>,
    agent_visual_info: Info,
}

impl TrainingEngine {
    pub fn new<B, E>(plan: TrainingPlan, device: B::Device) -> Self
    where
        B: AutodiffBackend,
        E: StateEncoder,
    {
        let latest_snapshot = new_snapshot_slot();
        let cancel = CancellationToken::new();
        let agent_visual_info = Info::new(plan.learning.max_step);
        let (handle, train_info_rx) = spawn_training::<B, E>(
            plan,
            device,
            Some(latest_snapshot.clone()),
            cancel.clone(),
        );
        Self {
            agent_engine_handle: Some(handle),
            latest_snapshot,
            train_info_rx,
            cancel,
            agent_visual_model: None,
            agent_visual_info,
        }
    }

    /// Cancels training and waits for the worker to save the model.
    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(agent_handle) = self.agent_engine_handle.take() {
            if agent_handle.join().is_err() {
                error!("training worker panicked");
            }
        }
    }
}

impl Engine for TrainingEngine {
    fn tick(&mut self, user_input: Option<GameInput>) -> io::Result<bool> {
        if let Some(GameInput::Quit) = user_input {
            self.stop();
            return Ok(true);
        }
        if let Some(snapshot) = take_snapshot(&self.latest_snapshot) {
            self.agent_visual_model = Some(snapshot);
        }
        while let Ok(update) = self.train_info_rx.try_recv() {
            self.agent_visual_info.apply(update);
        }
        Ok(false)
    }

    fn render_frame(&self, frame: &mut Frame) {
        let [left, right] =
            Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)])
                .areas(frame.size());
        match &self.agent_visual_model {
            Some(snapshot) => frame.render_widget(snapshot, left),
            None => frame.render_widget(
                Paragraph::new("Waiting for the first game...")
                    .block(Block::default().borders(Borders::ALL)),
                left,
            ),
        }
        frame.render_widget(&self.agent_visual_info, right);
    }
}

impl Drop for TrainingEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snakedqn::{model::ModelDescriptor, observation::ExtendedEncoder};
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
    use snakelearn::QLearningConfig;

    type TestBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_worker_reports_and_publishes() {
        let path = std::env::temp_dir().join(format!(
            "snakedqn-worker-{}.mpk",
            std::process::id()
        ));
        let plan = TrainingPlan {
            learning: QLearningConfig {
                max_step: 100,
                batch_size: 8,
                ..Default::default()
            },
            save_model: Some(path.clone()),
            ..Default::default()
        };
        let slot = new_snapshot_slot();
        let (handle, updates) = spawn_training::<TestBackend, ExtendedEncoder>(
            plan,
            NdArrayDevice::default(),
            Some(slot.clone()),
            CancellationToken::new(),
        );
        handle.join().unwrap();

        let updates: Vec<TrainingUpdate> = updates.try_iter().collect();
        match updates.last() {
            Some(TrainingUpdate::Finished(report)) => {
                assert_eq!(report.steps, 100);
                assert_eq!(report.model_path.as_deref(), Some(path.as_path()));
            }
            other => panic!("expected a finished update, got {other:?}"),
        }
        assert!(take_snapshot(&slot).is_some());

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(ModelDescriptor::sidecar_path(&path));
    }

    #[test]
    fn test_worker_reports_setup_failure() {
        let plan = TrainingPlan {
            learning: QLearningConfig {
                batch_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let (handle, updates) = spawn_training::<TestBackend, ExtendedEncoder>(
            plan,
            NdArrayDevice::default(),
            None,
            CancellationToken::new(),
        );
        handle.join().unwrap();
        assert!(matches!(
            updates.try_iter().last(),
            Some(TrainingUpdate::Failed(_))
        ));
    }
}
