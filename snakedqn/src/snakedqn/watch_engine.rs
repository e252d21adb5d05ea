// watch_engine.rs

use ratatui::{
    layout::{Constraint, Layout},
    text::{Line, Text},
    widgets::{Block, Paragraph},
    Frame,
};
use snakelearn::{CancellationToken, RLEnvironment};
use std::{
    io,
    sync::mpsc::{self, Receiver},
    thread,
    time::Duration,
};
use tracing::{info, warn};

use super::{
    engine::Engine,
    environment::{new_snapshot_slot, take_snapshot, SnakeEnvironment, SnapshotSlot},
    game_model::{GameConfig, GameSnapshot},
    input::GameInput,
    model::InferenceModel,
    observation::StateEncoder,
};

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationPlan {
    pub episodes: usize,
    /// Pause between two steps so the game can be followed on screen.
    pub delay: Duration,
    /// Ends an episode whose agent keeps circling without dying.
    pub max_episode_steps: usize,
}

impl Default for EvaluationPlan {
    fn default() -> Self {
        Self {
            episodes: 1000,
            delay: Duration::from_millis(10),
            max_episode_steps: 1000,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeResult {
    pub episode: usize,
    pub score: u32,
    pub highscore: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationReport {
    pub scores: Vec<u32>,
    pub highscore: u32,
}

/// Plays `plan.episodes` greedy games. A failing step ends its episode only.
pub fn evaluate<E, I, F>(
    env: &mut SnakeEnvironment<E>,
    policy: &I,
    plan: &EvaluationPlan,
    cancel: &CancellationToken,
    mut on_episode: F,
) -> EvaluationReport
where
    E: StateEncoder,
    I: InferenceModel,
    F: FnMut(EpisodeResult),
{
    let mut report = EvaluationReport::default();
    'episodes: for episode in 0..plan.episodes {
        let mut state = env.reset();
        for _ in 0..plan.max_episode_steps {
            if cancel.is_cancelled() {
                break 'episodes;
            }
            let action = match policy.predict_move(state.as_ref()) {
                Ok(action) => action,
                Err(err) => {
                    warn!(%err, episode, "evaluation step failed, ending episode");
                    break;
                }
            };
            let reply = env.step(action);
            if reply.done {
                break;
            }
            state = reply.observation;
            if !plan.delay.is_zero() {
                thread::sleep(plan.delay);
            }
        }
        let score = env.score();
        report.highscore = report.highscore.max(score);
        report.scores.push(score);
        info!(episode, score, highscore = report.highscore, "evaluation episode finished");
        on_episode(EpisodeResult {
            episode,
            score,
            highscore: report.highscore,
        });
    }
    env.close();
    info!(
        episodes = report.scores.len(),
        highscore = report.highscore,
        "evaluation finished"
    );
    report
}

/// Watches a trained agent play on a worker thread.
pub struct WatchEngine {
    watch_handle: Option<thread::JoinHandle<()>>,
    latest_snapshot: SnapshotSlot,
    results_rx: Receiver<EpisodeResult>,
    cancel: CancellationToken,
    snapshot: Option<GameSnapshot>,
    last_result: Option<EpisodeResult>,
    total_score: u64,
    episodes: usize,
    plan: EvaluationPlan,
}

impl WatchEngine {
    pub fn new<E, I>(policy: I, board: GameConfig, plan: EvaluationPlan) -> Self
    where
        E: StateEncoder,
        I: InferenceModel + Send + 'static,
    {
        let latest_snapshot = new_snapshot_slot();
        let cancel = CancellationToken::new();
        let (results_tx, results_rx) = mpsc::channel();
        let worker_slot = latest_snapshot.clone();
        let worker_cancel = cancel.clone();
        let worker_plan = plan.clone();
        let watch_handle = thread::spawn(move || {
            let mut env = SnakeEnvironment::<E>::new(board, Default::default())
                .with_snapshot_slot(worker_slot);
            evaluate(&mut env, &policy, &worker_plan, &worker_cancel, |result| {
                let _ = results_tx.send(result);
            });
        });
        Self {
            watch_handle: Some(watch_handle),
            latest_snapshot,
            results_rx,
            cancel,
            snapshot: None,
            last_result: None,
            total_score: 0,
            episodes: 0,
            plan,
        }
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.watch_handle.take() {
            if handle.join().is_err() {
                warn!("evaluation worker panicked");
            }
        }
    }

    fn summary(&self) -> Text<'static> {
        let average = if self.episodes > 0 {
            self.total_score as f64 / self.episodes as f64
        } else {
            0.0
        };
        let (last, highscore) = self
            .last_result
            .as_ref()
            .map_or((0, 0), |result| (result.score, result.highscore));
        Text::from(vec![
            Line::from(format!("Episode: {} / {}", self.episodes, self.plan.episodes)),
            Line::from(format!("Last score: {last}")),
            Line::from(format!("Highscore: {highscore}")),
            Line::from(format!("Average score: {average:.2}")),
        ])
    }
}

impl Engine for WatchEngine {
    fn tick(&mut self, user_input: Option<GameInput>) -> io::Result<bool> {
        if let Some(GameInput::Quit) = user_input {
            self.stop();
            return Ok(true);
        }
        if let Some(snapshot) = take_snapshot(&self.latest_snapshot) {
            self.snapshot = Some(snapshot);
        }
        while let Ok(result) = self.results_rx.try_recv() {
            self.total_score += result.score as u64;
            self.episodes += 1;
            self.last_result = Some(result);
        }
        Ok(false)
    }

    fn render_frame(&self, frame: &mut Frame) {
        let [left, right] =
            Layout::horizontal([Constraint::Percentage(70), Constraint::Percentage(30)])
                .areas(frame.size());
        if let Some(snapshot) = &self.snapshot {
            frame.render_widget(snapshot, left);
        }
        frame.render_widget(
            Paragraph::new(self.summary()).block(Block::bordered().title_top("Evaluation")),
            right,
        );
    }
}

impl Drop for WatchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snakedqn::{
        environment::RewardConfig,
        game_model::snake::SnakeAction,
        observation::CompactEncoder,
    };
    use snakelearn::{RLError, RLResult};
    use std::cell::Cell;

    /// Follows the highest compact feature, which leads towards the food.
    struct Greedy;

    impl InferenceModel for Greedy {
        fn predict_move(&self, state: &[f32]) -> RLResult<SnakeAction> {
            let best = (0..state.len())
                .max_by(|&a, &b| state[a].total_cmp(&state[b]))
                .unwrap_or(0);
            Ok(SnakeAction::ALL[best])
        }
    }

    struct Broken(Cell<usize>);

    impl InferenceModel for Broken {
        fn predict_move(&self, _state: &[f32]) -> RLResult<SnakeAction> {
            self.0.set(self.0.get() + 1);
            Err(RLError::InvalidConfig("broken".to_string()))
        }
    }

    fn environment() -> SnakeEnvironment<CompactEncoder> {
        SnakeEnvironment::new(
            GameConfig {
                seed: Some(61),
                ..Default::default()
            },
            RewardConfig::default(),
        )
    }

    fn plan(episodes: usize) -> EvaluationPlan {
        EvaluationPlan {
            episodes,
            delay: Duration::ZERO,
            max_episode_steps: 200,
        }
    }

    #[test]
    fn test_evaluation_plays_every_episode() {
        let mut results = Vec::new();
        let report = evaluate(
            &mut environment(),
            &Greedy,
            &plan(5),
            &CancellationToken::new(),
            |result| results.push(result),
        );
        assert_eq!(report.scores.len(), 5);
        assert_eq!(results.len(), 5);
        assert_eq!(report.highscore, *report.scores.iter().max().unwrap());
        assert!(report.highscore > 0);
        assert_eq!(results.last().unwrap().highscore, report.highscore);
    }

    #[test]
    fn test_failing_step_ends_only_that_episode() {
        let policy = Broken(Cell::new(0));
        let report = evaluate(
            &mut environment(),
            &policy,
            &plan(3),
            &CancellationToken::new(),
            |_| {},
        );
        assert_eq!(report.scores, vec![0, 0, 0]);
        assert_eq!(policy.0.get(), 3);
    }

    #[test]
    fn test_cancelled_evaluation_stops() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = evaluate(&mut environment(), &Greedy, &plan(10), &cancel, |_| {});
        assert!(report.scores.is_empty());
    }
}
