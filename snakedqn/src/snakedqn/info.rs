// info.rs

use std::{collections::VecDeque, path::PathBuf, time::Instant};

use ratatui::{prelude::*, text::Span, widgets::*};

use super::driver::TrainingUpdate;

/// Episodes averaged into one point of the score chart.
const SCORE_WINDOW: usize = 10;

#[derive(Clone, Debug, PartialEq)]
pub enum TrainingStatus {
    Running,
    Finished {
        model_path: Option<PathBuf>,
        cancelled: bool,
    },
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct Info {
    current_step: usize,
    learning_rate: f32,
    exploration_rate: f32,
    max_steps: usize,
    episodes: usize,
    best_score: u32,
    score_history: VecDeque<u32>,
    score_average: Vec<(f64, f64)>,
    loss_history: Vec<(f64, f64)>,
    start_time: Instant,
    eta: Option<(u64, u64)>,
    status: TrainingStatus,
}

impl Info {
    pub fn new(max_steps: usize) -> Info {
        Info {
            current_step: 0,
            learning_rate: 0.0,
            exploration_rate: 1.0,
            max_steps,
            episodes: 0,
            best_score: 0,
            score_history: VecDeque::new(),
            score_average: Vec::new(),
            loss_history: Vec::new(),
            start_time: Instant::now(),
            eta: None,
            status: TrainingStatus::Running,
        }
    }

    pub fn apply(&mut self, update: TrainingUpdate) {
        match update {
            TrainingUpdate::Progress {
                step,
                epsilon,
                learning_rate,
                loss,
            } => {
                self.current_step = step;
                self.exploration_rate = epsilon;
                self.learning_rate = learning_rate;
                if let Some(loss) = loss {
                    self.loss_history.push((step as f64, loss as f64));
                }
                self.update_eta();
            }
            TrainingUpdate::Episode { score, .. } => self.add_score(score),
            TrainingUpdate::Finished(report) => {
                self.current_step = report.steps;
                self.status = TrainingStatus::Finished {
                    model_path: report.model_path,
                    cancelled: report.cancelled,
                };
                self.eta = None;
            }
            TrainingUpdate::Failed(message) => self.status = TrainingStatus::Failed(message),
        }
    }

    fn update_eta(&mut self) {
        if self.current_step == 0 {
            return;
        }
        let elapsed_time = self.start_time.elapsed().as_secs_f64();
        let estimated = (elapsed_time / self.current_step as f64) * self.max_steps as f64;
        let eta = (estimated - elapsed_time).max(0.0) as u64;
        self.eta = Some((eta / 3600, (eta % 3600) / 60));
    }

    fn add_score(&mut self, score: u32) {
        self.episodes += 1;
        self.best_score = self.best_score.max(score);
        self.score_history.push_back(score);
        if self.score_history.len() >= SCORE_WINDOW {
            let chunk = self.score_history.drain(..SCORE_WINDOW);
            let average = chunk.sum::<u32>() as f64 / SCORE_WINDOW as f64;
            self.score_average.push((self.episodes as f64, average));
        }
    }

    pub fn status(&self) -> &TrainingStatus {
        &self.status
    }

    fn status_line(&self) -> Line<'static> {
        match &self.status {
            TrainingStatus::Running => Line::from("Training...".yellow()),
            TrainingStatus::Finished {
                model_path,
                cancelled,
            } => {
                let verb = if *cancelled { "Stopped" } else { "Finished" };
                let saved = match model_path {
                    Some(path) => format!("saved to {}", path.display()),
                    None => "not saved, see the log".to_string(),
                };
                Line::from(Span::styled(
                    format!("{verb}, {saved}"),
                    Style::default().fg(Color::Green),
                ))
            }
            TrainingStatus::Failed(message) => Line::from(Span::styled(
                format!("Failed: {message}"),
                Style::default().fg(Color::Red),
            )),
        }
    }
}

/// Upper bound for a chart axis that is never degenerate.
fn axis_max(points: &[(f64, f64)], axis: impl Fn(&(f64, f64)) -> f64) -> f64 {
    points.iter().map(axis).fold(0.0, f64::max).max(1e-3)
}

impl Widget for Info {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.render_ref(area, buf)
    }
}

impl WidgetRef for Info {
    fn render_ref(&self, info_area: Rect, buf: &mut Buffer) {
        let [up, down] = Layout::vertical([Constraint::Percentage(50), Constraint::Percentage(50)])
            .areas(info_area);
        let block = Block::default()
            .title(format!("Average score ({SCORE_WINDOW} episodes)"))
            .title_alignment(Alignment::Left)
            .borders(Borders::ALL);
        block.render(up, buf);
        if let Some(&(_, current)) = self.score_average.last() {
            let x_max = axis_max(&self.score_average, |p| p.0);
            let y_max = axis_max(&self.score_average, |p| p.1);
            let datasets = vec![Dataset::default()
                .name(format!("Current: {current:.2}"))
                .marker(symbols::Marker::Dot)
                .style(Style::default().fg(Color::LightBlue))
                .data(&self.score_average)];
            let chart = Chart::new(datasets)
                .block(Block::bordered().title(Span::styled(
                    "Scores",
                    Style::default()
                        .fg(Color::LightBlue)
                        .add_modifier(Modifier::BOLD),
                )))
                .x_axis(
                    Axis::default()
                        .title("Episode")
                        .style(Style::default().fg(Color::Gray))
                        .bounds([0.0, x_max])
                        .labels(vec![
                            Span::styled("0", Style::default().add_modifier(Modifier::BOLD)),
                            Span::styled(
                                format!("{x_max}"),
                                Style::default().add_modifier(Modifier::BOLD),
                            ),
                        ]),
                )
                .y_axis(
                    Axis::default()
                        .title("Score")
                        .style(Style::default().fg(Color::Gray))
                        .bounds([0.0, y_max])
                        .labels(vec![
                            Span::raw("0.0"),
                            Span::styled(
                                format!("{y_max:.1}"),
                                Style::default().add_modifier(Modifier::BOLD),
                            ),
                        ]),
                );
            chart.render(up, buf);
        }

        let [left, right] =
            Layout::horizontal([Constraint::Percentage(30), Constraint::Percentage(70)])
                .areas(down);
        let duration = self.start_time.elapsed();
        let elapsed_hours = duration.as_secs() / 3600;
        let elapsed_minutes = (duration.as_secs() % 3600) / 60;
        let eta_line = match self.eta {
            Some((hours, minutes)) => format!("Eta: {hours} h {minutes} mins"),
            None => "Eta: -".to_string(),
        };
        let text = Text::from(vec![
            Line::from(format!("Step: {} / {}", self.current_step, self.max_steps)),
            Line::from(format!("Episodes: {}", self.episodes)),
            Line::from(format!("Best score: {}", self.best_score)),
            Line::from(format!("Learning rate: {}", self.learning_rate)),
            Line::from(format!("Exploration rate: {:.3}", self.exploration_rate)),
            Line::from(format!(
                "Elapsed time: {elapsed_hours} h {elapsed_minutes} mins"
            )),
            Line::from(eta_line),
            self.status_line(),
        ]);
        Paragraph::new(text)
            .wrap(Wrap { trim: true })
            .block(Block::bordered().title_top("Info"))
            .render(left, buf);

        let block = Block::default()
            .title("Loss History")
            .title_alignment(Alignment::Left)
            .borders(Borders::ALL);
        block.render(right, buf);

        if let Some(&(_, current)) = self.loss_history.last() {
            let y_max = axis_max(&self.loss_history, |p| p.1);
            let datasets = vec![Dataset::default()
                .name(format!("Current: {current:.5}"))
                .marker(symbols::Marker::Dot)
                .style(Style::default().fg(Color::LightRed))
                .data(&self.loss_history)];
            let chart = Chart::new(datasets)
                .block(Block::bordered().title(Span::styled(
                    "Loss History",
                    Style::default()
                        .fg(Color::LightRed)
                        .add_modifier(Modifier::BOLD),
                )))
                .x_axis(
                    Axis::default()
                        .title("Step")
                        .style(Style::default().fg(Color::Gray))
                        .bounds([0.0, self.current_step as f64])
                        .labels(vec![
                            Span::styled("0", Style::default().add_modifier(Modifier::BOLD)),
                            Span::styled(
                                format!("{}", self.current_step),
                                Style::default().add_modifier(Modifier::BOLD),
                            ),
                        ]),
                )
                .y_axis(
                    Axis::default()
                        .title("Loss")
                        .style(Style::default().fg(Color::Gray))
                        .bounds([0.0, y_max])
                        .labels(vec![
                            Span::raw("0.0"),
                            Span::styled(
                                format!("{y_max:.3}"),
                                Style::default().add_modifier(Modifier::BOLD),
                            ),
                        ]),
                );
            chart.render(right, buf);
        }
    }
}
