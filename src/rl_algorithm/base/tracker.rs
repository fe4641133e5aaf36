use std::collections::VecDeque;

use super::EpochLogger;
use crate::{HrlError, Result};

/// Per-environment episode bookkeeping with a bounded history of finished
/// episodes.
#[derive(Debug, Clone)]
pub struct EpisodeTracker {
    cumulative_rewards: Vec<f32>,
    cumulative_timesteps: Vec<usize>,
    track_rewards: VecDeque<f32>,
    track_timesteps: VecDeque<usize>,
    history: usize,
}

impl EpisodeTracker {
    pub fn new(num_envs: usize) -> Self {
        Self::with_history(num_envs, 100)
    }

    pub fn with_history(num_envs: usize, history: usize) -> Self {
        Self {
            cumulative_rewards: vec![0.0; num_envs],
            cumulative_timesteps: vec![0; num_envs],
            track_rewards: VecDeque::with_capacity(history),
            track_timesteps: VecDeque::with_capacity(history),
            history,
        }
    }

    /// Accumulates one step; an env whose episode terminated or was
    /// truncated pushes its totals into the history and starts over.
    pub fn record(
        &mut self,
        rewards: &[f32],
        terminated: &[bool],
        truncated: &[bool],
        logger: &mut EpochLogger,
    ) -> Result<()> {
        let num_envs = self.cumulative_rewards.len();
        if rewards.len() != num_envs || terminated.len() != num_envs || truncated.len() != num_envs {
            return Err(HrlError::ShapeMismatch {
                name: "episode tracker".to_string(),
                expected: vec![num_envs],
                actual: vec![rewards.len(), terminated.len(), truncated.len()],
            });
        }

        for env in 0..num_envs {
            self.cumulative_rewards[env] += rewards[env];
            self.cumulative_timesteps[env] += 1;
            if terminated[env] || truncated[env] {
                self.push_finished(self.cumulative_rewards[env], self.cumulative_timesteps[env]);
                self.cumulative_rewards[env] = 0.0;
                self.cumulative_timesteps[env] = 0;
            }
        }

        if !rewards.is_empty() {
            let max = rewards.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let min = rewards.iter().copied().fold(f32::INFINITY, f32::min);
            let mean = rewards.iter().sum::<f32>() / rewards.len() as f32;
            logger.track(("Reward", "Instantaneous reward (max)"), max);
            logger.track(("Reward", "Instantaneous reward (min)"), min);
            logger.track(("Reward", "Instantaneous reward (mean)"), mean);
        }

        if let Some((max, min, mean)) = stats(self.track_rewards.iter().copied()) {
            logger.track(("Reward", "Total reward (max)"), max);
            logger.track(("Reward", "Total reward (min)"), min);
            logger.track(("Reward", "Total reward (mean)"), mean);
        }
        if let Some((max, min, mean)) = stats(self.track_timesteps.iter().map(|t| *t as f32)) {
            logger.track(("Episode", "Total timesteps (max)"), max);
            logger.track(("Episode", "Total timesteps (min)"), min);
            logger.track(("Episode", "Total timesteps (mean)"), mean);
        }
        Ok(())
    }

    fn push_finished(&mut self, reward: f32, timesteps: usize) {
        if self.history == 0 {
            return;
        }
        if self.track_rewards.len() == self.history {
            self.track_rewards.pop_front();
            self.track_timesteps.pop_front();
        }
        self.track_rewards.push_back(reward);
        self.track_timesteps.push_back(timesteps);
    }

    pub fn finished_rewards(&self) -> impl Iterator<Item = &f32> {
        self.track_rewards.iter()
    }

    pub fn finished_timesteps(&self) -> impl Iterator<Item = &usize> {
        self.track_timesteps.iter()
    }
}

fn stats(values: impl Iterator<Item = f32>) -> Option<(f32, f32, f32)> {
    let (mut max, mut min, mut sum, mut n) = (f32::NEG_INFINITY, f32::INFINITY, 0.0, 0usize);
    for v in values {
        max = max.max(v);
        min = min.min(v);
        sum += v;
        n += 1;
    }
    (n > 0).then(|| (max, min, sum / n as f32))
}
