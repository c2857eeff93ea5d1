use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    Reward,
    environment::{EnvError, ResetMode, WarehouseEnv},
    policy::Policy,
};

/// How a single episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpisodeStats {
    pub steps: usize,
    pub total_reward: Reward,
    pub done: bool,
    /// The episode was cut short because an action left the observation unchanged.
    pub stuck: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub episodes: Vec<EpisodeStats>,
}

impl EvaluationSummary {
    pub fn succeeded(&self) -> usize {
        self.episodes.iter().filter(|e| e.done).count()
    }

    pub fn success_rate(&self) -> f64 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        self.succeeded() as f64 / self.episodes.len() as f64
    }

    pub fn mean_steps(&self) -> f64 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        self.episodes.iter().map(|e| e.steps as f64).sum::<f64>() / self.episodes.len() as f64
    }
}

impl fmt::Display for EvaluationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} episodes succeeded",
            self.succeeded(),
            self.episodes.len()
        )
    }
}

/// Steps `policy` on the current episode until it is done, stuck, or `max_steps` is reached.
pub fn run_episode<P: Policy + ?Sized>(
    env: &mut WarehouseEnv,
    policy: &mut P,
    max_steps: usize,
) -> Result<EpisodeStats, EnvError> {
    let mut stats = EpisodeStats {
        steps: 0,
        total_reward: 0.0,
        done: false,
        stuck: false,
    };
    let mut observation = env.observation();

    while stats.steps < max_steps {
        let action = policy.select_action(env);
        let step = env.step(action)?;
        stats.steps += 1;
        stats.total_reward += step.reward;
        if step.done {
            stats.done = true;
            break;
        }
        if step.observation == observation {
            debug!("Episode stuck after {} steps", stats.steps);
            stats.stuck = true;
            break;
        }
        observation = step.observation;
    }
    Ok(stats)
}

/// Runs `episodes` episodes, re-rolling a lenient reset before each one.
pub fn evaluate<P: Policy + ?Sized>(
    env: &mut WarehouseEnv,
    policy: &mut P,
    episodes: usize,
    max_steps: usize,
) -> Result<EvaluationSummary, EnvError> {
    let mut summary = EvaluationSummary::default();
    for episode in 0..episodes {
        env.reset(ResetMode::Lenient)?;
        let stats = run_episode(env, policy, max_steps)?;
        debug!("Episode {}: {:?}", episode, stats);
        summary.episodes.push(stats);
    }
    info!("{}", summary);
    Ok(summary)
}
