use burn::config::Config;
use serde::{Deserialize, Serialize};

/// Persisted progress of a learning-rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LrState {
    pub lr: f64,
    /// Scheduler steps taken so far.
    pub steps: usize,
}

/// Learning-rate schedule stepped once per learning epoch.
pub trait LrScheduler: Send {
    /// Advances the schedule. `kl` is the epoch's mean policy KL, when known.
    fn step(&mut self, kl: Option<f32>) -> f64;
    fn lr(&self) -> f64;
    fn state(&self) -> LrState;
    fn restore(&mut self, state: &LrState);
}

#[derive(Config, Debug)]
pub struct KlAdaptiveConfig {
    #[config(default = "0.008")]
    pub kl_threshold: f64,
    #[config(default = "2.0")]
    pub kl_factor: f64,
    #[config(default = "1.5")]
    pub lr_factor: f64,
    #[config(default = "1e-6")]
    pub min_lr: f64,
    #[config(default = "1e-2")]
    pub max_lr: f64,
}

/// Shrinks the learning rate when the policy moved too far, grows it when it
/// barely moved.
#[derive(Debug, Clone)]
pub struct KlAdaptiveLr {
    config: KlAdaptiveConfig,
    lr: f64,
    steps: usize,
}

impl KlAdaptiveConfig {
    pub fn init(&self, lr: f64) -> KlAdaptiveLr {
        KlAdaptiveLr {
            config: self.clone(),
            lr,
            steps: 0,
        }
    }
}

impl LrScheduler for KlAdaptiveLr {
    fn step(&mut self, kl: Option<f32>) -> f64 {
        self.steps += 1;
        let Some(kl) = kl else {
            return self.lr;
        };
        let kl = kl as f64;
        let c = &self.config;
        if kl > c.kl_threshold * c.kl_factor {
            self.lr = (self.lr / c.lr_factor).max(c.min_lr);
        } else if kl < c.kl_threshold / c.kl_factor {
            self.lr = (self.lr * c.lr_factor).min(c.max_lr);
        }
        self.lr
    }

    fn lr(&self) -> f64 {
        self.lr
    }

    fn state(&self) -> LrState {
        LrState {
            lr: self.lr,
            steps: self.steps,
        }
    }

    fn restore(&mut self, state: &LrState) {
        self.lr = state.lr;
        self.steps = state.steps;
    }
}

#[derive(Config, Debug)]
pub struct LinearDecayConfig {
    /// Number of scheduler steps until `end_factor` is reached.
    pub total_steps: usize,
    #[config(default = "0.0")]
    pub end_factor: f64,
}

#[derive(Debug, Clone)]
pub struct LinearDecayLr {
    config: LinearDecayConfig,
    initial_lr: f64,
    lr: f64,
    steps: usize,
}

impl LinearDecayConfig {
    pub fn init(&self, lr: f64) -> LinearDecayLr {
        LinearDecayLr {
            config: self.clone(),
            initial_lr: lr,
            lr,
            steps: 0,
        }
    }
}

impl LrScheduler for LinearDecayLr {
    fn step(&mut self, _kl: Option<f32>) -> f64 {
        self.steps = (self.steps + 1).min(self.config.total_steps);
        let progress = if self.config.total_steps == 0 {
            1.0
        } else {
            self.steps as f64 / self.config.total_steps as f64
        };
        self.lr = self.initial_lr * (1.0 - progress * (1.0 - self.config.end_factor));
        self.lr
    }

    fn lr(&self) -> f64 {
        self.lr
    }

    fn state(&self) -> LrState {
        LrState {
            lr: self.lr,
            steps: self.steps,
        }
    }

    fn restore(&mut self, state: &LrState) {
        self.lr = state.lr;
        self.steps = state.steps.min(self.config.total_steps);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LrSchedulerConfig {
    KlAdaptive(KlAdaptiveConfig),
    LinearDecay(LinearDecayConfig),
}

impl LrSchedulerConfig {
    pub fn init(&self, lr: f64) -> Box<dyn LrScheduler> {
        match self {
            LrSchedulerConfig::KlAdaptive(config) => Box::new(config.init(lr)),
            LrSchedulerConfig::LinearDecay(config) => Box::new(config.init(lr)),
        }
    }
}
