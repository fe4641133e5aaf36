use burn::{
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, cast::ToElement, Tensor},
};

use super::checkpoint::{CheckpointReader, CheckpointWriter};
use super::scheduler::{LrScheduler, LrSchedulerConfig, LrState};
use crate::burn_utils::check_finite;
use crate::Result;

type OptimizerRecord<B, M> = <OptimizerAdaptor<Adam, M, B> as Optimizer<M, B>>::Record;

/// One network with its own Adam optimizer, grad clipping and optional
/// learning-rate schedule.
pub struct NetworkTrainer<B: AutodiffBackend, M: AutodiffModule<B>> {
    pub net: M,
    optimizer: OptimizerAdaptor<Adam, M, B>,
    adam_config: AdamConfig,
    lr: f64,
    scheduler: Option<Box<dyn LrScheduler>>,
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> NetworkTrainer<B, M> {
    pub fn new(net: M, adam_config: AdamConfig, lr: f64, scheduler: Option<&LrSchedulerConfig>) -> Self {
        Self {
            net,
            optimizer: adam_config.init::<B, M>(),
            adam_config,
            lr,
            scheduler: scheduler.map(|config| config.init(lr)),
        }
    }

    /// Backpropagates `loss` into this network only and applies one optimizer step.
    pub fn step(&mut self, loss: Tensor<B, 1>, what: &str) -> Result<f32> {
        let loss_value = loss.clone().into_scalar().to_f32();
        check_finite(loss_value, what)?;
        let grads = GradientsParams::from_grads(loss.backward(), &self.net);
        self.net = self.optimizer.step(self.lr, self.net.clone(), grads);
        Ok(loss_value)
    }

    pub fn schedule_step(&mut self, kl: Option<f32>) {
        if let Some(scheduler) = self.scheduler.as_mut() {
            self.lr = scheduler.step(kl);
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn save(&self, writer: &mut CheckpointWriter, net_name: &str, optimizer_name: &str) -> Result<()> {
        writer.save_network::<B, M>(net_name, &self.net)?;
        writer.save_record::<B, OptimizerRecord<B, M>>(optimizer_name, self.optimizer.to_record())
    }

    /// Current learning rate together with the scheduler's progress.
    pub fn lr_state(&self) -> LrState {
        match &self.scheduler {
            Some(scheduler) => scheduler.state(),
            None => LrState {
                lr: self.lr,
                steps: 0,
            },
        }
    }

    pub fn save_lr(&self, writer: &mut CheckpointWriter, name: &str) -> Result<()> {
        writer.save_schedule(name, &self.lr_state())
    }

    pub fn load_lr(&mut self, reader: &CheckpointReader, name: &str) -> Result<()> {
        let state = reader.load_schedule(name)?;
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.restore(&state);
        }
        self.lr = state.lr;
        Ok(())
    }

    pub fn load_net(&mut self, reader: &CheckpointReader, name: &str, device: &B::Device) -> Result<()> {
        self.net = reader.load_network::<B, M>(name, self.net.clone(), device)?;
        Ok(())
    }

    pub fn load_optimizer(&mut self, reader: &CheckpointReader, name: &str, device: &B::Device) -> Result<()> {
        let record = reader.load_record::<B, OptimizerRecord<B, M>>(name, device)?;
        self.optimizer = self.adam_config.init::<B, M>().load_record(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burn_utils::{build_mlp, Sequence};
    use crate::rl_algorithm::base::scheduler::KlAdaptiveConfig;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::backend::Autodiff;
    use burn::nn::loss::{MseLoss, Reduction};

    type TB = Autodiff<NdArray>;

    fn regression_loss(net: &Sequence<TB>) -> Tensor<TB, 1> {
        let device = NdArrayDevice::Cpu;
        let x = Tensor::<TB, 2>::from_floats([[0.0], [0.5], [1.0]], &device);
        let y = Tensor::<TB, 2>::from_floats([[1.0], [2.0], [3.0]], &device);
        MseLoss::new().forward(net.forward(x), y, Reduction::Mean)
    }

    #[test]
    fn test_step_reduces_loss() {
        let net = build_mlp::<TB>(1, 1, 1, 16, &NdArrayDevice::Cpu);
        let mut trainer = NetworkTrainer::new(net, AdamConfig::new(), 1e-2, None);
        let first = trainer.step(regression_loss(&trainer.net), "loss").unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = trainer.step(regression_loss(&trainer.net), "loss").unwrap();
        }
        assert!(last < first * 0.5, "first={} last={}", first, last);
    }

    #[test]
    fn test_schedule_step_updates_lr() {
        let net = build_mlp::<TB>(1, 1, 1, 4, &NdArrayDevice::Cpu);
        let scheduler = LrSchedulerConfig::KlAdaptive(KlAdaptiveConfig::new());
        let mut trainer = NetworkTrainer::new(net, AdamConfig::new(), 1e-3, Some(&scheduler));
        assert!(trainer.has_scheduler());
        trainer.schedule_step(Some(1.0));
        assert!(trainer.lr() < 1e-3);
    }

    #[test]
    fn test_optimizer_round_trip() {
        let device = NdArrayDevice::Cpu;
        let dir = tempfile::tempdir().unwrap();
        let net = build_mlp::<TB>(1, 1, 1, 4, &device);
        let mut trainer = NetworkTrainer::new(net, AdamConfig::new(), 1e-3, None);
        trainer.step(regression_loss(&trainer.net), "loss").unwrap();

        let mut writer = CheckpointWriter::create(dir.path()).unwrap();
        trainer.save(&mut writer, "net", "optimizer_net").unwrap();
        let path = writer.finish().unwrap();

        let reader = CheckpointReader::open(path).unwrap();
        let fresh = build_mlp::<TB>(1, 1, 1, 4, &device);
        let mut restored = NetworkTrainer::new(fresh, AdamConfig::new(), 1e-3, None);
        restored.load_net(&reader, "net", &device).unwrap();
        restored.load_optimizer(&reader, "optimizer_net", &device).unwrap();

        for _ in 0..2 {
            let a = trainer.step(regression_loss(&trainer.net), "loss").unwrap();
            let b = restored.step(regression_loss(&restored.net), "loss").unwrap();
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_adapted_lr_round_trip() {
        let device = NdArrayDevice::Cpu;
        let dir = tempfile::tempdir().unwrap();
        let scheduler = LrSchedulerConfig::KlAdaptive(KlAdaptiveConfig::new());
        let net = build_mlp::<TB>(1, 1, 1, 4, &device);
        let mut trainer = NetworkTrainer::new(net, AdamConfig::new(), 1e-3, Some(&scheduler));
        trainer.schedule_step(Some(1.0));
        let adapted = trainer.lr();
        assert!(adapted < 1e-3);

        let mut writer = CheckpointWriter::create(dir.path()).unwrap();
        trainer.save_lr(&mut writer, "lr_net").unwrap();
        let reader = CheckpointReader::open(writer.finish().unwrap()).unwrap();

        let fresh = build_mlp::<TB>(1, 1, 1, 4, &device);
        let mut restored = NetworkTrainer::new(fresh, AdamConfig::new(), 1e-3, Some(&scheduler));
        restored.load_lr(&reader, "lr_net").unwrap();
        assert_eq!(restored.lr(), adapted);
        assert_eq!(restored.lr_state(), trainer.lr_state());
        // the restored schedule keeps adapting from the saved rate
        trainer.schedule_step(Some(1.0));
        restored.schedule_step(Some(1.0));
        assert_eq!(restored.lr(), trainer.lr());
    }
}
