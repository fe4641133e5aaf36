use std::collections::BTreeMap;

use tensorboard_rs::summary_writer::SummaryWriter;

pub mod checkpoint;
pub mod config;
pub mod memory;
pub mod model;
pub mod motion_dataset;
pub mod network_trainer;
pub mod preprocessor;
pub mod replay_buffer;
pub mod rl_utils;
pub mod scheduler;
pub mod tracker;

/// Collects tagged scalars during an update round and flushes their means
/// to the log and, when a writer is attached, to tensorboard.
pub struct EpochLogger {
    log_info: BTreeMap<(String, String), Vec<f32>>,
    writer: Option<SummaryWriter>,
}

impl Default for EpochLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochLogger {
    pub fn new() -> Self {
        Self {
            log_info: BTreeMap::new(),
            writer: None,
        }
    }

    pub fn init_writer(&mut self, logdir: &str) {
        log::info!("tensorboard logdir={}", logdir);
        self.writer = Some(SummaryWriter::new(logdir));
    }

    pub fn track(&mut self, main_tag_sub_tag: (&str, &str), val: f32) {
        let key = (main_tag_sub_tag.0.to_string(), main_tag_sub_tag.1.to_string());
        self.log_info.entry(key).or_default().push(val);
    }

    pub fn tracked(&self, main_tag_sub_tag: (&str, &str)) -> Option<&Vec<f32>> {
        let key = (main_tag_sub_tag.0.to_string(), main_tag_sub_tag.1.to_string());
        self.log_info.get(&key)
    }

    /// Writes the mean of every tracked series at `step` and clears them.
    pub fn write(&mut self, step: usize) -> BTreeMap<String, f32> {
        let log_info = std::mem::take(&mut self.log_info);
        let mut written = BTreeMap::new();
        log::info!("************iter={}************", step);
        for ((main_tag, sub_tag), values) in log_info {
            if values.is_empty() {
                continue;
            }
            let mean = values.iter().sum::<f32>() / values.len() as f32;
            let tag = format!("{} / {}", main_tag, sub_tag);
            log::info!("{}={}", tag, mean);
            if let Some(writer) = self.writer.as_mut() {
                writer.add_scalar(&format!("{}/{}", main_tag, sub_tag), mean, step);
            }
            written.insert(tag, mean);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.flush();
        }
        written
    }
}
