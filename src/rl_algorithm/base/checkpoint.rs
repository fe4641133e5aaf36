use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    prelude::Backend,
    record::{DefaultFileRecorder, Record, Recorder},
};
use serde::{Deserialize, Serialize};

use super::preprocessor::RunningStandardScaler;
use super::scheduler::LrState;
use crate::{HrlError, MyPrecisionSettings, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Network,
    Optimizer,
    Preprocessor,
    /// Learning rate and scheduler progress.
    Schedule,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub modules: BTreeMap<String, ModuleKind>,
}

fn recorder() -> DefaultFileRecorder<MyPrecisionSettings> {
    DefaultFileRecorder::<MyPrecisionSettings>::new()
}

/// Writes one checkpoint directory. The manifest lands last, in [`CheckpointWriter::finish`].
pub struct CheckpointWriter {
    dir: PathBuf,
    manifest: CheckpointManifest,
}

impl CheckpointWriter {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            manifest: CheckpointManifest::default(),
        })
    }

    pub fn save_network<B: Backend, M: Module<B>>(&mut self, name: &str, module: &M) -> Result<()> {
        module.clone().save_file(self.dir.join(name), &recorder())?;
        self.manifest.modules.insert(name.to_string(), ModuleKind::Network);
        Ok(())
    }

    pub fn save_record<B: Backend, R: Record<B>>(&mut self, name: &str, record: R) -> Result<()> {
        Recorder::<B>::record(&recorder(), record, self.dir.join(name))?;
        self.manifest.modules.insert(name.to_string(), ModuleKind::Optimizer);
        Ok(())
    }

    pub fn save_preprocessor(&mut self, name: &str, scaler: &RunningStandardScaler) -> Result<()> {
        scaler.save(&self.dir.join(format!("{}.json", name)))?;
        self.manifest.modules.insert(name.to_string(), ModuleKind::Preprocessor);
        Ok(())
    }

    pub fn save_schedule(&mut self, name: &str, state: &LrState) -> Result<()> {
        std::fs::write(
            self.dir.join(format!("{}.json", name)),
            serde_json::to_string_pretty(state)?,
        )?;
        self.manifest.modules.insert(name.to_string(), ModuleKind::Schedule);
        Ok(())
    }

    pub fn finish(self) -> Result<PathBuf> {
        std::fs::write(
            self.dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&self.manifest)?,
        )?;
        log::debug!("checkpoint written to {}", self.dir.display());
        Ok(self.dir)
    }
}

pub struct CheckpointReader {
    dir: PathBuf,
    manifest: CheckpointManifest,
}

impl CheckpointReader {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let manifest = serde_json::from_str(&std::fs::read_to_string(dir.join(MANIFEST_FILE))?)?;
        Ok(Self { dir, manifest })
    }

    pub fn manifest(&self) -> &CheckpointManifest {
        &self.manifest
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn expect_kind(&self, name: &str, kind: ModuleKind) -> Result<()> {
        match self.manifest.modules.get(name) {
            Some(stored) if *stored == kind => Ok(()),
            Some(_) => Err(HrlError::UnloadableModule(name.to_string())),
            None => Err(HrlError::MissingCheckpointModule {
                path: self.dir.display().to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Replaces every parameter of `module` with the stored ones.
    pub fn load_network<B: Backend, M: Module<B>>(&self, name: &str, module: M, device: &B::Device) -> Result<M> {
        self.expect_kind(name, ModuleKind::Network)?;
        Ok(module.load_file(self.dir.join(name), &recorder(), device)?)
    }

    pub fn load_record<B: Backend, R: Record<B>>(&self, name: &str, device: &B::Device) -> Result<R> {
        self.expect_kind(name, ModuleKind::Optimizer)?;
        Ok(Recorder::<B>::load::<R>(&recorder(), self.dir.join(name), device)?)
    }

    pub fn load_preprocessor(&self, name: &str) -> Result<RunningStandardScaler> {
        self.expect_kind(name, ModuleKind::Preprocessor)?;
        RunningStandardScaler::load(&self.dir.join(format!("{}.json", name)))
    }

    pub fn load_schedule(&self, name: &str) -> Result<LrState> {
        self.expect_kind(name, ModuleKind::Schedule)?;
        let json = std::fs::read_to_string(self.dir.join(format!("{}.json", name)))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Names present both in the checkpoint and among the live modules.
///
/// Stored names without a live counterpart are skipped with a warning; a
/// live module of a different kind than the stored one is an error.
pub fn match_modules(manifest: &CheckpointManifest, live: &[(&str, ModuleKind)]) -> Result<Vec<String>> {
    let mut matched = Vec::new();
    for (name, kind) in &manifest.modules {
        match live.iter().find(|(live_name, _)| live_name == name) {
            Some((_, live_kind)) if live_kind == kind => matched.push(name.clone()),
            Some(_) => return Err(HrlError::UnloadableModule(name.clone())),
            None => log::warn!(
                "Cannot load the {} module. The agent doesn't have such an instance",
                name
            ),
        }
    }
    Ok(matched)
}
