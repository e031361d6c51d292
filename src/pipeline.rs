use std::path::{Path, PathBuf};

use tracing::debug;

use crate::detection::steps::{ConfiguredStep, StepKind, THRESHOLD};
use crate::error::{MeasureError, Result};
use crate::frame::Frame;

/// Ordered list of configured preprocessing steps.
///
/// Insertion order is execution order. A step kind appears at most once.
/// Every edit either succeeds completely or leaves the list untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    steps: Vec<ConfiguredStep>,
}

impl PipelineConfig {
    /// Create a new empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Gray, blur, threshold, close, then Canny, each with catalog defaults
    pub fn standard() -> Self {
        Self {
            steps: StepKind::ALL.into_iter().map(ConfiguredStep::with_defaults).collect(),
        }
    }

    /// Parse a comma-separated list such as `"gray,blur:5,threshold:127,close:5"`
    pub fn from_step_list(list: &str) -> Result<Self> {
        let mut config = Self::new();
        for item in list.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            config.append_step(ConfiguredStep::from_shorthand(item)?)?;
        }
        Ok(config)
    }

    /// Append `kind` with boundary-supplied parameter strings; missing
    /// parameters fall back to catalog defaults.
    pub fn append<I, K, V>(&mut self, kind: StepKind, parameters: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if self.contains(kind) {
            return Err(MeasureError::DuplicateStep(kind));
        }
        let step = ConfiguredStep::from_raw(kind, parameters)?;
        self.append_step(step)
    }

    pub fn append_step(&mut self, step: ConfiguredStep) -> Result<()> {
        if self.contains(step.kind()) {
            return Err(MeasureError::DuplicateStep(step.kind()));
        }
        debug!("Pipeline: appended {}", step);
        self.steps.push(step);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<ConfiguredStep> {
        self.check_index(index)?;
        let step = self.steps.remove(index);
        debug!("Pipeline: removed {}", step);
        Ok(step)
    }

    /// Swap the step at `index` with the one before it. Returns the step's new
    /// index; the first step stays where it is.
    pub fn move_up(&mut self, index: usize) -> Result<usize> {
        self.check_index(index)?;
        if index == 0 {
            return Ok(index);
        }
        self.steps.swap(index, index - 1);
        Ok(index - 1)
    }

    /// Swap the step at `index` with the one after it. Returns the step's new
    /// index; the last step stays where it is.
    pub fn move_down(&mut self, index: usize) -> Result<usize> {
        self.check_index(index)?;
        if index + 1 == self.steps.len() {
            return Ok(index);
        }
        self.steps.swap(index, index + 1);
        Ok(index + 1)
    }

    /// Change one parameter of an already configured step
    pub fn set_parameter(&mut self, kind: StepKind, name: &str, value: u32) -> Result<()> {
        let step = self
            .steps
            .iter_mut()
            .find(|step| step.kind() == kind)
            .ok_or(MeasureError::StepNotConfigured(kind))?;
        step.set_parameter(name, value)
    }

    /// The threshold of the configured BinaryThreshold step, if any
    pub fn binary_threshold(&self) -> Option<u32> {
        self.step(StepKind::BinaryThreshold)
            .and_then(|step| step.parameter(THRESHOLD))
    }

    pub fn steps(&self) -> &[ConfiguredStep] {
        &self.steps
    }

    pub fn step(&self, kind: StepKind) -> Option<&ConfiguredStep> {
        self.steps.iter().find(|step| step.kind() == kind)
    }

    pub fn position(&self, kind: StepKind) -> Option<usize> {
        self.steps.iter().position(|step| step.kind() == kind)
    }

    pub fn contains(&self, kind: StepKind) -> bool {
        self.position(kind).is_some()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// One line per step, e.g. `"Gaussian Blur (Kernel Size: 5)"`
    pub fn display_lines(&self) -> Vec<String> {
        self.steps.iter().map(ToString::to_string).collect()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.steps.len() {
            return Err(MeasureError::IndexOutOfRange {
                index,
                len: self.steps.len(),
            });
        }
        Ok(())
    }
}

/// Runs a [`PipelineConfig`] against one frame
pub struct Preprocessor<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Preprocessor<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Run every step in order. Element 0 of the result is the input frame;
    /// element `i` is the output of step `i - 1`, so the last element is the
    /// mask used for extraction.
    pub fn run(&self, input: &Frame) -> Result<Vec<Frame>> {
        self.run_partial(input, self.config.len())
    }

    /// Run only the first `num_steps` steps (useful for inspecting a stage)
    pub fn run_partial(&self, input: &Frame, num_steps: usize) -> Result<Vec<Frame>> {
        let mut stages = Vec::with_capacity(num_steps.min(self.config.len()) + 1);
        stages.push(input.clone());

        for step in self.config.steps().iter().take(num_steps) {
            let previous = stages.last().unwrap_or(input);
            debug!(
                "Running step: {} ({}x{}, {} channel(s))",
                step,
                previous.width(),
                previous.height(),
                previous.channels()
            );
            let next = step.apply(previous)?;
            stages.push(next);
        }

        Ok(stages)
    }
}

/// Write each stage of a preprocessing run as a PNG into `output_dir`.
///
/// The directory must be empty or non-existent. Files are named
/// `00_input.png`, `01_gray_conversion.png`, and so on.
pub fn save_stages(
    output_dir: &Path,
    config: &PipelineConfig,
    stages: &[Frame],
) -> Result<Vec<PathBuf>> {
    if output_dir.exists() {
        if std::fs::read_dir(output_dir)?.next().is_some() {
            return Err(MeasureError::InvalidSetting {
                name: "debug output directory",
                reason: format!("{} is not empty", output_dir.display()),
            });
        }
    } else {
        std::fs::create_dir_all(output_dir)?;
    }

    let names = std::iter::once("input".to_string()).chain(
        config
            .steps()
            .iter()
            .map(|step| step.kind().label().to_lowercase().replace(' ', "_")),
    );

    let mut written = Vec::with_capacity(stages.len());
    for (index, (stage, name)) in stages.iter().zip(names).enumerate() {
        let path = output_dir.join(format!("{:02}_{}.png", index, name));
        stage.save(&path)?;
        debug!("Saved stage {}", path.display());
        written.push(path);
    }
    Ok(written)
}
