use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::detection::preprocessing;
use crate::error::{MeasureError, Result};
use crate::frame::Frame;

pub const KERNEL_SIZE: &str = "Kernel Size";
pub const THRESHOLD: &str = "Threshold";

/// The preprocessing transforms the pipeline knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    GrayConversion,
    GaussianBlur,
    BinaryThreshold,
    MorphClose,
    CannyEdge,
}

/// Schema entry for one step parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub default: u32,
    pub min: u32,
    pub max: u32,
    /// Kernel sizes must be odd so the kernel has a center sample
    pub odd: bool,
}

const BLUR_PARAMS: &[ParameterSpec] = &[ParameterSpec {
    name: KERNEL_SIZE,
    default: 5,
    min: 1,
    max: 255,
    odd: true,
}];

const THRESHOLD_PARAMS: &[ParameterSpec] = &[ParameterSpec {
    name: THRESHOLD,
    default: 127,
    min: 0,
    max: 255,
    odd: false,
}];

const CLOSE_PARAMS: &[ParameterSpec] = &[ParameterSpec {
    name: KERNEL_SIZE,
    default: 5,
    min: 1,
    max: 255,
    odd: true,
}];

// The high threshold is 3x this value, so keep it well inside gradient range.
const CANNY_PARAMS: &[ParameterSpec] = &[ParameterSpec {
    name: THRESHOLD,
    default: 50,
    min: 1,
    max: 1000,
    odd: false,
}];

impl ParameterSpec {
    pub fn validate(&self, step: StepKind, value: u32) -> Result<u32> {
        let reason = if value < self.min {
            if self.min == 1 { Some("must be a positive integer") } else { Some("below minimum") }
        } else if value > self.max {
            Some("above maximum")
        } else if self.odd && value % 2 == 0 {
            Some("kernel size must be odd")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(MeasureError::InvalidParameter {
                step,
                name: self.name.to_string(),
                value: value.to_string(),
                reason,
            }),
            None => Ok(value),
        }
    }

    /// Parse a value entered at the configuration boundary
    pub fn parse(&self, step: StepKind, raw: &str) -> Result<u32> {
        let value = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| MeasureError::InvalidParameter {
                step,
                name: self.name.to_string(),
                value: raw.to_string(),
                reason: "not a non-negative integer",
            })?;
        self.validate(step, value)
    }
}

impl StepKind {
    pub const ALL: [StepKind; 5] = [
        StepKind::GrayConversion,
        StepKind::GaussianBlur,
        StepKind::BinaryThreshold,
        StepKind::MorphClose,
        StepKind::CannyEdge,
    ];

    /// Human-readable name for this step (used in listings and logs)
    pub fn label(self) -> &'static str {
        match self {
            StepKind::GrayConversion => "Gray Conversion",
            StepKind::GaussianBlur => "Gaussian Blur",
            StepKind::BinaryThreshold => "Binary Threshold",
            StepKind::MorphClose => "Morphological Operations",
            StepKind::CannyEdge => "Canny Edge Detection",
        }
    }

    /// Short name accepted on the command line
    pub fn short_name(self) -> &'static str {
        match self {
            StepKind::GrayConversion => "gray",
            StepKind::GaussianBlur => "blur",
            StepKind::BinaryThreshold => "threshold",
            StepKind::MorphClose => "close",
            StepKind::CannyEdge => "canny",
        }
    }

    pub fn schema(self) -> &'static [ParameterSpec] {
        match self {
            StepKind::GrayConversion => &[],
            StepKind::GaussianBlur => BLUR_PARAMS,
            StepKind::BinaryThreshold => THRESHOLD_PARAMS,
            StepKind::MorphClose => CLOSE_PARAMS,
            StepKind::CannyEdge => CANNY_PARAMS,
        }
    }

    pub fn parameter(self, name: &str) -> Option<&'static ParameterSpec> {
        self.schema().iter().find(|spec| spec.name.eq_ignore_ascii_case(name))
    }

    /// The step's sole parameter, used by the `kind:value` shorthand
    fn primary_parameter(self) -> Option<&'static ParameterSpec> {
        self.schema().first()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StepKind {
    type Err = MeasureError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        StepKind::ALL
            .into_iter()
            .find(|kind| {
                kind.label().eq_ignore_ascii_case(wanted)
                    || kind.short_name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| MeasureError::UnknownStep(wanted.to_string()))
    }
}

/// Read-only registry of step kinds and their parameter defaults
pub struct StepCatalog;

impl StepCatalog {
    pub fn kinds() -> &'static [StepKind] {
        &StepKind::ALL
    }

    pub fn schema_for(kind: StepKind) -> BTreeMap<&'static str, u32> {
        kind.schema().iter().map(|spec| (spec.name, spec.default)).collect()
    }

    pub fn display_label(kind: StepKind) -> &'static str {
        kind.label()
    }
}

/// A step kind together with its validated parameter values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfiguredStep {
    kind: StepKind,
    parameters: BTreeMap<&'static str, u32>,
}

impl ConfiguredStep {
    pub fn with_defaults(kind: StepKind) -> Self {
        Self {
            kind,
            parameters: StepCatalog::schema_for(kind),
        }
    }

    /// Build a step from boundary strings; missing parameters take catalog defaults.
    pub fn from_raw<I, K, V>(kind: StepKind, parameters: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut step = Self::with_defaults(kind);
        for (name, raw) in parameters {
            let spec = step.spec(name.as_ref(), raw.as_ref())?;
            step.parameters.insert(spec.name, spec.parse(kind, raw.as_ref())?);
        }
        Ok(step)
    }

    /// Parse `"blur"`, `"blur:7"` or `"Gaussian Blur"`
    pub fn from_shorthand(text: &str) -> Result<Self> {
        let (name, value) = match text.split_once(':') {
            Some((name, value)) => (name, Some(value)),
            None => (text, None),
        };
        let kind: StepKind = name.parse()?;
        match (value, kind.primary_parameter()) {
            (None, _) => Ok(Self::with_defaults(kind)),
            (Some(raw), Some(spec)) => Self::from_raw(kind, [(spec.name, raw)]),
            (Some(raw), None) => Err(MeasureError::InvalidParameter {
                step: kind,
                name: String::new(),
                value: raw.to_string(),
                reason: "step takes no parameters",
            }),
        }
    }

    pub fn with_parameter(mut self, name: &str, value: u32) -> Result<Self> {
        self.set_parameter(name, value)?;
        Ok(self)
    }

    pub(crate) fn set_parameter(&mut self, name: &str, value: u32) -> Result<()> {
        let spec = self.spec(name, &value.to_string())?;
        self.parameters.insert(spec.name, spec.validate(self.kind, value)?);
        Ok(())
    }

    fn spec(&self, name: &str, raw: &str) -> Result<&'static ParameterSpec> {
        self.kind
            .parameter(name)
            .ok_or_else(|| MeasureError::InvalidParameter {
                step: self.kind,
                name: name.to_string(),
                value: raw.to_string(),
                reason: "unknown parameter",
            })
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn parameter(&self, name: &str) -> Option<u32> {
        self.kind
            .parameter(name)
            .and_then(|spec| self.parameters.get(spec.name).copied())
    }

    pub fn parameters(&self) -> &BTreeMap<&'static str, u32> {
        &self.parameters
    }

    fn value_of(&self, name: &'static str) -> u32 {
        self.parameters
            .get(name)
            .copied()
            .or_else(|| self.kind.parameter(name).map(|spec| spec.default))
            .unwrap_or_default()
    }

    /// Apply this step to `input`, producing a new frame.
    pub fn apply(&self, input: &Frame) -> Result<Frame> {
        let stage = self.kind.label();
        let output = match self.kind {
            StepKind::GrayConversion => match input {
                Frame::Color(rgb) => Frame::Gray(preprocessing::to_grayscale(rgb)),
                Frame::Gray(_) => {
                    return Err(MeasureError::UnsupportedChannelCount {
                        stage,
                        expected: 3,
                        actual: 1,
                    });
                }
            },
            StepKind::GaussianBlur => {
                let kernel_size = self.value_of(KERNEL_SIZE);
                match input {
                    Frame::Color(rgb) => Frame::Color(preprocessing::apply_blur_rgb(rgb, kernel_size)),
                    Frame::Gray(gray) => Frame::Gray(preprocessing::apply_blur(gray, kernel_size)),
                }
            }
            StepKind::BinaryThreshold => {
                let gray = input.require_gray(stage)?;
                let threshold = self.value_of(THRESHOLD).min(u8::MAX as u32) as u8;
                Frame::Gray(preprocessing::binary_threshold(gray, threshold))
            }
            StepKind::MorphClose => {
                let gray = input.require_gray(stage)?;
                Frame::Gray(preprocessing::morph_close(gray, self.value_of(KERNEL_SIZE)))
            }
            StepKind::CannyEdge => {
                let gray = input.require_gray(stage)?;
                let low = self.value_of(THRESHOLD) as f32;
                Frame::Gray(preprocessing::detect_edges(gray, low, low * 3.0))
            }
        };
        Ok(output)
    }
}

impl fmt::Display for ConfiguredStep {
    /// `"Gaussian Blur (Kernel Size: 5)"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect();
        write!(f, "{} ({})", self.kind.label(), params.join(", "))
    }
}
