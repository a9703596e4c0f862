use crate::{
    error::{EmitResult, EmitterError},
    target::{ClockSource, TargetDevice},
};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub const USE_BLAS_ENV: &str = "MODEL_RUNTIME_USE_BLAS";

/// Pointer widths a target may declare; 0 leaves it to the host.
const SUPPORTED_NUM_BITS: [u32; 4] = [0, 16, 32, 64];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    pub target_device: TargetDevice,
    /// Default for callers that do not pick per request.
    pub use_blas: bool,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    use_blas: Option<bool>,
    target: Option<RawTarget>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    triple: Option<String>,
    num_bits: Option<u32>,
    clock: Option<ClockSource>,
}

impl CompilerOptions {
    pub fn for_target(target_device: TargetDevice) -> Self {
        Self {
            target_device,
            use_blas: false,
        }
    }

    pub fn load(path: &Path) -> EmitResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| EmitterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    pub fn from_toml_str(content: &str) -> EmitResult<Self> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, path: &Path) -> EmitResult<Self> {
        let raw: RawOptions = toml::from_str(content).map_err(|error| EmitterError::Config {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

        let mut target_device = match raw.target.as_ref().and_then(|t| t.triple.as_deref()) {
            Some(triple) => TargetDevice::from_triple(triple)?,
            None => TargetDevice::host(),
        };
        if let Some(target) = &raw.target {
            if let Some(num_bits) = target.num_bits {
                if !SUPPORTED_NUM_BITS.contains(&num_bits) {
                    return Err(EmitterError::Config {
                        path: path.to_path_buf(),
                        message: format!(
                            "target.num_bits must be one of {SUPPORTED_NUM_BITS:?}, found {num_bits}"
                        ),
                    });
                }
                target_device = target_device.with_num_bits(num_bits);
            }
            if let Some(clock) = target.clock {
                target_device = target_device.with_clock(clock);
            }
        }

        Ok(Self {
            target_device,
            use_blas: raw.use_blas.unwrap_or(false),
        })
    }

    /// Applies `MODEL_RUNTIME_USE_BLAS` on top of file settings.
    pub fn with_env_overrides(self) -> EmitResult<Self> {
        self.with_use_blas_override(env::var(USE_BLAS_ENV).ok())
    }

    fn with_use_blas_override(mut self, value: Option<String>) -> EmitResult<Self> {
        let Some(value) = value else {
            return Ok(self);
        };
        self.use_blas = match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" | "" => false,
            other => {
                return Err(EmitterError::Config {
                    path: PathBuf::from(USE_BLAS_ENV),
                    message: format!("expected a boolean, found `{other}`"),
                })
            }
        };
        Ok(self)
    }
}
