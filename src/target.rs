use crate::error::{EmitResult, EmitterError};
use nom::{
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, opt, rest},
    sequence::{preceded, tuple},
    IResult,
};
use serde::Deserialize;
use std::{env, mem};

pub const TARGET_ENV: &str = "MODEL_RUNTIME_TARGET";

/// How generated code reads the high-resolution clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockSource {
    /// `clock_gettime` is linked from the system C library.
    #[default]
    Posix,
    /// No `clock_gettime`; a shim over `QueryPerformanceCounter` is emitted.
    PerformanceCounter,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetTriple {
    pub arch: String,
    pub vendor: String,
    pub os: String,
    pub environment: Option<String>,
}

impl TargetTriple {
    pub fn parse(triple: &str) -> EmitResult<Self> {
        all_consuming(triple_parts)(triple.trim())
            .map(|(_, parsed)| parsed)
            .map_err(|_| EmitterError::InvalidTriple {
                triple: triple.to_string(),
            })
    }

    pub fn pointer_width_bits(&self) -> u32 {
        if self.arch.contains("64") {
            64
        } else {
            32
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

fn component(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != '-')(input)
}

fn triple_parts(input: &str) -> IResult<&str, TargetTriple> {
    let (input, (arch, vendor, os, environment)) = tuple((
        component,
        preceded(char('-'), component),
        preceded(char('-'), component),
        opt(preceded(char('-'), rest)),
    ))(input)?;
    Ok((
        input,
        TargetTriple {
            arch: arch.to_string(),
            vendor: vendor.to_string(),
            os: os.to_string(),
            environment: environment
                .filter(|env| !env.is_empty())
                .map(str::to_string),
        },
    ))
}

/// Description of the machine the emitted module runs on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetDevice {
    /// `None` compiles for the host.
    pub triple: Option<String>,
    /// Pointer width; 0 when unspecified.
    pub num_bits: u32,
    pub clock: ClockSource,
}

impl TargetDevice {
    pub fn host() -> Self {
        Self {
            triple: None,
            num_bits: 0,
            clock: if cfg!(windows) {
                ClockSource::PerformanceCounter
            } else {
                ClockSource::Posix
            },
        }
    }

    pub fn from_triple(triple: &str) -> EmitResult<Self> {
        let parsed = TargetTriple::parse(triple)?;
        Ok(Self {
            triple: Some(triple.trim().to_string()),
            num_bits: parsed.pointer_width_bits(),
            clock: if parsed.is_windows() {
                ClockSource::PerformanceCounter
            } else {
                ClockSource::Posix
            },
        })
    }

    pub fn from_flag_or_env(flag: Option<String>) -> EmitResult<Self> {
        let target = flag
            .or_else(|| env::var(TARGET_ENV).ok())
            .filter(|t| !t.trim().is_empty());
        match target {
            Some(triple) => Self::from_triple(&triple),
            None => Ok(Self::host()),
        }
    }

    pub fn with_clock(mut self, clock: ClockSource) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_num_bits(mut self, num_bits: u32) -> Self {
        self.num_bits = num_bits;
        self
    }

    pub fn is_host(&self) -> bool {
        self.triple.is_none()
    }

    pub fn has_posix_clock(&self) -> bool {
        self.clock == ClockSource::Posix
    }

    pub fn pointer_width_bits(&self) -> u32 {
        if self.num_bits != 0 {
            self.num_bits
        } else {
            (mem::size_of::<usize>() * 8) as u32
        }
    }
}

impl Default for TargetDevice {
    fn default() -> Self {
        Self::host()
    }
}
