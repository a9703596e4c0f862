pub mod config;
pub mod emitter;
pub mod error;
pub mod runtime;
pub mod target;

#[cfg(test)]
mod tests;

pub use config::CompilerOptions;
pub use emitter::{ElementType, ModuleEmitter};
pub use error::{EmitResult, EmitterError};
pub use runtime::{Primitive, Runtime};
pub use target::{ClockSource, TargetDevice};
