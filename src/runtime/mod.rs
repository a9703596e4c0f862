//! Runtime functions that generated model code calls into: BLAS-style
//! kernels, math functions and the wall clock.
//!
//! Each request either binds an external symbol or synthesizes a portable
//! body into the module, and the result is reused for the module's lifetime.

use crate::{
    emitter::{is_defined, ElementType, ModuleEmitter},
    error::{EmitResult, EmitterError},
};
use inkwell::values::FunctionValue;
use std::fmt;
use tracing::debug;

mod blas;
mod kernels;
mod math;
mod time;

#[cfg(test)]
mod tests;

pub use blas::{BlasRoutine, CBLAS_NO_TRANS, CBLAS_ROW_MAJOR, CBLAS_TRANS};
pub use time::{
    CLOCK_GETTIME, CLOCK_REALTIME, COUNTER_TICKS_PER_SECOND, QUERY_PERFORMANCE_COUNTER,
    QUERY_PERFORMANCE_FREQUENCY,
};

/// Logical operation a caller asks the runtime for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    DotProduct,
    Gemv,
    Gemm,
    Sqrt,
    Abs,
    Exp,
    Log,
    Sin,
    Cos,
    Tanh,
    CurrentTime,
    BlasGetNumThreads,
    BlasSetNumThreads,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::DotProduct => "DotProduct",
            Primitive::Gemv => "GEMV",
            Primitive::Gemm => "GEMM",
            Primitive::Sqrt => "sqrt",
            Primitive::Abs => "abs",
            Primitive::Exp => "exp",
            Primitive::Log => "log",
            Primitive::Sin => "sin",
            Primitive::Cos => "cos",
            Primitive::Tanh => "tanh",
            Primitive::CurrentTime => "GetTime",
            Primitive::BlasGetNumThreads => "openblas_get_num_threads",
            Primitive::BlasSetNumThreads => "openblas_set_num_threads",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves runtime primitives against one module.
///
/// Apart from the cached `GetTime` wrapper, all state lives in the module's
/// symbol table, so several `Runtime`s over the same module agree on every
/// handle.
pub struct Runtime<'m, 'ctx> {
    module: &'m ModuleEmitter<'ctx>,
    current_time_function: Option<FunctionValue<'ctx>>,
}

impl<'m, 'ctx> Runtime<'m, 'ctx> {
    pub fn new(module: &'m ModuleEmitter<'ctx>) -> Self {
        Self {
            module,
            current_time_function: None,
        }
    }

    pub fn namespace_prefix(&self) -> &str {
        self.module.module_name()
    }

    fn public_name(&self, operation: &str) -> String {
        format!("{}_{}", self.namespace_prefix(), operation)
    }

    /// Returns a callable handle for `primitive` specialized to `element`.
    ///
    /// `prefer_external` only affects GEMV and GEMM; the element type is
    /// ignored by primitives that are not generic over it.
    pub fn resolve(
        &mut self,
        primitive: Primitive,
        element: ElementType,
        prefer_external: bool,
    ) -> EmitResult<FunctionValue<'ctx>> {
        debug!(%primitive, %element, prefer_external, "resolving runtime primitive");
        match primitive {
            Primitive::DotProduct => self.dot_product_function(element),
            Primitive::Gemv => self.gemv_function(element, prefer_external),
            Primitive::Gemm => self.gemm_function(element, prefer_external),
            Primitive::Sqrt => self.sqrt_function(element),
            Primitive::Abs => self.abs_function(element),
            Primitive::Exp => self.exp_function(element),
            Primitive::Log => self.log_function(element),
            Primitive::Sin => self.sin_function(element),
            Primitive::Cos => self.cos_function(element),
            Primitive::Tanh => self.tanh_function(element),
            Primitive::CurrentTime => self.current_time_function(),
            Primitive::BlasGetNumThreads => self.blas_get_num_threads_function(),
            Primitive::BlasSetNumThreads => self.blas_set_num_threads_function(),
        }
    }

    /// Like [`Runtime::resolve`], taking the external BLAS preference from
    /// the module's `use_blas` option.
    pub fn resolve_with_defaults(
        &mut self,
        primitive: Primitive,
        element: ElementType,
    ) -> EmitResult<FunctionValue<'ctx>> {
        let prefer_external = self.module.options().use_blas;
        self.resolve(primitive, element, prefer_external)
    }

    /// `void <ns>_DotProduct<Type>(int32 count, T* left, T* right, T* result)`.
    pub fn dot_product_function(&self, element: ElementType) -> EmitResult<FunctionValue<'ctx>> {
        let name = self.public_name(&format!("DotProduct{}", element.type_name()));
        let fn_type = kernels::dot_product_type(self.module, element);
        if let Some(existing) = self.module.get_function(&name) {
            if existing.get_type() != fn_type || !is_defined(existing) {
                return Err(EmitterError::not_found(
                    name,
                    "an incompatible symbol already uses the dot product name",
                ));
            }
            debug!(%name, "reusing dot product");
            return Ok(existing);
        }
        debug!(%name, "synthesizing dot product");
        kernels::emit_dot_product(self.module, &name, fn_type, element)
    }
}
