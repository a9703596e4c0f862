use super::{kernels, Runtime};
use crate::{
    emitter::{is_defined, ElementType, VariableType},
    error::{EmitResult, EmitterError},
};
use inkwell::{types::FunctionType, values::FunctionValue};
use std::fmt;
use tracing::debug;

pub const CBLAS_ROW_MAJOR: i32 = 101;
pub const CBLAS_NO_TRANS: i32 = 111;
pub const CBLAS_TRANS: i32 = 112;

const GET_NUM_THREADS: &str = "openblas_get_num_threads";
const SET_NUM_THREADS: &str = "openblas_set_num_threads";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlasRoutine {
    Gemv,
    Gemm,
}

impl BlasRoutine {
    fn suffix(self) -> &'static str {
        match self {
            BlasRoutine::Gemv => "gemv",
            BlasRoutine::Gemm => "gemm",
        }
    }

    /// CBLAS argument order. The external routine and the fallback share it.
    pub fn parameters(self, element: ElementType) -> Vec<VariableType> {
        let scalar = element.scalar();
        let array = element.pointer();
        let int = VariableType::Int32;
        match self {
            // order, trans, m, n, alpha, A, lda, x, incx, beta, y, incy
            BlasRoutine::Gemv => vec![
                int, int, int, int, scalar, array, int, array, int, scalar, array, int,
            ],
            // order, transA, transB, m, n, k, alpha, A, lda, B, ldb, beta, C, ldc
            BlasRoutine::Gemm => vec![
                int, int, int, int, int, int, scalar, array, int, array, int, scalar, array, int,
            ],
        }
    }

    pub fn external_name(self, element: ElementType) -> Option<String> {
        element
            .blas_prefix()
            .map(|prefix| format!("cblas_{prefix}{}", self.suffix()))
    }

    pub fn fallback_name(self, element: ElementType) -> Option<String> {
        element
            .blas_prefix()
            .map(|prefix| format!("noblas_{prefix}{}", self.suffix()))
    }
}

impl fmt::Display for BlasRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl<'m, 'ctx> Runtime<'m, 'ctx> {
    pub fn gemv_function(
        &self,
        element: ElementType,
        use_blas: bool,
    ) -> EmitResult<FunctionValue<'ctx>> {
        self.blas_function(BlasRoutine::Gemv, element, use_blas)
    }

    pub fn gemm_function(
        &self,
        element: ElementType,
        use_blas: bool,
    ) -> EmitResult<FunctionValue<'ctx>> {
        self.blas_function(BlasRoutine::Gemm, element, use_blas)
    }

    pub fn blas_function_type(&self, routine: BlasRoutine, element: ElementType) -> FunctionType<'ctx> {
        self.module
            .function_type(VariableType::Int32, &routine.parameters(element))
    }

    fn blas_function(
        &self,
        routine: BlasRoutine,
        element: ElementType,
        use_blas: bool,
    ) -> EmitResult<FunctionValue<'ctx>> {
        let (Some(external), Some(fallback)) =
            (routine.external_name(element), routine.fallback_name(element))
        else {
            return Err(EmitterError::not_found(
                format!("{routine}<{element}>"),
                "BLAS routines exist only for float and double",
            ));
        };
        let fn_type = self.blas_function_type(routine, element);

        if use_blas {
            debug!(name = %external, "binding external BLAS routine");
            return self.module.declare_function(&external, fn_type);
        }

        if let Some(existing) = self.module.get_function(&fallback) {
            if existing.get_type() != fn_type || !is_defined(existing) {
                return Err(EmitterError::not_found(
                    fallback,
                    "an incompatible symbol already uses the fallback name",
                ));
            }
            debug!(name = %fallback, "reusing fallback kernel");
            return Ok(existing);
        }

        debug!(name = %fallback, "synthesizing fallback kernel");
        kernels::synthesize(self.module, routine, element, &fallback, fn_type)
    }

    /// `int openblas_get_num_threads(void)`
    pub fn blas_get_num_threads_function(&self) -> EmitResult<FunctionValue<'ctx>> {
        let fn_type = self.module.platform_int_type().fn_type(&[], false);
        self.module.declare_function(GET_NUM_THREADS, fn_type)
    }

    /// `void openblas_set_num_threads(int num_threads)`
    pub fn blas_set_num_threads_function(&self) -> EmitResult<FunctionValue<'ctx>> {
        let int_type = self.module.platform_int_type();
        let fn_type = self
            .module
            .context()
            .void_type()
            .fn_type(&[int_type.into()], false);
        self.module.declare_function(SET_NUM_THREADS, fn_type)
    }
}
