//! Portable reference bodies for GEMV, GEMM and dot product.
//!
//! These are correctness fallbacks for builds without a BLAS library. The
//! GEMV and GEMM kernels take the full CBLAS argument list but compute the
//! plain row-major product: `order`, `alpha` and `beta` are ignored, and GEMV
//! also ignores `trans`.

use super::{blas::BlasRoutine, CBLAS_TRANS};
use crate::{
    emitter::{ElementType, FunctionEmitter, ModuleEmitter, TypedOperator, VariableType},
    error::EmitResult,
};
use inkwell::{
    types::FunctionType,
    values::{FunctionValue, IntValue},
};

pub(super) fn synthesize<'ctx>(
    module: &ModuleEmitter<'ctx>,
    routine: BlasRoutine,
    element: ElementType,
    name: &str,
    fn_type: FunctionType<'ctx>,
) -> EmitResult<FunctionValue<'ctx>> {
    match routine {
        BlasRoutine::Gemv => emit_gemv(module, name, fn_type, element),
        BlasRoutine::Gemm => emit_gemm(module, name, fn_type, element),
    }
}

/// `major * stride + minor`
fn linear_offset<'ctx>(
    function: &FunctionEmitter<'_, 'ctx>,
    major: IntValue<'ctx>,
    stride: IntValue<'ctx>,
    minor: IntValue<'ctx>,
) -> EmitResult<IntValue<'ctx>> {
    function.int_add(function.int_mul(major, stride)?, minor)
}

/// `y[r * incy] = sum(A[r * lda + c] * x[c * incx] for c in 0..n)` for every
/// row `r` in `0..m`.
fn emit_gemv<'ctx>(
    module: &ModuleEmitter<'ctx>,
    name: &str,
    fn_type: FunctionType<'ctx>,
    element: ElementType,
) -> EmitResult<FunctionValue<'ctx>> {
    let value_type = module.element_type(element);
    module.emit_function(name, fn_type, |function| {
        let m = function.int_argument(2)?;
        let n = function.int_argument(3)?;
        let a = function.pointer_argument(5)?;
        let lda = function.int_argument(6)?;
        let x = function.pointer_argument(7)?;
        let incx = function.int_argument(8)?;
        let y = function.pointer_argument(10)?;
        let incy = function.int_argument(11)?;

        let accum = function.variable(value_type, "accum")?;
        function.for_range(m, |function, row| {
            function.store_zero(accum, element)?;
            function.for_range(n, |function, column| {
                let a_index = linear_offset(function, row, lda, column)?;
                let x_index = function.int_mul(column, incx)?;
                let product = function.operator(
                    TypedOperator::Multiply,
                    function.load_element(a, element, a_index)?,
                    function.load_element(x, element, x_index)?,
                )?;
                let sum = function.operator(
                    TypedOperator::Add,
                    function.load(value_type, accum, "accum")?,
                    product,
                )?;
                function.store(accum, sum)
            })?;
            let y_index = function.int_mul(row, incy)?;
            let total = function.load(value_type, accum, "accum")?;
            function.store_element(y, element, y_index, total)
        })?;

        function.return_value(function.i32_literal(0))
    })
}

/// `C = A * B` with A: m x k, B: k x n, C: m x n, all row-major.
///
/// C is cleared first (`m * ldc` elements), then partial products are
/// accumulated in i, k, j order so the inner loop walks a row of C.
fn emit_gemm<'ctx>(
    module: &ModuleEmitter<'ctx>,
    name: &str,
    fn_type: FunctionType<'ctx>,
    element: ElementType,
) -> EmitResult<FunctionValue<'ctx>> {
    module.emit_function(name, fn_type, |function| {
        let transposed = function.i32_literal(CBLAS_TRANS);
        let transpose_a = function.equals(function.int_argument(1)?, transposed)?;
        let transpose_b = function.equals(function.int_argument(2)?, transposed)?;
        let m = function.int_argument(3)?;
        let n = function.int_argument(4)?;
        let k = function.int_argument(5)?;
        let a = function.pointer_argument(7)?;
        let lda = function.int_argument(8)?;
        let b = function.pointer_argument(9)?;
        let ldb = function.int_argument(10)?;
        let c = function.pointer_argument(12)?;
        let ldc = function.int_argument(13)?;

        let count = function.int_mul(ldc, m)?;
        function.memory_set(c, element, count, 0)?;

        function.for_range(m, |function, i| {
            function.for_range(k, |function, t| {
                function.for_range(n, |function, j| {
                    let a_offset = function.select_int(
                        transpose_a,
                        linear_offset(function, t, lda, i)?,
                        linear_offset(function, i, lda, t)?,
                    )?;
                    let b_offset = function.select_int(
                        transpose_b,
                        linear_offset(function, j, ldb, t)?,
                        linear_offset(function, t, ldb, j)?,
                    )?;
                    let c_offset = linear_offset(function, i, ldc, j)?;

                    let product = function.operator(
                        TypedOperator::Multiply,
                        function.load_element(a, element, a_offset)?,
                        function.load_element(b, element, b_offset)?,
                    )?;
                    let sum = function.operator(
                        TypedOperator::Add,
                        function.load_element(c, element, c_offset)?,
                        product,
                    )?;
                    function.store_element(c, element, c_offset, sum)
                })
            })
        })?;

        function.return_value(function.i32_literal(0))
    })
}

pub(super) fn dot_product_type<'ctx>(
    module: &ModuleEmitter<'ctx>,
    element: ElementType,
) -> FunctionType<'ctx> {
    let array = element.pointer();
    module.function_type(
        VariableType::Void,
        &[VariableType::Int32, array, array, array],
    )
}

pub(super) fn emit_dot_product<'ctx>(
    module: &ModuleEmitter<'ctx>,
    name: &str,
    fn_type: FunctionType<'ctx>,
    element: ElementType,
) -> EmitResult<FunctionValue<'ctx>> {
    let function = module.emit_function(name, fn_type, |function| {
        let count = function.int_argument(0)?;
        let left = function.pointer_argument(1)?;
        let right = function.pointer_argument(2)?;
        let result = function.pointer_argument(3)?;
        function.dot_product(element, count, left, right, result)?;
        function.return_void()
    })?;
    module.include_in_header(function);
    Ok(function)
}
