use super::Runtime;
use crate::{
    emitter::ElementType,
    error::{EmitResult, EmitterError},
};
use inkwell::{types::BasicType, values::FunctionValue};

impl<'m, 'ctx> Runtime<'m, 'ctx> {
    pub fn sqrt_function(&self, element: ElementType) -> EmitResult<FunctionValue<'ctx>> {
        self.intrinsic_function("llvm.sqrt", element)
    }

    pub fn abs_function(&self, element: ElementType) -> EmitResult<FunctionValue<'ctx>> {
        self.intrinsic_function("llvm.fabs", element)
    }

    pub fn exp_function(&self, element: ElementType) -> EmitResult<FunctionValue<'ctx>> {
        self.intrinsic_function("llvm.exp", element)
    }

    pub fn log_function(&self, element: ElementType) -> EmitResult<FunctionValue<'ctx>> {
        self.intrinsic_function("llvm.log", element)
    }

    pub fn sin_function(&self, element: ElementType) -> EmitResult<FunctionValue<'ctx>> {
        self.intrinsic_function("llvm.sin", element)
    }

    pub fn cos_function(&self, element: ElementType) -> EmitResult<FunctionValue<'ctx>> {
        self.intrinsic_function("llvm.cos", element)
    }

    /// LLVM has no tanh intrinsic, so this binds the C library's `tanh` or
    /// `tanhf`.
    pub fn tanh_function(&self, element: ElementType) -> EmitResult<FunctionValue<'ctx>> {
        let name = match element {
            ElementType::Double => "tanh",
            ElementType::Float => "tanhf",
            ElementType::Int32 | ElementType::Int64 => {
                return Err(EmitterError::not_found(
                    format!("tanh<{element}>"),
                    "tanh is only available for float and double",
                ))
            }
        };
        let value_type = self.module.element_type(element);
        let fn_type = value_type.fn_type(&[value_type.into()], false);
        self.module.declare_function(name, fn_type)
    }

    fn intrinsic_function(
        &self,
        intrinsic: &str,
        element: ElementType,
    ) -> EmitResult<FunctionValue<'ctx>> {
        if !element.is_floating_point() {
            return Err(EmitterError::not_found(
                format!("{intrinsic}<{element}>"),
                "math intrinsics are only available for float and double",
            ));
        }
        self.module
            .intrinsic(intrinsic, &[self.module.element_type(element)])
    }
}
