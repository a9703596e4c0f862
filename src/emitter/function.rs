use super::{
    module::ModuleEmitter,
    types::{ElementType, TypedOperator},
};
use crate::error::{EmitResult, EmitterError};
use inkwell::{
    basic_block::BasicBlock,
    builder::Builder,
    types::{BasicType, FloatType, IntType, StructType},
    values::{
        AnyValue, AnyValueEnum, BasicMetadataValueEnum, BasicValue, BasicValueEnum,
        CallSiteValue, FloatValue, FunctionValue, IntValue, PointerValue,
    },
    IntPredicate,
};

/// An open function scope. Each scope owns its builder, so a kernel can be
/// synthesized while another function is still being emitted.
pub struct FunctionEmitter<'m, 'ctx> {
    module: &'m ModuleEmitter<'ctx>,
    function: FunctionValue<'ctx>,
    builder: Builder<'ctx>,
    entry: BasicBlock<'ctx>,
}

impl<'m, 'ctx> FunctionEmitter<'m, 'ctx> {
    pub(super) fn new(module: &'m ModuleEmitter<'ctx>, function: FunctionValue<'ctx>) -> Self {
        let context = module.context();
        let entry = context.append_basic_block(function, "entry");
        let builder = context.create_builder();
        builder.position_at_end(entry);
        Self {
            module,
            function,
            builder,
            entry,
        }
    }

    pub fn function(&self) -> FunctionValue<'ctx> {
        self.function
    }

    pub fn name(&self) -> String {
        self.function.get_name().to_string_lossy().into_owned()
    }

    /// Runs the LLVM verifier over the finished body.
    pub fn finish(self) -> EmitResult<FunctionValue<'ctx>> {
        if self.function.verify(false) {
            Ok(self.function)
        } else {
            Err(EmitterError::InvalidFunction { name: self.name() })
        }
    }

    // Arguments

    pub fn argument(&self, index: u32) -> EmitResult<BasicValueEnum<'ctx>> {
        self.function
            .get_nth_param(index)
            .ok_or_else(|| self.unexpected_argument(index))
    }

    pub fn int_argument(&self, index: u32) -> EmitResult<IntValue<'ctx>> {
        match self.argument(index)? {
            BasicValueEnum::IntValue(value) => Ok(value),
            _ => Err(self.unexpected_argument(index)),
        }
    }

    pub fn float_argument(&self, index: u32) -> EmitResult<FloatValue<'ctx>> {
        match self.argument(index)? {
            BasicValueEnum::FloatValue(value) => Ok(value),
            _ => Err(self.unexpected_argument(index)),
        }
    }

    pub fn pointer_argument(&self, index: u32) -> EmitResult<PointerValue<'ctx>> {
        match self.argument(index)? {
            BasicValueEnum::PointerValue(value) => Ok(value),
            _ => Err(self.unexpected_argument(index)),
        }
    }

    fn unexpected_argument(&self, index: u32) -> EmitterError {
        EmitterError::UnexpectedArgument {
            function: self.name(),
            index,
        }
    }

    fn mismatch(&self, message: impl Into<String>) -> EmitterError {
        EmitterError::TypeMismatch {
            function: self.name(),
            message: message.into(),
        }
    }

    // Literals

    pub fn i32_literal(&self, value: i32) -> IntValue<'ctx> {
        self.module
            .context()
            .i32_type()
            .const_int(value as i64 as u64, true)
    }

    pub fn f64_literal(&self, value: f64) -> FloatValue<'ctx> {
        self.module.context().f64_type().const_float(value)
    }

    pub fn zero(&self, element: ElementType) -> BasicValueEnum<'ctx> {
        let context = self.module.context();
        match element {
            ElementType::Int32 => context.i32_type().const_zero().into(),
            ElementType::Int64 => context.i64_type().const_zero().into(),
            ElementType::Float => context.f32_type().const_zero().into(),
            ElementType::Double => context.f64_type().const_zero().into(),
        }
    }

    // Memory

    /// Stack slot allocated in the entry block.
    pub fn variable<T: BasicType<'ctx>>(&self, ty: T, name: &str) -> EmitResult<PointerValue<'ctx>> {
        let entry_builder = self.module.context().create_builder();
        match self.entry.get_first_instruction() {
            Some(first) => entry_builder.position_before(&first),
            None => entry_builder.position_at_end(self.entry),
        }
        Ok(entry_builder.build_alloca(ty, name)?)
    }

    pub fn load<T: BasicType<'ctx>>(
        &self,
        ty: T,
        ptr: PointerValue<'ctx>,
        name: &str,
    ) -> EmitResult<BasicValueEnum<'ctx>> {
        Ok(self.builder.build_load(ty, ptr, name)?)
    }

    pub fn load_int(
        &self,
        ty: IntType<'ctx>,
        ptr: PointerValue<'ctx>,
        name: &str,
    ) -> EmitResult<IntValue<'ctx>> {
        match self.load(ty, ptr, name)? {
            BasicValueEnum::IntValue(value) => Ok(value),
            _ => Err(self.mismatch("expected an integer load")),
        }
    }

    pub fn store<V: BasicValue<'ctx>>(&self, ptr: PointerValue<'ctx>, value: V) -> EmitResult<()> {
        self.builder.build_store(ptr, value)?;
        Ok(())
    }

    pub fn store_zero(&self, ptr: PointerValue<'ctx>, element: ElementType) -> EmitResult<()> {
        self.store(ptr, self.zero(element))
    }

    pub fn element_pointer(
        &self,
        array: PointerValue<'ctx>,
        element: ElementType,
        index: IntValue<'ctx>,
    ) -> EmitResult<PointerValue<'ctx>> {
        let ty = self.module.element_type(element);
        // Kernels trust their callers for bounds.
        let ptr = unsafe {
            self.builder
                .build_in_bounds_gep(ty, array, &[index], "elem_ptr")?
        };
        Ok(ptr)
    }

    pub fn load_element(
        &self,
        array: PointerValue<'ctx>,
        element: ElementType,
        index: IntValue<'ctx>,
    ) -> EmitResult<BasicValueEnum<'ctx>> {
        let ptr = self.element_pointer(array, element, index)?;
        self.load(self.module.element_type(element), ptr, "elem")
    }

    pub fn store_element(
        &self,
        array: PointerValue<'ctx>,
        element: ElementType,
        index: IntValue<'ctx>,
        value: BasicValueEnum<'ctx>,
    ) -> EmitResult<()> {
        let ptr = self.element_pointer(array, element, index)?;
        self.store(ptr, value)
    }

    pub fn struct_field(
        &self,
        struct_type: StructType<'ctx>,
        ptr: PointerValue<'ctx>,
        field: u32,
    ) -> EmitResult<PointerValue<'ctx>> {
        Ok(self
            .builder
            .build_struct_gep(struct_type, ptr, field, "field_ptr")?)
    }

    /// Sets `count` elements starting at `dest` to `byte`.
    pub fn memory_set(
        &self,
        dest: PointerValue<'ctx>,
        element: ElementType,
        count: IntValue<'ctx>,
        byte: u8,
    ) -> EmitResult<()> {
        let context = self.module.context();
        let i64_type = context.i64_type();
        let count = self
            .builder
            .build_int_s_extend_or_bit_cast(count, i64_type, "count")?;
        let size = self.builder.build_int_mul(
            count,
            i64_type.const_int(element.size_in_bytes(), false),
            "bytes",
        )?;
        let value = context.i8_type().const_int(byte as u64, false);
        self.builder
            .build_memset(dest, element.size_in_bytes() as u32, value, size)?;
        Ok(())
    }

    // Control flow

    /// Emits `for (i = 0; i < count; i++) body(i)`. Loops nest by calling
    /// `for_range` again from inside `body`.
    pub fn for_range<F>(&self, count: IntValue<'ctx>, mut body: F) -> EmitResult<()>
    where
        F: FnMut(&Self, IntValue<'ctx>) -> EmitResult<()>,
    {
        let context = self.module.context();
        let index_type = count.get_type();
        let counter = self.variable(index_type, "i")?;
        self.builder.build_store(counter, index_type.const_zero())?;

        let cond_block = context.append_basic_block(self.function, "for.cond");
        let body_block = context.append_basic_block(self.function, "for.body");
        let end_block = context.append_basic_block(self.function, "for.end");
        self.builder.build_unconditional_branch(cond_block)?;

        self.builder.position_at_end(cond_block);
        let index = self.load_int(index_type, counter, "i")?;
        let in_range = self
            .builder
            .build_int_compare(IntPredicate::SLT, index, count, "for.test")?;
        self.builder
            .build_conditional_branch(in_range, body_block, end_block)?;

        self.builder.position_at_end(body_block);
        body(self, index)?;
        let next = self
            .builder
            .build_int_add(index, index_type.const_int(1, false), "i.next")?;
        self.builder.build_store(counter, next)?;
        self.builder.build_unconditional_branch(cond_block)?;

        self.builder.position_at_end(end_block);
        Ok(())
    }

    // Arithmetic

    pub fn operator(
        &self,
        op: TypedOperator,
        lhs: BasicValueEnum<'ctx>,
        rhs: BasicValueEnum<'ctx>,
    ) -> EmitResult<BasicValueEnum<'ctx>> {
        match (lhs, rhs) {
            (BasicValueEnum::IntValue(lhs), BasicValueEnum::IntValue(rhs)) => {
                Ok(self.int_operator(op, lhs, rhs)?.into())
            }
            (BasicValueEnum::FloatValue(lhs), BasicValueEnum::FloatValue(rhs)) => {
                Ok(self.float_operator(op, lhs, rhs)?.into())
            }
            _ => Err(self.mismatch(format!("operands of {op:?} differ in kind"))),
        }
    }

    pub fn int_operator(
        &self,
        op: TypedOperator,
        lhs: IntValue<'ctx>,
        rhs: IntValue<'ctx>,
    ) -> EmitResult<IntValue<'ctx>> {
        let value = match op {
            TypedOperator::Add => self.builder.build_int_add(lhs, rhs, "add")?,
            TypedOperator::Subtract => self.builder.build_int_sub(lhs, rhs, "sub")?,
            TypedOperator::Multiply => self.builder.build_int_mul(lhs, rhs, "mul")?,
            TypedOperator::Divide => self.builder.build_int_signed_div(lhs, rhs, "div")?,
        };
        Ok(value)
    }

    pub fn float_operator(
        &self,
        op: TypedOperator,
        lhs: FloatValue<'ctx>,
        rhs: FloatValue<'ctx>,
    ) -> EmitResult<FloatValue<'ctx>> {
        let value = match op {
            TypedOperator::Add => self.builder.build_float_add(lhs, rhs, "fadd")?,
            TypedOperator::Subtract => self.builder.build_float_sub(lhs, rhs, "fsub")?,
            TypedOperator::Multiply => self.builder.build_float_mul(lhs, rhs, "fmul")?,
            TypedOperator::Divide => self.builder.build_float_div(lhs, rhs, "fdiv")?,
        };
        Ok(value)
    }

    pub fn int_add(&self, lhs: IntValue<'ctx>, rhs: IntValue<'ctx>) -> EmitResult<IntValue<'ctx>> {
        self.int_operator(TypedOperator::Add, lhs, rhs)
    }

    pub fn int_mul(&self, lhs: IntValue<'ctx>, rhs: IntValue<'ctx>) -> EmitResult<IntValue<'ctx>> {
        self.int_operator(TypedOperator::Multiply, lhs, rhs)
    }

    pub fn equals(&self, lhs: IntValue<'ctx>, rhs: IntValue<'ctx>) -> EmitResult<IntValue<'ctx>> {
        Ok(self
            .builder
            .build_int_compare(IntPredicate::EQ, lhs, rhs, "eq")?)
    }

    pub fn select_int(
        &self,
        condition: IntValue<'ctx>,
        then: IntValue<'ctx>,
        otherwise: IntValue<'ctx>,
    ) -> EmitResult<IntValue<'ctx>> {
        match self.builder.build_select(condition, then, otherwise, "sel")? {
            BasicValueEnum::IntValue(value) => Ok(value),
            _ => Err(self.mismatch("select over integers produced a non-integer")),
        }
    }

    pub fn cast_int_to_float(
        &self,
        value: IntValue<'ctx>,
        ty: FloatType<'ctx>,
        signed: bool,
    ) -> EmitResult<FloatValue<'ctx>> {
        let cast = if signed {
            self.builder.build_signed_int_to_float(value, ty, "itof")?
        } else {
            self.builder.build_unsigned_int_to_float(value, ty, "utof")?
        };
        Ok(cast)
    }

    pub fn cast_float_to_int(
        &self,
        value: FloatValue<'ctx>,
        ty: IntType<'ctx>,
    ) -> EmitResult<IntValue<'ctx>> {
        Ok(self.builder.build_float_to_signed_int(value, ty, "ftoi")?)
    }

    /// `*result = sum(left[i] * right[i] for i in 0..count)`.
    pub fn dot_product(
        &self,
        element: ElementType,
        count: IntValue<'ctx>,
        left: PointerValue<'ctx>,
        right: PointerValue<'ctx>,
        result: PointerValue<'ctx>,
    ) -> EmitResult<()> {
        let ty = self.module.element_type(element);
        let accumulator = self.variable(ty, "accum")?;
        self.store_zero(accumulator, element)?;
        self.for_range(count, |function, index| {
            let product = function.operator(
                TypedOperator::Multiply,
                function.load_element(left, element, index)?,
                function.load_element(right, element, index)?,
            )?;
            let sum = function.operator(
                TypedOperator::Add,
                function.load(ty, accumulator, "accum")?,
                product,
            )?;
            function.store(accumulator, sum)
        })?;
        let total = self.load(ty, accumulator, "accum")?;
        self.store(result, total)
    }

    // Calls

    pub fn call(
        &self,
        callee: FunctionValue<'ctx>,
        args: &[BasicMetadataValueEnum<'ctx>],
        name: &str,
    ) -> EmitResult<CallSiteValue<'ctx>> {
        Ok(self.builder.build_call(callee, args, name)?)
    }

    /// Calls a function returning `float` or `double` and yields the result.
    pub fn call_float(
        &self,
        callee: FunctionValue<'ctx>,
        args: &[BasicMetadataValueEnum<'ctx>],
        name: &str,
    ) -> EmitResult<FloatValue<'ctx>> {
        match self.call(callee, args, name)?.as_any_value_enum() {
            AnyValueEnum::FloatValue(value) => Ok(value),
            _ => Err(self.mismatch(format!(
                "`{}` does not return a floating point value",
                callee.get_name().to_string_lossy()
            ))),
        }
    }

    pub fn return_void(&self) -> EmitResult<()> {
        self.builder.build_return(None)?;
        Ok(())
    }

    pub fn return_value<V: BasicValue<'ctx>>(&self, value: V) -> EmitResult<()> {
        self.builder.build_return(Some(&value))?;
        Ok(())
    }
}
