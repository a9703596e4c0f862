use super::{
    function::FunctionEmitter,
    types::{ElementType, VariableType},
};
use crate::{
    config::CompilerOptions,
    error::{EmitResult, EmitterError},
};
use inkwell::{
    context::Context,
    intrinsics::Intrinsic,
    module::{Linkage, Module},
    targets::TargetTriple,
    types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, IntType, PointerType},
    values::FunctionValue,
    AddressSpace,
};
use std::{cell::RefCell, collections::HashSet, io, path::Path};
use tracing::trace;

/// Owns the LLVM module that runtime functions are emitted into.
///
/// The module name doubles as the namespace prefix of public symbols.
pub struct ModuleEmitter<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    name: String,
    options: CompilerOptions,
    header_functions: RefCell<Vec<String>>,
}

impl<'ctx> ModuleEmitter<'ctx> {
    pub fn new(context: &'ctx Context, name: &str, options: CompilerOptions) -> Self {
        let module = context.create_module(name);
        if let Some(triple) = &options.target_device.triple {
            module.set_triple(&TargetTriple::create(triple));
        }
        Self {
            context,
            module,
            name: name.to_string(),
            options,
            header_functions: RefCell::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    pub fn llvm_module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn module_name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// `int` of the target: `iN` for an explicit pointer width, else `i32`.
    pub fn platform_int_type(&self) -> IntType<'ctx> {
        match self.options.target_device.num_bits {
            0 => self.context.i32_type(),
            bits => self.context.custom_width_int_type(bits),
        }
    }

    pub fn pointer_type(&self) -> PointerType<'ctx> {
        self.context.ptr_type(AddressSpace::default())
    }

    pub fn element_type(&self, element: ElementType) -> BasicTypeEnum<'ctx> {
        match element {
            ElementType::Int32 => self.context.i32_type().into(),
            ElementType::Int64 => self.context.i64_type().into(),
            ElementType::Float => self.context.f32_type().into(),
            ElementType::Double => self.context.f64_type().into(),
        }
    }

    pub fn basic_type(&self, ty: VariableType) -> Option<BasicTypeEnum<'ctx>> {
        match ty {
            VariableType::Void => None,
            VariableType::Int32 => Some(self.element_type(ElementType::Int32)),
            VariableType::Int64 => Some(self.element_type(ElementType::Int64)),
            VariableType::Float => Some(self.element_type(ElementType::Float)),
            VariableType::Double => Some(self.element_type(ElementType::Double)),
            VariableType::Int32Pointer
            | VariableType::Int64Pointer
            | VariableType::FloatPointer
            | VariableType::DoublePointer => Some(self.pointer_type().into()),
        }
    }

    /// Builds a signature; `Void` entries in `params` are skipped.
    pub fn function_type(&self, ret: VariableType, params: &[VariableType]) -> FunctionType<'ctx> {
        let params: Vec<BasicMetadataTypeEnum<'ctx>> = params
            .iter()
            .filter_map(|param| self.basic_type(*param))
            .map(Into::into)
            .collect();
        match self.basic_type(ret) {
            Some(ret) => ret.fn_type(&params, false),
            None => self.context.void_type().fn_type(&params, false),
        }
    }

    pub fn get_function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.module.get_function(name)
    }

    pub fn function_count(&self) -> usize {
        self.module.get_functions().count()
    }

    /// Declares an external function, or returns the existing symbol when
    /// its signature matches.
    pub fn declare_function(
        &self,
        name: &str,
        fn_type: FunctionType<'ctx>,
    ) -> EmitResult<FunctionValue<'ctx>> {
        if let Some(existing) = self.module.get_function(name) {
            if existing.get_type() != fn_type {
                return Err(EmitterError::not_found(
                    name,
                    "an existing symbol has a different signature",
                ));
            }
            return Ok(existing);
        }
        trace!(name, "declaring external function");
        Ok(self
            .module
            .add_function(name, fn_type, Some(Linkage::External)))
    }

    pub fn begin_function(
        &self,
        name: &str,
        ret: VariableType,
        params: &[VariableType],
    ) -> EmitResult<FunctionEmitter<'_, 'ctx>> {
        self.begin_function_with_type(name, self.function_type(ret, params))
    }

    pub fn begin_function_with_type(
        &self,
        name: &str,
        fn_type: FunctionType<'ctx>,
    ) -> EmitResult<FunctionEmitter<'_, 'ctx>> {
        if self.module.get_function(name).is_some() {
            return Err(EmitterError::DuplicateFunction {
                name: name.to_string(),
            });
        }
        trace!(name, "defining function");
        let function = self
            .module
            .add_function(name, fn_type, Some(Linkage::External));
        Ok(FunctionEmitter::new(self, function))
    }

    /// Defines `name` with the body produced by `body`. On failure the
    /// partially built function is removed from the module.
    pub fn emit_function<F>(
        &self,
        name: &str,
        fn_type: FunctionType<'ctx>,
        body: F,
    ) -> EmitResult<FunctionValue<'ctx>>
    where
        F: FnOnce(&FunctionEmitter<'_, 'ctx>) -> EmitResult<()>,
    {
        let emitter = self.begin_function_with_type(name, fn_type)?;
        let handle = emitter.function();
        let result = body(&emitter).and_then(|()| emitter.finish());
        if result.is_err() {
            unsafe { handle.delete() };
        }
        result
    }

    /// Runs `build`, and when it fails deletes every function it added so the
    /// module is left as it was.
    pub fn with_rollback<T, F>(&self, build: F) -> EmitResult<T>
    where
        F: FnOnce() -> EmitResult<T>,
    {
        let existing: HashSet<String> =
            self.module.get_functions().map(function_name).collect();
        let result = build();
        if result.is_err() {
            let added: Vec<FunctionValue<'ctx>> = self
                .module
                .get_functions()
                .filter(|function| !existing.contains(&function_name(*function)))
                .collect();
            // Callers are created after their callees.
            for function in added.into_iter().rev() {
                trace!(name = %function_name(function), "rolling back function");
                unsafe { function.delete() };
            }
            self.header_functions
                .borrow_mut()
                .retain(|name| existing.contains(name));
        }
        result
    }

    pub fn intrinsic(
        &self,
        name: &str,
        types: &[BasicTypeEnum<'ctx>],
    ) -> EmitResult<FunctionValue<'ctx>> {
        Intrinsic::find(name)
            .and_then(|intrinsic| intrinsic.get_declaration(&self.module, types))
            .ok_or_else(|| EmitterError::not_found(name, "unknown LLVM intrinsic"))
    }

    pub fn include_in_header(&self, function: FunctionValue<'ctx>) {
        let name = function_name(function);
        let mut header = self.header_functions.borrow_mut();
        if !header.contains(&name) {
            header.push(name);
        }
    }

    pub fn header_functions(&self) -> Vec<String> {
        self.header_functions.borrow().clone()
    }

    pub fn verify(&self) -> EmitResult<()> {
        self.module
            .verify()
            .map_err(|message| EmitterError::InvalidModule {
                name: self.name.clone(),
                message: message.to_string(),
            })
    }

    pub fn print_to_string(&self) -> String {
        self.module.print_to_string().to_string()
    }

    pub fn write_ir_to<P: AsRef<Path>>(&self, path: P) -> EmitResult<()> {
        let path = path.as_ref();
        self.module
            .print_to_file(path)
            .map_err(|message| EmitterError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, message.to_string()),
            })
    }
}

fn function_name(function: FunctionValue<'_>) -> String {
    function.get_name().to_string_lossy().into_owned()
}

/// Whether `function` carries a body in this module.
pub fn is_defined(function: FunctionValue<'_>) -> bool {
    function.count_basic_blocks() > 0
}
