//! Executes synthesized runtime functions through the MCJIT engine.

use crate::emitter::{ElementType, ModuleEmitter};
use inkwell::{
    execution_engine::ExecutionEngine,
    targets::{InitializationConfig, Target},
    OptimizationLevel,
};
use std::{fmt::Debug, mem, ops, sync::Once};


fn init_native() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        Target::initialize_native(&InitializationConfig::default())
            .expect("native target initializes");
        ExecutionEngine::link_in_mc_jit();
    });
}

/// Hands the module to a JIT engine. Emit everything before calling this.
fn jit<'ctx>(module: &ModuleEmitter<'ctx>) -> ExecutionEngine<'ctx> {
    init_native();
    module.verify().expect("module verifies");
    module
        .llvm_module()
        .create_jit_execution_engine(OptimizationLevel::None)
        .expect("jit engine")
}

/// Looks up `name` and reinterprets its address as the fn pointer `F`.
///
/// # Safety
/// `F` must match the emitted signature of `name`.
unsafe fn lookup<F: Copy>(engine: &ExecutionEngine<'_>, name: &str) -> F {
    assert_eq!(mem::size_of::<F>(), mem::size_of::<usize>());
    let address = engine
        .get_function_address(name)
        .unwrap_or_else(|err| panic!("{name}: {err:?}"));
    mem::transmute_copy(&address)
}

trait Scalar:
    Copy + Debug + Default + PartialEq + From<i8> + ops::Add<Output = Self> + ops::Mul<Output = Self>
{
    const ELEMENT: ElementType;
}

impl Scalar for f32 {
    const ELEMENT: ElementType = ElementType::Float;
}

impl Scalar for f64 {
    const ELEMENT: ElementType = ElementType::Double;
}
