use super::*;
use crate::{
    config::CompilerOptions,
    emitter::{is_defined, TypedOperator, VariableType},
    target::{ClockSource, TargetDevice},
};
use inkwell::context::Context;

fn module_with<'ctx>(context: &'ctx Context, options: CompilerOptions) -> ModuleEmitter<'ctx> {
    ModuleEmitter::new(context, "model", options)
}

fn posix_module(context: &Context) -> ModuleEmitter<'_> {
    module_with(
        context,
        CompilerOptions::for_target(TargetDevice::host().with_clock(ClockSource::Posix)),
    )
}

fn counter_module(context: &Context) -> ModuleEmitter<'_> {
    module_with(
        context,
        CompilerOptions::for_target(
            TargetDevice::host().with_clock(ClockSource::PerformanceCounter),
        ),
    )
}

fn name_of(function: FunctionValue<'_>) -> String {
    function.get_name().to_string_lossy().into_owned()
}

#[test]
fn dot_product_is_named_by_type_and_memoized() {
    let context = Context::create();
    let module = posix_module(&context);
    let runtime = Runtime::new(&module);

    let doubles = runtime
        .dot_product_function(ElementType::Double)
        .expect("double dot product");
    let ints = runtime
        .dot_product_function(ElementType::Int32)
        .expect("int dot product");
    assert_eq!(name_of(doubles), "model_DotProductFloat");
    assert_eq!(name_of(ints), "model_DotProductInt");
    assert!(is_defined(doubles));
    assert_eq!(doubles.count_params(), 4);

    let count = module.function_count();
    let again = runtime
        .dot_product_function(ElementType::Double)
        .expect("memoized dot product");
    assert_eq!(again, doubles);
    assert_eq!(module.function_count(), count);

    let header = module.header_functions();
    assert!(header.contains(&"model_DotProductFloat".to_string()));
    assert!(header.contains(&"model_DotProductInt".to_string()));
    module.verify().expect("module verifies");
}

#[test]
fn dot_product_is_shared_between_runtimes() {
    let context = Context::create();
    let module = posix_module(&context);
    let first = Runtime::new(&module)
        .dot_product_function(ElementType::Float)
        .expect("first");
    let second = Runtime::new(&module)
        .dot_product_function(ElementType::Float)
        .expect("second");
    assert_eq!(first, second);
    assert_eq!(name_of(first), "model_DotProductSingle");
}

#[test]
fn external_blas_is_declared_without_a_body() {
    let context = Context::create();
    let module = posix_module(&context);
    let runtime = Runtime::new(&module);

    let gemv = runtime
        .gemv_function(ElementType::Double, true)
        .expect("external gemv");
    assert_eq!(name_of(gemv), "cblas_dgemv");
    assert!(!is_defined(gemv));
    assert_eq!(gemv.count_params(), 12);

    let gemm = runtime
        .gemm_function(ElementType::Float, true)
        .expect("external gemm");
    assert_eq!(name_of(gemm), "cblas_sgemm");
    assert!(!is_defined(gemm));
    assert_eq!(gemm.count_params(), 14);

    let count = module.function_count();
    assert_eq!(
        runtime.gemm_function(ElementType::Float, true).expect("again"),
        gemm
    );
    assert_eq!(module.function_count(), count);
}

#[test]
fn fallback_blas_is_synthesized_once() {
    let context = Context::create();
    let module = posix_module(&context);
    let runtime = Runtime::new(&module);

    let gemv = runtime
        .gemv_function(ElementType::Float, false)
        .expect("fallback gemv");
    let gemm = runtime
        .gemm_function(ElementType::Double, false)
        .expect("fallback gemm");
    assert_eq!(name_of(gemv), "noblas_sgemv");
    assert_eq!(name_of(gemm), "noblas_dgemm");
    assert!(is_defined(gemv));
    assert!(is_defined(gemm));

    let count = module.function_count();
    assert_eq!(
        runtime.gemv_function(ElementType::Float, false).expect("again"),
        gemv
    );
    assert_eq!(module.function_count(), count);
    assert!(module.header_functions().is_empty());
    module.verify().expect("module verifies");
}

#[test]
fn external_and_fallback_share_a_signature() {
    let context = Context::create();
    let module = posix_module(&context);
    let runtime = Runtime::new(&module);
    for element in [ElementType::Float, ElementType::Double] {
        let external = runtime.gemm_function(element, true).expect("external");
        let fallback = runtime.gemm_function(element, false).expect("fallback");
        assert_eq!(external.get_type(), fallback.get_type());

        let external = runtime.gemv_function(element, true).expect("external");
        let fallback = runtime.gemv_function(element, false).expect("fallback");
        assert_eq!(external.get_type(), fallback.get_type());
    }
}

#[test]
fn integer_blas_is_rejected_without_side_effects() {
    let context = Context::create();
    let module = posix_module(&context);
    let runtime = Runtime::new(&module);
    for element in [ElementType::Int32, ElementType::Int64] {
        for use_blas in [true, false] {
            let err = runtime.gemv_function(element, use_blas).unwrap_err();
            assert!(err.is_function_not_found());
            let err = runtime.gemm_function(element, use_blas).unwrap_err();
            assert!(err.is_function_not_found());
        }
    }
    assert_eq!(module.function_count(), 0);
}

#[test]
fn conflicting_fallback_symbol_is_reported() {
    let context = Context::create();
    let module = posix_module(&context);
    let ty = module.function_type(VariableType::Void, &[]);
    module
        .declare_function("noblas_dgemv", ty)
        .expect("unrelated declaration");

    let err = Runtime::new(&module)
        .gemv_function(ElementType::Double, false)
        .unwrap_err();
    assert!(err.is_function_not_found());
    assert_eq!(module.function_count(), 1);
}

#[test]
fn math_intrinsics_are_type_specialized() {
    let context = Context::create();
    let module = posix_module(&context);
    let runtime = Runtime::new(&module);

    let sqrt = runtime.sqrt_function(ElementType::Double).expect("sqrt");
    let abs = runtime.abs_function(ElementType::Float).expect("abs");
    assert_eq!(name_of(sqrt), "llvm.sqrt.f64");
    assert_eq!(name_of(abs), "llvm.fabs.f32");
    assert_eq!(
        name_of(runtime.exp_function(ElementType::Double).expect("exp")),
        "llvm.exp.f64"
    );
    assert_eq!(
        name_of(runtime.log_function(ElementType::Float).expect("log")),
        "llvm.log.f32"
    );
    assert_eq!(
        name_of(runtime.sin_function(ElementType::Double).expect("sin")),
        "llvm.sin.f64"
    );
    assert_eq!(
        name_of(runtime.cos_function(ElementType::Double).expect("cos")),
        "llvm.cos.f64"
    );
    assert_eq!(
        runtime.sqrt_function(ElementType::Double).expect("sqrt again"),
        sqrt
    );
}

#[test]
fn math_on_integers_is_rejected_without_side_effects() {
    let context = Context::create();
    let module = posix_module(&context);
    let runtime = Runtime::new(&module);
    for element in [ElementType::Int32, ElementType::Int64] {
        assert!(runtime.sqrt_function(element).unwrap_err().is_function_not_found());
        assert!(runtime.abs_function(element).unwrap_err().is_function_not_found());
        assert!(runtime.exp_function(element).unwrap_err().is_function_not_found());
        assert!(runtime.tanh_function(element).unwrap_err().is_function_not_found());
    }
    assert_eq!(module.function_count(), 0);
}

#[test]
fn tanh_binds_the_c_library() {
    let context = Context::create();
    let module = posix_module(&context);
    let runtime = Runtime::new(&module);

    let tanh = runtime.tanh_function(ElementType::Double).expect("tanh");
    let tanhf = runtime.tanh_function(ElementType::Float).expect("tanhf");
    assert_eq!(name_of(tanh), "tanh");
    assert_eq!(name_of(tanhf), "tanhf");
    assert!(!is_defined(tanh));
    assert_eq!(
        runtime.tanh_function(ElementType::Double).expect("again"),
        tanh
    );
}

#[test]
fn tanh_with_a_conflicting_declaration_fails() {
    let context = Context::create();
    let module = posix_module(&context);
    let f32_type = context.f32_type();
    module
        .declare_function("tanh", f32_type.fn_type(&[f32_type.into()], false))
        .expect("conflicting tanh");
    let err = Runtime::new(&module)
        .tanh_function(ElementType::Double)
        .unwrap_err();
    assert!(err.is_function_not_found());
}

#[test]
fn openblas_thread_controls_use_the_platform_int() {
    let context = Context::create();
    let module = posix_module(&context);
    let runtime = Runtime::new(&module);

    let get = runtime.blas_get_num_threads_function().expect("get");
    let set = runtime.blas_set_num_threads_function().expect("set");
    assert_eq!(name_of(get), "openblas_get_num_threads");
    assert_eq!(name_of(set), "openblas_set_num_threads");
    assert_eq!(get.count_params(), 0);
    assert_eq!(set.count_params(), 1);
    assert!(set.get_type().get_return_type().is_none());
    assert_eq!(
        get.get_type().get_return_type(),
        Some(context.i32_type().into())
    );

    let wide = module_with(
        &context,
        CompilerOptions::for_target(TargetDevice::host().with_num_bits(64)),
    );
    let get = Runtime::new(&wide)
        .blas_get_num_threads_function()
        .expect("get");
    assert_eq!(
        get.get_type().get_return_type(),
        Some(context.i64_type().into())
    );
}

#[test]
fn posix_time_binds_clock_gettime() {
    let context = Context::create();
    let module = posix_module(&context);
    let mut runtime = Runtime::new(&module);

    let get_time = runtime.current_time_function().expect("GetTime");
    assert_eq!(name_of(get_time), "model_GetTime");
    assert!(is_defined(get_time));
    assert_eq!(get_time.count_params(), 0);
    assert_eq!(
        get_time.get_type().get_return_type(),
        Some(context.f64_type().into())
    );

    let clock = module.get_function(CLOCK_GETTIME).expect("clock_gettime");
    assert!(!is_defined(clock));
    assert!(module.get_function(QUERY_PERFORMANCE_COUNTER).is_none());
    assert_eq!(
        module.header_functions(),
        vec!["model_GetTime".to_string()]
    );
    module.verify().expect("module verifies");
}

#[test]
fn time_function_is_cached_across_other_resolutions() {
    let context = Context::create();
    let module = posix_module(&context);
    let mut runtime = Runtime::new(&module);

    let first = runtime.current_time_function().expect("first");
    runtime
        .gemm_function(ElementType::Double, false)
        .expect("gemm");
    runtime.sqrt_function(ElementType::Float).expect("sqrt");
    let count = module.function_count();
    let second = runtime
        .resolve(Primitive::CurrentTime, ElementType::Double, false)
        .expect("second");
    assert_eq!(first, second);
    assert_eq!(module.function_count(), count);

    let third = Runtime::new(&module)
        .current_time_function()
        .expect("fresh runtime");
    assert_eq!(first, third);
}

#[test]
fn performance_counter_time_defines_a_clock_shim() {
    let context = Context::create();
    let module = counter_module(&context);
    let mut runtime = Runtime::new(&module);

    runtime.current_time_function().expect("GetTime");
    let clock = module.get_function(CLOCK_GETTIME).expect("clock_gettime");
    assert!(is_defined(clock));
    let counter = module
        .get_function(QUERY_PERFORMANCE_COUNTER)
        .expect("QueryPerformanceCounter");
    let frequency = module
        .get_function(QUERY_PERFORMANCE_FREQUENCY)
        .expect("QueryPerformanceFrequency");
    assert!(!is_defined(counter));
    assert!(!is_defined(frequency));
    assert!(!module
        .header_functions()
        .contains(&CLOCK_GETTIME.to_string()));
    module.verify().expect("module verifies");
}

#[test]
fn performance_counter_rejects_an_external_clock() {
    let context = Context::create();
    let module = counter_module(&context);
    let clock_type = module.function_type(
        VariableType::Int32,
        &[VariableType::Int32, VariableType::Int32Pointer],
    );
    module
        .declare_function(CLOCK_GETTIME, clock_type)
        .expect("external clock");

    let err = Runtime::new(&module).current_time_function().unwrap_err();
    assert!(err.is_function_not_found());
    assert!(module.get_function("model_GetTime").is_none());
}

#[test]
fn timespec_fields_follow_pointer_width() {
    let context = Context::create();
    let narrow = module_with(
        &context,
        CompilerOptions::for_target(TargetDevice::host().with_num_bits(32)),
    );
    let wide = module_with(
        &context,
        CompilerOptions::for_target(TargetDevice::host().with_num_bits(64)),
    );
    let narrow = Runtime::new(&narrow).timespec_type();
    let wide = Runtime::new(&wide).timespec_type();
    assert_eq!(narrow.count_fields(), 2);
    assert_eq!(
        narrow.get_field_type_at_index(0),
        Some(context.i32_type().into())
    );
    assert_eq!(
        wide.get_field_type_at_index(1),
        Some(context.i64_type().into())
    );
}

#[test]
fn resolve_dispatches_every_primitive() {
    let context = Context::create();
    let module = posix_module(&context);
    let mut runtime = Runtime::new(&module);

    let cases = [
        (Primitive::DotProduct, "model_DotProductFloat"),
        (Primitive::Gemv, "noblas_dgemv"),
        (Primitive::Gemm, "noblas_dgemm"),
        (Primitive::Sqrt, "llvm.sqrt.f64"),
        (Primitive::Abs, "llvm.fabs.f64"),
        (Primitive::Exp, "llvm.exp.f64"),
        (Primitive::Log, "llvm.log.f64"),
        (Primitive::Sin, "llvm.sin.f64"),
        (Primitive::Cos, "llvm.cos.f64"),
        (Primitive::Tanh, "tanh"),
        (Primitive::CurrentTime, "model_GetTime"),
        (Primitive::BlasGetNumThreads, "openblas_get_num_threads"),
        (Primitive::BlasSetNumThreads, "openblas_set_num_threads"),
    ];
    for (primitive, expected) in cases {
        let function = runtime
            .resolve(primitive, ElementType::Double, false)
            .unwrap_or_else(|err| panic!("{primitive}: {err}"));
        assert_eq!(name_of(function), expected, "{primitive}");
    }

    let external = runtime
        .resolve(Primitive::Gemm, ElementType::Double, true)
        .expect("external gemm");
    assert_eq!(name_of(external), "cblas_dgemm");
    module.verify().expect("module verifies");
}

#[test]
fn conflicting_counter_declaration_leaves_the_module_untouched() {
    let context = Context::create();
    let module = counter_module(&context);
    let ty = module.function_type(VariableType::Void, &[]);
    module
        .declare_function(QUERY_PERFORMANCE_FREQUENCY, ty)
        .expect("unrelated declaration");
    let count = module.function_count();

    let mut runtime = Runtime::new(&module);
    let err = runtime.current_time_function().unwrap_err();
    assert!(err.is_function_not_found());
    assert_eq!(module.function_count(), count);
    assert!(module.get_function(QUERY_PERFORMANCE_COUNTER).is_none());
    assert!(module.get_function(CLOCK_GETTIME).is_none());
    assert!(module.header_functions().is_empty());
}

#[test]
fn conflicting_clock_declaration_leaves_the_module_untouched() {
    let context = Context::create();
    let module = posix_module(&context);
    let ty = module.function_type(VariableType::Void, &[]);
    module
        .declare_function(CLOCK_GETTIME, ty)
        .expect("unrelated declaration");

    let err = Runtime::new(&module).current_time_function().unwrap_err();
    assert!(err.is_function_not_found());
    assert_eq!(module.function_count(), 1);
    assert!(module.get_function("model_GetTime").is_none());
}

#[test]
fn declared_dot_product_name_is_not_reused() {
    let context = Context::create();
    let module = posix_module(&context);
    let ty = module.function_type(VariableType::Void, &[]);
    module
        .declare_function("model_DotProductFloat", ty)
        .expect("unrelated declaration");

    let err = Runtime::new(&module)
        .dot_product_function(ElementType::Double)
        .unwrap_err();
    assert!(err.is_function_not_found());
    assert_eq!(module.function_count(), 1);
    assert!(module.header_functions().is_empty());
}

#[test]
fn extern_dot_product_with_the_right_signature_is_not_reused() {
    let context = Context::create();
    let module = posix_module(&context);
    let array = ElementType::Int32.pointer();
    let ty = module.function_type(
        VariableType::Void,
        &[VariableType::Int32, array, array, array],
    );
    module
        .declare_function("model_DotProductInt", ty)
        .expect("extern declaration");

    let err = Runtime::new(&module)
        .dot_product_function(ElementType::Int32)
        .unwrap_err();
    assert!(err.is_function_not_found());
}

#[test]
fn declared_time_accessor_is_not_cached() {
    let context = Context::create();
    let module = posix_module(&context);
    let ty = module.function_type(VariableType::Void, &[]);
    module
        .declare_function("model_GetTime", ty)
        .expect("unrelated declaration");

    let mut runtime = Runtime::new(&module);
    for _ in 0..2 {
        let err = runtime.current_time_function().unwrap_err();
        assert!(err.is_function_not_found());
    }
    assert_eq!(module.function_count(), 1);
    assert!(module.get_function(CLOCK_GETTIME).is_none());
}

#[test]
fn default_resolution_follows_the_use_blas_option() {
    let context = Context::create();
    let mut options = CompilerOptions::for_target(TargetDevice::host());
    options.use_blas = true;
    let external = module_with(&context, options);
    let gemv = Runtime::new(&external)
        .resolve_with_defaults(Primitive::Gemv, ElementType::Float)
        .expect("external gemv");
    assert_eq!(name_of(gemv), "cblas_sgemv");
    assert!(!is_defined(gemv));

    let fallback = posix_module(&context);
    let gemv = Runtime::new(&fallback)
        .resolve_with_defaults(Primitive::Gemv, ElementType::Float)
        .expect("fallback gemv");
    assert_eq!(name_of(gemv), "noblas_sgemv");
    assert!(is_defined(gemv));
}

#[test]
fn current_time_can_be_read_inside_another_function() {
    let context = Context::create();
    let module = posix_module(&context);
    let mut runtime = Runtime::new(&module);
    let ty = module.function_type(VariableType::Double, &[]);

    let elapsed = module
        .emit_function("elapsed", ty, |function| {
            let start = runtime.emit_current_time(function)?;
            let end = runtime.emit_current_time(function)?;
            let delta = function.float_operator(TypedOperator::Subtract, end, start)?;
            function.return_value(delta)
        })
        .expect("elapsed");
    assert!(is_defined(elapsed));

    let get_time = module.get_function("model_GetTime").expect("GetTime");
    assert_eq!(runtime.current_time_function().expect("cached"), get_time);
    let ir = module.print_to_string();
    assert_eq!(ir.matches("call double @model_GetTime()").count(), 2);
    module.verify().expect("module verifies");
}
