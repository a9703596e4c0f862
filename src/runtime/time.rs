use super::Runtime;
use crate::{
    emitter::{is_defined, FunctionEmitter, TypedOperator},
    error::{EmitResult, EmitterError},
    target::ClockSource,
};
use inkwell::{
    types::{FunctionType, IntType, StructType},
    values::{FloatValue, FunctionValue},
};
use tracing::debug;

pub const CLOCK_GETTIME: &str = "clock_gettime";
pub const QUERY_PERFORMANCE_COUNTER: &str = "QueryPerformanceCounter";
pub const QUERY_PERFORMANCE_FREQUENCY: &str = "QueryPerformanceFrequency";
pub const CLOCK_REALTIME: i32 = 0;
/// Sub-second scale of the performance counter shim (100 ns ticks).
pub const COUNTER_TICKS_PER_SECOND: f64 = 10_000_000.0;

const GET_TIME: &str = "GetTime";
const NANOSECONDS_PER_SECOND: f64 = 1_000_000_000.0;
const MILLISECONDS_PER_SECOND: f64 = 1000.0;

impl<'m, 'ctx> Runtime<'m, 'ctx> {
    /// `double <ns>_GetTime(void)`: wall-clock time in milliseconds.
    ///
    /// Built on first use and cached on this runtime afterwards.
    pub fn current_time_function(&mut self) -> EmitResult<FunctionValue<'ctx>> {
        if let Some(function) = self.current_time_function {
            return Ok(function);
        }
        let function = self.module.with_rollback(|| self.emit_get_time())?;
        self.current_time_function = Some(function);
        Ok(function)
    }

    /// Emits a call to `<ns>_GetTime` inside `function` and returns the
    /// milliseconds it reports.
    pub fn emit_current_time(
        &mut self,
        function: &FunctionEmitter<'_, 'ctx>,
    ) -> EmitResult<FloatValue<'ctx>> {
        let get_time = self.current_time_function()?;
        function.call_float(get_time, &[], "now")
    }

    /// `struct timespec { time_t tv_sec; long tv_nsec; }` for the target.
    pub fn timespec_type(&self) -> StructType<'ctx> {
        let field = self.time_field_type();
        self.module
            .context()
            .struct_type(&[field.into(), field.into()], false)
    }

    fn time_field_type(&self) -> IntType<'ctx> {
        let context = self.module.context();
        if self.module.options().target_device.pointer_width_bits() >= 64 {
            context.i64_type()
        } else {
            context.i32_type()
        }
    }

    /// `int clock_gettime(int clk_id, struct timespec *tp)`
    fn clock_function_type(&self) -> FunctionType<'ctx> {
        let context = self.module.context();
        context
            .i32_type()
            .fn_type(&[context.i32_type().into(), self.module.pointer_type().into()], false)
    }

    fn resolve_clock_function(&self) -> EmitResult<FunctionValue<'ctx>> {
        let clock = self.module.options().target_device.clock;
        debug!(?clock, "resolving clock_gettime");
        match clock {
            ClockSource::Posix => self
                .module
                .declare_function(CLOCK_GETTIME, self.clock_function_type()),
            ClockSource::PerformanceCounter => self.emit_performance_counter_clock(),
        }
    }

    /// Defines `clock_gettime` over `QueryPerformanceCounter` and
    /// `QueryPerformanceFrequency`.
    fn emit_performance_counter_clock(&self) -> EmitResult<FunctionValue<'ctx>> {
        let fn_type = self.clock_function_type();
        if let Some(existing) = self.module.get_function(CLOCK_GETTIME) {
            if existing.get_type() == fn_type && is_defined(existing) {
                return Ok(existing);
            }
            return Err(EmitterError::not_found(
                CLOCK_GETTIME,
                "an external clock_gettime is already declared on a target without one",
            ));
        }

        let context = self.module.context();
        let i64_type = context.i64_type();
        let f64_type = context.f64_type();
        let counter_type = context
            .i32_type()
            .fn_type(&[self.module.pointer_type().into()], false);
        for name in [QUERY_PERFORMANCE_COUNTER, QUERY_PERFORMANCE_FREQUENCY] {
            if let Some(existing) = self.module.get_function(name) {
                if existing.get_type() != counter_type {
                    return Err(EmitterError::not_found(
                        name,
                        "an existing symbol has a different signature",
                    ));
                }
            }
        }
        let query_counter = self
            .module
            .declare_function(QUERY_PERFORMANCE_COUNTER, counter_type)?;
        let query_frequency = self
            .module
            .declare_function(QUERY_PERFORMANCE_FREQUENCY, counter_type)?;
        let timespec = self.timespec_type();
        let field_type = self.time_field_type();

        self.module.emit_function(CLOCK_GETTIME, fn_type, |function| {
            let tp = function.pointer_argument(1)?;
            let seconds_ptr = function.struct_field(timespec, tp, 0)?;
            let nanoseconds_ptr = function.struct_field(timespec, tp, 1)?;

            let ticks_slot = function.variable(i64_type, "ticks")?;
            let frequency_slot = function.variable(i64_type, "freq")?;
            function.call(query_counter, &[ticks_slot.into()], "qpc")?;
            function.call(query_frequency, &[frequency_slot.into()], "qpf")?;

            let ticks = function.load_int(i64_type, ticks_slot, "ticks")?;
            let frequency = function.load_int(i64_type, frequency_slot, "freq")?;
            let ticks = function.cast_int_to_float(ticks, f64_type, true)?;
            let frequency = function.cast_int_to_float(frequency, f64_type, true)?;
            let seconds = function.float_operator(TypedOperator::Divide, ticks, frequency)?;

            let whole = function.cast_float_to_int(seconds, i64_type)?;
            let whole_seconds = function.cast_int_to_float(whole, f64_type, true)?;
            let remainder =
                function.float_operator(TypedOperator::Subtract, seconds, whole_seconds)?;
            let sub_second = function.float_operator(
                TypedOperator::Multiply,
                remainder,
                function.f64_literal(COUNTER_TICKS_PER_SECOND),
            )?;

            function.store(nanoseconds_ptr, function.cast_float_to_int(sub_second, field_type)?)?;
            function.store(seconds_ptr, function.cast_float_to_int(whole_seconds, field_type)?)?;
            function.return_value(function.i32_literal(0))
        })
    }

    fn emit_get_time(&self) -> EmitResult<FunctionValue<'ctx>> {
        let name = self.public_name(GET_TIME);
        let f64_type = self.module.context().f64_type();
        let fn_type = f64_type.fn_type(&[], false);
        if let Some(existing) = self.module.get_function(&name) {
            if existing.get_type() != fn_type || !is_defined(existing) {
                return Err(EmitterError::not_found(
                    name,
                    "an incompatible symbol already uses the time accessor name",
                ));
            }
            debug!(%name, "reusing time accessor");
            return Ok(existing);
        }

        let clock = self.resolve_clock_function()?;
        let timespec = self.timespec_type();
        let field_type = self.time_field_type();

        debug!(%name, "synthesizing time accessor");
        let function = self
            .module
            .emit_function(&name, fn_type, |function| {
                let tp = function.variable(timespec, "tp")?;
                function.call(
                    clock,
                    &[function.i32_literal(CLOCK_REALTIME).into(), tp.into()],
                    "status",
                )?;

                let seconds_ptr = function.struct_field(timespec, tp, 0)?;
                let nanoseconds_ptr = function.struct_field(timespec, tp, 1)?;
                let seconds = function.load_int(field_type, seconds_ptr, "tv_sec")?;
                let nanoseconds = function.load_int(field_type, nanoseconds_ptr, "tv_nsec")?;
                let seconds = function.cast_int_to_float(seconds, f64_type, true)?;
                let nanoseconds = function.cast_int_to_float(nanoseconds, f64_type, false)?;

                let fraction = function.float_operator(
                    TypedOperator::Divide,
                    nanoseconds,
                    function.f64_literal(NANOSECONDS_PER_SECOND),
                )?;
                let total = function.float_operator(TypedOperator::Add, seconds, fraction)?;
                let millis = function.float_operator(
                    TypedOperator::Multiply,
                    total,
                    function.f64_literal(MILLISECONDS_PER_SECOND),
                )?;
                function.return_value(millis)
            })?;
        self.module.include_in_header(function);
        Ok(function)
    }
}
