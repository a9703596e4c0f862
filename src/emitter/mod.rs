mod function;
mod module;
mod types;

pub use function::FunctionEmitter;
pub use module::{is_defined, ModuleEmitter};
pub use types::{ElementType, TypedOperator, VariableType};
