use inkwell::builder::BuilderError;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

pub type EmitResult<T> = Result<T, EmitterError>;

#[derive(Debug, Error, Diagnostic)]
pub enum EmitterError {
    #[error("Function `{name}` not found: {reason}")]
    #[diagnostic(
        code(model_runtime::function_not_found),
        help("check the element type and the target's linked libraries")
    )]
    FunctionNotFound { name: String, reason: String },
    #[error("Function `{name}` is already defined in this module")]
    #[diagnostic(code(model_runtime::duplicate_function))]
    DuplicateFunction { name: String },
    #[error("Function `{name}` failed LLVM verification")]
    #[diagnostic(code(model_runtime::invalid_function))]
    InvalidFunction { name: String },
    #[error("Module `{name}` failed LLVM verification: {message}")]
    #[diagnostic(code(model_runtime::invalid_module))]
    InvalidModule { name: String, message: String },
    #[error("Type mismatch in `{function}`: {message}")]
    #[diagnostic(code(model_runtime::type_mismatch))]
    TypeMismatch { function: String, message: String },
    #[error("Argument {index} of `{function}` has an unexpected kind")]
    #[diagnostic(code(model_runtime::unexpected_argument))]
    UnexpectedArgument { function: String, index: u32 },
    #[error("Invalid target triple `{triple}`")]
    #[diagnostic(
        code(model_runtime::invalid_triple),
        help("expected `arch-vendor-os` or `arch-vendor-os-env`")
    )]
    InvalidTriple { triple: String },
    #[error("Invalid configuration in {}: {message}", path.display())]
    #[diagnostic(code(model_runtime::config))]
    Config { path: PathBuf, message: String },
    #[error("Failed to access {}: {source}", path.display())]
    #[diagnostic(code(model_runtime::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("LLVM builder error: {0}")]
    #[diagnostic(code(model_runtime::builder))]
    Builder(#[from] BuilderError),
}

impl EmitterError {
    pub fn not_found(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FunctionNotFound {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn is_function_not_found(&self) -> bool {
        matches!(self, EmitterError::FunctionNotFound { .. })
    }
}
