use std::fmt;

/// Numeric kind a primitive is specialized for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int32,
    Int64,
    Float,
    Double,
}

impl ElementType {
    pub const ALL: [ElementType; 4] = [
        ElementType::Int32,
        ElementType::Int64,
        ElementType::Float,
        ElementType::Double,
    ];

    pub fn is_floating_point(self) -> bool {
        matches!(self, ElementType::Float | ElementType::Double)
    }

    pub fn size_in_bytes(self) -> u64 {
        match self {
            ElementType::Int32 | ElementType::Float => 4,
            ElementType::Int64 | ElementType::Double => 8,
        }
    }

    /// Suffix used in public symbol names, e.g. `DotProductFloat`.
    pub fn type_name(self) -> &'static str {
        match self {
            ElementType::Int32 => "Int",
            ElementType::Int64 => "Int64",
            ElementType::Float => "Single",
            ElementType::Double => "Float",
        }
    }

    /// BLAS precision prefix (`s`/`d`), only defined for floating types.
    pub fn blas_prefix(self) -> Option<char> {
        match self {
            ElementType::Float => Some('s'),
            ElementType::Double => Some('d'),
            ElementType::Int32 | ElementType::Int64 => None,
        }
    }

    pub fn scalar(self) -> VariableType {
        match self {
            ElementType::Int32 => VariableType::Int32,
            ElementType::Int64 => VariableType::Int64,
            ElementType::Float => VariableType::Float,
            ElementType::Double => VariableType::Double,
        }
    }

    pub fn pointer(self) -> VariableType {
        match self {
            ElementType::Int32 => VariableType::Int32Pointer,
            ElementType::Int64 => VariableType::Int64Pointer,
            ElementType::Float => VariableType::FloatPointer,
            ElementType::Double => VariableType::DoublePointer,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Int32 => "int32",
            ElementType::Int64 => "int64",
            ElementType::Float => "float",
            ElementType::Double => "double",
        };
        f.write_str(name)
    }
}

/// Parameter and return types of emitted functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariableType {
    Void,
    Int32,
    Int64,
    Float,
    Double,
    Int32Pointer,
    Int64Pointer,
    FloatPointer,
    DoublePointer,
}

impl VariableType {
    pub fn is_pointer(self) -> bool {
        self.pointee().is_some()
    }

    pub fn pointee(self) -> Option<ElementType> {
        match self {
            VariableType::Int32Pointer => Some(ElementType::Int32),
            VariableType::Int64Pointer => Some(ElementType::Int64),
            VariableType::FloatPointer => Some(ElementType::Float),
            VariableType::DoublePointer => Some(ElementType::Double),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypedOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}
