//! Unified error types.
//!
//! Two independent error domains:
//!
//! - **Semantic errors** are produced while analyzing a program. They are
//!   collected, not propagated: analysis keeps going and the program is
//!   marked failed if any were recorded. Code generation never runs for a
//!   failed analysis.
//! - **Runtime errors** are fixed symbolic kinds raised by executing code.
//!   Each surfaces as a [`RuntimeException`] carrying a stack trace captured
//!   at the point of failure, so tests can match by kind.
//!
//! Registration errors form a third, much smaller domain: misuse of the
//! environment-construction API before any program exists.

use thiserror::Error;

use crate::span::Span;

// ============================================================================
// Semantic Errors
// ============================================================================

/// Errors produced during semantic analysis. Collected, non-fatal to the
/// analysis pass itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticError {
    /// No registered version of the callable matches the argument types.
    #[error("no applicable version of '{name}' for ({arguments}) at {span}")]
    NoApplicableOverload {
        name: String,
        arguments: String,
        span: Span,
    },

    /// A binary/unary operator has no version for the operand types.
    #[error("no operator '{operator}' for {left} and {right} at {span}")]
    NoSuchOperator {
        operator: String,
        left: String,
        right: String,
        span: Span,
    },

    /// An attribute or field does not exist on the receiver's class.
    #[error("'{class}' has no attribute '{attribute}' at {span}")]
    AttributeNotFound {
        class: String,
        attribute: String,
        span: Span,
    },

    /// A value of one type was assigned where another is required.
    #[error("cannot assign {from} to {to} at {span}")]
    TypeMismatch {
        from: String,
        to: String,
        span: Span,
    },

    /// Reference to a variable that was never declared.
    #[error("undefined variable '{name}' at {span}")]
    UndefinedVariable { name: String, span: Span },

    /// A construct the analyzer cannot compile.
    #[error("unsupported construct: {detail} at {span}")]
    Unsupported { detail: String, span: Span },
}

impl SemanticError {
    /// The span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            SemanticError::NoApplicableOverload { span, .. } => *span,
            SemanticError::NoSuchOperator { span, .. } => *span,
            SemanticError::AttributeNotFound { span, .. } => *span,
            SemanticError::TypeMismatch { span, .. } => *span,
            SemanticError::UndefinedVariable { span, .. } => *span,
            SemanticError::Unsupported { span, .. } => *span,
        }
    }
}

// ============================================================================
// Runtime Errors
// ============================================================================

/// Symbolic runtime error kinds.
///
/// The set is closed: generated code and native helpers raise exactly these,
/// and tests match on the kind rather than a message string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("number overflow")]
    NumberOverflow,
    #[error("array index out of bounds")]
    ArrayOutOfBounds,
    #[error("array key is not a number")]
    ArrayKeyIsNotNumber,
    #[error("cannot modify a readonly object")]
    CantModifyReadonlyObject,
    #[error("no such attribute")]
    NoSuchAttribute,
    #[error("no such operator")]
    NoSuchOperator,
    #[error("operation limit exceeded")]
    OperationLimitExceeded,
}

/// One frame of a captured stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub line: u32,
}

/// A runtime error together with the stack trace captured where it was
/// raised.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct RuntimeException {
    pub kind: RuntimeError,
    pub trace: Vec<StackFrame>,
}

impl RuntimeException {
    pub fn new(kind: RuntimeError) -> Self {
        Self {
            kind,
            trace: Vec::new(),
        }
    }

    pub fn with_frame(mut self, function: impl Into<String>, line: u32) -> Self {
        self.trace.push(StackFrame {
            function: function.into(),
            line,
        });
        self
    }
}

// ============================================================================
// Registration Errors
// ============================================================================

/// Errors raised while building the symbol environment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("class '{name}' is already registered")]
    DuplicateClass { name: String },

    #[error("field '{field}' is already declared on class '{class}'")]
    DuplicateField { class: String, field: String },

    #[error("static field '{field}' is already declared on class '{class}'")]
    DuplicateStaticField { class: String, field: String },

    #[error("class '{name}' is not registered")]
    UnknownClass { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_errors_match_by_kind() {
        let ex = RuntimeException::new(RuntimeError::DivisionByZero).with_frame("main", 3);
        assert_eq!(ex.kind, RuntimeError::DivisionByZero);
        assert_eq!(ex.trace[0].line, 3);
    }

    #[test]
    fn semantic_error_carries_span() {
        let err = SemanticError::UndefinedVariable {
            name: "x".into(),
            span: Span::point(2, 5),
        };
        assert_eq!(err.span().line, 2);
    }
}
