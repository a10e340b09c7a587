//! Result and error types representing the outcome of code generation.

use crate::symbols::SymbolKind;
use thiserror::Error;

/// An error detected while generating code.
///
/// Earlier compiler passes are expected to hand this crate a well-formed
/// tree; the conditions below are the ones the generator still has to
/// check for itself because the data model cannot rule them out.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodegenError {
    /// A call site supplies a different number of arguments than the
    /// callee declares.
    #[error("call to {callee} from {caller} has {found} arguments, expected {expected}")]
    ArgumentCountMismatch {
        /// Name of the function being called.
        callee: String,
        /// Name of the function containing the call.
        caller: String,
        /// The callee's declared parameter count.
        expected: usize,
        /// The argument count found at the call site.
        found: usize,
    },

    /// A symbol of a kind that has no storage (for now, only functions)
    /// appears where a value is read or written.
    #[error("unsupported symbol type {kind} for {name}")]
    UnsupportedSymbol {
        /// Name of the offending symbol.
        name: String,
        /// Its kind.
        kind: SymbolKind,
    },

    /// A `continue` statement with no enclosing loop.
    #[error("continue outside a loop in function {function}")]
    ContinueOutsideLoop {
        /// Name of the function containing the statement.
        function: String,
    },
}

/// A convenient alias for a `Result` that uses `CodegenError` as the error
/// type.
pub type CodegenResult<T> = Result<T, CodegenError>;
