//! Target description for the one supported instruction set.
//!
//! The generator targets x86-64 with the System V AMD64 calling convention
//! and nothing else. This module holds the register names used by the fixed
//! emission scheme, the integer argument register table, and the triple
//! check performed when a [`Context`](crate::Context) is configured for an
//! explicit target.

use core::fmt;
use target_lexicon::{Architecture, CallingConvention, Triple};

/// The general-purpose registers the fixed emission scheme touches.
///
/// Expression results are produced in `%rax`, the right operand of a binary
/// operator travels through `%r10`, relations compare `%r10` against
/// `%r11`, and the first six call arguments go in the [`ARG_GPRS`] table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Gpr {
    /// `%rax`, the accumulator and return-value register.
    Rax,
    /// `%rcx`, the fourth argument register.
    Rcx,
    /// `%rdx`, the third argument register.
    Rdx,
    /// `%rsi`, the second argument register.
    Rsi,
    /// `%rdi`, the first argument register.
    Rdi,
    /// `%r8`, the fifth argument register.
    R8,
    /// `%r9`, the sixth argument register.
    R9,
    /// `%r10`, scratch for right operands.
    R10,
    /// `%r11`, scratch for relation operands.
    R11,
}

impl Gpr {
    /// The AT&T spelling of this register, without the `%` sigil.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rax => "rax",
            Self::Rcx => "rcx",
            Self::Rdx => "rdx",
            Self::Rsi => "rsi",
            Self::Rdi => "rdi",
            Self::R8 => "r8",
            Self::R9 => "r9",
            Self::R10 => "r10",
            Self::R11 => "r11",
        }
    }
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}", self.name())
    }
}

/// Integer argument registers, in parameter order.
///
/// Arguments 0..5 are passed here; arguments 6 and up are passed on the
/// stack, at `0(%rsp)`, `8(%rsp)`, ... at the moment of `call`.
pub const ARG_GPRS: [Gpr; 6] = [Gpr::Rdi, Gpr::Rsi, Gpr::Rdx, Gpr::Rcx, Gpr::R8, Gpr::R9];

/// Check that `triple` names a target this crate can generate code for.
///
/// Only x86-64 targets whose default calling convention is System V are
/// accepted; everything else reports [`LookupError::Unsupported`].
pub fn lookup(triple: &Triple) -> Result<(), LookupError> {
    match triple.architecture {
        Architecture::X86_64
            if triple.default_calling_convention() == Ok(CallingConvention::SystemV) =>
        {
            Ok(())
        }
        _ => Err(LookupError::Unsupported),
    }
}

/// Describes the reason for a target lookup failure.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum LookupError {
    /// Support for this target has not been implemented.
    Unsupported,
}

// This is manually implementing Error and Display instead of using thiserror
// because the lookup failure carries no payload worth formatting.
impl std::error::Error for LookupError {}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LookupError::Unsupported => {
                write!(f, "support for this target has not been implemented")
            }
        }
    }
}
