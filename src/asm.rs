//! Line-oriented assembly text sink.
//!
//! Everything the generator says goes through [`Assembler`], which keeps
//! the listing as a growing list of lines. Emission cannot fail at this
//! layer; whoever owns the finished listing decides what to do with it.

use crate::isa::Gpr;
use core::fmt;

/// Append an instruction line to an [`Assembler`] reachable as `$asm`,
/// formatting the operands in place.
macro_rules! insn {
    ($asm:expr, $($fmtargs:tt)*) => {
        $asm.insn(format!($($fmtargs)*))
    };
}

pub(crate) use insn;

/// The destination operand an expression's value must end up in.
///
/// A single formatter produces the AT&T text for every storage shape the
/// fixed scheme knows, so operand spellings cannot drift between call
/// sites.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Dest<'a> {
    /// A general-purpose register.
    Reg(Gpr),
    /// A byte offset from the frame pointer. Negative offsets address the
    /// function's own slots, positive offsets the caller-placed arguments
    /// above the saved frame pointer.
    Frame(i32),
    /// A global variable's cell in BSS, addressed as `.name`.
    Global(&'a str),
    /// An outgoing stack-argument cell, as a byte offset from `%rsp`.
    Arg(u32),
}

impl fmt::Display for Dest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dest::Reg(reg) => reg.fmt(f),
            Dest::Frame(offset) => write!(f, "{}(%rbp)", offset),
            Dest::Global(name) => write!(f, ".{}", name),
            Dest::Arg(offset) => write!(f, "{}(%rsp)", offset),
        }
    }
}

/// Collects the assembly listing, one line at a time.
pub struct Assembler {
    lines: Vec<String>,
}

impl Assembler {
    /// Create an empty listing.
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Append a directive such as `.section`, `.globl` or `.asciz`.
    pub fn directive(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    /// Append a label definition; the trailing colon is added here.
    pub fn label(&mut self, name: impl Into<String>) {
        let mut line = name.into();
        line.push(':');
        self.lines.push(line);
    }

    /// Append a tab-indented instruction.
    pub fn insn(&mut self, text: impl Into<String>) {
        self.lines.push(format!("\t{}", text.into()));
    }

    /// Yield the finished listing with a trailing newline.
    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}
