//! The activation-record model for the function being emitted.
//!
//! [`Frame`] owns two things: the shadow alignment counter that tracks how
//! far `%rsp` has moved below the 16-byte-aligned state established by the
//! prologue, and the slot arithmetic that maps parameters and locals to
//! their `%rbp`-relative cells. Every instruction that moves `%rsp` in a
//! function body is emitted through here, so the counter and the emitted
//! text cannot drift apart.

use crate::asm::{insn, Assembler, Dest};
use crate::isa::Gpr;
use crate::result::{CodegenError, CodegenResult};
use crate::symbols::{Symbol, SymbolKind};

/// Stack bookkeeping for one function emission.
pub struct Frame {
    /// Bytes `%rsp` currently sits below the post-prologue aligned state.
    depth: u32,
    /// The function's declared parameter count.
    nparms: usize,
}

impl Frame {
    /// A fresh frame model for a function with `nparms` parameters.
    /// The counter starts at zero: the prologue's two stack-resident words
    /// (return address and saved `%rbp`) together make up exactly one
    /// alignment unit.
    pub fn new(nparms: usize) -> Self {
        Self { depth: 0, nparms }
    }

    /// The current counter value, in bytes.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Push a register and account for it.
    pub fn push(&mut self, asm: &mut Assembler, reg: Gpr) {
        insn!(asm, "pushq {}", reg);
        self.depth += 8;
    }

    /// Pop into a register and account for it.
    pub fn pop(&mut self, asm: &mut Assembler, reg: Gpr) {
        insn!(asm, "popq {}", reg);
        self.depth -= 8;
    }

    /// Reserve `slots` 8-byte cells at function entry.
    pub fn allocate_stack(&mut self, asm: &mut Assembler, slots: u32) {
        if slots > 0 {
            insn!(asm, "subq ${}, %rsp", 8 * slots);
        }
        self.depth += 8 * slots;
    }

    /// Reserve `slots` outgoing-argument cells plus whatever padding makes
    /// the stack 16-byte aligned again, in a single adjustment. Returns
    /// the padding so the call site can take it back off afterwards; the
    /// argument cells themselves are reclaimed by `leave`, so the counter
    /// keeps them.
    pub fn allocate_aligned_stack(&mut self, asm: &mut Assembler, slots: u32) -> u32 {
        let cells = 8 * slots;
        let padding = (16 - (self.depth + cells) % 16) % 16;
        if cells + padding > 0 {
            insn!(asm, "subq ${}, %rsp", cells + padding);
        }
        self.depth += cells + padding;
        padding
    }

    /// Pad the stack to 16-byte alignment without reserving cells.
    /// Returns the padding, 0 when none was needed.
    pub fn align_stack(&mut self, asm: &mut Assembler) -> u32 {
        self.allocate_aligned_stack(asm, 0)
    }

    /// Take back the padding of a previous [`Frame::align_stack`] or
    /// [`Frame::allocate_aligned_stack`]. No-op for 0.
    pub fn unalign_stack(&mut self, asm: &mut Assembler, padding: u32) {
        if padding > 0 {
            insn!(asm, "addq ${}, %rsp", padding);
            self.depth -= padding;
        }
    }

    /// The slot index of the parameter with declaration order `seq`.
    /// Only the first six parameters have slots.
    pub fn param_slot(&self, seq: u32) -> u32 {
        debug_assert!(self.nparms > 0 && (seq as usize) < self.nparms.min(6));
        (self.nparms - 1).min(5) as u32 - seq
    }

    /// The slot index of the local variable with declaration order `seq`.
    /// Locals follow the spilled parameters.
    pub fn local_slot(&self, seq: u32) -> u32 {
        seq + self.nparms.min(6) as u32
    }

    /// The `%rbp`-relative byte offset of a slot.
    pub fn slot_offset(slot: u32) -> i32 {
        -8 * (slot as i32 + 1)
    }

    /// The memory operand a symbol's value lives in.
    ///
    /// Parameters past the sixth stay where the caller placed them, above
    /// the saved frame pointer and the return address.
    pub fn symbol_operand<'s>(&self, sym: &'s Symbol) -> CodegenResult<Dest<'s>> {
        match sym.kind {
            SymbolKind::GlobalVar => Ok(Dest::Global(&sym.name)),
            SymbolKind::LocalVar => Ok(Dest::Frame(Self::slot_offset(self.local_slot(sym.seq)))),
            SymbolKind::Parameter => {
                if (sym.seq as usize) < 6 {
                    Ok(Dest::Frame(Self::slot_offset(self.param_slot(sym.seq))))
                } else {
                    Ok(Dest::Frame(16 + 8 * (sym.seq as i32 - 6)))
                }
            }
            SymbolKind::Function => Err(CodegenError::UnsupportedSymbol {
                name: sym.name.clone(),
                kind: sym.kind,
            }),
        }
    }

    /// Move a symbol's value into a register: exactly one instruction.
    pub fn load_symbol(
        &self,
        asm: &mut Assembler,
        reg: Gpr,
        sym: &Symbol,
    ) -> CodegenResult<()> {
        let src = self.symbol_operand(sym)?;
        insn!(asm, "movq {}, {}", src, reg);
        Ok(())
    }

    /// Move a register into a symbol's storage: exactly one instruction.
    pub fn store_symbol(
        &self,
        asm: &mut Assembler,
        reg: Gpr,
        sym: &Symbol,
    ) -> CodegenResult<()> {
        let dst = self.symbol_operand(sym)?;
        insn!(asm, "movq {}, {}", reg, dst);
        Ok(())
    }
}
