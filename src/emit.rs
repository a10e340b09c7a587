//! Function, statement and expression emission.
//!
//! [`FuncEmitter`] owns the per-function mutable state: the frame model
//! with its shadow alignment counter, and the label mangle counter that
//! keeps control-flow labels unique. The desired destination of an
//! expression and the innermost loop's re-check label are passed down the
//! recursion as call-site values; whether a statement sequence has
//! returned travels back up as a result.

use crate::asm::{insn, Assembler, Dest};
use crate::ast::{BinaryOp, Block, Expr, PrintItem, Relation, Stmt};
use crate::frame::Frame;
use crate::isa::{Gpr, ARG_GPRS};
use crate::result::{CodegenError, CodegenResult};
use crate::symbols::{Function, Program, SymbolId};
use log::{debug, trace};
use smallvec::SmallVec;

/// The call-site location of argument `index`: one of the six argument
/// registers, or an outgoing stack cell for arguments past the sixth.
fn arg_location(index: usize) -> Dest<'static> {
    if index < 6 {
        Dest::Reg(ARG_GPRS[index])
    } else {
        Dest::Arg(8 * (index as u32 - 6))
    }
}

/// Emits one VSL function.
pub struct FuncEmitter<'a> {
    asm: &'a mut Assembler,
    program: &'a Program,
    func: &'a Function,
    frame: Frame,
    labels: u32,
}

impl<'a> FuncEmitter<'a> {
    /// Prepare to emit `func` into `asm`.
    pub fn new(asm: &'a mut Assembler, program: &'a Program, func: &'a Function) -> Self {
        let frame = Frame::new(func.nparms);
        Self {
            asm,
            program,
            func,
            frame,
            labels: 0,
        }
    }

    fn name(&self) -> &'a str {
        &self.program.symbols[self.func.sym].name
    }

    /// Reserve the next label mangle index. Reserving advances the
    /// counter immediately, so the structures nested inside a body get
    /// indices of their own.
    fn next_label(&mut self) -> u32 {
        let k = self.labels;
        self.labels += 1;
        k
    }

    /// Emit the whole function: prologue, slot allocation, parameter
    /// spill, body, and the implicit return when the body's tail path
    /// does not end in one.
    pub fn emit(mut self) -> CodegenResult<()> {
        let func = self.func;
        let name = self.name();
        let spilled = func.nparms.min(6);
        let slots = spilled + (func.locals.len() - func.nparms);
        debug!(
            "emitting function {}: {} parameters, {} frame slots",
            name, func.nparms, slots
        );

        self.asm.directive(format!(".globl _func_{}", name));
        self.asm.label(format!("_func_{}", name));
        insn!(self.asm, "pushq %rbp");
        insn!(self.asm, "movq %rsp, %rbp");
        self.frame.allocate_stack(self.asm, slots as u32);
        for i in (0..spilled).rev() {
            let sym = &self.program.symbols[func.locals[i]];
            self.frame.store_symbol(self.asm, ARG_GPRS[i], sym)?;
        }

        let returned = self.emit_block(&func.body, None)?;
        if !returned {
            insn!(self.asm, "movq $0, %rax");
            insn!(self.asm, "leave");
            insn!(self.asm, "ret");
        }
        Ok(())
    }

    /// Emit a statement sequence. Declarations are skipped; emission
    /// stops as soon as a statement is known to have returned, and that
    /// state is reported to the enclosing walk.
    fn emit_block(&mut self, block: &Block, loop_head: Option<&str>) -> CodegenResult<bool> {
        for stmt in &block.0 {
            if let Stmt::Declare(_) = stmt {
                continue;
            }
            if self.emit_stmt(stmt, loop_head)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn emit_stmt(&mut self, stmt: &Stmt, loop_head: Option<&str>) -> CodegenResult<bool> {
        match stmt {
            Stmt::Declare(_) => Ok(false),

            Stmt::Assign { target, value } => {
                let program = self.program;
                let sym = &program.symbols[*target];
                let dest = self.frame.symbol_operand(sym)?;
                self.emit_expr(value, dest)?;
                Ok(false)
            }

            Stmt::OpAssign { target, op, value } => {
                let program = self.program;
                let sym = &program.symbols[*target];
                self.emit_expr(value, Dest::Reg(Gpr::R10))?;
                self.frame.load_symbol(self.asm, Gpr::Rax, sym)?;
                self.emit_alu(*op);
                self.frame.store_symbol(self.asm, Gpr::Rax, sym)?;
                Ok(false)
            }

            Stmt::Print(items) => {
                for item in items {
                    match item {
                        PrintItem::Str(sid) => {
                            insn!(self.asm, "movq $.strout, %rdi");
                            insn!(self.asm, "movq $.STR{}, %rsi", sid.index());
                        }
                        PrintItem::Expr(value) => {
                            // The value goes to %rsi before the format
                            // string goes to %rdi: a call inside the value
                            // clobbers the argument registers.
                            self.emit_expr(value, Dest::Reg(Gpr::Rsi))?;
                            insn!(self.asm, "movq $.intout, %rdi");
                        }
                    }
                    self.emit_printf();
                }
                insn!(self.asm, "movq $.newline, %rdi");
                self.emit_printf();
                Ok(false)
            }

            Stmt::Return(value) => {
                self.emit_expr(value, Dest::Reg(Gpr::Rax))?;
                insn!(self.asm, "leave");
                insn!(self.asm, "ret");
                Ok(true)
            }

            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.emit_relation(cond)?;
                let k = self.next_label();
                let name = self.name();
                trace!("if #{} on {} in {}", k, cond.op, name);
                let endif = format!("._{}_ENDIF_{}", name, k);
                match else_body {
                    Some(else_body) => {
                        let els = format!("._{}_ELSE_{}", name, k);
                        insn!(self.asm, "{} {}", cond.op.inverse_jump(), els);
                        self.emit_block(then_body, loop_head)?;
                        insn!(self.asm, "jmp {}", endif);
                        self.asm.label(els);
                        self.emit_block(else_body, loop_head)?;
                    }
                    None => {
                        insn!(self.asm, "{} {}", cond.op.inverse_jump(), endif);
                        self.emit_block(then_body, loop_head)?;
                    }
                }
                self.asm.label(endif);
                Ok(false)
            }

            Stmt::While { cond, body } => {
                let k = self.next_label();
                let name = self.name();
                trace!("while #{} on {} in {}", k, cond.op, name);
                let check = format!("._{}_WCHECK_{}", name, k);
                let end = format!("._{}_WEND_{}", name, k);
                self.asm.label(check.clone());
                self.emit_relation(cond)?;
                insn!(self.asm, "{} {}", cond.op.inverse_jump(), end);
                self.emit_block(body, Some(&check))?;
                insn!(self.asm, "jmp {}", check);
                self.asm.label(end);
                Ok(false)
            }

            Stmt::Continue => match loop_head {
                Some(target) => {
                    insn!(self.asm, "jmp {}", target);
                    Ok(false)
                }
                None => Err(CodegenError::ContinueOutsideLoop {
                    function: self.name().to_string(),
                }),
            },

            Stmt::Block(inner) => self.emit_block(inner, loop_head),
        }
    }

    /// Emit a relation, leaving the flags set for left − right: the left
    /// operand travels through the stack into `%r10` while the right is
    /// produced in `%r11`. The caller jumps on the inverse condition.
    fn emit_relation(&mut self, rel: &Relation) -> CodegenResult<()> {
        self.emit_expr(&rel.lhs, Dest::Reg(Gpr::Rax))?;
        self.frame.push(self.asm, Gpr::Rax);
        self.emit_expr(&rel.rhs, Dest::Reg(Gpr::R11))?;
        self.frame.pop(self.asm, Gpr::R10);
        insn!(self.asm, "cmpq %r11, %r10");
        Ok(())
    }

    /// Emit an expression so its value ends up at `dest`.
    fn emit_expr(&mut self, expr: &Expr, dest: Dest) -> CodegenResult<()> {
        match expr {
            Expr::Number(n) => {
                insn!(self.asm, "movq ${}, {}", n, dest);
                Ok(())
            }

            Expr::Var(id) => {
                let program = self.program;
                let sym = &program.symbols[*id];
                match dest {
                    Dest::Reg(reg) => self.frame.load_symbol(self.asm, reg, sym),
                    mem => {
                        // No memory-to-memory movq on x86-64; stage
                        // through the accumulator.
                        self.frame.load_symbol(self.asm, Gpr::Rax, sym)?;
                        insn!(self.asm, "movq %rax, {}", mem);
                        Ok(())
                    }
                }
            }

            Expr::Unary(op, operand) => {
                self.emit_expr(operand, dest)?;
                insn!(self.asm, "{} {}", op.mnemonic(), dest);
                Ok(())
            }

            Expr::Binary(op, lhs, rhs) => {
                self.emit_expr(rhs, Dest::Reg(Gpr::Rax))?;
                self.frame.push(self.asm, Gpr::Rax);
                self.emit_expr(lhs, Dest::Reg(Gpr::Rax))?;
                self.frame.pop(self.asm, Gpr::R10);
                self.emit_alu(*op);
                if dest != Dest::Reg(Gpr::Rax) {
                    insn!(self.asm, "movq %rax, {}", dest);
                }
                Ok(())
            }

            Expr::Call { callee, args } => {
                self.emit_call(*callee, args)?;
                if dest != Dest::Reg(Gpr::Rax) {
                    insn!(self.asm, "movq %rax, {}", dest);
                }
                Ok(())
            }
        }
    }

    /// The operator step of a binary operation or compound assignment:
    /// left operand in `%rax`, right in `%r10`, result in `%rax`.
    fn emit_alu(&mut self, op: BinaryOp) {
        match op {
            BinaryOp::BitOr => insn!(self.asm, "orq %r10, %rax"),
            BinaryOp::BitXor => insn!(self.asm, "xorq %r10, %rax"),
            BinaryOp::BitAnd => insn!(self.asm, "andq %r10, %rax"),
            BinaryOp::Add => insn!(self.asm, "addq %r10, %rax"),
            BinaryOp::Sub => insn!(self.asm, "subq %r10, %rax"),
            BinaryOp::Mul => insn!(self.asm, "imulq %r10"),
            BinaryOp::Div => {
                insn!(self.asm, "cqto");
                insn!(self.asm, "idivq %r10");
            }
        }
    }

    /// Emit a function call, arguments placed directly in their final
    /// call-site locations.
    fn emit_call(&mut self, callee: SymbolId, args: &[Expr]) -> CodegenResult<()> {
        let program = self.program;
        let sym = &program.symbols[callee];
        let target = program
            .function_by_symbol(callee)
            .ok_or_else(|| CodegenError::UnsupportedSymbol {
                name: sym.name.clone(),
                kind: sym.kind,
            })?;
        if args.len() != target.nparms {
            return Err(CodegenError::ArgumentCountMismatch {
                callee: sym.name.clone(),
                caller: self.name().to_string(),
                expected: target.nparms,
                found: args.len(),
            });
        }
        trace!(
            "call {} ({} arguments) from {}",
            sym.name,
            args.len(),
            self.name()
        );

        let dests: SmallVec<[Dest; 6]> = (0..args.len()).map(arg_location).collect();
        let stack_args = args.len().saturating_sub(6) as u32;
        let padding = self.frame.allocate_aligned_stack(self.asm, stack_args);
        for (arg, dest) in args.iter().zip(dests) {
            self.emit_expr(arg, dest)?;
        }
        insn!(self.asm, "call _func_{}", sym.name);
        self.frame.unalign_stack(self.asm, padding);
        Ok(())
    }

    /// One aligned variadic `printf` call; the arguments are already in
    /// `%rdi`/`%rsi`. The System V convention reads `%al` as the count of
    /// vector registers used by a variadic call.
    fn emit_printf(&mut self) {
        insn!(self.asm, "movq $0, %rax");
        let padding = self.frame.align_stack(self.asm);
        insn!(self.asm, "call printf");
        self.frame.unalign_stack(self.asm, padding);
    }
}
