//! Compilation context and whole-program emission.
//!
//! [`Context`] validates the target once, then drives the fixed section
//! order of the listing: read-only data (the format strings and the string
//! table), BSS cells for the globals, the text section with every VSL
//! function, and finally the process entry point that converts
//! command-line arguments and dispatches to the program's entry function.

use crate::asm::{insn, Assembler};
use crate::emit::FuncEmitter;
use crate::isa::{self, LookupError, ARG_GPRS};
use crate::result::CodegenResult;
use crate::symbols::{Function, Program};
use log::debug;
use target_lexicon::{Architecture, BinaryFormat, Environment, OperatingSystem, Triple};

/// Drives code generation for whole programs.
pub struct Context {
    triple: Triple,
}

impl Context {
    /// A context for the default target, x86-64 Linux with the System V
    /// calling convention.
    pub fn new() -> Self {
        let mut triple = Triple::unknown();
        triple.architecture = Architecture::X86_64;
        triple.operating_system = OperatingSystem::Linux;
        triple.environment = Environment::Gnu;
        triple.binary_format = BinaryFormat::Elf;
        Self { triple }
    }

    /// A context for an explicit target. Anything that is not x86-64 with
    /// the System V calling convention is refused.
    pub fn for_triple(triple: Triple) -> Result<Self, LookupError> {
        isa::lookup(&triple)?;
        Ok(Self { triple })
    }

    /// The target this context generates code for.
    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    /// Generate the complete assembly listing for `program`.
    ///
    /// Emitting the same program twice produces byte-identical output.
    pub fn compile(&self, program: &Program) -> CodegenResult<String> {
        debug!(
            "compiling for {}: {} strings, {} globals, {} functions",
            self.triple,
            program.strings.len(),
            program.globals.len(),
            program.functions.len()
        );

        let mut asm = Assembler::new();
        emit_rodata(&mut asm, program);
        emit_bss(&mut asm, program);
        asm.directive(".section .text");
        for func in &program.functions {
            FuncEmitter::new(&mut asm, program, func).emit()?;
        }
        if let Some(entry) = program.entry_function() {
            emit_entry(&mut asm, program, entry);
        }
        Ok(asm.finish())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn emit_rodata(asm: &mut Assembler, program: &Program) {
    asm.directive(".section .rodata");
    asm.label(".newline");
    asm.directive(".asciz \"\\n\"");
    asm.label(".intout");
    asm.directive(".asciz \"%ld \"");
    asm.label(".strout");
    asm.directive(".asciz \"%s \"");
    asm.label(".errout");
    asm.directive(".asciz \"Wrong number of arguments\"");
    for (id, quoted) in program.strings.iter() {
        asm.label(format!(".STR{}", id.index()));
        asm.directive(format!(".asciz {}", quoted));
    }
}

fn emit_bss(asm: &mut Assembler, program: &Program) {
    asm.directive(".section .bss");
    asm.directive(".align 8");
    for &id in &program.globals {
        asm.label(format!(".{}", program.symbols[id].name));
        asm.directive(".zero 8");
    }
}

/// The process entry point: check the argument count, convert the
/// arguments with `strtol`, dispatch to the entry function, and exit with
/// its return value.
fn emit_entry(asm: &mut Assembler, program: &Program, entry: &Function) {
    let name = &program.symbols[entry.sym].name;
    let nparms = entry.nparms;
    debug!("entry function is {} ({} parameters)", name, nparms);

    asm.directive(".globl main");
    asm.label("main");
    insn!(asm, "pushq %rbp");
    insn!(asm, "movq %rsp, %rbp");
    insn!(asm, "subq $1, %rdi");
    insn!(asm, "cmpq ${}, %rdi", nparms);
    insn!(asm, "jne ABORT");
    if nparms > 0 {
        // One cell per argument, rounded up to a whole alignment unit.
        // The cells are reserved once and the loop stores into them, so
        // %rsp is the same at every call strtol and the 16-byte
        // alignment below holds on each iteration.
        let area = 8 * (nparms + nparms % 2);
        insn!(asm, "subq ${}, %rsp", area);
        // Walk argv back to front, converting each argument into its
        // cell; the first argument ends up on top, ready to be popped
        // into the argument registers. Arguments past the sixth are left
        // on the stack, already in position.
        insn!(asm, "movq %rdi, %rcx");
        asm.label("PARSE_ARGV");
        insn!(asm, "pushq %rcx");
        insn!(asm, "pushq %rsi");
        insn!(asm, "movq (%rsi,%rcx,8), %rdi");
        insn!(asm, "movq $0, %rsi");
        insn!(asm, "movq $10, %rdx");
        insn!(asm, "call strtol");
        insn!(asm, "popq %rsi");
        insn!(asm, "popq %rcx");
        insn!(asm, "movq %rax, -8(%rsp,%rcx,8)");
        insn!(asm, "loop PARSE_ARGV");
        for reg in ARG_GPRS.iter().take(nparms.min(6)) {
            insn!(asm, "popq {}", reg);
        }
        if nparms <= 6 && nparms % 2 == 1 {
            // Every cell was popped; only the rounding is left.
            insn!(asm, "addq $8, %rsp");
        }
    }
    insn!(asm, "call _func_{}", name);
    insn!(asm, "jmp END");
    asm.label("ABORT");
    insn!(asm, "movq $.errout, %rdi");
    insn!(asm, "call puts");
    insn!(asm, "movq $1, %rax");
    asm.label("END");
    insn!(asm, "movq %rax, %rdi");
    insn!(asm, "call exit");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, Expr, Stmt};
    use std::str::FromStr;

    #[test]
    fn fixed_format_strings_come_first() {
        let program = Program::new();
        let out = Context::new().compile(&program).unwrap();
        assert!(out.starts_with(
            ".section .rodata\n\
             .newline:\n\
             .asciz \"\\n\"\n\
             .intout:\n\
             .asciz \"%ld \"\n\
             .strout:\n\
             .asciz \"%s \"\n\
             .errout:\n\
             .asciz \"Wrong number of arguments\"\n"
        ));
        assert!(out.contains(".section .bss\n.align 8\n"));
        assert!(out.ends_with(".section .text\n"));
    }

    #[test]
    fn string_table_entries_are_numbered() {
        let mut program = Program::new();
        program.intern_string("\"hello\"");
        program.intern_string("\"world\\n\"");
        let out = Context::new().compile(&program).unwrap();
        assert!(out.contains(".STR0:\n.asciz \"hello\"\n"));
        assert!(out.contains(".STR1:\n.asciz \"world\\n\"\n"));
    }

    #[test]
    fn globals_reserve_a_cell_each() {
        let mut program = Program::new();
        program.declare_global("a");
        program.declare_global("b");
        let out = Context::new().compile(&program).unwrap();
        assert!(out.contains(".a:\n.zero 8\n.b:\n.zero 8\n"));
    }

    #[test]
    fn entry_with_parameters_parses_argv() {
        let mut program = Program::new();
        let mut f = program.declare_function("f");
        let n = f.param("n");
        f.param("m");
        f.finish(Block(vec![Stmt::Return(Expr::Var(n))]));

        let out = Context::new().compile(&program).unwrap();
        assert!(out.contains("\tcmpq $2, %rdi\n\tjne ABORT\n\tsubq $16, %rsp\n"));
        assert!(out.contains("PARSE_ARGV:\n"));
        assert!(out.contains("\tcall strtol\n"));
        assert!(out.contains("\tmovq %rax, -8(%rsp,%rcx,8)\n\tloop PARSE_ARGV\n"));
        assert!(out.contains("\tpopq %rdi\n\tpopq %rsi\n\tcall _func_f\n"));
        assert!(out.contains("ABORT:\n\tmovq $.errout, %rdi\n\tcall puts\n"));
        assert!(out.ends_with("END:\n\tmovq %rax, %rdi\n\tcall exit\n"));
    }

    #[test]
    fn entry_without_parameters_skips_parsing() {
        let mut program = Program::new();
        let f = program.declare_function("go");
        f.finish(Block(Vec::new()));

        let out = Context::new().compile(&program).unwrap();
        assert!(!out.contains("PARSE_ARGV"));
        assert!(!out.contains("strtol"));
        assert!(out.contains("\tcmpq $0, %rdi\n\tjne ABORT\n\tcall _func_go\n"));
    }

    fn entry_with_parameter_count(nparms: usize) -> String {
        let mut program = Program::new();
        let mut f = program.declare_function("f");
        for i in 0..nparms {
            f.param(&format!("p{}", i));
        }
        f.finish(Block(Vec::new()));
        Context::new().compile(&program).unwrap()
    }

    #[test]
    fn argument_area_is_rounded_to_whole_alignment_units() {
        for (nparms, area) in [(1, 16), (2, 16), (6, 48), (7, 64), (8, 64), (9, 80)] {
            let out = entry_with_parameter_count(nparms);
            let reserve = format!("\tjne ABORT\n\tsubq ${}, %rsp\n", area);
            assert!(out.contains(&reserve), "nparms={}", nparms);
        }
    }

    #[test]
    fn odd_register_argument_counts_drop_the_rounding_cell() {
        // Popping an odd number of cells leaves the rounding cell behind;
        // it comes off before the entry call. With stack-resident
        // arguments (or an even count) nothing is left over.
        let out = entry_with_parameter_count(1);
        assert!(out.contains("\tpopq %rdi\n\taddq $8, %rsp\n\tcall _func_f\n"));
        let out = entry_with_parameter_count(2);
        assert!(out.contains("\tpopq %rsi\n\tcall _func_f\n"));
        let out = entry_with_parameter_count(7);
        assert!(out.contains("\tpopq %r9\n\tcall _func_f\n"));
    }

    #[test]
    fn rejected_targets() {
        let arm = Triple::from_str("aarch64-unknown-linux-gnu").unwrap();
        assert!(Context::for_triple(arm).is_err());
        let x64 = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        assert!(Context::for_triple(x64).is_ok());
    }
}
