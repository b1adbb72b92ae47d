//! sable: the middle and back end of a dynamically-typed scripting
//! language compiled ahead of execution.
//!
//! The workspace splits along the usual lines of a script engine:
//! `sable-core` (type model, errors, emitter boundary, runtime value
//! model), `sable-registry` (the symbol environment), `sable-compiler`
//! (overload resolution, the memory discipline, iteration lowering, the
//! instruction backend), and this facade crate, which executes compiled
//! programs and reports the observable result record.

pub mod vm;

pub use vm::Vm;

pub use sable_compiler::{
    Analyzer, Call, CallArg, Chunk, ChunkEmitter, Codegen, ForeachBindings,
};
pub use sable_core::{
    Emitter, Handle, Heap, Kind, MachineType, Nature, ObjData, Ownership, Reg, RuntimeCtx,
    RuntimeError, RuntimeException, SemanticError, Slot, Span, Type, TypedValue,
};
pub use sable_registry::{
    register_builtins, Callable, CallableVersion, ClassDef, Environment, FieldDef, FieldInit,
    Mutator, VersionFlags,
};

use sable_core::runtime::value_ops;

/// The runtime-observable outcome of compiling and executing a program.
#[derive(Debug)]
pub struct ExecutionResult {
    pub compilation_success: bool,
    pub execution_success: bool,
    pub semantic_errors: Vec<SemanticError>,
    pub exception: Option<RuntimeException>,
    /// The program's result value, rendered.
    pub value: Option<String>,
    /// Lines the program printed while running.
    pub output: Vec<String>,
    pub operations: u64,
    pub objects_created: u64,
    pub objects_deleted: u64,
}

impl ExecutionResult {
    /// A result for an analysis that failed; code generation never ran.
    pub fn compile_failure(semantic_errors: Vec<SemanticError>) -> Self {
        Self {
            compilation_success: false,
            execution_success: false,
            semantic_errors,
            exception: None,
            value: None,
            output: Vec::new(),
            operations: 0,
            objects_created: 0,
            objects_deleted: 0,
        }
    }
}

/// Execute a compiled chunk and collect the observable result record.
pub fn execute(chunk: &Chunk, ctx: &mut RuntimeCtx) -> ExecutionResult {
    let vm = Vm::new();
    let outcome = vm.run(chunk, ctx);
    let (value, exception) = match outcome {
        Ok(slot) => (format_result(ctx, slot), None),
        Err(exception) => (None, Some(exception)),
    };
    ExecutionResult {
        compilation_success: true,
        execution_success: exception.is_none(),
        semantic_errors: Vec::new(),
        exception,
        value,
        output: std::mem::take(&mut ctx.output),
        operations: ctx.operations,
        objects_created: ctx.heap.objects_created,
        objects_deleted: ctx.heap.objects_deleted,
    }
}

fn format_result(ctx: &RuntimeCtx, slot: Slot) -> Option<String> {
    match slot {
        Slot::Void => None,
        Slot::Int(v) => Some(v.to_string()),
        Slot::Float(v) => Some(value_ops::format_number(v)),
        Slot::Ptr(h) => Some(value_ops::format_value(&ctx.heap, h)),
    }
}
