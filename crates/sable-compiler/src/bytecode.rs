//! The instruction list produced by the in-repo emitter backend.
//!
//! Instructions operate on virtual registers and are typed only by
//! [`MachineType`]. Branch targets are instruction indices, patched by the
//! emitter when it finishes.

use sable_core::emit::Reg;
use sable_core::runtime::{Handle, NativeFn};
use sable_core::types::MachineType;

/// Binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Floating-point division.
    Div,
    /// Integer division; raises division-by-zero.
    IntDiv,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// One instruction.
#[derive(Debug, Clone)]
pub enum Instr {
    ConstI32 { dst: Reg, value: i32 },
    ConstI64 { dst: Reg, value: i64 },
    ConstF64 { dst: Reg, value: f64 },
    ConstPtr { dst: Reg, value: Handle },
    Copy { dst: Reg, src: Reg },
    Convert {
        dst: Reg,
        src: Reg,
        from: MachineType,
        to: MachineType,
    },
    Binary {
        op: BinOp,
        dst: Reg,
        a: Reg,
        b: Reg,
        ty: MachineType,
    },
    Unary {
        op: UnOp,
        dst: Reg,
        a: Reg,
        ty: MachineType,
    },
    Jump { target: u32 },
    BranchIf { cond: Reg, target: u32 },
    BranchIfNot { cond: Reg, target: u32 },
    /// Dispatch on an I32 index: in-range values jump to `targets[index]`,
    /// everything else to `default`.
    JumpTable {
        index: Reg,
        targets: Vec<u32>,
        default: u32,
    },
    CallNative {
        func: NativeFn,
        args: Vec<Reg>,
        dst: Reg,
        ret: MachineType,
    },
    Return { value: Option<Reg> },
}

/// A finished instruction sequence with its line table and register count.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub code: Vec<Instr>,
    /// Source line per instruction, for stack traces.
    pub lines: Vec<u32>,
    pub num_regs: u32,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The source line of the instruction at `pc`.
    pub fn line(&self, pc: usize) -> u32 {
        self.lines.get(pc).copied().unwrap_or(0)
    }
}
