//! The in-repo [`Emitter`] backend: builds a [`Chunk`].
//!
//! Forward branches are emitted with placeholder targets and patched when
//! the chunk is finished; an unbound label at that point is a code-generator
//! bug and fails fast.

use sable_core::emit::{Emitter, Label, Reg};
use sable_core::runtime::{Handle, NativeFn};
use sable_core::types::MachineType;

use crate::bytecode::{BinOp, Chunk, Instr, UnOp};

enum Patch {
    Branch(Label),
    Table { targets: Vec<Label>, default: Label },
}

/// Emits instructions into a [`Chunk`].
pub struct ChunkEmitter {
    code: Vec<Instr>,
    lines: Vec<u32>,
    next_reg: u32,
    labels: Vec<Option<u32>>,
    patches: Vec<(usize, Patch)>,
    current_line: u32,
}

impl ChunkEmitter {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            lines: Vec::new(),
            next_reg: 0,
            labels: Vec::new(),
            patches: Vec::new(),
            current_line: 1,
        }
    }

    fn push(&mut self, instr: Instr) -> usize {
        self.code.push(instr);
        self.lines.push(self.current_line);
        self.code.len() - 1
    }

    fn alloc_reg(&mut self) -> Reg {
        let reg = Reg(self.next_reg);
        self.next_reg += 1;
        reg
    }

    fn binary(&mut self, op: BinOp, a: Reg, b: Reg, ty: MachineType) -> Reg {
        let dst = self.alloc_reg();
        self.push(Instr::Binary { op, dst, a, b, ty });
        dst
    }

    fn resolve(&self, label: Label) -> u32 {
        match self.labels.get(label.0 as usize).copied().flatten() {
            Some(position) => position,
            None => panic!("unbound label {label:?}"),
        }
    }

    /// Patch all branch targets and hand over the finished chunk.
    pub fn finish(mut self) -> Chunk {
        let patches = std::mem::take(&mut self.patches);
        for (index, patch) in patches {
            match patch {
                Patch::Branch(label) => {
                    let position = self.resolve(label);
                    match &mut self.code[index] {
                        Instr::Jump { target }
                        | Instr::BranchIf { target, .. }
                        | Instr::BranchIfNot { target, .. } => *target = position,
                        other => panic!("branch patch on {other:?}"),
                    }
                }
                Patch::Table { targets, default } => {
                    let positions: Vec<u32> =
                        targets.iter().map(|&l| self.resolve(l)).collect();
                    let default_position = self.resolve(default);
                    match &mut self.code[index] {
                        Instr::JumpTable {
                            targets, default, ..
                        } => {
                            *targets = positions;
                            *default = default_position;
                        }
                        other => panic!("table patch on {other:?}"),
                    }
                }
            }
        }
        Chunk {
            code: self.code,
            lines: self.lines,
            num_regs: self.next_reg,
        }
    }
}

impl Default for ChunkEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter for ChunkEmitter {
    fn const_i32(&mut self, value: i32) -> Reg {
        let dst = self.alloc_reg();
        self.push(Instr::ConstI32 { dst, value });
        dst
    }

    fn const_i64(&mut self, value: i64) -> Reg {
        let dst = self.alloc_reg();
        self.push(Instr::ConstI64 { dst, value });
        dst
    }

    fn const_f64(&mut self, value: f64) -> Reg {
        let dst = self.alloc_reg();
        self.push(Instr::ConstF64 { dst, value });
        dst
    }

    fn const_ptr(&mut self, value: Handle) -> Reg {
        let dst = self.alloc_reg();
        self.push(Instr::ConstPtr { dst, value });
        dst
    }

    fn new_reg(&mut self, _ty: MachineType) -> Reg {
        self.alloc_reg()
    }

    fn store(&mut self, dst: Reg, src: Reg) {
        self.push(Instr::Copy { dst, src });
    }

    fn convert(&mut self, src: Reg, from: MachineType, to: MachineType) -> Reg {
        if from == to {
            return src;
        }
        let dst = self.alloc_reg();
        self.push(Instr::Convert { dst, src, from, to });
        dst
    }

    fn add(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Add, a, b, ty)
    }

    fn sub(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Sub, a, b, ty)
    }

    fn mul(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Mul, a, b, ty)
    }

    fn div(&mut self, a: Reg, b: Reg) -> Reg {
        self.binary(BinOp::Div, a, b, MachineType::F64)
    }

    fn int_div(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::IntDiv, a, b, ty)
    }

    fn rem(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Rem, a, b, ty)
    }

    fn neg(&mut self, a: Reg, ty: MachineType) -> Reg {
        let dst = self.alloc_reg();
        self.push(Instr::Unary {
            op: UnOp::Neg,
            dst,
            a,
            ty,
        });
        dst
    }

    fn eq(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Eq, a, b, ty)
    }

    fn ne(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Ne, a, b, ty)
    }

    fn lt(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Lt, a, b, ty)
    }

    fn le(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Le, a, b, ty)
    }

    fn gt(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Gt, a, b, ty)
    }

    fn ge(&mut self, a: Reg, b: Reg, ty: MachineType) -> Reg {
        self.binary(BinOp::Ge, a, b, ty)
    }

    fn not(&mut self, a: Reg) -> Reg {
        let dst = self.alloc_reg();
        self.push(Instr::Unary {
            op: UnOp::Not,
            dst,
            a,
            ty: MachineType::I32,
        });
        dst
    }

    fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    fn bind(&mut self, label: Label) {
        let position = self.code.len() as u32;
        let slot = &mut self.labels[label.0 as usize];
        assert!(slot.is_none(), "label {label:?} bound twice");
        *slot = Some(position);
    }

    fn jump(&mut self, label: Label) {
        let index = self.push(Instr::Jump { target: u32::MAX });
        self.patches.push((index, Patch::Branch(label)));
    }

    fn branch_if(&mut self, cond: Reg, label: Label) {
        let index = self.push(Instr::BranchIf {
            cond,
            target: u32::MAX,
        });
        self.patches.push((index, Patch::Branch(label)));
    }

    fn branch_if_not(&mut self, cond: Reg, label: Label) {
        let index = self.push(Instr::BranchIfNot {
            cond,
            target: u32::MAX,
        });
        self.patches.push((index, Patch::Branch(label)));
    }

    fn jump_table(&mut self, index: Reg, targets: &[Label], default: Label) {
        let instr_index = self.push(Instr::JumpTable {
            index,
            targets: Vec::new(),
            default: u32::MAX,
        });
        self.patches.push((
            instr_index,
            Patch::Table {
                targets: targets.to_vec(),
                default,
            },
        ));
    }

    fn call_native(&mut self, func: NativeFn, args: &[Reg], ret: MachineType) -> Reg {
        let dst = self.alloc_reg();
        self.push(Instr::CallNative {
            func,
            args: args.to_vec(),
            dst,
            ret,
        });
        dst
    }

    fn set_line(&mut self, line: u32) {
        self.current_line = line;
    }

    fn ret(&mut self, value: Option<Reg>) {
        self.push(Instr::Return { value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jumps_are_patched() {
        let mut e = ChunkEmitter::new();
        let end = e.new_label();
        let a = e.const_i32(1);
        e.branch_if(a, end);
        e.const_i32(2);
        e.bind(end);
        e.ret(None);
        let chunk = e.finish();
        match &chunk.code[1] {
            Instr::BranchIf { target, .. } => assert_eq!(*target, 3),
            other => panic!("expected branch, got {other:?}"),
        }
    }

    #[test]
    fn identity_conversions_emit_nothing() {
        let mut e = ChunkEmitter::new();
        let a = e.const_i32(1);
        let b = e.convert(a, MachineType::I32, MachineType::I32);
        assert_eq!(a, b);
        assert_eq!(e.finish().len(), 1);
    }

    #[test]
    #[should_panic]
    fn unbound_label_fails_fast() {
        let mut e = ChunkEmitter::new();
        let never = e.new_label();
        e.jump(never);
        e.finish();
    }

    #[test]
    fn lines_follow_set_line() {
        let mut e = ChunkEmitter::new();
        e.set_line(7);
        e.const_i32(0);
        let chunk = e.finish();
        assert_eq!(chunk.line(0), 7);
    }
}
