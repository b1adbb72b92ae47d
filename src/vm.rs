//! The instruction interpreter.
//!
//! Executes a [`Chunk`] over a [`RuntimeCtx`]. Arithmetic is typed by
//! [`MachineType`]; integer division and remainder check for zero, and
//! integer arithmetic checks for overflow; both surface as tagged
//! exceptions with the source line captured from the chunk's line table.
//! Native helpers propagate their error kinds the same way.

use sable_compiler::bytecode::{BinOp, Chunk, Instr, UnOp};
use sable_core::error::{RuntimeError, RuntimeException};
use sable_core::runtime::{RuntimeCtx, Slot};
use sable_core::types::MachineType;

/// Executes chunks. Holds the function name used in stack traces.
pub struct Vm {
    pub function_name: String,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            function_name: "main".to_string(),
        }
    }

    /// Run a chunk to completion, producing its return value.
    pub fn run(&self, chunk: &Chunk, ctx: &mut RuntimeCtx) -> Result<Slot, RuntimeException> {
        let mut regs = vec![Slot::Void; chunk.num_regs as usize];
        let mut pc = 0usize;
        while pc < chunk.code.len() {
            let mut next = pc + 1;
            match &chunk.code[pc] {
                Instr::ConstI32 { dst, value } => regs[dst.0 as usize] = Slot::Int(*value as i64),
                Instr::ConstI64 { dst, value } => regs[dst.0 as usize] = Slot::Int(*value),
                Instr::ConstF64 { dst, value } => regs[dst.0 as usize] = Slot::Float(*value),
                Instr::ConstPtr { dst, value } => regs[dst.0 as usize] = Slot::Ptr(*value),
                Instr::Copy { dst, src } => regs[dst.0 as usize] = regs[src.0 as usize],
                Instr::Convert { dst, src, from, to } => {
                    let value = convert(regs[src.0 as usize], *from, *to);
                    regs[dst.0 as usize] = value;
                }
                Instr::Binary { op, dst, a, b, ty } => {
                    let a = regs[a.0 as usize];
                    let b = regs[b.0 as usize];
                    let value = binary(*op, a, b, *ty)
                        .map_err(|kind| self.exception(kind, chunk, pc))?;
                    regs[dst.0 as usize] = value;
                }
                Instr::Unary { op, dst, a, ty } => {
                    let a = regs[a.0 as usize];
                    let value =
                        unary(*op, a, *ty).map_err(|kind| self.exception(kind, chunk, pc))?;
                    regs[dst.0 as usize] = value;
                }
                Instr::Jump { target } => next = *target as usize,
                Instr::BranchIf { cond, target } => {
                    if truthy(regs[cond.0 as usize]) {
                        next = *target as usize;
                    }
                }
                Instr::BranchIfNot { cond, target } => {
                    if !truthy(regs[cond.0 as usize]) {
                        next = *target as usize;
                    }
                }
                Instr::JumpTable {
                    index,
                    targets,
                    default,
                } => {
                    let index = int(regs[index.0 as usize]);
                    next = targets
                        .get(index.max(0) as usize)
                        .copied()
                        .filter(|_| index >= 0)
                        .unwrap_or(*default) as usize;
                }
                Instr::CallNative {
                    func,
                    args,
                    dst,
                    ret: _,
                } => {
                    let arg_slots: Vec<Slot> =
                        args.iter().map(|r| regs[r.0 as usize]).collect();
                    let value = func(ctx, &arg_slots)
                        .map_err(|kind| self.exception(kind, chunk, pc))?;
                    regs[dst.0 as usize] = value;
                }
                Instr::Return { value } => {
                    return Ok(value.map(|r| regs[r.0 as usize]).unwrap_or(Slot::Void));
                }
            }
            pc = next;
        }
        Ok(Slot::Void)
    }

    fn exception(&self, kind: RuntimeError, chunk: &Chunk, pc: usize) -> RuntimeException {
        RuntimeException::new(kind).with_frame(self.function_name.clone(), chunk.line(pc))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn int(slot: Slot) -> i64 {
    match slot {
        Slot::Int(v) => v,
        other => panic!("expected an integer slot, got {other:?}"),
    }
}

fn float(slot: Slot) -> f64 {
    match slot {
        Slot::Float(v) => v,
        Slot::Int(v) => v as f64,
        other => panic!("expected a float slot, got {other:?}"),
    }
}

fn truthy(slot: Slot) -> bool {
    match slot {
        Slot::Int(v) => v != 0,
        Slot::Float(v) => v != 0.0,
        Slot::Void => false,
        Slot::Ptr(_) => true,
    }
}

fn convert(slot: Slot, _from: MachineType, to: MachineType) -> Slot {
    match to {
        MachineType::I32 | MachineType::I64 => match slot {
            Slot::Int(v) => Slot::Int(v),
            Slot::Float(v) => Slot::Int(v as i64),
            other => other,
        },
        MachineType::F64 => Slot::Float(float(slot)),
        MachineType::Ptr | MachineType::Void => slot,
    }
}

fn binary(op: BinOp, a: Slot, b: Slot, ty: MachineType) -> Result<Slot, RuntimeError> {
    match ty {
        MachineType::I32 | MachineType::I64 => int_binary(op, int(a), int(b), ty),
        MachineType::F64 => float_binary(op, float(a), float(b)),
        MachineType::Ptr => match op {
            BinOp::Eq => Ok(Slot::Int((a == b) as i64)),
            BinOp::Ne => Ok(Slot::Int((a != b) as i64)),
            other => panic!("binary {other:?} on pointers"),
        },
        MachineType::Void => panic!("binary {op:?} on void"),
    }
}

fn int_binary(op: BinOp, a: i64, b: i64, ty: MachineType) -> Result<Slot, RuntimeError> {
    let checked = |value: Option<i64>| -> Result<Slot, RuntimeError> {
        let value = value.ok_or(RuntimeError::NumberOverflow)?;
        if ty == MachineType::I32 && (value < i32::MIN as i64 || value > i32::MAX as i64) {
            return Err(RuntimeError::NumberOverflow);
        }
        Ok(Slot::Int(value))
    };
    match op {
        BinOp::Add => checked(a.checked_add(b)),
        BinOp::Sub => checked(a.checked_sub(b)),
        BinOp::Mul => checked(a.checked_mul(b)),
        BinOp::Div => Ok(Slot::Float(a as f64 / b as f64)),
        BinOp::IntDiv => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            checked(a.checked_div(b))
        }
        BinOp::Rem => {
            if b == 0 {
                return Err(RuntimeError::DivisionByZero);
            }
            checked(a.checked_rem(b))
        }
        BinOp::Eq => Ok(Slot::Int((a == b) as i64)),
        BinOp::Ne => Ok(Slot::Int((a != b) as i64)),
        BinOp::Lt => Ok(Slot::Int((a < b) as i64)),
        BinOp::Le => Ok(Slot::Int((a <= b) as i64)),
        BinOp::Gt => Ok(Slot::Int((a > b) as i64)),
        BinOp::Ge => Ok(Slot::Int((a >= b) as i64)),
    }
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Result<Slot, RuntimeError> {
    match op {
        BinOp::Add => Ok(Slot::Float(a + b)),
        BinOp::Sub => Ok(Slot::Float(a - b)),
        BinOp::Mul => Ok(Slot::Float(a * b)),
        BinOp::Div | BinOp::IntDiv => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(Slot::Float(a / b))
        }
        BinOp::Rem => {
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(Slot::Float(a % b))
        }
        BinOp::Eq => Ok(Slot::Int((a == b) as i64)),
        BinOp::Ne => Ok(Slot::Int((a != b) as i64)),
        BinOp::Lt => Ok(Slot::Int((a < b) as i64)),
        BinOp::Le => Ok(Slot::Int((a <= b) as i64)),
        BinOp::Gt => Ok(Slot::Int((a > b) as i64)),
        BinOp::Ge => Ok(Slot::Int((a >= b) as i64)),
    }
}

fn unary(op: UnOp, a: Slot, ty: MachineType) -> Result<Slot, RuntimeError> {
    match op {
        UnOp::Neg => match ty {
            MachineType::F64 => Ok(Slot::Float(-float(a))),
            _ => Ok(Slot::Int(
                int(a).checked_neg().ok_or(RuntimeError::NumberOverflow)?,
            )),
        },
        UnOp::Not => Ok(Slot::Int(!truthy(a) as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::emit::Emitter;
    use sable_compiler::ChunkEmitter;

    #[test]
    fn integer_division_by_zero_raises_with_line() {
        let mut e = ChunkEmitter::new();
        e.set_line(5);
        let a = e.const_i32(1);
        let b = e.const_i32(0);
        let d = e.int_div(a, b, MachineType::I32);
        e.ret(Some(d));
        let chunk = e.finish();

        let vm = Vm::new();
        let mut ctx = RuntimeCtx::new();
        let err = vm.run(&chunk, &mut ctx).unwrap_err();
        assert_eq!(err.kind, RuntimeError::DivisionByZero);
        assert_eq!(err.trace[0].line, 5);
        assert_eq!(err.trace[0].function, "main");
    }

    #[test]
    fn i32_overflow_is_detected() {
        let mut e = ChunkEmitter::new();
        let a = e.const_i32(i32::MAX);
        let b = e.const_i32(1);
        let s = e.add(a, b, MachineType::I32);
        e.ret(Some(s));
        let chunk = e.finish();

        let vm = Vm::new();
        let mut ctx = RuntimeCtx::new();
        let err = vm.run(&chunk, &mut ctx).unwrap_err();
        assert_eq!(err.kind, RuntimeError::NumberOverflow);
    }

    #[test]
    fn jump_table_dispatches_in_range_and_default() {
        // select(2) jumps to the third block; select(7) to the default.
        let run_with = |index: i32| {
            let mut e = ChunkEmitter::new();
            let idx = e.const_i32(index);
            let l0 = e.new_label();
            let l1 = e.new_label();
            let l2 = e.new_label();
            let default = e.new_label();
            e.jump_table(idx, &[l0, l1, l2], default);
            e.bind(l0);
            let r0 = e.const_i32(100);
            e.ret(Some(r0));
            e.bind(l1);
            let r1 = e.const_i32(101);
            e.ret(Some(r1));
            e.bind(l2);
            let r2 = e.const_i32(102);
            e.ret(Some(r2));
            e.bind(default);
            let rd = e.const_i32(-1);
            e.ret(Some(rd));
            let chunk = e.finish();
            let vm = Vm::new();
            let mut ctx = RuntimeCtx::new();
            vm.run(&chunk, &mut ctx).unwrap()
        };
        assert_eq!(run_with(2), Slot::Int(102));
        assert_eq!(run_with(7), Slot::Int(-1));
    }
}
