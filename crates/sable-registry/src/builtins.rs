//! Built-in operators and methods.
//!
//! Value-natured operand combinations compile inline through the emitter;
//! the `(any, any)` fallbacks call the runtime helpers, which dispatch over
//! the finite kind set with exhaustive matches. Versions are registered
//! narrowest first so the generic fallback is also the one that wins ties
//! last: user-registered versions appended later shadow all of these.

use sable_core::emit::{Emitter, TypedValue};
use sable_core::runtime::natives;
use sable_core::types::{MachineType, Type};

use crate::callable::{CallableVersion, Mutator};
use crate::environment::Environment;

/// Register the built-in operator and method versions.
pub fn register_builtins(env: &mut Environment) {
    register_arithmetic(env);
    register_comparison(env);
    register_array_methods(env);
}

fn register_arithmetic(env: &mut Environment) {
    env.add_version(
        "+",
        CallableVersion::emit(int2(), Type::integer(), |e, args| {
            TypedValue::temporary(e.add(args[0].reg, args[1].reg, MachineType::I32), Type::integer())
        }),
    );
    env.add_version(
        "+",
        CallableVersion::emit(long2(), Type::long(), |e, args| {
            TypedValue::temporary(e.add(args[0].reg, args[1].reg, MachineType::I64), Type::long())
        }),
    );
    env.add_version(
        "+",
        CallableVersion::emit(float2(), Type::float(), |e, args| {
            TypedValue::temporary(e.add(args[0].reg, args[1].reg, MachineType::F64), Type::float())
        }),
    );
    env.add_version(
        "+",
        CallableVersion::runtime(any2(), Type::any(), natives::rt_add_any),
    );

    env.add_version(
        "-",
        CallableVersion::emit(int2(), Type::integer(), |e, args| {
            TypedValue::temporary(e.sub(args[0].reg, args[1].reg, MachineType::I32), Type::integer())
        }),
    );
    env.add_version(
        "-",
        CallableVersion::emit(float2(), Type::float(), |e, args| {
            TypedValue::temporary(e.sub(args[0].reg, args[1].reg, MachineType::F64), Type::float())
        }),
    );
    env.add_version(
        "-",
        CallableVersion::runtime(any2(), Type::any(), natives::rt_sub_any),
    );

    env.add_version(
        "*",
        CallableVersion::emit(int2(), Type::integer(), |e, args| {
            TypedValue::temporary(e.mul(args[0].reg, args[1].reg, MachineType::I32), Type::integer())
        }),
    );
    env.add_version(
        "*",
        CallableVersion::emit(float2(), Type::float(), |e, args| {
            TypedValue::temporary(e.mul(args[0].reg, args[1].reg, MachineType::F64), Type::float())
        }),
    );
    env.add_version(
        "*",
        CallableVersion::runtime(any2(), Type::any(), natives::rt_mul_any),
    );

    // Division always produces a real, whatever the operands.
    env.add_version(
        "/",
        CallableVersion::emit(float2(), Type::float(), |e, args| {
            TypedValue::temporary(e.div(args[0].reg, args[1].reg), Type::float())
        }),
    );
    env.add_version(
        "/",
        CallableVersion::runtime(any2(), Type::any(), natives::rt_div_any),
    );

    env.add_version(
        "%",
        CallableVersion::emit(int2(), Type::integer(), |e, args| {
            TypedValue::temporary(e.rem(args[0].reg, args[1].reg, MachineType::I32), Type::integer())
        }),
    );
    env.add_version(
        "%",
        CallableVersion::emit(float2(), Type::float(), |e, args| {
            TypedValue::temporary(e.rem(args[0].reg, args[1].reg, MachineType::F64), Type::float())
        }),
    );
    env.add_version(
        "%",
        CallableVersion::runtime(any2(), Type::any(), natives::rt_rem_any),
    );
}

fn register_comparison(env: &mut Environment) {
    env.add_version(
        "==",
        CallableVersion::emit(int2(), Type::boolean(), |e, args| {
            TypedValue::temporary(e.eq(args[0].reg, args[1].reg, MachineType::I32), Type::boolean())
        }),
    );
    env.add_version(
        "==",
        CallableVersion::emit(float2(), Type::boolean(), |e, args| {
            TypedValue::temporary(e.eq(args[0].reg, args[1].reg, MachineType::F64), Type::boolean())
        }),
    );
    env.add_version(
        "==",
        CallableVersion::runtime(any2(), Type::boolean(), natives::rt_eq_any),
    );

    env.add_version(
        "<",
        CallableVersion::emit(int2(), Type::boolean(), |e, args| {
            TypedValue::temporary(e.lt(args[0].reg, args[1].reg, MachineType::I32), Type::boolean())
        }),
    );
    env.add_version(
        "<",
        CallableVersion::emit(float2(), Type::boolean(), |e, args| {
            TypedValue::temporary(e.lt(args[0].reg, args[1].reg, MachineType::F64), Type::boolean())
        }),
    );
    env.add_version(
        "<",
        CallableVersion::runtime(any2(), Type::boolean(), natives::rt_lt_any),
    );
}

fn register_array_methods(env: &mut Environment) {
    // The receiver is the first argument. Pushing widens the declared
    // element type of the receiving array variable.
    env.add_method(
        "Array",
        "push",
        CallableVersion::runtime(
            vec![Type::array_of(Type::integer()), Type::integer()],
            Type::void(),
            natives::rt_array_push_int,
        )
        .with_mutator(Mutator::WillStoreElement {
            container: 0,
            value: 1,
        }),
    );
    env.add_method(
        "Array",
        "push",
        CallableVersion::runtime(
            vec![Type::array_of(Type::float()), Type::float()],
            Type::void(),
            natives::rt_array_push_float,
        )
        .with_mutator(Mutator::WillStoreElement {
            container: 0,
            value: 1,
        }),
    );
    env.add_method(
        "Array",
        "push",
        CallableVersion::runtime(
            vec![Type::ptr_array(), Type::any()],
            Type::void(),
            natives::rt_array_push_ptr,
        )
        .with_mutator(Mutator::WillStoreElement {
            container: 0,
            value: 1,
        }),
    );
}

fn int2() -> Vec<Type> {
    vec![Type::integer(), Type::integer()]
}

fn long2() -> Vec<Type> {
    vec![Type::long(), Type::long()]
}

fn float2() -> Vec<Type> {
    vec![Type::float(), Type::float()]
}

fn any2() -> Vec<Type> {
    vec![Type::any(), Type::any()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_register_operator_versions() {
        let env = Environment::with_builtins();
        let plus = env.callable("+").unwrap();
        assert_eq!(plus.versions.len(), 4);
        assert!(env.callable("<").is_some());
        assert!(env.method("Array", "push").is_some());
    }
}
