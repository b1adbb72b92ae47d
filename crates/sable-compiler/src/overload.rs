//! Overload resolution.
//!
//! Given the callables aggregated at a call site and the concrete argument
//! types, every version is scored: a non-negative distance summed over the
//! positions, or [`INCOMPATIBLE`] if any position cannot accept its
//! argument. The lowest total wins. Ties go to the version enumerated
//! *last*: registration order is declaration order, so user-registered
//! versions shadow built-ins. Versions flagged DEFAULT are skipped during
//! normal resolution.
//!
//! When the call binds a receiver, its type is prepended to the argument
//! list before scoring, and to the argument views before mutators run.

use sable_core::types::{Kind, Nature, Type};
use sable_registry::{Callable, CallableVersion, VersionFlags};

/// Sentinel score for a version that cannot accept the arguments.
pub const INCOMPATIBLE: u32 = u32::MAX;

/// Cost of one numeric widening step (Integer → Long → Float).
const COST_WIDEN_STEP: u32 = 1;
/// Same kind and nature but different element detail.
const COST_SAME_KIND: u32 = 1;
/// Any boxed argument into the generic pointer parameter.
const COST_GENERIC_PTR: u32 = 2;
/// Boxing a value-natured argument.
const COST_BOX: u32 = 4;
/// A dynamic argument into a concrete boxed parameter (runtime-checked).
const COST_FROM_ANY: u32 = 6;
/// Anything into a fully dynamic parameter.
const COST_TO_ANY: u32 = 8;

/// Distance from an argument type to a parameter type, or None when the
/// parameter cannot accept the argument. Exact type+nature matches cost 0;
/// every grain of generality the parameter has to provide costs more.
pub fn argument_distance(arg: &Type, param: &Type) -> Option<u32> {
    if param == arg {
        return Some(0);
    }
    if param.kind == arg.kind && param.nature == arg.nature {
        let exact_elements = param.element_types.is_empty()
            || param.element_types == arg.element_types;
        return Some(if exact_elements { 0 } else { COST_SAME_KIND });
    }
    if param.nature == Nature::Any {
        return Some(COST_TO_ANY);
    }
    if param.is_numeric() && arg.is_numeric() {
        let steps = param
            .kind
            .numeric_distance(arg.kind)?;
        let boxing = if param.nature == Nature::Pointer && arg.nature == Nature::Value {
            COST_BOX
        } else {
            0
        };
        return Some(steps * COST_WIDEN_STEP + boxing);
    }
    if param.nature == Nature::Pointer {
        if param.kind == Kind::Unknown {
            // The generic boxed parameter.
            return Some(if arg.nature == Nature::Value {
                COST_BOX + COST_GENERIC_PTR
            } else {
                COST_GENERIC_PTR
            });
        }
        if arg.nature == Nature::Any || arg.kind == Kind::Unknown {
            return Some(COST_FROM_ANY);
        }
    }
    None
}

/// Total score of a version against a concrete argument list.
pub fn version_score(version: &CallableVersion, arguments: &[Type]) -> u32 {
    if version.arity() != arguments.len() {
        return INCOMPATIBLE;
    }
    let mut total = 0u32;
    for (arg, param) in arguments.iter().zip(&version.argument_types) {
        match argument_distance(arg, param) {
            Some(distance) => total = total.saturating_add(distance),
            None => return INCOMPATIBLE,
        }
    }
    total
}

/// A call site: one or more callables (a free function plus extension
/// methods, or every module contributing versions for an operator), plus an
/// optional bound receiver whose type is prepended before scoring.
#[derive(Default)]
pub struct Call<'e> {
    callables: Vec<&'e Callable>,
    receiver: Option<Type>,
}

impl<'e> Call<'e> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receiver(receiver: Type) -> Self {
        Self {
            callables: Vec::new(),
            receiver: Some(receiver),
        }
    }

    pub fn add_callable(&mut self, callable: &'e Callable) -> &mut Self {
        self.callables.push(callable);
        self
    }

    pub fn receiver(&self) -> Option<&Type> {
        self.receiver.as_ref()
    }

    /// Resolve the cheapest applicable version for these argument types.
    ///
    /// Deterministic: the minimum score wins, and on ties the version
    /// enumerated last among the tied candidates.
    pub fn resolve(&self, arguments: &[Type]) -> Option<&'e CallableVersion> {
        let full: Vec<Type> = self
            .receiver
            .iter()
            .cloned()
            .chain(arguments.iter().cloned())
            .collect();
        let mut best: Option<&'e CallableVersion> = None;
        let mut best_score = INCOMPATIBLE;
        for callable in &self.callables {
            for version in &callable.versions {
                if version.flags.contains(VersionFlags::DEFAULT) {
                    continue;
                }
                let score = version_score(version, &full);
                if score != INCOMPATIBLE && (best.is_none() || score <= best_score) {
                    best_score = score;
                    best = Some(version);
                }
            }
        }
        best
    }
}

trait NumericDistance {
    fn numeric_distance(self, from: Kind) -> Option<u32>;
}

impl NumericDistance for Kind {
    /// Widening steps from `from` to `self`, None if it would narrow.
    fn numeric_distance(self, from: Kind) -> Option<u32> {
        let rank = |kind: Kind| match kind {
            Kind::Integer => Some(0u32),
            Kind::Long => Some(1),
            Kind::Float => Some(2),
            _ => None,
        };
        let to = rank(self)?;
        let from = rank(from)?;
        if from <= to { Some(to - from) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::runtime::natives::{rt_add_any, rt_sub_any};
    use sable_registry::CallableVersion;

    fn version(args: Vec<Type>, ret: Type) -> CallableVersion {
        CallableVersion::runtime(args, ret, rt_add_any)
    }

    fn other_version(args: Vec<Type>, ret: Type) -> CallableVersion {
        CallableVersion::runtime(args, ret, rt_sub_any)
    }

    #[test]
    fn exact_match_costs_zero() {
        assert_eq!(
            argument_distance(&Type::integer(), &Type::integer()),
            Some(0)
        );
    }

    #[test]
    fn widening_costs_per_step() {
        assert_eq!(argument_distance(&Type::integer(), &Type::long()), Some(1));
        assert_eq!(argument_distance(&Type::integer(), &Type::float()), Some(2));
        assert_eq!(argument_distance(&Type::long(), &Type::float()), Some(1));
    }

    #[test]
    fn narrowing_is_incompatible() {
        assert_eq!(argument_distance(&Type::float(), &Type::integer()), None);
        assert_eq!(argument_distance(&Type::long(), &Type::integer()), None);
    }

    #[test]
    fn any_parameter_accepts_all_with_penalty() {
        let to_any = argument_distance(&Type::integer(), &Type::any());
        assert!(to_any.is_some());
        assert!(to_any.unwrap() > argument_distance(&Type::integer(), &Type::float()).unwrap());
    }

    #[test]
    fn plus_integer_float_selects_float_version() {
        let mut callable = Callable::new("+");
        callable.add_version(version(
            vec![Type::integer(), Type::integer()],
            Type::integer(),
        ));
        callable.add_version(version(vec![Type::float(), Type::float()], Type::float()));
        callable.add_version(version(vec![Type::any(), Type::any()], Type::any()));

        let mut call = Call::new();
        call.add_callable(&callable);
        let selected = call
            .resolve(&[Type::integer(), Type::float()])
            .expect("a version must apply");
        assert_eq!(selected.return_type, Type::float());
        assert_eq!(
            selected.argument_types,
            vec![Type::float(), Type::float()]
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let mut callable = Callable::new("f");
        callable.add_version(version(vec![Type::integer()], Type::integer()));
        callable.add_version(version(vec![Type::float()], Type::float()));
        let mut call = Call::new();
        call.add_callable(&callable);
        for _ in 0..10 {
            let selected = call.resolve(&[Type::integer()]).unwrap();
            assert_eq!(selected.return_type, Type::integer());
        }
    }

    #[test]
    fn ties_prefer_the_last_declared_version() {
        let mut callable = Callable::new("f");
        callable.add_version(version(vec![Type::integer()], Type::integer()));
        callable.add_version(other_version(vec![Type::integer()], Type::float()));
        let mut call = Call::new();
        call.add_callable(&callable);
        let selected = call.resolve(&[Type::integer()]).unwrap();
        // Same score; the later one wins.
        assert_eq!(selected.return_type, Type::float());
    }

    #[test]
    fn ties_across_callables_prefer_the_later_callable() {
        let mut builtin = Callable::new("f");
        builtin.add_version(version(vec![Type::integer()], Type::integer()));
        let mut user = Callable::new("f");
        user.add_version(other_version(vec![Type::integer()], Type::long()));

        let mut call = Call::new();
        call.add_callable(&builtin);
        call.add_callable(&user);
        let selected = call.resolve(&[Type::integer()]).unwrap();
        assert_eq!(selected.return_type, Type::long());
    }

    #[test]
    fn default_versions_are_skipped() {
        let mut callable = Callable::new("f");
        callable.add_version(
            version(vec![Type::integer()], Type::integer())
                .with_flags(VersionFlags::DEFAULT),
        );
        let mut call = Call::new();
        call.add_callable(&callable);
        assert!(call.resolve(&[Type::integer()]).is_none());
    }

    #[test]
    fn no_applicable_version_fails() {
        let mut callable = Callable::new("f");
        callable.add_version(version(vec![Type::integer()], Type::integer()));
        let mut call = Call::new();
        call.add_callable(&callable);
        assert!(call.resolve(&[Type::string()]).is_none());
        assert!(call.resolve(&[Type::integer(), Type::integer()]).is_none());
    }

    #[test]
    fn receiver_is_prepended() {
        let mut callable = Callable::new("Array.push");
        callable.add_version(version(
            vec![Type::ptr_array(), Type::any()],
            Type::void(),
        ));
        let mut call = Call::with_receiver(Type::ptr_array());
        call.add_callable(&callable);
        assert!(call.resolve(&[Type::string()]).is_some());
        // Without the receiver the arity no longer matches.
        let mut bare = Call::new();
        bare.add_callable(&callable);
        assert!(bare.resolve(&[Type::string()]).is_none());
    }
}
