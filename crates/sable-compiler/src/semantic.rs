//! Analyzer-side glue: scopes, declared variables, and mutators.
//!
//! The [`Analyzer`] carries the environment reference, the collected
//! semantic errors, and the lexical scope stack of declared variables.
//! It is the piece the parser's `analyze` operations talk to: it resolves
//! call sites, records errors instead of propagating them, and interprets
//! post-resolution [`Mutator`]s, most importantly retroactive widening of a
//! container variable's declared element type (`will_take_element`).

use rustc_hash::FxHashMap;

use sable_core::error::SemanticError;
use sable_core::span::Span;
use sable_core::types::{Nature, Type};
use sable_registry::{CallableVersion, Environment, Mutator};

use crate::overload::Call;

/// A variable declared during analysis.
#[derive(Debug, Clone)]
pub struct SemanticVar {
    pub name: String,
    pub ty: Type,
    pub constant: bool,
}

/// View of one call argument handed to mutators: its analyzed type, and the
/// variable it reads from when it is a plain variable reference.
#[derive(Debug, Clone)]
pub struct CallArg {
    pub ty: Type,
    pub variable: Option<String>,
}

impl CallArg {
    pub fn of(ty: Type) -> Self {
        Self { ty, variable: None }
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Self {
            ty,
            variable: Some(name.into()),
        }
    }
}

/// The semantic analyzer state threaded through a program's `analyze` pass.
pub struct Analyzer<'e> {
    pub env: &'e Environment,
    pub errors: Vec<SemanticError>,
    scopes: Vec<FxHashMap<String, SemanticVar>>,
    loop_depth: u32,
}

impl<'e> Analyzer<'e> {
    pub fn new(env: &'e Environment) -> Self {
        Self {
            env,
            errors: Vec::new(),
            scopes: vec![FxHashMap::default()],
            loop_depth: 0,
        }
    }

    /// Analysis succeeded only when nothing was recorded.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, error: SemanticError) {
        self.errors.push(error);
    }

    // ==========================================================================
    // Scopes
    // ==========================================================================

    pub fn enter_block(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn leave_block(&mut self) {
        self.scopes.pop();
    }

    pub fn enter_loop(&mut self) {
        self.loop_depth += 1;
    }

    pub fn leave_loop(&mut self) {
        self.loop_depth -= 1;
    }

    pub fn in_loop(&self) -> bool {
        self.loop_depth > 0
    }

    /// Declare a variable in the innermost scope. Shadowing an outer
    /// declaration is allowed; lookups see the innermost one.
    pub fn declare_var(&mut self, name: impl Into<String>, ty: Type) {
        let name = name.into();
        let var = SemanticVar {
            name: name.clone(),
            ty,
            constant: false,
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, var);
        }
    }

    pub fn var(&self, name: &str) -> Option<&SemanticVar> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn var_mut(&mut self, name: &str) -> Option<&mut SemanticVar> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }

    /// The declared type of a variable, recording an error if it is unknown.
    pub fn var_type(&mut self, name: &str, span: Span) -> Type {
        match self.var(name) {
            Some(var) => var.ty.clone(),
            None => {
                self.error(SemanticError::UndefinedVariable {
                    name: name.to_string(),
                    span,
                });
                Type::any()
            }
        }
    }

    // ==========================================================================
    // Widening
    // ==========================================================================

    /// A container variable is about to store a value of `element`: widen its
    /// declared element type to cover it. Arrays and sets widen their single
    /// element, maps their value.
    pub fn will_take_element(&mut self, name: &str, element: &Type) {
        let Some(var) = self.var_mut(name) else {
            return;
        };
        let arity = var.ty.kind.element_arity();
        if arity == 0 {
            return;
        }
        let index = arity - 1;
        let widened = var.ty.element_type(index).mix(element);
        var.ty.set_element_type(index, widened);
    }

    // ==========================================================================
    // Call resolution
    // ==========================================================================

    /// Resolve a call site, recording a no-applicable-overload error when
    /// nothing matches.
    pub fn resolve_call(
        &mut self,
        name: &str,
        call: &Call<'e>,
        arguments: &[Type],
        span: Span,
    ) -> Option<&'e CallableVersion> {
        match call.resolve(arguments) {
            Some(version) => Some(version),
            None => {
                let arguments = arguments
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.error(SemanticError::NoApplicableOverload {
                    name: name.to_string(),
                    arguments,
                    span,
                });
                None
            }
        }
    }

    /// Run a chosen version's mutators, in declaration order, against the
    /// actual argument views (receiver first when the call has one).
    pub fn apply_mutators(&mut self, version: &CallableVersion, arguments: &mut [CallArg]) {
        for mutator in &version.mutators {
            match mutator {
                Mutator::WillStoreElement { container, value } => {
                    let element = arguments[*value].ty.clone();
                    self.widen_container_arg(arguments, *container, &element);
                }
                Mutator::WillTakeElement { container, ty } => {
                    let element = ty.clone();
                    self.widen_container_arg(arguments, *container, &element);
                }
            }
        }
    }

    fn widen_container_arg(&mut self, arguments: &mut [CallArg], index: usize, element: &Type) {
        if let Some(name) = arguments[index].variable.clone() {
            self.will_take_element(&name, element);
            if let Some(var) = self.var(&name) {
                arguments[index].ty = var.ty.clone();
            }
        } else {
            let arg = &mut arguments[index];
            let arity = arg.ty.kind.element_arity();
            if arity > 0 {
                let slot = arity - 1;
                let widened = arg.ty.element_type(slot).mix(element);
                arg.ty.set_element_type(slot, widened);
            }
        }
    }
}

/// Fold the member types of a container literal into one element type.
///
/// Any is the neutral element; the fold never fails. A non-numeric
/// value-natured result cannot be stored uniformly and escalates to the
/// generic boxed representation, as does a still-dynamic result.
pub fn merge_literal_elements(members: &[Type]) -> Type {
    let mut element = Type::any();
    for member in members {
        element = Type::get_compatible_type(&element, member);
    }
    match element.nature {
        Nature::Value if !element.is_numeric() => Type::pointer(),
        Nature::Any => Type::pointer(),
        _ => element,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_registry::{Callable, CallableVersion, Mutator};

    fn env() -> Environment {
        Environment::with_builtins()
    }

    #[test]
    fn undefined_variable_is_collected_not_fatal() {
        let env = env();
        let mut analyzer = Analyzer::new(&env);
        let ty = analyzer.var_type("missing", Span::point(1, 1));
        assert_eq!(ty, Type::any());
        assert_eq!(analyzer.errors.len(), 1);
        assert!(!analyzer.success());
    }

    #[test]
    fn scopes_shadow_and_restore() {
        let env = env();
        let mut analyzer = Analyzer::new(&env);
        analyzer.declare_var("x", Type::integer());
        analyzer.enter_block();
        analyzer.declare_var("x", Type::float());
        assert_eq!(analyzer.var("x").unwrap().ty, Type::float());
        analyzer.leave_block();
        assert_eq!(analyzer.var("x").unwrap().ty, Type::integer());
    }

    #[test]
    fn will_take_element_widens_arrays() {
        let env = env();
        let mut analyzer = Analyzer::new(&env);
        analyzer.declare_var("a", Type::array_of(Type::integer()));
        analyzer.will_take_element("a", &Type::float());
        assert_eq!(
            analyzer.var("a").unwrap().ty.element_type(0),
            Type::float()
        );
    }

    #[test]
    fn will_take_element_widens_map_values() {
        let env = env();
        let mut analyzer = Analyzer::new(&env);
        analyzer.declare_var("m", Type::map_of(Type::integer(), Type::integer()));
        analyzer.will_take_element("m", &Type::string());
        let ty = &analyzer.var("m").unwrap().ty;
        assert_eq!(ty.element_type(0), Type::integer());
        assert_eq!(ty.element_type(1).nature, Nature::Pointer);
    }

    #[test]
    fn push_mutator_widens_the_receiver_variable() {
        let env = env();
        let mut analyzer = Analyzer::new(&env);
        analyzer.declare_var("a", Type::array_of(Type::integer()));

        let push = env.method("Array", "push").unwrap();
        let mut call = Call::with_receiver(analyzer.var("a").unwrap().ty.clone());
        call.add_callable(push);
        let version = call
            .resolve(&[Type::float()])
            .expect("push must resolve for a float element");

        let mut args = vec![
            CallArg::var("a", Type::array_of(Type::integer())),
            CallArg::of(Type::float()),
        ];
        analyzer.apply_mutators(version, &mut args);

        assert_eq!(
            analyzer.var("a").unwrap().ty.element_type(0),
            Type::float()
        );
        assert_eq!(args[0].ty.element_type(0), Type::float());
    }

    #[test]
    fn mutators_without_a_variable_still_widen_the_view() {
        let env = env();
        let mut analyzer = Analyzer::new(&env);
        let version = CallableVersion::runtime(
            vec![Type::array_of(Type::integer()), Type::any()],
            Type::void(),
            sable_core::runtime::natives::rt_array_push_ptr,
        )
        .with_mutator(Mutator::WillTakeElement {
            container: 0,
            ty: Type::float(),
        });
        let mut args = vec![
            CallArg::of(Type::array_of(Type::integer())),
            CallArg::of(Type::float()),
        ];
        analyzer.apply_mutators(&version, &mut args);
        assert_eq!(args[0].ty.element_type(0), Type::float());
    }

    #[test]
    fn unresolvable_call_records_the_error() {
        let env = env();
        let mut analyzer = Analyzer::new(&env);
        let mut callable = Callable::new("f");
        callable.add_version(CallableVersion::runtime(
            vec![Type::integer()],
            Type::integer(),
            sable_core::runtime::natives::rt_add_any,
        ));
        let mut call = Call::new();
        call.add_callable(&callable);
        let resolved = analyzer.resolve_call("f", &call, &[Type::string()], Span::point(4, 2));
        assert!(resolved.is_none());
        assert!(matches!(
            analyzer.errors[0],
            SemanticError::NoApplicableOverload { .. }
        ));
    }

    #[test]
    fn literal_merging_promotes_numerics() {
        let merged = merge_literal_elements(&[Type::integer(), Type::float()]);
        assert_eq!(merged, Type::float());
    }

    #[test]
    fn literal_merging_of_mixed_kinds_boxes() {
        let merged = merge_literal_elements(&[Type::integer(), Type::string()]);
        assert_eq!(merged, Type::pointer());
    }

    #[test]
    fn empty_literal_is_boxed_generic() {
        assert_eq!(merge_literal_elements(&[]), Type::pointer());
    }
}
