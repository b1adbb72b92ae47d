//! The environment: callable and class storage.
//!
//! Symbols are keyed by [`SymbolId`], a stable xxh64 hash of the symbol's
//! name (methods hash as `Class.name`). Registration happens once at
//! startup; lookups afterwards are read-only.

use rustc_hash::FxHashMap;
use xxhash_rust::xxh64::xxh64;

use sable_core::error::RegistrationError;
use sable_core::runtime::NativeFn;
use sable_core::types::Type;

use crate::callable::{Callable, CallableVersion};

/// Stable identity of a registered symbol, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u64);

impl SymbolId {
    pub fn from_name(name: &str) -> Self {
        SymbolId(xxh64(name.as_bytes(), 0))
    }
}

/// Initial value of a declared field.
#[derive(Debug, Clone)]
pub enum FieldInit {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// Value produced by a native accessor at first read.
    Computed(NativeFn),
}

/// An instance field declared on a class.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: Type,
    pub init: FieldInit,
}

/// A static field declared on a class.
#[derive(Debug, Clone)]
pub struct StaticFieldDef {
    pub name: String,
    pub ty: Type,
    pub init: FieldInit,
}

/// A registered class: fields and static fields. Methods are callables keyed
/// `Class.name` in the environment.
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub static_fields: Vec<StaticFieldDef>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            static_fields: Vec::new(),
        }
    }

    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        init: FieldInit,
    ) -> Result<&mut Self, RegistrationError> {
        let name = name.into();
        if self.fields.iter().any(|f| f.name == name) {
            return Err(RegistrationError::DuplicateField {
                class: self.name.clone(),
                field: name,
            });
        }
        self.fields.push(FieldDef { name, ty, init });
        Ok(self)
    }

    pub fn add_static_field(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        init: FieldInit,
    ) -> Result<&mut Self, RegistrationError> {
        let name = name.into();
        if self.static_fields.iter().any(|f| f.name == name) {
            return Err(RegistrationError::DuplicateStaticField {
                class: self.name.clone(),
                field: name,
            });
        }
        self.static_fields.push(StaticFieldDef { name, ty, init });
        Ok(self)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn static_field(&self, name: &str) -> Option<&StaticFieldDef> {
        self.static_fields.iter().find(|f| f.name == name)
    }
}

/// The symbol environment consulted by the resolver and the analyzer.
#[derive(Default)]
pub struct Environment {
    callables: FxHashMap<SymbolId, Callable>,
    classes: FxHashMap<SymbolId, ClassDef>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment with the built-in operators and methods registered.
    pub fn with_builtins() -> Self {
        let mut env = Self::new();
        crate::builtins::register_builtins(&mut env);
        env
    }

    /// The callable registered under `name`, creating it if needed.
    /// Use during the registration phase only.
    pub fn declare_callable(&mut self, name: &str) -> &mut Callable {
        self.callables
            .entry(SymbolId::from_name(name))
            .or_insert_with(|| Callable::new(name))
    }

    /// Append one version to the callable registered under `name`.
    pub fn add_version(&mut self, name: &str, version: CallableVersion) {
        self.declare_callable(name).add_version(version);
    }

    /// Append one version to the method `Class.name`.
    pub fn add_method(&mut self, class: &str, name: &str, version: CallableVersion) {
        self.add_version(&format!("{class}.{name}"), version);
    }

    pub fn callable(&self, name: &str) -> Option<&Callable> {
        self.callables.get(&SymbolId::from_name(name))
    }

    pub fn method(&self, class: &str, name: &str) -> Option<&Callable> {
        self.callable(&format!("{class}.{name}"))
    }

    pub fn register_class(&mut self, class: ClassDef) -> Result<(), RegistrationError> {
        let id = SymbolId::from_name(&class.name);
        if self.classes.contains_key(&id) {
            return Err(RegistrationError::DuplicateClass { name: class.name });
        }
        self.classes.insert(id, class);
        Ok(())
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(&SymbolId::from_name(name))
    }
}
