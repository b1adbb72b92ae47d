//! The structural type model.
//!
//! Every value in a sable program is described by a [`Type`]: its raw kind,
//! its representation nature (inline/unboxed [`Nature::Value`] vs
//! heap/reference-counted [`Nature::Pointer`]), and, for containers and
//! functions, the sub-types of its elements, arguments, and returns.
//!
//! Types are resolved locally, expression by expression. There is no general
//! unification: merging happens through [`Type::mix`] (assignment/branch
//! merging, which may box a value) and [`Type::get_compatible_type`]
//! (literal-element folding, which never fails and degrades to the generic
//! pointer type).

use std::fmt;

/// The raw kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Unknown,
    Void,
    Null,
    Boolean,
    Integer,
    Long,
    Float,
    String,
    Array,
    Map,
    Set,
    Interval,
    Object,
    Function,
    Class,
}

impl Kind {
    /// Numeric kinds participate in promotion (Integer → Long → Float).
    pub fn is_numeric(self) -> bool {
        matches!(self, Kind::Integer | Kind::Long | Kind::Float)
    }

    /// Element arity a container of this kind must carry.
    pub fn element_arity(self) -> usize {
        match self {
            Kind::Array | Kind::Set => 1,
            Kind::Map => 2,
            _ => 0,
        }
    }

    fn numeric_rank(self) -> u32 {
        match self {
            Kind::Integer => 0,
            Kind::Long => 1,
            Kind::Float => 2,
            _ => u32::MAX,
        }
    }
}

/// How a value is represented at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nature {
    /// Inline, unboxed. Only Integer, Long, Float and Boolean qualify.
    Value,
    /// A heap-allocated, reference-counted object.
    Pointer,
    /// Statically unconstrained; representable only boxed.
    Any,
    /// Produces no value.
    Void,
}

/// The minimal target-independent descriptor handed to the emitter.
///
/// Derived from a type's nature plus raw kind; this is all the instruction
/// layer ever sees of the type model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineType {
    I32,
    I64,
    F64,
    Ptr,
    Void,
}

/// A structural type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub kind: Kind,
    pub nature: Nature,
    /// Memory management of this value happens outside the language
    /// (e.g. the null/true/false singletons).
    pub native: bool,
    /// The value is a compile-time constant.
    pub constant: bool,
    /// For Object/Class types, the class this value belongs to.
    pub class_name: Option<String>,
    /// Element types: one entry for Array/Set, key then value for Map.
    pub element_types: Vec<Type>,
    /// Argument types of a Function type.
    pub argument_types: Vec<Type>,
    /// Return types of a Function type.
    pub return_types: Vec<Type>,
}

impl Default for Type {
    fn default() -> Self {
        Type::unknown()
    }
}

impl Type {
    pub const fn base(kind: Kind, nature: Nature) -> Self {
        Type {
            kind,
            nature,
            native: false,
            constant: false,
            class_name: None,
            element_types: Vec::new(),
            argument_types: Vec::new(),
            return_types: Vec::new(),
        }
    }

    pub const fn unknown() -> Self {
        Type::base(Kind::Unknown, Nature::Value)
    }

    /// The fully generic type: statically nothing is known.
    pub const fn any() -> Self {
        Type::base(Kind::Unknown, Nature::Any)
    }

    /// A boxed value of unknown kind.
    pub const fn pointer() -> Self {
        Type::base(Kind::Unknown, Nature::Pointer)
    }

    pub const fn void() -> Self {
        Type::base(Kind::Void, Nature::Void)
    }

    pub fn null() -> Self {
        let mut t = Type::base(Kind::Null, Nature::Pointer);
        t.native = true;
        t
    }

    pub const fn boolean() -> Self {
        Type::base(Kind::Boolean, Nature::Value)
    }

    pub const fn integer() -> Self {
        Type::base(Kind::Integer, Nature::Value)
    }

    pub const fn long() -> Self {
        Type::base(Kind::Long, Nature::Value)
    }

    pub const fn float() -> Self {
        Type::base(Kind::Float, Nature::Value)
    }

    pub const fn string() -> Self {
        Type::base(Kind::String, Nature::Pointer)
    }

    pub const fn interval() -> Self {
        Type::base(Kind::Interval, Nature::Pointer)
    }

    pub fn array_of(element: Type) -> Self {
        let mut t = Type::base(Kind::Array, Nature::Pointer);
        t.element_types = vec![element];
        t
    }

    pub fn set_of(element: Type) -> Self {
        let mut t = Type::base(Kind::Set, Nature::Pointer);
        t.element_types = vec![element];
        t
    }

    pub fn map_of(key: Type, value: Type) -> Self {
        let mut t = Type::base(Kind::Map, Nature::Pointer);
        t.element_types = vec![key, value];
        t
    }

    pub fn int_array() -> Self {
        Type::array_of(Type::integer())
    }

    pub fn float_array() -> Self {
        Type::array_of(Type::float())
    }

    pub fn ptr_array() -> Self {
        Type::array_of(Type::pointer())
    }

    pub fn object(class_name: impl Into<String>) -> Self {
        let mut t = Type::base(Kind::Object, Nature::Pointer);
        t.class_name = Some(class_name.into());
        t
    }

    pub fn class(name: impl Into<String>) -> Self {
        let mut t = Type::base(Kind::Class, Nature::Pointer);
        t.class_name = Some(name.into());
        t
    }

    pub fn function(return_type: Type, argument_types: Vec<Type>) -> Self {
        let mut t = Type::base(Kind::Function, Nature::Pointer);
        t.return_types = vec![return_type];
        t.argument_types = argument_types;
        t
    }

    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }

    pub fn not_constant(mut self) -> Self {
        self.constant = false;
        self
    }

    pub fn boxed(mut self) -> Self {
        self.nature = Nature::Pointer;
        self
    }

    // ==========================================================================
    // Accessors
    // ==========================================================================

    pub fn is_numeric(&self) -> bool {
        self.kind.is_numeric()
    }

    pub fn is_container(&self) -> bool {
        self.kind.element_arity() > 0
    }

    pub fn is_void(&self) -> bool {
        self.kind == Kind::Void
    }

    /// A value of this type owns a heap reference the code generator must
    /// balance with acquire/release.
    pub fn must_manage_memory(&self) -> bool {
        matches!(self.nature, Nature::Pointer | Nature::Any) && !self.native
    }

    /// The i-th element type, or Unknown if not yet refined.
    ///
    /// Index 0 is the element of an Array/Set or the key of a Map;
    /// index 1 is a Map's value.
    pub fn element_type(&self, i: usize) -> Type {
        self.element_types.get(i).cloned().unwrap_or_else(Type::unknown)
    }

    /// Replace the i-th element type, keeping `element_types` sized to the
    /// container's arity. Calling this on a non-container or out of arity is
    /// an analyzer bug and fails fast.
    pub fn set_element_type(&mut self, i: usize, element: Type) {
        let arity = self.kind.element_arity();
        assert!(
            i < arity,
            "set_element_type({i}) on {:?} with arity {arity}",
            self.kind
        );
        self.element_types.resize(arity, Type::unknown());
        self.element_types[i] = element;
    }

    pub fn return_type(&self) -> Type {
        self.return_types.first().cloned().unwrap_or_else(Type::unknown)
    }

    pub fn set_return_type(&mut self, t: Type) {
        self.return_types = vec![t];
    }

    pub fn argument_type(&self, i: usize) -> Type {
        self.argument_types.get(i).cloned().unwrap_or_else(Type::unknown)
    }

    pub fn add_argument_type(&mut self, t: Type) {
        self.argument_types.push(t);
    }

    /// All element types agree (a container literal with uniform members).
    pub fn is_homogeneous(&self) -> bool {
        self.element_types.windows(2).all(|w| w[0] == w[1])
    }

    /// The target-independent descriptor for the emitter boundary.
    pub fn machine_type(&self) -> MachineType {
        match self.nature {
            Nature::Void => MachineType::Void,
            Nature::Pointer | Nature::Any => MachineType::Ptr,
            Nature::Value => match self.kind {
                Kind::Void => MachineType::Void,
                Kind::Integer | Kind::Boolean | Kind::Unknown => MachineType::I32,
                Kind::Long => MachineType::I64,
                Kind::Float => MachineType::F64,
                _ => MachineType::Ptr,
            },
        }
    }

    // ==========================================================================
    // Merging
    // ==========================================================================

    /// The most specific type representable by both `self` and `other`.
    ///
    /// Numeric kinds promote Integer → Long → Float. Mixing a pointer-natured
    /// value with a value-natured one escalates the result to pointer nature:
    /// the merged value must be representable uniformly, so it is boxed.
    /// Mixing with Any boxes a value-natured result for the same reason.
    pub fn mix(&self, other: &Type) -> Type {
        if self == other {
            return self.clone();
        }
        let boxed = matches!(self.nature, Nature::Pointer | Nature::Any)
            || matches!(other.nature, Nature::Pointer | Nature::Any);
        if self.is_numeric() && other.is_numeric() {
            let kind = if self.kind.numeric_rank() >= other.kind.numeric_rank() {
                self.kind
            } else {
                other.kind
            };
            let mut t = Type::base(kind, Nature::Value);
            if boxed {
                t.nature = Nature::Pointer;
            }
            return t;
        }
        if self.kind == Kind::Unknown {
            return widen(other.clone(), boxed);
        }
        if other.kind == Kind::Unknown {
            return widen(self.clone(), boxed);
        }
        if self.kind == other.kind {
            let mut t = Type::base(self.kind, if boxed { Nature::Pointer } else { self.nature });
            let arity = self.kind.element_arity();
            for i in 0..arity {
                t.set_element_type(i, self.element_type(i).mix(&other.element_type(i)));
            }
            return t;
        }
        // No common kind: only the boxed generic representation remains.
        Type::pointer()
    }

    /// Merge element types across heterogeneous literal members.
    ///
    /// Same promotion rules as [`Type::mix`], but Any is the neutral element
    /// and the merge never fails: the worst case is the generic pointer type.
    pub fn get_compatible_type(a: &Type, b: &Type) -> Type {
        if a == b {
            return a.clone();
        }
        if a.kind == Kind::Unknown {
            return b.clone();
        }
        if b.kind == Kind::Unknown {
            return a.clone();
        }
        if a.is_numeric() && b.is_numeric() {
            let kind = if a.kind.numeric_rank() >= b.kind.numeric_rank() {
                a.kind
            } else {
                b.kind
            };
            let nature = if a.nature == Nature::Value && b.nature == Nature::Value {
                Nature::Value
            } else {
                Nature::Pointer
            };
            return Type::base(kind, nature);
        }
        if a.kind == b.kind {
            return a.mix(b);
        }
        Type::pointer()
    }

    // ==========================================================================
    // Compatibility
    // ==========================================================================

    /// Whether a value of type `arg` can be passed where `self` is required.
    ///
    /// This is the compatibility half of the partial order the resolver
    /// scores against: exact matches, numeric widening, boxing into a
    /// pointer/Any parameter, and dynamic arguments into pointer parameters.
    pub fn accepts(&self, arg: &Type) -> bool {
        if self.kind == Kind::Unknown || self.nature == Nature::Any {
            return true;
        }
        if self.kind == arg.kind && self.nature == arg.nature {
            return true;
        }
        if self.is_numeric() && arg.is_numeric() {
            // Widening only; narrowing requires an explicit conversion.
            return arg.kind.numeric_rank() <= self.kind.numeric_rank();
        }
        if self.nature == Nature::Pointer {
            // A boxed parameter takes any boxed argument of the same kind,
            // a dynamic argument, or a boxable value.
            if arg.nature == Nature::Any || arg.kind == Kind::Unknown {
                return true;
            }
            if arg.kind == self.kind {
                return true;
            }
            if self.kind == Kind::Unknown {
                return true;
            }
        }
        false
    }

    /// Whether `self` is strictly more specific than `other`.
    ///
    /// A concrete type is always more specific than Any/Unknown; a
    /// value-natured numeric is more specific than its boxed counterpart;
    /// lower numeric ranks are more specific than higher ones.
    pub fn more_specific(&self, other: &Type) -> bool {
        if other.kind == Kind::Unknown || other.nature == Nature::Any {
            return self.kind != Kind::Unknown && self.nature != Nature::Any;
        }
        if self.kind == other.kind {
            if self.nature == Nature::Value && other.nature == Nature::Pointer {
                return true;
            }
            return false;
        }
        if self.is_numeric() && other.is_numeric() {
            return self.kind.numeric_rank() < other.kind.numeric_rank();
        }
        false
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Unknown => match self.nature {
                Nature::Any => write!(f, "any"),
                Nature::Pointer => write!(f, "ptr"),
                _ => write!(f, "?"),
            },
            Kind::Void => write!(f, "void"),
            Kind::Null => write!(f, "null"),
            Kind::Boolean => write!(f, "bool"),
            Kind::Integer => write!(f, "int"),
            Kind::Long => write!(f, "long"),
            Kind::Float => write!(f, "real"),
            Kind::String => write!(f, "string"),
            Kind::Array => write!(f, "array<{}>", self.element_type(0)),
            Kind::Set => write!(f, "set<{}>", self.element_type(0)),
            Kind::Map => write!(
                f,
                "map<{}, {}>",
                self.element_type(0),
                self.element_type(1)
            ),
            Kind::Interval => write!(f, "interval"),
            Kind::Object => write!(f, "object"),
            Kind::Function => write!(f, "function"),
            Kind::Class => write!(f, "class"),
        }
    }
}

fn widen(mut t: Type, boxed: bool) -> Type {
    if boxed && t.nature == Nature::Value {
        t.nature = Nature::Pointer;
    }
    t
}
