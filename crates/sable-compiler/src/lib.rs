//! The sable compiler middle end.
//!
//! Everything between the (external) parser and the (external) native-code
//! backend:
//!
//! - [`overload`]: multi-version resolution with cost scoring and the
//!   documented last-wins tie-break
//! - [`semantic`]: analyzer state (scopes, declared variables, collected
//!   errors, mutator interpretation)
//! - [`codegen`]: the code generator carrying the reference-counting
//!   discipline (acquire/release/clone/move placement)
//! - [`foreach`]: static and dynamic lowering of iteration
//! - [`bytecode`] + [`chunk_emitter`]: the in-repo instruction-list backend
//!   implementing the emitter boundary

pub mod bytecode;
pub mod chunk_emitter;
pub mod codegen;
pub mod foreach;
pub mod overload;
pub mod semantic;

pub use bytecode::{BinOp, Chunk, Instr, UnOp};
pub use chunk_emitter::ChunkEmitter;
pub use codegen::{Codegen, CompilerVar};
pub use foreach::ForeachBindings;
pub use overload::{argument_distance, version_score, Call, INCOMPATIBLE};
pub use semantic::{merge_literal_elements, Analyzer, CallArg, SemanticVar};
