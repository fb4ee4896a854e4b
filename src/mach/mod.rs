/*!
## P machine module

The single-pass compiler for P and the stack machine that runs its
bytecode. Code addresses and data addresses index separate spaces; both
are plain `usize` here.

*/

/// Index into the code vector (a program-counter value) or into the data
/// segment (a stack or heap cell).
pub type Address = usize;

mod compile;
mod datum;
mod freestore;
mod instr;
mod machine;
mod symbol;
mod types;

pub use compile::Compiler;
pub use datum::Datum;
pub use freestore::FreeStore;
pub use instr::listing;
pub use instr::Instr;
pub use instr::OpCode;
pub use instr::FRAME_SIZE;
pub use machine::Machine;
pub use machine::Outcome;
pub use symbol::SymKind;
pub use symbol::SymValue;
pub use symbol::SymbolTable;
pub use types::SubRange;
pub use types::TypeDesc;
pub use types::TypePtr;
