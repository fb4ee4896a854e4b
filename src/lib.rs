//! # The P programming language
//!
//! P is a small block-structured language descended from Wirth's PL/0,
//! with types, records, arrays, pointers and real arithmetic added. This
//! crate compiles P source in a single pass to bytecode for a stack
//! machine, then runs the bytecode on that machine.
//!
//! ```text
//! program answer;
//! var n: integer;
//! begin
//!     n := 6 * 7;
//!     writeln(n)
//! end.
//! ```
//!
//! The [`lang`] module covers lexical analysis and the shared error type;
//! [`mach`] holds the compiler and the machine.

pub mod lang;
pub mod mach;
