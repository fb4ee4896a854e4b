/*!
## P language module

Lexical analysis for P source text, and the error type shared by the
compiler and the machine.

*/

/// 1-based source line number.
pub type LineNumber = usize;

mod error;
mod lex;
mod token;

pub use error::Error;
pub use error::ErrorCode;
pub use lex::lex;
pub use lex::TokenStream;
pub use token::Kind;
pub use token::Token;
