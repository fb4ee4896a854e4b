use super::LineNumber;

/// A compile or runtime diagnostic. Carries a code, an optional source
/// line, and an optional detail message.
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    code: ErrorCode,
    line: Option<LineNumber>,
    message: Option<String>,
}

/// Build an [`Error`] from a code and an optional formatted detail:
/// `error!(TypeMismatch)` or `error!(SyntaxError; "expected {}", kind)`.
#[macro_export]
macro_rules! error {
    ($code:ident) => {
        $crate::lang::Error::from_code($crate::lang::ErrorCode::$code)
    };
    ($code:ident; $($arg:tt)*) => {
        $crate::lang::Error::from_code($crate::lang::ErrorCode::$code)
            .with_message(format!($($arg)*))
    };
}

impl Error {
    pub fn from_code(code: ErrorCode) -> Error {
        Error {
            code,
            line: None,
            message: None,
        }
    }

    pub fn with_message(mut self, message: String) -> Error {
        self.message = Some(message);
        self
    }

    pub fn in_line_number(mut self, line: LineNumber) -> Error {
        self.line = Some(line);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn line_number(&self) -> Option<LineNumber> {
        self.line
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // compile-time
    SyntaxError,
    Undefined,
    Redefined,
    KindMismatch,
    TypeMismatch,
    ArityMismatch,
    NotOrdinal,
    RangeInverted,
    LossyConversion,
    // runtime
    DivideByZero,
    BadDataType,
    OutOfRange,
    FreeStoreError,
    UnknownInstr,
    InternalError,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ErrorCode::*;
        let s = match self.code {
            SyntaxError => "syntax error",
            Undefined => "undefined identifier",
            Redefined => "previously defined",
            KindMismatch => "kind mismatch",
            TypeMismatch => "incompatible types",
            ArityMismatch => "wrong number of parameters",
            NotOrdinal => "expected ordinal type",
            RangeInverted => "inverted subrange",
            LossyConversion => "rounding real to fit in an integer",
            DivideByZero => "divide by zero",
            BadDataType => "bad data type",
            OutOfRange => "out of range",
            FreeStoreError => "free store error",
            UnknownInstr => "unknown instruction",
            InternalError => "internal error",
        };
        write!(f, "{}", s)?;
        if let Some(message) = &self.message {
            write!(f, "; {}", message)?;
        }
        if let Some(line) = self.line {
            write!(f, " near line {}", line)?;
        }
        Ok(())
    }
}
