use super::datum::Datum;
use super::Address;
use crate::error;
use crate::lang::Error;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

// Activation frame layout, as word offsets from the frame pointer.
// Procedures and functions share the same frame shape.
pub const FRAME_BASE: usize = 0;
pub const FRAME_OLD_FP: usize = 1;
pub const FRAME_RET_ADDR: usize = 2;
pub const FRAME_RET_VAL: usize = 3;
pub const FRAME_SIZE: usize = 4;

/// ## Machine operation codes
///
/// The machine has no registers; every operation works on the stack.
/// `x := 3 * y` compiles to
/// `[PUSHVAR x, PUSH 3, PUSHVAR y, EVAL 1, MUL, ASSIGN 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Negate TOS.
    Neg,
    /// Convert integer TOS to real.
    ItoR,
    /// Convert the integer one below TOS to real.
    ItoR2,
    /// Round real TOS to the nearest integer.
    Round,
    /// Truncate real TOS to an integer.
    Trunc,
    Abs,
    Atan,
    Exp,
    Log,

    /// Duplicate TOS.
    Dup,
    Odd,
    /// `PRED ,limit` - TOS - 1; OutOfRange if TOS was <= limit.
    Pred,
    /// `SUCC ,limit` - TOS + 1; OutOfRange if TOS was >= limit.
    Succ,

    Sin,
    Sqr,
    Sqrt,

    /// Pop a count, then that many (value, width, precision) tuples, and
    /// print them on standard output.
    Write,
    /// WRITE followed by a newline.
    Writeln,
    /// Pop a size, allocate that many Datums from the free store, push
    /// the address or 0 when space is short.
    New,
    /// Pop an address and return its block to the free store.
    Dispose,

    Add,
    Sub,
    Mul,
    Div,
    Rem,

    Lt,
    Lte,
    Equ,
    Gte,
    Gt,
    Nequ,

    Lor,
    Land,
    Lnot,

    /// `POP ,n` - discard n Datums.
    Pop,
    /// `PUSH ,const` - push an immediate Datum.
    Push,
    /// `PUSHVAR level,offset` - push base(level) + offset.
    PushVar,
    /// `EVAL ,n` - pop an address, push the n Datums stored there.
    Eval,
    /// `ASSIGN ,n` - store the top n Datums at the address beneath them.
    Assign,
    /// `COPY ,n` - pop dest then src, copy n Datums.
    Copy,

    /// `CALL level,addr` - push a new activation frame and jump.
    Call,
    /// `ENTER ,n` - allocate n locals on the stack.
    Enter,
    /// `RET ,n` - unlink the frame, pop n parameters.
    Ret,
    /// `RETF ,n` - RET, then push the frame's return value slot.
    RetF,
    Jump,
    /// Pop the condition; jump when it is false (0).
    Jneq,

    /// OutOfRange unless TOS >= addr; TOS stays put.
    LLimit,
    /// OutOfRange unless TOS <= addr; TOS stays put.
    ULimit,

    Halt = 255,
}

impl OpCode {
    /// Does the instruction use its level operand?
    pub fn has_level(&self) -> bool {
        matches!(self, OpCode::PushVar | OpCode::Call)
    }

    /// Does the instruction use its addr operand?
    pub fn has_addr(&self) -> bool {
        use OpCode::*;
        matches!(
            self,
            Pred | Succ
                | Pop
                | Push
                | PushVar
                | Eval
                | Assign
                | Copy
                | Call
                | Enter
                | Ret
                | RetF
                | Jump
                | Jneq
                | LLimit
                | ULimit
        )
    }
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    fn try_from(byte: u8) -> Result<OpCode> {
        use OpCode::*;
        const TABLE: [OpCode; 48] = [
            Neg, ItoR, ItoR2, Round, Trunc, Abs, Atan, Exp, Log, Dup, Odd, Pred, Succ, Sin, Sqr,
            Sqrt, Write, Writeln, New, Dispose, Add, Sub, Mul, Div, Rem, Lt, Lte, Equ, Gte, Gt,
            Nequ, Lor, Land, Lnot, Pop, Push, PushVar, Eval, Assign, Copy, Call, Enter, Ret, RetF,
            Jump, Jneq, LLimit, ULimit,
        ];
        if byte == Halt as u8 {
            return Ok(Halt);
        }
        match TABLE.get(byte as usize) {
            Some(op) => Ok(*op),
            None => Err(error!(UnknownInstr; "opcode {}", byte)),
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use OpCode::*;
        let s = match self {
            Neg => "NEG",
            ItoR => "ITOR",
            ItoR2 => "ITOR2",
            Round => "ROUND",
            Trunc => "TRUNC",
            Abs => "ABS",
            Atan => "ATAN",
            Exp => "EXP",
            Log => "LOG",
            Dup => "DUP",
            Odd => "ODD",
            Pred => "PRED",
            Succ => "SUCC",
            Sin => "SIN",
            Sqr => "SQR",
            Sqrt => "SQRT",
            Write => "WRITE",
            Writeln => "WRITELN",
            New => "NEW",
            Dispose => "DISPOSE",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Rem => "REM",
            Lt => "LT",
            Lte => "LTE",
            Equ => "EQU",
            Gte => "GTE",
            Gt => "GT",
            Nequ => "NEQU",
            Lor => "LOR",
            Land => "LAND",
            Lnot => "LNOT",
            Pop => "POP",
            Push => "PUSH",
            PushVar => "PUSHVAR",
            Eval => "EVAL",
            Assign => "ASSIGN",
            Copy => "COPY",
            Call => "CALL",
            Enter => "ENTER",
            Ret => "RET",
            RetF => "RETF",
            Jump => "JUMP",
            Jneq => "JNEQ",
            LLimit => "LLIMIT",
            ULimit => "ULIMIT",
            Halt => "HALT",
        };
        f.pad(s)
    }
}

/// ## One machine instruction
///
/// `level` is the static nesting distance for memory references and
/// calls; `addr` is instruction specific - an immediate value, a frame
/// offset, a code address, or a pop count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instr {
    pub op: OpCode,
    pub level: i8,
    pub addr: Datum,
}

impl Instr {
    /// Encoded size in bytes: opcode, level, Datum tag, Datum payload.
    pub const ENCODED_SIZE: usize = 11;

    pub fn new(op: OpCode, level: i8, addr: Datum) -> Instr {
        Instr { op, level, addr }
    }

    /// Append the little-endian record form to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.op as u8);
        out.push(self.level as u8);
        match self.addr {
            Datum::Integer(v) => {
                out.push(0);
                out.extend_from_slice(&v.to_le_bytes());
            }
            Datum::Real(v) => {
                out.push(1);
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }

    /// Decode one record from the front of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Instr> {
        if bytes.len() < Instr::ENCODED_SIZE {
            return Err(error!(UnknownInstr; "truncated instruction"));
        }
        let op = OpCode::try_from(bytes[0])?;
        let level = bytes[1] as i8;
        let payload: [u8; 8] = bytes[3..11].try_into().unwrap();
        let addr = match bytes[2] {
            0 => Datum::Integer(i64::from_le_bytes(payload)),
            1 => Datum::Real(f64::from_le_bytes(payload)),
            tag => return Err(error!(UnknownInstr; "datum tag {}", tag)),
        };
        Ok(Instr { op, level, addr })
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.op.has_level() {
            write!(f, "{:<8}{}, {}", self.op, self.level, self.addr)
        } else if self.op.has_addr() {
            write!(f, "{:<8}{}", self.op, self.addr)
        } else {
            write!(f, "{}", self.op)
        }
    }
}

/// Disassemble a whole program as a numbered listing.
pub fn listing(code: &[Instr]) -> String {
    let mut s = String::new();
    for (loc, instr) in code.iter().enumerate() {
        s.push_str(&format!("{:5}: {}\n", loc as Address, instr));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Instr::new(OpCode::Add, 0, Datum::Integer(0)).to_string(), "ADD");
        assert_eq!(
            Instr::new(OpCode::Push, 0, Datum::Real(2.5)).to_string(),
            "PUSH    2.5"
        );
        assert_eq!(
            Instr::new(OpCode::Call, 1, Datum::Integer(12)).to_string(),
            "CALL    1, 12"
        );
        assert_eq!(
            Instr::new(OpCode::PushVar, 0, Datum::Integer(-2)).to_string(),
            "PUSHVAR 0, -2"
        );
    }

    #[test]
    fn test_encode_decode() {
        let instrs = [
            Instr::new(OpCode::Push, 0, Datum::Integer(-7)),
            Instr::new(OpCode::Push, 0, Datum::Real(3.25)),
            Instr::new(OpCode::Call, 2, Datum::Integer(40)),
            Instr::new(OpCode::Halt, 0, Datum::Integer(0)),
        ];
        for instr in instrs {
            let mut bytes = vec![];
            instr.encode(&mut bytes);
            assert_eq!(bytes.len(), Instr::ENCODED_SIZE);
            let back = Instr::decode(&bytes).unwrap();
            assert_eq!(back, instr);
            // the canonical text survives the byte round trip
            assert_eq!(back.to_string(), instr.to_string());
        }
    }

    #[test]
    fn test_decode_rejects_junk() {
        let mut bytes = vec![];
        Instr::new(OpCode::Add, 0, Datum::Integer(0)).encode(&mut bytes);
        bytes[0] = 200; // not an opcode
        assert!(Instr::decode(&bytes).is_err());
        assert!(Instr::decode(&[0, 0]).is_err());
    }
}
