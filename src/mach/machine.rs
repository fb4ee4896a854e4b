use super::datum::Datum;
use super::freestore::FreeStore;
use super::instr::{Instr, OpCode};
use super::instr::{FRAME_BASE, FRAME_OLD_FP, FRAME_RET_ADDR, FRAME_RET_VAL, FRAME_SIZE};
use super::Address;
use crate::lang::{Error, ErrorCode};
use std::convert::TryFrom;
use std::io;

/// How a machine run ended. Anything but `Success` is fatal to the
/// program run, never to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    DivideByZero,
    BadFetch,
    BadDataType,
    UnknownInstr,
    StackOverflow,
    StackUnderflow,
    FreeStoreError,
    OutOfRange,
    Halted,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Outcome::*;
        let s = match self {
            Success => "success",
            DivideByZero => "divide by zero",
            BadFetch => "attempt to fetch uninitialized code",
            BadDataType => "bad data type",
            UnknownInstr => "unknown instruction",
            StackOverflow => "stack overflow",
            StackUnderflow => "stack underflow",
            FreeStoreError => "free store error",
            OutOfRange => "out of range",
            Halted => "halted",
        };
        write!(f, "{}", s)
    }
}

impl From<Error> for Outcome {
    fn from(error: Error) -> Outcome {
        match error.code() {
            ErrorCode::DivideByZero => Outcome::DivideByZero,
            ErrorCode::OutOfRange => Outcome::OutOfRange,
            ErrorCode::FreeStoreError => Outcome::FreeStoreError,
            ErrorCode::UnknownInstr => Outcome::UnknownInstr,
            _ => Outcome::BadDataType,
        }
    }
}

type Exec<T> = std::result::Result<T, Outcome>;

const STACK_SIZE: usize = 1024;
const FSTORE_SIZE: usize = 3 * 1024;

/// ## The P machine
///
/// A stack interpreter descended from the PL/0 machine in Wirth's
/// *Algorithms + Data Structures = Programs*. Code and data live in
/// separate address spaces; the data segment is the evaluation/call
/// stack followed by the free store:
///
/// | Address range                  | Region |
/// | ------------------------------ | ------ |
/// | `0..stackSize`                 | Stack  |
/// | `stackSize..stackSize+heapSize`| Heap   |
///
/// `sp` indexes the next free stack cell, `fp` the current activation
/// frame. Every memory access is range checked; a bad access ends the
/// run with an [`Outcome`], it never panics.
pub struct Machine<W: io::Write = io::Stdout> {
    code: Vec<Instr>,
    stack_size: usize,
    heap_size: usize,
    stack: Vec<Datum>,
    heap: FreeStore,
    pc: Address,
    prev_pc: Address,
    fp: Address,
    sp: Address,
    ir: Instr,
    last_write: Option<Address>,
    trace: bool,
    ncycles: usize,
    out: W,
}

impl Machine<io::Stdout> {
    pub fn new() -> Machine<io::Stdout> {
        Machine::with_capacity(STACK_SIZE, FSTORE_SIZE)
    }

    pub fn with_capacity(stack_size: usize, heap_size: usize) -> Machine<io::Stdout> {
        Machine::with_output(stack_size, heap_size, io::stdout())
    }
}

impl Default for Machine<io::Stdout> {
    fn default() -> Machine<io::Stdout> {
        Machine::new()
    }
}

impl<W: io::Write> Machine<W> {
    /// A machine whose WRITE/WRITELN output and trace go to `out`.
    pub fn with_output(stack_size: usize, heap_size: usize, out: W) -> Machine<W> {
        Machine {
            code: vec![],
            stack_size,
            heap_size,
            stack: vec![Datum::Integer(0); stack_size + heap_size],
            heap: FreeStore::new(stack_size, heap_size),
            pc: 0,
            prev_pc: 0,
            fp: 0,
            sp: 0,
            ir: Instr::new(OpCode::Halt, 0, Datum::Integer(0)),
            last_write: None,
            trace: false,
            ncycles: 0,
            out,
        }
    }

    /// Load a program and run it to completion.
    pub fn run(&mut self, code: &[Instr], trace: bool) -> Outcome {
        self.reset();
        self.code = code.to_vec();
        self.trace = trace;
        loop {
            match self.step() {
                Ok(()) => continue,
                Err(Outcome::Halted) => return Outcome::Success,
                Err(outcome) => return outcome,
            }
        }
    }

    /// Machine cycles run since the last reset.
    pub fn cycles(&self) -> usize {
        self.ncycles
    }

    /// The whole data segment, stack then heap.
    pub fn stack(&self) -> &[Datum] {
        &self.stack
    }

    pub fn heap(&self) -> &FreeStore {
        &self.heap
    }

    /// The effective address of the most recent store, if any.
    pub fn last_write(&self) -> Option<Address> {
        self.last_write
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn reset(&mut self) {
        self.stack = vec![Datum::Integer(0); self.stack_size + self.heap_size];
        self.heap = FreeStore::new(self.stack_size, self.heap_size);
        self.pc = 0;
        self.prev_pc = 0;
        self.fp = 0;
        self.sp = 0;
        self.last_write = None;
        self.ncycles = 0;
    }

    fn address(datum: Datum) -> Exec<Address> {
        Address::try_from(datum).map_err(Outcome::from)
    }

    fn integer(datum: Datum) -> Exec<i64> {
        i64::try_from(datum).map_err(Outcome::from)
    }

    /// Is `[addr, addr + len)` inside the data segment?
    fn range_check(&self, addr: Address, len: usize) -> Exec<()> {
        if addr.checked_add(len).map(|end| end <= self.stack.len()) == Some(true) {
            Ok(())
        } else {
            Err(Outcome::StackOverflow)
        }
    }

    fn push(&mut self, datum: Datum) -> Exec<()> {
        if self.sp >= self.stack_size {
            return Err(Outcome::StackOverflow);
        }
        self.stack[self.sp] = datum;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Exec<Datum> {
        if self.sp == 0 {
            return Err(Outcome::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp])
    }

    fn top_mut(&mut self) -> Exec<&mut Datum> {
        match self.sp.checked_sub(1) {
            Some(index) => Ok(&mut self.stack[index]),
            None => Err(Outcome::StackUnderflow),
        }
    }

    /// Follow the static link `lvl` frames up.
    fn base(&self, lvl: usize) -> Exec<Address> {
        let mut b = self.fp;
        for _ in 0..lvl {
            self.range_check(b, FRAME_SIZE)?;
            b = Self::address(self.stack[b + FRAME_BASE])?;
        }
        Ok(b)
    }

    fn unary(&mut self, f: fn(Datum) -> Result<Datum, Error>) -> Exec<()> {
        let top = self.top_mut()?;
        *top = f(*top)?;
        Ok(())
    }

    fn binary(&mut self, f: fn(Datum, Datum) -> Result<Datum, Error>) -> Exec<()> {
        let rhs = self.pop()?;
        let top = self.top_mut()?;
        *top = f(*top, rhs)?;
        Ok(())
    }

    fn call(&mut self) -> Exec<()> {
        let lvl = usize::try_from(self.ir.level).map_err(|_| Outcome::BadDataType)?;
        let entry = Self::address(self.ir.addr)?;
        let static_link = self.base(lvl)?;
        if self.sp + FRAME_SIZE > self.stack_size {
            return Err(Outcome::StackOverflow);
        }
        self.stack[self.sp + FRAME_BASE] = Datum::from(static_link);
        self.stack[self.sp + FRAME_OLD_FP] = Datum::from(self.fp);
        self.stack[self.sp + FRAME_RET_ADDR] = Datum::from(self.pc);
        // zero the result slot so a function that never assigns one
        // still returns a defined value
        self.stack[self.sp + FRAME_RET_VAL] = Datum::Integer(0);
        self.fp = self.sp;
        self.sp += FRAME_SIZE;
        self.pc = entry;
        Ok(())
    }

    /// Unlink the current frame and pop the parameters; the frame's
    /// result slot is handed back for RETF.
    fn ret(&mut self) -> Exec<Datum> {
        let frame = self.fp;
        self.range_check(frame, FRAME_SIZE)?;
        let result = self.stack[frame + FRAME_RET_VAL];
        self.sp = frame;
        self.pc = Self::address(self.stack[frame + FRAME_RET_ADDR])?;
        self.fp = Self::address(self.stack[frame + FRAME_OLD_FP])?;
        let nparams = Self::address(self.ir.addr)?;
        if nparams > self.sp {
            return Err(Outcome::StackUnderflow);
        }
        self.sp -= nparams;
        Ok(result)
    }

    fn eval(&mut self) -> Exec<()> {
        let len = Self::address(self.ir.addr)?;
        let addr = Self::address(self.pop()?)?;
        self.range_check(addr, len)?;
        for i in 0..len {
            let datum = self.stack[addr + i];
            self.push(datum)?;
        }
        Ok(())
    }

    fn assign(&mut self) -> Exec<()> {
        let len = Self::address(self.ir.addr)?;
        if self.sp < len + 1 {
            return Err(Outcome::StackUnderflow);
        }
        let addr = Self::address(self.stack[self.sp - len - 1])?;
        self.range_check(addr, len)?;
        for i in 0..len {
            self.stack[addr + i] = self.stack[self.sp - len + i];
        }
        self.sp -= len + 1;
        self.last_write = Some(addr);
        Ok(())
    }

    fn copy(&mut self) -> Exec<()> {
        let len = Self::address(self.ir.addr)?;
        let dest = Self::address(self.pop()?)?;
        let src = Self::address(self.pop()?)?;
        self.range_check(dest, len)?;
        self.range_check(src, len)?;
        for i in 0..len {
            self.stack[dest + i] = self.stack[src + i];
        }
        self.last_write = Some(dest);
        Ok(())
    }

    fn pred(&mut self) -> Exec<()> {
        let limit = Self::integer(self.ir.addr)?;
        let top = self.top_mut()?;
        let value = i64::try_from(*top)?;
        if value <= limit {
            return Err(Outcome::OutOfRange);
        }
        *top = Datum::Integer(value - 1);
        Ok(())
    }

    fn succ(&mut self) -> Exec<()> {
        let limit = Self::integer(self.ir.addr)?;
        let top = self.top_mut()?;
        let value = i64::try_from(*top)?;
        if value >= limit {
            return Err(Outcome::OutOfRange);
        }
        *top = Datum::Integer(value + 1);
        Ok(())
    }

    fn llimit(&mut self) -> Exec<()> {
        let limit = Self::integer(self.ir.addr)?;
        let value = i64::try_from(*self.top_mut()?)?;
        if value < limit {
            return Err(Outcome::OutOfRange);
        }
        Ok(())
    }

    fn ulimit(&mut self) -> Exec<()> {
        let limit = Self::integer(self.ir.addr)?;
        let value = i64::try_from(*self.top_mut()?)?;
        if value > limit {
            return Err(Outcome::OutOfRange);
        }
        Ok(())
    }

    /// Print `n` (value, width, precision) tuples, first pushed first.
    fn write(&mut self, newline: bool) -> Exec<()> {
        let n = Self::address(self.pop()?)?;
        let span = n.checked_mul(3).ok_or(Outcome::StackUnderflow)?;
        if span > self.sp {
            return Err(Outcome::StackUnderflow);
        }
        let bottom = self.sp - span;
        for i in 0..n {
            let value = self.stack[bottom + 3 * i];
            let width = Self::integer(self.stack[bottom + 3 * i + 1])?.max(0) as usize;
            let precision = Self::integer(self.stack[bottom + 3 * i + 2])?.max(0) as usize;
            match value {
                Datum::Integer(v) => {
                    let _ = write!(self.out, "{:>width$}", v, width = width);
                }
                Datum::Real(v) => {
                    if precision > 0 {
                        let _ = write!(self.out, "{:>width$.precision$}", v);
                    } else {
                        let _ = write!(self.out, "{:>width$}", v, width = width);
                    }
                }
            }
        }
        self.sp = bottom;
        if newline {
            let _ = writeln!(self.out);
        }
        Ok(())
    }

    fn dump(&mut self) {
        let _ = writeln!(
            self.out,
            "{:5}: {:<16} fp: {:4}, sp: {:4}",
            self.prev_pc,
            self.ir.to_string(),
            self.fp,
            self.sp
        );
    }

    fn step(&mut self) -> Exec<()> {
        self.ir = *self.code.get(self.pc).ok_or(Outcome::BadFetch)?;
        self.prev_pc = self.pc;
        self.pc += 1;
        self.ncycles += 1;
        if self.trace {
            self.dump();
        }
        match self.ir.op {
            OpCode::Neg => self.unary(Datum::neg),
            OpCode::ItoR => self.unary(Datum::itor),
            OpCode::ItoR2 => {
                let index = self.sp.checked_sub(2).ok_or(Outcome::StackUnderflow)?;
                self.stack[index] = Datum::itor(self.stack[index])?;
                Ok(())
            }
            OpCode::Round => self.unary(Datum::round),
            OpCode::Trunc => self.unary(Datum::trunc),
            OpCode::Abs => self.unary(Datum::abs),
            OpCode::Atan => self.unary(Datum::atan),
            OpCode::Exp => self.unary(Datum::exp),
            OpCode::Log => self.unary(Datum::log),
            OpCode::Dup => {
                let top = *self.top_mut()?;
                self.push(top)
            }
            OpCode::Odd => self.unary(Datum::odd),
            OpCode::Pred => self.pred(),
            OpCode::Succ => self.succ(),
            OpCode::Sin => self.unary(Datum::sin),
            OpCode::Sqr => self.unary(Datum::sqr),
            OpCode::Sqrt => self.unary(Datum::sqrt),
            OpCode::Write => self.write(false),
            OpCode::Writeln => self.write(true),
            OpCode::New => {
                let size = Self::address(self.pop()?)?;
                let addr = self.heap.alloc(size);
                self.push(Datum::from(addr))
            }
            OpCode::Dispose => {
                let addr = Self::address(self.pop()?)?;
                self.heap.free(addr)?;
                Ok(())
            }
            OpCode::Add => self.binary(Datum::add),
            OpCode::Sub => self.binary(Datum::sub),
            OpCode::Mul => self.binary(Datum::mul),
            OpCode::Div => self.binary(Datum::div),
            OpCode::Rem => self.binary(Datum::rem),
            OpCode::Lt => self.binary(Datum::lt),
            OpCode::Lte => self.binary(Datum::lte),
            OpCode::Equ => self.binary(Datum::equ),
            OpCode::Gte => self.binary(Datum::gte),
            OpCode::Gt => self.binary(Datum::gt),
            OpCode::Nequ => self.binary(Datum::nequ),
            OpCode::Lor => self.binary(Datum::lor),
            OpCode::Land => self.binary(Datum::land),
            OpCode::Lnot => self.unary(Datum::lnot),
            OpCode::Pop => {
                let n = Self::address(self.ir.addr)?;
                if n > self.sp {
                    return Err(Outcome::StackUnderflow);
                }
                self.sp -= n;
                Ok(())
            }
            OpCode::Push => self.push(self.ir.addr),
            OpCode::PushVar => {
                let lvl = usize::try_from(self.ir.level).map_err(|_| Outcome::BadDataType)?;
                let offset = Self::integer(self.ir.addr)?;
                let addr = self.base(lvl)? as i64 + offset;
                if addr < 0 {
                    return Err(Outcome::StackOverflow);
                }
                self.push(Datum::Integer(addr))
            }
            OpCode::Eval => self.eval(),
            OpCode::Assign => self.assign(),
            OpCode::Copy => self.copy(),
            OpCode::Call => self.call(),
            OpCode::Enter => {
                let n = Self::address(self.ir.addr)?;
                if self.sp + n > self.stack_size {
                    return Err(Outcome::StackOverflow);
                }
                self.sp += n;
                Ok(())
            }
            OpCode::Ret => {
                self.ret()?;
                Ok(())
            }
            OpCode::RetF => {
                let result = self.ret()?;
                self.push(result)
            }
            OpCode::Jump => {
                self.pc = Self::address(self.ir.addr)?;
                Ok(())
            }
            OpCode::Jneq => {
                let condition = i64::try_from(self.pop()?)?;
                if condition == 0 {
                    self.pc = Self::address(self.ir.addr)?;
                }
                Ok(())
            }
            OpCode::LLimit => self.llimit(),
            OpCode::ULimit => self.ulimit(),
            OpCode::Halt => Err(Outcome::Halted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(op: OpCode) -> Instr {
        Instr::new(op, 0, Datum::Integer(0))
    }

    fn instr_arg(op: OpCode, addr: i64) -> Instr {
        Instr::new(op, 0, Datum::Integer(addr))
    }

    fn machine() -> Machine<Vec<u8>> {
        Machine::with_output(64, 16, Vec::new())
    }

    #[test]
    fn test_push_add_halt() {
        let code = [
            instr_arg(OpCode::Push, 2),
            instr_arg(OpCode::Push, 3),
            instr(OpCode::Add),
            instr(OpCode::Halt),
        ];
        let mut m = machine();
        assert_eq!(m.run(&code, false), Outcome::Success);
        assert_eq!(m.stack()[0], Datum::Integer(5));
        assert_eq!(m.cycles(), 4);
    }

    #[test]
    fn test_mixed_kinds_are_fatal() {
        let code = [
            instr_arg(OpCode::Push, 2),
            Instr::new(OpCode::Push, 0, Datum::Real(1.0)),
            instr(OpCode::Add),
            instr(OpCode::Halt),
        ];
        assert_eq!(machine().run(&code, false), Outcome::BadDataType);
    }

    #[test]
    fn test_running_off_the_code_is_bad_fetch() {
        let code = [instr_arg(OpCode::Push, 1)];
        assert_eq!(machine().run(&code, false), Outcome::BadFetch);
    }

    #[test]
    fn test_underflow_and_overflow() {
        assert_eq!(machine().run(&[instr(OpCode::Add)], false), Outcome::StackUnderflow);
        let spin = [
            instr_arg(OpCode::Push, 1),
            instr_arg(OpCode::Jump, 0),
        ];
        assert_eq!(machine().run(&spin, false), Outcome::StackOverflow);
    }

    #[test]
    fn test_call_ret_restores_the_frame() {
        let code = [
            Instr::new(OpCode::Call, 0, Datum::Integer(2)),
            instr(OpCode::Halt),
            instr_arg(OpCode::Ret, 0),
        ];
        let mut m = machine();
        assert_eq!(m.run(&code, false), Outcome::Success);
        assert_eq!(m.sp, 0);
        assert_eq!(m.fp, 0);
    }

    #[test]
    fn test_retf_pushes_the_zeroed_result_slot() {
        // a "function" body that never assigns its result
        let code = [
            Instr::new(OpCode::Call, 0, Datum::Integer(2)),
            instr(OpCode::Halt),
            instr_arg(OpCode::RetF, 0),
        ];
        let mut m = machine();
        assert_eq!(m.run(&code, false), Outcome::Success);
        assert_eq!(m.sp, 1);
        assert_eq!(m.stack()[0], Datum::Integer(0));
    }

    #[test]
    fn test_limits_leave_tos_in_place() {
        let code = [
            instr_arg(OpCode::Push, 3),
            instr_arg(OpCode::LLimit, 1),
            instr_arg(OpCode::ULimit, 5),
            instr(OpCode::Halt),
        ];
        let mut m = machine();
        assert_eq!(m.run(&code, false), Outcome::Success);
        assert_eq!(m.stack()[0], Datum::Integer(3));
        assert_eq!(m.sp, 1);

        let code = [
            instr_arg(OpCode::Push, 9),
            instr_arg(OpCode::ULimit, 5),
            instr(OpCode::Halt),
        ];
        assert_eq!(machine().run(&code, false), Outcome::OutOfRange);
    }

    #[test]
    fn test_pred_succ_bounds() {
        let code = [
            instr_arg(OpCode::Push, 1),
            instr_arg(OpCode::Pred, 1),
            instr(OpCode::Halt),
        ];
        assert_eq!(machine().run(&code, false), Outcome::OutOfRange);
        let code = [
            instr_arg(OpCode::Push, 2),
            instr_arg(OpCode::Pred, 1),
            instr(OpCode::Halt),
        ];
        let mut m = machine();
        assert_eq!(m.run(&code, false), Outcome::Success);
        assert_eq!(m.stack()[0], Datum::Integer(1));
    }

    #[test]
    fn test_new_dispose_round_trip() {
        let code = [
            instr_arg(OpCode::Push, 3),
            instr(OpCode::New),
            instr(OpCode::Dispose),
            instr(OpCode::Halt),
        ];
        let mut m = machine();
        assert_eq!(m.run(&code, false), Outcome::Success);
        assert_eq!(m.heap().free_list(), vec![(64, 16)]);
    }

    #[test]
    fn test_write_tuples() {
        let code = [
            instr_arg(OpCode::Push, 42), // value
            instr_arg(OpCode::Push, 5),  // width
            instr_arg(OpCode::Push, 0),  // precision
            instr_arg(OpCode::Push, 1),  // count
            instr(OpCode::Writeln),
            instr(OpCode::Halt),
        ];
        let mut m = machine();
        assert_eq!(m.run(&code, false), Outcome::Success);
        assert_eq!(String::from_utf8_lossy(m.output()), "   42\n");
    }
}
