use super::datum::Datum;
use super::instr::{listing, Instr, OpCode, FRAME_RET_VAL, FRAME_SIZE};
use super::symbol::{SymKind, SymValue, SymbolTable};
use super::types::Kind as TypeKind;
use super::types::{Field, SubRange, TypeDesc, TypePtr};
use super::Address;
use crate::error;
use crate::lang::{Error, Kind, TokenStream};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::rc::Rc;

/// ## The P compiler
///
/// A single-pass recursive-descent compiler: every production both
/// checks semantics and appends opcodes to the code vector. Forward
/// jumps are emitted with a placeholder address and patched once the
/// target is known; calls to subroutines whose bodies have not been
/// compiled yet are collected against the callee's symbol id and linked
/// at the end.
///
/// Diagnostics accumulate and never abort the pass; a caller must not
/// run the emitted code when [`Compiler::errors`] is non-empty.
pub struct Compiler {
    name: String,
    verbose: bool,
    ts: TokenStream,
    symtbl: SymbolTable,
    code: Vec<Instr>,
    errors: Vec<Error>,
    next_id: usize,
    linked: HashMap<usize, Address>,
    unlinked: Vec<(Address, usize)>,
    pending_pointers: Vec<(Rc<str>, TypePtr)>,
    in_type_section: bool,
}

impl Compiler {
    /// `name` prefixes the verbose progress messages.
    pub fn new(name: &str, verbose: bool) -> Compiler {
        Compiler {
            name: name.to_string(),
            verbose,
            ts: TokenStream::new(""),
            symtbl: SymbolTable::new(),
            code: vec![],
            errors: vec![],
            next_id: 0,
            linked: HashMap::new(),
            unlinked: vec![],
            pending_pointers: vec![],
            in_type_section: false,
        }
    }

    /// Compile a whole program. Returns the number of diagnostics; the
    /// emitted code is valid only when that count is zero.
    pub fn compile(&mut self, source: &str) -> usize {
        self.ts = TokenStream::new(source);
        self.symtbl = SymbolTable::new();
        self.code.clear();
        self.errors.clear();
        self.next_id = 0;
        self.linked.clear();
        self.unlinked.clear();
        self.pending_pointers.clear();
        self.in_type_section = false;
        self.seed_builtins();
        self.prog_decl();
        self.link();
        if self.verbose && self.errors.is_empty() {
            print!("{}", listing(&self.code));
        }
        self.errors.len()
    }

    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    // ----- token plumbing -------------------------------------------------

    fn advance(&mut self) {
        self.ts.next();
    }

    fn check(&self, kind: Kind) -> bool {
        self.ts.current().kind == kind
    }

    fn accept(&mut self, kind: Kind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: Kind) -> bool {
        if self.accept(kind) {
            true
        } else {
            let got = self.ts.current().to_string();
            self.error(error!(SyntaxError; "expected {}, got {}", kind, got));
            false
        }
    }

    fn one_of(&self, kinds: &[Kind]) -> bool {
        kinds.contains(&self.ts.current().kind)
    }

    /// Take the current token's identifier text and consume it.
    fn ident_value(&mut self) -> Rc<str> {
        let id = self.ts.current().string_value.clone();
        self.advance();
        id
    }

    fn error(&mut self, e: Error) {
        let line = self.ts.current().line;
        self.errors.push(e.in_line_number(line));
    }

    // ----- code emission --------------------------------------------------

    fn emit_instr(&mut self, op: OpCode, level: i8, addr: Datum) -> Address {
        self.code.push(Instr::new(op, level, addr));
        self.code.len() - 1
    }

    fn emit(&mut self, op: OpCode) -> Address {
        self.emit_instr(op, 0, Datum::Integer(0))
    }

    fn emit_arg(&mut self, op: OpCode, addr: Datum) -> Address {
        self.emit_instr(op, 0, addr)
    }

    fn here(&self) -> Address {
        self.code.len()
    }

    fn patch(&mut self, at: Address, to: Address) {
        if self.verbose {
            println!("{}: patching address at {} to {}", self.name, at, to);
        }
        if let Some(instr) = self.code.get_mut(at) {
            instr.addr = Datum::from(to);
        }
    }

    fn link(&mut self) {
        for (at, id) in std::mem::take(&mut self.unlinked) {
            match self.linked.get(&id) {
                Some(&entry) => self.patch(at, entry),
                None => self.error(error!(InternalError; "unlinked call at {}", at)),
            }
        }
    }

    // ----- symbols --------------------------------------------------------

    fn new_symbol_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    /// Look up the shadowing entry for a name, reporting an undefined
    /// identifier when there is none.
    fn find(&mut self, id: &str) -> Option<SymValue> {
        match self.symtbl.lookup(id) {
            Some(sym) => Some(sym.clone()),
            None => {
                self.error(error!(Undefined; "{}", id));
                None
            }
        }
    }

    fn insert(&mut self, name: Rc<str>, sym: SymValue) {
        if name.is_empty() {
            return; // a syntax error was already reported
        }
        if let Err(e) = self.symtbl.insert(name, sym) {
            self.error(e);
        }
    }

    /// The identifier beginning a declaration; empty on a syntax error.
    fn name_decl(&mut self) -> Rc<str> {
        if self.check(Kind::Identifier) {
            self.ident_value()
        } else {
            self.expect(Kind::Identifier);
            "".into()
        }
    }

    fn seed_builtins(&mut self) {
        // a fresh table; none of these can collide
        let _ = self
            .symtbl
            .insert("integer".into(), SymValue::make_type(0, TypeDesc::integer()));
        let _ = self
            .symtbl
            .insert("real".into(), SymValue::make_type(0, TypeDesc::real()));
        let _ = self
            .symtbl
            .insert("boolean".into(), SymValue::make_type(0, TypeDesc::boolean()));
        let _ = self
            .symtbl
            .insert("char".into(), SymValue::make_type(0, TypeDesc::character()));
        let _ = self.symtbl.insert(
            "maxint".into(),
            SymValue::make_const(0, Datum::Integer(i64::MAX), TypeDesc::integer()),
        );
        let _ = self.symtbl.insert(
            "nil".into(),
            SymValue::make_const(
                0,
                Datum::Integer(0),
                TypeDesc::new_pointer(Some(TypeDesc::integer())),
            ),
        );
        let _ = self.symtbl.insert(
            "true".into(),
            SymValue::make_const(0, Datum::from(true), TypeDesc::boolean()),
        );
        let _ = self.symtbl.insert(
            "false".into(),
            SymValue::make_const(0, Datum::from(false), TypeDesc::boolean()),
        );
    }

    // ----- numeric promotion ----------------------------------------------

    fn is_an_integer(ty: &TypePtr) -> bool {
        ty.scalar_kind() == TypeKind::Integer
    }

    fn is_a_real(ty: &TypePtr) -> bool {
        ty.scalar_kind() == TypeKind::Real
    }

    /// Promote binary stack operands as necessary and return the
    /// resulting type. The left operand sits one below the right.
    fn promote(&mut self, lhs: TypePtr, rhs: TypePtr) -> TypePtr {
        if lhs.scalar_kind() == rhs.scalar_kind() {
            lhs
        } else if Self::is_an_integer(&lhs) && Self::is_a_real(&rhs) {
            self.emit(OpCode::ItoR2);
            rhs
        } else if Self::is_a_real(&lhs) && Self::is_an_integer(&rhs) {
            self.emit(OpCode::ItoR);
            lhs
        } else {
            self.error(
                error!(TypeMismatch; "incompatible binary types, {} and {}",
                    lhs.scalar_kind(), rhs.scalar_kind()),
            );
            lhs
        }
    }

    /// Convert the r-value of an assignment to the target's kind, then
    /// bound-check it when the target is a constrained ordinal.
    fn assign_promote(&mut self, lhs: &TypePtr, rhs: &TypePtr) {
        if lhs.scalar_kind() == rhs.scalar_kind() {
        } else if Self::is_an_integer(lhs) && Self::is_a_real(rhs) {
            self.error(error!(LossyConversion));
            self.emit(OpCode::Round);
        } else if Self::is_a_real(lhs) && Self::is_an_integer(rhs) {
            self.emit(OpCode::ItoR);
        } else {
            self.error(
                error!(TypeMismatch; "cannot assign {} to {}",
                    rhs.scalar_kind(), lhs.scalar_kind()),
            );
        }
        if lhs.is_ordinal() && lhs.range() != SubRange::MAX {
            self.emit_arg(OpCode::LLimit, Datum::Integer(lhs.range().minimum()));
            self.emit_arg(OpCode::ULimit, Datum::Integer(lhs.range().maximum()));
        }
    }

    // ----- expressions ----------------------------------------------------

    /// Push a constant, evaluate a variable, or invoke a function.
    fn ident_factor(&mut self, level: usize, id: &str) -> TypePtr {
        let mut ty = TypeDesc::integer();
        if let Some(sym) = self.find(id) {
            match sym.kind() {
                SymKind::Constant => {
                    ty = sym.sym_type().cloned().unwrap_or_else(TypeDesc::integer);
                    self.emit_arg(OpCode::Push, sym.value());
                }
                SymKind::Variable => {
                    ty = self.variable(level, &sym);
                    self.emit_arg(OpCode::Eval, Datum::from(ty.size()));
                }
                SymKind::Function => {
                    ty = sym.sym_type().cloned().unwrap_or_else(TypeDesc::integer);
                    self.call_statement(level, &sym);
                }
                _ => self.error(
                    error!(KindMismatch; "{} is not a constant, variable or function", id),
                ),
            }
        }
        ty
    }

    fn paren_expr(&mut self, level: usize) -> TypePtr {
        self.expect(Kind::OpenParen);
        let ty = self.expression(level);
        self.expect(Kind::CloseParen);
        ty
    }

    /// A transcendental's argument may be either numeric kind; the
    /// result is always real.
    fn transcendental(&mut self, level: usize, op: OpCode) -> TypePtr {
        let ty = self.paren_expr(level);
        if !Self::is_an_integer(&ty) && !Self::is_a_real(&ty) {
            self.error(
                error!(TypeMismatch; "expected an integer or real value, got {}", ty.scalar_kind()),
            );
        }
        self.emit(op);
        TypeDesc::real()
    }

    fn built_in_func(&mut self, level: usize) -> TypePtr {
        if self.accept(Kind::Round) {
            let ty = self.paren_expr(level);
            if !Self::is_a_real(&ty) {
                self.error(error!(TypeMismatch; "expected a real value, got {}", ty.scalar_kind()));
                ty
            } else {
                self.emit(OpCode::Round);
                TypeDesc::integer()
            }
        } else if self.accept(Kind::Trunc) {
            let ty = self.paren_expr(level);
            if !Self::is_a_real(&ty) {
                self.error(error!(TypeMismatch; "expected a real value, got {}", ty.scalar_kind()));
                ty
            } else {
                self.emit(OpCode::Trunc);
                TypeDesc::integer()
            }
        } else if self.accept(Kind::Abs) {
            let ty = self.paren_expr(level);
            if !Self::is_an_integer(&ty) && !Self::is_a_real(&ty) {
                self.error(
                    error!(TypeMismatch; "expected an integer or real value, got {}",
                        ty.scalar_kind()),
                );
            }
            self.emit(OpCode::Abs);
            ty
        } else if self.accept(Kind::Sqr) {
            // squaring preserves the argument's kind
            let ty = self.paren_expr(level);
            if !Self::is_an_integer(&ty) && !Self::is_a_real(&ty) {
                self.error(
                    error!(TypeMismatch; "expected an integer or real value, got {}",
                        ty.scalar_kind()),
                );
            }
            self.emit(OpCode::Sqr);
            ty
        } else if self.accept(Kind::Atan) {
            self.transcendental(level, OpCode::Atan)
        } else if self.accept(Kind::Exp) {
            self.transcendental(level, OpCode::Exp)
        } else if self.accept(Kind::Log) {
            self.transcendental(level, OpCode::Log)
        } else if self.accept(Kind::Sin) {
            self.transcendental(level, OpCode::Sin)
        } else if self.accept(Kind::Sqrt) {
            self.transcendental(level, OpCode::Sqrt)
        } else if self.accept(Kind::Odd) {
            let ty = self.paren_expr(level);
            if !Self::is_an_integer(&ty) {
                self.error(
                    error!(TypeMismatch; "expected an integer value, got {}", ty.scalar_kind()),
                );
            }
            self.emit(OpCode::Odd);
            TypeDesc::boolean()
        } else if self.accept(Kind::Pred) {
            let ty = self.paren_expr(level);
            if !ty.is_ordinal() {
                self.error(error!(NotOrdinal; "got {}", ty.kind()));
            }
            self.emit_arg(OpCode::Pred, Datum::Integer(ty.range().minimum()));
            ty
        } else if self.accept(Kind::Succ) {
            let ty = self.paren_expr(level);
            if !ty.is_ordinal() {
                self.error(error!(NotOrdinal; "got {}", ty.kind()));
            }
            self.emit_arg(OpCode::Succ, Datum::Integer(ty.range().maximum()));
            ty
        } else if self.accept(Kind::Ord) {
            // collapse any ordinal to a plain integer; no code needed
            let ty = self.paren_expr(level);
            if !ty.is_ordinal() {
                self.error(error!(NotOrdinal; "got {}", ty.kind()));
            }
            TypeDesc::integer()
        } else {
            self.error(
                error!(SyntaxError; "expected an identifier, a number or ( expression ), got {}",
                    self.ts.current()),
            );
            self.advance();
            TypeDesc::integer()
        }
    }

    fn factor(&mut self, level: usize) -> TypePtr {
        if self.check(Kind::Identifier) {
            let id = self.ident_value();
            self.ident_factor(level, &id)
        } else if self.check(Kind::IntegerNum) {
            let value = self.ts.current().integer_value;
            self.advance();
            self.emit_arg(OpCode::Push, Datum::Integer(value));
            TypeDesc::integer()
        } else if self.check(Kind::RealNum) {
            let value = self.ts.current().real_value;
            self.advance();
            self.emit_arg(OpCode::Push, Datum::Real(value));
            TypeDesc::real()
        } else if self.accept(Kind::OpenParen) {
            let ty = self.expression(level);
            self.expect(Kind::CloseParen);
            ty
        } else if self.accept(Kind::Not) {
            let ty = self.factor(level);
            self.emit(OpCode::Lnot);
            ty
        } else if self.check(Kind::StringLit) {
            self.string_factor()
        } else {
            self.built_in_func(level)
        }
    }

    /// A one-character string is a Char; a longer one pushes each
    /// character and acts as an `array [0..n-1] of char`.
    fn string_factor(&mut self) -> TypePtr {
        let s = self.ts.current().string_value.clone();
        self.advance();
        let n = s.chars().count();
        match n {
            0 => {
                self.error(error!(SyntaxError; "empty string"));
                TypeDesc::character()
            }
            1 => {
                let ch = s.chars().next().unwrap_or('\0');
                self.emit_arg(OpCode::Push, Datum::from(ch));
                TypeDesc::character()
            }
            _ => {
                for ch in s.chars() {
                    self.emit_arg(OpCode::Push, Datum::from(ch));
                }
                let desc = TypeDesc::new_array(SubRange::new(0, n as i64 - 1), TypeDesc::integer());
                desc.set_base(TypeDesc::character());
                desc
            }
        }
    }

    fn term(&mut self, level: usize) -> TypePtr {
        let mut lhs = self.factor(level);
        loop {
            if self.accept(Kind::Multiply) {
                let rhs = self.factor(level);
                lhs = self.promote(lhs, rhs);
                self.emit(OpCode::Mul);
            } else if self.accept(Kind::Divide) {
                let rhs = self.factor(level);
                lhs = self.promote(lhs, rhs);
                self.emit(OpCode::Div);
            } else if self.accept(Kind::Mod) {
                let rhs = self.factor(level);
                lhs = self.promote(lhs, rhs);
                self.emit(OpCode::Rem);
            } else if self.accept(Kind::And) {
                let rhs = self.factor(level);
                lhs = self.promote(lhs, rhs);
                self.emit(OpCode::Land);
            } else {
                break;
            }
        }
        lhs
    }

    /// `[ + | - ] term` - a leading sign on the first term.
    fn unary(&mut self, level: usize) -> TypePtr {
        if self.accept(Kind::Add) {
            self.term(level)
        } else if self.accept(Kind::Subtract) {
            let ty = self.term(level);
            self.emit(OpCode::Neg);
            ty
        } else {
            self.term(level)
        }
    }

    fn simple_expr(&mut self, level: usize) -> TypePtr {
        let mut lhs = self.unary(level);
        loop {
            if self.accept(Kind::Add) {
                let rhs = self.unary(level);
                lhs = self.promote(lhs, rhs);
                self.emit(OpCode::Add);
            } else if self.accept(Kind::Subtract) {
                let rhs = self.unary(level);
                lhs = self.promote(lhs, rhs);
                self.emit(OpCode::Sub);
            } else if self.accept(Kind::Or) {
                let rhs = self.unary(level);
                lhs = self.promote(lhs, rhs);
                self.emit(OpCode::Lor);
            } else {
                break;
            }
        }
        lhs
    }

    fn comparison(&mut self, level: usize, lhs: TypePtr, op: OpCode) -> TypePtr {
        let rhs = self.simple_expr(level);
        self.promote(lhs, rhs);
        self.emit(op);
        TypeDesc::boolean()
    }

    fn expression(&mut self, level: usize) -> TypePtr {
        let mut lhs = self.simple_expr(level);
        loop {
            if self.accept(Kind::LTE) {
                lhs = self.comparison(level, lhs, OpCode::Lte);
            } else if self.accept(Kind::LT) {
                lhs = self.comparison(level, lhs, OpCode::Lt);
            } else if self.accept(Kind::GT) {
                lhs = self.comparison(level, lhs, OpCode::Gt);
            } else if self.accept(Kind::GTE) {
                lhs = self.comparison(level, lhs, OpCode::Gte);
            } else if self.accept(Kind::EQU) {
                lhs = self.comparison(level, lhs, OpCode::Equ);
            } else if self.accept(Kind::NEQ) {
                lhs = self.comparison(level, lhs, OpCode::Nequ);
            } else {
                break;
            }
        }
        lhs
    }

    /// `[ + | - ] number | constant-identifier`, folded at compile time.
    fn const_expr(&mut self) -> Option<Datum> {
        let mut negative = false;
        if self.accept(Kind::Add) {
        } else if self.accept(Kind::Subtract) {
            negative = true;
        }
        let value = if self.check(Kind::IntegerNum) {
            let v = self.ts.current().integer_value;
            self.advance();
            Some(Datum::Integer(v))
        } else if self.check(Kind::RealNum) {
            let v = self.ts.current().real_value;
            self.advance();
            Some(Datum::Real(v))
        } else if self.check(Kind::Identifier) {
            let id = self.ident_value();
            match self.find(&id) {
                Some(sym) if sym.kind() == SymKind::Constant => Some(sym.value()),
                Some(_) => {
                    self.error(error!(KindMismatch; "{} is not a constant", id));
                    None
                }
                None => None,
            }
        } else {
            None
        };
        match (value, negative) {
            (Some(v), true) => Datum::neg(v).ok(),
            (value, _) => value,
        }
    }

    // ----- l-values -------------------------------------------------------

    /// Emit a variable reference, then fold any postfix selectors into
    /// the address on the stack.
    fn variable(&mut self, level: usize, sym: &SymValue) -> TypePtr {
        let mut ty = sym.sym_type().cloned().unwrap_or_else(TypeDesc::integer);
        let lvl = (level - sym.level()) as i8;
        self.emit_instr(OpCode::PushVar, lvl, sym.value());
        loop {
            if self.accept(Kind::OpenBrkt) {
                ty = self.var_array(level, ty);
                self.expect(Kind::CloseBrkt);
            } else if self.accept(Kind::Period) {
                ty = self.var_selector(ty);
            } else if self.accept(Kind::Caret) {
                if ty.kind() != TypeKind::Pointer {
                    self.error(error!(TypeMismatch; "expected a pointer, got {}", ty.kind()));
                } else {
                    self.emit_arg(OpCode::Eval, Datum::from(ty.size()));
                    ty = ty.base().unwrap_or_else(TypeDesc::integer);
                }
            } else {
                break;
            }
        }
        ty
    }

    /// One or more array indexes; each is bound-checked, scaled by the
    /// element size, re-based, and folded into the running address.
    fn var_array(&mut self, level: usize, atype: TypePtr) -> TypePtr {
        let mut atype = atype;
        loop {
            if atype.kind() != TypeKind::Array {
                self.error(error!(TypeMismatch; "indexing into a non-array, got {}", atype.kind()));
            }
            let index = self.expression(level);
            let range = atype.range();
            self.emit_arg(OpCode::LLimit, Datum::Integer(range.minimum()));
            self.emit_arg(OpCode::ULimit, Datum::Integer(range.maximum()));
            if let Some(itype) = atype.index_type() {
                if itype.scalar_kind() != index.scalar_kind() {
                    self.error(
                        error!(TypeMismatch; "array index is {}, expected {}",
                            index.scalar_kind(), itype.scalar_kind()),
                    );
                }
            }
            let elem = atype.base().unwrap_or_else(TypeDesc::integer);
            if elem.size() != 1 {
                self.emit_arg(OpCode::Push, Datum::from(elem.size()));
                self.emit(OpCode::Mul);
            }
            if range.minimum() != 0 {
                self.emit_arg(OpCode::Push, Datum::Integer(range.minimum()));
                self.emit(OpCode::Sub);
            }
            self.emit(OpCode::Add);
            atype = elem;
            if !self.accept(Kind::Comma) {
                break;
            }
        }
        atype
    }

    /// A record selector; the field offset is static, so selecting the
    /// first field needs no address arithmetic at all.
    fn var_selector(&mut self, rtype: TypePtr) -> TypePtr {
        if rtype.kind() != TypeKind::Record {
            self.error(error!(TypeMismatch; "selector into a non-record, got {}", rtype.kind()));
        }
        let selector = self.ts.current().string_value.clone();
        let mut ty = rtype.clone();
        if self.expect(Kind::Identifier) {
            let mut offset = 0usize;
            let mut found = false;
            for field in rtype.fields() {
                if field.name().as_ref() == selector.as_ref() {
                    ty = field.field_type().clone();
                    found = true;
                    break;
                }
                offset += field.field_type().size();
            }
            if !found {
                self.error(error!(Undefined; "no field {}", selector));
            } else if offset > 0 {
                self.emit_arg(OpCode::Push, Datum::from(offset));
                self.emit(OpCode::Add);
            }
        }
        ty
    }

    // ----- statements -----------------------------------------------------

    /// `variable := expression`; with `dup` the address is duplicated
    /// beneath the assignment so the caller can keep using it.
    fn assign_statement(&mut self, level: usize, sym: &SymValue, dup: bool) {
        let mut ty = sym.sym_type().cloned().unwrap_or_else(TypeDesc::integer);
        match sym.kind() {
            SymKind::Function => {
                // the function result lives in the frame's result slot
                let lvl = level.saturating_sub(sym.level() + 1) as i8;
                self.emit_instr(OpCode::PushVar, lvl, Datum::from(FRAME_RET_VAL));
            }
            SymKind::Variable => {
                ty = self.variable(level, sym);
            }
            _ => self.error(error!(KindMismatch; "expected a variable or a function result")),
        }
        if dup {
            self.emit(OpCode::Dup);
        }
        self.expect(Kind::Assign);
        let rtype = self.expression(level);
        self.assign_promote(&ty, &rtype);
        self.emit_arg(OpCode::Assign, Datum::from(ty.size()));
    }

    /// Call a procedure or function, checking each actual parameter
    /// against the formal's type.
    fn call_statement(&mut self, level: usize, sym: &SymValue) {
        let params = sym.params().to_vec();
        let mut nargs = 0usize;
        if self.accept(Kind::OpenParen) {
            if !self.check(Kind::CloseParen) {
                loop {
                    let arg = self.expression(level);
                    if let Some(param) = params.get(nargs) {
                        self.assign_promote(param, &arg);
                    }
                    nargs += 1;
                    if !self.accept(Kind::Comma) {
                        break;
                    }
                }
            }
            self.expect(Kind::CloseParen);
        }
        if nargs != params.len() {
            self.error(
                error!(ArityMismatch; "passing {} parameters where {} expected",
                    nargs, params.len()),
            );
        }
        if sym.kind() != SymKind::Procedure && sym.kind() != SymKind::Function {
            self.error(error!(KindMismatch; "not a procedure or function"));
            return;
        }
        let lvl = (level - sym.level()) as i8;
        if sym.is_defined() {
            let entry = Address::try_from(sym.value()).unwrap_or(0);
            self.emit_instr(OpCode::Call, lvl, Datum::from(entry));
        } else {
            // the callee's body isn't compiled yet; link() patches this
            let at = self.emit_instr(OpCode::Call, lvl, Datum::Integer(0));
            self.unlinked.push((at, sym.id()));
        }
    }

    fn ident_statement(&mut self, level: usize, id: &str) {
        let sym = match self.find(id) {
            Some(sym) => sym,
            None => return,
        };
        match sym.kind() {
            SymKind::Procedure => self.call_statement(level, &sym),
            SymKind::Function | SymKind::Variable => self.assign_statement(level, &sym, false),
            SymKind::Constant => {
                self.error(error!(KindMismatch; "cannot assign to constant {}", id))
            }
            SymKind::Type => {
                self.error(error!(KindMismatch; "expected a variable or subroutine, got {}", id))
            }
        }
    }

    fn if_statement(&mut self, level: usize) {
        self.expression(level);
        let jmp_pc = self.emit_arg(OpCode::Jneq, Datum::Integer(0));
        self.expect(Kind::Then);
        self.statement(level);
        if self.accept(Kind::Else) {
            let else_pc = self.emit_arg(OpCode::Jump, Datum::Integer(0));
            let to = self.here();
            self.patch(jmp_pc, to);
            self.statement(level);
            let to = self.here();
            self.patch(else_pc, to);
        } else {
            let to = self.here();
            self.patch(jmp_pc, to);
        }
    }

    fn while_statement(&mut self, level: usize) {
        let cond_pc = self.here();
        self.expression(level);
        let jmp_pc = self.emit_arg(OpCode::Jneq, Datum::Integer(0));
        self.expect(Kind::Do);
        self.statement(level);
        self.emit_arg(OpCode::Jump, Datum::from(cond_pc));
        let to = self.here();
        self.patch(jmp_pc, to);
    }

    fn repeat_statement(&mut self, level: usize) {
        let loop_pc = self.here();
        self.statement(level);
        self.expect(Kind::Until);
        self.expression(level);
        // loop while the condition is still false
        self.emit_arg(OpCode::Jneq, Datum::from(loop_pc));
    }

    fn for_statement(&mut self, level: usize) {
        if !self.check(Kind::Identifier) {
            self.expect(Kind::Identifier);
            return;
        }
        let id = self.ident_value();
        let sym = match self.find(&id) {
            Some(sym) => sym,
            None => return,
        };
        self.assign_statement(level, &sym, true); //          addr
        let (step, cmp) = if self.accept(Kind::To) {
            (1, OpCode::Lte)
        } else {
            self.expect(Kind::DownTo);
            (-1, OpCode::Gte)
        };
        let cond_pc = self.here();
        self.emit(OpCode::Dup); //                            addr, addr
        self.emit_arg(OpCode::Eval, Datum::Integer(1)); //    addr, value
        self.expression(level); //                            addr, value, bound
        self.emit(cmp); //                                    addr, continue?
        let jmp_pc = self.emit_arg(OpCode::Jneq, Datum::Integer(0));
        self.expect(Kind::Do);
        self.statement(level);
        self.emit(OpCode::Dup); //                            addr, addr
        self.emit(OpCode::Dup); //                            addr, addr, addr
        self.emit_arg(OpCode::Eval, Datum::Integer(1)); //    addr, addr, value
        self.emit_arg(OpCode::Push, Datum::Integer(step));
        self.emit(OpCode::Add); //                            addr, addr, value'
        self.emit_arg(OpCode::Assign, Datum::Integer(1)); //  addr
        self.emit_arg(OpCode::Jump, Datum::from(cond_pc));
        let pop_pc = self.emit_arg(OpCode::Pop, Datum::Integer(1));
        self.patch(jmp_pc, pop_pc);
    }

    /// `write`/`writeln` arguments: `expr [ : width [ : precision ] ]`,
    /// with zero pushed for whatever was not given.
    fn write_statement(&mut self, level: usize, op: OpCode) {
        let mut nargs = 0i64;
        if self.accept(Kind::OpenParen) {
            loop {
                let expr = self.expression(level);
                if expr.size() != 1 {
                    self.error(error!(TypeMismatch; "cannot write an aggregate value"));
                }
                if self.accept(Kind::Colon) {
                    let width = self.expression(level);
                    if !Self::is_an_integer(&width) {
                        self.error(
                            error!(TypeMismatch; "expected an integer width, got {}",
                                width.scalar_kind()),
                        );
                    }
                    if self.accept(Kind::Colon) {
                        let precision = self.expression(level);
                        if !Self::is_an_integer(&precision) {
                            self.error(
                                error!(TypeMismatch; "expected an integer precision, got {}",
                                    precision.scalar_kind()),
                            );
                        }
                    } else {
                        self.emit_arg(OpCode::Push, Datum::Integer(0));
                    }
                } else {
                    self.emit_arg(OpCode::Push, Datum::Integer(0));
                    self.emit_arg(OpCode::Push, Datum::Integer(0));
                }
                nargs += 1;
                if !self.accept(Kind::Comma) {
                    break;
                }
            }
            self.expect(Kind::CloseParen);
        }
        self.emit_arg(OpCode::Push, Datum::Integer(nargs));
        self.emit(op);
    }

    /// `new(p)` - allocate the pointee and store its address through p.
    fn statement_new(&mut self, level: usize) {
        self.expect(Kind::OpenParen);
        if !self.check(Kind::Identifier) {
            self.expect(Kind::Identifier);
            return;
        }
        let id = self.ident_value();
        let tdesc = match self.find(&id) {
            Some(sym) if sym.kind() == SymKind::Variable => self.variable(level, &sym),
            Some(_) => {
                self.error(error!(KindMismatch; "expected a variable, got {}", id));
                TypeDesc::integer()
            }
            None => TypeDesc::integer(),
        };
        if tdesc.kind() != TypeKind::Pointer {
            self.error(error!(TypeMismatch; "expected a pointer, got {}", tdesc.kind()));
        }
        let size = tdesc.base().map(|b| b.size()).unwrap_or(1);
        self.emit_arg(OpCode::Push, Datum::from(size));
        self.emit(OpCode::New);
        self.emit_arg(OpCode::Assign, Datum::Integer(1));
        self.expect(Kind::CloseParen);
    }

    /// `dispose(e)` - evaluate a pointer and free its block.
    fn statement_dispose(&mut self, level: usize) {
        self.expect(Kind::OpenParen);
        let ty = self.expression(level);
        if ty.kind() != TypeKind::Pointer {
            self.error(error!(TypeMismatch; "expected a pointer, got {}", ty.kind()));
        }
        self.emit(OpCode::Dispose);
        self.expect(Kind::CloseParen);
    }

    fn statement_procs(&mut self, level: usize) {
        if self.accept(Kind::Write) {
            self.write_statement(level, OpCode::Write);
        } else if self.accept(Kind::Writeln) {
            self.write_statement(level, OpCode::Writeln);
        } else if self.accept(Kind::New) {
            self.statement_new(level);
        } else if self.accept(Kind::Dispose) {
            self.statement_dispose(level);
        }
        // otherwise an empty statement
    }

    fn statement(&mut self, level: usize) {
        if self.check(Kind::Identifier) {
            let id = self.ident_value();
            self.ident_statement(level, &id);
        } else if self.accept(Kind::Begin) {
            self.statement_list(level);
            self.expect(Kind::End);
        } else if self.accept(Kind::If) {
            self.if_statement(level);
        } else if self.accept(Kind::While) {
            self.while_statement(level);
        } else if self.accept(Kind::Repeat) {
            self.repeat_statement(level);
        } else if self.accept(Kind::For) {
            self.for_statement(level);
        } else {
            self.statement_procs(level);
        }
    }

    fn statement_list(&mut self, level: usize) {
        loop {
            self.statement(level);
            if !self.accept(Kind::SemiColon) {
                break;
            }
        }
    }

    // ----- declarations ---------------------------------------------------

    fn const_decl(&mut self, level: usize) {
        let ident = self.name_decl();
        self.expect(Kind::EQU);
        match self.const_expr() {
            Some(value) => {
                let ty = match value {
                    Datum::Integer(_) => TypeDesc::integer(),
                    Datum::Real(_) => TypeDesc::real(),
                };
                if self.verbose {
                    println!("{}: const {} = {}", self.name, ident, value);
                }
                self.insert(ident, SymValue::make_const(level, value, ty));
            }
            None => self.error(
                error!(SyntaxError; "expected a constant expression, got {}", self.ts.current()),
            ),
        }
    }

    fn const_decl_list(&mut self, level: usize) {
        const STOPS: &[Kind] = &[
            Kind::TypeDecl,
            Kind::VarDecl,
            Kind::ProcDecl,
            Kind::FuncDecl,
            Kind::Begin,
        ];
        if self.accept(Kind::ConstDecl) {
            loop {
                if self.one_of(STOPS) {
                    break;
                }
                self.const_decl(level);
                if !self.accept(Kind::SemiColon) {
                    break;
                }
            }
        }
    }

    fn type_decl(&mut self, level: usize) {
        let ident = self.name_decl();
        self.expect(Kind::EQU);
        let tdesc = self.type_spec(level);
        if self.verbose {
            println!("{}: type {} = {}", self.name, ident, tdesc.kind());
        }
        self.insert(ident, SymValue::make_type(level, tdesc));
    }

    fn type_decl_list(&mut self, level: usize) {
        const STOPS: &[Kind] = &[Kind::VarDecl, Kind::ProcDecl, Kind::FuncDecl, Kind::Begin];
        if self.accept(Kind::TypeDecl) {
            self.in_type_section = true;
            loop {
                if self.one_of(STOPS) {
                    break;
                }
                self.type_decl(level);
                if !self.accept(Kind::SemiColon) {
                    break;
                }
            }
            self.in_type_section = false;
            self.resolve_pointers();
        }
    }

    /// Install the pointees of forward pointer references now that the
    /// whole type section has been seen.
    fn resolve_pointers(&mut self) {
        let pending = std::mem::take(&mut self.pending_pointers);
        for (name, ptr) in pending {
            let resolved = self
                .symtbl
                .lookup(&name)
                .filter(|sym| sym.kind() == SymKind::Type)
                .and_then(|sym| sym.sym_type().cloned());
            match resolved {
                Some(ty) => ptr.set_base(ty),
                None => self.error(error!(Undefined; "{}", name)),
            }
        }
    }

    /// The `var` section. Returns the size of the local variable area.
    fn var_decl_block(&mut self, level: usize) -> usize {
        let mut idents = vec![];
        if self.accept(Kind::VarDecl) {
            self.var_decl_list(level, false, &mut idents);
        }
        idents.iter().map(|f| f.field_type().size()).sum()
    }

    /// Declare variables or formal parameters. Locals pack upward from
    /// the end of the frame prefix; parameters sit below the frame at
    /// `-n..-1`, leftmost first, where the caller pushed them.
    fn var_decl_list(&mut self, level: usize, params: bool, idents: &mut Vec<Field>) {
        const STOPS: &[Kind] = &[Kind::ProcDecl, Kind::FuncDecl, Kind::Begin, Kind::CloseParen];
        loop {
            if self.one_of(STOPS) {
                break;
            }
            self.var_decl(level, idents);
            if !self.accept(Kind::SemiColon) {
                break;
            }
        }
        let mut dx: i64 = if params {
            -idents
                .iter()
                .map(|f| f.field_type().size() as i64)
                .sum::<i64>()
        } else {
            FRAME_SIZE as i64
        };
        for field in idents.iter() {
            if self.verbose {
                println!(
                    "{}: var {}: level {}, offset {}",
                    self.name,
                    field.name(),
                    level,
                    dx
                );
            }
            self.insert(
                field.name().clone(),
                SymValue::make_var(level, dx, field.field_type().clone()),
            );
            dx += field.field_type().size() as i64;
        }
    }

    /// `ident-list : type`.
    fn var_decl(&mut self, level: usize, idents: &mut Vec<Field>) {
        let ids = self.identifier_list();
        self.expect(Kind::Colon);
        let desc = self.type_spec(level);
        for id in ids {
            idents.push(Field::new(id, desc.clone()));
        }
    }

    fn identifier_list(&mut self) -> Vec<Rc<str>> {
        let mut ids = vec![];
        loop {
            let name = self.name_decl();
            if !name.is_empty() {
                ids.push(name);
            }
            if !self.accept(Kind::Comma) {
                break;
            }
        }
        ids
    }

    // ----- types ----------------------------------------------------------

    fn type_spec(&mut self, level: usize) -> TypePtr {
        if self.check(Kind::Identifier) {
            let id = self.ident_value();
            match self.find(&id) {
                Some(sym) if sym.kind() == SymKind::Type => {
                    sym.sym_type().cloned().unwrap_or_else(TypeDesc::integer)
                }
                Some(_) => {
                    self.error(error!(KindMismatch; "{} is not a type", id));
                    TypeDesc::integer()
                }
                None => TypeDesc::integer(),
            }
        } else if self.accept(Kind::Caret) {
            self.pointer_type(level)
        } else if self.check(Kind::Array) || self.check(Kind::Record) {
            self.structured_type(level)
        } else {
            self.simple_type(level)
        }
    }

    /// `^ type`. Inside a type section the pointee may be declared
    /// further down; such a pointer starts empty and is completed by
    /// [`Compiler::resolve_pointers`].
    fn pointer_type(&mut self, level: usize) -> TypePtr {
        if self.check(Kind::Identifier) {
            let id = self.ident_value();
            let known = self.symtbl.lookup(&id).and_then(|sym| {
                if sym.kind() == SymKind::Type {
                    sym.sym_type().cloned()
                } else {
                    None
                }
            });
            match known {
                Some(ty) => TypeDesc::new_pointer(Some(ty)),
                None if self.in_type_section => {
                    let ptr = TypeDesc::new_pointer(None);
                    self.pending_pointers.push((id, ptr.clone()));
                    ptr
                }
                None => {
                    self.error(error!(Undefined; "{}", id));
                    TypeDesc::new_pointer(None)
                }
            }
        } else {
            TypeDesc::new_pointer(Some(self.type_spec(level)))
        }
    }

    /// A named ordinal type, for array indexes and subrange contexts.
    fn simple_type(&mut self, level: usize) -> TypePtr {
        if self.check(Kind::Identifier) {
            let id = self.ident_value();
            match self.find(&id) {
                Some(sym) if sym.kind() == SymKind::Type => {
                    let ty = sym.sym_type().cloned().unwrap_or_else(TypeDesc::integer);
                    if !ty.is_ordinal() {
                        self.error(error!(NotOrdinal; "{}", id));
                    }
                    ty
                }
                Some(_) => {
                    self.error(error!(KindMismatch; "{} is not a type", id));
                    TypeDesc::integer()
                }
                None => TypeDesc::integer(),
            }
        } else {
            self.ordinal_type(level)
        }
    }

    /// `( ident-list )` enumerations and `lo .. hi` subranges.
    fn ordinal_type(&mut self, level: usize) -> TypePtr {
        if self.accept(Kind::OpenParen) {
            let ids = self.identifier_list();
            self.expect(Kind::CloseParen);
            let max = ids.len().saturating_sub(1) as i64;
            let ty = TypeDesc::new_enumeration(SubRange::new(0, max));
            let mut enums = vec![];
            for (value, id) in ids.iter().enumerate() {
                enums.push(Field::new(id.clone(), TypeDesc::integer()));
                if self.verbose {
                    println!("{}: enumeration {} = {}", self.name, id, value);
                }
                self.insert(
                    id.clone(),
                    SymValue::make_const(level, Datum::Integer(value as i64), ty.clone()),
                );
            }
            ty.set_fields(enums);
            ty
        } else {
            let minimum = self.const_expr();
            self.expect(Kind::Ellipsis);
            let maximum = self.const_expr();
            let (minimum, maximum) = match (minimum, maximum) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => {
                    self.error(
                        error!(SyntaxError; "expected a constant expression, got {}",
                            self.ts.current()),
                    );
                    return TypeDesc::integer();
                }
            };
            let (mut lo, mut hi) = match (minimum, maximum) {
                (Datum::Integer(lo), Datum::Integer(hi)) => (lo, hi),
                _ => {
                    self.error(error!(NotOrdinal; "subrange bounds must be ordinal"));
                    (0, 1)
                }
            };
            if lo > hi {
                self.error(error!(RangeInverted; "{} > {}", lo, hi));
                std::mem::swap(&mut lo, &mut hi);
            }
            TypeDesc::new_subrange(SubRange::new(lo, hi), TypeDesc::integer())
        }
    }

    /// `array [ simple-type-list ] of type` and `record field-list end`.
    fn structured_type(&mut self, level: usize) -> TypePtr {
        if self.accept(Kind::Array) {
            self.expect(Kind::OpenBrkt);
            let indexes = self.simple_type_list(level);
            self.expect(Kind::CloseBrkt);
            self.expect(Kind::Of);
            let elem = self.type_spec(level);
            // chain the dimensions outermost first, then size them
            // innermost out
            let descs: Vec<TypePtr> = indexes
                .iter()
                .map(|index| TypeDesc::new_array(index.range(), index.clone()))
                .collect();
            for i in (0..descs.len()).rev() {
                let base = if i + 1 < descs.len() {
                    descs[i + 1].clone()
                } else {
                    elem.clone()
                };
                descs[i].set_size(descs[i].range().span() * base.size());
                descs[i].set_base(base);
            }
            descs.first().cloned().unwrap_or(elem)
        } else {
            self.expect(Kind::Record);
            let fields = self.field_list(level);
            let size = fields.iter().map(|f| f.field_type().size()).sum();
            let desc = TypeDesc::new_record(size, fields);
            self.expect(Kind::End);
            desc
        }
    }

    fn field_list(&mut self, level: usize) -> Vec<Field> {
        let mut fields = vec![];
        loop {
            if self.check(Kind::End) {
                break;
            }
            self.var_decl(level, &mut fields);
            if !self.accept(Kind::SemiColon) {
                break;
            }
        }
        fields
    }

    fn simple_type_list(&mut self, level: usize) -> Vec<TypePtr> {
        let mut types = vec![];
        loop {
            types.push(self.simple_type(level));
            if !self.accept(Kind::Comma) {
                break;
            }
        }
        types
    }

    // ----- subroutines ----------------------------------------------------

    /// The common `ident [ ( var-decl-list ) ]` prefix of procedure and
    /// function declarations. Registers the name right away, so the
    /// subroutine is visible to its own body and its siblings, and
    /// returns `(name, symbol id, parameter area size)`.
    fn sub_prefix_decl(&mut self, level: usize, kind: SymKind) -> (Rc<str>, usize, usize) {
        let ident = self.name_decl();
        let id = self.new_symbol_id();
        if self.verbose {
            println!("{}: {} {}, level {}", self.name, kind, ident, level);
        }
        self.insert(ident.clone(), SymValue::make_sbr(kind, level, id));
        let mut param_size = 0usize;
        if self.accept(Kind::OpenParen) {
            // the parameters belong to the body's level
            let mut idents = vec![];
            self.var_decl_list(level + 1, true, &mut idents);
            self.expect(Kind::CloseParen);
            param_size = idents.iter().map(|f| f.field_type().size()).sum();
            let types = idents.iter().map(|f| f.field_type().clone()).collect();
            self.symtbl.set_params(&ident, level, types);
        }
        (ident, id, param_size)
    }

    fn proc_decl(&mut self, level: usize) {
        let (ident, id, nparams) = self.sub_prefix_decl(level, SymKind::Procedure);
        self.expect(Kind::SemiColon);
        let addr = self.block_decl(level + 1, SymKind::Procedure, nparams);
        self.symtbl.set_entry(&ident, level, addr);
        self.linked.insert(id, addr);
        self.expect(Kind::SemiColon);
    }

    fn func_decl(&mut self, level: usize) {
        let (ident, id, nparams) = self.sub_prefix_decl(level, SymKind::Function);
        self.expect(Kind::Colon);
        let ty = self.type_spec(level);
        self.symtbl.set_type(&ident, level, ty);
        self.expect(Kind::SemiColon);
        let addr = self.block_decl(level + 1, SymKind::Function, nparams);
        self.symtbl.set_entry(&ident, level, addr);
        self.linked.insert(id, addr);
        self.expect(Kind::SemiColon);
    }

    fn sub_decl_list(&mut self, level: usize) {
        loop {
            if self.accept(Kind::ProcDecl) {
                self.proc_decl(level);
            } else if self.accept(Kind::FuncDecl) {
                self.func_decl(level);
            } else {
                break;
            }
        }
    }

    /// Declarations, nested subroutines, then the statement body.
    /// Returns the block's entry address; ENTER is elided when the
    /// local area is empty.
    fn block_decl(&mut self, level: usize, kind: SymKind, nparams: usize) -> Address {
        self.const_decl_list(level);
        self.type_decl_list(level);
        let dx = self.var_decl_block(level);
        self.sub_decl_list(level);
        let addr = if dx > 0 {
            self.emit_arg(OpCode::Enter, Datum::from(dx))
        } else {
            self.here()
        };
        if self.expect(Kind::Begin) {
            self.statement_list(level);
            self.expect(Kind::End);
        }
        match kind {
            SymKind::Function => self.emit_arg(OpCode::RetF, Datum::from(nparams)),
            _ => self.emit_arg(OpCode::Ret, Datum::from(nparams)),
        };
        self.symtbl.purge(level);
        addr
    }

    /// `program ident ; block .` - emits the `CALL, HALT` prelude and
    /// patches the call once the main block's entry is known.
    fn prog_decl(&mut self) {
        let level = 0;
        self.expect(Kind::ProgDecl);
        let (_ident, id, nparams) = self.sub_prefix_decl(level, SymKind::Procedure);
        self.expect(Kind::SemiColon);
        let call_pc = self.emit_instr(OpCode::Call, 0, Datum::Integer(0));
        self.emit(OpCode::Halt);
        let addr = self.block_decl(level, SymKind::Procedure, nparams);
        self.linked.insert(id, addr);
        self.patch(call_pc, addr);
        self.expect(Kind::Period);
    }
}
