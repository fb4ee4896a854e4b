use super::datum::Datum;
use super::types::TypePtr;
use crate::error;
use crate::lang::Error;
use std::collections::HashMap;
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    Constant,
    Variable,
    Type,
    Procedure,
    Function,
}

impl std::fmt::Display for SymKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use SymKind::*;
        let s = match self {
            Constant => "constant",
            Variable => "variable",
            Type => "type",
            Procedure => "procedure",
            Function => "function",
        };
        write!(f, "{}", s)
    }
}

/// ## Symbol table entry
///
/// What the compiler knows about one declared name. `value` depends on
/// the kind: a constant's literal, a variable's frame offset, or a
/// subroutine's entry address. Subroutines additionally carry a unique
/// `id` so that calls emitted before the body is compiled can be linked
/// up afterwards, and `defined` flips once the entry address is known.
#[derive(Debug, Clone)]
pub struct SymValue {
    kind: SymKind,
    level: usize,
    value: Datum,
    ty: Option<TypePtr>,
    params: Vec<TypePtr>,
    id: usize,
    defined: bool,
}

impl SymValue {
    pub fn make_const(level: usize, value: Datum, ty: TypePtr) -> SymValue {
        SymValue {
            kind: SymKind::Constant,
            level,
            value,
            ty: Some(ty),
            params: vec![],
            id: 0,
            defined: true,
        }
    }

    pub fn make_var(level: usize, offset: i64, ty: TypePtr) -> SymValue {
        SymValue {
            kind: SymKind::Variable,
            level,
            value: Datum::Integer(offset),
            ty: Some(ty),
            params: vec![],
            id: 0,
            defined: true,
        }
    }

    pub fn make_type(level: usize, ty: TypePtr) -> SymValue {
        SymValue {
            kind: SymKind::Type,
            level,
            value: Datum::Integer(0),
            ty: Some(ty),
            params: vec![],
            id: 0,
            defined: true,
        }
    }

    /// A procedure or function. The entry address and, for functions,
    /// the return type arrive later via the table's setters.
    pub fn make_sbr(kind: SymKind, level: usize, id: usize) -> SymValue {
        SymValue {
            kind,
            level,
            value: Datum::Integer(0),
            ty: None,
            params: vec![],
            id,
            defined: false,
        }
    }

    pub fn kind(&self) -> SymKind {
        self.kind
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn value(&self) -> Datum {
        self.value
    }

    pub fn sym_type(&self) -> Option<&TypePtr> {
        self.ty.as_ref()
    }

    pub fn params(&self) -> &[TypePtr] {
        &self.params
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }
}

/// ## The symbol table
///
/// A multimap from identifier to entries, at most one entry per
/// (name, level). Keeping every level's entries side by side, rather
/// than a stack of scopes, lets a declaration become visible to its
/// siblings immediately; `purge` strips a whole level on block exit.
#[derive(Debug, Default)]
pub struct SymbolTable {
    table: HashMap<Rc<str>, Vec<SymValue>>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    /// Add an entry. A prior entry for the same name at the same level
    /// is the redefinition diagnostic.
    pub fn insert(&mut self, name: Rc<str>, sym: SymValue) -> Result<()> {
        let entries = self.table.entry(name.clone()).or_default();
        if entries.iter().any(|s| s.level == sym.level) {
            return Err(error!(Redefined; "{}", name));
        }
        entries.push(sym);
        Ok(())
    }

    /// The shadowing entry for a name: the one declared at the highest
    /// level still in the table.
    pub fn lookup(&self, name: &str) -> Option<&SymValue> {
        self.table
            .get(name)?
            .iter()
            .max_by_key(|sym| sym.level)
    }

    /// Every entry sharing the name, all levels.
    pub fn equal_range(&self, name: &str) -> &[SymValue] {
        self.table.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Remove every entry declared at `level`. Called on block exit so
    /// the enclosing scope's entries shadow again.
    pub fn purge(&mut self, level: usize) {
        for entries in self.table.values_mut() {
            entries.retain(|sym| sym.level != level);
        }
        self.table.retain(|_, entries| !entries.is_empty());
    }

    fn entry_mut(&mut self, name: &str, level: usize) -> Option<&mut SymValue> {
        self.table
            .get_mut(name)?
            .iter_mut()
            .find(|sym| sym.level == level)
    }

    /// Install a subroutine's entry address once its block is compiled.
    pub fn set_entry(&mut self, name: &str, level: usize, addr: usize) {
        if let Some(sym) = self.entry_mut(name, level) {
            sym.value = Datum::from(addr);
            sym.defined = true;
        }
    }

    /// Install a function's return type.
    pub fn set_type(&mut self, name: &str, level: usize, ty: TypePtr) {
        if let Some(sym) = self.entry_mut(name, level) {
            sym.ty = Some(ty);
        }
    }

    /// Install a subroutine's formal parameter types, leftmost first.
    pub fn set_params(&mut self, name: &str, level: usize, params: Vec<TypePtr>) {
        if let Some(sym) = self.entry_mut(name, level) {
            sym.params = params;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ErrorCode;
    use crate::mach::TypeDesc;

    fn var(level: usize, offset: i64) -> SymValue {
        SymValue::make_var(level, offset, TypeDesc::integer())
    }

    #[test]
    fn test_shadowing() {
        let mut tbl = SymbolTable::new();
        tbl.insert("x".into(), var(0, 4)).unwrap();
        tbl.insert("x".into(), var(2, 5)).unwrap();
        tbl.insert("x".into(), var(1, 6)).unwrap();
        let sym = tbl.lookup("x").unwrap();
        assert_eq!(sym.level(), 2);
        assert_eq!(sym.value(), Datum::Integer(5));
        assert_eq!(tbl.equal_range("x").len(), 3);
    }

    #[test]
    fn test_redefined_same_level() {
        let mut tbl = SymbolTable::new();
        tbl.insert("x".into(), var(1, 4)).unwrap();
        let err = tbl.insert("x".into(), var(1, 5)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Redefined);
    }

    #[test]
    fn test_purge_strips_one_level() {
        let mut tbl = SymbolTable::new();
        tbl.insert("x".into(), var(0, 4)).unwrap();
        tbl.insert("x".into(), var(1, 5)).unwrap();
        tbl.insert("y".into(), var(1, 6)).unwrap();
        tbl.purge(1);
        assert_eq!(tbl.lookup("x").unwrap().level(), 0);
        assert!(tbl.lookup("y").is_none());
        // a level below the purged one is untouched
        assert_eq!(tbl.equal_range("x").len(), 1);
    }

    #[test]
    fn test_subroutine_definition() {
        let mut tbl = SymbolTable::new();
        tbl.insert("f".into(), SymValue::make_sbr(SymKind::Function, 0, 1))
            .unwrap();
        assert!(!tbl.lookup("f").unwrap().is_defined());
        tbl.set_params("f", 0, vec![TypeDesc::integer()]);
        tbl.set_type("f", 0, TypeDesc::integer());
        tbl.set_entry("f", 0, 12);
        let sym = tbl.lookup("f").unwrap();
        assert!(sym.is_defined());
        assert_eq!(sym.value(), Datum::Integer(12));
        assert_eq!(sym.params().len(), 1);
    }
}
