use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Shared handle to a type descriptor. Descriptors are built once by the
/// compiler and then treated as immutable; the interior mutability below
/// exists only for two-phase construction (an array learns its element
/// type after its index types, a pointer may learn its pointee after the
/// record that contains it is finished).
pub type TypePtr = Rc<TypeDesc>;

/// An ordinal interval, `minimum..=maximum`. Doubles as the value bound
/// of ordinal types and as an array's index bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRange {
    min: i64,
    max: i64,
}

impl SubRange {
    /// The widest representable range; a bound check against it can
    /// never fire, so the compiler elides limit opcodes for it.
    pub const MAX: SubRange = SubRange {
        min: i64::MIN,
        max: i64::MAX,
    };

    pub fn new(min: i64, max: i64) -> SubRange {
        SubRange { min, max }
    }

    pub fn minimum(&self) -> i64 {
        self.min
    }

    pub fn maximum(&self) -> i64 {
        self.max
    }

    pub fn span(&self) -> usize {
        (self.max as i128 - self.min as i128 + 1) as usize
    }
}

/// A record field or an enumerator: a name and its type.
#[derive(Debug, Clone)]
pub struct Field {
    name: Rc<str>,
    ty: TypePtr,
}

impl Field {
    pub fn new(name: Rc<str>, ty: TypePtr) -> Field {
        Field { name, ty }
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn field_type(&self) -> &TypePtr {
        &self.ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Integer,
    Real,
    Boolean,
    Character,
    Array,
    Record,
    Enumeration,
    Pointer,
    SubRange,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Kind::*;
        let s = match self {
            Integer => "integer",
            Real => "real",
            Boolean => "boolean",
            Character => "char",
            Array => "array",
            Record => "record",
            Enumeration => "enumeration",
            Pointer => "pointer",
            SubRange => "subrange",
        };
        write!(f, "{}", s)
    }
}

/// ## Type descriptor
///
/// One node in the acyclic descriptor graph. `size` is in Datums: 1 for
/// every scalar and pointer, the field sum for records, element size
/// times span for arrays.
#[derive(Debug)]
pub struct TypeDesc {
    kind: Kind,
    size: Cell<usize>,
    range: Cell<SubRange>,
    itype: RefCell<Option<TypePtr>>,
    base: RefCell<Option<TypePtr>>,
    fields: RefCell<Vec<Field>>,
}

thread_local!(
    static INT_DESC: TypePtr = TypeDesc::new(Kind::Integer, 1, SubRange::MAX);
    static REAL_DESC: TypePtr = TypeDesc::new(Kind::Real, 1, SubRange::MAX);
    static BOOL_DESC: TypePtr = TypeDesc::new(Kind::Boolean, 1, SubRange::new(0, 1));
    static CHAR_DESC: TypePtr = TypeDesc::new(Kind::Character, 1, SubRange::new(0, 255));
);

impl TypeDesc {
    fn new(kind: Kind, size: usize, range: SubRange) -> TypePtr {
        Rc::new(TypeDesc {
            kind,
            size: Cell::new(size),
            range: Cell::new(range),
            itype: RefCell::new(None),
            base: RefCell::new(None),
            fields: RefCell::new(vec![]),
        })
    }

    pub fn integer() -> TypePtr {
        INT_DESC.with(Rc::clone)
    }

    pub fn real() -> TypePtr {
        REAL_DESC.with(Rc::clone)
    }

    pub fn boolean() -> TypePtr {
        BOOL_DESC.with(Rc::clone)
    }

    pub fn character() -> TypePtr {
        CHAR_DESC.with(Rc::clone)
    }

    /// An integer subrange, `min..max` of the base scalar.
    pub fn new_subrange(range: SubRange, base: TypePtr) -> TypePtr {
        let desc = TypeDesc::new(Kind::SubRange, 1, range);
        *desc.base.borrow_mut() = Some(base);
        desc
    }

    /// An array dimension. The element type and total size may be
    /// installed later, once the rest of the index list is known.
    pub fn new_array(range: SubRange, itype: TypePtr) -> TypePtr {
        let desc = TypeDesc::new(Kind::Array, range.span(), range);
        *desc.itype.borrow_mut() = Some(itype);
        desc
    }

    pub fn new_record(size: usize, fields: Vec<Field>) -> TypePtr {
        let desc = TypeDesc::new(Kind::Record, size, SubRange::MAX);
        *desc.fields.borrow_mut() = fields;
        desc
    }

    /// An enumeration over `range.span()` enumerators; the enumerator
    /// list is installed once the constants are declared.
    pub fn new_enumeration(range: SubRange) -> TypePtr {
        TypeDesc::new(Kind::Enumeration, 1, range)
    }

    /// A pointer type. `base` is `None` for a forward reference; the
    /// pointee is installed when its declaration is seen.
    pub fn new_pointer(base: Option<TypePtr>) -> TypePtr {
        let desc = TypeDesc::new(Kind::Pointer, 1, SubRange::MAX);
        *desc.base.borrow_mut() = base;
        desc
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn size(&self) -> usize {
        self.size.get()
    }

    pub fn set_size(&self, size: usize) {
        self.size.set(size);
    }

    pub fn range(&self) -> SubRange {
        self.range.get()
    }

    /// An array's index type.
    pub fn index_type(&self) -> Option<TypePtr> {
        self.itype.borrow().clone()
    }

    /// The element type of an array, the pointee of a pointer, or the
    /// scalar beneath a subrange.
    pub fn base(&self) -> Option<TypePtr> {
        self.base.borrow().clone()
    }

    pub fn set_base(&self, base: TypePtr) {
        *self.base.borrow_mut() = Some(base);
    }

    pub fn fields(&self) -> Vec<Field> {
        self.fields.borrow().clone()
    }

    pub fn set_fields(&self, fields: Vec<Field>) {
        *self.fields.borrow_mut() = fields;
    }

    pub fn is_ordinal(&self) -> bool {
        use Kind::*;
        matches!(
            self.kind,
            Integer | Boolean | Character | Enumeration | SubRange
        )
    }

    /// The kind used for compatibility checks: a subrange acts as its
    /// base scalar everywhere except bound checking.
    pub fn scalar_kind(&self) -> Kind {
        match self.kind {
            Kind::SubRange => match self.base() {
                Some(base) => base.scalar_kind(),
                None => Kind::Integer,
            },
            kind => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span() {
        assert_eq!(SubRange::new(1, 5).span(), 5);
        assert_eq!(SubRange::new(-3, 3).span(), 7);
        assert_eq!(SubRange::new(0, 0).span(), 1);
    }

    #[test]
    fn test_ordinals() {
        assert!(TypeDesc::integer().is_ordinal());
        assert!(TypeDesc::boolean().is_ordinal());
        assert!(TypeDesc::character().is_ordinal());
        assert!(!TypeDesc::real().is_ordinal());
        assert!(!TypeDesc::new_pointer(None).is_ordinal());
    }

    #[test]
    fn test_subrange_acts_as_base_scalar() {
        let sub = TypeDesc::new_subrange(SubRange::new(1, 5), TypeDesc::integer());
        assert_eq!(sub.kind(), Kind::SubRange);
        assert_eq!(sub.scalar_kind(), Kind::Integer);
        assert!(sub.is_ordinal());
        assert_eq!(sub.size(), 1);
    }

    #[test]
    fn test_two_phase_pointer() {
        let ptr = TypeDesc::new_pointer(None);
        assert!(ptr.base().is_none());
        let node = TypeDesc::new_record(2, vec![Field::new("next".into(), ptr.clone())]);
        ptr.set_base(node.clone());
        let pointee = ptr.base().expect("pointee installed");
        assert_eq!(pointee.kind(), Kind::Record);
        assert_eq!(pointee.size(), 2);
    }
}
