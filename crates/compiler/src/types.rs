//! Type system for Ada 83
//!
//! `TypeInfo` carries every representation attribute the rest of the
//! compiler needs: kind, base/element links, scalar bounds, components and
//! discriminants, layout, enumeration literals, representation clauses and
//! the suppress-check mask. Types live in an index arena (`TypeTable`),
//! never freed; subtypes share structure with their base and narrow bounds,
//! derived types point at their parent.
//!
//! Freezing finalizes layout the first time a type is used in a context
//! that requires it; a frozen type's size, alignment and component offsets
//! are immutable afterwards.

use crate::ast::NodeId;
use crate::intern::{NameId, NameTable};
use crate::symbols::{SymId, SymbolTable};
use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Integer,
    /// Universal integer, the compile-time type of integer literals.
    Unsigned,
    Boolean,
    Character,
    Float,
    /// Universal real, the compile-time type of real literals.
    UniversalFloat,
    Fixed,
    Enum,
    Array,
    Record,
    Access,
    Derived,
    /// Subtype reference: shares structure with its base, narrows bounds.
    Subtype,
    Private,
    /// Two-word {data, bounds} runtime value for unconstrained arrays.
    FatPointer,
    /// Subprogram signature type.
    Signature,
    Task,
}

bitflags! {
    /// Check categories a `pragma Suppress` can disable per type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SuppressMask: u8 {
        const RANGE_CHECK = 0b0000_0001;
        const INDEX_CHECK = 0b0000_0010;
        const DIVISION_CHECK = 0b0000_0100;
        const DISCRIMINANT_CHECK = 0b0000_1000;
        const ACCESS_CHECK = 0b0001_0000;
        const ALL_CHECKS = 0b0001_1111;
    }
}

/// Result category of a type comparison, used by overload scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareKind {
    Same,
    Derived,
    BasedOn,
    ArrayElement,
    AccessDesignated,
    None,
}

#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub kind: TypeKind,
    pub name: Option<NameId>,
    pub base: Option<TypeId>,
    /// Element type for arrays, designated type for access types.
    pub elem: Option<TypeId>,
    /// Index subtypes, one per array dimension.
    pub indexes: Vec<TypeId>,
    /// Scalar bounds; for arrays `lo = 0, hi = -1` means unconstrained.
    pub lo: i64,
    pub hi: i64,
    /// Float bounds when a real range constraint applies.
    pub flo: f64,
    pub fhi: f64,
    pub components: Vec<SymId>,
    pub discriminants: Vec<SymId>,
    pub size_bits: u32,
    pub align_bits: u32,
    pub literals: Vec<SymId>,
    pub rep_clauses: Vec<NodeId>,
    pub suppress: SuppressMask,
    pub delta: f64,
    pub small: f64,
    pub digits: u32,
    pub packed: bool,
    pub controlled: bool,
    /// Attached operations synthesized at freeze time (`=`, `:=`, init).
    pub attached_ops: Vec<SymId>,
    pub frozen: bool,
    pub freeze_node: Option<NodeId>,
}

impl TypeInfo {
    pub fn new(kind: TypeKind) -> Self {
        TypeInfo {
            kind,
            name: None,
            base: None,
            elem: None,
            indexes: Vec::new(),
            lo: 0,
            hi: 0,
            flo: 0.0,
            fhi: 0.0,
            components: Vec::new(),
            discriminants: Vec::new(),
            size_bits: 0,
            align_bits: 0,
            literals: Vec::new(),
            rep_clauses: Vec::new(),
            suppress: SuppressMask::empty(),
            delta: 0.0,
            small: 0.0,
            digits: 0,
            packed: false,
            controlled: false,
            attached_ops: Vec::new(),
            frozen: false,
            freeze_node: None,
        }
    }
}

/// Index arena of types plus handles for the predefined environment.
#[derive(Debug)]
pub struct TypeTable {
    infos: Vec<TypeInfo>,
    pub integer: TypeId,
    pub natural: TypeId,
    pub positive: TypeId,
    pub boolean: TypeId,
    pub character: TypeId,
    pub string: TypeId,
    pub float: TypeId,
    pub duration: TypeId,
    pub universal_integer: TypeId,
    pub universal_real: TypeId,
    pub file_type: TypeId,
}

impl TypeTable {
    /// Create the predefined Ada 83 types. Their symbols are installed by
    /// the analyzer's standard-environment setup.
    pub fn new(names: &mut NameTable) -> Self {
        let mut infos = Vec::new();
        let mut alloc = |info: TypeInfo| {
            let id = TypeId(infos.len() as u32);
            infos.push(info);
            id
        };

        let mut universal_int = TypeInfo::new(TypeKind::Unsigned);
        universal_int.lo = i64::MIN;
        universal_int.hi = i64::MAX;
        universal_int.size_bits = 64;
        universal_int.align_bits = 64;
        universal_int.frozen = true;
        let universal_integer = alloc(universal_int);

        let mut universal_flt = TypeInfo::new(TypeKind::UniversalFloat);
        universal_flt.size_bits = 64;
        universal_flt.align_bits = 64;
        universal_flt.frozen = true;
        let universal_real = alloc(universal_flt);

        let mut int = TypeInfo::new(TypeKind::Integer);
        int.name = Some(names.intern("Integer"));
        int.lo = i64::MIN;
        int.hi = i64::MAX;
        int.size_bits = 64;
        int.align_bits = 64;
        int.frozen = true;
        let integer = alloc(int);

        let mut nat = TypeInfo::new(TypeKind::Subtype);
        nat.name = Some(names.intern("Natural"));
        nat.base = Some(integer);
        nat.lo = 0;
        nat.hi = i64::MAX;
        nat.size_bits = 64;
        nat.align_bits = 64;
        nat.frozen = true;
        let natural = alloc(nat);

        let mut pos = TypeInfo::new(TypeKind::Subtype);
        pos.name = Some(names.intern("Positive"));
        pos.base = Some(integer);
        pos.lo = 1;
        pos.hi = i64::MAX;
        pos.size_bits = 64;
        pos.align_bits = 64;
        pos.frozen = true;
        let positive = alloc(pos);

        let mut boolean_info = TypeInfo::new(TypeKind::Boolean);
        boolean_info.name = Some(names.intern("Boolean"));
        boolean_info.lo = 0;
        boolean_info.hi = 1;
        boolean_info.size_bits = 8;
        boolean_info.align_bits = 8;
        boolean_info.frozen = true;
        let boolean = alloc(boolean_info);

        let mut ch = TypeInfo::new(TypeKind::Character);
        ch.name = Some(names.intern("Character"));
        ch.lo = 0;
        ch.hi = 127;
        ch.size_bits = 8;
        ch.align_bits = 8;
        ch.frozen = true;
        let character = alloc(ch);

        let mut flt = TypeInfo::new(TypeKind::Float);
        flt.name = Some(names.intern("Float"));
        flt.size_bits = 64;
        flt.align_bits = 64;
        flt.digits = 15;
        flt.frozen = true;
        let float = alloc(flt);

        let mut string_info = TypeInfo::new(TypeKind::Array);
        string_info.name = Some(names.intern("String"));
        string_info.elem = Some(character);
        string_info.indexes = vec![positive];
        string_info.lo = 0;
        string_info.hi = -1;
        string_info.size_bits = 128;
        string_info.align_bits = 64;
        string_info.frozen = true;
        let string = alloc(string_info);

        let mut dur = TypeInfo::new(TypeKind::Fixed);
        dur.name = Some(names.intern("Duration"));
        dur.delta = 0.000_001;
        dur.small = 0.000_001;
        dur.size_bits = 64;
        dur.align_bits = 64;
        dur.frozen = true;
        let duration = alloc(dur);

        let mut file = TypeInfo::new(TypeKind::Private);
        file.name = Some(names.intern("File_Type"));
        file.size_bits = 64;
        file.align_bits = 64;
        file.frozen = true;
        let file_type = alloc(file);

        TypeTable {
            infos,
            integer,
            natural,
            positive,
            boolean,
            character,
            string,
            float,
            duration,
            universal_integer,
            universal_real,
            file_type,
        }
    }

    pub fn alloc(&mut self, info: TypeInfo) -> TypeId {
        let id = TypeId(self.infos.len() as u32);
        self.infos.push(info);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.infos[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeInfo {
        &mut self.infos[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Follow base links of subtypes and derived types to the root type.
    pub fn base_of(&self, mut id: TypeId) -> TypeId {
        loop {
            let info = self.get(id);
            match (info.kind, info.base) {
                (TypeKind::Subtype, Some(b)) | (TypeKind::Derived, Some(b)) => id = b,
                _ => return id,
            }
        }
    }

    /// Strip one level of subtype indirection, keeping derived identity.
    pub fn concrete_of(&self, mut id: TypeId) -> TypeId {
        while self.get(id).kind == TypeKind::Subtype {
            match self.get(id).base {
                Some(b) => id = b,
                None => break,
            }
        }
        id
    }

    pub fn is_discrete(&self, id: TypeId) -> bool {
        matches!(
            self.get(self.base_of(id)).kind,
            TypeKind::Integer
                | TypeKind::Unsigned
                | TypeKind::Boolean
                | TypeKind::Character
                | TypeKind::Enum
        )
    }

    pub fn is_real(&self, id: TypeId) -> bool {
        matches!(
            self.get(self.base_of(id)).kind,
            TypeKind::Float | TypeKind::UniversalFloat | TypeKind::Fixed
        )
    }

    pub fn is_scalar(&self, id: TypeId) -> bool {
        self.is_discrete(id) || self.is_real(id)
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        self.get(self.base_of(id)).kind == TypeKind::Array
    }

    pub fn is_record(&self, id: TypeId) -> bool {
        self.get(self.base_of(id)).kind == TypeKind::Record
    }

    pub fn is_access(&self, id: TypeId) -> bool {
        self.get(self.base_of(id)).kind == TypeKind::Access
    }

    /// Element type of an array or designated type of an access type,
    /// found on the nearest ancestor that has one.
    pub fn elem_of(&self, id: TypeId) -> Option<TypeId> {
        let mut cur = id;
        loop {
            let info = self.get(cur);
            if let Some(e) = info.elem {
                return Some(e);
            }
            match info.base {
                Some(b) => cur = b,
                None => return None,
            }
        }
    }

    /// Index subtype of an array's first dimension.
    pub fn index_of(&self, id: TypeId) -> Option<TypeId> {
        let mut cur = id;
        loop {
            let info = self.get(cur);
            if let Some(&i) = info.indexes.first() {
                return Some(i);
            }
            match info.base {
                Some(b) => cur = b,
                None => return None,
            }
        }
    }

    pub fn bounds(&self, id: TypeId) -> (i64, i64) {
        let info = self.get(id);
        (info.lo, info.hi)
    }

    pub fn is_unconstrained_array(&self, id: TypeId) -> bool {
        let info = self.get(id);
        info.kind == TypeKind::Array && info.lo == 0 && info.hi == -1
            || info.kind == TypeKind::Subtype
                && info
                    .base
                    .map(|b| self.is_unconstrained_array(b) && info.lo == 0 && info.hi == -1)
                    .unwrap_or(false)
    }

    fn is_universal(&self, id: TypeId) -> bool {
        matches!(
            self.get(id).kind,
            TypeKind::Unsigned | TypeKind::UniversalFloat
        )
    }

    fn derived_ancestor_related(&self, a: TypeId, b: TypeId) -> bool {
        let mut cur = a;
        loop {
            if cur == b {
                return true;
            }
            let info = self.get(cur);
            if info.kind == TypeKind::Derived || info.kind == TypeKind::Subtype {
                match info.base {
                    Some(p) => {
                        cur = p;
                        continue;
                    }
                    None => return false,
                }
            }
            return false;
        }
    }

    /// Categorize the relation between two types for overload scoring.
    pub fn compare(&self, a: TypeId, b: TypeId) -> CompareKind {
        if a == b {
            return CompareKind::Same;
        }
        if self.derived_ancestor_related(a, b) || self.derived_ancestor_related(b, a) {
            return CompareKind::Derived;
        }
        if self.base_of(a) == self.base_of(b) {
            return CompareKind::BasedOn;
        }
        let ka = self.get(self.base_of(a)).kind;
        let kb = self.get(self.base_of(b)).kind;
        // Universal numerics conform to any type of their class.
        if (self.is_universal(a) || self.is_universal(b))
            && ((self.is_discrete(a) && self.is_discrete(b))
                || (self.is_real(a) && self.is_real(b)))
        {
            return CompareKind::BasedOn;
        }
        if ka == TypeKind::Array && kb == TypeKind::Array {
            return CompareKind::ArrayElement;
        }
        if ka == TypeKind::Access && kb == TypeKind::Access {
            return CompareKind::AccessDesignated;
        }
        CompareKind::None
    }

    /// Overload-resolution score between two types.
    pub fn match_score(&self, a: TypeId, b: TypeId) -> u32 {
        match self.compare(a, b) {
            CompareKind::Same => 1000,
            CompareKind::Derived => 900,
            CompareKind::BasedOn => 800,
            CompareKind::ArrayElement => {
                let ea = self.elem_of(a);
                let eb = self.elem_of(b);
                match (ea, eb) {
                    (Some(x), Some(y)) => 600 + self.match_score(x, y) / 2,
                    _ => 600,
                }
            }
            CompareKind::AccessDesignated => {
                let ea = self.elem_of(a);
                let eb = self.elem_of(b);
                match (ea, eb) {
                    (Some(x), Some(y)) => 500 + self.match_score(x, y) / 2,
                    _ => 500,
                }
            }
            CompareKind::None => 0,
        }
    }

    /// COVER-compatibility: whether a value of `b` may appear where `a` is
    /// expected without an explicit conversion.
    pub fn covers(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        match self.compare(a, b) {
            CompareKind::Same | CompareKind::Derived | CompareKind::BasedOn => true,
            CompareKind::ArrayElement => match (self.elem_of(a), self.elem_of(b)) {
                (Some(x), Some(y)) => self.covers(x, y),
                _ => false,
            },
            CompareKind::AccessDesignated => match (self.elem_of(a), self.elem_of(b)) {
                (Some(x), Some(y)) => self.covers(x, y) || self.get(y).kind == TypeKind::Private,
                _ => {
                    // `null` carries an access type with no designated type.
                    self.elem_of(a).is_none() || self.elem_of(b).is_none()
                }
            },
            CompareKind::None => {
                // Discrete-to-discrete and float-to-float conform through
                // the universal types.
                (self.is_discrete(a) && self.is_discrete(b) && self.is_universal(b))
                    || (self.is_real(a) && self.is_real(b) && self.is_universal(b))
            }
        }
    }

    fn scalar_size_bits(&self, kind: TypeKind) -> u32 {
        match kind {
            TypeKind::Boolean | TypeKind::Character => 8,
            TypeKind::Enum => 32,
            _ => 64,
        }
    }

    /// Number of elements of a constrained array type.
    pub fn array_length(&self, id: TypeId) -> Option<i64> {
        let info = self.get(id);
        if info.kind == TypeKind::Array || info.kind == TypeKind::Subtype {
            if self.is_unconstrained_array(id) {
                return None;
            }
            return Some((info.hi - info.lo + 1).max(0));
        }
        None
    }

    /// Freeze a type: finalize component offsets, size and alignment.
    /// Layout attributes are immutable afterwards.
    pub fn freeze(&mut self, id: TypeId, syms: &mut SymbolTable) {
        if self.get(id).frozen {
            return;
        }
        // Freeze dependencies first.
        let (base, elem, components) = {
            let info = self.get(id);
            (info.base, info.elem, info.components.clone())
        };
        if let Some(b) = base {
            self.freeze(b, syms);
        }
        if let Some(e) = elem {
            self.freeze(e, syms);
        }
        for &c in &components {
            if let Some(ct) = syms.get(c).ty {
                self.freeze(ct, syms);
            }
        }

        let kind = self.get(id).kind;
        match kind {
            TypeKind::Array => {
                let elem_ty = self.elem_of(id);
                let elem_size = elem_ty.map(|e| self.get(e).size_bits).unwrap_or(64);
                let elem_align = elem_ty.map(|e| self.get(e).align_bits.max(8)).unwrap_or(64);
                let info = self.get(id);
                if info.lo == 0 && info.hi == -1 {
                    // Unconstrained: represented as a fat pointer.
                    let info = self.get_mut(id);
                    info.size_bits = 128;
                    info.align_bits = 64;
                } else {
                    let count = (info.hi - info.lo + 1).max(0) as u32;
                    let info = self.get_mut(id);
                    info.size_bits = elem_size.max(8) * count;
                    info.align_bits = elem_align;
                }
            }
            TypeKind::Record => {
                let packed = self.get(id).packed;
                let mut offset_bits: u32 = 0;
                let mut align: u32 = 8;
                let members: Vec<SymId> = {
                    let info = self.get(id);
                    info.discriminants
                        .iter()
                        .chain(info.components.iter())
                        .copied()
                        .collect()
                };
                for c in members {
                    let cty = syms.get(c).ty;
                    let (csize, calign) = match cty {
                        Some(t) => (self.get(t).size_bits.max(8), self.get(t).align_bits.max(8)),
                        None => (64, 64),
                    };
                    let calign = if packed { 8 } else { calign };
                    offset_bits = offset_bits.div_ceil(calign) * calign;
                    syms.get_mut(c).offset = (offset_bits / 8) as i64;
                    offset_bits += csize;
                    align = align.max(calign);
                }
                let size = offset_bits.div_ceil(align) * align;
                let info = self.get_mut(id);
                info.size_bits = size;
                info.align_bits = align;
            }
            TypeKind::Subtype | TypeKind::Derived => {
                let (size, align) = match base {
                    Some(b) => {
                        let bi = self.get(b);
                        (bi.size_bits, bi.align_bits)
                    }
                    None => (64, 64),
                };
                let info = self.get_mut(id);
                if info.size_bits == 0 {
                    info.size_bits = size;
                    info.align_bits = align;
                }
            }
            TypeKind::Access | TypeKind::Task | TypeKind::Signature => {
                let info = self.get_mut(id);
                info.size_bits = 64;
                info.align_bits = 64;
            }
            other => {
                let bits = self.scalar_size_bits(other);
                let info = self.get_mut(id);
                if info.size_bits == 0 {
                    info.size_bits = bits;
                    info.align_bits = bits;
                }
            }
        }
        self.get_mut(id).frozen = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{SymKind, Symbol};

    fn env() -> (TypeTable, NameTable) {
        let mut names = NameTable::new();
        let types = TypeTable::new(&mut names);
        (types, names)
    }

    #[test]
    fn test_predefined_bounds() {
        let (types, _) = env();
        assert_eq!(types.bounds(types.natural).0, 0);
        assert_eq!(types.bounds(types.positive).0, 1);
        assert_eq!(types.bounds(types.boolean), (0, 1));
        assert!(types.is_unconstrained_array(types.string));
    }

    #[test]
    fn test_subtype_shares_base() {
        let (types, _) = env();
        assert_eq!(types.base_of(types.natural), types.integer);
        assert_eq!(types.base_of(types.positive), types.integer);
        // Two subtypes of the same base relate through that base.
        assert_eq!(
            types.compare(types.natural, types.positive),
            CompareKind::BasedOn
        );
    }

    #[test]
    fn test_universal_conforms_to_integer() {
        let (types, _) = env();
        assert!(types.covers(types.integer, types.universal_integer));
        assert!(types.covers(types.float, types.universal_real));
        assert!(!types.covers(types.float, types.universal_integer));
    }

    #[test]
    fn test_match_score_prefers_same_type() {
        let (mut types, _) = env();
        let mut derived = TypeInfo::new(TypeKind::Derived);
        derived.base = Some(types.integer);
        let derived = types.alloc(derived);
        assert_eq!(types.match_score(types.integer, types.integer), 1000);
        assert_eq!(types.match_score(types.integer, derived), 900);
        assert_eq!(types.match_score(types.float, types.universal_real), 800);
        assert_eq!(types.match_score(types.float, types.integer), 0);
    }

    #[test]
    fn test_record_freeze_layout() {
        let (mut types, mut names) = env();
        let mut syms = SymbolTable::new();

        let mut a = Symbol::new(names.intern("a"), SymKind::Component);
        a.ty = Some(types.boolean);
        let a = syms.add_overload(a, &names);
        let mut b = Symbol::new(names.intern("b"), SymKind::Component);
        b.ty = Some(types.integer);
        let b = syms.add_overload(b, &names);

        let mut rec = TypeInfo::new(TypeKind::Record);
        rec.components = vec![a, b];
        let rec = types.alloc(rec);
        types.freeze(rec, &mut syms);

        // Boolean at 0, Integer aligned up to 8 bytes.
        assert_eq!(syms.get(a).offset, 0);
        assert_eq!(syms.get(b).offset, 8);
        assert_eq!(types.get(rec).size_bits, 128);
        assert_eq!(types.get(rec).align_bits, 64);
        assert!(types.get(rec).frozen);
    }

    #[test]
    fn test_packed_record_layout() {
        let (mut types, mut names) = env();
        let mut syms = SymbolTable::new();

        let mut a = Symbol::new(names.intern("a"), SymKind::Component);
        a.ty = Some(types.boolean);
        let a = syms.add_overload(a, &names);
        let mut b = Symbol::new(names.intern("b"), SymKind::Component);
        b.ty = Some(types.integer);
        let b = syms.add_overload(b, &names);

        let mut rec = TypeInfo::new(TypeKind::Record);
        rec.components = vec![a, b];
        rec.packed = true;
        let rec = types.alloc(rec);
        types.freeze(rec, &mut syms);

        assert_eq!(syms.get(b).offset, 1);
        assert_eq!(types.get(rec).size_bits, 72);
    }

    #[test]
    fn test_constrained_array_size() {
        let (mut types, _) = env();
        let mut arr = TypeInfo::new(TypeKind::Array);
        arr.elem = Some(types.integer);
        arr.indexes = vec![types.positive];
        arr.lo = 1;
        arr.hi = 10;
        let arr = types.alloc(arr);
        let mut syms = SymbolTable::new();
        types.freeze(arr, &mut syms);
        assert_eq!(types.get(arr).size_bits, 640);
        assert_eq!(types.array_length(arr), Some(10));
    }
}
