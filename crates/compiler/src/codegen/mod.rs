//! LLVM IR emission
//!
//! Generates target-independent LLVM textual IR from the elaborated AST.
//! Emission is a tree walk: each expression returns an SSA `Value`, basic
//! blocks are named by a monotonically increasing counter, and branches
//! are printed directly; Ada's structured control flow needs no separate
//! CFG builder.
//!
//! Module layout, in order: the fat-pointer type, the runtime shim
//! (exception chain, scratch allocator, image/value helpers, Text_IO
//! wrappers, task trampoline), string and exception-name globals, package
//! globals, subprogram definitions, `@llvm.global_ctors` entries for
//! package elaboration, and `@main` when the main unit defines a
//! library-level procedure body.
//!
//! # Conventions
//!
//! - Scalars are `i64` (`double` for real types); array elements of
//!   CHARACTER and BOOLEAN are stored as `i8`.
//! - Unconstrained arrays travel as a pointer to a fat pointer
//!   `%__fat = type { ptr, ptr }` whose second word points at
//!   `{ i64 lo, i64 hi }` bounds.
//! - `in` scalars pass by value; `out`/`in out` scalars and all composites
//!   pass as pointers.
//! - Nested subprograms receive the enclosing frame as a trailing `ptr`
//!   argument and chase parent links stored in the frame's last slot.

mod decls;
mod error;
mod exprs;
mod runtime;
mod statements;

pub use error::CodeGenError;
pub use runtime::{EXTERN_DECLARATIONS, RUNTIME_SHIM};

use crate::ast::{NodeId, NodeKind, ParamMode};
use crate::intern::{fnv1a_lower, NameId};
use crate::symbols::{SymId, SymKind};
use crate::types::{TypeId, TypeKind};
use crate::Session;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

/// Slots per static-link frame; the last slot holds the parent link.
pub(super) const FRAME_SLOTS: usize = 64;
pub(super) const FRAME_LINK_SLOT: usize = FRAME_SLOTS - 1;

/// Storage class of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValKind {
    I64,
    F64,
    Ptr,
}

impl ValKind {
    pub fn ir(self) -> &'static str {
        match self {
            ValKind::I64 => "i64",
            ValKind::F64 => "double",
            ValKind::Ptr => "ptr",
        }
    }
}

/// An emitted SSA value: its printed form (a register, literal or global)
/// plus its storage class.
#[derive(Debug, Clone)]
pub struct Value {
    pub repr: String,
    pub kind: ValKind,
}

impl Value {
    pub fn new(repr: impl Into<String>, kind: ValKind) -> Self {
        Value {
            repr: repr.into(),
            kind,
        }
    }

    pub fn int(v: i64) -> Self {
        Value::new(v.to_string(), ValKind::I64)
    }
}

pub(super) struct LoopFrame {
    pub exit_label: String,
    pub name: Option<NameId>,
}

pub struct CodeGen<'s> {
    pub s: &'s Session,
    /// Body of the function currently being emitted.
    pub out: String,
    /// Finished function definitions.
    pub funcs: String,
    /// Global variable definitions.
    pub globals: String,
    /// String and bounds constants.
    pub string_globals: String,
    string_count: u32,
    tmp: u32,
    block: u32,
    pub(super) loop_stack: Vec<LoopFrame>,
    /// Alloca or global name per symbol uid.
    pub(super) locals: HashMap<u32, String>,
    /// Exception names referenced, for `@.ex.NAME` globals.
    pub(super) exceptions: BTreeSet<String>,
    /// Enumeration image tables emitted, by type index.
    pub(super) enum_tables: HashMap<u32, String>,
    /// Static-link slot per local symbol uid.
    pub(super) frame_slots: HashMap<u32, usize>,
    /// Frame slot count per subprogram uid (present = has a frame).
    pub(super) fn_frames: HashMap<u32, usize>,
    /// Elaboration constructors, in registration order.
    pub(super) ctors: Vec<String>,
    pub(super) current_fn: Option<SymId>,
    pub(super) current_level: u32,
    pub(super) current_has_frame: bool,
    pub(super) current_has_link: bool,
    pub(super) ret_kind: Option<ValKind>,
    /// Parameters whose local slot holds a pointer to the actual.
    pub(super) byref: HashSet<u32>,
    /// Next free static-link frame slot in the current subprogram.
    pub(super) next_frame_slot: usize,
    /// Nested bodies collected while a function is open; emitted as their
    /// own functions once the enclosing definition is closed.
    pub(super) pending_nested: Vec<NodeId>,
    /// Goto targets seen in the current subprogram.
    pub(super) label_blocks: HashMap<NameId, String>,
    pub(super) emitted: HashSet<u32>,
    /// Last library-level procedure body of the main unit.
    pub(super) main_candidate: Option<SymId>,
}

impl<'s> CodeGen<'s> {
    pub fn new(s: &'s Session) -> Self {
        CodeGen {
            s,
            out: String::new(),
            funcs: String::new(),
            globals: String::new(),
            string_globals: String::new(),
            string_count: 0,
            tmp: 0,
            block: 0,
            loop_stack: Vec::new(),
            locals: HashMap::new(),
            exceptions: BTreeSet::new(),
            enum_tables: HashMap::new(),
            frame_slots: HashMap::new(),
            fn_frames: HashMap::new(),
            ctors: Vec::new(),
            current_fn: None,
            current_level: 0,
            current_has_frame: false,
            current_has_link: false,
            ret_kind: None,
            byref: HashSet::new(),
            next_frame_slot: 0,
            pending_nested: Vec::new(),
            label_blocks: HashMap::new(),
            emitted: HashSet::new(),
            main_candidate: None,
        }
    }

    pub(super) fn fresh_temp(&mut self) -> String {
        self.tmp += 1;
        format!("t{}", self.tmp)
    }

    pub(super) fn fresh_block(&mut self, tag: &str) -> String {
        self.block += 1;
        format!("{}{}", tag, self.block)
    }

    // ----- type mapping -----

    pub(super) fn val_kind(&self, ty: TypeId) -> ValKind {
        match self.s.types.get(self.s.types.base_of(ty)).kind {
            TypeKind::Float | TypeKind::UniversalFloat | TypeKind::Fixed => ValKind::F64,
            TypeKind::Array
            | TypeKind::Record
            | TypeKind::Access
            | TypeKind::FatPointer
            | TypeKind::Private
            | TypeKind::Task
            | TypeKind::Signature => ValKind::Ptr,
            _ => ValKind::I64,
        }
    }

    pub(super) fn is_composite(&self, ty: TypeId) -> bool {
        matches!(
            self.s.types.get(self.s.types.base_of(ty)).kind,
            TypeKind::Array | TypeKind::Record
        )
    }

    pub(super) fn is_fat(&self, ty: TypeId) -> bool {
        self.s.types.is_unconstrained_array(ty)
    }

    /// Storage unit for one array element or scalar memory slot.
    pub(super) fn store_unit(&self, ty: TypeId) -> &'static str {
        match self.s.types.get(self.s.types.base_of(ty)).kind {
            TypeKind::Boolean | TypeKind::Character => "i8",
            TypeKind::Float | TypeKind::UniversalFloat | TypeKind::Fixed => "double",
            TypeKind::Access => "ptr",
            TypeKind::Array | TypeKind::Record => "i8",
            _ => "i64",
        }
    }

    pub(super) fn elem_size_bytes(&self, ty: TypeId) -> i64 {
        let bits = self.s.types.get(self.s.types.base_of(ty)).size_bits.max(8);
        (bits / 8) as i64
    }

    /// Byte size of one object of this type as allocated locally.
    pub(super) fn object_size_bytes(&self, ty: TypeId) -> i64 {
        if self.is_fat(ty) {
            16
        } else {
            let bits = self.s.types.get(ty).size_bits.max(64);
            (bits / 8) as i64
        }
    }

    // ----- value casts -----

    /// Insert the conversion instructions needed to view `v` as `to`.
    pub(super) fn value_cast(
        &mut self,
        v: Value,
        to: ValKind,
    ) -> Result<Value, CodeGenError> {
        if v.kind == to {
            return Ok(v);
        }
        let t = self.fresh_temp();
        match (v.kind, to) {
            (ValKind::I64, ValKind::F64) => {
                writeln!(self.out, "  %{} = sitofp i64 {} to double", t, v.repr)?;
            }
            (ValKind::F64, ValKind::I64) => {
                writeln!(self.out, "  %{} = fptosi double {} to i64", t, v.repr)?;
            }
            (ValKind::I64, ValKind::Ptr) => {
                writeln!(self.out, "  %{} = inttoptr i64 {} to ptr", t, v.repr)?;
            }
            (ValKind::Ptr, ValKind::I64) => {
                writeln!(self.out, "  %{} = ptrtoint ptr {} to i64", t, v.repr)?;
            }
            (ValKind::Ptr, ValKind::F64) => {
                writeln!(self.out, "  %{} = load double, ptr {}", t, v.repr)?;
            }
            (ValKind::F64, ValKind::Ptr) => {
                return Err(CodeGenError::Logic(
                    "cannot reinterpret a real value as an address".to_string(),
                ));
            }
            (ValKind::I64, ValKind::I64) | (ValKind::F64, ValKind::F64) | (ValKind::Ptr, ValKind::Ptr) => {
                unreachable!("handled by the v.kind == to early return above")
            }
        }
        Ok(Value::new(format!("%{}", t), to))
    }

    // ----- globals -----

    pub(super) fn intern_string(&mut self, bytes: &[u8]) -> String {
        self.string_count += 1;
        let name = format!("@.str.{}", self.string_count);
        let mut encoded = String::new();
        for &b in bytes {
            match b {
                b'"' | b'\\' => encoded.push_str(&format!("\\{:02X}", b)),
                0x20..=0x7e => encoded.push(b as char),
                _ => encoded.push_str(&format!("\\{:02X}", b)),
            }
        }
        let _ = writeln!(
            self.string_globals,
            "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
            name,
            bytes.len() + 1,
            encoded
        );
        name
    }

    pub(super) fn intern_bounds(&mut self, lo: i64, hi: i64) -> String {
        self.string_count += 1;
        let name = format!("@.bnd.{}", self.string_count);
        let _ = writeln!(
            self.string_globals,
            "{} = private unnamed_addr constant {{ i64, i64 }} {{ i64 {}, i64 {} }}",
            name, lo, hi
        );
        name
    }

    /// Exception strings are `@.ex.NAME` null-terminated globals.
    pub(super) fn exception_global(&mut self, upper: &str) -> String {
        self.exceptions.insert(upper.to_string());
        format!("@.ex.{}", upper)
    }

    // ----- module assembly -----

    /// Emit the whole module: every compilation unit in the session, the
    /// runtime shim, elaboration constructors and `@main`.
    pub fn emit_module(&mut self) -> Result<String, CodeGenError> {
        let roots: Vec<NodeId> = self.s.root_units.clone();
        for unit in roots {
            self.emit_unit(unit)?;
        }

        let mut ir = String::new();
        writeln!(ir, "; ModuleID = 'ada_main'")?;
        writeln!(ir)?;
        writeln!(ir, "%__fat = type {{ ptr, ptr }}")?;
        writeln!(ir)?;
        runtime::emit_extern_decls(&mut ir)?;
        writeln!(ir)?;
        ir.push_str(RUNTIME_SHIM);
        writeln!(ir)?;

        for name in &self.exceptions {
            writeln!(
                ir,
                "@.ex.{} = linkonce_odr constant [{} x i8] c\"{}\\00\"",
                name,
                name.len() + 1,
                name
            )?;
        }
        writeln!(ir)?;
        ir.push_str(&self.string_globals);
        writeln!(ir)?;
        ir.push_str(&self.globals);
        writeln!(ir)?;
        ir.push_str(&self.funcs);

        // Package elaborations run at priority 65535, in registration
        // order; each constructor appears exactly once.
        if !self.ctors.is_empty() {
            writeln!(
                ir,
                "@llvm.global_ctors = appending global [{} x {{ i32, ptr, ptr }}] [",
                self.ctors.len()
            )?;
            for (i, ctor) in self.ctors.iter().enumerate() {
                let sep = if i + 1 == self.ctors.len() { "" } else { "," };
                writeln!(
                    ir,
                    "  {{ i32, ptr, ptr }} {{ i32 65535, ptr @{}, ptr null }}{}",
                    ctor, sep
                )?;
            }
            writeln!(ir, "]")?;
            writeln!(ir)?;
        }

        if let Some(main_sym) = self.main_candidate {
            let mangled = mangle_symbol(self.s, main_sym);
            writeln!(ir, "define i32 @main() {{")?;
            writeln!(ir, "entry:")?;
            writeln!(ir, "  call void @__ada_ss_init()")?;
            writeln!(ir, "  call void @{}()", mangled)?;
            writeln!(ir, "  ret i32 0")?;
            writeln!(ir, "}}")?;
        }
        Ok(ir)
    }

    fn emit_unit(&mut self, cu: NodeId) -> Result<(), CodeGenError> {
        let unit = match self.s.ast.kind(cu) {
            NodeKind::CompUnit { unit, .. } => *unit,
            _ => return Ok(()),
        };
        self.emit_library_item(unit)
    }

    pub(super) fn emit_library_item(&mut self, unit: NodeId) -> Result<(), CodeGenError> {
        match self.s.ast.kind(unit).clone() {
            NodeKind::SubprogBody { .. } => {
                let sym = self.s.ast.sym(unit);
                self.emit_subprogram(unit)?;
                if let Some(sym) = sym {
                    if self.s.syms.get(sym).kind == SymKind::Procedure {
                        self.main_candidate = Some(sym);
                    }
                }
                Ok(())
            }
            NodeKind::PackageSpec { .. } => self.emit_package_spec(unit),
            NodeKind::PackageBody { .. } => self.emit_package_body(unit),
            NodeKind::SubprogDecl { .. } | NodeKind::GenericDecl { .. } => Ok(()),
            NodeKind::Instantiation { .. } => self.emit_instantiation(unit),
            NodeKind::TaskBody { .. } => self.emit_task_body(unit),
            _ => Ok(()),
        }
    }
}

/// Mangle a subprogram symbol:
/// `PKG_S<scope>E<elab>__NAME.<arity>.<paramtype-hash>.<uid>.<paramname-hash>`.
/// `pragma Import` bypasses mangling entirely.
pub fn mangle_symbol(s: &Session, id: SymId) -> String {
    let sym = s.syms.get(id);
    if let Some(ext) = &sym.ext_name {
        return ext.clone();
    }
    let pkg = sym
        .parent
        .map(|p| {
            let parent = s.syms.get(p);
            s.names.upper(parent.name)
        })
        .unwrap_or_else(|| "MAIN".to_string());
    let name = sanitize(s.names.lower(sym.name));
    let ptype_hash = {
        let mut text = String::new();
        for &p in &sym.params {
            let t = s.types.get(p);
            if let Some(n) = t.name {
                text.push_str(s.names.lower(n));
            }
            text.push(',');
        }
        fnv1a_lower(&text) % 10_000
    };
    let pname_hash = {
        let mut text = String::new();
        for &p in &sym.param_nodes {
            if let NodeKind::Param { names, .. } = s.ast.kind(p) {
                for &n in names {
                    text.push_str(s.names.lower(n));
                    text.push(',');
                }
            }
        }
        fnv1a_lower(&text) % 10_000
    };
    format!(
        "{}_S{}E{}__{}.{}.{}.{}.{}",
        sanitize(&pkg),
        sym.scope,
        sym.elab_order,
        name,
        sym.params.len(),
        ptype_hash,
        sym.uid,
        pname_hash
    )
}

/// Global name for a package-level variable.
pub fn mangle_global(s: &Session, id: SymId) -> String {
    let sym = s.syms.get(id);
    if let Some(ext) = &sym.ext_name {
        return ext.clone();
    }
    let pkg = sym
        .parent
        .map(|p| s.names.upper(s.syms.get(p).name))
        .unwrap_or_else(|| "MAIN".to_string());
    format!(
        "{}_E{}__{}.{}",
        sanitize(&pkg),
        sym.elab_order,
        sanitize(s.names.lower(sym.name)),
        sym.uid
    )
}

/// Operator symbols and other non-identifier characters are rewritten into
/// names LLVM accepts.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '+' => out.push_str("_PLUS_"),
            '-' => out.push_str("_MINUS_"),
            '*' => out.push_str("_STAR_"),
            '/' => out.push_str("_SLASH_"),
            '<' => out.push_str("_LT_"),
            '>' => out.push_str("_GT_"),
            '=' => out.push_str("_EQ_"),
            '&' => out.push_str("_AMP_"),
            c if c.is_alphanumeric() || c == '_' || c == '.' => out.push(c),
            c => out.push_str(&format!("_x{:02X}_", c as u32)),
        }
    }
    out
}

/// Trailing static-link parameter requirement for a call to `callee`.
pub(super) fn needs_static_link(s: &Session, callee: SymId) -> bool {
    let sym = s.syms.get(callee);
    sym.level > 0 && !sym.external
}

/// Whether a parameter passes by reference under the composite-by-pointer
/// convention.
pub(super) fn param_by_ref(s: &Session, mode: ParamMode, ty: TypeId) -> bool {
    if mode != ParamMode::In {
        return true;
    }
    matches!(
        s.types.get(s.types.base_of(ty)).kind,
        TypeKind::Array | TypeKind::Record
    )
}
