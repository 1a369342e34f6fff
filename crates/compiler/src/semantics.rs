//! Semantic analyzer
//!
//! Walks the AST top-down after the context clause has been processed:
//! name resolution, overload selection, type and subtype elaboration,
//! aggregate normalization, attribute evaluation, constraint-check
//! insertion and static folding. Folded operator nodes are rewritten in
//! place to literals so downstream consumers see a literal.
//!
//! Semantic errors accumulate in the session diagnostics (capped at 99);
//! unresolved expressions default to INTEGER so analysis can continue.
//! Only driver-level failures (a missing library unit source) abort with
//! `Err`.

use crate::ast::{
    BinOp, CheckKind, LoopScheme, NodeId, NodeKind, ParamMode, UnOp,
};
use crate::bigint::BigInt;
use crate::diagnostics::Loc;
use crate::driver;
use crate::generics;
use crate::intern::NameId;
use crate::symbols::{SymId, SymKind, Symbol, Visibility};
use crate::types::{SuppressMask, TypeId, TypeInfo, TypeKind};
use crate::Session;
use std::collections::HashMap;

/// Install the predefined Ada 83 environment: the standard types and their
/// symbols, the boolean literals, the predefined exceptions, and the
/// `Ada.Text_IO` subset backed by the emitted runtime shims.
pub fn install_standard(s: &mut Session) {
    let type_handles = [
        s.types.integer,
        s.types.natural,
        s.types.positive,
        s.types.boolean,
        s.types.character,
        s.types.string,
        s.types.float,
        s.types.duration,
        s.types.file_type,
    ];
    for ty in type_handles {
        let name = s.types.get(ty).name.expect("predefined type name");
        let mut sym = Symbol::new(name, SymKind::Type);
        sym.ty = Some(ty);
        s.syms.add_overload(sym, &s.names);
    }

    // Boolean literals.
    for (text, value) in [("False", 0i64), ("True", 1i64)] {
        let name = s.names.intern(text);
        let mut sym = Symbol::new(name, SymKind::EnumLiteral);
        sym.ty = Some(s.types.boolean);
        sym.value = value;
        let id = s.syms.add_overload(sym, &s.names);
        s.types.get_mut(s.types.boolean).literals.push(id);
    }

    // Predefined exceptions, plus the Text_IO-adjacent set.
    for text in [
        "Constraint_Error",
        "Program_Error",
        "Storage_Error",
        "Tasking_Error",
        "Numeric_Error",
        "Use_Error",
        "Name_Error",
        "Status_Error",
        "Mode_Error",
        "End_Error",
        "Data_Error",
        "Device_Error",
        "Layout_Error",
    ] {
        let name = s.names.intern(text);
        s.syms
            .add_overload(Symbol::new(name, SymKind::Exception), &s.names);
    }

    // Ada.Text_IO with the shim-backed subset. The package is visible both
    // as `Text_IO` and selected through `Ada`.
    let ada = s.names.intern("Ada");
    let ada_sym = s.syms.add_overload(Symbol::new(ada, SymKind::Package), &s.names);
    let text_io = s.names.intern("Text_IO");
    let mut pkg = Symbol::new(text_io, SymKind::Package);
    pkg.parent = Some(ada_sym);
    let pkg = s.syms.add_overload(pkg, &s.names);

    let string_ty = s.types.string;
    let char_ty = s.types.character;
    let int_ty = s.types.integer;
    let io_subprograms: [(&str, &str, Vec<TypeId>); 6] = [
        ("Put_Line", "__text_io_put_line", vec![string_ty]),
        ("Put", "__text_io_put", vec![string_ty]),
        ("Put", "__text_io_put_char", vec![char_ty]),
        ("Put", "__text_io_put_int", vec![int_ty]),
        ("New_Line", "__text_io_new_line", vec![]),
        ("Get", "__text_io_get_char", vec![char_ty]),
    ];
    for (ada_name, shim, params) in io_subprograms {
        let name = s.names.intern(ada_name);
        let mut sym = Symbol::new(name, SymKind::Procedure);
        sym.parent = Some(pkg);
        sym.params = params;
        sym.external = true;
        sym.ext_name = Some(shim.to_string());
        sym.ext_lang = Some("Intrinsic".to_string());
        // Package members are not directly visible until a `use`.
        let id = s.syms.add_overload(sym, &s.names);
        s.syms.get_mut(id).visibility = Visibility::empty();
    }
}

pub struct Analyzer<'s> {
    pub s: &'s mut Session,
    /// Enclosing package / subprogram symbol.
    parent: Option<SymId>,
    /// Lexical nesting level of the current subprogram (library level 0).
    level: u32,
    /// Expected type of `return` expressions in the current function.
    ret_type: Option<TypeId>,
}

impl<'s> Analyzer<'s> {
    pub fn new(s: &'s mut Session) -> Self {
        Analyzer {
            s,
            parent: None,
            level: 0,
            ret_type: None,
        }
    }

    fn error(&mut self, loc: Loc, msg: &str) {
        self.s.diags.error(loc, msg);
    }

    // ----- compilation units -----

    pub fn analyze_unit(&mut self, cu: NodeId) -> Result<(), String> {
        let (context, separate_parent, unit) = match self.s.ast.kind(cu) {
            NodeKind::CompUnit {
                context,
                separate_parent,
                unit,
            } => (context.clone(), *separate_parent, *unit),
            _ => return Err("internal: expected compilation unit".to_string()),
        };
        for clause in context {
            match self.s.ast.kind(clause).clone() {
                NodeKind::WithClause { names } => {
                    for name in names {
                        self.with_unit(name)?;
                    }
                }
                NodeKind::UseClause { names } => {
                    for name in names {
                        self.apply_use_name(name);
                    }
                }
                NodeKind::PragmaNode { .. } => self.resolve_decl(clause)?,
                _ => {}
            }
        }
        if let Some(parent) = separate_parent {
            // The parent's specification must be visible before the body.
            self.with_unit(parent)?;
        }
        self.resolve_decl(unit)?;
        Ok(())
    }

    /// Resolve a `with`ed unit name: already-known packages (including the
    /// predefined environment) are fine; otherwise the driver locates and
    /// compiles the unit's specification.
    fn with_unit(&mut self, name_node: NodeId) -> Result<(), String> {
        let name = self.last_segment(name_node);
        if self.s.loading.contains(&name) {
            // Circular `with`; the first traversal wins.
            return Ok(());
        }
        if let Some(sym) = self.s.syms.find(name, &self.s.names) {
            let kind = self.s.syms.get(sym).kind;
            if matches!(
                kind,
                SymKind::Package | SymKind::Procedure | SymKind::Function | SymKind::GenericTemplate
            ) {
                return Ok(());
            }
        }
        driver::load_unit(self.s, name)
    }

    fn last_segment(&self, mut n: NodeId) -> NameId {
        loop {
            match self.s.ast.kind(n) {
                NodeKind::Ident(name) => return *name,
                NodeKind::Selected { field, .. } => return *field,
                NodeKind::Call { callee, .. } => n = *callee,
                _ => return self.s.names_unknown(),
            }
        }
    }

    fn apply_use_name(&mut self, name_node: NodeId) {
        let name = self.last_segment(name_node);
        match self.s.syms.find(name, &self.s.names) {
            Some(sym) if self.s.syms.get(sym).kind == SymKind::Package => {
                self.s.syms.apply_use(sym);
            }
            _ => {
                let loc = self.s.ast.loc(name_node);
                let text = self.s.names.spelling(name).to_string();
                self.error(loc, &format!("undefined package '{}' in use clause", text));
            }
        }
    }

    // ----- declarations -----

    pub fn resolve_decls(&mut self, decls: &[NodeId]) -> Result<(), String> {
        for &d in decls {
            self.resolve_decl(d)?;
        }
        Ok(())
    }

    pub fn resolve_decl(&mut self, n: NodeId) -> Result<(), String> {
        let kind = self.s.ast.kind(n).clone();
        match kind {
            NodeKind::ObjectDecl {
                names,
                subtype,
                init,
                constant,
            } => self.declare_object(n, &names, subtype, init, constant),
            NodeKind::NumberDecl { names, expr } => self.declare_number(n, &names, expr),
            NodeKind::TypeDecl {
                name,
                discriminants,
                def,
            } => self.declare_type(n, name, &discriminants, def),
            NodeKind::SubtypeDecl { name, ind } => {
                let ty = self.resolve_subtype_ind(ind);
                let mut sym = Symbol::new(name, SymKind::Type);
                sym.ty = Some(ty);
                sym.decl = Some(n);
                sym.parent = self.parent;
                sym.level = self.level;
                let id = self.s.syms.add_overload(sym, &self.s.names);
                self.s.ast.set_sym(n, id);
                self.s.ast.set_ty(n, ty);
                Ok(())
            }
            NodeKind::ExceptionDecl { names } => {
                for name in names {
                    let mut sym = Symbol::new(name, SymKind::Exception);
                    sym.decl = Some(n);
                    sym.parent = self.parent;
                    let id = self.s.syms.add_overload(sym, &self.s.names);
                    self.s.ast.set_sym(n, id);
                }
                Ok(())
            }
            NodeKind::Renaming { name, spec, target } => self.declare_renaming(n, name, spec, target),
            NodeKind::SubprogDecl { spec } => {
                let sym = self.declare_subprog_spec(spec, n)?;
                self.s.ast.set_sym(n, sym);
                Ok(())
            }
            NodeKind::SubprogBody { .. } => self.declare_subprog_body(n),
            NodeKind::BodyStub { spec } => {
                // `is separate;` defers the body to a subunit file.
                let name = match self.s.ast.kind(spec) {
                    NodeKind::SubprogSpec { name, .. } => *name,
                    _ => return Ok(()),
                };
                let sym = self.declare_subprog_spec(spec, n)?;
                self.s.ast.set_sym(n, sym);
                driver::load_subunit(self.s, name)
            }
            NodeKind::PackageSpec { .. } => self.declare_package_spec(n),
            NodeKind::PackageBody { .. } => self.declare_package_body(n),
            NodeKind::TaskSpec {
                name,
                is_type,
                entries,
            } => self.declare_task_spec(n, name, is_type, &entries),
            NodeKind::TaskBody { .. } => self.declare_task_body(n),
            NodeKind::EntryDecl {
                name,
                family,
                params,
            } => self.declare_entry(n, name, family, &params),
            NodeKind::GenericDecl { unit, .. } => {
                let name = self.unit_name(unit);
                let mut sym = Symbol::new(name, SymKind::GenericTemplate);
                sym.template = Some(n);
                sym.decl = Some(n);
                sym.parent = self.parent;
                let id = self.s.syms.add_overload(sym, &self.s.names);
                self.s.ast.set_sym(n, id);
                Ok(())
            }
            NodeKind::Instantiation { .. } => self.instantiate(n),
            NodeKind::RepClause { target, value } => {
                self.apply_rep_clause(n, target, value);
                Ok(())
            }
            NodeKind::PragmaNode { name, args } => {
                self.apply_pragma(n, name, &args);
                Ok(())
            }
            NodeKind::UseClause { names } => {
                for name in names {
                    self.apply_use_name(name);
                }
                Ok(())
            }
            NodeKind::CompUnit { .. } => self.analyze_unit(n),
            other => {
                let loc = self.s.ast.loc(n);
                self.error(loc, &format!("unexpected declaration {:?}", kind_name(&other)));
                Ok(())
            }
        }
    }

    fn unit_name(&self, unit: NodeId) -> NameId {
        match self.s.ast.kind(unit) {
            NodeKind::PackageSpec { name, .. } => *name,
            NodeKind::PackageBody { name, .. } => *name,
            NodeKind::SubprogDecl { spec } | NodeKind::SubprogBody { spec, .. } => {
                match self.s.ast.kind(*spec) {
                    NodeKind::SubprogSpec { name, .. } => *name,
                    _ => self.s.names_unknown(),
                }
            }
            _ => self.s.names_unknown(),
        }
    }

    fn declare_object(
        &mut self,
        n: NodeId,
        names: &[NameId],
        subtype: NodeId,
        init: Option<NodeId>,
        constant: bool,
    ) -> Result<(), String> {
        let ty = match self.s.ast.kind(subtype) {
            NodeKind::ArrayDef { .. } => self.resolve_array_def(subtype, None),
            _ => self.resolve_subtype_ind(subtype),
        };
        self.s.types.freeze(ty, &mut self.s.syms);
        if let Some(init) = init {
            self.resolve_expr(init, Some(ty));
            let ity = self.s.ast.ty(init).unwrap_or(ty);
            if !self.s.types.covers(ty, ity) {
                let loc = self.s.ast.loc(init);
                self.error(loc, "type mismatch in initialization");
            }
            let checked = self.chk(init, ty);
            if checked != init {
                self.rewrite_object_init(n, checked);
            }
        }
        let mut ids = Vec::new();
        for &name in names {
            let mut sym = Symbol::new(name, SymKind::Variable);
            sym.ty = Some(ty);
            sym.decl = Some(n);
            sym.constant = constant;
            sym.parent = self.parent;
            sym.level = self.level;
            if constant {
                if let Some(init) = init {
                    if let Some(v) = self.static_i64(init) {
                        sym.value = v;
                    }
                }
            }
            let id = self.s.syms.add_overload(sym, &self.s.names);
            ids.push(id);
        }
        if let Some(&first) = ids.first() {
            self.s.ast.set_sym(n, first);
        }
        self.s.ast.set_ty(n, ty);
        self.s.decl_syms.insert(n, ids);
        Ok(())
    }

    fn rewrite_object_init(&mut self, n: NodeId, checked: NodeId) {
        if let NodeKind::ObjectDecl { init, .. } = self.s.ast.kind_mut(n) {
            *init = Some(checked);
        }
    }

    fn declare_number(&mut self, n: NodeId, names: &[NameId], expr: NodeId) -> Result<(), String> {
        self.resolve_expr(expr, None);
        let ty = self.s.ast.ty(expr).unwrap_or(self.s.types.universal_integer);
        let value = self.static_i64(expr);
        if value.is_none() && !self.s.types.is_real(ty) {
            let loc = self.s.ast.loc(expr);
            self.error(loc, "named number requires a static expression");
        }
        let mut ids = Vec::new();
        for &name in names {
            let mut sym = Symbol::new(name, SymKind::Variable);
            sym.ty = Some(ty);
            sym.decl = Some(n);
            sym.constant = true;
            sym.parent = self.parent;
            sym.level = self.level;
            sym.value = value.unwrap_or(0);
            ids.push(self.s.syms.add_overload(sym, &self.s.names));
        }
        if let Some(&first) = ids.first() {
            self.s.ast.set_sym(n, first);
        }
        self.s.ast.set_ty(n, ty);
        self.s.decl_syms.insert(n, ids);
        Ok(())
    }

    fn declare_type(
        &mut self,
        n: NodeId,
        name: NameId,
        discriminants: &[NodeId],
        def: Option<NodeId>,
    ) -> Result<(), String> {
        // An earlier incomplete or private view of the same name in the
        // same scope is completed in place.
        let existing = self.s.syms.find(name, &self.s.names).and_then(|id| {
            let sym = self.s.syms.get(id);
            if sym.kind == SymKind::Type
                && sym.scope == self.s.syms.scope
                && sym
                    .ty
                    .map(|t| matches!(self.s.types.get(t).kind, TypeKind::Private))
                    .unwrap_or(false)
            {
                Some(id)
            } else {
                None
            }
        });

        let def = match def {
            Some(d) => d,
            None => {
                // Incomplete declaration: a private placeholder.
                let mut info = TypeInfo::new(TypeKind::Private);
                info.name = Some(name);
                let ty = self.s.types.alloc(info);
                let mut sym = Symbol::new(name, SymKind::Type);
                sym.ty = Some(ty);
                sym.decl = Some(n);
                sym.parent = self.parent;
                let id = self.s.syms.add_overload(sym, &self.s.names);
                self.s.ast.set_sym(n, id);
                self.s.ast.set_ty(n, ty);
                return Ok(());
            }
        };

        // Discriminants become symbols attached to the record type.
        let mut discr_syms = Vec::new();
        for &d in discriminants {
            if let NodeKind::Param {
                names,
                subtype,
                default,
                ..
            } = self.s.ast.kind(d).clone()
            {
                let dty = self.resolve_subtype_ind(subtype);
                if let Some(def_expr) = default {
                    self.resolve_expr(def_expr, Some(dty));
                }
                for dn in names {
                    let mut sym = Symbol::new(dn, SymKind::Discriminant);
                    sym.ty = Some(dty);
                    sym.decl = Some(d);
                    let id = self.s.syms.add_overload(sym, &self.s.names);
                    self.s.syms.get_mut(id).visibility = Visibility::empty();
                    discr_syms.push(id);
                }
            }
        }

        let ty = self.elaborate_type_def(def, name, &discr_syms);
        if !discr_syms.is_empty() {
            self.s.types.get_mut(ty).discriminants = discr_syms.clone();
            for d in &discr_syms {
                self.s.syms.get_mut(*d).parent = None;
            }
        }

        if let Some(prior) = existing {
            // Complete the earlier view in place so access types already
            // designating it see the full definition.
            let placeholder = self.s.syms.get(prior).ty.expect("placeholder type");
            let full = self.s.types.get(ty).clone();
            *self.s.types.get_mut(placeholder) = full;
            self.s.ast.set_sym(n, prior);
            self.s.ast.set_ty(n, placeholder);
            return Ok(());
        }

        let mut sym = Symbol::new(name, SymKind::Type);
        sym.ty = Some(ty);
        sym.decl = Some(n);
        sym.parent = self.parent;
        let id = self.s.syms.add_overload(sym, &self.s.names);
        self.s.ast.set_sym(n, id);
        self.s.ast.set_ty(n, ty);
        Ok(())
    }

    fn elaborate_type_def(&mut self, def: NodeId, name: NameId, discrs: &[SymId]) -> TypeId {
        let kind = self.s.ast.kind(def).clone();
        match kind {
            NodeKind::IntRangeDef { range } => {
                let (lo, hi) = self.static_range(range);
                let mut info = TypeInfo::new(TypeKind::Integer);
                info.name = Some(name);
                info.lo = lo.unwrap_or(i64::MIN);
                info.hi = hi.unwrap_or(i64::MAX);
                self.s.types.alloc(info)
            }
            NodeKind::EnumDef { literals } => {
                let mut info = TypeInfo::new(TypeKind::Enum);
                info.name = Some(name);
                info.lo = 0;
                info.hi = literals.len() as i64 - 1;
                let ty = self.s.types.alloc(info);
                let mut lits = Vec::new();
                for (i, &lit) in literals.iter().enumerate() {
                    let lit_name = match self.s.ast.kind(lit) {
                        NodeKind::EnumLit { name: Some(n), .. } => *n,
                        NodeKind::EnumLit { ch: Some(c), .. } => {
                            let text = c.to_string();
                            self.s.names.intern(&text)
                        }
                        _ => continue,
                    };
                    let mut sym = Symbol::new(lit_name, SymKind::EnumLiteral);
                    sym.ty = Some(ty);
                    sym.value = i as i64;
                    sym.decl = Some(lit);
                    sym.parent = self.parent;
                    let id = self.s.syms.add_overload(sym, &self.s.names);
                    self.s.ast.set_sym(lit, id);
                    lits.push(id);
                }
                self.s.types.get_mut(ty).literals = lits;
                ty
            }
            NodeKind::FloatDef { digits, range } => {
                let mut info = TypeInfo::new(TypeKind::Float);
                info.name = Some(name);
                info.base = Some(self.s.types.float);
                if let Some(d) = digits {
                    self.resolve_expr(d, None);
                    info.digits = self.static_i64(d).unwrap_or(15) as u32;
                }
                let ty = self.s.types.alloc(info);
                if let Some(r) = range {
                    self.resolve_expr(r, Some(self.s.types.float));
                }
                ty
            }
            NodeKind::FixedDef { delta, range } => {
                self.resolve_expr(delta, None);
                let mut info = TypeInfo::new(TypeKind::Fixed);
                info.name = Some(name);
                let d = self.static_real(delta).unwrap_or(1.0);
                info.delta = d;
                info.small = d;
                if let Some(r) = range {
                    let (lo, hi) = self.static_range(r);
                    info.lo = lo.unwrap_or(i64::MIN);
                    info.hi = hi.unwrap_or(i64::MAX);
                }
                self.s.types.alloc(info)
            }
            NodeKind::ArrayDef { .. } => self.resolve_array_def(def, Some(name)),
            NodeKind::RecordDef {
                components,
                variant,
            } => {
                let mut comp_syms = Vec::new();
                for &c in &components {
                    self.declare_components(c, &mut comp_syms);
                }
                // Variant components are flattened after the fixed part;
                // `others` coverage treats them like any other component.
                if let Some(v) = variant {
                    if let NodeKind::VariantPart { variants, .. } = self.s.ast.kind(v).clone() {
                        for var in variants {
                            if let NodeKind::Variant { components, .. } =
                                self.s.ast.kind(var).clone()
                            {
                                for c in components {
                                    self.declare_components(c, &mut comp_syms);
                                }
                            }
                        }
                    }
                }
                let mut info = TypeInfo::new(TypeKind::Record);
                info.name = Some(name);
                info.components = comp_syms;
                info.discriminants = discrs.to_vec();
                self.s.types.alloc(info)
            }
            NodeKind::AccessDef { designated } => {
                let designated_ty = self.resolve_subtype_ind(designated);
                let mut info = TypeInfo::new(TypeKind::Access);
                info.name = Some(name);
                info.elem = Some(designated_ty);
                info.size_bits = 64;
                info.align_bits = 64;
                self.s.types.alloc(info)
            }
            NodeKind::DerivedDef { parent } => {
                let parent_ty = self.resolve_subtype_ind(parent);
                let parent_info = self.s.types.get(parent_ty).clone();
                let mut info = TypeInfo::new(TypeKind::Derived);
                info.name = Some(name);
                info.base = Some(parent_ty);
                info.lo = parent_info.lo;
                info.hi = parent_info.hi;
                info.elem = parent_info.elem;
                info.indexes = parent_info.indexes.clone();
                info.components = parent_info.components.clone();
                info.discriminants = parent_info.discriminants.clone();
                info.size_bits = parent_info.size_bits;
                info.align_bits = parent_info.align_bits;
                let ty = self.s.types.alloc(info);
                // Enumeration literals are inherited by fresh symbols whose
                // values equal the parent's; overload selection then picks
                // the derived literal from the expected type.
                let parent_lits = self.s.types.get(self.s.types.base_of(parent_ty)).literals.clone();
                let mut lits = Vec::new();
                for lit in parent_lits {
                    let (lname, lvalue) = {
                        let l = self.s.syms.get(lit);
                        (l.name, l.value)
                    };
                    let mut sym = Symbol::new(lname, SymKind::EnumLiteral);
                    sym.ty = Some(ty);
                    sym.value = lvalue;
                    sym.parent = self.parent;
                    lits.push(self.s.syms.add_overload(sym, &self.s.names));
                }
                if !lits.is_empty() {
                    self.s.types.get_mut(ty).literals = lits;
                }
                ty
            }
            NodeKind::PrivateDef { .. } => {
                let mut info = TypeInfo::new(TypeKind::Private);
                info.name = Some(name);
                self.s.types.alloc(info)
            }
            _ => {
                let loc = self.s.ast.loc(def);
                self.error(loc, "unsupported type definition");
                self.s.types.integer
            }
        }
    }

    fn declare_components(&mut self, comp: NodeId, out: &mut Vec<SymId>) {
        if let NodeKind::ObjectDecl {
            names,
            subtype,
            init,
            ..
        } = self.s.ast.kind(comp).clone()
        {
            let ty = match self.s.ast.kind(subtype) {
                NodeKind::ArrayDef { .. } => self.resolve_array_def(subtype, None),
                _ => self.resolve_subtype_ind(subtype),
            };
            self.s.types.freeze(ty, &mut self.s.syms);
            if let Some(init) = init {
                self.resolve_expr(init, Some(ty));
            }
            let mut ids = Vec::new();
            for name in names {
                let mut sym = Symbol::new(name, SymKind::Component);
                sym.ty = Some(ty);
                sym.decl = Some(comp);
                let id = self.s.syms.add_overload(sym, &self.s.names);
                // Components are found through their record, not by open
                // scope lookup.
                self.s.syms.get_mut(id).visibility = Visibility::empty();
                out.push(id);
                ids.push(id);
            }
            self.s.ast.set_ty(comp, ty);
            if let Some(&first) = ids.first() {
                self.s.ast.set_sym(comp, first);
            }
            self.s.decl_syms.insert(comp, ids);
        }
    }

    /// Anonymous or named array type from an `array (...) of ...`
    /// definition. Multi-dimensional arrays nest: the element of the outer
    /// dimension is an anonymous array of the remaining dimensions.
    fn resolve_array_def(&mut self, def: NodeId, name: Option<NameId>) -> TypeId {
        let (indexes, elem, unconstrained) = match self.s.ast.kind(def).clone() {
            NodeKind::ArrayDef {
                indexes,
                elem,
                unconstrained,
            } => (indexes, elem, unconstrained),
            _ => return self.s.types.integer,
        };
        let elem_ty = self.resolve_subtype_ind(elem);
        self.build_array_type(&indexes, elem_ty, unconstrained, name)
    }

    fn build_array_type(
        &mut self,
        indexes: &[NodeId],
        elem_ty: TypeId,
        unconstrained: bool,
        name: Option<NameId>,
    ) -> TypeId {
        let (first, rest) = match indexes.split_first() {
            Some(x) => x,
            None => return elem_ty,
        };
        let inner = if rest.is_empty() {
            elem_ty
        } else {
            self.build_array_type(rest, elem_ty, unconstrained, None)
        };
        let index_ty = self.resolve_index(*first);
        let mut info = TypeInfo::new(TypeKind::Array);
        info.name = name;
        info.elem = Some(inner);
        info.indexes = vec![index_ty];
        if unconstrained {
            info.lo = 0;
            info.hi = -1;
        } else {
            let (lo, hi) = self.index_bounds(*first, index_ty);
            info.lo = lo;
            info.hi = hi;
        }
        self.s.types.alloc(info)
    }

    fn resolve_index(&mut self, index: NodeId) -> TypeId {
        match self.s.ast.kind(index).clone() {
            NodeKind::RangeExpr { lo, .. } => {
                self.resolve_expr(index, None);
                let lo_ty = self.s.ast.ty(lo).unwrap_or(self.s.types.integer);
                self.concrete_scalar(lo_ty)
            }
            NodeKind::SubtypeInd { .. } => self.resolve_subtype_ind(index),
            _ => {
                // A bare mark.
                self.resolve_type_mark(index)
            }
        }
    }

    fn index_bounds(&mut self, index: NodeId, index_ty: TypeId) -> (i64, i64) {
        match self.s.ast.kind(index).clone() {
            NodeKind::RangeExpr { lo, hi } => {
                let l = self.static_i64(lo);
                let h = self.static_i64(hi);
                (l.unwrap_or(1), h.unwrap_or(0))
            }
            _ => self.s.types.bounds(index_ty),
        }
    }

    /// Resolve a subtype indication to a type: the bare mark resolves to
    /// the named type directly; a constraint clones the base and narrows.
    pub fn resolve_subtype_ind(&mut self, ind: NodeId) -> TypeId {
        let (mark, constraint) = match self.s.ast.kind(ind).clone() {
            NodeKind::SubtypeInd { mark, constraint } => (mark, constraint),
            NodeKind::ArrayDef { .. } => return self.resolve_array_def(ind, None),
            _ => (ind, None),
        };
        let base = self.resolve_type_mark(mark);
        let ty = match constraint {
            None => base,
            Some(c) => self.apply_constraint(base, c),
        };
        self.s.ast.set_ty(ind, ty);
        ty
    }

    fn apply_constraint(&mut self, base: TypeId, constraint: NodeId) -> TypeId {
        let kind = self.s.ast.kind(constraint).clone();
        match kind {
            NodeKind::RangeConstraint { range } => {
                self.resolve_expr(range, Some(base));
                let (lo, hi) = self.static_range(range);
                let base_info = self.s.types.get(base).clone();
                let mut info = TypeInfo::new(TypeKind::Subtype);
                info.base = Some(base);
                info.elem = base_info.elem;
                info.indexes = base_info.indexes.clone();
                info.lo = lo.unwrap_or(base_info.lo);
                info.hi = hi.unwrap_or(base_info.hi);
                info.size_bits = base_info.size_bits;
                info.align_bits = base_info.align_bits;
                info.components = base_info.components.clone();
                info.discriminants = base_info.discriminants.clone();
                info.literals = base_info.literals.clone();
                self.s.types.alloc(info)
            }
            NodeKind::IndexConstraint { ranges } => {
                if self.s.types.is_array(base) {
                    // Constrain the first dimension from the first range.
                    let mut lo = 1;
                    let mut hi = 0;
                    if let Some(&first) = ranges.first() {
                        if let NodeKind::Assoc { value, .. } = self.s.ast.kind(first).clone() {
                            self.resolve_expr(value, None);
                            let (l, h) = self.static_range(value);
                            lo = l.unwrap_or(1);
                            hi = h.unwrap_or(0);
                        }
                    }
                    let base_info = self.s.types.get(base).clone();
                    let mut info = TypeInfo::new(TypeKind::Subtype);
                    info.base = Some(base);
                    info.elem = base_info.elem;
                    info.indexes = base_info.indexes.clone();
                    info.lo = lo;
                    info.hi = hi;
                    self.s.types.alloc(info)
                } else if self.s.types.is_record(base) {
                    // Discriminant constraint: bind each discriminant value.
                    let discrs = self.s.types.get(self.s.types.base_of(base)).discriminants.clone();
                    for (i, &r) in ranges.iter().enumerate() {
                        if let NodeKind::Assoc { value, .. } = self.s.ast.kind(r).clone() {
                            let expected = discrs
                                .get(i)
                                .and_then(|&d| self.s.syms.get(d).ty);
                            self.resolve_expr(value, expected);
                        }
                    }
                    let base_info = self.s.types.get(base).clone();
                    let mut info = TypeInfo::new(TypeKind::Subtype);
                    info.base = Some(base);
                    info.components = base_info.components.clone();
                    info.discriminants = base_info.discriminants.clone();
                    info.size_bits = base_info.size_bits;
                    info.align_bits = base_info.align_bits;
                    self.s.types.alloc(info)
                } else {
                    let loc = self.s.ast.loc(constraint);
                    self.error(loc, "constraint not applicable to this type");
                    base
                }
            }
            NodeKind::DigitsConstraint { digits, .. } => {
                self.resolve_expr(digits, None);
                let base_info = self.s.types.get(base).clone();
                let mut info = TypeInfo::new(TypeKind::Subtype);
                info.base = Some(base);
                info.digits = self.static_i64(digits).unwrap_or(base_info.digits as i64) as u32;
                info.size_bits = base_info.size_bits;
                info.align_bits = base_info.align_bits;
                self.s.types.alloc(info)
            }
            NodeKind::DeltaConstraint { delta, .. } => {
                self.resolve_expr(delta, None);
                let base_info = self.s.types.get(base).clone();
                let mut info = TypeInfo::new(TypeKind::Subtype);
                info.base = Some(base);
                info.delta = self.static_real(delta).unwrap_or(base_info.delta);
                info.small = info.delta;
                info.size_bits = base_info.size_bits;
                info.align_bits = base_info.align_bits;
                self.s.types.alloc(info)
            }
            _ => base,
        }
    }

    /// A type mark: an identifier, a selected name, or `T'Base`.
    pub fn resolve_type_mark(&mut self, n: NodeId) -> TypeId {
        let kind = self.s.ast.kind(n).clone();
        match kind {
            NodeKind::Ident(name) => match self.s.syms.find(name, &self.s.names) {
                Some(sym) if self.s.syms.get(sym).kind == SymKind::Type => {
                    let ty = self.s.syms.get(sym).ty.unwrap_or(self.s.types.integer);
                    self.s.ast.set_sym(n, sym);
                    self.s.ast.set_ty(n, ty);
                    ty
                }
                Some(sym) if self.s.syms.get(sym).kind == SymKind::Task => {
                    let ty = self.s.syms.get(sym).ty.unwrap_or(self.s.types.integer);
                    self.s.ast.set_sym(n, sym);
                    ty
                }
                _ => {
                    let loc = self.s.ast.loc(n);
                    let text = self.s.names.spelling(name).to_string();
                    self.error(loc, &format!("undefined type '{}'", text));
                    self.s.types.integer
                }
            },
            NodeKind::Selected { prefix, field } => {
                if let Some(pkg) = self.package_of(prefix) {
                    if let Some(sym) = self.s.syms.find_in(pkg, field, &self.s.names) {
                        if self.s.syms.get(sym).kind == SymKind::Type {
                            let ty = self.s.syms.get(sym).ty.unwrap_or(self.s.types.integer);
                            self.s.ast.set_sym(n, sym);
                            self.s.ast.set_ty(n, ty);
                            return ty;
                        }
                    }
                }
                let loc = self.s.ast.loc(n);
                self.error(loc, "undefined type name");
                self.s.types.integer
            }
            NodeKind::Attr { prefix, attr, .. } => {
                let base = self.resolve_type_mark(prefix);
                if self.s.names.lower(attr) == "base" {
                    self.s.types.base_of(base)
                } else {
                    base
                }
            }
            NodeKind::Qualified { mark, .. } => self.resolve_type_mark(mark),
            _ => {
                let loc = self.s.ast.loc(n);
                self.error(loc, "expected type mark");
                self.s.types.integer
            }
        }
    }

    fn package_of(&mut self, n: NodeId) -> Option<SymId> {
        match self.s.ast.kind(n).clone() {
            NodeKind::Ident(name) => {
                let sym = self.s.syms.find(name, &self.s.names)?;
                if matches!(self.s.syms.get(sym).kind, SymKind::Package | SymKind::Task) {
                    self.s.ast.set_sym(n, sym);
                    Some(sym)
                } else {
                    None
                }
            }
            NodeKind::Selected { prefix, field } => {
                let outer = self.package_of(prefix)?;
                let sym = self.s.syms.find_in(outer, field, &self.s.names)?;
                if matches!(self.s.syms.get(sym).kind, SymKind::Package | SymKind::Task) {
                    self.s.ast.set_sym(n, sym);
                    Some(sym)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    // ----- subprograms -----

    fn declare_subprog_spec(&mut self, spec: NodeId, decl: NodeId) -> Result<SymId, String> {
        let (name, params, ret, is_function) = match self.s.ast.kind(spec).clone() {
            NodeKind::SubprogSpec {
                name,
                params,
                ret,
                is_function,
            } => (name, params, ret, is_function),
            _ => return Err("internal: expected subprogram spec".to_string()),
        };
        let mut param_tys = Vec::new();
        for &p in &params {
            if let NodeKind::Param { names, subtype, .. } = self.s.ast.kind(p).clone() {
                let ty = match self.s.ast.kind(subtype) {
                    NodeKind::ArrayDef { .. } => self.resolve_array_def(subtype, None),
                    _ => self.resolve_subtype_ind(subtype),
                };
                for _ in names {
                    param_tys.push(ty);
                }
                self.s.ast.set_ty(p, ty);
            }
        }
        let ret_ty = ret.map(|r| self.resolve_subtype_ind(r));

        // A body completing an earlier declaration adopts its symbol so
        // calls resolved against the spec bind to the same entity.
        for cand in self.s.syms.homographs(name, &self.s.names) {
            let sym = self.s.syms.get(cand);
            if sym.is_subprogram()
                && sym.scope == self.s.syms.scope
                && sym.params.len() == param_tys.len()
                && sym
                    .decl
                    .map(|d| matches!(self.s.ast.kind(d), NodeKind::SubprogDecl { .. } | NodeKind::BodyStub { .. }))
                    .unwrap_or(false)
            {
                let same_sig = sym
                    .params
                    .iter()
                    .zip(param_tys.iter())
                    .all(|(a, b)| self.s.types.covers(*a, *b));
                if same_sig {
                    self.s.syms.get_mut(cand).decl = Some(decl);
                    self.s.ast.set_sym(spec, cand);
                    return Ok(cand);
                }
            }
        }

        let kind = if is_function {
            SymKind::Function
        } else {
            SymKind::Procedure
        };
        let mut sym = Symbol::new(name, kind);
        sym.params = param_tys;
        sym.param_nodes = params;
        sym.ret = ret_ty;
        sym.decl = Some(decl);
        sym.parent = self.parent;
        sym.level = self.level;
        let id = self.s.syms.add_overload(sym, &self.s.names);
        self.s.ast.set_sym(spec, id);
        Ok(id)
    }

    fn declare_subprog_body(&mut self, n: NodeId) -> Result<(), String> {
        let (spec, decls, stmts, handlers) = match self.s.ast.kind(n).clone() {
            NodeKind::SubprogBody {
                spec,
                decls,
                stmts,
                handlers,
            } => (spec, decls, stmts, handlers),
            _ => return Ok(()),
        };

        // A body whose name matches a generic template is the template's
        // body, captured for instantiation instead of compiled directly.
        let name = self.spec_name_of(spec);
        if let Some(tpl) = self.s.syms.find(name, &self.s.names) {
            if self.s.syms.get(tpl).kind == SymKind::GenericTemplate
                && !self.s.template_bodies.contains_key(&tpl)
            {
                self.s.template_bodies.insert(tpl, n);
                return Ok(());
            }
        }

        let sym = self.declare_subprog_spec(spec, n)?;
        self.s.ast.set_sym(n, sym);

        let saved_parent = self.parent;
        let saved_ret = self.ret_type;
        self.parent = Some(sym);
        self.level += 1;
        self.ret_type = self.s.syms.get(sym).ret;

        self.s.syms.enter_scope();
        self.declare_params(sym);
        self.resolve_decls(&decls)?;
        self.resolve_stmts(&stmts)?;
        self.resolve_handlers(&handlers)?;
        self.s.syms.exit_scope();

        self.level -= 1;
        self.parent = saved_parent;
        self.ret_type = saved_ret;
        Ok(())
    }

    fn spec_name_of(&self, spec: NodeId) -> NameId {
        match self.s.ast.kind(spec) {
            NodeKind::SubprogSpec { name, .. } => *name,
            _ => self.s.names_unknown(),
        }
    }

    fn declare_params(&mut self, subprog: SymId) {
        let param_nodes = self.s.syms.get(subprog).param_nodes.clone();
        for p in param_nodes {
            if let NodeKind::Param { names, mode, .. } = self.s.ast.kind(p).clone() {
                let ty = self.s.ast.ty(p).unwrap_or(self.s.types.integer);
                let mut ids = Vec::new();
                for name in names {
                    let mut sym = Symbol::new(name, SymKind::Variable);
                    sym.ty = Some(ty);
                    sym.decl = Some(p);
                    sym.mode = Some(mode);
                    sym.parent = Some(subprog);
                    sym.level = self.level;
                    sym.constant = mode == ParamMode::In;
                    ids.push(self.s.syms.add_overload(sym, &self.s.names));
                }
                self.s.decl_syms.insert(p, ids);
            }
        }
    }

    // ----- packages and tasks -----

    fn declare_package_spec(&mut self, n: NodeId) -> Result<(), String> {
        let (name, visible, private) = match self.s.ast.kind(n).clone() {
            NodeKind::PackageSpec {
                name,
                visible,
                private,
            } => (name, visible, private),
            _ => return Ok(()),
        };
        let mut sym = Symbol::new(name, SymKind::Package);
        sym.decl = Some(n);
        sym.parent = self.parent;
        let id = self.s.syms.add_overload(sym, &self.s.names);
        self.s.ast.set_sym(n, id);

        let saved = self.parent;
        self.parent = Some(id);
        self.s.syms.enter_scope();
        self.resolve_decls(&visible)?;
        self.resolve_decls(&private)?;
        self.s.syms.exit_scope();
        self.parent = saved;
        Ok(())
    }

    fn declare_package_body(&mut self, n: NodeId) -> Result<(), String> {
        let (name, decls, stmts, handlers) = match self.s.ast.kind(n).clone() {
            NodeKind::PackageBody {
                name,
                decls,
                stmts,
                handlers,
            } => (name, decls, stmts, handlers),
            _ => return Ok(()),
        };

        // Body of a generic package template: capture, don't compile.
        if let Some(tpl) = self.s.syms.find(name, &self.s.names) {
            if self.s.syms.get(tpl).kind == SymKind::GenericTemplate
                && !self.s.template_bodies.contains_key(&tpl)
            {
                self.s.template_bodies.insert(tpl, n);
                return Ok(());
            }
        }

        let pkg = match self.s.syms.find(name, &self.s.names) {
            Some(sym) if self.s.syms.get(sym).kind == SymKind::Package => sym,
            _ => {
                let loc = self.s.ast.loc(n);
                let text = self.s.names.spelling(name).to_string();
                self.error(loc, &format!("package body '{}' has no specification", text));
                let sym = Symbol::new(name, SymKind::Package);
                self.s.syms.add_overload(sym, &self.s.names)
            }
        };
        self.s.ast.set_sym(n, pkg);

        let saved = self.parent;
        self.parent = Some(pkg);
        self.s.syms.enter_scope();
        self.s.syms.reopen_package(pkg);
        self.resolve_decls(&decls)?;
        self.resolve_stmts(&stmts)?;
        self.resolve_handlers(&handlers)?;
        self.s.syms.exit_scope();
        self.parent = saved;
        Ok(())
    }

    fn declare_task_spec(
        &mut self,
        n: NodeId,
        name: NameId,
        is_type: bool,
        entries: &[NodeId],
    ) -> Result<(), String> {
        let mut info = TypeInfo::new(TypeKind::Task);
        info.name = Some(name);
        info.size_bits = 64;
        info.align_bits = 64;
        let ty = self.s.types.alloc(info);
        let mut sym = Symbol::new(name, if is_type { SymKind::Type } else { SymKind::Task });
        sym.ty = Some(ty);
        sym.decl = Some(n);
        sym.parent = self.parent;
        let id = self.s.syms.add_overload(sym, &self.s.names);
        self.s.ast.set_sym(n, id);
        self.s.ast.set_ty(n, ty);

        let saved = self.parent;
        self.parent = Some(id);
        for &e in entries {
            self.resolve_decl(e)?;
        }
        self.parent = saved;
        Ok(())
    }

    fn declare_task_body(&mut self, n: NodeId) -> Result<(), String> {
        let (name, decls, stmts, handlers) = match self.s.ast.kind(n).clone() {
            NodeKind::TaskBody {
                name,
                decls,
                stmts,
                handlers,
            } => (name, decls, stmts, handlers),
            _ => return Ok(()),
        };
        let task = self.s.syms.find(name, &self.s.names);
        if let Some(t) = task {
            self.s.ast.set_sym(n, t);
        } else {
            let loc = self.s.ast.loc(n);
            self.error(loc, "task body has no specification");
        }
        let saved = self.parent;
        self.parent = task.or(self.parent);
        self.level += 1;
        self.s.syms.enter_scope();
        self.resolve_decls(&decls)?;
        self.resolve_stmts(&stmts)?;
        self.resolve_handlers(&handlers)?;
        self.s.syms.exit_scope();
        self.level -= 1;
        self.parent = saved;
        Ok(())
    }

    fn declare_entry(
        &mut self,
        n: NodeId,
        name: NameId,
        family: Option<NodeId>,
        params: &[NodeId],
    ) -> Result<(), String> {
        if let Some(f) = family {
            self.resolve_expr(f, None);
        }
        let mut param_tys = Vec::new();
        for &p in params {
            if let NodeKind::Param { names, subtype, .. } = self.s.ast.kind(p).clone() {
                let ty = self.resolve_subtype_ind(subtype);
                for _ in names {
                    param_tys.push(ty);
                }
                self.s.ast.set_ty(p, ty);
            }
        }
        let mut sym = Symbol::new(name, SymKind::Entry);
        sym.params = param_tys;
        sym.param_nodes = params.to_vec();
        sym.decl = Some(n);
        sym.parent = self.parent;
        let id = self.s.syms.add_overload(sym, &self.s.names);
        self.s.ast.set_sym(n, id);
        Ok(())
    }

    // ----- renamings -----

    fn declare_renaming(
        &mut self,
        n: NodeId,
        name: NameId,
        spec: Option<NodeId>,
        target: NodeId,
    ) -> Result<(), String> {
        // Resolve the renamed entity and declare an alias symbol sharing
        // its identity (uid and mangled name), so references through either
        // name reach the same object or code.
        self.resolve_expr(target, None);
        let target_sym = self.s.ast.sym(target);
        match target_sym {
            Some(t) => {
                let mut alias = self.s.syms.get(t).clone();
                alias.name = name;
                alias.decl = Some(n);
                if spec.is_none()
                    && !matches!(alias.kind, SymKind::Exception | SymKind::Package)
                {
                    let loc = self.s.ast.loc(n);
                    self.error(loc, "renames target is not an exception");
                }
                let id = self.s.syms.add_overload_alias(alias, &self.s.names);
                self.s.ast.set_sym(n, id);
            }
            None => {
                let loc = self.s.ast.loc(n);
                self.error(loc, "renames target is undefined");
            }
        }
        Ok(())
    }

    // ----- generics -----

    fn instantiate(&mut self, n: NodeId) -> Result<(), String> {
        let (name, template, actuals) = match self.s.ast.kind(n).clone() {
            NodeKind::Instantiation {
                name,
                template,
                actuals,
                ..
            } => (name, template, actuals),
            _ => return Ok(()),
        };
        let tpl_name = self.last_segment(template);
        let tpl_sym = match self.s.syms.find(tpl_name, &self.s.names) {
            Some(sym) if self.s.syms.get(sym).kind == SymKind::GenericTemplate => sym,
            _ => {
                let loc = self.s.ast.loc(n);
                let text = self.s.names.spelling(tpl_name).to_string();
                self.error(loc, &format!("undefined generic '{}'", text));
                return Ok(());
            }
        };
        let tpl_decl = self.s.syms.get(tpl_sym).template.expect("template node");
        let (formals, unit) = match self.s.ast.kind(tpl_decl).clone() {
            NodeKind::GenericDecl { formals, unit } => (formals, unit),
            _ => return Ok(()),
        };

        // Formal names in declaration order.
        let mut formal_names: Vec<NameId> = Vec::new();
        let mut subprog_defaults: HashMap<NameId, NodeId> = HashMap::new();
        for &f in &formals {
            match self.s.ast.kind(f).clone() {
                NodeKind::GenericFormalType { name, .. } => formal_names.push(name),
                NodeKind::GenericFormalObject { names, default, .. } => {
                    for fname in names {
                        formal_names.push(fname);
                        if let Some(d) = default {
                            subprog_defaults.insert(fname, d);
                        }
                    }
                }
                NodeKind::GenericFormalSubprog { spec, default } => {
                    let fname = self.spec_name_of(spec);
                    formal_names.push(fname);
                    if let Some(d) = default {
                        subprog_defaults.insert(fname, d);
                    }
                }
                _ => {}
            }
        }

        // Positional actuals first, then named associations.
        let mut map: HashMap<NameId, NodeId> = HashMap::new();
        let mut position = 0usize;
        for &a in &actuals {
            if let NodeKind::Assoc { choices, value } = self.s.ast.kind(a).clone() {
                if choices.is_empty() {
                    if let Some(&fname) = formal_names.get(position) {
                        map.insert(fname, value);
                    }
                    position += 1;
                } else if let NodeKind::Ident(fname) = self.s.ast.kind(choices[0]) {
                    map.insert(*fname, value);
                }
            }
        }
        for (&fname, &default) in &subprog_defaults {
            map.entry(fname).or_insert(default);
        }

        // Clone the captured unit (and body, when one was captured) with
        // formals substituted, then resolve the clone as ordinary code.
        let body = self.s.template_bodies.get(&tpl_sym).copied();
        let source = body.unwrap_or(unit);
        let clone = generics::clone_substitute(&mut self.s.ast, source, &map, 0)
            .map_err(|e| {
                let loc = self.s.ast.loc(n);
                self.s.diags.format(loc, &e)
            })?;
        self.rename_unit(clone, name);
        self.resolve_decl(clone)?;
        if let Some(sym) = self.s.ast.sym(clone) {
            self.s.ast.set_sym(n, sym);
            self.s.syms.get_mut(sym).template = Some(tpl_decl);
        }
        self.s.instance_bodies.insert(n, clone);
        Ok(())
    }

    fn rename_unit(&mut self, unit: NodeId, new_name: NameId) {
        let kind = self.s.ast.kind(unit).clone();
        match kind {
            NodeKind::SubprogBody { spec, .. } | NodeKind::SubprogDecl { spec } => {
                if let NodeKind::SubprogSpec { name, .. } = self.s.ast.kind_mut(spec) {
                    *name = new_name;
                }
            }
            NodeKind::PackageSpec { .. } => {
                if let NodeKind::PackageSpec { name, .. } = self.s.ast.kind_mut(unit) {
                    *name = new_name;
                }
            }
            NodeKind::PackageBody { .. } => {
                if let NodeKind::PackageBody { name, .. } = self.s.ast.kind_mut(unit) {
                    *name = new_name;
                }
            }
            _ => {}
        }
    }

    // ----- representation clauses and pragmas -----

    fn apply_rep_clause(&mut self, n: NodeId, target: NodeId, value: NodeId) {
        let loc = self.s.ast.loc(n);
        // `for T'Size use N` targets an attribute of the entity.
        if let NodeKind::Attr { prefix, attr, .. } = self.s.ast.kind(target).clone() {
            let attr_name = self.s.names.lower(attr).to_string();
            let ty = self.resolve_type_mark(prefix);
            self.resolve_expr(value, None);
            match attr_name.as_str() {
                "size" => {
                    if let Some(bits) = self.static_i64(value) {
                        self.s.types.get_mut(ty).size_bits = bits as u32;
                    }
                }
                "storage_size" | "address" => {}
                _ => self.error(loc, "unsupported attribute in representation clause"),
            }
            self.s.types.get_mut(ty).rep_clauses.push(n);
            return;
        }

        let name = self.last_segment(target);
        let sym = match self.s.syms.find(name, &self.s.names) {
            Some(sym) => sym,
            None => {
                self.error(loc, "representation clause names an undefined entity");
                return;
            }
        };
        self.s.ast.set_sym(target, sym);
        let sym_kind = self.s.syms.get(sym).kind;
        let ty = self.s.syms.get(sym).ty;

        match self.s.ast.kind(value).clone() {
            // Enumeration representation: (lit => value, ...) rewrites each
            // literal's numeric value.
            NodeKind::Aggregate { assocs } => {
                let Some(ty) = ty else { return };
                let lits = self.s.types.get(self.s.types.base_of(ty)).literals.clone();
                for assoc in assocs {
                    if let NodeKind::Assoc { choices, value } = self.s.ast.kind(assoc).clone() {
                        self.resolve_expr(value, None);
                        let Some(v) = self.static_i64(value) else {
                            self.error(loc, "enumeration representation value must be static");
                            continue;
                        };
                        if let Some(&choice) = choices.first() {
                            if let NodeKind::Ident(lname) = self.s.ast.kind(choice) {
                                let lname = *lname;
                                for &lit in &lits {
                                    if self.s.syms.get(lit).name == lname {
                                        self.s.syms.get_mut(lit).value = v;
                                    }
                                }
                            }
                        }
                    }
                }
                self.s.types.get_mut(ty).rep_clauses.push(n);
            }
            // Record representation: per-component byte offset and bit
            // range; the type becomes packed.
            NodeKind::RecordRep { components, .. } => {
                let Some(ty) = ty else { return };
                let comps = self.s.types.get(self.s.types.base_of(ty)).components.clone();
                for rc in components {
                    if let NodeKind::RecordRepComp {
                        name: cname,
                        offset,
                        range,
                    } = self.s.ast.kind(rc).clone()
                    {
                        self.resolve_expr(offset, None);
                        self.resolve_expr(range, None);
                        let byte = self.static_i64(offset).unwrap_or(0);
                        for &c in &comps {
                            if self.s.syms.get(c).name == cname {
                                self.s.syms.get_mut(c).offset = byte;
                            }
                        }
                    }
                }
                self.s.types.get_mut(ty).packed = true;
                self.s.types.get_mut(ty).rep_clauses.push(n);
            }
            // Address clause (`for X use at expr`) or size value.
            _ => {
                self.resolve_expr(value, None);
                if sym_kind == SymKind::Type {
                    if let Some(ty) = ty {
                        self.s.types.get_mut(ty).rep_clauses.push(n);
                    }
                }
            }
        }
    }

    fn apply_pragma(&mut self, n: NodeId, name: NameId, args: &[NodeId]) {
        let pragma = self.s.names.lower(name).to_string();
        let loc = self.s.ast.loc(n);
        let arg_value = |a: &Analyzer, i: usize| -> Option<NodeId> {
            args.get(i).map(|&x| match a.s.ast.kind(x) {
                NodeKind::Assoc { value, .. } => *value,
                _ => x,
            })
        };
        match pragma.as_str() {
            "suppress" => {
                let mask = match arg_value(self, 0)
                    .map(|a| self.last_segment(a))
                    .map(|n| self.s.names.lower(n).to_string())
                    .as_deref()
                {
                    Some("range_check") => SuppressMask::RANGE_CHECK,
                    Some("index_check") => SuppressMask::INDEX_CHECK,
                    Some("division_check") => SuppressMask::DIVISION_CHECK,
                    Some("discriminant_check") => SuppressMask::DISCRIMINANT_CHECK,
                    Some("access_check") => SuppressMask::ACCESS_CHECK,
                    _ => SuppressMask::ALL_CHECKS,
                };
                if let Some(target) = arg_value(self, 1) {
                    let ty = self.resolve_type_mark(target);
                    self.s.types.get_mut(ty).suppress |= mask;
                } else {
                    self.s.suppress_all |= mask;
                }
            }
            "pack" => {
                if let Some(target) = arg_value(self, 0) {
                    let ty = self.resolve_type_mark(target);
                    self.s.types.get_mut(ty).packed = true;
                }
            }
            "inline" => {
                if let Some(target) = arg_value(self, 0) {
                    let tname = self.last_segment(target);
                    for cand in self.s.syms.homographs(tname, &self.s.names) {
                        if self.s.syms.get(cand).is_subprogram() {
                            self.s.syms.get_mut(cand).inlined = true;
                        }
                    }
                }
            }
            "controlled" => {
                if let Some(target) = arg_value(self, 0) {
                    let ty = self.resolve_type_mark(target);
                    self.s.types.get_mut(ty).controlled = true;
                }
            }
            "import" | "interface" => {
                // pragma Import(Language, Entity [, External_Name]);
                let lang = arg_value(self, 0)
                    .map(|a| self.last_segment(a))
                    .map(|n| self.s.names.spelling(n).to_string());
                if let Some(target) = arg_value(self, 1) {
                    let tname = self.last_segment(target);
                    let ext = arg_value(self, 2).and_then(|a| match self.s.ast.kind(a) {
                        NodeKind::StrLit(text) => Some(text.clone()),
                        NodeKind::Ident(n) => Some(self.s.names.lower(*n).to_string()),
                        _ => None,
                    });
                    if let Some(sym) = self.s.syms.find(tname, &self.s.names) {
                        let s = self.s.syms.get_mut(sym);
                        s.external = true;
                        s.ext_lang = lang;
                        s.ext_name =
                            Some(ext.unwrap_or_else(|| self.s.names.lower(tname).to_string()));
                    } else {
                        self.error(loc, "pragma Import names an undefined entity");
                    }
                }
            }
            "shared" => {
                if let Some(target) = arg_value(self, 0) {
                    let tname = self.last_segment(target);
                    if let Some(sym) = self.s.syms.find(tname, &self.s.names) {
                        self.s.syms.get_mut(sym).shared = true;
                    }
                }
            }
            "elaborate" | "elaborate_all" => {
                for i in 0..args.len() {
                    if let Some(a) = arg_value(self, i) {
                        let uname = self.last_segment(a);
                        self.s.elaborate_deps.push(uname);
                    }
                }
            }
            // Accepted and ignored.
            "optimize" | "priority" | "storage_size" | "list" | "page" => {}
            _ => {}
        }
    }

    // ----- statements -----

    pub fn resolve_stmts(&mut self, stmts: &[NodeId]) -> Result<(), String> {
        for &s in stmts {
            self.resolve_stmt(s)?;
        }
        Ok(())
    }

    fn resolve_handlers(&mut self, handlers: &[NodeId]) -> Result<(), String> {
        for &h in handlers {
            if let NodeKind::Handler { choices, stmts } = self.s.ast.kind(h).clone() {
                for c in choices {
                    if !matches!(self.s.ast.kind(c), NodeKind::OthersMark) {
                        let name = self.last_segment(c);
                        match self.s.syms.find(name, &self.s.names) {
                            Some(sym) if self.s.syms.get(sym).kind == SymKind::Exception => {
                                self.s.ast.set_sym(c, sym);
                            }
                            _ => {
                                let loc = self.s.ast.loc(c);
                                self.error(loc, "handler choice is not an exception");
                            }
                        }
                    }
                }
                self.resolve_stmts(&stmts)?;
            }
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, n: NodeId) -> Result<(), String> {
        let kind = self.s.ast.kind(n).clone();
        match kind {
            NodeKind::Assign { target, value } => {
                let tty = self.resolve_expr(target, None);
                self.resolve_expr(value, Some(tty));
                let vty = self.s.ast.ty(value).unwrap_or(tty);
                if !self.s.types.covers(tty, vty) {
                    let loc = self.s.ast.loc(n);
                    self.error(loc, "type mismatch in assignment");
                }
                let checked = self.chk(value, tty);
                if checked != value {
                    if let NodeKind::Assign { value, .. } = self.s.ast.kind_mut(n) {
                        *value = checked;
                    }
                }
                Ok(())
            }
            NodeKind::IfStmt { arms, else_stmts } => {
                for arm in arms {
                    if let NodeKind::IfArm { cond, stmts } = self.s.ast.kind(arm).clone() {
                        self.resolve_expr(cond, Some(self.s.types.boolean));
                        self.resolve_stmts(&stmts)?;
                    }
                }
                self.resolve_stmts(&else_stmts)
            }
            NodeKind::CaseStmt { expr, alts } => {
                let ety = self.resolve_expr(expr, None);
                for alt in alts {
                    if let NodeKind::CaseAlt { choices, stmts } = self.s.ast.kind(alt).clone() {
                        for c in choices {
                            if !matches!(self.s.ast.kind(c), NodeKind::OthersMark) {
                                self.resolve_expr(c, Some(ety));
                            }
                        }
                        self.resolve_stmts(&stmts)?;
                    }
                }
                Ok(())
            }
            NodeKind::LoopStmt { scheme, stmts, .. } => {
                match scheme {
                    LoopScheme::While { cond } => {
                        self.resolve_expr(cond, Some(self.s.types.boolean));
                        self.resolve_stmts(&stmts)?;
                    }
                    LoopScheme::For { var, range, .. } => {
                        let ity = self.loop_range_type(range);
                        self.s.syms.enter_scope();
                        let mut sym = Symbol::new(var, SymKind::Variable);
                        sym.ty = Some(ity);
                        sym.constant = true;
                        sym.decl = Some(n);
                        sym.parent = self.parent;
                        sym.level = self.level;
                        let id = self.s.syms.add_overload(sym, &self.s.names);
                        self.s.ast.set_sym(n, id);
                        self.s.ast.set_ty(n, ity);
                        self.resolve_stmts(&stmts)?;
                        self.s.syms.exit_scope();
                    }
                    LoopScheme::Bare => {
                        self.resolve_stmts(&stmts)?;
                    }
                }
                Ok(())
            }
            NodeKind::BlockStmt {
                decls,
                stmts,
                handlers,
                ..
            } => {
                self.s.syms.enter_scope();
                self.resolve_decls(&decls)?;
                self.resolve_stmts(&stmts)?;
                self.resolve_handlers(&handlers)?;
                self.s.syms.exit_scope();
                Ok(())
            }
            NodeKind::ExitStmt { cond, .. } => {
                if let Some(c) = cond {
                    self.resolve_expr(c, Some(self.s.types.boolean));
                }
                Ok(())
            }
            NodeKind::ReturnStmt { expr } => {
                if let Some(e) = expr {
                    let expected = self.ret_type;
                    self.resolve_expr(e, expected);
                    if let Some(rt) = expected {
                        let checked = self.chk(e, rt);
                        if checked != e {
                            if let NodeKind::ReturnStmt { expr } = self.s.ast.kind_mut(n) {
                                *expr = Some(checked);
                            }
                        }
                    }
                }
                Ok(())
            }
            NodeKind::GotoStmt { .. } | NodeKind::NullStmt => Ok(()),
            NodeKind::LabelMark { label } => {
                let mut sym = Symbol::new(label, SymKind::Label);
                sym.decl = Some(n);
                let id = self.s.syms.add_overload(sym, &self.s.names);
                self.s.ast.set_sym(n, id);
                Ok(())
            }
            NodeKind::RaiseStmt { name } => {
                if let Some(name) = name {
                    let exc = self.last_segment(name);
                    match self.s.syms.find(exc, &self.s.names) {
                        Some(sym) if self.s.syms.get(sym).kind == SymKind::Exception => {
                            self.s.ast.set_sym(name, sym);
                        }
                        _ => {
                            let loc = self.s.ast.loc(n);
                            self.error(loc, "raise names an undefined exception");
                        }
                    }
                }
                Ok(())
            }
            NodeKind::CodeStmt { expr } => {
                self.resolve_expr(expr, None);
                Ok(())
            }
            NodeKind::DelayStmt { expr } => {
                self.resolve_expr(expr, Some(self.s.types.duration));
                Ok(())
            }
            NodeKind::AbortStmt { names } => {
                for name in names {
                    self.resolve_expr(name, None);
                }
                Ok(())
            }
            NodeKind::AcceptStmt {
                name,
                index,
                params,
                stmts,
            } => {
                if let Some(i) = index {
                    self.resolve_expr(i, None);
                }
                let entry = self.s.syms.find(name, &self.s.names);
                if let Some(e) = entry {
                    self.s.ast.set_sym(n, e);
                }
                self.s.syms.enter_scope();
                for &p in &params {
                    if let NodeKind::Param { names, mode, subtype, .. } =
                        self.s.ast.kind(p).clone()
                    {
                        let ty = self.resolve_subtype_ind(subtype);
                        self.s.ast.set_ty(p, ty);
                        let mut ids = Vec::new();
                        for pname in names {
                            let mut sym = Symbol::new(pname, SymKind::Variable);
                            sym.ty = Some(ty);
                            sym.mode = Some(mode);
                            sym.decl = Some(p);
                            ids.push(self.s.syms.add_overload(sym, &self.s.names));
                        }
                        self.s.decl_syms.insert(p, ids);
                    }
                }
                self.resolve_stmts(&stmts)?;
                self.s.syms.exit_scope();
                Ok(())
            }
            NodeKind::SelectStmt { alts, else_stmts } => {
                for alt in alts {
                    if let NodeKind::SelectAlt { guard, stmts } = self.s.ast.kind(alt).clone() {
                        if let Some(g) = guard {
                            self.resolve_expr(g, Some(self.s.types.boolean));
                        }
                        self.resolve_stmts(&stmts)?;
                    }
                }
                self.resolve_stmts(&else_stmts)
            }
            NodeKind::PragmaNode { name, args } => {
                self.apply_pragma(n, name, &args);
                Ok(())
            }
            // An expression statement is a procedure call.
            _ => {
                self.resolve_expr(n, None);
                Ok(())
            }
        }
    }

    fn loop_range_type(&mut self, range: NodeId) -> TypeId {
        let kind = self.s.ast.kind(range).clone();
        match kind {
            NodeKind::RangeExpr { lo, hi } => {
                self.resolve_expr(lo, None);
                self.resolve_expr(hi, None);
                let lo_ty = self.s.ast.ty(lo).unwrap_or(self.s.types.integer);
                let ty = self.concrete_scalar(lo_ty);
                self.s.ast.set_ty(range, ty);
                ty
            }
            NodeKind::Attr { .. } => {
                let ty = self.resolve_expr(range, None);
                self.concrete_scalar(ty)
            }
            NodeKind::Ident(_) | NodeKind::Selected { .. } => {
                let ty = self.resolve_type_mark(range);
                self.s.ast.set_ty(range, ty);
                ty
            }
            _ => {
                let ty = self.resolve_expr(range, None);
                self.concrete_scalar(ty)
            }
        }
    }

    /// Universal operand types harden to their concrete default.
    fn concrete_scalar(&mut self, ty: TypeId) -> TypeId {
        match self.s.types.get(ty).kind {
            TypeKind::Unsigned => self.s.types.integer,
            TypeKind::UniversalFloat => self.s.types.float,
            _ => ty,
        }
    }

    // ----- expressions -----

    pub fn resolve_expr(&mut self, n: NodeId, expected: Option<TypeId>) -> TypeId {
        let kind = self.s.ast.kind(n).clone();
        let ty = match kind {
            NodeKind::IntLit { .. } => self.s.types.universal_integer,
            NodeKind::RealLit(_) => self.s.types.universal_real,
            NodeKind::CharLit(c) => self.resolve_char_lit(n, c, expected),
            NodeKind::StrLit(text) => {
                let mut info = TypeInfo::new(TypeKind::Subtype);
                info.base = Some(self.s.types.string);
                info.elem = Some(self.s.types.character);
                info.indexes = vec![self.s.types.positive];
                info.lo = 1;
                info.hi = text.chars().count() as i64;
                info.size_bits = 128;
                info.align_bits = 64;
                self.s.types.alloc(info)
            }
            NodeKind::NullLit => expected.unwrap_or_else(|| {
                let info = TypeInfo::new(TypeKind::Access);
                self.s.types.alloc(info)
            }),
            NodeKind::Ident(name) => self.resolve_ident(n, name, expected),
            NodeKind::Aggregate { .. } => self.resolve_aggregate(n, expected),
            NodeKind::Binary { op, lhs, rhs } => self.resolve_binary(n, op, lhs, rhs, expected),
            NodeKind::Unary { op, operand } => self.resolve_unary(n, op, operand, expected),
            NodeKind::Attr { prefix, attr, args } => self.resolve_attr(n, prefix, attr, &args),
            NodeKind::Qualified { mark, expr } => {
                let ty = self.resolve_type_mark(mark);
                self.resolve_expr(expr, Some(ty));
                let checked = self.chk(expr, ty);
                if checked != expr {
                    if let NodeKind::Qualified { expr, .. } = self.s.ast.kind_mut(n) {
                        *expr = checked;
                    }
                }
                ty
            }
            NodeKind::Call { .. } => self.resolve_call(n, expected),
            NodeKind::Index { prefix, indexes } => {
                let pty = self.resolve_expr(prefix, None);
                for &i in &indexes {
                    self.resolve_expr(i, None);
                }
                self.s.types.elem_of(pty).unwrap_or(self.s.types.integer)
            }
            NodeKind::Slice { prefix, range } => {
                let pty = self.resolve_expr(prefix, None);
                self.resolve_expr(range, None);
                let base = self.s.types.base_of(pty);
                let (lo, hi) = self.static_range(range);
                let base_info = self.s.types.get(base).clone();
                let mut info = TypeInfo::new(TypeKind::Subtype);
                info.base = Some(base);
                info.elem = base_info.elem;
                info.indexes = base_info.indexes.clone();
                // Slices carry static bounds only when both ends are
                // static; otherwise the emitter reads the fat pointer.
                match (lo, hi) {
                    (Some(l), Some(h)) => {
                        info.lo = l;
                        info.hi = h;
                    }
                    _ => {
                        info.lo = 0;
                        info.hi = -1;
                    }
                }
                info.size_bits = 128;
                info.align_bits = 64;
                self.s.types.alloc(info)
            }
            NodeKind::Selected { prefix, field } => self.resolve_selected(n, prefix, field, expected),
            NodeKind::Deref { prefix } => {
                let pty = self.resolve_expr(prefix, None);
                if !self.s.types.is_access(pty) {
                    let loc = self.s.ast.loc(n);
                    self.error(loc, "'.all' applied to a value that is not an access");
                    self.s.types.integer
                } else {
                    self.s.types.elem_of(pty).unwrap_or(self.s.types.integer)
                }
            }
            NodeKind::Allocator { subtype, init } => self.resolve_allocator(n, subtype, init, expected),
            NodeKind::RangeExpr { lo, hi } => {
                let lty = self.resolve_expr(lo, expected);
                self.resolve_expr(hi, expected.or(Some(lty)));
                lty
            }
            NodeKind::Conversion { target, expr } => {
                let ty = self.resolve_type_mark(target);
                self.resolve_expr(expr, None);
                ty
            }
            NodeKind::Membership { expr, target, .. } => {
                self.resolve_expr(expr, None);
                match self.s.ast.kind(target).clone() {
                    NodeKind::Ident(_) | NodeKind::Selected { .. } => {
                        self.resolve_type_mark(target);
                    }
                    _ => {
                        self.resolve_expr(target, None);
                    }
                }
                self.s.types.boolean
            }
            NodeKind::Check { expr, .. } => {
                self.s.ast.ty(expr).unwrap_or(self.s.types.integer)
            }
            NodeKind::OthersMark => self.s.types.integer,
            _ => {
                let loc = self.s.ast.loc(n);
                self.error(loc, "expected expression");
                self.s.types.integer
            }
        };
        self.s.ast.set_ty(n, ty);
        ty
    }

    fn resolve_char_lit(&mut self, n: NodeId, c: char, expected: Option<TypeId>) -> TypeId {
        // Search the expected enumeration's literals before falling back
        // to CHARACTER.
        if let Some(exp) = expected {
            let base = self.s.types.base_of(exp);
            if self.s.types.get(base).kind == TypeKind::Enum {
                let text = c.to_string();
                let lname = self.s.names.intern(&text);
                let lits = self.s.types.get(base).literals.clone();
                for lit in lits {
                    if self.s.syms.get(lit).name == lname {
                        self.s.ast.set_sym(n, lit);
                        return exp;
                    }
                }
            }
        }
        self.s.types.character
    }

    fn resolve_ident(&mut self, n: NodeId, name: NameId, expected: Option<TypeId>) -> TypeId {
        // Overloadable names (enumeration literals, parameterless
        // functions) select by expected type.
        if let Some(sym) =
            self.s
                .syms
                .find_with_arity(name, 0, expected, &[], &self.s.types, &self.s.names)
        {
            let s = self.s.syms.get(sym);
            let ty = match s.kind {
                SymKind::Function => s.ret.unwrap_or(self.s.types.integer),
                _ => s.ty.unwrap_or(self.s.types.integer),
            };
            self.s.ast.set_sym(n, sym);
            return ty;
        }
        match self.s.syms.find(name, &self.s.names) {
            Some(sym) => {
                let s = self.s.syms.get(sym);
                let ty = match s.kind {
                    SymKind::Function => s.ret.unwrap_or(self.s.types.integer),
                    _ => s.ty.unwrap_or(self.s.types.integer),
                };
                self.s.ast.set_sym(n, sym);
                ty
            }
            None => {
                let loc = self.s.ast.loc(n);
                let text = self.s.names.spelling(name).to_string();
                self.error(loc, &format!("undefined identifier '{}'", text));
                self.s.types.integer
            }
        }
    }

    fn resolve_selected(
        &mut self,
        n: NodeId,
        prefix: NodeId,
        field: NameId,
        expected: Option<TypeId>,
    ) -> TypeId {
        // Package-qualified name.
        if let Some(pkg) = self.package_of(prefix) {
            if let Some(sym) = self.s.syms.find_in(pkg, field, &self.s.names) {
                let s = self.s.syms.get(sym);
                let ty = match s.kind {
                    SymKind::Function => s.ret.unwrap_or(self.s.types.integer),
                    _ => s.ty.unwrap_or(self.s.types.integer),
                };
                self.s.ast.set_sym(n, sym);
                return ty;
            }
            let loc = self.s.ast.loc(n);
            let text = self.s.names.spelling(field).to_string();
            self.error(loc, &format!("'{}' is not declared in this package", text));
            return self.s.types.integer;
        }

        // Record component, with implicit dereference through an access.
        let mut pty = self.resolve_expr(prefix, None);
        if self.s.types.is_access(pty) {
            pty = self.s.types.elem_of(pty).unwrap_or(pty);
        }
        let base = self.s.types.base_of(pty);
        let members: Vec<SymId> = {
            let info = self.s.types.get(base);
            info.discriminants
                .iter()
                .chain(info.components.iter())
                .copied()
                .collect()
        };
        for c in members {
            if self.s.syms.get(c).name == field {
                self.s.ast.set_sym(n, c);
                return self.s.syms.get(c).ty.unwrap_or(self.s.types.integer);
            }
        }
        let _ = expected;
        let loc = self.s.ast.loc(n);
        let text = self.s.names.spelling(field).to_string();
        self.error(loc, &format!("'{}' is not a component of this record", text));
        self.s.types.integer
    }

    /// Operator symbols usable as generic actuals and renamed subprograms.
    fn operator_binop(&self, name: NameId) -> Option<BinOp> {
        Some(match self.s.names.lower(name) {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "&" => BinOp::Cat,
            "=" => BinOp::Eq,
            "/=" => BinOp::Neq,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "mod" => BinOp::Mod,
            "rem" => BinOp::Rem,
            "**" => BinOp::Pow,
            "and" => BinOp::And,
            "or" => BinOp::Or,
            "xor" => BinOp::Xor,
            _ => return None,
        })
    }

    fn resolve_call(&mut self, n: NodeId, expected: Option<TypeId>) -> TypeId {
        let (callee, raw_args) = match self.s.ast.kind(n).clone() {
            NodeKind::Call { callee, args } => (callee, args),
            _ => return self.s.types.integer,
        };

        // Split associations into positional values and named pairs.
        let mut positional: Vec<NodeId> = Vec::new();
        let mut named: Vec<(NameId, NodeId)> = Vec::new();
        for &a in &raw_args {
            match self.s.ast.kind(a).clone() {
                NodeKind::Assoc { choices, value } => {
                    if choices.is_empty() {
                        positional.push(value);
                    } else if let NodeKind::Ident(fname) = self.s.ast.kind(choices[0]) {
                        named.push((*fname, value));
                    } else {
                        positional.push(value);
                    }
                }
                _ => positional.push(a),
            }
        }
        let arity = positional.len() + named.len();

        // A callee naming a type is a conversion.
        let callee_name = match self.s.ast.kind(callee).clone() {
            NodeKind::Ident(name) => Some(name),
            NodeKind::Selected { .. } => None,
            _ => None,
        };
        if let Some(name) = callee_name {
            if let Some(sym) = self.s.syms.find(name, &self.s.names) {
                if self.s.syms.get(sym).kind == SymKind::Type && arity == 1 {
                    let target_ty = self.s.syms.get(sym).ty.unwrap_or(self.s.types.integer);
                    let arg = positional[0];
                    self.resolve_expr(arg, None);
                    self.s.ast.set_sym(callee, sym);
                    self.s.ast.replace(
                        n,
                        NodeKind::Conversion {
                            target: callee,
                            expr: arg,
                        },
                    );
                    return target_ty;
                }
            }
        }

        // A callee naming an array object (or access to one) is indexing.
        let object_ty = match self.s.ast.kind(callee).clone() {
            NodeKind::Ident(name) => self
                .s
                .syms
                .find(name, &self.s.names)
                .filter(|&sym| {
                    matches!(
                        self.s.syms.get(sym).kind,
                        SymKind::Variable | SymKind::Component | SymKind::Discriminant
                    )
                })
                .and_then(|sym| self.s.syms.get(sym).ty),
            NodeKind::Selected { .. } | NodeKind::Index { .. } | NodeKind::Deref { .. }
            | NodeKind::Call { .. } | NodeKind::Slice { .. } => {
                // Chained prefixes resolve as expressions.
                Some(self.resolve_expr(callee, None))
            }
            _ => None,
        };
        if let Some(mut pty) = object_ty {
            if self.s.types.is_access(pty) && self.s.types.elem_of(pty).map(|e| self.s.types.is_array(e)).unwrap_or(false) {
                pty = self.s.types.elem_of(pty).unwrap_or(pty);
            }
            if self.s.types.is_array(pty) {
                self.resolve_expr(callee, None);
                // Multi-dimensional indexing nests one dimension per node,
                // matching the nested anonymous array types.
                let mut prefix = callee;
                let mut cur_ty = pty;
                let loc = self.s.ast.loc(n);
                for (i, &idx) in positional.iter().enumerate() {
                    let index_ty = self.s.types.index_of(cur_ty);
                    self.resolve_expr(idx, index_ty);
                    let checked = match index_ty {
                        Some(it) => self.index_chk(idx, cur_ty, it),
                        None => idx,
                    };
                    let elem = self.s.types.elem_of(cur_ty).unwrap_or(self.s.types.integer);
                    if i + 1 == positional.len() {
                        self.s.ast.replace(
                            n,
                            NodeKind::Index {
                                prefix,
                                indexes: vec![checked],
                            },
                        );
                    } else {
                        let inner = self.s.ast.alloc(
                            NodeKind::Index {
                                prefix,
                                indexes: vec![checked],
                            },
                            loc,
                        );
                        self.s.ast.set_ty(inner, elem);
                        prefix = inner;
                    }
                    cur_ty = elem;
                }
                return cur_ty;
            }
        }

        // Subprogram call: resolve arguments, select the overload by arity
        // and score, then re-resolve against the chosen formal types.
        let mut arg_tys: Vec<Option<TypeId>> = Vec::new();
        for &a in &positional {
            arg_tys.push(Some(self.resolve_expr(a, None)));
        }
        for &(_, v) in &named {
            self.resolve_expr(v, None);
        }

        let (set_name, owner) = match self.s.ast.kind(callee).clone() {
            NodeKind::Ident(name) => (Some(name), None),
            NodeKind::Selected { prefix, field } => {
                let pkg = self.package_of(prefix);
                (Some(field), pkg)
            }
            _ => (None, None),
        };

        if let Some(name) = set_name {
            let chosen = match owner {
                Some(pkg) => {
                    let mut best = None;
                    for cand in self.s.syms.find_all_in(pkg, name, &self.s.names) {
                        if self.s.syms.get(cand).params.len() == arity {
                            best = Some(cand);
                            break;
                        }
                    }
                    best
                }
                None => self.s.syms.find_with_arity(
                    name,
                    arity,
                    expected,
                    &arg_tys,
                    &self.s.types,
                    &self.s.names,
                ),
            };
            if let Some(sym) = chosen {
                return self.bind_call(n, callee, sym, positional, named);
            }
            // Builtin operator spelled as a function name: `"<"(A, B)`.
            if arity == 2 {
                if let Some(op) = self.operator_binop(name) {
                    let lhs = positional[0];
                    let rhs = positional[1];
                    self.s.ast.replace(n, NodeKind::Binary { op, lhs, rhs });
                    return self.resolve_expr(n, expected);
                }
            }
            let loc = self.s.ast.loc(n);
            let text = self.s.names.spelling(name).to_string();
            self.error(loc, &format!("undefined subprogram '{}'", text));
            return self.s.types.integer;
        }

        let loc = self.s.ast.loc(n);
        self.error(loc, "expression cannot be called");
        self.s.types.integer
    }

    /// Bind a selected overload: order arguments by the formal part, fill
    /// defaults, insert range checks, record the symbol.
    fn bind_call(
        &mut self,
        n: NodeId,
        callee: NodeId,
        sym: SymId,
        positional: Vec<NodeId>,
        named: Vec<(NameId, NodeId)>,
    ) -> TypeId {
        let (param_nodes, param_tys, ret) = {
            let s = self.s.syms.get(sym);
            (s.param_nodes.clone(), s.params.clone(), s.ret)
        };

        // Formal names in order, one entry per declared name.
        let mut formal_names: Vec<NameId> = Vec::new();
        let mut defaults: Vec<Option<NodeId>> = Vec::new();
        for &p in &param_nodes {
            if let NodeKind::Param { names, default, .. } = self.s.ast.kind(p).clone() {
                for fname in names {
                    formal_names.push(fname);
                    defaults.push(default);
                }
            }
        }

        let formal_count = param_tys.len();
        let mut ordered: Vec<Option<NodeId>> = vec![None; formal_count];
        for (i, &a) in positional.iter().enumerate() {
            if i < formal_count {
                ordered[i] = Some(a);
            }
        }
        for (fname, value) in named {
            if let Some(pos) = formal_names.iter().position(|&f| f == fname) {
                ordered[pos] = Some(value);
            } else {
                let loc = self.s.ast.loc(n);
                let text = self.s.names.spelling(fname).to_string();
                self.error(loc, &format!("no formal parameter named '{}'", text));
            }
        }
        for (i, slot) in ordered.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = defaults.get(i).copied().flatten();
            }
        }

        let mut final_args = Vec::with_capacity(formal_count);
        for (i, slot) in ordered.into_iter().enumerate() {
            match slot {
                Some(a) => {
                    let fty = param_tys[i];
                    self.resolve_expr(a, Some(fty));
                    final_args.push(self.chk(a, fty));
                }
                None => {
                    let loc = self.s.ast.loc(n);
                    self.error(loc, "missing actual parameter");
                }
            }
        }

        self.s.ast.set_sym(callee, sym);
        self.s.ast.set_sym(n, sym);
        self.s.ast.replace(
            n,
            NodeKind::Call {
                callee,
                args: final_args,
            },
        );
        ret.unwrap_or(self.s.types.integer)
    }

    fn resolve_aggregate(&mut self, n: NodeId, expected: Option<TypeId>) -> TypeId {
        let Some(exp) = expected else {
            let loc = self.s.ast.loc(n);
            self.error(loc, "aggregate requires a context type");
            return self.s.types.integer;
        };
        self.s.types.freeze(exp, &mut self.s.syms);
        let base = self.s.types.base_of(exp);
        if self.s.types.is_array(exp) {
            self.normalize_array_aggregate(n, exp)
        } else if self.s.types.get(base).kind == TypeKind::Record {
            self.normalize_record_aggregate(n, exp)
        } else {
            let loc = self.s.ast.loc(n);
            self.error(loc, "aggregate not allowed for this type");
            exp
        }
    }

    /// Materialize positional, named, ranged and `others` associations into
    /// a positional vector covering the index range exactly once.
    fn normalize_array_aggregate(&mut self, n: NodeId, exp: TypeId) -> TypeId {
        let assocs = match self.s.ast.kind(n).clone() {
            NodeKind::Aggregate { assocs } => assocs,
            _ => return exp,
        };
        let elem = self.s.types.elem_of(exp).unwrap_or(self.s.types.integer);
        let (mut lo, mut hi) = self.s.types.bounds(exp);
        if self.s.types.is_unconstrained_array(exp) {
            // Positional aggregate against an unconstrained type: the
            // bounds come from the element count, starting at the index
            // subtype's lower bound.
            let index_lo = self
                .s
                .types
                .index_of(exp)
                .map(|i| self.s.types.bounds(i).0)
                .unwrap_or(1);
            let lo_start = if index_lo == i64::MIN { 1 } else { index_lo };
            lo = lo_start;
            hi = lo_start + assocs.len() as i64 - 1;
        }
        let len = (hi - lo + 1).max(0) as usize;
        const MAX_AGGREGATE: usize = 1 << 16;
        if len > MAX_AGGREGATE {
            let loc = self.s.ast.loc(n);
            self.error(loc, "aggregate index range is too large");
            return exp;
        }

        let mut slots: Vec<Option<NodeId>> = vec![None; len];
        let mut others_value: Option<NodeId> = None;
        let mut next_positional = 0usize;
        let loc = self.s.ast.loc(n);

        for a in assocs {
            let (choices, value) = match self.s.ast.kind(a).clone() {
                NodeKind::Assoc { choices, value } => (choices, value),
                _ => continue,
            };
            self.resolve_expr(value, Some(elem));
            if choices.is_empty() {
                if next_positional >= len {
                    self.error(loc, "too many components in array aggregate");
                } else {
                    if slots[next_positional].is_some() {
                        self.error(loc, "duplicate component in array aggregate");
                    }
                    slots[next_positional] = Some(value);
                }
                next_positional += 1;
                continue;
            }
            for c in choices {
                match self.s.ast.kind(c).clone() {
                    NodeKind::OthersMark => others_value = Some(value),
                    NodeKind::RangeExpr { lo: clo, hi: chi } => {
                        self.resolve_expr(clo, None);
                        self.resolve_expr(chi, None);
                        let (Some(a0), Some(a1)) = (self.static_i64(clo), self.static_i64(chi))
                        else {
                            self.error(loc, "array aggregate choice must be static");
                            continue;
                        };
                        for i in a0..=a1 {
                            self.fill_slot(&mut slots, i, lo, value, loc);
                        }
                    }
                    _ => {
                        self.resolve_expr(c, None);
                        match self.static_i64(c) {
                            Some(i) => self.fill_slot(&mut slots, i, lo, value, loc),
                            None => self.error(loc, "array aggregate choice must be static"),
                        }
                    }
                }
            }
        }

        let mut values = Vec::with_capacity(len);
        for slot in &slots {
            match slot.or(others_value) {
                Some(v) => values.push(v),
                None => {
                    self.error(loc, "array aggregate leaves components uncovered");
                    break;
                }
            }
        }
        if values.len() == len {
            let positional: Vec<NodeId> = values
                .into_iter()
                .map(|v| {
                    self.s.ast.alloc(
                        NodeKind::Assoc {
                            choices: Vec::new(),
                            value: v,
                        },
                        loc,
                    )
                })
                .collect();
            self.s.ast.replace(n, NodeKind::Aggregate { assocs: positional });
        }

        if self.s.types.is_unconstrained_array(exp) {
            let base_info = self.s.types.get(self.s.types.base_of(exp)).clone();
            let mut info = TypeInfo::new(TypeKind::Subtype);
            info.base = Some(self.s.types.base_of(exp));
            info.elem = base_info.elem;
            info.indexes = base_info.indexes.clone();
            info.lo = lo;
            info.hi = hi;
            info.size_bits = 128;
            info.align_bits = 64;
            return self.s.types.alloc(info);
        }
        exp
    }

    fn fill_slot(
        &mut self,
        slots: &mut [Option<NodeId>],
        index: i64,
        lo: i64,
        value: NodeId,
        loc: Loc,
    ) {
        let pos = index - lo;
        if pos < 0 || pos as usize >= slots.len() {
            self.error(loc, "array aggregate choice out of range");
            return;
        }
        if slots[pos as usize].is_some() {
            self.error(loc, "duplicate component in array aggregate");
        }
        slots[pos as usize] = Some(value);
    }

    /// Mark coverage of each record field, rewriting the aggregate into
    /// component order. `others` fills every not-yet-covered component.
    fn normalize_record_aggregate(&mut self, n: NodeId, exp: TypeId) -> TypeId {
        let assocs = match self.s.ast.kind(n).clone() {
            NodeKind::Aggregate { assocs } => assocs,
            _ => return exp,
        };
        let base = self.s.types.base_of(exp);
        let members: Vec<SymId> = {
            let info = self.s.types.get(base);
            info.discriminants
                .iter()
                .chain(info.components.iter())
                .copied()
                .collect()
        };
        let loc = self.s.ast.loc(n);
        let mut slots: Vec<Option<NodeId>> = vec![None; members.len()];
        let mut others_value: Option<NodeId> = None;
        let mut next_positional = 0usize;

        for a in assocs {
            let (choices, value) = match self.s.ast.kind(a).clone() {
                NodeKind::Assoc { choices, value } => (choices, value),
                _ => continue,
            };
            if choices.is_empty() {
                if next_positional >= members.len() {
                    self.error(loc, "too many components in record aggregate");
                } else {
                    let mty = self.s.syms.get(members[next_positional]).ty;
                    self.resolve_expr(value, mty);
                    slots[next_positional] = Some(value);
                }
                next_positional += 1;
                continue;
            }
            for c in choices {
                match self.s.ast.kind(c).clone() {
                    NodeKind::OthersMark => {
                        others_value = Some(value);
                        self.resolve_expr(value, None);
                    }
                    NodeKind::Ident(fname) => {
                        match members
                            .iter()
                            .position(|&m| self.s.syms.get(m).name == fname)
                        {
                            Some(pos) => {
                                if slots[pos].is_some() {
                                    self.error(loc, "duplicate component in record aggregate");
                                }
                                let mty = self.s.syms.get(members[pos]).ty;
                                self.resolve_expr(value, mty);
                                slots[pos] = Some(value);
                            }
                            None => {
                                let text = self.s.names.spelling(fname).to_string();
                                self.error(
                                    loc,
                                    &format!("'{}' is not a component of this record", text),
                                );
                            }
                        }
                    }
                    _ => self.error(loc, "record aggregate choice must name a component"),
                }
            }
        }

        let mut values = Vec::with_capacity(members.len());
        for (i, slot) in slots.iter().enumerate() {
            match slot.or(others_value) {
                Some(v) => values.push(v),
                None => {
                    let text = self
                        .s
                        .names
                        .spelling(self.s.syms.get(members[i]).name)
                        .to_string();
                    self.error(loc, &format!("record aggregate leaves '{}' uncovered", text));
                }
            }
        }
        if values.len() == members.len() {
            let positional: Vec<NodeId> = values
                .into_iter()
                .map(|v| {
                    self.s.ast.alloc(
                        NodeKind::Assoc {
                            choices: Vec::new(),
                            value: v,
                        },
                        loc,
                    )
                })
                .collect();
            self.s.ast.replace(n, NodeKind::Aggregate { assocs: positional });
        }
        exp
    }

    fn resolve_binary(
        &mut self,
        n: NodeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
        expected: Option<TypeId>,
    ) -> TypeId {
        let operand_expected = match op {
            BinOp::And | BinOp::AndThen | BinOp::Or | BinOp::OrElse | BinOp::Xor => {
                Some(self.s.types.boolean)
            }
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => None,
            _ => expected,
        };
        let lty = self.resolve_expr(lhs, operand_expected);
        let rty = self.resolve_expr(rhs, operand_expected.or(Some(lty)));

        // A user-defined operator on a non-builtin operand type.
        if !self.s.types.is_scalar(lty) && !self.s.types.is_array(lty) {
            let op_name = self.s.names.intern(operator_symbol(op));
            if let Some(sym) = self.s.syms.find_with_arity(
                op_name,
                2,
                expected,
                &[Some(lty), Some(rty)],
                &self.s.types,
                &self.s.names,
            ) {
                self.s.ast.set_sym(n, sym);
                return self.s.syms.get(sym).ret.unwrap_or(self.s.types.boolean);
            }
        }

        // Static folding rewrites the node to a literal in place.
        if let (Some(a), Some(b)) = (self.static_i64(lhs), self.static_i64(rhs)) {
            if let Some(folded) = fold_int(op, a, b) {
                let big = self
                    .static_big(lhs)
                    .zip(self.static_big(rhs))
                    .and_then(|(x, y)| fold_big(op, &x, &y));
                self.s.ast.replace(
                    n,
                    NodeKind::IntLit {
                        value: big.as_ref().and_then(|b| b.to_i64()).unwrap_or(folded),
                        big,
                    },
                );
                return match op {
                    BinOp::Eq
                    | BinOp::Neq
                    | BinOp::Lt
                    | BinOp::Le
                    | BinOp::Gt
                    | BinOp::Ge => self.s.types.boolean,
                    _ => self.s.types.universal_integer,
                };
            }
        }
        if let (Some(a), Some(b)) = (self.static_real(lhs), self.static_real(rhs)) {
            if let Some(v) = fold_real(op, a, b) {
                self.s.ast.replace(n, NodeKind::RealLit(v));
                return self.s.types.universal_real;
            }
        }

        match op {
            BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                if !self.s.types.covers(lty, rty) && !self.s.types.covers(rty, lty) {
                    let loc = self.s.ast.loc(n);
                    self.error(loc, "comparison operands have incompatible types");
                }
                self.s.types.boolean
            }
            BinOp::And | BinOp::AndThen | BinOp::Or | BinOp::OrElse | BinOp::Xor => {
                // Logical combination of boolean arrays keeps the array type.
                if self.s.types.is_array(lty) {
                    lty
                } else {
                    self.s.types.boolean
                }
            }
            BinOp::Cat => {
                // Catenation yields an unconstrained view of the array
                // operand's base; the emitter produces a fat pointer.
                if self.s.types.is_array(lty) {
                    self.s.types.base_of(lty)
                } else if self.s.types.is_array(rty) {
                    self.s.types.base_of(rty)
                } else {
                    self.s.types.string
                }
            }
            _ => {
                // The result adopts the left operand's concrete type; a
                // universal left operand conforms to the right.
                let lk = self.s.types.get(lty).kind;
                if matches!(lk, TypeKind::Unsigned | TypeKind::UniversalFloat) {
                    let rk = self.s.types.get(rty).kind;
                    if matches!(rk, TypeKind::Unsigned | TypeKind::UniversalFloat) {
                        self.concrete_scalar(lty)
                    } else {
                        rty
                    }
                } else {
                    lty
                }
            }
        }
    }

    fn resolve_unary(
        &mut self,
        n: NodeId,
        op: UnOp,
        operand: NodeId,
        expected: Option<TypeId>,
    ) -> TypeId {
        let ty = self.resolve_expr(operand, expected);
        if let Some(v) = self.static_i64(operand) {
            let folded = match op {
                UnOp::Minus => Some(-v),
                UnOp::Plus => Some(v),
                UnOp::Abs => Some(v.abs()),
                UnOp::Not => None,
            };
            if let Some(f) = folded {
                let big = self.static_big(operand).map(|b| match op {
                    UnOp::Minus => b.negate(),
                    _ => b,
                });
                self.s.ast.replace(n, NodeKind::IntLit { value: f, big });
                return ty;
            }
        }
        if let Some(v) = self.static_real(operand) {
            let folded = match op {
                UnOp::Minus => Some(-v),
                UnOp::Plus => Some(v),
                UnOp::Abs => Some(v.abs()),
                UnOp::Not => None,
            };
            if let Some(f) = folded {
                self.s.ast.replace(n, NodeKind::RealLit(f));
                return ty;
            }
        }
        match op {
            UnOp::Not => {
                if self.s.types.is_array(ty) {
                    ty
                } else {
                    self.s.types.boolean
                }
            }
            _ => ty,
        }
    }

    fn resolve_allocator(
        &mut self,
        n: NodeId,
        subtype: NodeId,
        init: Option<NodeId>,
        expected: Option<TypeId>,
    ) -> TypeId {
        // `new T'(expr)` parses its qualified mark inside the subtype
        // indication; unwrap to the plain mark.
        let designated = match self.s.ast.kind(subtype).clone() {
            NodeKind::SubtypeInd { mark, constraint } => match self.s.ast.kind(mark).clone() {
                NodeKind::Qualified { mark: inner, .. } => self.resolve_type_mark(inner),
                _ => {
                    let ind = self.s.ast.alloc(
                        NodeKind::SubtypeInd { mark, constraint },
                        self.s.ast.loc(subtype),
                    );
                    self.resolve_subtype_ind(ind)
                }
            },
            _ => self.resolve_subtype_ind(subtype),
        };
        self.s.types.freeze(designated, &mut self.s.syms);
        if let Some(i) = init {
            self.resolve_expr(i, Some(designated));
            let checked = self.chk(i, designated);
            if checked != i {
                if let NodeKind::Allocator { init, .. } = self.s.ast.kind_mut(n) {
                    *init = Some(checked);
                }
            }
        }
        if let Some(exp) = expected {
            if self.s.types.is_access(exp) {
                return exp;
            }
        }
        let mut info = TypeInfo::new(TypeKind::Access);
        info.elem = Some(designated);
        info.size_bits = 64;
        info.align_bits = 64;
        self.s.types.alloc(info)
    }

    fn resolve_attr(
        &mut self,
        n: NodeId,
        prefix: NodeId,
        attr: NameId,
        args: &[NodeId],
    ) -> TypeId {
        let attr_name = self.s.names.lower(attr).to_string();
        // The prefix is a type mark or an object; marks resolve without
        // complaint, objects resolve as expressions.
        let prefix_ty = match self.s.ast.kind(prefix).clone() {
            NodeKind::Ident(name)
                if self
                    .s
                    .syms
                    .find(name, &self.s.names)
                    .map(|sym| self.s.syms.get(sym).kind == SymKind::Type)
                    .unwrap_or(false) =>
            {
                self.resolve_type_mark(prefix)
            }
            _ => self.resolve_expr(prefix, None),
        };
        let arg0 = args.first().copied().map(|a| match self.s.ast.kind(a) {
            NodeKind::Assoc { value, .. } => *value,
            _ => a,
        });
        if let Some(a) = arg0 {
            self.resolve_expr(a, Some(prefix_ty));
        }

        let is_array = self.s.types.is_array(prefix_ty);
        let index_ty = self
            .s
            .types
            .index_of(prefix_ty)
            .unwrap_or(self.s.types.integer);
        let (lo, hi) = self.s.types.bounds(prefix_ty);
        let static_bounds = !self.s.types.is_unconstrained_array(prefix_ty);
        let info = self.s.types.get(prefix_ty).clone();

        match attr_name.as_str() {
            "first" => {
                if static_bounds && (is_array || self.s.types.is_discrete(prefix_ty)) {
                    self.s.ast.replace(n, NodeKind::IntLit { value: lo, big: None });
                }
                if is_array {
                    index_ty
                } else {
                    prefix_ty
                }
            }
            "last" => {
                if static_bounds && (is_array || self.s.types.is_discrete(prefix_ty)) {
                    self.s.ast.replace(n, NodeKind::IntLit { value: hi, big: None });
                }
                if is_array {
                    index_ty
                } else {
                    prefix_ty
                }
            }
            "length" => {
                if static_bounds && is_array {
                    self.s.ast.replace(
                        n,
                        NodeKind::IntLit {
                            value: (hi - lo + 1).max(0),
                            big: None,
                        },
                    );
                }
                self.s.types.universal_integer
            }
            "range" => {
                if is_array {
                    index_ty
                } else {
                    prefix_ty
                }
            }
            "pos" => {
                if let Some(v) = arg0.and_then(|a| self.static_i64(a)) {
                    self.s.ast.replace(n, NodeKind::IntLit { value: v, big: None });
                }
                self.s.types.universal_integer
            }
            "val" => {
                if let Some(v) = arg0.and_then(|a| self.static_i64(a)) {
                    self.s.ast.replace(n, NodeKind::IntLit { value: v, big: None });
                }
                prefix_ty
            }
            "succ" => {
                if let Some(v) = arg0.and_then(|a| self.static_i64(a)) {
                    self.s.ast.replace(n, NodeKind::IntLit { value: v + 1, big: None });
                }
                prefix_ty
            }
            "pred" => {
                if let Some(v) = arg0.and_then(|a| self.static_i64(a)) {
                    self.s.ast.replace(n, NodeKind::IntLit { value: v - 1, big: None });
                }
                prefix_ty
            }
            "image" => self.s.types.string,
            "value" => prefix_ty,
            "size" => {
                self.s.types.freeze(prefix_ty, &mut self.s.syms);
                let bits = self.s.types.get(prefix_ty).size_bits;
                self.s.ast.replace(
                    n,
                    NodeKind::IntLit {
                        value: bits as i64,
                        big: None,
                    },
                );
                self.s.types.universal_integer
            }
            "address" => self.s.types.universal_integer,
            "digits" | "mantissa" | "emax" | "machine_emax" | "machine_emin"
            | "machine_mantissa" | "machine_radix" | "safe_emax" | "aft" | "fore" => {
                let value = match attr_name.as_str() {
                    "digits" => info.digits as i64,
                    "mantissa" => 53,
                    "emax" | "machine_emax" | "safe_emax" => 1023,
                    "machine_emin" => -1021,
                    "machine_mantissa" => 53,
                    "machine_radix" => 2,
                    "aft" => 1,
                    "fore" => 2,
                    _ => 0,
                };
                self.s.ast.replace(n, NodeKind::IntLit { value, big: None });
                self.s.types.universal_integer
            }
            "delta" | "small" | "large" | "epsilon" | "safe_large" | "safe_small"
            | "machine_rounds" | "machine_overflows" => {
                let value = match attr_name.as_str() {
                    "delta" => info.delta,
                    "small" | "safe_small" => info.small,
                    "large" | "safe_large" => f64::MAX,
                    "epsilon" => f64::EPSILON,
                    _ => 1.0,
                };
                self.s.ast.replace(n, NodeKind::RealLit(value));
                self.s.types.universal_real
            }
            "width" => {
                let width = decimal_width(lo, hi);
                self.s.ast.replace(n, NodeKind::IntLit { value: width, big: None });
                self.s.types.universal_integer
            }
            "base" => self.s.types.base_of(prefix_ty),
            "constrained" => {
                let value = if static_bounds { 1 } else { 0 };
                self.s.ast.replace(n, NodeKind::IntLit { value, big: None });
                self.s.types.boolean
            }
            "callable" | "terminated" => self.s.types.boolean,
            "count" => self.s.types.universal_integer,
            "access" => {
                let mut acc = TypeInfo::new(TypeKind::Access);
                acc.elem = Some(prefix_ty);
                acc.size_bits = 64;
                acc.align_bits = 64;
                self.s.types.alloc(acc)
            }
            "storage_size" => {
                self.s.ast.replace(n, NodeKind::IntLit { value: 0, big: None });
                self.s.types.universal_integer
            }
            "position" | "first_bit" | "last_bit" => {
                let offset = self
                    .s
                    .ast
                    .sym(prefix)
                    .map(|sym| self.s.syms.get(sym).offset)
                    .unwrap_or(0);
                let value = match attr_name.as_str() {
                    "position" => offset,
                    "first_bit" => 0,
                    _ => 63,
                };
                self.s.ast.replace(n, NodeKind::IntLit { value, big: None });
                self.s.types.universal_integer
            }
            _ => {
                let loc = self.s.ast.loc(n);
                self.error(loc, &format!("unknown attribute '{}'", attr_name));
                self.s.types.integer
            }
        }
    }

    // ----- checks and static evaluation -----

    /// Wrap `n` in a range check against the target subtype when the
    /// subtype narrows its base and the check is not suppressed. Statically
    /// in-range values skip the check; statically out-of-range values keep
    /// it, so the violation raises at run time.
    pub fn chk(&mut self, n: NodeId, target: TypeId) -> NodeId {
        let info = self.s.types.get(target);
        if info.suppress.contains(SuppressMask::RANGE_CHECK)
            || self.s.suppress_all.contains(SuppressMask::RANGE_CHECK)
        {
            return n;
        }
        if !self.s.types.is_discrete(target) && !self.s.types.is_real(target) {
            return n;
        }
        let (lo, hi) = self.s.types.bounds(target);
        let base = self.s.types.base_of(target);
        let (blo, bhi) = self.s.types.bounds(base);
        if lo == blo && hi == bhi {
            return n;
        }
        if let Some(v) = self.static_i64(n) {
            if v >= lo && v <= hi {
                return n;
            }
        }
        let loc = self.s.ast.loc(n);
        let check = self.s.ast.alloc(
            NodeKind::Check {
                check: CheckKind::Range,
                expr: n,
                lo,
                hi,
            },
            loc,
        );
        self.s.ast.set_ty(check, target);
        check
    }

    fn index_chk(&mut self, n: NodeId, array_ty: TypeId, index_ty: TypeId) -> NodeId {
        if self
            .s
            .types
            .get(array_ty)
            .suppress
            .contains(SuppressMask::INDEX_CHECK)
            || self.s.suppress_all.contains(SuppressMask::INDEX_CHECK)
        {
            return n;
        }
        if self.s.types.is_unconstrained_array(array_ty) {
            // Bounds live in the fat pointer; the emitter checks there.
            return n;
        }
        let (lo, hi) = self.s.types.bounds(array_ty);
        if let Some(v) = self.static_i64(n) {
            if v >= lo && v <= hi {
                return n;
            }
        }
        let loc = self.s.ast.loc(n);
        let check = self.s.ast.alloc(
            NodeKind::Check {
                check: CheckKind::Index,
                expr: n,
                lo,
                hi,
            },
            loc,
        );
        self.s.ast.set_ty(check, index_ty);
        check
    }

    pub fn static_i64(&self, n: NodeId) -> Option<i64> {
        match self.s.ast.kind(n) {
            NodeKind::IntLit { value, big } => match big {
                Some(b) => b.to_i64(),
                None => Some(*value),
            },
            NodeKind::CharLit(c) => Some(*c as i64),
            NodeKind::Ident(_) | NodeKind::Selected { .. } => {
                let sym = self.s.ast.sym(n)?;
                let s = self.s.syms.get(sym);
                match s.kind {
                    SymKind::EnumLiteral => Some(s.value),
                    SymKind::Variable if s.constant => {
                        // Only named numbers and folded constants carry a
                        // static value.
                        let decl = s.decl?;
                        match self.s.ast.kind(decl) {
                            NodeKind::NumberDecl { .. } => Some(s.value),
                            NodeKind::ObjectDecl { init: Some(i), .. } => self.static_i64(*i),
                            _ => None,
                        }
                    }
                    _ => None,
                }
            }
            NodeKind::Qualified { expr, .. } => self.static_i64(*expr),
            NodeKind::Check { expr, .. } => self.static_i64(*expr),
            NodeKind::Conversion { expr, .. } => self.static_i64(*expr),
            _ => None,
        }
    }

    fn static_big(&self, n: NodeId) -> Option<BigInt> {
        match self.s.ast.kind(n) {
            NodeKind::IntLit { value, big } => {
                Some(big.clone().unwrap_or_else(|| BigInt::from_i64(*value)))
            }
            _ => self.static_i64(n).map(BigInt::from_i64),
        }
    }

    fn static_real(&self, n: NodeId) -> Option<f64> {
        match self.s.ast.kind(n) {
            NodeKind::RealLit(v) => Some(*v),
            NodeKind::Qualified { expr, .. } => self.static_real(*expr),
            _ => None,
        }
    }

    fn static_range(&mut self, range: NodeId) -> (Option<i64>, Option<i64>) {
        match self.s.ast.kind(range).clone() {
            NodeKind::RangeExpr { lo, hi } => {
                self.resolve_expr(lo, None);
                self.resolve_expr(hi, None);
                (self.static_i64(lo), self.static_i64(hi))
            }
            NodeKind::Attr { .. } => {
                let ty = self.resolve_expr(range, None);
                let (lo, hi) = self.s.types.bounds(ty);
                (Some(lo), Some(hi))
            }
            NodeKind::IntLit { .. } => {
                let v = self.static_i64(range);
                (v, v)
            }
            _ => {
                let ty = self.resolve_expr(range, None);
                let (lo, hi) = self.s.types.bounds(ty);
                (Some(lo), Some(hi))
            }
        }
    }
}

fn operator_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Cat => "&",
        BinOp::Eq => "=",
        BinOp::Neq => "/=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Mod => "mod",
        BinOp::Rem => "rem",
        BinOp::Pow => "**",
        BinOp::And | BinOp::AndThen => "and",
        BinOp::Or | BinOp::OrElse => "or",
        BinOp::Xor => "xor",
    }
}

fn fold_int(op: BinOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        BinOp::Add => a.checked_add(b)?,
        BinOp::Sub => a.checked_sub(b)?,
        BinOp::Mul => a.checked_mul(b)?,
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            a.checked_div(b)?
        }
        BinOp::Mod => {
            if b == 0 {
                return None;
            }
            a.rem_euclid(b)
        }
        BinOp::Rem => {
            if b == 0 {
                return None;
            }
            a % b
        }
        BinOp::Pow => {
            if !(0..=63).contains(&b) {
                return None;
            }
            a.checked_pow(b as u32)?
        }
        BinOp::Eq => (a == b) as i64,
        BinOp::Neq => (a != b) as i64,
        BinOp::Lt => (a < b) as i64,
        BinOp::Le => (a <= b) as i64,
        BinOp::Gt => (a > b) as i64,
        BinOp::Ge => (a >= b) as i64,
        _ => return None,
    })
}

fn fold_big(op: BinOp, a: &BigInt, b: &BigInt) -> Option<BigInt> {
    Some(match op {
        BinOp::Add => a.add(b),
        BinOp::Sub => a.sub(b),
        BinOp::Mul => a.mul(b),
        _ => return None,
    })
}

fn fold_real(op: BinOp, a: f64, b: f64) -> Option<f64> {
    Some(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return None;
            }
            a / b
        }
        BinOp::Pow => a.powf(b),
        _ => return None,
    })
}

fn decimal_width(lo: i64, hi: i64) -> i64 {
    let digits = |v: i64| -> i64 {
        let mut n = v.unsigned_abs();
        let mut w = 1;
        while n >= 10 {
            n /= 10;
            w += 1;
        }
        w + if v < 0 { 1 } else { 0 }
    };
    // One leading position for the sign or space, as IMAGE formats it.
    digits(lo).max(digits(hi)) + 1
}

fn kind_name(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::CompUnit { .. } => "compilation unit",
        NodeKind::PragmaNode { .. } => "pragma",
        _ => "declaration",
    }
}
