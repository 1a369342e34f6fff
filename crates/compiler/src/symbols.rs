//! Symbol table and scope manager
//!
//! A 4096-bucket open hash keyed on FNV-1a of the lowercased name. Each
//! bucket is a singly-linked chain threaded through the symbols themselves;
//! the chain head is the most recently added symbol, so walking a chain
//! visits inner declarations before outer ones.
//!
//! Visibility is two explicit bits per symbol (immediate, use-visible).
//! Scope exit is a list walk from the insertion point recorded at scope
//! entry: it clears the immediate bit without unlinking, so hidden names
//! stay reachable through fully qualified selection.

use crate::ast::{NodeId, ParamMode};
use crate::intern::{fnv1a_lower, NameId, NameTable};
use crate::types::{TypeId, TypeTable};
use bitflags::bitflags;

pub const BUCKET_COUNT: usize = 4096;

/// Guard size for `use`-clause re-entry over circular `with` graphs.
const USE_VISITED_LIMIT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(pub u32);

bitflags! {
    /// Bit 0: immediately visible; bit 1: visible through a `use` clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Visibility: u8 {
        const IMMEDIATE = 0b01;
        const USE_VISIBLE = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    Variable,
    Type,
    Exception,
    Procedure,
    Function,
    Package,
    Task,
    Discriminant,
    Component,
    EnumLiteral,
    Entry,
    Label,
    GenericTemplate,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: NameId,
    pub kind: SymKind,
    pub ty: Option<TypeId>,
    pub decl: Option<NodeId>,
    /// Next symbol in the same hash bucket.
    pub next: Option<SymId>,
    /// Most recent earlier symbol with the same name (homograph chain).
    pub prev_homograph: Option<SymId>,
    pub scope: u32,
    pub subscope: u32,
    /// Static value for constants and enumeration literals.
    pub value: i64,
    /// Byte offset for record components.
    pub offset: i64,
    pub elab_order: u32,
    pub uid: u32,
    /// Lexical nesting level (library level = 0).
    pub level: u32,
    /// Enclosing package or subprogram.
    pub parent: Option<SymId>,
    /// Generic template declaration for templates and instances.
    pub template: Option<NodeId>,
    pub visibility: Visibility,
    pub constant: bool,
    pub inlined: bool,
    pub shared: bool,
    pub external: bool,
    pub ext_name: Option<String>,
    pub ext_lang: Option<String>,
    /// Formal parameter types, for overload scoring and mangling.
    pub params: Vec<TypeId>,
    /// Formal parameter declaration nodes.
    pub param_nodes: Vec<NodeId>,
    pub ret: Option<TypeId>,
    /// Passing mode when this symbol is a formal parameter.
    pub mode: Option<ParamMode>,
}

impl Symbol {
    pub fn new(name: NameId, kind: SymKind) -> Self {
        Symbol {
            name,
            kind,
            ty: None,
            decl: None,
            next: None,
            prev_homograph: None,
            scope: 0,
            subscope: 0,
            value: 0,
            offset: 0,
            elab_order: 0,
            uid: 0,
            level: 0,
            parent: None,
            template: None,
            visibility: Visibility::IMMEDIATE,
            constant: false,
            inlined: false,
            shared: false,
            external: false,
            ext_name: None,
            ext_lang: None,
            params: Vec::new(),
            param_nodes: Vec::new(),
            ret: None,
            mode: None,
        }
    }

    pub fn is_subprogram(&self) -> bool {
        matches!(self.kind, SymKind::Procedure | SymKind::Function)
    }
}

#[derive(Debug)]
struct ScopeFrame {
    /// Insertion point at entry; exit walks forward from here.
    first_sym: usize,
    /// Symbols granted use-visibility while this scope was open.
    use_granted: Vec<SymId>,
    /// Packages already applied by a `use` clause in this scope.
    use_visited: Vec<SymId>,
    /// Symbols granted immediate visibility by reopening a package.
    reopened: Vec<SymId>,
}

#[derive(Debug)]
pub struct SymbolTable {
    syms: Vec<Symbol>,
    buckets: Vec<Option<SymId>>,
    frames: Vec<ScopeFrame>,
    pub scope: u32,
    pub subscope: u32,
    next_elab: u32,
    next_uid: u32,
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            syms: Vec::new(),
            buckets: vec![None; BUCKET_COUNT],
            frames: vec![ScopeFrame {
                first_sym: 0,
                use_granted: Vec::new(),
                use_visited: Vec::new(),
                reopened: Vec::new(),
            }],
            scope: 0,
            subscope: 0,
            next_elab: 0,
            next_uid: 0,
        }
    }

    pub fn get(&self, id: SymId) -> &Symbol {
        &self.syms[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymId) -> &mut Symbol {
        &mut self.syms[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }

    fn bucket_index(&self, name: NameId, names: &NameTable) -> usize {
        (fnv1a_lower(names.lower(name)) as usize) % BUCKET_COUNT
    }

    /// Push a symbol onto its bucket chain; assigns scope, sub-scope,
    /// elaboration order, uid and immediate visibility.
    pub fn add_overload(&mut self, mut sym: Symbol, names: &NameTable) -> SymId {
        let bucket = self.bucket_index(sym.name, names);
        let id = SymId(self.syms.len() as u32);
        sym.next = self.buckets[bucket];
        sym.prev_homograph = self.find_any(sym.name, names);
        sym.scope = self.scope;
        sym.subscope = self.subscope;
        sym.elab_order = self.next_elab;
        sym.uid = self.next_uid;
        sym.visibility = Visibility::IMMEDIATE;
        self.next_elab += 1;
        self.next_uid += 1;
        self.buckets[bucket] = Some(id);
        self.syms.push(sym);
        id
    }

    /// Entering a declarative region increments scope and sub-scope and
    /// records the insertion point for the matching exit.
    pub fn enter_scope(&mut self) {
        self.scope += 1;
        self.subscope += 1;
        self.frames.push(ScopeFrame {
            first_sym: self.syms.len(),
            use_granted: Vec::new(),
            use_visited: Vec::new(),
            reopened: Vec::new(),
        });
    }

    /// Exit walks forward from the saved insertion point clearing the
    /// immediate bit on declarations of the exited scope, and revokes any
    /// use-visibility granted inside it. Symbols are never unlinked.
    pub fn exit_scope(&mut self) {
        let frame = self.frames.pop().expect("scope underflow");
        let exited = self.scope;
        for sym in self.syms[frame.first_sym..].iter_mut() {
            if sym.scope == exited {
                sym.visibility.remove(Visibility::IMMEDIATE);
            }
        }
        for id in frame.use_granted {
            self.syms[id.0 as usize]
                .visibility
                .remove(Visibility::USE_VISIBLE);
        }
        for id in frame.reopened {
            self.syms[id.0 as usize]
                .visibility
                .remove(Visibility::IMMEDIATE);
        }
        self.scope -= 1;
    }

    /// Plain lookup: prefer the innermost immediately visible homograph,
    /// fall back to use-visible, then to any homograph (hidden names stay
    /// reachable through qualified selection).
    pub fn find(&self, name: NameId, names: &NameTable) -> Option<SymId> {
        let mut cur = self.buckets[self.bucket_index(name, names)];
        let mut use_vis: Option<SymId> = None;
        let mut any: Option<SymId> = None;
        while let Some(id) = cur {
            let sym = self.get(id);
            if sym.name == name {
                if sym.visibility.contains(Visibility::IMMEDIATE) {
                    return Some(id);
                }
                if use_vis.is_none() && sym.visibility.contains(Visibility::USE_VISIBLE) {
                    use_vis = Some(id);
                }
                if any.is_none() {
                    any = Some(id);
                }
            }
            cur = sym.next;
        }
        use_vis.or(any)
    }

    fn find_any(&self, name: NameId, names: &NameTable) -> Option<SymId> {
        let mut cur = self.buckets[self.bucket_index(name, names)];
        while let Some(id) = cur {
            if self.get(id).name == name {
                return Some(id);
            }
            cur = self.get(id).next;
        }
        None
    }

    /// All visible homographs of `name`, innermost first.
    pub fn homographs(&self, name: NameId, names: &NameTable) -> Vec<SymId> {
        let mut out = Vec::new();
        let mut cur = self.buckets[self.bucket_index(name, names)];
        while let Some(id) = cur {
            if self.get(id).name == name {
                out.push(id);
            }
            cur = self.get(id).next;
        }
        out
    }

    /// Lookup of `name` declared directly inside `owner` (selected
    /// components of packages and tasks).
    pub fn find_in(&self, owner: SymId, name: NameId, names: &NameTable) -> Option<SymId> {
        let mut cur = self.buckets[self.bucket_index(name, names)];
        while let Some(id) = cur {
            let sym = self.get(id);
            if sym.name == name && sym.parent == Some(owner) {
                return Some(id);
            }
            cur = sym.next;
        }
        None
    }

    /// Overloads of `name` declared directly inside `owner`.
    pub fn find_all_in(&self, owner: SymId, name: NameId, names: &NameTable) -> Vec<SymId> {
        let mut out = Vec::new();
        let mut cur = self.buckets[self.bucket_index(name, names)];
        while let Some(id) = cur {
            let sym = self.get(id);
            if sym.name == name && sym.parent == Some(owner) {
                out.push(id);
            }
            cur = sym.next;
        }
        out
    }

    /// Elaborating `use P` grants use-visibility to every declaration of
    /// the package. Re-entry over a circular `with` graph is tolerated by
    /// a bounded visited set per scope.
    pub fn apply_use(&mut self, pkg: SymId) {
        let frame = self.frames.last_mut().expect("no open scope");
        if frame.use_visited.contains(&pkg) || frame.use_visited.len() >= USE_VISITED_LIMIT {
            return;
        }
        frame.use_visited.push(pkg);
        let mut granted = Vec::new();
        for (i, sym) in self.syms.iter_mut().enumerate() {
            if sym.parent == Some(pkg) && !sym.visibility.contains(Visibility::USE_VISIBLE) {
                sym.visibility.insert(Visibility::USE_VISIBLE);
                granted.push(SymId(i as u32));
            }
        }
        self.frames
            .last_mut()
            .expect("no open scope")
            .use_granted
            .extend(granted);
    }

    /// Add an alias symbol that keeps the target's identity fields (uid,
    /// elaboration order, offset, externals) while binding a new name in
    /// the current scope. Renaming declarations use this so both names
    /// reach the same object or code.
    pub fn add_overload_alias(&mut self, mut sym: Symbol, names: &NameTable) -> SymId {
        let bucket = self.bucket_index(sym.name, names);
        let id = SymId(self.syms.len() as u32);
        sym.next = self.buckets[bucket];
        sym.prev_homograph = self.find_any(sym.name, names);
        sym.scope = self.scope;
        sym.subscope = self.subscope;
        sym.visibility = Visibility::IMMEDIATE;
        self.buckets[bucket] = Some(id);
        self.syms.push(sym);
        id
    }

    /// Entering a package body makes the specification's declarations
    /// immediately visible again; the grant is revoked at scope exit.
    pub fn reopen_package(&mut self, pkg: SymId) {
        let mut granted = Vec::new();
        for (i, sym) in self.syms.iter_mut().enumerate() {
            if sym.parent == Some(pkg) && !sym.visibility.contains(Visibility::IMMEDIATE) {
                sym.visibility.insert(Visibility::IMMEDIATE);
                granted.push(SymId(i as u32));
            }
        }
        self.frames
            .last_mut()
            .expect("no open scope")
            .reopened
            .extend(granted);
    }

    /// Overload selection: filter homographs of `name` by formal-parameter
    /// count, then score each candidate by type-match distance between the
    /// expected type / argument types and the candidate's return / formal
    /// types. Best score wins; ties resolve to the earliest declared.
    pub fn find_with_arity(
        &self,
        name: NameId,
        arity: usize,
        expected: Option<TypeId>,
        arg_tys: &[Option<TypeId>],
        types: &TypeTable,
        names: &NameTable,
    ) -> Option<SymId> {
        let mut best: Option<(u32, u32, SymId)> = None;
        for id in self.homographs(name, names) {
            let sym = self.get(id);
            let callable = matches!(
                sym.kind,
                SymKind::Procedure | SymKind::Function | SymKind::EnumLiteral | SymKind::Entry
            );
            if !callable {
                continue;
            }
            let formal_count = sym.params.len();
            if formal_count != arity {
                continue;
            }
            let mut score: u32 = 1;
            if let (Some(exp), Some(ret)) = (expected, sym.ret.or(sym.ty)) {
                score += types.match_score(exp, ret);
            }
            for (i, arg) in arg_tys.iter().enumerate() {
                if let (Some(at), Some(&ft)) = (arg, sym.params.get(i)) {
                    score += types.match_score(ft, *at);
                }
            }
            let better = match best {
                None => true,
                Some((bs, buid, _)) => score > bs || (score == bs && sym.uid < buid),
            };
            if better {
                best = Some((score, sym.uid, id));
            }
        }
        best.map(|(_, _, id)| id)
    }

    /// Monotone elaboration counter, exposed for `.ali` summaries.
    pub fn elab_count(&self) -> u32 {
        self.next_elab
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (SymbolTable, NameTable) {
        (SymbolTable::new(), NameTable::new())
    }

    #[test]
    fn test_scope_exit_clears_immediate_visibility() {
        let (mut syms, mut names) = table();
        let n = names.intern("x");
        syms.enter_scope();
        let id = syms.add_overload(Symbol::new(n, SymKind::Variable), &names);
        assert!(syms.get(id).visibility.contains(Visibility::IMMEDIATE));
        assert_eq!(syms.find(n, &names), Some(id));
        syms.exit_scope();
        assert!(!syms.get(id).visibility.contains(Visibility::IMMEDIATE));
        // Hidden symbol is still reachable as a fallback.
        assert_eq!(syms.find(n, &names), Some(id));
    }

    #[test]
    fn test_inner_declaration_hides_outer() {
        let (mut syms, mut names) = table();
        let n = names.intern("x");
        let outer = syms.add_overload(Symbol::new(n, SymKind::Variable), &names);
        syms.enter_scope();
        let inner = syms.add_overload(Symbol::new(n, SymKind::Variable), &names);
        assert_eq!(syms.find(n, &names), Some(inner));
        assert_eq!(syms.get(inner).prev_homograph, Some(outer));
        syms.exit_scope();
        assert_eq!(syms.find(n, &names), Some(outer));
    }

    #[test]
    fn test_use_visibility_granted_and_revoked() {
        let (mut syms, mut names) = table();
        let pkg_name = names.intern("p");
        let item_name = names.intern("item");
        let pkg = syms.add_overload(Symbol::new(pkg_name, SymKind::Package), &names);
        let mut item = Symbol::new(item_name, SymKind::Variable);
        item.parent = Some(pkg);
        let item = syms.add_overload(item, &names);
        // Simulate leaving the package declarative region.
        syms.get_mut(item).visibility = Visibility::empty();

        syms.enter_scope();
        syms.apply_use(pkg);
        assert!(syms.get(item).visibility.contains(Visibility::USE_VISIBLE));
        assert_eq!(syms.find(item_name, &names), Some(item));
        syms.exit_scope();
        assert!(!syms.get(item).visibility.contains(Visibility::USE_VISIBLE));
    }

    #[test]
    fn test_elaboration_order_is_monotone() {
        let (mut syms, mut names) = table();
        let a = names.intern("a");
        let b = names.intern("b");
        let ia = syms.add_overload(Symbol::new(a, SymKind::Variable), &names);
        let ib = syms.add_overload(Symbol::new(b, SymKind::Variable), &names);
        assert!(syms.get(ia).elab_order < syms.get(ib).elab_order);
    }
}
