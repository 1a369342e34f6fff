//! Abstract syntax tree for Ada 83
//!
//! A single tagged `NodeKind` covers expressions, type definitions,
//! declarations, statements and structural nodes. Nodes live in an index
//! arena (`Ast`): every reference between subtrees is a `NodeId`, nodes are
//! never freed, and generic instantiation produces structurally independent
//! copies by allocating fresh indices.
//!
//! Every node carries its source location plus two annotation slots filled
//! by semantic analysis: the resolved type and, where applicable, the
//! resolved symbol.

use crate::bigint::BigInt;
use crate::diagnostics::Loc;
use crate::intern::NameId;
use crate::symbols::SymId;
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    AndThen,
    Or,
    OrElse,
    Xor,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Cat,
    Mul,
    Div,
    Mod,
    Rem,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Plus,
    Minus,
    Not,
    Abs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

/// Iteration scheme of a loop statement.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopScheme {
    Bare,
    While {
        cond: NodeId,
    },
    For {
        var: NameId,
        reverse: bool,
        range: NodeId,
    },
}

/// Which runtime failure a `Check` node raises when the test fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Range,
    Index,
    Discriminant,
    Division,
    Access,
}

impl CheckKind {
    /// Predefined exception raised when the check fails.
    pub fn exception_name(self) -> &'static str {
        "CONSTRAINT_ERROR"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // ----- Expressions -----
    Ident(NameId),
    IntLit {
        value: i64,
        big: Option<BigInt>,
    },
    RealLit(f64),
    CharLit(char),
    StrLit(String),
    NullLit,
    OthersMark,
    /// Array or record aggregate; shape decided during resolution.
    Aggregate {
        assocs: Vec<NodeId>,
    },
    Binary {
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnOp,
        operand: NodeId,
    },
    /// Attribute reference `prefix'Name` or `prefix'Name(args)`.
    Attr {
        prefix: NodeId,
        attr: NameId,
        args: Vec<NodeId>,
    },
    /// Qualified expression `Mark'(expr)`.
    Qualified {
        mark: NodeId,
        expr: NodeId,
    },
    /// Call or indexing before resolution; calls after resolution.
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    /// Array indexing, produced from `Call` by resolution.
    Index {
        prefix: NodeId,
        indexes: Vec<NodeId>,
    },
    Slice {
        prefix: NodeId,
        range: NodeId,
    },
    Selected {
        prefix: NodeId,
        field: NameId,
    },
    /// Explicit dereference `prefix.all`.
    Deref {
        prefix: NodeId,
    },
    Allocator {
        subtype: NodeId,
        init: Option<NodeId>,
    },
    RangeExpr {
        lo: NodeId,
        hi: NodeId,
    },
    /// Type conversion, produced from `Call` when the callee names a type.
    Conversion {
        target: NodeId,
        expr: NodeId,
    },
    Membership {
        expr: NodeId,
        target: NodeId,
        negated: bool,
    },
    /// Constraint check inserted by semantic analysis; expands to a test
    /// and a conditional raise in the emitter.
    Check {
        check: CheckKind,
        expr: NodeId,
        lo: i64,
        hi: i64,
    },

    // ----- Type definitions -----
    IntRangeDef {
        range: NodeId,
    },
    EnumDef {
        literals: Vec<NodeId>,
    },
    /// One defining enumeration literal: an identifier or character literal.
    EnumLit {
        name: Option<NameId>,
        ch: Option<char>,
    },
    FloatDef {
        digits: Option<NodeId>,
        range: Option<NodeId>,
    },
    FixedDef {
        delta: NodeId,
        range: Option<NodeId>,
    },
    ArrayDef {
        indexes: Vec<NodeId>,
        elem: NodeId,
        unconstrained: bool,
    },
    RecordDef {
        components: Vec<NodeId>,
        variant: Option<NodeId>,
    },
    VariantPart {
        discr: NameId,
        variants: Vec<NodeId>,
    },
    Variant {
        choices: Vec<NodeId>,
        components: Vec<NodeId>,
    },
    AccessDef {
        designated: NodeId,
    },
    DerivedDef {
        parent: NodeId,
    },
    PrivateDef {
        limited: bool,
    },
    /// Subtype indication: a type mark with an optional constraint.
    SubtypeInd {
        mark: NodeId,
        constraint: Option<NodeId>,
    },
    RangeConstraint {
        range: NodeId,
    },
    IndexConstraint {
        ranges: Vec<NodeId>,
    },
    DiscrConstraint {
        assocs: Vec<NodeId>,
    },
    DigitsConstraint {
        digits: NodeId,
        range: Option<NodeId>,
    },
    DeltaConstraint {
        delta: NodeId,
        range: Option<NodeId>,
    },

    // ----- Declarations -----
    ObjectDecl {
        names: Vec<NameId>,
        subtype: NodeId,
        init: Option<NodeId>,
        constant: bool,
    },
    /// Named number `N : constant := static_expr;`
    NumberDecl {
        names: Vec<NameId>,
        expr: NodeId,
    },
    TypeDecl {
        name: NameId,
        discriminants: Vec<NodeId>,
        def: Option<NodeId>,
    },
    SubtypeDecl {
        name: NameId,
        ind: NodeId,
    },
    ExceptionDecl {
        names: Vec<NameId>,
    },
    Renaming {
        name: NameId,
        /// `exception`, a subprogram spec, or a subtype mark.
        spec: Option<NodeId>,
        target: NodeId,
    },
    Param {
        names: Vec<NameId>,
        mode: ParamMode,
        subtype: NodeId,
        default: Option<NodeId>,
    },
    SubprogSpec {
        name: NameId,
        params: Vec<NodeId>,
        ret: Option<NodeId>,
        is_function: bool,
    },
    /// Subprogram declaration (specification followed by `;`).
    SubprogDecl {
        spec: NodeId,
    },
    SubprogBody {
        spec: NodeId,
        decls: Vec<NodeId>,
        stmts: Vec<NodeId>,
        handlers: Vec<NodeId>,
    },
    /// Body stub `... is separate;`
    BodyStub {
        spec: NodeId,
    },
    PackageSpec {
        name: NameId,
        visible: Vec<NodeId>,
        private: Vec<NodeId>,
    },
    PackageBody {
        name: NameId,
        decls: Vec<NodeId>,
        stmts: Vec<NodeId>,
        handlers: Vec<NodeId>,
    },
    TaskSpec {
        name: NameId,
        is_type: bool,
        entries: Vec<NodeId>,
    },
    TaskBody {
        name: NameId,
        decls: Vec<NodeId>,
        stmts: Vec<NodeId>,
        handlers: Vec<NodeId>,
    },
    EntryDecl {
        name: NameId,
        family: Option<NodeId>,
        params: Vec<NodeId>,
    },
    GenericDecl {
        formals: Vec<NodeId>,
        unit: NodeId,
    },
    GenericFormalType {
        name: NameId,
        /// `None` for `is private`; otherwise a definition node.
        def: Option<NodeId>,
    },
    GenericFormalObject {
        names: Vec<NameId>,
        mode: ParamMode,
        subtype: NodeId,
        default: Option<NodeId>,
    },
    GenericFormalSubprog {
        spec: NodeId,
        /// `<>` default or a default name.
        default: Option<NodeId>,
    },
    Instantiation {
        name: NameId,
        is_function: bool,
        is_package: bool,
        template: NodeId,
        actuals: Vec<NodeId>,
    },
    /// `for Name use expr;` (address / size / enum aggregate) or
    /// `for Name use record ... end record;`
    RepClause {
        target: NodeId,
        /// `at` expression, aggregate, or a `RecordRep` node.
        value: NodeId,
    },
    RecordRep {
        align: Option<NodeId>,
        components: Vec<NodeId>,
    },
    RecordRepComp {
        name: NameId,
        offset: NodeId,
        range: NodeId,
    },
    PragmaNode {
        name: NameId,
        args: Vec<NodeId>,
    },

    // ----- Statements -----
    Assign {
        target: NodeId,
        value: NodeId,
    },
    IfStmt {
        arms: Vec<NodeId>,
        else_stmts: Vec<NodeId>,
    },
    IfArm {
        cond: NodeId,
        stmts: Vec<NodeId>,
    },
    CaseStmt {
        expr: NodeId,
        alts: Vec<NodeId>,
    },
    CaseAlt {
        choices: Vec<NodeId>,
        stmts: Vec<NodeId>,
    },
    LoopStmt {
        label: Option<NameId>,
        scheme: LoopScheme,
        stmts: Vec<NodeId>,
    },
    BlockStmt {
        label: Option<NameId>,
        decls: Vec<NodeId>,
        stmts: Vec<NodeId>,
        handlers: Vec<NodeId>,
    },
    ExitStmt {
        label: Option<NameId>,
        cond: Option<NodeId>,
    },
    ReturnStmt {
        expr: Option<NodeId>,
    },
    GotoStmt {
        label: NameId,
    },
    /// `<<label>>` in a statement sequence.
    LabelMark {
        label: NameId,
    },
    RaiseStmt {
        name: Option<NodeId>,
    },
    NullStmt,
    /// Machine-code insertion; parsed, ignored by the emitter.
    CodeStmt {
        expr: NodeId,
    },
    AcceptStmt {
        name: NameId,
        index: Option<NodeId>,
        params: Vec<NodeId>,
        stmts: Vec<NodeId>,
    },
    SelectStmt {
        alts: Vec<NodeId>,
        else_stmts: Vec<NodeId>,
    },
    SelectAlt {
        guard: Option<NodeId>,
        stmts: Vec<NodeId>,
    },
    DelayStmt {
        expr: NodeId,
    },
    AbortStmt {
        names: Vec<NodeId>,
    },

    // ----- Structural -----
    CompUnit {
        context: Vec<NodeId>,
        separate_parent: Option<NodeId>,
        unit: NodeId,
    },
    WithClause {
        names: Vec<NodeId>,
    },
    UseClause {
        names: Vec<NodeId>,
    },
    Handler {
        choices: Vec<NodeId>,
        stmts: Vec<NodeId>,
    },
    /// Association `choice => value`; positional when `choices` is empty.
    Assoc {
        choices: Vec<NodeId>,
        value: NodeId,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: Loc,
    pub ty: Option<TypeId>,
    pub sym: Option<SymId>,
}

/// Index arena of AST nodes. Allocation only; nodes live for the whole
/// compilation.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    pub fn alloc(&mut self, kind: NodeKind, loc: Loc) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            loc,
            ty: None,
            sym: None,
        });
        id
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0 as usize].kind
    }

    /// Rewrite a node in place; static folding replaces operator nodes with
    /// literal nodes so downstream consumers see a literal.
    pub fn replace(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id.0 as usize].kind = kind;
    }

    pub fn loc(&self, id: NodeId) -> Loc {
        self.nodes[id.0 as usize].loc
    }

    pub fn ty(&self, id: NodeId) -> Option<TypeId> {
        self.nodes[id.0 as usize].ty
    }

    pub fn set_ty(&mut self, id: NodeId, ty: TypeId) {
        self.nodes[id.0 as usize].ty = Some(ty);
    }

    pub fn sym(&self, id: NodeId) -> Option<SymId> {
        self.nodes[id.0 as usize].sym
    }

    pub fn set_sym(&mut self, id: NodeId, sym: SymId) {
        self.nodes[id.0 as usize].sym = Some(sym);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_annotate() {
        let mut ast = Ast::new();
        let n = ast.alloc(NodeKind::NullStmt, Loc::none());
        assert!(ast.ty(n).is_none());
        ast.set_ty(n, TypeId(3));
        assert_eq!(ast.ty(n), Some(TypeId(3)));
    }

    #[test]
    fn test_replace_rewrites_in_place() {
        let mut ast = Ast::new();
        let lhs = ast.alloc(NodeKind::IntLit { value: 2, big: None }, Loc::none());
        let rhs = ast.alloc(NodeKind::IntLit { value: 3, big: None }, Loc::none());
        let bin = ast.alloc(
            NodeKind::Binary {
                op: BinOp::Add,
                lhs,
                rhs,
            },
            Loc::none(),
        );
        ast.replace(bin, NodeKind::IntLit { value: 5, big: None });
        match ast.kind(bin) {
            NodeKind::IntLit { value, .. } => assert_eq!(*value, 5),
            other => panic!("expected folded literal, got {:?}", other),
        }
    }
}
