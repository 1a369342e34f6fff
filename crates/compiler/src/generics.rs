//! Generics engine: deep AST cloning with formal-to-actual substitution
//!
//! Instantiation clones the template's declaration (and body, when one
//! exists) into structurally independent nodes, replacing every identifier
//! whose name matches a generic formal with a copy of the corresponding
//! actual. The clone then runs through the normal resolution path as if it
//! had been written textually.
//!
//! A depth counter bounds pathological recursion at 1000 levels.

use crate::ast::{Ast, NodeId, NodeKind};
use crate::intern::NameId;
use std::collections::HashMap;

pub const MAX_CLONE_DEPTH: u32 = 1000;

/// Deep-clone `node`, substituting formals for actuals.
pub fn clone_substitute(
    ast: &mut Ast,
    node: NodeId,
    subst: &HashMap<NameId, NodeId>,
    depth: u32,
) -> Result<NodeId, String> {
    clone_with(ast, node, Some(subst), depth)
}

/// Deep-clone `node` with no substitution (used for actuals themselves, so
/// an actual that happens to spell a formal name is not rewritten again).
pub fn deep_clone(ast: &mut Ast, node: NodeId, depth: u32) -> Result<NodeId, String> {
    clone_with(ast, node, None, depth)
}

fn clone_list(
    ast: &mut Ast,
    list: &[NodeId],
    subst: Option<&HashMap<NameId, NodeId>>,
    depth: u32,
) -> Result<Vec<NodeId>, String> {
    list.iter()
        .map(|&n| clone_with(ast, n, subst, depth))
        .collect()
}

fn clone_opt(
    ast: &mut Ast,
    node: Option<NodeId>,
    subst: Option<&HashMap<NameId, NodeId>>,
    depth: u32,
) -> Result<Option<NodeId>, String> {
    match node {
        Some(n) => Ok(Some(clone_with(ast, n, subst, depth)?)),
        None => Ok(None),
    }
}

fn clone_with(
    ast: &mut Ast,
    node: NodeId,
    subst: Option<&HashMap<NameId, NodeId>>,
    depth: u32,
) -> Result<NodeId, String> {
    if depth > MAX_CLONE_DEPTH {
        return Err("generic instantiation exceeds maximum nesting depth".to_string());
    }
    let d = depth + 1;
    let loc = ast.loc(node);
    let kind = ast.kind(node).clone();

    // Substitute a formal with an independent copy of its actual.
    if let NodeKind::Ident(name) = &kind {
        let name = *name;
        if let Some(map) = subst {
            if let Some(&actual) = map.get(&name) {
                return deep_clone(ast, actual, d);
            }
        }
        return Ok(ast.alloc(NodeKind::Ident(name), loc));
    }

    use NodeKind::*;
    let cloned = match kind {
        Ident(_) => unreachable!("handled above"),
        IntLit { value, big } => IntLit { value, big },
        RealLit(v) => RealLit(v),
        CharLit(c) => CharLit(c),
        StrLit(s) => StrLit(s),
        NullLit => NullLit,
        OthersMark => OthersMark,
        Aggregate { assocs } => Aggregate {
            assocs: clone_list(ast, &assocs, subst, d)?,
        },
        Binary { op, lhs, rhs } => Binary {
            op,
            lhs: clone_with(ast, lhs, subst, d)?,
            rhs: clone_with(ast, rhs, subst, d)?,
        },
        Unary { op, operand } => Unary {
            op,
            operand: clone_with(ast, operand, subst, d)?,
        },
        Attr { prefix, attr, args } => Attr {
            prefix: clone_with(ast, prefix, subst, d)?,
            attr,
            args: clone_list(ast, &args, subst, d)?,
        },
        Qualified { mark, expr } => Qualified {
            mark: clone_with(ast, mark, subst, d)?,
            expr: clone_with(ast, expr, subst, d)?,
        },
        Call { callee, args } => Call {
            callee: clone_with(ast, callee, subst, d)?,
            args: clone_list(ast, &args, subst, d)?,
        },
        Index { prefix, indexes } => Index {
            prefix: clone_with(ast, prefix, subst, d)?,
            indexes: clone_list(ast, &indexes, subst, d)?,
        },
        Slice { prefix, range } => Slice {
            prefix: clone_with(ast, prefix, subst, d)?,
            range: clone_with(ast, range, subst, d)?,
        },
        Selected { prefix, field } => Selected {
            prefix: clone_with(ast, prefix, subst, d)?,
            field,
        },
        Deref { prefix } => Deref {
            prefix: clone_with(ast, prefix, subst, d)?,
        },
        Allocator { subtype, init } => Allocator {
            subtype: clone_with(ast, subtype, subst, d)?,
            init: clone_opt(ast, init, subst, d)?,
        },
        RangeExpr { lo, hi } => RangeExpr {
            lo: clone_with(ast, lo, subst, d)?,
            hi: clone_with(ast, hi, subst, d)?,
        },
        Conversion { target, expr } => Conversion {
            target: clone_with(ast, target, subst, d)?,
            expr: clone_with(ast, expr, subst, d)?,
        },
        Membership {
            expr,
            target,
            negated,
        } => Membership {
            expr: clone_with(ast, expr, subst, d)?,
            target: clone_with(ast, target, subst, d)?,
            negated,
        },
        Check {
            check,
            expr,
            lo,
            hi,
        } => Check {
            check,
            expr: clone_with(ast, expr, subst, d)?,
            lo,
            hi,
        },
        IntRangeDef { range } => IntRangeDef {
            range: clone_with(ast, range, subst, d)?,
        },
        EnumDef { literals } => EnumDef {
            literals: clone_list(ast, &literals, subst, d)?,
        },
        EnumLit { name, ch } => EnumLit { name, ch },
        FloatDef { digits, range } => FloatDef {
            digits: clone_opt(ast, digits, subst, d)?,
            range: clone_opt(ast, range, subst, d)?,
        },
        FixedDef { delta, range } => FixedDef {
            delta: clone_with(ast, delta, subst, d)?,
            range: clone_opt(ast, range, subst, d)?,
        },
        ArrayDef {
            indexes,
            elem,
            unconstrained,
        } => ArrayDef {
            indexes: clone_list(ast, &indexes, subst, d)?,
            elem: clone_with(ast, elem, subst, d)?,
            unconstrained,
        },
        RecordDef {
            components,
            variant,
        } => RecordDef {
            components: clone_list(ast, &components, subst, d)?,
            variant: clone_opt(ast, variant, subst, d)?,
        },
        VariantPart { discr, variants } => VariantPart {
            discr,
            variants: clone_list(ast, &variants, subst, d)?,
        },
        Variant {
            choices,
            components,
        } => Variant {
            choices: clone_list(ast, &choices, subst, d)?,
            components: clone_list(ast, &components, subst, d)?,
        },
        AccessDef { designated } => AccessDef {
            designated: clone_with(ast, designated, subst, d)?,
        },
        DerivedDef { parent } => DerivedDef {
            parent: clone_with(ast, parent, subst, d)?,
        },
        PrivateDef { limited } => PrivateDef { limited },
        SubtypeInd { mark, constraint } => SubtypeInd {
            mark: clone_with(ast, mark, subst, d)?,
            constraint: clone_opt(ast, constraint, subst, d)?,
        },
        RangeConstraint { range } => RangeConstraint {
            range: clone_with(ast, range, subst, d)?,
        },
        IndexConstraint { ranges } => IndexConstraint {
            ranges: clone_list(ast, &ranges, subst, d)?,
        },
        DiscrConstraint { assocs } => DiscrConstraint {
            assocs: clone_list(ast, &assocs, subst, d)?,
        },
        DigitsConstraint { digits, range } => DigitsConstraint {
            digits: clone_with(ast, digits, subst, d)?,
            range: clone_opt(ast, range, subst, d)?,
        },
        DeltaConstraint { delta, range } => DeltaConstraint {
            delta: clone_with(ast, delta, subst, d)?,
            range: clone_opt(ast, range, subst, d)?,
        },
        ObjectDecl {
            names,
            subtype,
            init,
            constant,
        } => ObjectDecl {
            names,
            subtype: clone_with(ast, subtype, subst, d)?,
            init: clone_opt(ast, init, subst, d)?,
            constant,
        },
        NumberDecl { names, expr } => NumberDecl {
            names,
            expr: clone_with(ast, expr, subst, d)?,
        },
        TypeDecl {
            name,
            discriminants,
            def,
        } => TypeDecl {
            name,
            discriminants: clone_list(ast, &discriminants, subst, d)?,
            def: clone_opt(ast, def, subst, d)?,
        },
        SubtypeDecl { name, ind } => SubtypeDecl {
            name,
            ind: clone_with(ast, ind, subst, d)?,
        },
        ExceptionDecl { names } => ExceptionDecl { names },
        Renaming { name, spec, target } => Renaming {
            name,
            spec: clone_opt(ast, spec, subst, d)?,
            target: clone_with(ast, target, subst, d)?,
        },
        Param {
            names,
            mode,
            subtype,
            default,
        } => Param {
            names,
            mode,
            subtype: clone_with(ast, subtype, subst, d)?,
            default: clone_opt(ast, default, subst, d)?,
        },
        SubprogSpec {
            name,
            params,
            ret,
            is_function,
        } => SubprogSpec {
            name,
            params: clone_list(ast, &params, subst, d)?,
            ret: clone_opt(ast, ret, subst, d)?,
            is_function,
        },
        SubprogDecl { spec } => SubprogDecl {
            spec: clone_with(ast, spec, subst, d)?,
        },
        SubprogBody {
            spec,
            decls,
            stmts,
            handlers,
        } => SubprogBody {
            spec: clone_with(ast, spec, subst, d)?,
            decls: clone_list(ast, &decls, subst, d)?,
            stmts: clone_list(ast, &stmts, subst, d)?,
            handlers: clone_list(ast, &handlers, subst, d)?,
        },
        BodyStub { spec } => BodyStub {
            spec: clone_with(ast, spec, subst, d)?,
        },
        PackageSpec {
            name,
            visible,
            private,
        } => PackageSpec {
            name,
            visible: clone_list(ast, &visible, subst, d)?,
            private: clone_list(ast, &private, subst, d)?,
        },
        PackageBody {
            name,
            decls,
            stmts,
            handlers,
        } => PackageBody {
            name,
            decls: clone_list(ast, &decls, subst, d)?,
            stmts: clone_list(ast, &stmts, subst, d)?,
            handlers: clone_list(ast, &handlers, subst, d)?,
        },
        TaskSpec {
            name,
            is_type,
            entries,
        } => TaskSpec {
            name,
            is_type,
            entries: clone_list(ast, &entries, subst, d)?,
        },
        TaskBody {
            name,
            decls,
            stmts,
            handlers,
        } => TaskBody {
            name,
            decls: clone_list(ast, &decls, subst, d)?,
            stmts: clone_list(ast, &stmts, subst, d)?,
            handlers: clone_list(ast, &handlers, subst, d)?,
        },
        EntryDecl {
            name,
            family,
            params,
        } => EntryDecl {
            name,
            family: clone_opt(ast, family, subst, d)?,
            params: clone_list(ast, &params, subst, d)?,
        },
        GenericDecl { formals, unit } => GenericDecl {
            formals: clone_list(ast, &formals, subst, d)?,
            unit: clone_with(ast, unit, subst, d)?,
        },
        GenericFormalType { name, def } => GenericFormalType {
            name,
            def: clone_opt(ast, def, subst, d)?,
        },
        GenericFormalObject {
            names,
            mode,
            subtype,
            default,
        } => GenericFormalObject {
            names,
            mode,
            subtype: clone_with(ast, subtype, subst, d)?,
            default: clone_opt(ast, default, subst, d)?,
        },
        GenericFormalSubprog { spec, default } => GenericFormalSubprog {
            spec: clone_with(ast, spec, subst, d)?,
            default: clone_opt(ast, default, subst, d)?,
        },
        Instantiation {
            name,
            is_function,
            is_package,
            template,
            actuals,
        } => Instantiation {
            name,
            is_function,
            is_package,
            template: clone_with(ast, template, subst, d)?,
            actuals: clone_list(ast, &actuals, subst, d)?,
        },
        RepClause { target, value } => RepClause {
            target: clone_with(ast, target, subst, d)?,
            value: clone_with(ast, value, subst, d)?,
        },
        RecordRep { align, components } => RecordRep {
            align: clone_opt(ast, align, subst, d)?,
            components: clone_list(ast, &components, subst, d)?,
        },
        RecordRepComp {
            name,
            offset,
            range,
        } => RecordRepComp {
            name,
            offset: clone_with(ast, offset, subst, d)?,
            range: clone_with(ast, range, subst, d)?,
        },
        PragmaNode { name, args } => PragmaNode {
            name,
            args: clone_list(ast, &args, subst, d)?,
        },
        Assign { target, value } => Assign {
            target: clone_with(ast, target, subst, d)?,
            value: clone_with(ast, value, subst, d)?,
        },
        IfStmt { arms, else_stmts } => IfStmt {
            arms: clone_list(ast, &arms, subst, d)?,
            else_stmts: clone_list(ast, &else_stmts, subst, d)?,
        },
        IfArm { cond, stmts } => IfArm {
            cond: clone_with(ast, cond, subst, d)?,
            stmts: clone_list(ast, &stmts, subst, d)?,
        },
        CaseStmt { expr, alts } => CaseStmt {
            expr: clone_with(ast, expr, subst, d)?,
            alts: clone_list(ast, &alts, subst, d)?,
        },
        CaseAlt { choices, stmts } => CaseAlt {
            choices: clone_list(ast, &choices, subst, d)?,
            stmts: clone_list(ast, &stmts, subst, d)?,
        },
        LoopStmt {
            label,
            scheme,
            stmts,
        } => {
            let scheme = match scheme {
                crate::ast::LoopScheme::Bare => crate::ast::LoopScheme::Bare,
                crate::ast::LoopScheme::While { cond } => crate::ast::LoopScheme::While {
                    cond: clone_with(ast, cond, subst, d)?,
                },
                crate::ast::LoopScheme::For {
                    var,
                    reverse,
                    range,
                } => crate::ast::LoopScheme::For {
                    var,
                    reverse,
                    range: clone_with(ast, range, subst, d)?,
                },
            };
            LoopStmt {
                label,
                scheme,
                stmts: clone_list(ast, &stmts, subst, d)?,
            }
        }
        BlockStmt {
            label,
            decls,
            stmts,
            handlers,
        } => BlockStmt {
            label,
            decls: clone_list(ast, &decls, subst, d)?,
            stmts: clone_list(ast, &stmts, subst, d)?,
            handlers: clone_list(ast, &handlers, subst, d)?,
        },
        ExitStmt { label, cond } => ExitStmt {
            label,
            cond: clone_opt(ast, cond, subst, d)?,
        },
        ReturnStmt { expr } => ReturnStmt {
            expr: clone_opt(ast, expr, subst, d)?,
        },
        GotoStmt { label } => GotoStmt { label },
        LabelMark { label } => LabelMark { label },
        RaiseStmt { name } => RaiseStmt {
            name: clone_opt(ast, name, subst, d)?,
        },
        NullStmt => NullStmt,
        CodeStmt { expr } => CodeStmt {
            expr: clone_with(ast, expr, subst, d)?,
        },
        AcceptStmt {
            name,
            index,
            params,
            stmts,
        } => AcceptStmt {
            name,
            index: clone_opt(ast, index, subst, d)?,
            params: clone_list(ast, &params, subst, d)?,
            stmts: clone_list(ast, &stmts, subst, d)?,
        },
        SelectStmt { alts, else_stmts } => SelectStmt {
            alts: clone_list(ast, &alts, subst, d)?,
            else_stmts: clone_list(ast, &else_stmts, subst, d)?,
        },
        SelectAlt { guard, stmts } => SelectAlt {
            guard: clone_opt(ast, guard, subst, d)?,
            stmts: clone_list(ast, &stmts, subst, d)?,
        },
        DelayStmt { expr } => DelayStmt {
            expr: clone_with(ast, expr, subst, d)?,
        },
        AbortStmt { names } => AbortStmt {
            names: clone_list(ast, &names, subst, d)?,
        },
        CompUnit {
            context,
            separate_parent,
            unit,
        } => CompUnit {
            context: clone_list(ast, &context, subst, d)?,
            separate_parent: clone_opt(ast, separate_parent, subst, d)?,
            unit: clone_with(ast, unit, subst, d)?,
        },
        WithClause { names } => WithClause {
            names: clone_list(ast, &names, subst, d)?,
        },
        UseClause { names } => UseClause {
            names: clone_list(ast, &names, subst, d)?,
        },
        Handler { choices, stmts } => Handler {
            choices: clone_list(ast, &choices, subst, d)?,
            stmts: clone_list(ast, &stmts, subst, d)?,
        },
        Assoc { choices, value } => Assoc {
            choices: clone_list(ast, &choices, subst, d)?,
            value: clone_with(ast, value, subst, d)?,
        },
    };
    Ok(ast.alloc(cloned, loc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinOp;
    use crate::diagnostics::Loc;
    use crate::intern::NameTable;

    #[test]
    fn test_clone_is_structurally_independent() {
        let mut ast = Ast::new();
        let mut names = NameTable::new();
        let t = names.intern("T");
        let x = ast.alloc(NodeKind::Ident(t), Loc::none());
        let one = ast.alloc(NodeKind::IntLit { value: 1, big: None }, Loc::none());
        let bin = ast.alloc(
            NodeKind::Binary {
                op: BinOp::Add,
                lhs: x,
                rhs: one,
            },
            Loc::none(),
        );

        let clone = deep_clone(&mut ast, bin, 0).unwrap();
        assert_ne!(clone, bin);
        match (ast.kind(bin), ast.kind(clone)) {
            (
                NodeKind::Binary { lhs: a, rhs: b, .. },
                NodeKind::Binary { lhs: c, rhs: d, .. },
            ) => {
                assert_ne!(a, c);
                assert_ne!(b, d);
            }
            _ => panic!("expected binary nodes"),
        }
    }

    #[test]
    fn test_substitution_replaces_formal() {
        let mut ast = Ast::new();
        let mut names = NameTable::new();
        let t = names.intern("T");
        let integer = names.intern("Integer");
        let formal_use = ast.alloc(NodeKind::Ident(t), Loc::none());
        let actual = ast.alloc(NodeKind::Ident(integer), Loc::none());

        let mut map = HashMap::new();
        map.insert(t, actual);
        let clone = clone_substitute(&mut ast, formal_use, &map, 0).unwrap();
        match ast.kind(clone) {
            NodeKind::Ident(n) => assert_eq!(*n, integer),
            other => panic!("expected substituted identifier, got {:?}", other),
        }
        // The substituted node is a fresh copy, not the actual itself.
        assert_ne!(clone, actual);
    }

    #[test]
    fn test_depth_guard() {
        let mut ast = Ast::new();
        let mut names = NameTable::new();
        let n = names.intern("x");
        let leaf = ast.alloc(NodeKind::Ident(n), Loc::none());
        assert!(deep_clone(&mut ast, leaf, MAX_CLONE_DEPTH + 1).is_err());
    }
}
