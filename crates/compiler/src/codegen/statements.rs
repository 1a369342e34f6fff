//! Statement emission
//!
//! Structured control flow prints branches directly: blocks are named by
//! the shared monotone counter, and there is no separate CFG builder.
//! Exception regions thread a `{ prev, jmp_buf }` entry through the
//! handler chain in scratch memory; `setjmp` returning nonzero selects a
//! handler by `strcmp` against the current exception string.

use super::{CodeGen, CodeGenError, LoopFrame, ValKind, Value};
use crate::ast::{LoopScheme, NodeId, NodeKind};
use std::fmt::Write as _;

/// Handler-chain entry: `{ ptr prev, [32 x i64] jmp_buf }`.
const EH_ENTRY_BYTES: i64 = 8 + 32 * 8;

impl CodeGen<'_> {
    pub(super) fn emit_stmts(&mut self, stmts: &[NodeId]) -> Result<(), CodeGenError> {
        for &s in stmts {
            self.emit_stmt(s)?;
        }
        Ok(())
    }

    pub(super) fn emit_stmt(&mut self, n: NodeId) -> Result<(), CodeGenError> {
        let kind = self.s.ast.kind(n).clone();
        match kind {
            NodeKind::NullStmt | NodeKind::PragmaNode { .. } | NodeKind::AbortStmt { .. } => {
                Ok(())
            }
            NodeKind::CodeStmt { .. } => Ok(()),
            NodeKind::Assign { target, value } => self.emit_assign(target, value),
            NodeKind::IfStmt { arms, else_stmts } => self.emit_if(&arms, &else_stmts),
            NodeKind::CaseStmt { expr, alts } => self.emit_case(expr, &alts),
            NodeKind::LoopStmt {
                label,
                scheme,
                stmts,
            } => self.emit_loop(n, label, &scheme, &stmts),
            NodeKind::BlockStmt {
                decls,
                stmts,
                handlers,
                ..
            } => {
                self.emit_local_decls(&decls)?;
                self.emit_handled(&stmts, &handlers)
            }
            NodeKind::ExitStmt { label, cond } => self.emit_exit(label, cond),
            NodeKind::ReturnStmt { expr } => self.emit_return(expr),
            NodeKind::GotoStmt { label } => {
                let target = self.goto_block(label);
                writeln!(self.out, "  br label %{}", target)?;
                let dead = self.fresh_block("aftergoto");
                writeln!(self.out, "{}:", dead)?;
                Ok(())
            }
            NodeKind::LabelMark { label } => {
                let target = self.goto_block(label);
                writeln!(self.out, "  br label %{}", target)?;
                writeln!(self.out, "{}:", target)?;
                Ok(())
            }
            NodeKind::RaiseStmt { name } => self.emit_raise(name),
            NodeKind::DelayStmt { expr } => {
                let v = self.emit_expr(expr)?;
                let v = self.value_cast(v, ValKind::F64)?;
                let us = self.fresh_temp();
                writeln!(
                    self.out,
                    "  %{} = fmul double {}, 1.000000e+06",
                    us, v.repr
                )?;
                let us_i = self.fresh_temp();
                writeln!(self.out, "  %{} = fptosi double %{} to i32", us_i, us)?;
                let t = self.fresh_temp();
                writeln!(self.out, "  %{} = call i32 @usleep(i32 %{})", t, us_i)?;
                Ok(())
            }
            NodeKind::AcceptStmt { params, stmts, .. } => {
                // Rendezvous are handled at the declaration level only;
                // the accept body runs inline.
                for &p in &params {
                    if let Some(ids) = self.s.decl_syms.get(&p) {
                        for &id in ids {
                            let uid = self.s.syms.get(id).uid;
                            let slot = self.fresh_temp();
                            writeln!(self.out, "  %{} = alloca i64", slot)?;
                            writeln!(self.out, "  store i64 0, ptr %{}", slot)?;
                            self.locals.insert(uid, format!("%{}", slot));
                        }
                    }
                }
                self.emit_stmts(&stmts)
            }
            NodeKind::SelectStmt { alts, else_stmts } => {
                // `select … or delay T;` lowers to the first alternative.
                if let Some(&first) = alts.first() {
                    if let NodeKind::SelectAlt { stmts, .. } = self.s.ast.kind(first).clone() {
                        return self.emit_stmts(&stmts);
                    }
                }
                self.emit_stmts(&else_stmts)
            }
            // Procedure call statement or other resolved expression.
            _ => {
                self.emit_expr(n)?;
                Ok(())
            }
        }
    }

    fn emit_assign(&mut self, target: NodeId, value: NodeId) -> Result<(), CodeGenError> {
        let tty = self.node_ty(target);
        if self.s.types.is_array(tty) {
            // Element-wise copy through data pointers.
            let (td, tlo, thi) = self.array_parts(target)?;
            let len = self.span_len(&tlo, &thi)?;
            let elem = self.s.types.elem_of(tty).unwrap_or(self.s.types.character);
            let esize = self.elem_size_bytes(elem);
            let (sd, _slo, _shi) = self.array_parts(value)?;
            let bytes = if esize == 1 {
                len
            } else {
                let t = self.fresh_temp();
                writeln!(self.out, "  %{} = mul i64 {}, {}", t, len, esize)?;
                format!("%{}", t)
            };
            writeln!(
                self.out,
                "  call void @memcpy(ptr {}, ptr {}, i64 {})",
                td.repr, sd.repr, bytes
            )?;
            return Ok(());
        }
        if self.is_composite(tty) {
            let addr = self.emit_addr(target)?;
            return self.copy_composite(&addr, value, tty);
        }
        let addr = self.emit_addr(target)?;
        let v = self.emit_expr(value)?;
        self.store_scalar(&addr, v, tty)
    }

    fn emit_if(&mut self, arms: &[NodeId], else_stmts: &[NodeId]) -> Result<(), CodeGenError> {
        let merge = self.fresh_block("ifend");
        for &arm in arms {
            if let NodeKind::IfArm { cond, stmts } = self.s.ast.kind(arm).clone() {
                let c = self.emit_cond(cond)?;
                let then = self.fresh_block("then");
                let next = self.fresh_block("else");
                writeln!(self.out, "  br i1 {}, label %{}, label %{}", c, then, next)?;
                writeln!(self.out, "{}:", then)?;
                self.emit_stmts(&stmts)?;
                writeln!(self.out, "  br label %{}", merge)?;
                writeln!(self.out, "{}:", next)?;
            }
        }
        self.emit_stmts(else_stmts)?;
        writeln!(self.out, "  br label %{}", merge)?;
        writeln!(self.out, "{}:", merge)?;
        Ok(())
    }

    fn emit_case(&mut self, expr: NodeId, alts: &[NodeId]) -> Result<(), CodeGenError> {
        let v = self.emit_expr(expr)?;
        let v = self.value_cast(v, ValKind::I64)?;
        let merge = self.fresh_block("caseend");
        for &alt in alts {
            if let NodeKind::CaseAlt { choices, stmts } = self.s.ast.kind(alt).clone() {
                let body = self.fresh_block("when");
                let next = self.fresh_block("whennext");
                let mut is_others = false;
                let mut match_reg: Option<String> = None;
                for &c in &choices {
                    match self.s.ast.kind(c).clone() {
                        NodeKind::OthersMark => {
                            is_others = true;
                        }
                        NodeKind::RangeExpr { lo, hi } => {
                            let l = self.emit_expr(lo)?;
                            let h = self.emit_expr(hi)?;
                            let ge = self.fresh_temp();
                            writeln!(
                                self.out,
                                "  %{} = icmp sge i64 {}, {}",
                                ge, v.repr, l.repr
                            )?;
                            let le = self.fresh_temp();
                            writeln!(
                                self.out,
                                "  %{} = icmp sle i64 {}, {}",
                                le, v.repr, h.repr
                            )?;
                            let both = self.fresh_temp();
                            writeln!(self.out, "  %{} = and i1 %{}, %{}", both, ge, le)?;
                            match_reg = Some(self.or_cond(match_reg, &format!("%{}", both))?);
                        }
                        _ => {
                            let cv = self.emit_expr(c)?;
                            let eq = self.fresh_temp();
                            writeln!(
                                self.out,
                                "  %{} = icmp eq i64 {}, {}",
                                eq, v.repr, cv.repr
                            )?;
                            match_reg = Some(self.or_cond(match_reg, &format!("%{}", eq))?);
                        }
                    }
                }
                if is_others {
                    writeln!(self.out, "  br label %{}", body)?;
                } else if let Some(m) = match_reg {
                    writeln!(self.out, "  br i1 {}, label %{}, label %{}", m, body, next)?;
                } else {
                    writeln!(self.out, "  br label %{}", next)?;
                }
                writeln!(self.out, "{}:", body)?;
                self.emit_stmts(&stmts)?;
                writeln!(self.out, "  br label %{}", merge)?;
                writeln!(self.out, "{}:", next)?;
            }
        }
        writeln!(self.out, "  br label %{}", merge)?;
        writeln!(self.out, "{}:", merge)?;
        Ok(())
    }

    fn or_cond(
        &mut self,
        acc: Option<String>,
        new: &str,
    ) -> Result<String, CodeGenError> {
        match acc {
            None => Ok(new.to_string()),
            Some(prev) => {
                let t = self.fresh_temp();
                writeln!(self.out, "  %{} = or i1 {}, {}", t, prev, new)?;
                Ok(format!("%{}", t))
            }
        }
    }

    fn emit_loop(
        &mut self,
        n: NodeId,
        label: Option<crate::intern::NameId>,
        scheme: &LoopScheme,
        stmts: &[NodeId],
    ) -> Result<(), CodeGenError> {
        match scheme {
            LoopScheme::Bare => {
                let head = self.fresh_block("loop");
                let exit = self.fresh_block("loopend");
                writeln!(self.out, "  br label %{}", head)?;
                writeln!(self.out, "{}:", head)?;
                self.loop_stack.push(LoopFrame {
                    exit_label: exit.clone(),
                    name: label,
                });
                self.emit_stmts(stmts)?;
                self.loop_stack.pop();
                writeln!(self.out, "  br label %{}", head)?;
                writeln!(self.out, "{}:", exit)?;
                Ok(())
            }
            LoopScheme::While { cond } => {
                let head = self.fresh_block("whilehead");
                let body = self.fresh_block("whilebody");
                let exit = self.fresh_block("whileend");
                writeln!(self.out, "  br label %{}", head)?;
                writeln!(self.out, "{}:", head)?;
                let c = self.emit_cond(*cond)?;
                writeln!(self.out, "  br i1 {}, label %{}, label %{}", c, body, exit)?;
                writeln!(self.out, "{}:", body)?;
                self.loop_stack.push(LoopFrame {
                    exit_label: exit.clone(),
                    name: label,
                });
                self.emit_stmts(stmts)?;
                self.loop_stack.pop();
                writeln!(self.out, "  br label %{}", head)?;
                writeln!(self.out, "{}:", exit)?;
                Ok(())
            }
            LoopScheme::For { reverse, range, .. } => {
                self.emit_for(n, *reverse, *range, stmts, label)
            }
        }
    }

    /// A for loop iterates from the range's low bound to its high bound
    /// (reversed when `reverse`), with bounds loaded from the fat pointer
    /// when the range is an array's `'Range`.
    fn emit_for(
        &mut self,
        n: NodeId,
        reverse: bool,
        range: NodeId,
        stmts: &[NodeId],
        label: Option<crate::intern::NameId>,
    ) -> Result<(), CodeGenError> {
        let (lo, hi) = self.range_values(range)?;
        let var_sym = self
            .s
            .ast
            .sym(n)
            .ok_or_else(|| CodeGenError::Logic("for loop without iteration variable".to_string()))?;
        let uid = self.s.syms.get(var_sym).uid;
        let slot = self.fresh_temp();
        writeln!(self.out, "  %{} = alloca i64", slot)?;
        self.locals.insert(uid, format!("%{}", slot));
        let (start, stop, step, cmp) = if reverse {
            (&hi, &lo, "-1", "sge")
        } else {
            (&lo, &hi, "1", "sle")
        };
        writeln!(self.out, "  store i64 {}, ptr %{}", start.repr, slot)?;
        let head = self.fresh_block("forhead");
        let body = self.fresh_block("forbody");
        let exit = self.fresh_block("forend");
        writeln!(self.out, "  br label %{}", head)?;
        writeln!(self.out, "{}:", head)?;
        let cur = self.fresh_temp();
        writeln!(self.out, "  %{} = load i64, ptr %{}", cur, slot)?;
        let keep = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = icmp {} i64 %{}, {}",
            keep, cmp, cur, stop.repr
        )?;
        writeln!(self.out, "  br i1 %{}, label %{}, label %{}", keep, body, exit)?;
        writeln!(self.out, "{}:", body)?;
        self.loop_stack.push(LoopFrame {
            exit_label: exit.clone(),
            name: label,
        });
        self.emit_stmts(stmts)?;
        self.loop_stack.pop();
        let cur2 = self.fresh_temp();
        writeln!(self.out, "  %{} = load i64, ptr %{}", cur2, slot)?;
        let next = self.fresh_temp();
        writeln!(self.out, "  %{} = add i64 %{}, {}", next, cur2, step)?;
        writeln!(self.out, "  store i64 %{}, ptr %{}", next, slot)?;
        writeln!(self.out, "  br label %{}", head)?;
        writeln!(self.out, "{}:", exit)?;
        Ok(())
    }

    /// Low and high bounds of a loop range: an explicit range, an array
    /// `'Range`, or a discrete type mark.
    fn range_values(&mut self, range: NodeId) -> Result<(Value, Value), CodeGenError> {
        match self.s.ast.kind(range).clone() {
            NodeKind::RangeExpr { lo, hi } => {
                let l = self.emit_expr(lo)?;
                let l = self.value_cast(l, ValKind::I64)?;
                let h = self.emit_expr(hi)?;
                let h = self.value_cast(h, ValKind::I64)?;
                Ok((l, h))
            }
            NodeKind::Attr { prefix, attr, .. }
                if self.s.names.lower(attr) == "range" =>
            {
                let pty = self.node_ty(prefix);
                if self.s.types.is_array(pty) {
                    let (_, lo, hi) = self.array_parts(prefix)?;
                    Ok((lo, hi))
                } else {
                    let (lo, hi) = self.s.types.bounds(pty);
                    Ok((Value::int(lo), Value::int(hi)))
                }
            }
            _ => {
                let ty = self.node_ty(range);
                let (lo, hi) = self.s.types.bounds(ty);
                Ok((Value::int(lo), Value::int(hi)))
            }
        }
    }

    fn emit_exit(
        &mut self,
        label: Option<crate::intern::NameId>,
        cond: Option<NodeId>,
    ) -> Result<(), CodeGenError> {
        let exit_label = match label {
            Some(l) => self
                .loop_stack
                .iter()
                .rev()
                .find(|f| f.name == Some(l))
                .map(|f| f.exit_label.clone()),
            None => self.loop_stack.last().map(|f| f.exit_label.clone()),
        }
        .ok_or_else(|| CodeGenError::Logic("exit statement outside any loop".to_string()))?;
        match cond {
            Some(c) => {
                let cv = self.emit_cond(c)?;
                let cont = self.fresh_block("noexit");
                writeln!(
                    self.out,
                    "  br i1 {}, label %{}, label %{}",
                    cv, exit_label, cont
                )?;
                writeln!(self.out, "{}:", cont)?;
            }
            None => {
                writeln!(self.out, "  br label %{}", exit_label)?;
                let dead = self.fresh_block("afterexit");
                writeln!(self.out, "{}:", dead)?;
            }
        }
        Ok(())
    }

    fn emit_return(&mut self, expr: Option<NodeId>) -> Result<(), CodeGenError> {
        match (expr, self.ret_kind) {
            (Some(e), Some(kind)) => {
                let ety = self.node_ty(e);
                if self.is_composite(ety) || self.is_fat(ety) {
                    // Composite results return a scratch copy so locals do
                    // not escape their frame.
                    let size = self.object_size_bytes(ety);
                    let src = self.emit_addr(e)?;
                    let buf = self.fresh_temp();
                    writeln!(
                        self.out,
                        "  %{} = call ptr @__ada_ss_alloc(i64 {})",
                        buf, size
                    )?;
                    writeln!(
                        self.out,
                        "  call void @memcpy(ptr %{}, ptr {}, i64 {})",
                        buf, src.repr, size
                    )?;
                    writeln!(self.out, "  ret ptr %{}", buf)?;
                } else {
                    let v = self.emit_expr(e)?;
                    let v = self.value_cast(v, kind)?;
                    writeln!(self.out, "  ret {} {}", kind.ir(), v.repr)?;
                }
            }
            _ => {
                writeln!(self.out, "  ret void")?;
            }
        }
        let dead = self.fresh_block("afterret");
        writeln!(self.out, "{}:", dead)?;
        Ok(())
    }

    fn emit_raise(&mut self, name: Option<NodeId>) -> Result<(), CodeGenError> {
        let exc = match name {
            Some(name_node) => {
                let upper = self
                    .s
                    .ast
                    .sym(name_node)
                    .map(|sym| self.s.names.upper(self.s.syms.get(sym).name))
                    .unwrap_or_else(|| "PROGRAM_ERROR".to_string());
                self.exception_global(&upper)
            }
            None => {
                // Re-raise the current exception.
                let t = self.fresh_temp();
                writeln!(self.out, "  %{} = load ptr, ptr @__ex_cur", t)?;
                writeln!(self.out, "  call void @__ada_raise(ptr %{})", t)?;
                writeln!(self.out, "  unreachable")?;
                let dead = self.fresh_block("afterraise");
                writeln!(self.out, "{}:", dead)?;
                return Ok(());
            }
        };
        writeln!(self.out, "  call void @__ada_raise(ptr {})", exc)?;
        writeln!(self.out, "  unreachable")?;
        let dead = self.fresh_block("afterraise");
        writeln!(self.out, "{}:", dead)?;
        Ok(())
    }

    pub(super) fn goto_block(&mut self, label: crate::intern::NameId) -> String {
        if let Some(existing) = self.label_blocks.get(&label) {
            return existing.clone();
        }
        let name = format!("ulab_{}", self.s.names.lower(label));
        self.label_blocks.insert(label, name.clone());
        name
    }

    /// A statement sequence with exception handlers: push a handler-chain
    /// entry, `setjmp`, run the body, pop on normal completion. The raise
    /// path matches handlers by exception-string comparison; `others`
    /// matches unconditionally; no match re-raises to the enclosing
    /// region.
    pub(super) fn emit_handled(
        &mut self,
        stmts: &[NodeId],
        handlers: &[NodeId],
    ) -> Result<(), CodeGenError> {
        if handlers.is_empty() {
            return self.emit_stmts(stmts);
        }
        let eh = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = call ptr @__ada_ss_alloc(i64 {})",
            eh, EH_ENTRY_BYTES
        )?;
        let prev_slot = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr {{ ptr, [32 x i64] }}, ptr %{}, i32 0, i32 0",
            prev_slot, eh
        )?;
        let prev = self.fresh_temp();
        writeln!(self.out, "  %{} = load ptr, ptr @__eh_cur", prev)?;
        writeln!(self.out, "  store ptr %{}, ptr %{}", prev, prev_slot)?;
        writeln!(self.out, "  store ptr %{}, ptr @__eh_cur", eh)?;
        let buf = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr {{ ptr, [32 x i64] }}, ptr %{}, i32 0, i32 1",
            buf, eh
        )?;
        let rc = self.fresh_temp();
        writeln!(self.out, "  %{} = call i32 @setjmp(ptr %{})", rc, buf)?;
        let thrown = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp ne i32 %{}, 0", thrown, rc)?;
        let body = self.fresh_block("tryin");
        let handle = self.fresh_block("handle");
        let merge = self.fresh_block("tryend");
        writeln!(
            self.out,
            "  br i1 %{}, label %{}, label %{}",
            thrown, handle, body
        )?;

        writeln!(self.out, "{}:", body)?;
        self.emit_stmts(stmts)?;
        // Normal completion pops the handler entry.
        writeln!(self.out, "  store ptr %{}, ptr @__eh_cur", prev)?;
        writeln!(self.out, "  br label %{}", merge)?;

        writeln!(self.out, "{}:", handle)?;
        let exc = self.fresh_temp();
        writeln!(self.out, "  %{} = load ptr, ptr @__ex_cur", exc)?;
        // Match arms in declaration order.
        let mut arm_blocks = Vec::new();
        for _ in handlers {
            arm_blocks.push(self.fresh_block("arm"));
        }
        for (i, &h) in handlers.iter().enumerate() {
            if let NodeKind::Handler { choices, .. } = self.s.ast.kind(h).clone() {
                let mut matched_others = false;
                let mut cond: Option<String> = None;
                for &c in &choices {
                    match self.s.ast.kind(c) {
                        NodeKind::OthersMark => matched_others = true,
                        _ => {
                            let upper = self
                                .s
                                .ast
                                .sym(c)
                                .map(|sym| self.s.names.upper(self.s.syms.get(sym).name))
                                .unwrap_or_else(|| "CONSTRAINT_ERROR".to_string());
                            let global = self.exception_global(&upper);
                            let cres = self.fresh_temp();
                            writeln!(
                                self.out,
                                "  %{} = call i32 @strcmp(ptr %{}, ptr {})",
                                cres, exc, global
                            )?;
                            let is_eq = self.fresh_temp();
                            writeln!(self.out, "  %{} = icmp eq i32 %{}, 0", is_eq, cres)?;
                            cond = Some(self.or_cond(cond, &format!("%{}", is_eq))?);
                        }
                    }
                }
                let next = self.fresh_block("armnext");
                if matched_others {
                    writeln!(self.out, "  br label %{}", arm_blocks[i])?;
                } else if let Some(c) = cond {
                    writeln!(
                        self.out,
                        "  br i1 {}, label %{}, label %{}",
                        c, arm_blocks[i], next
                    )?;
                } else {
                    writeln!(self.out, "  br label %{}", next)?;
                }
                writeln!(self.out, "{}:", next)?;
            }
        }
        // No handler matched: propagate to the enclosing region.
        writeln!(self.out, "  call void @__ada_raise(ptr %{})", exc)?;
        writeln!(self.out, "  unreachable")?;

        for (i, &h) in handlers.iter().enumerate() {
            if let NodeKind::Handler { stmts, .. } = self.s.ast.kind(h).clone() {
                writeln!(self.out, "{}:", arm_blocks[i])?;
                self.emit_stmts(&stmts)?;
                writeln!(self.out, "  br label %{}", merge)?;
            }
        }
        writeln!(self.out, "{}:", merge)?;
        Ok(())
    }
}
