//! Expression emission
//!
//! `emit_expr` returns the SSA value of an expression; composite values
//! (arrays, records, fat pointers) are represented by the address of their
//! storage. `emit_addr` returns the address of a name usable as an
//! assignment target. Check nodes expand to an explicit range test with a
//! branch to a raise block.

use super::{mangle_symbol, needs_static_link, CodeGen, CodeGenError, ValKind, Value};
use crate::ast::{BinOp, CheckKind, NodeId, NodeKind, ParamMode, UnOp};
use crate::symbols::{SymId, SymKind};
use crate::types::{TypeId, TypeKind};
use std::fmt::Write as _;

impl CodeGen<'_> {
    pub fn emit_expr(&mut self, n: NodeId) -> Result<Value, CodeGenError> {
        let kind = self.s.ast.kind(n).clone();
        match kind {
            NodeKind::IntLit { value, .. } => Ok(Value::int(value)),
            NodeKind::RealLit(v) => Ok(Value::new(
                format!("0x{:016X}", v.to_bits()),
                ValKind::F64,
            )),
            NodeKind::CharLit(c) => Ok(Value::int(c as i64)),
            NodeKind::NullLit => Ok(Value::new("null", ValKind::Ptr)),
            NodeKind::StrLit(text) => {
                let bytes: Vec<u8> = text.bytes().collect();
                let name = self.intern_string(&bytes);
                Ok(Value::new(name, ValKind::Ptr))
            }
            NodeKind::Ident(_) | NodeKind::Selected { .. } => self.emit_name_value(n),
            NodeKind::Binary { op, lhs, rhs } => self.emit_binary(n, op, lhs, rhs),
            NodeKind::Unary { op, operand } => self.emit_unary(n, op, operand),
            NodeKind::Attr { prefix, attr, args } => self.emit_attr(n, prefix, attr, &args),
            NodeKind::Qualified { expr, .. } => self.emit_expr(expr),
            NodeKind::Call { callee, args } => self.emit_call(n, callee, &args),
            NodeKind::Index { .. } | NodeKind::Deref { .. } => {
                let ty = self.node_ty(n);
                let addr = self.emit_addr(n)?;
                if self.is_composite(ty) || self.is_fat(ty) {
                    Ok(addr)
                } else {
                    self.load_scalar(&addr, ty)
                }
            }
            NodeKind::Slice { prefix, range } => self.emit_slice(n, prefix, range),
            NodeKind::Allocator { subtype, init } => self.emit_allocator(n, subtype, init),
            NodeKind::Conversion { expr, .. } => {
                let ty = self.node_ty(n);
                let v = self.emit_expr(expr)?;
                self.value_cast(v, self.val_kind(ty))
            }
            NodeKind::Membership {
                expr,
                target,
                negated,
            } => self.emit_membership(expr, target, negated),
            NodeKind::Check {
                check,
                expr,
                lo,
                hi,
            } => self.emit_check(check, expr, lo, hi),
            NodeKind::Aggregate { .. } => {
                let ty = self.node_ty(n);
                let addr = self.alloca_object(ty)?;
                self.emit_aggregate_into(n, &addr, ty)?;
                Ok(addr)
            }
            NodeKind::RangeExpr { lo, .. } => self.emit_expr(lo),
            other => Err(CodeGenError::Logic(format!(
                "expression kind not supported by the emitter: {:?}",
                std::mem::discriminant(&other)
            ))),
        }
    }

    pub(super) fn node_ty(&self, n: NodeId) -> TypeId {
        self.s.ast.ty(n).unwrap_or(self.s.types.integer)
    }

    /// Condition value as an `i1` register name.
    pub fn emit_cond(&mut self, n: NodeId) -> Result<String, CodeGenError> {
        let v = self.emit_expr(n)?;
        let v = self.value_cast(v, ValKind::I64)?;
        let c = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp ne i64 {}, 0", c, v.repr)?;
        Ok(format!("%{}", c))
    }

    // ----- names -----

    fn emit_name_value(&mut self, n: NodeId) -> Result<Value, CodeGenError> {
        let sym = self.s.ast.sym(n);
        if let Some(sym) = sym {
            let info = self.s.syms.get(sym);
            match info.kind {
                SymKind::EnumLiteral => return Ok(Value::int(info.value)),
                SymKind::Function if info.params.is_empty() => {
                    // A parameterless function name in a value context is
                    // a call.
                    return self.emit_direct_call(sym, &[]);
                }
                SymKind::Variable if info.constant => {
                    if let Some(decl) = info.decl {
                        if matches!(self.s.ast.kind(decl), NodeKind::NumberDecl { .. }) {
                            return Ok(Value::int(info.value));
                        }
                    }
                }
                _ => {}
            }
        }
        let ty = self.node_ty(n);
        let addr = self.emit_addr(n)?;
        if self.is_composite(ty) || self.is_fat(ty) {
            Ok(addr)
        } else {
            self.load_scalar(&addr, ty)
        }
    }

    /// Address of a name for loads and stores. For fat-pointer objects the
    /// address points at the fat struct.
    pub fn emit_addr(&mut self, n: NodeId) -> Result<Value, CodeGenError> {
        let kind = self.s.ast.kind(n).clone();
        match kind {
            NodeKind::Ident(_) => {
                let sym = self.s.ast.sym(n).ok_or_else(|| {
                    CodeGenError::Logic("unresolved name reached the emitter".to_string())
                })?;
                self.sym_addr(sym)
            }
            NodeKind::Selected { prefix, .. } => {
                let sym = self.s.ast.sym(n).ok_or_else(|| {
                    CodeGenError::Logic("unresolved selected name".to_string())
                })?;
                let info = self.s.syms.get(sym);
                match info.kind {
                    SymKind::Component | SymKind::Discriminant => {
                        let offset = info.offset;
                        let mut base_ty = self.node_ty(prefix);
                        let mut base = self.emit_addr(prefix)?;
                        if self.s.types.is_access(base_ty) {
                            let loaded = self.load_scalar(&base, base_ty)?;
                            base = self.access_check(loaded)?;
                            base_ty = self.s.types.elem_of(base_ty).unwrap_or(base_ty);
                        }
                        let _ = base_ty;
                        let t = self.fresh_temp();
                        writeln!(
                            self.out,
                            "  %{} = getelementptr i8, ptr {}, i64 {}",
                            t, base.repr, offset
                        )?;
                        Ok(Value::new(format!("%{}", t), ValKind::Ptr))
                    }
                    _ => self.sym_addr(sym),
                }
            }
            NodeKind::Index { prefix, indexes } => self.emit_index_addr(prefix, &indexes),
            NodeKind::Deref { prefix } => {
                let pty = self.node_ty(prefix);
                let v = if self.s.types.is_access(pty) {
                    let addr = self.emit_addr(prefix)?;
                    self.load_scalar(&addr, pty)?
                } else {
                    self.emit_expr(prefix)?
                };
                self.access_check(v)
            }
            NodeKind::Slice { prefix, range } => self.emit_slice(n, prefix, range),
            NodeKind::Check { expr, .. } | NodeKind::Qualified { expr, .. } => {
                self.emit_addr(expr)
            }
            NodeKind::Conversion { expr, .. } => self.emit_addr(expr),
            NodeKind::Call { .. } | NodeKind::Aggregate { .. } | NodeKind::StrLit(_) => {
                // A composite rvalue used where an address is needed.
                self.emit_expr(n)
            }
            other => Err(CodeGenError::Logic(format!(
                "name kind not addressable: {:?}",
                std::mem::discriminant(&other)
            ))),
        }
    }

    /// Address of a symbol's storage: a local alloca, a static-link chased
    /// outer local, or a package global.
    pub(super) fn sym_addr(&mut self, sym: SymId) -> Result<Value, CodeGenError> {
        let info = self.s.syms.get(sym).clone();
        if let Some(slot) = self.locals.get(&info.uid).cloned() {
            // By-reference parameters hold the actual's address in their
            // slot; one load yields the value address.
            if self.byref.contains(&info.uid) {
                let a = self.fresh_temp();
                writeln!(self.out, "  %{} = load ptr, ptr {}", a, slot)?;
                return Ok(Value::new(format!("%{}", a), ValKind::Ptr));
            }
            return Ok(Value::new(slot, ValKind::Ptr));
        }
        // Outer local reached through the static link.
        if let Some(&slot) = self.frame_slots.get(&info.uid) {
            if info.level < self.current_level && self.current_has_link {
                let hops = self.current_level - 1 - info.level.max(1) + 1;
                let mut frame = "%__link".to_string();
                for _ in 1..hops {
                    let t = self.fresh_temp();
                    writeln!(
                        self.out,
                        "  %{} = getelementptr ptr, ptr {}, i64 {}",
                        t,
                        frame,
                        super::FRAME_LINK_SLOT
                    )?;
                    let l = self.fresh_temp();
                    writeln!(self.out, "  %{} = load ptr, ptr %{}", l, t)?;
                    frame = format!("%{}", l);
                }
                let sp = self.fresh_temp();
                writeln!(
                    self.out,
                    "  %{} = getelementptr ptr, ptr {}, i64 {}",
                    sp, frame, slot
                )?;
                let a = self.fresh_temp();
                writeln!(self.out, "  %{} = load ptr, ptr %{}", a, sp)?;
                return Ok(Value::new(format!("%{}", a), ValKind::Ptr));
            }
        }
        // Package-level storage.
        let name = format!("@{}", super::mangle_global(self.s, sym));
        Ok(Value::new(name, ValKind::Ptr))
    }

    /// Scalars load and store through their storage unit: CHARACTER and
    /// BOOLEAN live in one byte, everything else in a full word.
    pub(super) fn load_scalar(
        &mut self,
        addr: &Value,
        ty: TypeId,
    ) -> Result<Value, CodeGenError> {
        let kind = self.val_kind(ty);
        let unit = self.store_unit(ty);
        if unit == "i8" {
            let raw = self.fresh_temp();
            writeln!(self.out, "  %{} = load i8, ptr {}", raw, addr.repr)?;
            let wide = self.fresh_temp();
            writeln!(self.out, "  %{} = zext i8 %{} to i64", wide, raw)?;
            return Ok(Value::new(format!("%{}", wide), ValKind::I64));
        }
        let t = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = load {}, ptr {}",
            t,
            kind.ir(),
            addr.repr
        )?;
        Ok(Value::new(format!("%{}", t), kind))
    }

    pub(super) fn store_scalar(
        &mut self,
        addr: &Value,
        v: Value,
        ty: TypeId,
    ) -> Result<(), CodeGenError> {
        let kind = self.val_kind(ty);
        let unit = self.store_unit(ty);
        let v = self.value_cast(v, kind)?;
        if unit == "i8" {
            let narrow = self.fresh_temp();
            writeln!(self.out, "  %{} = trunc i64 {} to i8", narrow, v.repr)?;
            writeln!(self.out, "  store i8 %{}, ptr {}", narrow, addr.repr)?;
            return Ok(());
        }
        writeln!(self.out, "  store {} {}, ptr {}", kind.ir(), v.repr, addr.repr)?;
        Ok(())
    }

    fn access_check(&mut self, v: Value) -> Result<Value, CodeGenError> {
        let bad = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp eq ptr {}, null", bad, v.repr)?;
        let raise = self.fresh_block("nullraise");
        let ok = self.fresh_block("nullok");
        writeln!(self.out, "  br i1 %{}, label %{}, label %{}", bad, raise, ok)?;
        let exc = self.exception_global("CONSTRAINT_ERROR");
        writeln!(self.out, "{}:", raise)?;
        writeln!(self.out, "  call void @__ada_raise(ptr {})", exc)?;
        writeln!(self.out, "  unreachable")?;
        writeln!(self.out, "{}:", ok)?;
        Ok(v)
    }

    // ----- arrays -----

    /// Data pointer and bounds of an array-typed expression. Fat values
    /// load bounds from their descriptor; constrained values use the
    /// type's static bounds.
    pub(super) fn array_parts(
        &mut self,
        n: NodeId,
    ) -> Result<(Value, Value, Value), CodeGenError> {
        let ty = self.node_ty(n);
        let v = self.emit_expr(n)?;
        if self.is_fat(ty) {
            self.fat_parts(&v)
        } else {
            let (lo, hi) = self.s.types.bounds(ty);
            Ok((v, Value::int(lo), Value::int(hi)))
        }
    }

    pub(super) fn fat_parts(
        &mut self,
        fat: &Value,
    ) -> Result<(Value, Value, Value), CodeGenError> {
        let dp = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr %__fat, ptr {}, i32 0, i32 0",
            dp, fat.repr
        )?;
        let data = self.fresh_temp();
        writeln!(self.out, "  %{} = load ptr, ptr %{}", data, dp)?;
        let bp = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr %__fat, ptr {}, i32 0, i32 1",
            bp, fat.repr
        )?;
        let bounds = self.fresh_temp();
        writeln!(self.out, "  %{} = load ptr, ptr %{}", bounds, bp)?;
        let lop = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr {{ i64, i64 }}, ptr %{}, i32 0, i32 0",
            lop, bounds
        )?;
        let lo = self.fresh_temp();
        writeln!(self.out, "  %{} = load i64, ptr %{}", lo, lop)?;
        let hip = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr {{ i64, i64 }}, ptr %{}, i32 0, i32 1",
            hip, bounds
        )?;
        let hi = self.fresh_temp();
        writeln!(self.out, "  %{} = load i64, ptr %{}", hi, hip)?;
        Ok((
            Value::new(format!("%{}", data), ValKind::Ptr),
            Value::new(format!("%{}", lo), ValKind::I64),
            Value::new(format!("%{}", hi), ValKind::I64),
        ))
    }

    /// Build a fat pointer for `n` so it can be passed to an unconstrained
    /// formal. Values already carrying a descriptor pass through.
    pub(super) fn fat_for(&mut self, n: NodeId) -> Result<Value, CodeGenError> {
        let ty = self.node_ty(n);
        if self.is_fat(ty) {
            return self.emit_expr(n);
        }
        let (data, lo, hi) = self.array_parts(n)?;
        self.make_fat(&data, &lo, &hi)
    }

    pub(super) fn make_fat(
        &mut self,
        data: &Value,
        lo: &Value,
        hi: &Value,
    ) -> Result<Value, CodeGenError> {
        let bounds = if lo.repr.starts_with('%') || hi.repr.starts_with('%') {
            let b = self.fresh_temp();
            writeln!(self.out, "  %{} = alloca {{ i64, i64 }}", b)?;
            let lp = self.fresh_temp();
            writeln!(
                self.out,
                "  %{} = getelementptr {{ i64, i64 }}, ptr %{}, i32 0, i32 0",
                lp, b
            )?;
            writeln!(self.out, "  store i64 {}, ptr %{}", lo.repr, lp)?;
            let hp = self.fresh_temp();
            writeln!(
                self.out,
                "  %{} = getelementptr {{ i64, i64 }}, ptr %{}, i32 0, i32 1",
                hp, b
            )?;
            writeln!(self.out, "  store i64 {}, ptr %{}", hi.repr, hp)?;
            format!("%{}", b)
        } else {
            let lo_c: i64 = lo.repr.parse().unwrap_or(1);
            let hi_c: i64 = hi.repr.parse().unwrap_or(0);
            self.intern_bounds(lo_c, hi_c)
        };
        let fat = self.fresh_temp();
        writeln!(self.out, "  %{} = alloca %__fat", fat)?;
        let dp = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr %__fat, ptr %{}, i32 0, i32 0",
            dp, fat
        )?;
        writeln!(self.out, "  store ptr {}, ptr %{}", data.repr, dp)?;
        let bp = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr %__fat, ptr %{}, i32 0, i32 1",
            bp, fat
        )?;
        writeln!(self.out, "  store ptr {}, ptr %{}", bounds, bp)?;
        Ok(Value::new(format!("%{}", fat), ValKind::Ptr))
    }

    /// Element address: load bounds if fat, rebase the index by `lo`, then
    /// index by element size.
    fn emit_index_addr(
        &mut self,
        prefix: NodeId,
        indexes: &[NodeId],
    ) -> Result<Value, CodeGenError> {
        let mut pty = self.node_ty(prefix);
        // Implicit dereference of an access-to-array prefix.
        let (data, lo, _hi) = if self.s.types.is_access(pty) {
            let addr = self.emit_addr(prefix)?;
            let p = self.load_scalar(&addr, pty)?;
            let p = self.access_check(p)?;
            pty = self.s.types.elem_of(pty).unwrap_or(pty);
            let (blo, bhi) = self.s.types.bounds(pty);
            (p, Value::int(blo), Value::int(bhi))
        } else {
            self.array_parts(prefix)?
        };
        let elem_ty = self.s.types.elem_of(pty).unwrap_or(self.s.types.integer);
        let esize = self.elem_size_bytes(elem_ty);
        let idx = self.emit_expr(indexes[0])?;
        let idx = self.value_cast(idx, ValKind::I64)?;
        let rebased = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = sub i64 {}, {}",
            rebased, idx.repr, lo.repr
        )?;
        let scaled = if esize == 1 {
            format!("%{}", rebased)
        } else {
            let t = self.fresh_temp();
            writeln!(self.out, "  %{} = mul i64 %{}, {}", t, rebased, esize)?;
            format!("%{}", t)
        };
        let addr = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr i8, ptr {}, i64 {}",
            addr, data.repr, scaled
        )?;
        // Multi-dimensional indexing nests through the element type.
        if indexes.len() > 1 {
            return Err(CodeGenError::Logic(
                "multi-dimensional indexing should have been nested".to_string(),
            ));
        }
        Ok(Value::new(format!("%{}", addr), ValKind::Ptr))
    }

    /// A slice produces a fat pointer: data rebased to the slice low
    /// bound, bounds set to the slice range.
    fn emit_slice(
        &mut self,
        _n: NodeId,
        prefix: NodeId,
        range: NodeId,
    ) -> Result<Value, CodeGenError> {
        let (data, alo, _ahi) = self.array_parts(prefix)?;
        let pty = self.node_ty(prefix);
        let elem_ty = self.s.types.elem_of(pty).unwrap_or(self.s.types.character);
        let esize = self.elem_size_bytes(elem_ty);
        let (slo, shi) = match self.s.ast.kind(range).clone() {
            NodeKind::RangeExpr { lo, hi } => {
                let l = self.emit_expr(lo)?;
                let l = self.value_cast(l, ValKind::I64)?;
                let h = self.emit_expr(hi)?;
                let h = self.value_cast(h, ValKind::I64)?;
                (l, h)
            }
            _ => {
                let ty = self.node_ty(range);
                let (lo, hi) = self.s.types.bounds(ty);
                (Value::int(lo), Value::int(hi))
            }
        };
        let off = self.fresh_temp();
        writeln!(self.out, "  %{} = sub i64 {}, {}", off, slo.repr, alo.repr)?;
        let scaled = if esize == 1 {
            format!("%{}", off)
        } else {
            let t = self.fresh_temp();
            writeln!(self.out, "  %{} = mul i64 %{}, {}", t, off, esize)?;
            format!("%{}", t)
        };
        let base = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr i8, ptr {}, i64 {}",
            base, data.repr, scaled
        )?;
        let data = Value::new(format!("%{}", base), ValKind::Ptr);
        self.make_fat(&data, &slo, &shi)
    }

    // ----- operators -----

    fn emit_binary(
        &mut self,
        n: NodeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<Value, CodeGenError> {
        // Overloaded operator bound to a user function.
        if let Some(sym) = self.s.ast.sym(n) {
            if self.s.syms.get(sym).is_subprogram() {
                return self.emit_direct_call(sym, &[lhs, rhs]);
            }
        }

        match op {
            BinOp::AndThen | BinOp::OrElse => {
                return self.emit_short_circuit(op, lhs, rhs);
            }
            BinOp::Cat => return self.emit_catenation(lhs, rhs),
            _ => {}
        }

        let lty = self.node_ty(lhs);
        if matches!(op, BinOp::Eq | BinOp::Neq) && self.is_composite(lty) {
            return self.emit_composite_equality(op, lhs, rhs);
        }

        let a = self.emit_expr(lhs)?;
        let b = self.emit_expr(rhs)?;
        let real = a.kind == ValKind::F64 || b.kind == ValKind::F64;
        let want = if real { ValKind::F64 } else { ValKind::I64 };
        let a = self.value_cast(a, want)?;
        let b = self.value_cast(b, want)?;

        let comparison = |pred_i: &str, pred_f: &str| -> (String, bool) {
            if real {
                (format!("fcmp {}", pred_f), true)
            } else {
                (format!("icmp {}", pred_i), true)
            }
        };

        let (instr, is_cmp) = match op {
            BinOp::Add => (if real { "fadd" } else { "add" }.to_string(), false),
            BinOp::Sub => (if real { "fsub" } else { "sub" }.to_string(), false),
            BinOp::Mul => (if real { "fmul" } else { "mul" }.to_string(), false),
            BinOp::Div => {
                if !real {
                    self.division_check(&b)?;
                }
                (if real { "fdiv" } else { "sdiv" }.to_string(), false)
            }
            BinOp::Rem => {
                self.division_check(&b)?;
                ("srem".to_string(), false)
            }
            BinOp::Mod => {
                self.division_check(&b)?;
                return self.emit_mod(&a, &b);
            }
            BinOp::Pow => {
                let t = self.fresh_temp();
                if real {
                    writeln!(
                        self.out,
                        "  %{} = call double @pow(double {}, double {})",
                        t, a.repr, b.repr
                    )?;
                    return Ok(Value::new(format!("%{}", t), ValKind::F64));
                }
                writeln!(
                    self.out,
                    "  %{} = call i64 @__ada_powi(i64 {}, i64 {})",
                    t, a.repr, b.repr
                )?;
                return Ok(Value::new(format!("%{}", t), ValKind::I64));
            }
            BinOp::And => ("and".to_string(), false),
            BinOp::Or => ("or".to_string(), false),
            BinOp::Xor => ("xor".to_string(), false),
            BinOp::Eq => comparison("eq", "oeq"),
            BinOp::Neq => comparison("ne", "one"),
            BinOp::Lt => comparison("slt", "olt"),
            BinOp::Le => comparison("sle", "ole"),
            BinOp::Gt => comparison("sgt", "ogt"),
            BinOp::Ge => comparison("sge", "oge"),
            BinOp::AndThen | BinOp::OrElse | BinOp::Cat => unreachable!("handled above"),
        };

        let t = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = {} {} {}, {}",
            t,
            instr,
            want.ir(),
            a.repr,
            b.repr
        )?;
        if is_cmp {
            let z = self.fresh_temp();
            writeln!(self.out, "  %{} = zext i1 %{} to i64", z, t)?;
            return Ok(Value::new(format!("%{}", z), ValKind::I64));
        }
        Ok(Value::new(format!("%{}", t), want))
    }

    fn division_check(&mut self, divisor: &Value) -> Result<(), CodeGenError> {
        let z = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp eq i64 {}, 0", z, divisor.repr)?;
        let raise = self.fresh_block("divraise");
        let ok = self.fresh_block("divok");
        writeln!(self.out, "  br i1 %{}, label %{}, label %{}", z, raise, ok)?;
        let exc = self.exception_global("CONSTRAINT_ERROR");
        writeln!(self.out, "{}:", raise)?;
        writeln!(self.out, "  call void @__ada_raise(ptr {})", exc)?;
        writeln!(self.out, "  unreachable")?;
        writeln!(self.out, "{}:", ok)?;
        Ok(())
    }

    /// Ada `mod` has the sign of the right operand; adjust the remainder
    /// when the signs differ.
    fn emit_mod(&mut self, a: &Value, b: &Value) -> Result<Value, CodeGenError> {
        let r = self.fresh_temp();
        writeln!(self.out, "  %{} = srem i64 {}, {}", r, a.repr, b.repr)?;
        let nz = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp ne i64 %{}, 0", nz, r)?;
        let rx = self.fresh_temp();
        writeln!(self.out, "  %{} = xor i64 %{}, {}", rx, r, b.repr)?;
        let diff = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp slt i64 %{}, 0", diff, rx)?;
        let both = self.fresh_temp();
        writeln!(self.out, "  %{} = and i1 %{}, %{}", both, nz, diff)?;
        let adj = self.fresh_temp();
        writeln!(self.out, "  %{} = add i64 %{}, {}", adj, r, b.repr)?;
        let sel = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = select i1 %{}, i64 %{}, i64 %{}",
            sel, both, adj, r
        )?;
        Ok(Value::new(format!("%{}", sel), ValKind::I64))
    }

    fn emit_short_circuit(
        &mut self,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<Value, CodeGenError> {
        let lcond = self.emit_cond(lhs)?;
        let from = self.current_block_hint();
        let eval = self.fresh_block("sc_rhs");
        let merge = self.fresh_block("sc_end");
        let (short_value, on_true, on_false) = match op {
            BinOp::AndThen => ("0", eval.clone(), merge.clone()),
            _ => ("1", merge.clone(), eval.clone()),
        };
        writeln!(
            self.out,
            "  br i1 {}, label %{}, label %{}",
            lcond, on_true, on_false
        )?;
        writeln!(self.out, "{}:", eval)?;
        let rv = self.emit_expr(rhs)?;
        let rv = self.value_cast(rv, ValKind::I64)?;
        let eval_end = self.fresh_block("sc_rhs_end");
        writeln!(self.out, "  br label %{}", eval_end)?;
        writeln!(self.out, "{}:", eval_end)?;
        writeln!(self.out, "  br label %{}", merge)?;
        writeln!(self.out, "{}:", merge)?;
        let t = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = phi i64 [ {}, %{} ], [ {}, %{} ]",
            t, short_value, from, rv.repr, eval_end
        )?;
        Ok(Value::new(format!("%{}", t), ValKind::I64))
    }

    /// The current block's label for phi predecessors. Short-circuit
    /// emission closes the predecessor with an explicit label first.
    fn current_block_hint(&mut self) -> String {
        let label = self.fresh_block("sc_from");
        let _ = writeln!(self.out, "  br label %{}", label);
        let _ = writeln!(self.out, "{}:", label);
        label
    }

    /// Catenation allocates scratch memory for the combined bytes and
    /// yields a fat pointer with bounds `1 .. total`.
    fn emit_catenation(&mut self, lhs: NodeId, rhs: NodeId) -> Result<Value, CodeGenError> {
        let (ld, llo, lhi) = self.catenand(lhs)?;
        let (rd, rlo, rhi) = self.catenand(rhs)?;
        let llen = self.span_len(&llo, &lhi)?;
        let rlen = self.span_len(&rlo, &rhi)?;
        let total = self.fresh_temp();
        writeln!(self.out, "  %{} = add i64 {}, {}", total, llen, rlen)?;
        let buf = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = call ptr @__ada_ss_alloc(i64 %{})",
            buf, total
        )?;
        writeln!(
            self.out,
            "  call void @memcpy(ptr %{}, ptr {}, i64 {})",
            buf, ld.repr, llen
        )?;
        let tail = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr i8, ptr %{}, i64 {}",
            tail, buf, llen
        )?;
        writeln!(
            self.out,
            "  call void @memcpy(ptr %{}, ptr {}, i64 {})",
            tail, rd.repr, rlen
        )?;
        let data = Value::new(format!("%{}", buf), ValKind::Ptr);
        let hi = Value::new(format!("%{}", total), ValKind::I64);
        self.make_fat(&data, &Value::int(1), &hi)
    }

    /// A catenation operand: an array value or a single element.
    fn catenand(&mut self, n: NodeId) -> Result<(Value, Value, Value), CodeGenError> {
        let ty = self.node_ty(n);
        if self.s.types.is_array(ty) {
            self.array_parts(n)
        } else {
            let v = self.emit_expr(n)?;
            let v = self.value_cast(v, ValKind::I64)?;
            let slot = self.fresh_temp();
            writeln!(self.out, "  %{} = alloca i8", slot)?;
            let byte = self.fresh_temp();
            writeln!(self.out, "  %{} = trunc i64 {} to i8", byte, v.repr)?;
            writeln!(self.out, "  store i8 %{}, ptr %{}", byte, slot)?;
            Ok((
                Value::new(format!("%{}", slot), ValKind::Ptr),
                Value::int(1),
                Value::int(1),
            ))
        }
    }

    pub(super) fn span_len(&mut self, lo: &Value, hi: &Value) -> Result<String, CodeGenError> {
        let d = self.fresh_temp();
        writeln!(self.out, "  %{} = sub i64 {}, {}", d, hi.repr, lo.repr)?;
        let l = self.fresh_temp();
        writeln!(self.out, "  %{} = add i64 %{}, 1", l, d)?;
        Ok(format!("%{}", l))
    }

    /// Array and record equality. Arrays of CHARACTER compare via strcmp
    /// on NUL-terminated scratch copies; other arrays compare element by
    /// element; records compare their underlying bytes.
    fn emit_composite_equality(
        &mut self,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    ) -> Result<Value, CodeGenError> {
        let lty = self.node_ty(lhs);
        let base = self.s.types.base_of(lty);
        let result = if self.s.types.is_array(lty) {
            let elem = self.s.types.elem_of(lty).unwrap_or(self.s.types.character);
            let elem_is_char =
                self.s.types.get(self.s.types.base_of(elem)).kind == TypeKind::Character;
            if elem_is_char {
                let l = self.nul_terminated_copy(lhs)?;
                let r = self.nul_terminated_copy(rhs)?;
                let c = self.fresh_temp();
                writeln!(
                    self.out,
                    "  %{} = call i32 @strcmp(ptr {}, ptr {})",
                    c, l.repr, r.repr
                )?;
                let eq = self.fresh_temp();
                writeln!(self.out, "  %{} = icmp eq i32 %{}, 0", eq, c)?;
                eq
            } else {
                self.elementwise_equality(lhs, rhs, elem)?
            }
        } else {
            // Records: byte comparison over the frozen layout.
            let size = self.object_size_bytes(base);
            let l = self.emit_addr(lhs)?;
            let r = self.emit_addr(rhs)?;
            let c = self.fresh_temp();
            writeln!(
                self.out,
                "  %{} = call i32 @memcmp(ptr {}, ptr {}, i64 {})",
                c, l.repr, r.repr, size
            )?;
            let eq = self.fresh_temp();
            writeln!(self.out, "  %{} = icmp eq i32 %{}, 0", eq, c)?;
            eq
        };
        let z = self.fresh_temp();
        if op == BinOp::Neq {
            let inv = self.fresh_temp();
            writeln!(self.out, "  %{} = xor i1 %{}, true", inv, result)?;
            writeln!(self.out, "  %{} = zext i1 %{} to i64", z, inv)?;
        } else {
            writeln!(self.out, "  %{} = zext i1 %{} to i64", z, result)?;
        }
        Ok(Value::new(format!("%{}", z), ValKind::I64))
    }

    fn nul_terminated_copy(&mut self, n: NodeId) -> Result<Value, CodeGenError> {
        let (data, lo, hi) = self.array_parts(n)?;
        let len = self.span_len(&lo, &hi)?;
        let size = self.fresh_temp();
        writeln!(self.out, "  %{} = add i64 {}, 1", size, len)?;
        let buf = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = call ptr @__ada_ss_alloc(i64 %{})",
            buf, size
        )?;
        writeln!(
            self.out,
            "  call void @memcpy(ptr %{}, ptr {}, i64 {})",
            buf, data.repr, len
        )?;
        let end = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr i8, ptr %{}, i64 {}",
            end, buf, len
        )?;
        writeln!(self.out, "  store i8 0, ptr %{}", end)?;
        Ok(Value::new(format!("%{}", buf), ValKind::Ptr))
    }

    fn elementwise_equality(
        &mut self,
        lhs: NodeId,
        rhs: NodeId,
        elem: TypeId,
    ) -> Result<String, CodeGenError> {
        let (ld, llo, lhi) = self.array_parts(lhs)?;
        let (rd, rlo, rhi) = self.array_parts(rhs)?;
        let llen = self.span_len(&llo, &lhi)?;
        let rlen = self.span_len(&rlo, &rhi)?;
        let esize = self.elem_size_bytes(elem);
        let unit = self.store_unit(elem);

        let len_eq = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp eq i64 {}, {}", len_eq, llen, rlen)?;
        let head = self.fresh_block("aeq_head");
        let body = self.fresh_block("aeq_body");
        let step = self.fresh_block("aeq_step");
        let done = self.fresh_block("aeq_done");
        let entry = self.fresh_block("aeq_entry");
        writeln!(self.out, "  br label %{}", entry)?;
        writeln!(self.out, "{}:", entry)?;
        writeln!(
            self.out,
            "  br i1 %{}, label %{}, label %{}",
            len_eq, head, done
        )?;
        writeln!(self.out, "{}:", head)?;
        let i = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = phi i64 [ 0, %{} ], [ %{}.next, %{} ]",
            i, entry, i, step
        )?;
        let at_end = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp sge i64 %{}, {}", at_end, i, llen)?;
        writeln!(
            self.out,
            "  br i1 %{}, label %{}, label %{}",
            at_end, done, body
        )?;
        writeln!(self.out, "{}:", body)?;
        let off = self.fresh_temp();
        writeln!(self.out, "  %{} = mul i64 %{}, {}", off, i, esize)?;
        let lp = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr i8, ptr {}, i64 %{}",
            lp, ld.repr, off
        )?;
        let rp = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr i8, ptr {}, i64 %{}",
            rp, rd.repr, off
        )?;
        let lv = self.fresh_temp();
        writeln!(self.out, "  %{} = load {}, ptr %{}", lv, unit, lp)?;
        let rv = self.fresh_temp();
        writeln!(self.out, "  %{} = load {}, ptr %{}", rv, unit, rp)?;
        let elem_eq = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = icmp eq {} %{}, %{}",
            elem_eq, unit, lv, rv
        )?;
        writeln!(
            self.out,
            "  br i1 %{}, label %{}, label %{}",
            elem_eq, step, done
        )?;
        writeln!(self.out, "{}:", step)?;
        writeln!(self.out, "  %{}.next = add i64 %{}, 1", i, i)?;
        writeln!(self.out, "  br label %{}", head)?;
        writeln!(self.out, "{}:", done)?;
        let eq = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = phi i1 [ false, %{} ], [ true, %{} ], [ false, %{} ]",
            eq, entry, head, body
        )?;
        Ok(eq)
    }

    fn emit_unary(
        &mut self,
        _n: NodeId,
        op: UnOp,
        operand: NodeId,
    ) -> Result<Value, CodeGenError> {
        let v = self.emit_expr(operand)?;
        match op {
            UnOp::Plus => Ok(v),
            UnOp::Minus => {
                let t = self.fresh_temp();
                if v.kind == ValKind::F64 {
                    writeln!(self.out, "  %{} = fneg double {}", t, v.repr)?;
                    Ok(Value::new(format!("%{}", t), ValKind::F64))
                } else {
                    writeln!(self.out, "  %{} = sub i64 0, {}", t, v.repr)?;
                    Ok(Value::new(format!("%{}", t), ValKind::I64))
                }
            }
            UnOp::Not => {
                let v = self.value_cast(v, ValKind::I64)?;
                let t = self.fresh_temp();
                writeln!(self.out, "  %{} = xor i64 {}, 1", t, v.repr)?;
                Ok(Value::new(format!("%{}", t), ValKind::I64))
            }
            UnOp::Abs => {
                if v.kind == ValKind::F64 {
                    let neg = self.fresh_temp();
                    writeln!(self.out, "  %{} = fneg double {}", neg, v.repr)?;
                    let cmp = self.fresh_temp();
                    writeln!(
                        self.out,
                        "  %{} = fcmp olt double {}, 0.000000e+00",
                        cmp, v.repr
                    )?;
                    let t = self.fresh_temp();
                    writeln!(
                        self.out,
                        "  %{} = select i1 %{}, double %{}, double {}",
                        t, cmp, neg, v.repr
                    )?;
                    Ok(Value::new(format!("%{}", t), ValKind::F64))
                } else {
                    let neg = self.fresh_temp();
                    writeln!(self.out, "  %{} = sub i64 0, {}", neg, v.repr)?;
                    let cmp = self.fresh_temp();
                    writeln!(self.out, "  %{} = icmp slt i64 {}, 0", cmp, v.repr)?;
                    let t = self.fresh_temp();
                    writeln!(
                        self.out,
                        "  %{} = select i1 %{}, i64 %{}, i64 {}",
                        t, cmp, neg, v.repr
                    )?;
                    Ok(Value::new(format!("%{}", t), ValKind::I64))
                }
            }
        }
    }

    // ----- attributes, membership, checks -----

    /// Attributes that survive folding need runtime values: array bounds
    /// from fat pointers, IMAGE/VALUE through the runtime helpers.
    fn emit_attr(
        &mut self,
        n: NodeId,
        prefix: NodeId,
        attr: crate::intern::NameId,
        args: &[NodeId],
    ) -> Result<Value, CodeGenError> {
        let attr_name = self.s.names.lower(attr).to_string();
        match attr_name.as_str() {
            "first" | "last" | "length" => {
                let (_, lo, hi) = self.array_parts(prefix)?;
                match attr_name.as_str() {
                    "first" => Ok(lo),
                    "last" => Ok(hi),
                    _ => {
                        let len = self.span_len(&lo, &hi)?;
                        Ok(Value::new(len, ValKind::I64))
                    }
                }
            }
            "image" => {
                let arg = args.first().copied().ok_or_else(|| {
                    CodeGenError::Logic("IMAGE requires an argument".to_string())
                })?;
                let arg = self.assoc_value(arg);
                let prefix_ty = self.node_ty(prefix);
                let v = self.emit_expr(arg)?;
                let v = self.value_cast(v, ValKind::I64)?;
                let base = self.s.types.base_of(prefix_ty);
                let text = self.fresh_temp();
                if self.s.types.get(base).kind == TypeKind::Enum {
                    let table = self.enum_table(base)?;
                    writeln!(
                        self.out,
                        "  %{} = call ptr @__ada_image_enum(i64 {}, ptr {})",
                        text, v.repr, table
                    )?;
                } else {
                    writeln!(
                        self.out,
                        "  %{} = call ptr @__ada_image_int(i64 {})",
                        text, v.repr
                    )?;
                }
                let len = self.fresh_temp();
                writeln!(self.out, "  %{} = call i64 @strlen(ptr %{})", len, text)?;
                let data = Value::new(format!("%{}", text), ValKind::Ptr);
                let hi = Value::new(format!("%{}", len), ValKind::I64);
                self.make_fat(&data, &Value::int(1), &hi)
            }
            "value" => {
                let arg = args.first().copied().ok_or_else(|| {
                    CodeGenError::Logic("VALUE requires an argument".to_string())
                })?;
                let arg = self.assoc_value(arg);
                let text = self.nul_terminated_copy(arg)?;
                let t = self.fresh_temp();
                writeln!(
                    self.out,
                    "  %{} = call i64 @__ada_value_int(ptr {})",
                    t, text.repr
                )?;
                Ok(Value::new(format!("%{}", t), ValKind::I64))
            }
            "address" => {
                let addr = self.emit_addr(prefix)?;
                self.value_cast(addr, ValKind::I64)
            }
            "callable" => Ok(Value::int(1)),
            "terminated" | "count" => Ok(Value::int(0)),
            "range" => {
                // Consumed by loops and slices; as a value, the low bound.
                let (_, lo, _) = self.array_parts(prefix)?;
                Ok(lo)
            }
            _ => {
                let _ = n;
                Err(CodeGenError::Logic(format!(
                    "attribute '{}' was not folded",
                    attr_name
                )))
            }
        }
    }

    pub(super) fn assoc_value(&self, n: NodeId) -> NodeId {
        match self.s.ast.kind(n) {
            NodeKind::Assoc { value, .. } => *value,
            _ => n,
        }
    }

    /// Image table for an enumeration type: an array of pointers to the
    /// literal names, indexed by position.
    fn enum_table(&mut self, ty: TypeId) -> Result<String, CodeGenError> {
        if let Some(existing) = self.enum_tables.get(&ty.0) {
            return Ok(existing.clone());
        }
        let lits = self.s.types.get(ty).literals.clone();
        let mut entries = Vec::new();
        for lit in &lits {
            let upper = self.s.names.upper(self.s.syms.get(*lit).name);
            let name = self.intern_string(upper.as_bytes());
            entries.push(name);
        }
        let table = format!("@.enumtab.{}", ty.0);
        let mut line = format!(
            "{} = private unnamed_addr constant [{} x ptr] [",
            table,
            entries.len()
        );
        for (i, e) in entries.iter().enumerate() {
            if i > 0 {
                line.push_str(", ");
            }
            line.push_str(&format!("ptr {}", e));
        }
        line.push(']');
        let _ = writeln!(self.string_globals, "{}", line);
        self.enum_tables.insert(ty.0, table.clone());
        Ok(table)
    }

    fn emit_membership(
        &mut self,
        expr: NodeId,
        target: NodeId,
        negated: bool,
    ) -> Result<Value, CodeGenError> {
        let v = self.emit_expr(expr)?;
        let v = self.value_cast(v, ValKind::I64)?;
        let (lo, hi) = match self.s.ast.kind(target).clone() {
            NodeKind::RangeExpr { lo, hi } => {
                let l = self.emit_expr(lo)?;
                let l = self.value_cast(l, ValKind::I64)?;
                let h = self.emit_expr(hi)?;
                let h = self.value_cast(h, ValKind::I64)?;
                (l, h)
            }
            _ => {
                let ty = self.node_ty(target);
                let (lo, hi) = self.s.types.bounds(ty);
                (Value::int(lo), Value::int(hi))
            }
        };
        let ge = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp sge i64 {}, {}", ge, v.repr, lo.repr)?;
        let le = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp sle i64 {}, {}", le, v.repr, hi.repr)?;
        let both = self.fresh_temp();
        writeln!(self.out, "  %{} = and i1 %{}, %{}", both, ge, le)?;
        let z = self.fresh_temp();
        if negated {
            let inv = self.fresh_temp();
            writeln!(self.out, "  %{} = xor i1 %{}, true", inv, both)?;
            writeln!(self.out, "  %{} = zext i1 %{} to i64", z, inv)?;
        } else {
            writeln!(self.out, "  %{} = zext i1 %{} to i64", z, both)?;
        }
        Ok(Value::new(format!("%{}", z), ValKind::I64))
    }

    /// A check node: range test, branch to a raise block on violation.
    fn emit_check(
        &mut self,
        check: CheckKind,
        expr: NodeId,
        lo: i64,
        hi: i64,
    ) -> Result<Value, CodeGenError> {
        let v = self.emit_expr(expr)?;
        let v = self.value_cast(v, ValKind::I64)?;
        let below = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp slt i64 {}, {}", below, v.repr, lo)?;
        let above = self.fresh_temp();
        writeln!(self.out, "  %{} = icmp sgt i64 {}, {}", above, v.repr, hi)?;
        let bad = self.fresh_temp();
        writeln!(self.out, "  %{} = or i1 %{}, %{}", bad, below, above)?;
        let raise = self.fresh_block("rangeraise");
        let ok = self.fresh_block("rangeok");
        writeln!(self.out, "  br i1 %{}, label %{}, label %{}", bad, raise, ok)?;
        let exc = self.exception_global(check.exception_name());
        writeln!(self.out, "{}:", raise)?;
        writeln!(self.out, "  call void @__ada_raise(ptr {})", exc)?;
        writeln!(self.out, "  unreachable")?;
        writeln!(self.out, "{}:", ok)?;
        Ok(v)
    }

    // ----- allocators and aggregates -----

    fn emit_allocator(
        &mut self,
        n: NodeId,
        _subtype: NodeId,
        init: Option<NodeId>,
    ) -> Result<Value, CodeGenError> {
        let access_ty = self.node_ty(n);
        let designated = self
            .s
            .types
            .elem_of(access_ty)
            .unwrap_or(self.s.types.integer);
        let size = self.object_size_bytes(designated);
        let p = self.fresh_temp();
        writeln!(self.out, "  %{} = call ptr @malloc(i64 {})", p, size)?;
        let addr = Value::new(format!("%{}", p), ValKind::Ptr);
        if let Some(init) = init {
            if self.is_composite(designated) {
                self.copy_composite(&addr, init, designated)?;
            } else {
                let v = self.emit_expr(init)?;
                self.store_scalar(&addr, v, designated)?;
            }
        }
        Ok(addr)
    }

    pub(super) fn alloca_object(&mut self, ty: TypeId) -> Result<Value, CodeGenError> {
        let t = self.fresh_temp();
        if self.is_fat(ty) {
            writeln!(self.out, "  %{} = alloca %__fat", t)?;
        } else if self.is_composite(ty) {
            let size = self.object_size_bytes(ty);
            writeln!(self.out, "  %{} = alloca [{} x i8]", t, size)?;
        } else {
            writeln!(self.out, "  %{} = alloca {}", t, self.store_unit(ty))?;
        }
        Ok(Value::new(format!("%{}", t), ValKind::Ptr))
    }

    /// Store an aggregate's normalized positional components into storage.
    pub(super) fn emit_aggregate_into(
        &mut self,
        n: NodeId,
        addr: &Value,
        ty: TypeId,
    ) -> Result<(), CodeGenError> {
        let assocs = match self.s.ast.kind(n).clone() {
            NodeKind::Aggregate { assocs } => assocs,
            _ => return Ok(()),
        };
        if self.s.types.is_array(ty) {
            let elem = self.s.types.elem_of(ty).unwrap_or(self.s.types.integer);
            let esize = self.elem_size_bytes(elem);
            let unit = self.store_unit(elem);
            for (i, &a) in assocs.iter().enumerate() {
                let value = self.assoc_value(a);
                let v = self.emit_expr(value)?;
                let slot = self.fresh_temp();
                writeln!(
                    self.out,
                    "  %{} = getelementptr i8, ptr {}, i64 {}",
                    slot,
                    addr.repr,
                    i as i64 * esize
                )?;
                if self.is_composite(elem) {
                    writeln!(
                        self.out,
                        "  call void @memcpy(ptr %{}, ptr {}, i64 {})",
                        slot, v.repr, esize
                    )?;
                } else {
                    let v = self.value_cast(v, self.val_kind(elem))?;
                    let narrow = self.narrow_store(&v, unit)?;
                    writeln!(self.out, "  store {} {}, ptr %{}", unit, narrow, slot)?;
                }
            }
        } else {
            let base = self.s.types.base_of(ty);
            let members: Vec<_> = {
                let info = self.s.types.get(base);
                info.discriminants
                    .iter()
                    .chain(info.components.iter())
                    .copied()
                    .collect()
            };
            for (i, &a) in assocs.iter().enumerate() {
                let Some(&member) = members.get(i) else { break };
                let value = self.assoc_value(a);
                let (offset, mty) = {
                    let m = self.s.syms.get(member);
                    (m.offset, m.ty.unwrap_or(self.s.types.integer))
                };
                let slot = self.fresh_temp();
                writeln!(
                    self.out,
                    "  %{} = getelementptr i8, ptr {}, i64 {}",
                    slot, addr.repr, offset
                )?;
                let slot_v = Value::new(format!("%{}", slot), ValKind::Ptr);
                if self.is_composite(mty) {
                    self.copy_composite(&slot_v, value, mty)?;
                } else {
                    let v = self.emit_expr(value)?;
                    self.store_scalar(&slot_v, v, mty)?;
                }
            }
        }
        Ok(())
    }

    /// Truncate an i64 value for narrow storage units.
    fn narrow_store(&mut self, v: &Value, unit: &str) -> Result<String, CodeGenError> {
        if unit == "i8" {
            let t = self.fresh_temp();
            writeln!(self.out, "  %{} = trunc i64 {} to i8", t, v.repr)?;
            Ok(format!("%{}", t))
        } else {
            Ok(v.repr.clone())
        }
    }

    /// Copy a composite value into `dest`.
    pub(super) fn copy_composite(
        &mut self,
        dest: &Value,
        src: NodeId,
        ty: TypeId,
    ) -> Result<(), CodeGenError> {
        if let NodeKind::Aggregate { .. } = self.s.ast.kind(src) {
            return self.emit_aggregate_into(src, dest, ty);
        }
        if self.is_fat(ty) {
            // Copy the descriptor (two words).
            let v = self.fat_for(src)?;
            writeln!(
                self.out,
                "  call void @memcpy(ptr {}, ptr {}, i64 16)",
                dest.repr, v.repr
            )?;
            return Ok(());
        }
        let sty = self.node_ty(src);
        if self.is_fat(sty) && self.s.types.is_array(ty) {
            // Fat source into constrained destination: copy the data.
            let (data, lo, hi) = self.array_parts(src)?;
            let len = self.span_len(&lo, &hi)?;
            let elem = self.s.types.elem_of(ty).unwrap_or(self.s.types.character);
            let esize = self.elem_size_bytes(elem);
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
                dest.repr, data.repr, bytes
            )?;
            return Ok(());
        }
        let v = self.emit_addr(src)?;
        let size = self.object_size_bytes(ty);
        writeln!(
            self.out,
            "  call void @memcpy(ptr {}, ptr {}, i64 {})",
            dest.repr, v.repr, size
        )?;
        Ok(())
    }

    // ----- calls -----

    fn emit_call(
        &mut self,
        n: NodeId,
        callee: NodeId,
        args: &[NodeId],
    ) -> Result<Value, CodeGenError> {
        let sym = self
            .s
            .ast
            .sym(n)
            .or_else(|| self.s.ast.sym(callee))
            .ok_or_else(|| CodeGenError::Logic("call has no resolved subprogram".to_string()))?;
        self.emit_direct_call(sym, args)
    }

    pub(super) fn emit_direct_call(
        &mut self,
        sym: SymId,
        args: &[NodeId],
    ) -> Result<Value, CodeGenError> {
        let info = self.s.syms.get(sym).clone();
        if info.kind == SymKind::Entry {
            // Entries are handled at the declaration level only.
            return Ok(Value::int(0));
        }
        let name = mangle_symbol(self.s, sym);

        // Flattened formal modes aligned with the formal types.
        let mut modes: Vec<ParamMode> = Vec::new();
        for &p in &info.param_nodes {
            if let NodeKind::Param { names, mode, .. } = self.s.ast.kind(p) {
                for _ in names {
                    modes.push(*mode);
                }
            }
        }
        while modes.len() < info.params.len() {
            modes.push(ParamMode::In);
        }

        let mut call_args: Vec<String> = Vec::new();
        for (i, &arg) in args.iter().enumerate() {
            let arg = self.assoc_value(arg);
            let formal_ty = info.params.get(i).copied().unwrap_or(self.s.types.integer);
            let mode = modes.get(i).copied().unwrap_or(ParamMode::In);
            // Shims that fill an out-parameter take the slot's address.
            let shim_out = info
                .ext_name
                .as_deref()
                .map(|e| e == "__text_io_get_char")
                .unwrap_or(false);
            if self.is_fat(formal_ty) {
                let fat = self.fat_for(arg)?;
                call_args.push(format!("ptr {}", fat.repr));
            } else if self.is_composite(formal_ty) {
                let addr = self.emit_addr(arg)?;
                call_args.push(format!("ptr {}", addr.repr));
            } else if mode != ParamMode::In || shim_out {
                let addr = self.emit_addr(arg)?;
                call_args.push(format!("ptr {}", addr.repr));
            } else {
                let v = self.emit_expr(arg)?;
                let kind = self.val_kind(formal_ty);
                let v = self.value_cast(v, kind)?;
                call_args.push(format!("{} {}", kind.ir(), v.repr));
            }
        }

        // Nested subprograms receive the enclosing frame.
        if needs_static_link(self.s, sym) {
            let link = self.static_link_for(info.level)?;
            call_args.push(format!("ptr {}", link));
        }

        let joined = call_args.join(", ");
        match info.ret {
            Some(ret_ty) => {
                let kind = self.val_kind(ret_ty);
                let t = self.fresh_temp();
                writeln!(
                    self.out,
                    "  %{} = call {} @{}({})",
                    t,
                    kind.ir(),
                    name,
                    joined
                )?;
                Ok(Value::new(format!("%{}", t), kind))
            }
            None => {
                writeln!(self.out, "  call void @{}({})", name, joined)?;
                Ok(Value::int(0))
            }
        }
    }

    /// Frame pointer for a callee declared at `callee_level`.
    fn static_link_for(&mut self, callee_level: u32) -> Result<String, CodeGenError> {
        if callee_level >= self.current_level {
            // A child (or sibling at the same level) of the current
            // subprogram: pass our own frame.
            if self.current_has_frame {
                return Ok("%__frame".to_string());
            }
            if self.current_has_link {
                return Ok("%__link".to_string());
            }
            return Ok("null".to_string());
        }
        if !self.current_has_link {
            return Ok("null".to_string());
        }
        let mut frame = "%__link".to_string();
        let hops = self.current_level - 1 - callee_level;
        for _ in 0..hops {
            let t = self.fresh_temp();
            writeln!(
                self.out,
                "  %{} = getelementptr ptr, ptr {}, i64 {}",
                t,
                frame,
                super::FRAME_LINK_SLOT
            )?;
            let l = self.fresh_temp();
            writeln!(self.out, "  %{} = load ptr, ptr %{}", l, t)?;
            frame = format!("%{}", l);
        }
        Ok(frame)
    }
}
