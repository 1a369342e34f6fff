//! Declaration emission
//!
//! Subprograms become function definitions; package-level objects become
//! globals initialized by a per-package `__elab` constructor registered in
//! `@llvm.global_ctors`; task bodies become thread routines spawned
//! through `__ada_task_trampoline`; generic instantiations emit their
//! resolved clone.

use super::{
    mangle_global, mangle_symbol, param_by_ref, CodeGen, CodeGenError, ValKind, Value,
    FRAME_LINK_SLOT, FRAME_SLOTS,
};
use crate::ast::{NodeId, NodeKind, ParamMode};
use crate::symbols::{SymId, SymKind};
use crate::types::TypeId;
use std::fmt::Write as _;

impl CodeGen<'_> {
    // ----- local declarative parts -----

    /// Emit the locals of a declarative part into the current function.
    /// Nested subprogram bodies queue up for emission after the enclosing
    /// function is closed.
    pub(super) fn emit_local_decls(&mut self, decls: &[NodeId]) -> Result<(), CodeGenError> {
        for &d in decls {
            match self.s.ast.kind(d).clone() {
                NodeKind::ObjectDecl { init, .. } => {
                    self.emit_local_object(d, init)?;
                }
                NodeKind::SubprogBody { .. } | NodeKind::TaskBody { .. } => {
                    self.pending_nested.push(d);
                }
                NodeKind::Instantiation { .. } => {
                    if let Some(&clone) = self.s.instance_bodies.get(&d) {
                        self.pending_nested.push(clone);
                    }
                }
                NodeKind::TaskSpec { is_type, .. } if !is_type => {
                    self.emit_task_spawn(d)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn emit_local_object(
        &mut self,
        decl: NodeId,
        init: Option<NodeId>,
    ) -> Result<(), CodeGenError> {
        let ids = self.s.decl_syms.get(&decl).cloned().unwrap_or_default();
        for id in ids {
            let (uid, ty) = {
                let sym = self.s.syms.get(id);
                (sym.uid, sym.ty.unwrap_or(self.s.types.integer))
            };
            let slot = self.alloca_object(ty)?;
            self.locals.insert(uid, slot.repr.clone());
            self.register_frame_slot(uid, &slot)?;
            match init {
                Some(init) => {
                    if self.is_composite(ty) || self.is_fat(ty) {
                        self.copy_composite(&slot, init, ty)?;
                    } else {
                        let v = self.emit_expr(init)?;
                        self.store_scalar(&slot, v, ty)?;
                    }
                }
                None => {
                    if !self.is_composite(ty) && !self.is_fat(ty) {
                        let zero = match self.store_unit(ty) {
                            "i8" => "i8 0",
                            "double" => "double 0.000000e+00",
                            "ptr" => "ptr null",
                            _ => "i64 0",
                        };
                        writeln!(self.out, "  store {}, ptr {}", zero, slot.repr)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// When the current subprogram carries a static-link frame, publish a
    /// local's address in the next frame slot so nested subprograms can
    /// reach it.
    fn register_frame_slot(&mut self, uid: u32, addr: &Value) -> Result<(), CodeGenError> {
        if !self.current_has_frame {
            return Ok(());
        }
        let next = self.next_frame_slot;
        if next >= FRAME_LINK_SLOT {
            return Ok(());
        }
        self.next_frame_slot += 1;
        self.frame_slots.insert(uid, next);
        let t = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = getelementptr ptr, ptr %__frame, i64 {}",
            t, next
        )?;
        writeln!(self.out, "  store ptr {}, ptr %{}", addr.repr, t)?;
        Ok(())
    }

    // ----- subprograms -----

    pub(super) fn emit_subprogram(&mut self, body: NodeId) -> Result<(), CodeGenError> {
        let (spec, decls, stmts, handlers) = match self.s.ast.kind(body).clone() {
            NodeKind::SubprogBody {
                spec,
                decls,
                stmts,
                handlers,
            } => (spec, decls, stmts, handlers),
            NodeKind::TaskBody { .. } => return self.emit_task_body(body),
            NodeKind::PackageSpec { .. } => return self.emit_package_spec(body),
            NodeKind::PackageBody { .. } => return self.emit_package_body(body),
            _ => return Ok(()),
        };
        let sym = match self.s.ast.sym(body).or_else(|| self.s.ast.sym(spec)) {
            Some(sym) => sym,
            None => return Ok(()),
        };
        let info = self.s.syms.get(sym).clone();
        if info.external || !self.emitted.insert(info.uid) {
            return Ok(());
        }

        let has_nested = decls.iter().any(|&d| {
            matches!(
                self.s.ast.kind(d),
                NodeKind::SubprogBody { .. }
                    | NodeKind::Instantiation { .. }
                    | NodeKind::TaskBody { .. }
            )
        });
        let has_link = info.level > 0;

        // Swap emission state for this function.
        let saved_out = std::mem::take(&mut self.out);
        let saved_locals = std::mem::take(&mut self.locals);
        let saved_byref = std::mem::take(&mut self.byref);
        let saved_labels = std::mem::take(&mut self.label_blocks);
        let saved_loops = std::mem::take(&mut self.loop_stack);
        let saved_fn = self.current_fn;
        let saved_level = self.current_level;
        let saved_frame = self.current_has_frame;
        let saved_link = self.current_has_link;
        let saved_ret = self.ret_kind;
        let saved_next_slot = self.next_frame_slot;
        self.current_fn = Some(sym);
        self.current_level = info.level + 1;
        self.current_has_frame = has_nested;
        self.current_has_link = has_link;
        self.ret_kind = info.ret.map(|t| self.val_kind(t));
        self.next_frame_slot = 0;

        // Signature.
        let mangled = mangle_symbol(self.s, sym);
        let ret_ir = self.ret_kind.map(|k| k.ir()).unwrap_or("void");
        let mut sig_params: Vec<String> = Vec::new();
        let mut entries: Vec<(u32, TypeId, ParamMode, String)> = Vec::new();
        let mut flat = 0usize;
        for &p in &info.param_nodes {
            if let NodeKind::Param { names, mode, .. } = self.s.ast.kind(p).clone() {
                let ids = self.s.decl_syms.get(&p).cloned().unwrap_or_default();
                for (i, _) in names.iter().enumerate() {
                    let ty = info
                        .params
                        .get(flat)
                        .copied()
                        .unwrap_or(self.s.types.integer);
                    let uid = ids
                        .get(i)
                        .map(|&id| self.s.syms.get(id).uid)
                        .unwrap_or(u32::MAX);
                    let pname = format!("p{}", flat);
                    let by_ref = param_by_ref(self.s, mode, ty) || self.is_fat(ty);
                    let ir = if by_ref { "ptr" } else { self.val_kind(ty).ir() };
                    sig_params.push(format!("{} %{}", ir, pname));
                    entries.push((uid, ty, mode, pname));
                    flat += 1;
                }
            }
        }
        if has_link {
            sig_params.push("ptr %__link".to_string());
        }
        writeln!(
            self.out,
            "define {} @{}({}) {{",
            ret_ir,
            mangled,
            sig_params.join(", ")
        )?;
        writeln!(self.out, "entry:")?;
        if has_nested {
            writeln!(self.out, "  %__frame = alloca [{} x ptr]", FRAME_SLOTS)?;
            let link_value = if has_link { "%__link" } else { "null" };
            let t = self.fresh_temp();
            writeln!(
                self.out,
                "  %{} = getelementptr ptr, ptr %__frame, i64 {}",
                t, FRAME_LINK_SLOT
            )?;
            writeln!(self.out, "  store ptr {}, ptr %{}", link_value, t)?;
        }
        let pending_mark = self.pending_nested.len();

        // Parameter slots.
        for (uid, ty, mode, pname) in &entries {
            let by_ref = param_by_ref(self.s, *mode, *ty) || self.is_fat(*ty);
            let slot = self.fresh_temp();
            if by_ref {
                writeln!(self.out, "  %{} = alloca ptr", slot)?;
                writeln!(self.out, "  store ptr %{}, ptr %{}", pname, slot)?;
                self.byref.insert(*uid);
            } else {
                let kind = self.val_kind(*ty);
                writeln!(self.out, "  %{} = alloca {}", slot, kind.ir())?;
                writeln!(
                    self.out,
                    "  store {} %{}, ptr %{}",
                    kind.ir(),
                    pname,
                    slot
                )?;
            }
            self.locals.insert(*uid, format!("%{}", slot));
            if self.current_has_frame {
                // Publish the value address for nested subprograms.
                if by_ref {
                    let a = self.fresh_temp();
                    writeln!(self.out, "  %{} = load ptr, ptr %{}", a, slot)?;
                    let v = Value::new(format!("%{}", a), ValKind::Ptr);
                    self.register_frame_slot(*uid, &v)?;
                } else {
                    let v = Value::new(format!("%{}", slot), ValKind::Ptr);
                    self.register_frame_slot(*uid, &v)?;
                }
            }
        }

        self.emit_local_decls(&decls)?;
        self.emit_handled(&stmts, &handlers)?;

        // Implicit terminator.
        match self.ret_kind {
            None => writeln!(self.out, "  ret void")?,
            Some(ValKind::I64) => writeln!(self.out, "  ret i64 0")?,
            Some(ValKind::F64) => writeln!(self.out, "  ret double 0.000000e+00")?,
            Some(ValKind::Ptr) => writeln!(self.out, "  ret ptr null")?,
        }
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;

        let body_text = std::mem::take(&mut self.out);
        self.funcs.push_str(&body_text);

        // Restore enclosing state, then emit nested bodies as their own
        // functions (they chase this frame through their link parameter).
        self.out = saved_out;
        self.locals = saved_locals;
        self.byref = saved_byref;
        self.label_blocks = saved_labels;
        self.loop_stack = saved_loops;
        self.current_fn = saved_fn;
        self.current_level = saved_level;
        self.current_has_frame = saved_frame;
        self.current_has_link = saved_link;
        self.ret_kind = saved_ret;
        self.next_frame_slot = saved_next_slot;

        let nested = self.pending_nested.split_off(pending_mark);
        for n in nested {
            self.emit_subprogram(n)?;
        }
        Ok(())
    }

    // ----- packages -----

    pub(super) fn emit_package_spec(&mut self, n: NodeId) -> Result<(), CodeGenError> {
        let (visible, private) = match self.s.ast.kind(n).clone() {
            NodeKind::PackageSpec {
                visible, private, ..
            } => (visible, private),
            _ => return Ok(()),
        };
        let pkg = self.s.ast.sym(n);
        let mut elab: Vec<NodeId> = Vec::new();
        for &d in visible.iter().chain(private.iter()) {
            self.emit_package_decl(d, &mut elab)?;
        }
        if !elab.is_empty() {
            self.emit_elab_fn(pkg, &elab, &[], &[])?;
        }
        Ok(())
    }

    pub(super) fn emit_package_body(&mut self, n: NodeId) -> Result<(), CodeGenError> {
        let (decls, stmts, handlers) = match self.s.ast.kind(n).clone() {
            NodeKind::PackageBody {
                decls,
                stmts,
                handlers,
                ..
            } => (decls, stmts, handlers),
            _ => return Ok(()),
        };
        let pkg = self.s.ast.sym(n);
        let mut elab: Vec<NodeId> = Vec::new();
        for &d in &decls {
            self.emit_package_decl(d, &mut elab)?;
        }
        if !elab.is_empty() || !stmts.is_empty() {
            self.emit_elab_fn(pkg, &elab, &stmts, &handlers)?;
        }
        Ok(())
    }

    fn emit_package_decl(
        &mut self,
        d: NodeId,
        elab: &mut Vec<NodeId>,
    ) -> Result<(), CodeGenError> {
        match self.s.ast.kind(d).clone() {
            NodeKind::ObjectDecl { init, .. } => {
                let ids = self.s.decl_syms.get(&d).cloned().unwrap_or_default();
                for id in ids {
                    self.emit_global(id)?;
                }
                if init.is_some() {
                    elab.push(d);
                }
            }
            NodeKind::SubprogBody { .. } => self.emit_subprogram(d)?,
            NodeKind::Instantiation { .. } => {
                if let Some(&clone) = self.s.instance_bodies.get(&d) {
                    self.emit_subprogram(clone)?;
                }
            }
            NodeKind::PackageSpec { .. } => self.emit_package_spec(d)?,
            NodeKind::PackageBody { .. } => self.emit_package_body(d)?,
            NodeKind::TaskBody { .. } => self.emit_task_body(d)?,
            NodeKind::TaskSpec { is_type, .. } if !is_type => elab.push(d),
            _ => {}
        }
        Ok(())
    }

    fn emit_global(&mut self, id: SymId) -> Result<(), CodeGenError> {
        let (uid, ty) = {
            let sym = self.s.syms.get(id);
            (sym.uid, sym.ty.unwrap_or(self.s.types.integer))
        };
        let name = format!("@{}", mangle_global(self.s, id));
        let init = if self.is_fat(ty) {
            "%__fat zeroinitializer".to_string()
        } else if self.is_composite(ty) {
            format!("[{} x i8] zeroinitializer", self.object_size_bytes(ty))
        } else {
            match self.store_unit(ty) {
                "i8" => "i8 0".to_string(),
                "double" => "double 0.000000e+00".to_string(),
                "ptr" => "ptr null".to_string(),
                _ => "i64 0".to_string(),
            }
        };
        let _ = writeln!(self.globals, "{} = global {}", name, init);
        self.locals.insert(uid, name);
        Ok(())
    }

    /// Elaboration constructor for a package: global initializers, task
    /// spawns, then the body's statement sequence. Registered in
    /// `@llvm.global_ctors` at priority 65535 by the module assembler;
    /// each subprogram appears in that list at most once.
    fn emit_elab_fn(
        &mut self,
        pkg: Option<SymId>,
        inits: &[NodeId],
        stmts: &[NodeId],
        handlers: &[NodeId],
    ) -> Result<(), CodeGenError> {
        let ctor = match pkg {
            Some(p) => format!("__elab_{}", mangle_symbol(self.s, p)),
            None => format!("__elab_anon{}", self.ctors.len()),
        };
        if self.ctors.contains(&ctor) {
            return Ok(());
        }
        let saved_out = std::mem::take(&mut self.out);
        let saved_ret = self.ret_kind;
        self.ret_kind = None;
        writeln!(self.out, "define internal void @{}() {{", ctor)?;
        writeln!(self.out, "entry:")?;
        for &d in inits {
            match self.s.ast.kind(d).clone() {
                NodeKind::ObjectDecl {
                    init: Some(init), ..
                } => {
                    let ids = self.s.decl_syms.get(&d).cloned().unwrap_or_default();
                    for id in ids {
                        let ty = self
                            .s
                            .syms
                            .get(id)
                            .ty
                            .unwrap_or(self.s.types.integer);
                        let addr = self.sym_addr(id)?;
                        if self.is_composite(ty) || self.is_fat(ty) {
                            self.copy_composite(&addr, init, ty)?;
                        } else {
                            let v = self.emit_expr(init)?;
                            self.store_scalar(&addr, v, ty)?;
                        }
                    }
                }
                NodeKind::TaskSpec { .. } => self.emit_task_spawn(d)?,
                _ => {}
            }
        }
        self.emit_handled(stmts, handlers)?;
        writeln!(self.out, "  ret void")?;
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;
        let text = std::mem::take(&mut self.out);
        self.funcs.push_str(&text);
        self.out = saved_out;
        self.ret_kind = saved_ret;
        self.ctors.push(ctor);
        Ok(())
    }

    // ----- tasks -----

    pub(super) fn emit_task_body(&mut self, n: NodeId) -> Result<(), CodeGenError> {
        let (decls, stmts, handlers) = match self.s.ast.kind(n).clone() {
            NodeKind::TaskBody {
                decls,
                stmts,
                handlers,
                ..
            } => (decls, stmts, handlers),
            _ => return Ok(()),
        };
        let sym = match self.s.ast.sym(n) {
            Some(sym) => sym,
            None => return Ok(()),
        };
        let uid = self.s.syms.get(sym).uid;
        if !self.emitted.insert(uid) {
            return Ok(());
        }
        let saved_out = std::mem::take(&mut self.out);
        let saved_locals = std::mem::take(&mut self.locals);
        let saved_ret = self.ret_kind;
        self.ret_kind = None;
        let name = mangle_symbol(self.s, sym);
        writeln!(self.out, "define void @{}() {{", name)?;
        writeln!(self.out, "entry:")?;
        let pending_mark = self.pending_nested.len();
        self.emit_local_decls(&decls)?;
        self.emit_handled(&stmts, &handlers)?;
        writeln!(self.out, "  ret void")?;
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;
        let text = std::mem::take(&mut self.out);
        self.funcs.push_str(&text);
        self.out = saved_out;
        self.locals = saved_locals;
        self.ret_kind = saved_ret;
        let nested = self.pending_nested.split_off(pending_mark);
        for b in nested {
            self.emit_subprogram(b)?;
        }
        Ok(())
    }

    /// Spawn a task object's thread through the trampoline.
    fn emit_task_spawn(&mut self, spec: NodeId) -> Result<(), CodeGenError> {
        let Some(sym) = self.s.ast.sym(spec) else {
            return Ok(());
        };
        if self.s.syms.get(sym).kind != SymKind::Task {
            return Ok(());
        }
        let body_fn = mangle_symbol(self.s, sym);
        let tid = self.fresh_temp();
        writeln!(self.out, "  %{} = alloca i64", tid)?;
        let rc = self.fresh_temp();
        writeln!(
            self.out,
            "  %{} = call i32 @pthread_create(ptr %{}, ptr null, ptr @__ada_task_trampoline, ptr @{})",
            rc, tid, body_fn
        )?;
        Ok(())
    }

    // ----- instantiations at library level -----

    pub(super) fn emit_instantiation(&mut self, n: NodeId) -> Result<(), CodeGenError> {
        if let Some(&clone) = self.s.instance_bodies.get(&n) {
            self.emit_library_item(clone)?;
        }
        Ok(())
    }
}
