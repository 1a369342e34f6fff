//! Ada 83 compiler library
//!
//! A self-contained, single-pass-per-unit front end for Ada 1983 that
//! translates source text into LLVM textual IR. The pipeline runs source
//! bytes through the lexer, the recursive-descent parser, the semantic
//! analyzer (with the separate-compilation driver pulling in `with`ed
//! units), and finally the IR emitter, which also writes the `.ali`
//! library-interface summary for compiled package bodies.
//!
//! ```text
//! source -> tokens -> AST -> elaborated AST (+checks) -> LLVM IR + .ali
//! ```
//!
//! All compiler state lives in a [`Session`]: the interner, the AST and
//! type index arenas, the symbol table, the diagnostics sink and the
//! library-unit cache. The session is single-threaded; there is no
//! locking anywhere in the compiler.

pub mod ast;
pub mod bigint;
pub mod codegen;
pub mod diagnostics;
pub mod driver;
pub mod generics;
pub mod intern;
pub mod lexer;
pub mod parser;
pub mod semantics;
pub mod symbols;
pub mod types;

pub use ast::{Ast, NodeId, NodeKind};
pub use codegen::{mangle_symbol, CodeGen, CodeGenError};
pub use diagnostics::{Diagnostics, Loc};
pub use intern::{NameId, NameTable};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::Parser;
pub use semantics::Analyzer;
pub use symbols::{SymId, SymbolTable};
pub use types::{TypeId, TypeTable};

use driver::LibraryUnit;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use symbols::SymbolTable as Symbols;
use types::SuppressMask;

/// All state for one compilation: arenas, tables, diagnostics and the
/// library-unit cache. Owned exclusively by the single compiler instance.
pub struct Session {
    pub names: NameTable,
    pub ast: Ast,
    pub types: TypeTable,
    pub syms: Symbols,
    pub diags: Diagnostics,
    pub units: Vec<LibraryUnit>,
    pub include_paths: Vec<PathBuf>,
    /// Units currently being loaded, for circular `with` tolerance.
    pub loading: Vec<NameId>,
    /// Compilation units in emission order, dependencies first.
    pub root_units: Vec<NodeId>,
    /// Symbols declared by each declaration node (one per declared name).
    pub decl_syms: HashMap<NodeId, Vec<SymId>>,
    /// Captured bodies of generic templates, by template symbol.
    pub template_bodies: HashMap<SymId, NodeId>,
    /// Resolved clone of each instantiation, for emission.
    pub instance_bodies: HashMap<NodeId, NodeId>,
    /// Checks suppressed globally by `pragma Suppress` without a target.
    pub suppress_all: SuppressMask,
    /// Units named by `pragma Elaborate`/`Elaborate_All`, recorded for the
    /// `.ali` dependency lines.
    pub elaborate_deps: Vec<NameId>,
    unknown_name: NameId,
}

impl Session {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        let mut names = NameTable::new();
        let types = TypeTable::new(&mut names);
        let unknown_name = names.intern("__unknown");
        let mut session = Session {
            names,
            ast: Ast::new(),
            types,
            syms: Symbols::new(),
            diags: Diagnostics::new(),
            units: Vec::new(),
            include_paths,
            loading: Vec::new(),
            root_units: Vec::new(),
            decl_syms: HashMap::new(),
            template_bodies: HashMap::new(),
            instance_bodies: HashMap::new(),
            suppress_all: SuppressMask::empty(),
            elaborate_deps: Vec::new(),
            unknown_name,
        };
        semantics::install_standard(&mut session);
        session
    }

    /// Placeholder name for malformed constructs.
    pub fn names_unknown(&self) -> NameId {
        self.unknown_name
    }
}

/// Compile one source text. Returns the emitted IR, or the accumulated
/// diagnostics (already formatted as `file:line:col: message`).
pub fn compile_source(
    source: &str,
    file_name: &str,
    include_paths: Vec<PathBuf>,
) -> Result<String, Vec<String>> {
    let mut s = Session::new(include_paths);
    let file = s.diags.add_file(file_name);
    let tokens = lexer::tokenize(source, file, &s.diags).map_err(|e| vec![e])?;
    let units = {
        let mut parser = Parser::new(tokens, &mut s.ast, &mut s.names, &s.diags);
        parser.parse_file().map_err(|e| vec![e])?
    };
    let fallback = s.names_unknown();
    for cu in units {
        Analyzer::new(&mut s)
            .analyze_unit(cu)
            .map_err(|e| vec![e])?;
        driver::register_unit(&mut s, cu, Path::new(file_name), fallback, 0);
    }
    if s.diags.has_errors() {
        return Err(s.diags.errors().to_vec());
    }

    let ir = CodeGen::new(&s)
        .emit_module()
        .map_err(|e| vec![e.to_string()])?;

    // Each compiled package body refreshes its library interface.
    for unit in &s.units {
        let is_package_body = unit
            .body
            .map(|b| matches!(s.ast.kind(b), NodeKind::PackageBody { .. }))
            .unwrap_or(false);
        if is_package_body {
            if let Err(e) = driver::emit_ali(&s, unit) {
                eprintln!("warning: {}", e);
            }
        }
    }
    Ok(ir)
}

/// Compile the file at `path`, searching its directory, then each `-I`
/// directory in order, then the current directory for `with`ed units.
pub fn compile_file(path: &Path, include_dirs: &[PathBuf]) -> Result<String, Vec<String>> {
    let source = fs::read_to_string(path)
        .map_err(|e| vec![format!("{}: {}", path.display(), e)])?;
    let mut dirs = Vec::new();
    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            dirs.push(PathBuf::from("."));
        } else {
            dirs.push(parent.to_path_buf());
        }
    }
    dirs.extend(include_dirs.iter().cloned());
    dirs.push(PathBuf::from("."));
    compile_source(&source, &path.display().to_string(), dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> String {
        compile_source(source, "test.adb", vec![]).unwrap_or_else(|errs| {
            panic!("compilation failed:\n{}", errs.join("\n"));
        })
    }

    #[test]
    fn test_hello_world_ir() {
        let ir = compile(
            "with Ada.Text_IO; use Ada.Text_IO;\n\
             procedure Hello is begin Put_Line(\"Hello, World!\"); end;",
        );
        assert!(ir.contains("define i32 @main()"), "missing @main:\n{}", ir);
        assert!(ir.contains("call void @__text_io_put_line(ptr"));
        assert!(ir.contains("Hello, World!"));
        // The literal's descriptor spans 1..13.
        assert!(ir.contains("{ i64 1, i64 13 }"), "missing bounds:\n{}", ir);
        assert!(ir.contains("[14 x i8]"), "missing data bytes:\n{}", ir);
    }

    #[test]
    fn test_range_check_ir() {
        let ir = compile(
            "procedure R is subtype S is Integer range 1..10;\n\
             X : S; begin X := 11; end;",
        );
        assert!(ir.contains("icmp slt i64 11, 1"), "missing low test:\n{}", ir);
        assert!(ir.contains("icmp sgt i64 11, 10"), "missing high test:\n{}", ir);
        assert!(ir.contains("call void @__ada_raise(ptr @.ex.CONSTRAINT_ERROR)"));
    }

    #[test]
    fn test_overload_resolution_ir() {
        let ir = compile(
            "procedure O is\n\
             function F(X: Integer) return Integer is begin return X + 1; end;\n\
             function F(X: Float) return Float is begin return X + 1.0; end;\n\
             A : Integer := F(5);\n\
             B : Float := F(5.0);\n\
             begin null; end;",
        );
        // Two distinct mangled definitions, one per operand type.
        let int_defs = ir.matches("define i64 @").count();
        let float_defs = ir.matches("define double @").count();
        assert!(int_defs >= 1, "missing integer F:\n{}", ir);
        assert!(float_defs >= 1, "missing float F:\n{}", ir);
        assert!(ir.contains("call i64 @"));
        assert!(ir.contains("call double @"));
    }

    #[test]
    fn test_generic_instantiation_ir() {
        let ir = compile(
            "generic type T is private; with function \"<\"(A, B: T) return Boolean;\n\
             function Min(A, B: T) return T;\n\
             function Min(A, B: T) return T is begin\n\
             if A < B then return A; end if; return B; end Min;\n\
             procedure Main is\n\
             function IMin is new Min(Integer, \"<\");\n\
             X : Integer := IMin(1, 2);\n\
             begin null; end;",
        );
        assert!(ir.contains("imin"), "instance not emitted:\n{}", ir);
        assert!(ir.contains("icmp slt i64"), "substituted compare missing:\n{}", ir);
    }

    #[test]
    fn test_unconstrained_array_parameter_ir() {
        let ir = compile(
            "function Sum(A: array (Positive range <>) of Integer) return Integer is\n\
             S : Integer := 0;\n\
             begin for I in A'Range loop S := S + A(I); end loop; return S; end;",
        );
        assert!(ir.contains("%__fat"), "missing fat pointer type use:\n{}", ir);
        assert!(
            ir.contains("getelementptr { i64, i64 }"),
            "bounds never loaded:\n{}",
            ir
        );
        assert!(ir.contains("forhead"), "missing loop:\n{}", ir);
    }

    #[test]
    fn test_exception_handler_ir() {
        let ir = compile(
            "procedure E is X : Integer;\n\
             begin X := 10 / 0;\n\
             exception when Constraint_Error => X := -1;\n\
             end;",
        );
        assert!(ir.contains("call i32 @setjmp(ptr"), "missing setjmp:\n{}", ir);
        assert!(ir.contains("icmp eq i64"), "missing zero test:\n{}", ir);
        assert!(ir.contains("@.ex.CONSTRAINT_ERROR"));
        assert!(ir.contains("call i32 @strcmp(ptr"), "handler match missing:\n{}", ir);
    }

    #[test]
    fn test_runtime_shim_always_present() {
        let ir = compile("procedure Empty is begin null; end;");
        for shim in [
            "@__ada_ss_init",
            "@__ada_ss_alloc",
            "@__ada_raise",
            "@__ada_powi",
            "@__ada_image_int",
            "@__text_io_put_line",
            "@__ada_task_trampoline",
        ] {
            assert!(ir.contains(shim), "shim {} missing", shim);
        }
        assert!(ir.contains("linkonce_odr"));
    }

    #[test]
    fn test_package_elaboration_ctor() {
        let ir = compile(
            "package Config is\n\
             Limit : Integer := 42;\n\
             end Config;\n\
             procedure Go is begin null; end;",
        );
        assert!(
            ir.contains("@llvm.global_ctors"),
            "missing ctor registration:\n{}",
            ir
        );
        assert!(ir.contains("i32 65535"), "wrong ctor priority:\n{}", ir);
    }

    #[test]
    fn test_undefined_identifier_reports_location() {
        let errs = compile_source(
            "procedure P is begin Missing; end;",
            "p.adb",
            vec![],
        )
        .unwrap_err();
        assert!(errs[0].starts_with("p.adb:"), "got {}", errs[0]);
        assert!(errs[0].contains("Missing") || errs[0].contains("undefined"));
    }

    #[test]
    fn test_static_folding_in_ir() {
        let ir = compile(
            "procedure F is X : Integer;\n\
             begin X := 2 + 3 * 4; end;",
        );
        // The operator tree folds to a single literal store.
        assert!(ir.contains("store i64 14"), "expected folded store:\n{}", ir);
    }

    #[test]
    fn test_for_loop_reverse() {
        let ir = compile(
            "procedure L is S : Integer := 0;\n\
             begin for I in reverse 1..5 loop S := S + I; end loop; end;",
        );
        assert!(ir.contains("icmp sge i64"), "reverse loop condition:\n{}", ir);
        assert!(ir.contains("add i64 %"), "loop step missing:\n{}", ir);
    }
}
