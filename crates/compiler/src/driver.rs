//! Separate-compilation driver
//!
//! Locates, parses and analyzes `with`-referenced units and `is separate`
//! subunits. Given a unit name N, each include path is probed for
//! `lowercase(N)` with extensions `.ada`, `.adb`, `.ads` (exact file name
//! first, then a case-insensitive directory scan), and a matching `.ali`
//! library-interface file is read when present to register exported
//! symbols without parsing their source.
//!
//! The `.ali` format is line-oriented ASCII; unknown lines are ignored:
//!
//! ```text
//! V 1.0
//! U <unit-name>
//! W <with-name> <mtime-seconds>
//! D <dependency-name>
//! X <mangled-name> <return-type> <param-type>*
//! H <exception-name>
//! E <elab-count>
//! ```
//!
//! Types are `void`, `i64`, `double`, `ptr`.

use crate::ast::{NodeId, NodeKind};
use crate::intern::NameId;
use crate::parser::Parser;
use crate::semantics::Analyzer;
use crate::symbols::{SymKind, Symbol, Visibility};
use crate::types::{TypeId, TypeKind};
use crate::Session;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const SOURCE_EXTENSIONS: [&str; 3] = [".ada", ".adb", ".ads"];

/// A compiled or discovered library unit.
#[derive(Debug, Clone)]
pub struct LibraryUnit {
    pub name: NameId,
    pub path: PathBuf,
    pub spec: Option<NodeId>,
    pub body: Option<NodeId>,
    pub withs: Vec<NameId>,
    pub deps: Vec<NameId>,
    pub timestamp: u64,
    pub compiled: bool,
}

fn mtime_seconds(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Probe the include paths for a unit source file. Within each directory
/// the exact lowercase name is tried first, then a case-insensitive scan.
pub fn find_unit_file(paths: &[PathBuf], lower: &str) -> Option<PathBuf> {
    for dir in paths {
        for ext in SOURCE_EXTENSIONS {
            let candidate = dir.join(format!("{}{}", lower, ext));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let lower_name = file_name.to_ascii_lowercase();
            for ext in SOURCE_EXTENSIONS {
                if lower_name == format!("{}{}", lower, ext) {
                    return Some(path);
                }
            }
        }
    }
    None
}

fn find_ali_file(paths: &[PathBuf], lower: &str) -> Option<PathBuf> {
    for dir in paths {
        let candidate = dir.join(format!("{}.ali", lower));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Load a `with`ed unit: read its `.ali` when present, then locate, parse
/// and analyze its source. Fails when no source can be found.
pub fn load_unit(s: &mut Session, name: NameId) -> Result<(), String> {
    if s.units.iter().any(|u| u.name == name) {
        return Ok(());
    }
    if s.loading.contains(&name) {
        // Circular `with`: the outer traversal finishes the unit.
        return Ok(());
    }
    s.loading.push(name);
    let result = load_unit_inner(s, name);
    s.loading.pop();
    result
}

fn load_unit_inner(s: &mut Session, name: NameId) -> Result<(), String> {
    let lower = s.names.lower(name).to_string();
    if let Some(ali) = find_ali_file(&s.include_paths, &lower) {
        read_ali(s, &ali);
    }
    let Some(path) = find_unit_file(&s.include_paths, &lower) else {
        // The `.ali` alone can satisfy the reference when it declared the
        // unit's exports.
        if s.units.iter().any(|u| u.name == name) {
            return Ok(());
        }
        return Err(format!(
            "missing library unit source for '{}'",
            s.names.spelling(name)
        ));
    };
    compile_path(s, &path, name)
}

/// Locate and compile the subunit completing an `is separate` stub.
pub fn load_subunit(s: &mut Session, name: NameId) -> Result<(), String> {
    let lower = s.names.lower(name).to_string();
    let Some(path) = find_unit_file(&s.include_paths, &lower) else {
        return Err(format!(
            "missing subunit source for '{}'",
            s.names.spelling(name)
        ));
    };
    compile_path(s, &path, name)
}

fn compile_path(s: &mut Session, path: &Path, name: NameId) -> Result<(), String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let file = s.diags.add_file(&path.display().to_string());
    let tokens = crate::lexer::tokenize(&text, file, &s.diags)?;
    let units = {
        let mut parser = Parser::new(tokens, &mut s.ast, &mut s.names, &s.diags);
        parser.parse_file()?
    };
    let timestamp = mtime_seconds(path);
    for cu in units {
        Analyzer::new(s).analyze_unit(cu)?;
        register_unit(s, cu, path, name, timestamp);
    }
    Ok(())
}

/// Record a compiled compilation unit in the library-unit cache.
pub fn register_unit(
    s: &mut Session,
    cu: NodeId,
    path: &Path,
    fallback_name: NameId,
    timestamp: u64,
) {
    let (context, unit) = match s.ast.kind(cu) {
        NodeKind::CompUnit { context, unit, .. } => (context.clone(), *unit),
        _ => return,
    };
    // Units are emitted in registration order, dependencies first.
    s.root_units.push(cu);
    let mut withs = Vec::new();
    for clause in context {
        if let NodeKind::WithClause { names } = s.ast.kind(clause).clone() {
            for name in names {
                let mut n = name;
                loop {
                    match s.ast.kind(n) {
                        NodeKind::Ident(id) => {
                            withs.push(*id);
                            break;
                        }
                        NodeKind::Selected { field, .. } => {
                            withs.push(*field);
                            break;
                        }
                        NodeKind::Call { callee, .. } => n = *callee,
                        _ => break,
                    }
                }
            }
        }
    }
    let (unit_name, is_body) = match s.ast.kind(unit) {
        NodeKind::PackageSpec { name, .. } => (*name, false),
        NodeKind::PackageBody { name, .. } => (*name, true),
        NodeKind::SubprogDecl { spec } => (spec_name(s, *spec), false),
        NodeKind::SubprogBody { spec, .. } => (spec_name(s, *spec), true),
        NodeKind::GenericDecl { .. } | NodeKind::Instantiation { .. } => (fallback_name, false),
        _ => (fallback_name, true),
    };
    if let Some(existing) = s.units.iter_mut().find(|u| u.name == unit_name) {
        if is_body {
            existing.body = Some(unit);
        } else {
            existing.spec = Some(unit);
        }
        existing.withs.extend(withs);
        existing.compiled = true;
        return;
    }
    s.units.push(LibraryUnit {
        name: unit_name,
        path: path.to_path_buf(),
        spec: if is_body { None } else { Some(unit) },
        body: if is_body { Some(unit) } else { None },
        withs,
        deps: s.elaborate_deps.drain(..).collect(),
        timestamp,
        compiled: true,
    });
}

fn spec_name(s: &Session, spec: NodeId) -> NameId {
    match s.ast.kind(spec) {
        NodeKind::SubprogSpec { name, .. } => *name,
        _ => s.names_unknown(),
    }
}

fn ali_type(s: &Session, ty: Option<TypeId>) -> &'static str {
    let Some(ty) = ty else {
        return "void";
    };
    match s.types.get(s.types.base_of(ty)).kind {
        TypeKind::Float | TypeKind::UniversalFloat | TypeKind::Fixed => "double",
        TypeKind::Array
        | TypeKind::Record
        | TypeKind::Access
        | TypeKind::FatPointer
        | TypeKind::Private
        | TypeKind::Task => "ptr",
        _ => "i64",
    }
}

/// Render the `.ali` summary for a compiled unit.
pub fn write_ali(s: &Session, unit: &LibraryUnit) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "V 1.0");
    let _ = writeln!(out, "U {}", s.names.lower(unit.name));
    for &w in &unit.withs {
        let ts = find_unit_file(&s.include_paths, s.names.lower(w))
            .map(|p| mtime_seconds(&p))
            .unwrap_or(0);
        let _ = writeln!(out, "W {} {}", s.names.lower(w), ts);
    }
    for &d in &unit.deps {
        let _ = writeln!(out, "D {}", s.names.lower(d));
    }
    // Exported subprograms: declarations inside the unit's package symbol
    // or at library level for a subprogram unit.
    let pkg = (0..s.syms.len())
        .map(|i| crate::symbols::SymId(i as u32))
        .find(|&id| {
            let sym = s.syms.get(id);
            sym.name == unit.name && sym.kind == SymKind::Package
        });
    for i in 0..s.syms.len() {
        let id = crate::symbols::SymId(i as u32);
        let sym = s.syms.get(id);
        let exported = match pkg {
            Some(p) => sym.parent == Some(p),
            None => sym.name == unit.name,
        };
        if exported && sym.is_subprogram() && !sym.external {
            let mut line = format!(
                "X {} {}",
                crate::codegen::mangle_symbol(s, id),
                ali_type(s, sym.ret)
            );
            for &p in &sym.params {
                line.push(' ');
                line.push_str(ali_type(s, Some(p)));
            }
            let _ = writeln!(out, "{}", line);
        }
        if exported && sym.kind == SymKind::Exception {
            let _ = writeln!(out, "H {}", s.names.upper(sym.name));
        }
    }
    let _ = writeln!(out, "E {}", s.syms.elab_count());
    out
}

/// Persist the `.ali` next to the unit's source file.
pub fn emit_ali(s: &Session, unit: &LibraryUnit) -> Result<(), String> {
    let content = write_ali(s, unit);
    let path = unit.path.with_extension("ali");
    fs::write(&path, content).map_err(|e| format!("cannot write {}: {}", path.display(), e))
}

/// Read a `.ali` summary, registering exported symbols without parsing the
/// unit's source. Unknown lines are ignored.
pub fn read_ali(s: &mut Session, path: &Path) {
    let Ok(text) = fs::read_to_string(path) else {
        return;
    };
    let mut unit_name: Option<NameId> = None;
    let mut withs: Vec<NameId> = Vec::new();
    let mut deps: Vec<NameId> = Vec::new();
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("U") => {
                if let Some(name) = fields.next() {
                    unit_name = Some(s.names.intern(name));
                }
            }
            Some("W") => {
                if let Some(name) = fields.next() {
                    withs.push(s.names.intern(name));
                }
            }
            Some("D") => {
                if let Some(name) = fields.next() {
                    deps.push(s.names.intern(name));
                }
            }
            Some("X") => {
                let Some(mangled) = fields.next() else { continue };
                let ret = fields.next().unwrap_or("void");
                let params: Vec<&str> = fields.collect();
                register_external(s, mangled, ret, &params);
            }
            Some("H") => {
                if let Some(name) = fields.next() {
                    let id = s.names.intern(name);
                    if s.syms.find(id, &s.names).is_none() {
                        s.syms.add_overload(Symbol::new(id, SymKind::Exception), &s.names);
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(name) = unit_name {
        if !s.units.iter().any(|u| u.name == name) {
            s.units.push(LibraryUnit {
                name,
                path: path.to_path_buf(),
                spec: None,
                body: None,
                withs,
                deps,
                timestamp: mtime_seconds(path),
                compiled: false,
            });
        }
    }
}

fn ali_type_id(s: &Session, text: &str) -> Option<TypeId> {
    match text {
        "i64" => Some(s.types.integer),
        "double" => Some(s.types.float),
        "ptr" => Some(s.types.string),
        _ => None,
    }
}

/// The base name inside a mangled symbol sits between `__` and the first
/// following `.`.
fn mangled_base_name(mangled: &str) -> Option<&str> {
    let start = mangled.find("__")? + 2;
    let rest = &mangled[start..];
    let end = rest.find('.').unwrap_or(rest.len());
    Some(&rest[..end])
}

fn register_external(s: &mut Session, mangled: &str, ret: &str, params: &[&str]) {
    let Some(base) = mangled_base_name(mangled) else {
        return;
    };
    let name = s.names.intern(base);
    let ret_ty = ali_type_id(s, ret);
    let kind = if ret_ty.is_some() {
        SymKind::Function
    } else {
        SymKind::Procedure
    };
    let mut sym = Symbol::new(name, kind);
    sym.ret = ret_ty;
    sym.params = params.iter().filter_map(|&p| ali_type_id(s, p)).collect();
    sym.external = true;
    sym.ext_name = Some(mangled.to_string());
    let id = s.syms.add_overload(sym, &s.names);
    // External exports become visible through their unit, not bare lookup.
    s.syms.get_mut(id).visibility = Visibility::IMMEDIATE;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_unit_file_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Queues.ADS");
        fs::write(&path, "package Queues is end Queues;").unwrap();
        let found = find_unit_file(&[dir.path().to_path_buf()], "queues");
        assert_eq!(found, Some(path));
    }

    #[test]
    fn test_find_unit_file_prefers_exact_lowercase() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queues.ads");
        fs::write(&path, "package Queues is end Queues;").unwrap();
        let found = find_unit_file(&[dir.path().to_path_buf()], "queues").unwrap();
        assert_eq!(found, path);
    }

    #[test]
    fn test_load_unit_parses_spec() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("counters.ads"),
            "package Counters is\n  Limit : constant := 10;\n  procedure Bump(N: Integer);\nend Counters;",
        )
        .unwrap();
        let mut s = Session::new(vec![dir.path().to_path_buf()]);
        let name = s.names.intern("Counters");
        load_unit(&mut s, name).unwrap();
        assert_eq!(s.units.len(), 1);
        assert!(s.units[0].spec.is_some());
        // The package symbol and its member are registered.
        let pkg = s.syms.find(name, &s.names).unwrap();
        assert_eq!(s.syms.get(pkg).kind, SymKind::Package);
        let bump = s.names.intern("Bump");
        assert!(s.syms.find_in(pkg, bump, &s.names).is_some());
    }

    #[test]
    fn test_missing_unit_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut s = Session::new(vec![dir.path().to_path_buf()]);
        let name = s.names.intern("Nowhere");
        let err = load_unit(&mut s, name).unwrap_err();
        assert!(err.contains("Nowhere"), "got {}", err);
    }

    #[test]
    fn test_ali_round_trip_preserves_exports() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("mathpkg.ads"),
            "package Mathpkg is\n  function Twice(N: Integer) return Integer;\n  Overflow : exception;\nend Mathpkg;",
        )
        .unwrap();
        let mut s = Session::new(vec![dir.path().to_path_buf()]);
        let name = s.names.intern("Mathpkg");
        load_unit(&mut s, name).unwrap();
        let ali = write_ali(&s, &s.units[0]);
        assert!(ali.starts_with("V 1.0\n"), "got {}", ali);
        assert!(ali.contains("U mathpkg"));
        assert!(ali.contains("H OVERFLOW"));
        let x_line = ali.lines().find(|l| l.starts_with("X ")).unwrap();
        assert!(x_line.contains("i64"), "got {}", x_line);

        // Reading back into a fresh session restores the export set.
        let ali_path = dir.path().join("mathpkg.ali");
        fs::write(&ali_path, &ali).unwrap();
        let mut fresh = Session::new(vec![dir.path().to_path_buf()]);
        read_ali(&mut fresh, &ali_path);
        assert_eq!(fresh.units.len(), 1);
        let twice = fresh.names.intern("Twice");
        let found = fresh.syms.find(twice, &fresh.names).unwrap();
        assert!(fresh.syms.get(found).external);
        assert_eq!(fresh.syms.get(found).params.len(), 1);
    }
}
