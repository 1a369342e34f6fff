//! Runtime shim and external declarations
//!
//! Every module carries the same fixed prelude: the exception jump-buffer
//! chain, the scratch-stack allocator, integer exponentiation, the
//! IMAGE/VALUE helpers and the Text_IO wrappers. All shim definitions are
//! `linkonce_odr` so independently compiled units link together, and all C
//! runtime entry points are plain `declare`s resolved at final link time.
//!
//! The declarations live in a single data-driven table; each entry prints
//! one `declare` line.

use super::error::CodeGenError;
use std::fmt::Write as _;

/// One external declaration line, with an optional category comment.
pub struct ExternDecl {
    pub decl: &'static str,
    pub category: Option<&'static str>,
}

/// C runtime entry points the emitted code calls directly.
pub static EXTERN_DECLARATIONS: &[ExternDecl] = &[
    ExternDecl {
        decl: "declare ptr @malloc(i64)",
        category: Some("; C runtime"),
    },
    ExternDecl {
        decl: "declare ptr @realloc(ptr, i64)",
        category: None,
    },
    ExternDecl {
        decl: "declare void @free(ptr)",
        category: None,
    },
    ExternDecl {
        decl: "declare void @memcpy(ptr, ptr, i64)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @strcmp(ptr, ptr)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @memcmp(ptr, ptr, i64)",
        category: None,
    },
    ExternDecl {
        decl: "declare i64 @strlen(ptr)",
        category: None,
    },
    ExternDecl {
        decl: "declare i64 @strtoll(ptr, ptr, i32)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @setjmp(ptr) returns_twice",
        category: Some("; Exception substrate"),
    },
    ExternDecl {
        decl: "declare void @longjmp(ptr, i32)",
        category: None,
    },
    ExternDecl {
        decl: "declare void @exit(i32)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @putchar(i32)",
        category: Some("; Text I/O"),
    },
    ExternDecl {
        decl: "declare i32 @getchar()",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @puts(ptr)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @printf(ptr, ...)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @snprintf(ptr, i64, ptr, ...)",
        category: None,
    },
    ExternDecl {
        decl: "declare double @pow(double, double)",
        category: Some("; Math"),
    },
    ExternDecl {
        decl: "declare i32 @usleep(i32)",
        category: Some("; Tasking"),
    },
    ExternDecl {
        decl: "declare i32 @pthread_create(ptr, ptr, ptr, ptr)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @pthread_join(i64, ptr)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @pthread_mutex_init(ptr, ptr)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @pthread_mutex_lock(ptr)",
        category: None,
    },
    ExternDecl {
        decl: "declare i32 @pthread_mutex_unlock(ptr)",
        category: None,
    },
];

pub fn emit_extern_decls(out: &mut String) -> Result<(), CodeGenError> {
    for entry in EXTERN_DECLARATIONS {
        if let Some(category) = entry.category {
            writeln!(out, "{}", category)?;
        }
        writeln!(out, "{}", entry.decl)?;
    }
    Ok(())
}

/// The fixed runtime shim, emitted verbatim into every module.
///
/// Handler-chain entries are `{ ptr prev, [32 x i64] jmp_buf }` allocated
/// from scratch memory. `@__ada_raise` pops to the handler's predecessor
/// before transferring so a handler that raises again reaches the next
/// enclosing region.
pub static RUNTIME_SHIM: &str = r#"@__eh_cur = linkonce_odr global ptr null
@__ex_cur = linkonce_odr global ptr null
@__ss_base = linkonce_odr global ptr null
@__ss_off = linkonce_odr global i64 0
@__ss_cap = linkonce_odr global i64 0
@.fmt.image = linkonce_odr constant [6 x i8] c"% lld\00"
@.fmt.int = linkonce_odr constant [5 x i8] c"%lld\00"

define linkonce_odr void @__ada_ss_init() {
entry:
  %base = call ptr @malloc(i64 1048576)
  store ptr %base, ptr @__ss_base
  store i64 0, ptr @__ss_off
  store i64 1048576, ptr @__ss_cap
  ret void
}

define linkonce_odr ptr @__ada_ss_alloc(i64 %n) {
entry:
  %n7 = add i64 %n, 7
  %na = and i64 %n7, -8
  %off = load i64, ptr @__ss_off
  %cap = load i64, ptr @__ss_cap
  %end = add i64 %off, %na
  %need = icmp sgt i64 %end, %cap
  br i1 %need, label %grow, label %take
grow:
  %cap2 = shl i64 %cap, 1
  %still = icmp sgt i64 %end, %cap2
  %newcap = select i1 %still, i64 %end, i64 %cap2
  %base = load ptr, ptr @__ss_base
  %nb = call ptr @realloc(ptr %base, i64 %newcap)
  store ptr %nb, ptr @__ss_base
  store i64 %newcap, ptr @__ss_cap
  br label %take
take:
  %base2 = load ptr, ptr @__ss_base
  %p = getelementptr i8, ptr %base2, i64 %off
  store i64 %end, ptr @__ss_off
  ret ptr %p
}

define linkonce_odr i64 @__ada_ss_mark() {
entry:
  %off = load i64, ptr @__ss_off
  ret i64 %off
}

define linkonce_odr void @__ada_ss_release(i64 %mark) {
entry:
  store i64 %mark, ptr @__ss_off
  ret void
}

define linkonce_odr void @__ada_raise(ptr %msg) {
entry:
  store ptr %msg, ptr @__ex_cur
  %h = load ptr, ptr @__eh_cur
  %none = icmp eq ptr %h, null
  br i1 %none, label %fatal, label %transfer
fatal:
  %0 = call i32 @puts(ptr %msg)
  call void @exit(i32 1)
  unreachable
transfer:
  %prev.p = getelementptr { ptr, [32 x i64] }, ptr %h, i32 0, i32 0
  %prev = load ptr, ptr %prev.p
  store ptr %prev, ptr @__eh_cur
  %buf = getelementptr { ptr, [32 x i64] }, ptr %h, i32 0, i32 1
  call void @longjmp(ptr %buf, i32 1)
  unreachable
}

define linkonce_odr i64 @__ada_powi(i64 %base, i64 %exp) {
entry:
  br label %loop
loop:
  %acc = phi i64 [ 1, %entry ], [ %acc2, %step ]
  %b = phi i64 [ %base, %entry ], [ %b2, %step ]
  %e = phi i64 [ %exp, %entry ], [ %e2, %step ]
  %done = icmp sle i64 %e, 0
  br i1 %done, label %exit, label %step
step:
  %bit = and i64 %e, 1
  %odd = icmp ne i64 %bit, 0
  %mul = mul i64 %acc, %b
  %acc2 = select i1 %odd, i64 %mul, i64 %acc
  %b2 = mul i64 %b, %b
  %e2 = ashr i64 %e, 1
  br label %loop
exit:
  ret i64 %acc
}

define linkonce_odr ptr @__ada_image_int(i64 %v) {
entry:
  %buf = call ptr @__ada_ss_alloc(i64 24)
  %0 = call i32 (ptr, i64, ptr, ...) @snprintf(ptr %buf, i64 24, ptr @.fmt.image, i64 %v)
  ret ptr %buf
}

define linkonce_odr ptr @__ada_image_enum(i64 %v, ptr %table) {
entry:
  %slot = getelementptr ptr, ptr %table, i64 %v
  %name = load ptr, ptr %slot
  ret ptr %name
}

define linkonce_odr i64 @__ada_value_int(ptr %text) {
entry:
  %v = call i64 @strtoll(ptr %text, ptr null, i32 10)
  ret i64 %v
}

define linkonce_odr void @__text_io_put(ptr %fat) {
entry:
  %data.p = getelementptr %__fat, ptr %fat, i32 0, i32 0
  %data = load ptr, ptr %data.p
  %bnd.p = getelementptr %__fat, ptr %fat, i32 0, i32 1
  %bnd = load ptr, ptr %bnd.p
  %lo.p = getelementptr { i64, i64 }, ptr %bnd, i32 0, i32 0
  %lo = load i64, ptr %lo.p
  %hi.p = getelementptr { i64, i64 }, ptr %bnd, i32 0, i32 1
  %hi = load i64, ptr %hi.p
  %span = sub i64 %hi, %lo
  %count = add i64 %span, 1
  br label %loop
loop:
  %i = phi i64 [ 0, %entry ], [ %next, %body ]
  %done = icmp sge i64 %i, %count
  br i1 %done, label %exit, label %body
body:
  %cp = getelementptr i8, ptr %data, i64 %i
  %c = load i8, ptr %cp
  %ci = sext i8 %c to i32
  %0 = call i32 @putchar(i32 %ci)
  %next = add i64 %i, 1
  br label %loop
exit:
  ret void
}

define linkonce_odr void @__text_io_put_line(ptr %fat) {
entry:
  call void @__text_io_put(ptr %fat)
  %0 = call i32 @putchar(i32 10)
  ret void
}

define linkonce_odr void @__text_io_put_char(i64 %c) {
entry:
  %ci = trunc i64 %c to i32
  %0 = call i32 @putchar(i32 %ci)
  ret void
}

define linkonce_odr void @__text_io_put_int(i64 %v) {
entry:
  %0 = call i32 (ptr, ...) @printf(ptr @.fmt.int, i64 %v)
  ret void
}

define linkonce_odr void @__text_io_new_line() {
entry:
  %0 = call i32 @putchar(i32 10)
  ret void
}

define linkonce_odr void @__text_io_get_char(ptr %slot) {
entry:
  %c = call i32 @getchar()
  %cb = trunc i32 %c to i8
  store i8 %cb, ptr %slot
  ret void
}

define linkonce_odr ptr @__ada_task_trampoline(ptr %body) {
entry:
  call void %body()
  %pending = load ptr, ptr @__ex_cur
  %none = icmp eq ptr %pending, null
  br i1 %none, label %quiet, label %report
report:
  %0 = call i32 @puts(ptr %pending)
  br label %quiet
quiet:
  ret ptr null
}
"#;
