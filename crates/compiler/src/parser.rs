//! Recursive-descent parser for the Ada 83 grammar
//!
//! One-token lookahead over the token vector, plus a single saved-position
//! backtrack for the ambiguity between an accept-statement formal part and
//! an entry-family index expression. Nodes are allocated from the AST
//! arena; a failed backtracked attempt simply orphans its nodes there.
//!
//! Parse errors are fatal: the first mismatch aborts with a formatted
//! `file:line:col: message`, no recovery is attempted.
//!
//! Call versus indexing is not decided here; both parse to `Call` nodes and
//! semantic analysis rewrites indexing, slicing and conversions.

use crate::ast::{Ast, BinOp, LoopScheme, NodeId, NodeKind, ParamMode, UnOp};
use crate::diagnostics::{Diagnostics, Loc};
use crate::intern::{NameId, NameTable};
use crate::lexer::{Token, TokenKind};

pub struct Parser<'s> {
    tokens: Vec<Token>,
    pos: usize,
    ast: &'s mut Ast,
    names: &'s mut NameTable,
    diags: &'s Diagnostics,
}

impl<'s> Parser<'s> {
    pub fn new(
        tokens: Vec<Token>,
        ast: &'s mut Ast,
        names: &'s mut NameTable,
        diags: &'s Diagnostics,
    ) -> Self {
        Parser {
            tokens,
            pos: 0,
            ast,
            names,
            diags,
        }
    }

    // ----- token plumbing -----

    fn tok(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.tok().kind
    }

    fn kind_at(&self, off: usize) -> TokenKind {
        self.tokens
            .get(self.pos + off)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn loc(&self) -> Loc {
        self.tok().loc
    }

    fn advance(&mut self) -> Token {
        let t = self.tok().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, String> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.diags.fatal(
                self.loc(),
                &format!("expected {}, found '{}'", what, self.tok().text),
            ))
        }
    }

    fn ident(&mut self) -> Result<NameId, String> {
        let t = self.expect(TokenKind::Ident, "identifier")?;
        Ok(self.names.intern(&t.text))
    }

    /// Identifier or operator-symbol string (`"+"`, `"<"`, ...) naming a
    /// subprogram.
    fn designator(&mut self) -> Result<NameId, String> {
        if self.check(TokenKind::StrLit) {
            let t = self.advance();
            Ok(self.names.intern(&t.text))
        } else {
            self.ident()
        }
    }

    fn alloc(&mut self, kind: NodeKind, loc: Loc) -> NodeId {
        self.ast.alloc(kind, loc)
    }

    // ----- compilation units -----

    /// Parse a whole source file: a sequence of compilation units, each
    /// with its own context clause.
    pub fn parse_file(&mut self) -> Result<Vec<NodeId>, String> {
        let mut units = Vec::new();
        while !self.check(TokenKind::Eof) {
            units.push(self.parse_compilation_unit()?);
        }
        Ok(units)
    }

    fn parse_compilation_unit(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let mut context = Vec::new();
        loop {
            match self.kind() {
                TokenKind::With => context.push(self.parse_with_clause()?),
                TokenKind::Use => context.push(self.parse_use_clause()?),
                TokenKind::Pragma => context.push(self.parse_pragma()?),
                _ => break,
            }
        }
        let mut separate_parent = None;
        if self.accept(TokenKind::Separate) {
            self.expect(TokenKind::LParen, "'('")?;
            separate_parent = Some(self.parse_name()?);
            self.expect(TokenKind::RParen, "')'")?;
        }
        let unit = self.parse_library_item()?;
        Ok(self.alloc(
            NodeKind::CompUnit {
                context,
                separate_parent,
                unit,
            },
            loc,
        ))
    }

    fn parse_with_clause(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::With, "'with'")?;
        let mut names = vec![self.parse_name()?];
        while self.accept(TokenKind::Comma) {
            names.push(self.parse_name()?);
        }
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::WithClause { names }, loc))
    }

    fn parse_use_clause(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Use, "'use'")?;
        let mut names = vec![self.parse_name()?];
        while self.accept(TokenKind::Comma) {
            names.push(self.parse_name()?);
        }
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::UseClause { names }, loc))
    }

    fn parse_library_item(&mut self) -> Result<NodeId, String> {
        match self.kind() {
            TokenKind::Procedure | TokenKind::Function => self.parse_subprogram(),
            TokenKind::Package => self.parse_package(),
            TokenKind::Generic => self.parse_generic(),
            TokenKind::Task => self.parse_task(),
            _ => Err(self.diags.fatal(
                self.loc(),
                &format!("expected compilation unit, found '{}'", self.tok().text),
            )),
        }
    }

    // ----- declarations -----

    fn at_declaration_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Begin | TokenKind::End | TokenKind::Private | TokenKind::Eof
        )
    }

    pub fn parse_declarative_part(&mut self) -> Result<Vec<NodeId>, String> {
        let mut decls = Vec::new();
        while !self.at_declaration_end() {
            decls.push(self.parse_declaration()?);
        }
        Ok(decls)
    }

    fn parse_declaration(&mut self) -> Result<NodeId, String> {
        match self.kind() {
            TokenKind::Type => self.parse_type_decl(),
            TokenKind::Subtype => self.parse_subtype_decl(),
            TokenKind::Procedure | TokenKind::Function => self.parse_subprogram(),
            TokenKind::Package => self.parse_package(),
            TokenKind::Task => self.parse_task(),
            TokenKind::Entry => self.parse_entry_decl(),
            TokenKind::Generic => self.parse_generic(),
            TokenKind::For => self.parse_rep_clause(),
            TokenKind::Use => self.parse_use_clause(),
            TokenKind::Pragma => self.parse_pragma(),
            TokenKind::Ident => self.parse_object_like_decl(),
            _ => Err(self.diags.fatal(
                self.loc(),
                &format!("expected declaration, found '{}'", self.tok().text),
            )),
        }
    }

    /// Object, named-number, exception, or renaming declaration; they all
    /// start with an identifier list and a colon.
    fn parse_object_like_decl(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let mut names = vec![self.ident()?];
        while self.accept(TokenKind::Comma) {
            names.push(self.ident()?);
        }
        self.expect(TokenKind::Colon, "':'")?;

        if self.accept(TokenKind::Exception) {
            if self.accept(TokenKind::Renames) {
                let target = self.parse_name()?;
                self.expect(TokenKind::Semi, "';'")?;
                let name = names[0];
                return Ok(self.alloc(
                    NodeKind::Renaming {
                        name,
                        spec: None,
                        target,
                    },
                    loc,
                ));
            }
            self.expect(TokenKind::Semi, "';'")?;
            return Ok(self.alloc(NodeKind::ExceptionDecl { names }, loc));
        }

        let constant = self.accept(TokenKind::Constant);
        // Named number: `N : constant := expr;`
        if constant && self.check(TokenKind::Assign) {
            self.advance();
            let expr = self.parse_expression()?;
            self.expect(TokenKind::Semi, "';'")?;
            return Ok(self.alloc(NodeKind::NumberDecl { names, expr }, loc));
        }

        let subtype = if self.check(TokenKind::Array) {
            self.parse_array_def()?
        } else {
            self.parse_subtype_indication()?
        };

        if self.accept(TokenKind::Renames) {
            let target = self.parse_name()?;
            self.expect(TokenKind::Semi, "';'")?;
            let name = names[0];
            return Ok(self.alloc(
                NodeKind::Renaming {
                    name,
                    spec: Some(subtype),
                    target,
                },
                loc,
            ));
        }

        let init = if self.accept(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::ObjectDecl {
                names,
                subtype,
                init,
                constant,
            },
            loc,
        ))
    }

    fn parse_type_decl(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Type, "'type'")?;
        let name = self.ident()?;
        let discriminants = if self.check(TokenKind::LParen) {
            self.parse_discriminant_part()?
        } else {
            Vec::new()
        };
        // Incomplete type declaration: `type T;`
        if self.accept(TokenKind::Semi) {
            return Ok(self.alloc(
                NodeKind::TypeDecl {
                    name,
                    discriminants,
                    def: None,
                },
                loc,
            ));
        }
        self.expect(TokenKind::Is, "'is'")?;
        let def = self.parse_type_definition()?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::TypeDecl {
                name,
                discriminants,
                def: Some(def),
            },
            loc,
        ))
    }

    fn parse_type_definition(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        match self.kind() {
            TokenKind::Range => {
                self.advance();
                let range = self.parse_range()?;
                Ok(self.alloc(NodeKind::IntRangeDef { range }, loc))
            }
            TokenKind::LParen => {
                self.advance();
                let mut literals = Vec::new();
                loop {
                    let lloc = self.loc();
                    let lit = if self.check(TokenKind::CharLit) {
                        let t = self.advance();
                        self.alloc(
                            NodeKind::EnumLit {
                                name: None,
                                ch: Some(t.char_value),
                            },
                            lloc,
                        )
                    } else {
                        let n = self.ident()?;
                        self.alloc(
                            NodeKind::EnumLit {
                                name: Some(n),
                                ch: None,
                            },
                            lloc,
                        )
                    };
                    literals.push(lit);
                    if !self.accept(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "')'")?;
                Ok(self.alloc(NodeKind::EnumDef { literals }, loc))
            }
            TokenKind::Digits => {
                self.advance();
                let digits = self.parse_expression()?;
                let range = if self.accept(TokenKind::Range) {
                    Some(self.parse_range()?)
                } else {
                    None
                };
                Ok(self.alloc(
                    NodeKind::FloatDef {
                        digits: Some(digits),
                        range,
                    },
                    loc,
                ))
            }
            TokenKind::Delta => {
                self.advance();
                let delta = self.parse_expression()?;
                let range = if self.accept(TokenKind::Range) {
                    Some(self.parse_range()?)
                } else {
                    None
                };
                Ok(self.alloc(NodeKind::FixedDef { delta, range }, loc))
            }
            TokenKind::Array => self.parse_array_def(),
            TokenKind::Record => self.parse_record_def(),
            TokenKind::Access => {
                self.advance();
                let designated = self.parse_subtype_indication()?;
                Ok(self.alloc(NodeKind::AccessDef { designated }, loc))
            }
            TokenKind::New => {
                self.advance();
                let parent = self.parse_subtype_indication()?;
                Ok(self.alloc(NodeKind::DerivedDef { parent }, loc))
            }
            TokenKind::Limited => {
                self.advance();
                self.expect(TokenKind::Private, "'private'")?;
                Ok(self.alloc(NodeKind::PrivateDef { limited: true }, loc))
            }
            TokenKind::Private => {
                self.advance();
                Ok(self.alloc(NodeKind::PrivateDef { limited: false }, loc))
            }
            _ => Err(self.diags.fatal(
                self.loc(),
                &format!("expected type definition, found '{}'", self.tok().text),
            )),
        }
    }

    fn parse_array_def(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Array, "'array'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut indexes = Vec::new();
        let mut unconstrained = false;
        loop {
            // Unconstrained index: `Mark range <>`.
            let iloc = self.loc();
            let index = self.parse_discrete_range()?;
            if self.accept(TokenKind::Range) {
                if self.accept(TokenKind::Box) {
                    unconstrained = true;
                    indexes.push(index);
                } else {
                    let range = self.parse_range()?;
                    let constraint = self.alloc(NodeKind::RangeConstraint { range }, iloc);
                    indexes.push(self.alloc(
                        NodeKind::SubtypeInd {
                            mark: index,
                            constraint: Some(constraint),
                        },
                        iloc,
                    ));
                }
            } else {
                indexes.push(index);
            }
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Of, "'of'")?;
        let elem = self.parse_subtype_indication()?;
        Ok(self.alloc(
            NodeKind::ArrayDef {
                indexes,
                elem,
                unconstrained,
            },
            loc,
        ))
    }

    fn parse_record_def(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Record, "'record'")?;
        let mut components = Vec::new();
        let mut variant = None;
        if self.accept(TokenKind::Null) {
            self.expect(TokenKind::Semi, "';'")?;
        } else {
            while !self.check(TokenKind::End) {
                if self.check(TokenKind::Case) {
                    variant = Some(self.parse_variant_part()?);
                    break;
                }
                components.push(self.parse_component_decl()?);
            }
        }
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::Record, "'record'")?;
        Ok(self.alloc(
            NodeKind::RecordDef {
                components,
                variant,
            },
            loc,
        ))
    }

    fn parse_component_decl(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let mut names = vec![self.ident()?];
        while self.accept(TokenKind::Comma) {
            names.push(self.ident()?);
        }
        self.expect(TokenKind::Colon, "':'")?;
        let subtype = if self.check(TokenKind::Array) {
            self.parse_array_def()?
        } else {
            self.parse_subtype_indication()?
        };
        let init = if self.accept(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::ObjectDecl {
                names,
                subtype,
                init,
                constant: false,
            },
            loc,
        ))
    }

    fn parse_variant_part(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Case, "'case'")?;
        let discr = self.ident()?;
        self.expect(TokenKind::Is, "'is'")?;
        let mut variants = Vec::new();
        while self.check(TokenKind::When) {
            let vloc = self.loc();
            self.advance();
            let choices = self.parse_choice_list()?;
            self.expect(TokenKind::Arrow, "'=>'")?;
            let mut comps = Vec::new();
            if self.accept(TokenKind::Null) {
                self.expect(TokenKind::Semi, "';'")?;
            } else {
                while !self.check(TokenKind::When) && !self.check(TokenKind::End) {
                    comps.push(self.parse_component_decl()?);
                }
            }
            variants.push(self.alloc(
                NodeKind::Variant {
                    choices,
                    components: comps,
                },
                vloc,
            ));
        }
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::Case, "'case'")?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::VariantPart { discr, variants }, loc))
    }

    fn parse_subtype_decl(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Subtype, "'subtype'")?;
        let name = self.ident()?;
        self.expect(TokenKind::Is, "'is'")?;
        let ind = self.parse_subtype_indication()?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::SubtypeDecl { name, ind }, loc))
    }

    /// Subtype indication: a type mark with an optional range, index,
    /// discriminant, digits or delta constraint.
    fn parse_subtype_indication(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let mark = self.parse_name_no_call()?;
        let constraint = match self.kind() {
            TokenKind::Range => {
                self.advance();
                let range = self.parse_range()?;
                Some(self.alloc(NodeKind::RangeConstraint { range }, loc))
            }
            TokenKind::Digits => {
                self.advance();
                let digits = self.parse_expression()?;
                let range = if self.accept(TokenKind::Range) {
                    Some(self.parse_range()?)
                } else {
                    None
                };
                Some(self.alloc(NodeKind::DigitsConstraint { digits, range }, loc))
            }
            TokenKind::Delta => {
                self.advance();
                let delta = self.parse_expression()?;
                let range = if self.accept(TokenKind::Range) {
                    Some(self.parse_range()?)
                } else {
                    None
                };
                Some(self.alloc(NodeKind::DeltaConstraint { delta, range }, loc))
            }
            TokenKind::LParen => {
                self.advance();
                // Index or discriminant constraint; both are association
                // lists, the analyzer interprets them against the mark.
                let mut assocs = Vec::new();
                loop {
                    assocs.push(self.parse_assoc_item()?);
                    if !self.accept(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "')'")?;
                Some(self.alloc(NodeKind::IndexConstraint { ranges: assocs }, loc))
            }
            _ => None,
        };
        Ok(self.alloc(NodeKind::SubtypeInd { mark, constraint }, loc))
    }

    fn parse_discriminant_part(&mut self) -> Result<Vec<NodeId>, String> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut discrs = Vec::new();
        loop {
            let loc = self.loc();
            let mut names = vec![self.ident()?];
            while self.accept(TokenKind::Comma) {
                names.push(self.ident()?);
            }
            self.expect(TokenKind::Colon, "':'")?;
            let subtype = self.parse_subtype_indication()?;
            let default = if self.accept(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            discrs.push(self.alloc(
                NodeKind::Param {
                    names,
                    mode: ParamMode::In,
                    subtype,
                    default,
                },
                loc,
            ));
            if !self.accept(TokenKind::Semi) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(discrs)
    }

    // ----- subprograms, packages, tasks, generics -----

    fn parse_formal_part(&mut self) -> Result<Vec<NodeId>, String> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        loop {
            let loc = self.loc();
            let mut names = vec![self.ident()?];
            while self.accept(TokenKind::Comma) {
                names.push(self.ident()?);
            }
            self.expect(TokenKind::Colon, "':'")?;
            let mode = self.parse_mode();
            let subtype = if self.check(TokenKind::Array) {
                self.parse_array_def()?
            } else {
                self.parse_subtype_indication()?
            };
            let default = if self.accept(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(self.alloc(
                NodeKind::Param {
                    names,
                    mode,
                    subtype,
                    default,
                },
                loc,
            ));
            if !self.accept(TokenKind::Semi) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_mode(&mut self) -> ParamMode {
        if self.accept(TokenKind::In) {
            if self.accept(TokenKind::Out) {
                ParamMode::InOut
            } else {
                ParamMode::In
            }
        } else if self.accept(TokenKind::Out) {
            ParamMode::Out
        } else {
            ParamMode::In
        }
    }

    fn parse_subprog_spec(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let is_function = match self.kind() {
            TokenKind::Procedure => {
                self.advance();
                false
            }
            TokenKind::Function => {
                self.advance();
                true
            }
            _ => {
                return Err(self
                    .diags
                    .fatal(self.loc(), "expected 'procedure' or 'function'"));
            }
        };
        let name = self.designator()?;
        let params = if self.check(TokenKind::LParen) {
            self.parse_formal_part()?
        } else {
            Vec::new()
        };
        let ret = if self.accept(TokenKind::Return) {
            Some(self.parse_subtype_indication()?)
        } else {
            None
        };
        Ok(self.alloc(
            NodeKind::SubprogSpec {
                name,
                params,
                ret,
                is_function,
            },
            loc,
        ))
    }

    fn parse_subprogram(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let spec = self.parse_subprog_spec()?;
        // Spec only.
        if self.accept(TokenKind::Semi) {
            return Ok(self.alloc(NodeKind::SubprogDecl { spec }, loc));
        }
        if self.accept(TokenKind::Renames) {
            let target = self.parse_name()?;
            self.expect(TokenKind::Semi, "';'")?;
            let name = self.spec_name(spec);
            return Ok(self.alloc(
                NodeKind::Renaming {
                    name,
                    spec: Some(spec),
                    target,
                },
                loc,
            ));
        }
        self.expect(TokenKind::Is, "'is'")?;
        if self.accept(TokenKind::Separate) {
            self.expect(TokenKind::Semi, "';'")?;
            return Ok(self.alloc(NodeKind::BodyStub { spec }, loc));
        }
        if self.accept(TokenKind::New) {
            // Generic subprogram instantiation.
            let template = self.parse_name_no_call()?;
            let actuals = if self.check(TokenKind::LParen) {
                self.parse_actual_part()?
            } else {
                Vec::new()
            };
            self.expect(TokenKind::Semi, "';'")?;
            let (name, is_function) = match self.ast.kind(spec) {
                NodeKind::SubprogSpec {
                    name, is_function, ..
                } => (*name, *is_function),
                _ => unreachable!("subprogram spec"),
            };
            return Ok(self.alloc(
                NodeKind::Instantiation {
                    name,
                    is_function,
                    is_package: false,
                    template,
                    actuals,
                },
                loc,
            ));
        }
        let decls = self.parse_declarative_part()?;
        self.expect(TokenKind::Begin, "'begin'")?;
        let (stmts, handlers) = self.parse_handled_statements()?;
        self.expect(TokenKind::End, "'end'")?;
        if self.check(TokenKind::Ident) || self.check(TokenKind::StrLit) {
            self.designator()?;
        }
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::SubprogBody {
                spec,
                decls,
                stmts,
                handlers,
            },
            loc,
        ))
    }

    fn spec_name(&self, spec: NodeId) -> NameId {
        match self.ast.kind(spec) {
            NodeKind::SubprogSpec { name, .. } => *name,
            _ => unreachable!("subprogram spec"),
        }
    }

    fn parse_package(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Package, "'package'")?;
        if self.accept(TokenKind::Body) {
            let name = self.ident()?;
            self.expect(TokenKind::Is, "'is'")?;
            if self.accept(TokenKind::Separate) {
                self.expect(TokenKind::Semi, "';'")?;
                let spec = self.alloc(
                    NodeKind::SubprogSpec {
                        name,
                        params: Vec::new(),
                        ret: None,
                        is_function: false,
                    },
                    loc,
                );
                return Ok(self.alloc(NodeKind::BodyStub { spec }, loc));
            }
            let decls = self.parse_declarative_part()?;
            let (stmts, handlers) = if self.accept(TokenKind::Begin) {
                self.parse_handled_statements()?
            } else {
                (Vec::new(), Vec::new())
            };
            self.expect(TokenKind::End, "'end'")?;
            if self.check(TokenKind::Ident) {
                self.ident()?;
            }
            self.expect(TokenKind::Semi, "';'")?;
            return Ok(self.alloc(
                NodeKind::PackageBody {
                    name,
                    decls,
                    stmts,
                    handlers,
                },
                loc,
            ));
        }
        let name = self.ident()?;
        if self.accept(TokenKind::Renames) {
            let target = self.parse_name()?;
            self.expect(TokenKind::Semi, "';'")?;
            return Ok(self.alloc(
                NodeKind::Renaming {
                    name,
                    spec: None,
                    target,
                },
                loc,
            ));
        }
        self.expect(TokenKind::Is, "'is'")?;
        if self.accept(TokenKind::New) {
            let template = self.parse_name_no_call()?;
            let actuals = if self.check(TokenKind::LParen) {
                self.parse_actual_part()?
            } else {
                Vec::new()
            };
            self.expect(TokenKind::Semi, "';'")?;
            return Ok(self.alloc(
                NodeKind::Instantiation {
                    name,
                    is_function: false,
                    is_package: true,
                    template,
                    actuals,
                },
                loc,
            ));
        }
        let visible = self.parse_declarative_part()?;
        let private = if self.accept(TokenKind::Private) {
            self.parse_declarative_part()?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::End, "'end'")?;
        if self.check(TokenKind::Ident) {
            self.ident()?;
        }
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::PackageSpec {
                name,
                visible,
                private,
            },
            loc,
        ))
    }

    fn parse_task(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Task, "'task'")?;
        if self.accept(TokenKind::Body) {
            let name = self.ident()?;
            self.expect(TokenKind::Is, "'is'")?;
            let decls = self.parse_declarative_part()?;
            self.expect(TokenKind::Begin, "'begin'")?;
            let (stmts, handlers) = self.parse_handled_statements()?;
            self.expect(TokenKind::End, "'end'")?;
            if self.check(TokenKind::Ident) {
                self.ident()?;
            }
            self.expect(TokenKind::Semi, "';'")?;
            return Ok(self.alloc(
                NodeKind::TaskBody {
                    name,
                    decls,
                    stmts,
                    handlers,
                },
                loc,
            ));
        }
        let is_type = self.accept(TokenKind::Type);
        let name = self.ident()?;
        let mut entries = Vec::new();
        if self.accept(TokenKind::Is) {
            while !self.check(TokenKind::End) {
                match self.kind() {
                    TokenKind::Entry => entries.push(self.parse_entry_decl()?),
                    TokenKind::Pragma => entries.push(self.parse_pragma()?),
                    TokenKind::For => entries.push(self.parse_rep_clause()?),
                    _ => {
                        return Err(self
                            .diags
                            .fatal(self.loc(), "expected entry declaration in task"));
                    }
                }
            }
            self.expect(TokenKind::End, "'end'")?;
            if self.check(TokenKind::Ident) {
                self.ident()?;
            }
        }
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::TaskSpec {
                name,
                is_type,
                entries,
            },
            loc,
        ))
    }

    fn parse_entry_decl(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Entry, "'entry'")?;
        let name = self.ident()?;
        let (family, params) = self.parse_entry_suffix()?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::EntryDecl {
                name,
                family,
                params,
            },
            loc,
        ))
    }

    /// After an entry name, a parenthesis may open either a formal part or
    /// an entry-family index. Try the formal part first, backtrack on
    /// failure.
    fn parse_entry_suffix(&mut self) -> Result<(Option<NodeId>, Vec<NodeId>), String> {
        if !self.check(TokenKind::LParen) {
            return Ok((None, Vec::new()));
        }
        let saved = self.pos;
        match self.parse_formal_part() {
            Ok(params) => Ok((None, params)),
            Err(_) => {
                self.pos = saved;
                self.expect(TokenKind::LParen, "'('")?;
                let family = self.parse_discrete_range()?;
                self.expect(TokenKind::RParen, "')'")?;
                let params = if self.check(TokenKind::LParen) {
                    self.parse_formal_part()?
                } else {
                    Vec::new()
                };
                Ok((Some(family), params))
            }
        }
    }

    fn parse_generic(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Generic, "'generic'")?;
        let mut formals = Vec::new();
        loop {
            match self.kind() {
                TokenKind::Type => formals.push(self.parse_generic_formal_type()?),
                TokenKind::With => formals.push(self.parse_generic_formal_subprog()?),
                TokenKind::Ident => {
                    let floc = self.loc();
                    let mut names = vec![self.ident()?];
                    while self.accept(TokenKind::Comma) {
                        names.push(self.ident()?);
                    }
                    self.expect(TokenKind::Colon, "':'")?;
                    let mode = self.parse_mode();
                    let subtype = self.parse_subtype_indication()?;
                    let default = if self.accept(TokenKind::Assign) {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    self.expect(TokenKind::Semi, "';'")?;
                    formals.push(self.alloc(
                        NodeKind::GenericFormalObject {
                            names,
                            mode,
                            subtype,
                            default,
                        },
                        floc,
                    ));
                }
                _ => break,
            }
        }
        let unit = match self.kind() {
            TokenKind::Package => self.parse_package()?,
            TokenKind::Procedure | TokenKind::Function => self.parse_subprogram()?,
            _ => {
                return Err(self
                    .diags
                    .fatal(self.loc(), "expected generic package or subprogram"));
            }
        };
        Ok(self.alloc(NodeKind::GenericDecl { formals, unit }, loc))
    }

    fn parse_generic_formal_type(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Type, "'type'")?;
        let name = self.ident()?;
        self.expect(TokenKind::Is, "'is'")?;
        let def = match self.kind() {
            TokenKind::Private => {
                self.advance();
                None
            }
            TokenKind::Limited => {
                self.advance();
                self.expect(TokenKind::Private, "'private'")?;
                None
            }
            TokenKind::LParen => {
                // Formal discrete type `(<>)`.
                self.advance();
                self.expect(TokenKind::Box, "'<>'")?;
                self.expect(TokenKind::RParen, "')'")?;
                None
            }
            TokenKind::Range => {
                self.advance();
                self.expect(TokenKind::Box, "'<>'")?;
                None
            }
            TokenKind::Digits => {
                self.advance();
                self.expect(TokenKind::Box, "'<>'")?;
                None
            }
            TokenKind::Delta => {
                self.advance();
                self.expect(TokenKind::Box, "'<>'")?;
                None
            }
            TokenKind::Array => Some(self.parse_array_def()?),
            TokenKind::Access => {
                let aloc = self.loc();
                self.advance();
                let designated = self.parse_subtype_indication()?;
                Some(self.alloc(NodeKind::AccessDef { designated }, aloc))
            }
            _ => {
                return Err(self
                    .diags
                    .fatal(self.loc(), "expected generic formal type definition"));
            }
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::GenericFormalType { name, def }, loc))
    }

    fn parse_generic_formal_subprog(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::With, "'with'")?;
        let spec = self.parse_subprog_spec()?;
        let default = if self.accept(TokenKind::Is) {
            if self.accept(TokenKind::Box) {
                None
            } else {
                Some(self.parse_name()?)
            }
        } else {
            None
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::GenericFormalSubprog { spec, default }, loc))
    }

    fn parse_actual_part(&mut self) -> Result<Vec<NodeId>, String> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut actuals = Vec::new();
        loop {
            actuals.push(self.parse_assoc_item()?);
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(actuals)
    }

    // ----- representation clauses and pragmas -----

    fn parse_rep_clause(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::For, "'for'")?;
        let target = self.parse_name_no_call()?;
        self.expect(TokenKind::Use, "'use'")?;
        let value = if self.check(TokenKind::Record) {
            self.parse_record_rep()?
        } else {
            // An address clause starts with `at`; sizes and enumeration
            // maps are plain expressions.
            let _ = self.accept(TokenKind::At);
            self.parse_expression()?
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::RepClause { target, value }, loc))
    }

    fn parse_record_rep(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Record, "'record'")?;
        let mut align = None;
        if self.accept(TokenKind::At) {
            self.expect(TokenKind::Mod, "'mod'")?;
            align = Some(self.parse_expression()?);
            self.expect(TokenKind::Semi, "';'")?;
        }
        let mut components = Vec::new();
        while !self.check(TokenKind::End) {
            let cloc = self.loc();
            let name = self.ident()?;
            self.expect(TokenKind::At, "'at'")?;
            let offset = self.parse_expression()?;
            self.expect(TokenKind::Range, "'range'")?;
            let range = self.parse_range()?;
            self.expect(TokenKind::Semi, "';'")?;
            components.push(self.alloc(
                NodeKind::RecordRepComp {
                    name,
                    offset,
                    range,
                },
                cloc,
            ));
        }
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::Record, "'record'")?;
        Ok(self.alloc(NodeKind::RecordRep { align, components }, loc))
    }

    fn parse_pragma(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Pragma, "'pragma'")?;
        let name = self.ident()?;
        let args = if self.check(TokenKind::LParen) {
            self.parse_actual_part()?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::PragmaNode { name, args }, loc))
    }

    // ----- statements -----

    fn parse_handled_statements(&mut self) -> Result<(Vec<NodeId>, Vec<NodeId>), String> {
        let stmts = self.parse_statement_sequence()?;
        let mut handlers = Vec::new();
        if self.accept(TokenKind::Exception) {
            while self.check(TokenKind::When) {
                let hloc = self.loc();
                self.advance();
                let choices = self.parse_choice_list()?;
                self.expect(TokenKind::Arrow, "'=>'")?;
                let body = self.parse_statement_sequence()?;
                handlers.push(self.alloc(
                    NodeKind::Handler {
                        choices,
                        stmts: body,
                    },
                    hloc,
                ));
            }
        }
        Ok((stmts, handlers))
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::End
                | TokenKind::Exception
                | TokenKind::Elsif
                | TokenKind::Else
                | TokenKind::When
                | TokenKind::Or
                | TokenKind::Eof
        )
    }

    pub fn parse_statement_sequence(&mut self) -> Result<Vec<NodeId>, String> {
        let mut stmts = Vec::new();
        while !self.at_statement_end() {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        match self.kind() {
            TokenKind::LtLt => {
                self.advance();
                let label = self.ident()?;
                self.expect(TokenKind::GtGt, "'>>'")?;
                Ok(self.alloc(NodeKind::LabelMark { label }, loc))
            }
            TokenKind::Null => {
                self.advance();
                self.expect(TokenKind::Semi, "';'")?;
                Ok(self.alloc(NodeKind::NullStmt, loc))
            }
            TokenKind::If => self.parse_if_statement(),
            TokenKind::Case => self.parse_case_statement(),
            TokenKind::Loop | TokenKind::While | TokenKind::For => {
                self.parse_loop_statement(None)
            }
            TokenKind::Declare | TokenKind::Begin => self.parse_block_statement(None),
            TokenKind::Exit => {
                self.advance();
                let label = if self.check(TokenKind::Ident) {
                    Some(self.ident()?)
                } else {
                    None
                };
                let cond = if self.accept(TokenKind::When) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.expect(TokenKind::Semi, "';'")?;
                Ok(self.alloc(NodeKind::ExitStmt { label, cond }, loc))
            }
            TokenKind::Return => {
                self.advance();
                let expr = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenKind::Semi, "';'")?;
                Ok(self.alloc(NodeKind::ReturnStmt { expr }, loc))
            }
            TokenKind::Goto => {
                self.advance();
                let label = self.ident()?;
                self.expect(TokenKind::Semi, "';'")?;
                Ok(self.alloc(NodeKind::GotoStmt { label }, loc))
            }
            TokenKind::Raise => {
                self.advance();
                let name = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_name()?)
                };
                self.expect(TokenKind::Semi, "';'")?;
                Ok(self.alloc(NodeKind::RaiseStmt { name }, loc))
            }
            TokenKind::Delay => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semi, "';'")?;
                Ok(self.alloc(NodeKind::DelayStmt { expr }, loc))
            }
            TokenKind::Abort => {
                self.advance();
                let mut names = vec![self.parse_name()?];
                while self.accept(TokenKind::Comma) {
                    names.push(self.parse_name()?);
                }
                self.expect(TokenKind::Semi, "';'")?;
                Ok(self.alloc(NodeKind::AbortStmt { names }, loc))
            }
            TokenKind::Accept => self.parse_accept_statement(),
            TokenKind::Select => self.parse_select_statement(),
            TokenKind::Pragma => self.parse_pragma(),
            TokenKind::Ident if self.kind_at(1) == TokenKind::Colon => {
                // Statement label on a loop or block.
                let label = self.ident()?;
                self.advance(); // ':'
                match self.kind() {
                    TokenKind::Loop | TokenKind::While | TokenKind::For => {
                        self.parse_loop_statement(Some(label))
                    }
                    TokenKind::Declare | TokenKind::Begin => {
                        self.parse_block_statement(Some(label))
                    }
                    _ => Err(self
                        .diags
                        .fatal(self.loc(), "expected loop or block after label")),
                }
            }
            _ => {
                // Assignment or procedure call.
                let target = self.parse_name()?;
                if self.accept(TokenKind::Assign) {
                    let value = self.parse_expression()?;
                    self.expect(TokenKind::Semi, "';'")?;
                    Ok(self.alloc(NodeKind::Assign { target, value }, loc))
                } else {
                    self.expect(TokenKind::Semi, "';'")?;
                    Ok(target)
                }
            }
        }
    }

    fn parse_if_statement(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::If, "'if'")?;
        let mut arms = Vec::new();
        let cond = self.parse_expression()?;
        self.expect(TokenKind::Then, "'then'")?;
        let stmts = self.parse_statement_sequence()?;
        arms.push(self.alloc(NodeKind::IfArm { cond, stmts }, loc));
        let mut else_stmts = Vec::new();
        loop {
            if self.accept(TokenKind::Elsif) {
                let aloc = self.loc();
                let cond = self.parse_expression()?;
                self.expect(TokenKind::Then, "'then'")?;
                let stmts = self.parse_statement_sequence()?;
                arms.push(self.alloc(NodeKind::IfArm { cond, stmts }, aloc));
            } else if self.accept(TokenKind::Else) {
                else_stmts = self.parse_statement_sequence()?;
                break;
            } else {
                break;
            }
        }
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::IfStmt { arms, else_stmts }, loc))
    }

    fn parse_case_statement(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Case, "'case'")?;
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Is, "'is'")?;
        let mut alts = Vec::new();
        while self.check(TokenKind::When) {
            let aloc = self.loc();
            self.advance();
            let choices = self.parse_choice_list()?;
            self.expect(TokenKind::Arrow, "'=>'")?;
            let stmts = self.parse_statement_sequence()?;
            alts.push(self.alloc(NodeKind::CaseAlt { choices, stmts }, aloc));
        }
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::Case, "'case'")?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::CaseStmt { expr, alts }, loc))
    }

    fn parse_loop_statement(&mut self, label: Option<NameId>) -> Result<NodeId, String> {
        let loc = self.loc();
        let scheme = match self.kind() {
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expression()?;
                LoopScheme::While { cond }
            }
            TokenKind::For => {
                self.advance();
                let var = self.ident()?;
                self.expect(TokenKind::In, "'in'")?;
                let reverse = self.accept(TokenKind::Reverse);
                let range = self.parse_discrete_range()?;
                LoopScheme::For {
                    var,
                    reverse,
                    range,
                }
            }
            _ => LoopScheme::Bare,
        };
        self.expect(TokenKind::Loop, "'loop'")?;
        let stmts = self.parse_statement_sequence()?;
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::Loop, "'loop'")?;
        if self.check(TokenKind::Ident) {
            self.ident()?;
        }
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::LoopStmt {
                label,
                scheme,
                stmts,
            },
            loc,
        ))
    }

    fn parse_block_statement(&mut self, label: Option<NameId>) -> Result<NodeId, String> {
        let loc = self.loc();
        let decls = if self.accept(TokenKind::Declare) {
            self.parse_declarative_part()?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::Begin, "'begin'")?;
        let (stmts, handlers) = self.parse_handled_statements()?;
        self.expect(TokenKind::End, "'end'")?;
        if self.check(TokenKind::Ident) {
            self.ident()?;
        }
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::BlockStmt {
                label,
                decls,
                stmts,
                handlers,
            },
            loc,
        ))
    }

    fn parse_accept_statement(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Accept, "'accept'")?;
        let name = self.ident()?;
        // The parenthesis after the entry name may open a formal part or an
        // entry-family index; try the formal part, backtrack to an index
        // expression.
        let mut index = None;
        let mut params = Vec::new();
        if self.check(TokenKind::LParen) {
            let saved = self.pos;
            match self.parse_formal_part() {
                Ok(p) => params = p,
                Err(_) => {
                    self.pos = saved;
                    self.expect(TokenKind::LParen, "'('")?;
                    index = Some(self.parse_expression()?);
                    self.expect(TokenKind::RParen, "')'")?;
                    if self.check(TokenKind::LParen) {
                        params = self.parse_formal_part()?;
                    }
                }
            }
        }
        let mut stmts = Vec::new();
        if self.accept(TokenKind::Do) {
            stmts = self.parse_statement_sequence()?;
            self.expect(TokenKind::End, "'end'")?;
            if self.check(TokenKind::Ident) {
                self.ident()?;
            }
        }
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(
            NodeKind::AcceptStmt {
                name,
                index,
                params,
                stmts,
            },
            loc,
        ))
    }

    fn parse_select_statement(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::Select, "'select'")?;
        let mut alts = Vec::new();
        let mut else_stmts = Vec::new();
        loop {
            let aloc = self.loc();
            let guard = if self.accept(TokenKind::When) {
                let g = self.parse_expression()?;
                self.expect(TokenKind::Arrow, "'=>'")?;
                Some(g)
            } else {
                None
            };
            let stmts = if self.accept(TokenKind::Terminate) {
                self.expect(TokenKind::Semi, "';'")?;
                Vec::new()
            } else {
                self.parse_statement_sequence()?
            };
            alts.push(self.alloc(NodeKind::SelectAlt { guard, stmts }, aloc));
            if self.accept(TokenKind::Or) {
                continue;
            }
            if self.accept(TokenKind::Else) {
                else_stmts = self.parse_statement_sequence()?;
            }
            break;
        }
        self.expect(TokenKind::End, "'end'")?;
        self.expect(TokenKind::Select, "'select'")?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(self.alloc(NodeKind::SelectStmt { alts, else_stmts }, loc))
    }

    // ----- expressions -----

    pub fn parse_expression(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let mut lhs = self.parse_relation()?;
        loop {
            let op = match self.kind() {
                TokenKind::And => BinOp::And,
                TokenKind::AndThen => BinOp::AndThen,
                TokenKind::Or => BinOp::Or,
                TokenKind::OrElse => BinOp::OrElse,
                TokenKind::Xor => BinOp::Xor,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_relation()?;
            lhs = self.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
        Ok(lhs)
    }

    fn parse_relation(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let lhs = self.parse_simple_expression()?;
        let op = match self.kind() {
            TokenKind::Eq => Some(BinOp::Eq),
            TokenKind::Neq => Some(BinOp::Neq),
            TokenKind::Lt => Some(BinOp::Lt),
            TokenKind::Le => Some(BinOp::Le),
            TokenKind::Gt => Some(BinOp::Gt),
            TokenKind::Ge => Some(BinOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.parse_simple_expression()?;
            return Ok(self.alloc(NodeKind::Binary { op, lhs, rhs }, loc));
        }
        if self.check(TokenKind::In) || self.check(TokenKind::NotIn) {
            let negated = self.kind() == TokenKind::NotIn;
            self.advance();
            let target = self.parse_discrete_range()?;
            return Ok(self.alloc(
                NodeKind::Membership {
                    expr: lhs,
                    target,
                    negated,
                },
                loc,
            ));
        }
        if self.check(TokenKind::DotDot) {
            self.advance();
            let hi = self.parse_simple_expression()?;
            return Ok(self.alloc(NodeKind::RangeExpr { lo: lhs, hi }, loc));
        }
        Ok(lhs)
    }

    fn parse_simple_expression(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let mut lhs = if self.check(TokenKind::Plus) {
            self.advance();
            let operand = self.parse_term()?;
            self.alloc(
                NodeKind::Unary {
                    op: UnOp::Plus,
                    operand,
                },
                loc,
            )
        } else if self.check(TokenKind::Minus) {
            self.advance();
            let operand = self.parse_term()?;
            self.alloc(
                NodeKind::Unary {
                    op: UnOp::Minus,
                    operand,
                },
                loc,
            )
        } else {
            self.parse_term()?
        };
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Amp => BinOp::Cat,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = self.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Mod => BinOp::Mod,
                TokenKind::Rem => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = self.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        if self.accept(TokenKind::Not) {
            let operand = self.parse_factor()?;
            return Ok(self.alloc(
                NodeKind::Unary {
                    op: UnOp::Not,
                    operand,
                },
                loc,
            ));
        }
        if self.accept(TokenKind::Abs) {
            let operand = self.parse_factor()?;
            return Ok(self.alloc(
                NodeKind::Unary {
                    op: UnOp::Abs,
                    operand,
                },
                loc,
            ));
        }
        let base = self.parse_primary()?;
        if self.accept(TokenKind::StarStar) {
            // Right-associative.
            let rhs = self.parse_factor()?;
            return Ok(self.alloc(
                NodeKind::Binary {
                    op: BinOp::Pow,
                    lhs: base,
                    rhs,
                },
                loc,
            ));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        match self.kind() {
            TokenKind::IntLit => {
                let t = self.advance();
                Ok(self.alloc(
                    NodeKind::IntLit {
                        value: t.int_value,
                        big: t.big_value,
                    },
                    loc,
                ))
            }
            TokenKind::RealLit => {
                let t = self.advance();
                Ok(self.alloc(NodeKind::RealLit(t.real_value), loc))
            }
            TokenKind::CharLit => {
                let t = self.advance();
                Ok(self.alloc(NodeKind::CharLit(t.char_value), loc))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.alloc(NodeKind::NullLit, loc))
            }
            TokenKind::Others => {
                self.advance();
                Ok(self.alloc(NodeKind::OthersMark, loc))
            }
            TokenKind::New => {
                self.advance();
                let subtype = self.parse_subtype_indication()?;
                // `new T'(expr)` carries an initial value.
                let init = match self.ast.kind(subtype) {
                    NodeKind::SubtypeInd { mark, .. } => match self.ast.kind(*mark) {
                        NodeKind::Qualified { expr, .. } => Some(*expr),
                        _ => None,
                    },
                    _ => None,
                };
                Ok(self.alloc(NodeKind::Allocator { subtype, init }, loc))
            }
            TokenKind::LParen => self.parse_aggregate_or_paren(),
            TokenKind::StrLit | TokenKind::Ident => self.parse_name(),
            _ => Err(self.diags.fatal(
                self.loc(),
                &format!("expected expression, found '{}'", self.tok().text),
            )),
        }
    }

    /// A parenthesized expression, or an aggregate when more than one item
    /// or any `=>` association appears.
    fn parse_aggregate_or_paren(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        self.expect(TokenKind::LParen, "'('")?;
        let mut assocs = Vec::new();
        let mut aggregate = false;
        loop {
            let item = self.parse_assoc_item()?;
            if let NodeKind::Assoc { choices, .. } = self.ast.kind(item) {
                if !choices.is_empty() {
                    aggregate = true;
                }
            }
            assocs.push(item);
            if self.accept(TokenKind::Comma) {
                aggregate = true;
            } else {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        if !aggregate && assocs.len() == 1 {
            // Plain parenthesized expression.
            if let NodeKind::Assoc { value, .. } = self.ast.kind(assocs[0]) {
                return Ok(*value);
            }
        }
        Ok(self.alloc(NodeKind::Aggregate { assocs }, loc))
    }

    /// One association: `[choice {| choice} =>] expression`, where a
    /// choice is an expression, a range, or `others`.
    fn parse_assoc_item(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let first = if self.check(TokenKind::Others) {
            self.advance();
            self.alloc(NodeKind::OthersMark, loc)
        } else {
            self.parse_expression()?
        };
        if self.check(TokenKind::Bar) || self.check(TokenKind::Arrow) {
            let mut choices = vec![first];
            while self.accept(TokenKind::Bar) {
                let c = if self.check(TokenKind::Others) {
                    let oloc = self.loc();
                    self.advance();
                    self.alloc(NodeKind::OthersMark, oloc)
                } else {
                    self.parse_expression()?
                };
                choices.push(c);
            }
            self.expect(TokenKind::Arrow, "'=>'")?;
            let value = self.parse_expression()?;
            return Ok(self.alloc(NodeKind::Assoc { choices, value }, loc));
        }
        Ok(self.alloc(
            NodeKind::Assoc {
                choices: Vec::new(),
                value: first,
            },
            loc,
        ))
    }

    fn parse_choice_list(&mut self) -> Result<Vec<NodeId>, String> {
        let mut choices = Vec::new();
        loop {
            let loc = self.loc();
            if self.accept(TokenKind::Others) {
                choices.push(self.alloc(NodeKind::OthersMark, loc));
            } else {
                choices.push(self.parse_expression()?);
            }
            if !self.accept(TokenKind::Bar) {
                break;
            }
        }
        Ok(choices)
    }

    /// A discrete range: `lo .. hi`, a subtype mark, or an attribute such
    /// as `A'Range`. The analyzer interprets marks as their full range.
    pub fn parse_discrete_range(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let first = self.parse_simple_expression()?;
        if self.accept(TokenKind::DotDot) {
            let hi = self.parse_simple_expression()?;
            return Ok(self.alloc(NodeKind::RangeExpr { lo: first, hi }, loc));
        }
        Ok(first)
    }

    fn parse_range(&mut self) -> Result<NodeId, String> {
        let loc = self.loc();
        let lo = self.parse_simple_expression()?;
        if self.accept(TokenKind::DotDot) {
            let hi = self.parse_simple_expression()?;
            return Ok(self.alloc(NodeKind::RangeExpr { lo, hi }, loc));
        }
        // `range A'Range` and similar: a single name denotes the range.
        Ok(lo)
    }

    // ----- names -----

    /// A name with all suffixes: selected components, dereferences,
    /// attributes, qualified expressions, calls and indexings.
    pub fn parse_name(&mut self) -> Result<NodeId, String> {
        self.parse_name_inner(true)
    }

    /// A name that stops before a parenthesis (type marks in subtype
    /// indications, where `(` begins a constraint instead).
    fn parse_name_no_call(&mut self) -> Result<NodeId, String> {
        self.parse_name_inner(false)
    }

    fn parse_name_inner(&mut self, allow_call: bool) -> Result<NodeId, String> {
        let loc = self.loc();
        let mut node = match self.kind() {
            TokenKind::Ident => {
                let n = self.ident()?;
                self.alloc(NodeKind::Ident(n), loc)
            }
            TokenKind::StrLit => {
                // Operator symbol used as a name: `"<"(A, B)`.
                let t = self.advance();
                let n = self.names.intern(&t.text);
                self.alloc(NodeKind::Ident(n), loc)
            }
            _ => {
                return Err(self.diags.fatal(
                    self.loc(),
                    &format!("expected name, found '{}'", self.tok().text),
                ));
            }
        };
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    self.advance();
                    if self.accept(TokenKind::All) {
                        node = self.alloc(NodeKind::Deref { prefix: node }, loc);
                    } else if self.check(TokenKind::CharLit) {
                        // Selected enumeration character literal: P.'x'.
                        let t = self.advance();
                        let n = self.names.intern(&t.text);
                        node = self.alloc(
                            NodeKind::Selected {
                                prefix: node,
                                field: n,
                            },
                            loc,
                        );
                    } else if self.check(TokenKind::StrLit) {
                        let t = self.advance();
                        let n = self.names.intern(&t.text);
                        node = self.alloc(
                            NodeKind::Selected {
                                prefix: node,
                                field: n,
                            },
                            loc,
                        );
                    } else {
                        let field = self.ident()?;
                        node = self.alloc(
                            NodeKind::Selected {
                                prefix: node,
                                field,
                            },
                            loc,
                        );
                    }
                }
                TokenKind::Tick => {
                    self.advance();
                    if self.check(TokenKind::LParen) {
                        // Qualified expression: Mark'(expr) or Mark'(aggregate).
                        let expr = self.parse_aggregate_or_paren()?;
                        node = self.alloc(
                            NodeKind::Qualified {
                                mark: node,
                                expr,
                            },
                            loc,
                        );
                    } else {
                        // Attribute name may be an identifier or a reserved
                        // word (Range, Digits, Delta, Access).
                        let t = self.advance();
                        let attr = self.names.intern(&t.text);
                        let args = if allow_call && self.check(TokenKind::LParen) {
                            self.parse_actual_part()?
                        } else {
                            Vec::new()
                        };
                        node = self.alloc(
                            NodeKind::Attr {
                                prefix: node,
                                attr,
                                args,
                            },
                            loc,
                        );
                    }
                }
                TokenKind::LParen if allow_call => {
                    let args = self.parse_actual_part()?;
                    // A single range argument is a slice.
                    if args.len() == 1 {
                        if let NodeKind::Assoc { choices, value } = self.ast.kind(args[0]) {
                            if choices.is_empty() {
                                if let NodeKind::RangeExpr { .. } = self.ast.kind(*value) {
                                    let range = *value;
                                    node = self.alloc(
                                        NodeKind::Slice {
                                            prefix: node,
                                            range,
                                        },
                                        loc,
                                    );
                                    continue;
                                }
                            }
                        }
                    }
                    node = self.alloc(NodeKind::Call { callee: node, args }, loc);
                }
                _ => break,
            }
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(source: &str) -> (Ast, Vec<NodeId>) {
        let mut ast = Ast::new();
        let mut names = NameTable::new();
        let diags = Diagnostics::new();
        let tokens = tokenize(source, 0, &diags).unwrap();
        let mut parser = Parser::new(tokens, &mut ast, &mut names, &diags);
        let units = parser.parse_file().unwrap();
        (ast, units)
    }

    fn unit_of(ast: &Ast, unit: NodeId) -> NodeId {
        match ast.kind(unit) {
            NodeKind::CompUnit { unit, .. } => *unit,
            other => panic!("expected compilation unit, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_hello_world() {
        let (ast, units) = parse(
            "with Ada.Text_IO; use Ada.Text_IO;\n\
             procedure Hello is begin Put_Line(\"Hello, World!\"); end;",
        );
        assert_eq!(units.len(), 1);
        let body = unit_of(&ast, units[0]);
        match ast.kind(body) {
            NodeKind::SubprogBody { stmts, .. } => {
                assert_eq!(stmts.len(), 1);
                assert!(matches!(ast.kind(stmts[0]), NodeKind::Call { .. }));
            }
            other => panic!("expected subprogram body, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_context_clause() {
        let (ast, units) = parse("with A, B; use A;\nprocedure P is begin null; end;");
        match ast.kind(units[0]) {
            NodeKind::CompUnit { context, .. } => {
                assert_eq!(context.len(), 2);
                assert!(matches!(ast.kind(context[0]), NodeKind::WithClause { names } if names.len() == 2));
            }
            _ => panic!("expected compilation unit"),
        }
    }

    #[test]
    fn test_parse_subtype_with_range() {
        let (ast, units) = parse(
            "procedure R is subtype S is Integer range 1..10;\n\
             X : S; begin X := 11; end;",
        );
        let body = unit_of(&ast, units[0]);
        match ast.kind(body) {
            NodeKind::SubprogBody { decls, stmts, .. } => {
                assert_eq!(decls.len(), 2);
                assert!(matches!(ast.kind(decls[0]), NodeKind::SubtypeDecl { .. }));
                assert!(matches!(ast.kind(stmts[0]), NodeKind::Assign { .. }));
            }
            _ => panic!("expected subprogram body"),
        }
    }

    #[test]
    fn test_parse_overloaded_functions() {
        let (ast, units) = parse(
            "procedure O is\n\
             function F(X: Integer) return Integer is begin return X + 1; end;\n\
             function F(X: Float) return Float is begin return X + 1.0; end;\n\
             A : Integer := F(5);\n\
             begin null; end;",
        );
        let body = unit_of(&ast, units[0]);
        match ast.kind(body) {
            NodeKind::SubprogBody { decls, .. } => {
                assert_eq!(decls.len(), 3);
                assert!(matches!(ast.kind(decls[0]), NodeKind::SubprogBody { .. }));
                assert!(matches!(ast.kind(decls[1]), NodeKind::SubprogBody { .. }));
            }
            _ => panic!("expected subprogram body"),
        }
    }

    #[test]
    fn test_parse_record_type() {
        let (ast, units) = parse(
            "package P is\n\
             type R is record A : Integer; B : Float; end record;\n\
             end P;",
        );
        let spec = unit_of(&ast, units[0]);
        match ast.kind(spec) {
            NodeKind::PackageSpec { visible, .. } => {
                match ast.kind(visible[0]) {
                    NodeKind::TypeDecl { def: Some(d), .. } => {
                        assert!(
                            matches!(ast.kind(*d), NodeKind::RecordDef { components, .. } if components.len() == 2)
                        );
                    }
                    _ => panic!("expected type declaration"),
                }
            }
            _ => panic!("expected package spec"),
        }
    }

    #[test]
    fn test_parse_generic_and_instantiation() {
        let (ast, units) = parse(
            "generic type T is private; with function \"<\"(A, B: T) return Boolean;\n\
             procedure Sort(A: in out T);\n\
             procedure Main is procedure ISort is new Sort(Integer, \"<\"); begin null; end;",
        );
        assert_eq!(units.len(), 2);
        let gen = unit_of(&ast, units[0]);
        match ast.kind(gen) {
            NodeKind::GenericDecl { formals, .. } => assert_eq!(formals.len(), 2),
            other => panic!("expected generic declaration, got {:?}", other),
        }
        let main = unit_of(&ast, units[1]);
        match ast.kind(main) {
            NodeKind::SubprogBody { decls, .. } => {
                assert!(matches!(
                    ast.kind(decls[0]),
                    NodeKind::Instantiation { actuals, .. } if actuals.len() == 2
                ));
            }
            _ => panic!("expected subprogram body"),
        }
    }

    #[test]
    fn test_parse_aggregate_vs_paren() {
        let (ast, units) = parse(
            "procedure A is\n\
             X : Integer := (1 + 2);\n\
             type V is array (1..3) of Integer;\n\
             Y : V := (1, 2, 3);\n\
             Z : V := (others => 0);\n\
             begin null; end;",
        );
        let body = unit_of(&ast, units[0]);
        match ast.kind(body) {
            NodeKind::SubprogBody { decls, .. } => {
                match ast.kind(decls[0]) {
                    NodeKind::ObjectDecl { init: Some(i), .. } => {
                        assert!(matches!(ast.kind(*i), NodeKind::Binary { .. }));
                    }
                    _ => panic!("expected object declaration"),
                }
                match ast.kind(decls[2]) {
                    NodeKind::ObjectDecl { init: Some(i), .. } => {
                        assert!(
                            matches!(ast.kind(*i), NodeKind::Aggregate { assocs } if assocs.len() == 3)
                        );
                    }
                    _ => panic!("expected object declaration"),
                }
                match ast.kind(decls[3]) {
                    NodeKind::ObjectDecl { init: Some(i), .. } => {
                        assert!(matches!(ast.kind(*i), NodeKind::Aggregate { .. }));
                    }
                    _ => panic!("expected object declaration"),
                }
            }
            _ => panic!("expected subprogram body"),
        }
    }

    #[test]
    fn test_parse_if_elsif_else() {
        let (ast, units) = parse(
            "procedure C is X : Integer := 0; begin\n\
             if X > 0 then X := 1; elsif X < 0 then X := 2; else X := 3; end if;\n\
             end;",
        );
        let body = unit_of(&ast, units[0]);
        match ast.kind(body) {
            NodeKind::SubprogBody { stmts, .. } => match ast.kind(stmts[0]) {
                NodeKind::IfStmt { arms, else_stmts } => {
                    assert_eq!(arms.len(), 2);
                    assert_eq!(else_stmts.len(), 1);
                }
                _ => panic!("expected if statement"),
            },
            _ => panic!("expected subprogram body"),
        }
    }

    #[test]
    fn test_parse_loops_and_exit() {
        let (ast, units) = parse(
            "procedure L is S : Integer := 0; begin\n\
             for I in 1..10 loop S := S + I; end loop;\n\
             while S > 0 loop exit when S = 5; S := S - 1; end loop;\n\
             Outer: loop exit Outer; end loop Outer;\n\
             end;",
        );
        let body = unit_of(&ast, units[0]);
        match ast.kind(body) {
            NodeKind::SubprogBody { stmts, .. } => {
                assert!(matches!(
                    ast.kind(stmts[0]),
                    NodeKind::LoopStmt {
                        scheme: LoopScheme::For { .. },
                        ..
                    }
                ));
                assert!(matches!(
                    ast.kind(stmts[1]),
                    NodeKind::LoopStmt {
                        scheme: LoopScheme::While { .. },
                        ..
                    }
                ));
                assert!(matches!(
                    ast.kind(stmts[2]),
                    NodeKind::LoopStmt {
                        label: Some(_),
                        scheme: LoopScheme::Bare,
                        ..
                    }
                ));
            }
            _ => panic!("expected subprogram body"),
        }
    }

    #[test]
    fn test_parse_exception_handler() {
        let (ast, units) = parse(
            "procedure E is X : Integer; begin X := 10 / 0;\n\
             exception when Constraint_Error => X := -1; when others => null;\n\
             end;",
        );
        let body = unit_of(&ast, units[0]);
        match ast.kind(body) {
            NodeKind::SubprogBody { handlers, .. } => {
                assert_eq!(handlers.len(), 2);
                match ast.kind(handlers[1]) {
                    NodeKind::Handler { choices, .. } => {
                        assert!(matches!(ast.kind(choices[0]), NodeKind::OthersMark));
                    }
                    _ => panic!("expected handler"),
                }
            }
            _ => panic!("expected subprogram body"),
        }
    }

    #[test]
    fn test_parse_unconstrained_array_and_attributes() {
        let (ast, units) = parse(
            "package P is\n\
             type Vec is array (Positive range <>) of Integer;\n\
             end P;\n\
             function Sum(A: Vec) return Integer is\n\
             S : Integer := 0;\n\
             begin for I in A'Range loop S := S + A(I); end loop; return S; end;",
        );
        let spec = unit_of(&ast, units[0]);
        match ast.kind(spec) {
            NodeKind::PackageSpec { visible, .. } => match ast.kind(visible[0]) {
                NodeKind::TypeDecl { def: Some(d), .. } => {
                    assert!(matches!(
                        ast.kind(*d),
                        NodeKind::ArrayDef {
                            unconstrained: true,
                            ..
                        }
                    ));
                }
                _ => panic!("expected type declaration"),
            },
            _ => panic!("expected package spec"),
        }
    }

    #[test]
    fn test_parse_task_and_accept() {
        let (ast, units) = parse(
            "package P is task T is entry Go(N: Integer); end T; end P;\n\
             task body T is begin accept Go(N: Integer) do null; end Go; end T;",
        );
        let spec = unit_of(&ast, units[0]);
        match ast.kind(spec) {
            NodeKind::PackageSpec { visible, .. } => {
                assert!(matches!(ast.kind(visible[0]), NodeKind::TaskSpec { .. }));
            }
            _ => panic!("expected package spec"),
        }
        let body = unit_of(&ast, units[1]);
        match ast.kind(body) {
            NodeKind::TaskBody { stmts, .. } => {
                assert!(
                    matches!(ast.kind(stmts[0]), NodeKind::AcceptStmt { params, .. } if params.len() == 1)
                );
            }
            other => panic!("expected task body, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rep_clause_and_pragma() {
        let (ast, units) = parse(
            "package P is\n\
             type Color is (Red, Green, Blue);\n\
             for Color use (Red => 1, Green => 2, Blue => 4);\n\
             pragma Pack(Color);\n\
             end P;",
        );
        let spec = unit_of(&ast, units[0]);
        match ast.kind(spec) {
            NodeKind::PackageSpec { visible, .. } => {
                assert!(matches!(ast.kind(visible[1]), NodeKind::RepClause { .. }));
                assert!(matches!(ast.kind(visible[2]), NodeKind::PragmaNode { .. }));
            }
            _ => panic!("expected package spec"),
        }
    }

    #[test]
    fn test_parse_separate_subunit() {
        let (ast, units) = parse("separate (Parent)\nprocedure Child is begin null; end;");
        match ast.kind(units[0]) {
            NodeKind::CompUnit {
                separate_parent: Some(_),
                ..
            } => {}
            other => panic!("expected separate unit, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_slice_and_qualified() {
        let (ast, units) = parse(
            "procedure S is\n\
             subtype Line is String;\n\
             function Head(X: Line) return Line is begin return X(1..2); end;\n\
             Y : Integer := Integer'(42);\n\
             begin null; end;",
        );
        let body = unit_of(&ast, units[0]);
        match ast.kind(body) {
            NodeKind::SubprogBody { decls, .. } => {
                match ast.kind(decls[1]) {
                    NodeKind::SubprogBody { stmts, .. } => match ast.kind(stmts[0]) {
                        NodeKind::ReturnStmt { expr: Some(e) } => {
                            assert!(matches!(ast.kind(*e), NodeKind::Slice { .. }));
                        }
                        _ => panic!("expected return"),
                    },
                    _ => panic!("expected function body"),
                }
                match ast.kind(decls[2]) {
                    NodeKind::ObjectDecl { init: Some(i), .. } => {
                        assert!(matches!(ast.kind(*i), NodeKind::Qualified { .. }));
                    }
                    _ => panic!("expected object declaration"),
                }
            }
            _ => panic!("expected subprogram body"),
        }
    }

    #[test]
    fn test_parse_error_is_fatal_with_location() {
        let mut ast = Ast::new();
        let mut names = NameTable::new();
        let mut diags = Diagnostics::new();
        let f = diags.add_file("bad.adb");
        let tokens = tokenize("procedure P is begin x := ; end;", f, &diags).unwrap();
        let mut parser = Parser::new(tokens, &mut ast, &mut names, &diags);
        let err = parser.parse_file().unwrap_err();
        assert!(err.starts_with("bad.adb:"), "got {}", err);
    }
}
