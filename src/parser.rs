//! A Pratt parser: one prefix/infix match per token kind, built bottom-up
//! into the index arena in `ast`. Right-associativity is implemented by
//! lowering the recursive call's minimum precedence by one; prefix operators
//! carry their own binding power so e.g. `-2 * 3` parses as `(-2) * 3`.

use crate::ast::{Ast, BinaryOp, ClassMember, LoopExit, Literal, MatchArm, NodeId, NodeKind, UnaryOp};
use crate::error::{ParseError, ParseErrorKind};
use crate::intern::Symbol;
use crate::lexer::Lexer;
use crate::token::{Span, Token, TokenKind};

const MAX_ERRORS_PER_BLOCK: usize = 10;

pub struct Parser<'a, 'b> {
    lexer: &'b mut Lexer<'a>,
    ast: Ast,
    errors: Vec<ParseError>,
    loop_depth: u32,
}

impl<'a, 'b> Parser<'a, 'b> {
    pub fn new(lexer: &'b mut Lexer<'a>) -> Self {
        Self { lexer, ast: Ast::new(), errors: Vec::new(), loop_depth: 0 }
    }

    pub fn parse_program(mut self) -> (Ast, NodeId, Vec<ParseError>) {
        let start = self.peek().span;
        let mut stmts = Vec::new();
        while self.peek().kind != TokenKind::End {
            if self.errors.len() > MAX_ERRORS_PER_BLOCK {
                break;
            }
            match self.parse_statement() {
                Some(id) => stmts.push(id),
                None => {
                    if self.peek().kind != TokenKind::End {
                        self.next();
                    } else {
                        break;
                    }
                }
            }
        }
        let root = self.ast.push(NodeKind::Statements { stmts }, start);
        (self.ast, root, self.errors)
    }

    // ---------- token helpers ----------

    fn peek(&mut self) -> Token {
        self.lexer.peek()
    }

    fn next(&mut self) -> Token {
        self.lexer.next()
    }

    fn check(&mut self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, err: ParseErrorKind) -> bool {
        if self.eat(kind) {
            true
        } else {
            self.error(err);
            false
        }
    }

    fn expect_identifier(&mut self) -> Option<Symbol> {
        if self.check(TokenKind::Identifier) {
            Some(self.next().lexeme)
        } else {
            self.error(ParseErrorKind::IdentifierExpected);
            None
        }
    }

    fn error(&mut self, kind: ParseErrorKind) {
        let span = self.peek().span;
        self.errors.push(ParseError { kind, span });
    }

    fn skip_to_close_brace(&mut self) {
        let mut depth = 1;
        loop {
            match self.peek().kind {
                TokenKind::End => return,
                TokenKind::LBrace => {
                    depth += 1;
                    self.next();
                }
                TokenKind::RBrace => {
                    self.next();
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {
                    self.next();
                }
            }
        }
    }

    // ---------- statements ----------

    fn parse_statement(&mut self) -> Option<NodeId> {
        match self.peek().kind {
            TokenKind::Var => self.parse_var_val(false),
            TokenKind::Val => self.parse_var_val(true),
            TokenKind::Fn => self.parse_function_declaration(&[], false),
            TokenKind::Class | TokenKind::Struct => self.parse_class_declaration(),
            TokenKind::Enum => self.parse_enum_declaration(),
            TokenKind::Interface => self.parse_interface_declaration(),
            TokenKind::Use => self.parse_use_statement(),
            TokenKind::While => self.parse_while(),
            TokenKind::Repeat => self.parse_repeat(),
            TokenKind::For => self.parse_for(),
            TokenKind::ForEach => self.parse_foreach(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Break | TokenKind::Continue | TokenKind::Breakout => self.parse_break_continue(),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Semicolon => {
                self.next();
                self.parse_statement()
            }
            TokenKind::End => None,
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block(&mut self) -> Option<NodeId> {
        let start = self.peek().span;
        self.expect(TokenKind::LBrace, ParseErrorKind::OpenBraceExpected);
        let mut stmts = Vec::new();
        let mut block_errors = 0;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::End) {
            let before = self.errors.len();
            match self.parse_statement() {
                Some(id) => stmts.push(id),
                None => {
                    if !self.check(TokenKind::RBrace) && !self.check(TokenKind::End) {
                        self.next();
                    }
                }
            }
            if self.errors.len() > before {
                block_errors += 1;
            }
            if block_errors > MAX_ERRORS_PER_BLOCK {
                break;
            }
        }
        self.expect(TokenKind::RBrace, ParseErrorKind::CloseBraceExpected);
        Some(self.ast.push(NodeKind::Statements { stmts }, start))
    }

    fn parse_var_val(&mut self, is_const: bool) -> Option<NodeId> {
        let start = self.next().span; // eat var/val
        let mut stmts = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            let init = if self.eat(TokenKind::Assign) {
                self.parse_expr()
            } else {
                if is_const {
                    self.error(ParseErrorKind::MissingInitExpression);
                }
                None
            };
            stmts.push(self.ast.push(NodeKind::VarVal { name, is_const, init }, start));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon, ParseErrorKind::SemicolonExpected);
        if stmts.len() == 1 {
            Some(stmts[0])
        } else {
            Some(self.ast.push(NodeKind::Statements { stmts }, start))
        }
    }

    fn parse_params(&mut self) -> Vec<Symbol> {
        self.expect(TokenKind::LParen, ParseErrorKind::OpenParenExpected);
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) && !self.check(TokenKind::End) {
            if let Some(name) = self.expect_identifier() {
                params.push(name);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, ParseErrorKind::CloseParenExpected);
        if params.len() > 63 {
            self.error(ParseErrorKind::TooManyFunctionArgs(params.len()));
        }
        params
    }

    fn parse_function_declaration(&mut self, _extra: &[()], is_static: bool) -> Option<NodeId> {
        let start = self.next().span; // eat 'fn'
        let name = self.expect_identifier()?;
        let params = self.parse_params();
        let body = if self.eat(TokenKind::FatArrow) {
            let e = self.parse_expr()?;
            self.expect(TokenKind::Semicolon, ParseErrorKind::SemicolonExpected);
            e
        } else {
            self.parse_block()?
        };
        let _ = is_static;
        Some(self.ast.push(NodeKind::FunctionDeclaration { name, params, body }, start))
    }

    fn parse_class_declaration(&mut self) -> Option<NodeId> {
        let start = self.next().span; // eat class/struct
        let name = self.expect_identifier()?;
        self.parse_class_body(name, start)
    }

    fn parse_class_body(&mut self, name: Symbol, start: Span) -> Option<NodeId> {
        let base = if self.eat(TokenKind::Colon) { self.expect_identifier() } else { None };
        self.expect(TokenKind::LBrace, ParseErrorKind::OpenBraceExpected);
        let mut members = Vec::new();
        let mut pending_static = false;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::End) {
            match self.peek().kind {
                TokenKind::Fn | TokenKind::New => {
                    let is_ctor = self.check(TokenKind::New);
                    let mstart = self.next().span; // eat fn/new
                    let mname = if is_ctor { Symbol::EMPTY } else { self.expect_identifier().unwrap_or(Symbol::EMPTY) };
                    let params = self.parse_params();
                    let body = if self.eat(TokenKind::FatArrow) {
                        let e = self.parse_expr().unwrap_or_else(|| self.ast.push(NodeKind::Literal(Literal::Null), mstart));
                        self.expect(TokenKind::Semicolon, ParseErrorKind::SemicolonExpected);
                        e
                    } else {
                        self.parse_block().unwrap_or_else(|| self.ast.push(NodeKind::Statements { stmts: vec![] }, mstart))
                    };
                    members.push(ClassMember::Method { name: mname, params, body, is_static: pending_static, is_ctor });
                    pending_static = false;
                }
                TokenKind::Var | TokenKind::Val => {
                    let is_const = self.check(TokenKind::Val);
                    self.next();
                    loop {
                        let fname = match self.expect_identifier() {
                            Some(n) => n,
                            None => break,
                        };
                        let init = if self.eat(TokenKind::Assign) {
                            self.parse_expr()
                        } else {
                            if is_const {
                                self.error(ParseErrorKind::MissingInitExpression);
                            }
                            None
                        };
                        members.push(ClassMember::Field { name: fname, is_const, is_static: pending_static, init });
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::Semicolon, ParseErrorKind::SemicolonExpected);
                    pending_static = false;
                }
                TokenKind::Class => {
                    self.next(); // eat 'class'
                    if self.check(TokenKind::Identifier) {
                        let nested_start = self.peek().span;
                        let nested_name = self.next().lexeme;
                        if let Some(nested) = self.parse_class_body(nested_name, nested_start) {
                            members.push(ClassMember::Nested(nested));
                        }
                    } else {
                        pending_static = true;
                    }
                }
                _ => {
                    let kind = self.peek().kind;
                    self.error(ParseErrorKind::UnexpectedToken(kind));
                    self.next();
                }
            }
        }
        self.expect(TokenKind::RBrace, ParseErrorKind::CloseBraceExpected);
        Some(self.ast.push(NodeKind::ClassDeclaration { name, base, members }, start))
    }

    fn parse_enum_declaration(&mut self) -> Option<NodeId> {
        let start = self.next().span; // eat enum
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LBrace, ParseErrorKind::OpenBraceExpected);
        let mut variants = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::End) {
            let vname = match self.expect_identifier() {
                Some(n) => n,
                None => break,
            };
            let explicit = if self.eat(TokenKind::Assign) {
                let tok = self.next();
                if tok.kind == TokenKind::Integer {
                    Some(tok.int_value)
                } else {
                    self.error(ParseErrorKind::Syntax("enum value must be an Integer literal".into()));
                    None
                }
            } else {
                None
            };
            variants.push((vname, explicit));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, ParseErrorKind::CloseBraceExpected);
        Some(self.ast.push(NodeKind::EnumDeclaration { name, variants }, start))
    }

    fn parse_interface_declaration(&mut self) -> Option<NodeId> {
        let start = self.next().span; // eat interface
        let name = self.expect_identifier()?;
        if self.eat(TokenKind::LBrace) {
            self.skip_to_close_brace();
        }
        Some(self.ast.push(NodeKind::InterfaceDeclaration { name }, start))
    }

    fn parse_use_statement(&mut self) -> Option<NodeId> {
        let start = self.next().span; // eat use
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Semicolon, ParseErrorKind::SemicolonExpected);
        Some(self.ast.push(NodeKind::UseStatement { name }, start))
    }

    fn parse_while(&mut self) -> Option<NodeId> {
        let start = self.next().span; // eat while
        let cond = self.parse_expr().or_else(|| {
            self.error(ParseErrorKind::ConditionExpressionExpected);
            None
        })?;
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        Some(self.ast.push(NodeKind::While { cond, body: body? }, start))
    }

    fn parse_repeat(&mut self) -> Option<NodeId> {
        let start = self.next().span; // eat repeat
        let count = if self.check(TokenKind::LBrace) { None } else { self.parse_expr() };
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        Some(self.ast.push(NodeKind::Repeat { count, body: body? }, start))
    }

    fn parse_for(&mut self) -> Option<NodeId> {
        let start = self.next().span; // eat for
        let has_paren = self.eat(TokenKind::LParen);
        let init = self.parse_statement();
        let cond = self.parse_expr();
        self.expect(TokenKind::Semicolon, ParseErrorKind::SemicolonExpected);
        let step = self.parse_expr();
        if has_paren {
            self.expect(TokenKind::RParen, ParseErrorKind::CloseParenExpected);
        }
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        Some(self.ast.push(NodeKind::For { init, cond, step, body: body? }, start))
    }

    fn parse_foreach(&mut self) -> Option<NodeId> {
        let start = self.next().span; // eat foreach
        let has_paren = self.eat(TokenKind::LParen);
        let name = self.expect_identifier()?;
        self.expect(TokenKind::In, ParseErrorKind::Syntax("'in' expected".into()));
        let iterable = self.parse_expr()?;
        if has_paren {
            self.expect(TokenKind::RParen, ParseErrorKind::CloseParenExpected);
        }
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        Some(self.ast.push(NodeKind::ForEach { name, iterable, body: body? }, start))
    }

    fn parse_return(&mut self) -> Option<NodeId> {
        let start = self.next().span; // eat return
        let value = if self.check(TokenKind::Semicolon) { None } else { self.parse_expr() };
        self.expect(TokenKind::Semicolon, ParseErrorKind::SemicolonExpected);
        Some(self.ast.push(NodeKind::Return { value }, start))
    }

    fn parse_break_continue(&mut self) -> Option<NodeId> {
        let tok = self.next();
        self.expect(TokenKind::Semicolon, ParseErrorKind::SemicolonExpected);
        if self.loop_depth == 0 {
            self.errors.push(ParseError { kind: ParseErrorKind::BreakContinueNoLoop, span: tok.span });
        }
        let exit = match tok.kind {
            TokenKind::Break => LoopExit::Break,
            TokenKind::Continue => LoopExit::Continue,
            _ => LoopExit::Breakout,
        };
        Some(self.ast.push(NodeKind::BreakOrContinue(exit), tok.span))
    }

    fn parse_expression_statement(&mut self) -> Option<NodeId> {
        let start = self.peek().span;
        let expr = self.parse_expr()?;
        let has_semicolon = self.eat(TokenKind::Semicolon);
        Some(self.ast.push(NodeKind::ExpressionStatement { expr, has_semicolon }, start))
    }

    // ---------- expressions ----------

    fn parse_expr(&mut self) -> Option<NodeId> {
        self.parse_expression(0)
    }

    fn parse_expression(&mut self, min_prec: i32) -> Option<NodeId> {
        let tok = self.next();
        let mut left = self.parse_prefix(tok)?;
        loop {
            let prec = infix_precedence(self.peek().kind);
            match prec {
                Some((p, _)) if (p as i32) > min_prec => {
                    let tok = self.next();
                    left = self.parse_infix(left, tok)?;
                }
                _ => break,
            }
        }
        Some(left)
    }

    fn parse_prefix(&mut self, tok: Token) -> Option<NodeId> {
        match tok.kind {
            TokenKind::Integer => Some(self.ast.push(NodeKind::Literal(Literal::Integer(tok.int_value)), tok.span)),
            TokenKind::Real => Some(self.ast.push(NodeKind::Literal(Literal::Real(tok.real_value)), tok.span)),
            TokenKind::String | TokenKind::RawString => Some(self.ast.push(NodeKind::Literal(Literal::String(tok.lexeme)), tok.span)),
            TokenKind::True => Some(self.ast.push(NodeKind::Literal(Literal::Boolean(true)), tok.span)),
            TokenKind::False => Some(self.ast.push(NodeKind::Literal(Literal::Boolean(false)), tok.span)),
            TokenKind::Null => Some(self.ast.push(NodeKind::Literal(Literal::Null), tok.span)),
            TokenKind::Identifier => Some(self.ast.push(NodeKind::Name(tok.lexeme), tok.span)),
            TokenKind::This => Some(self.ast.push(NodeKind::This, tok.span)),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, ParseErrorKind::CloseParenExpected);
                Some(inner)
            }
            TokenKind::Minus => {
                let operand = self.parse_expression(300)?;
                Some(self.ast.push(NodeKind::Unary { op: UnaryOp::Neg, operand }, tok.span))
            }
            TokenKind::Not => {
                let operand = self.parse_expression(90)?;
                Some(self.ast.push(NodeKind::Unary { op: UnaryOp::Not, operand }, tok.span))
            }
            TokenKind::Tilde => {
                let operand = self.parse_expression(500)?;
                Some(self.ast.push(NodeKind::Unary { op: UnaryOp::BitNot, operand }, tok.span))
            }
            TokenKind::Typeof => {
                let has_paren = self.eat(TokenKind::LParen);
                let operand = self.parse_expr()?;
                if has_paren {
                    self.expect(TokenKind::RParen, ParseErrorKind::CloseParenExpected);
                }
                Some(self.ast.push(NodeKind::Unary { op: UnaryOp::Typeof, operand }, tok.span))
            }
            TokenKind::New => self.parse_new_object(tok.span),
            TokenKind::LBracket => self.parse_array_literal(tok.span),
            TokenKind::Fn => self.parse_anonymous_function(tok.span),
            TokenKind::If => self.parse_if_expr(tok.span),
            TokenKind::Match => self.parse_match_expr(tok.span),
            _ => {
                self.errors.push(ParseError { kind: ParseErrorKind::IllegalExpression, span: tok.span });
                None
            }
        }
    }

    fn parse_infix(&mut self, left: NodeId, tok: Token) -> Option<NodeId> {
        use TokenKind::*;
        match tok.kind {
            Assign | PlusEq | MinusEq | StarEq | SlashEq | PercentEq | AmpEq | PipeEq | CaretEq => {
                self.parse_assign(left, tok)
            }
            Or => {
                let right = self.parse_expression(70)?;
                Some(self.ast.push(NodeKind::Binary { op: BinaryOp::Or, left, right }, tok.span))
            }
            And => {
                let right = self.parse_expression(80)?;
                Some(self.ast.push(NodeKind::Binary { op: BinaryOp::And, left, right }, tok.span))
            }
            Eq | NotEq | Lt | LtEq | Gt | GtEq => {
                let op = compare_op(tok.kind);
                let right = self.parse_expression(90)?;
                Some(self.ast.push(NodeKind::Binary { op, left, right }, tok.span))
            }
            Plus | Minus => {
                let op = if tok.kind == Plus { BinaryOp::Add } else { BinaryOp::Sub };
                let right = self.parse_expression(100)?;
                Some(self.ast.push(NodeKind::Binary { op, left, right }, tok.span))
            }
            Star | Slash | Percent => {
                let op = match tok.kind {
                    Star => BinaryOp::Mul,
                    Slash => BinaryOp::Div,
                    _ => BinaryOp::Mod,
                };
                let right = self.parse_expression(200)?;
                Some(self.ast.push(NodeKind::Binary { op, left, right }, tok.span))
            }
            Caret => {
                let right = self.parse_expression(349)?; // right-assoc: lower min by one
                Some(self.ast.push(NodeKind::Binary { op: BinaryOp::Pow, left, right }, tok.span))
            }
            Pipe => {
                let right = self.parse_expression(390)?;
                Some(self.ast.push(NodeKind::Binary { op: BinaryOp::BitOr, left, right }, tok.span))
            }
            Amp => {
                let right = self.parse_expression(400)?;
                Some(self.ast.push(NodeKind::Binary { op: BinaryOp::BitAnd, left, right }, tok.span))
            }
            Shl | Shr => {
                let op = if tok.kind == Shl { BinaryOp::Shl } else { BinaryOp::Shr };
                let right = self.parse_expression(200)?;
                Some(self.ast.push(NodeKind::Binary { op, left, right }, tok.span))
            }
            DotDot | DotDotEq => {
                let inclusive = tok.kind == DotDotEq;
                let end = self.parse_expression(50)?;
                Some(self.ast.push(NodeKind::Range { start: left, end, inclusive }, tok.span))
            }
            Dot | ColonColon => {
                let static_access = tok.kind == ColonColon;
                let member = self.expect_identifier()?;
                Some(self.ast.push(NodeKind::GetMember { target: left, member, static_access }, tok.span))
            }
            LParen => self.parse_call(left, tok.span),
            LBracket => {
                let index = self.parse_expr()?;
                let found = self.peek().kind;
                self.expect(TokenKind::RBracket, ParseErrorKind::Expected { expected: "]".into(), found });
                Some(self.ast.push(NodeKind::AccessArray { target: left, index }, tok.span))
            }
            _ => {
                self.errors.push(ParseError { kind: ParseErrorKind::UnexpectedToken(tok.kind), span: tok.span });
                None
            }
        }
    }

    fn parse_assign(&mut self, left: NodeId, tok: Token) -> Option<NodeId> {
        let op = compound_op(tok.kind);
        let value = self.parse_expression(1)?; // right-assoc: precedence 2 - 1
        match self.ast.kind(left).clone() {
            NodeKind::Name(name) => Some(self.ast.push(NodeKind::AssignName { name, op, value }, tok.span)),
            NodeKind::GetMember { target, member, .. } => {
                Some(self.ast.push(NodeKind::AssignField { target, field: member, op, value }, tok.span))
            }
            NodeKind::AccessArray { target, index } => {
                Some(self.ast.push(NodeKind::AssignIndex { target, index, op, value }, tok.span))
            }
            _ => {
                self.errors.push(ParseError { kind: ParseErrorKind::InvalidLhs, span: tok.span });
                None
            }
        }
    }

    fn parse_call(&mut self, callee: NodeId, span: Span) -> Option<NodeId> {
        let mut args = Vec::new();
        while !self.check(TokenKind::RParen) && !self.check(TokenKind::End) {
            let arg = self.parse_expr()?;
            args.push(arg);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, ParseErrorKind::CloseParenExpected);
        Some(self.ast.push(NodeKind::InvokeFunction { callee, args }, span))
    }

    fn parse_array_literal(&mut self, span: Span) -> Option<NodeId> {
        let mut elements = Vec::new();
        while !self.check(TokenKind::RBracket) && !self.check(TokenKind::End) {
            elements.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let found = self.peek().kind;
        self.expect(TokenKind::RBracket, ParseErrorKind::Expected { expected: "]".into(), found });
        Some(self.ast.push(NodeKind::ArrayLiteral { elements }, span))
    }

    fn parse_anonymous_function(&mut self, span: Span) -> Option<NodeId> {
        let params = self.parse_params();
        let body = if self.eat(TokenKind::FatArrow) {
            self.parse_expr()?
        } else {
            self.parse_block()?
        };
        Some(self.ast.push(NodeKind::AnonymousFunction { params, body }, span))
    }

    fn parse_if_expr(&mut self, span: Span) -> Option<NodeId> {
        let cond = self.parse_expr()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(TokenKind::Else) {
            if self.check(TokenKind::If) {
                let tok = self.next();
                self.parse_prefix(tok)
            } else {
                self.parse_block()
            }
        } else {
            None
        };
        Some(self.ast.push(NodeKind::IfThenElse { cond, then_branch, else_branch }, span))
    }

    fn parse_match_expr(&mut self, span: Span) -> Option<NodeId> {
        let subject = self.parse_expr()?;
        self.expect(TokenKind::LBrace, ParseErrorKind::OpenBraceExpected);
        let mut arms = Vec::new();
        let mut default_arm = None;
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::End) {
            if self.eat(TokenKind::Default) {
                let found = self.peek().kind;
                self.expect(TokenKind::Colon, ParseErrorKind::Expected { expected: ":".into(), found });
                default_arm = self.parse_match_arm_body();
            } else {
                let pattern = self.parse_expr()?;
                let found = self.peek().kind;
                self.expect(TokenKind::Colon, ParseErrorKind::Expected { expected: ":".into(), found });
                let body = self.parse_match_arm_body()?;
                arms.push(MatchArm { pattern, body });
            }
            if !self.eat(TokenKind::Comma) && !self.check(TokenKind::RBrace) {
                self.error(ParseErrorKind::CommaExpected);
            }
        }
        self.expect(TokenKind::RBrace, ParseErrorKind::CloseBraceExpected);
        Some(self.ast.push(NodeKind::Match { subject, arms, default_arm }, span))
    }

    fn parse_match_arm_body(&mut self) -> Option<NodeId> {
        if self.check(TokenKind::LBrace) {
            self.parse_block()
        } else {
            self.parse_expr()
        }
    }

    fn parse_new_object(&mut self, span: Span) -> Option<NodeId> {
        let class_name = self.expect_identifier()?;
        let mut args = Vec::new();
        if !self.check(TokenKind::LBrace) {
            self.expect(TokenKind::LParen, ParseErrorKind::OpenParenExpected);
            while !self.check(TokenKind::RParen) && !self.check(TokenKind::End) {
                args.push(self.parse_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, ParseErrorKind::CloseParenExpected);
        }
        let mut field_inits = Vec::new();
        if self.eat(TokenKind::LBrace) {
            while !self.check(TokenKind::RBrace) && !self.check(TokenKind::End) {
                let found = self.peek().kind;
                self.expect(TokenKind::Dot, ParseErrorKind::Expected { expected: ".".into(), found });
                let field = self.expect_identifier()?;
                self.expect(TokenKind::Assign, ParseErrorKind::AssignExpected);
                let init = match self.parse_expr() {
                    Some(e) => e,
                    None => {
                        self.error(ParseErrorKind::MissingInitExpression);
                        break;
                    }
                };
                field_inits.push((field, init));
                if !self.eat(TokenKind::Comma) && !self.check(TokenKind::RBrace) {
                    let found = self.peek().kind;
                    self.error(ParseErrorKind::Expected { expected: "',' or '}'".into(), found });
                }
            }
            self.expect(TokenKind::RBrace, ParseErrorKind::CloseBraceExpected);
        }
        Some(self.ast.push(NodeKind::NewObject { class_name, args, field_inits }, span))
    }
}

fn infix_precedence(kind: TokenKind) -> Option<(u32, bool)> {
    use TokenKind::*;
    Some(match kind {
        Assign | PlusEq | MinusEq | StarEq | SlashEq | PercentEq | AmpEq | PipeEq | CaretEq => (2, true),
        DotDot | DotDotEq => (50, false),
        Or => (70, false),
        And => (80, false),
        Eq | NotEq | Lt | LtEq | Gt | GtEq => (90, false),
        Plus | Minus => (100, false),
        Star | Slash | Percent | Shl | Shr => (200, false),
        Caret => (350, true),
        Pipe => (390, false),
        Amp => (400, false),
        Dot | ColonColon => (1200, false),
        LParen => (1200, false),
        LBracket => (1250, false),
        _ => return None,
    })
}

fn compare_op(kind: TokenKind) -> BinaryOp {
    use TokenKind::*;
    match kind {
        Eq => BinaryOp::Eq,
        NotEq => BinaryOp::NotEq,
        Lt => BinaryOp::Lt,
        LtEq => BinaryOp::LtEq,
        Gt => BinaryOp::Gt,
        GtEq => BinaryOp::GtEq,
        _ => unreachable!(),
    }
}

fn compound_op(kind: TokenKind) -> Option<BinaryOp> {
    use TokenKind::*;
    match kind {
        Assign => None,
        PlusEq => Some(BinaryOp::Add),
        MinusEq => Some(BinaryOp::Sub),
        StarEq => Some(BinaryOp::Mul),
        SlashEq => Some(BinaryOp::Div),
        PercentEq => Some(BinaryOp::Mod),
        AmpEq => Some(BinaryOp::BitAnd),
        PipeEq => Some(BinaryOp::BitOr),
        CaretEq => Some(BinaryOp::BitXor),
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    fn parse(src: &str) -> (Ast, NodeId, Vec<ParseError>) {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(src, &mut interner);
        let parser = Parser::new(&mut lexer);
        parser.parse_program()
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let (ast, root, errors) = parse("1 + 2 * 3;");
        assert!(errors.is_empty(), "{:?}", errors);
        let stmts = match ast.kind(root) {
            NodeKind::Statements { stmts } => stmts.clone(),
            _ => panic!(),
        };
        let expr = match ast.kind(stmts[0]) {
            NodeKind::ExpressionStatement { expr, .. } => *expr,
            _ => panic!(),
        };
        match ast.kind(expr) {
            NodeKind::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(ast.kind(*right), NodeKind::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("expected Add at top, got {:?}", other),
        }
    }

    #[test]
    fn parses_function_with_recursion() {
        let (_, _, errors) = parse("fn fact(n) { if (n == 0) { return 1; } return n * fact(n - 1); }");
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let (_, _, errors) = parse("break;");
        assert!(errors.iter().any(|e| matches!(e.kind, ParseErrorKind::BreakContinueNoLoop)));
    }

    #[test]
    fn parses_class_with_fields_and_methods() {
        let (_, _, errors) = parse("class Point { var x = 0; var y = 0; fn len() { return x; } }");
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn parses_match_expression() {
        let (_, _, errors) = parse("match x { 1: 2, default: 3 }");
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn parses_match_expression_with_predicate_arm() {
        let (_, _, errors) = parse("match x { fn (x) => x > 0 : 1, default: 2 }");
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn too_many_function_args_is_reported() {
        let params: Vec<String> = (0..70).map(|i| format!("p{}", i)).collect();
        let src = format!("fn f({}) {{ }}", params.join(", "));
        let (_, _, errors) = parse(&src);
        assert!(errors.iter().any(|e| matches!(e.kind, ParseErrorKind::TooManyFunctionArgs(_))));
    }
}
