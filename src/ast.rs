//! Immutable AST stored in an index-addressed arena.
//!
//! Nodes are pushed bottom-up: children are built (and their ids obtained)
//! before the parent node that references them, and the parent id is then
//! stamped onto each child's `parent` field. This gives the same "owned
//! children, non-owning parent back-reference" shape as a classic boxed tree
//! without threading an arena lifetime through the evaluator.

use crate::intern::Symbol;
use crate::token::Span;

pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Integer(i64),
    Real(f64),
    String(Symbol),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Break,
    Continue,
    Breakout,
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: NodeId,
    pub body: NodeId,
}

#[derive(Debug, Clone)]
pub enum ClassMember {
    Field { name: Symbol, is_const: bool, is_static: bool, init: Option<NodeId> },
    Method { name: Symbol, params: Vec<Symbol>, body: NodeId, is_static: bool, is_ctor: bool },
    Nested(NodeId),
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    // expressions
    Literal(Literal),
    Name(Symbol),
    This,
    Unary { op: UnaryOp, operand: NodeId },
    Binary { op: BinaryOp, left: NodeId, right: NodeId },
    AssignName { name: Symbol, op: Option<BinaryOp>, value: NodeId },
    AssignField { target: NodeId, field: Symbol, op: Option<BinaryOp>, value: NodeId },
    AssignIndex { target: NodeId, index: NodeId, op: Option<BinaryOp>, value: NodeId },
    GetMember { target: NodeId, member: Symbol, static_access: bool },
    AccessArray { target: NodeId, index: NodeId },
    InvokeFunction { callee: NodeId, args: Vec<NodeId> },
    AnonymousFunction { params: Vec<Symbol>, body: NodeId },
    NewObject { class_name: Symbol, args: Vec<NodeId>, field_inits: Vec<(Symbol, NodeId)> },
    Range { start: NodeId, end: NodeId, inclusive: bool },
    ArrayLiteral { elements: Vec<NodeId> },
    IfThenElse { cond: NodeId, then_branch: NodeId, else_branch: Option<NodeId> },
    Match { subject: NodeId, arms: Vec<MatchArm>, default_arm: Option<NodeId> },

    // statements
    ExpressionStatement { expr: NodeId, has_semicolon: bool },
    Statements { stmts: Vec<NodeId> },
    VarVal { name: Symbol, is_const: bool, init: Option<NodeId> },
    While { cond: NodeId, body: NodeId },
    Repeat { count: Option<NodeId>, body: NodeId },
    For { init: Option<NodeId>, cond: Option<NodeId>, step: Option<NodeId>, body: NodeId },
    ForEach { name: Symbol, iterable: NodeId, body: NodeId },
    Return { value: Option<NodeId> },
    BreakOrContinue(LoopExit),
    FunctionDeclaration { name: Symbol, params: Vec<Symbol>, body: NodeId },
    ClassDeclaration { name: Symbol, base: Option<Symbol>, members: Vec<ClassMember> },
    EnumDeclaration { name: Symbol, variants: Vec<(Symbol, Option<i64>)> },
    InterfaceDeclaration { name: Symbol },
    UseStatement { name: Symbol },
}

#[derive(Debug)]
pub struct NodeData {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: Option<NodeId>,
}

/// An index-addressed arena of AST nodes, built bottom-up by the parser.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<NodeData>,
}

impl Ast {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = self.nodes.len() as NodeId;
        let children = child_ids(&kind);
        self.nodes.push(NodeData { kind, span, parent: None });
        for child in children {
            self.nodes[child as usize].parent = Some(id);
        }
        id
    }

    pub fn get(&self, id: NodeId) -> &NodeData {
        &self.nodes[id as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id as usize].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id as usize].span
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id as usize].parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Merges `other` into this arena, shifting every node id it contains by
    /// this arena's current length, and returns `other_root` translated into
    /// the merged arena. Used by `Runtime.Eval` to graft freshly parsed
    /// source onto the arena the running program's closures already point
    /// into, rather than replacing it.
    pub fn append(&mut self, other: Ast, other_root: NodeId) -> NodeId {
        let base = self.nodes.len() as NodeId;
        for node in other.nodes {
            let kind = shift_node_ids(node.kind, base);
            let parent = node.parent.map(|p| p + base);
            self.nodes.push(NodeData { kind, span: node.span, parent });
        }
        other_root + base
    }
}

fn shift_node_ids(kind: NodeKind, base: NodeId) -> NodeKind {
    use NodeKind::*;
    let s = |id: NodeId| id + base;
    let so = |id: Option<NodeId>| id.map(s);
    let sv = |ids: Vec<NodeId>| ids.into_iter().map(s).collect::<Vec<_>>();
    match kind {
        Literal(l) => Literal(l),
        Name(n) => Name(n),
        This => This,
        Unary { op, operand } => Unary { op, operand: s(operand) },
        Binary { op, left, right } => Binary { op, left: s(left), right: s(right) },
        AssignName { name, op, value } => AssignName { name, op, value: s(value) },
        AssignField { target, field, op, value } => {
            AssignField { target: s(target), field, op, value: s(value) }
        }
        AssignIndex { target, index, op, value } => {
            AssignIndex { target: s(target), index: s(index), op, value: s(value) }
        }
        GetMember { target, member, static_access } => GetMember { target: s(target), member, static_access },
        AccessArray { target, index } => AccessArray { target: s(target), index: s(index) },
        InvokeFunction { callee, args } => InvokeFunction { callee: s(callee), args: sv(args) },
        AnonymousFunction { params, body } => AnonymousFunction { params, body: s(body) },
        NewObject { class_name, args, field_inits } => NewObject {
            class_name,
            args: sv(args),
            field_inits: field_inits.into_iter().map(|(name, e)| (name, s(e))).collect(),
        },
        Range { start, end, inclusive } => Range { start: s(start), end: s(end), inclusive },
        ArrayLiteral { elements } => ArrayLiteral { elements: sv(elements) },
        IfThenElse { cond, then_branch, else_branch } => {
            IfThenElse { cond: s(cond), then_branch: s(then_branch), else_branch: so(else_branch) }
        }
        Match { subject, arms, default_arm } => Match {
            subject: s(subject),
            arms: arms.into_iter().map(|a| MatchArm { pattern: s(a.pattern), body: s(a.body) }).collect(),
            default_arm: so(default_arm),
        },
        ExpressionStatement { expr, has_semicolon } => ExpressionStatement { expr: s(expr), has_semicolon },
        Statements { stmts } => Statements { stmts: sv(stmts) },
        VarVal { name, is_const, init } => VarVal { name, is_const, init: so(init) },
        While { cond, body } => While { cond: s(cond), body: s(body) },
        Repeat { count, body } => Repeat { count: so(count), body: s(body) },
        For { init, cond, step, body } => For { init: so(init), cond: so(cond), step: so(step), body: s(body) },
        ForEach { name, iterable, body } => ForEach { name, iterable: s(iterable), body: s(body) },
        Return { value } => Return { value: so(value) },
        BreakOrContinue(e) => BreakOrContinue(e),
        FunctionDeclaration { name, params, body } => FunctionDeclaration { name, params, body: s(body) },
        ClassDeclaration { name, base, members } => ClassDeclaration {
            name,
            base,
            members: members
                .into_iter()
                .map(|m| match m {
                    ClassMember::Field { name, is_const, is_static, init } => {
                        ClassMember::Field { name, is_const, is_static, init: so(init) }
                    }
                    ClassMember::Method { name, params, body, is_static, is_ctor } => {
                        ClassMember::Method { name, params, body: s(body), is_static, is_ctor }
                    }
                    ClassMember::Nested(id) => ClassMember::Nested(s(id)),
                })
                .collect(),
        },
        EnumDeclaration { name, variants } => EnumDeclaration { name, variants },
        InterfaceDeclaration { name } => InterfaceDeclaration { name },
        UseStatement { name } => UseStatement { name },
    }
}

fn child_ids(kind: &NodeKind) -> Vec<NodeId> {
    use NodeKind::*;
    match kind {
        Literal(_) | Name(_) | This | BreakOrContinue(_) | InterfaceDeclaration { .. } | UseStatement { .. }
        | EnumDeclaration { .. } => vec![],
        Unary { operand, .. } => vec![*operand],
        Binary { left, right, .. } => vec![*left, *right],
        AssignName { value, .. } => vec![*value],
        AssignField { target, value, .. } => vec![*target, *value],
        AssignIndex { target, index, value, .. } => vec![*target, *index, *value],
        GetMember { target, .. } => vec![*target],
        AccessArray { target, index } => vec![*target, *index],
        InvokeFunction { callee, args } => {
            let mut v = vec![*callee];
            v.extend(args.iter().copied());
            v
        }
        AnonymousFunction { body, .. } => vec![*body],
        NewObject { args, field_inits, .. } => {
            let mut v = args.clone();
            v.extend(field_inits.iter().map(|(_, e)| *e));
            v
        }
        Range { start, end, .. } => vec![*start, *end],
        ArrayLiteral { elements } => elements.clone(),
        IfThenElse { cond, then_branch, else_branch } => {
            let mut v = vec![*cond, *then_branch];
            if let Some(e) = else_branch {
                v.push(*e);
            }
            v
        }
        Match { subject, arms, default_arm } => {
            let mut v = vec![*subject];
            for arm in arms {
                v.push(arm.pattern);
                v.push(arm.body);
            }
            if let Some(d) = default_arm {
                v.push(*d);
            }
            v
        }
        ExpressionStatement { expr, .. } => vec![*expr],
        Statements { stmts } => stmts.clone(),
        VarVal { init, .. } => init.iter().copied().collect(),
        While { cond, body } => vec![*cond, *body],
        Repeat { count, body } => {
            let mut v = vec![];
            if let Some(c) = count {
                v.push(*c);
            }
            v.push(*body);
            v
        }
        For { init, cond, step, body } => {
            let mut v = vec![];
            v.extend(init.iter().copied());
            v.extend(cond.iter().copied());
            v.extend(step.iter().copied());
            v.push(*body);
            v
        }
        ForEach { iterable, body, .. } => vec![*iterable, *body],
        Return { value } => value.iter().copied().collect(),
        FunctionDeclaration { body, .. } => vec![*body],
        ClassDeclaration { members, .. } => members
            .iter()
            .flat_map(|m| match m {
                ClassMember::Field { init, .. } => init.iter().copied().collect::<Vec<_>>(),
                ClassMember::Method { body, .. } => vec![*body],
                ClassMember::Nested(id) => vec![*id],
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Span;

    fn sp() -> Span {
        Span::new(0, 0, 1, 1)
    }

    #[test]
    fn push_sets_parent_backreference() {
        let mut ast = Ast::new();
        let lit = ast.push(NodeKind::Literal(Literal::Integer(1)), sp());
        let un = ast.push(NodeKind::Unary { op: UnaryOp::Neg, operand: lit }, sp());
        assert_eq!(ast.parent(lit), Some(un));
        assert_eq!(ast.parent(un), None);
    }

    #[test]
    fn binary_records_both_children_as_parented() {
        let mut ast = Ast::new();
        let l = ast.push(NodeKind::Literal(Literal::Integer(1)), sp());
        let r = ast.push(NodeKind::Literal(Literal::Integer(2)), sp());
        let b = ast.push(NodeKind::Binary { op: BinaryOp::Add, left: l, right: r }, sp());
        assert_eq!(ast.parent(l), Some(b));
        assert_eq!(ast.parent(r), Some(b));
    }

    #[test]
    fn append_shifts_ids_and_preserves_structure() {
        let mut base = Ast::new();
        let base_lit = base.push(NodeKind::Literal(Literal::Integer(1)), sp());
        assert_eq!(base.len(), 1);

        let mut extra = Ast::new();
        let l = extra.push(NodeKind::Literal(Literal::Integer(2)), sp());
        let r = extra.push(NodeKind::Literal(Literal::Integer(3)), sp());
        let extra_root = extra.push(NodeKind::Binary { op: BinaryOp::Add, left: l, right: r }, sp());

        let merged_root = base.append(extra, extra_root);
        assert_eq!(merged_root, 3);
        match base.kind(merged_root) {
            NodeKind::Binary { left, right, .. } => {
                assert_eq!(*left, 1);
                assert_eq!(*right, 2);
            }
            other => panic!("expected Binary, got {:?}", other),
        }
        assert_eq!(base.parent(1), Some(merged_root));
        assert!(matches!(base.kind(base_lit), NodeKind::Literal(Literal::Integer(1))));
    }
}
