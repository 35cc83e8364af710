use crate::syntax::Span;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_NODE_ID: AtomicU32 = AtomicU32::new(0);

/// Stable identity for an AST node, used to key the checker's side tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Visibility {
    Private,
    Public,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub id: NodeId,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            id: NodeId::next(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Int(i64),
    Str(String),
    Bool(bool),
    Null,
    ListLit(Vec<Node>),
    /// Record literal: `{ pub x = 1 }` — infers to an anonymous module.
    ObjectLit(Vec<SlotDecl>),
    SelfRef,
    Symbol {
        name: String,
        auto_call: bool,
    },
    Select {
        receiver: Box<Node>,
        field: String,
        auto_call: bool,
    },
    Call {
        fun: Box<Node>,
        args: Vec<CallArg>,
    },
    Binary {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// Null-coalescing: `left ?? right`.
    Default {
        left: Box<Node>,
        right: Box<Node>,
    },
    Slot(SlotDecl),
    Fun(FunDecl),
    Lambda(FunLit),
    Class(ClassDecl),
    Enum(EnumDecl),
    Directive(DirectiveDecl),
    Assign {
        target: Box<Node>,
        op: AssignOp,
        value: Box<Node>,
    },
    Assert(Box<Node>),
    Block(Block),
}

/// An ordered sequence of forms. Inline blocks evaluate in the current
/// scope instead of a fresh child scope.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub forms: Vec<Node>,
    pub inline: bool,
}

#[derive(Debug, Clone)]
pub struct CallArg {
    /// `None` for positional arguments.
    pub name: Option<String>,
    pub value: Node,
}

#[derive(Debug, Clone)]
pub struct SlotDecl {
    pub name: String,
    pub ty: Option<TypeNode>,
    pub value: Option<Box<Node>>,
    pub visibility: Visibility,
    pub directives: Vec<DirectiveApplication>,
    pub doc: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FunDecl {
    pub name: String,
    pub args: Vec<SlotDecl>,
    pub ret: Option<TypeNode>,
    pub body: Block,
    pub visibility: Visibility,
    pub directives: Vec<DirectiveApplication>,
    pub doc: Option<String>,
}

/// An anonymous function literal: `fn(x: Int!): Int! { x }`.
#[derive(Debug, Clone)]
pub struct FunLit {
    pub args: Vec<SlotDecl>,
    pub ret: Option<TypeNode>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub implements: Vec<String>,
    pub body: Block,
    pub visibility: Visibility,
    pub directives: Vec<DirectiveApplication>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub values: Vec<String>,
    pub visibility: Visibility,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DirectiveDecl {
    pub name: String,
    pub args: Vec<SlotDecl>,
    pub locations: Vec<String>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DirectiveApplication {
    pub name: String,
    pub args: Vec<CallArg>,
    pub span: Span,
}

/// Syntactic type annotation; resolved against an environment at inference
/// time, never interpreted at runtime.
#[derive(Debug, Clone)]
pub enum TypeNode {
    Named(String, Span),
    List(Box<TypeNode>),
    NonNull(Box<TypeNode>),
}

impl TypeNode {
    pub fn referenced_symbols(&self) -> Vec<String> {
        match self {
            TypeNode::Named(name, _) => vec![name.clone()],
            TypeNode::List(inner) | TypeNode::NonNull(inner) => inner.referenced_symbols(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
}

impl Node {
    /// Symbols this form introduces into the enclosing scope. Static facts
    /// used only for dependency ordering.
    pub fn declared_symbols(&self) -> Vec<String> {
        match &self.kind {
            NodeKind::Slot(slot) => vec![slot.name.clone()],
            NodeKind::Fun(fun) => vec![fun.name.clone()],
            NodeKind::Class(class) => vec![class.name.clone()],
            NodeKind::Enum(en) => vec![en.name.clone()],
            _ => Vec::new(),
        }
    }

    /// Symbols this form refers to. Static facts used only for dependency
    /// ordering.
    pub fn referenced_symbols(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_referenced(&mut out);
        out
    }

    fn collect_referenced(&self, out: &mut Vec<String>) {
        match &self.kind {
            NodeKind::Int(_) | NodeKind::Str(_) | NodeKind::Bool(_) | NodeKind::Null => {}
            NodeKind::SelfRef => {}
            NodeKind::Symbol { name, .. } => out.push(name.clone()),
            NodeKind::ListLit(items) => {
                for item in items {
                    item.collect_referenced(out);
                }
            }
            NodeKind::ObjectLit(slots) => {
                for slot in slots {
                    collect_slot_refs(slot, out);
                }
            }
            NodeKind::Select { receiver, .. } => receiver.collect_referenced(out),
            NodeKind::Call { fun, args } => {
                fun.collect_referenced(out);
                for arg in args {
                    arg.value.collect_referenced(out);
                }
            }
            NodeKind::Binary { left, right, .. } | NodeKind::Default { left, right } => {
                left.collect_referenced(out);
                right.collect_referenced(out);
            }
            NodeKind::Slot(slot) => collect_slot_refs(slot, out),
            NodeKind::Fun(fun) => {
                for form in &fun.body.forms {
                    form.collect_referenced(out);
                }
            }
            NodeKind::Lambda(lit) => {
                for form in &lit.body.forms {
                    form.collect_referenced(out);
                }
            }
            NodeKind::Class(class) => {
                for form in &class.body.forms {
                    form.collect_referenced(out);
                }
            }
            NodeKind::Enum(_) | NodeKind::Directive(_) => {}
            NodeKind::Assign { target, value, .. } => {
                target.collect_referenced(out);
                value.collect_referenced(out);
            }
            NodeKind::Assert(inner) => inner.collect_referenced(out),
            NodeKind::Block(block) => {
                for form in &block.forms {
                    form.collect_referenced(out);
                }
            }
        }
    }

    /// A readable rendering of the expression, used for assertion messages.
    pub fn describe(&self) -> String {
        match &self.kind {
            NodeKind::Int(n) => n.to_string(),
            NodeKind::Str(s) => format!("{s:?}"),
            NodeKind::Bool(b) => b.to_string(),
            NodeKind::Null => "null".to_string(),
            NodeKind::SelfRef => "self".to_string(),
            NodeKind::Symbol { name, .. } => name.clone(),
            NodeKind::Select { receiver, field, .. } => {
                format!("{}.{}", receiver.describe(), field)
            }
            NodeKind::Call { fun, .. } => format!("{}(...)", fun.describe()),
            NodeKind::Binary { op, left, right } => {
                format!("{} {} {}", left.describe(), op.symbol(), right.describe())
            }
            NodeKind::Default { left, right } => {
                format!("{} ?? {}", left.describe(), right.describe())
            }
            NodeKind::ListLit(_) => "[...]".to_string(),
            _ => "<expr>".to_string(),
        }
    }
}

fn collect_slot_refs(slot: &SlotDecl, out: &mut Vec<String>) {
    if let Some(value) = &slot.value {
        value.collect_referenced(out);
    }
    if let Some(ty) = &slot.ty {
        out.extend(ty.referenced_symbols());
    }
    for directive in &slot.directives {
        for arg in &directive.args {
            arg.value.collect_referenced(out);
        }
    }
}
