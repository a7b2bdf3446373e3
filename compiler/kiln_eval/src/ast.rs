//! Syntax tree for Kiln source files.
//!
//! Expressions live in an [`ExprArena`] and refer to each other by
//! [`ExprId`]. Every expression and member records the index of its node in
//! the file's [`SyntaxTree`](kiln_ir::SyntaxTree), which is what lowered IR
//! stores for source locations.

use kiln_ir::{ContainerKind, ContentHash, Span};

/// Index of an expression in its file's arena.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    /// Literal text, underscores included; checked during lowering.
    Int(String),
    /// Unescaped contents.
    Str(String),
    Ident(String),
    /// `&name`
    AddrOf(String),
    /// `*T` or `*const T`
    PtrType { is_const: bool, child: ExprId },
    /// `error.Name`
    ErrorValue(String),
    /// `@name(args)`, without the `@`.
    Builtin { name: String, args: Vec<ExprId> },
    Call(ExprId),
    Add(ExprId, ExprId),
    Container(Box<ContainerAst>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub node: u32,
    pub span: Span,
}

/// Flat storage for a file's expressions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExprArena {
    exprs: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(u32::try_from(self.exprs.len()).unwrap_or(u32::MAX));
        self.exprs.push(expr);
        id
    }

    /// # Panics
    /// If `id` came from another arena.
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    Return { value: Option<ExprId>, node: u32 },
    Expr(ExprId),
}

/// `fn name() [!]Ret { ... }`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncAst {
    pub ret: ExprId,
    pub inferred_error_set: bool,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberName {
    Named(String),
    Test(Option<String>),
    Comptime,
    Usingnamespace,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberValue {
    Const { ty: Option<ExprId>, value: ExprId },
    Func(FuncAst),
    /// A `test` or `comptime` block.
    Block(Vec<Stmt>),
    Using(ExprId),
}

/// A declaration inside a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub name: MemberName,
    pub is_pub: bool,
    pub is_export: bool,
    pub node: u32,
    /// Hash of the member's tokens. Nested containers contribute their field
    /// hash but not their members.
    pub src_hash: ContentHash,
    pub value: MemberValue,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldAst {
    pub name: String,
    pub ty: Option<ExprId>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerAst {
    pub kind: ContainerKind,
    pub fields: Vec<FieldAst>,
    pub members: Vec<Member>,
    pub node: u32,
    pub fields_hash: ContentHash,
}
