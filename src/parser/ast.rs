//! Syntax tree produced by the parser
//!
//! The tree is immutable once built and shared through `Arc` between the
//! compiled script and every closure created from it. It derives serde so a
//! parsed program can be stored in precompilation data and loaded without
//! reparsing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::runtime::JSString;

mod f64_bits {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.to_bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}

/// A parsed script
#[derive(Debug, Serialize, Deserialize)]
pub struct Program {
    pub body: Vec<Stmt>,
    /// `var` names declared anywhere at the top level
    pub var_names: Vec<JSString>,
    /// Function declarations, hoisted to the top of the script
    pub functions: Vec<Arc<FunctionNode>>,
}

/// A function literal, declaration, or arrow function
#[derive(Debug, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: Option<JSString>,
    pub params: Vec<JSString>,
    pub body: Vec<Stmt>,
    pub is_arrow: bool,
    /// Named function expressions bind their own name inside the body
    pub is_expression: bool,
    pub var_names: Vec<JSString>,
    pub functions: Vec<Arc<FunctionNode>>,
    pub uses_arguments: bool,
    pub line: u32,
    pub column: u32,
    /// Byte range of the function's source text, for `toString`
    pub span: (usize, usize),
}

/// A statement together with its source position
#[derive(Debug, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VarDeclarator {
    pub name: JSString,
    pub init: Option<Expr>,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum ForInit {
    Var(VarKind, Vec<VarDeclarator>),
    Expr(Expr),
}

/// Left side of `for (x in ...)` / `for (x of ...)`
#[derive(Debug, Serialize, Deserialize)]
pub enum ForBinding {
    Decl(VarKind, JSString),
    Target(Expr),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum StmtKind {
    Expr(Expr),
    VarDecl(VarKind, Vec<VarDeclarator>),
    /// Declarations are hoisted; the statement itself only marks the spot
    FunctionDecl(JSString),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block {
        body: Vec<Stmt>,
        /// Whether the block declares `let`/`const` names
        scoped: bool,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        binding: ForBinding,
        object: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        binding: ForBinding,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Break(Option<JSString>),
    Continue(Option<JSString>),
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<JSString>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Labeled {
        label: JSString,
        body: Box<Stmt>,
    },
    Empty,
    Debugger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum PropName {
    Static(JSString),
    Computed(Expr),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum PropDef {
    Init(PropName, Expr),
    Getter(PropName, Arc<FunctionNode>),
    Setter(PropName, Arc<FunctionNode>),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum MemberProp {
    Named(JSString),
    Computed(Box<Expr>),
}

#[derive(Debug, Serialize, Deserialize)]
pub enum Expr {
    /// Stored as raw bits so precompiled data keeps every literal exact
    Number(#[serde(with = "f64_bits")] f64),
    String(JSString),
    Bool(bool),
    Null,
    Ident(JSString),
    This,
    RegExp {
        pattern: JSString,
        flags: JSString,
    },
    /// `None` entries are elisions (`[1, , 3]`)
    Array(Vec<Option<Expr>>),
    Object(Vec<PropDef>),
    Function(Arc<FunctionNode>),
    Unary(UnaryOp, Box<Expr>),
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Member(Box<Expr>, MemberProp),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Sequence(Vec<Expr>),
}

impl Expr {
    /// Anonymous function literals take their name from the binding they
    /// are assigned to
    pub fn is_anonymous_function(&self) -> bool {
        matches!(self, Expr::Function(node) if node.name.is_none())
    }
}
