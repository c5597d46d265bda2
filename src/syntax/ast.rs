//! Arena-allocated syntax tree.
//!
//! Child nodes are referenced through [`ExprId`] and [`StmtId`] indices into
//! the owning [`Program`], so every node of the program can be visited with
//! a linear scan of two vectors.

use std::fmt;

/// A 1-based line/column position in the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Location {
    /// Line number, starting at 1.
    pub line: u32,
    /// Column number in characters, starting at 1.
    pub column: u32,
}

impl Location {
    /// Create a location.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Index of an expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

/// Index of a statement node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

/// A parsed program: the node arenas plus the top-level statement list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    body: Vec<StmtId>,
}

impl Program {
    /// Top-level statements in source order.
    pub fn body(&self) -> &[StmtId] {
        &self.body
    }

    /// Look up an expression node.
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    /// Look up a statement node.
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    /// Every expression node, nested ones included, in allocation order.
    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    /// Every statement node, nested ones included, in allocation order.
    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    pub(crate) fn push_expr(&mut self, kind: ExprKind, location: Location) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr { kind, location });
        id
    }

    pub(crate) fn push_stmt(&mut self, kind: StmtKind, location: Location) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt { kind, location });
        id
    }

    pub(crate) fn set_body(&mut self, body: Vec<StmtId>) {
        self.body = body;
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// What kind of expression this is.
    pub kind: ExprKind,
    /// Position of the first token of the expression.
    pub location: Location,
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// What kind of statement this is.
    pub kind: StmtKind,
    /// Position of the first token of the statement.
    pub location: Location,
}

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    /// Decimal digits; integers are unbounded.
    Int(String),
    Float(f64),
    Str(String),
    Ellipsis,
}

/// Binary operators, also used by augmented assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    MatMul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

/// Keyword argument in a call; `name` is `None` for `**mapping`.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub name: Option<String>,
    pub value: ExprId,
}

/// One `for ... in ... if ...` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: ExprId,
    pub iter: ExprId,
    pub ifs: Vec<ExprId>,
}

/// A piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Field {
        value: ExprId,
        conversion: Option<char>,
        spec: Vec<FStringPart>,
    },
}

/// Expression kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Constant),
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<ExprId>),
    Tuple(Vec<ExprId>),
    Set(Vec<ExprId>),
    /// A `None` key is a `**mapping` entry.
    Dict(Vec<(Option<ExprId>, ExprId)>),
    BinOp {
        left: ExprId,
        op: BinOp,
        right: ExprId,
    },
    UnaryOp {
        op: UnaryOp,
        operand: ExprId,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<ExprId>,
    },
    Compare {
        left: ExprId,
        ops: Vec<CmpOp>,
        comparators: Vec<ExprId>,
    },
    IfExp {
        test: ExprId,
        body: ExprId,
        orelse: ExprId,
    },
    Call {
        func: ExprId,
        args: Vec<ExprId>,
        keywords: Vec<Keyword>,
    },
    /// `*value` in calls, displays and assignment targets.
    Starred(ExprId),
    Attribute {
        value: ExprId,
        attr: String,
    },
    Subscript {
        value: ExprId,
        index: ExprId,
    },
    Slice {
        lower: Option<ExprId>,
        upper: Option<ExprId>,
        step: Option<ExprId>,
    },
    ListComp {
        element: ExprId,
        generators: Vec<Comprehension>,
    },
    SetComp {
        element: ExprId,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        element: ExprId,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: ExprId,
        value: ExprId,
        generators: Vec<Comprehension>,
    },
    Lambda {
        params: Vec<String>,
        defaults: Vec<ExprId>,
        body: ExprId,
    },
    Yield(Option<ExprId>),
    Await(ExprId),
}

/// An imported name, with its optional `as` binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
    pub location: Location,
}

/// An `except` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub kind: Option<ExprId>,
    pub name: Option<String>,
    pub body: Vec<StmtId>,
    pub location: Location,
}

/// Statement kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(ExprId),
    Assign {
        targets: Vec<ExprId>,
        value: ExprId,
    },
    AugAssign {
        target: ExprId,
        op: BinOp,
        value: ExprId,
    },
    AnnAssign {
        target: ExprId,
        annotation: ExprId,
        value: Option<ExprId>,
    },
    If {
        test: ExprId,
        body: Vec<StmtId>,
        orelse: Vec<StmtId>,
    },
    While {
        test: ExprId,
        body: Vec<StmtId>,
        orelse: Vec<StmtId>,
    },
    For {
        target: ExprId,
        iter: ExprId,
        body: Vec<StmtId>,
        orelse: Vec<StmtId>,
    },
    Break,
    Continue,
    Pass,
    Delete(Vec<ExprId>),
    Assert {
        test: ExprId,
        msg: Option<ExprId>,
    },
    Raise {
        exc: Option<ExprId>,
        cause: Option<ExprId>,
    },
    Try {
        body: Vec<StmtId>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<StmtId>,
        finalbody: Vec<StmtId>,
    },
    Import(Vec<Alias>),
    ImportFrom {
        module: Option<String>,
        names: Vec<Alias>,
        level: u32,
    },
    Global(Vec<String>),
    Nonlocal(Vec<String>),
    FunctionDef {
        name: String,
        params: Vec<String>,
        /// Default values followed by parameter annotations.
        defaults: Vec<ExprId>,
        returns: Option<ExprId>,
        decorators: Vec<ExprId>,
        body: Vec<StmtId>,
        is_async: bool,
    },
    ClassDef {
        name: String,
        /// Base classes followed by keyword values such as `metaclass=`.
        bases: Vec<ExprId>,
        decorators: Vec<ExprId>,
        body: Vec<StmtId>,
    },
    Return(Option<ExprId>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_ids_are_sequential() {
        let mut program = Program::default();
        let a = program.push_expr(
            ExprKind::Constant(Constant::Int("1".into())),
            Location::new(1, 1),
        );
        let b = program.push_expr(ExprKind::Name("x".into()), Location::new(1, 5));
        let s = program.push_stmt(StmtKind::Expr(b), Location::new(1, 5));
        program.set_body(vec![s]);

        assert_eq!(program.expr(a).kind, ExprKind::Constant(Constant::Int("1".into())));
        assert_eq!(program.expr(b).location, Location::new(1, 5));
        assert_eq!(program.stmt(s).kind, StmtKind::Expr(b));
        assert_eq!(program.body(), [s]);
        assert_eq!(program.exprs().len(), 2);
    }

    #[test]
    fn test_location_display() {
        assert_eq!(Location::new(3, 7).to_string(), "line 3, column 7");
    }

    #[test]
    fn test_locations_order_by_line_then_column() {
        assert!(Location::new(1, 9) < Location::new(2, 1));
        assert!(Location::new(2, 1) < Location::new(2, 3));
    }
}
