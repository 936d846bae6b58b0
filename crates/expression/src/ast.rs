/// Expression AST. Deliberately small: this is the entire surface an
/// edge condition or a `condition.expression` node config can reach.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    /// One of the four bindings: `$output`, `$data`, `$status`, `$ctx`.
    Binding(String),
    Member {
        object: Box<Expr>,
        key: MemberKey,
    },
    /// `Array.isArray(x)` / `JSON.parse(x)` — the only two namespaced
    /// builtins the grammar exposes.
    BuiltinCall {
        builtin: Builtin,
        args: Vec<Expr>,
    },
    /// `$ctx.getNodeOutput(id)` and `<expr>.includes(x)`.
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKey {
    Name(String),
    Index(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    ArrayIsArray,
    JsonParse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    StrictEq,
    StrictNotEq,
    LooseEq,
    LooseNotEq,
    And,
    Or,
}
