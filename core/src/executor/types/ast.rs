//! Abstract Syntax Tree node types
//!
//! Modules arrive already parsed. Every enum is internally tagged with `"t"`
//! so a host parser can hand a module over as a plain JSON document.

use serde::{Deserialize, Serialize};

use super::ty::Type;

/// A parsed source module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub items: Vec<Item>,
}

/// Top-level declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Item {
    TypeDef(TypeDef),
    Trait(TraitDef),
    Function(FunctionDef),
    Route(Route),
    Command(CommandDef),
    Cron(CronTask),
    Event(EventHandler),
    Queue(QueueWorker),
    Const(ConstDecl),
    Macro(MacroDef),
    Test(TestBlock),
}

/// A named, optionally typed slot. Used for type fields, function
/// parameters, lambda parameters and command arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub ty: Option<Type>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Expr>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Option<Type>) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
        }
    }

    /// True when a caller must supply this slot
    pub fn is_mandatory(&self) -> bool {
        self.required && self.default.is_none()
    }
}

fn default_required() -> bool {
    true
}

/// Generic type parameter with an optional constraint (`T: Numeric`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
    #[serde(default)]
    pub constraint: Option<Type>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<TypeParam>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Field>,
    #[serde(default)]
    pub return_type: Option<Type>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraitDef {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodSig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSig {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Field>,
    #[serde(default)]
    pub return_type: Option<Type>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    #[serde(default)]
    pub type_params: Vec<TypeParam>,
    #[serde(default)]
    pub params: Vec<Field>,
    #[serde(default)]
    pub return_type: Option<Type>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unknown HTTP method: {}", other)),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Typed dependency parameter (`db: Database`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Injection {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Path pattern, `:name` segments capture parameters
    pub path: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub input_type: Option<Type>,
    #[serde(default)]
    pub return_type: Option<Type>,
    #[serde(default)]
    pub injections: Vec<Injection>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub params: Vec<Field>,
    #[serde(default)]
    pub return_type: Option<Type>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronTask {
    pub name: String,
    pub schedule: String,
    #[serde(default)]
    pub injections: Vec<Injection>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventHandler {
    pub event_type: String,
    #[serde(default)]
    pub injections: Vec<Injection>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueWorker {
    pub queue: String,
    #[serde(default)]
    pub injections: Vec<Injection>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    #[serde(default)]
    pub ty: Option<Type>,
    pub value: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestBlock {
    pub name: String,
    pub body: Vec<Stmt>,
}

/// Variable declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    Let,
    Const,
}

/// Member access segment for assignment paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum MemberAccess {
    Prop { property: String },
    Index { expr: Expr },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: Expr,
    pub body: Vec<Stmt>,
}

/// Statement AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    /// `$x = v` or `const x = v`
    Declare {
        var_kind: VarKind,
        name: String,
        #[serde(default)]
        ty: Option<Type>,
        init: Expr,
    },
    /// `x = v`, `obj.a.b = v`, `arr[i] = v`
    Assign {
        var: String,
        #[serde(default)]
        path: Vec<MemberAccess>,
        value: Expr,
    },
    Expr {
        expr: Expr,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    If {
        test: Expr,
        then_s: Vec<Stmt>,
        #[serde(default)]
        else_s: Option<Vec<Stmt>>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        #[serde(default)]
        key: Option<String>,
        value: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
        #[serde(default)]
        default: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
    Assert {
        test: Expr,
        #[serde(default)]
        message: Option<Expr>,
    },
    /// `? check(input)`: a falsy or failing call becomes a 400
    Validate {
        call: Expr,
    },
    /// `yield value [as eventType]`
    Yield {
        value: Expr,
        #[serde(default)]
        event_type: Option<String>,
    },
    Macro {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum LambdaBody {
    Expr { expr: Box<Expr> },
    Block { body: Vec<Stmt> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    #[serde(default)]
    pub guard: Option<Expr>,
    pub body: Expr,
}

/// Expression AST node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    LitInt {
        v: i64,
    },
    LitFloat {
        v: f64,
    },
    LitStr {
        v: String,
    },
    LitBool {
        v: bool,
    },
    LitNull,
    LitList {
        elements: Vec<Expr>,
    },
    LitObj {
        properties: Vec<(String, Expr)>,
    },
    Ident {
        name: String,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
        #[serde(default)]
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        #[serde(default)]
        type_args: Vec<Type>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Lambda {
        params: Vec<Field>,
        body: LambdaBody,
    },
    Match {
        value: Box<Expr>,
        cases: Vec<MatchCase>,
    },
    Async {
        body: Vec<Stmt>,
    },
    Await {
        inner: Box<Expr>,
    },
    /// `left |> right`, where right is a call receiving left first
    Pipe {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Macro {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident { name: name.into() }
    }

    pub fn int(v: i64) -> Self {
        Expr::LitInt { v }
    }

    pub fn str(v: impl Into<String>) -> Self {
        Expr::LitStr { v: v.into() }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(Expr::ident(name)),
            type_args: Vec::new(),
            args,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldPattern {
    pub key: String,
    /// `None` binds the field value under its own key
    #[serde(default)]
    pub pattern: Option<Pattern>,
}

/// Pattern for `match` cases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Pattern {
    Literal {
        value: Expr,
    },
    Var {
        name: String,
    },
    Wildcard,
    Object {
        fields: Vec<FieldPattern>,
    },
    Array {
        elements: Vec<Pattern>,
        #[serde(default)]
        rest: Option<String>,
    },
    Ok {
        inner: Box<Pattern>,
    },
    Err {
        inner: Box<Pattern>,
    },
}
