use super::intern::InternedSymbol;
use crate::frontend::lexer::Span;

/// A parsed source file: an ordered sequence of top level statements
#[derive(Debug)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug)]
pub struct Statement {
    pub id: NodeId,
    pub span: Span,
    pub kind: StatementKind,
}

#[derive(Debug)]
pub enum StatementKind {
    /// `thine x: int = 1;` / `fact x: int = 1;`
    VariableDeclaration(Box<VariableDeclaration>),
    /// `proclaim(e);`
    Print(Box<Expression>),
    /// `don f(n: int) -> int { ... }`
    FunctionDeclaration(Box<FunctionDeclaration>),
    /// `object Name { ... }`
    ObjectDeclaration(Box<ObjectDeclaration>),
    /// `++x;`
    Increment(Box<Expression>),
    /// `--x;`
    Decrement(Box<Expression>),
    /// `x = e;`
    Assignment {
        target: Box<Expression>,
        source: Box<Expression>,
    },
    /// `return e;` / `return;`
    Return(Option<Box<Expression>>),
    /// `perchance (c) { ... } otherwise ...`
    If(Box<IfStatement>),
    /// `whilst (c) { ... }`
    While {
        condition: Box<Expression>,
        body: Block,
    },
    /// `repeat n { ... }`
    Repeat {
        count: Box<Expression>,
        body: Block,
    },
    /// `for i in a ..< b { ... }` / `for i in a ... b { ... }`
    ForRange {
        iterator: Identifier,
        start: Box<Expression>,
        inclusive: bool,
        end: Box<Expression>,
        body: Block,
    },
    /// `for x in xs { ... }`
    ForEach {
        iterator: Identifier,
        collection: Box<Expression>,
        body: Block,
    },
    /// `cease;`
    Break,
    /// A bare call used as a statement: `f(n: 5);`
    Expression(Box<Expression>),
}

#[derive(Debug)]
pub struct VariableDeclaration {
    pub mutable: bool,
    pub name: Identifier,
    pub ty: Type,
    pub initializer: Expression,
}

#[derive(Debug)]
pub struct FunctionDeclaration {
    pub id: NodeId,
    pub span: Span,
    pub name: Identifier,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<Type>,
    pub body: Block,
}

#[derive(Debug)]
pub struct Parameter {
    pub id: NodeId,
    pub span: Span,
    pub name: Identifier,
    pub ty: Type,
}

/// `object Name { fields... }` declares a plain value type; adding `init`
/// and/or `don` methods makes it a class
#[derive(Debug)]
pub struct ObjectDeclaration {
    pub id: NodeId,
    pub span: Span,
    pub name: Identifier,
    pub fields: Vec<FieldDeclaration>,
    pub initializer: Option<Initializer>,
    pub methods: Vec<FunctionDeclaration>,
}

#[derive(Debug)]
pub struct FieldDeclaration {
    pub id: NodeId,
    pub span: Span,
    pub name: Identifier,
    pub ty: Type,
}

/// `init(radius: float) { mine.radius = radius; }`
#[derive(Debug)]
pub struct Initializer {
    pub id: NodeId,
    pub span: Span,
    pub parameters: Vec<Parameter>,
    pub body: Block,
}

#[derive(Debug)]
pub struct IfStatement {
    pub span: Span,
    pub condition: Box<Expression>,
    pub consequence: Block,
    pub alternate: Option<ElseTail>,
}

#[derive(Debug)]
pub enum ElseTail {
    Block(Block),
    If(Box<IfStatement>),
}

#[derive(Debug)]
pub struct Block {
    pub id: NodeId,
    pub span: Span,
    pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub struct Identifier {
    pub id: NodeId,
    pub span: Span,
    pub symbol: InternedSymbol,
}

#[derive(Debug)]
pub struct Type {
    pub id: NodeId,
    pub span: Span,
    pub kind: TypeKind,
}

#[derive(Debug)]
pub enum TypeKind {
    /// `int`, `float`, `string`, `bool`, `any`, `zilch`, or an object name
    Named(Identifier),
    /// `[T]`
    List(Box<Type>),
    /// `T?`
    Optional(Box<Type>),
    /// `(int, int) -> int`
    Function {
        parameters: Vec<Type>,
        return_type: Box<Type>,
    },
}

#[derive(Debug)]
pub struct Expression {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExpressionKind,
}

#[derive(Debug)]
pub enum ExpressionKind {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// String literal; interleaves literal text with `${...}` expressions
    StringTemplate(Vec<StringSegment>),
    Identifier(Identifier),
    /// `mine`
    SelfReference,
    /// `naught T`
    EmptyOptional(Box<Type>),
    /// `[]`
    EmptyList,
    /// `[a, b, c]`
    List(Vec<Expression>),
    Binary {
        operator: BinaryOperatorKind,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expression>,
    },
    Ternary {
        condition: Box<Expression>,
        consequence: Box<Expression>,
        alternate: Box<Expression>,
    },
    NilCoalescing {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<Argument>,
    },
    Subscript {
        collection: Box<Expression>,
        index: Box<Expression>,
    },
    Member {
        object: Box<Expression>,
        access: MemberAccess,
        field: Identifier,
    },
    Grouping(Box<Expression>),
}

#[derive(Debug)]
pub enum StringSegment {
    Text(String),
    Interpolation(Expression),
}

/// Call arguments are always named: `f(n: 5)`
#[derive(Debug)]
pub struct Argument {
    pub span: Span,
    pub name: Identifier,
    pub value: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAccess {
    /// `.`, requires an object-typed receiver
    Direct,
    /// `?.`, requires an optional-object-typed receiver
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorKind {
    Add,                  // +
    Subtract,             // -
    Multiply,             // *
    Divide,               // /
    Power,                // **
    Equals,               // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=
    LogicalAnd,           // &&
    LogicalOr,            // ||
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperatorClass {
    Arithmetic,
    Comparison,
    Equality,
    Logical,
}

impl BinaryOperatorKind {
    pub fn class(self) -> BinaryOperatorClass {
        match self {
            Self::Add | Self::Subtract | Self::Multiply | Self::Divide | Self::Power => {
                BinaryOperatorClass::Arithmetic
            }
            Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo => BinaryOperatorClass::Comparison,
            Self::Equals | Self::NotEquals => BinaryOperatorClass::Equality,
            Self::LogicalAnd | Self::LogicalOr => BinaryOperatorClass::Logical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperatorKind {
    Negate, // -
    Not,    // ne
    Some,   // some
}
