use std::rc::Rc;

use hashbrown::HashMap;

use crate::{
    frontend::{ast::{BinaryOperatorKind, UnaryOperatorKind}, intern::InternedSymbol},
    index::{IndexVec, define_index},
    middle::ty::{FunctionType, ObjectId, ObjectType, Type},
};

define_index! {
    pub struct VariableId;
}

define_index! {
    pub struct FunctionId;
}

/// A checked, fully typed program. Statements reference variables, functions,
/// and object types through handles into the entity arenas.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub entities: Entities,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    pub variables: IndexVec<VariableId, Variable>,
    pub functions: IndexVec<FunctionId, Function>,
    pub objects: IndexVec<ObjectId, ObjectType>,
    /// Methods of class form objects, keyed by class and method name
    pub methods: HashMap<(ObjectId, InternedSymbol), FunctionId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: InternedSymbol,
    pub ty: Type,
    pub mutable: bool,
    /// Standard library constants like `π` are emitted by name mapping
    /// rather than by declaration
    pub is_intrinsic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: InternedSymbol,
    pub parameters: Vec<VariableId>,
    pub ty: Rc<FunctionType>,
    pub body: Vec<Stmt>,
    pub is_method: bool,
    /// Standard library functions have no body to emit
    pub is_intrinsic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    VariableDeclaration {
        variable: VariableId,
        initializer: Expr,
    },
    Print(Expr),
    FunctionDeclaration(FunctionId),
    /// Struct form object; constructs from its fields in order
    StructDeclaration(ObjectId),
    /// Class form object with an explicit initializer and/or methods
    ClassDeclaration {
        object: ObjectId,
        constructor_parameters: Vec<VariableId>,
        initializer: Vec<Stmt>,
        methods: Vec<FunctionId>,
    },
    Increment(Expr),
    Decrement(Expr),
    Assignment {
        target: Expr,
        source: Expr,
    },
    Return(Expr),
    ShortReturn,
    If {
        condition: Expr,
        consequence: Vec<Stmt>,
        alternate: IfTail,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    Repeat {
        count: Expr,
        body: Vec<Stmt>,
    },
    ForRange {
        iterator: VariableId,
        start: Expr,
        inclusive: bool,
        end: Expr,
        body: Vec<Stmt>,
    },
    ForEach {
        iterator: VariableId,
        collection: Expr,
        body: Vec<Stmt>,
    },
    Break,
    /// A call evaluated for its side effects
    Call(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IfTail {
    None,
    Else(Vec<Stmt>),
    ElseIf(Box<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPiece {
    Text(String),
    Interpolation(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Boolean(bool),
    StringTemplate(Vec<StringPiece>),
    EmptyOptional(Type),
    EmptyList {
        ty: Type,
    },
    List {
        elements: Vec<Expr>,
        ty: Type,
    },
    Variable {
        id: VariableId,
        ty: Type,
    },
    /// A declared function used as a value rather than called
    FunctionReference {
        function: FunctionId,
        ty: Type,
    },
    SelfReference {
        object: ObjectId,
    },
    Binary {
        operator: BinaryOperatorKind,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: Type,
    },
    Unary {
        operator: UnaryOperatorKind,
        operand: Box<Expr>,
        ty: Type,
    },
    Ternary {
        condition: Box<Expr>,
        consequence: Box<Expr>,
        alternate: Box<Expr>,
        ty: Type,
    },
    NilCoalescing {
        left: Box<Expr>,
        right: Box<Expr>,
        ty: Type,
    },
    Subscript {
        collection: Box<Expr>,
        index: Box<Expr>,
        ty: Type,
    },
    Member {
        object: Box<Expr>,
        optional_chain: bool,
        field: InternedSymbol,
        ty: Type,
    },
    /// A call to a declared function, method, or intrinsic. Arguments are
    /// stored in parameter order; for methods the receiver comes first.
    Call {
        function: FunctionId,
        receiver: Option<Box<Expr>>,
        arguments: Vec<Expr>,
        ty: Type,
    },
    /// Object construction: `Point(x: 1, y: 2)`
    New {
        object: ObjectId,
        arguments: Vec<Expr>,
    },
}

impl Expr {
    pub fn ty(&self) -> Type {
        match self {
            Expr::Int(_) => Type::Int,
            Expr::Float(_) => Type::Float,
            Expr::Boolean(_) => Type::Boolean,
            Expr::StringTemplate(_) => Type::String,
            Expr::EmptyOptional(base) => Type::Optional(Box::new(base.clone())),
            Expr::EmptyList { ty } => ty.clone(),
            Expr::List { ty, .. } => ty.clone(),
            Expr::Variable { ty, .. } => ty.clone(),
            Expr::FunctionReference { ty, .. } => ty.clone(),
            Expr::SelfReference { object } => Type::Object(*object),
            Expr::Binary { ty, .. } => ty.clone(),
            Expr::Unary { ty, .. } => ty.clone(),
            Expr::Ternary { ty, .. } => ty.clone(),
            Expr::NilCoalescing { ty, .. } => ty.clone(),
            Expr::Subscript { ty, .. } => ty.clone(),
            Expr::Member { ty, .. } => ty.clone(),
            Expr::Call { ty, .. } => ty.clone(),
            Expr::New { object, .. } => Type::Object(*object),
        }
    }
}
