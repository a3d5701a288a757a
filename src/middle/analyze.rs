use std::rc::Rc;

use hashbrown::{HashMap, HashSet};

use crate::{
    frontend::{
        SourceFile,
        ast::{
            self, BinaryOperatorClass, BinaryOperatorKind, ElseTail, ExpressionKind, Identifier,
            MemberAccess, StatementKind, StringSegment, TypeKind, UnaryOperatorKind,
        },
        intern::InternedSymbol,
        lexer::Span,
    },
    middle::{
        SemanticError, ir,
        ir::{FunctionId, VariableId},
        ty::{Field, FunctionType, ObjectId, ObjectType, Type},
    },
};

/// Checks a parsed program and lowers it to typed IR. The walk keeps an
/// explicit stack of lexical scopes; entities live in arenas so that a
/// function or object type can be declared before its contents are known.
pub struct Analyzer<'source> {
    source: &'source SourceFile,
    entities: ir::Entities,
    scopes: Vec<Scope>,
    /// While analyzing a class initializer body, the set of fields assigned
    /// through `mine` so far
    initialized_fields: Option<HashSet<InternedSymbol>>,
}

#[derive(Debug, Default)]
struct Scope {
    bindings: HashMap<InternedSymbol, Binding>,
    in_loop: bool,
    function: Option<FunctionId>,
    class: Option<ObjectId>,
}

#[derive(Debug, Clone, Copy)]
enum Binding {
    Variable(VariableId),
    Function(FunctionId),
    Object(ObjectId),
}

pub fn analyze(
    source: &SourceFile,
    program: &ast::Program,
) -> Result<ir::Program, SemanticError> {
    let mut analyzer = Analyzer::new(source);

    let statements = program
        .statements
        .iter()
        .map(|statement| analyzer.analyze_statement(statement))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ir::Program {
        statements,
        entities: analyzer.entities,
    })
}

impl<'source> Analyzer<'source> {
    fn new(source: &'source SourceFile) -> Self {
        let mut analyzer = Self {
            source,
            entities: ir::Entities::default(),
            scopes: vec![Scope::default()],
            initialized_fields: None,
        };

        analyzer.declare_standard_library();
        analyzer
    }

    /// The ambient standard library: `π` and a handful of math and string
    /// intrinsics, bound in the root scope
    fn declare_standard_library(&mut self) {
        let pi = self.entities.variables.push(ir::Variable {
            name: InternedSymbol::new("π"),
            ty: Type::Float,
            mutable: false,
            is_intrinsic: true,
        });
        self.scopes[0]
            .bindings
            .insert(InternedSymbol::new("π"), Binding::Variable(pi));

        let unary_float = |name: &str| {
            (
                name.to_owned(),
                vec![("x", Type::Float)],
                Type::Float,
            )
        };

        let intrinsics = [
            unary_float("sin"),
            unary_float("cos"),
            unary_float("exp"),
            unary_float("ln"),
            (
                "hypot".to_owned(),
                vec![("x", Type::Float), ("y", Type::Float)],
                Type::Float,
            ),
            ("bytes".to_owned(), vec![("s", Type::String)], Type::Int),
        ];

        for (name, parameters, return_type) in intrinsics {
            let symbol = InternedSymbol::new(&name);

            let ty = Rc::new(FunctionType {
                parameter_names: parameters
                    .iter()
                    .map(|(name, _)| InternedSymbol::new(name))
                    .collect(),
                parameter_types: parameters.iter().map(|(_, ty)| ty.clone()).collect(),
                return_type,
            });

            let id = self.entities.functions.push(ir::Function {
                name: symbol,
                parameters: Vec::new(),
                ty,
                body: Vec::new(),
                is_method: false,
                is_intrinsic: true,
            });

            self.scopes[0].bindings.insert(symbol, Binding::Function(id));
        }
    }

    fn error(&self, span: Span, message: impl Into<String>) -> SemanticError {
        SemanticError::new(self.source, span, message)
    }

    fn describe(&self, ty: &Type) -> String {
        ty.description(&self.entities.objects)
    }

    /* Scopes */

    fn push_scope(&mut self) {
        let parent = self.scopes.last().expect("the root scope always exists");

        self.scopes.push(Scope {
            bindings: HashMap::new(),
            in_loop: parent.in_loop,
            function: parent.function,
            class: parent.class,
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
        debug_assert!(!self.scopes.is_empty());
    }

    fn current_scope_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("the root scope always exists")
    }

    fn current_scope(&self) -> &Scope {
        self.scopes.last().expect("the root scope always exists")
    }

    /// Binds a name in the current scope. Shadowing an outer binding is
    /// allowed; redeclaring within the same scope is not.
    fn declare(&mut self, name: &Identifier, binding: Binding) -> Result<(), SemanticError> {
        let scope = self.current_scope_mut();

        if scope.bindings.contains_key(&name.symbol) {
            return Err(self.error(
                name.span,
                format!("Identifier `{}` is already declared", name.symbol),
            ));
        }

        scope.bindings.insert(name.symbol, binding);
        Ok(())
    }

    fn lookup(&self, symbol: InternedSymbol) -> Option<Binding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.bindings.get(&symbol).copied())
    }

    fn declare_variable(
        &mut self,
        name: &Identifier,
        ty: Type,
        mutable: bool,
    ) -> Result<VariableId, SemanticError> {
        let id = self.entities.variables.push(ir::Variable {
            name: name.symbol,
            ty,
            mutable,
            is_intrinsic: false,
        });

        self.declare(name, Binding::Variable(id))?;
        Ok(id)
    }

    /* Types */

    fn resolve_type(&mut self, ty: &ast::Type) -> Result<Type, SemanticError> {
        match &ty.kind {
            TypeKind::Named(name) => match name.symbol.as_str() {
                "int" => Ok(Type::Int),
                "float" => Ok(Type::Float),
                "string" => Ok(Type::String),
                "bool" => Ok(Type::Boolean),
                "any" => Ok(Type::Any),
                "zilch" => Ok(Type::Void),
                other => match self.lookup(name.symbol) {
                    Some(Binding::Object(id)) => Ok(Type::Object(id)),
                    _ => Err(self.error(name.span, format!("Unknown type `{other}`"))),
                },
            },
            TypeKind::List(element) => {
                Ok(Type::List(Box::new(self.resolve_type(element)?)))
            }
            TypeKind::Optional(base) => {
                Ok(Type::Optional(Box::new(self.resolve_type(base)?)))
            }
            TypeKind::Function {
                parameters,
                return_type,
            } => {
                let parameter_types = parameters
                    .iter()
                    .map(|parameter| self.resolve_type(parameter))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(Type::Function(Rc::new(FunctionType {
                    parameter_names: Vec::new(),
                    parameter_types,
                    return_type: self.resolve_type(return_type)?,
                })))
            }
        }
    }

    /// Narrows an untyped empty list literal to the target's list type, then
    /// requires assignability
    fn check_assignable(
        &self,
        expr: ir::Expr,
        target: &Type,
        span: Span,
    ) -> Result<ir::Expr, SemanticError> {
        let expr = match expr {
            ir::Expr::EmptyList { .. } if matches!(target, Type::List(_)) => {
                ir::Expr::EmptyList { ty: target.clone() }
            }
            other => other,
        };

        if !expr.ty().assignable_to(target) {
            return Err(self.error(
                span,
                format!(
                    "Cannot assign a value of type `{}` to a target of type `{}`",
                    self.describe(&expr.ty()),
                    self.describe(target)
                ),
            ));
        }

        Ok(expr)
    }

    fn check_boolean(&self, expr: &ir::Expr, span: Span) -> Result<(), SemanticError> {
        if expr.ty() != Type::Boolean {
            return Err(self.error(
                span,
                format!("Expected a boolean but found `{}`", self.describe(&expr.ty())),
            ));
        }

        Ok(())
    }

    fn check_numeric(&self, expr: &ir::Expr, span: Span) -> Result<(), SemanticError> {
        if !expr.ty().is_numeric() {
            return Err(self.error(
                span,
                format!("Expected a number but found `{}`", self.describe(&expr.ty())),
            ));
        }

        Ok(())
    }

    fn check_int(&self, expr: &ir::Expr, span: Span) -> Result<(), SemanticError> {
        if expr.ty() != Type::Int {
            return Err(self.error(
                span,
                format!("Expected an int but found `{}`", self.describe(&expr.ty())),
            ));
        }

        Ok(())
    }

    /* Statements */

    fn analyze_statement(&mut self, statement: &ast::Statement) -> Result<ir::Stmt, SemanticError> {
        match &statement.kind {
            StatementKind::VariableDeclaration(declaration) => {
                let ty = self.resolve_type(&declaration.ty)?;
                let initializer = self.analyze_expression(&declaration.initializer)?;
                let initializer =
                    self.check_assignable(initializer, &ty, declaration.initializer.span)?;

                let variable =
                    self.declare_variable(&declaration.name, ty, declaration.mutable)?;

                Ok(ir::Stmt::VariableDeclaration {
                    variable,
                    initializer,
                })
            }
            StatementKind::Print(expression) => {
                Ok(ir::Stmt::Print(self.analyze_expression(expression)?))
            }
            StatementKind::FunctionDeclaration(declaration) => {
                let id = self.analyze_function_declaration(declaration, None)?;
                Ok(ir::Stmt::FunctionDeclaration(id))
            }
            StatementKind::ObjectDeclaration(declaration) => {
                self.analyze_object_declaration(declaration)
            }
            StatementKind::Increment(target) => {
                let target = self.analyze_assignment_target(target)?;
                Ok(ir::Stmt::Increment(target))
            }
            StatementKind::Decrement(target) => {
                let target = self.analyze_assignment_target(target)?;
                Ok(ir::Stmt::Decrement(target))
            }
            StatementKind::Assignment { target, source } => {
                let analyzed_target = self.analyze_expression(target)?;

                if !self.is_mutable(&analyzed_target) {
                    return Err(
                        self.error(target.span, "Cannot assign to an immutable target")
                    );
                }

                let analyzed_source = self.analyze_expression(source)?;
                let analyzed_source =
                    self.check_assignable(analyzed_source, &analyzed_target.ty(), source.span)?;

                self.record_field_initialization(&analyzed_target, target.span)?;

                Ok(ir::Stmt::Assignment {
                    target: analyzed_target,
                    source: analyzed_source,
                })
            }
            StatementKind::Return(expression) => self.analyze_return(statement, expression),
            StatementKind::If(if_statement) => self.analyze_if_statement(if_statement),
            StatementKind::While { condition, body } => {
                let analyzed_condition = self.analyze_expression(condition)?;
                self.check_boolean(&analyzed_condition, condition.span)?;

                let body = self.analyze_loop_body(body, None)?;

                Ok(ir::Stmt::While {
                    condition: analyzed_condition,
                    body,
                })
            }
            StatementKind::Repeat { count, body } => {
                let analyzed_count = self.analyze_expression(count)?;
                self.check_int(&analyzed_count, count.span)?;

                let body = self.analyze_loop_body(body, None)?;

                Ok(ir::Stmt::Repeat {
                    count: analyzed_count,
                    body,
                })
            }
            StatementKind::ForRange {
                iterator,
                start,
                inclusive,
                end,
                body,
            } => {
                let analyzed_start = self.analyze_expression(start)?;
                self.check_int(&analyzed_start, start.span)?;
                let analyzed_end = self.analyze_expression(end)?;
                self.check_int(&analyzed_end, end.span)?;

                let mut iterator_id = None;
                let body = self.analyze_loop_body(
                    body,
                    Some((iterator, Type::Int, &mut iterator_id)),
                )?;

                Ok(ir::Stmt::ForRange {
                    iterator: iterator_id.expect("loop iterator was declared"),
                    start: analyzed_start,
                    inclusive: *inclusive,
                    end: analyzed_end,
                    body,
                })
            }
            StatementKind::ForEach {
                iterator,
                collection,
                body,
            } => {
                let analyzed_collection = self.analyze_expression(collection)?;

                let Type::List(element) = analyzed_collection.ty() else {
                    return Err(self.error(
                        collection.span,
                        format!(
                            "Expected a list but found `{}`",
                            self.describe(&analyzed_collection.ty())
                        ),
                    ));
                };

                let mut iterator_id = None;
                let body = self.analyze_loop_body(
                    body,
                    Some((iterator, *element, &mut iterator_id)),
                )?;

                Ok(ir::Stmt::ForEach {
                    iterator: iterator_id.expect("loop iterator was declared"),
                    collection: analyzed_collection,
                    body,
                })
            }
            StatementKind::Break => {
                if !self.current_scope().in_loop {
                    return Err(self.error(statement.span, "Break used outside of a loop"));
                }

                Ok(ir::Stmt::Break)
            }
            StatementKind::Expression(expression) => {
                let analyzed = self.analyze_expression(expression)?;

                if !matches!(analyzed, ir::Expr::Call { .. } | ir::Expr::New { .. }) {
                    return Err(self.error(
                        expression.span,
                        "Only call expressions may be used as statements",
                    ));
                }

                Ok(ir::Stmt::Call(analyzed))
            }
        }
    }

    /// Increment and decrement targets must be mutable numeric lvalues
    fn analyze_assignment_target(
        &mut self,
        target: &ast::Expression,
    ) -> Result<ir::Expr, SemanticError> {
        let analyzed = self.analyze_expression(target)?;
        self.check_numeric(&analyzed, target.span)?;

        if !self.is_mutable(&analyzed) {
            return Err(self.error(target.span, "Cannot assign to an immutable target"));
        }

        Ok(analyzed)
    }

    /// Mutability of an lvalue follows its root: a subscript or member
    /// expression is writable exactly when the thing it indexes into is
    fn is_mutable(&self, expr: &ir::Expr) -> bool {
        match expr {
            ir::Expr::Variable { id, .. } => self.entities.variables[*id].mutable,
            ir::Expr::Subscript { collection, .. } => self.is_mutable(collection),
            ir::Expr::Member { object, .. } => self.is_mutable(object),
            ir::Expr::SelfReference { .. } => true,
            _ => false,
        }
    }

    fn analyze_return(
        &mut self,
        statement: &ast::Statement,
        expression: &Option<Box<ast::Expression>>,
    ) -> Result<ir::Stmt, SemanticError> {
        let Some(function) = self.current_scope().function else {
            return Err(self.error(statement.span, "Return used outside of a function"));
        };

        let return_type = self.entities.functions[function].ty.return_type.clone();

        match expression {
            Some(expression) => {
                if return_type == Type::Void {
                    return Err(self.error(
                        expression.span,
                        "Cannot return a value from a function without a return type",
                    ));
                }

                let analyzed = self.analyze_expression(expression)?;
                let analyzed = self.check_assignable(analyzed, &return_type, expression.span)?;

                Ok(ir::Stmt::Return(analyzed))
            }
            None => {
                if return_type != Type::Void {
                    return Err(self.error(
                        statement.span,
                        format!(
                            "Expected a return value of type `{}`",
                            self.describe(&return_type)
                        ),
                    ));
                }

                Ok(ir::Stmt::ShortReturn)
            }
        }
    }

    fn analyze_if_statement(
        &mut self,
        if_statement: &ast::IfStatement,
    ) -> Result<ir::Stmt, SemanticError> {
        let condition = self.analyze_expression(&if_statement.condition)?;
        self.check_boolean(&condition, if_statement.condition.span)?;

        self.push_scope();
        let consequence = self.analyze_block(&if_statement.consequence);
        self.pop_scope();

        // The consequence's error must win over any in the else branches
        let consequence = consequence?;

        let alternate = match &if_statement.alternate {
            None => ir::IfTail::None,
            Some(ElseTail::Block(block)) => {
                self.push_scope();
                let statements = self.analyze_block(block);
                self.pop_scope();
                ir::IfTail::Else(statements?)
            }
            Some(ElseTail::If(tail)) => {
                ir::IfTail::ElseIf(Box::new(self.analyze_if_statement(tail)?))
            }
        };

        Ok(ir::Stmt::If {
            condition,
            consequence,
            alternate,
        })
    }

    fn analyze_block(&mut self, block: &ast::Block) -> Result<Vec<ir::Stmt>, SemanticError> {
        block
            .statements
            .iter()
            .map(|statement| self.analyze_statement(statement))
            .collect()
    }

    /// Opens a loop scope, optionally binding the loop variable, analyzes the
    /// body, and closes the scope again
    fn analyze_loop_body(
        &mut self,
        body: &ast::Block,
        iterator: Option<(&Identifier, Type, &mut Option<VariableId>)>,
    ) -> Result<Vec<ir::Stmt>, SemanticError> {
        self.push_scope();
        self.current_scope_mut().in_loop = true;

        let declared = if let Some((name, ty, slot)) = iterator {
            match self.declare_variable(name, ty, false) {
                Ok(id) => {
                    *slot = Some(id);
                    Ok(())
                }
                Err(error) => Err(error),
            }
        } else {
            Ok(())
        };

        let statements = declared.and_then(|()| self.analyze_block(body));
        self.pop_scope();

        statements
    }

    /// Two-phase: the function is declared and bound before its parameters
    /// and body are analyzed so that recursive calls resolve
    fn analyze_function_declaration(
        &mut self,
        declaration: &ast::FunctionDeclaration,
        method_of: Option<ObjectId>,
    ) -> Result<FunctionId, SemanticError> {
        if let Some(object) = method_of
            && self
                .entities
                .methods
                .contains_key(&(object, declaration.name.symbol))
        {
            return Err(self.error(
                declaration.name.span,
                format!("Method `{}` is already declared", declaration.name.symbol),
            ));
        }

        let placeholder = Rc::new(FunctionType {
            parameter_names: Vec::new(),
            parameter_types: Vec::new(),
            return_type: Type::Void,
        });

        let id = self.entities.functions.push(ir::Function {
            name: declaration.name.symbol,
            parameters: Vec::new(),
            ty: placeholder,
            body: Vec::new(),
            is_method: method_of.is_some(),
            is_intrinsic: false,
        });

        if let Some(object) = method_of {
            self.entities
                .methods
                .insert((object, declaration.name.symbol), id);
        } else {
            self.declare(&declaration.name, Binding::Function(id))?;
        }

        self.push_scope();
        self.current_scope_mut().function = Some(id);
        self.current_scope_mut().in_loop = false;

        let result = self.analyze_function_interior(declaration, id);
        self.pop_scope();
        result?;

        Ok(id)
    }

    fn analyze_function_interior(
        &mut self,
        declaration: &ast::FunctionDeclaration,
        id: FunctionId,
    ) -> Result<(), SemanticError> {
        let mut parameters = Vec::new();
        let mut parameter_names = Vec::new();
        let mut parameter_types = Vec::new();

        for parameter in &declaration.parameters {
            let ty = self.resolve_type(&parameter.ty)?;
            parameter_names.push(parameter.name.symbol);
            parameter_types.push(ty.clone());
            parameters.push(self.declare_variable(&parameter.name, ty, false)?);
        }

        let return_type = match &declaration.return_type {
            Some(ty) => self.resolve_type(ty)?,
            None => Type::Void,
        };

        // The signature must be in place before the body is analyzed so that
        // recursive calls type check
        self.entities.functions[id].ty = Rc::new(FunctionType {
            parameter_names,
            parameter_types,
            return_type,
        });
        self.entities.functions[id].parameters = parameters;

        let body = self.analyze_block(&declaration.body)?;
        self.entities.functions[id].body = body;

        Ok(())
    }

    fn analyze_object_declaration(
        &mut self,
        declaration: &ast::ObjectDeclaration,
    ) -> Result<ir::Stmt, SemanticError> {
        let id = self.entities.objects.push(ObjectType {
            name: declaration.name.symbol,
            fields: Vec::new(),
            constructor_parameters: None,
        });

        self.declare(&declaration.name, Binding::Object(id))?;

        let mut fields = Vec::new();

        for field in &declaration.fields {
            if fields
                .iter()
                .any(|existing: &Field| existing.name == field.name.symbol)
            {
                return Err(self.error(
                    field.name.span,
                    format!("Field `{}` is already declared", field.name.symbol),
                ));
            }

            fields.push(Field {
                name: field.name.symbol,
                ty: self.resolve_type(&field.ty)?,
            });
        }

        for field in &fields {
            if self.type_contains_object(&field.ty, id) {
                return Err(self.error(
                    declaration.name.span,
                    format!(
                        "Object type `{}` must not contain itself",
                        declaration.name.symbol
                    ),
                ));
            }
        }

        self.entities.objects[id].fields = fields;

        if declaration.initializer.is_none() && declaration.methods.is_empty() {
            return Ok(ir::Stmt::StructDeclaration(id));
        }

        // Class form: the constructor's parameters are the initializer's if
        // one is present, otherwise the fields themselves
        let (constructor_parameters, initializer_body) = match &declaration.initializer {
            Some(initializer) => self.analyze_initializer(declaration, initializer, id)?,
            None => {
                self.entities.objects[id].constructor_parameters =
                    Some(self.entities.objects[id].fields.clone());
                (Vec::new(), Vec::new())
            }
        };

        let methods = declaration
            .methods
            .iter()
            .map(|method| {
                self.push_scope();
                self.current_scope_mut().class = Some(id);
                let result = self.analyze_function_declaration(method, Some(id));
                self.pop_scope();
                result
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ir::Stmt::ClassDeclaration {
            object: id,
            constructor_parameters,
            initializer: initializer_body,
            methods,
        })
    }

    /// The initializer body must assign every declared field through `mine`
    /// exactly once
    fn analyze_initializer(
        &mut self,
        declaration: &ast::ObjectDeclaration,
        initializer: &ast::Initializer,
        id: ObjectId,
    ) -> Result<(Vec<VariableId>, Vec<ir::Stmt>), SemanticError> {
        self.push_scope();
        self.current_scope_mut().class = Some(id);

        let result = (|| {
            let mut parameters = Vec::new();
            let mut parameter_fields = Vec::new();

            for parameter in &initializer.parameters {
                let ty = self.resolve_type(&parameter.ty)?;
                parameter_fields.push(Field {
                    name: parameter.name.symbol,
                    ty: ty.clone(),
                });
                parameters.push(self.declare_variable(&parameter.name, ty, false)?);
            }

            self.entities.objects[id].constructor_parameters = Some(parameter_fields);

            let previous = self.initialized_fields.replace(HashSet::new());
            let body = self.analyze_block(&initializer.body);
            let initialized = self.initialized_fields.take().unwrap_or_default();
            self.initialized_fields = previous;

            let body = body?;

            for field in &self.entities.objects[id].fields {
                if !initialized.contains(&field.name) {
                    return Err(self.error(
                        initializer.span,
                        format!(
                            "Not all fields of `{}` are initialized; missing `{}`",
                            declaration.name.symbol, field.name
                        ),
                    ));
                }
            }

            Ok((parameters, body))
        })();

        self.pop_scope();
        result
    }

    /// Tracks `mine.field = ...` assignments inside an initializer body
    fn record_field_initialization(
        &mut self,
        target: &ir::Expr,
        span: Span,
    ) -> Result<(), SemanticError> {
        let ir::Expr::Member { object, field, .. } = target else {
            return Ok(());
        };

        if !matches!(**object, ir::Expr::SelfReference { .. }) {
            return Ok(());
        }

        let field = *field;

        if let Some(initialized) = self.initialized_fields.as_mut()
            && !initialized.insert(field)
        {
            return Err(self.error(
                span,
                format!("Field `{field}` is initialized more than once"),
            ));
        }

        Ok(())
    }

    /// Whether `ty` contains the object `target` by value, walking through
    /// nested object fields
    fn type_contains_object(&self, ty: &Type, target: ObjectId) -> bool {
        match ty {
            Type::Object(id) if *id == target => true,
            Type::Object(id) => self.entities.objects[*id]
                .fields
                .iter()
                .any(|field| self.type_contains_object(&field.ty, target)),
            _ => false,
        }
    }

    /* Expressions */

    fn analyze_expression(
        &mut self,
        expression: &ast::Expression,
    ) -> Result<ir::Expr, SemanticError> {
        match &expression.kind {
            ExpressionKind::Integer(value) => Ok(ir::Expr::Int(*value)),
            ExpressionKind::Float(value) => Ok(ir::Expr::Float(*value)),
            ExpressionKind::Boolean(value) => Ok(ir::Expr::Boolean(*value)),
            ExpressionKind::StringTemplate(segments) => {
                let pieces = segments
                    .iter()
                    .map(|segment| match segment {
                        StringSegment::Text(text) => Ok(ir::StringPiece::Text(text.clone())),
                        StringSegment::Interpolation(inner) => {
                            Ok(ir::StringPiece::Interpolation(self.analyze_expression(inner)?))
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(ir::Expr::StringTemplate(pieces))
            }
            ExpressionKind::Identifier(identifier) => match self.lookup(identifier.symbol) {
                Some(Binding::Variable(id)) => Ok(ir::Expr::Variable {
                    id,
                    ty: self.entities.variables[id].ty.clone(),
                }),
                Some(Binding::Function(id)) => Ok(ir::Expr::FunctionReference {
                    function: id,
                    ty: Type::Function(self.entities.functions[id].ty.clone()),
                }),
                Some(Binding::Object(_)) => Err(self.error(
                    identifier.span,
                    format!(
                        "`{}` is a type and cannot be used as a value",
                        identifier.symbol
                    ),
                )),
                None => Err(self.error(
                    identifier.span,
                    format!("Identifier `{}` is not declared", identifier.symbol),
                )),
            },
            ExpressionKind::SelfReference => {
                let Some(object) = self.current_scope().class else {
                    return Err(
                        self.error(expression.span, "`mine` used outside of an object")
                    );
                };

                Ok(ir::Expr::SelfReference { object })
            }
            ExpressionKind::EmptyOptional(ty) => {
                let base = self.resolve_type(ty)?;
                Ok(ir::Expr::EmptyOptional(base))
            }
            ExpressionKind::EmptyList => Ok(ir::Expr::EmptyList {
                ty: Type::List(Box::new(Type::Any)),
            }),
            ExpressionKind::List(elements) => self.analyze_list_literal(elements),
            ExpressionKind::Binary { operator, lhs, rhs } => {
                self.analyze_binary_expression(*operator, lhs, rhs)
            }
            ExpressionKind::Unary { operator, operand } => {
                self.analyze_unary_expression(*operator, operand)
            }
            ExpressionKind::Ternary {
                condition,
                consequence,
                alternate,
            } => {
                let analyzed_condition = self.analyze_expression(condition)?;
                self.check_boolean(&analyzed_condition, condition.span)?;

                let analyzed_consequence = self.analyze_expression(consequence)?;
                let analyzed_alternate = self.analyze_expression(alternate)?;

                if !analyzed_consequence.ty().equivalent(&analyzed_alternate.ty()) {
                    return Err(self.error(
                        alternate.span,
                        format!(
                            "Branches have different types `{}` and `{}`",
                            self.describe(&analyzed_consequence.ty()),
                            self.describe(&analyzed_alternate.ty())
                        ),
                    ));
                }

                let ty = analyzed_consequence.ty();

                Ok(ir::Expr::Ternary {
                    condition: Box::new(analyzed_condition),
                    consequence: Box::new(analyzed_consequence),
                    alternate: Box::new(analyzed_alternate),
                    ty,
                })
            }
            ExpressionKind::NilCoalescing { left, right } => {
                let analyzed_left = self.analyze_expression(left)?;

                let Type::Optional(base) = analyzed_left.ty() else {
                    return Err(self.error(
                        left.span,
                        format!(
                            "Expected an optional but found `{}`",
                            self.describe(&analyzed_left.ty())
                        ),
                    ));
                };

                let analyzed_right = self.analyze_expression(right)?;
                let analyzed_right = self.check_assignable(analyzed_right, &base, right.span)?;

                let ty = analyzed_left.ty();

                Ok(ir::Expr::NilCoalescing {
                    left: Box::new(analyzed_left),
                    right: Box::new(analyzed_right),
                    ty,
                })
            }
            ExpressionKind::Call { callee, arguments } => {
                self.analyze_call(expression, callee, arguments)
            }
            ExpressionKind::Subscript { collection, index } => {
                let analyzed_collection = self.analyze_expression(collection)?;

                let element = match analyzed_collection.ty() {
                    Type::List(element) => *element,
                    Type::String => Type::String,
                    other => {
                        return Err(self.error(
                            collection.span,
                            format!(
                                "Expected a list or string but found `{}`",
                                self.describe(&other)
                            ),
                        ));
                    }
                };

                let analyzed_index = self.analyze_expression(index)?;
                self.check_int(&analyzed_index, index.span)?;

                Ok(ir::Expr::Subscript {
                    collection: Box::new(analyzed_collection),
                    index: Box::new(analyzed_index),
                    ty: element,
                })
            }
            ExpressionKind::Member {
                object,
                access,
                field,
            } => self.analyze_member_expression(object, *access, field),
            ExpressionKind::Grouping(inner) => self.analyze_expression(inner),
        }
    }

    fn analyze_list_literal(
        &mut self,
        elements: &[ast::Expression],
    ) -> Result<ir::Expr, SemanticError> {
        let analyzed = elements
            .iter()
            .map(|element| self.analyze_expression(element))
            .collect::<Result<Vec<_>, _>>()?;

        let first = analyzed
            .first()
            .expect("empty lists are a separate node")
            .ty();

        for (element, analyzed) in elements.iter().zip(&analyzed) {
            if !analyzed.ty().equivalent(&first) {
                return Err(self.error(
                    element.span,
                    format!(
                        "List elements must all have type `{}` but found `{}`",
                        self.describe(&first),
                        self.describe(&analyzed.ty())
                    ),
                ));
            }
        }

        Ok(ir::Expr::List {
            elements: analyzed,
            ty: Type::List(Box::new(first)),
        })
    }

    fn analyze_binary_expression(
        &mut self,
        operator: BinaryOperatorKind,
        lhs: &ast::Expression,
        rhs: &ast::Expression,
    ) -> Result<ir::Expr, SemanticError> {
        let analyzed_lhs = self.analyze_expression(lhs)?;
        let analyzed_rhs = self.analyze_expression(rhs)?;

        let same_type = analyzed_lhs.ty().equivalent(&analyzed_rhs.ty());

        let ty = match operator.class() {
            BinaryOperatorClass::Arithmetic => {
                let concatenation = operator == BinaryOperatorKind::Add
                    && analyzed_lhs.ty() == Type::String;

                if !concatenation {
                    self.check_numeric(&analyzed_lhs, lhs.span)?;
                }

                if !same_type {
                    return Err(self.error(
                        rhs.span,
                        format!(
                            "Operands have different types `{}` and `{}`",
                            self.describe(&analyzed_lhs.ty()),
                            self.describe(&analyzed_rhs.ty())
                        ),
                    ));
                }

                analyzed_lhs.ty()
            }
            BinaryOperatorClass::Comparison => {
                self.check_numeric(&analyzed_lhs, lhs.span)?;
                self.check_numeric(&analyzed_rhs, rhs.span)?;

                if !same_type {
                    return Err(self.error(
                        rhs.span,
                        format!(
                            "Operands have different types `{}` and `{}`",
                            self.describe(&analyzed_lhs.ty()),
                            self.describe(&analyzed_rhs.ty())
                        ),
                    ));
                }

                Type::Boolean
            }
            BinaryOperatorClass::Equality => {
                if !same_type {
                    return Err(self.error(
                        rhs.span,
                        format!(
                            "Operands have different types `{}` and `{}`",
                            self.describe(&analyzed_lhs.ty()),
                            self.describe(&analyzed_rhs.ty())
                        ),
                    ));
                }

                Type::Boolean
            }
            BinaryOperatorClass::Logical => {
                self.check_boolean(&analyzed_lhs, lhs.span)?;
                self.check_boolean(&analyzed_rhs, rhs.span)?;
                Type::Boolean
            }
        };

        Ok(ir::Expr::Binary {
            operator,
            lhs: Box::new(analyzed_lhs),
            rhs: Box::new(analyzed_rhs),
            ty,
        })
    }

    fn analyze_unary_expression(
        &mut self,
        operator: UnaryOperatorKind,
        operand: &ast::Expression,
    ) -> Result<ir::Expr, SemanticError> {
        let analyzed = self.analyze_expression(operand)?;

        let ty = match operator {
            UnaryOperatorKind::Negate => {
                self.check_numeric(&analyzed, operand.span)?;
                analyzed.ty()
            }
            UnaryOperatorKind::Not => {
                self.check_boolean(&analyzed, operand.span)?;
                Type::Boolean
            }
            UnaryOperatorKind::Some => Type::Optional(Box::new(analyzed.ty())),
        };

        Ok(ir::Expr::Unary {
            operator,
            operand: Box::new(analyzed),
            ty,
        })
    }

    fn analyze_member_expression(
        &mut self,
        object: &ast::Expression,
        access: MemberAccess,
        field: &Identifier,
    ) -> Result<ir::Expr, SemanticError> {
        let analyzed_object = self.analyze_expression(object)?;

        let (object_id, optional_chain) = match (access, analyzed_object.ty()) {
            (MemberAccess::Direct, Type::Object(id)) => (id, false),
            (MemberAccess::Optional, Type::Optional(base)) if matches!(*base, Type::Object(_)) => {
                let Type::Object(id) = *base else { unreachable!() };
                (id, true)
            }
            (MemberAccess::Direct, other) => {
                return Err(self.error(
                    object.span,
                    format!("Expected an object but found `{}`", self.describe(&other)),
                ));
            }
            (MemberAccess::Optional, other) => {
                return Err(self.error(
                    object.span,
                    format!(
                        "Expected an optional object but found `{}`",
                        self.describe(&other)
                    ),
                ));
            }
        };

        let Some(declared) = self.entities.objects[object_id].field(field.symbol) else {
            return Err(self.error(
                field.span,
                format!(
                    "Object type `{}` has no field named `{}`",
                    self.entities.objects[object_id].name, field.symbol
                ),
            ));
        };

        let field_ty = declared.ty.clone();
        let ty = if optional_chain {
            Type::Optional(Box::new(field_ty))
        } else {
            field_ty
        };

        Ok(ir::Expr::Member {
            object: Box::new(analyzed_object),
            optional_chain,
            field: field.symbol,
            ty,
        })
    }

    fn analyze_call(
        &mut self,
        expression: &ast::Expression,
        callee: &ast::Expression,
        arguments: &[ast::Argument],
    ) -> Result<ir::Expr, SemanticError> {
        match &callee.kind {
            ExpressionKind::Identifier(identifier) => match self.lookup(identifier.symbol) {
                Some(Binding::Function(function)) => {
                    let ty = self.entities.functions[function].ty.clone();
                    let analyzed = self.check_arguments(
                        expression.span,
                        arguments,
                        &ty.parameter_names,
                        &ty.parameter_types,
                    )?;

                    Ok(ir::Expr::Call {
                        function,
                        receiver: None,
                        arguments: analyzed,
                        ty: ty.return_type.clone(),
                    })
                }
                Some(Binding::Object(object)) => {
                    let parameters = self.entities.objects[object]
                        .constructor_parameters
                        .clone()
                        .unwrap_or_else(|| self.entities.objects[object].fields.clone());

                    let names: Vec<_> = parameters.iter().map(|field| field.name).collect();
                    let types: Vec<_> =
                        parameters.iter().map(|field| field.ty.clone()).collect();

                    let analyzed =
                        self.check_arguments(expression.span, arguments, &names, &types)?;

                    Ok(ir::Expr::New {
                        object,
                        arguments: analyzed,
                    })
                }
                _ => Err(self.error(
                    callee.span,
                    format!("`{}` is not a function", identifier.symbol),
                )),
            },
            ExpressionKind::Member {
                object,
                access: MemberAccess::Direct,
                field,
            } => {
                let analyzed_object = self.analyze_expression(object)?;

                let Type::Object(object_id) = analyzed_object.ty() else {
                    return Err(self.error(
                        object.span,
                        format!(
                            "Expected an object but found `{}`",
                            self.describe(&analyzed_object.ty())
                        ),
                    ));
                };

                let Some(function) = self
                    .entities
                    .methods
                    .get(&(object_id, field.symbol))
                    .copied()
                else {
                    return Err(self.error(
                        field.span,
                        format!(
                            "Object type `{}` has no method named `{}`",
                            self.entities.objects[object_id].name, field.symbol
                        ),
                    ));
                };

                let ty = self.entities.functions[function].ty.clone();
                let analyzed = self.check_arguments(
                    expression.span,
                    arguments,
                    &ty.parameter_names,
                    &ty.parameter_types,
                )?;

                Ok(ir::Expr::Call {
                    function,
                    receiver: Some(Box::new(analyzed_object)),
                    arguments: analyzed,
                    ty: ty.return_type.clone(),
                })
            }
            _ => Err(self.error(callee.span, "Call of something that is not a function")),
        }
    }

    /// Arguments are matched to parameters by position and must carry the
    /// matching parameter's name
    fn check_arguments(
        &mut self,
        call_span: Span,
        arguments: &[ast::Argument],
        parameter_names: &[InternedSymbol],
        parameter_types: &[Type],
    ) -> Result<Vec<ir::Expr>, SemanticError> {
        if arguments.len() != parameter_types.len() {
            return Err(self.error(
                call_span,
                format!(
                    "Expected {} argument(s) but got {}",
                    parameter_types.len(),
                    arguments.len()
                ),
            ));
        }

        let mut analyzed = Vec::with_capacity(arguments.len());

        for ((argument, name), ty) in arguments.iter().zip(parameter_names).zip(parameter_types) {
            if argument.name.symbol != *name {
                return Err(self.error(
                    argument.name.span,
                    format!(
                        "Expected an argument named `{}` but got `{}`",
                        name, argument.name.symbol
                    ),
                ));
            }

            let value = self.analyze_expression(&argument.value)?;
            analyzed.push(self.check_assignable(value, ty, argument.value.span)?);
        }

        Ok(analyzed)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::frontend::parser::Parser;

    fn analyze_source(source: &str) -> Result<ir::Program, SemanticError> {
        let source = SourceFile::new_in_memory(source);
        let program = Parser::parse_program(&source).expect("test programs should parse");
        analyze(&source, &program)
    }

    fn error_message(source: &str) -> String {
        analyze_source(source)
            .expect_err("analysis should fail")
            .message
    }

    #[test]
    fn redeclaration_in_the_same_scope_fails() {
        assert!(error_message("thine x: int = 1; thine x: int = 2;")
            .contains("already declared"));
    }

    #[test]
    fn shadowing_in_a_nested_scope_succeeds() {
        analyze_source(indoc! {"
            thine x: int = 1;
            perchance shall {
                thine x: string = \"shadow\";
                proclaim(x);
            }
        "})
        .expect("shadowing should be allowed");
    }

    #[test]
    fn list_literals_must_be_homogeneous() {
        assert!(error_message(r#"thine xs: [int] = [1, 2, "x"];"#)
            .contains("List elements"));
        analyze_source("thine xs: [int] = [1, 2, 3];").expect("homogeneous list");
    }

    #[test]
    fn empty_lists_narrow_to_the_declared_type() {
        let program = analyze_source("thine xs: [string] = [];").unwrap();

        let ir::Stmt::VariableDeclaration { initializer, .. } = &program.statements[0] else {
            panic!("expected a declaration");
        };
        assert_eq!(
            initializer.ty(),
            Type::List(Box::new(Type::String))
        );
    }

    #[test]
    fn constants_cannot_be_assigned() {
        assert!(error_message("fact x: int = 1; x = 2;").contains("immutable"));
        analyze_source("thine x: int = 1; x = 2;").expect("mutable assignment");
    }

    #[test]
    fn self_containing_object_types_are_rejected() {
        assert!(
            error_message("object Node { next: Node; }").contains("must not contain itself")
        );
        analyze_source(indoc! {"
            object Point { x: int; y: int; }
            object Segment { a: Point; b: Point; }
        "})
        .expect("nesting unrelated object types is fine");
    }

    #[test]
    fn break_outside_a_loop_fails() {
        assert!(error_message("cease;").contains("outside of a loop"));
        analyze_source("whilst shall { cease; }").expect("break inside a loop");
    }

    #[test]
    fn return_outside_a_function_fails() {
        assert!(error_message("return 1;").contains("outside of a function"));
    }

    #[test]
    fn return_type_is_enforced() {
        assert!(error_message(r#"don f() -> int { return "x"; }"#)
            .contains("Cannot assign"));
        assert!(error_message("don f() { return 1; }")
            .contains("without a return type"));
        assert!(error_message("don f() -> int { return; }")
            .contains("Expected a return value"));
    }

    #[test]
    fn conditions_must_be_boolean() {
        assert!(error_message("perchance 1 { proclaim(1); }").contains("Expected a boolean"));
        assert!(error_message("whilst 1 { proclaim(1); }").contains("Expected a boolean"));
    }

    #[test]
    fn branch_errors_report_in_source_order() {
        let message = error_message(indoc! {"
            perchance shall {
                proclaim(first_unknown);
            } otherwise {
                proclaim(second_unknown);
            }
        "});
        assert!(message.contains("first_unknown"));
    }

    #[test]
    fn range_bounds_must_be_ints() {
        assert!(error_message("for i in 1.0 ..< 9 { proclaim(i); }")
            .contains("Expected an int"));
    }

    #[test]
    fn for_each_infers_the_element_type() {
        analyze_source(indoc! {r#"
            for x in ["a", "b"] {
                thine y: string = x;
            }
        "#})
        .expect("element type should be string");
    }

    #[test]
    fn arguments_are_matched_by_name() {
        analyze_source("don f(n: int) -> int { return n; } f(n: 5);")
            .expect("matching argument name");
        assert!(error_message("don f(n: int) -> int { return n; } f(m: 5);")
            .contains("argument named `n`"));
        assert!(error_message("don f(n: int) -> int { return n; } f();")
            .contains("Expected 1 argument(s)"));
    }

    #[test]
    fn recursive_functions_resolve() {
        analyze_source(indoc! {"
            don factorial(num: int) -> int {
                perchance (num == 0) || (num == 1) {
                    return 1;
                }
                return num * factorial(num: num - 1);
            }
        "})
        .expect("recursion should resolve through the stub declaration");
    }

    #[test]
    fn initializer_must_cover_every_field() {
        let message = error_message(indoc! {"
            object Point {
                x: int;
                y: int;
                init(x: int) { mine.x = x; }
            }
        "});
        assert!(message.contains("Not all fields"));

        assert!(error_message(indoc! {"
            object Point {
                x: int;
                init(x: int) { mine.x = x; mine.x = x; }
            }
        "})
        .contains("more than once"));
    }

    #[test]
    fn duplicate_method_names_are_rejected() {
        assert!(error_message(indoc! {"
            object Circle {
                radius: float;
                init(radius: float) { mine.radius = radius; }
                don area() -> float { return mine.radius; }
                don area() -> float { return 0.0; }
            }
        "})
        .contains("Method `area` is already declared"));
    }

    #[test]
    fn methods_resolve_mine_and_fields() {
        analyze_source(indoc! {"
            object Circle {
                radius: float;
                init(radius: float) { mine.radius = radius; }
                don area() -> float { return π * mine.radius * mine.radius; }
            }
            thine c: Circle = Circle(radius: 2.0);
            proclaim(c.area());
        "})
        .expect("class with initializer and method");
    }

    #[test]
    fn mine_outside_an_object_fails() {
        assert!(error_message("proclaim(mine);").contains("outside of an object"));
    }

    #[test]
    fn member_access_requires_matching_optionality() {
        assert!(error_message(indoc! {"
            object Point { x: int; y: int; }
            thine p: Point? = some Point(x: 1, y: 2);
            proclaim(p.x);
        "})
        .contains("Expected an object"));

        analyze_source(indoc! {"
            object Point { x: int; y: int; }
            thine p: Point? = some Point(x: 1, y: 2);
            proclaim(p?.x);
        "})
        .expect("optional chaining on an optional object");
    }

    #[test]
    fn nil_coalescing_requires_an_optional_left_side() {
        analyze_source("thine x: int? = some 1; proclaim(x ?? 0);").expect("optional left");
        assert!(error_message("proclaim(1 ?? 0);").contains("Expected an optional"));
    }

    #[test]
    fn arithmetic_requires_matching_numeric_operands() {
        assert!(error_message("proclaim(1 + 1.0);").contains("different types"));
        assert!(error_message("proclaim(shall + shant);").contains("Expected a number"));
        analyze_source(r#"proclaim("a" + "b");"#).expect("string concatenation");
    }

    #[test]
    fn subscripts_accept_lists_and_strings() {
        analyze_source("thine xs: [int] = [1, 2]; proclaim(xs[0]);").unwrap();
        analyze_source(r#"thine s: string = "hi"; proclaim(s[0]);"#).unwrap();
        assert!(error_message("proclaim(1[0]);").contains("Expected a list or string"));
    }

    #[test]
    fn declaration_initializer_is_type_checked() {
        let program = analyze_source("thine x: int = 1 + 2;").unwrap();

        let ir::Stmt::VariableDeclaration { variable, initializer } = &program.statements[0]
        else {
            panic!("expected a declaration");
        };

        assert!(program.entities.variables[*variable].mutable);
        assert_eq!(program.entities.variables[*variable].ty, Type::Int);
        assert_eq!(initializer.ty(), Type::Int);

        assert!(error_message(r#"thine x: int = "nope";"#).contains("Cannot assign"));
    }

    #[test]
    fn standard_library_is_in_scope() {
        analyze_source("proclaim(sin(x: π));").expect("sin and π are ambient");
        analyze_source(r#"thine n: int = bytes(s: "howdy");"#).expect("bytes returns int");
    }
}
