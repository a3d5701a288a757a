use super::intern::InternedSymbol;
use crate::frontend::{
    SourceFile, SyntaxError,
    ast::{
        Argument, BinaryOperatorKind, Block, ElseTail, Expression, ExpressionKind,
        FieldDeclaration, FunctionDeclaration, Identifier, IfStatement, Initializer, MemberAccess,
        NodeId, Parameter, Program, Statement, StatementKind, StringSegment, Type, TypeKind,
        UnaryOperatorKind, VariableDeclaration,
    },
    lexer::{Keyword, Lexer, Span, Token, TokenKind},
};

#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    next_node_id: u32,
}

impl<'source> Parser<'source> {
    pub fn parse_program(source_file: &'source SourceFile) -> Result<Program, SyntaxError> {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
            next_node_id: 0,
        };

        let mut statements = Vec::new();

        while parser.lexer.peek()?.is_some() {
            statements.push(parser.parse_statement()?);
        }

        Ok(Program { statements })
    }

    fn create_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn error(&self, span: Span, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.lexer.source(), span, message)
    }

    fn end_of_file_span(&self) -> Span {
        let end = self.lexer.source().contents.len();
        Span::new(end.saturating_sub(1), end)
    }

    fn expect_next(&mut self, expecting: &str) -> Result<Token, SyntaxError> {
        self.lexer.next()?.ok_or_else(|| {
            self.error(
                self.end_of_file_span(),
                format!("Expected {expecting} but reached end of file"),
            )
        })
    }

    fn expect_peek(&mut self, expecting: &str) -> Result<Token, SyntaxError> {
        self.lexer.peek()?.ok_or_else(|| {
            self.error(
                self.end_of_file_span(),
                format!("Expected {expecting} but reached end of file"),
            )
        })
    }

    fn expect_next_to_be(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        let token = self.expect_next(&format!("{kind:?}"))?;

        if token.kind != kind {
            return Err(self.error(
                token.span,
                format!(
                    "Expected {:?} but found `{}`",
                    kind,
                    self.lexer.source().value_of_span(token.span)
                ),
            ));
        }

        Ok(token)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, SyntaxError> {
        self.expect_next_to_be(TokenKind::Keyword(keyword))
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind>, SyntaxError> {
        Ok(self.lexer.peek()?.map(|t| t.kind))
    }

    /// Consumes the next token if it has the given kind
    fn eat_if(&mut self, kind: TokenKind) -> Result<Option<Token>, SyntaxError> {
        if self.peek_kind()? == Some(kind) {
            return Ok(Some(self.lexer.next()?.unwrap()));
        }

        Ok(None)
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        let peeked = self.expect_peek("statement")?;

        match peeked.kind {
            TokenKind::Keyword(Keyword::Thine) => self.parse_variable_declaration(true),
            TokenKind::Keyword(Keyword::Fact) => self.parse_variable_declaration(false),
            TokenKind::Keyword(Keyword::Proclaim) => self.parse_print_statement(),
            TokenKind::Keyword(Keyword::Don) => {
                let function = Box::new(self.parse_function_declaration()?);

                Ok(Statement {
                    id: self.create_node_id(),
                    span: function.span,
                    kind: StatementKind::FunctionDeclaration(function),
                })
            }
            TokenKind::Keyword(Keyword::Object) => self.parse_object_declaration(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return_statement(),
            TokenKind::Keyword(Keyword::Perchance) => {
                let if_statement = self.parse_if_statement()?;

                Ok(Statement {
                    id: self.create_node_id(),
                    span: if_statement.span,
                    kind: StatementKind::If(Box::new(if_statement)),
                })
            }
            TokenKind::Keyword(Keyword::Whilst) => self.parse_while_statement(),
            TokenKind::Keyword(Keyword::Repeat) => self.parse_repeat_statement(),
            TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
            TokenKind::Keyword(Keyword::Cease) => {
                let keyword = self.expect_keyword(Keyword::Cease)?;
                let semi = self.expect_next_to_be(TokenKind::Semicolon)?;

                Ok(Statement {
                    id: self.create_node_id(),
                    span: keyword.span.to(semi.span),
                    kind: StatementKind::Break,
                })
            }
            TokenKind::Increment => self.parse_increment_statement(true),
            TokenKind::Decrement => self.parse_increment_statement(false),
            _ => self.parse_expression_or_assignment_statement(),
        }
    }

    /// thine x: int = 1;
    fn parse_variable_declaration(&mut self, mutable: bool) -> Result<Statement, SyntaxError> {
        let qualifier = self.expect_next("declaration qualifier")?;
        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        self.expect_next_to_be(TokenKind::Equals)?;
        let initializer = self.parse_expression()?;
        let semi = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(Statement {
            id: self.create_node_id(),
            span: qualifier.span.to(semi.span),
            kind: StatementKind::VariableDeclaration(Box::new(VariableDeclaration {
                mutable,
                name,
                ty,
                initializer,
            })),
        })
    }

    /// proclaim(e);
    fn parse_print_statement(&mut self) -> Result<Statement, SyntaxError> {
        let keyword = self.expect_keyword(Keyword::Proclaim)?;
        self.expect_next_to_be(TokenKind::OpenParen)?;
        let expression = self.parse_expression()?;
        self.expect_next_to_be(TokenKind::CloseParen)?;
        let semi = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(Statement {
            id: self.create_node_id(),
            span: keyword.span.to(semi.span),
            kind: StatementKind::Print(Box::new(expression)),
        })
    }

    /// don f(n: int) -> int { ... }
    fn parse_function_declaration(&mut self) -> Result<FunctionDeclaration, SyntaxError> {
        let keyword = self.expect_keyword(Keyword::Don)?;
        let name = self.parse_identifier()?;
        let parameters = self.parse_parameter_list()?;

        let return_type = if self.eat_if(TokenKind::Arrow)?.is_some() {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(FunctionDeclaration {
            id: self.create_node_id(),
            span: keyword.span.to(body.span),
            name,
            parameters,
            return_type,
            body,
        })
    }

    /// (n: int, label: string)
    fn parse_parameter_list(&mut self) -> Result<Vec<Parameter>, SyntaxError> {
        let mut parameters = Vec::new();

        self.expect_next_to_be(TokenKind::OpenParen)?;

        if self.peek_kind()? != Some(TokenKind::CloseParen) {
            parameters.push(self.parse_parameter()?);

            while self.eat_if(TokenKind::Comma)?.is_some() {
                parameters.push(self.parse_parameter()?);
            }
        }

        self.expect_next_to_be(TokenKind::CloseParen)?;

        Ok(parameters)
    }

    fn parse_parameter(&mut self) -> Result<Parameter, SyntaxError> {
        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::Colon)?;
        let ty = self.parse_type()?;

        Ok(Parameter {
            id: self.create_node_id(),
            span: name.span.to(ty.span),
            name,
            ty,
        })
    }

    /// object Name { field: type; ... init(...) { ... } don method() { ... } }
    fn parse_object_declaration(&mut self) -> Result<Statement, SyntaxError> {
        let keyword = self.expect_keyword(Keyword::Object)?;
        let name = self.parse_identifier()?;
        self.expect_next_to_be(TokenKind::OpenBrace)?;

        let mut fields = Vec::new();
        let mut initializer = None;
        let mut methods = Vec::new();

        loop {
            let peeked = self.expect_peek("field, initializer, method, or closing brace")?;

            match peeked.kind {
                TokenKind::CloseBrace => break,
                TokenKind::Keyword(Keyword::Init) => {
                    if initializer.is_some() {
                        return Err(
                            self.error(peeked.span, "Object type already has an initializer")
                        );
                    }

                    initializer = Some(self.parse_initializer()?);
                }
                TokenKind::Keyword(Keyword::Don) => {
                    methods.push(self.parse_function_declaration()?);
                }
                TokenKind::Identifier => {
                    let field_name = self.parse_identifier()?;
                    self.expect_next_to_be(TokenKind::Colon)?;
                    let ty = self.parse_type()?;
                    self.expect_next_to_be(TokenKind::Semicolon)?;

                    fields.push(FieldDeclaration {
                        id: self.create_node_id(),
                        span: field_name.span.to(ty.span),
                        name: field_name,
                        ty,
                    });
                }
                _ => {
                    return Err(self.error(
                        peeked.span,
                        format!(
                            "Expected field, initializer, or method but found `{}`",
                            self.lexer.source().value_of_span(peeked.span)
                        ),
                    ));
                }
            }
        }

        let close = self.expect_next_to_be(TokenKind::CloseBrace)?;

        Ok(Statement {
            id: self.create_node_id(),
            span: keyword.span.to(close.span),
            kind: StatementKind::ObjectDeclaration(Box::new(super::ast::ObjectDeclaration {
                id: self.create_node_id(),
                span: keyword.span.to(close.span),
                name,
                fields,
                initializer,
                methods,
            })),
        })
    }

    /// init(radius: float) { mine.radius = radius; }
    fn parse_initializer(&mut self) -> Result<Initializer, SyntaxError> {
        let keyword = self.expect_keyword(Keyword::Init)?;
        let parameters = self.parse_parameter_list()?;
        let body = self.parse_block()?;

        Ok(Initializer {
            id: self.create_node_id(),
            span: keyword.span.to(body.span),
            parameters,
            body,
        })
    }

    /// return e; or return;
    fn parse_return_statement(&mut self) -> Result<Statement, SyntaxError> {
        let keyword = self.expect_keyword(Keyword::Return)?;

        let expression = if self.peek_kind()? != Some(TokenKind::Semicolon) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        let semi = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(Statement {
            id: self.create_node_id(),
            span: keyword.span.to(semi.span),
            kind: StatementKind::Return(expression),
        })
    }

    /// perchance (c) { ... } otherwise perchance (d) { ... } otherwise { ... }
    fn parse_if_statement(&mut self) -> Result<IfStatement, SyntaxError> {
        let keyword = self.expect_keyword(Keyword::Perchance)?;
        let condition = Box::new(self.parse_expression()?);
        let consequence = self.parse_block()?;

        let mut span = keyword.span.to(consequence.span);

        let alternate = if self.eat_if(TokenKind::Keyword(Keyword::Otherwise))?.is_some() {
            if self.peek_kind()? == Some(TokenKind::Keyword(Keyword::Perchance)) {
                let tail = self.parse_if_statement()?;
                span = span.to(tail.span);
                Some(ElseTail::If(Box::new(tail)))
            } else {
                let block = self.parse_block()?;
                span = span.to(block.span);
                Some(ElseTail::Block(block))
            }
        } else {
            None
        };

        Ok(IfStatement {
            span,
            condition,
            consequence,
            alternate,
        })
    }

    /// whilst c { ... }
    fn parse_while_statement(&mut self) -> Result<Statement, SyntaxError> {
        let keyword = self.expect_keyword(Keyword::Whilst)?;
        let condition = Box::new(self.parse_expression()?);
        let body = self.parse_block()?;

        Ok(Statement {
            id: self.create_node_id(),
            span: keyword.span.to(body.span),
            kind: StatementKind::While { condition, body },
        })
    }

    /// repeat n { ... }
    fn parse_repeat_statement(&mut self) -> Result<Statement, SyntaxError> {
        let keyword = self.expect_keyword(Keyword::Repeat)?;
        let count = Box::new(self.parse_expression()?);
        let body = self.parse_block()?;

        Ok(Statement {
            id: self.create_node_id(),
            span: keyword.span.to(body.span),
            kind: StatementKind::Repeat { count, body },
        })
    }

    /// for i in a ..< b { ... } or for x in xs { ... }
    fn parse_for_statement(&mut self) -> Result<Statement, SyntaxError> {
        let keyword = self.expect_keyword(Keyword::For)?;
        let iterator = self.parse_identifier()?;
        self.expect_keyword(Keyword::In)?;
        let first = self.parse_expression()?;

        let peeked = self.peek_kind()?;
        if let Some(op @ (TokenKind::DotDotLess | TokenKind::Ellipsis)) = peeked {
            self.lexer.next()?;
            let end = Box::new(self.parse_expression()?);
            let body = self.parse_block()?;

            return Ok(Statement {
                id: self.create_node_id(),
                span: keyword.span.to(body.span),
                kind: StatementKind::ForRange {
                    iterator,
                    start: Box::new(first),
                    inclusive: op == TokenKind::Ellipsis,
                    end,
                    body,
                },
            });
        }

        let body = self.parse_block()?;

        Ok(Statement {
            id: self.create_node_id(),
            span: keyword.span.to(body.span),
            kind: StatementKind::ForEach {
                iterator,
                collection: Box::new(first),
                body,
            },
        })
    }

    /// ++x; or --x;
    fn parse_increment_statement(&mut self, increment: bool) -> Result<Statement, SyntaxError> {
        let operator = self.expect_next("increment or decrement operator")?;
        let target = self.parse_postfix_expression()?;
        let semi = self.expect_next_to_be(TokenKind::Semicolon)?;

        let kind = if increment {
            StatementKind::Increment(Box::new(target))
        } else {
            StatementKind::Decrement(Box::new(target))
        };

        Ok(Statement {
            id: self.create_node_id(),
            span: operator.span.to(semi.span),
            kind,
        })
    }

    /// Either `target = source;` or a bare call like `f(n: 5);`
    fn parse_expression_or_assignment_statement(&mut self) -> Result<Statement, SyntaxError> {
        let expression = self.parse_expression()?;

        if self.eat_if(TokenKind::Equals)?.is_some() {
            let source = self.parse_expression()?;
            let semi = self.expect_next_to_be(TokenKind::Semicolon)?;

            return Ok(Statement {
                id: self.create_node_id(),
                span: expression.span.to(semi.span),
                kind: StatementKind::Assignment {
                    target: Box::new(expression),
                    source: Box::new(source),
                },
            });
        }

        let semi = self.expect_next_to_be(TokenKind::Semicolon)?;

        Ok(Statement {
            id: self.create_node_id(),
            span: expression.span.to(semi.span),
            kind: StatementKind::Expression(Box::new(expression)),
        })
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        let open = self.expect_next_to_be(TokenKind::OpenBrace)?;

        let mut statements = Vec::new();

        while self.expect_peek("statement or closing brace")?.kind != TokenKind::CloseBrace {
            statements.push(self.parse_statement()?);
        }

        let close = self.expect_next_to_be(TokenKind::CloseBrace)?;

        Ok(Block {
            id: self.create_node_id(),
            span: open.span.to(close.span),
            statements,
        })
    }

    fn parse_identifier(&mut self) -> Result<Identifier, SyntaxError> {
        let token = self.expect_next_to_be(TokenKind::Identifier)?;

        Ok(Identifier {
            id: self.create_node_id(),
            span: token.span,
            symbol: InternedSymbol::new(self.lexer.source().value_of_span(token.span)),
        })
    }

    /// type = "[" type "]" | "(" type ("," type)* ")" "->" type | NAME,
    /// optionally suffixed with "?"
    fn parse_type(&mut self) -> Result<Type, SyntaxError> {
        let peeked = self.expect_peek("type")?;

        let mut ty = match peeked.kind {
            TokenKind::OpenBracket => {
                let open = self.expect_next_to_be(TokenKind::OpenBracket)?;
                let element = self.parse_type()?;
                let close = self.expect_next_to_be(TokenKind::CloseBracket)?;

                Type {
                    id: self.create_node_id(),
                    span: open.span.to(close.span),
                    kind: TypeKind::List(Box::new(element)),
                }
            }
            TokenKind::OpenParen => {
                let open = self.expect_next_to_be(TokenKind::OpenParen)?;
                let mut parameters = Vec::new();

                if self.peek_kind()? != Some(TokenKind::CloseParen) {
                    parameters.push(self.parse_type()?);

                    while self.eat_if(TokenKind::Comma)?.is_some() {
                        parameters.push(self.parse_type()?);
                    }
                }

                self.expect_next_to_be(TokenKind::CloseParen)?;
                self.expect_next_to_be(TokenKind::Arrow)?;
                let return_type = self.parse_type()?;

                Type {
                    id: self.create_node_id(),
                    span: open.span.to(return_type.span),
                    kind: TypeKind::Function {
                        parameters,
                        return_type: Box::new(return_type),
                    },
                }
            }
            TokenKind::Identifier => {
                let name = self.parse_identifier()?;

                Type {
                    id: self.create_node_id(),
                    span: name.span,
                    kind: TypeKind::Named(name),
                }
            }
            _ => {
                return Err(self.error(
                    peeked.span,
                    format!(
                        "Expected type but found `{}`",
                        self.lexer.source().value_of_span(peeked.span)
                    ),
                ));
            }
        };

        while let Some(question) = self.eat_if(TokenKind::Question)? {
            ty = Type {
                id: self.create_node_id(),
                span: ty.span.to(question.span),
                kind: TypeKind::Optional(Box::new(ty)),
            };
        }

        Ok(ty)
    }

    pub fn parse_expression(&mut self) -> Result<Expression, SyntaxError> {
        self.parse_ternary_expression()
    }

    /// c ? a : b (right associative)
    fn parse_ternary_expression(&mut self) -> Result<Expression, SyntaxError> {
        let condition = self.parse_nil_coalescing_expression()?;

        if self.eat_if(TokenKind::Question)?.is_none() {
            return Ok(condition);
        }

        let consequence = self.parse_ternary_expression()?;
        self.expect_next_to_be(TokenKind::Colon)?;
        let alternate = self.parse_ternary_expression()?;

        Ok(Expression {
            id: self.create_node_id(),
            span: condition.span.to(alternate.span),
            kind: ExpressionKind::Ternary {
                condition: Box::new(condition),
                consequence: Box::new(consequence),
                alternate: Box::new(alternate),
            },
        })
    }

    /// a ?? b
    fn parse_nil_coalescing_expression(&mut self) -> Result<Expression, SyntaxError> {
        let mut left = self.parse_or_expression()?;

        while self.eat_if(TokenKind::DoubleQuestion)?.is_some() {
            let right = self.parse_or_expression()?;

            left = Expression {
                id: self.create_node_id(),
                span: left.span.to(right.span),
                kind: ExpressionKind::NilCoalescing {
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }

        Ok(left)
    }

    /// a || b || c (left fold)
    fn parse_or_expression(&mut self) -> Result<Expression, SyntaxError> {
        let mut left = self.parse_and_expression()?;

        while self.eat_if(TokenKind::LogicalOr)?.is_some() {
            let right = self.parse_and_expression()?;

            left = Expression {
                id: self.create_node_id(),
                span: left.span.to(right.span),
                kind: ExpressionKind::Binary {
                    operator: BinaryOperatorKind::LogicalOr,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
            };
        }

        Ok(left)
    }

    /// a && b && c (left fold)
    fn parse_and_expression(&mut self) -> Result<Expression, SyntaxError> {
        let mut left = self.parse_comparison_expression()?;

        while self.eat_if(TokenKind::LogicalAnd)?.is_some() {
            let right = self.parse_comparison_expression()?;

            left = Expression {
                id: self.create_node_id(),
                span: left.span.to(right.span),
                kind: ExpressionKind::Binary {
                    operator: BinaryOperatorKind::LogicalAnd,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
            };
        }

        Ok(left)
    }

    /// a < b, a == b, ... (non-associative)
    fn parse_comparison_expression(&mut self) -> Result<Expression, SyntaxError> {
        let left = self.parse_term_expression()?;

        let Some(peeked) = self.lexer.peek()? else {
            return Ok(left);
        };

        if !peeked.kind.is_comparison_operator() {
            return Ok(left);
        }

        self.lexer.next()?;

        let operator = match peeked.kind {
            TokenKind::DoubleEquals => BinaryOperatorKind::Equals,
            TokenKind::NotEquals => BinaryOperatorKind::NotEquals,
            TokenKind::LessThan => BinaryOperatorKind::LessThan,
            TokenKind::LessThanOrEqualTo => BinaryOperatorKind::LessThanOrEqualTo,
            TokenKind::GreaterThan => BinaryOperatorKind::GreaterThan,
            TokenKind::GreaterThanOrEqualTo => BinaryOperatorKind::GreaterThanOrEqualTo,
            _ => unreachable!(),
        };

        let right = self.parse_term_expression()?;

        Ok(Expression {
            id: self.create_node_id(),
            span: left.span.to(right.span),
            kind: ExpressionKind::Binary {
                operator,
                lhs: Box::new(left),
                rhs: Box::new(right),
            },
        })
    }

    /// a + b, a - b (left associative)
    fn parse_term_expression(&mut self) -> Result<Expression, SyntaxError> {
        let mut left = self.parse_factor_expression()?;

        while let Some(peeked) = self.lexer.peek()? {
            if !peeked.kind.is_term_operator() {
                break;
            }

            self.lexer.next()?;

            let operator = match peeked.kind {
                TokenKind::Plus => BinaryOperatorKind::Add,
                TokenKind::Minus => BinaryOperatorKind::Subtract,
                _ => unreachable!(),
            };

            let right = self.parse_factor_expression()?;

            left = Expression {
                id: self.create_node_id(),
                span: left.span.to(right.span),
                kind: ExpressionKind::Binary {
                    operator,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
            };
        }

        Ok(left)
    }

    /// a * b, a / b (left associative)
    fn parse_factor_expression(&mut self) -> Result<Expression, SyntaxError> {
        let mut left = self.parse_power_expression()?;

        while let Some(peeked) = self.lexer.peek()? {
            if !peeked.kind.is_factor_operator() {
                break;
            }

            self.lexer.next()?;

            let operator = match peeked.kind {
                TokenKind::Asterisk => BinaryOperatorKind::Multiply,
                TokenKind::Divide => BinaryOperatorKind::Divide,
                _ => unreachable!(),
            };

            let right = self.parse_power_expression()?;

            left = Expression {
                id: self.create_node_id(),
                span: left.span.to(right.span),
                kind: ExpressionKind::Binary {
                    operator,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
            };
        }

        Ok(left)
    }

    /// a ** b (right associative, binds tighter than * and /)
    fn parse_power_expression(&mut self) -> Result<Expression, SyntaxError> {
        let base = self.parse_unary_expression()?;

        if self.eat_if(TokenKind::DoubleAsterisk)?.is_none() {
            return Ok(base);
        }

        let exponent = self.parse_power_expression()?;

        Ok(Expression {
            id: self.create_node_id(),
            span: base.span.to(exponent.span),
            kind: ExpressionKind::Binary {
                operator: BinaryOperatorKind::Power,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            },
        })
    }

    /// -e, ne e, some e
    fn parse_unary_expression(&mut self) -> Result<Expression, SyntaxError> {
        let peeked = self.expect_peek("expression")?;

        let operator = match peeked.kind {
            TokenKind::Minus => UnaryOperatorKind::Negate,
            TokenKind::Keyword(Keyword::Ne) => UnaryOperatorKind::Not,
            TokenKind::Keyword(Keyword::Some) => UnaryOperatorKind::Some,
            _ => return self.parse_postfix_expression(),
        };

        self.lexer.next()?;
        let operand = self.parse_unary_expression()?;

        Ok(Expression {
            id: self.create_node_id(),
            span: peeked.span.to(operand.span),
            kind: ExpressionKind::Unary {
                operator,
                operand: Box::new(operand),
            },
        })
    }

    /// Calls, subscripts, and member accesses applied to a primary expression
    fn parse_postfix_expression(&mut self) -> Result<Expression, SyntaxError> {
        let mut expression = self.parse_primary_expression()?;

        loop {
            match self.peek_kind()? {
                Some(TokenKind::OpenParen) => {
                    self.expect_next_to_be(TokenKind::OpenParen)?;
                    let arguments = self.parse_argument_list()?;
                    let close = self.expect_next_to_be(TokenKind::CloseParen)?;

                    expression = Expression {
                        id: self.create_node_id(),
                        span: expression.span.to(close.span),
                        kind: ExpressionKind::Call {
                            callee: Box::new(expression),
                            arguments,
                        },
                    };
                }
                Some(TokenKind::OpenBracket) => {
                    self.expect_next_to_be(TokenKind::OpenBracket)?;
                    let index = self.parse_expression()?;
                    let close = self.expect_next_to_be(TokenKind::CloseBracket)?;

                    expression = Expression {
                        id: self.create_node_id(),
                        span: expression.span.to(close.span),
                        kind: ExpressionKind::Subscript {
                            collection: Box::new(expression),
                            index: Box::new(index),
                        },
                    };
                }
                Some(access @ (TokenKind::Dot | TokenKind::QuestionDot)) => {
                    self.lexer.next()?;
                    let field = self.parse_identifier()?;

                    expression = Expression {
                        id: self.create_node_id(),
                        span: expression.span.to(field.span),
                        kind: ExpressionKind::Member {
                            object: Box::new(expression),
                            access: if access == TokenKind::Dot {
                                MemberAccess::Direct
                            } else {
                                MemberAccess::Optional
                            },
                            field,
                        },
                    };
                }
                _ => break,
            }
        }

        Ok(expression)
    }

    /// name: value, name: value, ...
    fn parse_argument_list(&mut self) -> Result<Vec<Argument>, SyntaxError> {
        let mut arguments = Vec::new();

        if self.peek_kind()? == Some(TokenKind::CloseParen) {
            return Ok(arguments);
        }

        loop {
            let name = self.parse_identifier()?;
            self.expect_next_to_be(TokenKind::Colon)?;
            let value = self.parse_expression()?;

            arguments.push(Argument {
                span: name.span.to(value.span),
                name,
                value,
            });

            if self.eat_if(TokenKind::Comma)?.is_none() {
                break;
            }
        }

        Ok(arguments)
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, SyntaxError> {
        let peeked = self.expect_peek("expression")?;

        match peeked.kind {
            TokenKind::IntegerLiteral => {
                let token = self.lexer.next()?.unwrap();
                let text = self.lexer.source().value_of_span(token.span);

                let value = text.parse::<i64>().map_err(|_| {
                    self.error(token.span, format!("Integer literal `{text}` is too large"))
                })?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: token.span,
                    kind: ExpressionKind::Integer(value),
                })
            }
            TokenKind::FloatLiteral => {
                let token = self.lexer.next()?.unwrap();
                let text = self.lexer.source().value_of_span(token.span);

                let value = text.parse::<f64>().map_err(|_| {
                    self.error(token.span, format!("Invalid float literal `{text}`"))
                })?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: token.span,
                    kind: ExpressionKind::Float(value),
                })
            }
            TokenKind::BooleanLiteral => {
                let token = self.lexer.next()?.unwrap();
                let value = self.lexer.source().value_of_span(token.span) == "shall";

                Ok(Expression {
                    id: self.create_node_id(),
                    span: token.span,
                    kind: ExpressionKind::Boolean(value),
                })
            }
            TokenKind::StringLiteral => {
                let token = self.lexer.next()?.unwrap();
                self.parse_string_template(token)
            }
            TokenKind::Identifier => {
                let identifier = self.parse_identifier()?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: identifier.span,
                    kind: ExpressionKind::Identifier(identifier),
                })
            }
            TokenKind::Keyword(Keyword::Mine) => {
                let token = self.lexer.next()?.unwrap();

                Ok(Expression {
                    id: self.create_node_id(),
                    span: token.span,
                    kind: ExpressionKind::SelfReference,
                })
            }
            TokenKind::Keyword(Keyword::Naught) => {
                let token = self.lexer.next()?.unwrap();
                let ty = self.parse_type()?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: token.span.to(ty.span),
                    kind: ExpressionKind::EmptyOptional(Box::new(ty)),
                })
            }
            TokenKind::OpenParen => {
                self.expect_next_to_be(TokenKind::OpenParen)?;
                let inner = self.parse_expression()?;
                let close = self.expect_next_to_be(TokenKind::CloseParen)?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: peeked.span.to(close.span),
                    kind: ExpressionKind::Grouping(Box::new(inner)),
                })
            }
            TokenKind::OpenBracket => {
                self.expect_next_to_be(TokenKind::OpenBracket)?;

                if let Some(close) = self.eat_if(TokenKind::CloseBracket)? {
                    return Ok(Expression {
                        id: self.create_node_id(),
                        span: peeked.span.to(close.span),
                        kind: ExpressionKind::EmptyList,
                    });
                }

                let mut elements = vec![self.parse_expression()?];

                while self.eat_if(TokenKind::Comma)?.is_some() {
                    elements.push(self.parse_expression()?);
                }

                let close = self.expect_next_to_be(TokenKind::CloseBracket)?;

                Ok(Expression {
                    id: self.create_node_id(),
                    span: peeked.span.to(close.span),
                    kind: ExpressionKind::List(elements),
                })
            }
            _ => Err(self.error(
                peeked.span,
                format!(
                    "Expected expression but found `{}`",
                    self.lexer.source().value_of_span(peeked.span)
                ),
            )),
        }
    }

    /// Splits a string literal token into literal text and `${...}` segments.
    /// Embedded expressions are re-lexed in place so their spans stay absolute.
    fn parse_string_template(&mut self, token: Token) -> Result<Expression, SyntaxError> {
        let inner = Span::new(token.span.start + 1, token.span.end - 1);
        let text = self.lexer.source().value_of_span(inner);

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };

                    literal.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                '$' if chars.peek().is_some_and(|(_, c)| *c == '{') => {
                    chars.next();

                    let expression_start = inner.start + offset + 2;
                    let mut depth = 1usize;
                    let mut expression_end = None;

                    for (offset, c) in chars.by_ref() {
                        match c {
                            '{' => depth += 1,
                            '}' => {
                                depth -= 1;
                                if depth == 0 {
                                    expression_end = Some(inner.start + offset);
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }

                    let Some(expression_end) = expression_end else {
                        return Err(self.error(
                            token.span,
                            "Unterminated `${` interpolation in string literal",
                        ));
                    };

                    if !literal.is_empty() {
                        segments.push(StringSegment::Text(std::mem::take(&mut literal)));
                    }

                    let expression = self
                        .parse_expression_in_span(Span::new(expression_start, expression_end))?;
                    segments.push(StringSegment::Interpolation(expression));
                }
                c => literal.push(c),
            }
        }

        if !literal.is_empty() || segments.is_empty() {
            segments.push(StringSegment::Text(literal));
        }

        Ok(Expression {
            id: self.create_node_id(),
            span: token.span,
            kind: ExpressionKind::StringTemplate(segments),
        })
    }

    fn parse_expression_in_span(&mut self, span: Span) -> Result<Expression, SyntaxError> {
        let mut parser = Parser {
            lexer: Lexer::new_in_range(self.lexer.source(), span),
            next_node_id: self.next_node_id,
        };

        let expression = parser.parse_expression()?;

        if let Some(trailing) = parser.lexer.peek()? {
            return Err(self.error(
                trailing.span,
                format!(
                    "Unexpected `{}` after interpolated expression",
                    self.lexer.source().value_of_span(trailing.span)
                ),
            ));
        }

        self.next_node_id = parser.next_node_id;

        Ok(expression)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn parse(source: &str) -> Result<Program, SyntaxError> {
        let source = SourceFile::new_in_memory(source);
        Parser::parse_program(&source)
    }

    #[test]
    fn parses_the_factorial_sample() {
        let program = parse(indoc! {r#"
            thine x: string = "hello";
            proclaim("Good morrow, ${x} fair world!");

            don factorial(num: int) -> int {
                perchance ((num == 0) || (num == 1)) {
                    return 1;
                }
                return num * factorial(num: num - 1);
            }

            proclaim(factorial(num: 5));
        "#})
        .expect("sample program should parse");

        assert_eq!(program.statements.len(), 4);
        assert!(matches!(
            program.statements[2].kind,
            StatementKind::FunctionDeclaration(_)
        ));
    }

    #[test]
    fn parses_object_declarations() {
        let program = parse(indoc! {r#"
            object Point { x: int; y: int; }
            object Circle {
                radius: float;
                init(radius: float) { mine.radius = radius; }
                don area() -> float { return π * mine.radius ** 2.0; }
            }
        "#})
        .expect("object declarations should parse");

        let StatementKind::ObjectDeclaration(point) = &program.statements[0].kind else {
            panic!("expected an object declaration");
        };
        assert_eq!(point.fields.len(), 2);
        assert!(point.initializer.is_none());

        let StatementKind::ObjectDeclaration(circle) = &program.statements[1].kind else {
            panic!("expected an object declaration");
        };
        assert!(circle.initializer.is_some());
        assert_eq!(circle.methods.len(), 1);
    }

    #[test]
    fn parses_loop_forms() {
        let program = parse(indoc! {r#"
            whilst shall { cease; }
            repeat 3 { proclaim(1); }
            for i in 1 ..< 10 { proclaim(i); }
            for i in 1 ... 10 { proclaim(i); }
            for x in [1, 2, 3] { proclaim(x); }
        "#})
        .expect("loops should parse");

        assert!(matches!(
            program.statements[2].kind,
            StatementKind::ForRange {
                inclusive: false,
                ..
            }
        ));
        assert!(matches!(
            program.statements[3].kind,
            StatementKind::ForRange {
                inclusive: true,
                ..
            }
        ));
        assert!(matches!(
            program.statements[4].kind,
            StatementKind::ForEach { .. }
        ));
    }

    #[test]
    fn interpolation_splits_into_segments() {
        let program = parse(r#"proclaim("ab ${1 + 2} cd");"#).unwrap();

        let StatementKind::Print(expression) = &program.statements[0].kind else {
            panic!("expected a print statement");
        };
        let ExpressionKind::StringTemplate(segments) = &expression.kind else {
            panic!("expected a string template");
        };

        assert_eq!(segments.len(), 3);
        assert!(matches!(&segments[0], StringSegment::Text(t) if t == "ab "));
        assert!(matches!(&segments[1], StringSegment::Interpolation(_)));
        assert!(matches!(&segments[2], StringSegment::Text(t) if t == " cd"));
    }

    #[test]
    fn power_is_right_associative() {
        let program = parse("thine x: int = 2 ** 3 ** 2;").unwrap();

        let StatementKind::VariableDeclaration(declaration) = &program.statements[0].kind else {
            panic!("expected a declaration");
        };
        let ExpressionKind::Binary { operator, rhs, .. } = &declaration.initializer.kind else {
            panic!("expected a binary expression");
        };

        assert_eq!(*operator, BinaryOperatorKind::Power);
        assert!(matches!(rhs.kind, ExpressionKind::Binary { .. }));
    }

    #[test]
    fn rejects_unnamed_call_arguments() {
        assert!(parse("f(5);").is_err());
    }

    #[test]
    fn rejects_missing_semicolon() {
        assert!(parse("thine x: int = 1").is_err());
    }

    #[test]
    fn reports_error_location() {
        let error = parse("thine x: int = ;").unwrap_err();
        assert_eq!(error.line, 1);
        assert_eq!(error.column, 16);
    }
}
