use crate::{
    frontend::ast::{BinaryOperatorKind, UnaryOperatorKind},
    middle::{
        ir::{Expr, IfTail, Program, Stmt, StringPiece},
        ty::Type,
    },
};

/// Rewrites a checked program into an equivalent, simpler one: constant
/// folding, algebraic identities, and dead branch removal. The pass is total
/// and idempotent; anything it does not understand passes through unchanged.
pub fn optimize(mut program: Program) -> Program {
    for id in program.entities.functions.indices() {
        let body = std::mem::take(&mut program.entities.functions[id].body);
        program.entities.functions[id].body = optimize_statements(body);
    }

    program.statements = optimize_statements(program.statements);
    program
}

fn optimize_statements(statements: Vec<Stmt>) -> Vec<Stmt> {
    statements.into_iter().flat_map(optimize_statement).collect()
}

/// A statement may simplify to zero, one, or several statements
fn optimize_statement(statement: Stmt) -> Vec<Stmt> {
    match statement {
        Stmt::VariableDeclaration {
            variable,
            initializer,
        } => vec![Stmt::VariableDeclaration {
            variable,
            initializer: optimize_expression(initializer),
        }],
        Stmt::Print(expression) => vec![Stmt::Print(optimize_expression(expression))],
        Stmt::Assignment { target, source } => {
            let target = optimize_expression(target);
            let source = optimize_expression(source);

            // Assigning an lvalue to itself does nothing
            if target == source {
                return Vec::new();
            }

            vec![Stmt::Assignment { target, source }]
        }
        Stmt::Return(expression) => vec![Stmt::Return(optimize_expression(expression))],
        Stmt::If {
            condition,
            consequence,
            alternate,
        } => optimize_if(condition, consequence, alternate),
        Stmt::While { condition, body } => {
            let condition = optimize_expression(condition);

            if matches!(condition, Expr::Boolean(false)) {
                return Vec::new();
            }

            vec![Stmt::While {
                condition,
                body: optimize_statements(body),
            }]
        }
        Stmt::Repeat { count, body } => {
            let count = optimize_expression(count);

            if matches!(count, Expr::Int(0)) {
                return Vec::new();
            }

            vec![Stmt::Repeat {
                count,
                body: optimize_statements(body),
            }]
        }
        Stmt::ForRange {
            iterator,
            start,
            inclusive,
            end,
            body,
        } => {
            let start = optimize_expression(start);
            let end = optimize_expression(end);

            if let (Expr::Int(low), Expr::Int(high)) = (&start, &end) {
                let empty = if inclusive { low > high } else { low >= high };

                if empty {
                    return Vec::new();
                }
            }

            vec![Stmt::ForRange {
                iterator,
                start,
                inclusive,
                end,
                body: optimize_statements(body),
            }]
        }
        Stmt::ForEach {
            iterator,
            collection,
            body,
        } => {
            let collection = optimize_expression(collection);

            let empty = matches!(&collection, Expr::EmptyList { .. })
                || matches!(&collection, Expr::List { elements, .. } if elements.is_empty());

            if empty {
                return Vec::new();
            }

            vec![Stmt::ForEach {
                iterator,
                collection,
                body: optimize_statements(body),
            }]
        }
        Stmt::ClassDeclaration {
            object,
            constructor_parameters,
            initializer,
            methods,
        } => vec![Stmt::ClassDeclaration {
            object,
            constructor_parameters,
            initializer: optimize_statements(initializer),
            methods,
        }],
        Stmt::Increment(target) => vec![Stmt::Increment(optimize_expression(target))],
        Stmt::Decrement(target) => vec![Stmt::Decrement(optimize_expression(target))],
        Stmt::Call(expression) => vec![Stmt::Call(optimize_expression(expression))],
        other @ (Stmt::FunctionDeclaration(_)
        | Stmt::StructDeclaration(_)
        | Stmt::ShortReturn
        | Stmt::Break) => vec![other],
    }
}

fn optimize_if(condition: Expr, consequence: Vec<Stmt>, alternate: IfTail) -> Vec<Stmt> {
    let condition = optimize_expression(condition);

    match condition {
        Expr::Boolean(true) => optimize_statements(consequence),
        Expr::Boolean(false) => match alternate {
            IfTail::None => Vec::new(),
            IfTail::Else(statements) => optimize_statements(statements),
            IfTail::ElseIf(tail) => optimize_statement(*tail),
        },
        condition => {
            let alternate = match alternate {
                IfTail::None => IfTail::None,
                IfTail::Else(statements) => {
                    let statements = optimize_statements(statements);

                    if statements.is_empty() {
                        IfTail::None
                    } else {
                        IfTail::Else(statements)
                    }
                }
                IfTail::ElseIf(tail) => {
                    // The tail may fold away or flatten into plain statements
                    let mut statements = optimize_statement(*tail);

                    match statements.len() {
                        0 => IfTail::None,
                        1 if matches!(statements[0], Stmt::If { .. }) => {
                            IfTail::ElseIf(Box::new(statements.remove(0)))
                        }
                        _ => IfTail::Else(statements),
                    }
                }
            };

            vec![Stmt::If {
                condition,
                consequence: optimize_statements(consequence),
                alternate,
            }]
        }
    }
}

fn optimize_expression(expression: Expr) -> Expr {
    match expression {
        Expr::StringTemplate(pieces) => Expr::StringTemplate(
            pieces
                .into_iter()
                .map(|piece| match piece {
                    StringPiece::Text(text) => StringPiece::Text(text),
                    StringPiece::Interpolation(inner) => {
                        StringPiece::Interpolation(optimize_expression(inner))
                    }
                })
                .collect(),
        ),
        Expr::Binary {
            operator,
            lhs,
            rhs,
            ty,
        } => optimize_binary(operator, optimize_expression(*lhs), optimize_expression(*rhs), ty),
        Expr::Unary {
            operator,
            operand,
            ty,
        } => optimize_unary(operator, optimize_expression(*operand), ty),
        Expr::Ternary {
            condition,
            consequence,
            alternate,
            ty,
        } => {
            let condition = optimize_expression(*condition);

            match condition {
                Expr::Boolean(true) => optimize_expression(*consequence),
                Expr::Boolean(false) => optimize_expression(*alternate),
                condition => Expr::Ternary {
                    condition: Box::new(condition),
                    consequence: Box::new(optimize_expression(*consequence)),
                    alternate: Box::new(optimize_expression(*alternate)),
                    ty,
                },
            }
        }
        Expr::NilCoalescing { left, right, ty } => {
            let left = optimize_expression(*left);
            let right = optimize_expression(*right);

            match left {
                // A statically empty optional always falls through
                Expr::EmptyOptional(_) => right,
                // A statically present optional never does
                left @ Expr::Unary {
                    operator: UnaryOperatorKind::Some,
                    ..
                } => left,
                left => Expr::NilCoalescing {
                    left: Box::new(left),
                    right: Box::new(right),
                    ty,
                },
            }
        }
        Expr::Subscript {
            collection,
            index,
            ty,
        } => Expr::Subscript {
            collection: Box::new(optimize_expression(*collection)),
            index: Box::new(optimize_expression(*index)),
            ty,
        },
        Expr::List { elements, ty } => Expr::List {
            elements: elements.into_iter().map(optimize_expression).collect(),
            ty,
        },
        Expr::Call {
            function,
            receiver,
            arguments,
            ty,
        } => Expr::Call {
            function,
            receiver: receiver.map(|receiver| Box::new(optimize_expression(*receiver))),
            arguments: arguments.into_iter().map(optimize_expression).collect(),
            ty,
        },
        Expr::New { object, arguments } => Expr::New {
            object,
            arguments: arguments.into_iter().map(optimize_expression).collect(),
        },
        other @ (Expr::Int(_)
        | Expr::Float(_)
        | Expr::Boolean(_)
        | Expr::EmptyOptional(_)
        | Expr::EmptyList { .. }
        | Expr::Variable { .. }
        | Expr::FunctionReference { .. }
        | Expr::SelfReference { .. }
        | Expr::Member { .. }) => other,
    }
}

fn optimize_binary(operator: BinaryOperatorKind, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
    use BinaryOperatorKind::*;

    if let Some(folded) = fold_literals(operator, &lhs, &rhs) {
        return folded;
    }

    match (operator, &lhs, &rhs) {
        (Add, lhs_value, _) if is_zero(lhs_value) => rhs,
        (Add, _, rhs_value) if is_zero(rhs_value) => lhs,
        (Subtract, _, rhs_value) if is_zero(rhs_value) => lhs,
        (Subtract, lhs_value, _) if is_zero(lhs_value) => Expr::Unary {
            operator: UnaryOperatorKind::Negate,
            operand: Box::new(rhs),
            ty,
        },
        (Multiply, lhs_value, _) if is_one(lhs_value) => rhs,
        (Multiply, _, rhs_value) if is_one(rhs_value) => lhs,
        (Multiply, lhs_value, _) if is_zero(lhs_value) => lhs,
        (Multiply, _, rhs_value) if is_zero(rhs_value) => rhs,
        (Divide, _, rhs_value) if is_one(rhs_value) => lhs,
        (Divide, lhs_value, _) if is_zero(lhs_value) => lhs,
        (Power, _, Expr::Int(0)) if ty == Type::Int => Expr::Int(1),
        (Power, _, rhs_value) if is_zero(rhs_value) && ty == Type::Float => Expr::Float(1.0),

        (LogicalAnd, Expr::Boolean(true), _) => rhs,
        (LogicalAnd, _, Expr::Boolean(true)) => lhs,
        (LogicalAnd, Expr::Boolean(false), _) => Expr::Boolean(false),
        (LogicalOr, Expr::Boolean(false), _) => rhs,
        (LogicalOr, _, Expr::Boolean(false)) => lhs,
        (LogicalOr, Expr::Boolean(true), _) => Expr::Boolean(true),

        _ => Expr::Binary {
            operator,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        },
    }
}

/// Folds an operator over two literal operands. Returns `None` when the
/// operands are not literals or the result is not representable (overflow,
/// division by zero), leaving the node for the runtime to evaluate.
fn fold_literals(operator: BinaryOperatorKind, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    use BinaryOperatorKind::*;

    match (lhs, rhs) {
        (Expr::Int(a), Expr::Int(b)) => {
            let (a, b) = (*a, *b);

            match operator {
                Add => a.checked_add(b).map(Expr::Int),
                Subtract => a.checked_sub(b).map(Expr::Int),
                Multiply => a.checked_mul(b).map(Expr::Int),
                Divide => (b != 0).then(|| a.checked_div(b)).flatten().map(Expr::Int),
                Power => u32::try_from(b)
                    .ok()
                    .and_then(|b| a.checked_pow(b))
                    .map(Expr::Int),
                Equals => Some(Expr::Boolean(a == b)),
                NotEquals => Some(Expr::Boolean(a != b)),
                LessThan => Some(Expr::Boolean(a < b)),
                LessThanOrEqualTo => Some(Expr::Boolean(a <= b)),
                GreaterThan => Some(Expr::Boolean(a > b)),
                GreaterThanOrEqualTo => Some(Expr::Boolean(a >= b)),
                LogicalAnd | LogicalOr => None,
            }
        }
        (Expr::Float(a), Expr::Float(b)) => {
            let (a, b) = (*a, *b);

            match operator {
                Add => Some(Expr::Float(a + b)),
                Subtract => Some(Expr::Float(a - b)),
                Multiply => Some(Expr::Float(a * b)),
                Divide => Some(Expr::Float(a / b)),
                Power => Some(Expr::Float(a.powf(b))),
                Equals => Some(Expr::Boolean(a == b)),
                NotEquals => Some(Expr::Boolean(a != b)),
                LessThan => Some(Expr::Boolean(a < b)),
                LessThanOrEqualTo => Some(Expr::Boolean(a <= b)),
                GreaterThan => Some(Expr::Boolean(a > b)),
                GreaterThanOrEqualTo => Some(Expr::Boolean(a >= b)),
                LogicalAnd | LogicalOr => None,
            }
        }
        (Expr::Boolean(a), Expr::Boolean(b)) => match operator {
            Equals => Some(Expr::Boolean(a == b)),
            NotEquals => Some(Expr::Boolean(a != b)),
            LogicalAnd => Some(Expr::Boolean(*a && *b)),
            LogicalOr => Some(Expr::Boolean(*a || *b)),
            _ => None,
        },
        _ => None,
    }
}

fn optimize_unary(operator: UnaryOperatorKind, operand: Expr, ty: Type) -> Expr {
    match (operator, &operand) {
        (UnaryOperatorKind::Negate, Expr::Int(value)) => {
            match value.checked_neg() {
                Some(negated) => Expr::Int(negated),
                None => Expr::Unary {
                    operator,
                    operand: Box::new(operand),
                    ty,
                },
            }
        }
        (UnaryOperatorKind::Negate, Expr::Float(value)) => Expr::Float(-value),
        (UnaryOperatorKind::Not, Expr::Boolean(value)) => Expr::Boolean(!value),
        _ => Expr::Unary {
            operator,
            operand: Box::new(operand),
            ty,
        },
    }
}

fn is_zero(expr: &Expr) -> bool {
    matches!(expr, Expr::Int(0)) || matches!(expr, Expr::Float(value) if *value == 0.0)
}

fn is_one(expr: &Expr) -> bool {
    matches!(expr, Expr::Int(1)) || matches!(expr, Expr::Float(value) if *value == 1.0)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        frontend::{SourceFile, parser::Parser},
        middle::analyze,
    };

    fn compile(source: &str) -> Program {
        let source = SourceFile::new_in_memory(source);
        let program = Parser::parse_program(&source).expect("test programs should parse");
        let program = analyze::analyze(&source, &program).expect("test programs should check");
        optimize(program)
    }

    fn initializer_of(program: &Program, index: usize) -> &Expr {
        let Stmt::VariableDeclaration { initializer, .. } = &program.statements[index] else {
            panic!("expected a declaration");
        };
        initializer
    }

    #[test]
    fn folds_integer_arithmetic() {
        let program = compile("thine x: int = 1 + 2;");
        assert_eq!(*initializer_of(&program, 0), Expr::Int(3));

        let program = compile("thine x: int = 2 ** 10;");
        assert_eq!(*initializer_of(&program, 0), Expr::Int(1024));

        let program = compile("thine x: bool = 3 < 4;");
        assert_eq!(*initializer_of(&program, 0), Expr::Boolean(true));
    }

    #[test]
    fn leaves_division_by_zero_for_the_runtime() {
        let program = compile("thine x: int = 1 / 0;");
        assert!(matches!(initializer_of(&program, 0), Expr::Binary { .. }));
    }

    #[test]
    fn applies_algebraic_identities() {
        let program = compile("thine x: int = 7; thine y: int = x * 1;");
        assert!(matches!(initializer_of(&program, 1), Expr::Variable { .. }));

        let program = compile("thine x: int = 7; thine y: int = x + 0;");
        assert!(matches!(initializer_of(&program, 1), Expr::Variable { .. }));

        let program = compile("thine x: int = 7; thine y: int = 0 - x;");
        assert!(matches!(
            initializer_of(&program, 1),
            Expr::Unary {
                operator: UnaryOperatorKind::Negate,
                ..
            }
        ));

        let program = compile("thine x: int = 7; thine y: int = x ** 0;");
        assert_eq!(*initializer_of(&program, 1), Expr::Int(1));
    }

    #[test]
    fn short_circuits_boolean_operators() {
        let program = compile("thine b: bool = shant; thine c: bool = shall && b;");
        assert!(matches!(initializer_of(&program, 1), Expr::Variable { .. }));

        let program = compile("thine b: bool = shant; thine c: bool = shall || b;");
        assert_eq!(*initializer_of(&program, 1), Expr::Boolean(true));
    }

    #[test]
    fn eliminates_dead_branches() {
        let program = compile(indoc! {"
            perchance shant {
                proclaim(1);
            } otherwise {
                proclaim(2);
            }
        "});

        assert_eq!(program.statements.len(), 1);
        assert!(matches!(program.statements[0], Stmt::Print(_)));

        let program = compile("whilst shant { proclaim(1); }");
        assert!(program.statements.is_empty());

        let program = compile("repeat 0 { proclaim(1); }");
        assert!(program.statements.is_empty());

        let program = compile("for i in 9 ..< 1 { proclaim(i); }");
        assert!(program.statements.is_empty());

        let program = compile("for i in 1 ... 1 { proclaim(i); }");
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn eliminates_self_assignments() {
        let program = compile("thine x: int = 1; x = x; ++x;");

        assert_eq!(program.statements.len(), 2);
        assert!(matches!(program.statements[1], Stmt::Increment(_)));
    }

    #[test]
    fn folds_inside_increment_targets() {
        let program = compile("thine xs: [int] = [1, 2, 3]; ++xs[1 + 1];");

        let Stmt::Increment(target) = &program.statements[1] else {
            panic!("expected an increment");
        };
        let Expr::Subscript { index, .. } = target else {
            panic!("expected a subscript target");
        };
        assert_eq!(**index, Expr::Int(2));
    }

    #[test]
    fn folds_ternary_and_nil_coalescing() {
        let program = compile("thine x: int = shall ? 1 : 2;");
        assert_eq!(*initializer_of(&program, 0), Expr::Int(1));

        let program = compile("thine x: int? = naught int; proclaim((naught int) ?? 5);");
        let Stmt::Print(expression) = &program.statements[1] else {
            panic!("expected a print statement");
        };
        assert_eq!(*expression, Expr::Int(5));

        let program = compile("proclaim((some 5) ?? 0);");
        let Stmt::Print(expression) = &program.statements[0] else {
            panic!("expected a print statement");
        };
        assert!(matches!(
            expression,
            Expr::Unary {
                operator: UnaryOperatorKind::Some,
                ..
            }
        ));
    }

    #[test]
    fn optimizes_function_bodies_in_place() {
        let program = compile(indoc! {"
            don f() -> int {
                return 2 + 3;
            }
        "});

        let Stmt::FunctionDeclaration(id) = program.statements[0] else {
            panic!("expected a function declaration");
        };
        assert_eq!(
            program.entities.functions[id].body,
            vec![Stmt::Return(Expr::Int(5))]
        );
    }

    #[test]
    fn optimization_is_idempotent() {
        let program = compile(indoc! {"
            thine x: int = 1 + 2 * 3;
            perchance shall { proclaim(x * 1); }
            repeat 2 { proclaim(0 + x); }
            don f(n: int) -> int { return n ** 1 - 0; }
            proclaim(f(n: x));
        "});

        assert_eq!(optimize(program.clone()), program);
    }
}
