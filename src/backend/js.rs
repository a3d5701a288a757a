use hashbrown::HashMap;
use itertools::Itertools;

use crate::middle::{
    ir::{Entities, Expr, FunctionId, IfTail, Program, Stmt, StringPiece, VariableId},
    ty::ObjectId,
};
use crate::frontend::ast::{BinaryOperatorKind, UnaryOperatorKind};

/// Emits JavaScript for a checked and optimized program. Every declared
/// entity gets a fresh suffixed name so that shadowed source names never
/// collide in the flat output.
pub fn generate(program: &Program) -> String {
    let mut generator = JsGenerator {
        entities: &program.entities,
        output: Vec::new(),
        names: HashMap::new(),
        next_name: 0,
    };

    for statement in &program.statements {
        generator.statement(statement);
    }

    generator.output.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Entity {
    Variable(VariableId),
    Function(FunctionId),
    Object(ObjectId),
}

struct JsGenerator<'a> {
    entities: &'a Entities,
    output: Vec<String>,
    names: HashMap<Entity, usize>,
    next_name: usize,
}

impl JsGenerator<'_> {
    fn push(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    fn target_name(&mut self, entity: Entity) -> String {
        let name = match entity {
            Entity::Variable(id) => self.entities.variables[id].name,
            Entity::Function(id) => self.entities.functions[id].name,
            Entity::Object(id) => self.entities.objects[id].name,
        };

        let number = match self.names.get(&entity) {
            Some(number) => *number,
            None => {
                self.next_name += 1;
                self.names.insert(entity, self.next_name);
                self.next_name
            }
        };

        format!("{name}_{number}")
    }

    /// A generated-only name with no source entity, e.g. repeat loop counters
    fn fresh_name(&mut self, name: &str) -> String {
        self.next_name += 1;
        format!("{name}_{}", self.next_name)
    }

    /* Statements */

    fn statement(&mut self, statement: &Stmt) {
        match statement {
            Stmt::VariableDeclaration {
                variable,
                initializer,
            } => {
                // const vs. let does not matter here; assignment to constants
                // was already rejected during checking
                let name = self.target_name(Entity::Variable(*variable));
                let initializer = self.expression(initializer);
                self.push(format!("let {name} = {initializer};"));
            }
            Stmt::Print(expression) => {
                let expression = self.expression(expression);
                self.push(format!("console.log({expression});"));
            }
            Stmt::FunctionDeclaration(id) => self.function(*id),
            Stmt::StructDeclaration(id) => {
                let class_name = self.target_name(Entity::Object(*id));
                self.push(format!("class {class_name} {{"));
                self.field_constructor(*id);
                self.push("}");
            }
            Stmt::ClassDeclaration {
                object,
                constructor_parameters,
                initializer,
                methods,
            } => {
                let class_name = self.target_name(Entity::Object(*object));
                self.push(format!("class {class_name} {{"));

                if constructor_parameters.is_empty() && initializer.is_empty() {
                    self.field_constructor(*object);
                } else {
                    let parameters = constructor_parameters
                        .iter()
                        .map(|parameter| self.target_name(Entity::Variable(*parameter)))
                        .join(", ");

                    self.push(format!("constructor({parameters}) {{"));
                    for statement in initializer {
                        self.statement(statement);
                    }
                    self.push("}");
                }

                for method in methods {
                    self.function(*method);
                }

                self.push("}");
            }
            Stmt::Increment(target) => {
                let target = self.expression(target);
                self.push(format!("{target}++;"));
            }
            Stmt::Decrement(target) => {
                let target = self.expression(target);
                self.push(format!("{target}--;"));
            }
            Stmt::Assignment { target, source } => {
                let target = self.expression(target);
                let source = self.expression(source);
                self.push(format!("{target} = {source};"));
            }
            Stmt::Return(expression) => {
                let expression = self.expression(expression);
                self.push(format!("return {expression};"));
            }
            Stmt::ShortReturn => self.push("return;"),
            Stmt::If {
                condition,
                consequence,
                alternate,
            } => self.if_statement(condition, consequence, alternate),
            Stmt::While { condition, body } => {
                let condition = self.expression(condition);
                self.push(format!("while ({condition}) {{"));
                for statement in body {
                    self.statement(statement);
                }
                self.push("}");
            }
            Stmt::Repeat { count, body } => {
                let i = self.fresh_name("i");
                let count = self.expression(count);
                self.push(format!("for (let {i} = 0; {i} < {count}; {i}++) {{"));
                for statement in body {
                    self.statement(statement);
                }
                self.push("}");
            }
            Stmt::ForRange {
                iterator,
                start,
                inclusive,
                end,
                body,
            } => {
                let i = self.target_name(Entity::Variable(*iterator));
                let start = self.expression(start);
                let end = self.expression(end);
                let comparison = if *inclusive { "<=" } else { "<" };

                self.push(format!(
                    "for (let {i} = {start}; {i} {comparison} {end}; {i}++) {{"
                ));
                for statement in body {
                    self.statement(statement);
                }
                self.push("}");
            }
            Stmt::ForEach {
                iterator,
                collection,
                body,
            } => {
                let iterator = self.target_name(Entity::Variable(*iterator));
                let collection = self.expression(collection);
                self.push(format!("for (let {iterator} of {collection}) {{"));
                for statement in body {
                    self.statement(statement);
                }
                self.push("}");
            }
            Stmt::Break => self.push("break;"),
            Stmt::Call(expression) => {
                let expression = self.expression(expression);
                self.push(format!("{expression};"));
            }
        }
    }

    /// A constructor that copies each declared field from a like-named
    /// parameter, used by struct form objects
    fn field_constructor(&mut self, object: ObjectId) {
        let fields: Vec<_> = self.entities.objects[object]
            .fields
            .iter()
            .map(|field| field.name)
            .collect();

        let parameters: Vec<_> = fields
            .iter()
            .map(|field| self.fresh_name(field.as_str()))
            .collect();

        self.push(format!("constructor({}) {{", parameters.join(", ")));
        for (field, parameter) in fields.iter().zip(&parameters) {
            self.push(format!("this[\"{field}\"] = {parameter};"));
        }
        self.push("}");
    }

    fn function(&mut self, id: FunctionId) {
        let function = &self.entities.functions[id];
        let keyword = if function.is_method { "" } else { "function " };
        let parameters = function.parameters.clone();
        let body = function.body.clone();

        let name = self.target_name(Entity::Function(id));
        let parameters = parameters
            .iter()
            .map(|parameter| self.target_name(Entity::Variable(*parameter)))
            .join(", ");

        self.push(format!("{keyword}{name}({parameters}) {{"));
        for statement in &body {
            self.statement(statement);
        }
        self.push("}");
    }

    fn if_statement(&mut self, condition: &Expr, consequence: &[Stmt], alternate: &IfTail) {
        let condition = self.expression(condition);
        self.push(format!("if ({condition}) {{"));
        for statement in consequence {
            self.statement(statement);
        }

        match alternate {
            IfTail::None => self.push("}"),
            IfTail::Else(statements) => {
                self.push("} else {");
                for statement in statements {
                    self.statement(statement);
                }
                self.push("}");
            }
            IfTail::ElseIf(tail) => {
                self.push("} else");
                self.statement(tail);
            }
        }
    }

    /* Expressions */

    fn expression(&mut self, expression: &Expr) -> String {
        match expression {
            Expr::Int(value) => value.to_string(),
            Expr::Float(value) => format!("{value:?}"),
            Expr::Boolean(value) => value.to_string(),
            Expr::StringTemplate(pieces) => self.string_template(pieces),
            Expr::EmptyOptional(_) => "null".to_owned(),
            Expr::EmptyList { .. } => "[]".to_owned(),
            Expr::List { elements, .. } => {
                let elements = elements
                    .iter()
                    .map(|element| self.expression(element))
                    .join(", ");
                format!("[{elements}]")
            }
            Expr::Variable { id, .. } => {
                if self.entities.variables[*id].is_intrinsic {
                    return intrinsic_constant(self.entities.variables[*id].name.as_str())
                        .to_owned();
                }

                self.target_name(Entity::Variable(*id))
            }
            Expr::FunctionReference { function, .. } => {
                self.target_name(Entity::Function(*function))
            }
            Expr::SelfReference { .. } => "this".to_owned(),
            Expr::Binary {
                operator, lhs, rhs, ..
            } => {
                let lhs = self.expression(lhs);
                let rhs = self.expression(rhs);
                format!("({lhs} {} {rhs})", binary_operator(*operator))
            }
            Expr::Unary {
                operator, operand, ..
            } => {
                let operand = self.expression(operand);

                match operator {
                    UnaryOperatorKind::Negate => format!("-({operand})"),
                    UnaryOperatorKind::Not => format!("!({operand})"),
                    // Optionals are plain values with null standing in for
                    // the empty case, so wrapping is the identity
                    UnaryOperatorKind::Some => operand,
                }
            }
            Expr::Ternary {
                condition,
                consequence,
                alternate,
                ..
            } => {
                let condition = self.expression(condition);
                let consequence = self.expression(consequence);
                let alternate = self.expression(alternate);
                format!("(({condition}) ? ({consequence}) : ({alternate}))")
            }
            Expr::NilCoalescing { left, right, .. } => {
                let left = self.expression(left);
                let right = self.expression(right);
                format!("({left} ?? {right})")
            }
            Expr::Subscript {
                collection, index, ..
            } => {
                let collection = self.expression(collection);
                let index = self.expression(index);
                format!("{collection}[{index}]")
            }
            Expr::Member {
                object,
                optional_chain,
                field,
                ..
            } => {
                let object = self.expression(object);
                let chain = if *optional_chain { "?." } else { "" };
                format!("({object}{chain}[\"{field}\"])")
            }
            Expr::Call {
                function,
                receiver,
                arguments,
                ..
            } => self.call(*function, receiver.as_deref(), arguments),
            Expr::New { object, arguments } => {
                let name = self.target_name(Entity::Object(*object));
                let arguments = arguments
                    .iter()
                    .map(|argument| self.expression(argument))
                    .join(", ");
                format!("new {name}({arguments})")
            }
        }
    }

    fn call(&mut self, function: FunctionId, receiver: Option<&Expr>, arguments: &[Expr]) -> String {
        let arguments = arguments
            .iter()
            .map(|argument| self.expression(argument))
            .join(", ");

        if self.entities.functions[function].is_intrinsic {
            let name = self.entities.functions[function].name.as_str();

            return match name {
                "bytes" => format!("(new TextEncoder().encode({arguments})).length"),
                _ => format!("{}({arguments})", intrinsic_function(name)),
            };
        }

        let name = self.target_name(Entity::Function(function));

        match receiver {
            Some(receiver) => {
                let receiver = self.expression(receiver);
                format!("{receiver}.{name}({arguments})")
            }
            None => format!("{name}({arguments})"),
        }
    }

    fn string_template(&mut self, pieces: &[StringPiece]) -> String {
        let interpolated = pieces
            .iter()
            .any(|piece| matches!(piece, StringPiece::Interpolation(_)));

        if !interpolated {
            let text = pieces
                .iter()
                .map(|piece| match piece {
                    StringPiece::Text(text) => escape_string(text),
                    StringPiece::Interpolation(_) => unreachable!(),
                })
                .collect::<String>();

            return format!("\"{text}\"");
        }

        let parts = pieces
            .iter()
            .map(|piece| match piece {
                StringPiece::Text(text) => escape_template(text),
                StringPiece::Interpolation(inner) => {
                    format!("${{{}}}", self.expression(inner))
                }
            })
            .collect::<String>();

        format!("`{parts}`")
    }
}

fn binary_operator(operator: BinaryOperatorKind) -> &'static str {
    use BinaryOperatorKind::*;

    match operator {
        Add => "+",
        Subtract => "-",
        Multiply => "*",
        Divide => "/",
        Power => "**",
        Equals => "===",
        NotEquals => "!==",
        LessThan => "<",
        LessThanOrEqualTo => "<=",
        GreaterThan => ">",
        GreaterThanOrEqualTo => ">=",
        LogicalAnd => "&&",
        LogicalOr => "||",
    }
}

fn intrinsic_constant(name: &str) -> &'static str {
    match name {
        "π" => "Math.PI",
        _ => unreachable!("unknown intrinsic constant"),
    }
}

fn intrinsic_function(name: &str) -> &'static str {
    match name {
        "sin" => "Math.sin",
        "cos" => "Math.cos",
        "exp" => "Math.exp",
        "ln" => "Math.log",
        "hypot" => "Math.hypot",
        _ => unreachable!("unknown intrinsic function"),
    }
}

fn escape_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }

    escaped
}

fn escape_template(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '`' => escaped.push_str("\\`"),
            '$' if chars.peek() == Some(&'{') => escaped.push_str("\\$"),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{
        frontend::{SourceFile, parser::Parser},
        middle::{analyze, optimize},
    };

    fn emit(source: &str) -> String {
        let source = SourceFile::new_in_memory(source);
        let program = Parser::parse_program(&source).expect("test programs should parse");
        let program = analyze::analyze(&source, &program).expect("test programs should check");
        generate(&optimize::optimize(program))
    }

    #[test]
    fn emits_the_factorial_sample() {
        let output = emit(indoc! {r#"
            thine x: string = "hello";
            proclaim("Good morrow, ${x} fair world!");

            don factorial(num: int) -> int {
                perchance (num == 0) || (num == 1) {
                    return 1;
                }
                return num * factorial(num: num - 1);
            }

            proclaim(factorial(num: 5));
        "#});

        assert!(output.contains("let x_1 = \"hello\";"));
        assert!(output.contains("console.log(`Good morrow, ${x_1} fair world!`);"));
        assert!(output.contains("function factorial_2(num_3) {"));
        assert!(output.contains("return (num_3 * factorial_2((num_3 - 1)));"));
        assert!(output.contains("console.log(factorial_2(5));"));
    }

    #[test]
    fn emits_classes_with_constructors_and_methods() {
        let output = emit(indoc! {"
            object Circle {
                radius: float;
                init(radius: float) { mine.radius = radius; }
                don area() -> float { return π * mine.radius * mine.radius; }
            }
            thine c: Circle = Circle(radius: 2.0);
            proclaim(c.area());
        "});

        assert!(output.contains("class Circle_1 {"));
        assert!(output.contains("constructor(radius_2) {"));
        assert!(output.contains("(this[\"radius\"]) = radius_2;"));
        assert!(output.contains("new Circle_1(2.0)"));
        assert!(output.contains("Math.PI"));
    }

    #[test]
    fn emits_struct_objects_with_field_constructors() {
        let output = emit(indoc! {"
            object Point { x: int; y: int; }
            thine p: Point = Point(x: 1, y: 2);
            proclaim(p.x);
        "});

        assert!(output.contains("class Point_1 {"));
        assert!(output.contains("this[\"x\"] = x_2;"));
        assert!(output.contains("this[\"y\"] = y_3;"));
        assert!(output.contains("console.log((p_4[\"x\"]));"));
    }

    #[test]
    fn emits_loops() {
        let output = emit(indoc! {"
            repeat 3 { proclaim(1); }
            for i in 1 ... 4 { proclaim(i); }
            for x in [1, 2] { proclaim(x); }
            whilst shall { cease; }
        "});

        assert!(output.contains("for (let i_1 = 0; i_1 < 3; i_1++) {"));
        assert!(output.contains("for (let i_2 = 1; i_2 <= 4; i_2++) {"));
        assert!(output.contains("for (let x_3 of [1, 2]) {"));
        assert!(output.contains("while (true) {"));
        assert!(output.contains("break;"));
    }

    #[test]
    fn maps_equality_and_optionals_to_javascript() {
        let output = emit(indoc! {r#"
            thine x: int? = naught int;
            thine y: int? = some 3;
            thine eq: bool = 1 == 1;
        "#});

        assert!(output.contains("let x_1 = null;"));
        assert!(output.contains("let y_2 = 3;"));
        // Literal comparison folds before emission
        assert!(output.contains("let eq_3 = true;"));
    }

    #[test]
    fn shadowed_names_get_distinct_suffixes() {
        let output = emit(indoc! {"
            thine x: int = 1;
            perchance shall {
                thine x: string = \"inner\";
                proclaim(x);
            }
        "});

        assert!(output.contains("let x_1 = 1;"));
        assert!(output.contains("let x_2 = \"inner\";"));
        assert!(output.contains("console.log(x_2);"));
    }

    #[test]
    fn emits_intrinsic_calls() {
        let output = emit(r#"proclaim(hypot(x: 3.0, y: 4.0)); proclaim(bytes(s: "abc"));"#);

        assert!(output.contains("Math.hypot(3.0, 4.0)"));
        assert!(output.contains("(new TextEncoder().encode(\"abc\")).length"));
    }
}
