use std::rc::Rc;

use itertools::Itertools;

use crate::{
    frontend::intern::InternedSymbol,
    index::{IndexVec, define_index},
};

define_index! {
    /// Handle to an object type in the entity arena
    pub struct ObjectId;
}

/// A user declared `object` type. Struct form objects (no initializer, no
/// methods) construct from their fields in order; class form objects
/// construct through their initializer's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    pub name: InternedSymbol,
    pub fields: Vec<Field>,
    /// `Some` for class form objects; holds the initializer's parameters
    pub constructor_parameters: Option<Vec<Field>>,
}

impl ObjectType {
    pub fn field(&self, name: InternedSymbol) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: InternedSymbol,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Any,
    Int,
    Float,
    String,
    Boolean,
    List(Box<Type>),
    Optional(Box<Type>),
    Function(Rc<FunctionType>),
    /// Nominal; two object types are the same only if they are the same
    /// declaration
    Object(ObjectId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub parameter_names: Vec<InternedSymbol>,
    pub parameter_types: Vec<Type>,
    pub return_type: Type,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn equivalent(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::List(a), Type::List(b)) => a.equivalent(b),
            (Type::Optional(a), Type::Optional(b)) => a.equivalent(b),
            (Type::Function(a), Type::Function(b)) => {
                a.return_type.equivalent(&b.return_type)
                    && a.parameter_types.len() == b.parameter_types.len()
                    && a.parameter_types
                        .iter()
                        .zip(&b.parameter_types)
                        .all(|(a, b)| a.equivalent(b))
            }
            (Type::Object(a), Type::Object(b)) => a == b,
            (a, b) => a == b,
        }
    }

    /// Whether a value of this type may be used where `target` is expected.
    /// `any` accepts everything; function types are covariant in their return
    /// type and contravariant in their parameters.
    pub fn assignable_to(&self, target: &Type) -> bool {
        if matches!(target, Type::Any) || self.equivalent(target) {
            return true;
        }

        if let (Type::Function(from), Type::Function(to)) = (self, target) {
            return from.return_type.assignable_to(&to.return_type)
                && from.parameter_types.len() == to.parameter_types.len()
                && to
                    .parameter_types
                    .iter()
                    .zip(&from.parameter_types)
                    .all(|(to, from)| to.assignable_to(from));
        }

        false
    }

    /// Human readable spelling used in error messages, e.g. `[int]`,
    /// `string?`, `(int, int) -> bool`
    pub fn description(&self, objects: &IndexVec<ObjectId, ObjectType>) -> String {
        match self {
            Type::Void => "zilch".to_owned(),
            Type::Any => "any".to_owned(),
            Type::Int => "int".to_owned(),
            Type::Float => "float".to_owned(),
            Type::String => "string".to_owned(),
            Type::Boolean => "bool".to_owned(),
            Type::List(element) => format!("[{}]", element.description(objects)),
            Type::Optional(base) => format!("{}?", base.description(objects)),
            Type::Function(function) => format!(
                "({}) -> {}",
                function
                    .parameter_types
                    .iter()
                    .map(|ty| ty.description(objects))
                    .join(", "),
                function.return_type.description(objects)
            ),
            Type::Object(id) => objects[*id].name.as_str().to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(parameter_types: Vec<Type>, return_type: Type) -> Type {
        Type::Function(Rc::new(FunctionType {
            parameter_names: parameter_types
                .iter()
                .enumerate()
                .map(|(i, _)| InternedSymbol::new(&format!("p{i}")))
                .collect(),
            parameter_types,
            return_type,
        }))
    }

    #[test]
    fn equivalence_is_structural() {
        assert!(Type::List(Box::new(Type::Int)).equivalent(&Type::List(Box::new(Type::Int))));
        assert!(!Type::List(Box::new(Type::Int)).equivalent(&Type::List(Box::new(Type::Float))));
        assert!(Type::Optional(Box::new(Type::String))
            .equivalent(&Type::Optional(Box::new(Type::String))));
        assert!(!Type::Int.equivalent(&Type::Optional(Box::new(Type::Int))));
    }

    #[test]
    fn anything_is_assignable_to_any() {
        assert!(Type::Int.assignable_to(&Type::Any));
        assert!(Type::List(Box::new(Type::String)).assignable_to(&Type::Any));
        assert!(!Type::Any.equivalent(&Type::Int));
    }

    #[test]
    fn function_assignability_is_variant() {
        let int_to_any = function(vec![Type::Int], Type::Any);
        let int_to_int = function(vec![Type::Int], Type::Int);
        let any_to_int = function(vec![Type::Any], Type::Int);

        // Covariant return
        assert!(int_to_int.assignable_to(&int_to_any));
        // Contravariant parameters
        assert!(any_to_int.assignable_to(&int_to_int));
        assert!(!int_to_int.assignable_to(&any_to_int));
    }

    #[test]
    fn descriptions_read_like_source_types() {
        let objects = IndexVec::new();

        assert_eq!(Type::List(Box::new(Type::Int)).description(&objects), "[int]");
        assert_eq!(
            Type::Optional(Box::new(Type::String)).description(&objects),
            "string?"
        );
        assert_eq!(
            function(vec![Type::Int, Type::Int], Type::Boolean).description(&objects),
            "(int, int) -> bool"
        );
    }
}
