//! Expression trees.
//!
//! An [`Expression`] is a tree of typed nodes (binary operators, calls, member
//! access, lambdas, ...) that can be shipped to another process and rebuilt
//! there. Node constructors check that each node type belongs to its node
//! class and that calls match their method's signature; decoding goes
//! through the same constructors.

mod codec;
mod kind;

pub use kind::{ExpressionType, NodeClass};

use crate::reflection::{ConstructorInfo, MemberInfo, MethodInfo, TypeRef};
use crate::*;

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Binary(BinaryExpression),
    Unary(UnaryExpression),
    Constant(ConstantExpression),
    Conditional(ConditionalExpression),
    Invocation(InvocationExpression),
    Lambda(LambdaExpression),
    MethodCall(MethodCallExpression),
    Member(MemberExpression),
    MemberInit(MemberInitExpression),
    New(NewExpression),
    NewArray(NewArrayExpression),
    ListInit(ListInitExpression),
    Parameter(ParameterExpression),
    Index(IndexExpression),
    TypeBinary(TypeBinaryExpression),
    /// A node kind without a wire codec. Can be held in memory but not encoded.
    Opaque(OpaqueExpression),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExpression {
    pub node_type: ExpressionType,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub lift_to_null: bool,
    /// User-defined operator implementation.
    pub method: Option<MethodInfo>,
    /// Conversion lambda of a coalesce or compound assignment.
    pub conversion: Option<Box<Expression>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnaryExpression {
    pub node_type: ExpressionType,
    /// Absent only for a rethrow.
    pub operand: Option<Box<Expression>>,
    pub ty: TypeRef,
    pub method: Option<MethodInfo>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstantExpression {
    pub value: Dynamic,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalExpression {
    pub test: Box<Expression>,
    pub if_true: Box<Expression>,
    pub if_false: Box<Expression>,
    pub ty: TypeRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvocationExpression {
    pub expression: Box<Expression>,
    pub arguments: Vec<Expression>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LambdaExpression {
    pub delegate_type: Option<TypeRef>,
    pub body: Box<Expression>,
    pub name: Option<String>,
    pub tail_call: bool,
    pub parameters: Vec<ParameterExpression>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodCallExpression {
    /// Receiver, absent for static methods.
    pub object: Option<Box<Expression>>,
    pub method: MethodInfo,
    pub arguments: Vec<Expression>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberExpression {
    /// Receiver, absent for static members.
    pub expression: Option<Box<Expression>>,
    pub member: MemberInfo,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberInitExpression {
    pub new_expression: NewExpression,
    pub bindings: Vec<MemberBinding>,
}

/// One member initializer inside a [`MemberInitExpression`].
#[derive(Clone, Debug, PartialEq)]
pub enum MemberBinding {
    /// `Member = expression`
    Assignment {
        member: MemberInfo,
        expression: Expression,
    },
    /// `Member = { nested bindings }`
    Member {
        member: MemberInfo,
        bindings: Vec<MemberBinding>,
    },
    /// `Member = { element initializers }`
    List {
        member: MemberInfo,
        initializers: Vec<ElementInit>,
    },
}

impl MemberBinding {
    pub fn member(&self) -> &MemberInfo {
        match self {
            MemberBinding::Assignment { member, .. }
            | MemberBinding::Member { member, .. }
            | MemberBinding::List { member, .. } => member,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewExpression {
    /// Absent for the parameterless construction of a value type.
    pub constructor: Option<ConstructorInfo>,
    pub ty: TypeRef,
    pub arguments: Vec<Expression>,
    /// Members the arguments initialize (anonymous types).
    pub members: Option<Vec<MemberInfo>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewArrayExpression {
    /// `NewArrayInit` or `NewArrayBounds`.
    pub node_type: ExpressionType,
    pub element_type: TypeRef,
    pub expressions: Vec<Expression>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListInitExpression {
    pub new_expression: NewExpression,
    pub initializers: Vec<ElementInit>,
}

/// A call to a collection's add method with `arguments`.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementInit {
    pub add_method: MethodInfo,
    pub arguments: Vec<Expression>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParameterExpression {
    pub ty: TypeRef,
    pub name: Option<String>,
    pub is_by_ref: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexExpression {
    pub object: Box<Expression>,
    /// Indexed property, absent for array access.
    pub indexer: Option<MemberInfo>,
    pub arguments: Vec<Expression>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeBinaryExpression {
    /// `TypeIs` or `TypeEqual`.
    pub node_type: ExpressionType,
    pub expression: Box<Expression>,
    pub type_operand: TypeRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OpaqueExpression {
    pub node_type: ExpressionType,
    pub ty: TypeRef,
}

fn invalid(message: String) -> EncoderError {
    EncoderError::InvalidExpression(message)
}

fn expect_class(node_type: ExpressionType, class: NodeClass) -> Result<()> {
    if node_type.class() == class {
        Ok(())
    } else {
        Err(invalid(format!(
            "{:?} is not a {:?} node type",
            node_type, class
        )))
    }
}

fn check_arguments(what: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(invalid(format!(
            "{} expects {} arguments, got {}",
            what, expected, actual
        )))
    }
}

impl Expression {
    pub fn node_type(&self) -> ExpressionType {
        match self {
            Expression::Binary(node) => node.node_type,
            Expression::Unary(node) => node.node_type,
            Expression::Constant(_) => ExpressionType::Constant,
            Expression::Conditional(_) => ExpressionType::Conditional,
            Expression::Invocation(_) => ExpressionType::Invoke,
            Expression::Lambda(_) => ExpressionType::Lambda,
            Expression::MethodCall(_) => ExpressionType::Call,
            Expression::Member(_) => ExpressionType::MemberAccess,
            Expression::MemberInit(_) => ExpressionType::MemberInit,
            Expression::New(_) => ExpressionType::New,
            Expression::NewArray(node) => node.node_type,
            Expression::ListInit(_) => ExpressionType::ListInit,
            Expression::Parameter(_) => ExpressionType::Parameter,
            Expression::Index(_) => ExpressionType::Index,
            Expression::TypeBinary(node) => node.node_type,
            Expression::Opaque(node) => node.node_type,
        }
    }

    /// A binary node with every optional part spelled out.
    pub fn make_binary(
        node_type: ExpressionType,
        left: Expression,
        right: Expression,
        lift_to_null: bool,
        method: Option<MethodInfo>,
        conversion: Option<Expression>,
    ) -> Result<Expression> {
        expect_class(node_type, NodeClass::Binary)?;
        if let Some(method) = &method {
            check_arguments(&method.name, method.parameter_types.len(), 2)?;
        }
        if let Some(conversion) = &conversion {
            if conversion.node_type() != ExpressionType::Lambda {
                return Err(invalid(format!(
                    "conversion of {:?} must be a lambda, got {:?}",
                    node_type,
                    conversion.node_type()
                )));
            }
        }
        Ok(Expression::Binary(BinaryExpression {
            node_type,
            left: Box::new(left),
            right: Box::new(right),
            lift_to_null,
            method,
            conversion: conversion.map(Box::new),
        }))
    }

    pub fn binary(node_type: ExpressionType, left: Expression, right: Expression) -> Result<Expression> {
        Self::make_binary(node_type, left, right, false, None, None)
    }

    pub fn make_unary(
        node_type: ExpressionType,
        operand: Option<Expression>,
        ty: TypeRef,
        method: Option<MethodInfo>,
    ) -> Result<Expression> {
        expect_class(node_type, NodeClass::Unary)?;
        if operand.is_none() && node_type != ExpressionType::Throw {
            return Err(invalid(format!("{:?} requires an operand", node_type)));
        }
        if let Some(method) = &method {
            check_arguments(&method.name, method.parameter_types.len(), 1)?;
        }
        Ok(Expression::Unary(UnaryExpression {
            node_type,
            operand: operand.map(Box::new),
            ty,
            method,
        }))
    }

    pub fn unary(node_type: ExpressionType, operand: Expression, ty: TypeRef) -> Result<Expression> {
        Self::make_unary(node_type, Some(operand), ty, None)
    }

    pub fn constant(value: Dynamic, ty: TypeRef) -> Expression {
        Expression::Constant(ConstantExpression { value, ty })
    }

    /// A constant typed by the registered name of `T` in the global container.
    pub fn constant_of<T: Wire>(value: T) -> Result<Expression> {
        let value = Dynamic::new(value)?;
        let ty = value
            .type_ref()
            .cloned()
            .ok_or_else(|| invalid("constant has no type".to_string()))?;
        Ok(Self::constant(value, ty))
    }

    pub fn condition(test: Expression, if_true: Expression, if_false: Expression, ty: TypeRef) -> Expression {
        Expression::Conditional(ConditionalExpression {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            ty,
        })
    }

    pub fn invoke(expression: Expression, arguments: Vec<Expression>) -> Expression {
        Expression::Invocation(InvocationExpression {
            expression: Box::new(expression),
            arguments,
        })
    }

    pub fn lambda(body: Expression, parameters: Vec<ParameterExpression>) -> Expression {
        Self::make_lambda(None, body, None, false, parameters)
    }

    pub fn make_lambda(
        delegate_type: Option<TypeRef>,
        body: Expression,
        name: Option<String>,
        tail_call: bool,
        parameters: Vec<ParameterExpression>,
    ) -> Expression {
        Expression::Lambda(LambdaExpression {
            delegate_type,
            body: Box::new(body),
            name,
            tail_call,
            parameters,
        })
    }

    /// Calls `method` on `object` (`None` for a static method).
    pub fn call(object: Option<Expression>, method: MethodInfo, arguments: Vec<Expression>) -> Result<Expression> {
        match (&object, method.is_static) {
            (Some(_), true) => {
                return Err(invalid(format!("static method {} called with a receiver", method.name)))
            }
            (None, false) => {
                return Err(invalid(format!("instance method {} called without a receiver", method.name)))
            }
            _ => {}
        }
        if method.is_generic_definition() {
            return Err(invalid(format!(
                "generic method {} needs its generic arguments",
                method.name
            )));
        }
        check_arguments(&method.name, method.parameter_types.len(), arguments.len())?;
        Ok(Expression::MethodCall(MethodCallExpression {
            object: object.map(Box::new),
            method,
            arguments,
        }))
    }

    /// Reads `member` of `expression` (`None` for a static member).
    pub fn member(expression: Option<Expression>, member: MemberInfo) -> Result<Expression> {
        if expression.is_some() == member.is_static {
            return Err(invalid(format!(
                "member {} is {}static",
                member.name,
                if member.is_static { "" } else { "not " }
            )));
        }
        if member.is_indexer() {
            return Err(invalid(format!("indexed property {} needs an index expression", member.name)));
        }
        Ok(Expression::Member(MemberExpression {
            expression: expression.map(Box::new),
            member,
        }))
    }

    pub fn member_init(new_expression: NewExpression, bindings: Vec<MemberBinding>) -> Expression {
        Expression::MemberInit(MemberInitExpression {
            new_expression,
            bindings,
        })
    }

    pub fn new(constructor: ConstructorInfo, arguments: Vec<Expression>) -> Result<Expression> {
        Self::make_new(Some(constructor.declaring_type.clone()), Some(constructor), arguments, None)
            .map(Expression::New)
    }

    /// Parameterless construction of a value type.
    pub fn new_default(ty: TypeRef) -> Expression {
        Expression::New(NewExpression {
            constructor: None,
            ty,
            arguments: Vec::new(),
            members: None,
        })
    }

    pub(crate) fn make_new(
        ty: Option<TypeRef>,
        constructor: Option<ConstructorInfo>,
        arguments: Vec<Expression>,
        members: Option<Vec<MemberInfo>>,
    ) -> Result<NewExpression> {
        let ty = match (&constructor, ty) {
            (Some(ctor), _) => {
                check_arguments("constructor", ctor.parameter_types.len(), arguments.len())?;
                ctor.declaring_type.clone()
            }
            (None, Some(ty)) if arguments.is_empty() => ty,
            (None, _) => return Err(invalid("constructor arguments without a constructor".to_string())),
        };
        if let Some(members) = &members {
            check_arguments("member list", members.len(), arguments.len())?;
        }
        Ok(NewExpression {
            constructor,
            ty,
            arguments,
            members,
        })
    }

    pub fn new_array_init(element_type: TypeRef, expressions: Vec<Expression>) -> Expression {
        Expression::NewArray(NewArrayExpression {
            node_type: ExpressionType::NewArrayInit,
            element_type,
            expressions,
        })
    }

    pub fn new_array_bounds(element_type: TypeRef, bounds: Vec<Expression>) -> Result<Expression> {
        Self::make_new_array(ExpressionType::NewArrayBounds, element_type, bounds)
    }

    pub fn make_new_array(
        node_type: ExpressionType,
        element_type: TypeRef,
        expressions: Vec<Expression>,
    ) -> Result<Expression> {
        expect_class(node_type, NodeClass::NewArray)?;
        if node_type == ExpressionType::NewArrayBounds && expressions.is_empty() {
            return Err(invalid("array bounds must not be empty".to_string()));
        }
        Ok(Expression::NewArray(NewArrayExpression {
            node_type,
            element_type,
            expressions,
        }))
    }

    pub fn list_init(new_expression: NewExpression, initializers: Vec<ElementInit>) -> Result<Expression> {
        if initializers.is_empty() {
            return Err(invalid("list initializer without elements".to_string()));
        }
        Ok(Expression::ListInit(ListInitExpression {
            new_expression,
            initializers,
        }))
    }

    pub fn parameter(ty: TypeRef, name: impl Into<String>) -> ParameterExpression {
        ParameterExpression {
            ty,
            name: Some(name.into()),
            is_by_ref: false,
        }
    }

    pub fn index(object: Expression, indexer: Option<MemberInfo>, arguments: Vec<Expression>) -> Result<Expression> {
        if let Some(indexer) = &indexer {
            check_arguments(&indexer.name, indexer.index_parameters.len(), arguments.len())?;
        } else if arguments.is_empty() {
            return Err(invalid("array index without indices".to_string()));
        }
        Ok(Expression::Index(IndexExpression {
            object: Box::new(object),
            indexer,
            arguments,
        }))
    }

    pub fn make_type_binary(
        node_type: ExpressionType,
        expression: Expression,
        type_operand: TypeRef,
    ) -> Result<Expression> {
        expect_class(node_type, NodeClass::TypeBinary)?;
        Ok(Expression::TypeBinary(TypeBinaryExpression {
            node_type,
            expression: Box::new(expression),
            type_operand,
        }))
    }

    pub fn type_is(expression: Expression, type_operand: TypeRef) -> Expression {
        Expression::TypeBinary(TypeBinaryExpression {
            node_type: ExpressionType::TypeIs,
            expression: Box::new(expression),
            type_operand,
        })
    }

    /// A node of a kind this crate cannot encode (block, loop, try, ...).
    pub fn opaque(node_type: ExpressionType, ty: TypeRef) -> Result<Expression> {
        expect_class(node_type, NodeClass::Unsupported)?;
        Ok(Expression::Opaque(OpaqueExpression { node_type, ty }))
    }
}

impl From<ParameterExpression> for Expression {
    fn from(parameter: ParameterExpression) -> Self {
        Expression::Parameter(parameter)
    }
}

impl ElementInit {
    pub fn new(add_method: MethodInfo, arguments: Vec<Expression>) -> Result<Self> {
        check_arguments(&add_method.name, add_method.parameter_types.len(), arguments.len())?;
        Ok(Self {
            add_method,
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> TypeRef {
        TypeRef::new("System.Int32")
    }

    #[test]
    fn test_node_type_must_match_class() {
        let x = Expression::from(Expression::parameter(int(), "x"));
        assert!(Expression::binary(ExpressionType::Add, x.clone(), x.clone()).is_ok());
        assert!(matches!(
            Expression::binary(ExpressionType::Negate, x.clone(), x.clone()),
            Err(EncoderError::InvalidExpression(_))
        ));
        assert!(Expression::unary(ExpressionType::Add, x.clone(), int()).is_err());
        assert!(Expression::make_type_binary(ExpressionType::TypeEqual, x.clone(), int()).is_ok());
        assert!(Expression::make_type_binary(ExpressionType::Equal, x, int()).is_err());
        assert!(Expression::opaque(ExpressionType::Loop, int()).is_ok());
        assert!(Expression::opaque(ExpressionType::Add, int()).is_err());
    }

    #[test]
    fn test_call_checks_signature() {
        let method = MethodInfo {
            declaring_type: TypeRef::new("Math"),
            reflected_type: TypeRef::new("Math"),
            name: "Abs".to_string(),
            generic_arity: 0,
            generic_arguments: None,
            parameter_types: vec![int()],
            return_type: int(),
            is_static: true,
        };
        let x = Expression::from(Expression::parameter(int(), "x"));
        assert!(Expression::call(None, method.clone(), vec![x.clone()]).is_ok());
        assert!(Expression::call(None, method.clone(), vec![]).is_err());
        assert!(Expression::call(Some(x.clone()), method, vec![x]).is_err());
    }

    #[test]
    fn test_throw_without_operand() {
        assert!(Expression::make_unary(ExpressionType::Throw, None, TypeRef::new("System.Void"), None).is_ok());
        assert!(Expression::make_unary(ExpressionType::Negate, None, int(), None).is_err());
    }
}
