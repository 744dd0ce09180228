//! Wire form of expression trees.
//!
//! Every node is an i32 node type (`-1` for a null expression) followed by
//! the node's constructor arguments in declaration order. Decoding rebuilds
//! nodes through the validating constructors in the parent module.

use super::*;
use crate::core::unexpected_null;
use crate::cursor::NULL_LENGTH;
use bytes::{BufMut, BytesMut};

/// Body codec of one node class. The node type tag is handled by [`Expression`].
trait NodeCodec {
    fn body_size(&self) -> usize;
    fn encode_body(&self, writer: &mut BytesMut) -> Result<()>;
    fn decode_body(reader: &mut Reader<'_>, node_type: ExpressionType) -> Result<Expression>;
}

impl Expression {
    fn class_of_variant(&self) -> NodeClass {
        match self {
            Expression::Binary(_) => NodeClass::Binary,
            Expression::Unary(_) => NodeClass::Unary,
            Expression::Constant(_) => NodeClass::Constant,
            Expression::Conditional(_) => NodeClass::Conditional,
            Expression::Invocation(_) => NodeClass::Invocation,
            Expression::Lambda(_) => NodeClass::Lambda,
            Expression::MethodCall(_) => NodeClass::MethodCall,
            Expression::Member(_) => NodeClass::Member,
            Expression::MemberInit(_) => NodeClass::MemberInit,
            Expression::New(_) => NodeClass::New,
            Expression::NewArray(_) => NodeClass::NewArray,
            Expression::ListInit(_) => NodeClass::ListInit,
            Expression::Parameter(_) => NodeClass::Parameter,
            Expression::Index(_) => NodeClass::Index,
            Expression::TypeBinary(_) => NodeClass::TypeBinary,
            Expression::Opaque(_) => NodeClass::Unsupported,
        }
    }

    fn body(&self) -> Option<&dyn NodeBody> {
        let body: &dyn NodeBody = match self {
            Expression::Binary(node) => node,
            Expression::Unary(node) => node,
            Expression::Constant(node) => node,
            Expression::Conditional(node) => node,
            Expression::Invocation(node) => node,
            Expression::Lambda(node) => node,
            Expression::MethodCall(node) => node,
            Expression::Member(node) => node,
            Expression::MemberInit(node) => node,
            Expression::New(node) => node,
            Expression::NewArray(node) => node,
            Expression::ListInit(node) => node,
            Expression::Parameter(node) => node,
            Expression::Index(node) => node,
            Expression::TypeBinary(node) => node,
            Expression::Opaque(_) => return None,
        };
        Some(body)
    }
}

/// Object-safe half of [`NodeCodec`].
trait NodeBody {
    fn size(&self) -> usize;
    fn write(&self, writer: &mut BytesMut) -> Result<()>;
}

impl<T: NodeCodec> NodeBody for T {
    fn size(&self) -> usize {
        self.body_size()
    }

    fn write(&self, writer: &mut BytesMut) -> Result<()> {
        self.encode_body(writer)
    }
}

impl Encoder for Expression {
    const NULL_STYLE: NullStyle = NullStyle::Sentinel;
    const KIND: CodecKind = CodecKind::Expression;

    fn calculate_size(&self) -> usize {
        4 + self.body().map_or(0, NodeBody::size)
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        let node_type = self.node_type();
        let class = node_type.class();
        if class == NodeClass::Unsupported {
            return Err(EncoderError::UnsupportedExpressionKind(node_type));
        }
        if class != self.class_of_variant() {
            return Err(EncoderError::InvalidExpression(format!(
                "{:?} is not a {:?} node type",
                node_type,
                self.class_of_variant()
            )));
        }
        let body = self
            .body()
            .ok_or(EncoderError::UnsupportedExpressionKind(node_type))?;
        writer.put_i32_le(node_type as i32);
        body.write(writer)
    }
}

impl Decoder for Expression {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.nested("expression", |reader| {
            let tag = reader.read_i32("expression node type")?;
            if tag == NULL_LENGTH {
                return Err(unexpected_null("expression"));
            }
            let node_type = ExpressionType::try_from(tag)?;
            match node_type.class() {
                NodeClass::Binary => BinaryExpression::decode_body(reader, node_type),
                NodeClass::Unary => UnaryExpression::decode_body(reader, node_type),
                NodeClass::Constant => ConstantExpression::decode_body(reader, node_type),
                NodeClass::Conditional => ConditionalExpression::decode_body(reader, node_type),
                NodeClass::Invocation => InvocationExpression::decode_body(reader, node_type),
                NodeClass::Lambda => LambdaExpression::decode_body(reader, node_type),
                NodeClass::MethodCall => MethodCallExpression::decode_body(reader, node_type),
                NodeClass::Member => MemberExpression::decode_body(reader, node_type),
                NodeClass::MemberInit => MemberInitExpression::decode_body(reader, node_type),
                NodeClass::New => NewExpression::decode_body(reader, node_type),
                NodeClass::NewArray => NewArrayExpression::decode_body(reader, node_type),
                NodeClass::ListInit => ListInitExpression::decode_body(reader, node_type),
                NodeClass::Parameter => ParameterExpression::decode_body(reader, node_type),
                NodeClass::Index => IndexExpression::decode_body(reader, node_type),
                NodeClass::TypeBinary => TypeBinaryExpression::decode_body(reader, node_type),
                NodeClass::Unsupported => Err(EncoderError::UnsupportedExpressionKind(node_type)),
            }
        })
    }
}

impl NodeCodec for BinaryExpression {
    fn body_size(&self) -> usize {
        self.left.calculate_size()
            + self.right.calculate_size()
            + 1
            + self.method.calculate_size()
            + self.conversion.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.left.encode(writer)?;
        self.right.encode(writer)?;
        self.lift_to_null.encode(writer)?;
        self.method.encode(writer)?;
        self.conversion.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, node_type: ExpressionType) -> Result<Expression> {
        let left = Expression::decode(reader)?;
        let right = Expression::decode(reader)?;
        let lift_to_null = bool::decode(reader)?;
        let method = Option::<MethodInfo>::decode(reader)?;
        let conversion = Option::<Expression>::decode(reader)?;
        Expression::make_binary(node_type, left, right, lift_to_null, method, conversion)
    }
}

impl NodeCodec for UnaryExpression {
    fn body_size(&self) -> usize {
        self.operand.calculate_size() + self.ty.calculate_size() + self.method.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.operand.encode(writer)?;
        self.ty.encode(writer)?;
        self.method.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, node_type: ExpressionType) -> Result<Expression> {
        let operand = Option::<Expression>::decode(reader)?;
        let ty = TypeRef::decode(reader)?;
        let method = Option::<MethodInfo>::decode(reader)?;
        Expression::make_unary(node_type, operand, ty, method)
    }
}

impl NodeCodec for ConstantExpression {
    fn body_size(&self) -> usize {
        self.value.calculate_size() + self.ty.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.value.encode(writer)?;
        self.ty.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        let value = Dynamic::decode(reader)?;
        let ty = TypeRef::decode(reader)?;
        Ok(Expression::constant(value, ty))
    }
}

impl NodeCodec for ConditionalExpression {
    fn body_size(&self) -> usize {
        self.test.calculate_size()
            + self.if_true.calculate_size()
            + self.if_false.calculate_size()
            + self.ty.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.test.encode(writer)?;
        self.if_true.encode(writer)?;
        self.if_false.encode(writer)?;
        self.ty.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        let test = Expression::decode(reader)?;
        let if_true = Expression::decode(reader)?;
        let if_false = Expression::decode(reader)?;
        let ty = TypeRef::decode(reader)?;
        Ok(Expression::condition(test, if_true, if_false, ty))
    }
}

impl NodeCodec for InvocationExpression {
    fn body_size(&self) -> usize {
        self.expression.calculate_size() + self.arguments.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.expression.encode(writer)?;
        self.arguments.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        let expression = Expression::decode(reader)?;
        let arguments = Vec::<Expression>::decode(reader)?;
        Ok(Expression::invoke(expression, arguments))
    }
}

impl NodeCodec for LambdaExpression {
    fn body_size(&self) -> usize {
        self.delegate_type.calculate_size()
            + self.body.calculate_size()
            + self.name.calculate_size()
            + 1
            + self.parameters.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.delegate_type.encode(writer)?;
        self.body.encode(writer)?;
        self.name.encode(writer)?;
        self.tail_call.encode(writer)?;
        self.parameters.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        let delegate_type = Option::<TypeRef>::decode(reader)?;
        let body = Expression::decode(reader)?;
        let name = Option::<String>::decode(reader)?;
        let tail_call = bool::decode(reader)?;
        let parameters = Vec::<ParameterExpression>::decode(reader)?;
        Ok(Expression::make_lambda(delegate_type, body, name, tail_call, parameters))
    }
}

impl NodeCodec for MethodCallExpression {
    fn body_size(&self) -> usize {
        self.object.calculate_size() + self.method.calculate_size() + self.arguments.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.object.encode(writer)?;
        self.method.encode(writer)?;
        self.arguments.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        let object = Option::<Expression>::decode(reader)?;
        let method = MethodInfo::decode(reader)?;
        let arguments = Vec::<Expression>::decode(reader)?;
        Expression::call(object, method, arguments)
    }
}

impl NodeCodec for MemberExpression {
    fn body_size(&self) -> usize {
        self.expression.calculate_size() + self.member.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.expression.encode(writer)?;
        self.member.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        let expression = Option::<Expression>::decode(reader)?;
        let member = MemberInfo::decode(reader)?;
        Expression::member(expression, member)
    }
}

impl NodeCodec for MemberInitExpression {
    fn body_size(&self) -> usize {
        self.new_expression.calculate_size() + self.bindings.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.new_expression.encode(writer)?;
        self.bindings.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        let new_expression = NewExpression::decode(reader)?;
        let bindings = Vec::<MemberBinding>::decode(reader)?;
        Ok(Expression::member_init(new_expression, bindings))
    }
}

/// Writes the constructor, type, arguments and member list, without a node tag.
impl Encoder for NewExpression {
    const KIND: CodecKind = CodecKind::Expression;

    fn calculate_size(&self) -> usize {
        self.constructor.calculate_size()
            + self.ty.calculate_size()
            + self.arguments.calculate_size()
            + self.members.calculate_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.constructor.encode(writer)?;
        self.ty.encode(writer)?;
        self.arguments.encode(writer)?;
        self.members.encode(writer)
    }
}

impl Decoder for NewExpression {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let constructor = Option::<ConstructorInfo>::decode(reader)?;
        let ty = TypeRef::decode(reader)?;
        let arguments = Vec::<Expression>::decode(reader)?;
        let members = Option::<Vec<MemberInfo>>::decode(reader)?;
        Expression::make_new(Some(ty), constructor, arguments, members)
    }
}

impl NodeCodec for NewExpression {
    fn body_size(&self) -> usize {
        self.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        NewExpression::decode(reader).map(Expression::New)
    }
}

impl NodeCodec for NewArrayExpression {
    fn body_size(&self) -> usize {
        self.element_type.calculate_size() + self.expressions.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.element_type.encode(writer)?;
        self.expressions.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, node_type: ExpressionType) -> Result<Expression> {
        let element_type = TypeRef::decode(reader)?;
        let expressions = Vec::<Expression>::decode(reader)?;
        Expression::make_new_array(node_type, element_type, expressions)
    }
}

impl NodeCodec for ListInitExpression {
    fn body_size(&self) -> usize {
        self.new_expression.calculate_size() + self.initializers.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.new_expression.encode(writer)?;
        self.initializers.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        let new_expression = NewExpression::decode(reader)?;
        let initializers = Vec::<ElementInit>::decode(reader)?;
        Expression::list_init(new_expression, initializers)
    }
}

impl Encoder for ElementInit {
    const KIND: CodecKind = CodecKind::Expression;

    fn calculate_size(&self) -> usize {
        self.add_method.calculate_size() + self.arguments.calculate_size()
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.add_method.encode(writer)?;
        self.arguments.encode(writer)
    }
}

impl Decoder for ElementInit {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let add_method = MethodInfo::decode(reader)?;
        let arguments = Vec::<Expression>::decode(reader)?;
        ElementInit::new(add_method, arguments)
    }
}

const BINDING_ASSIGNMENT: i32 = 0;
const BINDING_MEMBER: i32 = 1;
const BINDING_LIST: i32 = 2;

/// An i32 binding kind, the member, then the assigned expression, nested
/// bindings or element initializers.
impl Encoder for MemberBinding {
    const KIND: CodecKind = CodecKind::Expression;

    fn calculate_size(&self) -> usize {
        4 + self.member().calculate_size()
            + match self {
                MemberBinding::Assignment { expression, .. } => expression.calculate_size(),
                MemberBinding::Member { bindings, .. } => bindings.calculate_size(),
                MemberBinding::List { initializers, .. } => initializers.calculate_size(),
            }
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        match self {
            MemberBinding::Assignment { member, expression } => {
                writer.put_i32_le(BINDING_ASSIGNMENT);
                member.encode(writer)?;
                expression.encode(writer)
            }
            MemberBinding::Member { member, bindings } => {
                writer.put_i32_le(BINDING_MEMBER);
                member.encode(writer)?;
                bindings.encode(writer)
            }
            MemberBinding::List {
                member,
                initializers,
            } => {
                writer.put_i32_le(BINDING_LIST);
                member.encode(writer)?;
                initializers.encode(writer)
            }
        }
    }
}

impl Decoder for MemberBinding {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.nested("member binding", |reader| {
            let kind = reader.read_i32("member binding kind")?;
            let member = MemberInfo::decode(reader)?;
            match kind {
                BINDING_ASSIGNMENT => Ok(MemberBinding::Assignment {
                    member,
                    expression: Expression::decode(reader)?,
                }),
                BINDING_MEMBER => Ok(MemberBinding::Member {
                    member,
                    bindings: Vec::<MemberBinding>::decode(reader)?,
                }),
                BINDING_LIST => Ok(MemberBinding::List {
                    member,
                    initializers: Vec::<ElementInit>::decode(reader)?,
                }),
                other => Err(EncoderError::Corrupt {
                    context: "member binding kind",
                    detail: format!("unknown binding kind {}", other),
                }),
            }
        })
    }
}

/// Type, optional name and by-ref flag, without a node tag.
impl Encoder for ParameterExpression {
    const KIND: CodecKind = CodecKind::Expression;

    fn calculate_size(&self) -> usize {
        self.ty.calculate_size() + self.name.calculate_size() + 1
    }

    fn encode(&self, writer: &mut BytesMut) -> Result<()> {
        self.ty.encode(writer)?;
        self.name.encode(writer)?;
        self.is_by_ref.encode(writer)
    }
}

impl Decoder for ParameterExpression {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(ParameterExpression {
            ty: TypeRef::decode(reader)?,
            name: Option::<String>::decode(reader)?,
            is_by_ref: bool::decode(reader)?,
        })
    }
}

impl NodeCodec for ParameterExpression {
    fn body_size(&self) -> usize {
        self.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        ParameterExpression::decode(reader).map(Expression::Parameter)
    }
}

impl NodeCodec for IndexExpression {
    fn body_size(&self) -> usize {
        self.object.calculate_size() + self.indexer.calculate_size() + self.arguments.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.object.encode(writer)?;
        self.indexer.encode(writer)?;
        self.arguments.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, _node_type: ExpressionType) -> Result<Expression> {
        let object = Expression::decode(reader)?;
        let indexer = Option::<MemberInfo>::decode(reader)?;
        let arguments = Vec::<Expression>::decode(reader)?;
        Expression::index(object, indexer, arguments)
    }
}

impl NodeCodec for TypeBinaryExpression {
    fn body_size(&self) -> usize {
        self.expression.calculate_size() + self.type_operand.calculate_size()
    }

    fn encode_body(&self, writer: &mut BytesMut) -> Result<()> {
        self.expression.encode(writer)?;
        self.type_operand.encode(writer)
    }

    fn decode_body(reader: &mut Reader<'_>, node_type: ExpressionType) -> Result<Expression> {
        let expression = Expression::decode(reader)?;
        let type_operand = TypeRef::decode(reader)?;
        Expression::make_type_binary(node_type, expression, type_operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn int() -> TypeRef {
        TypeRef::new("System.Int32")
    }

    fn roundtrip(expression: &Expression) -> Expression {
        let mut buf = crate::encode(expression).unwrap();
        assert_eq!(buf.len(), expression.calculate_size());
        let decoded = crate::decode(&mut buf).unwrap();
        assert!(buf.is_empty());
        decoded
    }

    #[test]
    fn test_lambda_roundtrip() {
        let x = Expression::parameter(int(), "x");
        let body = Expression::binary(
            ExpressionType::Multiply,
            x.clone().into(),
            Expression::constant(Dynamic::from(2i32), int()),
        )
        .unwrap();
        let lambda = Expression::lambda(body, vec![x]);
        assert_eq!(roundtrip(&lambda), lambda);
    }

    #[test]
    fn test_tag_layout() {
        let x: Expression = Expression::parameter(int(), "x").into();
        let encoded = crate::encode(&x).unwrap();
        assert_eq!(&encoded[..4], &[38, 0, 0, 0]);
        assert_eq!(&crate::encode(&None::<Expression>).unwrap()[..], &[0xFF; 4]);
    }

    #[test]
    fn test_unsupported_kind_on_encode() {
        let block = Expression::opaque(ExpressionType::Block, int()).unwrap();
        assert!(matches!(
            crate::encode(&block),
            Err(EncoderError::UnsupportedExpressionKind(ExpressionType::Block))
        ));
    }

    #[test]
    fn test_unsupported_kind_on_decode() {
        let mut data = Bytes::from_static(&[58, 0, 0, 0]);
        assert!(matches!(
            crate::decode::<Expression>(&mut data),
            Err(EncoderError::UnsupportedExpressionKind(ExpressionType::Loop))
        ));
    }

    #[test]
    fn test_mismatched_variant_is_rejected() {
        let x: Expression = Expression::parameter(int(), "x").into();
        let forged = Expression::Binary(BinaryExpression {
            node_type: ExpressionType::Negate,
            left: Box::new(x.clone()),
            right: Box::new(x),
            lift_to_null: false,
            method: None,
            conversion: None,
        });
        assert!(matches!(
            crate::encode(&forged),
            Err(EncoderError::InvalidExpression(_))
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut expression: Expression = Expression::parameter(int(), "x").into();
        for _ in 0..10 {
            expression = Expression::unary(ExpressionType::Negate, expression, int()).unwrap();
        }
        let config = ContainerConfig::default().with_max_depth(5);
        let container = CodecContainer::new(config);
        let mut buf = crate::encode(&expression).unwrap();
        assert!(matches!(
            container.decode::<Expression>(&mut buf),
            Err(EncoderError::Corrupt { .. })
        ));
    }
}
