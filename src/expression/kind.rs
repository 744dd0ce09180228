use crate::*;

macro_rules! expression_types {
    ($($name:ident = $value:literal,)*) => {
        /// Node type of an expression, with the conventional wire ordinals.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i32)]
        pub enum ExpressionType {
            $($name = $value,)*
        }

        impl ExpressionType {
            pub const ALL: &'static [ExpressionType] = &[$(ExpressionType::$name,)*];

            pub fn from_i32(value: i32) -> Option<Self> {
                match value {
                    $($value => Some(ExpressionType::$name),)*
                    _ => None,
                }
            }
        }
    };
}

expression_types! {
    Add = 0,
    AddChecked = 1,
    And = 2,
    AndAlso = 3,
    ArrayLength = 4,
    ArrayIndex = 5,
    Call = 6,
    Coalesce = 7,
    Conditional = 8,
    Constant = 9,
    Convert = 10,
    ConvertChecked = 11,
    Divide = 12,
    Equal = 13,
    ExclusiveOr = 14,
    GreaterThan = 15,
    GreaterThanOrEqual = 16,
    Invoke = 17,
    Lambda = 18,
    LeftShift = 19,
    LessThan = 20,
    LessThanOrEqual = 21,
    ListInit = 22,
    MemberAccess = 23,
    MemberInit = 24,
    Modulo = 25,
    Multiply = 26,
    MultiplyChecked = 27,
    Negate = 28,
    UnaryPlus = 29,
    NegateChecked = 30,
    New = 31,
    NewArrayInit = 32,
    NewArrayBounds = 33,
    Not = 34,
    NotEqual = 35,
    Or = 36,
    OrElse = 37,
    Parameter = 38,
    Power = 39,
    Quote = 40,
    RightShift = 41,
    Subtract = 42,
    SubtractChecked = 43,
    TypeAs = 44,
    TypeIs = 45,
    Assign = 46,
    Block = 47,
    DebugInfo = 48,
    Decrement = 49,
    Dynamic = 50,
    Default = 51,
    Extension = 52,
    Goto = 53,
    Increment = 54,
    Index = 55,
    Label = 56,
    RuntimeVariables = 57,
    Loop = 58,
    Switch = 59,
    Throw = 60,
    Try = 61,
    Unbox = 62,
    AddAssign = 63,
    AndAssign = 64,
    DivideAssign = 65,
    ExclusiveOrAssign = 66,
    LeftShiftAssign = 67,
    ModuloAssign = 68,
    MultiplyAssign = 69,
    OrAssign = 70,
    PowerAssign = 71,
    RightShiftAssign = 72,
    SubtractAssign = 73,
    AddAssignChecked = 74,
    MultiplyAssignChecked = 75,
    SubtractAssignChecked = 76,
    PreIncrementAssign = 77,
    PreDecrementAssign = 78,
    PostIncrementAssign = 79,
    PostDecrementAssign = 80,
    TypeEqual = 81,
    OnesComplement = 82,
    IsTrue = 83,
    IsFalse = 84,
}

/// Node class an [`ExpressionType`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeClass {
    Binary,
    Unary,
    Constant,
    Conditional,
    Invocation,
    Lambda,
    MethodCall,
    Member,
    MemberInit,
    New,
    NewArray,
    ListInit,
    Parameter,
    Index,
    TypeBinary,
    /// No wire codec: block, loop, switch, try, goto, label, default, dynamic,
    /// extension, debug-info and runtime-variables nodes.
    Unsupported,
}

impl ExpressionType {
    pub fn class(self) -> NodeClass {
        use ExpressionType::*;
        match self {
            Add | AddChecked | And | AndAlso | ArrayIndex | Coalesce | Divide | Equal
            | ExclusiveOr | GreaterThan | GreaterThanOrEqual | LeftShift | LessThan
            | LessThanOrEqual | Modulo | Multiply | MultiplyChecked | NotEqual | Or | OrElse
            | Power | RightShift | Subtract | SubtractChecked | Assign | AddAssign | AndAssign
            | DivideAssign | ExclusiveOrAssign | LeftShiftAssign | ModuloAssign
            | MultiplyAssign | OrAssign | PowerAssign | RightShiftAssign | SubtractAssign
            | AddAssignChecked | MultiplyAssignChecked | SubtractAssignChecked => NodeClass::Binary,
            ArrayLength | Convert | ConvertChecked | Negate | UnaryPlus | NegateChecked | Not
            | Quote | TypeAs | Decrement | Increment | Throw | Unbox | PreIncrementAssign
            | PreDecrementAssign | PostIncrementAssign | PostDecrementAssign | OnesComplement
            | IsTrue | IsFalse => NodeClass::Unary,
            Constant => NodeClass::Constant,
            Conditional => NodeClass::Conditional,
            Invoke => NodeClass::Invocation,
            Lambda => NodeClass::Lambda,
            Call => NodeClass::MethodCall,
            MemberAccess => NodeClass::Member,
            MemberInit => NodeClass::MemberInit,
            New => NodeClass::New,
            NewArrayInit | NewArrayBounds => NodeClass::NewArray,
            ListInit => NodeClass::ListInit,
            Parameter => NodeClass::Parameter,
            Index => NodeClass::Index,
            TypeIs | TypeEqual => NodeClass::TypeBinary,
            Block | DebugInfo | Dynamic | Default | Extension | Goto | Label | RuntimeVariables
            | Loop | Switch | Try => NodeClass::Unsupported,
        }
    }

    pub fn is_supported(self) -> bool {
        self.class() != NodeClass::Unsupported
    }
}

impl TryFrom<i32> for ExpressionType {
    type Error = EncoderError;

    fn try_from(value: i32) -> Result<Self> {
        ExpressionType::from_i32(value).ok_or_else(|| EncoderError::Corrupt {
            context: "expression node type",
            detail: format!("unknown node type {}", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals() {
        assert_eq!(ExpressionType::ALL.len(), 85);
        for (ordinal, ty) in ExpressionType::ALL.iter().enumerate() {
            assert_eq!(*ty as i32, ordinal as i32);
            assert_eq!(ExpressionType::from_i32(ordinal as i32), Some(*ty));
        }
        assert!(ExpressionType::try_from(85).is_err());
        assert!(ExpressionType::try_from(-1).is_err());
    }

    #[test]
    fn test_unsupported_kinds() {
        let unsupported: Vec<_> = ExpressionType::ALL
            .iter()
            .filter(|ty| !ty.is_supported())
            .collect();
        assert_eq!(unsupported.len(), 11);
    }
}
