//! Operator boilerplate for single-field numeric newtypes.

/// Implements an arithmetic operator trait for a newtype wrapping a single numeric field.
///
/// * `binary` implements `Trait<Self> for Self`
/// * `inplace` implements `TraitAssign<Self> for Self`
/// * `unary` implements a unary operator such as `Neg`
#[macro_export]
macro_rules! op {
    (binary $type:ty, $trait:ident, $fn:ident) => {
        impl $trait for $type {
            type Output = Self;

            fn $fn(self, rhs: Self) -> Self::Output {
                Self(self.0.$fn(rhs.0))
            }
        }
    };
    (inplace $type:ty, $trait:ident, $fn:ident) => {
        impl $trait for $type {
            fn $fn(&mut self, rhs: Self) {
                self.0.$fn(rhs.0)
            }
        }
    };
    (unary $type:ty, $trait:ident, $fn:ident) => {
        impl $trait for $type {
            type Output = Self;

            fn $fn(self) -> Self::Output {
                Self(self.0.$fn())
            }
        }
    };
}
