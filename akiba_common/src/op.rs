/// Generates the boilerplate for arithmetic operator impls on single-field tuple structs.
///
/// `op!(binary Cents, Add, add)` expands to an `Add` impl that applies `add` to the inner values.
/// `inplace` and `unary` variants cover the assignment and negation cases.
#[macro_export]
macro_rules! op {
    (binary $ty:ty, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $fn(self, rhs: Self) -> Self::Output {
                Self(std::ops::$trait::$fn(self.0, rhs.0))
            }
        }
    };
    (inplace $ty:ty, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $ty {
            fn $fn(&mut self, rhs: Self) {
                std::ops::$trait::$fn(&mut self.0, rhs.0)
            }
        }
    };
    (unary $ty:ty, $trait:ident, $fn:ident) => {
        impl std::ops::$trait for $ty {
            type Output = Self;

            fn $fn(self) -> Self::Output {
                Self(std::ops::$trait::$fn(self.0))
            }
        }
    };
}
