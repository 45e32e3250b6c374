//! Bounded numeric wrappers carrying validated ranges in the type.

use std::fmt;

/// Out-of-range error for bounded numeric wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("value {value} is outside [{min}, {max}]")]
pub struct BoundsError<T: fmt::Display + fmt::Debug> {
    /// Raw value provided.
    pub value: T,
    /// Inclusive minimum.
    pub min: T,
    /// Inclusive maximum.
    pub max: T,
}

macro_rules! bounded_int {
    ($(#[$meta:meta])* $name:ident, $int:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name<const MIN: $int, const MAX: $int>($int);

        impl<const MIN: $int, const MAX: $int> $name<MIN, MAX> {
            /// Wrap `value` when it lies within `[MIN, MAX]`.
            pub const fn new(value: $int) -> Option<Self> {
                if value < MIN || value > MAX {
                    None
                } else {
                    Some(Self(value))
                }
            }

            /// Wrap `value` or report the violated range.
            pub const fn try_new(value: $int) -> Result<Self, BoundsError<$int>> {
                match Self::new(value) {
                    Some(bounded) => Ok(bounded),
                    None => Err(BoundsError {
                        value,
                        min: MIN,
                        max: MAX,
                    }),
                }
            }

            /// Return the wrapped value.
            pub const fn get(self) -> $int {
                self.0
            }
        }

        impl<const MIN: $int, const MAX: $int> fmt::Display for $name<MIN, MAX> {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

bounded_int!(
    /// Bounded `u32` with const generic limits.
    BoundedU32,
    u32
);
bounded_int!(
    /// Bounded `u64` with const generic limits.
    BoundedU64,
    u64
);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type Percent = BoundedU32<1, 100>;

    #[test]
    fn rejects_values_outside_range() {
        assert!(Percent::new(0).is_none());
        assert_eq!(Percent::new(50).map(Percent::get), Some(50));
        assert_eq!(
            Percent::try_new(101),
            Err(BoundsError {
                value: 101,
                min: 1,
                max: 100
            })
        );
        assert_eq!(
            BoundsError {
                value: 7u64,
                min: 1,
                max: 5
            }
            .to_string(),
            "value 7 is outside [1, 5]"
        );
    }

    proptest! {
        #[test]
        fn accepts_exactly_the_inclusive_range(value in 0u64..20_000) {
            let bounded = BoundedU64::<100, 10_000>::new(value);
            prop_assert_eq!(bounded.is_some(), (100..=10_000).contains(&value));
        }
    }
}
