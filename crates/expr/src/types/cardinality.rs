use bitflags::bitflags;
use core::fmt;

bitflags! {
    /// Static occurrence bounds of an expression.
    ///
    /// A cardinality is the set of sequence lengths an expression may
    /// produce: zero, exactly one, or more than one. Computed cardinalities
    /// may be wider than the runtime behaviour, never narrower.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct Cardinality: u8 {
        const ALLOWS_ZERO = 1 << 0;
        const ALLOWS_ONE = 1 << 1;
        const ALLOWS_MANY = 1 << 2;

        const EMPTY = Self::ALLOWS_ZERO.bits();
        const EXACTLY_ONE = Self::ALLOWS_ONE.bits();
        const ZERO_OR_ONE = Self::ALLOWS_ZERO.bits() | Self::ALLOWS_ONE.bits();
        const ONE_OR_MORE = Self::ALLOWS_ONE.bits() | Self::ALLOWS_MANY.bits();
        const ZERO_OR_MORE = Self::ALLOWS_ZERO.bits() | Self::ALLOWS_ONE.bits() | Self::ALLOWS_MANY.bits();
    }
}

impl Cardinality {
    pub fn allows_zero(self) -> bool {
        self.contains(Self::ALLOWS_ZERO)
    }

    pub fn allows_one(self) -> bool {
        self.contains(Self::ALLOWS_ONE)
    }

    pub fn allows_many(self) -> bool {
        self.contains(Self::ALLOWS_MANY)
    }

    /// True when only the empty sequence is possible.
    pub fn is_empty_sequence(self) -> bool {
        self == Self::EMPTY
    }

    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::EMPTY,
            1 => Self::EXACTLY_ONE,
            _ => Self::ALLOWS_MANY,
        }
    }

    /// Whether a sequence of `count` items satisfies this cardinality.
    pub fn admits(self, count: usize) -> bool {
        self.contains(Self::from_count(count))
    }

    /// Cardinality of the concatenation of two sequences.
    pub fn sum(self, other: Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return self | other;
        }
        let mut out = Self::empty();
        if self.allows_zero() && other.allows_zero() {
            out |= Self::ALLOWS_ZERO;
        }
        if (self.allows_one() && other.allows_zero()) || (self.allows_zero() && other.allows_one()) {
            out |= Self::ALLOWS_ONE;
        }
        if self.allows_many() || other.allows_many() || (self.allows_one() && other.allows_one()) {
            out |= Self::ALLOWS_MANY;
        }
        out
    }

    /// Cardinality of a mapping: `other` evaluated once per item of `self`.
    pub fn multiply(self, other: Self) -> Self {
        if self == Self::EMPTY || other == Self::EMPTY {
            return Self::EMPTY;
        }
        if other == Self::EXACTLY_ONE {
            return self;
        }
        if self == Self::EXACTLY_ONE {
            return other;
        }
        if self == Self::ZERO_OR_ONE && other == Self::ZERO_OR_ONE {
            return Self::ZERO_OR_ONE;
        }
        if self == Self::ONE_OR_MORE && other == Self::ONE_OR_MORE {
            return Self::ONE_OR_MORE;
        }
        Self::ZERO_OR_MORE
    }

    pub fn occurrence_indicator(self) -> &'static str {
        if self == Self::EXACTLY_ONE {
            ""
        } else if self == Self::ZERO_OR_ONE {
            "?"
        } else if self == Self::ONE_OR_MORE {
            "+"
        } else {
            "*"
        }
    }

    pub fn describe(self) -> &'static str {
        if self == Self::EMPTY {
            "empty"
        } else if self == Self::EXACTLY_ONE {
            "exactly one"
        } else if self == Self::ZERO_OR_ONE {
            "zero or one"
        } else if self == Self::ONE_OR_MORE {
            "one or more"
        } else if self == Self::ALLOWS_MANY {
            "more than one"
        } else {
            "zero or more"
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}
