//! Wire-name conversions for string-valued protocol enums
//!
//! Job statuses and similar enums travel as lowercase JSON strings.
//! [`impl_wire_str_conversions!`] derives `as_str`, a `VARIANTS` table,
//! `Display` and `FromStr` from one mapping, so the wire names live in one
//! place.
//!
//! # Example
//!
//! ```rust
//! use policylink_domain::impl_wire_str_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Transmission {
//!     Unicast,
//!     Broadcast,
//! }
//!
//! impl_wire_str_conversions!(Transmission {
//!     Unicast => "unicast",
//!     Broadcast => "broadcast",
//! });
//!
//! assert_eq!(Transmission::Broadcast.as_str(), "broadcast");
//! assert_eq!(" Unicast ".parse::<Transmission>().unwrap(), Transmission::Unicast);
//! ```

use thiserror::Error;

/// A string that names no variant of a wire enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} {value:?} (expected one of: {expected})")]
pub struct UnknownWireValue {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

#[macro_export]
macro_rules! impl_wire_str_conversions {
    ($enum_name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Every variant, in declaration order.
            pub const VARIANTS: &'static [Self] = &[$(Self::$variant),+];

            /// Name of this variant on the wire.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl ::std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $enum_name {
            type Err = $crate::macros::UnknownWireValue;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                let candidate = s.trim();
                Self::VARIANTS
                    .iter()
                    .copied()
                    .find(|variant| variant.as_str().eq_ignore_ascii_case(candidate))
                    .ok_or_else(|| $crate::macros::UnknownWireValue {
                        kind: stringify!($enum_name),
                        value: s.to_owned(),
                        expected: [$($wire),+].join(", "),
                    })
            }
        }
    };
}
