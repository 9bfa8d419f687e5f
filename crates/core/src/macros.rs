// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros.
//!
//! [`label_enum!`] gives a status-like enum a stable lowercase label: an
//! inherent `label()` returning `&'static str`, plus a `Display` impl that
//! writes it. Labels double as the wire spelling in log lines and reasons,
//! so they are declared next to the variants rather than derived from names.

/// Attach `label()` and `Display` to an enum.
///
/// Variants map to string literals with `:`. Data-carrying variants ignore
/// their fields with `(..)` or `{ .. }`.
///
/// ```ignore
/// crate::label_enum! {
///     MyEnum {
///         Plain: "plain",
///         Tuple(..): "tuple",
///         Struct { .. }: "struct",
///     }
/// }
/// ```
#[macro_export]
macro_rules! label_enum {
    (
        $ty:ident {
            $( $variant:ident $( ( $($tuple:tt)* ) )? $( { $($fields:tt)* } )? : $label:literal ),+ $(,)?
        }
    ) => {
        impl $ty {
            /// Stable lowercase label for logs and wire formats.
            pub fn label(&self) -> &'static str {
                match self {
                    $( Self::$variant $( ( $($tuple)* ) )? $( { $($fields)* } )? => $label, )+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}
