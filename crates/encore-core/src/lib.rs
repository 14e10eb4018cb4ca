//! # encore-core: Pure Financial Logic for Encore Finance
//!
//! This crate holds the document model and arithmetic of the booking
//! finance engine as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Encore Finance Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │     Booking platform (webhooks, HTTP handlers, admin tools)     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ status changes, manual requests       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │      encore-finance (services, dispatcher, render worker)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ encore-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   money   │  │  invoice  │  │  payout   │  │transaction│  │   │
//! │  │   │   Money   │  │  stages   │  │  split    │  │   fees    │  │   │
//! │  │   │   Rate    │  │  totals   │  │  status   │  │  status   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  booking  │  │ numbering │  │  receipt  │  │ document  │  │   │
//! │  │   │ lifecycle │  │  formats  │  │  linkage  │  │  (union)  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  encore-db (Database Layer)                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Integer Money**: amounts are cents (i64), rates are basis points
//! 2. **Injected Time**: functions that stamp dates take `now` as an argument
//! 3. **Closed Types**: every status and kind is an enum, documents are a
//!    tagged union
//!
//! ## Example Usage
//!
//! ```rust
//! use encore_core::money::{Money, Rate};
//! use encore_core::invoice::InvoiceTotals;
//!
//! let totals = InvoiceTotals::compute(Money::from_cents(500000), Rate::from_bps(800)).unwrap();
//! assert_eq!(totals.total.to_string(), "5400.00");
//! ```

/// Implements `ALL`, `as_str`, `Display` and `FromStr` for a fieldless
/// enum stored as text.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::error::ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::error::ValidationError::not_allowed(
                        stringify!($name),
                        &[$($text),+],
                    )),
                }
            }
        }
    };
}

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod booking;
pub mod document;
pub mod error;
pub mod invoice;
pub mod linkage;
pub mod money;
pub mod numbering;
pub mod payout;
pub mod receipt;
pub mod transaction;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Rate};
pub use document::{FinancialDocument, RenderTarget};
pub use types::*;
