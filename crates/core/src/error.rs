//! Domain errors with stable machine-readable codes.
//!
//! Every rejection a cart, order or tracking operation can produce maps to
//! exactly one code string. The HTTP layer renders that code verbatim as
//! `{"error": CODE}`, so the strings are part of the public contract.

use thiserror::Error;

use crate::types::{OrderStatus, Price};

/// Errors produced by pure domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommerceError {
    /// A cart line reference is neither an index nor a line id.
    #[error("malformed line reference")]
    BadLine,

    /// Quantity is missing or not a usable integer.
    #[error("invalid quantity")]
    BadQty,

    /// Product id is malformed.
    #[error("malformed product id")]
    BadProduct,

    /// The product defines variants but no complete option was chosen.
    #[error("product requires a variant and size")]
    OptionRequired,

    /// Referenced product or order does not exist.
    #[error("not found")]
    NotFound,

    /// Referenced line (or product) is not in the cart.
    #[error("line not in cart")]
    NotInCart,

    /// Checkout was requested from a cart with no lines.
    #[error("cart is empty")]
    CartEmpty,

    /// Checkout selection matched no cart lines.
    #[error("no cart lines selected")]
    NoItems,

    /// Submitted payment amount differs from the frozen order total.
    #[error("amount {submitted} does not match order total {expected}")]
    AmountMismatch {
        /// Order total.
        expected: Price,
        /// Amount submitted by the client.
        submitted: Price,
    },

    /// The order lifecycle does not allow this action from its current state.
    #[error("cannot {action} an order in status {from}")]
    InvalidTransition {
        /// Status at the time of the attempt.
        from: OrderStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// The requester does not own the resource.
    #[error("forbidden")]
    Forbidden,
}

impl CommerceError {
    /// Stable error code for API responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadLine => "BAD_LINE",
            Self::BadQty => "BAD_QTY",
            Self::BadProduct => "BAD_PRODUCT",
            Self::OptionRequired => "OPTION_REQUIRED",
            Self::NotFound => "NOT_FOUND",
            Self::NotInCart => "NOT_IN_CART",
            Self::CartEmpty => "CART_EMPTY",
            Self::NoItems => "NO_ITEMS",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Forbidden => "FORBIDDEN",
        }
    }
}
