//! Request body and path parsing shared by the JSON handlers.
//!
//! Ids and quantities arrive as loosely typed JSON (numbers or numeric
//! strings). They are parsed here so that each malformed field maps to its
//! own error code instead of a generic body rejection.

use axum::body::Bytes;
use axum::extract::FromRequest;
use serde::de::DeserializeOwned;
use serde_json::Value;

use threadline_core::cart::LineRef;
use threadline_core::{CommerceError, OrderId, ProductId};

use crate::error::AppError;

/// JSON body extractor that rejects with `BAD_REQUEST`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Parse an optional JSON body; an empty body yields the default.
///
/// # Errors
///
/// Returns `BAD_REQUEST` if the body is present but not valid JSON for `T`.
pub fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Parse a product id from a JSON number or numeric string.
///
/// # Errors
///
/// Returns `BAD_PRODUCT` for anything else.
pub fn product_id(value: &Value) -> Result<ProductId, CommerceError> {
    let raw = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    raw.and_then(|id| i32::try_from(id).ok())
        .filter(|id| *id > 0)
        .map(ProductId::new)
        .ok_or(CommerceError::BadProduct)
}

/// Parse a product id path segment.
///
/// # Errors
///
/// Returns `BAD_PRODUCT` if the segment is not a positive integer.
pub fn product_id_segment(segment: &str) -> Result<ProductId, CommerceError> {
    product_id(&Value::String(segment.to_string()))
}

/// Parse a quantity from a JSON integer or numeric string.
///
/// # Errors
///
/// Returns `BAD_QTY` for anything else.
pub fn quantity(value: &Value) -> Result<i64, CommerceError> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or(CommerceError::BadQty)
}

/// Parse an optional quantity, falling back to `default` when absent.
///
/// # Errors
///
/// Returns `BAD_QTY` if the value is present but not an integer.
pub fn quantity_or(value: Option<&Value>, default: i64) -> Result<i64, CommerceError> {
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(v) => quantity(v),
    }
}

/// Parse a line reference from a JSON index or line id.
///
/// # Errors
///
/// Returns `BAD_LINE` for negative numbers, non-UUID strings and other types.
pub fn line_ref(value: &Value) -> Result<LineRef, CommerceError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .map(LineRef::Index)
            .ok_or(CommerceError::BadLine),
        Value::String(s) => s.parse(),
        _ => Err(CommerceError::BadLine),
    }
}

/// Parse an order id path segment.
///
/// # Errors
///
/// Returns `BAD_REQUEST` if the segment is not an integer.
pub fn order_id(segment: &str) -> Result<OrderId, AppError> {
    segment
        .parse::<OrderId>()
        .map_err(|_| AppError::BadRequest(format!("invalid order id: {segment}")))
}

/// Require a field, rejecting with `BAD_REQUEST` when absent.
///
/// # Errors
///
/// Returns `BAD_REQUEST` naming the field.
pub fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::BadRequest(format!("missing field: {field}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_product_id_forms() {
        assert_eq!(product_id(&json!(12)).unwrap(), ProductId::new(12));
        assert_eq!(product_id(&json!(" 12 ")).unwrap(), ProductId::new(12));
        assert_eq!(product_id(&json!("abc")), Err(CommerceError::BadProduct));
        assert_eq!(product_id(&json!(-3)), Err(CommerceError::BadProduct));
        assert_eq!(product_id(&json!(1.5)), Err(CommerceError::BadProduct));
        assert_eq!(product_id(&json!(null)), Err(CommerceError::BadProduct));
    }

    #[test]
    fn test_quantity_forms() {
        assert_eq!(quantity_or(None, 1).unwrap(), 1);
        assert_eq!(quantity_or(Some(&json!(null)), 1).unwrap(), 1);
        assert_eq!(quantity_or(Some(&json!("3")), 1).unwrap(), 3);
        assert_eq!(quantity_or(Some(&json!(-2)), 1).unwrap(), -2);
        assert_eq!(quantity_or(Some(&json!("two")), 1), Err(CommerceError::BadQty));
        assert_eq!(quantity_or(Some(&json!([1])), 1), Err(CommerceError::BadQty));
    }

    #[test]
    fn test_line_ref_forms() {
        assert_eq!(line_ref(&json!(2)).unwrap(), LineRef::Index(2));
        assert_eq!(line_ref(&json!("2")).unwrap(), LineRef::Index(2));
        assert_eq!(line_ref(&json!(-1)), Err(CommerceError::BadLine));
        assert_eq!(line_ref(&json!("first")), Err(CommerceError::BadLine));
        assert_eq!(line_ref(&json!({"index": 0})), Err(CommerceError::BadLine));

        let id = "0b7c6f5e-7d0e-4d55-9a53-2f7f5e3b9a10";
        assert!(matches!(line_ref(&json!(id)).unwrap(), LineRef::Id(_)));
    }

    #[test]
    fn test_optional_json_empty_body() {
        #[derive(Debug, Default, serde::Deserialize, PartialEq)]
        struct Body {
            #[serde(default)]
            flag: bool,
        }

        assert_eq!(optional_json::<Body>(&Bytes::new()).unwrap(), Body::default());
        assert!(optional_json::<Body>(&Bytes::from_static(b"{\"flag\": true}")).unwrap().flag);
        assert!(optional_json::<Body>(&Bytes::from_static(b"{")).is_err());
    }
}
