//! Catalog types and option validation.
//!
//! Products are owned by the product-management service; this crate only
//! reads them. The one rule enforced here is the option contract: a product
//! with variants must be bought with a concrete variant and size, a product
//! without variants never carries an option.

use serde::{Deserialize, Serialize};

use crate::error::CommerceError;
use crate::types::{Price, ProductId};

/// A sellable product as exposed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
}

/// A color variant of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub color: String,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub sizes: Vec<SizeStock>,
}

/// A size within a variant, with its stock count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeStock {
    pub size: String,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub sku: Option<String>,
}

/// An option as submitted by a client. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionInput {
    #[serde(default)]
    pub variant_index: Option<usize>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
}

/// A validated option, denormalized for display at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineOption {
    pub variant_index: usize,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_hex: Option<String>,
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

impl LineOption {
    /// Key used to decide whether two lines hold the same option.
    ///
    /// The SKU when one is known, otherwise `"{variant_index}-{size}"`.
    #[must_use]
    pub fn key(&self) -> String {
        match &self.sku {
            Some(sku) if !sku.is_empty() => sku.clone(),
            _ => format!("{}-{}", self.variant_index, self.size),
        }
    }
}

/// Match key of a (product, option) pair: `"{product_id}::{option_key}"`.
#[must_use]
pub fn match_key(product_id: ProductId, option: Option<&LineOption>) -> String {
    let option_key = option.map(LineOption::key).unwrap_or_default();
    format!("{product_id}::{option_key}")
}

impl Product {
    /// Whether buying this product requires an option.
    #[must_use]
    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    /// Validate a client option against this product.
    ///
    /// Returns `None` for variant-less products (any submitted option is
    /// dropped). For products with variants, the variant index and size must
    /// both be present and must exist in the catalog. Color, color hex and SKU
    /// are filled from the catalog; a catalog SKU wins over a client one so
    /// that option keys stay consistent across clients.
    ///
    /// # Errors
    ///
    /// Returns `CommerceError::OptionRequired` if the option is missing,
    /// incomplete, or names a variant or size the product does not have.
    pub fn resolve_option(
        &self,
        input: Option<&OptionInput>,
    ) -> Result<Option<LineOption>, CommerceError> {
        if !self.has_variants() {
            return Ok(None);
        }

        let input = input.ok_or(CommerceError::OptionRequired)?;
        let variant_index = input.variant_index.ok_or(CommerceError::OptionRequired)?;
        let size = input
            .size
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(CommerceError::OptionRequired)?;

        let variant = self
            .variants
            .get(variant_index)
            .ok_or(CommerceError::OptionRequired)?;
        let size_stock = variant
            .sizes
            .iter()
            .find(|s| s.size == size)
            .ok_or(CommerceError::OptionRequired)?;

        let sku = size_stock
            .sku
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| input.sku.clone().filter(|s| !s.is_empty()));

        Ok(Some(LineOption {
            variant_index,
            color: variant.color.clone(),
            color_hex: variant.color_hex.clone().or_else(|| input.color_hex.clone()),
            size: size_stock.size.clone(),
            sku,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
pub(crate) mod tests {
    use super::*;

    /// Two-variant jacket: black (S, M with SKUs) and ivory (M without SKU).
    pub(crate) fn jacket() -> Product {
        Product {
            id: ProductId::new(1),
            name: "Cropped Jacket".to_string(),
            price: Price::new(39000),
            images: vec!["/img/jacket.jpg".to_string()],
            variants: vec![
                Variant {
                    color: "Black".to_string(),
                    color_hex: Some("#000000".to_string()),
                    sizes: vec![
                        SizeStock {
                            size: "S".to_string(),
                            stock: 3,
                            sku: Some("JK-BLK-S".to_string()),
                        },
                        SizeStock {
                            size: "M".to_string(),
                            stock: 5,
                            sku: Some("JK-BLK-M".to_string()),
                        },
                    ],
                },
                Variant {
                    color: "Ivory".to_string(),
                    color_hex: None,
                    sizes: vec![SizeStock {
                        size: "M".to_string(),
                        stock: 1,
                        sku: None,
                    }],
                },
            ],
        }
    }

    pub(crate) fn tote() -> Product {
        Product {
            id: ProductId::new(2),
            name: "Canvas Tote".to_string(),
            price: Price::new(12000),
            images: Vec::new(),
            variants: Vec::new(),
        }
    }

    pub(crate) fn pick(variant_index: usize, size: &str) -> OptionInput {
        OptionInput {
            variant_index: Some(variant_index),
            size: Some(size.to_string()),
            ..OptionInput::default()
        }
    }

    #[test]
    fn test_variant_product_requires_option() {
        let product = jacket();
        assert_eq!(
            product.resolve_option(None),
            Err(CommerceError::OptionRequired)
        );

        let missing_size = OptionInput {
            variant_index: Some(0),
            ..OptionInput::default()
        };
        assert_eq!(
            product.resolve_option(Some(&missing_size)),
            Err(CommerceError::OptionRequired)
        );

        let missing_variant = OptionInput {
            size: Some("M".to_string()),
            ..OptionInput::default()
        };
        assert_eq!(
            product.resolve_option(Some(&missing_variant)),
            Err(CommerceError::OptionRequired)
        );
    }

    #[test]
    fn test_unknown_variant_or_size_rejected() {
        let product = jacket();
        assert_eq!(
            product.resolve_option(Some(&pick(5, "M"))),
            Err(CommerceError::OptionRequired)
        );
        assert_eq!(
            product.resolve_option(Some(&pick(1, "S"))),
            Err(CommerceError::OptionRequired)
        );
    }

    #[test]
    fn test_option_is_denormalized_from_catalog() {
        let option = jacket()
            .resolve_option(Some(&pick(0, "M")))
            .unwrap()
            .unwrap();
        assert_eq!(option.color, "Black");
        assert_eq!(option.color_hex.as_deref(), Some("#000000"));
        assert_eq!(option.sku.as_deref(), Some("JK-BLK-M"));
        assert_eq!(option.key(), "JK-BLK-M");
    }

    #[test]
    fn test_key_falls_back_to_index_and_size() {
        let option = jacket()
            .resolve_option(Some(&pick(1, "M")))
            .unwrap()
            .unwrap();
        assert_eq!(option.key(), "1-M");
        assert_eq!(match_key(ProductId::new(1), Some(&option)), "1::1-M");
    }

    #[test]
    fn test_variantless_product_drops_option() {
        let product = tote();
        assert_eq!(product.resolve_option(None), Ok(None));
        assert_eq!(product.resolve_option(Some(&pick(0, "M"))), Ok(None));
        assert_eq!(match_key(product.id, None), "2::");
    }

    #[test]
    fn test_product_deserializes_from_catalog_json() {
        let json = r##"{
            "id": 3, "name": "Knit", "price": 25000,
            "variants": [{"color": "Navy", "sizes": [{"size": "F", "stock": 2}]}]
        }"##;
        let product: Product = serde_json::from_str(json).unwrap();
        assert!(product.has_variants());
        assert_eq!(product.variants[0].sizes[0].sku, None);
        assert!(product.images.is_empty());
    }
}
