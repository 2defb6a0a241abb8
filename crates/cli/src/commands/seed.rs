//! Seed the catalog from a YAML file for local development.
//!
//! The product service owns the catalog in production; this command only
//! exists so that a fresh database has something to put in a cart.
//!
//! ```yaml
//! - id: 1
//!   name: Cropped Jacket
//!   price: 39000
//!   images: [/img/jacket.jpg]
//!   variants:
//!     - color: Black
//!       colorHex: "#000000"
//!       sizes:
//!         - { size: S, stock: 3, sku: JK-BLK-S }
//! ```

use std::collections::HashSet;
use std::path::Path;

use tracing::{error, info};

use threadline_core::catalog::Product;
use threadline_storefront::db::ProductRepository;

use super::connect;

/// Check a parsed catalog before touching the database.
///
/// Returns one message per problem.
pub fn validate_catalog(products: &[Product]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for product in products {
        if !seen.insert(product.id) {
            errors.push(format!("duplicate product id {}", product.id));
        }
        if product.name.trim().is_empty() {
            errors.push(format!("product {} has no name", product.id));
        }
        if product.price.amount() < 0 {
            errors.push(format!("product {} has a negative price", product.id));
        }
        for (index, variant) in product.variants.iter().enumerate() {
            if variant.sizes.is_empty() {
                errors.push(format!(
                    "product {} variant {index} ({}) has no sizes",
                    product.id, variant.color
                ));
            }
        }
    }

    errors
}

/// Upsert every product in `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, the catalog is
/// invalid, or a database operation fails.
pub async fn catalog(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");
    let content = tokio::fs::read_to_string(path).await?;
    let products: Vec<Product> = serde_yaml::from_str(&content)?;
    info!(products = products.len(), "Parsed catalog");

    let errors = validate_catalog(&products);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let (_, pool) = connect().await?;
    let repo = ProductRepository::new(&pool);
    for product in &products {
        repo.upsert(product).await?;
    }
    repo.sync_id_sequence().await?;

    info!(products = products.len(), "Catalog seeded");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CATALOG: &str = r##"
- id: 1
  name: Cropped Jacket
  price: 39000
  images: [/img/jacket.jpg]
  variants:
    - color: Black
      colorHex: "#000000"
      sizes:
        - { size: S, stock: 3, sku: JK-BLK-S }
        - { size: M, stock: 5 }
- id: 2
  name: Canvas Tote
  price: 12000
"##;

    #[test]
    fn test_parse_catalog_yaml() {
        let products: Vec<Product> = serde_yaml::from_str(CATALOG).unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].variants[0].sizes[1].sku, None);
        assert!(products[1].variants.is_empty());
        assert!(validate_catalog(&products).is_empty());
    }

    #[test]
    fn test_validation_reports_each_problem() {
        let mut products: Vec<Product> = serde_yaml::from_str(CATALOG).unwrap();
        products[1].id = products[0].id;
        products[1].name = " ".to_string();
        products[0].variants[0].sizes.clear();

        let errors = validate_catalog(&products);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("duplicate product id 1")));
    }
}
