use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A marketplace listing normalized for storage and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedProduct {
    /// Marketplace item id, e.g. `"MLB3456789012"`.
    pub external_id: String,
    /// Platform name, e.g. `"mercadolivre"`.
    pub platform: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    /// Pre-discount price reported by the marketplace, if any.
    pub sale_price: Option<Decimal>,
    pub image_url: Option<String>,
    /// The marketplace permalink, exactly as returned by the API.
    pub product_url: String,
    /// Tracking link for `product_url`; `None` when no rewrite applied.
    pub affiliate_url: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub available: bool,
}

impl NormalizedProduct {
    /// The URL to show end users: the affiliate link when one exists.
    #[must_use]
    pub fn public_url(&self) -> &str {
        self.affiliate_url.as_deref().unwrap_or(&self.product_url)
    }

    /// Returns `true` if the listing is discounted relative to its sale price.
    #[must_use]
    pub fn is_discounted(&self) -> bool {
        self.sale_price.is_some_and(|original| original > self.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_product(affiliate_url: Option<&str>) -> NormalizedProduct {
        NormalizedProduct {
            external_id: "MLB123".to_string(),
            platform: "mercadolivre".to_string(),
            title: "Smartphone X".to_string(),
            description: None,
            price: Decimal::new(199_990, 2),
            sale_price: Some(Decimal::new(249_990, 2)),
            image_url: None,
            product_url: "https://produto.mercadolivre.com.br/MLB-123-smartphone".to_string(),
            affiliate_url: affiliate_url.map(ToOwned::to_owned),
            category: Some("MLB1051".to_string()),
            brand: None,
            available: true,
        }
    }

    #[test]
    fn public_url_prefers_affiliate_link() {
        let product = make_product(Some("https://www.mercadolivre.com.br/link/redirect?id=MLB123"));
        assert_eq!(
            product.public_url(),
            "https://www.mercadolivre.com.br/link/redirect?id=MLB123"
        );
    }

    #[test]
    fn public_url_falls_back_to_permalink() {
        let product = make_product(None);
        assert_eq!(
            product.public_url(),
            "https://produto.mercadolivre.com.br/MLB-123-smartphone"
        );
    }

    #[test]
    fn is_discounted_compares_against_original_price() {
        let mut product = make_product(None);
        assert!(product.is_discounted());
        product.sale_price = None;
        assert!(!product.is_discounted());
    }

    #[test]
    fn serde_roundtrip_keeps_decimal_precision() {
        let product = make_product(None);
        let json = serde_json::to_string(&product).expect("serialization failed");
        assert!(json.contains("\"price\":\"1999.90\""));
        let decoded: NormalizedProduct = serde_json::from_str(&json).expect("deserialization failed");
        assert_eq!(decoded, product);
    }
}
