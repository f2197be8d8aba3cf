//! Conversion from raw Mercado Livre items to [`NormalizedProduct`].

use casadigital_core::{AffiliateRegistry, NormalizedProduct, Platform};
use rust_decimal::Decimal;

use crate::affiliate::build_affiliate_url;
use crate::error::MarketplaceError;
use crate::types::Item;

/// Normalizes a listing and attaches its affiliate link.
///
/// `description` is the plain-text description fetched separately; when it
/// is absent the listing subtitle is used instead. `affiliate_url` is set
/// only when rewriting actually changed the permalink.
///
/// # Errors
///
/// Returns [`MarketplaceError::Normalization`] if the item has no permalink
/// or no usable price.
pub fn normalize_item(
    item: Item,
    description: Option<String>,
    affiliates: &AffiliateRegistry,
) -> Result<NormalizedProduct, MarketplaceError> {
    let platform = Platform::MercadoLivre;

    let product_url = item
        .permalink
        .filter(|p| !p.is_empty())
        .ok_or_else(|| MarketplaceError::Normalization {
            external_id: item.id.clone(),
            reason: "item has no permalink".to_string(),
        })?;

    let price = item
        .price
        .and_then(to_decimal)
        .ok_or_else(|| MarketplaceError::Normalization {
            external_id: item.id.clone(),
            reason: "item has no usable price".to_string(),
        })?;

    let affiliate_url = Some(build_affiliate_url(affiliates, platform.as_str(), &product_url))
        .filter(|rewritten| *rewritten != product_url);

    let image_url = item
        .pictures
        .iter()
        .find_map(|p| p.secure_url.clone().or_else(|| p.url.clone()))
        .or(item.thumbnail)
        .filter(|u| !u.is_empty());

    let brand = item
        .attributes
        .iter()
        .find(|a| a.id == "BRAND")
        .and_then(|a| a.value_name.clone())
        .filter(|b| !b.trim().is_empty());

    let description = description
        .filter(|d| !d.trim().is_empty())
        .or(item.subtitle)
        .filter(|d| !d.trim().is_empty());

    Ok(NormalizedProduct {
        external_id: item.id,
        platform: platform.as_str().to_string(),
        title: item.title,
        description,
        price,
        sale_price: item.original_price.and_then(to_decimal),
        image_url,
        product_url,
        affiliate_url,
        category: item.category_id,
        brand,
        available: item.available_quantity > 0,
    })
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok().map(|d| d.round_dp(2))
}

#[cfg(test)]
mod tests {
    use casadigital_core::AffiliateConfig;

    use super::*;
    use crate::types::{Attribute, Picture};

    fn make_item() -> Item {
        Item {
            id: "MLB3456789012".to_string(),
            title: "Smartphone Galaxy A55 128GB".to_string(),
            subtitle: None,
            price: Some(1999.9),
            original_price: Some(2499.0),
            currency_id: Some("BRL".to_string()),
            available_quantity: 5,
            thumbnail: Some("http://http2.mlstatic.com/D_thumb.jpg".to_string()),
            permalink: Some(
                "https://produto.mercadolivre.com.br/MLB-3456789012-smartphone-_JM".to_string(),
            ),
            category_id: Some("MLB1055".to_string()),
            pictures: vec![],
            attributes: vec![],
        }
    }

    fn configured() -> AffiliateRegistry {
        AffiliateRegistry::new().with(
            Platform::MercadoLivre,
            AffiliateConfig::new("casadigital", None, None).expect("valid config"),
        )
    }

    #[test]
    fn normalizes_core_fields() {
        let product = normalize_item(make_item(), None, &AffiliateRegistry::new()).unwrap();
        assert_eq!(product.external_id, "MLB3456789012");
        assert_eq!(product.platform, "mercadolivre");
        assert_eq!(product.price, Decimal::new(199_990, 2));
        assert_eq!(product.sale_price, Some(Decimal::new(2499, 0)));
        assert_eq!(product.category.as_deref(), Some("MLB1055"));
        assert!(product.available);
        assert_eq!(
            product.image_url.as_deref(),
            Some("http://http2.mlstatic.com/D_thumb.jpg")
        );
    }

    #[test]
    fn affiliate_url_absent_when_platform_unconfigured() {
        let product = normalize_item(make_item(), None, &AffiliateRegistry::new()).unwrap();
        assert_eq!(product.affiliate_url, None);
        assert_eq!(
            product.product_url,
            "https://produto.mercadolivre.com.br/MLB-3456789012-smartphone-_JM"
        );
    }

    #[test]
    fn affiliate_url_set_and_permalink_preserved_when_configured() {
        let product = normalize_item(make_item(), None, &configured()).unwrap();
        assert_eq!(
            product.affiliate_url.as_deref(),
            Some(
                "https://www.mercadolivre.com.br/link/redirect?id=MLB3456789012&platform=ml\
                 &referer=casadigital&utm_source=casadigital&utm_medium=affiliate"
            )
        );
        assert!(product.product_url.starts_with("https://produto.mercadolivre.com.br/"));
    }

    #[test]
    fn prefers_first_picture_and_brand_attribute() {
        let mut item = make_item();
        item.pictures = vec![
            Picture {
                url: Some("http://http2.mlstatic.com/D_1.jpg".to_string()),
                secure_url: Some("https://http2.mlstatic.com/D_1.jpg".to_string()),
            },
            Picture {
                url: Some("http://http2.mlstatic.com/D_2.jpg".to_string()),
                secure_url: None,
            },
        ];
        item.attributes = vec![
            Attribute {
                id: "MODEL".to_string(),
                value_name: Some("A55".to_string()),
            },
            Attribute {
                id: "BRAND".to_string(),
                value_name: Some("Samsung".to_string()),
            },
        ];
        let product = normalize_item(item, None, &AffiliateRegistry::new()).unwrap();
        assert_eq!(
            product.image_url.as_deref(),
            Some("https://http2.mlstatic.com/D_1.jpg")
        );
        assert_eq!(product.brand.as_deref(), Some("Samsung"));
    }

    #[test]
    fn description_falls_back_to_subtitle() {
        let mut item = make_item();
        item.subtitle = Some("Tela 6.6\"".to_string());
        let product = normalize_item(item.clone(), None, &AffiliateRegistry::new()).unwrap();
        assert_eq!(product.description.as_deref(), Some("Tela 6.6\""));

        let product = normalize_item(
            item,
            Some("Descrição completa".to_string()),
            &AffiliateRegistry::new(),
        )
        .unwrap();
        assert_eq!(product.description.as_deref(), Some("Descrição completa"));
    }

    #[test]
    fn blank_description_falls_back_to_subtitle() {
        let mut item = make_item();
        item.subtitle = Some("Tela 6.6\"".to_string());
        let product =
            normalize_item(item, Some(String::new()), &AffiliateRegistry::new()).unwrap();
        assert_eq!(product.description.as_deref(), Some("Tela 6.6\""));
    }

    #[test]
    fn out_of_stock_item_is_unavailable() {
        let mut item = make_item();
        item.available_quantity = 0;
        let product = normalize_item(item, None, &AffiliateRegistry::new()).unwrap();
        assert!(!product.available);
    }

    #[test]
    fn missing_permalink_or_price_is_an_error() {
        let mut item = make_item();
        item.permalink = None;
        let err = normalize_item(item, None, &AffiliateRegistry::new()).unwrap_err();
        assert!(matches!(err, MarketplaceError::Normalization { .. }));

        let mut item = make_item();
        item.price = None;
        let err = normalize_item(item, None, &AffiliateRegistry::new()).unwrap_err();
        assert!(matches!(err, MarketplaceError::Normalization { .. }));
    }
}
