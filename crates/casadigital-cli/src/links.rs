//! Affiliate link command handlers.

use casadigital_core::{AffiliateRegistry, AppConfig, Platform};

/// Rewrite `url` into the configured affiliate form and print it.
///
/// # Errors
///
/// Returns an error if `platform` is not a supported marketplace.
pub(crate) fn run_convert(config: &AppConfig, platform: &str, url: &str) -> anyhow::Result<()> {
    let converted = convert_url(&config.affiliates, platform, url)?;
    if converted == url {
        tracing::warn!(
            platform,
            "link unchanged; affiliate id missing or no product id in the URL"
        );
    }
    println!("{converted}");
    Ok(())
}

pub(crate) fn convert_url(
    affiliates: &AffiliateRegistry,
    platform: &str,
    url: &str,
) -> anyhow::Result<String> {
    let platform: Platform = platform.parse()?;
    Ok(casadigital_marketplace::build_affiliate_url(
        affiliates,
        platform.as_str(),
        url.trim(),
    ))
}

/// Print affiliate link coverage, optionally for a single platform.
///
/// # Errors
///
/// Returns an error if the platform is unsupported or the counts cannot be
/// read.
pub(crate) async fn run_stats(pool: &sqlx::PgPool, platform: Option<&str>) -> anyhow::Result<()> {
    let platform = platform.map(str::parse::<Platform>).transpose()?;
    let stats =
        casadigital_db::get_affiliate_stats(pool, platform.map(Platform::as_str)).await?;

    println!("platform: {}", platform.map_or("all", Platform::as_str));
    println!("total products: {}", stats.total_products);
    println!("with affiliate url: {}", stats.with_affiliate_url);
    println!("without affiliate url: {}", stats.without_affiliate_url);
    println!("coverage: {:.2}%", stats.coverage_percentage());
    Ok(())
}

/// Clear stored affiliate links that do not point at a known affiliate
/// endpoint. Recorded as an `affiliate_validation` run.
///
/// # Errors
///
/// Returns an error if the platform is unsupported or the sweep fails.
pub(crate) async fn run_validate_links(pool: &sqlx::PgPool, platform: &str) -> anyhow::Result<()> {
    let platform: Platform = platform.parse()?;
    let run = casadigital_sync::queue_run(
        pool,
        casadigital_sync::RunType::AffiliateValidation,
        casadigital_sync::Trigger::Cli,
        None,
        Some(platform.as_str()),
    )
    .await?;

    let cleared =
        casadigital_sync::execute_affiliate_validation(pool, &run, platform.as_str()).await?;
    println!("cleared {cleared} invalid affiliate links ({platform})");
    Ok(())
}

#[cfg(test)]
mod tests {
    use casadigital_core::{AffiliateConfig, AffiliateRegistry, NormalizedProduct, Platform};
    use rust_decimal::Decimal;

    use super::*;

    fn registry() -> AffiliateRegistry {
        AffiliateRegistry::new().with(
            Platform::MercadoLivre,
            AffiliateConfig::new("casadigital", None, None).expect("affiliate config"),
        )
    }

    #[test]
    fn convert_rewrites_product_urls() {
        let converted = convert_url(
            &registry(),
            "MercadoLivre",
            " https://produto.mercadolivre.com.br/MLB-1234567890-fone-_JM ",
        )
        .unwrap();
        assert!(converted
            .starts_with("https://www.mercadolivre.com.br/link/redirect?id=MLB1234567890"));
    }

    #[test]
    fn convert_leaves_urls_without_product_id() {
        let url = "https://www.mercadolivre.com.br/ofertas";
        assert_eq!(convert_url(&registry(), "mercadolivre", url).unwrap(), url);
    }

    #[test]
    fn convert_rejects_unknown_platform() {
        assert!(convert_url(&registry(), "shopee", "https://shopee.com.br/x").is_err());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn validate_links_clears_invalid_urls_and_records_run(pool: sqlx::PgPool) {
        for (id, link) in [
            ("MLB1", "https://www.mercadolivre.com.br/link/redirect?id=MLB1"),
            ("MLB2", "https://example.com/not-affiliate"),
        ] {
            let product = NormalizedProduct {
                external_id: id.to_string(),
                platform: "mercadolivre".to_string(),
                title: id.to_string(),
                description: None,
                price: Decimal::TEN,
                sale_price: None,
                image_url: None,
                product_url: format!("https://produto.mercadolivre.com.br/{id}"),
                affiliate_url: Some(link.to_string()),
                category: None,
                brand: None,
                available: true,
            };
            casadigital_db::upsert_product(&pool, &product)
                .await
                .expect("seed product");
        }

        run_validate_links(&pool, "mercadolivre")
            .await
            .expect("validate links");

        let stats = casadigital_db::get_affiliate_stats(&pool, Some("mercadolivre"))
            .await
            .expect("stats");
        assert_eq!(stats.with_affiliate_url, 1);

        let runs = casadigital_db::list_sync_runs(&pool, 1).await.expect("runs");
        assert_eq!(runs[0].run_type, "affiliate_validation");
        assert_eq!(runs[0].trigger_source, "cli");
        assert_eq!(runs[0].status, "succeeded");
        assert_eq!(runs[0].records_processed, 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn stats_rejects_unknown_platform(pool: sqlx::PgPool) {
        assert!(run_stats(&pool, Some("amazon")).await.is_err());
        run_stats(&pool, None).await.expect("stats for all platforms");
    }
}
