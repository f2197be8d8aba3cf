//! Rewriting marketplace product URLs into affiliate tracking links.
//!
//! Rewriting never fails: when the platform has no affiliate configuration,
//! no product id can be found, or the redirect URL cannot be built, the input
//! URL is returned unchanged.

use std::sync::LazyLock;

use casadigital_core::{AffiliateConfig, AffiliateRegistry, Platform};
use regex::Regex;
use url::{form_urlencoded, Url};

static MLB_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"MLB-?(\d+)").expect("valid regex"));

static PRODUCT_PAGE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/p/(MLB\d+)").expect("valid regex"));

/// One strategy for pulling a product id out of a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    /// `MLB` optionally followed by `-`, then digits, anywhere in the URL.
    /// Normalized to `MLB<digits>`.
    MlbToken,
    /// First non-empty value of the `id` query parameter, percent-decoded.
    IdQueryParam,
    /// A `/p/MLB<digits>` catalog page path segment, returned verbatim.
    ProductPagePath,
}

/// Rules in the order they are tried. The first match wins, so an `MLB`
/// token anywhere in the URL beats an `?id=` parameter.
pub const EXTRACTION_PRIORITY: [ExtractionRule; 3] = [
    ExtractionRule::MlbToken,
    ExtractionRule::IdQueryParam,
    ExtractionRule::ProductPagePath,
];

impl ExtractionRule {
    /// Applies this rule alone to `url`.
    #[must_use]
    pub fn apply(self, url: &str) -> Option<String> {
        match self {
            ExtractionRule::MlbToken => MLB_TOKEN_RE
                .captures(url)
                .map(|caps| format!("MLB{}", &caps[1])),
            ExtractionRule::IdQueryParam => id_query_param(url),
            ExtractionRule::ProductPagePath => PRODUCT_PAGE_PATH_RE
                .captures(url)
                .map(|caps| caps[1].to_string()),
        }
    }
}

/// Extracts the marketplace product id from `url`, trying each rule in
/// [`EXTRACTION_PRIORITY`] order. Returns `None` when no rule matches.
#[must_use]
pub fn extract_product_id(url: &str) -> Option<String> {
    EXTRACTION_PRIORITY
        .iter()
        .find_map(|rule| rule.apply(url))
}

/// Reads the query string between `?` and `#` directly so that URLs that do
/// not parse as absolute URLs are still handled.
fn id_query_param(url: &str) -> Option<String> {
    let without_fragment = url.split_once('#').map_or(url, |(head, _)| head);
    let (_, query) = without_fragment.split_once('?')?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == "id" && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Rewrites `product_url` into the affiliate redirect link for `platform`.
///
/// The redirect carries `id`, `platform`, `referer`, `utm_source`,
/// `utm_medium` and, when a campaign is configured, `utm_campaign`, in that
/// order. Returns `product_url` unchanged when the platform is unknown or
/// unconfigured, or when no product id can be extracted.
#[must_use]
pub fn build_affiliate_url(
    registry: &AffiliateRegistry,
    platform: &str,
    product_url: &str,
) -> String {
    let Ok(platform) = platform.parse::<Platform>() else {
        return product_url.to_string();
    };
    let Some(config) = registry.get_platform(platform) else {
        return product_url.to_string();
    };
    let Some(product_id) = extract_product_id(product_url) else {
        tracing::debug!(%platform, product_url, "no product id found; link left unchanged");
        return product_url.to_string();
    };

    match redirect_url(platform, config, &product_id) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(
                %platform,
                product_url,
                error = %e,
                "failed to build affiliate link; using original URL"
            );
            product_url.to_string()
        }
    }
}

fn redirect_url(
    platform: Platform,
    config: &AffiliateConfig,
    product_id: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(platform.affiliate_redirect_base())?;
    // WHATWG form encoding: `~` becomes `%7E` and `*` stays literal. The
    // decoded values are what the redirect endpoint reads.
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair("id", product_id)
            .append_pair("platform", &config.sub_platform_code)
            .append_pair("referer", &config.affiliate_id)
            .append_pair("utm_source", &config.affiliate_id)
            .append_pair("utm_medium", "affiliate");
        if let Some(campaign) = &config.campaign {
            pairs.append_pair("utm_campaign", campaign);
        }
    }
    Ok(url.to_string())
}
