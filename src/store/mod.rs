use anyhow::{Context, Result};
use clap::Args;
use tracing::{error, info};
use ureq::Agent;

mod models;

pub use models::{Element, ImageKind, Offer};

use self::models::PromotionsResponse;

pub const PROMOTIONS_URL: &str =
    "https://store-site-backend-static.ak.epicgames.com/freeGamesPromotions";

pub const STORE_URL: &str = "https://store.epicgames.com";

pub const ENGLISH: &str = "en-US";
pub const CHINESE: &str = "zh-CN";

/// Which storefront region to ask for promotions.
#[derive(Clone, Debug, Args)]
pub struct Region {
    /// Country code sent as both `country` and `allowCountries`
    #[arg(long, env = "EPIC_COUNTRY", default_value = "CN", global = true)]
    pub country: String,
    /// Promotions endpoint
    #[arg(long, env = "EPIC_PROMOTIONS_URL", default_value = PROMOTIONS_URL, global = true)]
    pub endpoint: String,
}

/// Fetches the current promotions for one locale.
///
/// Failures are logged and come back as an empty list, so callers cannot
/// tell "nothing fetched" apart from "nothing on offer".
pub fn fetch(agent: &Agent, locale: &str, region: &Region) -> Vec<Element> {
    match try_fetch(agent, locale, region) {
        Ok(elements) => {
            info!("Fetched {} {locale} catalog elements", elements.len());
            elements
        }
        Err(e) => {
            error!("Failed to fetch {locale} promotions: {e:#}");
            Vec::new()
        }
    }
}

fn try_fetch(agent: &Agent, locale: &str, region: &Region) -> Result<Vec<Element>> {
    let body = agent
        .get(&region.endpoint)
        .query("locale", locale)
        .query("country", &region.country)
        .query("allowCountries", &region.country)
        .call()?
        .into_string()?;

    parse(&body)
}

pub fn parse(body: &str) -> Result<Vec<Element>> {
    let response: PromotionsResponse =
        serde_json::from_str(body).context("Unexpected promotions response")?;
    Ok(response.into_elements())
}
