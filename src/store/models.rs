use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DefaultOnNull};
use tracing::warn;

#[derive(Deserialize)]
pub struct PromotionsResponse {
    data: Data,
}

impl PromotionsResponse {
    /// Elements that don't fit the model are dropped one by one, the rest survive.
    pub fn into_elements(self) -> Vec<Element> {
        self.data
            .catalog
            .search_store
            .elements
            .into_iter()
            .filter_map(|x| match Element::deserialize(&x) {
                Ok(element) => Some(element),
                Err(e) => {
                    warn!("Skipping catalog element {}: {e}", x["id"]);
                    None
                }
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct Data {
    #[serde(rename = "Catalog")]
    catalog: Catalog,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Catalog {
    search_store: SearchStore,
}

#[serde_as]
#[derive(Deserialize)]
struct SearchStore {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    elements: Vec<Value>,
}

/// One catalog entry as returned for a single locale.
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub product_slug: Option<String>,
    pub url_slug: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub key_images: Vec<KeyImage>,
    pub promotions: Option<Promotions>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KeyImage {
    #[serde(rename = "type")]
    pub kind: ImageKind,
    pub url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ImageKind {
    Thumbnail,
    OfferImageWide,
    #[serde(other)]
    Other,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotions {
    // upcomingPromotionalOffers is ignored, only running offers matter
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub promotional_offers: Vec<OfferGroup>,
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferGroup {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub promotional_offers: Vec<Offer>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub discount_setting: DiscountSetting,
}

impl Offer {
    /// The store expresses the price as a percentage of the original, so 0 means free.
    pub fn is_free(&self) -> bool {
        self.discount_setting.discount_percentage == 0
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountSetting {
    pub discount_percentage: u32,
}
