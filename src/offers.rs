use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::store::{Element, ImageKind, Offer, STORE_URL};

pub const UNKNOWN: &str = "未知";
const NO_DESCRIPTION: &str = "暂无描述";

/// How long after a promotion starts it still counts as new.
pub const DEFAULT_WINDOW_HOURS: i64 = 140;
/// Upper bound for `--window-hours`, keeps `TimeDelta::hours` in range.
pub const MAX_WINDOW_HOURS: i64 = 100 * 365 * 24;

/// Everything a notification needs about one free game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Freebie {
    pub id: String,
    pub title: String,
    pub description: String,
    pub link: String,
    pub image: String,
    pub start_date: String,
    pub end_date: String,
    pub elapsed: Option<TimeDelta>,
}

impl Freebie {
    fn new(element: &Element) -> Self {
        Self {
            id: element.id.clone(),
            title: element.title.clone(),
            description: element
                .description
                .clone()
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            link: link(element),
            image: image(element),
            start_date: UNKNOWN.to_string(),
            end_date: UNKNOWN.to_string(),
            elapsed: None,
        }
    }
}

/// Every free game in `primary`, titled with its `secondary` translation
/// where one exists.
pub fn bilingual(primary: &[Element], secondary: &[Element]) -> Vec<Freebie> {
    let translated: HashMap<&str, &str> = secondary
        .iter()
        .map(|x| (x.id.as_str(), x.title.as_str()))
        .collect();

    let mut output = Vec::new();
    for element in primary {
        let Some(offer) = free_offer(element) else {
            continue;
        };

        let mut freebie = Freebie::new(element);
        freebie.title = composite_title(
            &element.title,
            translated.get(element.id.as_str()).copied(),
        );
        freebie.start_date = format_date(offer.start_date.as_deref(), utc_date);
        freebie.end_date = format_date(offer.end_date.as_deref(), utc_date);
        output.push(freebie);
    }
    output
}

/// Free games whose promotion started less than `window` before `now`.
pub fn recent(elements: &[Element], now: DateTime<Utc>, window: TimeDelta) -> Vec<Freebie> {
    let mut output = Vec::new();
    for element in elements {
        let Some(offer) = free_offer(element) else {
            continue;
        };

        let elapsed = elapsed_since(offer.start_date.as_deref(), now);
        if !is_new(elapsed, window) {
            debug!("Skipping {}, started {elapsed:?} ago", element.title);
            continue;
        }

        let mut freebie = Freebie::new(element);
        freebie.start_date = format_date(offer.start_date.as_deref(), local_date);
        freebie.end_date = format_date(offer.end_date.as_deref(), local_date);
        freebie.elapsed = elapsed;
        output.push(freebie);
    }
    output
}

/// The first zero-discount offer across all running offer groups.
pub fn free_offer(element: &Element) -> Option<&Offer> {
    element
        .promotions
        .as_ref()?
        .promotional_offers
        .iter()
        .flat_map(|x| &x.promotional_offers)
        .find(|x| x.is_free())
}

pub fn composite_title(primary: &str, translated: Option<&str>) -> String {
    match translated {
        Some(x) if x != primary => format!("{primary} <br/>({x})"),
        _ => primary.to_string(),
    }
}

/// A missing start counts as new, a duplicate beats a missed game.
pub fn is_new(elapsed: Option<TimeDelta>, window: TimeDelta) -> bool {
    match elapsed {
        Some(x) => x < window,
        None => true,
    }
}

/// Time between the promotion start and `now`, measured in UTC+8.
pub fn elapsed_since(start: Option<&str>, now: DateTime<Utc>) -> Option<TimeDelta> {
    let start = start?;
    let Some(start) = parse_timestamp(start) else {
        warn!("Unparsable start date {start:?}");
        return None;
    };
    let tz = beijing();
    Some(now.with_timezone(&tz) - start.with_timezone(&tz))
}

/// Parses store timestamps like `2024-05-16T15:00:00.000Z`, ignoring fractional seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw
        .split_once('.')
        .map_or(raw, |(x, _)| x)
        .trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|x| x.and_utc())
}

pub fn beijing() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).expect("hardcoded")
}

fn format_date(raw: Option<&str>, format: fn(DateTime<Utc>) -> String) -> String {
    let Some(raw) = raw else {
        return UNKNOWN.to_string();
    };
    match parse_timestamp(raw) {
        Some(x) => format(x),
        None => {
            warn!("Unparsable date {raw:?}, passing it through");
            raw.to_string()
        }
    }
}

fn utc_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M (UTC)").to_string()
}

fn local_date(date: DateTime<Utc>) -> String {
    date.with_timezone(&beijing())
        .format("%Y-%m-%d %H:%M (UTC+8)")
        .to_string()
}

fn link(element: &Element) -> String {
    let slug = [&element.product_slug, &element.url_slug]
        .into_iter()
        .flatten()
        .find(|x| !x.is_empty());
    match slug {
        Some(x) => format!("{STORE_URL}/p/{x}"),
        None => format!("{STORE_URL}/free-games"),
    }
}

// thumbnails win outright, otherwise the last wide image
fn image(element: &Element) -> String {
    let mut url = "";
    for x in &element.key_images {
        match x.kind {
            ImageKind::Thumbnail => return x.url.clone(),
            ImageKind::OfferImageWide => url = x.url.as_str(),
            ImageKind::Other => {}
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::store::parse;

    fn element(value: serde_json::Value) -> Element {
        serde_json::from_value(value).unwrap()
    }

    fn offer(discount: u32, start: &str) -> serde_json::Value {
        json!({
            "startDate": start,
            "endDate": "2024-05-23T15:00:00.000Z",
            "discountSetting": { "discountPercentage": discount }
        })
    }

    fn game(groups: serde_json::Value) -> Element {
        element(json!({
            "id": "game",
            "title": "Game",
            "promotions": { "promotionalOffers": groups }
        }))
    }

    fn window() -> TimeDelta {
        TimeDelta::hours(DEFAULT_WINDOW_HOURS)
    }

    #[test]
    fn free_offer_requires_zero_discount() {
        assert!(free_offer(&element(json!({"id": "a", "title": "A"}))).is_none());
        assert!(free_offer(&element(json!({"id": "a", "title": "A", "promotions": null}))).is_none());
        assert!(free_offer(&game(json!([]))).is_none());
        assert!(free_offer(&game(json!([{ "promotionalOffers": [] }]))).is_none());
        assert!(free_offer(&game(json!([{
            "promotionalOffers": [offer(50, "a"), offer(100, "b")]
        }])))
        .is_none());

        let mixed = game(json!([
            { "promotionalOffers": [offer(50, "first")] },
            { "promotionalOffers": [offer(0, "second"), offer(0, "third")] },
            { "promotionalOffers": [offer(0, "fourth")] },
        ]));
        assert_eq!(
            free_offer(&mixed).unwrap().start_date.as_deref(),
            Some("second")
        );
    }

    #[test]
    fn composite_titles() {
        assert_eq!(
            composite_title("Hogwarts Legacy", Some("霍格沃茨之遗")),
            "Hogwarts Legacy <br/>(霍格沃茨之遗)"
        );
        assert_eq!(composite_title("Celeste", Some("Celeste")), "Celeste");
        assert_eq!(composite_title("Celeste", None), "Celeste");
    }

    #[test]
    fn parse_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 16, 15, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-16T15:00:00.000Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-16T15:00:00.123456"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-16T15:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("next thursday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn window_boundary_is_excluded() {
        let start = "2024-05-10T00:00:00.000Z";
        let at = |hours: i64, minutes: i64| {
            Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap()
                + TimeDelta::hours(hours)
                + TimeDelta::minutes(minutes)
        };

        assert!(is_new(elapsed_since(Some(start), at(139, 59)), window()));
        assert!(!is_new(elapsed_since(Some(start), at(140, 0)), window()));
        assert!(!is_new(elapsed_since(Some(start), at(200, 0)), window()));
        // not started yet
        assert!(is_new(elapsed_since(Some(start), at(-1, 0)), window()));
    }

    #[test]
    fn unknown_start_is_new() {
        let now = Utc::now();
        assert!(is_new(elapsed_since(None, now), window()));
        assert!(is_new(elapsed_since(Some("soon"), now), window()));

        let game = game(json!([{ "promotionalOffers": [offer(0, "garbage")] }]));
        let found = recent(&[game], now, window());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start_date, "garbage");
        assert_eq!(found[0].elapsed, None);
    }

    #[test]
    fn elapsed_ignores_zone_shift() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 1, 0, 0).unwrap();
        assert_eq!(
            elapsed_since(Some("2024-05-16T15:00:00.000Z"), now),
            Some(TimeDelta::hours(10))
        );
    }

    #[test]
    fn bilingual_freebies() {
        let en = parse(include_str!("fixtures/bilingual-en.json")).unwrap();
        let zh = parse(include_str!("fixtures/bilingual-zh.json")).unwrap();
        let found = bilingual(&en, &zh);
        assert_eq!(found.len(), 2);

        let hogwarts = &found[0];
        assert_eq!(hogwarts.title, "Hogwarts Legacy <br/>(霍格沃茨之遗)");
        assert_eq!(hogwarts.description, "Experience Hogwarts in the 1800s & beyond.");
        assert_eq!(hogwarts.link, "https://store.epicgames.com/p/hogwarts-legacy");
        assert_eq!(hogwarts.image, "https://cdn.example.test/hogwarts-wide.jpg");
        assert_eq!(hogwarts.end_date, "2024-05-23 15:00 (UTC)");

        let celeste = &found[1];
        assert_eq!(celeste.title, "Celeste");
        assert_eq!(celeste.description, NO_DESCRIPTION);
        assert_eq!(celeste.link, "https://store.epicgames.com/free-games");
        assert_eq!(celeste.image, "");
        assert_eq!(celeste.end_date, "next thursday");
    }

    #[test]
    fn bilingual_without_translations() {
        let en = parse(include_str!("fixtures/bilingual-en.json")).unwrap();
        let found = bilingual(&en, &[]);
        assert_eq!(found[0].title, "Hogwarts Legacy");
        assert!(bilingual(&[], &en).is_empty());
    }

    #[test]
    fn missing_end_date_is_unknown() {
        let game = game(json!([{ "promotionalOffers": [{
            "startDate": "2024-05-16T15:00:00.000Z",
            "discountSetting": { "discountPercentage": 0 }
        }] }]));
        assert_eq!(bilingual(&[game], &[])[0].end_date, UNKNOWN);
    }

    #[test]
    fn thumbnail_beats_wide_image() {
        let elements = parse(include_str!("fixtures/windowed.json")).unwrap();
        assert_eq!(image(&elements[0]), "https://cdn.example.test/lighthouse-thumb.jpg");
        assert_eq!(image(&elements[1]), "https://cdn.example.test/harbour-wide.jpg");
        assert_eq!(link(&elements[1]), "https://store.epicgames.com/p/paper-harbour");
    }

    #[test]
    fn recent_keeps_only_new_promotions() {
        let elements = parse(include_str!("fixtures/windowed.json")).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 1, 0, 0).unwrap();
        let found = recent(&elements, now, window());

        assert_eq!(found.len(), 1);
        let lighthouse = &found[0];
        assert_eq!(lighthouse.title, "Lone Lighthouse");
        assert_eq!(lighthouse.start_date, "2024-05-16 23:00 (UTC+8)");
        assert_eq!(lighthouse.end_date, "2024-05-23 23:00 (UTC+8)");
        assert_eq!(lighthouse.elapsed, Some(TimeDelta::hours(10)));
    }
}
