use crate::error::Result;
use crate::models::*;
use crate::openrtb::{Bid, BidResponse};
use crate::parser::parse_vast;
use log::{debug, warn};
use quick_xml::escape::partial_escape;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extension type under which OpenRTB metadata is attached
pub const PREBID_EXTENSION_TYPE: &str = "prebid";

/// Decides whether OpenRTB data may overwrite fields already set in VAST
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum CollisionPolicy {
    /// Only fill fields that are absent or empty
    #[default]
    VastWins,
    /// Always overwrite with the bid's value
    OpenRtbWins,
}

impl From<String> for CollisionPolicy {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "OPENRTB_WINS" => CollisionPolicy::OpenRtbWins,
            _ => CollisionPolicy::VastWins,
        }
    }
}

impl From<CollisionPolicy> for String {
    fn from(value: CollisionPolicy) -> Self {
        match value {
            CollisionPolicy::VastWins => "VAST_WINS".to_string(),
            CollisionPolicy::OpenRtbWins => "OPENRTB_WINS".to_string(),
        }
    }
}

/// Where an enrichment value is written
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum Placement {
    /// Native VAST element
    Inline,
    /// JSON blob inside the `prebid` Extension
    Extensions,
    #[default]
    Skip,
}

impl From<String> for Placement {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "INLINE" => Placement::Inline,
            "EXTENSIONS" => Placement::Extensions,
            _ => Placement::Skip,
        }
    }
}

impl From<Placement> for String {
    fn from(value: Placement) -> Self {
        match value {
            Placement::Inline => "INLINE".to_string(),
            Placement::Extensions => "EXTENSIONS".to_string(),
            Placement::Skip => "SKIP".to_string(),
        }
    }
}

/// Placement per field family
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct PlacementRules {
    pub price: Placement,
    pub currency: Placement,
    pub advertiser: Placement,
    pub categories: Placement,
    pub duration: Placement,
    pub ids: Placement,
    pub deal_id: Placement,
}

impl Default for PlacementRules {
    fn default() -> Self {
        PlacementRules {
            price: Placement::Inline,
            currency: Placement::Inline,
            advertiser: Placement::Inline,
            categories: Placement::Extensions,
            duration: Placement::Inline,
            ids: Placement::Extensions,
            deal_id: Placement::Extensions,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnricherConfig {
    pub collision_policy: CollisionPolicy,
    pub placement_rules: PlacementRules,
    pub default_currency: String,
    pub include_debug_ids: bool,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        EnricherConfig {
            collision_policy: CollisionPolicy::VastWins,
            placement_rules: PlacementRules::default(),
            default_currency: "USD".to_string(),
            include_debug_ids: false,
        }
    }
}

/// Enrichment-ready projection of a single bid
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BidMetadata {
    pub price: f64,
    pub currency: String,
    /// First advertiser domain of the bid
    pub advertiser: Option<String>,
    pub categories: Vec<String>,
    /// Seconds; zero when the bid did not declare one
    pub duration: i64,
    pub bid_id: String,
    pub imp_id: String,
    pub deal_id: String,
    pub seat: String,
}

impl BidMetadata {
    pub fn from_bid(
        bid: &Bid,
        seat: &str,
        response: Option<&BidResponse>,
        default_currency: &str,
    ) -> Self {
        let currency = response
            .map(|r| r.cur.as_str())
            .filter(|cur| !cur.is_empty())
            .unwrap_or(default_currency);

        BidMetadata {
            price: bid.price,
            currency: currency.to_string(),
            advertiser: bid.adomain.first().cloned(),
            categories: bid.cat.clone(),
            duration: bid.dur.max(0),
            bid_id: bid.id.clone(),
            imp_id: bid.impid.clone(),
            deal_id: bid.dealid.clone(),
            seat: seat.to_string(),
        }
    }
}

/// Merges OpenRTB bid metadata into VAST ads
#[derive(Debug, Clone, Default)]
pub struct Enricher {
    config: EnricherConfig,
}

impl Enricher {
    pub fn new(config: EnricherConfig) -> Self {
        Enricher { config }
    }

    pub fn config(&self) -> &EnricherConfig {
        &self.config
    }

    /// Appends the ad(s) for one bid to `vast`
    ///
    /// When the bid's markup parses as VAST every ad it contains is enriched
    /// and appended, keeping any sequence it already carries. Otherwise a
    /// minimal ad is built from the bid alone.
    pub fn enrich(
        &self,
        vast: &mut Vast,
        bid: &Bid,
        seat: &str,
        response: Option<&BidResponse>,
        sequence: u32,
    ) -> Result<()> {
        let metadata = BidMetadata::from_bid(bid, seat, response, &self.config.default_currency);

        let existing = if bid.adm.trim().is_empty() {
            None
        } else {
            match parse_vast(&bid.adm) {
                Ok(parsed) => Some(parsed),
                Err(e) if looks_like_xml(&bid.adm) => {
                    warn!("CTV VAST: Bid {} markup failed to parse ({}), building ad from bid", bid.id, e);
                    None
                }
                Err(e) => {
                    debug!("CTV VAST: Bid {} markup is not VAST ({}), building ad from bid", bid.id, e);
                    None
                }
            }
        };

        match existing {
            Some(parsed) => {
                for mut ad in parsed.ads {
                    if !ad.has_sequence() && sequence > 0 {
                        ad.sequence = Some(sequence);
                    }
                    self.enrich_ad(&mut ad, &metadata)?;
                    vast.add_ad(ad);
                }
            }
            None => vast.add_ad(self.create_ad(bid, &metadata, sequence)?),
        }

        Ok(())
    }

    fn enrich_ad(&self, ad: &mut Ad, metadata: &BidMetadata) -> Result<()> {
        if self.config.placement_rules.ids == Placement::Inline && !metadata.bid_id.is_empty() {
            let present = ad.id.as_deref().is_some_and(|id| !id.is_empty());
            if self.should_set(present) {
                ad.id = Some(metadata.bid_id.clone());
            }
        }

        if let Some(inline) = ad.inline.as_mut() {
            self.enrich_inline(inline, metadata)?;
        }
        if let Some(wrapper) = ad.wrapper.as_mut() {
            if let Some(extension) = self.extension(metadata)? {
                wrapper.extensions.push(extension);
            }
        }
        Ok(())
    }

    fn enrich_inline(&self, inline: &mut InLine, metadata: &BidMetadata) -> Result<()> {
        let rules = &self.config.placement_rules;

        if rules.price == Placement::Inline && self.should_set(inline.pricing.is_some()) {
            inline.pricing = Some(Pricing::cpm(metadata.price, &metadata.currency));
        }

        if rules.advertiser == Placement::Inline {
            if let Some(advertiser) = &metadata.advertiser {
                let present = inline.advertiser.as_deref().is_some_and(|a| !a.is_empty());
                if self.should_set(present) {
                    inline.advertiser = Some(advertiser.clone());
                }
            }
        }

        if rules.categories == Placement::Inline
            && !metadata.categories.is_empty()
            && self.should_set(!inline.categories.is_empty())
        {
            inline.categories = iab_categories(&metadata.categories);
        }

        if rules.duration == Placement::Inline && metadata.duration > 0 {
            let duration = format_duration(metadata.duration);
            for linear in inline.creatives.iter_mut().filter_map(|c| c.linear.as_mut()) {
                if linear.duration.is_empty() {
                    linear.duration = duration.clone();
                }
            }
        }

        if let Some(extension) = self.extension(metadata)? {
            inline.extensions.push(extension);
        }
        Ok(())
    }

    fn create_ad(&self, bid: &Bid, metadata: &BidMetadata, sequence: u32) -> Result<Ad> {
        let rules = &self.config.placement_rules;

        let mut inline = InLine {
            ad_system: Some(AdSystem {
                name: metadata.seat.clone(),
                version: None,
            }),
            ad_title: format!("Ad {}", bid.id),
            ..Default::default()
        };

        if !bid.burl.is_empty() {
            inline.impressions.push(Impression {
                id: None,
                url: bid.burl.clone(),
            });
        }
        if rules.price == Placement::Inline {
            inline.pricing = Some(Pricing::cpm(metadata.price, &metadata.currency));
        }
        if rules.advertiser == Placement::Inline {
            inline.advertiser = metadata.advertiser.clone();
        }
        if rules.categories == Placement::Inline {
            inline.categories = iab_categories(&metadata.categories);
        }

        let duration = if rules.duration == Placement::Inline && metadata.duration > 0 {
            format_duration(metadata.duration)
        } else {
            String::new()
        };

        inline.creatives.push(Creative {
            id: Some(format!("creative-{}", bid.id)),
            ad_id: Some(bid.crid.clone()).filter(|crid| !crid.is_empty()),
            linear: Some(Linear {
                duration,
                media_files: vec![MediaFile {
                    delivery: Some("progressive".to_string()),
                    mime_type: Some("video/mp4".to_string()),
                    width: dimension(bid.w),
                    height: dimension(bid.h),
                    url: bid.nurl.clone(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        });

        if let Some(extension) = self.extension(metadata)? {
            inline.extensions.push(extension);
        }

        Ok(Ad {
            id: Some(bid.id.clone()).filter(|id| !id.is_empty()),
            sequence: Some(sequence).filter(|s| *s > 0),
            inline: Some(inline),
            ..Default::default()
        })
    }

    fn should_set(&self, field_exists: bool) -> bool {
        match self.config.collision_policy {
            CollisionPolicy::OpenRtbWins => true,
            CollisionPolicy::VastWins => !field_exists,
        }
    }

    /// Builds the `prebid` extension for every field routed to extensions,
    /// or `None` when nothing is routed there
    fn extension(&self, metadata: &BidMetadata) -> Result<Option<Extension>> {
        let rules = &self.config.placement_rules;
        let mut data = Map::new();

        if rules.price == Placement::Extensions {
            data.insert("price".to_string(), Value::from(metadata.price));
            data.insert("currency".to_string(), Value::from(metadata.currency.as_str()));
        } else if rules.currency == Placement::Extensions {
            data.insert("currency".to_string(), Value::from(metadata.currency.as_str()));
        }

        if rules.ids == Placement::Extensions && self.config.include_debug_ids {
            data.insert("bid_id".to_string(), Value::from(metadata.bid_id.as_str()));
            data.insert("imp_id".to_string(), Value::from(metadata.imp_id.as_str()));
            data.insert("seat".to_string(), Value::from(metadata.seat.as_str()));
        }

        if rules.deal_id == Placement::Extensions && !metadata.deal_id.is_empty() {
            data.insert("deal_id".to_string(), Value::from(metadata.deal_id.as_str()));
        }

        if rules.categories == Placement::Extensions && !metadata.categories.is_empty() {
            data.insert("categories".to_string(), Value::from(metadata.categories.clone()));
        }

        if rules.advertiser == Placement::Extensions {
            if let Some(advertiser) = &metadata.advertiser {
                data.insert("advertiser".to_string(), Value::from(advertiser.as_str()));
            }
        }

        if rules.duration == Placement::Extensions && metadata.duration > 0 {
            data.insert("duration".to_string(), Value::from(metadata.duration));
        }

        if data.is_empty() {
            return Ok(None);
        }

        let json = serde_json::to_string(&data)?;
        Ok(Some(Extension {
            r#type: Some(PREBID_EXTENSION_TYPE.to_string()),
            content: partial_escape(&json).into_owned(),
        }))
    }
}

/// True when bid markup opens with a tag
fn looks_like_xml(markup: &str) -> bool {
    markup.trim_start().starts_with('<')
}

/// Fills every empty Linear duration in the tree
pub fn enrich_with_duration(vast: &mut Vast, seconds: i64) {
    if seconds <= 0 {
        return;
    }

    let duration = format_duration(seconds);
    for inline in vast.ads.iter_mut().filter_map(|ad| ad.inline.as_mut()) {
        for linear in inline.creatives.iter_mut().filter_map(|c| c.linear.as_mut()) {
            if linear.duration.is_empty() {
                linear.duration = duration.clone();
            }
        }
    }
}

/// Checks a duration against optional bounds; a bound of zero or less is unset
pub fn validate_duration(seconds: i64, min: i64, max: i64) -> bool {
    if min > 0 && seconds < min {
        return false;
    }
    if max > 0 && seconds > max {
        return false;
    }
    true
}

fn iab_categories(categories: &[String]) -> Vec<Category> {
    categories
        .iter()
        .map(|cat| Category {
            authority: Some("IAB".to_string()),
            value: cat.clone(),
        })
        .collect()
}

fn dimension(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}
