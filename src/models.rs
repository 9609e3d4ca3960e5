use crate::error::{Result, VastError};
use serde::{Deserialize, Serialize};

/// Version used when neither the caller nor the receiver profile names one
pub const DEFAULT_VAST_VERSION: &str = "4.0";

/// Represents a VAST document (Video Ad Serving Template)
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Vast {
    /// The VAST version (e.g., "2.0", "3.0", "4.0", etc.)
    pub version: String,

    /// The Ad elements within the VAST document, in pod order
    pub ads: Vec<Ad>,

    /// Root-level error tracking URL, fired by players when no ad is present
    pub error: Option<String>,

    /// Vendor elements under the root, kept as raw XML
    pub extra_elements: Vec<String>,
}

/// Represents an Ad within a VAST document
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Ad {
    /// The ad ID
    pub id: Option<String>,

    /// The 1-based position of the ad inside a pod; `None` when unset
    pub sequence: Option<u32>,

    /// The conditional ad flag (VAST 4.0+)
    pub conditional_ad: Option<bool>,

    /// The in-line ad details
    pub inline: Option<InLine>,

    /// The wrapper ad details
    pub wrapper: Option<Wrapper>,

    /// Child elements other than InLine and Wrapper, kept as raw XML
    pub extra_elements: Vec<String>,
}

/// Represents an InLine ad, which contains all the media files and tracking information
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct InLine {
    /// The ad server that returned the ad
    pub ad_system: Option<AdSystem>,

    /// The ad title; not written when empty
    pub ad_title: String,

    /// Impression tracking URLs, in document order
    pub impressions: Vec<Impression>,

    /// Free-form ad description
    pub description: Option<String>,

    /// The advertiser name, usually the bid's advertiser domain
    pub advertiser: Option<String>,

    /// The ad price
    pub pricing: Option<Pricing>,

    /// Error tracking URLs
    pub errors: Vec<String>,

    /// IAB content categories
    pub categories: Vec<Category>,

    /// The creatives of the ad
    pub creatives: Vec<Creative>,

    /// Extensions, each holding its raw inner XML
    pub extensions: Vec<Extension>,

    /// Child elements without a typed field, kept as raw XML
    pub extra_elements: Vec<String>,
}

/// Represents a Wrapper ad, which references another VAST document
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Wrapper {
    /// The ad server that returned the wrapper
    pub ad_system: Option<AdSystem>,

    /// The URL of the next VAST document
    pub vast_ad_tag_uri: String,

    /// Impression tracking URLs
    pub impressions: Vec<Impression>,

    /// Error tracking URLs
    pub errors: Vec<String>,

    /// The creatives of the wrapper (tracking only)
    pub creatives: Vec<Creative>,

    /// Extensions, each holding its raw inner XML
    pub extensions: Vec<Extension>,

    /// The followAdditionalWrappers attribute
    pub follow_additional_wrappers: Option<bool>,

    /// Child elements without a typed field, kept as raw XML
    pub extra_elements: Vec<String>,
}

/// Represents the ad system information
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct AdSystem {
    /// The ad system name
    pub name: String,
    /// The ad system version
    pub version: Option<String>,
}

/// Represents an impression tracking URL
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Impression {
    /// The impression ID
    pub id: Option<String>,
    /// The tracking URL
    pub url: String,
}

/// Represents pricing information
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Pricing {
    /// The pricing model (e.g., "CPM", "CPC", etc.)
    pub model: String,

    /// The pricing currency (e.g., "USD", "EUR", etc.)
    pub currency: String,

    /// The price value, formatted with two decimals when produced from a bid
    pub value: String,
}

/// Represents an ad category
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Category {
    /// The taxonomy authority (e.g., "IAB")
    pub authority: Option<String>,
    /// The category code
    pub value: String,
}

/// Represents an extension
///
/// `content` is the raw inner XML of the element. It is written back
/// untouched, so anything stored here must already be valid element content.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Extension {
    /// The extension type attribute
    pub r#type: Option<String>,
    /// The raw inner XML
    pub content: String,
}

/// Represents a creative element
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Creative {
    /// The creative ID
    pub id: Option<String>,

    /// The creative sequence
    pub sequence: Option<u32>,

    /// The ad ID attribute (`adId`)
    pub ad_id: Option<String>,

    /// The API framework
    pub api_framework: Option<String>,

    /// The linear ad details
    pub linear: Option<Linear>,

    /// CompanionAds, NonLinearAds, UniversalAdId and friends, kept as raw XML
    pub extra_elements: Vec<String>,
}

/// Represents a linear ad
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Linear {
    /// Duration in `HH:MM:SS`; empty when unknown
    pub duration: String,

    /// The skip offset
    pub skip_offset: Option<String>,

    /// The media files
    pub media_files: Vec<MediaFile>,

    /// Mezzanine, InteractiveCreativeFile, ClosedCaptionFiles and other
    /// non-MediaFile children of `<MediaFiles>`, kept as raw XML
    pub media_files_extra: Vec<String>,

    /// TrackingEvents, VideoClicks, Icons, AdParameters and any other
    /// child element, kept as raw XML
    pub extra_elements: Vec<String>,
}

/// Represents a media file
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct MediaFile {
    /// The media file ID
    pub id: Option<String>,

    /// progressive or streaming
    pub delivery: Option<String>,

    /// The MIME type, written as the `type` attribute
    pub mime_type: Option<String>,

    /// The width in pixels
    pub width: Option<u32>,

    /// The height in pixels
    pub height: Option<u32>,

    /// The codec
    pub codec: Option<String>,

    /// The bitrate in kbps
    pub bitrate: Option<u32>,

    /// The minimum bitrate for streaming delivery
    pub min_bitrate: Option<u32>,

    /// The maximum bitrate for streaming delivery
    pub max_bitrate: Option<u32>,

    /// Whether the file may be scaled
    pub scalable: Option<bool>,

    /// Whether the aspect ratio must be kept when scaling
    pub maintain_aspect_ratio: Option<bool>,

    /// The API framework
    pub api_framework: Option<String>,

    /// The media URL
    pub url: String,
}

impl Vast {
    /// Creates a minimal no-ad VAST document
    pub fn new_empty(version: &str) -> Self {
        let version = if version.is_empty() {
            DEFAULT_VAST_VERSION
        } else {
            version
        };
        Vast {
            version: version.to_string(),
            ..Default::default()
        }
    }

    pub fn add_ad(&mut self, ad: Ad) {
        self.ads.push(ad);
    }

    pub fn first_ad(&self) -> Option<&Ad> {
        self.ads.first()
    }

    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }
}

impl Ad {
    /// True when the sequence attribute carries a pod position
    pub fn has_sequence(&self) -> bool {
        matches!(self.sequence, Some(seq) if seq > 0)
    }
}

impl Pricing {
    /// CPM pricing built from a bid price
    pub fn cpm(price: f64, currency: &str) -> Self {
        Pricing {
            model: "CPM".to_string(),
            currency: currency.to_string(),
            value: format!("{:.2}", price),
        }
    }
}

/// Formats a duration in seconds as `HH:MM:SS`; negative values clamp to zero
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Parses `HH:MM:SS` into seconds
///
/// Exactly three colon-separated non-negative integer components are
/// required. Totals that overflow `i64` are rejected.
pub fn parse_duration(duration: &str) -> Result<i64> {
    let parts: Vec<&str> = duration.split(':').collect();
    if parts.len() != 3 {
        return Err(VastError::InvalidDuration(duration.to_string()));
    }

    let invalid = || VastError::InvalidDuration(duration.to_string());

    let mut values = [0i64; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part.trim().parse::<i64>().map_err(|_| invalid())?;
        if *slot < 0 {
            return Err(invalid());
        }
    }

    let [hours, minutes, seconds] = values;
    hours
        .checked_mul(3600)
        .and_then(|total| total.checked_add(minutes.checked_mul(60)?))
        .and_then(|total| total.checked_add(seconds))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_empty_defaults_version() {
        let vast = Vast::new_empty("");
        assert_eq!(vast.version, "4.0");
        assert!(vast.is_empty());
        assert!(vast.first_ad().is_none());

        let vast = Vast::new_empty("3.0");
        assert_eq!(vast.version, "3.0");
    }

    #[test]
    fn add_ad_keeps_order() {
        let mut vast = Vast::new_empty("4.0");
        vast.add_ad(Ad {
            id: Some("first".to_string()),
            ..Default::default()
        });
        vast.add_ad(Ad {
            id: Some("second".to_string()),
            ..Default::default()
        });

        assert!(!vast.is_empty());
        assert_eq!(vast.ads.len(), 2);
        assert_eq!(vast.first_ad().and_then(|ad| ad.id.as_deref()), Some("first"));
    }

    #[test]
    fn format_duration_cases() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(30), "00:00:30");
        assert_eq!(format_duration(90), "00:01:30");
        assert_eq!(format_duration(3661), "01:01:01");
        assert_eq!(format_duration(-5), "00:00:00");
    }

    #[test]
    fn parse_duration_cases() {
        assert_eq!(parse_duration("00:00:30").unwrap(), 30);
        assert_eq!(parse_duration("01:01:01").unwrap(), 3661);
        assert!(matches!(
            parse_duration("00:30"),
            Err(VastError::InvalidDuration(_))
        ));
        assert!(parse_duration("aa:bb:cc").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("00:00:00:01").is_err());
        assert!(matches!(
            parse_duration("9999999999999999:00:00"),
            Err(VastError::InvalidDuration(_))
        ));
        assert!(parse_duration("00:00:9223372036854775807").is_ok());
        assert!(parse_duration("00:01:9223372036854775807").is_err());
        assert!(parse_duration("00:-5:00").is_err());
    }

    #[test]
    fn pricing_cpm_uses_two_decimals() {
        let pricing = Pricing::cpm(5.5, "USD");
        assert_eq!(pricing.model, "CPM");
        assert_eq!(pricing.currency, "USD");
        assert_eq!(pricing.value, "5.50");
    }

    #[test]
    fn sequence_zero_is_unset() {
        let mut ad = Ad::default();
        assert!(!ad.has_sequence());
        ad.sequence = Some(0);
        assert!(!ad.has_sequence());
        ad.sequence = Some(2);
        assert!(ad.has_sequence());
    }

    proptest! {
        #[test]
        fn duration_round_trips(seconds in 0i64..1_000_000) {
            prop_assert_eq!(parse_duration(&format_duration(seconds)).unwrap(), seconds);
        }
    }
}
