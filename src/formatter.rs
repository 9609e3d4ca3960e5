use crate::error::{Result, VastError};
use crate::models::*;
use serde::{Deserialize, Serialize};

const GAM_SSU_DEFAULT_VERSION: &str = "3.0";
const GAM_DEFAULT_DURATION: &str = "00:00:30";
const GAM_DEFAULT_AD_SYSTEM: &str = "Prebid Server";

/// Downstream receiver the VAST is shaped for
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum ReceiverProfile {
    #[default]
    Generic,
    /// Google Ad Manager server-side unified
    GamSsu,
}

impl ReceiverProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiverProfile::Generic => "GENERIC",
            ReceiverProfile::GamSsu => "GAM_SSU",
        }
    }

    /// Version applied when neither the document nor the config sets one
    pub fn default_version(&self) -> &'static str {
        match self {
            ReceiverProfile::Generic => DEFAULT_VAST_VERSION,
            ReceiverProfile::GamSsu => GAM_SSU_DEFAULT_VERSION,
        }
    }
}

impl From<&str> for ReceiverProfile {
    /// Unknown profiles fall back to `Generic`
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "GAM_SSU" => ReceiverProfile::GamSsu,
            _ => ReceiverProfile::Generic,
        }
    }
}

impl From<String> for ReceiverProfile {
    fn from(value: String) -> Self {
        ReceiverProfile::from(value.as_str())
    }
}

impl From<ReceiverProfile> for String {
    fn from(value: ReceiverProfile) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormatterConfig {
    pub profile: ReceiverProfile,
    /// Empty means the profile's own default
    pub default_version: String,
}

impl FormatterConfig {
    fn version(&self) -> &str {
        if self.default_version.is_empty() {
            self.profile.default_version()
        } else {
            &self.default_version
        }
    }
}

/// Serializes a VAST tree for one receiver profile
pub trait Formatter: Send + Sync {
    fn format(&self, vast: Vast) -> Result<Vec<u8>>;
}

/// Picks the formatter for the configured profile
pub fn create_formatter(config: &FormatterConfig) -> Box<dyn Formatter> {
    match config.profile {
        ReceiverProfile::GamSsu => Box::new(GamSsuFormatter::new(config)),
        ReceiverProfile::Generic => Box::new(GenericFormatter::new(config)),
    }
}

/// Writes the tree as-is, only defaulting the version
pub struct GenericFormatter {
    version: String,
}

impl GenericFormatter {
    pub fn new(config: &FormatterConfig) -> Self {
        GenericFormatter {
            version: config.version().to_string(),
        }
    }
}

impl Formatter for GenericFormatter {
    fn format(&self, mut vast: Vast) -> Result<Vec<u8>> {
        if vast.version.is_empty() {
            vast.version = self.version.clone();
        }
        vast.marshal()
    }
}

/// Backfills the identifiers GAM SSU requires on every ad
pub struct GamSsuFormatter {
    version: String,
}

impl GamSsuFormatter {
    pub fn new(config: &FormatterConfig) -> Self {
        GamSsuFormatter {
            version: config.version().to_string(),
        }
    }

    fn normalize(&self, vast: &mut Vast) {
        let pod = vast.ads.len() > 1;

        for (i, ad) in vast.ads.iter_mut().enumerate() {
            let ad_id = match &ad.id {
                Some(id) if !id.is_empty() => id.clone(),
                _ => {
                    let id = format!("ad-{}", i + 1);
                    ad.id = Some(id.clone());
                    id
                }
            };

            if pod && !ad.has_sequence() {
                ad.sequence = Some(u32::try_from(i + 1).unwrap_or(u32::MAX));
            }

            if let Some(inline) = ad.inline.as_mut() {
                normalize_inline(inline, &ad_id);
            }
            if let Some(wrapper) = ad.wrapper.as_mut() {
                ensure_tracking(&mut wrapper.impressions, &mut wrapper.ad_system, &ad_id);
            }
        }
    }
}

impl Formatter for GamSsuFormatter {
    fn format(&self, mut vast: Vast) -> Result<Vec<u8>> {
        self.normalize(&mut vast);
        if vast.version.is_empty() {
            vast.version = self.version.clone();
        }
        vast.marshal()
    }
}

fn normalize_inline(inline: &mut InLine, ad_id: &str) {
    ensure_tracking(&mut inline.impressions, &mut inline.ad_system, ad_id);

    if inline.ad_title.is_empty() {
        inline.ad_title = format!("Ad {}", ad_id);
    }

    for (j, creative) in inline.creatives.iter_mut().enumerate() {
        let creative_id = match &creative.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let id = format!("{}-creative-{}", ad_id, j + 1);
                creative.id = Some(id.clone());
                id
            }
        };

        if let Some(linear) = creative.linear.as_mut() {
            normalize_linear(linear, &creative_id);
        }
    }
}

fn normalize_linear(linear: &mut Linear, creative_id: &str) {
    if linear.duration.is_empty() {
        linear.duration = GAM_DEFAULT_DURATION.to_string();
    }

    for (k, media_file) in linear.media_files.iter_mut().enumerate() {
        fill(&mut media_file.id, || format!("{}-media-{}", creative_id, k + 1));
        fill(&mut media_file.delivery, || "progressive".to_string());
        fill(&mut media_file.mime_type, || "video/mp4".to_string());
    }
}

fn ensure_tracking(impressions: &mut Vec<Impression>, ad_system: &mut Option<AdSystem>, ad_id: &str) {
    if impressions.is_empty() {
        impressions.push(Impression {
            id: Some(format!("{}-impression", ad_id)),
            url: String::new(),
        });
    }
    if ad_system.is_none() {
        *ad_system = Some(AdSystem {
            name: GAM_DEFAULT_AD_SYSTEM.to_string(),
            version: None,
        });
    }
}

fn fill(field: &mut Option<String>, value: impl FnOnce() -> String) {
    if field.as_deref().map_or(true, str::is_empty) {
        *field = Some(value());
    }
}

/// Formats a VAST with no ads at the profile's version
pub fn format_empty_vast(config: &FormatterConfig) -> Result<Vec<u8>> {
    let vast = Vast::new_empty(config.version());
    create_formatter(config).format(vast)
}

/// Checks the minimal structure every emitted ad needs
pub fn validate_vast(vast: &Vast) -> Result<()> {
    if vast.version.is_empty() {
        return Err(VastError::Validation("vast version is required".to_string()));
    }

    for (i, ad) in vast.ads.iter().enumerate() {
        match (&ad.inline, &ad.wrapper) {
            (Some(inline), None) => validate_inline(inline, i)?,
            (None, Some(wrapper)) => validate_wrapper(wrapper, i)?,
            (Some(_), Some(_)) => {
                return Err(VastError::Validation(format!(
                    "ad {} has both InLine and Wrapper",
                    i
                )));
            }
            (None, None) => {
                return Err(VastError::Validation(format!(
                    "ad {} has neither InLine nor Wrapper",
                    i
                )));
            }
        }
    }

    Ok(())
}

fn validate_inline(inline: &InLine, index: usize) -> Result<()> {
    if inline.ad_system.is_none() {
        return Err(VastError::Validation(format!("ad {}: AdSystem is required", index)));
    }
    if inline.ad_title.is_empty() {
        return Err(VastError::Validation(format!("ad {}: AdTitle is required", index)));
    }
    if inline.impressions.is_empty() {
        return Err(VastError::Validation(format!(
            "ad {}: at least one Impression is required",
            index
        )));
    }
    if inline.creatives.is_empty() {
        return Err(VastError::Validation(format!(
            "ad {}: at least one Creative is required",
            index
        )));
    }
    Ok(())
}

fn validate_wrapper(wrapper: &Wrapper, index: usize) -> Result<()> {
    if wrapper.ad_system.is_none() {
        return Err(VastError::Validation(format!(
            "ad {}: AdSystem is required in wrapper",
            index
        )));
    }
    if wrapper.vast_ad_tag_uri.is_empty() {
        return Err(VastError::Validation(format!(
            "ad {}: VASTAdTagURI is required in wrapper",
            index
        )));
    }
    if wrapper.impressions.is_empty() {
        return Err(VastError::Validation(format!(
            "ad {}: at least one Impression is required in wrapper",
            index
        )));
    }
    Ok(())
}
