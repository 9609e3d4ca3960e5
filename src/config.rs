use crate::enricher::{CollisionPolicy, EnricherConfig, Placement, PlacementRules};
use crate::error::{Result, VastError};
use crate::formatter::{FormatterConfig, ReceiverProfile};
use crate::selector::{SelectionStrategy, SelectorConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Effective CTV VAST settings for one request
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CtvVastConfig {
    pub enabled: bool,
    pub receiver: ReceiverProfile,
    pub vast_version_default: String,
    pub default_currency: String,
    pub max_ads_in_pod: i64,
    pub selection_strategy: SelectionStrategy,
    pub collision_policy: CollisionPolicy,
    pub placement_rules: PlacementRules,
    pub include_debug_ids: bool,
    pub stored_requests_enabled: bool,
}

impl Default for CtvVastConfig {
    fn default() -> Self {
        CtvVastConfig {
            enabled: false,
            receiver: ReceiverProfile::GamSsu,
            vast_version_default: "3.0".to_string(),
            default_currency: "USD".to_string(),
            max_ads_in_pod: 1,
            selection_strategy: SelectionStrategy::Single,
            collision_policy: CollisionPolicy::VastWins,
            placement_rules: PlacementRules::default(),
            include_debug_ids: false,
            stored_requests_enabled: false,
        }
    }
}

/// A partial config layer; unset fields leave the lower layer alone
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct CtvVastOverrides {
    pub enabled: Option<bool>,
    pub receiver: Option<ReceiverProfile>,
    pub vast_version_default: Option<String>,
    pub default_currency: Option<String>,
    pub max_ads_in_pod: Option<i64>,
    pub selection_strategy: Option<SelectionStrategy>,
    pub collision_policy: Option<CollisionPolicy>,
    pub placement_rules: Option<PlacementRuleOverrides>,
    pub include_debug_ids: Option<bool>,
    pub stored_requests_enabled: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct PlacementRuleOverrides {
    pub price: Option<Placement>,
    pub currency: Option<Placement>,
    pub advertiser: Option<Placement>,
    pub categories: Option<Placement>,
    pub duration: Option<Placement>,
    pub ids: Option<Placement>,
    pub deal_id: Option<Placement>,
}

impl CtvVastConfig {
    /// Layers account and profile overrides on top of the host config
    pub fn merge(
        host: &CtvVastConfig,
        account: Option<&CtvVastOverrides>,
        profile: Option<&CtvVastOverrides>,
    ) -> CtvVastConfig {
        let mut merged = host.clone();
        for layer in [account, profile].into_iter().flatten() {
            merged.apply(layer);
        }
        merged
    }

    pub fn apply(&mut self, overrides: &CtvVastOverrides) {
        set(&mut self.enabled, overrides.enabled);
        set(&mut self.receiver, overrides.receiver);
        set(&mut self.max_ads_in_pod, overrides.max_ads_in_pod);
        set(&mut self.selection_strategy, overrides.selection_strategy);
        set(&mut self.collision_policy, overrides.collision_policy);
        set(&mut self.include_debug_ids, overrides.include_debug_ids);
        set(&mut self.stored_requests_enabled, overrides.stored_requests_enabled);

        if let Some(version) = overrides.vast_version_default.as_ref().filter(|v| !v.is_empty()) {
            self.vast_version_default = version.clone();
        }
        if let Some(currency) = overrides.default_currency.as_ref().filter(|c| !c.is_empty()) {
            self.default_currency = currency.clone();
        }

        if let Some(rules) = &overrides.placement_rules {
            let target = &mut self.placement_rules;
            set(&mut target.price, rules.price);
            set(&mut target.currency, rules.currency);
            set(&mut target.advertiser, rules.advertiser);
            set(&mut target.categories, rules.categories);
            set(&mut target.duration, rules.duration);
            set(&mut target.ids, rules.ids);
            set(&mut target.deal_id, rules.deal_id);
        }
    }

    pub fn selector_config(&self) -> SelectorConfig {
        SelectorConfig {
            strategy: self.selection_strategy,
            max_ads_in_pod: self.max_ads_in_pod,
        }
    }

    /// `debug` turns on debug ids for a single request
    pub fn enricher_config(&self, debug: bool) -> EnricherConfig {
        EnricherConfig {
            collision_policy: self.collision_policy,
            placement_rules: self.placement_rules,
            default_currency: self.default_currency.clone(),
            include_debug_ids: self.include_debug_ids || debug,
        }
    }

    pub fn formatter_config(&self) -> FormatterConfig {
        FormatterConfig {
            profile: self.receiver,
            default_version: self.vast_version_default.clone(),
        }
    }
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Settings for the `serve` command, read from a JSON file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// OpenRTB auction endpoint bid requests are posted to
    pub exchange_url: String,
    /// Auction deadline in milliseconds
    pub tmax: i64,
    pub vast: CtvVastConfig,
    /// Per-publisher overrides keyed by publisher id
    pub accounts: HashMap<String, CtvVastOverrides>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: "0.0.0.0:8000".to_string(),
            exchange_url: String::new(),
            tmax: 1000,
            vast: CtvVastConfig::default(),
            accounts: HashMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ServerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tmax < 0 {
            return Err(VastError::Config(format!("tmax must not be negative, got {}", self.tmax)));
        }
        if !self.exchange_url.is_empty() {
            url::Url::parse(&self.exchange_url)?;
        }
        Ok(())
    }

    /// Host config merged with the publisher's account overrides
    pub fn vast_config_for(&self, publisher_id: &str) -> CtvVastConfig {
        CtvVastConfig::merge(&self.vast, self.accounts.get(publisher_id), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CtvVastConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.receiver, ReceiverProfile::GamSsu);
        assert_eq!(config.vast_version_default, "3.0");
        assert_eq!(config.default_currency, "USD");
        assert_eq!(config.max_ads_in_pod, 1);
        assert_eq!(config.selection_strategy, SelectionStrategy::Single);
        assert_eq!(config.collision_policy, CollisionPolicy::VastWins);
        assert_eq!(config.placement_rules.price, Placement::Inline);
        assert_eq!(config.placement_rules.categories, Placement::Extensions);
        assert_eq!(config.placement_rules.ids, Placement::Extensions);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: CtvVastConfig = serde_json::from_str(
            r#"{"enabled": true, "selection_strategy": "TOP_N", "placement_rules": {"price": "EXTENSIONS"}}"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.selection_strategy, SelectionStrategy::TopN);
        assert_eq!(config.placement_rules.price, Placement::Extensions);
        assert_eq!(config.placement_rules.advertiser, Placement::Inline);
        assert_eq!(config.default_currency, "USD");
    }

    #[test]
    fn unknown_enum_values_fall_back() {
        let config: CtvVastConfig = serde_json::from_str(
            r#"{"receiver": "SOMETHING", "selection_strategy": "RANDOM", "collision_policy": "x", "placement_rules": {"ids": "nowhere"}}"#,
        )
        .unwrap();
        assert_eq!(config.receiver, ReceiverProfile::Generic);
        assert_eq!(config.selection_strategy, SelectionStrategy::Single);
        assert_eq!(config.collision_policy, CollisionPolicy::VastWins);
        assert_eq!(config.placement_rules.ids, Placement::Skip);
    }

    #[test]
    fn merge_layers_in_order() {
        let host = CtvVastConfig {
            enabled: true,
            ..Default::default()
        };
        let account = CtvVastOverrides {
            max_ads_in_pod: Some(3),
            selection_strategy: Some(SelectionStrategy::TopN),
            default_currency: Some("EUR".to_string()),
            placement_rules: Some(PlacementRuleOverrides {
                advertiser: Some(Placement::Extensions),
                ..Default::default()
            }),
            ..Default::default()
        };
        let profile = CtvVastOverrides {
            max_ads_in_pod: Some(5),
            receiver: Some(ReceiverProfile::Generic),
            vast_version_default: Some(String::new()),
            ..Default::default()
        };

        let merged = CtvVastConfig::merge(&host, Some(&account), Some(&profile));
        assert!(merged.enabled);
        assert_eq!(merged.max_ads_in_pod, 5);
        assert_eq!(merged.selection_strategy, SelectionStrategy::TopN);
        assert_eq!(merged.default_currency, "EUR");
        assert_eq!(merged.receiver, ReceiverProfile::Generic);
        assert_eq!(merged.vast_version_default, "3.0");
        assert_eq!(merged.placement_rules.advertiser, Placement::Extensions);
        assert_eq!(merged.placement_rules.price, Placement::Inline);

        let untouched = CtvVastConfig::merge(&host, None, None);
        assert_eq!(untouched, host);
    }

    #[test]
    fn account_can_disable() {
        let host = CtvVastConfig {
            enabled: true,
            ..Default::default()
        };
        let account = CtvVastOverrides {
            enabled: Some(false),
            ..Default::default()
        };
        assert!(!CtvVastConfig::merge(&host, Some(&account), None).enabled);
    }

    #[test]
    fn derived_component_configs() {
        let config = CtvVastConfig {
            max_ads_in_pod: 4,
            selection_strategy: SelectionStrategy::TopN,
            ..Default::default()
        };
        assert_eq!(config.selector_config().max_ads_in_pod, 4);
        assert!(!config.enricher_config(false).include_debug_ids);
        assert!(config.enricher_config(true).include_debug_ids);
        let formatter = config.formatter_config();
        assert_eq!(formatter.profile, ReceiverProfile::GamSsu);
        assert_eq!(formatter.default_version, "3.0");
    }

    #[test]
    fn server_config_resolves_accounts() {
        let config = ServerConfig::from_json(
            r#"{
                "listen": "127.0.0.1:9000",
                "exchange_url": "http://localhost:8080/openrtb2/auction",
                "vast": {"enabled": true},
                "accounts": {"pub-1": {"receiver": "GENERIC", "max_ads_in_pod": 2}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.tmax, 1000);

        let pub1 = config.vast_config_for("pub-1");
        assert!(pub1.enabled);
        assert_eq!(pub1.receiver, ReceiverProfile::Generic);
        assert_eq!(pub1.max_ads_in_pod, 2);

        let other = config.vast_config_for("pub-2");
        assert_eq!(other.receiver, ReceiverProfile::GamSsu);
    }

    #[test]
    fn server_config_rejects_bad_values() {
        assert!(ServerConfig::from_json(r#"{"tmax": -1}"#).is_err());
        assert!(matches!(
            ServerConfig::from_json(r#"{"exchange_url": "not a url"}"#),
            Err(VastError::UrlError(_))
        ));
        assert!(ServerConfig::from_json("{").is_err());
    }
}
