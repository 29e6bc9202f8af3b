//! `[base]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[base]` section in linewiki.toml - wiki metadata.
///
/// # Example
/// ```toml
/// [base]
/// title = "notes"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    /// Wiki title, shown in the browser tab next to the page path.
    #[serde(default = "defaults::base::title")]
    #[educe(Default = defaults::base::title())]
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::super::WikiConfig;

    #[test]
    fn test_base_config() {
        let config: WikiConfig = toml::from_str(
            r#"
            [base]
            title = "journal"
        "#,
        )
        .unwrap();
        assert_eq!(config.base.title, "journal");
    }

    #[test]
    fn test_base_config_defaults() {
        let config: WikiConfig = toml::from_str("").unwrap();
        assert_eq!(config.base.title, "linewiki");
    }
}
