// Moderation policy - the rule list, score thresholds and probation settings.
//
// Loaded once at startup and never changed afterwards.

use super::classifier::{Classifier, ConfigurationError};
use super::moderation_models::{ProbationConfig, ScoreThresholds};
use super::rules::RuleConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationConfig {
    #[serde(default)]
    pub thresholds: ScoreThresholds,
    #[serde(default)]
    pub probation: ProbationConfig,
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            thresholds: ScoreThresholds::default(),
            probation: ProbationConfig::default(),
            rules: default_rules(),
        }
    }
}

/// A checked policy: the settings as loaded plus the classifier built from them.
pub struct ModerationPolicy {
    pub config: ModerationConfig,
    pub classifier: Classifier,
}

impl ModerationConfig {
    /// Check the settings and compile the rules into a classifier.
    pub fn compile(self) -> Result<ModerationPolicy, ConfigurationError> {
        if self.probation.clean_messages_to_trust == 0 {
            return Err(ConfigurationError::InvalidProbation(
                "clean_messages_to_trust must be at least 1".to_string(),
            ));
        }
        if self.probation.window_secs == 0 {
            return Err(ConfigurationError::InvalidProbation(
                "window_secs must be at least 1".to_string(),
            ));
        }

        let classifier = Classifier::from_config(&self)?;
        Ok(ModerationPolicy {
            config: self,
            classifier,
        })
    }
}

/// Built-in rules used when no policy file exists.
fn default_rules() -> Vec<RuleConfig> {
    vec![
        // Links are normal between regulars, not from someone who just joined
        RuleConfig::keywords("links", 6.0, true, &["http://", "https://", "www."]),
        RuleConfig::domains(
            "invite_links",
            6.0,
            true,
            &["t.me", "telegram.me", "discord.gg", "chat.whatsapp.com"],
        ),
        RuleConfig::domains(
            "url_shorteners",
            4.0,
            false,
            &["bit.ly", "tinyurl.com", "goo.su", "cutt.ly", "is.gd", "clck.ru"],
        ),
        RuleConfig::keywords(
            "crypto_promotion",
            4.0,
            false,
            &["airdrop", "crypto signals", "usdt", "binance bonus", "free nft"],
        ),
        RuleConfig::keywords(
            "easy_money",
            5.0,
            false,
            &[
                "easy money",
                "passive income",
                "earn from home",
                "per day without",
                "заработок",
                "пассивный доход",
            ],
        ),
        RuleConfig::regex(
            "private_message_bait",
            4.0,
            true,
            r"\b(dm|pm|write) me\b|\bin (private|dm|pm)\b|пиши(те)? в (лс|личку)",
        ),
    ]
}
