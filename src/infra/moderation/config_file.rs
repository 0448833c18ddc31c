use crate::core::moderation::{ConfigurationError, ModerationConfig, ModerationPolicy};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Load the moderation policy and compile it.
///
/// A missing file means "use the built-in defaults". Anything unreadable,
/// malformed or invalid is a `ConfigurationError`.
pub async fn load_moderation_config(path: &Path) -> Result<ModerationPolicy, ConfigurationError> {
    let config = match fs::read_to_string(path).await {
        Ok(text) => serde_json::from_str::<ModerationConfig>(&text)
            .map_err(|e| ConfigurationError::Unreadable(format!("{}: {}", path.display(), e)))?,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(
                "No moderation config at {}, using built-in defaults",
                path.display()
            );
            ModerationConfig::default()
        }
        Err(e) => {
            return Err(ConfigurationError::Unreadable(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    };

    config.compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();

        let policy = load_moderation_config(&dir.path().join("moderation.json"))
            .await
            .unwrap();

        assert_eq!(policy.config, ModerationConfig::default());
        assert!(policy.classifier.rule_count() > 0);
    }

    #[tokio::test]
    async fn test_file_is_parsed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("moderation.json");
        std::fs::write(
            &path,
            r#"{
                "thresholds": { "suspicious": 5, "spam": 10 },
                "probation": { "clean_messages_to_trust": 3, "window_secs": 600 },
                "rules": [
                    { "label": "links", "weight": 10, "probation_only": true,
                      "pattern": { "type": "keywords", "keywords": ["http://"] } }
                ]
            }"#,
        )
        .unwrap();

        let policy = load_moderation_config(&path).await.unwrap();

        assert_eq!(policy.config.probation.clean_messages_to_trust, 3);
        assert_eq!(policy.config.rules.len(), 1);
        assert!(policy.config.rules[0].probation_only);
        assert_eq!(policy.classifier.rule_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("moderation.json");
        std::fs::write(&path, "{ thresholds: ").unwrap();

        assert!(matches!(
            load_moderation_config(&path).await,
            Err(ConfigurationError::Unreadable(_))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_path_is_fatal() {
        let dir = TempDir::new().unwrap();

        // A directory exists but can't be read as a file
        assert!(matches!(
            load_moderation_config(dir.path()).await,
            Err(ConfigurationError::Unreadable(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_thresholds_are_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("moderation.json");
        std::fs::write(
            &path,
            r#"{ "thresholds": { "suspicious": 10, "spam": 10 }, "rules": [] }"#,
        )
        .unwrap();

        assert!(matches!(
            load_moderation_config(&path).await,
            Err(ConfigurationError::InvalidThresholds(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_pattern_type_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("moderation.json");
        std::fs::write(
            &path,
            r#"{ "rules": [ { "label": "x", "weight": 1, "pattern": { "type": "vibes" } } ] }"#,
        )
        .unwrap();

        assert!(load_moderation_config(&path).await.is_err());
    }
}
