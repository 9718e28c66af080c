use guildmerit_core::IdentityMapping;
use guildmerit_core::ports::Storage;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Where the identity mappings for a cycle came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Verified,
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentities {
    pub source: IdentitySource,
    /// Deduplicated, sorted by chat user id
    pub mappings: Vec<IdentityMapping>,
}

fn normalize(mappings: impl IntoIterator<Item = IdentityMapping>) -> Vec<IdentityMapping> {
    mappings.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Verified links from storage win; the configured mappings are the fallback
///
/// A storage failure here is not fatal: the cycle continues on the static list.
pub async fn resolve_identities(
    storage: &dyn Storage,
    fallback: &[IdentityMapping],
) -> ResolvedIdentities {
    match storage.list_verified_identities().await {
        Ok(verified) if !verified.is_empty() => {
            info!("Using {} verified identity links", verified.len());
            ResolvedIdentities {
                source: IdentitySource::Verified,
                mappings: normalize(verified),
            }
        }
        Ok(_) => ResolvedIdentities {
            source: IdentitySource::Static,
            mappings: normalize(fallback.iter().cloned()),
        },
        Err(e) => {
            warn!("Failed to read verified identities, using configured mappings: {}", e);
            ResolvedIdentities {
                source: IdentitySource::Static,
                mappings: normalize(fallback.iter().cloned()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use guildmerit_core::{AdapterError, AdapterResult, ContributionEvent, Score};

    /// Storage that only answers identity lookups
    struct LinkStore(AdapterResult<Vec<IdentityMapping>>);

    #[async_trait]
    impl Storage for LinkStore {
        async fn append(&self, _events: &[ContributionEvent]) -> AdapterResult<usize> {
            Ok(0)
        }

        async fn query(&self, _since: DateTime<Utc>) -> AdapterResult<Vec<ContributionEvent>> {
            Ok(Vec::new())
        }

        async fn get_cursor(&self, _source: &str) -> AdapterResult<Option<DateTime<Utc>>> {
            Ok(None)
        }

        async fn set_cursor(&self, _source: &str, _at: DateTime<Utc>) -> AdapterResult<()> {
            Ok(())
        }

        async fn upsert_scores(&self, _scores: &[Score]) -> AdapterResult<()> {
            Ok(())
        }

        async fn list_verified_identities(&self) -> AdapterResult<Vec<IdentityMapping>> {
            self.0.clone()
        }
    }

    fn fallback() -> Vec<IdentityMapping> {
        vec![
            IdentityMapping::new("200", "bob"),
            IdentityMapping::new("100", "alice"),
            IdentityMapping::new("200", "bob"),
        ]
    }

    #[tokio::test]
    async fn test_verified_links_take_precedence() {
        let store = LinkStore(Ok(vec![
            IdentityMapping::new("300", "carol"),
            IdentityMapping::new("100", "alice-gh"),
            IdentityMapping::new("300", "carol"),
        ]));

        let resolved = resolve_identities(&store, &fallback()).await;
        assert_eq!(resolved.source, IdentitySource::Verified);
        assert_eq!(
            resolved.mappings,
            vec![
                IdentityMapping::new("100", "alice-gh"),
                IdentityMapping::new("300", "carol"),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_store_falls_back_to_configured_mappings() {
        let resolved = resolve_identities(&LinkStore(Ok(Vec::new())), &fallback()).await;
        assert_eq!(resolved.source, IdentitySource::Static);
        assert_eq!(
            resolved.mappings,
            vec![IdentityMapping::new("100", "alice"), IdentityMapping::new("200", "bob")]
        );
    }

    #[tokio::test]
    async fn test_store_error_falls_back_to_configured_mappings() {
        let store = LinkStore(Err(AdapterError::Storage("no such table".to_string())));

        let resolved = resolve_identities(&store, &fallback()).await;
        assert_eq!(resolved.source, IdentitySource::Static);
        assert_eq!(resolved.mappings.len(), 2);
    }

    #[tokio::test]
    async fn test_no_links_anywhere() {
        let resolved = resolve_identities(&LinkStore(Ok(Vec::new())), &[]).await;
        assert_eq!(resolved.source, IdentitySource::Static);
        assert!(resolved.mappings.is_empty());
    }
}
