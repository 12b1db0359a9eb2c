//! Wikidata-backed entity resolver.
//!
//! Hybrid lookup: `wbsearchentities` for fuzzy name search (handles typos and
//! name variants), then a batched SPARQL query to verify which candidates are
//! athletes in the requested sport. Disambiguation hints are matched against
//! the search result descriptions.

use super::{EntityResolver, Resolution, ResolverError, ResolverResult};
use crate::sanitize::name_similarity;
use crate::types::{EntityId, SportId};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Wikimedia requires a descriptive User-Agent for API access
const USER_AGENT: &str =
    "rosterdash/0.1 (https://github.com/rosterdash/rosterdash) reqwest";

const SEARCH_ENDPOINT: &str = "https://www.wikidata.org/w/api.php";
const SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const SPARQL_TIMEOUT: Duration = Duration::from_secs(20);
const LABEL_TIMEOUT: Duration = Duration::from_secs(10);

type CacheKey = (String, SportId, Option<String>);

pub struct WikidataResolver {
    client: reqwest::Client,
    /// Resolution cache keyed by (lowercased name, sport, hint)
    cache: RwLock<HashMap<CacheKey, Resolution>>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchHit {
    id: EntityId,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

impl WikidataResolver {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Fuzzy name search via wbsearchentities
    async fn search_entities(&self, name: &str, limit: usize) -> ResolverResult<Vec<SearchHit>> {
        let search_name = title_case(name.trim());
        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .timeout(SEARCH_TIMEOUT)
            .query(&[
                ("action", "wbsearchentities"),
                ("search", search_name.as_str()),
                ("language", "en"),
                ("type", "item"),
                ("format", "json"),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::error!("Wikidata search failed with status {}", response.status());
            return Err(ResolverError::Status(response.status().as_u16()));
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.search)
    }

    async fn execute_sparql(
        &self,
        query: &str,
        timeout: Duration,
    ) -> ResolverResult<serde_json::Value> {
        let response = self
            .client
            .get(SPARQL_ENDPOINT)
            .timeout(timeout)
            .header("Accept", "application/sparql-results+json")
            .query(&[("query", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::error!("Wikidata query failed with status {}", response.status());
            return Err(ResolverError::Status(response.status().as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        if body.get("results").is_none() {
            return Err(ResolverError::Malformed(
                "missing results object in SPARQL response".to_string(),
            ));
        }
        Ok(body)
    }

    /// Which of `candidates` are athletes in `sport`? One batched SPARQL
    /// query, checking several paths to the sport: occupation subclass of
    /// athlete with a sport on the entity or on the occupation, team
    /// membership, or a direct sport property. Order follows `candidates`.
    async fn verify_athletes_for_sport(
        &self,
        candidates: &[EntityId],
        sport: &SportId,
    ) -> ResolverResult<Vec<EntityId>> {
        let values: Vec<String> = candidates
            .iter()
            .filter(|id| id.starts_with('Q'))
            .map(|id| format!("wd:{id}"))
            .collect();
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let values_str = values.join(" ");

        let query = format!(
            r#"SELECT DISTINCT ?entity WHERE {{
              VALUES ?entity {{ {values_str} }}
              ?entity wdt:P31 wd:Q5 .
              {{
                ?entity wdt:P106 ?occ .
                ?occ wdt:P279* wd:Q2066131 .
                ?entity wdt:P641 ?sport .
              }}
              UNION
              {{
                ?entity wdt:P106 ?occ .
                ?occ wdt:P279* wd:Q2066131 .
                ?occ wdt:P641 ?sport .
              }}
              UNION
              {{
                ?entity wdt:P54 ?team .
                ?team wdt:P641 ?sport .
              }}
              UNION
              {{
                ?entity wdt:P641 ?sport .
              }}
              FILTER(?sport = wd:{sport} || EXISTS {{ ?sport wdt:P279* wd:{sport} }})
            }}"#
        );

        let body = self.execute_sparql(&query, SPARQL_TIMEOUT).await?;
        let mut verified: Vec<EntityId> = Vec::new();
        if let Some(bindings) = body["results"]["bindings"].as_array() {
            for binding in bindings {
                if let Some(uri) = binding["entity"]["value"].as_str() {
                    if let Some(id) = uri.rsplit('/').next() {
                        if !verified.iter().any(|v| v == id) {
                            verified.push(id.to_string());
                        }
                    }
                }
            }
        }

        // Preserve search ranking order
        let mut ordered: Vec<EntityId> = candidates
            .iter()
            .filter(|c| verified.contains(c))
            .cloned()
            .collect();
        ordered.dedup();
        Ok(ordered)
    }

    /// Is this entity an athlete in any sport at all?
    async fn verify_is_athlete(&self, entity_id: &EntityId) -> ResolverResult<(bool, Vec<String>)> {
        let query = format!(
            r#"SELECT DISTINCT ?sportLabel WHERE {{
              wd:{entity_id} wdt:P31 wd:Q5 .
              {{
                wd:{entity_id} wdt:P106 ?occ .
                ?occ wdt:P279* wd:Q2066131 .
                OPTIONAL {{ wd:{entity_id} wdt:P641 ?sport . }}
              }}
              UNION
              {{
                wd:{entity_id} wdt:P641 ?sport .
              }}
              UNION
              {{
                wd:{entity_id} wdt:P54 ?team .
                ?team wdt:P641 ?sport .
              }}
              SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
            }}
            LIMIT 10"#
        );

        let body = self.execute_sparql(&query, SPARQL_TIMEOUT).await?;
        let bindings = body["results"]["bindings"].as_array().cloned().unwrap_or_default();
        if bindings.is_empty() {
            return Ok((false, Vec::new()));
        }

        let mut sports: Vec<String> = Vec::new();
        for binding in &bindings {
            if let Some(label) = binding["sportLabel"]["value"].as_str() {
                if !label.is_empty() && !sports.iter().any(|s| s == label) {
                    sports.push(label.to_string());
                }
            }
        }
        if sports.is_empty() {
            sports.push("athlete".to_string());
        }
        Ok((true, sports))
    }

    /// Fetch the canonical English label for an entity. Non-fatal: a missing
    /// label just means we fall back to the submitted spelling.
    async fn entity_label(&self, entity_id: &EntityId) -> Option<String> {
        if !entity_id.starts_with('Q') {
            return None;
        }

        let result = self
            .client
            .get(SEARCH_ENDPOINT)
            .timeout(LABEL_TIMEOUT)
            .query(&[
                ("action", "wbgetentities"),
                ("ids", entity_id.as_str()),
                ("props", "labels"),
                ("languages", "en"),
                ("format", "json"),
            ])
            .send()
            .await;

        let response = match result {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!("Failed to fetch label for {}: {}", entity_id, r.status());
                return None;
            }
            Err(e) => {
                tracing::warn!("Error fetching label for {}: {}", entity_id, e);
                return None;
            }
        };

        let body: serde_json::Value = response.json().await.ok()?;
        let label = body["entities"][entity_id.as_str()]["labels"]["en"]["value"]
            .as_str()
            .map(|s| s.to_string());
        if let Some(ref l) = label {
            tracing::info!("Fetched canonical name for {}: {}", entity_id, l);
        }
        label
    }

    /// Narrow multiple verified candidates with the user's hint, matching
    /// against search result descriptions. Several hint matches stay
    /// ambiguous over the narrowed set so the user can be re-prompted.
    fn narrow_with_hint(
        hint: &str,
        hits: &[SearchHit],
        verified: &[EntityId],
    ) -> Option<Resolution> {
        let hint_lower = hint.to_lowercase();
        let hint_matches: Vec<EntityId> = hits
            .iter()
            .filter(|h| verified.contains(&h.id))
            .filter(|h| {
                h.description
                    .as_deref()
                    .map(|d| d.to_lowercase().contains(&hint_lower))
                    .unwrap_or(false)
            })
            .map(|h| h.id.clone())
            .collect();

        match hint_matches.len() {
            1 => Some(Resolution::Resolved {
                entity_id: hint_matches[0].clone(),
                canonical_name: None,
            }),
            n if n > 1 => Some(Resolution::Ambiguous {
                candidates: hint_matches,
            }),
            _ => None, // hint didn't help
        }
    }
}

impl Default for WikidataResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityResolver for WikidataResolver {
    async fn resolve(
        &self,
        name: &str,
        sport: &SportId,
        hint: Option<&str>,
    ) -> ResolverResult<Resolution> {
        let key: CacheKey = (
            name.to_lowercase(),
            sport.clone(),
            hint.map(|h| h.to_lowercase()),
        );
        if let Some(cached) = self.cache.read().await.get(&key) {
            return Ok(cached.clone());
        }

        let resolution = self.resolve_uncached(name, sport, hint).await?;
        self.cache
            .write()
            .await
            .insert(key, resolution.clone());
        Ok(resolution)
    }
}

impl WikidataResolver {
    async fn resolve_uncached(
        &self,
        name: &str,
        sport: &SportId,
        hint: Option<&str>,
    ) -> ResolverResult<Resolution> {
        // Single-word names ("Ronaldo") are more ambiguous; search wider
        let is_single_word = name.trim().split_whitespace().count() == 1;
        let initial_limit = if is_single_word { 10 } else { 5 };

        let mut hits = self.search_entities(name, initial_limit).await?;
        if hits.is_empty() {
            return Ok(Resolution::NotFound);
        }

        let candidate_ids: Vec<EntityId> = hits.iter().map(|h| h.id.clone()).collect();
        let mut verified = self
            .verify_athletes_for_sport(&candidate_ids, sport)
            .await?;

        // No sport match in the narrow window - widen once before giving up
        if verified.is_empty() && initial_limit < 10 {
            tracing::info!("No sport match in k={} for {}, expanding to k=10", initial_limit, name);
            hits = self.search_entities(name, 10).await?;
            let wider: Vec<EntityId> = hits.iter().map(|h| h.id.clone()).collect();
            verified = self.verify_athletes_for_sport(&wider, sport).await?;
        }

        if verified.is_empty() {
            // Found by search but not an athlete in this sport; check whether
            // they are an athlete at all to distinguish the two rejections
            let Some(first) = hits.first() else {
                return Ok(Resolution::NotFound);
            };
            let (is_athlete, sports) = self.verify_is_athlete(&first.id).await?;
            if !is_athlete {
                return Ok(Resolution::NotFound);
            }
            return Ok(Resolution::WrongSport { sports });
        }

        let entity_id = if verified.len() > 1 {
            match hint.and_then(|h| Self::narrow_with_hint(h, &hits, &verified)) {
                Some(Resolution::Resolved { entity_id, .. }) => entity_id,
                Some(ambiguous @ Resolution::Ambiguous { .. }) => return Ok(ambiguous),
                _ => {
                    return Ok(Resolution::Ambiguous {
                        candidates: verified,
                    })
                }
            }
        } else {
            verified[0].clone()
        };

        let canonical_name = self.entity_label(&entity_id).await;

        // Guard against generic-name gaming: the submitted spelling must
        // plausibly refer to the canonical name
        if let Some(ref canonical) = canonical_name {
            if !name_similarity(name, canonical) {
                tracing::info!("Name similarity check failed: '{}' vs '{}'", name, canonical);
                return Ok(Resolution::NotFound);
            }
        }

        Ok(Resolution::Resolved {
            entity_id,
            canonical_name,
        })
    }
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
