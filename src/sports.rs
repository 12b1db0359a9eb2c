//! Sport taxonomy.
//!
//! Sports are identified by Wikidata Q-IDs so that submissions can be
//! verified with SPARQL. The catalog ships with a curated list: Wikidata's
//! own sport classification is inconsistent (American football and rugby are
//! only tagged as "team sport", not "type of sport"), so a harvested list
//! would miss major sports anyway. A few display names are overridden where
//! the Wikidata label is confusing ("association football").

use crate::types::SportId;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct Sport {
    /// Q-ID, used as the submission value and in SPARQL
    pub value: SportId,
    /// Display label
    pub label: String,
    pub wikidata_id: SportId,
}

/// Catalog of playable sports with Q-ID and label lookups
#[derive(Debug, Clone, Default)]
pub struct SportCatalog {
    by_qid: HashMap<SportId, Sport>,
}

const CURATED_SPORTS: &[(&str, &str)] = &[
    ("Q2736", "association football"),
    ("Q5372", "basketball"),
    ("Q847", "tennis"),
    ("Q41466", "ice hockey"),
    ("Q5369", "baseball"),
    ("Q41323", "American football"),
    ("Q5849", "rugby union"),
    ("Q10962", "rugby league"),
    ("Q5378", "rugby"),
    ("Q5377", "golf"),
    ("Q32112", "boxing"),
    ("Q31920", "swimming"),
    ("Q53121", "cycling"),
    ("Q542", "athletics"),
    ("Q114466", "mixed martial arts"),
    ("Q131359", "professional wrestling"),
    ("Q5386", "auto racing"),
    ("Q38108", "curling"),
    ("Q1455", "field hockey"),
    ("Q7707", "water polo"),
    ("Q7275", "lacrosse"),
    ("Q170746", "Australian rules football"),
    ("Q46952", "softball"),
    ("Q3930", "volleyball"),
    ("Q36389", "cricket"),
    ("Q11419", "handball"),
];

/// Friendlier display names for sports whose Wikidata label reads poorly in a UI
const DISPLAY_OVERRIDES: &[(&str, &str)] = &[
    ("Q2736", "Football (Soccer)"),
    ("Q114466", "MMA / Mixed Martial Arts"),
    ("Q542", "Athletics (Track & Field)"),
    ("Q41323", "American Football"),
    ("Q131359", "Pro Wrestling"),
    ("Q5386", "Auto Racing / Motorsport"),
    ("Q5378", "Rugby"),
];

impl SportCatalog {
    /// Build the curated catalog with display overrides applied
    pub fn builtin() -> Self {
        let overrides: HashMap<&str, &str> = DISPLAY_OVERRIDES.iter().copied().collect();
        let by_qid = CURATED_SPORTS
            .iter()
            .map(|(qid, label)| {
                let display = overrides.get(qid).copied().unwrap_or(label);
                (
                    qid.to_string(),
                    Sport {
                        value: qid.to_string(),
                        label: display.to_string(),
                        wikidata_id: qid.to_string(),
                    },
                )
            })
            .collect();
        Self { by_qid }
    }

    /// Merge additional entries (e.g. harvested from Wikidata); existing
    /// entries keep their label
    pub fn merge(&mut self, sports: impl IntoIterator<Item = Sport>) {
        for sport in sports {
            self.by_qid.entry(sport.value.clone()).or_insert(sport);
        }
    }

    pub fn is_valid_qid(&self, qid: &str) -> bool {
        self.by_qid.contains_key(qid)
    }

    pub fn label(&self, qid: &str) -> Option<&str> {
        self.by_qid.get(qid).map(|s| s.label.as_str())
    }

    /// All sports, sorted by label for stable listings
    pub fn list(&self) -> Vec<Sport> {
        let mut sports: Vec<Sport> = self.by_qid.values().cloned().collect();
        sports.sort_by(|a, b| a.label.to_lowercase().cmp(&b.label.to_lowercase()));
        sports
    }
}
