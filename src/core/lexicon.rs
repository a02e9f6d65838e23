use fst::{Map, MapBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{LexiconConfig, SynonymGroup};
use crate::core::error::QaError;
use crate::models::table::{ColumnRole, Table};

/// Words that never identify a geography or auxiliary value on their own.
const STOPWORDS: &[&str] = &[
    "and", "the", "for", "from", "with", "between", "during", "what", "which", "was", "were",
    "are", "has", "had", "have", "over", "than", "year", "years", "data", "show", "tell",
];

/// Trailing column-name tokens that are units rather than meaning.
const UNIT_TOKENS: &[&str] = &["mm", "cm", "in", "inch", "inches", "c", "f", "pct"];

/// Lowercased alphanumeric words of `text`, in order.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Canonical comparison form: lowercase words joined by single spaces.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

fn is_significant(word: &str) -> bool {
    word.chars().count() >= 3
        && !word.chars().all(|c| c.is_ascii_digit())
        && !STOPWORDS.contains(&word)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueRef {
    pub column: String,
    pub value: String,
}

impl ValueRef {
    fn key(&self) -> (String, String) {
        (self.column.clone(), normalize(&self.value))
    }
}

/// FST-backed index over the distinct values of every column with one role.
///
/// `names` maps a whole normalized value to a posting list, `words` maps each
/// significant word of a value to the values containing it. Gazetteer names
/// absent from the table are indexed by whole name only, against the first
/// column of the role, so a question about them filters down to no rows.
pub struct PhraseIndex {
    role: ColumnRole,
    names: Map<Vec<u8>>,
    words: Map<Vec<u8>>,
    postings: Vec<Vec<usize>>,
    values: Vec<ValueRef>,
    max_phrase_len: usize,
}

impl PhraseIndex {
    pub fn build(table: &Table, role: ColumnRole, gazetteer: &[String]) -> anyhow::Result<Self> {
        let mut values = Vec::new();
        // FST keys must be inserted in sorted order
        let mut name_data: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut word_data: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut max_phrase_len = 0;

        for column in table.columns_with_role(role) {
            for value in column.distinct_text() {
                let id = values.len();
                let tokens = tokenize(&value);
                if tokens.is_empty() {
                    continue;
                }
                max_phrase_len = max_phrase_len.max(tokens.len());
                name_data.entry(tokens.join(" ")).or_default().push(id);
                for word in tokens.iter().filter(|w| is_significant(w)) {
                    let ids = word_data.entry(word.clone()).or_default();
                    if ids.last() != Some(&id) {
                        ids.push(id);
                    }
                }
                values.push(ValueRef { column: column.name().to_string(), value });
            }
        }

        if let Some(first) = table.columns_with_role(role).next() {
            for name in gazetteer {
                let key = normalize(name);
                if key.is_empty() || name_data.contains_key(&key) {
                    continue;
                }
                // "Goa" must still reach "Konkan & Goa" through the word pass
                let mut words = key.split(' ').filter(|w| is_significant(w)).peekable();
                if words.peek().is_some() && words.all(|w| word_data.contains_key(w)) {
                    debug!(name = %name, "place covered by table values");
                    continue;
                }
                max_phrase_len = max_phrase_len.max(key.split(' ').count());
                name_data.insert(key, vec![values.len()]);
                values.push(ValueRef { column: first.name().to_string(), value: name.clone() });
            }
        }

        let mut postings = Vec::with_capacity(name_data.len() + word_data.len());
        let names = Self::build_map(name_data, &mut postings)?;
        let words = Self::build_map(word_data, &mut postings)?;

        debug!(?role, values = values.len(), "phrase index built");
        Ok(Self { role, names, words, postings, values, max_phrase_len })
    }

    fn build_map(
        data: BTreeMap<String, Vec<usize>>,
        postings: &mut Vec<Vec<usize>>,
    ) -> anyhow::Result<Map<Vec<u8>>> {
        let mut builder = MapBuilder::memory();
        for (key, ids) in data {
            builder.insert(key, postings.len() as u64)?;
            postings.push(ids);
        }
        Ok(Map::new(builder.into_inner()?)?)
    }

    fn role_name(&self) -> &'static str {
        match self.role {
            ColumnRole::Geography => "geography",
            ColumnRole::Auxiliary => "auxiliary",
            ColumnRole::Year => "year",
            ColumnRole::Metric => "metric",
        }
    }

    fn posting(&self, map: &Map<Vec<u8>>, key: &str) -> Vec<&ValueRef> {
        map.get(key)
            .and_then(|pid| self.postings.get(pid as usize))
            .map(|ids| ids.iter().map(|&id| &self.values[id]).collect())
            .unwrap_or_default()
    }

    /// Collapse spellings of the same value within one column.
    fn distinct_entities<'a>(refs: Vec<&'a ValueRef>) -> Vec<&'a ValueRef> {
        let mut out: Vec<&ValueRef> = Vec::new();
        for r in refs {
            if !out.iter().any(|o| o.key() == r.key()) {
                out.push(r);
            }
        }
        out
    }

    fn ambiguity(&self, token: &str, candidates: &[&ValueRef]) -> QaError {
        QaError::AmbiguousEntity {
            token: token.to_string(),
            role: self.role_name(),
            candidates: candidates
                .iter()
                .map(|c| format!("{} ({})", c.value, c.column))
                .collect(),
        }
    }

    /// Resolve every value mentioned in `tokens`, in mention order.
    ///
    /// Whole values are matched first, longest phrase wins. Leftover words
    /// then match single words of values not yet found; a word shared by
    /// several candidates is an error rather than a guess.
    pub fn scan(&self, tokens: &[String]) -> Result<Vec<ValueRef>, QaError> {
        let mut consumed = vec![false; tokens.len()];
        let mut found: Vec<ValueRef> = Vec::new();

        let mut i = 0;
        'outer: while i < tokens.len() {
            let longest = self.max_phrase_len.min(tokens.len() - i);
            for len in (1..=longest).rev() {
                let key = tokens[i..i + len].join(" ");
                let hits = Self::distinct_entities(self.posting(&self.names, &key));
                match hits.as_slice() {
                    [] => continue,
                    [hit] => {
                        debug!(phrase = %key, column = %hit.column, "exact value match");
                        if !found.iter().any(|f| f.key() == hit.key()) {
                            found.push((*hit).clone());
                        }
                    }
                    many => return Err(self.ambiguity(&key, many)),
                }
                consumed[i..i + len].iter_mut().for_each(|c| *c = true);
                i += len;
                continue 'outer;
            }
            i += 1;
        }

        for (token, _) in tokens.iter().zip(&consumed).filter(|(_, c)| !**c) {
            if !is_significant(token) {
                continue;
            }
            let hits: Vec<&ValueRef> = Self::distinct_entities(self.posting(&self.words, token))
                .into_iter()
                .filter(|h| !found.iter().any(|f| f.key() == h.key()))
                .collect();
            match hits.as_slice() {
                [] => {}
                [hit] => {
                    debug!(word = %token, value = %hit.value, "partial value match");
                    found.push((*hit).clone());
                }
                many => return Err(self.ambiguity(token, many)),
            }
        }

        Ok(found)
    }
}

#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub column: String,
    /// Normalized phrases that name this column outright.
    pub phrases: Vec<String>,
}

impl MetricEntry {
    fn from_column(name: &str) -> Self {
        let tokens = tokenize(name);
        let mut phrases = vec![tokens.join(" ")];
        if let Some((last, rest)) = tokens.split_last() {
            if !rest.is_empty() && UNIT_TOKENS.contains(&last.as_str()) {
                phrases.push(rest.join(" "));
            }
        }
        Self { column: name.to_string(), phrases }
    }
}

/// Everything the extractor may recognise in a question about one table.
pub struct Catalogue {
    pub geography: PhraseIndex,
    pub auxiliary: PhraseIndex,
    pub metrics: Vec<MetricEntry>,
    pub synonyms: Vec<SynonymGroup>,
}

impl Catalogue {
    pub fn build(table: &Table, config: &LexiconConfig) -> anyhow::Result<Self> {
        Ok(Self {
            geography: PhraseIndex::build(table, ColumnRole::Geography, &config.gazetteer)?,
            auxiliary: PhraseIndex::build(table, ColumnRole::Auxiliary, &[])?,
            metrics: table
                .columns_with_role(ColumnRole::Metric)
                .map(|c| MetricEntry::from_column(c.name()))
                .collect(),
            synonyms: config.synonyms.clone(),
        })
    }
}
