use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::core::error::QaError;
use crate::core::lexicon::{tokenize, Catalogue, ValueRef};
use crate::models::query::{Extremum, Intent, YearRange};
use crate::models::table::{MAX_YEAR, MIN_YEAR};

/// Intent rules, evaluated top to bottom; the first pattern that matches wins.
///
/// Precedence is Compare > MaxMin(Max) > MaxMin(Min) > Trend > Average, so
/// "average of the highest years" is a MaxMin question and "compare the
/// trend" is a Compare question.
const INTENT_RULES: &[(&str, Intent)] = &[
    (r"\b(?:compare|comparison|comparing|versus|vs|difference between)\b", Intent::Compare),
    (
        r"\b(?:highest|maximum|max|most|greatest|largest|wettest|peak)\b",
        Intent::MaxMin(Extremum::Max),
    ),
    (r"\b(?:lowest|minimum|min|least|smallest|driest)\b", Intent::MaxMin(Extremum::Min)),
    (
        r"\b(?:trend|trends|over time|over the years|pattern|change|changed|year by year|year-wise|yearly)\b",
        Intent::Trend,
    ),
    (r"\b(?:average|mean|avg|typical)\b", Intent::Average),
];

/// Units that turn a 4-digit number into a quantity rather than a year.
const QUANTITY_SUFFIXES: &[&str] = &["mm", "cm", "%", "millimet", "inch"];

struct IntentRule {
    pattern: Regex,
    intent: Intent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    /// A metric column was named outright.
    Named,
    /// Picked through a configured synonym group.
    Synonym,
    /// Nothing named; every metric column is a candidate.
    Default,
}

/// Raw entities recognised in one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySet {
    pub intent: Intent,
    pub geographies: Vec<ValueRef>,
    pub auxiliaries: Vec<ValueRef>,
    pub years: Option<YearRange>,
    pub metrics: Vec<String>,
    pub metric_source: MetricSource,
}

pub struct EntityExtractor {
    rules: Vec<IntentRule>,
    year_range: Regex,
    between_range: Regex,
    year: Regex,
}

impl EntityExtractor {
    pub fn new() -> anyhow::Result<Self> {
        let rules = INTENT_RULES
            .iter()
            .map(|(pattern, intent)| -> anyhow::Result<IntentRule> {
                Ok(IntentRule { pattern: Regex::new(&format!("(?i){}", pattern))?, intent: *intent })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            year_range: Regex::new(
                r"(?i)\b([0-9]{4})\s*(?:-|–|—|to|through|till|until)\s*([0-9]{4}|[0-9]{2})\b",
            )?,
            between_range: Regex::new(r"(?i)\bbetween\s+([0-9]{4})\s+and\s+([0-9]{4})\b")?,
            year: Regex::new(r"\b([0-9]{4})\b")?,
        })
    }

    /// First matching rule decides; `Unknown` when none does.
    pub fn detect_intent(&self, question: &str) -> Intent {
        self.rules
            .iter()
            .find(|r| r.pattern.is_match(question))
            .map(|r| r.intent)
            .unwrap_or(Intent::Unknown)
    }

    #[instrument(level = "debug", skip(self, catalogue), fields(question = %question))]
    pub fn extract(&self, question: &str, catalogue: &Catalogue) -> Result<EntitySet, QaError> {
        let intent = self.detect_intent(question);
        let years = self.extract_years(question)?;

        let tokens = tokenize(question);
        let geographies = catalogue.geography.scan(&tokens)?;
        let auxiliaries = catalogue.auxiliary.scan(&tokens)?;
        let (metrics, metric_source) = Self::match_metrics(&tokens, catalogue);

        debug!(
            ?intent,
            ?years,
            geographies = geographies.len(),
            ?metric_source,
            "entities extracted"
        );

        Ok(EntitySet { intent, geographies, auxiliaries, years, metrics, metric_source })
    }

    /// Explicit ranges first, then standalone years; several mentions collapse to their span.
    pub fn extract_years(&self, question: &str) -> Result<Option<YearRange>, QaError> {
        let mut named: Vec<i32> = Vec::new();
        let mut covered: Vec<(usize, usize)> = Vec::new();

        for re in [&self.between_range, &self.year_range] {
            for caps in re.captures_iter(question) {
                let (Some(whole), Some(a), Some(b)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                    continue;
                };
                if covered.iter().any(|&(s, e)| whole.start() < e && s < whole.end()) {
                    continue;
                }
                let lo = parse_year(a.as_str())?;
                let hi = if b.as_str().len() == 2 {
                    match expand_short_year(lo, b.as_str()) {
                        Some(hi) => hi,
                        None => {
                            // "2015-10" reads as a date, leave 2015 to the single-year pass
                            debug!(text = whole.as_str(), "two-digit tail is not a year");
                            continue;
                        }
                    }
                } else {
                    parse_year(b.as_str())?
                };
                covered.push((whole.start(), whole.end()));
                named.extend([lo, hi]);
            }
        }

        for m in self.year.find_iter(question) {
            if covered.iter().any(|&(s, e)| m.start() >= s && m.end() <= e) {
                continue;
            }
            let rest = question[m.end()..].trim_start().to_lowercase();
            if QUANTITY_SUFFIXES.iter().any(|u| rest.starts_with(u)) {
                debug!(number = m.as_str(), "4-digit quantity, not a year");
                continue;
            }
            named.push(parse_year(m.as_str())?);
        }

        if let Some(&bad) = named.iter().find(|y| !(MIN_YEAR..=MAX_YEAR).contains(*y)) {
            warn!(year = bad, "year outside supported bounds");
            return Err(QaError::InvalidRange { year: bad });
        }

        let (Some(&lo), Some(&hi)) = (named.iter().min(), named.iter().max()) else {
            return Ok(None);
        };
        Ok(Some(YearRange::new(lo, hi)))
    }

    /// Canonical column phrases beat synonym groups, which beat "all metrics".
    fn match_metrics(tokens: &[String], catalogue: &Catalogue) -> (Vec<String>, MetricSource) {
        let padded = format!(" {} ", tokens.join(" "));
        let mentions = |phrase: &str| padded.contains(&format!(" {} ", phrase));

        let named: Vec<String> = catalogue
            .metrics
            .iter()
            .filter(|m| m.phrases.iter().any(|p| mentions(p.as_str())))
            .map(|m| m.column.clone())
            .collect();
        if !named.is_empty() {
            return (named, MetricSource::Named);
        }

        let keywords: Vec<&str> = catalogue
            .synonyms
            .iter()
            .filter(|g| g.aliases.iter().any(|a| mentions(a.as_str())))
            .map(|g| g.keyword.as_str())
            .collect();
        let by_synonym: Vec<String> = catalogue
            .metrics
            .iter()
            .filter(|m| {
                let name = m.column.to_lowercase();
                keywords.iter().any(|k| name.contains(k))
            })
            .map(|m| m.column.clone())
            .collect();
        if !by_synonym.is_empty() {
            return (by_synonym, MetricSource::Synonym);
        }

        (
            catalogue.metrics.iter().map(|m| m.column.clone()).collect(),
            MetricSource::Default,
        )
    }
}

fn parse_year(text: &str) -> Result<i32, QaError> {
    text.parse()
        .map_err(|_| QaError::Parse(format!("'{}' is not a year", text)))
}

/// "2015-16" means 2015 to 2016 and "1999-02" means 1999 to 2002.
///
/// The tail must move forward within the century, or wrap from the last
/// decade of one century into the first decade of the next.
fn expand_short_year(lo: i32, short: &str) -> Option<i32> {
    let yy: i32 = short.parse().ok()?;
    let base = lo - lo.rem_euclid(100);
    if yy > lo.rem_euclid(100) {
        Some(base + yy)
    } else if lo.rem_euclid(100) >= 90 && yy < 10 {
        Some(base + 100 + yy)
    } else {
        None
    }
}
