use tracing::{debug, info};

use crate::core::error::QaError;
use crate::core::extractor::{EntitySet, MetricSource};
use crate::core::lexicon::ValueRef;
use crate::models::query::{Filter, GroupBy, Intent, ParsedQuery};
use crate::models::table::{ColumnRole, Table};

/// Turns extracted entities into a `ParsedQuery`.
pub struct QueryBuilder;

impl QueryBuilder {
    pub fn build(entities: &EntitySet, table: &Table) -> Result<ParsedQuery, QaError> {
        if entities.intent == Intent::Unknown {
            return Err(QaError::Parse(
                "ask for an average, a highest or lowest value, a comparison or a trend".into(),
            ));
        }
        if entities.metrics.is_empty() {
            return Err(QaError::Parse("the dataset has no metric to answer with".into()));
        }

        let mut filters = Vec::new();
        let geo_groups = group_by_column(&entities.geographies);
        for (column, values) in &geo_groups {
            filters.push(Filter::Values {
                column: column.clone(),
                role: ColumnRole::Geography,
                values: values.clone(),
            });
        }
        for (column, values) in group_by_column(&entities.auxiliaries) {
            filters.push(Filter::Values { column, role: ColumnRole::Auxiliary, values });
        }
        if let Some(range) = entities.years {
            filters.push(Filter::YearRange {
                column: table.year_column().name().to_string(),
                range,
            });
        }

        if filters.is_empty() && entities.metric_source == MetricSource::Default {
            return Err(QaError::Parse("name a place, a year or a rainfall measure".into()));
        }

        // A. several places of one column are compared or traced side by side
        let mut group_by = match entities.intent {
            Intent::Compare | Intent::Trend => geo_groups
                .iter()
                .find(|(_, values)| values.len() >= 2)
                .map(|(column, _)| GroupBy { column: column.clone(), role: ColumnRole::Geography }),
            _ => None,
        };

        // a trend over no named place still gets one series per place
        if entities.intent == Intent::Trend && geo_groups.is_empty() {
            group_by = table
                .columns_with_role(ColumnRole::Geography)
                .next()
                .map(|c| GroupBy { column: c.name().to_string(), role: ColumnRole::Geography });
        }

        // B. one place over several years compares year against year
        if entities.intent == Intent::Compare && group_by.is_none() {
            match entities.years {
                Some(range) if !range.is_single() => {
                    group_by = Some(GroupBy {
                        column: table.year_column().name().to_string(),
                        role: ColumnRole::Year,
                    });
                }
                _ => {
                    return Err(QaError::Parse(
                        "a comparison needs at least two places or a range of years".into(),
                    ))
                }
            }
        }

        let query = ParsedQuery {
            intent: entities.intent,
            filters,
            metrics: entities.metrics.clone(),
            group_by,
            ordered_by_year: entities.intent == Intent::Trend,
        };
        debug!(?query, "query built");
        info!(
            intent = ?query.intent,
            filters = query.filters.len(),
            metrics = query.metrics.len(),
            "structured query ready"
        );
        Ok(query)
    }
}

/// Values per column, both in first-mention order.
fn group_by_column(refs: &[ValueRef]) -> Vec<(String, Vec<String>)> {
    let mut out: Vec<(String, Vec<String>)> = Vec::new();
    for r in refs {
        match out.iter().position(|(c, _)| *c == r.column) {
            Some(pos) => out[pos].1.push(r.value.clone()),
            None => out.push((r.column.clone(), vec![r.value.clone()])),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::query::{Extremum, YearRange};
    use crate::models::table::Column;

    fn table() -> Table {
        Table::new(vec![
            Column::geography("State", vec!["Goa".into(), "Kerala".into()]),
            Column::year("Year", vec![2015, 2016]),
            Column::metric("Annual_Rainfall_mm", vec![Some(1.0), Some(2.0)]),
        ])
        .unwrap()
    }

    fn geo(value: &str) -> ValueRef {
        ValueRef { column: "State".into(), value: value.into() }
    }

    fn entities(intent: Intent) -> EntitySet {
        EntitySet {
            intent,
            geographies: vec![],
            auxiliaries: vec![],
            years: None,
            metrics: vec!["Annual_Rainfall_mm".into()],
            metric_source: MetricSource::Synonym,
        }
    }

    #[test]
    fn unknown_intent_is_a_parse_error() {
        let err = QueryBuilder::build(&entities(Intent::Unknown), &table()).unwrap_err();
        assert!(matches!(err, QaError::Parse(_)));
    }

    #[test]
    fn nothing_usable_is_a_parse_error() {
        let mut e = entities(Intent::Average);
        e.metric_source = MetricSource::Default;
        assert!(matches!(QueryBuilder::build(&e, &table()), Err(QaError::Parse(_))));
    }

    #[test]
    fn compare_two_places_groups_by_geography() {
        let mut e = entities(Intent::Compare);
        e.geographies = vec![geo("Kerala"), geo("Goa")];
        e.years = Some(YearRange::new(2015, 2020));
        let q = QueryBuilder::build(&e, &table()).unwrap();
        assert_eq!(
            q.group_by,
            Some(GroupBy { column: "State".into(), role: ColumnRole::Geography })
        );
        assert_eq!(
            q.filters,
            vec![
                Filter::Values {
                    column: "State".into(),
                    role: ColumnRole::Geography,
                    values: vec!["Kerala".into(), "Goa".into()],
                },
                Filter::YearRange { column: "Year".into(), range: YearRange::new(2015, 2020) },
            ]
        );
        assert!(!q.ordered_by_year);
    }

    #[test]
    fn compare_one_place_over_years_groups_by_year() {
        let mut e = entities(Intent::Compare);
        e.geographies = vec![geo("Kerala")];
        e.years = Some(YearRange::new(2015, 2016));
        let q = QueryBuilder::build(&e, &table()).unwrap();
        assert_eq!(q.group_by.map(|g| g.role), Some(ColumnRole::Year));
    }

    #[test]
    fn compare_with_nothing_to_compare_fails() {
        let mut e = entities(Intent::Compare);
        e.geographies = vec![geo("Kerala")];
        e.years = Some(YearRange::single(2015));
        assert!(QueryBuilder::build(&e, &table()).is_err());
    }

    #[test]
    fn trend_is_year_ordered_and_maxmin_is_ungrouped() {
        let mut e = entities(Intent::Trend);
        e.geographies = vec![geo("Kerala")];
        let q = QueryBuilder::build(&e, &table()).unwrap();
        assert!(q.ordered_by_year);
        assert!(q.group_by.is_none());

        let q = QueryBuilder::build(&entities(Intent::Trend), &table()).unwrap();
        assert_eq!(
            q.group_by,
            Some(GroupBy { column: "State".into(), role: ColumnRole::Geography })
        );

        let mut e = entities(Intent::MaxMin(Extremum::Max));
        e.geographies = vec![geo("Kerala"), geo("Goa")];
        let q = QueryBuilder::build(&e, &table()).unwrap();
        assert!(q.group_by.is_none());
    }
}
