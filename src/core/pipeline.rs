use tracing::{info, instrument, warn};

use crate::config::FormatConfig;
use crate::core::builder::QueryBuilder;
use crate::core::error::QaError;
use crate::core::executor::QueryExecutor;
use crate::core::extractor::EntityExtractor;
use crate::core::formatter::{build_prompt, AnswerFormatter};
use crate::core::lexicon::Catalogue;
use crate::models::context::{Answer, AnswerStatus};
use crate::models::query::ParsedQuery;
use crate::models::result::QueryResult;
use crate::models::table::Table;

/// Answer plus the intermediate results it was rendered from.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub answer: Answer,
    pub results: Vec<QueryResult>,
}

/// Question in, cited answer out. Holds no per-dataset state.
pub struct Pipeline {
    extractor: EntityExtractor,
    formatter: AnswerFormatter,
}

impl Pipeline {
    pub fn new(format: FormatConfig) -> anyhow::Result<Self> {
        Ok(Self { extractor: EntityExtractor::new()?, formatter: AnswerFormatter::new(format) })
    }

    pub fn formatter(&self) -> &AnswerFormatter {
        &self.formatter
    }

    #[instrument(skip(self, table, catalogue), fields(question = %question))]
    pub fn ask(&self, table: &Table, catalogue: &Catalogue, question: &str) -> Outcome {
        match self.plan(table, catalogue, question) {
            Ok(query) => self.run(table, query),
            Err(err) => {
                warn!(kind = ?err.kind(), error = %err, "question rejected");
                Outcome {
                    answer: Answer {
                        answer: self.formatter.render_error(&err),
                        citations: Vec::new(),
                        status: AnswerStatus::ParseError,
                        error: Some(err.kind()),
                        query: None,
                    },
                    results: Vec::new(),
                }
            }
        }
    }

    /// Extraction plus query building, without touching table rows.
    pub fn plan(
        &self,
        table: &Table,
        catalogue: &Catalogue,
        question: &str,
    ) -> Result<ParsedQuery, QaError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::Parse("the question is empty".into()));
        }
        let entities = self.extractor.extract(question, catalogue)?;
        QueryBuilder::build(&entities, table)
    }

    pub fn prompt(&self, question: &str, outcome: &Outcome, table: &Table) -> String {
        build_prompt(question, outcome.answer.query.as_ref(), &outcome.results, table)
    }

    fn run(&self, table: &Table, query: ParsedQuery) -> Outcome {
        let results = QueryExecutor::new(table).execute(&query);
        let (text, citations) = self.formatter.render(&query, &results, table);
        let status = if citations.is_empty() { AnswerStatus::NoData } else { AnswerStatus::Ok };
        info!(?status, results = results.len(), citations = citations.len(), "answer ready");
        Outcome {
            answer: Answer { answer: text, citations, status, error: None, query: Some(query) },
            results,
        }
    }
}
