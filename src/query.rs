//! Query submission and the into-result-frame convention.
//!
//! Query text is opaque. The only rewrite is appending `INTO <answer table>`
//! when the text names no destination of its own.

use std::ops::Range;
use std::sync::LazyLock;

use arrow::record_batch::RecordBatch;
use regex::Regex;

use crate::job::{self, Job, JobId, PollPolicy};
use crate::model::{PropertyMap, TableData};
use crate::store::GraphStore;
use crate::Result;

/// Result frame used when a query names none.
pub const DEFAULT_ANSWER_TABLE: &str = "_answer_table_";

static INTO_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bINTO\s+(\w+)").unwrap_or_else(|e| panic!("invalid INTO pattern: {e}"))
});

/// The frame named by the query's `INTO` clause, if any.
///
/// The keyword is matched in upper case only, and never inside a quoted
/// string literal.
pub fn destination(query: &str) -> Option<&str> {
    let literals = literal_spans(query);
    INTO_CLAUSE
        .captures_iter(query)
        .filter(|c| {
            c.get(0)
                .is_some_and(|m| !literals.iter().any(|span| span.contains(&m.start())))
        })
        .find_map(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Byte ranges of `'...'` and `"..."` literals, backslash escapes honored.
/// An unterminated literal runs to the end of the text.
fn literal_spans(query: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open: Option<(char, usize)> = None;
    let mut escaped = false;
    for (i, c) in query.char_indices() {
        match open {
            None if c == '\'' || c == '"' => open = Some((c, i)),
            None => {}
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some((quote, start)) if c == quote => {
                spans.push(start..i + 1);
                open = None;
            }
            Some(_) => {}
        }
    }
    if let Some((_, start)) = open {
        spans.push(start..query.len());
    }
    spans
}

/// Query text guaranteed to carry a destination, and that destination.
pub fn with_destination(query: &str, default: &str) -> (String, String) {
    match destination(query) {
        Some(dest) => (query.to_string(), dest.to_string()),
        None => (format!("{query}\nINTO {default}"), default.to_string()),
    }
}

/// Outcome of [`QueryRunner::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job: JobId,
    pub destination: String,
    /// Frames dropped to clear the destination (including cascaded edge frames).
    pub dropped: Vec<String>,
}

/// Runs query jobs against one store connection.
pub struct QueryRunner<'s, S: GraphStore + ?Sized> {
    store: &'s S,
    answer_table: &'s str,
    poll: PollPolicy,
}

impl<'s, S: GraphStore + ?Sized> QueryRunner<'s, S> {
    pub fn new(store: &'s S, answer_table: &'s str, poll: PollPolicy) -> Self {
        Self { store, answer_table, poll }
    }

    /// Submit `text`. With `wait`, returns only once the job is terminal
    /// (a failed job is an error); otherwise returns right after scheduling.
    pub async fn submit(&self, text: &str, params: &PropertyMap, wait: bool) -> Result<Submission> {
        let (query, destination) = with_destination(text, self.answer_table);
        let dropped = self.store.drop_frame(&destination).await?;
        if !dropped.is_empty() {
            tracing::debug!(destination = %destination, ?dropped, "cleared query destination");
        }

        let job = if wait {
            let job = self.store.run_job(&query, params).await?;
            if job.status.is_terminal() {
                job.into_result()?
            } else {
                self.wait(job.id).await?
            }
        } else {
            self.store.schedule_job(&query, params).await?
        };
        tracing::info!(job = %job.id, destination = %destination, wait, "submitted query");

        Ok(Submission { job: job.id, destination, dropped })
    }

    /// Block until an asynchronously submitted job is terminal.
    pub async fn wait(&self, id: JobId) -> Result<Job> {
        job::wait_for_job(self.store, id, self.poll).await
    }

    /// Full result set of `table`, defaulting to the answer table.
    pub async fn fetch(&self, table: Option<&str>) -> Result<TableData> {
        let name = table.unwrap_or(self.answer_table);
        self.store.get_table_frame(name).await?;
        self.store.fetch(name).await
    }

    /// Result set as an Arrow record batch.
    pub async fn fetch_table(&self, table: Option<&str>) -> Result<RecordBatch> {
        self.fetch(table).await?.to_batch()
    }
}
