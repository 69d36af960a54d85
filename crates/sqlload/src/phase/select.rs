//! Select phase: a fixed battery of read queries over the inserted users.

use super::{Phase, PhaseContext, PhaseError, Tally};
use crate::engine::{SqlValue, StorageEngine};
use crate::metrics::{MetricValue, PhaseMetrics, count_i64};
use crate::timing::timed;

struct ReadQuery {
    label: &'static str,
    sql: &'static str,
    params: Vec<SqlValue>,
}

fn battery<E: StorageEngine>(ctx: &mut PhaseContext<'_, E>) -> Vec<ReadQuery> {
    let spec = ctx.spec;
    vec![
        ReadQuery {
            label: "full_scan",
            sql: "SELECT * FROM users LIMIT ?1",
            params: vec![SqlValue::Integer(count_i64(spec.select.scan_limit))],
        },
        ReadQuery {
            label: "indexed_lookup",
            sql: "SELECT id, email, city FROM users WHERE city = ?1",
            params: vec![SqlValue::Text(ctx.generator.city())],
        },
        ReadQuery {
            label: "unindexed_lookup",
            sql: "SELECT id, first_name, last_name FROM users WHERE first_name LIKE ?1",
            params: vec![SqlValue::Text(format!("{}%", ctx.generator.first_name()))],
        },
        ReadQuery {
            label: "count",
            sql: "SELECT COUNT(*) FROM users",
            params: Vec::new(),
        },
        ReadQuery {
            label: "join_group",
            sql: "SELECT u.city, COUNT(t.id) AS tx_count, COALESCE(SUM(t.amount), 0) AS volume \
                  FROM users u LEFT JOIN transactions t ON t.user_id = u.id \
                  GROUP BY u.city ORDER BY tx_count DESC, u.city LIMIT ?1",
            params: vec![SqlValue::Integer(count_i64(spec.select.join_limit))],
        },
        ReadQuery {
            label: "aggregate_stats",
            sql: "SELECT AVG(age), MIN(age), MAX(age), AVG(salary), MIN(salary), MAX(salary) \
                  FROM users",
            params: Vec::new(),
        },
    ]
}

pub fn run<E: StorageEngine>(ctx: &mut PhaseContext<'_, E>) -> Result<PhaseMetrics, PhaseError> {
    let mut metrics = PhaseMetrics::new(Phase::Select.as_str());
    let mut tally = Tally::default();
    let mut total_ms = 0.0;
    let mut rows_returned = 0_u64;

    for query in battery(ctx) {
        let step = timed(|| tally.absorb(ctx.engine.query(query.sql, &query.params)))?;
        let step_ms = step.elapsed_ms();
        let rows = step
            .value
            .map_or(0, |rows| u64::try_from(rows.len()).unwrap_or(u64::MAX));
        total_ms += step_ms;
        rows_returned += rows;
        metrics.push_timing(query.label, step_ms, rows);
        metrics.set_counter(
            format!("{}_rows", query.label),
            MetricValue::Count(count_i64(rows)),
        );
    }

    metrics.set_counter("queries", MetricValue::Count(count_i64(tally.ok)));
    metrics.set_counter("failed_queries", MetricValue::Count(count_i64(tally.failed)));
    metrics.set_counter("rows_returned", MetricValue::Count(count_i64(rows_returned)));
    metrics.finish(total_ms, tally.ok);
    Ok(metrics)
}
