//! Parameterized translation of a `dcb_core::Query` and optional `Cursor`
//! into SQL predicate fragments.
//!
//! The teacher crate's `disintegrate-postgres::event_store::query::CriteriaBuilder`
//! builds its criteria by `format!`-interpolating serialized values directly
//! into the SQL string. We build on the same `sqlx::QueryBuilder` idiom the
//! teacher's `InsertEventsBuilder` (`event_store/append.rs`) already uses for
//! inserts, but apply it to predicates too, so every value — tag arrays,
//! event type lists, cursor components — is bound as a parameter rather than
//! interpolated. This is a deliberate improvement on the teacher's query
//! module, not a gap in it; see DESIGN.md.

use dcb_core::{Cursor, Query, QueryItem};
use sqlx::{Postgres, QueryBuilder};

/// Appends `(item_1 OR item_2 OR ...)` to `builder`. An empty query appends
/// the literal `FALSE`, matching the "empty query matches nothing" rule
/// shared by reads and append-condition checks.
pub fn push_query_predicate(builder: &mut QueryBuilder<'_, Postgres>, query: &Query) {
    if query.is_empty() {
        builder.push("FALSE");
        return;
    }
    builder.push("(");
    let mut first = true;
    for item in query.items() {
        if !first {
            builder.push(" OR ");
        }
        first = false;
        push_item_predicate(builder, item);
    }
    builder.push(")");
}

fn push_item_predicate(builder: &mut QueryBuilder<'_, Postgres>, item: &QueryItem) {
    builder.push("(");
    let mut wrote = false;
    if !item.types().is_empty() {
        let types: Vec<String> = item.types().iter().map(|t| t.as_str().to_string()).collect();
        builder.push("event_type = ANY(");
        builder.push_bind(types);
        builder.push(")");
        wrote = true;
    }
    if !item.tags().is_empty() {
        if wrote {
            builder.push(" AND ");
        }
        let tags: Vec<String> = item.tags().iter().map(|t| t.canonical()).collect();
        builder.push("tags @> ");
        builder.push_bind(tags);
        wrote = true;
    }
    if !wrote {
        builder.push("TRUE");
    }
    builder.push(")");
}

/// Appends the "strictly after `cursor`" predicate, or `TRUE` if there is no
/// cursor (read from the beginning).
pub fn push_cursor_predicate(builder: &mut QueryBuilder<'_, Postgres>, cursor: Option<Cursor>) {
    match cursor {
        Some(c) => {
            builder.push("(transaction_id > ");
            builder.push_bind(c.transaction_id);
            builder.push(" OR (transaction_id = ");
            builder.push_bind(c.transaction_id);
            builder.push(" AND position > ");
            builder.push_bind(c.position);
            builder.push("))");
        }
        None => {
            builder.push("TRUE");
        }
    }
}

#[cfg(test)]
mod tests {
    use dcb_core::{EventType, Tag};

    use super::*;

    #[test]
    fn empty_query_is_false() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 WHERE ");
        push_query_predicate(&mut builder, &Query::empty());
        assert_eq!(builder.sql(), "SELECT 1 WHERE FALSE");
    }

    #[test]
    fn item_with_types_and_tags_ands_both_clauses() {
        let item = QueryItem::new(
            vec![EventType::new("ItemAdded").unwrap()],
            vec![Tag::new("cart_id", "c1").unwrap()],
        )
        .unwrap();
        let query = Query::new(vec![item]);
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 WHERE ");
        push_query_predicate(&mut builder, &query);
        assert_eq!(
            builder.sql(),
            "SELECT 1 WHERE ((event_type = ANY($1) AND tags @> $2))"
        );
    }

    #[test]
    fn cursor_predicate_compares_transaction_then_position() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 WHERE ");
        push_cursor_predicate(&mut builder, Some(Cursor::new(5, 10)));
        assert_eq!(
            builder.sql(),
            "SELECT 1 WHERE (transaction_id > $1 OR (transaction_id = $2 AND position > $3))"
        );
    }

    #[test]
    fn no_cursor_is_true() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 WHERE ");
        push_cursor_predicate(&mut builder, None);
        assert_eq!(builder.sql(), "SELECT 1 WHERE TRUE");
    }
}
