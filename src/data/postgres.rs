// src/data/postgres.rs

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::{
    Combinator, DataClient, DataError, Filter, FilterOp, Record, RowKey, Selection, Table, Value,
    validate_field_name,
};

/*
All column values cross the wire as jsonb:
- reads:  SELECT to_jsonb(t) ... decoded straight into a Record
- writes: jsonb_populate_record(NULL::<table>, $1) so Postgres applies the
          column types (date, numeric, bool, ...) itself
Filters compare the column's text form, matching Filter::matches.
*/

#[derive(Clone)]
pub struct PgDataClient {
    pool: PgPool,
}

impl PgDataClient {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn quote_ident(field: &str) -> Result<String, DataError> {
    validate_field_name(field)?;
    Ok(format!("\"{field}\""))
}

/// `%needle%` with LIKE metacharacters escaped (default escape char is `\`).
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) -> Result<(), DataError> {
    let column = quote_ident(&filter.field)?;
    match (filter.op, &filter.value) {
        (FilterOp::Eq, Value::Null) => {
            qb.push(format!("t.{column} IS NULL"));
        }
        (FilterOp::Eq, value) => {
            qb.push(format!("t.{column}::text = "));
            qb.push_bind(value.to_string());
        }
        (FilterOp::Contains, value) => {
            qb.push(format!("t.{column}::text ILIKE "));
            qb.push_bind(like_pattern(&value.to_string()));
        }
    }
    Ok(())
}

fn push_where(qb: &mut QueryBuilder<'_, Postgres>, selection: &Selection) -> Result<(), DataError> {
    if selection.filters.is_empty() {
        return Ok(());
    }
    let joiner = match selection.combinator {
        Combinator::And => " AND ",
        Combinator::Or => " OR ",
    };
    qb.push(" WHERE (");
    for (i, filter) in selection.filters.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_filter(qb, filter)?;
    }
    qb.push(")");
    Ok(())
}

fn column_list(row: &Record, prefix: &str) -> Result<String, DataError> {
    row.fields()
        .map(|f| quote_ident(f).map(|q| format!("{prefix}{q}")))
        .collect::<Result<Vec<_>, _>>()
        .map(|cols| cols.join(", "))
}

fn decode_row(row: &sqlx::postgres::PgRow) -> Result<Record, DataError> {
    let Json(record): Json<Record> = row
        .try_get("row")
        .map_err(|e| DataError::Decode(e.to_string()))?;
    Ok(record)
}

fn ensure_writable(table: Table) -> Result<(), DataError> {
    if table.is_writable() {
        Ok(())
    } else {
        Err(DataError::ReadOnly(table))
    }
}

/// `INSERT INTO "t" AS t ("a", "b") SELECT r."a", r."b" FROM jsonb_populate_record(...) AS r`
fn insert_builder<'a>(table: Table, row: &'a Record) -> Result<QueryBuilder<'a, Postgres>, DataError> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("INSERT INTO \"{table}\" AS t "));
    if row.is_empty() {
        qb.push("DEFAULT VALUES");
        return Ok(qb);
    }
    qb.push(format!(
        "({}) SELECT {} FROM jsonb_populate_record(NULL::\"{table}\", ",
        column_list(row, "")?,
        column_list(row, "r.")?,
    ));
    qb.push_bind(Json(row));
    qb.push(") AS r");
    Ok(qb)
}

#[async_trait]
impl DataClient for PgDataClient {
    async fn select(&self, table: Table, selection: &Selection) -> Result<Vec<Record>, DataError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT to_jsonb(t) AS row FROM \"{table}\" t"));
        push_where(&mut qb, selection)?;
        qb.push(" ORDER BY t.\"id\" ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn insert(&self, table: Table, rows: &[Record]) -> Result<Vec<Record>, DataError> {
        ensure_writable(table)?;

        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let mut qb = insert_builder(table, row)?;
            qb.push(" RETURNING to_jsonb(t) AS row");
            let returned = qb.build().fetch_one(&mut *tx).await?;
            stored.push(decode_row(&returned)?);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn update(&self, table: Table, patch: &Record, key: &RowKey) -> Result<(), DataError> {
        ensure_writable(table)?;
        let key_column = quote_ident(&key.field)?;
        if patch.is_empty() {
            return Ok(());
        }

        let assignments = patch
            .fields()
            .map(|f| quote_ident(f).map(|q| format!("{q} = r.{q}")))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "UPDATE \"{table}\" AS t SET {assignments} FROM jsonb_populate_record(NULL::\"{table}\", "
        ));
        qb.push_bind(Json(patch));
        qb.push(format!(") AS r WHERE t.{key_column}::text = "));
        qb.push_bind(key.value.to_string());

        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert(&self, table: Table, rows: &[Record], conflict_key: &str) -> Result<(), DataError> {
        ensure_writable(table)?;
        let conflict_column = quote_ident(conflict_key)?;

        let mut tx = self.pool.begin().await?;
        for row in rows {
            if !row.contains(conflict_key) {
                return Err(DataError::Rejected(format!(
                    "upsert row is missing conflict key `{conflict_key}`"
                )));
            }
            let updates = row
                .fields()
                .filter(|f| *f != conflict_key)
                .map(|f| quote_ident(f).map(|q| format!("{q} = EXCLUDED.{q}")))
                .collect::<Result<Vec<_>, _>>()?;

            let mut qb = insert_builder(table, row)?;
            if updates.is_empty() {
                qb.push(format!(" ON CONFLICT ({conflict_column}) DO NOTHING"));
            } else {
                qb.push(format!(
                    " ON CONFLICT ({conflict_column}) DO UPDATE SET {}",
                    updates.join(", ")
                ));
            }
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("asp"), "%asp%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn select_sql_joins_filters_with_combinator() {
        let selection = Selection::any_of(vec![
            Filter::contains("medicine_name", "asp"),
            Filter::contains("ingredients", "asp"),
        ]);
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT to_jsonb(t) AS row FROM \"main\" t");
        push_where(&mut qb, &selection).unwrap();

        assert_eq!(
            qb.sql(),
            "SELECT to_jsonb(t) AS row FROM \"main\" t WHERE (t.\"medicine_name\"::text ILIKE $1 OR t.\"ingredients\"::text ILIKE $2)"
        );
    }

    #[test]
    fn null_equality_uses_is_null() {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("");
        push_where(&mut qb, &Selection::all_of(vec![Filter::eq("address", Value::Null)])).unwrap();
        assert_eq!(qb.sql(), " WHERE (t.\"address\" IS NULL)");
    }

    #[test]
    fn hostile_field_names_never_reach_sql() {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("");
        let err = push_where(
            &mut qb,
            &Selection::all_of(vec![Filter::eq("id\" OR 1=1 --", "1")]),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::InvalidField(_)));
    }

    #[test]
    fn insert_sql_populates_from_jsonb() {
        let row = Record::new().with("id", 7).with("medicine_name", "Aspirin");
        let qb = insert_builder(Table::Main, &row).unwrap();
        assert_eq!(
            qb.sql(),
            "INSERT INTO \"main\" AS t (\"id\", \"medicine_name\") SELECT r.\"id\", r.\"medicine_name\" FROM jsonb_populate_record(NULL::\"main\", $1) AS r"
        );
    }
}
