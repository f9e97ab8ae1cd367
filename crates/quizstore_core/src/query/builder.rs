//! `QueryBuilder`: fluent state plus terminal execution calls.

use super::clause::{check_expression, check_identifier, render_conditions};
use super::{Boolean, Condition, Direction, Join, JoinType, Operator, QueryError, QueryResult};
use crate::model::record::Record;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Statement};

const COUNT_PROJECTION: &str = "COUNT(*) AS count";

/// Statement builder bound to one connection and one table.
///
/// Builder calls only accumulate state; nothing touches the database until a
/// terminal call (`get`, `first`, `count`, `insert`, `update`, `delete`).
/// Terminal calls borrow the builder, so one builder can be executed more
/// than once and counting never alters the projection.
#[derive(Debug, Clone)]
pub struct QueryBuilder<'conn> {
    conn: &'conn Connection,
    table: String,
    select: Vec<String>,
    wheres: Vec<Condition>,
    joins: Vec<Join>,
    order_by: Vec<(String, Direction)>,
    group_by: Vec<String>,
    having: Vec<Condition>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'conn> QueryBuilder<'conn> {
    pub fn new(conn: &'conn Connection, table: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
            select: vec!["*".to_string()],
            wheres: Vec::new(),
            joins: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Replaces the projection.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        if self.select.is_empty() {
            self.select.push("*".to_string());
        }
        self
    }

    /// Appends a fully specified condition.
    pub fn push_condition(mut self, condition: Condition) -> Self {
        self.wheres.push(condition);
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    pub fn where_op(
        self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.push_condition(Condition::new(column, operator, value, Boolean::And))
    }

    pub fn or_where(
        self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.push_condition(Condition::new(column, operator, value, Boolean::Or))
    }

    pub fn where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_condition(Condition::list(column, Operator::In, values, Boolean::And))
    }

    pub fn where_not_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_condition(Condition::list(column, Operator::NotIn, values, Boolean::And))
    }

    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.push_condition(Condition::new(
            column,
            Operator::IsNull,
            Value::Null,
            Boolean::And,
        ))
    }

    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.push_condition(Condition::new(
            column,
            Operator::IsNotNull,
            Value::Null,
            Boolean::And,
        ))
    }

    pub fn join(
        mut self,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: Operator,
        right: impl Into<String>,
    ) -> Self {
        self.joins.push(Join {
            table: table.into(),
            left: left.into(),
            operator,
            right: right.into(),
            kind: JoinType::Inner,
        });
        self
    }

    pub fn left_join(
        mut self,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: Operator,
        right: impl Into<String>,
    ) -> Self {
        self.joins.push(Join {
            table: table.into(),
            left: left.into(),
            operator,
            right: right.into(),
            kind: JoinType::Left,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn having(
        mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
        boolean: Boolean,
    ) -> Self {
        self.having
            .push(Condition::new(column, operator, value, boolean));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn has_conditions(&self) -> bool {
        !self.wheres.is_empty()
    }

    /// Renders the SELECT statement and its bind values without executing.
    pub fn to_sql(&self) -> QueryResult<(String, Vec<Value>)> {
        self.render_select(&self.select, self.limit, true)
    }

    /// Runs the SELECT and returns every row; empty when nothing matches.
    pub fn get(&self) -> QueryResult<Vec<Record>> {
        let (sql, binds) = self.to_sql()?;
        self.select_records(&sql, &binds)
    }

    /// Runs the SELECT with `LIMIT 1`.
    pub fn first(&self) -> QueryResult<Option<Record>> {
        let (sql, binds) = self.render_select(&self.select, Some(1), true)?;
        Ok(self.select_records(&sql, &binds)?.into_iter().next())
    }

    /// Counts rows matching the current JOIN/WHERE/GROUP state.
    ///
    /// Ordering and paging are not applied to the count.
    pub fn count(&self) -> QueryResult<u64> {
        let projection = [COUNT_PROJECTION.to_string()];
        let (sql, binds) = self.render_select(&projection, None, false)?;
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds.iter()))?;
        let count = match rows.next()? {
            Some(row) => row.get::<_, i64>(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Inserts one row and returns its rowid.
    pub fn insert(&self, data: &Record) -> QueryResult<i64> {
        if data.is_empty() {
            return Err(QueryError::EmptyData);
        }
        check_identifier(&self.table)?;
        for column in data.keys() {
            check_identifier(column)?;
        }

        let columns = data.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
        let placeholders = vec!["?"; data.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            self.table
        );
        self.conn.execute(&sql, params_from_iter(data.values()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Inserts every row in one statement and returns the inserted count.
    ///
    /// The column list comes from the first row; other rows bind NULL for
    /// columns they lack and may not carry columns the first row lacks.
    pub fn insert_many(&self, rows: &[Record]) -> QueryResult<usize> {
        let Some(first) = rows.first() else {
            return Err(QueryError::EmptyData);
        };
        if first.is_empty() {
            return Err(QueryError::EmptyData);
        }
        check_identifier(&self.table)?;
        for row in rows {
            for column in row.keys() {
                if !first.contains_key(column) {
                    return Err(QueryError::UnexpectedColumn(column.clone()));
                }
            }
        }
        for column in first.keys() {
            check_identifier(column)?;
        }

        let columns = first.keys().map(String::as_str).collect::<Vec<_>>();
        let row_placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            columns.join(", "),
            vec![row_placeholders.as_str(); rows.len()].join(", ")
        );
        let binds = rows.iter().flat_map(|row| {
            columns
                .iter()
                .map(move |column| row.get(*column).cloned().unwrap_or(Value::Null))
        });
        Ok(self.conn.execute(&sql, params_from_iter(binds))?)
    }

    /// Updates rows matching the WHERE state and returns the affected count.
    ///
    /// Refuses with `MissingWhereClause` when no condition is set.
    pub fn update(&self, data: &Record) -> QueryResult<usize> {
        if self.wheres.is_empty() {
            return Err(QueryError::MissingWhereClause);
        }
        if data.is_empty() {
            return Err(QueryError::EmptyData);
        }
        check_identifier(&self.table)?;

        let mut binds = Vec::with_capacity(data.len() + self.wheres.len());
        let mut assignments = Vec::with_capacity(data.len());
        for (column, value) in data {
            check_identifier(column)?;
            assignments.push(format!("{column} = ?"));
            binds.push(value.clone());
        }
        let where_sql = render_conditions(&self.wheres, false, &mut binds)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {where_sql}",
            self.table,
            assignments.join(", ")
        );
        Ok(self.conn.execute(&sql, params_from_iter(binds.iter()))?)
    }

    /// Deletes rows matching the WHERE state and returns the affected count.
    ///
    /// Refuses with `MissingWhereClause` when no condition is set.
    pub fn delete(&self) -> QueryResult<usize> {
        if self.wheres.is_empty() {
            return Err(QueryError::MissingWhereClause);
        }
        check_identifier(&self.table)?;

        let mut binds = Vec::new();
        let where_sql = render_conditions(&self.wheres, false, &mut binds)?;
        let sql = format!("DELETE FROM {} WHERE {where_sql}", self.table);
        Ok(self.conn.execute(&sql, params_from_iter(binds.iter()))?)
    }

    /// Executes a parameterized statement outside the fluent grammar.
    pub fn raw(&self, sql: &str, params: &[Value]) -> QueryResult<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params.iter()))?)
    }

    /// Runs a parameterized query outside the fluent grammar.
    pub fn raw_select(&self, sql: &str, params: &[Value]) -> QueryResult<Vec<Record>> {
        self.select_records(sql, params)
    }

    fn render_select(
        &self,
        projection: &[String],
        limit: Option<u64>,
        with_ordering: bool,
    ) -> QueryResult<(String, Vec<Value>)> {
        check_identifier(&self.table)?;
        for column in projection {
            check_expression(column)?;
        }

        let mut binds = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", projection.join(", "), self.table);

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.render()?);
        }

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&render_conditions(&self.wheres, false, &mut binds)?);
        }

        if !self.group_by.is_empty() {
            for column in &self.group_by {
                check_identifier(column)?;
            }
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&render_conditions(&self.having, true, &mut binds)?);
        }

        if !with_ordering {
            return Ok((sql, binds));
        }

        if !self.order_by.is_empty() {
            let mut clauses = Vec::with_capacity(self.order_by.len());
            for (column, direction) in &self.order_by {
                check_identifier(column)?;
                clauses.push(format!("{column} {}", direction.as_sql()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&clauses.join(", "));
        }

        match (limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ?");
                binds.push(Value::Integer(to_sql_integer(limit)));
                if let Some(offset) = offset.filter(|offset| *offset > 0) {
                    sql.push_str(" OFFSET ?");
                    binds.push(Value::Integer(to_sql_integer(offset)));
                }
            }
            (None, Some(offset)) if offset > 0 => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                binds.push(Value::Integer(to_sql_integer(offset)));
            }
            (None, _) => {}
        }

        Ok((sql, binds))
    }

    fn select_records(&self, sql: &str, binds: &[Value]) -> QueryResult<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        Ok(collect_records(&mut stmt, binds)?)
    }
}

fn to_sql_integer(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn collect_records(stmt: &mut Statement<'_>, binds: &[Value]) -> rusqlite::Result<Vec<Record>> {
    let columns = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let mut rows = stmt.query(params_from_iter(binds.iter()))?;
    let mut records = Vec::new();

    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (index, column) in columns.iter().enumerate() {
            record.insert(column.clone(), row.get::<_, Value>(index)?);
        }
        records.push(record);
    }

    Ok(records)
}
