//! MySQL/MariaDB remote target (feature `mysql`).

use crate::config::RemoteConfig;
use crate::dialect::Dialect;
use crate::engine::{RemoteConnector, RemoteSession};
use crate::types::{ExecOutcome, Params, Row, SqlValue};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Value};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct MySqlConnector {
    config: RemoteConfig,
}

impl MySqlConnector {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }

    fn opts(&self) -> OptsBuilder {
        OptsBuilder::default()
            .ip_or_hostname(self.config.host.clone())
            .tcp_port(self.config.port)
            .user(Some(self.config.user.clone()))
            .pass(Some(self.config.password.clone()))
            .db_name(Some(self.config.database.clone()))
    }
}

#[async_trait]
impl RemoteConnector for MySqlConnector {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn describe(&self) -> String {
        format!(
            "mysql://{}@{}:{}/{}",
            self.config.user, self.config.host, self.config.port, self.config.database
        )
    }

    async fn connect(&self) -> Result<Box<dyn RemoteSession>> {
        let conn = Conn::new(self.opts()).await?;
        Ok(Box::new(MySqlSession { conn }))
    }
}

pub struct MySqlSession {
    conn: Conn,
}

#[async_trait]
impl RemoteSession for MySqlSession {
    async fn execute(&mut self, sql: &str, params: &Params) -> Result<ExecOutcome> {
        self.conn.exec_drop(sql, to_mysql_params(params)).await?;
        Ok(ExecOutcome {
            rows_affected: self.conn.affected_rows(),
            last_insert_id: self.conn.last_insert_id().map(|id| id as i64),
        })
    }

    async fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        let rows: Vec<mysql_async::Row> = self.conn.exec(sql, to_mysql_params(params)).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let columns: Vec<String> = row
                .columns_ref()
                .iter()
                .map(|c| c.name_str().to_string())
                .collect();
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                let value = row
                    .as_ref(idx)
                    .cloned()
                    .ok_or_else(|| anyhow!("column {} missing from row", idx))?;
                values.push(from_mysql(value));
            }
            out.push(Row::new(columns, values));
        }
        Ok(out)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.disconnect().await?;
        Ok(())
    }
}

fn to_mysql_params(params: &Params) -> mysql_async::Params {
    match params {
        Params::Positional(values) if values.is_empty() => mysql_async::Params::Empty,
        Params::Positional(values) => {
            mysql_async::Params::Positional(values.iter().map(to_mysql).collect())
        }
        Params::Named(values) => mysql_async::Params::Named(
            values
                .iter()
                .map(|(k, v)| (k.trim_start_matches(':').as_bytes().to_vec(), to_mysql(v)))
                .collect::<HashMap<Vec<u8>, Value>>(),
        ),
    }
}

fn to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Integer(v) => Value::Int(*v),
        SqlValue::Real(v) => Value::Double(*v),
        SqlValue::Text(v) => Value::Bytes(v.as_bytes().to_vec()),
        SqlValue::Blob(v) => Value::Bytes(v.clone()),
    }
}

fn from_mysql(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(v) => SqlValue::Integer(v),
        Value::UInt(v) => SqlValue::Integer(v as i64),
        Value::Float(v) => SqlValue::Real(v as f64),
        Value::Double(v) => SqlValue::Real(v),
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(e) => SqlValue::Blob(e.into_bytes()),
        },
        Value::Date(y, mo, d, h, mi, s, _) => {
            SqlValue::Text(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s))
        }
        Value::Time(neg, days, h, mi, s, _) => {
            let hours = days * 24 + h as u32;
            let sign = if neg { "-" } else { "" };
            SqlValue::Text(format!("{}{:02}:{:02}:{:02}", sign, hours, mi, s))
        }
    }
}
