use libsql::{Row, Value};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::constants::*;
use crate::gateway::{GatewayError, Record, column};
use crate::utils::{format_date, format_timestamp, parse_date, parse_timestamp};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub owner: String,
    pub category: Option<String>,
    pub payment_method: String,
    #[serde(with = "time::serde::rfc3339")]
    pub processed_at: OffsetDateTime,
    pub receiver: String,
    pub information: String,
    pub transfer_amount: f64,
}

impl Record for Transaction {
    const TABLE: &'static str = TRANSACTIONS_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "owner",
        "category",
        "payment_method",
        "processed_at",
        "receiver",
        "information",
        "transfer_amount",
    ];

    fn from_row(row: &Row) -> Result<Self, GatewayError> {
        let table = Self::TABLE;
        let processed_at = column::text(table, row, 4)?;

        Ok(Transaction {
            id: column::text(table, row, 0)?,
            owner: column::text(table, row, 1)?,
            category: column::optional_text(table, row, 2)?,
            payment_method: column::text(table, row, 3)?,
            processed_at: parse_timestamp(&processed_at)?,
            receiver: column::text(table, row, 5)?,
            information: column::text(table, row, 6)?,
            transfer_amount: column::real(table, row, 7)?,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Result<Vec<Value>, GatewayError> {
        Ok(vec![
            Value::Text(self.id.clone()),
            Value::Text(self.owner.clone()),
            column::optional(self.category.as_deref()),
            Value::Text(self.payment_method.clone()),
            Value::Text(format_timestamp(self.processed_at)?),
            Value::Text(self.receiver.clone()),
            Value::Text(self.information.clone()),
            Value::Real(self.transfer_amount),
        ])
    }
}

/// Template for a transaction that recurs every month on `execute_at`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub owner: String,
    pub category: Option<String>,
    pub payment_method: String,
    pub receiver: String,
    pub information: String,
    pub transfer_amount: f64,
    /// Day of the month, 1 to 31.
    pub execute_at: u8,
    pub paused: bool,
}

impl Subscription {
    /// Copies the template into a new transaction processed at `now`.
    pub fn materialize(&self, id: String, now: OffsetDateTime) -> Transaction {
        Transaction {
            id,
            owner: self.owner.clone(),
            category: self.category.clone(),
            payment_method: self.payment_method.clone(),
            processed_at: now,
            receiver: self.receiver.clone(),
            information: self.information.clone(),
            transfer_amount: self.transfer_amount,
        }
    }

    /// Whether this subscription still executes later in the current month.
    /// A subscription due today has already been materialized (or will be by
    /// today's run) and is not upcoming.
    pub fn is_upcoming(&self, today: u8) -> bool {
        !self.paused && self.execute_at > today
    }
}

impl Record for Subscription {
    const TABLE: &'static str = SUBSCRIPTIONS_TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "owner",
        "category",
        "payment_method",
        "receiver",
        "information",
        "transfer_amount",
        "execute_at",
        "paused",
    ];

    fn from_row(row: &Row) -> Result<Self, GatewayError> {
        let table = Self::TABLE;
        let execute_at = column::integer(table, row, 7)?;
        let execute_at = u8::try_from(execute_at)
            .ok()
            .filter(|day| (1..=31).contains(day))
            .ok_or_else(|| GatewayError::InvalidRow {
                table,
                message: format!("execute_at {} is not a day of the month", execute_at),
            })?;

        Ok(Subscription {
            id: column::text(table, row, 0)?,
            owner: column::text(table, row, 1)?,
            category: column::optional_text(table, row, 2)?,
            payment_method: column::text(table, row, 3)?,
            receiver: column::text(table, row, 4)?,
            information: column::text(table, row, 5)?,
            transfer_amount: column::real(table, row, 6)?,
            execute_at,
            paused: column::integer(table, row, 8)? != 0,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Result<Vec<Value>, GatewayError> {
        Ok(vec![
            Value::Text(self.id.clone()),
            Value::Text(self.owner.clone()),
            column::optional(self.category.as_deref()),
            Value::Text(self.payment_method.clone()),
            Value::Text(self.receiver.clone()),
            Value::Text(self.information.clone()),
            Value::Real(self.transfer_amount),
            Value::Integer(i64::from(self.execute_at)),
            Value::Integer(i64::from(self.paused)),
        ])
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub marked_for_deletion: Option<Date>,
}

impl Record for User {
    const TABLE: &'static str = USERS_TABLE;
    const COLUMNS: &'static [&'static str] =
        &["id", "username", "password_hash", "marked_for_deletion"];

    fn from_row(row: &Row) -> Result<Self, GatewayError> {
        let table = Self::TABLE;
        let marked_for_deletion = column::optional_text(table, row, 3)?
            .map(|date| parse_date(&date))
            .transpose()?;

        Ok(User {
            id: column::text(table, row, 0)?,
            username: column::text(table, row, 1)?,
            password_hash: column::text(table, row, 2)?,
            marked_for_deletion,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Result<Vec<Value>, GatewayError> {
        let marked_for_deletion = match self.marked_for_deletion {
            Some(date) => Value::Text(format_date(date)?),
            None => Value::Null,
        };

        Ok(vec![
            Value::Text(self.id.clone()),
            Value::Text(self.username.clone()),
            Value::Text(self.password_hash.clone()),
            marked_for_deletion,
        ])
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub owner: String,
    pub name: String,
}

impl Record for Category {
    const TABLE: &'static str = CATEGORIES_TABLE;
    const COLUMNS: &'static [&'static str] = &["id", "owner", "name"];

    fn from_row(row: &Row) -> Result<Self, GatewayError> {
        let table = Self::TABLE;
        Ok(Category {
            id: column::text(table, row, 0)?,
            owner: column::text(table, row, 1)?,
            name: column::text(table, row, 2)?,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn values(&self) -> Result<Vec<Value>, GatewayError> {
        Ok(vec![
            Value::Text(self.id.clone()),
            Value::Text(self.owner.clone()),
            Value::Text(self.name.clone()),
        ])
    }
}

#[derive(Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeletionScheduleResponse {
    pub marked_for_deletion: Option<String>,
}

/// Query string shared by the report endpoints. Both bounds are handed to
/// the datastore filter as given; missing bounds become empty strings.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

/// Report body echoing the requested window next to the report fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse<T> {
    pub start_date: String,
    pub end_date: String,
    #[serde(flatten)]
    pub report: T,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Split {
    pub received: f64,
    pub upcoming: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Balance {
    pub current: f64,
    pub estimated: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct OverviewStats {
    pub income: Split,
    pub expenses: Split,
    pub balance: Balance,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummary {
    pub expenses: f64,
    pub upcoming_expenses: f64,
    pub free_amount: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CategoryRef {
    pub id: String,
    /// `None` when the id does not resolve to a stored category.
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CategoryStat {
    /// `None` for transactions without a category.
    pub category: Option<CategoryRef>,
    pub income: f64,
    pub expenses: f64,
    pub balance: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct CategoryBreakdown {
    pub categories: Vec<CategoryStat>,
}
