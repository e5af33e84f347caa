//! # Expense Repository
//!
//! Operational costs (rent, utilities, ...) recorded by admins and netted
//! against gross profit in the sales report.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use apothecary_core::validation::{validate_actor_id, validate_new_expense};
use apothecary_core::{Expense, NewExpense};

/// Repository for expense database operations.
#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    pool: SqlitePool,
}

impl ExpenseRepository {
    /// Creates a new ExpenseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ExpenseRepository { pool }
    }

    /// Records an expense on behalf of `actor_id`.
    pub async fn create(&self, actor_id: &str, input: &NewExpense) -> DbResult<Expense> {
        validate_actor_id(actor_id)?;
        validate_new_expense(input)?;

        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4().to_string(),
            description: input.description.trim().to_string(),
            amount_minor: input.amount_minor,
            category: input.category.trim().to_string(),
            expense_date: input.expense_date.unwrap_or(now),
            created_by: actor_id.trim().to_string(),
            created_at: now,
        };

        debug!(amount = %expense.amount(), category = %expense.category, "Recording expense");

        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, description, amount_minor, category,
                expense_date, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&expense.id)
        .bind(&expense.description)
        .bind(expense.amount_minor)
        .bind(&expense.category)
        .bind(expense.expense_date)
        .bind(&expense.created_by)
        .bind(expense.created_at)
        .execute(&self.pool)
        .await?;

        Ok(expense)
    }

    /// Lists expenses in `[since, until)`, newest first.
    pub async fn list(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<Expense>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, description, amount_minor, category, expense_date, created_by, created_at \
             FROM expenses WHERE 1 = 1",
        );
        if let Some(since) = since {
            builder.push(" AND expense_date >= ").push_bind(since);
        }
        if let Some(until) = until {
            builder.push(" AND expense_date < ").push_bind(until);
        }
        builder.push(" ORDER BY expense_date DESC, rowid DESC");

        let expenses = builder.build_query_as::<Expense>().fetch_all(&self.pool).await?;
        Ok(expenses)
    }

    /// Sum of expense amounts in `[since, until)`, in minor units.
    pub async fn total(
        &self,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> DbResult<i64> {
        let expenses = self.list(since, until).await?;
        Ok(expenses.iter().map(|e| e.amount_minor).sum())
    }
}
