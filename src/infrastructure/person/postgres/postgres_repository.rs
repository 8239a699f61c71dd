use std::{future::Future, time::Duration};

use chrono::NaiveDate;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    Error, PgPool, Postgres, Row, Transaction,
};
use tokio::time;
use uuid::Uuid;

use crate::domain::person::{Person, PersonRepository, PersonRepositoryError, PersonSession};

const PERSON_COLUMNS: &str = "person_id, name, first_name, birth_date";

impl From<Error> for PersonRepositoryError {
    fn from(value: Error) -> Self {
        match value {
            Error::Database(database_error) => {
                if database_error.is_unique_violation() {
                    return Self::PersonAlreadyExists;
                }
                return Self::InternalError(database_error.to_string());
            }
            Error::RowNotFound => {
                return Self::PersonNotFound;
            }
            _ => return Self::InternalError(value.to_string()),
        }
    }
}

impl TryFrom<PgRow> for Person {
    type Error = PersonRepositoryError;

    fn try_from(value: PgRow) -> Result<Self, Self::Error> {
        let uid: Uuid = value.try_get("person_id")?;
        let name: Option<String> = value.try_get("name")?;
        let first_name: Option<String> = value.try_get("first_name")?;
        let birth_date: Option<NaiveDate> = value.try_get("birth_date")?;
        return Ok(Person::new(
            Some(uid),
            name.as_deref(),
            first_name.as_deref(),
            birth_date,
        ));
    }
}

/// Bounds a database call by `timeout` milliseconds.
async fn with_timeout<T, F>(timeout: u64, query: F) -> Result<T, PersonRepositoryError>
where
    F: Future<Output = Result<T, Error>>,
{
    Ok(time::timeout(Duration::from_millis(timeout), query)
        .await
        .map_err(|e| PersonRepositoryError::InternalError(e.to_string()))??)
}

async fn init_table_async(pool: &PgPool, timeout: u64) -> Result<(), PersonRepositoryError> {
    with_timeout(
        timeout,
        sqlx::query(r#"CREATE EXTENSION IF NOT EXISTS "uuid-ossp""#).execute(pool),
    )
    .await?;
    let create_table_query = r#"CREATE TABLE IF NOT EXISTS person (
        person_id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
        seq BIGSERIAL NOT NULL,
        name TEXT,
        first_name TEXT,
        birth_date DATE
    )"#;
    with_timeout(timeout, sqlx::query(create_table_query).execute(pool)).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PostgresPersonRepository {
    pool: PgPool,
    timeout: u64,
}

impl PostgresPersonRepository {
    pub async fn new(
        url: &str,
        timeout: u64,
        max_connections: u32,
    ) -> Result<Self, PersonRepositoryError> {
        let pool = with_timeout(
            timeout,
            PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_millis(timeout))
                .connect(url),
        )
        .await?;
        init_table_async(&pool, timeout).await?;
        Ok(Self { pool, timeout })
    }
}

#[async_trait::async_trait]
impl PersonRepository for PostgresPersonRepository {
    async fn begin(&self) -> Result<Box<dyn PersonSession>, PersonRepositoryError> {
        let tx = with_timeout(self.timeout, self.pool.begin()).await?;
        Ok(Box::new(PostgresPersonSession {
            tx,
            timeout: self.timeout,
        }))
    }
}

/// A database transaction. Dropping it without [`PersonSession::commit`] rolls back
/// and hands the connection back to the pool.
pub struct PostgresPersonSession {
    tx: Transaction<'static, Postgres>,
    timeout: u64,
}

#[async_trait::async_trait]
impl PersonSession for PostgresPersonSession {
    async fn find_all(&mut self) -> Result<Vec<Person>, PersonRepositoryError> {
        let query = format!("SELECT {PERSON_COLUMNS} FROM person ORDER BY seq;");
        let rows = with_timeout(
            self.timeout,
            sqlx::query(&query).fetch_all(&mut *self.tx),
        )
        .await?;
        rows.into_iter().map(Person::try_from).collect()
    }

    async fn find_by_id(&mut self, uid: &Uuid) -> Result<Option<Person>, PersonRepositoryError> {
        let query = format!("SELECT {PERSON_COLUMNS} FROM person WHERE person_id = $1;");
        let row = with_timeout(
            self.timeout,
            sqlx::query(&query).bind(uid).fetch_optional(&mut *self.tx),
        )
        .await?;
        row.map(Person::try_from).transpose()
    }

    async fn insert(&mut self, person: Person) -> Result<Person, PersonRepositoryError> {
        let query = format!(
            "INSERT INTO person (person_id, name, first_name, birth_date) \
             VALUES (COALESCE($1, uuid_generate_v4()), $2, $3, $4) \
             RETURNING {PERSON_COLUMNS};"
        );
        let row = with_timeout(
            self.timeout,
            sqlx::query(&query)
                .bind(person.uid())
                .bind(person.name())
                .bind(person.first_name())
                .bind(person.birth_date())
                .fetch_one(&mut *self.tx),
        )
        .await?;
        row.try_into()
    }

    async fn replace(
        &mut self,
        uid: &Uuid,
        person: Person,
    ) -> Result<Person, PersonRepositoryError> {
        let query = format!(
            "UPDATE person SET name = $2, first_name = $3, birth_date = $4 \
             WHERE person_id = $1 RETURNING {PERSON_COLUMNS};"
        );
        let row = with_timeout(
            self.timeout,
            sqlx::query(&query)
                .bind(uid)
                .bind(person.name())
                .bind(person.first_name())
                .bind(person.birth_date())
                .fetch_optional(&mut *self.tx),
        )
        .await?;
        row.ok_or(PersonRepositoryError::PersonNotFound)?.try_into()
    }

    async fn remove(&mut self, uid: &Uuid) -> Result<bool, PersonRepositoryError> {
        let result = with_timeout(
            self.timeout,
            sqlx::query("DELETE FROM person WHERE person_id = $1;")
                .bind(uid)
                .execute(&mut *self.tx),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), PersonRepositoryError> {
        let PostgresPersonSession { tx, timeout } = *self;
        with_timeout(timeout, tx.commit()).await
    }
}
