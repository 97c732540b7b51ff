//! PostgreSQL adapter built on an `sqlx` pool.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres, Row, Transaction};
use tracing::{debug, info, instrument};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::model::{Friend, PhoneNumber, Relation, User, UserId};
use crate::ports::{RelationStore, Store, UnitOfWork, UserDirectory};
use crate::schema::Statements;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Build a lazily connecting pool from configuration.
pub fn connect_pool(config: &DatabaseConfig) -> PgPool {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
        .options([("search_path", config.search_path())]);

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_lazy_with(options)
}

/// Apply embedded migrations. Must run before the store serves traffic.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    MIGRATOR.run(pool).await?;
    info!("database schema is up to date");
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    statements: Arc<Statements>,
}

impl PgStore {
    pub fn new(pool: PgPool, statements: Statements) -> Self {
        Self {
            pool,
            statements: Arc::new(statements),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    type Unit = PgUnit;
    type Session = PgSession;

    async fn begin(&self) -> Result<PgUnit> {
        let tx = self.pool.begin().await?;
        Ok(PgUnit {
            tx,
            statements: Arc::clone(&self.statements),
        })
    }

    async fn session(&self) -> Result<PgSession> {
        let conn = self.pool.acquire().await?;
        Ok(PgSession {
            conn,
            statements: Arc::clone(&self.statements),
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query(self.statements.ping)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Transaction-scoped handle. Dropping it without committing rolls back.
pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
    statements: Arc<Statements>,
}

/// Pooled connection for read paths.
pub struct PgSession {
    conn: PoolConnection<Postgres>,
    statements: Arc<Statements>,
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// Both handles deref to a `PgConnection`; the port impls only differ in
// which field they borrow it from.
macro_rules! impl_pg_ports {
    ($ty:ty, $conn:ident) => {
        #[async_trait]
        impl UserDirectory for $ty {
            async fn find_by_phone(&mut self, phone_number: &PhoneNumber) -> Result<Option<User>> {
                find_by_phone(&mut self.$conn, &self.statements, phone_number).await
            }

            async fn get_name(&mut self, user_id: UserId) -> Result<Option<String>> {
                get_name(&mut self.$conn, &self.statements, user_id).await
            }
        }

        #[async_trait]
        impl RelationStore for $ty {
            async fn save(&mut self, relation: &Relation) -> Result<()> {
                save_relation(&mut self.$conn, &self.statements, relation).await
            }

            async fn find_friends_of(&mut self, owner: UserId) -> Result<Vec<Friend>> {
                find_friends_of(&mut self.$conn, &self.statements, owner).await
            }
        }
    };
}

impl_pg_ports!(PgUnit, tx);
impl_pg_ports!(PgSession, conn);

#[instrument(skip_all, level = "debug")]
async fn find_by_phone(
    conn: &mut PgConnection,
    statements: &Statements,
    phone_number: &PhoneNumber,
) -> Result<Option<User>> {
    let rows = sqlx::query(&statements.find_user_by_phone)
        .bind(phone_number.as_str())
        .fetch_all(&mut *conn)
        .await?;

    match rows.as_slice() {
        [] => Ok(None),
        [row] => Ok(Some(User {
            user_id: user_id_column(row, "user_id")?,
            name: row.try_get("name")?,
            phone_number: row.try_get("phone_number")?,
        })),
        _ => Err(Error::ambiguous_match(phone_number.as_str())),
    }
}

#[instrument(skip(conn, statements), level = "debug")]
async fn get_name(
    conn: &mut PgConnection,
    statements: &Statements,
    user_id: UserId,
) -> Result<Option<String>> {
    let name = sqlx::query_scalar::<_, String>(&statements.user_name)
        .bind(user_id.get())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(name)
}

#[instrument(skip(conn, statements), level = "debug")]
async fn save_relation(
    conn: &mut PgConnection,
    statements: &Statements,
    relation: &Relation,
) -> Result<()> {
    let result = sqlx::query(&statements.insert_relation)
        .bind(relation.user_id.get())
        .bind(relation.relation_user_id.get())
        .execute(&mut *conn)
        .await?;
    debug!(rows = result.rows_affected(), "relation inserted");
    Ok(())
}

#[instrument(skip(conn, statements), level = "debug")]
async fn find_friends_of(
    conn: &mut PgConnection,
    statements: &Statements,
    owner: UserId,
) -> Result<Vec<Friend>> {
    let rows = sqlx::query(&statements.friends_of)
        .bind(owner.get())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(Friend {
                user_id: user_id_column(row, "user_id")?,
                relation_user_id: user_id_column(row, "relation_user_id")?,
                phone_number: row.try_get("phone_number")?,
            })
        })
        .collect()
}

fn user_id_column(row: &sqlx::postgres::PgRow, column: &str) -> Result<UserId> {
    let raw: i32 = row.try_get(column)?;
    UserId::new(raw).map_err(|_| Error::internal(format!("non-positive {column} {raw} in store")))
}
