//! Integration tests against a real PostgreSQL.
//!
//! Set `TEST_INT_POSTGRES_DSN` to a connection URL such as
//! `postgres://test@localhost:5432/test`; every test runs in a fresh schema
//! that is dropped afterwards. Without the variable the tests are skipped.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use phone_contacts::model::{Contact, UserId};
use phone_contacts::schema::{Statements, Tables};
use phone_contacts::store::{postgres, PgStore};
use phone_contacts::{ContactService, ContactsPort, Error};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

const DSN_VAR: &str = "TEST_INT_POSTGRES_DSN";

struct TestDb {
    admin: PgPool,
    pool: PgPool,
    schema: String,
}

impl TestDb {
    async fn start() -> Option<Self> {
        let Ok(dsn) = std::env::var(DSN_VAR) else {
            eprintln!("{DSN_VAR} not set, skipping");
            return None;
        };
        let options = PgConnectOptions::from_str(&dsn).expect("valid dsn");
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await
            .expect("connect");

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let schema = format!("test_{nanos}");
        sqlx::query(&format!("CREATE SCHEMA {schema}"))
            .execute(&admin)
            .await
            .expect("create schema");

        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(options.options([("search_path", schema.as_str())]))
            .await
            .expect("connect to schema");
        postgres::migrate(&pool).await.expect("migrate");

        sqlx::query(
            "INSERT INTO users (user_id, name, phone_number) VALUES \
             (1, 'Alice', '+1000'), (2, 'Bob', '+1001'), (3, 'Carol', '+1002'), (4, 'Dave', '+1003')",
        )
        .execute(&pool)
        .await
        .expect("seed users");

        Some(Self {
            admin,
            pool,
            schema,
        })
    }

    fn service(&self) -> ContactService<PgStore> {
        let statements = Statements::new(&Tables::default()).expect("statements");
        ContactService::new(PgStore::new(self.pool.clone(), statements))
    }

    async fn relation_rows(&self) -> Vec<(i32, i32)> {
        sqlx::query_as("SELECT user_id, relation_user_id FROM relations ORDER BY relation_id")
            .fetch_all(&self.pool)
            .await
            .expect("relations")
    }

    async fn stop(self) {
        self.pool.close().await;
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&self.admin)
            .await
            .expect("drop schema");
        self.admin.close().await;
    }
}

fn uid(raw: i32) -> UserId {
    UserId::new(raw).expect("user id")
}

fn contacts(numbers: &[&str]) -> Vec<Contact> {
    numbers.iter().map(|n| Contact::new("_", *n)).collect()
}

#[tokio::test]
async fn save_then_list_friends_and_names() {
    let Some(db) = TestDb::start().await else {
        return;
    };
    let service = db.service();

    let report = service
        .save_contacts(uid(1), contacts(&["+1001", "+1002", "+9999"]))
        .await
        .expect("save");
    assert_eq!(report.matched, 2);
    assert_eq!(db.relation_rows().await, vec![(1, 2), (1, 3)]);

    let friends = service.list_friends(uid(1)).await.expect("friends");
    let summary: Vec<_> = friends
        .iter()
        .map(|f| (f.user_id.get(), f.relation_user_id.get(), f.phone_number.as_str()))
        .collect();
    assert_eq!(summary, vec![(1, 2, "+1001"), (1, 3, "+1002")]);

    assert_eq!(service.get_name(uid(2)).await.expect("name"), "Bob");
    assert!(matches!(
        service.get_name(uid(99)).await,
        Err(Error::NotFound { .. })
    ));

    db.stop().await;
}

#[tokio::test]
async fn resubmission_appends_duplicates() {
    let Some(db) = TestDb::start().await else {
        return;
    };
    let service = db.service();

    for _ in 0..2 {
        service
            .save_contacts(uid(1), contacts(&["+1001"]))
            .await
            .expect("save");
    }
    assert_eq!(db.relation_rows().await, vec![(1, 2), (1, 2)]);

    db.stop().await;
}

#[tokio::test]
async fn failure_on_second_write_rolls_back_the_first() {
    let Some(db) = TestDb::start().await else {
        return;
    };
    sqlx::query(
        "CREATE FUNCTION reject_carol() RETURNS trigger AS $$ \
         BEGIN \
           IF NEW.relation_user_id = 3 THEN RAISE EXCEPTION 'injected failure'; END IF; \
           RETURN NEW; \
         END $$ LANGUAGE plpgsql",
    )
    .execute(&db.pool)
    .await
    .expect("trigger function");
    sqlx::query(
        "CREATE TRIGGER reject_carol BEFORE INSERT ON relations \
         FOR EACH ROW EXECUTE FUNCTION reject_carol()",
    )
    .execute(&db.pool)
    .await
    .expect("trigger");
    let service = db.service();

    let err = service
        .save_contacts(uid(1), contacts(&["+1001", "+1002", "+1003"]))
        .await
        .expect_err("injected failure");

    assert!(matches!(err, Error::Internal { .. }), "{err:?}");
    assert!(db.relation_rows().await.is_empty());

    db.stop().await;
}

#[tokio::test]
async fn unknown_owner_is_a_constraint_violation() {
    let Some(db) = TestDb::start().await else {
        return;
    };
    let service = db.service();

    let err = service
        .save_contacts(uid(42), contacts(&["+1001"]))
        .await
        .expect_err("foreign key");

    assert!(matches!(err, Error::ConstraintViolation { .. }), "{err:?}");
    assert!(db.relation_rows().await.is_empty());

    db.stop().await;
}

#[tokio::test]
async fn duplicate_phone_number_is_ambiguous() {
    let Some(db) = TestDb::start().await else {
        return;
    };
    sqlx::query("INSERT INTO users (user_id, name, phone_number) VALUES (5, 'Bobby', '+1001')")
        .execute(&db.pool)
        .await
        .expect("duplicate phone");
    let service = db.service();

    let err = service
        .save_contacts(uid(1), contacts(&["+1002", "+1001"]))
        .await
        .expect_err("ambiguous");

    assert!(matches!(err, Error::AmbiguousMatch { .. }), "{err:?}");
    assert!(db.relation_rows().await.is_empty());

    db.stop().await;
}
