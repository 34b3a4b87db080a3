// tests/common/pg.rs

//! Throwaway Postgres databases for store tests: one container per test
//! binary and a freshly migrated database per test. `TEST_DATABASE_URL`
//! points them at an existing server instead of starting a container.

use once_cell::sync::Lazy;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection, PgPool};
use std::str::FromStr;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres as PostgresImage;
use tokio::sync::OnceCell;
use uuid::Uuid;

struct Server {
  _container: Option<ContainerAsync<PostgresImage>>,
  admin: PgConnectOptions,
}

static SERVER: Lazy<OnceCell<Option<Server>>> = Lazy::new(OnceCell::new);

fn docker_available() -> bool {
  std::env::var_os("DOCKER_HOST").is_some() || std::path::Path::new("/var/run/docker.sock").exists()
}

async fn start_server() -> Option<Server> {
  if let Ok(url) = std::env::var("TEST_DATABASE_URL") {
    let admin = PgConnectOptions::from_str(&url).expect("TEST_DATABASE_URL is a postgres URL");
    return Some(Server {
      _container: None,
      admin,
    });
  }
  if !docker_available() {
    return None;
  }

  let container = PostgresImage::default()
    .with_user("kloven_test")
    .with_password("kloven_test_password")
    .with_db_name("kloven_test")
    .with_env_var("POSTGRES_INITDB_ARGS", "--auth-host=trust")
    .start()
    .await
    .expect("Failed to start PostgreSQL container");
  let port = container
    .get_host_port_ipv4(5432)
    .await
    .expect("Failed to get container port");
  let host = std::env::var("TESTCONTAINERS_HOST_OVERRIDE").unwrap_or_else(|_| "localhost".to_string());

  let admin = PgConnectOptions::new()
    .host(&host)
    .port(port)
    .username("kloven_test")
    .password("kloven_test_password")
    .database("postgres");
  Some(Server {
    _container: Some(container),
    admin,
  })
}

pub struct TestDb {
  pub pool: PgPool,
  name: String,
  admin: PgConnectOptions,
}

impl TestDb {
  /// `None` when there is neither a Docker daemon nor `TEST_DATABASE_URL`.
  pub async fn new() -> Option<Self> {
    let server = SERVER.get_or_init(start_server).await.as_ref()?;
    let name = format!("kloven_test_{}", Uuid::new_v4().simple());

    let mut conn = PgConnection::connect_with(&server.admin)
      .await
      .expect("Failed to connect to postgres database");
    sqlx::query(&format!("CREATE DATABASE \"{}\"", name))
      .execute(&mut conn)
      .await
      .expect("Failed to create test database");
    conn.close().await.expect("Failed to close admin connection");

    let pool = PgPool::connect_with(server.admin.clone().database(&name))
      .await
      .expect("Failed to create pool for database");
    sqlx::migrate!("./migrations")
      .run(&pool)
      .await
      .expect("Failed to run migrations on database");

    Some(Self {
      pool,
      name,
      admin: server.admin.clone(),
    })
  }

  pub async fn cleanup(self) {
    self.pool.close().await;
    if let Ok(mut conn) = PgConnection::connect_with(&self.admin).await {
      let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.name))
        .execute(&mut conn)
        .await;
      let _ = conn.close().await;
    }
  }
}
