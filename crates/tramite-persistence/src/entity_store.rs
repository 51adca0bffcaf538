use crate::schema;
use crate::schema::programs::dsl as programs_dsl;
use crate::schema::questions::dsl as questions_dsl;
use crate::schema::version_programs::dsl as vp_dsl;
use crate::schema::version_questions::dsl as vq_dsl;
use crate::schema::versions::dsl as versions_dsl;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::Arc;
use tramite_domain::{BlockDefinition, DomainError, LifecycleStage, Program, ProgramDefinition, Question,
                     QuestionDefinition, Version};
use uuid::Uuid;
use versioning::{EntityStore, IsolationLevel, Result, RowLock, VersioningError};
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
#[cfg(all(feature = "pg", not(test)))]
type DbPool = Pool<ConnectionManager<PgConnection>>;
#[cfg(any(test, not(feature = "pg")))]
type DbPool = Pool<ConnectionManager<SqliteConnection>>;
#[cfg(all(feature = "pg", not(test)))]
type DbConn = PgConnection;
#[cfg(any(test, not(feature = "pg")))]
type DbConn = SqliteConnection;
/// Almacén Diesel que implementa `EntityStore`.
pub struct DieselEntityStore {
  pool: Arc<DbPool>,
}
impl DieselEntityStore {
  pub fn new(database_url: &str) -> Self {
    #[cfg(any(test, not(feature = "pg")))]
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    #[cfg(all(feature = "pg", not(test)))]
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder().max_size(4).build(manager).expect("no se pudo crear el pool de conexiones");
    let store = DieselEntityStore { pool: Arc::new(pool) };
    if let Ok(mut c) = store.conn_raw() {
      let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
      let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
      let _ = c.run_pending_migrations(MIGRATIONS);
    }
    store
  }
  fn conn_raw(&self) -> std::result::Result<PooledConnection<ConnectionManager<DbConn>>, r2d2::Error> {
    // Note: when built with pg feature this will be adjusted by cfg above
    self.pool.get()
  }
  fn conn(&self) -> Result<PooledConnection<ConnectionManager<DbConn>>> {
    self.conn_raw().map_err(|e| VersioningError::Storage(format!("pool: {}", e)))
  }
}
// Diesel row structs for the versioning tables
#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::versions)]
struct VersionRow {
  pub id: String,
  pub lifecycle_stage: String,
  pub created_at_ts: i64,
}
#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::questions)]
#[diesel(treat_none_as_null = true)]
struct QuestionRow {
  pub id: String,
  pub name: String,
  pub description: String,
  pub question_text: String,
  pub question_type: String,
  pub enumerator_id: Option<String>,
  pub path_segment: String,
}
#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::programs)]
struct ProgramRow {
  pub id: String,
  pub admin_name: String,
  pub admin_description: String,
  pub block_definitions: String,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::version_questions)]
struct VersionQuestionRow {
  pub id: String,
  pub version_id: String,
  pub question_id: String,
  pub seq: i64,
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::version_programs)]
struct VersionProgramRow {
  pub id: String,
  pub version_id: String,
  pub program_id: String,
  pub seq: i64,
}
// Error interno de transacción: distingue los errores propios del motor
// de los de Diesel para poder usar `Connection::transaction`, que exige
// `From<diesel::result::Error>`.
enum TxError {
  App(VersioningError),
  Db(DieselError),
}
impl From<DieselError> for TxError {
  fn from(e: DieselError) -> Self {
    TxError::Db(e)
  }
}
fn unwrap_tx_err(e: TxError) -> VersioningError {
  match e {
    TxError::App(v) => v,
    TxError::Db(d) => map_db_err(d),
  }
}
/// Las violaciones de unicidad y los fallos de serialización son
/// contención transitoria (`Conflict`); el resto, error de almacenamiento.
fn map_db_err(e: DieselError) -> VersioningError {
  match e {
    DieselError::NotFound => VersioningError::NotFound("fila no encontrada".to_string()),
    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
      VersioningError::Conflict(format!("db: {}", info.message()))
    }
    DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, info) => {
      VersioningError::Conflict(format!("db: {}", info.message()))
    }
    other => VersioningError::Storage(format!("db: {}", other)),
  }
}
fn parse_uuid(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| VersioningError::Storage(format!("uuid inválido '{}': {}", s, e)))
}
fn version_to_row(version: &Version) -> VersionRow {
  VersionRow { id: version.id().to_string(),
               lifecycle_stage: version.stage().as_str().to_string(),
               created_at_ts: version.created_at().timestamp_millis() }
}
fn version_from_row(row: VersionRow) -> Result<Version> {
  let stage = row.lifecycle_stage.parse::<LifecycleStage>()?;
  let created_at = chrono::DateTime::from_timestamp_millis(row.created_at_ts)
    .ok_or_else(|| VersioningError::Storage(format!("timestamp inválido: {}", row.created_at_ts)))?;
  Ok(Version::from_parts(parse_uuid(&row.id)?, stage, created_at))
}
fn question_to_row(question: &Question) -> QuestionRow {
  let def = question.definition();
  QuestionRow { id: question.id().to_string(),
                name: def.name().to_string(),
                description: def.description().to_string(),
                question_text: def.question_text().to_string(),
                question_type: def.question_type().as_str().to_string(),
                enumerator_id: def.enumerator_id().map(|id| id.to_string()),
                path_segment: def.path_segment().to_string() }
}
fn question_from_row(row: QuestionRow) -> Result<Question> {
  let enumerator_id = row.enumerator_id.as_deref().map(parse_uuid).transpose()?;
  let def = QuestionDefinition::new(row.name,
                                    row.description,
                                    row.question_text,
                                    row.question_type.parse()?,
                                    enumerator_id,
                                    row.path_segment)?;
  Ok(Question::from_parts(parse_uuid(&row.id)?, def))
}
fn program_to_row(program: &Program) -> Result<ProgramRow> {
  let def = program.definition();
  let blocks = serde_json::to_string(def.block_definitions()).map_err(DomainError::from)?;
  Ok(ProgramRow { id: program.id().to_string(),
                  admin_name: def.admin_name().to_string(),
                  admin_description: def.admin_description().to_string(),
                  block_definitions: blocks })
}
fn program_from_row(row: ProgramRow) -> Result<Program> {
  let blocks: Vec<BlockDefinition> = serde_json::from_str(&row.block_definitions).map_err(DomainError::from)?;
  let def = ProgramDefinition::new(row.admin_name, row.admin_description, blocks)?;
  Ok(Program::from_parts(parse_uuid(&row.id)?, def))
}
#[cfg(all(feature = "pg", not(test)))]
fn set_isolation(conn: &mut DbConn, isolation: IsolationLevel) -> std::result::Result<(), TxError> {
  if isolation == IsolationLevel::Serializable {
    diesel::sql_query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE").execute(conn)?;
  }
  Ok(())
}
#[cfg(any(test, not(feature = "pg")))]
fn set_isolation(_conn: &mut DbConn, _isolation: IsolationLevel) -> std::result::Result<(), TxError> {
  // SQLite ejecuta serializable por construcción; no hay nivel que ajustar.
  Ok(())
}
#[cfg(all(feature = "pg", not(test)))]
fn load_versions_by_stage_for_update(tx: &mut DbConn, stage: &str) -> std::result::Result<Vec<VersionRow>, DieselError> {
  versions_dsl::versions.filter(versions_dsl::lifecycle_stage.eq(stage)).for_update().load::<VersionRow>(tx)
}
#[cfg(any(test, not(feature = "pg")))]
fn load_versions_by_stage_for_update(tx: &mut DbConn, stage: &str) -> std::result::Result<Vec<VersionRow>, DieselError> {
  // SQLite bloquea la base entera al escribir; FOR UPDATE no existe en
  // este backend y la lectura ordinaria basta.
  versions_dsl::versions.filter(versions_dsl::lifecycle_stage.eq(stage)).load::<VersionRow>(tx)
}
impl EntityStore for DieselEntityStore {
  type Tx = DbConn;
  fn transaction<T, F>(&self, isolation: IsolationLevel, body: F) -> Result<T>
    where F: FnOnce(&mut Self::Tx) -> Result<T>
  {
    let mut conn = self.conn()?;
    conn.transaction::<T, TxError, _>(|c| {
          set_isolation(c, isolation)?;
          body(c).map_err(TxError::App)
        })
        .map_err(unwrap_tx_err)
  }
  fn savepoint<T, F>(&self, tx: &mut Self::Tx, body: F) -> Result<T>
    where F: FnOnce(&mut Self::Tx) -> Result<T>
  {
    // Una transacción anidada en Diesel abre un SAVEPOINT y revierte
    // hasta él en caso de error.
    tx.transaction::<T, TxError, _>(|c| body(c).map_err(TxError::App)).map_err(unwrap_tx_err)
  }
  fn insert_version(&self, tx: &mut Self::Tx, version: &Version) -> Result<()> {
    let row = version_to_row(version);
    diesel::insert_into(versions_dsl::versions).values(&row).execute(tx).map_err(map_db_err)?;
    Ok(())
  }
  fn update_version(&self, tx: &mut Self::Tx, version: &Version) -> Result<()> {
    let row = version_to_row(version);
    let updated = diesel::update(versions_dsl::versions.filter(versions_dsl::id.eq(&row.id))).set(&row)
                                                                                             .execute(tx)
                                                                                             .map_err(map_db_err)?;
    if updated == 0 {
      return Err(VersioningError::NotFound(format!("versión {}", row.id)));
    }
    Ok(())
  }
  fn find_version(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<Version>> {
    let opt = versions_dsl::versions.filter(versions_dsl::id.eq(id.to_string()))
                                    .first::<VersionRow>(tx)
                                    .optional()
                                    .map_err(map_db_err)?;
    opt.map(version_from_row).transpose()
  }
  fn versions_by_stage(&self, tx: &mut Self::Tx, stage: LifecycleStage, lock: RowLock) -> Result<Vec<Version>> {
    let rows = match lock {
      RowLock::ForUpdate => load_versions_by_stage_for_update(tx, stage.as_str()).map_err(map_db_err)?,
      RowLock::None => versions_dsl::versions.filter(versions_dsl::lifecycle_stage.eq(stage.as_str()))
                                             .load::<VersionRow>(tx)
                                             .map_err(map_db_err)?,
    };
    rows.into_iter().map(version_from_row).collect()
  }
  fn list_versions(&self, tx: &mut Self::Tx) -> Result<Vec<Version>> {
    let rows = versions_dsl::versions.load::<VersionRow>(tx).map_err(map_db_err)?;
    rows.into_iter().map(version_from_row).collect()
  }
  fn insert_question(&self, tx: &mut Self::Tx, question: &Question) -> Result<()> {
    let row = question_to_row(question);
    diesel::insert_into(questions_dsl::questions).values(&row).execute(tx).map_err(map_db_err)?;
    Ok(())
  }
  fn update_question(&self, tx: &mut Self::Tx, question: &Question) -> Result<()> {
    let row = question_to_row(question);
    let updated = diesel::update(questions_dsl::questions.filter(questions_dsl::id.eq(&row.id))).set(&row)
                                                                                                .execute(tx)
                                                                                                .map_err(map_db_err)?;
    if updated == 0 {
      return Err(VersioningError::NotFound(format!("pregunta {}", row.id)));
    }
    Ok(())
  }
  fn find_question(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<Question>> {
    let opt = questions_dsl::questions.filter(questions_dsl::id.eq(id.to_string()))
                                      .first::<QuestionRow>(tx)
                                      .optional()
                                      .map_err(map_db_err)?;
    opt.map(question_from_row).transpose()
  }
  fn list_questions(&self, tx: &mut Self::Tx) -> Result<Vec<Question>> {
    let rows = questions_dsl::questions.load::<QuestionRow>(tx).map_err(map_db_err)?;
    rows.into_iter().map(question_from_row).collect()
  }
  fn questions_for_version(&self, tx: &mut Self::Tx, version_id: Uuid) -> Result<Vec<Question>> {
    let members = vq_dsl::version_questions.filter(vq_dsl::version_id.eq(version_id.to_string()))
                                           .order(vq_dsl::seq.asc())
                                           .load::<VersionQuestionRow>(tx)
                                           .map_err(map_db_err)?;
    let mut out = Vec::with_capacity(members.len());
    for member in members {
      if let Some(row) = questions_dsl::questions.filter(questions_dsl::id.eq(&member.question_id))
                                                 .first::<QuestionRow>(tx)
                                                 .optional()
                                                 .map_err(map_db_err)?
      {
        out.push(question_from_row(row)?);
      }
    }
    Ok(out)
  }
  fn add_version_question(&self, tx: &mut Self::Tx, version_id: Uuid, question_id: Uuid) -> Result<()> {
    let v_id = version_id.to_string();
    let q_id = question_id.to_string();
    let existing = vq_dsl::version_questions.filter(vq_dsl::version_id.eq(&v_id))
                                            .filter(vq_dsl::question_id.eq(&q_id))
                                            .select(vq_dsl::id)
                                            .first::<String>(tx)
                                            .optional()
                                            .map_err(map_db_err)?;
    if existing.is_some() {
      return Ok(());
    }
    let next_seq = vq_dsl::version_questions.filter(vq_dsl::version_id.eq(&v_id))
                                            .select(max(vq_dsl::seq))
                                            .first::<Option<i64>>(tx)
                                            .map_err(map_db_err)?
                                            .unwrap_or(0)
                   + 1;
    let row = VersionQuestionRow { id: Uuid::new_v4().to_string(), version_id: v_id, question_id: q_id, seq: next_seq };
    diesel::insert_into(vq_dsl::version_questions).values(&row).execute(tx).map_err(map_db_err)?;
    Ok(())
  }
  fn remove_version_question(&self, tx: &mut Self::Tx, version_id: Uuid, question_id: Uuid) -> Result<()> {
    diesel::delete(vq_dsl::version_questions.filter(vq_dsl::version_id.eq(version_id.to_string()))
                                            .filter(vq_dsl::question_id.eq(question_id.to_string())))
      .execute(tx)
      .map_err(map_db_err)?;
    Ok(())
  }
  fn insert_program(&self, tx: &mut Self::Tx, program: &Program) -> Result<()> {
    let row = program_to_row(program)?;
    diesel::insert_into(programs_dsl::programs).values(&row).execute(tx).map_err(map_db_err)?;
    Ok(())
  }
  fn update_program(&self, tx: &mut Self::Tx, program: &Program) -> Result<()> {
    let row = program_to_row(program)?;
    let updated = diesel::update(programs_dsl::programs.filter(programs_dsl::id.eq(&row.id))).set(&row)
                                                                                             .execute(tx)
                                                                                             .map_err(map_db_err)?;
    if updated == 0 {
      return Err(VersioningError::NotFound(format!("programa {}", row.id)));
    }
    Ok(())
  }
  fn find_program(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<Program>> {
    let opt = programs_dsl::programs.filter(programs_dsl::id.eq(id.to_string()))
                                    .first::<ProgramRow>(tx)
                                    .optional()
                                    .map_err(map_db_err)?;
    opt.map(program_from_row).transpose()
  }
  fn programs_for_version(&self, tx: &mut Self::Tx, version_id: Uuid) -> Result<Vec<Program>> {
    let members = vp_dsl::version_programs.filter(vp_dsl::version_id.eq(version_id.to_string()))
                                          .order(vp_dsl::seq.asc())
                                          .load::<VersionProgramRow>(tx)
                                          .map_err(map_db_err)?;
    let mut out = Vec::with_capacity(members.len());
    for member in members {
      if let Some(row) = programs_dsl::programs.filter(programs_dsl::id.eq(&member.program_id))
                                               .first::<ProgramRow>(tx)
                                               .optional()
                                               .map_err(map_db_err)?
      {
        out.push(program_from_row(row)?);
      }
    }
    Ok(out)
  }
  fn add_version_program(&self, tx: &mut Self::Tx, version_id: Uuid, program_id: Uuid) -> Result<()> {
    let v_id = version_id.to_string();
    let p_id = program_id.to_string();
    let existing = vp_dsl::version_programs.filter(vp_dsl::version_id.eq(&v_id))
                                           .filter(vp_dsl::program_id.eq(&p_id))
                                           .select(vp_dsl::id)
                                           .first::<String>(tx)
                                           .optional()
                                           .map_err(map_db_err)?;
    if existing.is_some() {
      return Ok(());
    }
    let next_seq = vp_dsl::version_programs.filter(vp_dsl::version_id.eq(&v_id))
                                           .select(max(vp_dsl::seq))
                                           .first::<Option<i64>>(tx)
                                           .map_err(map_db_err)?
                                           .unwrap_or(0)
                   + 1;
    let row = VersionProgramRow { id: Uuid::new_v4().to_string(), version_id: v_id, program_id: p_id, seq: next_seq };
    diesel::insert_into(vp_dsl::version_programs).values(&row).execute(tx).map_err(map_db_err)?;
    Ok(())
  }
  fn remove_version_program(&self, tx: &mut Self::Tx, version_id: Uuid, program_id: Uuid) -> Result<()> {
    diesel::delete(vp_dsl::version_programs.filter(vp_dsl::version_id.eq(version_id.to_string()))
                                           .filter(vp_dsl::program_id.eq(program_id.to_string())))
      .execute(tx)
      .map_err(map_db_err)?;
    Ok(())
  }
}
/// Crear el almacén desde las variables de entorno (o default sqlite
/// in-memory en tests)
#[cfg(all(feature = "pg", not(test)))]
pub fn new_from_env() -> Result<DieselEntityStore> {
  dotenvy::dotenv().ok();
  let url = std::env::var("TRAMITE_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                           .map_err(|_| {
                                             VersioningError::Storage("TRAMITE_DB_URL / DATABASE_URL not set".into())
                                           })?;
  if !(url.starts_with("postgres") || url.starts_with("postgresql://") || url.contains("@")) {
    return Err(VersioningError::Storage("tramite-persistence: TRAMITE_DB_URL does not look like Postgres URL".into()));
  }
  Ok(DieselEntityStore::new(&url))
}
#[cfg(test)]
pub fn new_from_env() -> Result<DieselEntityStore> {
  dotenvy::dotenv().ok();
  let url = std::env::var("TRAMITE_DB_URL").unwrap_or_else(|_| "file:tramitedb?mode=memory&cache=shared".into());
  Ok(DieselEntityStore::new(&url))
}
#[cfg(all(not(feature = "pg"), not(test)))]
pub fn new_from_env() -> Result<DieselEntityStore> {
  dotenvy::dotenv().ok();
  let url = std::env::var("TRAMITE_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                           .map_err(|_| {
                                             VersioningError::Storage("TRAMITE_DB_URL / DATABASE_URL not set".into())
                                           })?;
  let url_l = url.to_lowercase();
  if url_l.starts_with("file:") || url_l.contains("mode=memory") || url_l.contains("sqlite") || url_l.ends_with(".db") {
    return Ok(DieselEntityStore::new(&url));
  }
  Err(VersioningError::Storage("tramite-persistence was compiled without 'pg' feature; enable the 'pg' feature to use \
                                Postgres in production"
                                                       .into()))
}
// Test helper: construct a DieselEntityStore backed by explicit SQLite
// connection manager. This bypasses environment parsing and avoids cases
// where the build or features might cause the ConnectionManager to treat
// the string as Postgres connection info.
#[cfg(not(feature = "pg"))]
pub fn new_sqlite_for_test(database_url: &str) -> DieselEntityStore {
  use diesel::sqlite::SqliteConnection;
  let manager = ConnectionManager::<SqliteConnection>::new(database_url);
  let pool = Pool::builder().max_size(4).build(manager).expect("no se pudo crear el pool de conexiones");
  let store = DieselEntityStore { pool: Arc::new(pool) };
  if let Ok(mut c) = store.conn_raw() {
    let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
    let _ = diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(&mut c);
    let _ = c.run_pending_migrations(MIGRATIONS);
  }
  store
}
