// Archivo: store.rs
// Propósito: definir el contrato de almacenamiento `EntityStore` y el
// trait colaborador `ProgramRepository`. Describe el contrato que deben
// implementar las persistencias (Diesel, in-memory, etc.).
use crate::errors::Result;
use tramite_domain::{LifecycleStage, Program, Question, Version};
use uuid::Uuid;

/// Nivel de aislamiento de una transacción.
///
/// El motor sólo usa dos niveles: `ReadCommitted` para el trabajo
/// ordinario y `Serializable` para la creación de la versión borrador,
/// donde dos inserciones en carrera deben detectarse como conflicto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    Serializable,
}

/// Bloqueo de fila en una lectura. `ForUpdate` es la relectura con
/// bloqueo que verifica la unicidad del borrador tras insertarlo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    None,
    ForUpdate,
}

/// Contrato del almacén transaccional de entidades versionadas.
///
/// Todas las lecturas y escrituras ocurren contra un handle de
/// transacción explícito (`Tx`) pasado como parámetro: nunca hay estado
/// de transacción ambiente. Una transacción confirma al devolver `Ok` y
/// revierte por completo al devolver `Err`; un savepoint revierte sólo
/// hasta su punto de apertura y devuelve el error al caller, que decide
/// si continuar o abortar.
///
/// La pertenencia versión↔pregunta y versión↔programa es una relación
/// propia del almacén con operaciones explícitas de alta/baja/consulta,
/// conservando el orden de inserción.
pub trait EntityStore: Send + Sync {
    /// Handle de una transacción abierta.
    type Tx;

    /// Abre una transacción al nivel de aislamiento dado, ejecuta `body`
    /// y confirma con `Ok` o revierte con `Err`.
    fn transaction<T, F>(&self, isolation: IsolationLevel, body: F) -> Result<T>
        where F: FnOnce(&mut Self::Tx) -> Result<T>;

    /// Ejecuta `body` dentro de un savepoint anidado en `tx`. En caso de
    /// error revierte hasta el savepoint y devuelve el error.
    fn savepoint<T, F>(&self, tx: &mut Self::Tx, body: F) -> Result<T>
        where F: FnOnce(&mut Self::Tx) -> Result<T>;

    // --- Versiones ---

    /// Inserta una versión nueva. Un id duplicado es `Conflict`.
    fn insert_version(&self, tx: &mut Self::Tx, version: &Version) -> Result<()>;

    /// Sobrescribe una versión existente. `NotFound` si no existe.
    fn update_version(&self, tx: &mut Self::Tx, version: &Version) -> Result<()>;

    fn find_version(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<Version>>;

    /// Versiones en una etapa dada. `RowLock::ForUpdate` pide una lectura
    /// con bloqueo donde el backend la soporte.
    fn versions_by_stage(&self, tx: &mut Self::Tx, stage: LifecycleStage, lock: RowLock) -> Result<Vec<Version>>;

    fn list_versions(&self, tx: &mut Self::Tx) -> Result<Vec<Version>>;

    // --- Preguntas ---

    fn insert_question(&self, tx: &mut Self::Tx, question: &Question) -> Result<()>;

    fn update_question(&self, tx: &mut Self::Tx, question: &Question) -> Result<()>;

    fn find_question(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<Question>>;

    /// Todas las preguntas, de cualquier versión.
    fn list_questions(&self, tx: &mut Self::Tx) -> Result<Vec<Question>>;

    /// Preguntas que pertenecen a una versión, en orden de alta.
    fn questions_for_version(&self, tx: &mut Self::Tx, version_id: Uuid) -> Result<Vec<Question>>;

    /// Alta de pertenencia versión↔pregunta (idempotente).
    fn add_version_question(&self, tx: &mut Self::Tx, version_id: Uuid, question_id: Uuid) -> Result<()>;

    fn remove_version_question(&self, tx: &mut Self::Tx, version_id: Uuid, question_id: Uuid) -> Result<()>;

    // --- Programas ---

    fn insert_program(&self, tx: &mut Self::Tx, program: &Program) -> Result<()>;

    fn update_program(&self, tx: &mut Self::Tx, program: &Program) -> Result<()>;

    fn find_program(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<Program>>;

    /// Programas que pertenecen a una versión, en orden de alta.
    fn programs_for_version(&self, tx: &mut Self::Tx, version_id: Uuid) -> Result<Vec<Program>>;

    /// Alta de pertenencia versión↔programa (idempotente).
    fn add_version_program(&self, tx: &mut Self::Tx, version_id: Uuid, program_id: Uuid) -> Result<()>;

    fn remove_version_program(&self, tx: &mut Self::Tx, version_id: Uuid, program_id: Uuid) -> Result<()>;
}

/// Colaborador externo responsable de bifurcar programas activos hacia la
/// versión borrador. El motor sólo depende de este contrato; la
/// reparación interna de referencias del programa bifurcado es asunto de
/// la implementación.
pub trait ProgramRepository<S: EntityStore>: Send + Sync {
    /// Crea (o devuelve) el borrador del programa dado dentro de la
    /// transacción del caller.
    fn create_or_update_draft(&self, store: &S, tx: &mut S::Tx, program: &Program) -> Result<Program>;
}
