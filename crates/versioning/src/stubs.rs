// Archivo: stubs.rs
// Propósito: implementaciones en memoria para pruebas y wiring rápido.
//
// Incluye un almacén de entidades en memoria (`InMemoryEntityStore`) con
// semántica real de transacción y savepoint (copia de trabajo que se
// confirma o descarta), y un `InMemoryProgramRepository` que bifurca
// programas activos hacia el borrador. No son durables; se usan para
// demos o pruebas locales.
use crate::errors::{Result, VersioningError};
use crate::store::{EntityStore, IsolationLevel, ProgramRepository, RowLock};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tramite_domain::{LifecycleStage, Program, ProgramQuestionDefinition, Question, Version};
use uuid::Uuid;

/// Estado completo del almacén: entidades más relaciones de pertenencia.
/// Las listas de pertenencia conservan el orden de alta, como las tablas
/// de relación del backend real.
#[derive(Debug, Default, Clone)]
struct StoreState {
    versions: HashMap<Uuid, Version>,
    questions: HashMap<Uuid, Question>,
    programs: HashMap<Uuid, Program>,
    version_questions: HashMap<Uuid, Vec<Uuid>>,
    version_programs: HashMap<Uuid, Vec<Uuid>>,
}

/// Transacción en memoria: una copia de trabajo del estado completo.
/// Confirmar escribe la copia de vuelta; revertir la descarta.
pub struct InMemoryTx {
    working: StoreState,
}

/// Almacén de entidades en memoria.
///
/// El candado se mantiene durante toda la transacción, así que cada
/// transacción ve el estado serializado por completo: ambos niveles de
/// aislamiento equivalen a `Serializable` aquí.
pub struct InMemoryEntityStore {
    state: Mutex<StoreState>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(StoreState::default()) }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `VersioningError::Storage`.
    fn lock(&self) -> std::result::Result<MutexGuard<'_, StoreState>, VersioningError> {
        self.state
            .lock()
            .map_err(|e| VersioningError::Storage(format!("mutex poisoned: {:?}", e)))
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for InMemoryEntityStore {
    type Tx = InMemoryTx;

    fn transaction<T, F>(&self, _isolation: IsolationLevel, body: F) -> Result<T>
        where F: FnOnce(&mut Self::Tx) -> Result<T>
    {
        let mut guard = self.lock()?;
        let mut tx = InMemoryTx { working: guard.clone() };
        match body(&mut tx) {
            Ok(value) => {
                *guard = tx.working;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }

    fn savepoint<T, F>(&self, tx: &mut Self::Tx, body: F) -> Result<T>
        where F: FnOnce(&mut Self::Tx) -> Result<T>
    {
        let saved = tx.working.clone();
        match body(tx) {
            Ok(value) => Ok(value),
            Err(e) => {
                tx.working = saved;
                Err(e)
            }
        }
    }

    fn insert_version(&self, tx: &mut Self::Tx, version: &Version) -> Result<()> {
        if tx.working.versions.contains_key(&version.id()) {
            return Err(VersioningError::Conflict(format!("versión duplicada: {}", version.id())));
        }
        tx.working.versions.insert(version.id(), version.clone());
        Ok(())
    }

    fn update_version(&self, tx: &mut Self::Tx, version: &Version) -> Result<()> {
        match tx.working.versions.get_mut(&version.id()) {
            Some(slot) => {
                *slot = version.clone();
                Ok(())
            }
            None => Err(VersioningError::NotFound(format!("versión {}", version.id()))),
        }
    }

    fn find_version(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<Version>> {
        Ok(tx.working.versions.get(&id).cloned())
    }

    fn versions_by_stage(&self, tx: &mut Self::Tx, stage: LifecycleStage, _lock: RowLock) -> Result<Vec<Version>> {
        // Con un candado global no hay bloqueo de fila que tomar.
        Ok(tx.working.versions.values().filter(|v| v.stage() == stage).cloned().collect())
    }

    fn list_versions(&self, tx: &mut Self::Tx) -> Result<Vec<Version>> {
        Ok(tx.working.versions.values().cloned().collect())
    }

    fn insert_question(&self, tx: &mut Self::Tx, question: &Question) -> Result<()> {
        if tx.working.questions.contains_key(&question.id()) {
            return Err(VersioningError::Conflict(format!("pregunta duplicada: {}", question.id())));
        }
        tx.working.questions.insert(question.id(), question.clone());
        Ok(())
    }

    fn update_question(&self, tx: &mut Self::Tx, question: &Question) -> Result<()> {
        match tx.working.questions.get_mut(&question.id()) {
            Some(slot) => {
                *slot = question.clone();
                Ok(())
            }
            None => Err(VersioningError::NotFound(format!("pregunta {}", question.id()))),
        }
    }

    fn find_question(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<Question>> {
        Ok(tx.working.questions.get(&id).cloned())
    }

    fn list_questions(&self, tx: &mut Self::Tx) -> Result<Vec<Question>> {
        Ok(tx.working.questions.values().cloned().collect())
    }

    fn questions_for_version(&self, tx: &mut Self::Tx, version_id: Uuid) -> Result<Vec<Question>> {
        let ids = tx.working.version_questions.get(&version_id).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|id| tx.working.questions.get(id).cloned()).collect())
    }

    fn add_version_question(&self, tx: &mut Self::Tx, version_id: Uuid, question_id: Uuid) -> Result<()> {
        let members = tx.working.version_questions.entry(version_id).or_default();
        if !members.contains(&question_id) {
            members.push(question_id);
        }
        Ok(())
    }

    fn remove_version_question(&self, tx: &mut Self::Tx, version_id: Uuid, question_id: Uuid) -> Result<()> {
        if let Some(members) = tx.working.version_questions.get_mut(&version_id) {
            members.retain(|id| *id != question_id);
        }
        Ok(())
    }

    fn insert_program(&self, tx: &mut Self::Tx, program: &Program) -> Result<()> {
        if tx.working.programs.contains_key(&program.id()) {
            return Err(VersioningError::Conflict(format!("programa duplicado: {}", program.id())));
        }
        tx.working.programs.insert(program.id(), program.clone());
        Ok(())
    }

    fn update_program(&self, tx: &mut Self::Tx, program: &Program) -> Result<()> {
        match tx.working.programs.get_mut(&program.id()) {
            Some(slot) => {
                *slot = program.clone();
                Ok(())
            }
            None => Err(VersioningError::NotFound(format!("programa {}", program.id()))),
        }
    }

    fn find_program(&self, tx: &mut Self::Tx, id: Uuid) -> Result<Option<Program>> {
        Ok(tx.working.programs.get(&id).cloned())
    }

    fn programs_for_version(&self, tx: &mut Self::Tx, version_id: Uuid) -> Result<Vec<Program>> {
        let ids = tx.working.version_programs.get(&version_id).cloned().unwrap_or_default();
        Ok(ids.iter().filter_map(|id| tx.working.programs.get(id).cloned()).collect())
    }

    fn add_version_program(&self, tx: &mut Self::Tx, version_id: Uuid, program_id: Uuid) -> Result<()> {
        let members = tx.working.version_programs.entry(version_id).or_default();
        if !members.contains(&program_id) {
            members.push(program_id);
        }
        Ok(())
    }

    fn remove_version_program(&self, tx: &mut Self::Tx, version_id: Uuid, program_id: Uuid) -> Result<()> {
        if let Some(members) = tx.working.version_programs.get_mut(&version_id) {
            members.retain(|id| *id != program_id);
        }
        Ok(())
    }
}

/// Repositorio de programas en memoria: bifurca un programa activo hacia
/// la versión borrador con id fresco y referencias reparadas.
pub struct InMemoryProgramRepository;

impl InMemoryProgramRepository {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InMemoryProgramRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramRepository<InMemoryEntityStore> for InMemoryProgramRepository {
    fn create_or_update_draft(&self,
                              store: &InMemoryEntityStore,
                              tx: &mut InMemoryTx,
                              program: &Program)
                              -> Result<Program> {
        let draft = store.versions_by_stage(tx, LifecycleStage::Draft, RowLock::None)?
                         .pop()
                         .ok_or_else(|| VersioningError::NotFound("no hay versión borrador".to_string()))?;

        // Si el borrador ya tiene un programa con este nombre, es el
        // borrador pedido.
        if let Some(existing) = store.programs_for_version(tx, draft.id())?
                                     .into_iter()
                                     .find(|p| p.admin_name() == program.admin_name())
        {
            return Ok(existing);
        }

        // Bifurcación con referencias resueltas a la copia más actual de
        // cada pregunta (borrador si existe, activa si no).
        let draft_questions = store.questions_for_version(tx, draft.id())?;
        let active_questions = match store.versions_by_stage(tx, LifecycleStage::Active, RowLock::None)?.pop() {
            Some(active) => store.questions_for_version(tx, active.id())?,
            None => Vec::new(),
        };
        let latest_by_name = |name: &str| {
            draft_questions.iter()
                           .find(|q| q.name() == name)
                           .or_else(|| active_questions.iter().find(|q| q.name() == name))
                           .cloned()
        };

        let mut blocks = Vec::with_capacity(program.definition().block_definitions().len());
        for block in program.definition().block_definitions() {
            let mut references = Vec::with_capacity(block.question_definitions().len());
            for reference in block.question_definitions() {
                let referenced = store.find_question(tx, reference.question_id())?
                                      .ok_or_else(|| {
                                          VersioningError::Invariant(format!("la pregunta referenciada {} no existe",
                                                                             reference.question_id()))
                                      })?;
                let latest = latest_by_name(referenced.name()).ok_or_else(|| {
                                 VersioningError::Invariant(format!("la pregunta '{}' no tiene versión borrador ni \
                                                                     activa",
                                                                    referenced.name()))
                             })?;
                references.push(ProgramQuestionDefinition::from_question(&latest));
            }
            blocks.push(block.with_question_definitions(references));
        }

        let fork = Program::from_definition(program.definition().with_block_definitions(blocks));
        store.insert_program(tx, &fork)?;
        store.add_version_program(tx, draft.id(), fork.id())?;
        Ok(fork)
    }
}
