// Archivo: program_updater.rs
// Propósito: reparar referencias de programa tras la bifurcación de
// preguntas. Los programas borrador que apuntan a ids reemplazados se
// reescriben en el sitio; los programas activos afectados sin borrador
// se entregan al colaborador `ProgramRepository` para que los bifurque.
use crate::errors::{Result, VersioningError};
use crate::events::{EngineEvent, EventSink, LogEventSink};
use crate::store::{EntityStore, IsolationLevel, ProgramRepository, RowLock};
use crate::version_repository::VersionRepository;
use std::collections::HashSet;
use std::sync::Arc;
use tramite_domain::{BlockDefinition, LifecycleStage, Program, ProgramQuestionDefinition, Question};
use uuid::Uuid;

/// Actualizador de referencias programa→pregunta.
///
/// Invariante que restaura: un programa de la versión borrador sólo debe
/// referenciar, para cada nombre de pregunta, el id de la versión más
/// actual (borrador si existe, activa si no).
pub struct ProgramReferenceUpdater<S: EntityStore, P: ProgramRepository<S>> {
    store: Arc<S>,
    versions: Arc<VersionRepository<S>>,
    programs: Arc<P>,
    events: Arc<dyn EventSink>,
}

impl<S: EntityStore, P: ProgramRepository<S>> ProgramReferenceUpdater<S, P> {
    pub fn new(store: Arc<S>, versions: Arc<VersionRepository<S>>, programs: Arc<P>) -> Self {
        Self { store, versions, programs, events: Arc::new(LogEventSink) }
    }

    pub fn with_events(store: Arc<S>,
                       versions: Arc<VersionRepository<S>>,
                       programs: Arc<P>,
                       events: Arc<dyn EventSink>)
                       -> Self {
        Self { store, versions, programs, events }
    }

    /// Variante de conveniencia para un único id reemplazado.
    pub fn update_programs_for_new_draft_question(&self, old_question_id: Uuid) -> Result<()> {
        self.update_programs_for_new_draft_questions(&[old_question_id])
    }

    /// Recorre los programas afectados por los ids reemplazados, en su
    /// propia transacción.
    pub fn update_programs_for_new_draft_questions(&self, old_question_ids: &[Uuid]) -> Result<()> {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
                self.update_programs_for_new_draft_questions_in(tx, old_question_ids)
            })
    }

    /// Núcleo de la reparación, dentro de la transacción del caller.
    ///
    /// - Un programa borrador que referencia cualquier id reemplazado se
    ///   repara y persiste en el sitio (ya es borrador; no hace falta
    ///   bifurcar).
    /// - Un programa activo que referencia cualquier id reemplazado y no
    ///   tiene contraparte por `admin_name` en el borrador se entrega al
    ///   colaborador para que cree su borrador.
    pub fn update_programs_for_new_draft_questions_in(&self, tx: &mut S::Tx, old_question_ids: &[Uuid]) -> Result<()> {
        if old_question_ids.is_empty() {
            return Ok(());
        }
        let draft = self.versions.draft_version_in(tx)?;
        let draft_programs = self.store.programs_for_version(tx, draft.id())?;
        let draft_names: HashSet<String> = draft_programs.iter().map(|p| p.admin_name().to_string()).collect();

        for program in &draft_programs {
            if program.definition().has_any_question(old_question_ids) {
                let repaired = self.update_question_versions_in(tx, program)?;
                self.events.emit(&EngineEvent::ProgramReferencesUpdated { program_id: repaired.id(),
                                                                          admin_name: repaired.admin_name()
                                                                                              .to_string() });
            }
        }

        if let Some(active) = self.store.versions_by_stage(tx, LifecycleStage::Active, RowLock::None)?.pop() {
            for program in self.store.programs_for_version(tx, active.id())? {
                if program.definition().has_any_question(old_question_ids)
                   && !draft_names.contains(program.admin_name())
                {
                    self.events.emit(&EngineEvent::ProgramDraftRequested { admin_name: program.admin_name()
                                                                                              .to_string() });
                    self.programs.create_or_update_draft(self.store.as_ref(), tx, &program)?;
                }
            }
        }
        Ok(())
    }

    /// Repara un programa borrador en su propia transacción.
    ///
    /// Precondiciones: el programa debe pertenecer a la versión borrador
    /// y no puede pertenecer a la activa.
    pub fn update_question_versions(&self, program: &Program) -> Result<Program> {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
                let draft = self.versions.draft_version_in(tx)?;
                let in_draft = self.store
                                   .programs_for_version(tx, draft.id())?
                                   .iter()
                                   .any(|p| p.id() == program.id());
                if !in_draft {
                    return Err(VersioningError::Precondition(format!("el programa '{}' debe pertenecer a la versión \
                                                                      borrador",
                                                                     program.admin_name())));
                }
                if let Some(active) = self.store.versions_by_stage(tx, LifecycleStage::Active, RowLock::None)?.pop() {
                    let is_active = self.store
                                        .programs_for_version(tx, active.id())?
                                        .iter()
                                        .any(|p| p.id() == program.id());
                    if is_active {
                        return Err(VersioningError::Precondition(format!("el programa '{}' no puede ser activo",
                                                                         program.admin_name())));
                    }
                }
                self.update_question_versions_in(tx, program)
            })
    }

    /// Reconstruye cada bloque del programa resolviendo cada referencia
    /// al id más actual de la pregunta, conservando el orden, y persiste
    /// la actualización.
    pub fn update_question_versions_in(&self, tx: &mut S::Tx, program: &Program) -> Result<Program> {
        let mut blocks: Vec<BlockDefinition> = Vec::with_capacity(program.definition().block_definitions().len());
        for block in program.definition().block_definitions() {
            let mut references = Vec::with_capacity(block.question_definitions().len());
            for reference in block.question_definitions() {
                let latest = self.latest_version_of_question_in(tx, reference.question_id())?;
                references.push(ProgramQuestionDefinition::from_question(&latest));
            }
            blocks.push(block.with_question_definitions(references));
        }
        let repaired = program.with_definition(program.definition().with_block_definitions(blocks));
        self.store.update_program(tx, &repaired)?;
        Ok(repaired)
    }

    /// Resuelve la versión más actual de la pregunta referenciada por id:
    /// la copia del borrador si existe, si no la copia activa. Que no
    /// exista ninguna es violación de invariante: una pregunta
    /// referenciada tiene que existir en algún sitio.
    fn latest_version_of_question_in(&self, tx: &mut S::Tx, question_id: Uuid) -> Result<Question> {
        let referenced = self.store
                             .find_question(tx, question_id)?
                             .ok_or_else(|| {
                                 VersioningError::Invariant(format!("la pregunta referenciada {} no existe",
                                                                    question_id))
                             })?;
        let name = referenced.name().to_string();

        let draft = self.versions.draft_version_in(tx)?;
        if let Some(found) = self.store
                                 .questions_for_version(tx, draft.id())?
                                 .into_iter()
                                 .find(|q| q.name() == name)
        {
            return Ok(found);
        }
        if let Some(active) = self.store.versions_by_stage(tx, LifecycleStage::Active, RowLock::None)?.pop() {
            if let Some(found) = self.store
                                     .questions_for_version(tx, active.id())?
                                     .into_iter()
                                     .find(|q| q.name() == name)
            {
                return Ok(found);
            }
        }
        Err(VersioningError::Invariant(format!("la pregunta '{}' no tiene versión borrador ni activa", name)))
    }
}
