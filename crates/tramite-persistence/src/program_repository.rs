use crate::entity_store::DieselEntityStore;
use tramite_domain::{LifecycleStage, Program, ProgramQuestionDefinition};
use versioning::{EntityStore, ProgramRepository, Result, RowLock, VersioningError};

/// Repositorio de programas sobre el almacén Diesel: bifurca un programa
/// activo hacia la versión borrador con id fresco y referencias resueltas
/// a la copia más actual de cada pregunta.
pub struct DieselProgramRepository;

impl DieselProgramRepository {
  pub fn new() -> Self {
    Self
  }
}

impl Default for DieselProgramRepository {
  fn default() -> Self {
    Self::new()
  }
}

impl ProgramRepository<DieselEntityStore> for DieselProgramRepository {
  fn create_or_update_draft(&self,
                            store: &DieselEntityStore,
                            tx: &mut <DieselEntityStore as EntityStore>::Tx,
                            program: &Program)
                            -> Result<Program> {
    let draft = store.versions_by_stage(tx, LifecycleStage::Draft, RowLock::None)?
                     .pop()
                     .ok_or_else(|| VersioningError::NotFound("no hay versión borrador".to_string()))?;

    // Si el borrador ya tiene un programa con este nombre, es el borrador
    // pedido.
    if let Some(existing) = store.programs_for_version(tx, draft.id())?
                                 .into_iter()
                                 .find(|p| p.admin_name() == program.admin_name())
    {
      return Ok(existing);
    }
    log::debug!("bifurcando el programa activo '{}' hacia el borrador", program.admin_name());

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
                       VersioningError::Invariant(format!("la pregunta '{}' no tiene versión borrador ni activa",
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
