// Archivo: question_repository.rs
// Propósito: gestionar los borradores de pregunta: edición en el sitio
// del borrador existente, bifurcación con id fresco cuando no lo hay,
// cascada de enumeradoras sobre sus preguntas repetidas y detección de
// conflictos de nombre/ruta.
use crate::errors::{Result, VersioningError};
use crate::events::{EngineEvent, EventSink, LogEventSink};
use crate::program_updater::ProgramReferenceUpdater;
use crate::store::{EntityStore, IsolationLevel, ProgramRepository, RowLock};
use crate::version_repository::VersionRepository;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tramite_domain::{LifecycleStage, Question, QuestionDefinition};
use uuid::Uuid;

/// Repositorio de preguntas orientado a borradores.
///
/// Editar una pregunta nunca muta la copia activa: o bien actualiza el
/// borrador existente con ese nombre (mismo id), o bien inserta una
/// pregunta nueva con id fresco y la engancha a la versión borrador,
/// dejando la activa intacta.
pub struct QuestionRepository<S: EntityStore, P: ProgramRepository<S>> {
    store: Arc<S>,
    versions: Arc<VersionRepository<S>>,
    updater: Arc<ProgramReferenceUpdater<S, P>>,
    events: Arc<dyn EventSink>,
}

impl<S: EntityStore, P: ProgramRepository<S>> QuestionRepository<S, P> {
    pub fn new(store: Arc<S>,
               versions: Arc<VersionRepository<S>>,
               updater: Arc<ProgramReferenceUpdater<S, P>>)
               -> Self {
        Self { store, versions, updater, events: Arc::new(LogEventSink) }
    }

    pub fn with_events(store: Arc<S>,
                       versions: Arc<VersionRepository<S>>,
                       updater: Arc<ProgramReferenceUpdater<S, P>>,
                       events: Arc<dyn EventSink>)
                       -> Self {
        Self { store, versions, updater, events }
    }

    /// Todas las preguntas, de cualquier versión.
    pub fn list_questions(&self) -> Result<Vec<Question>> {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| self.store.list_questions(tx))
    }

    /// Busca una pregunta por id.
    pub fn lookup_question(&self, id: Uuid) -> Result<Option<Question>> {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| self.store.find_question(tx, id))
    }

    /// Busca y actualiza el borrador de la pregunta con este nombre, o
    /// crea un borrador nuevo si no existe.
    ///
    /// Los ids reemplazados por la operación (incluida la cascada de
    /// enumeradoras) se entregan al actualizador de programas dentro de
    /// un savepoint; un fallo ahí revierte hasta el savepoint y se
    /// relanza, de modo que la transacción externa aborta y no queda
    /// ninguna bifurcación parcial persistida.
    pub fn update_or_create_draft(&self, definition: &QuestionDefinition) -> Result<Question> {
        let target_name = definition.name().to_string();
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
                let old_ids = self.update_or_create_draft_questions_in(tx, definition)?;
                self.store.savepoint(tx, |tx| {
                              self.updater.update_programs_for_new_draft_questions_in(tx, &old_ids)
                          })
            })?;

        // Tras confirmar, la pregunta recién actualizada/bifurcada tiene
        // que estar en el borrador. Si no está, una edición concurrente se
        // interpuso entre la confirmación y esta relectura: se devuelve un
        // error tipado, sin reintento, y el caller debe releer.
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
                let draft = self.versions.draft_version_in(tx)?;
                self.store
                    .questions_for_version(tx, draft.id())?
                    .into_iter()
                    .find(|q| q.name() == target_name)
                    .ok_or_else(|| {
                        VersioningError::ConcurrentEdit(format!("la pregunta '{}' desapareció del borrador durante \
                                                                 la edición",
                                                                target_name))
                    })
            })
    }

    /// Paso de borrador-o-creación. Devuelve los ids de pregunta
    /// reemplazados que los programas aún referencian.
    ///
    /// La cascada de enumeradoras se procesa como lista de trabajo
    /// iterativa: bifurcar una enumeradora encola las definiciones de sus
    /// preguntas repetidas (con el `enumerator_id` reescrito al id
    /// fresco), y una repetida que sea a su vez enumeradora encola las
    /// suyas, a cualquier profundidad, sin recursión.
    pub fn update_or_create_draft_questions_in(&self,
                                               tx: &mut S::Tx,
                                               definition: &QuestionDefinition)
                                               -> Result<Vec<Uuid>> {
        let mut old_ids: Vec<Uuid> = Vec::new();
        let mut pending: VecDeque<QuestionDefinition> = VecDeque::new();
        pending.push_back(definition.clone());

        while let Some(def) = pending.pop_front() {
            let draft = self.versions.draft_version_in(tx)?;
            let existing = self.store
                               .questions_for_version(tx, draft.id())?
                               .into_iter()
                               .find(|q| q.name() == def.name());

            if let Some(draft_question) = existing {
                // Ya hay borrador con este nombre: actualización en el
                // sitio conservando el id. Sin cambio de id no hay
                // cascada ni programas que reparar.
                let updated = draft_question.with_definition(def.clone());
                self.store.update_question(tx, &updated)?;
                self.events.emit(&EngineEvent::DraftQuestionUpdated { question_id: updated.id(),
                                                                      name: def.name().to_string() });
                continue;
            }

            // Bifurcación: pregunta nueva con id fresco, enganchada al
            // borrador. La fila activa queda intacta.
            let superseded = def.id();
            let fresh = Question::from_definition(def.clone());
            self.store.insert_question(tx, &fresh)?;
            self.store.add_version_question(tx, draft.id(), fresh.id())?;
            self.events.emit(&EngineEvent::QuestionForked { old_id: superseded,
                                                            new_id: fresh.id(),
                                                            name: def.name().to_string() });

            let Some(old_id) = superseded else {
                // Definición nueva que nunca se persistió: no hay id
                // anterior que los programas puedan referenciar.
                continue;
            };
            old_ids.push(old_id);

            if def.is_enumerator() {
                let dependents = self.repeated_questions_of(tx, old_id)?;
                if !dependents.is_empty() {
                    self.events.emit(&EngineEvent::RepeatedQuestionsCascaded { enumerator_name: def.name()
                                                                                                   .to_string(),
                                                                               affected: dependents.len() });
                }
                for dependent in dependents {
                    pending.push_back(dependent.definition().with_enumerator_id(Some(fresh.id())));
                }
            }
        }
        Ok(old_ids)
    }

    /// Busca una pregunta que entre en conflicto con la definición dada:
    /// mismo nombre, o mismo par (enumerador, segmento de ruta). Recorre
    /// todas las preguntas y corta en el primer conflicto.
    ///
    /// Pensado sólo para definiciones nuevas: una edición colisiona
    /// trivialmente con sus propias versiones anteriores.
    pub fn find_conflicting_question(&self, definition: &QuestionDefinition) -> Result<Option<Question>> {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
                for question in self.store.list_questions(tx)? {
                    if question.definition().conflicts_with(definition) {
                        return Ok(Some(question));
                    }
                }
                Ok(None)
            })
    }

    /// Preguntas repetidas que apuntan su `enumerator_id` al id dado, en
    /// la unión de los conjuntos borrador y activo. Cuando un nombre
    /// aparece en ambos se prefiere la copia del borrador, que es la
    /// definición más actual.
    fn repeated_questions_of(&self, tx: &mut S::Tx, enumerator_id: Uuid) -> Result<Vec<Question>> {
        let draft = self.versions.draft_version_in(tx)?;
        let mut pools = vec![self.store.questions_for_version(tx, draft.id())?];
        if let Some(active) = self.store.versions_by_stage(tx, LifecycleStage::Active, RowLock::None)?.pop() {
            pools.push(self.store.questions_for_version(tx, active.id())?);
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut dependents = Vec::new();
        for question in pools.into_iter().flatten() {
            if question.definition().enumerator_id() == Some(enumerator_id)
               && seen.insert(question.name().to_string())
            {
                dependents.push(question);
            }
        }
        Ok(dependents)
    }
}
