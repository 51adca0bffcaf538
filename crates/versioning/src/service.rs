// Archivo: service.rs
// Propósito: implementar `VersioningService`, la capa orquestadora que
// cablea los tres componentes del motor sobre un mismo almacén. Esta
// capa debe ser invocada desde handlers HTTP de administración o desde
// consolas.
use crate::events::{EventSink, LogEventSink};
use crate::program_updater::ProgramReferenceUpdater;
use crate::question_repository::QuestionRepository;
use crate::store::{EntityStore, ProgramRepository};
use crate::version_repository::{RetryConfig, VersionRepository};
use std::sync::Arc;

/// Servicio de alto nivel que expone la API del motor de versionado.
///
/// Construye y reusa el repositorio de versiones, el de preguntas y el
/// actualizador de programas, compartiendo almacén, colaborador de
/// programas y sink de eventos.
pub struct VersioningService<S, P>
    where S: EntityStore,
          P: ProgramRepository<S>
{
    versions: Arc<VersionRepository<S>>,
    questions: Arc<QuestionRepository<S, P>>,
    updater: Arc<ProgramReferenceUpdater<S, P>>,
}

impl<S, P> VersioningService<S, P>
    where S: EntityStore + 'static,
          P: ProgramRepository<S> + 'static
{
    /// Crea el servicio con la configuración por defecto y el sink de
    /// eventos que reenvía a `log`.
    pub fn new(store: Arc<S>, programs: Arc<P>) -> Self {
        Self::with_config(store, programs, RetryConfig::default(), Arc::new(LogEventSink))
    }

    /// Crea el servicio inyectando la configuración de reintento y el
    /// sink de eventos.
    pub fn with_config(store: Arc<S>, programs: Arc<P>, retry: RetryConfig, events: Arc<dyn EventSink>) -> Self {
        let versions = Arc::new(VersionRepository::with_config(store.clone(), retry, events.clone()));
        let updater = Arc::new(ProgramReferenceUpdater::with_events(store.clone(),
                                                                    versions.clone(),
                                                                    programs,
                                                                    events.clone()));
        let questions = Arc::new(QuestionRepository::with_events(store, versions.clone(), updater.clone(), events));
        Self { versions, questions, updater }
    }

    pub fn versions(&self) -> &VersionRepository<S> {
        &self.versions
    }

    pub fn questions(&self) -> &QuestionRepository<S, P> {
        &self.questions
    }

    pub fn program_updater(&self) -> &ProgramReferenceUpdater<S, P> {
        &self.updater
    }
}
