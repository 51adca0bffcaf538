// Archivo: version_repository.rs
// Propósito: implementar el almacén de versiones y el coordinador de
// publicación: obtención/creación del borrador único, consulta de la
// versión activa, publicación sincronizada y activación forzada.
use crate::errors::{Result, VersioningError};
use crate::events::{EngineEvent, EventSink, LogEventSink};
use crate::store::{EntityStore, IsolationLevel, RowLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tramite_domain::{LifecycleStage, Program, Question, Version};
use uuid::Uuid;

/// Configuración del reintento de creación del borrador.
///
/// La unicidad del borrador se impone de forma optimista: inserción bajo
/// aislamiento serializable más relectura con bloqueo, y reintento
/// completo ante conflicto. `max_attempts = 0` significa sin límite;
/// el backoff es exponencial desde `base_backoff` hasta `max_backoff`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 16,
               base_backoff: Duration::from_millis(5),
               max_backoff: Duration::from_millis(500) }
    }
}

impl RetryConfig {
    /// Reintento sin límite de intentos (el comportamiento clásico; la
    /// contención en la creación de borradores es rara y autoresoluble).
    pub fn unbounded() -> Self {
        Self { max_attempts: 0, ..Self::default() }
    }

    /// Lee `TRAMITE_DRAFT_RETRY_MAX` del entorno si está definida.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("TRAMITE_DRAFT_RETRY_MAX") {
            if let Ok(parsed) = raw.trim().parse::<u32>() {
                config.max_attempts = parsed;
            }
        }
        config
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let backoff = self.base_backoff.saturating_mul(1u32 << shift);
        backoff.min(self.max_backoff)
    }
}

/// Repositorio de versiones: ciclo de vida de los cortes de contenido.
///
/// Las garantías que mantiene:
/// - a lo sumo una versión `Draft` a la vez (creación serializable con
///   reintento);
/// - exactamente una versión `Active`, salvo transitoriamente durante
///   una publicación;
/// - una publicación es atómica: o promociona el borrador completo o no
///   deja nada persistido.
pub struct VersionRepository<S: EntityStore> {
    store: Arc<S>,
    retry: RetryConfig,
    events: Arc<dyn EventSink>,
}

impl<S: EntityStore> VersionRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, retry: RetryConfig::default(), events: Arc::new(LogEventSink) }
    }

    pub fn with_config(store: Arc<S>, retry: RetryConfig, events: Arc<dyn EventSink>) -> Self {
        Self { store, retry, events }
    }

    /// Devuelve la versión borrador única, creándola si no existe.
    ///
    /// Seguro ante callers concurrentes compitiendo por crear el primer
    /// borrador: la lectura ordinaria va primero; si no hay borrador, se
    /// inserta uno bajo aislamiento serializable y se relee con bloqueo.
    /// Cualquier recuento distinto de 1 tras la inserción, o cualquier
    /// conflicto de serialización/unicidad del backend, revierte la
    /// transacción y reintenta la operación completa desde el principio.
    pub fn get_draft_version(&self) -> Result<Version> {
        let mut attempt: u32 = 0;
        loop {
            let existing = self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
                                     Ok(self.store.versions_by_stage(tx, LifecycleStage::Draft, RowLock::None)?.pop())
                                 })?;
            if let Some(version) = existing {
                return Ok(version);
            }

            let created = self.store.transaction(IsolationLevel::Serializable, |tx| {
                let candidate = Version::new(LifecycleStage::Draft);
                self.store.insert_version(tx, &candidate)?;
                // Relectura con bloqueo: si otra inserción ganó la
                // carrera, aquí se ve más de un borrador y la transacción
                // entera se revierte como conflicto.
                let drafts = self.store.versions_by_stage(tx, LifecycleStage::Draft, RowLock::ForUpdate)?;
                if drafts.len() != 1 {
                    return Err(VersioningError::Conflict(format!("{} versiones borrador tras la inserción",
                                                                 drafts.len())));
                }
                Ok(candidate)
            });

            match created {
                Ok(version) => {
                    self.events.emit(&EngineEvent::DraftVersionCreated { version_id: version.id() });
                    return Ok(version);
                }
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if self.retry.max_attempts != 0 && attempt >= self.retry.max_attempts {
                        return Err(e);
                    }
                    self.events.emit(&EngineEvent::DraftCreationRetried { attempt });
                    std::thread::sleep(self.retry.backoff_for(attempt));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Variante que se une a la transacción del caller: busca el borrador
    /// y lo inserta dentro de `tx` si no existe. La detección de carreras
    /// queda a cargo del aislamiento de la transacción externa.
    pub fn draft_version_in(&self, tx: &mut S::Tx) -> Result<Version> {
        if let Some(version) = self.store.versions_by_stage(tx, LifecycleStage::Draft, RowLock::None)?.pop() {
            return Ok(version);
        }
        let candidate = Version::new(LifecycleStage::Draft);
        self.store.insert_version(tx, &candidate)?;
        self.events.emit(&EngineEvent::DraftVersionCreated { version_id: candidate.id() });
        Ok(candidate)
    }

    /// La versión activa única. Cero o más de una es violación de
    /// invariante.
    pub fn get_active_version(&self) -> Result<Version> {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| self.active_version_in(tx))
    }

    /// Variante de `get_active_version` dentro de la transacción dada.
    pub fn active_version_in(&self, tx: &mut S::Tx) -> Result<Version> {
        let mut found = self.store.versions_by_stage(tx, LifecycleStage::Active, RowLock::None)?;
        if found.len() > 1 {
            return Err(VersioningError::Invariant(format!("hay {} versiones activas", found.len())));
        }
        found.pop()
             .ok_or_else(|| VersioningError::Invariant("no hay ninguna versión activa".to_string()))
    }

    pub fn list_all_versions(&self) -> Result<Vec<Version>> {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| self.store.list_versions(tx))
    }

    /// Fuerza una versión concreta a activa: la activa anterior pasa a
    /// obsoleta y el borrador anterior (si existe) a eliminado. No migra
    /// contenido colgante; eso es responsabilidad del caller. Es el
    /// camino simple, distinto de `publish_new_synchronized_version`.
    pub fn set_live(&self, version_id: Uuid) -> Result<Version> {
        let made_live = self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
            let target = self.store
                             .find_version(tx, version_id)?
                             .ok_or_else(|| VersioningError::NotFound(format!("versión {}", version_id)))?;
            let active = self.active_version_in(tx)?;
            for draft in self.store.versions_by_stage(tx, LifecycleStage::Draft, RowLock::None)? {
                self.store.update_version(tx, &draft.with_stage(LifecycleStage::Deleted))?;
            }
            self.store.update_version(tx, &active.with_stage(LifecycleStage::Obsolete))?;
            let live = target.with_stage(LifecycleStage::Active);
            self.store.update_version(tx, &live)?;
            Ok(live)
        })?;
        self.events.emit(&EngineEvent::VersionForcedLive { version_id });
        Ok(made_live)
    }

    /// Publica una versión nueva de todos los programas y preguntas.
    ///
    /// Todo el contenido del borrador pasa a activo; los programas y
    /// preguntas activos que nadie editó en este ciclo se arrastran al
    /// borrador por referencia antes de promoverlo (copy-on-write a
    /// granularidad de versión: publicar cuesta O(contenido no editado)
    /// en altas de pertenencia, sin copiar filas). La activa anterior
    /// pasa a obsoleta. Publicar un borrador sin programas está
    /// prohibido y falla sin reintento.
    pub fn publish_new_synchronized_version(&self) -> Result<Version> {
        let (published, retired) = self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
            let draft = self.store
                            .versions_by_stage(tx, LifecycleStage::Draft, RowLock::None)?
                            .pop()
                            .ok_or_else(|| {
                                VersioningError::Precondition("no hay versión borrador que publicar".to_string())
                            })?;
            let active = self.active_version_in(tx)?;

            let draft_programs = self.store.programs_for_version(tx, draft.id())?;
            if draft_programs.is_empty() {
                return Err(VersioningError::Precondition("la versión borrador debe tener al menos un programa"
                                                             .to_string()));
            }

            // Arrastre de programas activos que no se tocaron en este
            // ciclo de edición: el mismo registro pasa a pertenecer
            // también al borrador.
            let draft_program_names: HashSet<String> =
                draft_programs.iter().map(|p| p.admin_name().to_string()).collect();
            for program in self.store.programs_for_version(tx, active.id())? {
                if !draft_program_names.contains(program.admin_name()) {
                    self.store.add_version_program(tx, draft.id(), program.id())?;
                }
            }

            // Ídem para las preguntas activas sin contraparte en el
            // borrador.
            let draft_question_names: HashSet<String> = self.store
                                                            .questions_for_version(tx, draft.id())?
                                                            .iter()
                                                            .map(|q| q.name().to_string())
                                                            .collect();
            for question in self.store.questions_for_version(tx, active.id())? {
                if !draft_question_names.contains(question.name()) {
                    self.store.add_version_question(tx, draft.id(), question.id())?;
                }
            }

            self.store.update_version(tx, &active.with_stage(LifecycleStage::Obsolete))?;
            self.store.update_version(tx, &draft.with_stage(LifecycleStage::Active))?;

            // Relectura de confirmación de la recién activa.
            let reloaded = self.store
                               .find_version(tx, draft.id())?
                               .filter(Version::is_active)
                               .ok_or_else(|| {
                                   VersioningError::Invariant("la versión publicada no quedó activa".to_string())
                               })?;
            Ok((reloaded, active.id()))
        })?;
        self.events.emit(&EngineEvent::VersionPublished { new_active: published.id(), retired });
        Ok(published)
    }

    /// ¿Pertenece la pregunta a la versión borrador? Si no hay borrador,
    /// no hay pertenencia que comprobar.
    pub fn is_draft_question(&self, question: &Question) -> Result<bool> {
        let id = question.id();
        self.membership_in_stage(LifecycleStage::Draft, move |store, tx, version_id| {
                Ok(store.questions_for_version(tx, version_id)?.iter().any(|q| q.id() == id))
            })
    }

    /// ¿Pertenece el programa a la versión borrador?
    pub fn is_draft_program(&self, program: &Program) -> Result<bool> {
        let id = program.id();
        self.membership_in_stage(LifecycleStage::Draft, move |store, tx, version_id| {
                Ok(store.programs_for_version(tx, version_id)?.iter().any(|p| p.id() == id))
            })
    }

    /// ¿Queda la pregunta fuera de la versión activa?
    pub fn is_inactive_question(&self, question: &Question) -> Result<bool> {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
                let active = self.active_version_in(tx)?;
                Ok(!self.store.questions_for_version(tx, active.id())?.iter().any(|q| q.id() == question.id()))
            })
    }

    /// ¿Queda el programa fuera de la versión activa?
    pub fn is_inactive_program(&self, program: &Program) -> Result<bool> {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
                let active = self.active_version_in(tx)?;
                Ok(!self.store.programs_for_version(tx, active.id())?.iter().any(|p| p.id() == program.id()))
            })
    }

    fn membership_in_stage<F>(&self, stage: LifecycleStage, check: F) -> Result<bool>
        where F: FnOnce(&S, &mut S::Tx, Uuid) -> Result<bool>
    {
        self.store.transaction(IsolationLevel::ReadCommitted, |tx| {
                match self.store.versions_by_stage(tx, stage, RowLock::None)?.pop() {
                    Some(version) => check(self.store.as_ref(), tx, version.id()),
                    None => Ok(false),
                }
            })
    }
}
