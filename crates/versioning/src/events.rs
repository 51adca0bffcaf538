// Archivo: events.rs
// Propósito: eventos de negocio tipados del motor de versionado y el
// sink que los recibe. El sink por defecto reenvía al facade `log` con
// la severidad que corresponde a cada evento; las operaciones ordinarias
// exitosas nunca se emiten a nivel error.
use serde::Serialize;
use uuid::Uuid;

/// Evento de negocio emitido por el motor. Serializable para poder
/// reenviarse tal cual a un pipeline de telemetría externo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineEvent {
    /// Se creó una versión borrador nueva.
    DraftVersionCreated { version_id: Uuid },
    /// La creación del borrador chocó con otra y va a reintentarse.
    DraftCreationRetried { attempt: u32 },
    /// Un borrador de pregunta existente se actualizó en el sitio.
    DraftQuestionUpdated { question_id: Uuid, name: String },
    /// Una pregunta se bifurcó a un borrador nuevo con id fresco.
    QuestionForked { old_id: Option<Uuid>, new_id: Uuid, name: String },
    /// Una bifurcación de enumeradora encoló preguntas repetidas.
    RepeatedQuestionsCascaded { enumerator_name: String, affected: usize },
    /// Se repararon en el sitio las referencias de un programa borrador.
    ProgramReferencesUpdated { program_id: Uuid, admin_name: String },
    /// Se pidió al colaborador externo el borrador de un programa activo.
    ProgramDraftRequested { admin_name: String },
    /// Una publicación promovió el borrador a activo.
    VersionPublished { new_active: Uuid, retired: Uuid },
    /// Una versión arbitraria se forzó a activa.
    VersionForcedLive { version_id: Uuid },
}

/// Receptor de eventos de negocio. Desacopla el motor de la librería de
/// logging concreta.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &EngineEvent);
}

/// Sink por defecto: reenvía al facade `log`.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: &EngineEvent) {
        match event {
            EngineEvent::DraftVersionCreated { version_id } => {
                log::info!("versión borrador creada: {}", version_id);
            }
            EngineEvent::DraftCreationRetried { attempt } => {
                log::warn!("conflicto creando la versión borrador; reintento {}", attempt);
            }
            EngineEvent::DraftQuestionUpdated { question_id, name } => {
                log::debug!("borrador de pregunta '{}' actualizado ({})", name, question_id);
            }
            EngineEvent::QuestionForked { old_id, new_id, name } => {
                log::debug!("pregunta '{}' bifurcada a borrador {} (anterior: {:?})", name, new_id, old_id);
            }
            EngineEvent::RepeatedQuestionsCascaded { enumerator_name, affected } => {
                log::debug!("cascada de la enumeradora '{}': {} preguntas repetidas", enumerator_name, affected);
            }
            EngineEvent::ProgramReferencesUpdated { program_id, admin_name } => {
                log::debug!("referencias del programa borrador '{}' reparadas ({})", admin_name, program_id);
            }
            EngineEvent::ProgramDraftRequested { admin_name } => {
                log::debug!("borrador solicitado para el programa activo '{}'", admin_name);
            }
            EngineEvent::VersionPublished { new_active, retired } => {
                log::info!("versión {} publicada; {} pasa a obsoleta", new_active, retired);
            }
            EngineEvent::VersionForcedLive { version_id } => {
                log::info!("versión {} forzada a activa", version_id);
            }
        }
    }
}

/// Sink que descarta todos los eventos. Útil en pruebas.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &EngineEvent) {}
}
