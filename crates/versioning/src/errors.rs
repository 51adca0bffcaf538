// Archivo: errors.rs
// Propósito: definir los errores del motor de versionado y el alias
// Result<T> usado por las APIs del crate. La taxonomía separa la
// contención transitoria (reintentable) de las violaciones fatales.
use thiserror::Error;
use tramite_domain::DomainError;

/// Errores del motor de versionado.
///
/// - `NotFound`: entidad no encontrada.
/// - `Conflict`: contención transitoria (inserciones en carrera, fallos de
///   serialización, violaciones de unicidad). Es el único error que el
///   motor reintenta, y sólo en la creación del borrador.
/// - `Precondition`: el caller llamó con un estado de entrada inválido
///   (p. ej. publicar un borrador sin programas). Fatal; no se reintenta.
/// - `Invariant`: una suposición interna dejó de cumplirse (p. ej. más de
///   una versión activa). Indica bug o corrupción de datos.
/// - `ConcurrentEdit`: una mutación concurrente invalidó la operación en
///   curso; el caller debe releer antes de reintentar.
/// - `Storage`: error del almacenamiento externo.
#[derive(Error, Debug)]
pub enum VersioningError {
    /// Entidad no encontrada (versión, pregunta o programa).
    #[error("No encontrado: {0}")]
    NotFound(String),
    /// Contención transitoria; resuelve sola al reintentar.
    #[error("Conflicto: {0}")]
    Conflict(String),
    /// Violación de precondición del caller.
    #[error("Precondición violada: {0}")]
    Precondition(String),
    /// Invariante interna rota; no es recuperable.
    #[error("Invariante violada: {0}")]
    Invariant(String),
    /// Edición concurrente detectada; releer y reintentar desde fuera.
    #[error("Edición concurrente: {0}")]
    ConcurrentEdit(String),
    /// Error genérico de almacenamiento (BD, pool, etc.).
    #[error("Error de almacenamiento: {0}")]
    Storage(String),
    /// Error del dominio (validación, serialización).
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl VersioningError {
    /// ¿Merece la pena reintentar la operación completa?
    pub fn is_transient(&self) -> bool {
        matches!(self, VersioningError::Conflict(_))
    }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, VersioningError>;
