//! Crate `versioning` — motor de versionado y publicación de borradores
//!
//! Este crate define el contrato de almacenamiento transaccional
//! (`EntityStore`), los tres componentes del motor (`VersionRepository`,
//! `QuestionRepository`, `ProgramReferenceUpdater`), los eventos de
//! negocio tipados (`EngineEvent`/`EventSink`) y una implementación en
//! memoria útil para pruebas (`InMemoryEntityStore`). También expone un
//! servicio orquestador `VersioningService` que cablea los componentes
//! sobre un mismo almacén.
//!
//! Diseño resumido:
//! - Un solo borrador: a lo sumo una versión `Draft` existe a la vez,
//!   impuesto por inserción serializable con relectura bloqueante y
//!   reintento configurable ante conflicto.
//! - Bifurcar, no mutar: editar una pregunta sin borrador inserta una
//!   fila nueva con id fresco enganchada al borrador; la copia activa no
//!   se toca. Editar una pregunta con borrador actualiza el borrador en
//!   el sitio, conservando el id.
//! - Cascada de enumeradoras: bifurcar una pregunta enumeradora reescribe
//!   el `enumerator_id` de sus preguntas repetidas, por lista de trabajo
//!   iterativa a cualquier profundidad.
//! - Publicación atómica: el borrador se promociona a activo arrastrando
//!   por referencia el contenido activo no editado; la activa anterior
//!   pasa a obsoleta; todo dentro de una única transacción.
//!
//! Ejemplo rápido:
//! ```rust
//! use std::sync::Arc;
//! use versioning::stubs::{InMemoryEntityStore, InMemoryProgramRepository};
//! use versioning::VersioningService;
//! let store = Arc::new(InMemoryEntityStore::new());
//! let service = VersioningService::new(store, Arc::new(InMemoryProgramRepository::new()));
//! let draft = service.versions().get_draft_version().unwrap();
//! assert!(draft.is_draft());
//! ```
pub mod errors;
pub mod events;
pub mod program_updater;
pub mod question_repository;
pub mod service;
pub mod store;
pub mod stubs;
pub mod version_repository;

pub use errors::*;
pub use events::*;
pub use program_updater::*;
pub use question_repository::*;
pub use service::*;
pub use store::*;
pub use stubs::*;
pub use version_repository::*;
