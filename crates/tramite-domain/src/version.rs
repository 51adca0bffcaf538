// version.rs
use crate::LifecycleStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Versión: un corte con nombre del contenido (preguntas y programas) en
/// una etapa de ciclo de vida. La pertenencia versión↔pregunta y
/// versión↔programa vive en relaciones propias del almacenamiento, no
/// aquí: una versión nunca es dueña del ciclo de vida de su contenido,
/// sólo de la agrupación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
  id: Uuid,
  stage: LifecycleStage,
  created_at: DateTime<Utc>,
}

impl Version {
  pub fn new(stage: LifecycleStage) -> Self {
    Self { id: Uuid::new_v4(), stage, created_at: Utc::now() }
  }

  /// Reconstruye una versión desde almacenamiento.
  pub fn from_parts(id: Uuid, stage: LifecycleStage, created_at: DateTime<Utc>) -> Self {
    Self { id, stage, created_at }
  }

  /// Copia de la versión en otra etapa, conservando identidad. Las
  /// transiciones Draft→Active y Active→Obsolete ocurren juntas durante
  /// una publicación.
  pub fn with_stage(&self, stage: LifecycleStage) -> Self {
    Self { id: self.id, stage, created_at: self.created_at }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn stage(&self) -> LifecycleStage {
    self.stage
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn is_draft(&self) -> bool {
    self.stage == LifecycleStage::Draft
  }

  pub fn is_active(&self) -> bool {
    self.stage == LifecycleStage::Active
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Version(id: {}, stage: {})", self.id, self.stage)
  }
}
