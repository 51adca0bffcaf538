// lifecycle.rs
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Etapa de ciclo de vida de una versión de contenido.
///
/// Sólo puede existir una versión `Draft` a la vez, y exactamente una
/// `Active` (salvo transitoriamente durante una publicación).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleStage {
  Draft,
  Active,
  Obsolete,
  Deleted,
}

impl LifecycleStage {
  pub fn as_str(&self) -> &'static str {
    match self {
      LifecycleStage::Draft => "draft",
      LifecycleStage::Active => "active",
      LifecycleStage::Obsolete => "obsolete",
      LifecycleStage::Deleted => "deleted",
    }
  }
}

impl FromStr for LifecycleStage {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "draft" => Ok(LifecycleStage::Draft),
      "active" => Ok(LifecycleStage::Active),
      "obsolete" => Ok(LifecycleStage::Obsolete),
      "deleted" => Ok(LifecycleStage::Deleted),
      other => Err(DomainError::ValidationError(format!("Etapa de ciclo de vida desconocida: {}", other))),
    }
  }
}

impl fmt::Display for LifecycleStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
