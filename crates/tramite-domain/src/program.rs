// program.rs
use crate::{DomainError, Question};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Referencia de una pregunta dentro de un bloque de programa. Lleva una
/// instantánea del id de la pregunta; el id puede quedar obsoleto cuando
/// la pregunta se bifurca a un borrador nuevo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramQuestionDefinition {
  question_id: Uuid,
}

impl ProgramQuestionDefinition {
  pub fn new(question_id: Uuid) -> Self {
    Self { question_id }
  }

  pub fn from_question(question: &Question) -> Self {
    Self { question_id: question.id() }
  }

  pub fn question_id(&self) -> Uuid {
    self.question_id
  }
}

/// Bloque de un programa: una secuencia ordenada de referencias a
/// preguntas que se muestran juntas al solicitante.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
  id: i64,
  name: String,
  description: String,
  question_definitions: Vec<ProgramQuestionDefinition>,
}

impl BlockDefinition {
  pub fn new(id: i64,
             name: impl Into<String>,
             description: impl Into<String>,
             question_definitions: Vec<ProgramQuestionDefinition>)
             -> Self {
    Self { id, name: name.into(), description: description.into(), question_definitions }
  }

  /// Copia del bloque con la lista de referencias reemplazada. El orden
  /// de la lista nueva se conserva tal cual.
  pub fn with_question_definitions(&self, question_definitions: Vec<ProgramQuestionDefinition>) -> Self {
    Self { id: self.id,
           name: self.name.clone(),
           description: self.description.clone(),
           question_definitions }
  }

  pub fn has_question(&self, question_id: Uuid) -> bool {
    self.question_definitions.iter().any(|q| q.question_id() == question_id)
  }

  pub fn id(&self) -> i64 {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn question_definitions(&self) -> &[ProgramQuestionDefinition] {
    &self.question_definitions
  }
}

/// Definición de un programa: el contenido editable por administradores.
/// `admin_name` identifica el programa entre versiones; dos filas de
/// programa en versiones distintas con el mismo `admin_name` son el mismo
/// programa lógico.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramDefinition {
  id: Option<Uuid>,
  admin_name: String,
  admin_description: String,
  block_definitions: Vec<BlockDefinition>,
}

impl ProgramDefinition {
  pub fn new(admin_name: impl Into<String>,
             admin_description: impl Into<String>,
             block_definitions: Vec<BlockDefinition>)
             -> Result<Self, DomainError> {
    let admin_name = admin_name.into();
    if admin_name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre administrativo del programa no puede estar vacío".to_string()));
    }
    Ok(Self { id: None, admin_name, admin_description: admin_description.into(), block_definitions })
  }

  pub fn with_id(&self, id: Option<Uuid>) -> Self {
    let mut def = self.clone();
    def.id = id;
    def
  }

  /// Copia de la definición con los bloques reemplazados, en el mismo
  /// orden en que se pasan.
  pub fn with_block_definitions(&self, block_definitions: Vec<BlockDefinition>) -> Self {
    let mut def = self.clone();
    def.block_definitions = block_definitions;
    def
  }

  pub fn has_question(&self, question_id: Uuid) -> bool {
    self.block_definitions.iter().any(|b| b.has_question(question_id))
  }

  pub fn has_any_question(&self, question_ids: &[Uuid]) -> bool {
    question_ids.iter().any(|id| self.has_question(*id))
  }

  /// Hash del trazado de bloques: los ids de pregunta referenciados, en
  /// orden. Dos versiones de programa con el mismo hash referencian
  /// exactamente las mismas filas de pregunta.
  pub fn block_layout_hash(&self) -> String {
    let mut hasher = Sha256::new();
    for block in &self.block_definitions {
      hasher.update(block.id().to_le_bytes());
      for q in block.question_definitions() {
        hasher.update(q.question_id().as_bytes());
      }
    }
    format!("{:x}", hasher.finalize())
  }

  pub fn id(&self) -> Option<Uuid> {
    self.id
  }

  pub fn admin_name(&self) -> &str {
    &self.admin_name
  }

  pub fn admin_description(&self) -> &str {
    &self.admin_description
  }

  pub fn block_definitions(&self) -> &[BlockDefinition] {
    &self.block_definitions
  }
}

/// Programa persistido: identidad inmutable más su definición.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
  id: Uuid,
  definition: ProgramDefinition,
}

impl Program {
  /// Crea un programa nuevo con id fresco a partir de una definición.
  pub fn from_definition(definition: ProgramDefinition) -> Self {
    let id = Uuid::new_v4();
    Self { id, definition: definition.with_id(Some(id)) }
  }

  /// Reconstruye un programa desde almacenamiento con su id conocido.
  pub fn from_parts(id: Uuid, definition: ProgramDefinition) -> Self {
    Self { id, definition: definition.with_id(Some(id)) }
  }

  /// Copia del programa con la definición reemplazada, conservando el id.
  pub fn with_definition(&self, definition: ProgramDefinition) -> Self {
    Self { id: self.id, definition: definition.with_id(Some(self.id)) }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn definition(&self) -> &ProgramDefinition {
    &self.definition
  }

  pub fn admin_name(&self) -> &str {
    self.definition.admin_name()
  }
}

impl fmt::Display for Program {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f,
           "Program(id: {}, admin_name: {}, blocks: {})",
           self.id,
           self.definition.admin_name(),
           self.definition.block_definitions().len())
  }
}
