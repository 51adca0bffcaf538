// question.rs
use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tipos de pregunta soportados por el formulario de solicitud.
///
/// `Enumerator` es el único tipo con semántica propia dentro del motor de
/// versionado: sus preguntas repetidas dependientes llevan un
/// `enumerator_id` apuntando a ella.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
  Address,
  Checkbox,
  Dropdown,
  Email,
  FileUpload,
  Name,
  Number,
  Radio,
  Static,
  Text,
  Enumerator,
}

impl QuestionType {
  pub fn is_enumerator(&self) -> bool {
    matches!(self, QuestionType::Enumerator)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionType::Address => "address",
      QuestionType::Checkbox => "checkbox",
      QuestionType::Dropdown => "dropdown",
      QuestionType::Email => "email",
      QuestionType::FileUpload => "fileupload",
      QuestionType::Name => "name",
      QuestionType::Number => "number",
      QuestionType::Radio => "radio",
      QuestionType::Static => "static",
      QuestionType::Text => "text",
      QuestionType::Enumerator => "enumerator",
    }
  }
}

impl std::str::FromStr for QuestionType {
  type Err = DomainError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "address" => Ok(QuestionType::Address),
      "checkbox" => Ok(QuestionType::Checkbox),
      "dropdown" => Ok(QuestionType::Dropdown),
      "email" => Ok(QuestionType::Email),
      "fileupload" => Ok(QuestionType::FileUpload),
      "name" => Ok(QuestionType::Name),
      "number" => Ok(QuestionType::Number),
      "radio" => Ok(QuestionType::Radio),
      "static" => Ok(QuestionType::Static),
      "text" => Ok(QuestionType::Text),
      "enumerator" => Ok(QuestionType::Enumerator),
      other => Err(DomainError::ValidationError(format!("Tipo de pregunta desconocido: {}", other))),
    }
  }
}

impl fmt::Display for QuestionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Definición de una pregunta: el contenido editable por administradores.
///
/// `id` es el id de la pregunta persistida de la que se leyó esta
/// definición (`None` para definiciones nuevas que nunca se guardaron).
/// `enumerator_id` apunta a la pregunta enumeradora madre cuando esta
/// pregunta es repetida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionDefinition {
  id: Option<Uuid>,
  name: String,
  description: String,
  question_text: String,
  question_type: QuestionType,
  enumerator_id: Option<Uuid>,
  path_segment: String,
}

impl QuestionDefinition {
  pub fn new(name: impl Into<String>,
             description: impl Into<String>,
             question_text: impl Into<String>,
             question_type: QuestionType,
             enumerator_id: Option<Uuid>,
             path_segment: impl Into<String>)
             -> Result<Self, DomainError> {
    let name = name.into();
    let path_segment = path_segment.into();
    if name.trim().is_empty() {
      return Err(DomainError::ValidationError("El nombre de la pregunta no puede estar vacío".to_string()));
    }
    if path_segment.trim().is_empty() {
      return Err(DomainError::ValidationError("El segmento de ruta de la pregunta no puede estar vacío".to_string()));
    }
    Ok(Self { id: None,
              name,
              description: description.into(),
              question_text: question_text.into(),
              question_type,
              enumerator_id,
              path_segment })
  }

  /// Copia de la definición con el id persistido dado.
  pub fn with_id(&self, id: Option<Uuid>) -> Self {
    let mut def = self.clone();
    def.id = id;
    def
  }

  /// Copia de la definición apuntando a otra pregunta enumeradora.
  pub fn with_enumerator_id(&self, enumerator_id: Option<Uuid>) -> Self {
    let mut def = self.clone();
    def.enumerator_id = enumerator_id;
    def
  }

  /// Dos definiciones entran en conflicto si comparten nombre, o si
  /// comparten a la vez enumerador y segmento de ruta. Pensado para
  /// definiciones nuevas: una edición colisiona trivialmente con sus
  /// propias versiones anteriores.
  pub fn conflicts_with(&self, other: &QuestionDefinition) -> bool {
    self.name == other.name
    || (self.enumerator_id == other.enumerator_id && self.path_segment == other.path_segment)
  }

  pub fn is_enumerator(&self) -> bool {
    self.question_type.is_enumerator()
  }

  pub fn id(&self) -> Option<Uuid> {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn question_text(&self) -> &str {
    &self.question_text
  }

  pub fn question_type(&self) -> QuestionType {
    self.question_type
  }

  pub fn enumerator_id(&self) -> Option<Uuid> {
    self.enumerator_id
  }

  pub fn path_segment(&self) -> &str {
    &self.path_segment
  }
}

/// Pregunta persistida: identidad inmutable más su definición.
///
/// Editar una pregunta nunca muta una fila activa; el motor o bien
/// actualiza el borrador existente (mismo id) o inserta una pregunta
/// nueva con id fresco.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
  id: Uuid,
  definition: QuestionDefinition,
}

impl Question {
  /// Crea una pregunta nueva con id fresco a partir de una definición.
  /// El id previo de la definición se descarta.
  pub fn from_definition(definition: QuestionDefinition) -> Self {
    let id = Uuid::new_v4();
    Self { id, definition: definition.with_id(Some(id)) }
  }

  /// Reconstruye una pregunta desde almacenamiento con su id conocido.
  pub fn from_parts(id: Uuid, definition: QuestionDefinition) -> Self {
    Self { id, definition: definition.with_id(Some(id)) }
  }

  /// Copia de la pregunta con la definición reemplazada, conservando el
  /// id. Es la operación de "editar el borrador en el sitio".
  pub fn with_definition(&self, definition: QuestionDefinition) -> Self {
    Self { id: self.id, definition: definition.with_id(Some(self.id)) }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn definition(&self) -> &QuestionDefinition {
    &self.definition
  }

  pub fn name(&self) -> &str {
    self.definition.name()
  }
}

impl fmt::Display for Question {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f,
           "Question(id: {}, name: {}, type: {})",
           self.id,
           self.definition.name(),
           self.definition.question_type())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn def(name: &str, path: &str, enumerator_id: Option<Uuid>) -> QuestionDefinition {
    QuestionDefinition::new(name, "", format!("¿{}?", name), QuestionType::Text, enumerator_id, path).unwrap()
  }

  #[test]
  fn empty_name_is_rejected() {
    let result = QuestionDefinition::new("", "", "", QuestionType::Text, None, "path");
    assert!(result.is_err());
  }

  #[test]
  fn empty_path_segment_is_rejected() {
    let result = QuestionDefinition::new("income", "", "", QuestionType::Text, None, "  ");
    assert!(result.is_err());
  }

  #[test]
  fn conflict_by_name() {
    let a = def("income", "income", None);
    let b = def("income", "other_path", None);
    assert!(a.conflicts_with(&b));
  }

  #[test]
  fn conflict_by_enumerator_and_path() {
    // Sin enumerador en ambas: mismo segmento de ruta implica conflicto.
    let a = def("income", "income", None);
    let b = def("income2", "income", None);
    assert!(a.conflicts_with(&b));
  }

  #[test]
  fn no_conflict_with_distinct_path_and_name() {
    let a = def("income", "income", None);
    let b = def("rent", "rent", None);
    assert!(!a.conflicts_with(&b));
  }

  #[test]
  fn same_path_under_distinct_enumerators_does_not_conflict() {
    let a = def("child name", "name", Some(Uuid::new_v4()));
    let b = def("pet name", "name", Some(Uuid::new_v4()));
    assert!(!a.conflicts_with(&b));
  }

  #[test]
  fn from_definition_assigns_fresh_id() {
    let q = Question::from_definition(def("income", "income", None));
    assert_eq!(q.definition().id(), Some(q.id()));
  }

  #[test]
  fn with_definition_keeps_id() {
    let q = Question::from_definition(def("income", "income", None));
    let updated = q.with_definition(def("income", "income_v2", None));
    assert_eq!(updated.id(), q.id());
    assert_eq!(updated.definition().path_segment(), "income_v2");
  }
}
