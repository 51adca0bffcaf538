mod errors;
mod lifecycle;
mod program;
mod question;
mod version;

pub use errors::DomainError;
pub use lifecycle::LifecycleStage;
pub use program::{BlockDefinition, Program, ProgramDefinition, ProgramQuestionDefinition};
pub use question::{Question, QuestionDefinition, QuestionType};
pub use version::Version;
