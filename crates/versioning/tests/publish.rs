use std::sync::Arc;
use tramite_domain::{BlockDefinition, LifecycleStage, Program, ProgramDefinition, ProgramQuestionDefinition,
                     Question, QuestionDefinition, QuestionType, Version};
use uuid::Uuid;
use versioning::stubs::{InMemoryEntityStore, InMemoryProgramRepository};
use versioning::{EntityStore, IsolationLevel, NullEventSink, RetryConfig, VersioningError, VersioningService};

type Service = VersioningService<InMemoryEntityStore, InMemoryProgramRepository>;

fn setup() -> (Arc<InMemoryEntityStore>, Service) {
  let store = Arc::new(InMemoryEntityStore::new());
  let service = VersioningService::with_config(store.clone(),
                                               Arc::new(InMemoryProgramRepository::new()),
                                               RetryConfig::default(),
                                               Arc::new(NullEventSink));
  (store, service)
}

fn text_question(name: &str, path: &str) -> Question {
  Question::from_definition(QuestionDefinition::new(name, "", format!("¿{}?", name), QuestionType::Text, None, path)
    .unwrap())
}

fn program(admin_name: &str, questions: &[&Question]) -> Program {
  let references = questions.iter().map(|q| ProgramQuestionDefinition::from_question(q)).collect();
  let block = BlockDefinition::new(1, "Bloque 1", "", references);
  Program::from_definition(ProgramDefinition::new(admin_name, "", vec![block]).unwrap())
}

fn seed_active(store: &InMemoryEntityStore, questions: &[Question], programs: &[Program]) -> Version {
  store.transaction(IsolationLevel::ReadCommitted, |tx| {
         let active = Version::new(LifecycleStage::Active);
         store.insert_version(tx, &active)?;
         for q in questions {
           store.insert_question(tx, q)?;
           store.add_version_question(tx, active.id(), q.id())?;
         }
         for p in programs {
           store.insert_program(tx, p)?;
           store.add_version_program(tx, active.id(), p.id())?;
         }
         Ok(active)
       })
       .unwrap()
}

fn attach_to_draft(store: &InMemoryEntityStore, service: &Service, programs: &[Program], questions: &[Question]) {
  let draft = service.versions().get_draft_version().unwrap();
  store.transaction(IsolationLevel::ReadCommitted, |tx| {
         for p in programs {
           store.insert_program(tx, p)?;
           store.add_version_program(tx, draft.id(), p.id())?;
         }
         for q in questions {
           store.insert_question(tx, q)?;
           store.add_version_question(tx, draft.id(), q.id())?;
         }
         Ok(())
       })
       .unwrap()
}

fn programs_of(store: &InMemoryEntityStore, version_id: Uuid) -> Vec<Program> {
  store.transaction(IsolationLevel::ReadCommitted, |tx| store.programs_for_version(tx, version_id)).unwrap()
}

fn questions_of(store: &InMemoryEntityStore, version_id: Uuid) -> Vec<Question> {
  store.transaction(IsolationLevel::ReadCommitted, |tx| store.questions_for_version(tx, version_id)).unwrap()
}

#[test]
fn publish_carries_forward_untouched_content() {
  let (store, service) = setup();
  let income = text_question("income", "income");
  let rent = text_question("rent", "rent");
  let food_aid = program("food aid", &[&income]);
  let housing = program("housing", &[&rent]);
  let active = seed_active(&store, &[income.clone(), rent.clone()], &[food_aid.clone(), housing.clone()]);

  // Ciclo de edición: sólo "food aid" y la pregunta "income" tienen
  // borrador; "housing" y "rent" quedan intactos.
  let edited_income = text_question("income", "income");
  let edited_food_aid = program("food aid", &[&edited_income]);
  attach_to_draft(&store, &service, &[edited_food_aid.clone()], &[edited_income.clone()]);
  let draft = service.versions().get_draft_version().unwrap();

  let published = service.versions().publish_new_synchronized_version().unwrap();
  assert_eq!(published.id(), draft.id());
  assert!(published.is_active());

  // La nueva activa contiene el programa editado y el arrastrado.
  let published_programs = programs_of(&store, published.id());
  assert_eq!(published_programs.len(), 2);
  assert!(published_programs.iter().any(|p| p.id() == edited_food_aid.id()));
  assert!(published_programs.iter().any(|p| p.id() == housing.id()));

  // Ídem preguntas: la editada sustituye a la activa del mismo nombre,
  // la no editada se arrastra por referencia.
  let published_questions = questions_of(&store, published.id());
  assert_eq!(published_questions.len(), 2);
  assert!(published_questions.iter().any(|q| q.id() == edited_income.id()));
  assert!(!published_questions.iter().any(|q| q.id() == income.id()));
  assert!(published_questions.iter().any(|q| q.id() == rent.id()));

  // La activa anterior queda obsoleta, con su contenido intacto.
  let versions = service.versions().list_all_versions().unwrap();
  let retired = versions.iter().find(|v| v.id() == active.id()).unwrap();
  assert_eq!(retired.stage(), LifecycleStage::Obsolete);
  assert_eq!(programs_of(&store, active.id()).len(), 2);
}

#[test]
fn publish_rejects_empty_draft() {
  let (store, service) = setup();
  let income = text_question("income", "income");
  let food_aid = program("food aid", &[&income]);
  let active = seed_active(&store, &[income], &[food_aid]);
  let draft = service.versions().get_draft_version().unwrap();

  match service.versions().publish_new_synchronized_version() {
    Err(VersioningError::Precondition(_)) => {}
    other => panic!("expected precondition error, got: {:?}", other.map(|v| v.id())),
  }

  // Las etapas no cambian.
  let versions = service.versions().list_all_versions().unwrap();
  assert_eq!(versions.iter().find(|v| v.id() == draft.id()).unwrap().stage(), LifecycleStage::Draft);
  assert_eq!(versions.iter().find(|v| v.id() == active.id()).unwrap().stage(), LifecycleStage::Active);
}

#[test]
fn publish_without_draft_version_is_a_precondition_error() {
  let (store, service) = setup();
  let income = text_question("income", "income");
  let food_aid = program("food aid", &[&income]);
  seed_active(&store, &[income], &[food_aid]);

  match service.versions().publish_new_synchronized_version() {
    Err(VersioningError::Precondition(_)) => {}
    other => panic!("expected precondition error, got: {:?}", other.map(|v| v.id())),
  }
}

#[test]
fn published_draft_becomes_the_unique_active() {
  let (store, service) = setup();
  let income = text_question("income", "income");
  let food_aid = program("food aid", &[&income]);
  seed_active(&store, &[income], &[food_aid]);

  let edited_income = text_question("income", "income");
  let edited_food_aid = program("food aid", &[&edited_income]);
  attach_to_draft(&store, &service, &[edited_food_aid], &[edited_income]);

  let published = service.versions().publish_new_synchronized_version().unwrap();
  let active_now = service.versions().get_active_version().unwrap();
  assert_eq!(active_now.id(), published.id());

  // Tras publicar ya no hay borrador; el siguiente acceso crea uno nuevo.
  let next_draft = service.versions().get_draft_version().unwrap();
  assert_ne!(next_draft.id(), published.id());
}
