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

fn program_with_refs(admin_name: &str, question_ids: &[Uuid]) -> Program {
  let references = question_ids.iter().map(|id| ProgramQuestionDefinition::new(*id)).collect();
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

fn attach_program_to_draft(store: &InMemoryEntityStore, service: &Service, program: &Program) {
  let draft = service.versions().get_draft_version().unwrap();
  store.transaction(IsolationLevel::ReadCommitted, |tx| {
         store.insert_program(tx, program)?;
         store.add_version_program(tx, draft.id(), program.id())
       })
       .unwrap()
}

fn programs_of(store: &InMemoryEntityStore, version_id: Uuid) -> Vec<Program> {
  store.transaction(IsolationLevel::ReadCommitted, |tx| store.programs_for_version(tx, version_id)).unwrap()
}

fn block_question_ids(program: &Program) -> Vec<Uuid> {
  program.definition().block_definitions()[0].question_definitions()
                                             .iter()
                                             .map(|r| r.question_id())
                                             .collect()
}

#[test]
fn draft_program_references_are_repaired_in_order() {
  let (store, service) = setup();
  let name_q = text_question("applicant name", "name");
  let income_q = text_question("income", "income");
  seed_active(&store, &[name_q.clone(), income_q.clone()], &[]);

  // Programa borrador que aún referencia los ids activos.
  let draft_program = program_with_refs("food aid", &[name_q.id(), income_q.id()]);
  attach_program_to_draft(&store, &service, &draft_program);

  // Bifurcar "income" repara el programa borrador en el sitio.
  let edited = income_q.definition().clone();
  let new_income = service.questions().update_or_create_draft(&edited).unwrap();
  assert_ne!(new_income.id(), income_q.id());

  let draft = service.versions().get_draft_version().unwrap();
  let repaired = programs_of(&store, draft.id()).into_iter().find(|p| p.admin_name() == "food aid").unwrap();
  // Mismo programa (sin bifurcar) con las referencias al día y en orden:
  // la pregunta no editada conserva su id, la editada apunta al borrador.
  assert_eq!(repaired.id(), draft_program.id());
  assert_eq!(block_question_ids(&repaired), vec![name_q.id(), new_income.id()]);
}

#[test]
fn active_program_without_draft_counterpart_is_forked() {
  let (store, service) = setup();
  let income_q = text_question("income", "income");
  let housing = program_with_refs("housing", &[income_q.id()]);
  seed_active(&store, &[income_q.clone()], &[housing.clone()]);

  let new_income = service.questions().update_or_create_draft(&income_q.definition().clone()).unwrap();

  // El colaborador bifurcó el programa activo hacia el borrador con las
  // referencias resueltas; el programa activo no se tocó.
  let draft = service.versions().get_draft_version().unwrap();
  let forked = programs_of(&store, draft.id()).into_iter().find(|p| p.admin_name() == "housing").unwrap();
  assert_ne!(forked.id(), housing.id());
  assert_eq!(block_question_ids(&forked), vec![new_income.id()]);

  let active = service.versions().get_active_version().unwrap();
  let untouched = programs_of(&store, active.id()).into_iter().find(|p| p.admin_name() == "housing").unwrap();
  assert_eq!(untouched.id(), housing.id());
  assert_eq!(block_question_ids(&untouched), vec![income_q.id()]);
}

#[test]
fn active_program_with_draft_counterpart_is_left_to_its_draft() {
  let (store, service) = setup();
  let income_q = text_question("income", "income");
  let housing = program_with_refs("housing", &[income_q.id()]);
  seed_active(&store, &[income_q.clone()], &[housing.clone()]);

  // Ya existe un borrador de "housing": el activo no debe bifurcarse otra vez.
  let housing_draft = program_with_refs("housing", &[income_q.id()]);
  attach_program_to_draft(&store, &service, &housing_draft);

  service.questions().update_or_create_draft(&income_q.definition().clone()).unwrap();

  let draft = service.versions().get_draft_version().unwrap();
  let drafts: Vec<_> = programs_of(&store, draft.id()).into_iter().filter(|p| p.admin_name() == "housing").collect();
  assert_eq!(drafts.len(), 1);
  assert_eq!(drafts[0].id(), housing_draft.id());
}

#[test]
fn repair_rejects_programs_outside_the_draft() {
  let (store, service) = setup();
  let income_q = text_question("income", "income");
  let housing = program_with_refs("housing", &[income_q.id()]);
  seed_active(&store, &[income_q], &[housing.clone()]);

  match service.program_updater().update_question_versions(&housing) {
    Err(VersioningError::Precondition(_)) => {}
    other => panic!("expected precondition error, got: {:?}", other.map(|p| p.id())),
  }
}

#[test]
fn repair_failure_rolls_back_the_whole_edit() {
  let (store, service) = setup();
  let income_q = text_question("income", "income");
  let active = seed_active(&store, &[income_q.clone()], &[]);

  // Programa borrador con una referencia rota además de la válida.
  let broken = program_with_refs("broken", &[income_q.id(), Uuid::new_v4()]);
  attach_program_to_draft(&store, &service, &broken);

  match service.questions().update_or_create_draft(&income_q.definition().clone()) {
    Err(VersioningError::Invariant(_)) => {}
    other => panic!("expected invariant error, got: {:?}", other.map(|q| q.id())),
  }

  // Nada quedó persistido: el borrador no contiene la bifurcación.
  let draft = service.versions().get_draft_version().unwrap();
  let draft_questions =
    store.transaction(IsolationLevel::ReadCommitted, |tx| store.questions_for_version(tx, draft.id())).unwrap();
  assert!(draft_questions.is_empty());
  let active_questions =
    store.transaction(IsolationLevel::ReadCommitted, |tx| store.questions_for_version(tx, active.id())).unwrap();
  assert_eq!(active_questions.len(), 1);
}

#[test]
fn membership_helpers_reflect_draft_and_active_sets() {
  let (store, service) = setup();
  let income_q = text_question("income", "income");
  let housing = program_with_refs("housing", &[income_q.id()]);
  seed_active(&store, &[income_q.clone()], &[housing.clone()]);

  assert!(!service.versions().is_draft_question(&income_q).unwrap());
  assert!(!service.versions().is_inactive_question(&income_q).unwrap());
  assert!(!service.versions().is_draft_program(&housing).unwrap());
  assert!(!service.versions().is_inactive_program(&housing).unwrap());

  let new_income = service.questions().update_or_create_draft(&income_q.definition().clone()).unwrap();
  assert!(service.versions().is_draft_question(&new_income).unwrap());
  assert!(service.versions().is_inactive_question(&new_income).unwrap());
}
