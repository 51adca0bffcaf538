use std::sync::Arc;
use tramite_domain::{LifecycleStage, Question, QuestionDefinition, QuestionType, Version};
use uuid::Uuid;
use versioning::stubs::{InMemoryEntityStore, InMemoryProgramRepository};
use versioning::{EntityStore, IsolationLevel, NullEventSink, RetryConfig, VersioningService};

type Service = VersioningService<InMemoryEntityStore, InMemoryProgramRepository>;

fn setup() -> (Arc<InMemoryEntityStore>, Service) {
  let store = Arc::new(InMemoryEntityStore::new());
  let service = VersioningService::with_config(store.clone(),
                                               Arc::new(InMemoryProgramRepository::new()),
                                               RetryConfig::default(),
                                               Arc::new(NullEventSink));
  (store, service)
}

fn def(name: &str, path: &str, question_type: QuestionType, enumerator_id: Option<Uuid>) -> QuestionDefinition {
  QuestionDefinition::new(name, "", format!("¿{}?", name), question_type, enumerator_id, path).unwrap()
}

fn seed_active_questions(store: &InMemoryEntityStore, questions: &[Question]) -> Version {
  store.transaction(IsolationLevel::ReadCommitted, |tx| {
         let active = Version::new(LifecycleStage::Active);
         store.insert_version(tx, &active)?;
         for q in questions {
           store.insert_question(tx, q)?;
           store.add_version_question(tx, active.id(), q.id())?;
         }
         Ok(active)
       })
       .unwrap()
}

fn questions_of(store: &InMemoryEntityStore, version_id: Uuid) -> Vec<Question> {
  store.transaction(IsolationLevel::ReadCommitted, |tx| store.questions_for_version(tx, version_id)).unwrap()
}

#[test]
fn editing_active_question_forks_a_new_id() {
  let (store, service) = setup();
  let original = Question::from_definition(def("income", "income", QuestionType::Text, None));
  let active = seed_active_questions(&store, &[original.clone()]);

  // Edición sobre la definición persistida (lleva el id original).
  let edited = def("income", "income", QuestionType::Text, None).with_id(Some(original.id()));
  let draft_question = service.questions().update_or_create_draft(&edited).unwrap();

  // Id fresco, sin tocar la copia activa.
  assert_ne!(draft_question.id(), original.id());
  let active_questions = questions_of(&store, active.id());
  assert_eq!(active_questions.len(), 1);
  assert_eq!(active_questions[0], original);

  // La pregunta nueva sólo pertenece al borrador.
  let draft = service.versions().get_draft_version().unwrap();
  let draft_questions = questions_of(&store, draft.id());
  assert_eq!(draft_questions.len(), 1);
  assert_eq!(draft_questions[0].id(), draft_question.id());
  assert!(!active_questions.iter().any(|q| q.id() == draft_question.id()));
}

#[test]
fn editing_existing_draft_reuses_its_id() {
  let (_store, service) = setup();
  let original = def("income", "income", QuestionType::Text, None);
  let first = service.questions().update_or_create_draft(&original).unwrap();

  let revised = QuestionDefinition::new("income", "", "¿Ingresos mensuales?", QuestionType::Text, None, "income")
    .unwrap()
    .with_id(first.definition().id());
  let second = service.questions().update_or_create_draft(&revised).unwrap();

  assert_eq!(second.id(), first.id());
  assert_eq!(second.definition().question_text(), "¿Ingresos mensuales?");
}

#[test]
fn enumerator_fork_cascades_to_repeated_questions() {
  let (store, service) = setup();
  let household = Question::from_definition(def("household members", "household", QuestionType::Enumerator, None));
  let member_name = Question::from_definition(def("member name", "name", QuestionType::Text, Some(household.id())));
  let active = seed_active_questions(&store, &[household.clone(), member_name.clone()]);

  let old_ids = store.transaction(IsolationLevel::ReadCommitted, |tx| {
                       service.questions()
                              .update_or_create_draft_questions_in(tx, household.definition())
                     })
                     .unwrap();

  // Ambos ids reemplazados se devuelven para reparar programas.
  assert_eq!(old_ids.len(), 2);
  assert!(old_ids.contains(&household.id()));
  assert!(old_ids.contains(&member_name.id()));

  let draft = service.versions().get_draft_version().unwrap();
  let draft_questions = questions_of(&store, draft.id());
  let new_household = draft_questions.iter().find(|q| q.name() == "household members").unwrap();
  let new_member = draft_questions.iter().find(|q| q.name() == "member name").unwrap();
  assert_ne!(new_household.id(), household.id());
  assert_ne!(new_member.id(), member_name.id());
  // La repetida del borrador apunta a la enumeradora nueva.
  assert_eq!(new_member.definition().enumerator_id(), Some(new_household.id()));

  // Las copias activas no se tocan.
  let active_questions = questions_of(&store, active.id());
  let active_member = active_questions.iter().find(|q| q.name() == "member name").unwrap();
  assert_eq!(active_member.definition().enumerator_id(), Some(household.id()));
}

#[test]
fn enumerator_chain_cascades_transitively() {
  let (store, service) = setup();
  // household -> jobs (repetida y a su vez enumeradora) -> job days
  let household = Question::from_definition(def("household members", "household", QuestionType::Enumerator, None));
  let jobs = Question::from_definition(def("member jobs", "jobs", QuestionType::Enumerator, Some(household.id())));
  let days = Question::from_definition(def("job days", "days", QuestionType::Text, Some(jobs.id())));
  seed_active_questions(&store, &[household.clone(), jobs.clone(), days.clone()]);

  let old_ids = store.transaction(IsolationLevel::ReadCommitted, |tx| {
                       service.questions()
                              .update_or_create_draft_questions_in(tx, household.definition())
                     })
                     .unwrap();
  assert_eq!(old_ids.len(), 3);
  assert!(old_ids.contains(&household.id()));
  assert!(old_ids.contains(&jobs.id()));
  assert!(old_ids.contains(&days.id()));

  let draft = service.versions().get_draft_version().unwrap();
  let draft_questions = questions_of(&store, draft.id());
  let new_household = draft_questions.iter().find(|q| q.name() == "household members").unwrap();
  let new_jobs = draft_questions.iter().find(|q| q.name() == "member jobs").unwrap();
  let new_days = draft_questions.iter().find(|q| q.name() == "job days").unwrap();
  assert_eq!(new_jobs.definition().enumerator_id(), Some(new_household.id()));
  assert_eq!(new_days.definition().enumerator_id(), Some(new_jobs.id()));
}

#[test]
fn brand_new_definition_supersedes_nothing() {
  let (store, service) = setup();
  let old_ids = store.transaction(IsolationLevel::ReadCommitted, |tx| {
                       service.questions()
                              .update_or_create_draft_questions_in(tx, &def("rent", "rent", QuestionType::Text, None))
                     })
                     .unwrap();
  assert!(old_ids.is_empty());
}

#[test]
fn conflicting_question_is_detected() {
  let (store, service) = setup();
  let income = Question::from_definition(def("income", "income", QuestionType::Text, None));
  seed_active_questions(&store, &[income.clone()]);

  // Mismo segmento de ruta sin enumerador: conflicto.
  let same_path = def("income2", "income", QuestionType::Text, None);
  let conflict = service.questions().find_conflicting_question(&same_path).unwrap();
  assert_eq!(conflict.map(|q| q.id()), Some(income.id()));

  // Mismo nombre con otra ruta: conflicto.
  let same_name = def("income", "other", QuestionType::Text, None);
  assert!(service.questions().find_conflicting_question(&same_name).unwrap().is_some());

  // Nombre y ruta distintos: sin conflicto.
  let distinct = def("rent", "rent", QuestionType::Text, None);
  assert!(service.questions().find_conflicting_question(&distinct).unwrap().is_none());
}

#[test]
fn lookup_and_list_questions() {
  let (store, service) = setup();
  let income = Question::from_definition(def("income", "income", QuestionType::Text, None));
  seed_active_questions(&store, &[income.clone()]);

  assert_eq!(service.questions().list_questions().unwrap().len(), 1);
  assert_eq!(service.questions().lookup_question(income.id()).unwrap().map(|q| q.id()), Some(income.id()));
  assert!(service.questions().lookup_question(Uuid::new_v4()).unwrap().is_none());
}
