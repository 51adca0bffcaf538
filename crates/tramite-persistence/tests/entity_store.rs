use std::sync::Arc;
use tramite_domain::{BlockDefinition, LifecycleStage, Program, ProgramDefinition, ProgramQuestionDefinition,
                     Question, QuestionDefinition, QuestionType};
use tramite_persistence::{new_from_env, DieselProgramRepository};
use uuid::Uuid;
use versioning::{EntityStore, IsolationLevel, VersioningService};

#[test]
fn diesel_store_versioning_lifecycle() {
  // Use a temporary file-backed SQLite DB for tests to avoid URI parsing
  // options problems with different sqlite builds.
  let tmp_path = std::env::temp_dir().join(format!("tramite_test_{}.db", Uuid::new_v4()));
  let db_url = tmp_path.to_str().unwrap().to_string();
  std::env::set_var("TRAMITE_DB_URL", &db_url);
  // If crate was built with the `pg` feature, skip this sqlite-only test at
  // runtime.
  if cfg!(feature = "pg") {
    eprintln!("skipping sqlite-only persistence test because 'pg' feature is enabled");
    return;
  }
  // Create the store from the environment (the TRAMITE_DB_URL we set
  // above). When compiled without `pg` this will use SQLite.
  let store = Arc::new(new_from_env().expect("failed to create store"));
  let service = VersioningService::new(store.clone(), Arc::new(DieselProgramRepository::new()));

  // El primer acceso crea el borrador; el segundo lo reutiliza.
  let draft = service.versions().get_draft_version().expect("draft");
  assert_eq!(service.versions().get_draft_version().expect("draft again").id(), draft.id());

  // Sembrar una versión activa con una pregunta y un programa.
  let income = Question::from_definition(QuestionDefinition::new("income",
                                                                 "",
                                                                 "¿Ingresos?",
                                                                 QuestionType::Text,
                                                                 None,
                                                                 "income").expect("income def"));
  let block = BlockDefinition::new(1, "Bloque 1", "", vec![ProgramQuestionDefinition::from_question(&income)]);
  let food_aid =
    Program::from_definition(ProgramDefinition::new("food aid", "", vec![block]).expect("program def"));
  let active = store.transaction(IsolationLevel::ReadCommitted, |tx| {
                      let active = tramite_domain::Version::new(LifecycleStage::Active);
                      store.insert_version(tx, &active)?;
                      store.insert_question(tx, &income)?;
                      store.add_version_question(tx, active.id(), income.id())?;
                      store.insert_program(tx, &food_aid)?;
                      store.add_version_program(tx, active.id(), food_aid.id())?;
                      Ok(active)
                    })
                    .expect("seed active");

  // Editar la pregunta activa bifurca un borrador nuevo y el programa
  // activo afectado se bifurca hacia el borrador con la referencia al día.
  let forked = service.questions().update_or_create_draft(income.definition()).expect("fork");
  assert_ne!(forked.id(), income.id());
  assert_eq!(forked.name(), "income");
  let draft_programs = store.transaction(IsolationLevel::ReadCommitted, |tx| {
                              store.programs_for_version(tx, draft.id())
                            })
                            .expect("draft programs");
  assert_eq!(draft_programs.len(), 1);
  assert_eq!(draft_programs[0].admin_name(), "food aid");
  assert_ne!(draft_programs[0].id(), food_aid.id());
  let refs: Vec<Uuid> = draft_programs[0].definition().block_definitions()[0].question_definitions()
                                                                             .iter()
                                                                             .map(|r| r.question_id())
                                                                             .collect();
  assert_eq!(refs, vec![forked.id()]);

  // La copia activa queda intacta.
  let active_questions = store.transaction(IsolationLevel::ReadCommitted, |tx| {
                                store.questions_for_version(tx, active.id())
                              })
                              .expect("active questions");
  assert_eq!(active_questions.len(), 1);
  assert_eq!(active_questions[0].id(), income.id());

  // Publicar promociona el borrador y retira la activa anterior.
  let published = service.versions().publish_new_synchronized_version().expect("publish");
  assert_eq!(published.id(), draft.id());
  assert_eq!(service.versions().get_active_version().expect("active now").id(), published.id());
  let versions = service.versions().list_all_versions().expect("list");
  assert_eq!(versions.iter().find(|v| v.id() == active.id()).expect("retired").stage(),
             LifecycleStage::Obsolete);

  // Forzar la versión retirada de vuelta a activa elimina el borrador
  // nuevo y retira la recién publicada.
  let next_draft = service.versions().get_draft_version().expect("next draft");
  let live = service.versions().set_live(active.id()).expect("set live");
  assert_eq!(live.id(), active.id());
  let versions = service.versions().list_all_versions().expect("list again");
  assert_eq!(versions.iter().find(|v| v.id() == published.id()).expect("published").stage(),
             LifecycleStage::Obsolete);
  assert_eq!(versions.iter().find(|v| v.id() == next_draft.id()).expect("draft gone").stage(),
             LifecycleStage::Deleted);

  // Cleanup temporary DB file
  let _ = std::fs::remove_file(tmp_path);
}
