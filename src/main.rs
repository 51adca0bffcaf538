use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use tramite_domain::{BlockDefinition, Program, ProgramDefinition, ProgramQuestionDefinition, QuestionDefinition,
                     QuestionType};
use tramite_persistence::DieselProgramRepository;
use uuid::Uuid;
use versioning::{EntityStore, IsolationLevel, LogEventSink, RetryConfig, VersioningService};

/// Pequeña consola interactiva para administrar el contenido versionado
/// (preguntas y programas) usando el almacén proporcionado por
/// `tramite-persistence`.
///
/// Opciones soportadas:
/// 1) Ver versiones (tabla con id, etapa y fecha)
/// 2) Ver preguntas (todas las versiones)
/// 3) Editar o crear borrador de una pregunta
/// 4) Crear programa en la versión borrador
/// 5) Ver programas del borrador (con hash de trazado)
/// 6) Publicar versión sincronizada
/// 7) Forzar una versión a activa
/// 8) Salir
fn main() -> Result<(), Box<dyn Error>> {
    // Inicializar el almacén (aplica migraciones embebidas si procede)
    let store = Arc::new(tramite_persistence::new_from_env().map_err(|e| Box::new(e) as Box<dyn Error>)?);
    let service = VersioningService::with_config(store.clone(),
                                                 Arc::new(DieselProgramRepository::new()),
                                                 RetryConfig::from_env(),
                                                 Arc::new(LogEventSink));

    loop {
        println!("\n== Consola de versionado ==");
        println!("1) Ver versiones");
        println!("2) Ver preguntas (todas las versiones)");
        println!("3) Editar/crear borrador de pregunta");
        println!("4) Crear programa en el borrador");
        println!("5) Ver programas del borrador");
        println!("6) Publicar versión sincronizada");
        println!("7) Forzar versión a activa (set live)");
        println!("8) Salir");
        print!("Elige una opción: ");
        io::stdout().flush().ok();

        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        match choice.trim() {
            "1" => {
                match service.versions().list_all_versions() {
                    Ok(versions) => {
                        println!("\nID                                   | ETAPA    | CREADA");
                        println!("--------------------------------------------------------------------");
                        for v in versions {
                            println!("{} | {:8} | {}", v.id(), v.stage().as_str(), v.created_at().to_rfc3339());
                        }
                    }
                    Err(e) => eprintln!("Error listando versiones: {}", e),
                }
            }
            "2" => {
                match service.questions().list_questions() {
                    Ok(questions) => {
                        println!("\nID                                   | TIPO       | NOMBRE");
                        println!("--------------------------------------------------------------------");
                        for q in questions {
                            println!("{} | {:10} | {}", q.id(), q.definition().question_type().as_str(), q.name());
                        }
                    }
                    Err(e) => eprintln!("Error listando preguntas: {}", e),
                }
            }
            "3" => {
                let name = prompt("Nombre de la pregunta: ")?;
                let name = name.trim().to_string();
                if name.is_empty() {
                    eprintln!("Nombre vacío");
                    continue;
                }
                let text = prompt("Texto de la pregunta: ")?;
                let base = match service.questions().list_questions() {
                    Ok(questions) => questions.into_iter().find(|q| q.name() == name),
                    Err(e) => {
                        eprintln!("Error buscando la pregunta: {}", e);
                        continue;
                    }
                };
                let definition = match base {
                    // Edición: se parte de la definición persistida, con su id.
                    Some(question) => {
                        match QuestionDefinition::new(name.clone(),
                                                      question.definition().description(),
                                                      text.trim(),
                                                      question.definition().question_type(),
                                                      question.definition().enumerator_id(),
                                                      question.definition().path_segment())
                        {
                            Ok(def) => def.with_id(question.definition().id()),
                            Err(e) => {
                                eprintln!("Definición inválida: {}", e);
                                continue;
                            }
                        }
                    }
                    // Alta: definición nueva; se comprueban conflictos antes.
                    None => {
                        let path = prompt("Segmento de ruta: ")?;
                        let def = match QuestionDefinition::new(name.clone(),
                                                                "",
                                                                text.trim(),
                                                                QuestionType::Text,
                                                                None,
                                                                path.trim())
                        {
                            Ok(def) => def,
                            Err(e) => {
                                eprintln!("Definición inválida: {}", e);
                                continue;
                            }
                        };
                        match service.questions().find_conflicting_question(&def) {
                            Ok(Some(conflict)) => {
                                eprintln!("Conflicto con la pregunta existente '{}'", conflict.name());
                                continue;
                            }
                            Ok(None) => def,
                            Err(e) => {
                                eprintln!("Error comprobando conflictos: {}", e);
                                continue;
                            }
                        }
                    }
                };
                match service.questions().update_or_create_draft(&definition) {
                    Ok(draft) => println!("Borrador listo: {}", draft),
                    Err(e) => eprintln!("Error creando el borrador: {}", e),
                }
            }
            "4" => {
                let admin_name = prompt("Nombre administrativo del programa: ")?;
                let names = prompt("Nombres de preguntas del primer bloque (separados por coma): ")?;
                let questions = match service.questions().list_questions() {
                    Ok(questions) => questions,
                    Err(e) => {
                        eprintln!("Error listando preguntas: {}", e);
                        continue;
                    }
                };
                let mut references = Vec::new();
                let mut missing = false;
                for raw in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    match questions.iter().find(|q| q.name() == raw) {
                        Some(q) => references.push(ProgramQuestionDefinition::from_question(q)),
                        None => {
                            eprintln!("No existe la pregunta '{}'", raw);
                            missing = true;
                        }
                    }
                }
                if missing {
                    continue;
                }
                let block = BlockDefinition::new(1, "Bloque 1", "", references);
                let definition = match ProgramDefinition::new(admin_name.trim(), "", vec![block]) {
                    Ok(def) => def,
                    Err(e) => {
                        eprintln!("Definición inválida: {}", e);
                        continue;
                    }
                };
                // Alta directa en la versión borrador a través del almacén.
                let draft = match service.versions().get_draft_version() {
                    Ok(draft) => draft,
                    Err(e) => {
                        eprintln!("Error obteniendo el borrador: {}", e);
                        continue;
                    }
                };
                let program = Program::from_definition(definition);
                let created = store.transaction(IsolationLevel::ReadCommitted, |tx| {
                                       store.insert_program(tx, &program)?;
                                       store.add_version_program(tx, draft.id(), program.id())
                                   });
                match created {
                    Ok(()) => println!("Programa creado: {}", program),
                    Err(e) => eprintln!("Error creando el programa: {}", e),
                }
            }
            "5" => {
                let draft = match service.versions().get_draft_version() {
                    Ok(draft) => draft,
                    Err(e) => {
                        eprintln!("Error obteniendo el borrador: {}", e);
                        continue;
                    }
                };
                let programs = store.transaction(IsolationLevel::ReadCommitted, |tx| {
                                        store.programs_for_version(tx, draft.id())
                                    });
                match programs {
                    Ok(programs) => {
                        println!("\nNOMBRE                    | BLOQUES | HASH DE TRAZADO");
                        println!("--------------------------------------------------------------------");
                        for p in programs {
                            let hash = p.definition().block_layout_hash();
                            println!("{:25} | {:7} | {}",
                                     p.admin_name(),
                                     p.definition().block_definitions().len(),
                                     &hash[..16.min(hash.len())]);
                        }
                    }
                    Err(e) => eprintln!("Error listando programas: {}", e),
                }
            }
            "6" => {
                match service.versions().publish_new_synchronized_version() {
                    Ok(published) => println!("Versión publicada: {}", published),
                    Err(e) => eprintln!("Error publicando: {}", e),
                }
            }
            "7" => {
                let id_s = prompt("Id de la versión a activar (UUID): ")?;
                let id = match Uuid::parse_str(id_s.trim()) {
                    Ok(u) => u,
                    Err(_) => {
                        eprintln!("UUID inválido");
                        continue;
                    }
                };
                let confirm = prompt(&format!("Confirma activar {}? escribir 'yes' para confirmar: ", id))?;
                if confirm.trim().to_lowercase() == "yes" {
                    match service.versions().set_live(id) {
                        Ok(live) => println!("Versión activa: {}", live),
                        Err(e) => eprintln!("Error activando versión: {}", e),
                    }
                } else {
                    println!("Activación cancelada");
                }
            }
            "8" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    Ok(())
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
