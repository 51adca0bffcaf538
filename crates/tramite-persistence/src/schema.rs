// Diesel schema shared by the SQLite and Postgres backends.
// Tablas: versions, questions, programs y las dos relaciones de
// pertenencia con columna seq para conservar el orden de alta.
diesel::table! {
    versions (id) {
        id -> Text,
        lifecycle_stage -> Text,
        created_at_ts -> BigInt,
    }
}
diesel::table! {
    questions (id) {
        id -> Text,
        name -> Text,
        description -> Text,
        question_text -> Text,
        question_type -> Text,
        enumerator_id -> Nullable<Text>,
        path_segment -> Text,
    }
}
diesel::table! {
    programs (id) {
        id -> Text,
        admin_name -> Text,
        admin_description -> Text,
        block_definitions -> Text,
    }
}
diesel::table! {
    version_questions (id) {
        id -> Text,
        version_id -> Text,
        question_id -> Text,
        seq -> BigInt,
    }
}
diesel::table! {
    version_programs (id) {
        id -> Text,
        version_id -> Text,
        program_id -> Text,
        seq -> BigInt,
    }
}
diesel::allow_tables_to_appear_in_same_query!(versions, questions, programs, version_questions, version_programs);
