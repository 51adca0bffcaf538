//! Implementación Diesel del contrato `EntityStore` del motor de
//! versionado. Este archivo expone el módulo `schema` y reexporta el
//! almacén Diesel y el repositorio de programas que bifurca activos
//! hacia el borrador. La implementación detallada está en
//! `entity_store.rs`.

mod entity_store;
mod program_repository;
pub mod schema;

#[cfg(not(feature = "pg"))]
pub use entity_store::new_sqlite_for_test;
pub use entity_store::{new_from_env, DieselEntityStore, MIGRATIONS};
pub use program_repository::DieselProgramRepository;
