// Biblioteca raíz del crate `correlativas`.
// Motor de correlativas y elegibilidad de cursos, con sincronización de estados
// entre una cache local y un almacén remoto.
pub mod algorithm;
pub mod api_json;
pub mod config;
pub mod error;
pub mod estado;
pub mod gate;
pub mod malla;
pub mod models;
pub mod server;
pub mod server_handlers;
pub mod sync;

pub use algorithm::elegibilidad::{build_eligibility_map, eligibility_for, missing_prereqs, resumen_elegibilidad};
pub use config::Config;
pub use error::{CorrelativasError, Result};
pub use estado::{is_completed, normalize_entry, normalize_status, RawStatus};
pub use gate::{check_transition, Aplicado, Cambio, Controlador, GateHandle, Veredicto};
pub use malla::{normalize_key, resolve_prerequisites, validar_plan, AliasTable, Plan, RawPlan, ReporteValidacion};
pub use models::{CourseSlug, EligibilityRecord, Estado, MissingPrereq, PlanCourse, StatusEntry, SubjectStatesMap};
pub use sync::{DocKey, LocalCache, MemoryCache, MemoryRemote, RemoteStore, Sincronizador, SqliteCache, SqliteRemote};

/// Ejecuta el servidor HTTP (reexport para facilitar uso desde `main`)
pub use server::run_server;
