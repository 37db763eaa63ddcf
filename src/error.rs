//! Errores del motor de correlativas.

use thiserror::Error;

use crate::models::{CourseSlug, MissingPrereq};

pub type Result<T> = std::result::Result<T, CorrelativasError>;

#[derive(Error, Debug)]
pub enum CorrelativasError {
    /// Se intentó marcar como completado un curso con correlativas pendientes.
    #[error("no se puede completar '{curso}': faltan {} correlativas", faltantes.len())]
    ValidacionBloqueada {
        curso: CourseSlug,
        faltantes: Vec<MissingPrereq>,
    },

    /// El almacén remoto rechazó una escritura o un borrado. El estado local ya fue revertido.
    #[error("cambio no guardado: {0}")]
    FallaSincronizacion(String),

    #[error("identificador vacío")]
    ClaveVacia,

    #[error("estado '{0}' no reconocido")]
    EstadoInvalido(String),

    #[error("curso '{0}' no existe en el plan cargado")]
    CursoDesconocido(String),

    /// Sólo en modo de validación estricta.
    #[error("plan inválido: {0}")]
    PlanInvalido(String),

    #[error("cache local: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("el controlador de estados ya no está activo")]
    ControladorCerrado,
}
