pub mod docs;
pub mod estados;
pub mod malla;

pub use docs::*;
pub use estados::*;
pub use malla::*;

use actix_web::HttpResponse;
use serde_json::json;

use crate::error::CorrelativasError;

/// Traduce un error del motor a la respuesta HTTP que ve la UI.
pub fn respuesta_error(e: &CorrelativasError) -> HttpResponse {
    match e {
        CorrelativasError::ValidacionBloqueada { curso, faltantes } => HttpResponse::Conflict().json(json!({
            "error": e.to_string(),
            "curso": curso,
            "faltantes": faltantes,
        })),
        CorrelativasError::FallaSincronizacion(detalle) => {
            HttpResponse::ServiceUnavailable().json(json!({"error": "no guardado", "detalle": detalle}))
        }
        CorrelativasError::CursoDesconocido(_) => HttpResponse::NotFound().json(json!({"error": e.to_string()})),
        CorrelativasError::ClaveVacia
        | CorrelativasError::EstadoInvalido(_)
        | CorrelativasError::PlanInvalido(_)
        | CorrelativasError::Json(_) => HttpResponse::BadRequest().json(json!({"error": e.to_string()})),
        CorrelativasError::ControladorCerrado => HttpResponse::ServiceUnavailable().json(json!({"error": e.to_string()})),
        CorrelativasError::Cache(_) | CorrelativasError::Io(_) => {
            HttpResponse::InternalServerError().json(json!({"error": e.to_string()}))
        }
    }
}
