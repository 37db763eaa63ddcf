use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::algorithm::elegibilidad::ResumenElegibilidad;
use crate::models::{CourseSlug, EligibilityRecord, MissingPrereq, SubjectStatesMap};

/// Cuerpo de `POST /estado`.
///
/// ```json
/// { "curso": "Álgebra I", "estado": "regular" }
/// { "curso": "algebra-i", "estado": null }
/// ```
/// `estado` ausente o `null` quita el estado del curso.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CambioEstadoRequest {
    pub curso: String,
    #[serde(default)]
    pub estado: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EstadosResponse {
    pub plan: String,
    pub completados: u32,
    pub avance: f64,
    pub estados: SubjectStatesMap,
}

#[derive(Debug, Serialize)]
pub struct ElegibilidadResponse {
    pub plan: String,
    pub resumen: ResumenElegibilidad,
    pub cursos: BTreeMap<CourseSlug, EligibilityRecord>,
}

#[derive(Debug, Serialize)]
pub struct PrerequisitosResponse {
    pub consulta: String,
    /// `None` si el identificador no corresponde a ningún curso del plan
    pub curso: Option<CourseSlug>,
    pub prerequisitos: Vec<MissingPrereq>,
}
