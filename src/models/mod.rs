// Estructuras de datos principales

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token canónico de un curso dentro de un plan: minúsculas, sin acentos,
/// palabras unidas por guiones (ej: "Álgebra I" -> "algebra-i").
pub type CourseSlug = String;

/// Estado que un estudiante puede registrar para un curso.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estado {
    Promocionada,
    Regular,
    Aprobada,
    Libre,
    EnCurso,
}

impl Estado {
    pub fn as_str(&self) -> &'static str {
        match self {
            Estado::Promocionada => "promocionada",
            Estado::Regular => "regular",
            Estado::Aprobada => "aprobada",
            Estado::Libre => "libre",
            Estado::EnCurso => "en_curso",
        }
    }

    /// promocionada, regular y aprobada cuentan como "completado" para las correlativas.
    pub fn es_completado(&self) -> bool {
        matches!(self, Estado::Promocionada | Estado::Regular | Estado::Aprobada)
    }
}

impl std::fmt::Display for Estado {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Estado registrado de un curso. `completed` siempre se deriva de `status`;
/// nunca se confía en el valor guardado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: Estado,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusEntry {
    pub fn new(status: Estado) -> Self {
        StatusEntry { status, completed: status.es_completado(), updated_at: None }
    }

    pub fn with_updated_at(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.updated_at = ts;
        self
    }
}

/// Estados de un estudiante en un plan. Un curso sin entrada = sin estado registrado.
pub type SubjectStatesMap = BTreeMap<CourseSlug, StatusEntry>;

/// Un curso del plan, tal como queda después de cargar la malla.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanCourse {
    pub slug: CourseSlug,
    pub nombre: String,
    pub semestre: Option<i32>,
    /// Correlativas directas normalizadas (sin pasar todavía por la tabla de alias)
    pub prerequisitos: Vec<CourseSlug>,
    /// Mínimo de cursos completados en todo el plan para poder cursarlo
    pub min_aprobadas: Option<u32>,
    /// Mínimo de avance porcentual (0-100) en el plan
    pub min_avance: Option<f64>,
    /// Todos los identificadores normalizados que expone la entrada (el primero es `slug`)
    pub identificadores: Vec<CourseSlug>,
}

/// Veredicto derivado por curso. Nunca se persiste.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityRecord {
    pub status: Option<Estado>,
    pub completed: bool,
    pub can_take: bool,
    pub can_change_state: bool,
    pub visible_in_planner: bool,
    pub missing_prereqs: Vec<CourseSlug>,
}

/// Correlativa faltante resuelta a su nombre visible, para mostrarla al usuario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingPrereq {
    pub slug: CourseSlug,
    pub nombre: String,
}
