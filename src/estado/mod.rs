//! Modelo de estados de cursada.
//!
//! Todo valor de estado que entra al motor (remoto, cache local, API) pasa por
//! `normalize_entry`/`normalize_status`. El flag `completed` se recalcula siempre.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::malla::slug::plegar;
use crate::models::{Estado, StatusEntry};

/// minúsculas, sin acentos, espacios colapsados a '_'
fn token_estado(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_underscore = false;
    for ch in plegar(raw.trim()) {
        if ch.is_whitespace() {
            if !prev_underscore {
                out.push('_');
                prev_underscore = true;
            }
        } else {
            out.push(ch);
            prev_underscore = false;
        }
    }
    out
}

/// Mapea un texto de estado (cualquier capitalización/acentos) a `Estado`.
/// Cualquier otro valor devuelve `None`.
pub fn normalize_status(raw: &str) -> Option<Estado> {
    match token_estado(raw).as_str() {
        "promocion" | "promocionada" => Some(Estado::Promocionada),
        "regular" => Some(Estado::Regular),
        "aprobada" | "aprobado" => Some(Estado::Aprobada),
        "libre" => Some(Estado::Libre),
        "en_curso" | "encurso" | "curso" => Some(Estado::EnCurso),
        _ => None,
    }
}

pub fn is_completed(status: Option<Estado>) -> bool {
    status.map(|s| s.es_completado()).unwrap_or(false)
}

/// Formas de entrada aceptadas para el estado de un curso.
#[derive(Debug, Clone, PartialEq)]
pub enum RawStatus {
    Ausente,
    /// Forma heredada: sólo el texto del estado
    SoloEstado(String),
    ConMetadatos {
        status: Option<String>,
        completed: Option<bool>,
        updated_at: Option<DateTime<Utc>>,
    },
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim()).ok().map(|d| d.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

impl RawStatus {
    pub fn from_value(v: &Value) -> RawStatus {
        match v {
            Value::Null => RawStatus::Ausente,
            Value::String(s) => RawStatus::SoloEstado(s.clone()),
            Value::Object(obj) => {
                let status = ["status", "estado"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str))
                    .map(|s| s.to_string());
                let completed = ["completed", "completado"].iter().find_map(|k| obj.get(*k).and_then(Value::as_bool));
                let updated_at = ["updated_at", "updatedAt"].iter().find_map(|k| obj.get(*k).and_then(parse_timestamp));
                if status.is_none() && completed.is_none() {
                    RawStatus::Ausente
                } else {
                    RawStatus::ConMetadatos { status, completed, updated_at }
                }
            }
            _ => RawStatus::Ausente,
        }
    }

    /// Colapsa cualquier forma a un `StatusEntry` canónico, o `None` si no hay estado.
    ///
    /// Un registro marcado `completed: true` sin estado reconocible se conserva
    /// como `aprobada`, para que `completed` siga siendo derivable del estado.
    pub fn into_entry(self) -> Option<StatusEntry> {
        match self {
            RawStatus::Ausente => None,
            RawStatus::SoloEstado(s) => normalize_status(&s).map(StatusEntry::new),
            RawStatus::ConMetadatos { status, completed, updated_at } => {
                let estado = status.as_deref().and_then(normalize_status);
                match (estado, completed) {
                    (Some(e), _) => Some(StatusEntry::new(e).with_updated_at(updated_at)),
                    (None, Some(true)) => Some(StatusEntry::new(Estado::Aprobada).with_updated_at(updated_at)),
                    (None, _) => None,
                }
            }
        }
    }
}

pub fn normalize_entry(raw: &Value) -> Option<StatusEntry> {
    RawStatus::from_value(raw).into_entry()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tabla_de_estados() {
        assert_eq!(normalize_status("Promoción"), Some(Estado::Promocionada));
        assert_eq!(normalize_status("PROMOCIONADA"), Some(Estado::Promocionada));
        assert_eq!(normalize_status(" regular "), Some(Estado::Regular));
        assert_eq!(normalize_status("Aprobado"), Some(Estado::Aprobada));
        assert_eq!(normalize_status("libre"), Some(Estado::Libre));
        assert_eq!(normalize_status("En   Curso"), Some(Estado::EnCurso));
        assert_eq!(normalize_status("encurso"), Some(Estado::EnCurso));
        assert_eq!(normalize_status("curso"), Some(Estado::EnCurso));
        assert_eq!(normalize_status("desaprobada"), None);
        assert_eq!(normalize_status(""), None);
        // acento descompuesto
        assert_eq!(normalize_status("Promocio\u{0301}n"), Some(Estado::Promocionada));
    }

    #[test]
    fn completado() {
        assert!(is_completed(Some(Estado::Regular)));
        assert!(is_completed(Some(Estado::Aprobada)));
        assert!(is_completed(Some(Estado::Promocionada)));
        assert!(!is_completed(Some(Estado::Libre)));
        assert!(!is_completed(Some(Estado::EnCurso)));
        assert!(!is_completed(None));
    }

    #[test]
    fn completed_guardado_no_se_confia() {
        let e = normalize_entry(&json!({"status": "libre", "completed": true})).unwrap();
        assert_eq!(e.status, Estado::Libre);
        assert!(!e.completed);

        let e = normalize_entry(&json!({"estado": "Regular", "completed": false})).unwrap();
        assert!(e.completed);
    }

    #[test]
    fn formas_heredadas() {
        assert_eq!(normalize_entry(&json!("aprobado")), Some(StatusEntry::new(Estado::Aprobada)));
        assert_eq!(normalize_entry(&json!(null)), None);
        assert_eq!(normalize_entry(&json!({})), None);
        assert_eq!(normalize_entry(&json!("???")), None);
        assert_eq!(normalize_entry(&json!({"status": "???"})), None);
        assert_eq!(normalize_entry(&json!({"completed": true})).map(|e| e.status), Some(Estado::Aprobada));
    }

    #[test]
    fn conserva_fecha_de_actualizacion() {
        let e = normalize_entry(&json!({"status": "regular", "updated_at": "2025-03-01T12:00:00Z"})).unwrap();
        assert_eq!(e.updated_at.map(|d| d.timestamp()), Some(1_740_830_400));
    }
}
