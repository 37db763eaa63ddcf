//! Módulo `malla`: índice del plan de estudios y resolución de correlativas.
//!
//! Submódulos:
//! - `slug`: normalización de identificadores de curso a `CourseSlug`
//! - `prerequisitos`: tabla de alias y resolución de correlativas directas
//! - `validacion`: reporte de problemas del plan (referencias desconocidas, ciclos)
//!
//! El plan se construye una vez por carga y se pasa como snapshot inmutable a
//! cada llamada del resolver; no hay cachés globales.

pub mod prerequisitos;
pub mod slug;
pub mod validacion;

pub use prerequisitos::{AliasTable, resolve_prerequisites};
pub use slug::normalize_key;
pub use validacion::{validar_plan, ReferenciaDesconocida, ReporteValidacion};

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{CourseSlug, PlanCourse};

/// Campos que pueden identificar un curso, en orden de precedencia:
/// slug explícito, id interno, código, nombre visible. El primero presente
/// es la identidad canónica; el resto quedan como alias.
pub const CAMPOS_IDENTIFICADOR: &[&str] = &["slug", "id", "codigo", "code", "nombre", "name"];

/// Campos aceptados para la lista de correlativas. Gana el primero presente.
pub const CAMPOS_PREREQUISITOS: &[&str] =
    &["correlativas", "prerequisitos", "prerequisites", "requisitos", "requires"];

pub const CAMPOS_NOMBRE: &[&str] = &["nombre", "name", "titulo"];
pub const CAMPOS_SEMESTRE: &[&str] = &["semestre", "semester", "cuatrimestre"];
pub const CAMPOS_MIN_APROBADAS: &[&str] = &["min_aprobadas", "minAprobadas", "min_approved"];
pub const CAMPOS_MIN_AVANCE: &[&str] = &["min_avance", "minAvance", "min_progress_percent"];

/// Plan tal como lo entrega el cargador externo de mallas.
///
/// ```json
/// {
///   "slug": "ing-informatica-2023",
///   "nombre": "Ingeniería en Informática (2023)",
///   "cursos": [
///     { "codigo": "MAT101", "nombre": "Álgebra I", "semestre": 1 },
///     { "id": 7, "nombre": "Álgebra II", "correlativas": ["Álgebra I"] },
///     { "nombre": "Proyecto Final", "min_aprobadas": 30, "min_avance": 80 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPlan {
    pub slug: String,
    #[serde(default)]
    pub nombre: String,
    #[serde(default, alias = "courses", alias = "materias")]
    pub cursos: Vec<Value>,
    /// Tabla canónica -> canónicas ya resuelta (vía rápida del resolver)
    #[serde(default)]
    pub correlativas: Option<HashMap<String, Vec<String>>>,
}

/// Snapshot inmutable de un plan cargado.
#[derive(Debug, Clone)]
pub struct Plan {
    pub slug: String,
    pub nombre: String,
    pub cursos: Vec<PlanCourse>,
    /// Tabla precomputada canónica -> canónicas, ya normalizada
    pub correlativas: Option<HashMap<CourseSlug, Vec<CourseSlug>>>,
    /// Entradas descartadas por no tener ningún identificador derivable
    pub omitidos: usize,
    /// Entradas descartadas porque su identidad canónica ya existía
    pub duplicados: Vec<CourseSlug>,
    alias: AliasTable,
    indice: HashMap<CourseSlug, usize>,
}

/// Primer campo presente (y no nulo) de la lista, en orden.
pub(crate) fn first_field<'a>(obj: &'a Value, campos: &[&str]) -> Option<&'a Value> {
    campos.iter().find_map(|c| obj.get(*c).filter(|v| !v.is_null()))
}

/// Convierte un escalar JSON a String (números enteros sin decimales).
pub(crate) fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                n.as_f64().map(|f| {
                    if (f.floor() - f).abs() < f64::EPSILON { format!("{}", f as i64) } else { f.to_string() }
                })
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_to_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Identificadores normalizados de una entrada, en el orden de `CAMPOS_IDENTIFICADOR`,
/// sin vacíos ni repetidos.
pub(crate) fn identificadores(obj: &Value) -> Vec<CourseSlug> {
    let mut out: Vec<CourseSlug> = Vec::new();
    for campo in CAMPOS_IDENTIFICADOR {
        let Some(raw) = obj.get(*campo).and_then(value_to_string) else { continue };
        let key = normalize_key(&raw);
        if !key.is_empty() && !out.contains(&key) {
            out.push(key);
        }
    }
    out
}

/// Lee la lista cruda de correlativas (arreglo, o texto separado por comas/punto y coma).
fn leer_prerequisitos(obj: &Value) -> Vec<CourseSlug> {
    let Some(raw) = first_field(obj, CAMPOS_PREREQUISITOS) else { return Vec::new() };
    let textos: Vec<String> = match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(_) => identificadores(item).into_iter().next(),
                other => value_to_string(other),
            })
            .collect(),
        Value::String(s) => s.split([',', ';']).map(|p| p.to_string()).collect(),
        other => value_to_string(other).into_iter().collect(),
    };
    textos
        .iter()
        .map(|t| normalize_key(t))
        .filter(|k| !k.is_empty())
        .collect()
}

fn curso_desde_raw(obj: &Value) -> Option<PlanCourse> {
    let ids = identificadores(obj);
    let slug = ids.first()?.clone();

    let nombre = first_field(obj, CAMPOS_NOMBRE)
        .and_then(value_to_string)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slug.clone());

    Some(PlanCourse {
        slug,
        nombre,
        semestre: first_field(obj, CAMPOS_SEMESTRE).and_then(value_to_i64).and_then(|s| i32::try_from(s).ok()),
        prerequisitos: leer_prerequisitos(obj),
        min_aprobadas: first_field(obj, CAMPOS_MIN_APROBADAS)
            .and_then(value_to_i64)
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok()),
        min_avance: first_field(obj, CAMPOS_MIN_AVANCE).and_then(value_to_f64).filter(|p| *p > 0.0),
        identificadores: ids,
    })
}

impl Plan {
    /// Construye el índice del plan. Las entradas sin identificador se omiten en silencio
    /// (se cuentan en `omitidos`); la tabla de alias se arma una sola vez aquí.
    pub fn from_raw(raw: RawPlan) -> Plan {
        let mut cursos: Vec<PlanCourse> = Vec::with_capacity(raw.cursos.len());
        let mut indice: HashMap<CourseSlug, usize> = HashMap::new();
        let mut omitidos = 0usize;
        let mut duplicados: Vec<CourseSlug> = Vec::new();

        for entry in raw.cursos.iter() {
            match curso_desde_raw(entry) {
                Some(curso) => {
                    if indice.contains_key(&curso.slug) {
                        warn!(plan = %raw.slug, curso = %curso.slug, "curso duplicado en el plan, se conserva el primero");
                        duplicados.push(curso.slug);
                        continue;
                    }
                    indice.insert(curso.slug.clone(), cursos.len());
                    cursos.push(curso);
                }
                None => {
                    omitidos += 1;
                    debug!(plan = %raw.slug, "entrada de plan sin identificador, omitida");
                }
            }
        }

        let correlativas = raw.correlativas.map(|tabla| {
            tabla
                .into_iter()
                .filter_map(|(k, vs)| {
                    let key = normalize_key(&k);
                    if key.is_empty() {
                        return None;
                    }
                    let vals: Vec<CourseSlug> =
                        vs.iter().map(|v| normalize_key(v)).filter(|v| !v.is_empty()).collect();
                    Some((key, vals))
                })
                .collect::<HashMap<_, _>>()
        });

        let alias = AliasTable::build(&cursos);
        info!(plan = %raw.slug, cursos = cursos.len(), omitidos, "plan cargado");

        Plan {
            slug: normalize_key(&raw.slug),
            nombre: raw.nombre,
            cursos,
            correlativas,
            omitidos,
            duplicados,
            alias,
            indice,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Plan> {
        let raw: RawPlan = serde_json::from_str(json)?;
        Ok(Plan::from_raw(raw))
    }

    pub fn alias(&self) -> &AliasTable {
        &self.alias
    }

    /// Identidad canónica de cualquier identificador (o el token normalizado si no hay alias).
    pub fn canonical(&self, key: &str) -> CourseSlug {
        self.alias.resolve(&normalize_key(key))
    }

    /// Busca un curso por cualquiera de sus identificadores.
    pub fn course(&self, key: &str) -> Option<&PlanCourse> {
        let canon = self.canonical(key);
        self.indice.get(&canon).map(|i| &self.cursos[*i])
    }

    /// Nombre visible de un curso; si no está en el plan, el mismo slug.
    pub fn display_name(&self, slug: &str) -> String {
        self.course(slug).map(|c| c.nombre.clone()).unwrap_or_else(|| slug.to_string())
    }

    pub fn total_cursos(&self) -> usize {
        self.cursos.len()
    }
}

/// Lee un plan desde un archivo JSON con la forma de `RawPlan`.
pub fn leer_plan_json<P: AsRef<Path>>(path: P) -> Result<Plan> {
    let text = std::fs::read_to_string(path)?;
    Plan::from_json_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(cursos: Vec<Value>) -> RawPlan {
        RawPlan { slug: "Plan Test".into(), nombre: "Plan de prueba".into(), cursos, correlativas: None }
    }

    #[test]
    fn omite_entradas_sin_identificador() {
        let plan = Plan::from_raw(raw(vec![
            json!({"nombre": "Álgebra I"}),
            json!({"semestre": 2}),
            json!({"nombre": "   "}),
        ]));
        assert_eq!(plan.total_cursos(), 1);
        assert_eq!(plan.omitidos, 2);
        assert_eq!(plan.slug, "plan-test");
        assert_eq!(plan.cursos[0].slug, "algebra-i");
        assert_eq!(plan.cursos[0].nombre, "Álgebra I");
    }

    #[test]
    fn lee_campos_opcionales() {
        let plan = Plan::from_raw(raw(vec![json!({
            "codigo": "PF-900",
            "nombre": "Proyecto Final",
            "semestre": "10",
            "requisitos": "Álgebra I; Física I",
            "min_aprobadas": 30,
            "min_avance": "80%"
        })]));
        let c = &plan.cursos[0];
        assert_eq!(c.slug, "pf-900");
        assert_eq!(c.semestre, Some(10));
        assert_eq!(c.prerequisitos, vec!["algebra-i".to_string(), "fisica-i".to_string()]);
        assert_eq!(c.min_aprobadas, Some(30));
        assert_eq!(c.min_avance, Some(80.0));
        assert_eq!(c.identificadores, vec!["pf-900".to_string(), "proyecto-final".to_string()]);
    }

    #[test]
    fn numeros_fuera_de_rango_se_descartan() {
        let plan = Plan::from_raw(raw(vec![json!({
            "slug": "tesis",
            "semestre": 4294967297i64,
            "min_aprobadas": 4294967297i64
        })]));
        let c = &plan.cursos[0];
        assert_eq!(c.semestre, None);
        assert_eq!(c.min_aprobadas, None);
    }

    #[test]
    fn primer_campo_de_correlativas_gana() {
        let plan = Plan::from_raw(raw(vec![json!({
            "slug": "b",
            "correlativas": ["a"],
            "prerequisitos": ["c"]
        })]));
        assert_eq!(plan.cursos[0].prerequisitos, vec!["a".to_string()]);
    }

    #[test]
    fn duplicados_conservan_el_primero() {
        let plan = Plan::from_raw(raw(vec![
            json!({"nombre": "Química", "semestre": 1}),
            json!({"nombre": "QUIMICA", "semestre": 3}),
        ]));
        assert_eq!(plan.total_cursos(), 1);
        assert_eq!(plan.cursos[0].semestre, Some(1));
        assert_eq!(plan.duplicados, vec!["quimica".to_string()]);
    }

    #[test]
    fn busca_por_cualquier_identificador() {
        let plan = Plan::from_raw(raw(vec![json!({"id": 7, "codigo": "MAT102", "nombre": "Álgebra II"})]));
        assert_eq!(plan.course("7").map(|c| c.slug.as_str()), Some("7"));
        assert_eq!(plan.course("mat102").map(|c| c.slug.as_str()), Some("7"));
        assert_eq!(plan.course("ALGEBRA II").map(|c| c.slug.as_str()), Some("7"));
        assert_eq!(plan.display_name("mat-102"), "mat-102");
        assert_eq!(plan.display_name("MAT102"), "Álgebra II");
    }
}
