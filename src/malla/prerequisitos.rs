use std::collections::{HashMap, HashSet};

use crate::malla::{normalize_key, Plan};
use crate::models::{CourseSlug, PlanCourse};

/// Tabla alias -> identidad canónica para todo un plan.
///
/// Cada curso expone varios identificadores (slug, id, código, nombre). El primero
/// es su identidad canónica; los demás apuntan a ella. Las identidades canónicas
/// siempre se mapean a sí mismas y tienen prioridad sobre cualquier alias; si dos
/// cursos comparten un alias, gana el primero en el plan.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    tabla: HashMap<CourseSlug, CourseSlug>,
}

impl AliasTable {
    /// Una sola pasada sobre el plan.
    pub fn build(cursos: &[PlanCourse]) -> AliasTable {
        let mut tabla: HashMap<CourseSlug, CourseSlug> = HashMap::new();
        let mut canonicas: HashSet<&str> = HashSet::new();
        for curso in cursos {
            let canon = curso.slug.clone();
            canonicas.insert(curso.slug.as_str());
            tabla.insert(canon.clone(), canon.clone());
            for alias in curso.identificadores.iter().skip(1) {
                if canonicas.contains(alias.as_str()) {
                    continue;
                }
                tabla.entry(alias.clone()).or_insert_with(|| canon.clone());
            }
        }
        AliasTable { tabla }
    }

    /// Resuelve un token ya normalizado; si no está mapeado se devuelve igual.
    pub fn resolve(&self, key: &str) -> CourseSlug {
        self.tabla.get(key).cloned().unwrap_or_else(|| key.to_string())
    }
}

fn dedup_en_orden(items: impl IntoIterator<Item = CourseSlug>) -> Vec<CourseSlug> {
    let mut vistos: HashSet<CourseSlug> = HashSet::new();
    items.into_iter().filter(|s| vistos.insert(s.clone())).collect()
}

/// Correlativas directas de un curso, como identidades canónicas, sin repetidos
/// y en el orden en que aparecen declaradas.
///
/// Sólo se hace un salto de traducción de alias: no se expanden correlativas
/// transitivas. Un curso que no existe en el plan devuelve una lista vacía
/// (queda "sin correlativas"); ver `validar_plan` para detectar estos casos.
pub fn resolve_prerequisites(course_key: &str, plan: &Plan) -> Vec<CourseSlug> {
    let key = normalize_key(course_key);
    if key.is_empty() {
        return Vec::new();
    }

    // Vía rápida: plan con tabla canónica ya resuelta
    if let Some(tabla) = plan.correlativas.as_ref() {
        let found = tabla.get(&key).or_else(|| tabla.get(&plan.alias().resolve(&key)));
        return found.map(|v| dedup_en_orden(v.iter().cloned())).unwrap_or_default();
    }

    let canon = plan.alias().resolve(&key);
    let Some(curso) = plan.course(&canon) else {
        return Vec::new();
    };

    dedup_en_orden(curso.prerequisitos.iter().map(|p| plan.alias().resolve(p)))
}
