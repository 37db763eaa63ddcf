//! Configuración desde variables de entorno (y `.env` si existe).

use std::env;
use std::path::PathBuf;

use tracing::warn;

use crate::error::Result;
use crate::gate::{Controlador, GateHandle};
use crate::malla::Plan;
use crate::sync::{LocalCache, MemoryCache, MemoryRemote, SqliteCache, SqliteRemote};

pub const BIND_POR_DEFECTO: &str = "127.0.0.1:8080";
pub const CACHE_POR_DEFECTO: &str = "data/estado_cache.db";
pub const REMOTO_POR_DEFECTO: &str = "data/estado_remoto.db";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    /// `None` = cache en memoria (`:memory:`)
    pub cache_path: Option<PathBuf>,
    /// `None` = almacén remoto en memoria, se pierde al reiniciar
    pub remoto_path: Option<PathBuf>,
    pub estudiante: String,
    pub plan_path: Option<PathBuf>,
    pub validacion_estricta: bool,
}

fn load_dotenv() {
    let _ = dotenv::dotenv();
}

fn es_verdadero(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "si" | "yes")
}

impl Config {
    pub fn from_env() -> Config {
        load_dotenv();
        Config::from_lookup(|k| env::var(k).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Config {
        let ruta = |var: &str, defecto: &str| match get(var) {
            Some(p) if p.trim() == ":memory:" => None,
            Some(p) if !p.trim().is_empty() => Some(PathBuf::from(p.trim())),
            _ => Some(PathBuf::from(defecto)),
        };
        Config {
            bind: get("CORRELATIVAS_BIND").filter(|s| !s.trim().is_empty()).unwrap_or_else(|| BIND_POR_DEFECTO.to_string()),
            cache_path: ruta("CORRELATIVAS_CACHE_PATH", CACHE_POR_DEFECTO),
            remoto_path: ruta("CORRELATIVAS_REMOTO_PATH", REMOTO_POR_DEFECTO),
            estudiante: get("CORRELATIVAS_ESTUDIANTE")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "local".to_string()),
            plan_path: get("CORRELATIVAS_PLAN").filter(|s| !s.trim().is_empty()).map(PathBuf::from),
            validacion_estricta: get("CORRELATIVAS_VALIDACION_ESTRICTA").map(|v| es_verdadero(&v)).unwrap_or(false),
        }
    }

    pub fn abrir_cache(&self) -> Result<Box<dyn LocalCache>> {
        match &self.cache_path {
            Some(path) => Ok(Box::new(SqliteCache::open(path)?)),
            None => Ok(Box::new(MemoryCache::new())),
        }
    }

    /// Cache local + almacén remoto según la configuración, y el controlador
    /// arrancado sobre ellos. Debe llamarse dentro de un runtime de tokio.
    pub fn iniciar(&self, plan: Plan) -> Result<GateHandle> {
        let cache = self.abrir_cache()?;
        match &self.remoto_path {
            Some(path) => {
                let remoto = SqliteRemote::open(path)?;
                Controlador::spawn(plan, &self.estudiante, cache, remoto, self.validacion_estricta)
            }
            None => {
                warn!("almacén remoto en memoria: los estados no sobreviven al reinicio");
                Controlador::spawn(plan, &self.estudiante, cache, MemoryRemote::new(), self.validacion_estricta)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(pares: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pares.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn valores_por_defecto() {
        let c = cfg(&[]);
        assert_eq!(c.bind, BIND_POR_DEFECTO);
        assert_eq!(c.cache_path, Some(PathBuf::from(CACHE_POR_DEFECTO)));
        assert_eq!(c.remoto_path, Some(PathBuf::from(REMOTO_POR_DEFECTO)));
        assert_eq!(c.estudiante, "local");
        assert_eq!(c.plan_path, None);
        assert!(!c.validacion_estricta);
    }

    #[test]
    fn cache_en_memoria_y_modo_estricto() {
        let c = cfg(&[
            ("CORRELATIVAS_CACHE_PATH", ":memory:"),
            ("CORRELATIVAS_REMOTO_PATH", " :memory: "),
            ("CORRELATIVAS_VALIDACION_ESTRICTA", "TRUE"),
            ("CORRELATIVAS_ESTUDIANTE", "ana"),
        ]);
        assert_eq!(c.cache_path, None);
        assert_eq!(c.remoto_path, None);
        assert!(c.validacion_estricta);
        assert_eq!(c.estudiante, "ana");
        assert!(c.abrir_cache().is_ok());
    }
}
