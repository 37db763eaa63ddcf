//! Sincronizador de estados: mapa en proceso + cache local durable + observadores.
//!
//! El remoto lo maneja el controlador (ver `gate`); acá sólo se aplican los
//! cambios locales, los snapshots remotos y las reversiones.

pub mod local;
pub mod remote;

use std::fmt;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::estado::{normalize_entry, normalize_status};
use crate::malla::Plan;
use crate::models::{Estado, StatusEntry, SubjectStatesMap};

pub use local::{EstadosPlanos, LocalCache, MemoryCache, SqliteCache};
pub use remote::{MemoryRemote, RemoteDocument, RemoteFeed, RemoteStore, SqliteRemote};

/// Identidad de un documento de estados: (estudiante, plan).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub estudiante: String,
    pub plan: String,
}

impl DocKey {
    pub fn new(estudiante: impl Into<String>, plan: impl Into<String>) -> Self {
        DocKey { estudiante: estudiante.into(), plan: plan.into() }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.estudiante, self.plan)
    }
}

fn aplanar(estados: &SubjectStatesMap) -> EstadosPlanos {
    estados.iter().map(|(k, e)| (k.clone(), e.status.as_str().to_string())).collect()
}

/// Inserta bajo la identidad canónica del plan. Si dos claves caen en el mismo
/// curso gana la que ya venía canónica.
fn insertar_canonico(estados: &mut SubjectStatesMap, plan: &Plan, clave: &str, entry: StatusEntry) {
    let slug = plan.canonical(clave);
    if slug.is_empty() {
        return;
    }
    if slug == clave {
        estados.insert(slug, entry);
    } else {
        estados.entry(slug).or_insert(entry);
    }
}

/// `completed` nunca viene de la cache: se vuelve a derivar del texto.
fn desde_planos(planos: EstadosPlanos, plan: &Plan) -> SubjectStatesMap {
    let mut estados = SubjectStatesMap::new();
    for (k, v) in planos.iter() {
        if let Some(e) = normalize_status(v) {
            insertar_canonico(&mut estados, plan, k, StatusEntry::new(e));
        }
    }
    estados
}

pub struct Sincronizador {
    key: DocKey,
    estados: SubjectStatesMap,
    cache: Box<dyn LocalCache>,
    observadores: watch::Sender<SubjectStatesMap>,
    /// snapshots remotos aplicados desde que se abrió
    version_remota: u64,
}

impl Sincronizador {
    /// Arranca desde la cache local si existe, sin esperar al remoto.
    pub fn abrir(key: DocKey, cache: Box<dyn LocalCache>, plan: &Plan) -> Result<Self> {
        let estados = cache.load(&key)?.map(|p| desde_planos(p, plan)).unwrap_or_default();
        debug!(doc = %key, cursos = estados.len(), "estados cargados desde cache local");
        let (observadores, _) = watch::channel(estados.clone());
        Ok(Sincronizador { key, estados, cache, observadores, version_remota: 0 })
    }

    pub fn key(&self) -> &DocKey {
        &self.key
    }

    pub fn estados(&self) -> &SubjectStatesMap {
        &self.estados
    }

    pub fn version_remota(&self) -> u64 {
        self.version_remota
    }

    pub fn subscribe(&self) -> watch::Receiver<SubjectStatesMap> {
        self.observadores.subscribe()
    }

    fn publicar(&self) {
        self.observadores.send_replace(self.estados.clone());
    }

    fn persistir(&mut self) -> Result<()> {
        self.cache.store(&self.key, &aplanar(&self.estados))
    }

    /// Aplica el cambio en memoria y en la cache, avisa a los observadores y
    /// devuelve la entrada previa de ese curso para una eventual reversión.
    /// Si la cache falla no se aplica nada.
    pub fn aplicar_optimista(&mut self, slug: &str, estado: Option<Estado>) -> Result<Option<StatusEntry>> {
        let previo = match estado {
            Some(e) => self.estados.insert(slug.to_string(), StatusEntry::new(e)),
            None => self.estados.remove(slug),
        };
        if let Err(e) = self.persistir() {
            self.restaurar_entrada(slug, previo);
            return Err(e);
        }
        self.publicar();
        Ok(previo)
    }

    fn restaurar_entrada(&mut self, slug: &str, previo: Option<StatusEntry>) {
        match previo {
            Some(entry) => {
                self.estados.insert(slug.to_string(), entry);
            }
            None => {
                self.estados.remove(slug);
            }
        }
    }

    /// Deshace un cambio optimista sobre un solo curso; el resto del mapa no se toca.
    pub fn revertir_curso(&mut self, slug: &str, previo: Option<StatusEntry>) {
        self.restaurar_entrada(slug, previo);
        if let Err(e) = self.persistir() {
            warn!(doc = %self.key, error = %e, "no se pudo restaurar la cache local");
        }
        self.publicar();
    }

    /// Vuelve exactamente al snapshot dado.
    pub fn revertir(&mut self, previo: SubjectStatesMap) {
        self.estados = previo;
        if let Err(e) = self.persistir() {
            warn!(doc = %self.key, error = %e, "no se pudo restaurar la cache local");
        }
        self.publicar();
    }

    /// El snapshot remoto reemplaza todo; no se mezclan escrituras pendientes.
    /// Las claves se llevan a la identidad canónica del plan.
    pub fn reemplazar_desde_remoto(&mut self, doc: &RemoteDocument, plan: &Plan) {
        let mut estados = SubjectStatesMap::new();
        for (k, v) in doc.iter() {
            if let Some(entry) = normalize_entry(v) {
                insertar_canonico(&mut estados, plan, k, entry);
            }
        }
        self.estados = estados;
        self.version_remota += 1;
        if let Err(e) = self.persistir() {
            warn!(doc = %self.key, error = %e, "no se pudo actualizar la cache local");
        }
        self.publicar();
    }

    /// Vacía mapa y cache en un solo paso local. Devuelve el snapshot previo.
    pub fn limpiar(&mut self) -> Result<SubjectStatesMap> {
        self.cache.clear(&self.key)?;
        let previo = std::mem::take(&mut self.estados);
        self.publicar();
        Ok(previo)
    }

    /// Cambia de documento (otro plan u otro estudiante) y carga su cache.
    pub fn cambiar_clave(&mut self, key: DocKey, plan: &Plan) -> Result<()> {
        let estados = self.cache.load(&key)?.map(|p| desde_planos(p, plan)).unwrap_or_default();
        self.key = key;
        self.estados = estados;
        self.publicar();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::malla::RawPlan;
    use serde_json::json;

    fn plan() -> Plan {
        Plan::from_raw(RawPlan {
            slug: "ing".into(),
            nombre: String::new(),
            cursos: vec![
                json!({"slug": "a", "nombre": "Curso A"}),
                json!({"slug": "b", "codigo": "MAT-2"}),
                json!({"slug": "c"}),
                json!({"slug": "d"}),
            ],
            correlativas: None,
        })
    }

    fn abrir(cache: &MemoryCache) -> Sincronizador {
        Sincronizador::abrir(DocKey::new("ana", "ing"), Box::new(cache.clone()), &plan()).unwrap()
    }

    #[test]
    fn arranca_desde_cache_y_rederiva_completed() {
        let mut cache = MemoryCache::new();
        let mut planos = EstadosPlanos::new();
        planos.insert("a".into(), "Regular".into());
        planos.insert("b".into(), "basura".into());
        planos.insert("MAT-2".into(), "libre".into());
        cache.store(&DocKey::new("ana", "ing"), &planos).unwrap();

        let s = abrir(&cache);
        assert_eq!(s.estados().len(), 2);
        assert!(s.estados()["a"].completed);
        // alias de la cache -> identidad canónica
        assert_eq!(s.estados()["b"].status, Estado::Libre);
    }

    #[test]
    fn revertir_curso_deja_el_resto() {
        let cache = MemoryCache::new();
        let mut s = abrir(&cache);
        s.aplicar_optimista("a", Some(Estado::Libre)).unwrap();
        let antes = s.estados().clone();

        let previo = s.aplicar_optimista("d", Some(Estado::Aprobada)).unwrap();
        assert_eq!(previo, None);
        let previo_c = s.aplicar_optimista("c", Some(Estado::EnCurso)).unwrap();
        assert_eq!(previo_c, None);

        s.revertir_curso("d", previo);
        assert!(!s.estados().contains_key("d"));
        assert!(s.estados().contains_key("c"));
        s.revertir_curso("c", previo_c);
        assert_eq!(s.estados(), &antes);
        let cacheado = cache.load(s.key()).unwrap().unwrap();
        assert!(!cacheado.contains_key("d"));

        // volver a un valor anterior, no sólo borrar
        let previo_a = s.aplicar_optimista("a", Some(Estado::Regular)).unwrap();
        assert_eq!(previo_a.clone().map(|e| e.status), Some(Estado::Libre));
        s.revertir_curso("a", previo_a);
        assert_eq!(s.estados()["a"].status, Estado::Libre);
    }

    #[test]
    fn snapshot_remoto_reemplaza_todo() {
        let cache = MemoryCache::new();
        let mut s = abrir(&cache);
        let rx = s.subscribe();
        s.aplicar_optimista("a", Some(Estado::Regular)).unwrap();
        assert_eq!(s.version_remota(), 0);

        let mut doc = RemoteDocument::new();
        doc.insert("b".into(), json!({"status": "aprobada", "completed": false}));
        doc.insert("c".into(), json!("en curso"));
        doc.insert("x".into(), json!(null));
        s.reemplazar_desde_remoto(&doc, &plan());

        let visto = rx.borrow().clone();
        assert_eq!(visto.keys().cloned().collect::<Vec<_>>(), vec!["b".to_string(), "c".to_string()]);
        assert!(visto["b"].completed);
        assert_eq!(cache.load(s.key()).unwrap().unwrap()["c"], "en_curso");
        assert_eq!(s.version_remota(), 1);
    }

    #[test]
    fn snapshot_con_alias_y_clave_canonica() {
        let cache = MemoryCache::new();
        let mut s = abrir(&cache);
        let mut doc = RemoteDocument::new();
        doc.insert("Curso A".into(), json!("regular"));
        doc.insert("MAT-2".into(), json!("libre"));
        doc.insert("b".into(), json!("en_curso"));
        s.reemplazar_desde_remoto(&doc, &plan());

        assert_eq!(s.estados().keys().cloned().collect::<Vec<_>>(), vec!["a".to_string(), "b".to_string()]);
        assert!(s.estados()["a"].completed);
        assert_eq!(s.estados()["b"].status, Estado::EnCurso);
    }

    #[test]
    fn limpiar_devuelve_previo() {
        let cache = MemoryCache::new();
        let mut s = abrir(&cache);
        s.aplicar_optimista("a", Some(Estado::Regular)).unwrap();
        let previo = s.limpiar().unwrap();
        assert_eq!(previo.len(), 1);
        assert!(s.estados().is_empty());
        assert_eq!(cache.load(s.key()).unwrap(), None);
    }
}
