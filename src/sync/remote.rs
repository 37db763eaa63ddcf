//! Almacén remoto autoritativo de estados.
//!
//! El almacén real (documento hospedado por estudiante y plan) es un
//! colaborador externo; `RemoteStore` es la costura. `MemoryRemote` es un
//! almacén de documentos en proceso con la misma semántica: un documento por
//! (estudiante, plan), escrituras por curso, hora de actualización asignada por
//! el servidor y un feed de snapshots completos para cada suscriptor.
//! `SqliteRemote` guarda los documentos en disco para que sobrevivan al reinicio
//! del proceso; sus suscriptores siguen siendo locales.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{CorrelativasError, Result};
use crate::models::{CourseSlug, StatusEntry};
use crate::sync::DocKey;

/// Snapshot completo de un documento remoto. Los valores pueden venir en
/// cualquiera de las formas que acepta `normalize_entry`.
pub type RemoteDocument = BTreeMap<CourseSlug, Value>;

/// Feed de snapshots. Soltar el receptor cancela la suscripción.
pub type RemoteFeed = mpsc::UnboundedReceiver<RemoteDocument>;

pub trait RemoteStore: Clone + Send + Sync + 'static {
    /// Escribe (o reemplaza) la entrada de un solo curso.
    fn put_entry(&self, key: &DocKey, slug: &str, entry: &StatusEntry) -> impl Future<Output = Result<()>> + Send;

    /// Borra la entrada de un curso. Borrar algo que no existe no es un error.
    fn delete_entry(&self, key: &DocKey, slug: &str) -> impl Future<Output = Result<()>> + Send;

    /// Observa el documento; cada cambio llega como snapshot completo.
    fn subscribe(&self, key: &DocKey) -> RemoteFeed;
}

type Suscriptores = HashMap<DocKey, Vec<mpsc::UnboundedSender<RemoteDocument>>>;

fn difundir(subs: &mut Suscriptores, key: &DocKey, doc: &RemoteDocument) {
    if let Some(lista) = subs.get_mut(key) {
        lista.retain(|tx| tx.send(doc.clone()).is_ok());
    }
}

/// Valor tal como lo guarda el servidor: estado, flag derivado y hora propia.
fn valor_servidor(entry: &StatusEntry) -> Value {
    json!({
        "status": entry.status.as_str(),
        "completed": entry.completed,
        "updated_at": Utc::now().to_rfc3339(),
    })
}

#[derive(Default)]
struct EstadoRemoto {
    docs: HashMap<DocKey, RemoteDocument>,
    subs: Suscriptores,
    offline: bool,
    rechazados: HashSet<CourseSlug>,
    latencia: Option<Duration>,
}

impl EstadoRemoto {
    fn publicar(&mut self, key: &DocKey) {
        let doc = self.docs.get(key).cloned().unwrap_or_default();
        difundir(&mut self.subs, key, &doc);
    }

    fn verificar(&self, slug: &str, operacion: &str) -> Result<()> {
        if self.offline {
            return Err(CorrelativasError::FallaSincronizacion(format!("{operacion} '{slug}': sin conexión")));
        }
        if self.rechazados.contains(slug) {
            return Err(CorrelativasError::FallaSincronizacion(format!("{operacion} '{slug}': permiso denegado")));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<EstadoRemoto>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, EstadoRemoto> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Demora artificial antes de resolver cada escritura/borrado.
    pub fn with_latency(self, latencia: Duration) -> Self {
        self.guard().latencia = Some(latencia);
        self
    }

    /// Sin conexión: toda escritura se rechaza y los nuevos suscriptores no reciben
    /// snapshot. Al reconectar se reenvía el documento actual a todos.
    pub fn set_offline(&self, offline: bool) {
        let mut st = self.guard();
        st.offline = offline;
        if !offline {
            let keys: Vec<DocKey> = st.subs.keys().cloned().collect();
            for key in keys.iter() {
                st.publicar(key);
            }
        }
    }

    /// Rechaza toda escritura/borrado sobre `slug` (simula reglas de permiso).
    pub fn rechazar(&self, slug: &str) {
        self.guard().rechazados.insert(slug.to_string());
    }

    pub fn permitir(&self, slug: &str) {
        self.guard().rechazados.remove(slug);
    }

    pub fn documento(&self, key: &DocKey) -> RemoteDocument {
        self.guard().docs.get(key).cloned().unwrap_or_default()
    }

    /// Escritura directa de otro cliente (o de datos heredados), sin validar la forma.
    pub fn insertar_crudo(&self, key: &DocKey, slug: &str, valor: Value) {
        let mut st = self.guard();
        st.docs.entry(key.clone()).or_default().insert(slug.to_string(), valor);
        st.publicar(key);
    }

    pub fn suscriptores(&self, key: &DocKey) -> usize {
        self.guard().subs.get(key).map(|s| s.iter().filter(|tx| !tx.is_closed()).count()).unwrap_or(0)
    }

    async fn demora(&self) {
        let latencia = self.guard().latencia;
        if let Some(d) = latencia {
            tokio::time::sleep(d).await;
        }
    }
}

impl RemoteStore for MemoryRemote {
    async fn put_entry(&self, key: &DocKey, slug: &str, entry: &StatusEntry) -> Result<()> {
        self.demora().await;
        let mut st = self.guard();
        st.verificar(slug, "escritura")?;
        let valor = valor_servidor(entry);
        st.docs.entry(key.clone()).or_default().insert(slug.to_string(), valor);
        st.publicar(key);
        Ok(())
    }

    async fn delete_entry(&self, key: &DocKey, slug: &str) -> Result<()> {
        self.demora().await;
        let mut st = self.guard();
        st.verificar(slug, "borrado")?;
        let borrado = st.docs.get_mut(key).map(|doc| doc.remove(slug).is_some()).unwrap_or(false);
        if borrado {
            st.publicar(key);
        }
        Ok(())
    }

    fn subscribe(&self, key: &DocKey) -> RemoteFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut st = self.guard();
        if !st.offline {
            let doc = st.docs.get(key).cloned().unwrap_or_default();
            let _ = tx.send(doc);
        }
        st.subs.entry(key.clone()).or_default().push(tx);
        rx
    }
}

/// Almacén remoto durable: una fila por (estudiante, plan, curso) con el valor
/// en JSON. Los clones comparten conexión y suscriptores.
#[derive(Clone)]
pub struct SqliteRemote {
    conn: Arc<Mutex<Connection>>,
    subs: Arc<Mutex<Suscriptores>>,
}

impl SqliteRemote {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documento (
                estudiante TEXT NOT NULL,
                plan TEXT NOT NULL,
                curso TEXT NOT NULL,
                valor TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (estudiante, plan, curso)
            )",
            [],
        )?;
        Ok(SqliteRemote { conn: Arc::new(Mutex::new(conn)), subs: Arc::new(Mutex::new(HashMap::new())) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn subs(&self) -> MutexGuard<'_, Suscriptores> {
        self.subs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn documento(&self, key: &DocKey) -> Result<RemoteDocument> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT curso, valor FROM documento WHERE estudiante = ?1 AND plan = ?2")?;
        let filas = stmt.query_map(params![key.estudiante, key.plan], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut doc = RemoteDocument::new();
        for fila in filas {
            let (curso, valor) = fila?;
            doc.insert(curso, serde_json::from_str(&valor)?);
        }
        Ok(doc)
    }

    fn publicar(&self, key: &DocKey) -> Result<()> {
        let doc = self.documento(key)?;
        difundir(&mut self.subs(), key, &doc);
        Ok(())
    }
}

impl RemoteStore for SqliteRemote {
    async fn put_entry(&self, key: &DocKey, slug: &str, entry: &StatusEntry) -> Result<()> {
        let valor = valor_servidor(entry);
        self.conn().execute(
            "REPLACE INTO documento (estudiante, plan, curso, valor, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key.estudiante, key.plan, slug, valor.to_string(), Utc::now().to_rfc3339()],
        )?;
        self.publicar(key)
    }

    async fn delete_entry(&self, key: &DocKey, slug: &str) -> Result<()> {
        let borradas = self.conn().execute(
            "DELETE FROM documento WHERE estudiante = ?1 AND plan = ?2 AND curso = ?3",
            params![key.estudiante, key.plan, slug],
        )?;
        if borradas > 0 {
            self.publicar(key)?;
        }
        Ok(())
    }

    fn subscribe(&self, key: &DocKey) -> RemoteFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.documento(key) {
            Ok(doc) => {
                let _ = tx.send(doc);
            }
            // sin snapshot inicial; el próximo cambio lo trae
            Err(e) => warn!(doc = %key, error = %e, "no se pudo leer el documento remoto"),
        }
        self.subs().entry(key.clone()).or_default().push(tx);
        rx
    }
}
