//! Cache local durable de estados, una entrada por (estudiante, plan).
//!
//! Sólo se guarda el mapa plano {slug -> texto del estado}; `completed` no se
//! cachea y se vuelve a derivar con el modelo de estados al leer.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::CourseSlug;
use crate::sync::DocKey;

/// Mapa plano tal como se persiste localmente.
pub type EstadosPlanos = BTreeMap<CourseSlug, String>;

/// Backend de cache local. Cada `store` reemplaza la entrada completa en un solo paso.
pub trait LocalCache: Send {
    fn load(&self, key: &DocKey) -> Result<Option<EstadosPlanos>>;
    fn store(&mut self, key: &DocKey, estados: &EstadosPlanos) -> Result<()>;
    fn clear(&mut self, key: &DocKey) -> Result<()>;
}

pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    /// Abre (o crea) la base SQLite en `path`, creando el directorio si hace falta.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(dir) = path.as_ref().parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS estado_cache (
                estudiante TEXT NOT NULL,
                plan TEXT NOT NULL,
                datos TEXT NOT NULL,
                ts TEXT NOT NULL,
                PRIMARY KEY (estudiante, plan)
            )",
            [],
        )?;
        Ok(SqliteCache { conn })
    }
}

impl LocalCache for SqliteCache {
    fn load(&self, key: &DocKey) -> Result<Option<EstadosPlanos>> {
        let datos: Option<String> = self
            .conn
            .query_row(
                "SELECT datos FROM estado_cache WHERE estudiante = ?1 AND plan = ?2",
                params![key.estudiante, key.plan],
                |row| row.get(0),
            )
            .optional()?;
        match datos {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn store(&mut self, key: &DocKey, estados: &EstadosPlanos) -> Result<()> {
        let json = serde_json::to_string(estados)?;
        self.conn.execute(
            "REPLACE INTO estado_cache (estudiante, plan, datos, ts) VALUES (?1, ?2, ?3, ?4)",
            params![key.estudiante, key.plan, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn clear(&mut self, key: &DocKey) -> Result<()> {
        self.conn.execute(
            "DELETE FROM estado_cache WHERE estudiante = ?1 AND plan = ?2",
            params![key.estudiante, key.plan],
        )?;
        Ok(())
    }
}

/// Cache en memoria. Los clones comparten el mismo contenido.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<Mutex<HashMap<DocKey, EstadosPlanos>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<DocKey, EstadosPlanos>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LocalCache for MemoryCache {
    fn load(&self, key: &DocKey) -> Result<Option<EstadosPlanos>> {
        Ok(self.guard().get(key).cloned())
    }

    fn store(&mut self, key: &DocKey, estados: &EstadosPlanos) -> Result<()> {
        self.guard().insert(key.clone(), estados.clone());
        Ok(())
    }

    fn clear(&mut self, key: &DocKey) -> Result<()> {
        self.guard().remove(key);
        Ok(())
    }
}
