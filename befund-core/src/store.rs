//! Persistence for templates and the correction dictionary.
//!
//! Both are stored as pretty-printed JSON arrays. A missing file is not an error:
//! the shipped defaults are returned instead, so a fresh installation starts with
//! working templates and dictionary.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info};

use crate::corrections::default_corrections;
use crate::models::{CorrectionEntry, Template};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage backend for templates
pub trait TemplateStore {
    fn load(&self) -> Result<Vec<Template>>;

    /// Insert or replace by id, bumping `updated_at`
    fn save(&self, template: Template) -> Result<Template>;

    /// Returns false when no template had that id
    fn delete(&self, id: &str) -> Result<bool>;
}

/// Templates shipped with a fresh installation
pub fn seed_templates() -> Vec<Template> {
    vec![
        Template::new(
            "tpl-ct-abdomen",
            "CT Abdomen",
            &["abdomen", "leber", "milz", "niere", "pankreas", "gallenblase"],
            "Leber normal gross, homogen, ohne fokale Läsionen. Keine intra- oder extrahepatische Cholestase.\n\n\
             Gallenblase zartwandig, ohne Konkremente.\n\n\
             Milz normal gross.\n\n\
             Pankreas regelrecht abgrenzbar.\n\n\
             Nieren beidseits normal gross, kein Harnstau.\n\n\
             Keine vergrösserten Lymphknoten. Keine freie Flüssigkeit.",
        ),
        Template::new(
            "tpl-ct-thorax",
            "CT Thorax",
            &["thorax", "lunge", "pleura", "mediastinum", "herz"],
            "Lungen beidseits regelrecht belüftet, keine Infiltrate, keine Rundherde.\n\n\
             Kein Pleuraerguss, kein Pneumothorax.\n\n\
             Mediastinum und Hili ohne vergrösserte Lymphknoten.\n\n\
             Herz normal gross, kein Perikarderguss.",
        ),
        Template::new(
            "tpl-mrt-knie",
            "MRT Knie",
            &["knie", "meniskus", "kreuzband", "patella", "knorpel"],
            "Innen- und Aussenmeniskus ohne Rissbildung.\n\n\
             Vorderes und hinteres Kreuzband intakt. Seitenbänder intakt.\n\n\
             Knorpel femorotibial und retropatellar ohne Defekte.\n\n\
             Kein Gelenkerguss. Kein Knochenmarködem.",
        ),
        Template::new(
            "tpl-mrt-schaedel",
            "MRT Schädel",
            &["schädel", "kopf", "hirn", "gehirn", "ventrikel"],
            "Keine Diffusionsstörung. Keine intrakranielle Blutung.\n\n\
             Normal weite innere und äussere Liquorräume, Mittellinie nicht verlagert.\n\n\
             Keine pathologische Kontrastmittelaufnahme.",
        ),
    ]
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let content = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, content).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn upsert(templates: &mut Vec<Template>, mut template: Template) -> Template {
    template.touch();
    match templates.iter_mut().find(|t| t.id == template.id) {
        Some(existing) => *existing = template.clone(),
        None => templates.push(template.clone()),
    }
    template
}

/// Templates kept in a JSON file
#[derive(Debug, Clone)]
pub struct JsonTemplateStore {
    path: PathBuf,
}

impl JsonTemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemplateStore for JsonTemplateStore {
    fn load(&self) -> Result<Vec<Template>> {
        match read_json(&self.path)? {
            Some(templates) => Ok(templates),
            None => {
                debug!("No template file at {:?}, using seed templates", self.path);
                Ok(seed_templates())
            }
        }
    }

    fn save(&self, template: Template) -> Result<Template> {
        let mut templates = self.load()?;
        let saved = upsert(&mut templates, template);
        write_json(&self.path, &templates)?;
        info!("Saved template '{}' to {:?}", saved.name, self.path);
        Ok(saved)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut templates = self.load()?;
        let before = templates.len();
        templates.retain(|t| t.id != id);
        if templates.len() == before {
            return Ok(false);
        }
        write_json(&self.path, &templates)?;
        info!("Deleted template {} from {:?}", id, self.path);
        Ok(true)
    }
}

/// In-memory templates, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: Mutex<Vec<Template>>,
}

impl MemoryTemplateStore {
    pub fn new(templates: Vec<Template>) -> Self {
        Self {
            templates: Mutex::new(templates),
        }
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn load(&self) -> Result<Vec<Template>> {
        Ok(self.templates.lock().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn save(&self, template: Template) -> Result<Template> {
        let mut templates = self.templates.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(upsert(&mut templates, template))
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut templates = self.templates.lock().map_err(|_| StoreError::Poisoned)?;
        let before = templates.len();
        templates.retain(|t| t.id != id);
        Ok(templates.len() != before)
    }
}

/// Load the correction dictionary, or the shipped one when the file is missing
pub fn load_corrections(path: &Path) -> Result<Vec<CorrectionEntry>> {
    Ok(read_json(path)?.unwrap_or_else(|| {
        debug!("No dictionary at {:?}, using defaults", path);
        default_corrections()
    }))
}

pub fn save_corrections(path: &Path, corrections: &[CorrectionEntry]) -> Result<()> {
    write_json(path, &corrections)?;
    info!("Saved {} dictionary entries to {:?}", corrections.len(), path);
    Ok(())
}
