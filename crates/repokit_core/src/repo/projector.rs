//! Record -> model attribute projection.

use super::config::{AttributeLoader, WithSpec};
use super::RepoResult;
use crate::lookup::ClassRegistry;
use crate::model::{Attribute, AttributeSet, Unloaded};
use crate::record::Record;
use rusqlite::Connection;

/// What a nested loader gets to work with.
pub struct LoadContext<'c> {
    pub conn: &'c Connection,
    pub registry: &'c ClassRegistry,
    /// Name of the model being projected.
    pub model: &'c str,
    /// Nested selection for the bundle being loaded.
    pub with: &'c WithSpec,
}

/// Projector built by `Config::record_to_hash`; immutable once built.
#[derive(Debug, Clone)]
pub struct RecordToHash {
    pub(crate) model: String,
    pub(crate) only: Option<Vec<String>>,
    pub(crate) except: Option<Vec<String>>,
    /// Attributes of bundles that were not requested.
    pub(crate) inactive: Vec<String>,
    pub(crate) extra: Vec<(String, AttributeLoader, WithSpec)>,
    pub(crate) always: Vec<String>,
}

impl RecordToHash {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn call(
        &self,
        conn: &Connection,
        registry: &ClassRegistry,
        record: &Record,
    ) -> RepoResult<AttributeSet> {
        let mut attributes = AttributeSet::new(&self.model);
        for (name, value) in record.to_hash() {
            if !self.keeps(name) {
                continue;
            }
            attributes.insert(name.clone(), Attribute::Loaded(value.clone()));
        }

        for (name, loader, nested) in &self.extra {
            let context = LoadContext {
                conn,
                registry,
                model: &self.model,
                with: nested,
            };
            attributes.insert(name.clone(), Attribute::Loaded(loader.load(&context, record)?));
        }

        for name in &self.always {
            if !attributes.contains(name) {
                attributes.insert(
                    name.clone(),
                    Attribute::Unloaded(Unloaded::new(&self.model, name)),
                );
            }
        }
        Ok(attributes)
    }

    fn keeps(&self, name: &str) -> bool {
        if self.inactive.iter().any(|inactive| inactive == name) {
            return false;
        }
        match (&self.only, &self.except) {
            (Some(only), _) => only.iter().any(|kept| kept == name),
            (None, Some(except)) => !except.iter().any(|dropped| dropped == name),
            (None, None) => true,
        }
    }
}
