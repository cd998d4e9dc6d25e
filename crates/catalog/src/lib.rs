//! Instance catalog: the ordered set of data instances the viewer may use.

use std::collections::HashSet;

use serde::Deserialize;

mod instance;

pub use instance::Instance;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate instance name in catalog: {0}")]
    DuplicateName(String),
    #[error("instance configuration is invalid: {0}")]
    Config(#[from] serde_json::Error),
}

/// Ordered set of instances with unique names.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Catalog {
    instances: Vec<Instance>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(instances: Vec<Instance>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(instances.len());
        for inst in &instances {
            if !seen.insert(inst.name.as_str()) {
                return Err(CatalogError::DuplicateName(inst.name.clone()));
            }
        }
        Ok(Self { instances })
    }

    /// Keep the configured instances whose name is in `verified_names`,
    /// in configuration order.
    pub fn from_verified<'a>(
        configured: &[Instance],
        verified_names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, CatalogError> {
        let verified: HashSet<&str> = verified_names.into_iter().collect();
        let kept = configured
            .iter()
            .filter(|inst| verified.contains(inst.name.as_str()))
            .cloned()
            .collect();
        Self::new(kept)
    }

    /// Copy of this catalog with `instance` added. A same-named entry is
    /// replaced in place; otherwise the instance is appended.
    pub fn with_instance(&self, instance: Instance) -> Self {
        let mut instances = self.instances.clone();
        match instances.iter_mut().find(|inst| inst.name == instance.name) {
            Some(slot) => *slot = instance,
            None => instances.push(instance),
        }
        Self { instances }
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|inst| inst.name == name)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Instance> {
        self.instances.iter().find(|inst| inst.id == id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instances.iter().map(|inst| inst.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Instance;
    type IntoIter = std::slice::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.instances.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InstancesFile {
    List(Vec<Instance>),
    Wrapped { instances: Vec<Instance> },
}

/// Parse the configured instance list.
///
/// Accepts either a bare JSON array or an object with an `instances` array.
pub fn parse_instances(text: &str) -> Result<Vec<Instance>, CatalogError> {
    let file: InstancesFile = serde_json::from_str(text)?;
    Ok(match file {
        InstancesFile::List(instances) => instances,
        InstancesFile::Wrapped { instances } => instances,
    })
}
