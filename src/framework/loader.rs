//! Loading suites: listings and spec files
//!
//! The tree builder only talks to a [`TestFileLoader`]. [`SuiteRegistry`] is
//! the in-process implementation: suites and their spec files are registered
//! explicitly, and each spec file is built the first time it is imported.

use super::test_group::TestGroup;
use crate::utils::{ListingError, SpecLoadError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// One entry of a suite listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    /// Description of a directory (an empty path describes the suite)
    Readme { path: Vec<String>, readme: String },
    /// A spec file
    Spec { path: Vec<String> },
}

impl ListingEntry {
    pub fn path(&self) -> &[String] {
        match self {
            Self::Readme { path, .. } | Self::Spec { path } => path,
        }
    }
}

/// An imported spec file
#[derive(Clone)]
pub struct SpecFile {
    pub description: String,
    pub g: Arc<TestGroup>,
}

/// Per-test metadata, keyed by test query in [`ListingMeta`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMeta {
    /// Average time per subcase, in milliseconds
    #[serde(rename = "subcaseMS", default, skip_serializing_if = "Option::is_none")]
    pub subcase_ms: Option<f64>,
}

/// Optional listing metadata, `{"suite:file:test:*": {"subcaseMS": n}}`
pub type ListingMeta = BTreeMap<String, TestMeta>;

/// Source of suite listings and spec files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TestFileLoader: Send + Sync {
    /// Everything in a suite, in listing order
    async fn listing(&self, suite: &str) -> Result<Vec<ListingEntry>, ListingError>;

    /// Import one spec file
    async fn import_spec(&self, suite: &str, path: &[String]) -> Result<SpecFile, SpecLoadError>;

    /// Metadata checked by validation, if the suite has any
    async fn listing_meta(&self, _suite: &str) -> Option<ListingMeta> {
        None
    }
}

type SpecFactory = Arc<dyn Fn() -> TestGroup + Send + Sync>;

enum Registered {
    Readme(String),
    Spec {
        description: String,
        factory: SpecFactory,
    },
}

#[derive(Default)]
struct RegisteredSuite {
    entries: Vec<(Vec<String>, Registered)>,
    meta: Option<ListingMeta>,
}

/// Explicit in-process registry of suites
#[derive(Default)]
pub struct SuiteRegistry {
    suites: HashMap<String, RegisteredSuite>,
    imported: Mutex<HashMap<(String, Vec<String>), Arc<TestGroup>>>,
}

fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split(crate::query::PATH_SEPARATOR).map(str::to_string).collect()
    }
}

impl SuiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Describe a directory; `path` is `,`-separated, empty for the suite
    pub fn add_readme(&mut self, suite: &str, path: &str, readme: impl Into<String>) -> &mut Self {
        self.suites
            .entry(suite.to_string())
            .or_default()
            .entries
            .push((split_path(path), Registered::Readme(readme.into())));
        self
    }

    /// Register a spec file; `build` declares its tests when it is imported
    pub fn add_spec<F>(&mut self, suite: &str, path: &str, description: impl Into<String>, build: F) -> &mut Self
    where
        F: Fn(&mut TestGroup) + Send + Sync + 'static,
    {
        let factory: SpecFactory = Arc::new(move || {
            let mut g = TestGroup::new();
            build(&mut g);
            g
        });
        self.suites
            .entry(suite.to_string())
            .or_default()
            .entries
            .push((
                split_path(path),
                Registered::Spec {
                    description: description.into(),
                    factory,
                },
            ));
        self
    }

    pub fn set_listing_meta(&mut self, suite: &str, meta: ListingMeta) -> &mut Self {
        self.suites.entry(suite.to_string()).or_default().meta = Some(meta);
        self
    }

    pub fn suite_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.suites.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl TestFileLoader for SuiteRegistry {
    async fn listing(&self, suite: &str) -> Result<Vec<ListingEntry>, ListingError> {
        let registered = self
            .suites
            .get(suite)
            .ok_or_else(|| ListingError::SuiteNotFound(suite.to_string()))?;
        Ok(registered
            .entries
            .iter()
            .map(|(path, entry)| match entry {
                Registered::Readme(readme) => ListingEntry::Readme {
                    path: path.clone(),
                    readme: readme.clone(),
                },
                Registered::Spec { .. } => ListingEntry::Spec { path: path.clone() },
            })
            .collect())
    }

    async fn import_spec(&self, suite: &str, path: &[String]) -> Result<SpecFile, SpecLoadError> {
        let registered = self
            .suites
            .get(suite)
            .ok_or_else(|| SpecLoadError::new(suite, path, "suite not found"))?;
        let (description, factory) = registered
            .entries
            .iter()
            .find_map(|(p, entry)| match entry {
                Registered::Spec {
                    description,
                    factory,
                } if p.as_slice() == path => Some((description, factory)),
                _ => None,
            })
            .ok_or_else(|| SpecLoadError::new(suite, path, "no such spec file"))?;

        let key = (suite.to_string(), path.to_vec());
        let cached = self
            .imported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        let g = match cached {
            Some(g) => g,
            None => {
                let g = (factory.as_ref())();
                let errors = g.definition_errors();
                if !errors.is_empty() {
                    return Err(SpecLoadError::new(suite, path, errors.join("; ")));
                }
                let g = Arc::new(g);
                log::debug!("imported {}:{} ({} tests)", suite, path.join(","), g.len());
                self.imported
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, g.clone());
                g
            }
        };
        Ok(SpecFile {
            description: description.clone(),
            g,
        })
    }

    async fn listing_meta(&self, suite: &str) -> Option<ListingMeta> {
        self.suites.get(suite)?.meta.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SuiteRegistry {
        let mut r = SuiteRegistry::new();
        r.add_readme("s", "", "suite readme")
            .add_spec("s", "a,b", "file ab", |g| {
                g.test("t").test_fn(|_| async { Ok(()) });
            })
            .add_spec("s", "bad", "broken file", |g| {
                g.test("t").params(|u| u.combine("x", [1]).combine("x", [2]));
            });
        r
    }

    #[tokio::test]
    async fn test_listing() {
        let r = registry();
        let listing = r.listing("s").await.unwrap();
        assert_eq!(listing.len(), 3);
        assert_eq!(
            listing[0],
            ListingEntry::Readme {
                path: Vec::new(),
                readme: "suite readme".to_string()
            }
        );
        assert_eq!(listing[1].path(), ["a", "b"]);
        assert_eq!(
            r.listing("nope").await,
            Err(ListingError::SuiteNotFound("nope".to_string()))
        );
    }

    #[tokio::test]
    async fn test_import_spec_is_cached() {
        let r = registry();
        let path = vec!["a".to_string(), "b".to_string()];
        let first = r.import_spec("s", &path).await.unwrap();
        let second = r.import_spec("s", &path).await.unwrap();
        assert_eq!(first.description, "file ab");
        assert!(Arc::ptr_eq(&first.g, &second.g));
    }

    #[tokio::test]
    async fn test_definition_errors_fail_import() {
        let r = registry();
        let err = r.import_spec("s", &["bad".to_string()]).await.err().unwrap();
        assert!(err.message.contains("duplicate parameter axis"));
        assert!(r.import_spec("s", &["zzz".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_listing_meta_defaults_to_none() {
        let mut r = registry();
        assert!(r.listing_meta("s").await.is_none());
        let mut meta = ListingMeta::new();
        meta.insert("s:a,b:t:*".to_string(), TestMeta { subcase_ms: Some(1.5) });
        r.set_listing_meta("s", meta);
        assert_eq!(r.listing_meta("s").await.unwrap().len(), 1);
    }
}
