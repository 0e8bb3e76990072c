//! Named, parameterized queries over views.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value as JsonValue;
use thiserror::Error;

use eventide_core::RegistrationError;

/// Named query parameters (e.g. `customer_id`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, QueryError> {
        self.get(name)
            .ok_or_else(|| QueryError::MissingParam(name.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("missing query parameter '{0}'")]
    MissingParam(String),

    #[error("unknown view '{0}'")]
    UnknownView(String),

    #[error("cannot encode query result: {0}")]
    Encode(String),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::MissingParam(_) => "missing_param",
            QueryError::UnknownView(_) => "unknown_view",
            QueryError::Encode(_) => "encode",
        }
    }
}

/// A view that can answer a keyed query with a JSON document.
///
/// `Ok(None)` means "no result for these parameters", which is not an error.
pub trait QueryableView: Send + Sync {
    fn name(&self) -> &str;

    fn query(&self, params: &QueryParams) -> Result<Option<JsonValue>, QueryError>;
}

impl<V> QueryableView for Arc<V>
where
    V: QueryableView + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn query(&self, params: &QueryParams) -> Result<Option<JsonValue>, QueryError> {
        (**self).query(params)
    }
}

/// Views exposed for querying, by name.
#[derive(Default)]
pub struct ViewCatalog {
    views: RwLock<HashMap<String, Arc<dyn QueryableView>>>,
}

impl ViewCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, view: Arc<dyn QueryableView>) -> Result<(), RegistrationError> {
        let mut views = self.views.write().unwrap_or_else(PoisonError::into_inner);
        let name = view.name().to_string();
        if views.contains_key(&name) {
            return Err(RegistrationError::DuplicateView(name));
        }
        tracing::info!(view = %name, "view registered for queries");
        views.insert(name, view);
        Ok(())
    }

    pub fn query(
        &self,
        view: &str,
        params: &QueryParams,
    ) -> Result<Option<JsonValue>, QueryError> {
        let target = self
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(view)
            .cloned()
            .ok_or_else(|| QueryError::UnknownView(view.to_string()))?;
        target.query(params)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl core::fmt::Debug for ViewCatalog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ViewCatalog")
            .field("views", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    impl QueryableView for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn query(&self, params: &QueryParams) -> Result<Option<JsonValue>, QueryError> {
            let key = params.require("key")?;
            Ok((key != "none").then(|| json!({ "key": key })))
        }
    }

    #[test]
    fn routes_queries_by_view_name() {
        let catalog = ViewCatalog::new();
        catalog.register(Arc::new(Echo)).unwrap();

        let found = catalog
            .query("echo", &QueryParams::new().with("key", "k1"))
            .unwrap();
        assert_eq!(found, Some(json!({"key": "k1"})));
        assert_eq!(
            catalog
                .query("echo", &QueryParams::new().with("key", "none"))
                .unwrap(),
            None
        );
    }

    #[test]
    fn reports_lookup_errors() {
        let catalog = ViewCatalog::new();
        catalog.register(Arc::new(Echo)).unwrap();

        assert_eq!(
            catalog.register(Arc::new(Echo)).unwrap_err(),
            RegistrationError::DuplicateView("echo".into())
        );
        assert_eq!(
            catalog.query("echo", &QueryParams::new()).unwrap_err().code(),
            "missing_param"
        );
        assert_eq!(
            catalog.query("other", &QueryParams::new()).unwrap_err().code(),
            "unknown_view"
        );
    }
}
