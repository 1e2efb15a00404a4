//! # Adapter Directory
//!
//! Maps `(module, integration name)` to an adapter. A generic module such as
//! the trade module asks for `"uniswap"` and gets whatever the admin bound
//! for *that module* under that name; another module may bind the same name
//! to something else entirely. Keys are exact and case-sensitive.
//!
//! Only the admin binds. A module can never point itself at an adapter of
//! its choosing.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::adapter::Adapter;
use crate::config::MAX_INTEGRATION_NAME_LEN;
use crate::error::LedgerError;
use crate::types::Address;

/// One binding, as listed by [`AdapterDirectory::bindings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationBinding {
    /// Module the binding belongs to.
    pub module: Address,
    /// Integration name the module looks up.
    pub name: String,
    /// [`Adapter::name`] of the bound adapter.
    pub adapter: String,
}

/// Integration bindings, shared by every basket.
#[derive(Debug, Clone)]
pub struct AdapterDirectory {
    admin: Address,
    bindings: HashMap<(Address, String), Arc<dyn Adapter>>,
}

impl AdapterDirectory {
    /// Creates an empty directory governed by `admin`.
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            bindings: HashMap::new(),
        }
    }

    /// Adapter bound to `(module, name)`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownIntegration`] if there is no such binding.
    pub fn resolve(&self, module: &Address, name: &str) -> Result<Arc<dyn Adapter>, LedgerError> {
        self.bindings
            .get(&(module.clone(), name.to_string()))
            .cloned()
            .ok_or_else(|| LedgerError::UnknownIntegration {
                module: module.clone(),
                name: name.to_string(),
            })
    }

    /// Binds `adapter` to `(module, name)`, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] unless `caller` is the admin;
    /// [`LedgerError::InvalidArgument`] for an empty or oversized name.
    pub fn bind(
        &mut self,
        caller: &Address,
        module: Address,
        name: &str,
        adapter: Arc<dyn Adapter>,
    ) -> Result<(), LedgerError> {
        self.require_admin(caller, "bind integrations")?;
        validate_name(name)?;
        info!(module = %module, name, adapter = adapter.name(), "integration bound");
        self.bindings.insert((module, name.to_string()), adapter);
        Ok(())
    }

    /// Removes the binding for `(module, name)`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownIntegration`] if there was none.
    pub fn unbind(&mut self, caller: &Address, module: &Address, name: &str) -> Result<(), LedgerError> {
        self.require_admin(caller, "unbind integrations")?;
        self.bindings
            .remove(&(module.clone(), name.to_string()))
            .ok_or_else(|| LedgerError::UnknownIntegration {
                module: module.clone(),
                name: name.to_string(),
            })?;
        info!(module = %module, name, "integration unbound");
        Ok(())
    }

    /// Every binding, sorted by module then name.
    pub fn bindings(&self) -> Vec<IntegrationBinding> {
        let mut listed: Vec<IntegrationBinding> = self
            .bindings
            .iter()
            .map(|((module, name), adapter)| IntegrationBinding {
                module: module.clone(),
                name: name.clone(),
                adapter: adapter.name().to_string(),
            })
            .collect();
        listed.sort_by(|a, b| (&a.module, &a.name).cmp(&(&b.module, &b.name)));
        listed
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn require_admin(&self, caller: &Address, action: &str) -> Result<(), LedgerError> {
        if caller != &self.admin {
            return Err(LedgerError::unauthorized(caller, action));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), LedgerError> {
    if name.is_empty() || name.len() > MAX_INTEGRATION_NAME_LEN {
        return Err(LedgerError::InvalidArgument(format!(
            "integration name must be 1..={MAX_INTEGRATION_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{CallData, Intent, Invocation, Quote, TokenFlow};
    use crate::engine::Engine;

    #[derive(Debug)]
    struct NamedAdapter(&'static str);

    impl Adapter for NamedAdapter {
        fn name(&self) -> &str {
            self.0
        }

        fn quote(&self, _: &Engine, _: &Address, _: &Intent) -> Result<Quote, LedgerError> {
            Err(LedgerError::AdapterFailure("quotes nothing".into()))
        }

        fn execute(&self, _: &mut Invocation<'_>, _: &CallData) -> Result<Vec<TokenFlow>, LedgerError> {
            Ok(Vec::new())
        }
    }

    fn admin() -> Address {
        Address::new("admin")
    }

    #[test]
    fn resolve_unknown_fails() {
        let dir = AdapterDirectory::new(admin());
        let err = dir.resolve(&"trade".into(), "UNKNOWN").unwrap_err();
        assert_eq!(
            err,
            LedgerError::UnknownIntegration {
                module: "trade".into(),
                name: "UNKNOWN".into()
            }
        );
    }

    #[test]
    fn bindings_are_per_module() {
        let mut dir = AdapterDirectory::new(admin());
        dir.bind(&admin(), "trade".into(), "dex", Arc::new(NamedAdapter("a")))
            .unwrap();
        dir.bind(&admin(), "amm".into(), "dex", Arc::new(NamedAdapter("b")))
            .unwrap();

        assert_eq!(dir.resolve(&"trade".into(), "dex").unwrap().name(), "a");
        assert_eq!(dir.resolve(&"amm".into(), "dex").unwrap().name(), "b");
        assert!(dir.resolve(&"trade".into(), "DEX").is_err());
    }

    #[test]
    fn rebinding_overwrites() {
        let mut dir = AdapterDirectory::new(admin());
        dir.bind(&admin(), "trade".into(), "dex", Arc::new(NamedAdapter("v1")))
            .unwrap();
        dir.bind(&admin(), "trade".into(), "dex", Arc::new(NamedAdapter("v2")))
            .unwrap();
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.resolve(&"trade".into(), "dex").unwrap().name(), "v2");
    }

    #[test]
    fn module_cannot_bind_for_itself() {
        let mut dir = AdapterDirectory::new(admin());
        let err = dir
            .bind(&"trade".into(), "trade".into(), "dex", Arc::new(NamedAdapter("x")))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        assert!(dir.is_empty());
    }

    #[test]
    fn unbind_removes_binding() {
        let mut dir = AdapterDirectory::new(admin());
        dir.bind(&admin(), "trade".into(), "dex", Arc::new(NamedAdapter("x")))
            .unwrap();
        dir.unbind(&admin(), &"trade".into(), "dex").unwrap();
        assert!(dir.resolve(&"trade".into(), "dex").is_err());
        assert!(dir.unbind(&admin(), &"trade".into(), "dex").is_err());
    }

    #[test]
    fn empty_names_rejected() {
        let mut dir = AdapterDirectory::new(admin());
        assert!(matches!(
            dir.bind(&admin(), "trade".into(), "", Arc::new(NamedAdapter("x"))),
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn listing_is_sorted() {
        let mut dir = AdapterDirectory::new(admin());
        dir.bind(&admin(), "trade".into(), "zeta", Arc::new(NamedAdapter("z")))
            .unwrap();
        dir.bind(&admin(), "amm".into(), "alpha", Arc::new(NamedAdapter("a")))
            .unwrap();
        let names: Vec<_> = dir.bindings().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
