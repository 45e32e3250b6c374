//! Lookup of monitoring policies by method identity.
//!
//! Resolution order is method, then owning type, then the layer default.
//! Resolution happens once, when a method is wrapped, never per call.

use clinic_monitor_domain::{
    Layer, LayerDefaults, MethodId, MonitorPolicy, PolicySource, PolicyTarget, ResolvedPolicy,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Registered policies plus the layer defaults they override.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    methods: HashMap<MethodId, MonitorPolicy>,
    types: HashMap<Arc<str>, MonitorPolicy>,
    layers: LayerDefaults,
}

impl PolicyTable {
    /// Empty table over the given layer defaults.
    #[must_use]
    pub fn new(layers: LayerDefaults) -> Self {
        Self {
            methods: HashMap::new(),
            types: HashMap::new(),
            layers,
        }
    }

    /// Build a table from `(target, policy)` pairs; later entries win.
    #[must_use]
    pub fn from_entries<I>(layers: LayerDefaults, entries: I) -> Self
    where
        I: IntoIterator<Item = (PolicyTarget, MonitorPolicy)>,
    {
        let mut table = Self::new(layers);
        for (target, policy) in entries {
            table.register(target, policy);
        }
        table
    }

    /// Builder form of [`Self::register`].
    #[must_use]
    pub fn with_policy(mut self, target: PolicyTarget, policy: MonitorPolicy) -> Self {
        self.register(target, policy);
        self
    }

    /// Register a policy, returning the one it replaced.
    pub fn register(&mut self, target: PolicyTarget, policy: MonitorPolicy) -> Option<MonitorPolicy> {
        match target {
            PolicyTarget::Method(method) => self.methods.insert(method, policy),
            PolicyTarget::Type(class) => self.types.insert(class, policy),
        }
    }

    /// Layer defaults used when nothing is registered.
    #[must_use]
    pub const fn layers(&self) -> &LayerDefaults {
        &self.layers
    }

    /// Number of explicit registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len() + self.types.len()
    }

    /// Returns true when only layer defaults apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.types.is_empty()
    }

    /// Resolve the single policy that governs `method` in `layer`.
    #[must_use]
    pub fn resolve(&self, method: &MethodId, layer: Layer) -> ResolvedPolicy {
        if let Some(policy) = self.methods.get(method) {
            return ResolvedPolicy::explicit(policy, method, layer, PolicySource::Method);
        }
        if let Some(policy) = self.types.get(method.class()) {
            return ResolvedPolicy::explicit(policy, method, layer, PolicySource::Type);
        }
        self.layers.resolve(method, layer)
    }
}
