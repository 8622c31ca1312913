//! Method registration and the immutable registry snapshot used at request time.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::contract::converter::ConverterRegistry;
use crate::contract::descriptor::{MethodDescriptor, ParameterContract, ReturnContract};
use crate::contract::value::TypeTag;
use crate::errors::ConfigurationError;
use crate::service::{MethodEntry, ServiceDefinition, ServiceKey};

/// How declared method names map to wire names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MethodNaming {
    #[default]
    AsDeclared,
    /// `get_total` → `getTotal`.
    CamelCase,
}

impl MethodNaming {
    pub fn wire_name(&self, declared: &str) -> String {
        match self {
            Self::AsDeclared => declared.to_string(),
            Self::CamelCase => {
                let mut name = String::with_capacity(declared.len());
                let mut upper_next = false;
                for ch in declared.chars() {
                    if ch == '_' {
                        upper_next = !name.is_empty();
                    } else if upper_next {
                        name.extend(ch.to_uppercase());
                        upper_next = false;
                    } else if name.is_empty() {
                        name.extend(ch.to_lowercase());
                    } else {
                        name.push(ch);
                    }
                }
                name
            }
        }
    }
}

#[derive(Default)]
struct BuilderState {
    pending: Vec<Arc<MethodDescriptor>>,
    built: bool,
}

/// Collects descriptors during startup. Safe to share across configuration call sites.
pub struct MethodRegistryBuilder {
    converters: ConverterRegistry,
    naming: MethodNaming,
    state: Mutex<BuilderState>,
}

impl MethodRegistryBuilder {
    pub fn new(converters: ConverterRegistry) -> Self {
        Self {
            converters,
            naming: MethodNaming::default(),
            state: Mutex::new(BuilderState::default()),
        }
    }

    pub fn with_naming(mut self, naming: MethodNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Validates every method of `definition` and queues its descriptor.
    ///
    /// Converter resolution happens here, outside the lock; nothing is queued unless
    /// every method of the service is valid.
    pub fn register_service<S: Send + Sync + 'static>(
        &self,
        definition: ServiceDefinition<S>,
    ) -> Result<(), ConfigurationError> {
        let service = definition.key();
        let descriptors = definition
            .methods
            .into_iter()
            .map(|entry| self.describe(service, entry).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.state.lock();
        if state.built {
            return Err(ConfigurationError::RegistryFrozen);
        }
        debug!(
            service = service.type_name,
            methods = descriptors.len(),
            "service registered"
        );
        state.pending.extend(descriptors);
        Ok(())
    }

    /// Snapshots the queued descriptors. Later registrations fail with `RegistryFrozen`.
    pub fn build(&self) -> Result<MethodRegistry, ConfigurationError> {
        let mut state = self.state.lock();
        if state.built {
            return Err(ConfigurationError::RegistryFrozen);
        }

        let mut methods = BTreeMap::new();
        for descriptor in &state.pending {
            if methods
                .insert(descriptor.name.clone(), Arc::clone(descriptor))
                .is_some()
            {
                return Err(ConfigurationError::DuplicateMethod {
                    method: descriptor.name.clone(),
                });
            }
        }

        state.built = true;
        state.pending.clear();
        Ok(MethodRegistry { methods })
    }

    fn describe(
        &self,
        service: ServiceKey,
        entry: MethodEntry,
    ) -> Result<MethodDescriptor, ConfigurationError> {
        let MethodEntry { spec, invoker } = entry;
        let name = self.naming.wire_name(&spec.name);
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyMethodName);
        }

        if spec.notification && spec.returns != TypeTag::Unit {
            return Err(ConfigurationError::NotificationWithResult { method: name });
        }

        let ambient = spec.params.iter().filter(|p| p.type_tag.is_ambient()).count();
        if ambient > 1 {
            return Err(ConfigurationError::MultipleAmbientParameters { method: name });
        }

        let mut seen = HashSet::new();
        let mut parameters = Vec::with_capacity(spec.params.len());
        for param in spec.params {
            if param.name.trim().is_empty() {
                return Err(ConfigurationError::EmptyParameterName { method: name });
            }
            if !seen.insert(param.name.clone()) {
                return Err(ConfigurationError::DuplicateParameter {
                    method: name,
                    parameter: param.name,
                });
            }

            let converter = if param.type_tag.is_ambient() {
                None
            } else {
                let converter = self.converters.resolve(&param.type_tag).map_err(|_| {
                    ConfigurationError::UnresolvedParameterType {
                        method: name.clone(),
                        parameter: param.name.clone(),
                        type_tag: param.type_tag.clone(),
                    }
                })?;
                Some(converter)
            };

            parameters.push(ParameterContract {
                name: param.name,
                type_tag: param.type_tag,
                optional: param.optional,
                converter,
            });
        }

        let converter = self.converters.resolve(&spec.returns).map_err(|_| {
            ConfigurationError::UnresolvedReturnType {
                method: name.clone(),
                type_tag: spec.returns.clone(),
            }
        })?;

        Ok(MethodDescriptor {
            service,
            name,
            notification: spec.notification,
            extension_data: spec.extension_data,
            parameters,
            returns: ReturnContract {
                type_tag: spec.returns,
                converter,
            },
            invoker,
        })
    }
}

/// Read-only method table. Shared across requests without locking.
#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, Arc<MethodDescriptor>>,
}

impl MethodRegistry {
    pub fn get(&self, name: &str) -> Option<&Arc<MethodDescriptor>> {
        self.methods.get(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Descriptors in name order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<MethodDescriptor>> {
        self.methods.values()
    }
}
