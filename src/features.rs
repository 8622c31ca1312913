//! Layered per-request context carrying ambient capabilities.
//!
//! A request layer owns its overrides and reads through to a shared base chain. The base
//! is held behind `Arc`, so a request layer can never write to it.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::FeatureError;
use crate::rpc::message::RequestId;
use crate::service::ServiceFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Cancellation,
    CallMetadata,
    Services,
    Custom(&'static str),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancellation => f.write_str("cancellation"),
            Self::CallMetadata => f.write_str("call-metadata"),
            Self::Services => f.write_str("services"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// Method and id of the call being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallMetadata {
    pub method: String,
    pub id: Option<RequestId>,
}

#[derive(Clone)]
pub enum Feature {
    Cancellation(CancellationToken),
    CallMetadata(CallMetadata),
    Services(Arc<dyn ServiceFactory>),
    Custom {
        name: &'static str,
        value: Arc<dyn Any + Send + Sync>,
    },
}

impl Feature {
    pub fn custom<T: Any + Send + Sync>(name: &'static str, value: T) -> Self {
        Self::Custom {
            name,
            value: Arc::new(value),
        }
    }

    /// The capability this feature satisfies.
    pub fn capability(&self) -> Capability {
        match self {
            Self::Cancellation(_) => Capability::Cancellation,
            Self::CallMetadata(_) => Capability::CallMetadata,
            Self::Services(_) => Capability::Services,
            Self::Custom { name, .. } => Capability::Custom(*name),
        }
    }

    fn type_name(&self) -> String {
        match self {
            Self::Cancellation(_) => "CancellationToken".to_string(),
            Self::CallMetadata(_) => "CallMetadata".to_string(),
            Self::Services(_) => "ServiceFactory".to_string(),
            Self::Custom { name, .. } => format!("custom feature {name}"),
        }
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancellation(token) => f.debug_tuple("Cancellation").field(token).finish(),
            Self::CallMetadata(metadata) => f.debug_tuple("CallMetadata").field(metadata).finish(),
            Self::Services(_) => f.write_str("Services(..)"),
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FeatureCollection {
    local: HashMap<Capability, Feature>,
    base: Option<Arc<FeatureCollection>>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh layer reading through to `base`.
    pub fn layered_on(base: Arc<FeatureCollection>) -> Self {
        Self {
            local: HashMap::new(),
            base: Some(base),
        }
    }

    /// Nearest override for `capability`, walking local → base chain.
    pub fn get(&self, capability: &Capability) -> Option<&Feature> {
        let mut layer = Some(self);
        while let Some(current) = layer {
            if let Some(feature) = current.local.get(capability) {
                return Some(feature);
            }
            layer = current.base.as_deref();
        }
        None
    }

    /// Stores an override in this layer; `None` drops it so reads fall through to the base.
    pub fn set(&mut self, capability: Capability, feature: Option<Feature>) -> Result<(), FeatureError> {
        match feature {
            None => {
                self.local.remove(&capability);
                Ok(())
            }
            Some(feature) if feature.capability() == capability => {
                self.local.insert(capability, feature);
                Ok(())
            }
            Some(feature) => Err(FeatureError {
                capability: capability.to_string(),
                provided: feature.type_name(),
            }),
        }
    }

    /// Stores `feature` under its own capability.
    pub fn insert(&mut self, feature: Feature) {
        self.local.insert(feature.capability(), feature);
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        match self.get(&Capability::Cancellation) {
            Some(Feature::Cancellation(token)) => Some(token),
            _ => None,
        }
    }

    pub fn call_metadata(&self) -> Option<&CallMetadata> {
        match self.get(&Capability::CallMetadata) {
            Some(Feature::CallMetadata(metadata)) => Some(metadata),
            _ => None,
        }
    }

    pub fn services(&self) -> Option<&Arc<dyn ServiceFactory>> {
        match self.get(&Capability::Services) {
            Some(Feature::Services(services)) => Some(services),
            _ => None,
        }
    }

    pub fn custom<T: Any + Send + Sync>(&self, name: &'static str) -> Option<&T> {
        match self.get(&Capability::Custom(name)) {
            Some(Feature::Custom { value, .. }) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}
