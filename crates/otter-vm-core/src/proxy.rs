//! Proxy objects
//!
//! Proxy traps are implemented by a handler trait object. Stubs never look
//! inside a proxy; they call into the runtime, which dispatches here.

use std::sync::Arc;

use crate::error::Exception;
use crate::object::ObjectId;
use crate::runtime::Runtime;
use crate::shape::PropertyKey;
use crate::value::Value;

/// Proxy traps.
pub trait ProxyHandler: Send + Sync {
    /// `[[Get]]`
    fn get(
        &self,
        rt: &mut Runtime,
        proxy: ObjectId,
        key: PropertyKey,
        receiver: Value,
    ) -> Result<Value, Exception>;

    /// `[[Set]]`; returns whether the assignment succeeded.
    fn set(
        &self,
        rt: &mut Runtime,
        proxy: ObjectId,
        key: PropertyKey,
        value: Value,
        receiver: Value,
    ) -> Result<bool, Exception>;

    /// `[[HasProperty]]`
    fn has(&self, rt: &mut Runtime, proxy: ObjectId, key: PropertyKey) -> Result<bool, Exception>;

    /// `[[GetOwnProperty]]` presence check.
    fn has_own(
        &self,
        rt: &mut Runtime,
        proxy: ObjectId,
        key: PropertyKey,
    ) -> Result<bool, Exception> {
        self.has(rt, proxy, key)
    }
}

/// Proxy payload of an object.
#[derive(Clone)]
pub struct ProxyData {
    /// Trap implementation
    pub handler: Arc<dyn ProxyHandler>,
    /// Target object, if any
    pub target: Option<ObjectId>,
}

/// A handler that forwards every trap to the target.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardingHandler;

impl ProxyHandler for ForwardingHandler {
    fn get(
        &self,
        rt: &mut Runtime,
        proxy: ObjectId,
        key: PropertyKey,
        receiver: Value,
    ) -> Result<Value, Exception> {
        match rt.proxy_target(proxy) {
            Some(target) => rt.get_property(target, key, receiver),
            None => Ok(Value::UNDEFINED),
        }
    }

    fn set(
        &self,
        rt: &mut Runtime,
        proxy: ObjectId,
        key: PropertyKey,
        value: Value,
        _receiver: Value,
    ) -> Result<bool, Exception> {
        match rt.proxy_target(proxy) {
            Some(target) => {
                rt.set_property(target, key, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn has(&self, rt: &mut Runtime, proxy: ObjectId, key: PropertyKey) -> Result<bool, Exception> {
        match rt.proxy_target(proxy) {
            Some(target) => rt.has_property(target, key),
            None => Ok(false),
        }
    }

    fn has_own(
        &self,
        rt: &mut Runtime,
        proxy: ObjectId,
        key: PropertyKey,
    ) -> Result<bool, Exception> {
        match rt.proxy_target(proxy) {
            Some(target) => Ok(rt.lookup_own(target, key).is_some()),
            None => Ok(false),
        }
    }
}
