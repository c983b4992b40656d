// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service descriptions and the path lookup table built from them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::handler::{BoxHandler, MethodHandler};
use super::interceptor::{self, Interceptor};
use crate::method::MethodInfo;

/// A named service and its methods
pub struct ServiceDesc {
    name: String,
    methods: Vec<(String, MethodHandler)>,
}

impl ServiceDesc {
    /// `name` is the fully-qualified service name, e.g. `helloworld.Greeter`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, name: impl Into<String>, handler: MethodHandler) -> Self {
        self.methods.push((name.into(), handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) struct RegisteredMethod {
    pub(crate) info: Arc<MethodInfo>,
    pub(crate) handler: BoxHandler,
}

/// Handlers keyed by full method path
#[derive(Default)]
pub(crate) struct Registry {
    methods: HashMap<String, RegisteredMethod>,
    services: BTreeMap<String, Vec<MethodInfo>>,
}

impl Registry {
    /// Add every method of `service`.
    ///
    /// # Panics
    ///
    /// Panics if the service name or any method path is already registered.
    pub(crate) fn register(&mut self, service: ServiceDesc) {
        if self.services.contains_key(&service.name) {
            panic!("duplicate service registration: {}", service.name);
        }

        let mut infos = Vec::with_capacity(service.methods.len());
        for (name, handler) in service.methods {
            let info = MethodInfo::new(&service.name, &name, handler.shape);
            if self.methods.contains_key(&info.full_method) {
                panic!("duplicate method registration: {}", info.full_method);
            }
            infos.push(info.clone());
            self.methods.insert(
                info.full_method.clone(),
                RegisteredMethod {
                    info: Arc::new(info),
                    handler: handler.handler,
                },
            );
        }
        self.services.insert(service.name, infos);
    }

    /// Wrap every handler with the interceptor chain
    pub(crate) fn intercept(&mut self, interceptors: &[Arc<dyn Interceptor>]) {
        if interceptors.is_empty() {
            return;
        }
        for method in self.methods.values_mut() {
            method.handler = interceptor::chain(interceptors, method.handler.clone());
        }
    }

    pub(crate) fn get(&self, path: &str) -> Option<&RegisteredMethod> {
        self.methods.get(path)
    }

    pub(crate) fn service_info(&self) -> &BTreeMap<String, Vec<MethodInfo>> {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::method::StreamShape;
    use crate::server::ServerStream;

    fn noop(shape: StreamShape) -> MethodHandler {
        MethodHandler::new(shape, |_stream: ServerStream| async { Ok::<(), Error>(()) })
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::default();
        registry.register(
            ServiceDesc::new("routeguide.RouteGuide")
                .method("GetFeature", noop(StreamShape::UnaryUnary))
                .method("RouteChat", noop(StreamShape::StreamStream)),
        );

        let method = registry.get("/routeguide.RouteGuide/RouteChat").unwrap();
        assert_eq!(method.info.shape(), StreamShape::StreamStream);
        assert!(registry.get("/routeguide.RouteGuide/Missing").is_none());

        let services = registry.service_info();
        assert_eq!(services["routeguide.RouteGuide"].len(), 2);
        assert_eq!(services["routeguide.RouteGuide"][0].name, "GetFeature");
    }

    #[test]
    #[should_panic(expected = "duplicate service registration")]
    fn test_duplicate_service_panics() {
        let mut registry = Registry::default();
        registry.register(ServiceDesc::new("a.B").method("C", noop(StreamShape::UnaryUnary)));
        registry.register(ServiceDesc::new("a.B").method("D", noop(StreamShape::UnaryUnary)));
    }

    #[test]
    #[should_panic(expected = "duplicate method registration")]
    fn test_duplicate_method_panics() {
        let mut registry = Registry::default();
        registry.register(
            ServiceDesc::new("a.B")
                .method("C", noop(StreamShape::UnaryUnary))
                .method("C", noop(StreamShape::UnaryStream)),
        );
    }
}
