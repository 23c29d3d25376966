//! Service registry with async handlers
//!
//! Entity platforms expose their writable operations (`select.select_option`,
//! `number.set_value`) as services registered here.

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use sunspec_core::{Context, ServiceCall};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<(), ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when calling services
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// Registered services keyed by `domain.service`
pub struct ServiceRegistry {
    services: DashMap<String, ServiceHandler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a service, replacing any previous handler under the same name
    #[instrument(skip(self, domain, service, handler))]
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let domain = domain.into();
        let service = service.into();

        debug!(domain = %domain, service = %service, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services
            .insert(format!("{}.{}", domain, service), handler);
    }

    /// Call a service
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let handler = self
            .services
            .get(&key)
            .map(|h| h.clone())
            .ok_or_else(|| {
                warn!(domain = %domain, service = %service, "Service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;

        debug!(domain = %domain, service = %service, "Calling service");
        handler(ServiceCall::new(domain, service, service_data, context)).await
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    /// Unregister a service, returning whether it existed
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        self.services
            .remove(&format!("{}.{}", domain, service))
            .is_some()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = ServiceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        registry.register("number", "set_value", move |call| {
            let counter = counter.clone();
            async move {
                if call.get::<f64>("value").is_none() {
                    return Err(ServiceError::InvalidData("value required".into()));
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        assert!(registry.has_service("number", "set_value"));
        tokio_test::assert_ok!(
            registry
                .call("number", "set_value", json!({"value": 3}), Context::new())
                .await
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let err = registry
            .call("number", "set_value", json!({}), Context::new())
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::InvalidData("value required".into()));
    }

    #[tokio::test]
    async fn test_missing_service() {
        let registry = ServiceRegistry::new();
        let err = registry
            .call("select", "select_option", json!({}), Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));

        registry.register("select", "select_option", |_| async { Ok(()) });
        assert!(registry.unregister("select", "select_option"));
        assert!(!registry.has_service("select", "select_option"));
    }
}
