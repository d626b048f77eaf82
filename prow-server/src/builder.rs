//! Builder for configured resolvers
//!
//! The builder collects the collaborators of a [`Resolver`]:
//! - the registry (usually a [`Router`]) and middleware to wrap it with
//! - the context factory
//! - the error observer
//! - batching, metrics and observability settings
//!
//! # Examples
//!
//! ```rust,no_run
//! use prow_core::ObservabilityConfig;
//! use prow_server::{from_fn, InvocationRequest, Resolver, Router, TracingMiddleware};
//! use std::sync::Arc;
//!
//! struct Ctx {
//!     account: Option<String>,
//! }
//!
//! # fn example() -> prow_core::Result<()> {
//! let resolver = Resolver::builder()
//!     .router(Router::new().query(
//!         "whoami",
//!         from_fn(|_input, ctx: Arc<Ctx>| async move { Ok(serde_json::json!(ctx.account)) }),
//!     ))
//!     .context_factory(|request: &InvocationRequest| {
//!         let account = request.context["accountId"].as_str().map(str::to_string);
//!         async move { Ok::<_, prow_core::Error>(Ctx { account }) }
//!     })
//!     .use_middleware(Arc::new(TracingMiddleware::new()))
//!     .batching(true)
//!     .on_error(|event| tracing::error!(path = ?event.path, error = %event.error, "call failed"))
//!     .with_observability(ObservabilityConfig::new("issue-tracker"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::bridge::InvocationRequest;
use crate::config::ResolverConfig;
use crate::context::ContextFactory;
use crate::metrics::ResolverMetrics;
use crate::middleware::{Middleware, MiddlewareChain, SyncMiddleware};
use crate::registry::Registry;
use crate::resolver::{ErrorEvent, OnError, Resolver};
use crate::router::Router;
use prow_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;

pub struct ResolverBuilder<C> {
    router: Option<Router<C>>,
    registry: Option<Arc<dyn Registry<C>>>,
    context_factory: Option<Arc<dyn ContextFactory<C>>>,
    middleware_chain: MiddlewareChain<C>,
    on_error: Option<OnError<C>>,
    config: ResolverConfig,
    observability_config: Option<ObservabilityConfig>,
}

impl<C: Send + Sync + 'static> ResolverBuilder<C> {
    pub fn new() -> Self {
        Self {
            router: None,
            registry: None,
            context_factory: None,
            middleware_chain: MiddlewareChain::new(),
            on_error: None,
            config: ResolverConfig::default(),
            observability_config: None,
        }
    }

    /// Serve procedures from a router
    pub fn router(mut self, router: Router<C>) -> Self {
        self.router = Some(router);
        self.registry = None;
        self
    }

    /// Serve procedures from a custom registry
    ///
    /// Builder middleware cannot wrap a custom registry; `build` rejects the
    /// combination.
    pub fn registry(mut self, registry: impl Registry<C> + 'static) -> Self {
        self.registry = Some(Arc::new(registry));
        self.router = None;
        self
    }

    pub fn context_factory(mut self, factory: impl ContextFactory<C> + 'static) -> Self {
        self.context_factory = Some(Arc::new(factory));
        self
    }

    /// Give every resolution a clone of `ctx`
    pub fn context(self, ctx: C) -> Self
    where
        C: Clone,
    {
        self.context_factory(move |_request: &InvocationRequest| {
            let ctx = ctx.clone();
            async move { Ok::<_, Error>(ctx) }
        })
    }

    pub fn on_error<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ErrorEvent<C>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(observer));
        self
    }

    /// Append middleware to the router's chain
    pub fn use_middleware(mut self, middleware: Arc<dyn Middleware<C>>) -> Self {
        self.middleware_chain.add(middleware);
        self
    }

    pub fn use_sync_middleware<T: SyncMiddleware<C> + 'static>(mut self, middleware: T) -> Self {
        self.middleware_chain.add_sync(middleware);
        self
    }

    /// Accept batch envelopes (default: true)
    pub fn batching(mut self, enabled: bool) -> Self {
        self.config.batching.enabled = enabled;
        self
    }

    /// Replace all plain settings at once
    pub fn config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Record `ResolverMetrics` without installing an exporter
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.config.metrics = enabled;
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Install logging/OpenTelemetry on build and record metrics
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(self) -> Self {
        self.with_observability(ObservabilityConfig::default())
    }

    /// Assemble the resolver
    ///
    /// # Errors
    ///
    /// `Error::Internal` when no router/registry or no context factory was
    /// given, when middleware was added next to a custom registry, or when
    /// observability fails to initialize.
    pub fn build(self) -> Result<Resolver<C>> {
        let registry: Arc<dyn Registry<C>> = match (self.router, self.registry) {
            (Some(mut router), _) => {
                router.append_middleware(&self.middleware_chain);
                Arc::new(router)
            }
            (None, Some(registry)) => {
                if !self.middleware_chain.is_empty() {
                    return Err(Error::Internal(
                        "Middleware can only be applied to a Router registry".to_string(),
                    ));
                }
                registry
            }
            (None, None) => {
                return Err(Error::Internal("No router or registry specified".to_string()))
            }
        };

        let context_factory = self
            .context_factory
            .ok_or_else(|| Error::Internal("No context factory specified".to_string()))?;

        let mut config = self.config;
        if let Some(mut observability) = self.observability_config {
            if observability.service_name == ObservabilityConfig::default().service_name {
                observability.service_name = config.service_name.clone();
            }
            prow_core::init_observability(observability).map_err(|e| {
                Error::Internal(format!("Failed to initialize observability: {}", e))
            })?;
            config.metrics = true;
        }

        let metrics = config
            .metrics
            .then(|| Arc::new(ResolverMetrics::new(config.service_name.clone())));

        tracing::debug!(
            batching = config.batching.enabled,
            metrics = config.metrics,
            observed = self.on_error.is_some(),
            "resolver built"
        );

        Ok(Resolver {
            registry,
            context_factory,
            config,
            on_error: self.on_error,
            metrics,
        })
    }
}

impl<C: Send + Sync + 'static> Default for ResolverBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
