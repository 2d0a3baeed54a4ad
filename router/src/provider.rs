//! Object-safe boundary around `neuron_turn::Provider`.
//!
//! `Provider` uses RPITIT and is intentionally not object-safe (see
//! `neuron-turn`). The routing engine picks a tier's provider at runtime,
//! so it needs a trait object. `BoxedProvider<P>` wraps any `P: Provider`
//! and exposes the object-safe `DynProvider`.

use neuron_turn::provider::{Provider, ProviderError};
use neuron_turn::types::{ProviderRequest, ProviderResponse};
use std::future::Future;
use std::pin::Pin;

/// Object-safe call surface over a single tier's model provider.
pub trait DynProvider: Send + Sync {
    /// Send a completion request, returning a boxed future.
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + '_>>;
}

/// Adapts any `Provider` implementor to the object-safe [`DynProvider`].
pub struct BoxedProvider<P>(pub P);

impl<P: Provider> DynProvider for BoxedProvider<P> {
    fn complete(
        &self,
        request: ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + '_>> {
        Box::pin(self.0.complete(request))
    }
}
