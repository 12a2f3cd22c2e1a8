// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Runtime selection of an access strategy.

use crate::NoStrategyAvailable;
use crate::PciAddress;
use crate::TransferWidth;
use crate::channel::ServiceProvider;
use crate::strategy::AccessStrategy;
use crate::strategy::BoundStrategy;
use crate::strategy::StrategyKind;
use parking_lot::Mutex;
use std::sync::Arc;

/// Controls how [`StrategySelector::resolve`] picks a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorConfig {
    /// Only try this strategy instead of probing all of them.
    pub method: Option<StrategyKind>,
    /// Confirm each candidate with a read of 0000:00:00.0 before binding it.
    pub verify_with_read: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            method: None,
            verify_with_read: true,
        }
    }
}

struct Binding {
    config: SelectorConfig,
    strategy: Arc<BoundStrategy>,
}

/// Binds at most one access strategy for its lifetime.
pub struct StrategySelector {
    provider: Box<dyn ServiceProvider>,
    binding: Mutex<Option<Binding>>,
}

impl StrategySelector {
    /// Creates a selector that opens services through `provider`.
    pub fn new(provider: Box<dyn ServiceProvider>) -> Self {
        Self {
            provider,
            binding: Mutex::new(None),
        }
    }

    /// Returns the bound strategy, probing for one on the first call.
    ///
    /// Once a strategy is bound it is returned unchanged, even if a later
    /// call passes a different `config`. Concurrent callers wait for the
    /// first resolution and observe its result.
    pub fn resolve(
        &self,
        config: &SelectorConfig,
    ) -> Result<Arc<BoundStrategy>, NoStrategyAvailable> {
        let mut binding = self.binding.lock();
        if let Some(binding) = &*binding {
            if binding.config != *config {
                tracing::warn!(
                    bound = %binding.strategy.kind(),
                    requested = ?config,
                    "access method already bound, ignoring new configuration"
                );
            }
            return Ok(binding.strategy.clone());
        }

        let candidates = match config.method {
            Some(kind) => vec![kind],
            None => StrategyKind::PRIORITY.to_vec(),
        };

        for &kind in &candidates {
            let Some(strategy) = self.try_bind(kind, config) else {
                continue;
            };
            tracing::info!(method = %kind, "using PCI configuration access method");
            let strategy = Arc::new(strategy);
            *binding = Some(Binding {
                config: config.clone(),
                strategy: strategy.clone(),
            });
            return Ok(strategy);
        }

        Err(NoStrategyAvailable {
            attempted: candidates,
        })
    }

    /// Returns the bound strategy without probing.
    pub fn bound(&self) -> Option<Arc<BoundStrategy>> {
        self.binding
            .lock()
            .as_ref()
            .map(|binding| binding.strategy.clone())
    }

    fn try_bind(&self, kind: StrategyKind, config: &SelectorConfig) -> Option<BoundStrategy> {
        let service = kind.service_name();
        let channel = match self.provider.open(service, kind.client_type()) {
            Ok(channel) => channel,
            Err(err) => {
                tracing::debug!(
                    method = %kind,
                    service,
                    error = &err as &dyn std::error::Error,
                    "cannot open service"
                );
                return None;
            }
        };

        let strategy = BoundStrategy::new(AccessStrategy::new(kind, channel));
        if config.verify_with_read {
            if let Err(err) = strategy.read(PciAddress::ORIGIN, TransferWidth::DWord) {
                tracing::debug!(
                    method = %kind,
                    error = &err as &dyn std::error::Error,
                    "probe read failed"
                );
                return None;
            }
        }
        Some(strategy)
    }
}
