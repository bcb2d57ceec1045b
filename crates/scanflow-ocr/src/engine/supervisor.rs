//! Backend selection and degradation
//!
//! ```text
//! Uninitialized -> DetectingCapabilities -> AcceleratedReady | FallbackReady
//!                                                   |               |
//!                                                   +-> Recognizing +--> back to *Ready
//! any state -> Terminated
//! ```
//!
//! Memory exhaustion on the accelerated backend during a call tears the engine
//! down, switches the stored preference to portable for good, reinitializes and
//! re-runs the same call. A buffer-limit failure at initialization is returned
//! as is: it is tied to the model variant, not the backend.

use super::{Backend, Capabilities, CapabilityProbe, Engine, EngineFactory};
use crate::config::{BackendPreference, ModelVariant};
use crate::error::{EngineError, OcrError, Result};

/// Lifecycle state of an [`EngineSupervisor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Uninitialized,
    DetectingCapabilities,
    AcceleratedReady,
    FallbackReady,
    Recognizing,
    Terminated,
}

impl EngineState {
    #[inline]
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::AcceleratedReady | Self::FallbackReady)
    }

    const fn ready_for(backend: Backend) -> Self {
        match backend {
            Backend::Accelerated => Self::AcceleratedReady,
            Backend::Portable => Self::FallbackReady,
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::DetectingCapabilities => "detecting_capabilities",
            Self::AcceleratedReady => "accelerated_ready",
            Self::FallbackReady => "fallback_ready",
            Self::Recognizing => "recognizing",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Value returned by a supervised call
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisedRun<T> {
    pub value: T,
    /// Backend that produced `value`
    pub backend: Backend,
    /// True if the call was transparently re-run on the portable backend
    pub silent_fallback: bool,
}

/// Owns the active [`Engine`] and swaps it on memory exhaustion
pub struct EngineSupervisor {
    factory: Box<dyn EngineFactory>,
    probe: Box<dyn CapabilityProbe>,
    preference: BackendPreference,
    /// Set once memory exhaustion forced the portable backend
    downgraded: bool,
    variant: ModelVariant,
    capabilities: Option<Capabilities>,
    engine: Option<Box<dyn Engine>>,
    state: EngineState,
}

impl std::fmt::Debug for EngineSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSupervisor")
            .field("state", &self.state)
            .field("preference", &self.preference)
            .field("downgraded", &self.downgraded)
            .field("variant", &self.variant)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl EngineSupervisor {
    #[must_use = "supervisor is created but not used"]
    pub fn new(
        factory: Box<dyn EngineFactory>,
        probe: Box<dyn CapabilityProbe>,
        preference: BackendPreference,
        variant: ModelVariant,
    ) -> Self {
        Self {
            factory,
            probe,
            preference,
            downgraded: false,
            variant,
            capabilities: None,
            engine: None,
            state: EngineState::Uninitialized,
        }
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Current backend preference; becomes `Portable` after a downgrade
    #[inline]
    #[must_use]
    pub const fn preference(&self) -> BackendPreference {
        self.preference
    }

    #[inline]
    #[must_use]
    pub const fn variant(&self) -> ModelVariant {
        self.variant
    }

    /// Probe result, once initialization has run
    #[must_use]
    pub const fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    #[must_use]
    pub fn active_backend(&self) -> Option<Backend> {
        self.engine.as_ref().map(|e| e.backend())
    }

    fn choose_backend(&self) -> Backend {
        let accelerated = self
            .capabilities
            .as_ref()
            .is_some_and(|c| c.accelerated_available);
        match self.preference {
            BackendPreference::Portable => Backend::Portable,
            BackendPreference::Auto | BackendPreference::Accelerated if accelerated => {
                Backend::Accelerated
            }
            BackendPreference::Auto | BackendPreference::Accelerated => Backend::Portable,
        }
    }

    /// Probe capabilities (once) and bring up an engine. No-op when ready.
    ///
    /// # Errors
    ///
    /// Propagates model loading failures; the supervisor then stays
    /// `Uninitialized`. [`EngineError::BufferLimitExceeded`] means the caller
    /// should [`switch_variant`](Self::switch_variant) to a smaller model.
    pub fn initialize(&mut self) -> Result<Backend> {
        match self.state {
            EngineState::Terminated => {
                return Err(EngineError::NotReady(self.state.to_string()).into());
            }
            EngineState::AcceleratedReady => return Ok(Backend::Accelerated),
            EngineState::FallbackReady => return Ok(Backend::Portable),
            EngineState::Uninitialized
            | EngineState::DetectingCapabilities
            | EngineState::Recognizing => {}
        }

        if self.capabilities.is_none() {
            self.state = EngineState::DetectingCapabilities;
            let caps = self.probe.probe();
            log::debug!("Capability probe: {caps:?}");
            self.capabilities = Some(caps);
        }
        let backend = self.choose_backend();
        self.start(backend)
    }

    fn start(&mut self, backend: Backend) -> Result<Backend> {
        let probed = Capabilities::default();
        let capabilities = self.capabilities.as_ref().unwrap_or(&probed);
        let mut engine = self.factory.create(backend, self.variant, capabilities);
        match engine.initialize() {
            Ok(()) => {
                log::info!("OCR engine initialized on {backend} backend ({} models)", self.variant);
                self.engine = Some(engine);
                self.state = EngineState::ready_for(backend);
                Ok(backend)
            }
            Err(e) if e.is_resource_exhausted() && backend == Backend::Accelerated => {
                log::warn!("Accelerated backend out of memory during initialization: {e}");
                engine.terminate();
                self.preference = BackendPreference::Portable;
                self.downgraded = true;
                self.start(Backend::Portable)
            }
            Err(e) => {
                engine.terminate();
                self.state = EngineState::Uninitialized;
                Err(e.into())
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.terminate();
        }
    }

    /// Run `call` against the active engine, initializing it first if needed.
    ///
    /// If the accelerated backend runs out of memory, the call is re-run once
    /// on a fresh portable engine and the result reports `silent_fallback`.
    ///
    /// # Errors
    ///
    /// Returns the call's error, or an initialization error.
    pub fn run<T, F>(&mut self, mut call: F) -> Result<SupervisedRun<T>>
    where
        F: FnMut(&mut dyn Engine) -> Result<T>,
    {
        let backend = self.initialize()?;
        let first = self.call_active(&mut call);
        self.state = EngineState::ready_for(backend);

        match first {
            Ok(value) => Ok(SupervisedRun {
                value,
                backend,
                silent_fallback: false,
            }),
            Err(OcrError::Engine(e))
                if e.is_resource_exhausted() && backend == Backend::Accelerated =>
            {
                log::warn!("Accelerated backend out of memory, switching to portable: {e}");
                self.teardown();
                self.preference = BackendPreference::Portable;
                self.downgraded = true;
                let backend = self.start(Backend::Portable)?;
                let value = self.call_active(&mut call);
                self.state = EngineState::ready_for(backend);
                value.map(|value| SupervisedRun {
                    value,
                    backend,
                    silent_fallback: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn call_active<T, F>(&mut self, call: &mut F) -> Result<T>
    where
        F: FnMut(&mut dyn Engine) -> Result<T>,
    {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| EngineError::NotReady(self.state.to_string()))?;
        self.state = EngineState::Recognizing;
        call(engine.as_mut())
    }

    /// Drop the current engine and use `variant` from the next call on
    ///
    /// # Errors
    ///
    /// Fails after [`terminate`](Self::terminate).
    pub fn switch_variant(&mut self, variant: ModelVariant) -> Result<()> {
        if self.state == EngineState::Terminated {
            return Err(EngineError::NotReady(self.state.to_string()).into());
        }
        self.teardown();
        self.variant = variant;
        self.state = EngineState::Uninitialized;
        log::info!("Switched OCR model variant to {variant}");
        Ok(())
    }

    /// Use `preference` from the next call on, dropping the current engine.
    ///
    /// Returns `false` without touching the engine when nothing changes, or
    /// when an earlier out-of-memory downgrade pinned the portable backend.
    ///
    /// # Errors
    ///
    /// Fails after [`terminate`](Self::terminate).
    pub fn switch_preference(&mut self, preference: BackendPreference) -> Result<bool> {
        if self.state == EngineState::Terminated {
            return Err(EngineError::NotReady(self.state.to_string()).into());
        }
        if preference == self.preference {
            return Ok(false);
        }
        if self.downgraded {
            log::debug!("Ignoring {preference} backend preference after out-of-memory downgrade");
            return Ok(false);
        }
        self.teardown();
        self.preference = preference;
        self.state = EngineState::Uninitialized;
        log::info!("Switched OCR backend preference to {preference}");
        Ok(true)
    }

    /// Release the engine; every later call fails with `NotReady`
    pub fn terminate(&mut self) {
        self.teardown();
        self.state = EngineState::Terminated;
    }
}

impl Drop for EngineSupervisor {
    fn drop(&mut self) {
        self.teardown();
    }
}
