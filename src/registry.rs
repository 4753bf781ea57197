use bevy::log::warn;

use crate::{backend::ExposureBackend, engine::SunshineEngine};


/// Holds the one engine bound to a host scene. Binding a replacement
/// destroys the previous engine before the new one takes over.
pub struct EngineSlot<B: ExposureBackend> {
    engine: Option<SunshineEngine<B>>,
}

impl<B: ExposureBackend> Default for EngineSlot<B> {
    fn default() -> Self {
        Self { engine: None }
    }
}

impl<B: ExposureBackend> EngineSlot<B> {
    pub fn new(engine: SunshineEngine<B>) -> Self {
        Self { engine: Some(engine) }
    }

    pub fn bind(&mut self, engine: SunshineEngine<B>) {
        if let Some(mut previous) = self.engine.take() {
            warn!(
                "replacing bound sunshine engine at generation {}",
                previous.generation(),
            );
            previous.destroy();
        }
        self.engine = Some(engine);
    }

    /// Detaches the bound engine without destroying it.
    pub fn unbind(&mut self) -> Option<SunshineEngine<B>> {
        self.engine.take()
    }

    /// Destroys and drops the bound engine.
    pub fn release(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
    }

    pub fn is_bound(&self) -> bool {
        self.engine.is_some()
    }

    pub fn get(&self) -> Option<&SunshineEngine<B>> {
        self.engine.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut SunshineEngine<B>> {
        self.engine.as_mut()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::CpuBackend, settings::AnalysisSettings};

    fn engine() -> SunshineEngine<CpuBackend> {
        SunshineEngine::new(CpuBackend::new(16, 1e-4), AnalysisSettings::default()).unwrap()
    }

    #[test]
    fn binding_replaces_and_release_empties() {
        let mut slot = EngineSlot::default();
        assert!(!slot.is_bound());

        slot.bind(engine());
        slot.bind(engine());
        assert!(slot.is_bound());
        assert!(!slot.get().unwrap().is_destroyed());

        let detached = slot.unbind().unwrap();
        assert!(!detached.is_destroyed());
        assert!(slot.get_mut().is_none());

        slot.bind(detached);
        slot.release();
        assert!(!slot.is_bound());
    }
}
