/// Something drawn into a region of the page that must be released before
/// the region is drawn again, such as a chart instance.
pub trait ViewHandle {
    fn dispose(&mut self);
}

/// Owns at most one live view for a region.
#[derive(Debug)]
pub struct ViewRegion<H: ViewHandle> {
    name: String,
    current: Option<H>,
}

impl<H: ViewHandle> ViewRegion<H> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current(&self) -> Option<&H> {
        self.current.as_ref()
    }

    /// Disposes the current view, then builds and installs its replacement.
    /// The old view is gone before `build` runs.
    pub fn replace_with<F>(&mut self, build: F) -> &mut H
    where
        F: FnOnce() -> H,
    {
        self.clear();
        self.current.insert(build())
    }

    pub fn clear(&mut self) {
        if let Some(mut old) = self.current.take() {
            log::debug!("Disposing view in region '{}'", self.name);
            old.dispose();
        }
    }
}

impl<H: ViewHandle> Drop for ViewRegion<H> {
    fn drop(&mut self) {
        self.clear();
    }
}
