/// Distance below the viewport at which the end-of-feed sentinel counts as reached.
pub const DEFAULT_ROOT_MARGIN_PX: u32 = 560;

/// Edge-triggered model of the sentinel placed after the last rendered chain.
///
/// `observe` reports `true` once per hidden-to-visible transition while enabled. Disabling
/// forgets the last visibility, so a sentinel that is still on screen fires again once the
/// sensor is re-enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewportSensor {
    enabled: bool,
    visible: bool,
    root_margin_px: u32,
}

impl Default for ViewportSensor {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_MARGIN_PX)
    }
}

impl ViewportSensor {
    #[must_use]
    pub fn new(root_margin_px: u32) -> Self {
        Self { enabled: true, visible: false, root_margin_px }
    }

    #[must_use]
    pub fn root_margin_px(&self) -> u32 {
        self.root_margin_px
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.visible = false;
        }
        self.enabled = enabled;
    }

    pub fn observe(&mut self, visible: bool) -> bool {
        if !self.enabled {
            return false;
        }
        let entered = visible && !self.visible;
        self.visible = visible;
        entered
    }
}
