use crate::types::ClassificationMode;
use log::debug;

/// Two-state classification mode machine. Starts in `Small`.
#[derive(Debug, Default)]
pub struct ModeController {
    mode: ClassificationMode,
}

impl ModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ClassificationMode {
        self.mode
    }

    /// Apply a mode transition.
    ///
    /// Hardware-confirmed transitions adopt `reported` verbatim; a confirmed
    /// transition without a reported mode changes nothing. Unconfirmed
    /// transitions flip the mode locally.
    ///
    /// Returns the new mode when it actually changed.
    pub fn toggle(
        &mut self,
        confirmed_by_hardware: bool,
        reported: Option<ClassificationMode>,
    ) -> Option<ClassificationMode> {
        let next = if confirmed_by_hardware {
            reported?
        } else {
            self.mode.flipped()
        };

        if next == self.mode {
            debug!("Mode already {next}, nothing to change");
            return None;
        }

        self.mode = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_mode_is_small() {
        assert_eq!(ModeController::new().mode(), ClassificationMode::Small);
    }

    #[test]
    fn test_local_toggle_alternates() {
        let mut controller = ModeController::new();
        let mut expected = ClassificationMode::Small;

        for _ in 0..5 {
            expected = expected.flipped();
            assert_eq!(controller.toggle(false, None), Some(expected));
            assert_eq!(controller.mode(), expected);
        }
    }

    #[test]
    fn test_local_toggle_ignores_reported_mode() {
        let mut controller = ModeController::new();
        assert_eq!(
            controller.toggle(false, Some(ClassificationMode::Small)),
            Some(ClassificationMode::Large)
        );
    }

    #[test]
    fn test_hardware_report_is_authoritative() {
        let mut controller = ModeController::new();

        assert_eq!(
            controller.toggle(true, Some(ClassificationMode::Large)),
            Some(ClassificationMode::Large)
        );
        // Same mode echoed twice: no second notification
        assert_eq!(controller.toggle(true, Some(ClassificationMode::Large)), None);
        assert_eq!(controller.mode(), ClassificationMode::Large);
    }

    #[test]
    fn test_confirmed_toggle_without_report_is_noop() {
        let mut controller = ModeController::new();
        assert_eq!(controller.toggle(true, None), None);
        assert_eq!(controller.mode(), ClassificationMode::Small);
    }
}
