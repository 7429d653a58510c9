//! Text protocol spoken by the sorting controller firmware
//!
//! Keywords are matched as exact substrings; the firmware prints them in
//! Spanish and they must not be translated.

use crate::types::{Category, ClassificationMode};

/// Requests a mode toggle. Also used as the handshake probe.
pub const TOGGLE_COMMAND: &[u8] = b"C\n";

pub const ACK_TOKEN: &str = "Modo cambiado";
pub const SMALL_OBJECT_TOKEN: &str = "PEQUEÑO";
pub const LARGE_OBJECT_TOKEN: &str = "GRANDE";
pub const ACTUATOR_ACTIVE_TOKEN: &str = "Servo ACTIVADO";
pub const ACTUATOR_IDLE_TOKEN: &str = "Servo regresó a REPOSO";
pub const MODE_SMALL_TOKEN: &str = "MODO 1";
pub const MODE_LARGE_TOKEN: &str = "MODO 2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerMessage {
    Classified(Category),
    ActuatorActive,
    ActuatorIdle,
    ModeReport(ClassificationMode),
    Acknowledged,
    Unrecognized(String),
}

/// Translate one received line. First matching keyword wins, in firmware
/// priority order: object category, actuator, mode, acknowledgment.
pub fn parse_line(line: &str) -> ControllerMessage {
    if line.contains(SMALL_OBJECT_TOKEN) {
        ControllerMessage::Classified(Category::Small)
    } else if line.contains(LARGE_OBJECT_TOKEN) {
        ControllerMessage::Classified(Category::Large)
    } else if line.contains(ACTUATOR_ACTIVE_TOKEN) {
        ControllerMessage::ActuatorActive
    } else if line.contains(ACTUATOR_IDLE_TOKEN) {
        ControllerMessage::ActuatorIdle
    } else if line.contains(MODE_SMALL_TOKEN) {
        ControllerMessage::ModeReport(ClassificationMode::Small)
    } else if line.contains(MODE_LARGE_TOKEN) {
        ControllerMessage::ModeReport(ClassificationMode::Large)
    } else if is_acknowledgment(line) {
        ControllerMessage::Acknowledged
    } else {
        ControllerMessage::Unrecognized(line.to_string())
    }
}

pub fn is_acknowledgment(line: &str) -> bool {
    line.contains(ACK_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_firmware_lines() {
        let cases = [
            ("Objeto PEQUEÑO detectado", ControllerMessage::Classified(Category::Small)),
            ("Objeto GRANDE detectado", ControllerMessage::Classified(Category::Large)),
            ("Servo ACTIVADO", ControllerMessage::ActuatorActive),
            ("Servo regresó a REPOSO", ControllerMessage::ActuatorIdle),
            ("MODO 1 activo", ControllerMessage::ModeReport(ClassificationMode::Small)),
            ("MODO 2 activo", ControllerMessage::ModeReport(ClassificationMode::Large)),
            ("Modo cambiado", ControllerMessage::Acknowledged),
        ];

        for (line, expected) in cases {
            assert_eq!(parse_line(line), expected, "line {line:?}");
        }
    }

    #[test]
    fn test_mode_report_wins_over_acknowledgment() {
        assert_eq!(
            parse_line("Modo cambiado a MODO 2"),
            ControllerMessage::ModeReport(ClassificationMode::Large)
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(
            parse_line("servo activado"),
            ControllerMessage::Unrecognized("servo activado".to_string())
        );
        assert!(!is_acknowledgment("MODO CAMBIADO"));
    }
}
