use super::SourceSignal;
use crate::link::{parse_line, ConnectionManager, ControllerMessage, LinkError};
use crate::types::ClassificationEvent;
use log::debug;

/// Upper bound on lines handled per poll so a chatty peer cannot starve the tick
const MAX_LINES_PER_DRAIN: usize = 256;

/// Classification events read from the adopted controller link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareEventSource {
    endpoint: String,
}

impl HardwareEventSource {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn translate(line: &str) -> SourceSignal {
        match parse_line(line) {
            ControllerMessage::Classified(category) => {
                SourceSignal::Classified(ClassificationEvent::now(category))
            }
            ControllerMessage::ActuatorActive => SourceSignal::ActuatorActive,
            ControllerMessage::ActuatorIdle => SourceSignal::ActuatorIdle,
            ControllerMessage::ModeReport(mode) => SourceSignal::ModeReport(mode),
            ControllerMessage::Acknowledged => SourceSignal::Acknowledged,
            ControllerMessage::Unrecognized(text) => SourceSignal::Unrecognized(text),
        }
    }

    /// Everything the controller has sent since the last drain, in order.
    ///
    /// Signals translated before a link fault are lost with the error; the
    /// caller drops the link in that case anyway.
    pub fn drain(&self, manager: &mut ConnectionManager) -> Result<Vec<SourceSignal>, LinkError> {
        let mut signals = Vec::new();
        while signals.len() < MAX_LINES_PER_DRAIN {
            let Some(line) = manager.poll_line()? else {
                break;
            };
            debug!("<- {}: {line}", self.endpoint);
            signals.push(Self::translate(&line));
        }
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::memory::{MemoryOpener, MemoryPeer};
    use crate::link::{HandshakeConfig, LinkHandshake};
    use crate::types::{Category, ClassificationMode};
    use std::time::Duration;

    fn connected(peer: &MemoryPeer) -> ConnectionManager {
        let opener = MemoryOpener::new().with_peer("ttyACM0", peer.clone());
        let handshake = LinkHandshake::new(
            &opener,
            HandshakeConfig {
                open_timeout: Duration::from_millis(10),
                settle_time: Duration::ZERO,
                probe_window: Duration::from_millis(5),
            },
        );
        let mut manager = ConnectionManager::new();
        manager.connect(&handshake, &["ttyACM0".to_string()]);
        manager
    }

    #[test]
    fn test_drain_translates_lines_in_order() {
        let peer = MemoryPeer::new().reply_to_toggle(&["Modo cambiado"]);
        let mut manager = connected(&peer);
        let source = HardwareEventSource::new("ttyACM0");

        peer.send_line("Objeto PEQUEÑO detectado");
        peer.send_line("Servo ACTIVADO");
        peer.send_line("Servo regresó a REPOSO");
        peer.send_line("MODO 2 activo");
        peer.send_line("boot v1.3");

        let signals = source.drain(&mut manager).unwrap();

        assert_eq!(signals.len(), 5);
        assert!(
            matches!(&signals[0], SourceSignal::Classified(e) if e.category == Category::Small)
        );
        assert_eq!(signals[1], SourceSignal::ActuatorActive);
        assert_eq!(signals[2], SourceSignal::ActuatorIdle);
        assert_eq!(signals[3], SourceSignal::ModeReport(ClassificationMode::Large));
        assert_eq!(signals[4], SourceSignal::Unrecognized("boot v1.3".to_string()));
        assert!(source.drain(&mut manager).unwrap().is_empty());
    }

    #[test]
    fn test_drain_surfaces_link_loss() {
        let peer = MemoryPeer::new().reply_to_toggle(&["Modo cambiado"]);
        let mut manager = connected(&peer);
        let source = HardwareEventSource::new("ttyACM0");

        peer.break_link();

        assert!(matches!(
            source.drain(&mut manager),
            Err(LinkError::Closed { .. })
        ));
    }
}
