//! Maps `Box<dyn Error>` from trait boundaries to typed `GripError`.
//!
//! `grip_core` does not link the hardware crate, so mapping works on what any
//! implementation can produce: `std::io::Error` kinds first, then message text.

use crate::error::GripError;

fn io_kind(e: &(dyn std::error::Error + 'static)) -> Option<std::io::ErrorKind> {
    let mut cur: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = cur {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        cur = err.source();
    }
    None
}

/// Map an error returned by `Transport::read`/`close`.
pub fn map_transport_error(e: &(dyn std::error::Error + 'static)) -> GripError {
    if let Some(kind) = io_kind(e) {
        return match kind {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                GripError::TransportTimeout
            }
            _ => GripError::Transport(e.to_string()),
        };
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        GripError::TransportTimeout
    } else {
        GripError::Transport(s)
    }
}

/// Map an error returned by any `Actuator` call.
pub fn map_actuator_error(e: &(dyn std::error::Error + 'static)) -> GripError {
    GripError::Actuator(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeout_maps_to_transport_timeout() {
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(matches!(map_transport_error(&e), GripError::TransportTimeout));
    }

    #[test]
    fn other_io_maps_to_transport() {
        let e = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged");
        match map_transport_error(&e) {
            GripError::Transport(msg) => assert!(msg.contains("unplugged")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn string_heuristic_catches_timeouts() {
        let e: Box<dyn std::error::Error + Send + Sync> = "read timeout".into();
        assert!(matches!(
            map_transport_error(e.as_ref()),
            GripError::TransportTimeout
        ));
    }
}
