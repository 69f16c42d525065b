use crate::socks5::Socks5Reply;
use std::io;

/// Reply code for a failed connect, if the failure is one the server knows
/// how to report. Anything else is sent as `NetworkUnreachable` and handed
/// to the operator.
pub fn recognize_connect_error(error: &io::Error) -> Option<Socks5Reply> {
    match error.kind() {
        io::ErrorKind::AddrNotAvailable => Some(Socks5Reply::HostUnreachable),
        io::ErrorKind::ConnectionRefused => Some(Socks5Reply::ConnectionRefused),
        io::ErrorKind::TimedOut => Some(Socks5Reply::TTLExpired),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_code(error: io::Error) -> u8 {
        recognize_connect_error(&error).unwrap_or(Socks5Reply::NetworkUnreachable) as u8
    }

    #[test]
    fn maps_known_connect_errors() {
        assert_eq!(reply_code(io::ErrorKind::ConnectionRefused.into()), 0x05);
        assert_eq!(reply_code(io::ErrorKind::AddrNotAvailable.into()), 0x04);
        assert_eq!(reply_code(io::ErrorKind::TimedOut.into()), 0x06);
    }

    #[test]
    fn wrapped_errors_map_by_kind() {
        let error = io::Error::new(io::ErrorKind::ConnectionRefused, "upstream proxy refused");
        assert_eq!(reply_code(error), 0x05);
    }

    #[test]
    fn unknown_errors_are_network_unreachable() {
        let error = io::Error::new(io::ErrorKind::Other, "ENOTFOUND");

        assert!(recognize_connect_error(&error).is_none());
        assert_eq!(reply_code(error), 0x03);
        assert_eq!(reply_code(io::ErrorKind::PermissionDenied.into()), 0x03);
    }
}
