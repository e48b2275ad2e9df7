//! Finite-state-machine types for both endpoints.
//!
//! Transitions are driven by [`crate::sender`] and [`crate::recv_window`];
//! keeping the state enums here lets both sides log and assert on them
//! without depending on each other.

/// Lifecycle of the sending endpoint.
///
/// ```text
///  IDLE ──CONNECT sent──▶ SENDING ──CLOSE sent──▶ CLOSING ──ACK(total)──▶ DONE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Nothing sent yet; initial state.
    #[default]
    Idle,
    /// CONNECT sent; DATA segments flowing through the window.
    Sending,
    /// CLOSE sent; waiting for the acknowledgement that covers it.
    Closing,
    /// Every segment, CLOSE included, has been acknowledged. Terminal.
    Done,
}

/// Lifecycle of the receiving endpoint.
///
/// ```text
///  IDLE ──CONNECT──▶ CONNECTED ──in-order CLOSE──▶ IDLE (end of stream)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// No connection; only CONNECT is acted upon.
    #[default]
    Idle,
    /// Delivering a stream.
    Connected,
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SenderState::Idle => "IDLE",
            SenderState::Sending => "SENDING",
            SenderState::Closing => "CLOSING",
            SenderState::Done => "DONE",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReceiverState::Idle => "IDLE",
            ReceiverState::Connected => "CONNECTED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_machines_start_idle() {
        assert_eq!(SenderState::default(), SenderState::Idle);
        assert_eq!(ReceiverState::default(), ReceiverState::Idle);
    }

    #[test]
    fn display_uses_protocol_names() {
        assert_eq!(SenderState::Closing.to_string(), "CLOSING");
        assert_eq!(ReceiverState::Connected.to_string(), "CONNECTED");
    }
}
