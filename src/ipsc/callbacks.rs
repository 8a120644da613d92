//! Host-application callback surface.
//!
//! The dispatcher classifies and validates every inbound datagram but
//! never interprets DMR audio payloads or builds APRS/SMS gateway
//! behavior itself (spec.md §1 Non-goals) — it hands the parsed or
//! opaque payload to whatever implements [`IpscHandler`]. Default
//! method bodies are no-ops so a binary that only cares about a
//! handful of message types doesn't have to implement all ten.

use crate::ipsc::packet::CallHeader;
use crate::types::RadioId;

/// Everything the IPSC core reports to the embedding application.
/// Method names mirror spec.md §6's callback table.
pub trait IpscHandler: Send + Sync {
    fn group_voice(&self, _system: &str, _src: RadioId, _header: CallHeader) {}
    fn private_voice(&self, _system: &str, _src: RadioId, _header: CallHeader) {}
    fn group_data(&self, _system: &str, _src: RadioId, _header: CallHeader) {}
    fn private_data(&self, _system: &str, _src: RadioId, _header: CallHeader) {}
    fn xcmp_xnl(&self, _system: &str, _src: RadioId, _payload: &[u8]) {}
    fn call_mon_status(&self, _system: &str, _src: RadioId, _payload: &[u8]) {}
    fn call_mon_rpt(&self, _system: &str, _src: RadioId, _payload: &[u8]) {}
    fn call_mon_nack(&self, _system: &str, _src: RadioId, _payload: &[u8]) {}
    fn repeater_wake_up(&self, _system: &str, _src: RadioId, _payload: &[u8]) {}
    fn unknown_message(&self, _system: &str, _src: RadioId, _opcode: u8, _payload: &[u8]) {}
}

/// Reference handler that only logs. Used by the bundled binary so
/// it is runnable end to end without pretending to implement the
/// out-of-scope DMR audio/APRS gateway semantics.
pub struct LoggingHandler;

impl IpscHandler for LoggingHandler {
    fn group_voice(&self, system: &str, src: RadioId, header: CallHeader) {
        tracing::info!(
            system, %src, dst = header.dst_subscriber, ts = header.timeslot, end = header.call_end,
            "group voice call"
        );
    }

    fn private_voice(&self, system: &str, src: RadioId, header: CallHeader) {
        tracing::info!(
            system, %src, dst = header.dst_subscriber, ts = header.timeslot, end = header.call_end,
            "private voice call"
        );
    }

    fn group_data(&self, system: &str, src: RadioId, header: CallHeader) {
        tracing::info!(system, %src, dst = header.dst_subscriber, "group data call");
    }

    fn private_data(&self, system: &str, src: RadioId, header: CallHeader) {
        tracing::info!(system, %src, dst = header.dst_subscriber, "private data call");
    }

    fn xcmp_xnl(&self, system: &str, src: RadioId, payload: &[u8]) {
        tracing::debug!(system, %src, len = payload.len(), "XCMP/XNL payload");
    }

    fn call_mon_status(&self, system: &str, src: RadioId, payload: &[u8]) {
        tracing::debug!(system, %src, len = payload.len(), "call monitor status");
    }

    fn call_mon_rpt(&self, system: &str, src: RadioId, payload: &[u8]) {
        tracing::debug!(system, %src, len = payload.len(), "call monitor report");
    }

    fn call_mon_nack(&self, system: &str, src: RadioId, payload: &[u8]) {
        tracing::debug!(system, %src, len = payload.len(), "call monitor nack");
    }

    fn repeater_wake_up(&self, system: &str, src: RadioId, payload: &[u8]) {
        tracing::debug!(system, %src, len = payload.len(), "repeater wake-up");
    }

    fn unknown_message(&self, system: &str, src: RadioId, opcode: u8, payload: &[u8]) {
        tracing::debug!(
            system, %src, opcode = format!("0x{opcode:02x}"), len = payload.len(),
            "unknown message"
        );
    }
}
