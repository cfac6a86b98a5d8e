//! FilterPolicy - Forwarding Eligibility
//!
//! Pure predicates over an event's staff number, event type and device name.
//! Filters gate forwarding only; every event is still persisted.

use std::fmt;

use crate::config_store::{FilterPolicy, ForwardingPolicy};

/// Why an event was not forwarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Staff(String),
    EventType(String),
    Device(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Staff(no) => write!(f, "Staff #{} filtered", no),
            SkipReason::EventType(t) => write!(f, "Event type {} filtered", t),
            SkipReason::Device(d) => write!(f, "Device \"{}\" not in forward list", d),
        }
    }
}

/// Outcome of evaluating the filters for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Forward,
    Skip(SkipReason),
}

/// Staff number is on the exclusion list (only while filtering is enabled)
pub fn should_skip_staff(filter: &FilterPolicy, staffno: &str) -> bool {
    filter.enabled && filter.skip_staff_numbers.iter().any(|s| s == staffno)
}

/// Event type is on the exclusion list (only while filtering is enabled)
pub fn should_skip_event_type(filter: &FilterPolicy, etype: &str) -> bool {
    filter.enabled && filter.skip_event_types.iter().any(|t| t == etype)
}

/// Device passes the allow-list
///
/// An empty list allows every device; otherwise any entry contained in the
/// device name (case-insensitive) allows it.
pub fn should_forward_device(forwarding: &ForwardingPolicy, devname: &str) -> bool {
    if forwarding.filter_devices.is_empty() {
        return true;
    }
    let devname = devname.to_lowercase();
    forwarding
        .filter_devices
        .iter()
        .any(|d| devname.contains(&d.to_lowercase()))
}

/// Check staff, then event type, then device; the first failing check wins
pub fn evaluate(
    filter: &FilterPolicy,
    forwarding: &ForwardingPolicy,
    staffno: &str,
    etype: &str,
    devname: &str,
) -> FilterDecision {
    if should_skip_staff(filter, staffno) {
        FilterDecision::Skip(SkipReason::Staff(staffno.to_string()))
    } else if should_skip_event_type(filter, etype) {
        FilterDecision::Skip(SkipReason::EventType(etype.to_string()))
    } else if !should_forward_device(forwarding, devname) {
        FilterDecision::Skip(SkipReason::Device(devname.to_string()))
    } else {
        FilterDecision::Forward
    }
}
