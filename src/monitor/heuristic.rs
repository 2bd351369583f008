// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Availability heuristic for the slot page.
//!
//! The portal shows a fixed message when no slot is open. The check looks
//! for that negative marker and reports availability whenever it is
//! absent. Absence-implies-positive is fragile on purpose: any page
//! lacking the phrase (half-rendered content, a localization change)
//! reads as available. The alert path is cheap and a human verifies, so
//! a false positive costs one notification; a false negative costs the
//! slot.

/// The "no slot available" message shown by the portal.
pub const NEGATIVE_MARKER: &str = "aucun créneau disponible";

/// Outcome of the availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityVerdict {
    pub available: bool,
    pub reason: &'static str,
}

/// Check the captured page text for the negative marker.
pub fn check_availability(dom_text: &str) -> AvailabilityVerdict {
    if dom_text.to_lowercase().contains(NEGATIVE_MARKER) {
        AvailabilityVerdict {
            available: false,
            reason: "negative marker found",
        }
    } else {
        AvailabilityVerdict {
            available: true,
            reason: "negative marker absent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_marker_means_unavailable() {
        let verdict =
            check_availability("Désolé, aucun créneau disponible pour cette démarche.");
        assert!(!verdict.available);
        assert_eq!(verdict.reason, "negative marker found");
    }

    #[test]
    fn test_marker_match_is_case_insensitive() {
        let verdict = check_availability("AUCUN CRÉNEAU DISPONIBLE");
        assert!(!verdict.available);
    }

    #[test]
    fn test_marker_absent_means_available() {
        let verdict = check_availability("Choisissez un créneau: 09:00, 09:30");
        assert!(verdict.available);
        assert_eq!(verdict.reason, "negative marker absent");
    }

    #[test]
    fn test_known_false_positive_unrelated_page_reads_as_available() {
        // Documented risk of the absence-implies-positive policy: text with
        // no relation to the booking page still reads as available.
        let verdict = check_availability("Bienvenue sur un tout autre site");
        assert!(verdict.available);
    }

    #[test]
    fn test_known_false_positive_empty_capture_reads_as_available() {
        // A blank or half-rendered capture also reads as available.
        assert!(check_availability("").available);
    }
}
