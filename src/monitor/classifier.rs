// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page classifier: maps a raw page observation to a `PageKind`.
//!
//! Classification is a priority-ordered keyword table evaluated top to
//! bottom; the first matching rule wins. Defense and failure signals
//! (blocked, maintenance, error) come first because their page bodies can
//! coincidentally contain availability-looking keywords. `Loading` comes
//! before the content rules so a half-rendered page is never mistaken for
//! a verdict. When no rule matches, the slot-page decision is delegated to
//! the availability heuristic, and anything else falls through to
//! `Unknown`, which callers treat as a no-op tick.

use serde::{Deserialize, Serialize};

use super::heuristic;
use crate::browser::PageObservation;

/// Categories a page observation can fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageKind {
    Blocked,
    Maintenance,
    Error,
    Loading,
    Captcha,
    Initial,
    Available,
    Unavailable,
    Unknown,
}

impl PageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Maintenance => "maintenance",
            Self::Error => "error",
            Self::Loading => "loading",
            Self::Captcha => "captcha",
            Self::Initial => "initial",
            Self::Available => "available",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        }
    }
}

/// Interactive elements on an available page, for the alert log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailabilityDetails {
    pub buttons: Vec<String>,
    pub links: Vec<String>,
}

/// The categorized interpretation of one observation. Produced fresh on
/// every tick, never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageClassification {
    pub kind: PageKind,
    pub description: String,
    pub availability: Option<AvailabilityDetails>,
}

const BLOCKED_MARKERS: &[&str] = &[
    "cloudflare",
    "attention required",
    "sorry, you have been blocked",
    "you are unable to access",
    "security service",
    "cf-wrapper",
    "cf-error-details",
];

const MAINTENANCE_MARKERS: &[&str] = &[
    "maintenance en cours",
    "service temporairement indisponible",
    "temporairement",
    "maintenance",
];

const ERROR_MARKERS: &[&str] = &[
    "page not found",
    "service unavailable",
    "erreur",
    "error",
    "404",
    "500",
    "503",
];

const LOADING_MARKERS: &[&str] = &[
    "chargement",
    "loading",
    "veuillez patienter",
    "please wait",
];

const CAPTCHA_MARKERS: &[&str] = &[
    "captcha",
    "code de sécurité",
    "recopier le code",
    "captchaformulaireextinput",
    "captchaid",
    "captchausercode",
];

const INITIAL_MARKERS: &[&str] = &[
    "que souhaitez-vous faire",
    "prendre un rendez-vous",
    "gérer mes rendez-vous",
    "étape 1 sur 6",
];

/// Keywords marking a button or link as booking-related, used only to fill
/// `AvailabilityDetails` once the heuristic says the page is positive.
const AVAILABILITY_KEYWORDS: &[&str] = &[
    "disponible",
    "available",
    "libre",
    "free",
    "réserver",
    "reserve",
    "choisir",
    "select",
    "créneau",
    "creneau",
    "slot",
    "rendez-vous",
    "appointment",
    "horaire",
    "schedule",
];

/// Priority-ordered rule table. First match wins.
const RULES: &[(PageKind, &[&str])] = &[
    (PageKind::Blocked, BLOCKED_MARKERS),
    (PageKind::Maintenance, MAINTENANCE_MARKERS),
    (PageKind::Error, ERROR_MARKERS),
    (PageKind::Loading, LOADING_MARKERS),
    (PageKind::Captcha, CAPTCHA_MARKERS),
    (PageKind::Initial, INITIAL_MARKERS),
];

/// Classify one page observation. Pure function of its input.
pub fn classify(obs: &PageObservation) -> PageClassification {
    let haystack = format!("{}\n{}\n{}", obs.title, obs.url, obs.dom_text).to_lowercase();

    for (kind, markers) in RULES {
        if markers.iter().any(|m| haystack.contains(m)) {
            return PageClassification {
                kind: *kind,
                description: describe(*kind).to_string(),
                availability: None,
            };
        }
    }

    // Nothing rendered at all: not a verdict, just an unrecognized page.
    if obs.dom_text.trim().is_empty() {
        return PageClassification {
            kind: PageKind::Unknown,
            description: describe(PageKind::Unknown).to_string(),
            availability: None,
        };
    }

    // Slot page: Available vs Unavailable is the heuristic's call, not a
    // generic keyword match.
    let verdict = heuristic::check_availability(&obs.dom_text);
    if verdict.available {
        PageClassification {
            kind: PageKind::Available,
            description: format!("slots may be open ({})", verdict.reason),
            availability: Some(extract_details(&obs.dom_text)),
        }
    } else {
        PageClassification {
            kind: PageKind::Unavailable,
            description: "no slot available".to_string(),
            availability: None,
        }
    }
}

fn describe(kind: PageKind) -> &'static str {
    match kind {
        PageKind::Blocked => "page blocked by anti-bot protection",
        PageKind::Maintenance => "site under maintenance",
        PageKind::Error => "error page",
        PageKind::Loading => "page still loading",
        PageKind::Captcha => "captcha challenge, manual intervention required",
        PageKind::Initial => "booking entry page",
        PageKind::Available => "slots may be open",
        PageKind::Unavailable => "no slot available",
        PageKind::Unknown => "unrecognized page",
    }
}

/// Pull booking-related buttons and links out of the captured text. The
/// capture script prefixes interactive elements with `button:` / `link:`.
fn extract_details(dom_text: &str) -> AvailabilityDetails {
    const MAX_PER_KIND: usize = 10;
    let mut details = AvailabilityDetails::default();

    for line in dom_text.lines() {
        let (label, bucket) = if let Some(rest) = line.strip_prefix("button: ") {
            (rest, &mut details.buttons)
        } else if let Some(rest) = line.strip_prefix("link: ") {
            (rest, &mut details.links)
        } else {
            continue;
        };
        if bucket.len() >= MAX_PER_KIND {
            continue;
        }
        let lowered = label.to_lowercase();
        if AVAILABILITY_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            bucket.push(label.trim().to_string());
        }
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(title: &str, url: &str, dom_text: &str) -> PageObservation {
        PageObservation {
            url: url.to_string(),
            title: title.to_string(),
            dom_text: dom_text.to_string(),
        }
    }

    fn slot_url() -> &'static str {
        "https://rdv.example/reservation/demarche/3720/creneau/"
    }

    #[test]
    fn test_classification_is_deterministic() {
        let o = obs("Réservation", slot_url(), "Aucun créneau disponible");
        let a = classify(&o);
        let b = classify(&o);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.description, b.description);
    }

    #[test]
    fn test_blocked_preempts_availability_keywords() {
        // Priority ordering: a blocked page mentioning free slots is still
        // blocked.
        let o = obs(
            "Attention Required! | Cloudflare",
            slot_url(),
            "créneau disponible réserver maintenant",
        );
        assert_eq!(classify(&o).kind, PageKind::Blocked);
    }

    #[test]
    fn test_loading_preempts_content_rules() {
        let o = obs("Réservation", slot_url(), "Veuillez patienter pendant le chargement");
        assert_eq!(classify(&o).kind, PageKind::Loading);
    }

    #[test]
    fn test_maintenance_preempts_error() {
        let o = obs(
            "Maintenance",
            slot_url(),
            "Service temporairement indisponible (erreur 503)",
        );
        assert_eq!(classify(&o).kind, PageKind::Maintenance);
    }

    #[test]
    fn test_captcha_detected_from_form_markers() {
        let o = obs(
            "Vérification",
            slot_url(),
            "Recopier le code ci-dessous captchaFormulaireExtInput",
        );
        assert_eq!(classify(&o).kind, PageKind::Captcha);
    }

    #[test]
    fn test_entry_page_detected() {
        let o = obs(
            "Démarche",
            "https://rdv.example/reservation/demarche/3720/",
            "Que souhaitez-vous faire ?\nlink: Prendre un rendez-vous",
        );
        assert_eq!(classify(&o).kind, PageKind::Initial);
    }

    #[test]
    fn test_negative_marker_classifies_unavailable() {
        let o = obs("Réservation", slot_url(), "Aucun créneau disponible pour le moment");
        let c = classify(&o);
        assert_eq!(c.kind, PageKind::Unavailable);
        assert!(c.availability.is_none());
    }

    #[test]
    fn test_marker_absent_classifies_available_with_details() {
        let o = obs(
            "Réservation",
            slot_url(),
            "Choisissez votre horaire\nbutton: Réserver 09:00\nlink: Choisir un autre jour\nlink: Mentions légales",
        );
        let c = classify(&o);
        assert_eq!(c.kind, PageKind::Available);
        let details = c.availability.expect("details expected on available page");
        assert_eq!(details.buttons, vec!["Réserver 09:00"]);
        assert_eq!(details.links, vec!["Choisir un autre jour"]);
    }

    #[test]
    fn test_empty_capture_is_unknown_not_available() {
        let o = obs("", "about:blank", "   ");
        assert_eq!(classify(&o).kind, PageKind::Unknown);
    }
}
